//! Fragments: one unit of physical data plus the partition predicate known
//! to hold for its rows.

use std::fmt::{self, Debug};
use std::sync::{Arc, OnceLock};

use arrow::record_batch::RecordBatch;
use arrow_schema::SchemaRef;
use fdset_common::Result;
use fdset_execution::{Expr, lit};

use crate::format::{FileFormatRef, FileSource};
use crate::scan::{InMemoryScanTask, ScanOptions, ScanTaskIterator, ScanTaskRef};

pub trait Fragment: Send + Sync + Debug {
    fn type_name(&self) -> &'static str;

    fn partition_expression(&self) -> &Expr;

    /// Columns actually stored in the fragment.
    fn read_physical_schema(&self) -> Result<SchemaRef>;

    /// Scan tasks producing the fragment's physical batches.
    fn scan(self: Arc<Self>, options: Arc<ScanOptions>) -> Result<ScanTaskIterator>;
}

pub type FragmentRef = Arc<dyn Fragment>;

/// One file read through a shared format.
pub struct FileFragment {
    source: FileSource,
    format: FileFormatRef,
    partition_expression: Expr,
    physical_schema: OnceLock<SchemaRef>,
}

impl FileFragment {
    pub fn new(source: FileSource, format: FileFormatRef, partition_expression: Expr) -> Self {
        Self {
            source,
            format,
            partition_expression,
            physical_schema: OnceLock::new(),
        }
    }

    /// Skips inspection when the physical schema is already known.
    pub fn with_physical_schema(self, schema: SchemaRef) -> Self {
        let _ = self.physical_schema.set(schema);
        self
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    pub fn format(&self) -> &FileFormatRef {
        &self.format
    }
}

impl Debug for FileFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileFragment")
            .field("path", &self.source.path())
            .field("format", &self.format.type_name())
            .field("partition_expression", &self.partition_expression.to_string())
            .finish()
    }
}

impl Fragment for FileFragment {
    fn type_name(&self) -> &'static str {
        self.format.type_name()
    }

    fn partition_expression(&self) -> &Expr {
        &self.partition_expression
    }

    fn read_physical_schema(&self) -> Result<SchemaRef> {
        if let Some(schema) = self.physical_schema.get() {
            return Ok(Arc::clone(schema));
        }
        let schema = self.format.inspect(&self.source)?;
        Ok(Arc::clone(self.physical_schema.get_or_init(|| schema)))
    }

    fn scan(self: Arc<Self>, options: Arc<ScanOptions>) -> Result<ScanTaskIterator> {
        let format = Arc::clone(&self.format);
        format.scan_file(options, self)
    }
}

/// Batches held in memory; each batch becomes one scan task.
#[derive(Debug)]
pub struct InMemoryFragment {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
    partition_expression: Expr,
}

impl InMemoryFragment {
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self {
            schema,
            batches,
            partition_expression: lit(true),
        }
    }

    pub fn with_partition_expression(mut self, expr: Expr) -> Self {
        self.partition_expression = expr;
        self
    }
}

impl Fragment for InMemoryFragment {
    fn type_name(&self) -> &'static str {
        "in-memory"
    }

    fn partition_expression(&self) -> &Expr {
        &self.partition_expression
    }

    fn read_physical_schema(&self) -> Result<SchemaRef> {
        Ok(Arc::clone(&self.schema))
    }

    fn scan(self: Arc<Self>, options: Arc<ScanOptions>) -> Result<ScanTaskIterator> {
        let fragment: FragmentRef = Arc::clone(&self) as FragmentRef;
        let tasks = self
            .batches
            .iter()
            .map(|batch| {
                Ok(Arc::new(InMemoryScanTask::new(
                    vec![batch.clone()],
                    Arc::clone(&options),
                    Arc::clone(&fragment),
                )) as ScanTaskRef)
            })
            .collect::<Vec<_>>();
        Ok(Box::new(tasks.into_iter()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::Int32Array;
    use arrow::record_batch::RecordBatch;
    use arrow_schema::{DataType, Field, Schema};
    use fdset_execution::{col, lit};

    use super::{Fragment, FragmentRef, InMemoryFragment};
    use crate::scan::ScanOptions;

    #[test]
    fn in_memory_fragment_yields_one_task_per_batch() {
        let schema = Arc::new(Schema::new(vec![Field::new("i32", DataType::Int32, true)]));
        let batch = RecordBatch::try_new(
            Arc::clone(&schema),
            vec![Arc::new(Int32Array::from(vec![1, 2, 3]))],
        )
        .expect("batch");
        let fragment: FragmentRef = Arc::new(
            InMemoryFragment::new(Arc::clone(&schema), vec![batch.clone(), batch])
                .with_partition_expression(col("i32").gt(lit(0))),
        );
        assert_eq!(fragment.read_physical_schema().expect("schema"), schema);
        assert_eq!(fragment.partition_expression().to_string(), "(i32 > 0)");

        let tasks = Arc::clone(&fragment)
            .scan(Arc::new(ScanOptions::new(schema)))
            .expect("scan")
            .collect::<Result<Vec<_>, _>>()
            .expect("tasks");
        assert_eq!(tasks.len(), 2);
        let rows = tasks
            .iter()
            .flat_map(|t| t.execute().expect("execute"))
            .map(|b| b.expect("batch").num_rows())
            .sum::<usize>();
        assert_eq!(rows, 6);
    }
}
