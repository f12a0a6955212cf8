use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{ArrayRef, new_null_array};
use arrow::compute::cast;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow_schema::SchemaRef;
use fdset_common::{DatasetError, Result};
use fdset_execution::{
    Executor, Expr, PhysicalExpr, RecordBatchGenerator, RecordBatchIterator, ScalarValue,
    compile_expr, filter_batch, implies, known_field_values,
};
use futures::StreamExt;

use super::{ScanOptions, ScanTask, ScanTaskRef};
use crate::fragment::FragmentRef;

/// Turns a fragment's physical batches into batches of the projected
/// dataset schema, filling partition columns and applying the scan filter.
pub(crate) struct Projector {
    materialized: SchemaRef,
    output_indices: Vec<usize>,
    known: HashMap<String, ScalarValue>,
    filter: Option<Arc<dyn PhysicalExpr>>,
}

impl Projector {
    pub(crate) fn new(options: &ScanOptions, partition_expression: &Expr) -> Result<Self> {
        let materialized = options.materialized_schema();
        let output_indices = options
            .projected_schema
            .fields()
            .iter()
            .map(|f| {
                materialized.index_of(f.name()).map_err(|e| {
                    DatasetError::InvalidConfig(format!("projection of '{}': {e}", f.name()))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let elide = options.filter.is_literal_true()
            || implies(partition_expression, &options.filter);
        let filter = if elide {
            None
        } else {
            Some(compile_expr(&options.filter, &materialized)?)
        };
        Ok(Self {
            materialized,
            output_indices,
            known: known_field_values(partition_expression),
            filter,
        })
    }

    pub(crate) fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    pub(crate) fn project(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let rows = batch.num_rows();
        let columns = self
            .materialized
            .fields()
            .iter()
            .map(|field| -> Result<ArrayRef> {
                if let Some(column) = batch.column_by_name(field.name()) {
                    if column.data_type() == field.data_type() {
                        return Ok(Arc::clone(column));
                    }
                    return cast(column, field.data_type()).map_err(|e| {
                        DatasetError::Scan(format!("cast of column '{}': {e}", field.name()))
                    });
                }
                match self.known.get(field.name()) {
                    Some(value) => value.to_array_of_type(field.data_type(), rows),
                    None => Ok(new_null_array(field.data_type(), rows)),
                }
            })
            .collect::<Result<Vec<_>>>()?;
        let full = RecordBatch::try_new_with_options(
            Arc::clone(&self.materialized),
            columns,
            &RecordBatchOptions::new().with_row_count(Some(rows)),
        )
        .map_err(|e| DatasetError::Scan(format!("materializing batch: {e}")))?;

        let filtered = match &self.filter {
            Some(predicate) => filter_batch(predicate.as_ref(), &full)?,
            None => full,
        };
        filtered
            .project(&self.output_indices)
            .map_err(|e| DatasetError::Scan(format!("projecting batch: {e}")))
    }
}

/// Wraps a format task with per-fragment projection and filtering.
pub(crate) struct FilterAndProjectScanTask {
    inner: ScanTaskRef,
    projector: Arc<Projector>,
}

impl FilterAndProjectScanTask {
    pub(crate) fn new(inner: ScanTaskRef, projector: Arc<Projector>) -> Self {
        Self { inner, projector }
    }
}

impl ScanTask for FilterAndProjectScanTask {
    fn options(&self) -> &Arc<ScanOptions> {
        self.inner.options()
    }

    fn fragment(&self) -> &FragmentRef {
        self.inner.fragment()
    }

    fn execute(&self) -> Result<RecordBatchIterator> {
        let projector = Arc::clone(&self.projector);
        let batches = self.inner.execute()?;
        Ok(Box::new(
            batches.map(move |batch| batch.and_then(|b| projector.project(&b))),
        ))
    }

    fn supports_async(&self) -> bool {
        self.inner.supports_async()
    }

    fn execute_async(&self, executor: &Executor) -> Result<RecordBatchGenerator> {
        let projector = Arc::clone(&self.projector);
        let batches = self.inner.execute_async(executor)?;
        Ok(batches
            .map(move |batch| batch.and_then(|b| projector.project(&b)))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Array, Int32Array};
    use arrow::record_batch::RecordBatch;
    use arrow_schema::{DataType, Field, Schema};
    use fdset_execution::{col, lit};

    use super::Projector;
    use crate::scan::ScanOptions;
    use crate::scan::options::project_schema;

    fn dataset_schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("sales", DataType::Int64, true),
            Field::new("year", DataType::Int32, true),
            Field::new("country", DataType::Utf8, true),
        ]))
    }

    fn physical_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("sales", DataType::Int32, true)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(vec![10, 20, 30]))])
            .expect("batch")
    }

    #[test]
    fn fills_partition_values_nulls_and_casts() {
        let options = ScanOptions::new(dataset_schema());
        let projector =
            Projector::new(&options, &col("year").eq(lit(2018))).expect("projector");
        let out = projector.project(&physical_batch()).expect("project");
        assert_eq!(out.schema(), dataset_schema());
        assert_eq!(out.column(0).data_type(), &DataType::Int64);
        let years = out
            .column(1)
            .as_any()
            .downcast_ref::<Int32Array>()
            .expect("year column");
        assert_eq!(years.values().to_vec(), vec![2018, 2018, 2018]);
        assert_eq!(out.column(2).null_count(), 3);
        assert!(!projector.has_filter());
    }

    #[test]
    fn filter_is_elided_only_when_implied() {
        let mut options = ScanOptions::new(dataset_schema());
        options.projected_schema =
            project_schema(&dataset_schema(), &["country".to_string()]).expect("projection");
        options.filter = col("year").eq(lit(2018));

        let implied = Projector::new(&options, &col("year").eq(lit(2018))).expect("projector");
        assert!(!implied.has_filter());
        assert_eq!(implied.project(&physical_batch()).expect("project").num_rows(), 3);

        let unknown = Projector::new(&options, &lit(true)).expect("projector");
        assert!(unknown.has_filter());
        let out = unknown.project(&physical_batch()).expect("project");
        assert_eq!(out.num_rows(), 0);
        assert_eq!(out.schema().field(0).name(), "country");
    }
}
