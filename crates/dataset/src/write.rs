//! Re-writing scan output under a destination partitioning.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use arrow::array::{ArrayRef, UInt32Array, new_null_array};
use arrow::compute::{cast, take_record_batch};
use arrow::record_batch::RecordBatch;
use arrow::row::{OwnedRow, RowConverter, SortField};
use fdset_common::{DatasetConfig, DatasetError, Result, global_metrics};
use fdset_execution::{Expr, ScalarValue, col, conjunction};
use fdset_storage::FileSystemRef;
use fdset_storage::path::join_path;
use tracing::{debug, info};

use crate::dataset::FileSystemDataset;
use crate::format::{FileWriteOptions, FileWriter};
use crate::partitioning::PartitioningRef;
use crate::scan::Scanner;

const COUNTER_PLACEHOLDER: &str = "{i}";

#[derive(Debug, Clone)]
pub struct FileSystemDatasetWriteOptions {
    pub file_write_options: FileWriteOptions,
    pub filesystem: FileSystemRef,
    pub base_dir: String,
    /// Destination partitioning; its fields are encoded in directories and
    /// dropped from the written files.
    pub partitioning: PartitioningRef,
    /// File name with `{i}` replaced by a per-directory counter.
    pub basename_template: String,
    /// Rows per file before rolling over to the next counter; 0 is unlimited.
    pub max_rows_per_file: usize,
}

impl FileSystemDatasetWriteOptions {
    pub fn new(
        file_write_options: FileWriteOptions,
        filesystem: FileSystemRef,
        base_dir: impl Into<String>,
        partitioning: PartitioningRef,
    ) -> Self {
        let config = DatasetConfig::default();
        Self {
            file_write_options,
            filesystem,
            base_dir: base_dir.into(),
            partitioning,
            basename_template: config.basename_template,
            max_rows_per_file: config.max_rows_per_file,
        }
    }

    pub fn with_basename_template(mut self, template: impl Into<String>) -> Self {
        self.basename_template = template.into();
        self
    }

    pub fn with_max_rows_per_file(mut self, rows: usize) -> Self {
        self.max_rows_per_file = rows;
        self
    }
}

impl FileSystemDataset {
    /// Writes every batch of `scanner` below `options.base_dir`, one
    /// directory per distinct destination partition key, and returns the
    /// sorted paths of the files written.
    ///
    /// Files finished before a failure stay on disk.
    pub fn write(options: &FileSystemDatasetWriteOptions, scanner: &Scanner) -> Result<Vec<String>> {
        if !options.basename_template.contains(COUNTER_PLACEHOLDER) {
            return Err(DatasetError::InvalidConfig(format!(
                "basename template '{}' lacks the {COUNTER_PLACEHOLDER} placeholder",
                options.basename_template
            )));
        }
        let started = Instant::now();
        let base_dir = options.filesystem.normalize_path(&options.base_dir)?;
        let mut writers: BTreeMap<String, DirectoryWriter> = BTreeMap::new();
        let mut written = Vec::new();
        let mut rows = 0usize;

        for tagged in scanner.scan_batches()? {
            let batch = tagged?.record_batch.value;
            rows += batch.num_rows();
            for (key, group) in group_by_partition(&batch, &options.partitioning)? {
                let segments = options.partitioning.format(&key)?;
                let dir = join_path(&base_dir, &segments.join("/"));
                let payload = drop_partition_columns(&group, &options.partitioning)?;
                writers
                    .entry(dir.clone())
                    .or_insert_with(|| DirectoryWriter::new(dir))
                    .write(&payload, options, &mut written)?;
            }
        }
        for writer in writers.into_values() {
            writer.finish()?;
        }

        written.sort();
        let format = options.file_write_options.format.type_name();
        global_metrics().record_write(
            format,
            written.len() as u64,
            rows as u64,
            started.elapsed().as_secs_f64(),
        );
        info!(
            base_dir = %base_dir,
            format,
            partitioning = options.partitioning.type_name(),
            files = written.len(),
            rows,
            "wrote dataset"
        );
        Ok(written)
    }
}

/// Rows of `batch` grouped by their destination partition key, groups in
/// order of first appearance and rows in input order.
fn group_by_partition(
    batch: &RecordBatch,
    partitioning: &PartitioningRef,
) -> Result<Vec<(Expr, RecordBatch)>> {
    let fields = partitioning.schema().fields();
    if fields.is_empty() {
        return Ok(vec![(conjunction(Vec::new()), batch.clone())]);
    }
    let keys = fields
        .iter()
        .map(|field| -> Result<ArrayRef> {
            match batch.column_by_name(field.name()) {
                Some(column) if column.data_type() == field.data_type() => Ok(Arc::clone(column)),
                Some(column) => cast(column, field.data_type()).map_err(|e| {
                    DatasetError::Write(format!("partition column '{}': {e}", field.name()))
                }),
                None if field.is_nullable() => {
                    Ok(new_null_array(field.data_type(), batch.num_rows()))
                }
                None => Err(DatasetError::Write(format!(
                    "partition field '{}' is missing from the scanned batch",
                    field.name()
                ))),
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let converter = RowConverter::new(
        fields
            .iter()
            .map(|f| SortField::new(f.data_type().clone()))
            .collect(),
    )
    .map_err(|e| DatasetError::Write(format!("partition key encoding: {e}")))?;
    let rows = converter
        .convert_columns(&keys)
        .map_err(|e| DatasetError::Write(format!("partition key encoding: {e}")))?;

    let mut slots: HashMap<OwnedRow, usize> = HashMap::new();
    let mut groups: Vec<Vec<u32>> = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        let slot = *slots.entry(row.owned()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(i as u32);
    }

    groups
        .into_iter()
        .map(|indices| {
            let first = indices[0] as usize;
            let terms = fields
                .iter()
                .zip(&keys)
                .map(|(field, key)| {
                    let value = ScalarValue::try_from_array(key.as_ref(), first)?;
                    Ok(if value.is_null() {
                        col(field.name().as_str()).is_null()
                    } else {
                        col(field.name().as_str()).eq(Expr::Literal(value))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let group = take_record_batch(batch, &UInt32Array::from(indices))
                .map_err(|e| DatasetError::Write(format!("grouping rows: {e}")))?;
            Ok((conjunction(terms), group))
        })
        .collect()
}

fn drop_partition_columns(batch: &RecordBatch, partitioning: &PartitioningRef) -> Result<RecordBatch> {
    let partition_schema = partitioning.schema();
    let keep = batch
        .schema()
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| partition_schema.field_with_name(f.name()).is_err())
        .map(|(i, _)| i)
        .collect::<Vec<_>>();
    batch
        .project(&keep)
        .map_err(|e| DatasetError::Write(format!("dropping partition columns: {e}")))
}

struct OpenFile {
    path: String,
    writer: Box<dyn FileWriter>,
    rows: usize,
}

/// Output files of one partition directory, opened one at a time.
struct DirectoryWriter {
    dir: String,
    next_index: usize,
    current: Option<OpenFile>,
}

impl DirectoryWriter {
    fn new(dir: String) -> Self {
        Self {
            dir,
            next_index: 0,
            current: None,
        }
    }

    fn open_next(
        &mut self,
        batch: &RecordBatch,
        options: &FileSystemDatasetWriteOptions,
        written: &mut Vec<String>,
    ) -> Result<OpenFile> {
        let basename = options
            .basename_template
            .replace(COUNTER_PLACEHOLDER, &self.next_index.to_string());
        self.next_index += 1;
        let path = join_path(&self.dir, &basename);
        options.filesystem.create_dir(&self.dir, true)?;
        let stream = options.filesystem.open_output_stream(&path)?;
        let writer = options.file_write_options.format.make_writer(
            stream,
            batch.schema(),
            &options.file_write_options,
        )?;
        debug!(path = %path, "opened output file");
        written.push(path.clone());
        Ok(OpenFile {
            path,
            writer,
            rows: 0,
        })
    }

    fn write(
        &mut self,
        batch: &RecordBatch,
        options: &FileSystemDatasetWriteOptions,
        written: &mut Vec<String>,
    ) -> Result<()> {
        let limit = match options.max_rows_per_file {
            0 => usize::MAX,
            n => n,
        };
        let mut offset = 0;
        while offset < batch.num_rows() {
            if self.current.is_none() {
                let file = self.open_next(batch, options, written)?;
                self.current = Some(file);
            }
            let Some(open) = self.current.as_mut() else {
                break;
            };
            let take = (limit - open.rows).min(batch.num_rows() - offset);
            open.writer.write(&batch.slice(offset, take))?;
            open.rows += take;
            offset += take;
            if open.rows >= limit {
                self.finish_current()?;
            }
        }
        Ok(())
    }

    fn finish_current(&mut self) -> Result<()> {
        if let Some(open) = self.current.take() {
            debug!(path = %open.path, rows = open.rows, "finished output file");
            open.writer.finish()?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        self.finish_current()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Int32Array, StringArray};
    use arrow::record_batch::RecordBatch;
    use arrow_schema::{DataType, Field, Schema};
    use fdset_execution::known_field_values;

    use super::group_by_partition;
    use crate::partitioning::{DirectoryPartitioning, HivePartitioning, PartitioningRef};

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("country", DataType::Utf8, true),
            Field::new("sales", DataType::Int32, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![Some("US"), Some("CA"), Some("US"), None])),
                Arc::new(Int32Array::from(vec![1, 2, 3, 4])),
            ],
        )
        .expect("batch")
    }

    #[test]
    fn groups_in_first_appearance_order_keeping_row_order() {
        let partitioning: PartitioningRef = Arc::new(HivePartitioning::new(Arc::new(Schema::new(
            vec![Field::new("country", DataType::Utf8, true)],
        ))));
        let groups = group_by_partition(&batch(), &partitioning).expect("groups");
        assert_eq!(groups.len(), 3);
        let sales = groups
            .iter()
            .map(|(_, g)| {
                g.column(1)
                    .as_any()
                    .downcast_ref::<Int32Array>()
                    .expect("sales")
                    .values()
                    .to_vec()
            })
            .collect::<Vec<_>>();
        assert_eq!(sales, vec![vec![1, 3], vec![2], vec![4]]);
        assert_eq!(
            known_field_values(&groups[1].0)["country"],
            fdset_execution::ScalarValue::from("CA")
        );
        assert!(known_field_values(&groups[2].0)["country"].is_null());
    }

    #[test]
    fn missing_required_partition_field_is_an_error() {
        let partitioning: PartitioningRef = Arc::new(DirectoryPartitioning::new(Arc::new(
            Schema::new(vec![Field::new("year", DataType::Int32, false)]),
        )));
        let err = group_by_partition(&batch(), &partitioning).expect_err("missing year");
        assert!(err.to_string().starts_with("write error"));
    }
}
