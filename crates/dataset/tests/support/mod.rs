#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arrow::array::{Array, Float64Array, Int32Array, StringArray};
use arrow::record_batch::RecordBatch;
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use fdset_common::{DatasetError, Result};
use fdset_dataset::{
    FileFormat, FileSource, FileSystemDataset, FileSystemDatasetFactory,
    FileSystemFactoryOptions, FileWriteOptions, FileWriter, HivePartitioning, JsonFileFormat,
    PartitioningRef, ScanOptions, ScanTaskIterator,
};
use fdset_dataset::fragment::FileFragment;
use fdset_storage::{FileSelector, FileSystemRef, MockFileSystem, OutputStream};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn unique_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}_{nanos}"))
}

/// Schema of the sales dataset, partition fields included.
pub fn sales_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("region", DataType::Utf8, true),
        Field::new("model", DataType::Utf8, true),
        Field::new("sales", DataType::Float64, true),
        Field::new("year", DataType::Int32, true),
        Field::new("month", DataType::Int32, true),
        Field::new("country", DataType::Utf8, true),
    ]))
}

/// `sales_schema` restricted to `names`, in schema order.
pub fn schema_of(names: &[&str]) -> SchemaRef {
    let full = sales_schema();
    let fields = full
        .fields()
        .iter()
        .filter(|f| names.contains(&f.name().as_str()))
        .cloned()
        .collect::<Vec<_>>();
    Arc::new(Schema::new(fields))
}

fn rows(rows: &[(&str, &str, f64, &str)]) -> String {
    rows.iter()
        .map(|(region, model, sales, country)| {
            format!(
                "{{\"region\": \"{region}\", \"model\": \"{model}\", \"sales\": {sales}, \"country\": \"{country}\"}}\n"
            )
        })
        .collect()
}

/// Four hive-partitioned json files holding 3, 5, 5 and 3 rows, plus a
/// hidden file that discovery must skip.
pub fn sales_filesystem() -> MockFileSystem {
    let fs = MockFileSystem::new();
    fs.create_file(
        "/dataset/year=2018/month=01/dat0.json",
        rows(&[
            ("NY", "3", 742.0, "US"),
            ("NY", "S", 304.125, "US"),
            ("NY", "Y", 27.5, "US"),
        ]),
    );
    fs.create_file(
        "/dataset/year=2018/month=01/dat1.json",
        rows(&[
            ("QC", "3", 512.0, "CA"),
            ("QC", "S", 978.0, "CA"),
            ("NY", "X", 136.25, "US"),
            ("QC", "X", 1.0, "CA"),
            ("QC", "Y", 69.0, "CA"),
        ]),
    );
    fs.create_file(
        "/dataset/year=2019/month=01/dat0.json",
        rows(&[
            ("CA", "3", 273.5, "US"),
            ("CA", "S", 13.0, "US"),
            ("CA", "X", 54.0, "US"),
            ("QC", "S", 10.0, "CA"),
            ("CA", "Y", 21.0, "US"),
        ]),
    );
    fs.create_file(
        "/dataset/year=2019/month=01/dat1.json",
        rows(&[
            ("QC", "3", 152.25, "CA"),
            ("QC", "X", 42.0, "CA"),
            ("QC", "Y", 37.0, "CA"),
        ]),
    );
    fs.create_file("/dataset/.pesky", "garbage content");
    fs
}

pub fn sales_factory(fs: FileSystemRef) -> FileSystemDatasetFactory {
    let format = Arc::new(JsonFileFormat::with_schema(schema_of(&[
        "region", "model", "sales", "country",
    ])));
    let partitioning: PartitioningRef =
        Arc::new(HivePartitioning::new(schema_of(&["year", "month"])));
    let options = FileSystemFactoryOptions::default().with_partitioning(partitioning);
    FileSystemDatasetFactory::make(fs, &FileSelector::new("/dataset"), format, options)
        .expect("sales factory")
}

/// The sales dataset with `sales_schema` field order.
pub fn sales_dataset(fs: FileSystemRef) -> FileSystemDataset {
    sales_factory(fs)
        .finish_with_schema(sales_schema())
        .expect("sales dataset")
}

pub fn int32_batch(values: Vec<i32>) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![Field::new("i32", DataType::Int32, true)]));
    RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(values))]).expect("batch")
}

pub fn strings(batch: &RecordBatch, name: &str) -> Vec<Option<String>> {
    let column = batch.column_by_name(name).expect("column");
    let array = column
        .as_any()
        .downcast_ref::<StringArray>()
        .expect("utf8 column");
    (0..array.len())
        .map(|i| (!array.is_null(i)).then(|| array.value(i).to_string()))
        .collect()
}

pub fn floats(batch: &RecordBatch, name: &str) -> Vec<f64> {
    let column = batch.column_by_name(name).expect("column");
    column
        .as_any()
        .downcast_ref::<Float64Array>()
        .expect("float64 column")
        .values()
        .to_vec()
}

pub fn ints(batch: &RecordBatch, name: &str) -> Vec<i32> {
    let column = batch.column_by_name(name).expect("column");
    column
        .as_any()
        .downcast_ref::<Int32Array>()
        .expect("int32 column")
        .values()
        .to_vec()
}

/// Format whose writers count rows and write nothing else.
#[derive(Debug, Default)]
pub struct DiscardingRowCountingFormat {
    pub rows: Arc<AtomicUsize>,
}

impl DiscardingRowCountingFormat {
    pub fn rows_written(&self) -> usize {
        self.rows.load(Ordering::SeqCst)
    }
}

fn not_implemented(what: &str) -> DatasetError {
    DatasetError::Unsupported(format!("discarding format cannot {what}"))
}

impl FileFormat for DiscardingRowCountingFormat {
    fn type_name(&self) -> &'static str {
        "discarding_row_counting"
    }

    fn is_supported(&self, _source: &FileSource) -> Result<bool> {
        Err(not_implemented("inspect sources"))
    }

    fn inspect(&self, _source: &FileSource) -> Result<SchemaRef> {
        Err(not_implemented("inspect sources"))
    }

    fn scan_file(
        &self,
        _options: Arc<ScanOptions>,
        _fragment: Arc<FileFragment>,
    ) -> Result<ScanTaskIterator> {
        Err(not_implemented("scan"))
    }

    fn make_writer(
        &self,
        destination: Box<dyn OutputStream>,
        schema: SchemaRef,
        _options: &FileWriteOptions,
    ) -> Result<Box<dyn FileWriter>> {
        Ok(Box::new(DiscardingRowCountingWriter {
            destination,
            schema,
            rows: Arc::clone(&self.rows),
        }))
    }
}

struct DiscardingRowCountingWriter {
    destination: Box<dyn OutputStream>,
    schema: SchemaRef,
    rows: Arc<AtomicUsize>,
}

impl FileWriter for DiscardingRowCountingWriter {
    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        self.rows.fetch_add(batch.num_rows(), Ordering::SeqCst);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        self.destination.close()
    }
}
