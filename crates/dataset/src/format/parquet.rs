use std::sync::Arc;

use ::parquet::arrow::ArrowWriter;
use ::parquet::arrow::ProjectionMask;
use ::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use ::parquet::file::properties::WriterProperties;
use arrow::record_batch::RecordBatch;
use arrow_schema::SchemaRef;
use bytes::Bytes;
use fdset_common::{DatasetError, Result};
use fdset_execution::RecordBatchIterator;
use fdset_storage::OutputStream;

use super::{FileFormat, FileSource, FileWriteOptions, FileWriter};
use crate::fragment::{FileFragment, FragmentRef};
use crate::scan::{ScanOptions, ScanTask, ScanTaskIterator, ScanTaskRef};

const PARQUET_MAGIC: &[u8] = b"PAR1";

/// Parquet files, scanned one row group per task.
#[derive(Debug, Clone, Default)]
pub struct ParquetFileFormat {
    writer_properties: Option<WriterProperties>,
}

impl ParquetFileFormat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_writer_properties(mut self, properties: WriterProperties) -> Self {
        self.writer_properties = Some(properties);
        self
    }
}

fn open_builder(
    data: Bytes,
    path: &str,
) -> Result<ParquetRecordBatchReaderBuilder<Bytes>> {
    ParquetRecordBatchReaderBuilder::try_new(data).map_err(|e| {
        DatasetError::UnsupportedFormat(format!("'{path}' is not a parquet file: {e}"))
    })
}

impl FileFormat for ParquetFileFormat {
    fn type_name(&self) -> &'static str {
        "parquet"
    }

    fn is_supported(&self, source: &FileSource) -> Result<bool> {
        let data = source.open()?.bytes();
        Ok(data.len() >= 2 * PARQUET_MAGIC.len()
            && data.starts_with(PARQUET_MAGIC)
            && data.ends_with(PARQUET_MAGIC))
    }

    fn inspect(&self, source: &FileSource) -> Result<SchemaRef> {
        let builder = open_builder(source.open()?.bytes(), source.path())?;
        Ok(Arc::clone(builder.schema()))
    }

    fn scan_file(
        &self,
        options: Arc<ScanOptions>,
        fragment: Arc<FileFragment>,
    ) -> Result<ScanTaskIterator> {
        let source = fragment.source();
        let data = source.open()?.bytes();
        let path = source.path().to_string();
        let row_groups = open_builder(data.clone(), &path)?.metadata().num_row_groups();
        let fragment: FragmentRef = fragment;
        let tasks = (0..row_groups)
            .map(|row_group| {
                Ok(Arc::new(ParquetScanTask {
                    data: data.clone(),
                    path: path.clone(),
                    row_group,
                    options: Arc::clone(&options),
                    fragment: Arc::clone(&fragment),
                }) as ScanTaskRef)
            })
            .collect::<Vec<_>>();
        Ok(Box::new(tasks.into_iter()))
    }

    fn make_writer(
        &self,
        destination: Box<dyn OutputStream>,
        schema: SchemaRef,
        _options: &FileWriteOptions,
    ) -> Result<Box<dyn FileWriter>> {
        let path = destination.path().to_string();
        let writer = ArrowWriter::try_new(
            destination,
            Arc::clone(&schema),
            self.writer_properties.clone(),
        )
        .map_err(|e| DatasetError::Write(format!("opening parquet writer for '{path}': {e}")))?;
        Ok(Box::new(ParquetFileWriter {
            path,
            schema,
            writer,
        }))
    }
}

struct ParquetScanTask {
    data: Bytes,
    path: String,
    row_group: usize,
    options: Arc<ScanOptions>,
    fragment: FragmentRef,
}

impl ScanTask for ParquetScanTask {
    fn options(&self) -> &Arc<ScanOptions> {
        &self.options
    }

    fn fragment(&self) -> &FragmentRef {
        &self.fragment
    }

    fn execute(&self) -> Result<RecordBatchIterator> {
        let builder = open_builder(self.data.clone(), &self.path)?;
        // Only decode columns the scan materializes.
        let wanted = self.options.materialized_schema();
        let roots = builder
            .schema()
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| wanted.field_with_name(f.name()).is_ok())
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        let mask = ProjectionMask::roots(builder.parquet_schema(), roots);
        let reader = builder
            .with_row_groups(vec![self.row_group])
            .with_projection(mask)
            .with_batch_size(self.options.batch_size)
            .build()
            .map_err(|e| DatasetError::Scan(format!("reading '{}': {e}", self.path)))?;
        let path = self.path.clone();
        let row_group = self.row_group;
        Ok(Box::new(reader.map(move |batch| {
            batch.map_err(|e| {
                DatasetError::Scan(format!("reading row group {row_group} of '{path}': {e}"))
            })
        })))
    }
}

struct ParquetFileWriter {
    path: String,
    schema: SchemaRef,
    writer: ArrowWriter<Box<dyn OutputStream>>,
}

impl FileWriter for ParquetFileWriter {
    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        self.writer
            .write(batch)
            .map_err(|e| DatasetError::Write(format!("writing '{}': {e}", self.path)))
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let ParquetFileWriter { path, writer, .. } = *self;
        let stream = writer
            .into_inner()
            .map_err(|e| DatasetError::Write(format!("finishing '{path}': {e}")))?;
        stream.close()
    }
}
