use std::io::{Cursor, Write};
use std::sync::Arc;

use arrow::csv::reader::Format;
use arrow::csv::{Reader as CsvReader, ReaderBuilder, Writer as CsvWriter, WriterBuilder};
use arrow::record_batch::RecordBatch;
use arrow_schema::{Field, Schema, SchemaRef};
use bytes::Bytes;
use fdset_common::{DatasetError, Result};
use fdset_execution::{Executor, RecordBatchGenerator, RecordBatchIterator, blocking_iter};
use fdset_storage::OutputStream;
use futures::{StreamExt, TryStreamExt, stream};

use super::{FileFormat, FileSource, FileWriteOptions, FileWriter};
use crate::fragment::{FileFragment, Fragment, FragmentRef};
use crate::scan::{ScanOptions, ScanTask, ScanTaskIterator, ScanTaskRef};

/// Delimited text with an optional header row.
///
/// Column types are inferred from the file; fields the dataset schema also
/// declares are read with the dataset's type instead.
#[derive(Debug, Clone, Copy)]
pub struct CsvFileFormat {
    has_header: bool,
    delimiter: u8,
}

impl Default for CsvFileFormat {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: b',',
        }
    }
}

impl CsvFileFormat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    fn infer(&self, source: &FileSource) -> Result<Schema> {
        let file = source.open()?;
        let (schema, _) = Format::default()
            .with_header(self.has_header)
            .with_delimiter(self.delimiter)
            .infer_schema(file.reader(), None)
            .map_err(|e| {
                DatasetError::UnsupportedFormat(format!(
                    "'{}' is not a csv file: {e}",
                    source.path()
                ))
            })?;
        if schema.fields().is_empty() {
            return Err(DatasetError::UnsupportedFormat(format!(
                "'{}' has no csv columns",
                source.path()
            )));
        }
        Ok(schema)
    }
}

impl FileFormat for CsvFileFormat {
    fn type_name(&self) -> &'static str {
        "csv"
    }

    fn is_supported(&self, source: &FileSource) -> Result<bool> {
        Ok(self.infer(source).is_ok())
    }

    fn inspect(&self, source: &FileSource) -> Result<SchemaRef> {
        Ok(Arc::new(self.infer(source)?))
    }

    fn scan_file(
        &self,
        options: Arc<ScanOptions>,
        fragment: Arc<FileFragment>,
    ) -> Result<ScanTaskIterator> {
        let task: ScanTaskRef = Arc::new(CsvScanTask {
            format: *self,
            file: Arc::clone(&fragment),
            options,
            fragment,
        });
        Ok(Box::new(std::iter::once(Ok(task))))
    }

    fn make_writer(
        &self,
        destination: Box<dyn OutputStream>,
        schema: SchemaRef,
        _options: &FileWriteOptions,
    ) -> Result<Box<dyn FileWriter>> {
        let path = destination.path().to_string();
        let writer = WriterBuilder::new()
            .with_header(self.has_header)
            .with_delimiter(self.delimiter)
            .build(destination);
        Ok(Box::new(CsvFileWriter {
            path,
            schema,
            writer,
        }))
    }
}

/// Reads each batch as its own unit of executor work.
struct CsvScanTask {
    format: CsvFileFormat,
    file: Arc<FileFragment>,
    options: Arc<ScanOptions>,
    fragment: FragmentRef,
}

/// Starts from the fragment's cached physical schema, so a file inspected
/// during discovery is not inferred again per scan.
fn open_reader(
    format: CsvFileFormat,
    file: &FileFragment,
    dataset_schema: &Schema,
    batch_size: usize,
) -> Result<CsvReader<Cursor<Bytes>>> {
    let source = file.source();
    let physical = file.read_physical_schema()?;
    let fields = physical
        .fields()
        .iter()
        .map(|f| match dataset_schema.field_with_name(f.name()) {
            Ok(declared) => Field::new(f.name(), declared.data_type().clone(), true),
            Err(_) => f.as_ref().clone(),
        })
        .collect::<Vec<_>>();
    ReaderBuilder::new(Arc::new(Schema::new(fields)))
        .with_header(format.has_header)
        .with_delimiter(format.delimiter)
        .with_batch_size(batch_size)
        .build(source.open()?.reader())
        .map_err(|e| DatasetError::Scan(format!("opening '{}': {e}", source.path())))
}

impl ScanTask for CsvScanTask {
    fn options(&self) -> &Arc<ScanOptions> {
        &self.options
    }

    fn fragment(&self) -> &FragmentRef {
        &self.fragment
    }

    fn execute(&self) -> Result<RecordBatchIterator> {
        Ok(blocking_iter(self.execute_async(&Executor::serial())?))
    }

    fn supports_async(&self) -> bool {
        true
    }

    fn execute_async(&self, executor: &Executor) -> Result<RecordBatchGenerator> {
        let format = self.format;
        let file = Arc::clone(&self.file);
        let options = Arc::clone(&self.options);
        let opened = executor.submit(move || {
            open_reader(format, &file, &options.dataset_schema, options.batch_size)
        });
        let executor = executor.clone();
        let path = self.file.source().path().to_string();
        Ok(stream::once(opened)
            .map_ok(move |reader| read_batches(executor.clone(), reader, path.clone()))
            .try_flatten()
            .boxed())
    }
}

fn read_batches(
    executor: Executor,
    reader: CsvReader<Cursor<Bytes>>,
    path: String,
) -> RecordBatchGenerator {
    stream::try_unfold(reader, move |mut reader| {
        let path = path.clone();
        executor.submit(move || {
            let batch = reader
                .next()
                .transpose()
                .map_err(|e| DatasetError::Scan(format!("reading '{path}': {e}")))?;
            Ok(batch.map(|b| (b, reader)))
        })
    })
    .boxed()
}

struct CsvFileWriter {
    path: String,
    schema: SchemaRef,
    writer: CsvWriter<Box<dyn OutputStream>>,
}

impl FileWriter for CsvFileWriter {
    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        self.writer
            .write(batch)
            .map_err(|e| DatasetError::Write(format!("writing '{}': {e}", self.path)))
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let mut stream = self.writer.into_inner();
        stream.flush()?;
        stream.close()
    }
}
