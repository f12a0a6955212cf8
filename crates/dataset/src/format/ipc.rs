use std::io::Cursor;
use std::sync::Arc;

use arrow::ipc::reader::FileReader as IpcReader;
use arrow::ipc::writer::FileWriter as IpcWriter;
use arrow::record_batch::RecordBatch;
use arrow_schema::SchemaRef;
use bytes::Bytes;
use fdset_common::{DatasetError, Result};
use fdset_execution::RecordBatchIterator;
use fdset_storage::OutputStream;

use super::{FileFormat, FileSource, FileWriteOptions, FileWriter};
use crate::fragment::{FileFragment, FragmentRef};
use crate::scan::{ScanOptions, ScanTask, ScanTaskIterator, ScanTaskRef};

const IPC_MAGIC: &[u8] = b"ARROW1";

/// Arrow IPC file format.
#[derive(Debug, Clone, Copy, Default)]
pub struct IpcFileFormat;

impl IpcFileFormat {
    pub fn new() -> Self {
        Self
    }
}

fn open_reader(source: &FileSource) -> Result<IpcReader<Cursor<Bytes>>> {
    let file = source.open()?;
    IpcReader::try_new(file.reader(), None).map_err(|e| {
        DatasetError::UnsupportedFormat(format!("'{}' is not an ipc file: {e}", source.path()))
    })
}

impl FileFormat for IpcFileFormat {
    fn type_name(&self) -> &'static str {
        "ipc"
    }

    fn is_supported(&self, source: &FileSource) -> Result<bool> {
        Ok(source.open()?.bytes().starts_with(IPC_MAGIC))
    }

    fn inspect(&self, source: &FileSource) -> Result<SchemaRef> {
        Ok(open_reader(source)?.schema())
    }

    fn scan_file(
        &self,
        options: Arc<ScanOptions>,
        fragment: Arc<FileFragment>,
    ) -> Result<ScanTaskIterator> {
        let task: ScanTaskRef = Arc::new(IpcScanTask {
            source: fragment.source().clone(),
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
        let writer = IpcWriter::try_new(destination, &schema)
            .map_err(|e| DatasetError::Write(format!("opening ipc writer for '{path}': {e}")))?;
        Ok(Box::new(IpcFileWriter {
            path,
            schema,
            writer,
        }))
    }
}

struct IpcScanTask {
    source: FileSource,
    options: Arc<ScanOptions>,
    fragment: FragmentRef,
}

impl ScanTask for IpcScanTask {
    fn options(&self) -> &Arc<ScanOptions> {
        &self.options
    }

    fn fragment(&self) -> &FragmentRef {
        &self.fragment
    }

    fn execute(&self) -> Result<RecordBatchIterator> {
        let path = self.source.path().to_string();
        let reader = open_reader(&self.source)?;
        Ok(Box::new(reader.map(move |batch| {
            batch.map_err(|e| DatasetError::Scan(format!("reading ipc file '{path}': {e}")))
        })))
    }
}

struct IpcFileWriter {
    path: String,
    schema: SchemaRef,
    writer: IpcWriter<Box<dyn OutputStream>>,
}

impl FileWriter for IpcFileWriter {
    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        self.writer
            .write(batch)
            .map_err(|e| DatasetError::Write(format!("writing '{}': {e}", self.path)))
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let IpcFileWriter { path, writer, .. } = *self;
        let stream = writer
            .into_inner()
            .map_err(|e| DatasetError::Write(format!("finishing '{path}': {e}")))?;
        stream.close()
    }
}
