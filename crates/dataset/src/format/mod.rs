//! File formats: inspection, scan task production and writers.

use std::fmt::{self, Debug};
use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use arrow_schema::SchemaRef;
use bytes::Bytes;
use fdset_common::Result;
use fdset_execution::Expr;
use fdset_storage::{FileSystemRef, InputFile, OutputStream};

use crate::fragment::FileFragment;
use crate::scan::{ScanOptions, ScanTaskIterator};

mod csv;
mod ipc;
mod json;
mod parquet;

pub use self::csv::CsvFileFormat;
pub use self::ipc::IpcFileFormat;
pub use self::json::JsonFileFormat;
pub use self::parquet::ParquetFileFormat;

/// Where a fragment's bytes come from.
#[derive(Clone)]
pub enum FileSource {
    Path {
        path: String,
        filesystem: FileSystemRef,
    },
    Buffer(Bytes),
}

impl FileSource {
    pub fn new(path: impl Into<String>, filesystem: FileSystemRef) -> Self {
        FileSource::Path {
            path: path.into(),
            filesystem,
        }
    }

    pub fn from_buffer(data: impl Into<Bytes>) -> Self {
        FileSource::Buffer(data.into())
    }

    /// File path, or `"<buffer>"` for in-memory sources.
    pub fn path(&self) -> &str {
        match self {
            FileSource::Path { path, .. } => path,
            FileSource::Buffer(_) => "<buffer>",
        }
    }

    pub fn filesystem(&self) -> Option<&FileSystemRef> {
        match self {
            FileSource::Path { filesystem, .. } => Some(filesystem),
            FileSource::Buffer(_) => None,
        }
    }

    pub fn open(&self) -> Result<InputFile> {
        match self {
            FileSource::Path { path, filesystem } => filesystem.open_input_file(path),
            FileSource::Buffer(data) => Ok(InputFile::new("<buffer>", data.clone())),
        }
    }
}

impl Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSource::Path { path, filesystem } => {
                write!(f, "FileSource({}:{path})", filesystem.type_name())
            }
            FileSource::Buffer(data) => write!(f, "FileSource(<buffer {} bytes>)", data.len()),
        }
    }
}

pub trait FileFormat: Send + Sync + Debug {
    fn type_name(&self) -> &'static str;

    /// Whether `source` looks like a file of this format.
    fn is_supported(&self, source: &FileSource) -> Result<bool>;

    /// Physical schema stored in `source`.
    fn inspect(&self, source: &FileSource) -> Result<SchemaRef>;

    /// Scan tasks reading `fragment`'s physical batches.
    fn scan_file(
        &self,
        options: Arc<ScanOptions>,
        fragment: Arc<FileFragment>,
    ) -> Result<ScanTaskIterator>;

    fn make_writer(
        &self,
        destination: Box<dyn OutputStream>,
        schema: SchemaRef,
        options: &FileWriteOptions,
    ) -> Result<Box<dyn FileWriter>>;
}

pub type FileFormatRef = Arc<dyn FileFormat>;

/// Fragment construction for a shared format handle.
pub trait FileFormatExt {
    fn make_fragment(&self, source: FileSource, partition_expression: Expr) -> Arc<FileFragment>;
}

impl FileFormatExt for FileFormatRef {
    fn make_fragment(&self, source: FileSource, partition_expression: Expr) -> Arc<FileFragment> {
        Arc::new(FileFragment::new(
            source,
            Arc::clone(self),
            partition_expression,
        ))
    }
}

/// Sink for one output file.
pub trait FileWriter: Send {
    fn schema(&self) -> &SchemaRef;

    fn write(&mut self, batch: &RecordBatch) -> Result<()>;

    /// Flushes footers and closes the destination stream.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Which format new files are written in.
#[derive(Debug, Clone)]
pub struct FileWriteOptions {
    pub format: FileFormatRef,
}

impl FileWriteOptions {
    pub fn new(format: FileFormatRef) -> Self {
        Self { format }
    }
}
