use std::fmt::Debug;
use std::io::{Cursor, Write};
use std::sync::Arc;

use bytes::Bytes;
use fdset_common::Result;

use crate::path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    NotFound,
}

/// One entry returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub path: String,
    pub file_type: FileType,
    /// Size in bytes; 0 for directories.
    pub size: u64,
}

impl FileInfo {
    pub fn file(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            file_type: FileType::File,
            size,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            file_type: FileType::Directory,
            size: 0,
        }
    }

    pub fn is_file(&self) -> bool {
        self.file_type == FileType::File
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn base_name(&self) -> &str {
        path::basename(&self.path)
    }

    pub fn extension(&self) -> Option<&str> {
        let name = self.base_name();
        name.rfind('.').filter(|i| *i > 0).map(|i| &name[i + 1..])
    }
}

/// What to list: everything under `base_dir`, optionally recursively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSelector {
    pub base_dir: String,
    pub recursive: bool,
    /// Treat a missing `base_dir` as empty instead of failing.
    pub allow_not_found: bool,
}

impl FileSelector {
    /// Recursive selector over `base_dir`.
    pub fn new(base_dir: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            recursive: true,
            allow_not_found: false,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn allow_not_found(mut self, allow: bool) -> Self {
        self.allow_not_found = allow;
        self
    }
}

/// Fully buffered, immutable view of a file's contents.
#[derive(Debug, Clone)]
pub struct InputFile {
    path: String,
    data: Bytes,
}

impl InputFile {
    pub fn new(path: impl Into<String>, data: Bytes) -> Self {
        Self {
            path: path.into(),
            data,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Cheap clone of the contents.
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Seekable reader over the contents.
    pub fn reader(&self) -> Cursor<Bytes> {
        Cursor::new(self.data.clone())
    }
}

/// Writable handle; contents are only guaranteed durable after `close`.
pub trait OutputStream: Write + Send {
    fn path(&self) -> &str;

    fn close(self: Box<Self>) -> Result<()>;
}

/// Filesystem operations needed to discover, read and write datasets.
pub trait FileSystem: Send + Sync + Debug {
    fn type_name(&self) -> &'static str;

    /// Canonical spelling of `path` for this filesystem.
    fn normalize_path(&self, path: &str) -> Result<String>;

    /// Lists entries under the selector's base directory, sorted by path.
    fn get_file_info(&self, selector: &FileSelector) -> Result<Vec<FileInfo>>;

    /// Info for a single path; missing paths report [`FileType::NotFound`].
    fn get_file_info_for(&self, path: &str) -> Result<FileInfo>;

    fn open_input_file(&self, path: &str) -> Result<InputFile>;

    fn create_dir(&self, path: &str, recursive: bool) -> Result<()>;

    /// Opens `path` for writing, replacing any existing file.
    fn open_output_stream(&self, path: &str) -> Result<Box<dyn OutputStream>>;

    /// Removes everything below `path`, keeping the directory itself.
    fn delete_dir_contents(&self, path: &str) -> Result<()>;
}

pub type FileSystemRef = Arc<dyn FileSystem>;
