//! `std::fs` backed filesystem.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use bytes::Bytes;
use fdset_common::{DatasetError, Result};
use tracing::debug;

use crate::filesystem::{FileInfo, FileSelector, FileSystem, FileType, InputFile, OutputStream};
use crate::path;

/// Local disk. Listings are sorted so discovery order is deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

fn path_string(p: &Path) -> String {
    p.to_string_lossy().replace('\\', "/")
}

fn walk(dir: &Path, recursive: bool, out: &mut Vec<FileInfo>) -> io::Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let p = entry.path();
        let meta = entry.metadata()?;
        if meta.is_dir() {
            out.push(FileInfo::dir(path_string(&p)));
            if recursive {
                walk(&p, recursive, out)?;
            }
        } else {
            out.push(FileInfo::file(path_string(&p), meta.len()));
        }
    }
    Ok(())
}

impl FileSystem for LocalFileSystem {
    fn type_name(&self) -> &'static str {
        "local"
    }

    fn normalize_path(&self, p: &str) -> Result<String> {
        Ok(path::normalize(&p.replace('\\', "/")))
    }

    fn get_file_info(&self, selector: &FileSelector) -> Result<Vec<FileInfo>> {
        let base = Path::new(&selector.base_dir);
        if !base.is_dir() {
            if selector.allow_not_found && !base.exists() {
                return Ok(Vec::new());
            }
            return Err(DatasetError::Discovery(format!(
                "base directory '{}' does not exist or is not a directory",
                selector.base_dir
            )));
        }
        let mut out = Vec::new();
        walk(base, selector.recursive, &mut out).map_err(|e| {
            DatasetError::Discovery(format!("listing '{}' failed: {e}", selector.base_dir))
        })?;
        out.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(base = %selector.base_dir, entries = out.len(), "listed local directory");
        Ok(out)
    }

    fn get_file_info_for(&self, p: &str) -> Result<FileInfo> {
        match fs::metadata(p) {
            Ok(m) if m.is_dir() => Ok(FileInfo::dir(p)),
            Ok(m) => Ok(FileInfo::file(p, m.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FileInfo {
                path: p.to_string(),
                file_type: FileType::NotFound,
                size: 0,
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn open_input_file(&self, p: &str) -> Result<InputFile> {
        let data = fs::read(p)?;
        Ok(InputFile::new(p, Bytes::from(data)))
    }

    fn create_dir(&self, p: &str, recursive: bool) -> Result<()> {
        if recursive {
            fs::create_dir_all(p)?;
        } else if !Path::new(p).is_dir() {
            fs::create_dir(p)?;
        }
        Ok(())
    }

    fn open_output_stream(&self, p: &str) -> Result<Box<dyn OutputStream>> {
        let file = File::create(p)?;
        Ok(Box::new(LocalOutputStream {
            path: p.to_string(),
            inner: BufWriter::new(file),
        }))
    }

    fn delete_dir_contents(&self, p: &str) -> Result<()> {
        for entry in fs::read_dir(p)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}

struct LocalOutputStream {
    path: String,
    inner: BufWriter<File>,
}

impl Write for LocalOutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl OutputStream for LocalOutputStream {
    fn path(&self) -> &str {
        &self.path
    }

    fn close(self: Box<Self>) -> Result<()> {
        let LocalOutputStream { path, inner } = *self;
        let file = inner
            .into_inner()
            .map_err(|e| DatasetError::Write(format!("flush of '{path}' failed: {e}")))?;
        file.sync_all()?;
        Ok(())
    }
}
