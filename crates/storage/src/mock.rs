//! In-memory filesystem for tests and ephemeral datasets.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::sync::Arc;

use bytes::Bytes;
use fdset_common::{DatasetError, Result};
use parking_lot::RwLock;
use tracing::debug;

use crate::filesystem::{FileInfo, FileSelector, FileSystem, FileType, InputFile, OutputStream};
use crate::path;

/// Paths are absolute and `/`-separated; relative inputs are resolved
/// against the root. Files written through [`OutputStream`] become visible
/// when the stream is closed.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<RwLock<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    files: BTreeMap<String, Bytes>,
    dirs: BTreeSet<String>,
}

impl MockState {
    fn add_parents(&mut self, file_path: &str) {
        let mut dir = path::dirname(file_path);
        while dir.len() > 1 && self.dirs.insert(dir.clone()) {
            dir = path::dirname(&dir);
        }
    }

    fn exists_dir(&self, dir: &str) -> bool {
        dir == "/" || self.dirs.contains(dir)
    }
}

fn canonical(p: &str) -> String {
    let n = path::normalize(p);
    if n.starts_with('/') {
        n
    } else {
        format!("/{n}")
    }
}

fn not_found(p: &str) -> DatasetError {
    DatasetError::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file in mock filesystem: {p}"),
    ))
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) a file and any missing parent directories.
    pub fn create_file(&self, p: &str, contents: impl Into<Bytes>) {
        let p = canonical(p);
        let mut st = self.state.write();
        st.add_parents(&p);
        st.files.insert(p, contents.into());
    }

    /// All file paths, sorted.
    pub fn file_paths(&self) -> Vec<String> {
        self.state.read().files.keys().cloned().collect()
    }
}

impl FileSystem for MockFileSystem {
    fn type_name(&self) -> &'static str {
        "mock"
    }

    fn normalize_path(&self, p: &str) -> Result<String> {
        Ok(canonical(p))
    }

    fn get_file_info(&self, selector: &FileSelector) -> Result<Vec<FileInfo>> {
        let base = canonical(&selector.base_dir);
        let st = self.state.read();
        if !st.exists_dir(&base) {
            if selector.allow_not_found {
                return Ok(Vec::new());
            }
            return Err(DatasetError::Discovery(format!(
                "base directory '{base}' does not exist"
            )));
        }

        let keep = |p: &str| match path::strip_base_dir(p, &base) {
            Some(rel) if !rel.is_empty() => selector.recursive || !rel.contains('/'),
            _ => false,
        };
        let mut out = st
            .dirs
            .iter()
            .filter(|d| keep(d))
            .map(|d| FileInfo::dir(d.clone()))
            .chain(
                st.files
                    .iter()
                    .filter(|(p, _)| keep(p))
                    .map(|(p, data)| FileInfo::file(p.clone(), data.len() as u64)),
            )
            .collect::<Vec<_>>();
        out.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(base = %base, entries = out.len(), "listed mock filesystem");
        Ok(out)
    }

    fn get_file_info_for(&self, p: &str) -> Result<FileInfo> {
        let p = canonical(p);
        let st = self.state.read();
        if let Some(data) = st.files.get(&p) {
            return Ok(FileInfo::file(p, data.len() as u64));
        }
        if st.exists_dir(&p) {
            return Ok(FileInfo::dir(p));
        }
        Ok(FileInfo {
            path: p,
            file_type: FileType::NotFound,
            size: 0,
        })
    }

    fn open_input_file(&self, p: &str) -> Result<InputFile> {
        let p = canonical(p);
        let data = self
            .state
            .read()
            .files
            .get(&p)
            .cloned()
            .ok_or_else(|| not_found(&p))?;
        Ok(InputFile::new(p, data))
    }

    fn create_dir(&self, p: &str, recursive: bool) -> Result<()> {
        let p = canonical(p);
        let mut st = self.state.write();
        if p == "/" || st.dirs.contains(&p) {
            return Ok(());
        }
        let parent = path::dirname(&p);
        if !recursive && !st.exists_dir(&parent) {
            return Err(not_found(&parent));
        }
        st.add_parents(&p);
        st.dirs.insert(p);
        Ok(())
    }

    fn open_output_stream(&self, p: &str) -> Result<Box<dyn OutputStream>> {
        let p = canonical(p);
        if self.state.read().exists_dir(&p) {
            return Err(DatasetError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot write to directory {p}"),
            )));
        }
        Ok(Box::new(MockOutputStream {
            path: p,
            buf: Vec::new(),
            state: Arc::clone(&self.state),
        }))
    }

    fn delete_dir_contents(&self, p: &str) -> Result<()> {
        let p = canonical(p);
        let mut st = self.state.write();
        if !st.exists_dir(&p) {
            return Err(not_found(&p));
        }
        let inside = |x: &String| matches!(path::strip_base_dir(x, &p), Some(rel) if !rel.is_empty());
        st.files.retain(|k, _| !inside(k));
        st.dirs.retain(|k| !inside(k));
        Ok(())
    }
}

struct MockOutputStream {
    path: String,
    buf: Vec<u8>,
    state: Arc<RwLock<MockState>>,
}

impl Write for MockOutputStream {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl OutputStream for MockOutputStream {
    fn path(&self) -> &str {
        &self.path
    }

    fn close(self: Box<Self>) -> Result<()> {
        let MockOutputStream { path, buf, state } = *self;
        let mut st = state.write();
        st.add_parents(&path);
        st.files.insert(path, Bytes::from(buf));
        Ok(())
    }
}
