//! Filesystem abstraction used by dataset discovery, scanning and writing.
//!
//! Key modules:
//! - [`filesystem`]: the [`FileSystem`] trait and listing types
//! - [`local`]: `std::fs` implementation
//! - [`mock`]: in-memory implementation for tests
//! - [`path`]: `/`-separated path helpers

pub mod filesystem;
pub mod local;
pub mod mock;
pub mod path;

pub use filesystem::{
    FileInfo, FileSelector, FileSystem, FileSystemRef, FileType, InputFile, OutputStream,
};
pub use local::LocalFileSystem;
pub use mock::MockFileSystem;
