//! Partitioned file datasets: discovery, pruning, scanning and re-writing.
//!
//! Architecture role:
//! - maps directory segments to partition predicates and back
//! - discovers files into immutable datasets of fragments with a unified schema
//! - prunes fragments against a filter and scans the survivors into tagged
//!   batch streams on an explicit executor
//! - re-writes scan output under a destination partitioning
//!
//! Key modules:
//! - [`partitioning`]
//! - [`format`]
//! - [`fragment`] / [`dataset`]
//! - [`discovery`]
//! - [`scan`]
//! - [`write`]

pub mod dataset;
pub mod discovery;
pub mod format;
pub mod fragment;
pub mod partitioning;
pub mod scan;
pub mod schema;
pub mod write;

pub use dataset::{
    Dataset, DatasetExt, DatasetRef, FileSystemDataset, FragmentDataset, FragmentIterator,
    InMemoryDataset,
};
pub use discovery::{FileSystemDatasetFactory, FileSystemFactoryOptions};
pub use format::{
    CsvFileFormat, FileFormat, FileFormatExt, FileFormatRef, FileSource, FileWriteOptions,
    FileWriter, IpcFileFormat, JsonFileFormat, ParquetFileFormat,
};
pub use fragment::{FileFragment, Fragment, FragmentRef, InMemoryFragment};
pub use partitioning::{
    DirectoryPartitioning, HivePartitioning, ParseMode, Partitioning, PartitioningFactory,
    PartitioningOrFactory, PartitioningRef,
};
pub use scan::{
    Enumerated, EnumeratedRecordBatch, InMemoryScanTask, ScanOptions, ScanTask, ScanTaskIterator,
    ScanTaskRef, Scanner, ScannerBuilder, Table,
};
pub use schema::unify_schemas;
pub use write::FileSystemDatasetWriteOptions;
