//! Scan engine: per-fragment tasks, projection and filtering, and the
//! [`Scanner`] composing them into ordered or unordered batch streams.
//!
//! Execution model:
//! - serial executor: every task runs through the blocking entry point on
//!   the consumer thread
//! - pooled executor: one producer per in-flight fragment is spawned on the
//!   pool and feeds a bounded channel; tasks advertising async support are
//!   driven through `execute_async`, all others run as a single submitted
//!   unit of pool work

pub(crate) mod options;
mod projector;
mod scanner;
mod task;

pub use options::ScanOptions;
pub use scanner::{
    Enumerated, EnumeratedRecordBatch, EnumeratedRecordBatchIterator,
    EnumeratedRecordBatchStream, Scanner, ScannerBuilder, Table,
};
pub use task::{InMemoryScanTask, ScanTask, ScanTaskIterator, ScanTaskRef};
