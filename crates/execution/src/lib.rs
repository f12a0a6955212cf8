//! Execution-layer primitives shared by scanning and writing.
//!
//! Architecture role:
//! - explicit worker pool handle passed through every scan/write call
//! - predicate construction, binding, evaluation and pruning oracle
//! - batch stream abstractions, channels and the blocking bridge
//!
//! Key modules:
//! - [`executor`]
//! - [`expressions`]
//! - [`stream`]

pub mod executor;
pub mod expressions;
pub mod stream;

// Re-export only what you want at the crate root (no globs).
pub use executor::Executor;
pub use expressions::{
    CompareOp, Expr, PhysicalExpr, ScalarValue, col, compile_expr, conjunction, filter_batch,
    implies, is_satisfiable, known_field_values, lit,
};
pub use stream::{
    BatchSender, RecordBatchGenerator, RecordBatchIterator, RecordBatchStream,
    SendableRecordBatchStream, StreamAdapter, blocking_iter, bounded_batch_channel, iter_generator,
};
