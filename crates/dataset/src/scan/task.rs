use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use fdset_common::Result;
use fdset_execution::{Executor, RecordBatchGenerator, RecordBatchIterator, iter_generator};

use super::ScanOptions;
use crate::fragment::FragmentRef;

/// Unit of work turning one chunk of one fragment into batches.
///
/// `execute` blocks the calling thread until batches are available.
/// `execute_async` returns a generator instead; tasks that submit work of
/// their own to an executor must support it, and the scanner never calls
/// `execute` on such a task while running on a pool.
pub trait ScanTask: Send + Sync {
    fn options(&self) -> &Arc<ScanOptions>;

    fn fragment(&self) -> &FragmentRef;

    fn execute(&self) -> Result<RecordBatchIterator>;

    fn supports_async(&self) -> bool {
        false
    }

    fn execute_async(&self, _executor: &Executor) -> Result<RecordBatchGenerator> {
        Ok(iter_generator(self.execute()?))
    }
}

pub type ScanTaskRef = Arc<dyn ScanTask>;

pub type ScanTaskIterator = Box<dyn Iterator<Item = Result<ScanTaskRef>> + Send>;

/// Task yielding batches that are already in memory.
pub struct InMemoryScanTask {
    batches: Vec<RecordBatch>,
    options: Arc<ScanOptions>,
    fragment: FragmentRef,
}

impl InMemoryScanTask {
    pub fn new(batches: Vec<RecordBatch>, options: Arc<ScanOptions>, fragment: FragmentRef) -> Self {
        Self {
            batches,
            options,
            fragment,
        }
    }
}

impl ScanTask for InMemoryScanTask {
    fn options(&self) -> &Arc<ScanOptions> {
        &self.options
    }

    fn fragment(&self) -> &FragmentRef {
        &self.fragment
    }

    fn execute(&self) -> Result<RecordBatchIterator> {
        Ok(Box::new(self.batches.clone().into_iter().map(Ok)))
    }
}
