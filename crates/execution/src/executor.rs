//! Explicit worker-pool handle threaded through scan and write calls.
//!
//! An [`Executor`] is either serial (work runs inline on the caller) or a
//! bounded pool backed by a tokio multi-thread runtime with exactly
//! `capacity` worker threads. Units of work submitted to the pool must never
//! block on other pool work; tasks that need nested pool time return futures
//! instead (see `fdset_dataset::scan::ScanTask::execute_async`).

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use fdset_common::{DatasetConfig, DatasetError, Result};
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};
use tracing::info;

/// Clone-able handle to a serial or pooled executor.
#[derive(Clone)]
pub struct Executor {
    kind: ExecutorKind,
}

#[derive(Clone)]
enum ExecutorKind {
    Serial,
    Pool(Arc<PoolRuntime>),
}

struct PoolRuntime {
    runtime: Option<Runtime>,
    capacity: usize,
}

impl Drop for PoolRuntime {
    fn drop(&mut self) {
        // The last handle may be released from inside a worker thread, where a
        // blocking shutdown would panic.
        if let Some(rt) = self.runtime.take() {
            rt.shutdown_background();
        }
    }
}

impl Executor {
    /// Executor that runs every unit of work inline on the calling thread.
    pub fn serial() -> Self {
        Self {
            kind: ExecutorKind::Serial,
        }
    }

    /// Bounded pool with exactly `capacity` worker threads.
    pub fn thread_pool(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(DatasetError::InvalidConfig(
                "executor capacity must be at least 1".to_string(),
            ));
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(capacity)
            .thread_name("fdset-worker")
            .build()
            .map_err(|e| DatasetError::Execution(format!("failed to start worker pool: {e}")))?;
        info!(capacity, "started worker pool");
        Ok(Self {
            kind: ExecutorKind::Pool(Arc::new(PoolRuntime {
                runtime: Some(runtime),
                capacity,
            })),
        })
    }

    /// Process-wide pool with `capacity` workers, started on first use and
    /// handed out to every later caller asking for the same size.
    pub fn shared(capacity: usize) -> Result<Self> {
        static POOLS: OnceLock<Mutex<HashMap<usize, Executor>>> = OnceLock::new();
        let mut pools = POOLS.get_or_init(Default::default).lock();
        if let Some(pool) = pools.get(&capacity) {
            return Ok(pool.clone());
        }
        let pool = Self::thread_pool(capacity)?;
        pools.insert(capacity, pool.clone());
        Ok(pool)
    }

    /// Serial when `use_threads` is off, otherwise the shared pool sized from
    /// the config.
    pub fn from_config(config: &DatasetConfig) -> Result<Self> {
        if !config.use_threads {
            return Ok(Self::serial());
        }
        Self::shared(config.resolved_executor_threads())
    }

    pub fn is_serial(&self) -> bool {
        matches!(self.kind, ExecutorKind::Serial)
    }

    /// True when both handles submit to the same worker pool.
    pub fn shares_pool_with(&self, other: &Executor) -> bool {
        match (&self.kind, &other.kind) {
            (ExecutorKind::Pool(a), ExecutorKind::Pool(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Number of worker threads; 1 for the serial executor.
    pub fn capacity(&self) -> usize {
        match &self.kind {
            ExecutorKind::Serial => 1,
            ExecutorKind::Pool(p) => p.capacity,
        }
    }

    /// Runs `f` as one unit of pool work and returns its result as a future.
    ///
    /// On the serial executor `f` runs immediately and the returned future is
    /// already complete.
    pub fn submit<F, T>(&self, f: F) -> BoxFuture<'static, Result<T>>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        match &self.kind {
            ExecutorKind::Serial => futures::future::ready(f()).boxed(),
            ExecutorKind::Pool(p) => match p.runtime.as_ref() {
                Some(rt) => {
                    let handle = rt.spawn(async move { f() });
                    async move {
                        handle.await.map_err(|e| {
                            DatasetError::Execution(format!("pool task failed: {e}"))
                        })?
                    }
                    .boxed()
                }
                None => futures::future::ready(Err(shut_down())).boxed(),
            },
        }
    }

    /// Detaches `fut` onto the pool. Rejected by the serial executor.
    pub fn spawn<F>(&self, fut: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match &self.kind {
            ExecutorKind::Serial => Err(DatasetError::Execution(
                "cannot spawn background work on a serial executor".to_string(),
            )),
            ExecutorKind::Pool(p) => {
                let rt = p.runtime.as_ref().ok_or_else(shut_down)?;
                drop(rt.spawn(fut));
                Ok(())
            }
        }
    }
}

fn shut_down() -> DatasetError {
    DatasetError::Execution("worker pool has shut down".to_string())
}

impl Default for Executor {
    fn default() -> Self {
        Self::serial()
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExecutorKind::Serial => f.write_str("Executor::Serial"),
            ExecutorKind::Pool(p) => write!(f, "Executor::Pool({})", p.capacity),
        }
    }
}
