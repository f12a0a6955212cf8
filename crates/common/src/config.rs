use serde::{Deserialize, Serialize};
use std::fs;

use crate::error::{DatasetError, Result};

/// Knobs shared by discovery, scanning and writing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Target rows per batch handed to file readers.
    pub batch_size_rows: usize,
    /// Fragments scanned concurrently ahead of the consumer.
    pub fragment_readahead: usize,
    /// Batches buffered per fragment before producers wait.
    pub batch_readahead: usize,
    /// Worker threads for the scan pool; 0 means available parallelism.
    pub executor_threads: usize,
    /// Whether scans run on the worker pool.
    pub use_threads: bool,
    /// File name pattern for written files; must contain `{i}`.
    pub basename_template: String,
    /// Path components starting with any of these are skipped during discovery.
    pub selector_ignore_prefixes: Vec<String>,
    /// Rows per written file before rolling over; 0 means unlimited.
    pub max_rows_per_file: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            batch_size_rows: 8192,
            fragment_readahead: 4,
            batch_readahead: 16,
            executor_threads: 0,
            use_threads: true,
            basename_template: "part-{i}".to_string(),
            selector_ignore_prefixes: vec![".".to_string(), "_".to_string()],
            max_rows_per_file: 0,
        }
    }
}

impl DatasetConfig {
    /// Loads a config from a JSON file; missing keys keep their defaults.
    pub fn load_from_json(path: &str) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        serde_json::from_str(&s).map_err(|e| DatasetError::InvalidConfig(e.to_string()))
    }

    /// Default config with `FDSET_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut c = Self::default();
        if let Some(v) = env_usize("FDSET_BATCH_SIZE_ROWS") {
            c.batch_size_rows = v.max(1);
        }
        if let Some(v) = env_usize("FDSET_FRAGMENT_READAHEAD") {
            c.fragment_readahead = v.max(1);
        }
        if let Some(v) = env_usize("FDSET_BATCH_READAHEAD") {
            c.batch_readahead = v.max(1);
        }
        if let Some(v) = env_usize("FDSET_EXECUTOR_THREADS") {
            c.executor_threads = v;
        }
        if let Some(v) = std::env::var("FDSET_USE_THREADS")
            .ok()
            .and_then(|x| x.parse::<bool>().ok())
        {
            c.use_threads = v;
        }
        if let Ok(v) = std::env::var("FDSET_BASENAME_TEMPLATE") {
            if v.contains("{i}") {
                c.basename_template = v;
            }
        }
        if let Some(v) = env_usize("FDSET_MAX_ROWS_PER_FILE") {
            c.max_rows_per_file = v;
        }
        c
    }

    /// Worker count with the 0 ⇒ available-parallelism rule resolved.
    pub fn resolved_executor_threads(&self) -> usize {
        if self.executor_threads > 0 {
            return self.executor_threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|x| x.parse::<usize>().ok())
}
