//! Shared configuration, error types and observability primitives for fdset crates.
//!
//! Architecture role:
//! - defines scan/write configuration passed across layers
//! - provides the common [`DatasetError`] / [`Result`] contracts
//! - hosts the prometheus-backed metrics registry
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`metrics`]

pub mod config;
pub mod error;
pub mod metrics;

pub use config::DatasetConfig;
pub use error::{DatasetError, Result};
pub use metrics::{global_metrics, MetricsRegistry};
