use std::sync::{Arc, OnceLock};

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

/// Process-wide counters for discovery, scanning and writing.
///
/// All updates go through prometheus atomics, so a handle can be shared by
/// concurrently running scan tasks and output sinks.
#[derive(Clone, Debug)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    registry: Registry,
    fragments_discovered: CounterVec,
    discovery_seconds: HistogramVec,
    fragments_scanned: CounterVec,
    fragments_pruned: CounterVec,
    batches_scanned: CounterVec,
    rows_scanned: CounterVec,
    files_written: CounterVec,
    rows_written: CounterVec,
    write_seconds: HistogramVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::new()),
        }
    }

    pub fn record_discovery(&self, format: &str, fragments: u64, secs: f64) {
        self.inner
            .fragments_discovered
            .with_label_values(&[format])
            .inc_by(fragments as f64);
        self.inner
            .discovery_seconds
            .with_label_values(&[format])
            .observe(secs.max(0.0));
    }

    pub fn record_pruning(&self, dataset: &str, kept: u64, pruned: u64) {
        self.inner
            .fragments_scanned
            .with_label_values(&[dataset])
            .inc_by(kept as f64);
        self.inner
            .fragments_pruned
            .with_label_values(&[dataset])
            .inc_by(pruned as f64);
    }

    pub fn record_batch_scanned(&self, dataset: &str, rows: u64) {
        self.inner
            .batches_scanned
            .with_label_values(&[dataset])
            .inc();
        self.inner
            .rows_scanned
            .with_label_values(&[dataset])
            .inc_by(rows as f64);
    }

    pub fn record_write(&self, format: &str, files: u64, rows: u64, secs: f64) {
        self.inner
            .files_written
            .with_label_values(&[format])
            .inc_by(files as f64);
        self.inner
            .rows_written
            .with_label_values(&[format])
            .inc_by(rows as f64);
        self.inner
            .write_seconds
            .with_label_values(&[format])
            .observe(secs.max(0.0));
    }

    pub fn render_prometheus(&self) -> String {
        let metric_families = self.inner.registry.gather();
        let mut out = Vec::new();
        let enc = TextEncoder::new();
        if enc.encode(&metric_families, &mut out).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&out).to_string()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsInner {
    fn new() -> Self {
        let registry = Registry::new();

        let fragments_discovered = counter_vec(
            &registry,
            "fdset_fragments_discovered_total",
            "Fragments created by discovery",
            &["format"],
        );
        let discovery_seconds = histogram_vec(
            &registry,
            "fdset_discovery_seconds",
            "Time spent listing and inspecting files",
            &["format"],
        );
        let fragments_scanned = counter_vec(
            &registry,
            "fdset_fragments_scanned_total",
            "Fragments surviving partition pruning",
            &["dataset"],
        );
        let fragments_pruned = counter_vec(
            &registry,
            "fdset_fragments_pruned_total",
            "Fragments excluded by partition pruning",
            &["dataset"],
        );
        let batches_scanned = counter_vec(
            &registry,
            "fdset_batches_scanned_total",
            "Batches delivered by scans",
            &["dataset"],
        );
        let rows_scanned = counter_vec(
            &registry,
            "fdset_rows_scanned_total",
            "Rows delivered by scans",
            &["dataset"],
        );
        let files_written = counter_vec(
            &registry,
            "fdset_files_written_total",
            "Files finalised by partitioned writes",
            &["format"],
        );
        let rows_written = counter_vec(
            &registry,
            "fdset_rows_written_total",
            "Rows written by partitioned writes",
            &["format"],
        );
        let write_seconds = histogram_vec(
            &registry,
            "fdset_write_seconds",
            "Wall time of partitioned writes",
            &["format"],
        );

        Self {
            registry,
            fragments_discovered,
            discovery_seconds,
            fragments_scanned,
            fragments_pruned,
            batches_scanned,
            rows_scanned,
            files_written,
            rows_written,
            write_seconds,
        }
    }
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let c = CounterVec::new(Opts::new(name, help), labels).expect("counter vec");
    registry
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

fn histogram_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> HistogramVec {
    let h = HistogramVec::new(HistogramOpts::new(name, help), labels).expect("histogram vec");
    registry
        .register(Box::new(h.clone()))
        .expect("register histogram");
    h
}

static GLOBAL_METRICS: OnceLock<MetricsRegistry> = OnceLock::new();

pub fn global_metrics() -> &'static MetricsRegistry {
    GLOBAL_METRICS.get_or_init(MetricsRegistry::new)
}
