use std::sync::Arc;

use arrow_schema::{Schema, SchemaRef};
use fdset_common::{DatasetConfig, DatasetError, Result};
use fdset_execution::{Expr, lit};

/// Settings shared read-only by every task of one scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub dataset_schema: SchemaRef,
    /// Output columns, a subset of the dataset schema in projection order.
    pub projected_schema: SchemaRef,
    /// Row filter bound to the dataset schema.
    pub filter: Expr,
    pub batch_size: usize,
    pub use_threads: bool,
    pub fragment_readahead: usize,
    pub batch_readahead: usize,
}

impl ScanOptions {
    /// Full projection, no filter, defaults from [`DatasetConfig`].
    pub fn new(dataset_schema: SchemaRef) -> Self {
        let config = DatasetConfig::default();
        Self {
            projected_schema: Arc::clone(&dataset_schema),
            dataset_schema,
            filter: lit(true),
            batch_size: config.batch_size_rows,
            use_threads: config.use_threads,
            fragment_readahead: config.fragment_readahead,
            batch_readahead: config.batch_readahead,
        }
    }

    pub fn projection(&self) -> Vec<String> {
        self.projected_schema
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// Dataset fields needed to project and filter, in dataset schema order.
    pub fn materialized_schema(&self) -> SchemaRef {
        let filter_fields = self.filter.referenced_fields();
        let fields = self
            .dataset_schema
            .fields()
            .iter()
            .filter(|f| {
                self.projected_schema.field_with_name(f.name()).is_ok()
                    || filter_fields.iter().any(|n| n == f.name())
            })
            .cloned()
            .collect::<Vec<_>>();
        Arc::new(Schema::new(fields))
    }
}

/// Schema of `names` picked from `schema`, rejecting unknown names.
pub(crate) fn project_schema(schema: &Schema, names: &[String]) -> Result<SchemaRef> {
    let fields = names
        .iter()
        .map(|n| {
            schema.field_with_name(n).cloned().map_err(|_| {
                DatasetError::InvalidConfig(format!("projected field '{n}' is not in the dataset schema"))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Arc::new(Schema::new(fields)))
}
