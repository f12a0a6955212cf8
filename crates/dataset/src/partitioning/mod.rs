//! Mapping between directory segments and partition predicates.
//!
//! A [`Partitioning`] parses the directory segments of a file into a
//! conjunction of `field == value` terms and formats such a conjunction back
//! into segments. Partitioning factories infer the partition schema from the
//! segments seen during discovery.

use std::fmt::Debug;
use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, SchemaRef};
use fdset_common::{DatasetError, Result};
use fdset_execution::{Expr, ScalarValue, col};

mod directory;
mod hive;

pub use directory::{DirectoryPartitioning, DirectoryPartitioningFactory};
pub use hive::{DEFAULT_HIVE_NULL_FALLBACK, HivePartitioning, HivePartitioningFactory};

/// What to do with a segment whose value does not parse as its field's type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseMode {
    /// Treat the segment as unmatched.
    #[default]
    Lenient,
    /// Fail with `PartitionParse`.
    Strict,
}

pub trait Partitioning: Send + Sync + Debug {
    fn type_name(&self) -> &'static str;

    /// Partition fields, in path order for positional schemes.
    fn schema(&self) -> &SchemaRef;

    /// Conjunction of one equality per recognised segment; `true` when none match.
    fn parse(&self, segments: &[String]) -> Result<Expr>;

    /// Segments encoding the partition fields pinned by `expr`. Conjuncts on
    /// other fields are ignored.
    fn format(&self, expr: &Expr) -> Result<Vec<String>>;
}

pub type PartitioningRef = Arc<dyn Partitioning>;

/// Infers a partitioning from the directory segments of discovered files.
pub trait PartitioningFactory: Send + Sync + Debug {
    fn type_name(&self) -> &'static str;

    /// Partition schema implied by `segments` (one entry per file).
    fn inspect(&self, segments: &[Vec<String>]) -> Result<SchemaRef>;

    /// Builds the partitioning for `schema`, usually the inspected schema
    /// with types reconciled against the dataset schema.
    fn finish(&self, schema: &SchemaRef) -> Result<PartitioningRef>;
}

/// Discovery accepts either a ready partitioning or a factory.
#[derive(Debug, Clone)]
pub enum PartitioningOrFactory {
    Partitioning(PartitioningRef),
    Factory(Arc<dyn PartitioningFactory>),
}

impl Default for PartitioningOrFactory {
    fn default() -> Self {
        PartitioningOrFactory::Partitioning(Arc::new(DirectoryPartitioning::new(Arc::new(
            Schema::empty(),
        ))))
    }
}

impl From<PartitioningRef> for PartitioningOrFactory {
    fn from(p: PartitioningRef) -> Self {
        PartitioningOrFactory::Partitioning(p)
    }
}

impl From<Arc<dyn PartitioningFactory>> for PartitioningOrFactory {
    fn from(f: Arc<dyn PartitioningFactory>) -> Self {
        PartitioningOrFactory::Factory(f)
    }
}

pub(crate) fn escape(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

pub(crate) fn unescape(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

/// `field == value` for a segment, or `None` when lenient parsing rejects it.
pub(crate) fn equality_for(field: &Field, raw: &str, mode: ParseMode) -> Result<Option<Expr>> {
    match ScalarValue::parse_as(raw, field.data_type()) {
        Ok(v) => Ok(Some(col(field.name().as_str()).eq(Expr::Literal(v)))),
        Err(e) => match mode {
            ParseMode::Lenient => Ok(None),
            ParseMode::Strict => Err(DatasetError::PartitionParse(format!(
                "segment '{raw}' for field '{}': {e}",
                field.name()
            ))),
        },
    }
}

/// `Int32` when every observed value parses as one, otherwise `Utf8`.
pub(crate) fn infer_type<'a>(values: impl IntoIterator<Item = &'a str>) -> DataType {
    let mut any = false;
    for v in values {
        any = true;
        if v.parse::<i32>().is_err() {
            return DataType::Utf8;
        }
    }
    if any { DataType::Int32 } else { DataType::Utf8 }
}

/// `schema` with each field's type taken from `reference` when it declares
/// a field of the same name.
pub fn reconcile_partition_schema(schema: &SchemaRef, reference: &Schema) -> SchemaRef {
    let fields = schema
        .fields()
        .iter()
        .map(|f| match reference.field_with_name(f.name()) {
            Ok(r) => Field::new(f.name(), r.data_type().clone(), true),
            Err(_) => f.as_ref().clone(),
        })
        .collect::<Vec<_>>();
    Arc::new(Schema::new(fields))
}
