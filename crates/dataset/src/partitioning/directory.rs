use std::sync::Arc;

use arrow_schema::{Field, Schema, SchemaRef};
use fdset_common::{DatasetError, Result};
use fdset_execution::{Expr, conjunction, known_field_values};

use super::{
    ParseMode, Partitioning, PartitioningFactory, PartitioningRef, equality_for, escape,
    infer_type, unescape,
};

/// Segment *i* holds the value of field *i*; extra segments are ignored.
#[derive(Debug, Clone)]
pub struct DirectoryPartitioning {
    schema: SchemaRef,
    mode: ParseMode,
}

impl DirectoryPartitioning {
    pub fn new(schema: SchemaRef) -> Self {
        Self {
            schema,
            mode: ParseMode::default(),
        }
    }

    pub fn with_parse_mode(mut self, mode: ParseMode) -> Self {
        self.mode = mode;
        self
    }

    /// Factory inferring the types of the named fields from observed segments.
    pub fn discover(field_names: Vec<String>) -> Arc<dyn PartitioningFactory> {
        Arc::new(DirectoryPartitioningFactory { field_names })
    }
}

impl Partitioning for DirectoryPartitioning {
    fn type_name(&self) -> &'static str {
        "directory"
    }

    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn parse(&self, segments: &[String]) -> Result<Expr> {
        let mut terms = Vec::new();
        for (field, segment) in self.schema.fields().iter().zip(segments) {
            if let Some(term) = equality_for(field, &unescape(segment), self.mode)? {
                terms.push(term);
            }
        }
        Ok(conjunction(terms))
    }

    fn format(&self, expr: &Expr) -> Result<Vec<String>> {
        let known = known_field_values(expr);
        let mut segments = Vec::new();
        let mut gap: Option<&str> = None;
        for field in self.schema.fields() {
            match known.get(field.name()) {
                None => {
                    gap.get_or_insert(field.name().as_str());
                }
                Some(value) => {
                    if let Some(missing) = gap {
                        return Err(DatasetError::Write(format!(
                            "directory partitioning needs '{missing}' before '{}'",
                            field.name()
                        )));
                    }
                    if value.is_null() {
                        return Err(DatasetError::Write(format!(
                            "directory partitioning cannot encode a null '{}'",
                            field.name()
                        )));
                    }
                    let segment = escape(&value.to_string());
                    if segment.is_empty() {
                        // An empty path segment collapses and shifts later fields.
                        return Err(DatasetError::Write(format!(
                            "directory partitioning cannot encode an empty '{}'",
                            field.name()
                        )));
                    }
                    segments.push(segment);
                }
            }
        }
        Ok(segments)
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryPartitioningFactory {
    field_names: Vec<String>,
}

impl PartitioningFactory for DirectoryPartitioningFactory {
    fn type_name(&self) -> &'static str {
        "directory"
    }

    fn inspect(&self, segments: &[Vec<String>]) -> Result<SchemaRef> {
        let fields = self
            .field_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let decoded = segments
                    .iter()
                    .filter_map(|s| s.get(i).map(|v| unescape(v)))
                    .collect::<Vec<_>>();
                Field::new(name, infer_type(decoded.iter().map(String::as_str)), true)
            })
            .collect::<Vec<_>>();
        Ok(Arc::new(Schema::new(fields)))
    }

    fn finish(&self, schema: &SchemaRef) -> Result<PartitioningRef> {
        Ok(Arc::new(DirectoryPartitioning::new(Arc::clone(schema))))
    }
}
