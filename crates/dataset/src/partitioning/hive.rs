use std::sync::Arc;

use arrow_schema::{Field, Schema, SchemaRef};
use fdset_common::Result;
use fdset_execution::{Expr, col, conjunction, known_field_values};

use super::{
    ParseMode, Partitioning, PartitioningFactory, PartitioningRef, equality_for, escape,
    infer_type, unescape,
};

/// Segment value standing for a null partition value.
pub const DEFAULT_HIVE_NULL_FALLBACK: &str = "__HIVE_DEFAULT_PARTITION__";

/// `key=value` segments matched by name; order does not matter and missing
/// keys are tolerated.
#[derive(Debug, Clone)]
pub struct HivePartitioning {
    schema: SchemaRef,
    mode: ParseMode,
    null_fallback: String,
}

impl HivePartitioning {
    pub fn new(schema: SchemaRef) -> Self {
        Self {
            schema,
            mode: ParseMode::default(),
            null_fallback: DEFAULT_HIVE_NULL_FALLBACK.to_string(),
        }
    }

    pub fn with_parse_mode(mut self, mode: ParseMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_null_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.null_fallback = fallback.into();
        self
    }

    pub fn null_fallback(&self) -> &str {
        &self.null_fallback
    }

    /// Factory collecting keys in first-seen order and inferring their types.
    pub fn discover() -> Arc<dyn PartitioningFactory> {
        Arc::new(HivePartitioningFactory {
            null_fallback: DEFAULT_HIVE_NULL_FALLBACK.to_string(),
        })
    }
}

fn split_key_value(segment: &str) -> Option<(String, String)> {
    let (k, v) = segment.split_once('=')?;
    Some((unescape(k), unescape(v)))
}

impl Partitioning for HivePartitioning {
    fn type_name(&self) -> &'static str {
        "hive"
    }

    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn parse(&self, segments: &[String]) -> Result<Expr> {
        let mut terms = Vec::new();
        for segment in segments {
            let Some((key, value)) = split_key_value(segment) else {
                continue;
            };
            let Ok(field) = self.schema.field_with_name(&key) else {
                continue;
            };
            if value == self.null_fallback {
                terms.push(col(key).is_null());
                continue;
            }
            if let Some(term) = equality_for(field, &value, self.mode)? {
                terms.push(term);
            }
        }
        Ok(conjunction(terms))
    }

    fn format(&self, expr: &Expr) -> Result<Vec<String>> {
        let known = known_field_values(expr);
        let segments = self
            .schema
            .fields()
            .iter()
            .filter_map(|field| {
                known.get(field.name()).map(|value| {
                    let rendered = if value.is_null() {
                        self.null_fallback.clone()
                    } else {
                        escape(&value.to_string())
                    };
                    format!("{}={rendered}", escape(field.name()))
                })
            })
            .collect();
        Ok(segments)
    }
}

#[derive(Debug, Clone)]
pub struct HivePartitioningFactory {
    null_fallback: String,
}

impl PartitioningFactory for HivePartitioningFactory {
    fn type_name(&self) -> &'static str {
        "hive"
    }

    fn inspect(&self, segments: &[Vec<String>]) -> Result<SchemaRef> {
        let mut keys: Vec<(String, Vec<String>)> = Vec::new();
        for (key, value) in segments.iter().flatten().filter_map(|s| split_key_value(s)) {
            let slot = match keys.iter().position(|(k, _)| *k == key) {
                Some(i) => i,
                None => {
                    keys.push((key, Vec::new()));
                    keys.len() - 1
                }
            };
            if value != self.null_fallback {
                keys[slot].1.push(value);
            }
        }
        let fields = keys
            .iter()
            .map(|(k, values)| Field::new(k, infer_type(values.iter().map(String::as_str)), true))
            .collect::<Vec<_>>();
        Ok(Arc::new(Schema::new(fields)))
    }

    fn finish(&self, schema: &SchemaRef) -> Result<PartitioningRef> {
        Ok(Arc::new(
            HivePartitioning::new(Arc::clone(schema)).with_null_fallback(&self.null_fallback),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_schema::{DataType, Field, Schema};
    use fdset_execution::{ScalarValue, col, conjunction, known_field_values, lit};

    use super::{DEFAULT_HIVE_NULL_FALLBACK, HivePartitioning};
    use crate::partitioning::{Partitioning, PartitioningFactory};

    fn segs(s: &[&str]) -> Vec<String> {
        s.iter().map(|x| x.to_string()).collect()
    }

    fn year_month() -> HivePartitioning {
        HivePartitioning::new(Arc::new(Schema::new(vec![
            Field::new("year", DataType::Int32, true),
            Field::new("month", DataType::Int32, true),
        ])))
    }

    #[test]
    fn parse_matches_by_name_in_any_order() {
        let e = year_month()
            .parse(&segs(&["month=01", "other=x", "year=2018", "plain"]))
            .expect("parse");
        let known = known_field_values(&e);
        assert_eq!(known.len(), 2);
        assert_eq!(known["year"], ScalarValue::Int32(2018));
        assert_eq!(known["month"], ScalarValue::Int32(1));
    }

    #[test]
    fn null_fallback_round_trips() {
        let p = year_month();
        let segments = p
            .format(&col("year").is_null().and(col("month").eq(lit(2))))
            .expect("format");
        assert_eq!(
            segments,
            vec![format!("year={DEFAULT_HIVE_NULL_FALLBACK}"), "month=2".to_string()]
        );
        let known = known_field_values(&p.parse(&segments).expect("parse"));
        assert_eq!(known["year"], ScalarValue::Null);
        assert_eq!(known["month"], ScalarValue::Int32(2));
    }

    #[test]
    fn format_skips_missing_keys() {
        let e = conjunction(vec![col("month").eq(lit(3)), col("country").eq(lit("US"))]);
        assert_eq!(
            year_month().format(&e).expect("format"),
            segs(&["month=3"])
        );
    }

    #[test]
    fn discovery_infers_types_in_first_seen_order() {
        let factory = HivePartitioning::discover();
        let schema = factory
            .inspect(&[
                segs(&["year=2018", "country=US"]),
                segs(&["year=2019", "country=CA", "month=__HIVE_DEFAULT_PARTITION__"]),
            ])
            .expect("inspect");
        let names = schema
            .fields()
            .iter()
            .map(|f| (f.name().as_str(), f.data_type().clone()))
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                ("year", DataType::Int32),
                ("country", DataType::Utf8),
                ("month", DataType::Utf8),
            ]
        );
        let p = factory.finish(&schema).expect("finish");
        assert_eq!(p.type_name(), "hive");
    }
}
