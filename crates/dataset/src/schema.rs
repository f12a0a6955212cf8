use std::sync::Arc;

use arrow_schema::{Field, Schema, SchemaRef};
use fdset_common::{DatasetError, Result};

/// Union of `schemas` by field name, in first-seen order.
///
/// A name declared with two different types is a `SchemaConflict`. A field
/// is nullable when any input declares it nullable. Schema and field
/// metadata are dropped.
pub fn unify_schemas(schemas: &[SchemaRef]) -> Result<SchemaRef> {
    let mut fields: Vec<Field> = Vec::new();
    for schema in schemas {
        for field in schema.fields() {
            match fields.iter_mut().find(|f| f.name() == field.name()) {
                Some(existing) => {
                    if existing.data_type() != field.data_type() {
                        return Err(DatasetError::SchemaConflict(format!(
                            "field '{}' is {} in one fragment and {} in another",
                            field.name(),
                            existing.data_type(),
                            field.data_type()
                        )));
                    }
                    if field.is_nullable() {
                        *existing = existing.clone().with_nullable(true);
                    }
                }
                None => fields.push(Field::new(
                    field.name(),
                    field.data_type().clone(),
                    field.is_nullable(),
                )),
            }
        }
    }
    Ok(Arc::new(Schema::new(fields)))
}
