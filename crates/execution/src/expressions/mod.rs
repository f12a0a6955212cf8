//! Predicate expressions: construction, binding, evaluation and reasoning.
//!
//! Input contract:
//! - [`Expr`] trees are built with [`col`]/[`lit`] and the comparison helpers;
//! - [`Expr::bind`] against the dataset schema before evaluating or reasoning.
//!
//! Output contract:
//! - each evaluation returns an `ArrayRef` aligned to input batch row count;
//! - [`is_satisfiable`] and [`implies`] err on the side of "possibly true".

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray};
use arrow::compute::kernels::{
    boolean::{and_kleene, not, or_kleene},
    cast::cast,
    cmp::{eq, gt, gt_eq, lt, lt_eq, neq},
};
use arrow::compute::{filter_record_batch, is_null};
use arrow::record_batch::RecordBatch;
use arrow_schema::{ArrowError, DataType, SchemaRef};
use fdset_common::{DatasetError, Result};

mod expr;
mod satisfiability;
mod scalar;

use expr::{common_numeric_type, is_numeric};
pub use expr::{CompareOp, Expr, col, conjunction, lit};
pub use satisfiability::{implies, is_satisfiable, known_field_values};
pub use scalar::ScalarValue;

/// Executable form of an [`Expr`] bound to one input schema.
pub trait PhysicalExpr: Send + Sync {
    /// Static output data type of this expression.
    fn data_type(&self) -> DataType;
    /// Evaluate the expression for every row in `batch`.
    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef>;
}

/// Compile a predicate into a runnable expression over `input_schema`.
pub fn compile_expr(expr: &Expr, input_schema: &SchemaRef) -> Result<Arc<dyn PhysicalExpr>> {
    match expr {
        Expr::Column(name) => {
            let idx = input_schema.index_of(name).map_err(|_| {
                DatasetError::Expression(format!("unknown column in evaluation: {name}"))
            })?;
            let dt = input_schema.field(idx).data_type().clone();
            Ok(Arc::new(ColumnExpr { index: idx, dt }))
        }

        Expr::Literal(v) => Ok(Arc::new(LiteralExpr { v: v.clone() })),

        Expr::Compare { left, op, right } => {
            let left = compile_expr(left, input_schema)?;
            let right = compile_expr(right, input_schema)?;
            Ok(Arc::new(CompareExpr {
                left,
                right,
                op: *op,
            }))
        }

        Expr::Not(e) => {
            let inner = compile_expr(e, input_schema)?;
            Ok(Arc::new(NotExpr { inner }))
        }

        Expr::IsNull(e) => {
            let inner = compile_expr(e, input_schema)?;
            Ok(Arc::new(IsNullExpr { inner }))
        }

        Expr::And(a, b) => {
            let left = compile_expr(a, input_schema)?;
            let right = compile_expr(b, input_schema)?;
            Ok(Arc::new(BoolBinaryExpr {
                left,
                right,
                op: BoolOp::And,
            }))
        }

        Expr::Or(a, b) => {
            let left = compile_expr(a, input_schema)?;
            let right = compile_expr(b, input_schema)?;
            Ok(Arc::new(BoolBinaryExpr {
                left,
                right,
                op: BoolOp::Or,
            }))
        }
    }
}

/// Keeps the rows of `batch` for which `predicate` is true; null counts as false.
pub fn filter_batch(predicate: &dyn PhysicalExpr, batch: &RecordBatch) -> Result<RecordBatch> {
    let mask = predicate.evaluate(batch)?;
    let mask = as_boolean(&mask, "filter")?;
    filter_record_batch(batch, &mask)
        .map_err(|e| DatasetError::Expression(format!("filter failed: {e}")))
}

struct ColumnExpr {
    index: usize,
    dt: DataType,
}

impl PhysicalExpr for ColumnExpr {
    fn data_type(&self) -> DataType {
        self.dt.clone()
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        Ok(batch.column(self.index).clone())
    }
}

struct LiteralExpr {
    v: ScalarValue,
}

impl PhysicalExpr for LiteralExpr {
    fn data_type(&self) -> DataType {
        self.v.data_type()
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        Ok(self.v.to_array(batch.num_rows()))
    }
}

struct NotExpr {
    inner: Arc<dyn PhysicalExpr>,
}

impl PhysicalExpr for NotExpr {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let arr = self.inner.evaluate(batch)?;
        let b = as_boolean(&arr, "NOT")?;
        let out = not(&b).map_err(|e| DatasetError::Expression(format!("not failed: {e}")))?;
        Ok(Arc::new(out))
    }
}

struct IsNullExpr {
    inner: Arc<dyn PhysicalExpr>,
}

impl PhysicalExpr for IsNullExpr {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let arr = self.inner.evaluate(batch)?;
        let out = is_null(arr.as_ref())
            .map_err(|e| DatasetError::Expression(format!("is_null failed: {e}")))?;
        Ok(Arc::new(out))
    }
}

#[derive(Clone, Copy)]
enum BoolOp {
    And,
    Or,
}

struct BoolBinaryExpr {
    left: Arc<dyn PhysicalExpr>,
    right: Arc<dyn PhysicalExpr>,
    op: BoolOp,
}

impl PhysicalExpr for BoolBinaryExpr {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let l = self.left.evaluate(batch)?;
        let r = self.right.evaluate(batch)?;
        let lb = as_boolean(&l, "AND/OR")?;
        let rb = as_boolean(&r, "AND/OR")?;

        let out = match self.op {
            BoolOp::And => and_kleene(&lb, &rb),
            BoolOp::Or => or_kleene(&lb, &rb),
        }
        .map_err(|e| DatasetError::Expression(format!("boolean kernel failed: {e}")))?;

        Ok(Arc::new(out))
    }
}

struct CompareExpr {
    left: Arc<dyn PhysicalExpr>,
    right: Arc<dyn PhysicalExpr>,
    op: CompareOp,
}

impl PhysicalExpr for CompareExpr {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let l = self.left.evaluate(batch)?;
        let r = self.right.evaluate(batch)?;
        let (l, r) = coerce_pair(l, r)?;

        let res = match self.op {
            CompareOp::Eq => eq(&l, &r),
            CompareOp::NotEq => neq(&l, &r),
            CompareOp::Lt => lt(&l, &r),
            CompareOp::LtEq => lt_eq(&l, &r),
            CompareOp::Gt => gt(&l, &r),
            CompareOp::GtEq => gt_eq(&l, &r),
        }
        .map_err(|e| DatasetError::Expression(format!("cmp kernel failed: {e}")))?;
        Ok(Arc::new(res))
    }
}

// ------------------ helpers ------------------

fn as_boolean(arr: &ArrayRef, what: &str) -> Result<BooleanArray> {
    if arr.data_type() == &DataType::Null {
        return Ok(BooleanArray::new_null(arr.len()));
    }
    arr.as_any()
        .downcast_ref::<BooleanArray>()
        .cloned()
        .ok_or_else(|| DatasetError::Expression(format!("{what} expects boolean")))
}

/// Casts a null-typed side to the other side's type. Mixed numeric sides
/// are both cast to their common type; otherwise the right side follows the
/// left.
fn coerce_pair(l: ArrayRef, r: ArrayRef) -> Result<(ArrayRef, ArrayRef)> {
    if l.data_type() == r.data_type() {
        return Ok((l, r));
    }
    let fail = |e: ArrowError| DatasetError::Expression(format!("cmp cast failed: {e}"));
    if l.data_type() == &DataType::Null {
        let l = cast(&l, r.data_type()).map_err(fail)?;
        return Ok((l, r));
    }
    if is_numeric(l.data_type()) && is_numeric(r.data_type()) {
        let wide = common_numeric_type(l.data_type(), r.data_type());
        let l = cast(&l, &wide).map_err(fail)?;
        let r = cast(&r, &wide).map_err(fail)?;
        return Ok((l, r));
    }
    let r = cast(&r, l.data_type()).map_err(fail)?;
    Ok((l, r))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Array, BooleanArray, Int32Array, StringArray};
    use arrow::record_batch::RecordBatch;
    use arrow_schema::{DataType, Field, Schema};

    use super::{col, compile_expr, filter_batch, lit};

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("year", DataType::Int32, true),
            Field::new("country", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(vec![Some(2018), Some(2019), None, Some(2018)])),
                Arc::new(StringArray::from(vec![
                    Some("US"),
                    Some("CA"),
                    Some("US"),
                    None,
                ])),
            ],
        )
        .expect("batch")
    }

    #[test]
    fn evaluates_comparisons_with_kleene_logic() {
        let b = batch();
        let e = col("year")
            .eq(lit(2018))
            .and(col("country").eq(lit("US")))
            .bind(b.schema_ref())
            .expect("bind");
        let compiled = compile_expr(&e, b.schema_ref()).expect("compile");
        let out = compiled.evaluate(&b).expect("evaluate");
        let out = out.as_any().downcast_ref::<BooleanArray>().expect("bool");
        assert!(out.value(0));
        assert!(!out.value(1));
        assert!(out.is_null(2));
        assert!(out.is_null(3));
    }

    #[test]
    fn filter_drops_false_and_null_rows() {
        let b = batch();
        let e = col("year")
            .gt_eq(lit(2018_i64))
            .and(col("country").is_null().not())
            .bind(b.schema_ref())
            .expect("bind");
        let compiled = compile_expr(&e, b.schema_ref()).expect("compile");
        let out = filter_batch(compiled.as_ref(), &b).expect("filter");
        assert_eq!(out.num_rows(), 2);
    }

    #[test]
    fn unknown_columns_fail_to_compile() {
        let b = batch();
        assert!(compile_expr(&col("month").eq(lit(1)), b.schema_ref()).is_err());
    }
}
