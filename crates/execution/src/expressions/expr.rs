use std::fmt;

use arrow_schema::{DataType, Schema};
use fdset_common::{DatasetError, Result};

use super::scalar::ScalarValue;

/// Comparison operators supported by predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    /// Operator with the same meaning once the operands are swapped.
    pub fn flip(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::NotEq => CompareOp::NotEq,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::LtEq => CompareOp::GtEq,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::GtEq => CompareOp::LtEq,
        }
    }

    /// Operator that is true exactly when this one is false (for non-null inputs).
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::NotEq,
            CompareOp::NotEq => CompareOp::Eq,
            CompareOp::Lt => CompareOp::GtEq,
            CompareOp::LtEq => CompareOp::Gt,
            CompareOp::Gt => CompareOp::LtEq,
            CompareOp::GtEq => CompareOp::Lt,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

/// Boolean predicate tree over named columns.
///
/// Unbound expressions may compare columns against literals of any type;
/// [`Expr::bind`] resolves columns against a schema and casts literals so
/// both sides of every comparison share a type.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Literal(ScalarValue),
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
}

pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(name.into())
}

pub fn lit(value: impl Into<ScalarValue>) -> Expr {
    Expr::Literal(value.into())
}

/// Folds `exprs` with `And`; an empty list is the literal `true`.
pub fn conjunction(exprs: Vec<Expr>) -> Expr {
    let mut it = exprs.into_iter();
    match it.next() {
        None => lit(true),
        Some(first) => it.fold(first, Expr::and),
    }
}

impl Expr {
    fn compare(self, op: CompareOp, other: Expr) -> Expr {
        Expr::Compare {
            left: Box::new(self),
            op,
            right: Box::new(other),
        }
    }

    pub fn eq(self, other: Expr) -> Expr {
        self.compare(CompareOp::Eq, other)
    }

    pub fn not_eq(self, other: Expr) -> Expr {
        self.compare(CompareOp::NotEq, other)
    }

    pub fn lt(self, other: Expr) -> Expr {
        self.compare(CompareOp::Lt, other)
    }

    pub fn lt_eq(self, other: Expr) -> Expr {
        self.compare(CompareOp::LtEq, other)
    }

    pub fn gt(self, other: Expr) -> Expr {
        self.compare(CompareOp::Gt, other)
    }

    pub fn gt_eq(self, other: Expr) -> Expr {
        self.compare(CompareOp::GtEq, other)
    }

    /// `self AND other`, dropping literal `true` operands.
    pub fn and(self, other: Expr) -> Expr {
        if self.is_literal_true() {
            return other;
        }
        if other.is_literal_true() {
            return self;
        }
        Expr::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull(Box::new(self))
    }

    pub fn is_literal_true(&self) -> bool {
        matches!(self, Expr::Literal(ScalarValue::Boolean(true)))
    }

    /// Top-level `And` operands, flattened; literal `true` contributes nothing.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        let mut out = Vec::new();
        collect_conjuncts(self, &mut out);
        out
    }

    /// Column names in first-reference order, without duplicates.
    pub fn referenced_fields(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_columns(self, &mut out);
        out
    }

    /// Resolves columns against `schema` and casts literals to the type of the
    /// column they are compared with. The result must be boolean.
    pub fn bind(&self, schema: &Schema) -> Result<Expr> {
        let bound = bind_expr(self, schema)?;
        match output_type(&bound, schema)? {
            DataType::Boolean | DataType::Null => Ok(bound),
            other => Err(DatasetError::Expression(format!(
                "predicate {bound} has non-boolean type {other:?}"
            ))),
        }
    }

    /// Output type of a bound expression.
    pub fn data_type(&self, schema: &Schema) -> Result<DataType> {
        output_type(self, schema)
    }
}

fn collect_conjuncts<'a>(e: &'a Expr, out: &mut Vec<&'a Expr>) {
    match e {
        Expr::And(a, b) => {
            collect_conjuncts(a, out);
            collect_conjuncts(b, out);
        }
        e if e.is_literal_true() => {}
        e => out.push(e),
    }
}

fn collect_columns(e: &Expr, out: &mut Vec<String>) {
    match e {
        Expr::Column(name) => {
            if !out.iter().any(|n| n == name) {
                out.push(name.clone());
            }
        }
        Expr::Literal(_) => {}
        Expr::Compare { left, right, .. } => {
            collect_columns(left, out);
            collect_columns(right, out);
        }
        Expr::And(a, b) | Expr::Or(a, b) => {
            collect_columns(a, out);
            collect_columns(b, out);
        }
        Expr::Not(e) | Expr::IsNull(e) => collect_columns(e, out),
    }
}

fn field_type(schema: &Schema, name: &str) -> Result<DataType> {
    schema
        .field_with_name(name)
        .map(|f| f.data_type().clone())
        .map_err(|_| DatasetError::Expression(format!("unknown column '{name}' in predicate")))
}

fn output_type(e: &Expr, schema: &Schema) -> Result<DataType> {
    match e {
        Expr::Column(name) => field_type(schema, name),
        Expr::Literal(v) => Ok(v.data_type()),
        Expr::Compare { .. }
        | Expr::And(..)
        | Expr::Or(..)
        | Expr::Not(_)
        | Expr::IsNull(_) => Ok(DataType::Boolean),
    }
}

fn bind_boolean(e: &Expr, schema: &Schema) -> Result<Expr> {
    let bound = bind_expr(e, schema)?;
    match output_type(&bound, schema)? {
        DataType::Boolean | DataType::Null => Ok(bound),
        other => Err(DatasetError::Expression(format!(
            "boolean operand expected, got {bound} of type {other:?}"
        ))),
    }
}

fn bind_expr(e: &Expr, schema: &Schema) -> Result<Expr> {
    match e {
        Expr::Column(name) => {
            field_type(schema, name)?;
            Ok(e.clone())
        }
        Expr::Literal(_) => Ok(e.clone()),
        Expr::Compare { left, op, right } => {
            let l = bind_expr(left, schema)?;
            let r = bind_expr(right, schema)?;
            let lt = output_type(&l, schema)?;
            let rt = output_type(&r, schema)?;
            let (l, r) = if lt == rt || lt == DataType::Null || rt == DataType::Null {
                (l, r)
            } else {
                match (&l, &r) {
                    (_, Expr::Literal(v)) => (l.clone(), Expr::Literal(bind_literal(v, &lt)?)),
                    (Expr::Literal(v), _) => (Expr::Literal(bind_literal(v, &rt)?), r.clone()),
                    _ => {
                        return Err(DatasetError::Expression(format!(
                            "cannot compare {l} ({lt:?}) with {r} ({rt:?})"
                        )));
                    }
                }
            };
            Ok(Expr::Compare {
                left: Box::new(l),
                op: *op,
                right: Box::new(r),
            })
        }
        Expr::And(a, b) => Ok(Expr::And(
            Box::new(bind_boolean(a, schema)?),
            Box::new(bind_boolean(b, schema)?),
        )),
        Expr::Or(a, b) => Ok(Expr::Or(
            Box::new(bind_boolean(a, schema)?),
            Box::new(bind_boolean(b, schema)?),
        )),
        Expr::Not(a) => Ok(Expr::Not(Box::new(bind_boolean(a, schema)?))),
        Expr::IsNull(a) => Ok(Expr::IsNull(Box::new(bind_expr(a, schema)?))),
    }
}

/// Casts `v` to the column type `to` when that loses nothing. A numeric
/// literal that would be truncated or overflow is instead widened to the
/// common numeric type, and evaluation compares both sides in that type.
fn bind_literal(v: &ScalarValue, to: &DataType) -> Result<ScalarValue> {
    let from = v.data_type();
    if !(is_numeric(&from) && is_numeric(to)) {
        return v
            .cast_to(to)
            .map_err(|e| DatasetError::Expression(format!("cannot bind literal {v}: {e}")));
    }
    if let Ok(narrowed) = v.cast_to(to) {
        if narrowed.cast_to(&from).is_ok_and(|back| &back == v) {
            return Ok(narrowed);
        }
    }
    let wide = common_numeric_type(&from, to);
    v.cast_to(&wide)
        .map_err(|e| DatasetError::Expression(format!("cannot bind literal {v}: {e}")))
}

pub(crate) fn is_numeric(dt: &DataType) -> bool {
    is_integer(dt) || matches!(dt, DataType::Float32 | DataType::Float64)
}

fn is_integer(dt: &DataType) -> bool {
    matches!(
        dt,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

/// Type both sides of a mixed numeric comparison are evaluated in.
pub(crate) fn common_numeric_type(a: &DataType, b: &DataType) -> DataType {
    let fits_i64 = |dt: &DataType| is_integer(dt) && dt != &DataType::UInt64;
    if fits_i64(a) && fits_i64(b) {
        DataType::Int64
    } else {
        DataType::Float64
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => f.write_str(name),
            Expr::Literal(ScalarValue::Utf8(s)) => write!(f, "\"{s}\""),
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Compare { left, op, right } => write!(f, "({left} {} {right})", op.symbol()),
            Expr::And(a, b) => write!(f, "({a} and {b})"),
            Expr::Or(a, b) => write!(f, "({a} or {b})"),
            Expr::Not(a) => write!(f, "not {a}"),
            Expr::IsNull(a) => write!(f, "is_null({a})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use arrow_schema::{DataType, Field, Schema};

    use super::{Expr, col, conjunction, lit};
    use crate::expressions::ScalarValue;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("year", DataType::Int32, true),
            Field::new("country", DataType::Utf8, true),
            Field::new("sales", DataType::Float64, true),
        ])
    }

    #[test]
    fn bind_casts_literals_to_column_type() {
        let e = col("year").eq(lit(2018_i64)).and(lit("US").eq(col("country")));
        let bound = e.bind(&schema()).expect("bind");
        let lits = bound
            .conjuncts()
            .into_iter()
            .map(|c| match c {
                Expr::Compare { left, right, .. } => match (left.as_ref(), right.as_ref()) {
                    (_, Expr::Literal(v)) | (Expr::Literal(v), _) => v.clone(),
                    _ => panic!("expected literal"),
                },
                _ => panic!("expected comparison"),
            })
            .collect::<Vec<_>>();
        assert_eq!(
            lits,
            vec![ScalarValue::Int32(2018), ScalarValue::Utf8("US".to_string())]
        );
    }

    #[test]
    fn bind_widens_literals_that_would_be_truncated() {
        let literal = |e: Expr| match e {
            Expr::Compare { right, .. } => match *right {
                Expr::Literal(v) => v,
                other => panic!("expected literal, got {other}"),
            },
            other => panic!("expected comparison, got {other}"),
        };
        let s = schema();
        assert_eq!(
            literal(col("year").lt(lit(2018.5_f64)).bind(&s).expect("bind")),
            ScalarValue::Float64(2018.5)
        );
        assert_eq!(
            literal(col("year").lt(lit(2018.0_f64)).bind(&s).expect("bind")),
            ScalarValue::Int32(2018)
        );
        assert_eq!(
            literal(col("year").gt(lit(5_000_000_000_i64)).bind(&s).expect("bind")),
            ScalarValue::Int64(5_000_000_000)
        );
    }

    #[test]
    fn bind_rejects_unknown_columns_and_bad_literals() {
        assert!(col("month").eq(lit(1)).bind(&schema()).is_err());
        assert!(col("year").eq(lit("abc")).bind(&schema()).is_err());
        assert!(col("sales").bind(&schema()).is_err());
        assert!(col("sales").and(lit(true)).bind(&schema()).is_err());
    }

    #[test]
    fn conjunction_helpers() {
        assert!(conjunction(vec![]).is_literal_true());
        let e = conjunction(vec![
            col("a").eq(lit(1)),
            lit(true),
            col("b").eq(lit(2)).and(col("a").gt(lit(0))),
        ]);
        assert_eq!(e.conjuncts().len(), 3);
        assert_eq!(e.referenced_fields(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            col("a").eq(lit("x")).to_string(),
            "(a == \"x\")".to_string()
        );
    }
}
