//! Conservative satisfiability and implication checks over bound predicates.
//!
//! Predicates are rewritten to a bounded disjunctive normal form over
//! single-column atoms. A clause is only declared impossible when its atoms
//! contradict each other on one column; anything the rewrite cannot model
//! becomes an unconstrained atom. The checks therefore never report a
//! satisfiable predicate as unsatisfiable.

use std::cmp::Ordering;
use std::collections::HashMap;

use super::expr::{CompareOp, Expr};
use super::scalar::ScalarValue;

const MAX_CLAUSES: usize = 256;

#[derive(Debug, Clone)]
enum Atom {
    Cmp {
        field: String,
        op: CompareOp,
        value: ScalarValue,
    },
    IsNull(String),
    IsValid(String),
    Unknown,
}

/// Which outcome of the expression a rewrite describes.
#[derive(Debug, Clone, Copy)]
enum Outcome {
    True,
    False,
    /// False or null.
    NotTrue,
}

type Clauses = Vec<Vec<Atom>>;

fn always() -> Clauses {
    vec![Vec::new()]
}

fn never() -> Clauses {
    Vec::new()
}

fn unknown() -> Clauses {
    vec![vec![Atom::Unknown]]
}

fn union(mut a: Clauses, b: Clauses) -> Clauses {
    a.extend(b);
    if a.len() > MAX_CLAUSES {
        return unknown();
    }
    a
}

fn cross(a: Clauses, b: Clauses) -> Clauses {
    if a.len().saturating_mul(b.len()) > MAX_CLAUSES {
        return unknown();
    }
    let mut out = Vec::with_capacity(a.len() * b.len());
    for l in &a {
        for r in &b {
            let mut c = l.clone();
            c.extend(r.iter().cloned());
            out.push(c);
        }
    }
    out
}

fn rewrite(e: &Expr, outcome: Outcome) -> Clauses {
    match e {
        Expr::Literal(ScalarValue::Boolean(b)) => match (outcome, *b) {
            (Outcome::True, true) | (Outcome::False, false) | (Outcome::NotTrue, false) => {
                always()
            }
            _ => never(),
        },
        Expr::Literal(ScalarValue::Null) => match outcome {
            Outcome::NotTrue => always(),
            _ => never(),
        },
        Expr::Column(name) => {
            let is = |v: bool| Atom::Cmp {
                field: name.clone(),
                op: CompareOp::Eq,
                value: ScalarValue::Boolean(v),
            };
            match outcome {
                Outcome::True => vec![vec![is(true)]],
                Outcome::False => vec![vec![is(false)]],
                Outcome::NotTrue => vec![vec![is(false)], vec![Atom::IsNull(name.clone())]],
            }
        }
        Expr::Compare { left, op, right } => {
            let (field, op, value) = match (left.as_ref(), right.as_ref()) {
                (Expr::Column(c), Expr::Literal(v)) => (c, *op, v),
                (Expr::Literal(v), Expr::Column(c)) => (c, op.flip(), v),
                _ => return unknown(),
            };
            if value.is_null() {
                return match outcome {
                    Outcome::NotTrue => always(),
                    _ => never(),
                };
            }
            let cmp = |op: CompareOp| Atom::Cmp {
                field: field.clone(),
                op,
                value: value.clone(),
            };
            match outcome {
                Outcome::True => vec![vec![cmp(op)]],
                Outcome::False => vec![vec![cmp(op.negate())]],
                Outcome::NotTrue => vec![
                    vec![cmp(op.negate())],
                    vec![Atom::IsNull(field.clone())],
                ],
            }
        }
        Expr::IsNull(inner) => match inner.as_ref() {
            Expr::Column(c) => match outcome {
                Outcome::True => vec![vec![Atom::IsNull(c.clone())]],
                Outcome::False | Outcome::NotTrue => vec![vec![Atom::IsValid(c.clone())]],
            },
            _ => unknown(),
        },
        Expr::And(a, b) => match outcome {
            Outcome::True => cross(rewrite(a, outcome), rewrite(b, outcome)),
            Outcome::False | Outcome::NotTrue => {
                union(rewrite(a, outcome), rewrite(b, outcome))
            }
        },
        Expr::Or(a, b) => match outcome {
            Outcome::True => union(rewrite(a, outcome), rewrite(b, outcome)),
            Outcome::False | Outcome::NotTrue => {
                cross(rewrite(a, outcome), rewrite(b, outcome))
            }
        },
        Expr::Not(inner) => match outcome {
            Outcome::True => rewrite(inner, Outcome::False),
            Outcome::False => rewrite(inner, Outcome::True),
            Outcome::NotTrue => unknown(),
        },
        Expr::Literal(_) => unknown(),
    }
}

#[derive(Default)]
struct Domain {
    eq: Vec<ScalarValue>,
    not_eq: Vec<ScalarValue>,
    lower: Option<(ScalarValue, bool)>,
    upper: Option<(ScalarValue, bool)>,
    is_null: bool,
    is_valid: bool,
}

impl Domain {
    fn tighten_lower(&mut self, v: ScalarValue, inclusive: bool) {
        let replace = match &self.lower {
            None => true,
            Some((cur, cur_inc)) => match v.partial_cmp(cur) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => *cur_inc && !inclusive,
                _ => false,
            },
        };
        if replace {
            self.lower = Some((v, inclusive));
        }
    }

    fn tighten_upper(&mut self, v: ScalarValue, inclusive: bool) {
        let replace = match &self.upper {
            None => true,
            Some((cur, cur_inc)) => match v.partial_cmp(cur) {
                Some(Ordering::Less) => true,
                Some(Ordering::Equal) => *cur_inc && !inclusive,
                _ => false,
            },
        };
        if replace {
            self.upper = Some((v, inclusive));
        }
    }

    fn add(&mut self, op: CompareOp, v: ScalarValue) {
        self.is_valid = true;
        match op {
            CompareOp::Eq => self.eq.push(v),
            CompareOp::NotEq => self.not_eq.push(v),
            CompareOp::Lt => self.tighten_upper(v, false),
            CompareOp::LtEq => self.tighten_upper(v, true),
            CompareOp::Gt => self.tighten_lower(v, false),
            CompareOp::GtEq => self.tighten_lower(v, true),
        }
    }

    fn is_empty(&self) -> bool {
        if self.is_null && self.is_valid {
            return true;
        }
        let differs = |a: &ScalarValue, b: &ScalarValue| {
            matches!(a.partial_cmp(b), Some(Ordering::Less | Ordering::Greater))
        };
        let same = |a: &ScalarValue, b: &ScalarValue| a.partial_cmp(b) == Some(Ordering::Equal);

        if let Some(first) = self.eq.first() {
            if self.eq.iter().any(|v| differs(v, first)) {
                return true;
            }
            for v in &self.eq {
                if self.not_eq.iter().any(|x| same(x, v)) {
                    return true;
                }
                if let Some((lo, inc)) = &self.lower {
                    match v.partial_cmp(lo) {
                        Some(Ordering::Less) => return true,
                        Some(Ordering::Equal) if !inc => return true,
                        _ => {}
                    }
                }
                if let Some((hi, inc)) = &self.upper {
                    match v.partial_cmp(hi) {
                        Some(Ordering::Greater) => return true,
                        Some(Ordering::Equal) if !inc => return true,
                        _ => {}
                    }
                }
            }
        }
        if let (Some((lo, lo_inc)), Some((hi, hi_inc))) = (&self.lower, &self.upper) {
            match lo.partial_cmp(hi) {
                Some(Ordering::Greater) => return true,
                Some(Ordering::Equal) => {
                    if !lo_inc || !hi_inc || self.not_eq.iter().any(|x| same(x, lo)) {
                        return true;
                    }
                }
                _ => {}
            }
        }
        false
    }
}

fn clause_satisfiable(clause: &[Atom]) -> bool {
    let mut domains: HashMap<&str, Domain> = HashMap::new();
    for atom in clause {
        match atom {
            Atom::Cmp { field, op, value } => {
                domains.entry(field.as_str()).or_default().add(*op, value.clone())
            }
            Atom::IsNull(field) => domains.entry(field.as_str()).or_default().is_null = true,
            Atom::IsValid(field) => domains.entry(field.as_str()).or_default().is_valid = true,
            Atom::Unknown => {}
        }
    }
    domains.values().all(|d| !d.is_empty())
}

fn any_satisfiable(clauses: &Clauses) -> bool {
    clauses.iter().any(|c| clause_satisfiable(c))
}

/// False only when no row can make `expr` evaluate to true.
pub fn is_satisfiable(expr: &Expr) -> bool {
    any_satisfiable(&rewrite(expr, Outcome::True))
}

/// True only when every row for which `premise` is true also makes
/// `conclusion` true.
pub fn implies(premise: &Expr, conclusion: &Expr) -> bool {
    let counter = cross(
        rewrite(premise, Outcome::True),
        rewrite(conclusion, Outcome::NotTrue),
    );
    !any_satisfiable(&counter)
}

/// Values pinned by top-level `field == literal` and `field IS NULL` conjuncts.
///
/// A field pinned to two different values is left out.
pub fn known_field_values(expr: &Expr) -> HashMap<String, ScalarValue> {
    let mut out: HashMap<String, ScalarValue> = HashMap::new();
    let mut conflicting = Vec::new();
    for c in expr.conjuncts() {
        let (field, value) = match c {
            Expr::Compare {
                left,
                op: CompareOp::Eq,
                right,
            } => match (left.as_ref(), right.as_ref()) {
                (Expr::Column(f), Expr::Literal(v)) | (Expr::Literal(v), Expr::Column(f)) => {
                    (f.clone(), v.clone())
                }
                _ => continue,
            },
            Expr::IsNull(inner) => match inner.as_ref() {
                Expr::Column(f) => (f.clone(), ScalarValue::Null),
                _ => continue,
            },
            _ => continue,
        };
        match out.get(&field) {
            Some(prev) if prev != &value => conflicting.push(field),
            _ => {
                out.insert(field, value);
            }
        }
    }
    for f in conflicting {
        out.remove(&f);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{implies, is_satisfiable, known_field_values};
    use crate::expressions::{Expr, ScalarValue, col, conjunction, lit};

    #[test]
    fn contradictory_equalities_are_unsatisfiable() {
        let part = col("year").eq(lit(2018)).and(col("month").eq(lit(1)));
        assert!(!is_satisfiable(&part.clone().and(col("year").eq(lit(2019)))));
        assert!(is_satisfiable(&part.clone().and(col("year").eq(lit(2018)))));
        assert!(is_satisfiable(&part.and(col("country").eq(lit("US")))));
    }

    #[test]
    fn ranges_and_exclusions() {
        let x = || col("x");
        assert!(!is_satisfiable(&x().gt(lit(5)).and(x().lt(lit(3)))));
        assert!(!is_satisfiable(&x().gt_eq(lit(5)).and(x().lt(lit(5)))));
        assert!(is_satisfiable(&x().gt_eq(lit(5)).and(x().lt_eq(lit(5)))));
        assert!(!is_satisfiable(&conjunction(vec![
            x().gt_eq(lit(5)),
            x().lt_eq(lit(5)),
            x().not_eq(lit(5)),
        ])));
        assert!(!is_satisfiable(&x().eq(lit(4)).and(x().gt(lit(4)))));
        assert!(!is_satisfiable(&x().eq(lit(4)).and(lit(4).not_eq(x()))));
        assert!(!is_satisfiable(&x().eq(lit(4)).and(x().is_null())));
    }

    #[test]
    fn mixed_numeric_bounds_are_compared_exactly() {
        let part = || col("year").eq(lit(2018));
        assert!(is_satisfiable(&part().and(col("year").lt(lit(2018.5_f64)))));
        assert!(!is_satisfiable(&part().and(col("year").gt(lit(2018.5_f64)))));
        assert!(!is_satisfiable(&part().and(col("year").eq(lit(2018.5_f64)))));
        assert!(is_satisfiable(&part().and(col("year").lt_eq(lit(2018_i64)))));
    }

    #[test]
    fn disjunction_and_negation() {
        let part = col("year").eq(lit(2018));
        let either = col("year").eq(lit(2019)).or(col("year").eq(lit(2020)));
        assert!(!is_satisfiable(&part.clone().and(either)));
        let either = col("year").eq(lit(2019)).or(col("year").eq(lit(2018)));
        assert!(is_satisfiable(&part.clone().and(either)));
        assert!(!is_satisfiable(&part.clone().and(col("year").eq(lit(2018)).not())));
        assert!(is_satisfiable(&part.and(col("year").eq(lit(2019)).not())));
    }

    #[test]
    fn null_literals_and_unknown_shapes() {
        assert!(!is_satisfiable(&col("x").eq(Expr::Literal(ScalarValue::Null))));
        assert!(!is_satisfiable(&lit(false)));
        assert!(is_satisfiable(&lit(true)));
        // column-to-column comparisons are not modelled
        assert!(is_satisfiable(
            &col("x").eq(col("y")).and(col("x").not_eq(col("y")))
        ));
    }

    #[test]
    fn implication_accounts_for_nulls() {
        let part = col("year").eq(lit(2018)).and(col("month").eq(lit(1)));
        assert!(implies(&part, &col("year").eq(lit(2018))));
        assert!(implies(&part, &col("year").gt(lit(2000))));
        assert!(!implies(&part, &col("year").eq(lit(2019))));
        assert!(!implies(&part, &col("country").eq(lit("US"))));
        // a tautology over a column says nothing when that column may be null
        let taut = col("x").gt(lit(0)).or(col("x").lt_eq(lit(0)));
        assert!(!implies(&part, &taut));
        assert!(implies(&part, &lit(true)));
    }

    #[test]
    fn known_values_from_conjuncts() {
        let e = conjunction(vec![
            col("year").eq(lit(2018)),
            lit("US").eq(col("country")),
            col("region").is_null(),
            col("sales").gt(lit(1.0)),
        ]);
        let known = known_field_values(&e);
        assert_eq!(known.len(), 3);
        assert_eq!(known["year"], ScalarValue::Int32(2018));
        assert_eq!(known["country"], ScalarValue::from("US"));
        assert_eq!(known["region"], ScalarValue::Null);

        let clash = col("a").eq(lit(1)).and(col("a").eq(lit(2)));
        assert!(known_field_values(&clash).is_empty());
    }
}
