//! Predicate evaluation.
//!
//! Evaluation is two-valued. A comparison involving an absent value, or two
//! values of incomparable kinds, is false, with one exception: `!=` is the
//! negation of `=`, so an absent value is "not equal" to everything, itself
//! included. This is what makes `x = x` a non-null test and `x != x` a null
//! test.

use super::expr::{ColumnRef, CompareOp, Expr};
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;
use kvorm_core::pattern_match::like;
use kvorm_core::Value;

/// Values bound to subquery placeholders.
pub type Bindings = BTreeMap<String, Vec<Value>>;

/// Column lookup for the row being evaluated.
pub trait Scope {
    /// Value of a column in the current row; `Value::Null` when absent.
    fn lookup(&self, column: &ColumnRef) -> Value;
}

/// Evaluates `expr` against one row.
pub fn evaluate<S: Scope + ?Sized>(expr: &Expr, scope: &S, bindings: &Bindings) -> bool {
    match expr {
        Expr::And(l, r) => evaluate(l, scope, bindings) && evaluate(r, scope, bindings),
        Expr::Or(l, r) => evaluate(l, scope, bindings) || evaluate(r, scope, bindings),
        Expr::Not(e) => !evaluate(e, scope, bindings),
        Expr::Compare { left, op, right } => {
            let l = scalar(left, scope, bindings);
            let r = scalar(right, scope, bindings);
            compare(&l, *op, &r)
        }
        Expr::InList {
            expr,
            list,
            negated,
        } => {
            let value = scalar(expr, scope, bindings);
            let found = list.iter().any(|item| match item {
                // Placeholders expand to every bound value.
                Expr::Placeholder(name) => bindings
                    .get(name)
                    .is_some_and(|values| values.iter().any(|v| value.sql_eq(v))),
                other => value.sql_eq(&scalar(other, scope, bindings)),
            });
            found != *negated
        }
        Expr::Like {
            expr,
            pattern,
            negated,
        } => {
            let matched = match scalar(expr, scope, bindings) {
                Value::String(s) => like(&s, pattern),
                _ => false,
            };
            matched != *negated
        }
        Expr::Between {
            expr,
            low,
            high,
            negated,
        } => {
            let value = scalar(expr, scope, bindings);
            let low = scalar(low, scope, bindings);
            let high = scalar(high, scope, bindings);
            let inside =
                compare(&value, CompareOp::Ge, &low) && compare(&value, CompareOp::Le, &high);
            inside != *negated
        }
        Expr::Literal(Value::Boolean(b)) => *b,
        Expr::Column(_) | Expr::Placeholder(_) => {
            matches!(scalar(expr, scope, bindings), Value::Boolean(true))
        }
        Expr::Literal(_) => false,
    }
}

/// Applies a comparison operator under the null convention above.
pub fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    let ord = left.sql_cmp(right);
    match op {
        CompareOp::Eq => ord == Some(Ordering::Equal),
        CompareOp::Ne => ord != Some(Ordering::Equal),
        CompareOp::Lt => ord == Some(Ordering::Less),
        CompareOp::Le => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => ord == Some(Ordering::Greater),
        CompareOp::Ge => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
    }
}

/// Evaluates an operand to a single value. A placeholder yields its first
/// bound value.
fn scalar<S: Scope + ?Sized>(expr: &Expr, scope: &S, bindings: &Bindings) -> Value {
    match expr {
        Expr::Column(c) => scope.lookup(c),
        Expr::Literal(v) => v.clone(),
        Expr::Placeholder(name) => bindings
            .get(name)
            .and_then(|values| values.first().cloned())
            .unwrap_or(Value::Null),
        other => Value::Boolean(evaluate(other, scope, bindings)),
    }
}
