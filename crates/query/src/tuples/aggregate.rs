//! Aggregate functions over a column of the filtered relation.
//!
//! There is no grouping: the whole filtered relation is the single group.

use crate::tree::AggregateFunc;
use kvorm_core::Value;

/// Computes `func` over `values`.
///
/// - `count`: number of non-null values.
/// - `sum`: `Int64` while every value is an integer and the sum fits,
///   `Float64` otherwise; 0 for no numeric input. Non-numeric values are skipped.
/// - `min` / `max`: extreme non-null value; Null for no input.
pub fn aggregate<'a>(func: AggregateFunc, values: impl Iterator<Item = &'a Value>) -> Value {
    let non_null = values.filter(|v| !v.is_null());
    match func {
        AggregateFunc::Count => Value::Int64(non_null.count() as i64),
        AggregateFunc::Sum => sum(non_null),
        AggregateFunc::Min => non_null.min().cloned().unwrap_or(Value::Null),
        AggregateFunc::Max => non_null.max().cloned().unwrap_or(Value::Null),
    }
}

fn sum<'a>(values: impl Iterator<Item = &'a Value>) -> Value {
    let mut int_sum: Option<i64> = Some(0);
    let mut float_sum = 0.0f64;
    for value in values {
        match value {
            Value::Int64(i) => {
                int_sum = int_sum.and_then(|s| s.checked_add(*i));
                float_sum += *i as f64;
            }
            Value::Float64(f) => {
                int_sum = None;
                float_sum += *f;
            }
            _ => {}
        }
    }
    match int_sum {
        Some(s) => Value::Int64(s),
        None => Value::Float64(float_sum),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    fn values() -> Vec<Value> {
        vec![
            Value::Int64(3),
            Value::Null,
            Value::Int64(1),
            Value::Int64(8),
        ]
    }

    #[test]
    fn test_count_skips_null() {
        assert_eq!(aggregate(AggregateFunc::Count, values().iter()), Value::Int64(3));
    }

    #[test]
    fn test_sum() {
        assert_eq!(aggregate(AggregateFunc::Sum, values().iter()), Value::Int64(12));

        let mixed = vec![Value::Int64(1), Value::Float64(0.5)];
        assert_eq!(aggregate(AggregateFunc::Sum, mixed.iter()), Value::Float64(1.5));

        let overflow = vec![Value::Int64(i64::MAX), Value::Int64(1)];
        assert!(matches!(
            aggregate(AggregateFunc::Sum, overflow.iter()),
            Value::Float64(_)
        ));
    }

    #[test]
    fn test_min_max() {
        assert_eq!(aggregate(AggregateFunc::Min, values().iter()), Value::Int64(1));
        assert_eq!(aggregate(AggregateFunc::Max, values().iter()), Value::Int64(8));

        let names = vec![Value::String("b".into()), Value::String("a".into())];
        assert_eq!(
            aggregate(AggregateFunc::Min, names.iter()),
            Value::String("a".into())
        );
    }

    #[test]
    fn test_empty_input() {
        let empty: Vec<Value> = Vec::new();
        assert_eq!(aggregate(AggregateFunc::Count, empty.iter()), Value::Int64(0));
        assert_eq!(aggregate(AggregateFunc::Sum, empty.iter()), Value::Int64(0));
        assert_eq!(aggregate(AggregateFunc::Min, empty.iter()), Value::Null);
        assert_eq!(aggregate(AggregateFunc::Max, empty.iter()), Value::Null);
    }
}
