//! Equi-join and cartesian product over relations.

use super::relation::Relation;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashMap;
use kvorm_core::Value;

/// Hash key for an equi-join. Absent values never match; integral floats
/// hash like the integer they equal so `2 = 2.0` joins.
fn join_key(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Float64(f) if f.is_finite() && *f == (*f as i64) as f64 => {
            Some(Value::Int64(*f as i64))
        }
        Value::Float64(f) if f.is_nan() => None,
        other => Some(other.clone()),
    }
}

/// Output columns of a binary join: all of `left`, then the columns of
/// `right` that `left` does not already have. Returns the kept right indices.
fn combined_columns(left: &Relation, right: &Relation) -> (Vec<String>, Vec<usize>) {
    let mut columns: Vec<String> = left.columns().to_vec();
    let mut keep = Vec::with_capacity(right.columns().len());
    for (idx, name) in right.columns().iter().enumerate() {
        if !columns.contains(name) {
            columns.push(name.clone());
            keep.push(idx);
        }
    }
    (columns, keep)
}

/// Full outer equi-join on `left_key = right_key`.
///
/// Rows of either side without a partner survive, padded with Null for the
/// other side's columns. Column-name collisions keep the left operand's
/// column. A key column missing from its relation reads as Null throughout.
pub fn outer_join(left: Relation, left_key: &str, right: Relation, right_key: &str) -> Relation {
    let (columns, right_keep) = combined_columns(&left, &right);
    let left_width = left.columns().len();
    let left_idx = left.column_index(left_key);
    let right_idx = right.column_index(right_key);

    // Build phase over the right relation.
    let mut table: HashMap<Value, Vec<usize>> = HashMap::with_capacity(right.len());
    if let Some(ri) = right_idx {
        for (idx, row) in right.rows().iter().enumerate() {
            if let Some(key) = join_key(&row[ri]) {
                table.entry(key).or_default().push(idx);
            }
        }
    }

    let right_rows = right.into_rows();
    let mut matched = alloc::vec![false; right_rows.len()];
    let mut out = Vec::with_capacity(left.len().max(right_rows.len()));

    // Probe phase.
    for left_row in left.into_rows() {
        let partners = left_idx
            .and_then(|li| join_key(&left_row[li]))
            .and_then(|key| table.get(&key));
        match partners {
            Some(indices) => {
                for &ri in indices {
                    matched[ri] = true;
                    let mut row = Vec::with_capacity(columns.len());
                    row.extend(left_row.iter().cloned());
                    row.extend(right_keep.iter().map(|&k| right_rows[ri][k].clone()));
                    out.push(row);
                }
            }
            None => {
                let mut row = left_row;
                row.resize(columns.len(), Value::Null);
                out.push(row);
            }
        }
    }

    for (ri, right_row) in right_rows.into_iter().enumerate() {
        if matched[ri] {
            continue;
        }
        let mut row = alloc::vec![Value::Null; left_width];
        row.extend(right_keep.iter().map(|&k| right_row[k].clone()));
        out.push(row);
    }

    Relation::with_rows(columns, out)
}

/// Cartesian product. Empty when either side is empty.
pub fn cartesian(left: Relation, right: Relation) -> Relation {
    let (columns, right_keep) = combined_columns(&left, &right);
    let mut out = Vec::with_capacity(left.len() * right.len());
    for left_row in left.rows() {
        for right_row in right.rows() {
            let mut row = Vec::with_capacity(columns.len());
            row.extend(left_row.iter().cloned());
            row.extend(right_keep.iter().map(|&k| right_row[k].clone()));
            out.push(row);
        }
    }
    Relation::with_rows(columns, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn authors() -> Relation {
        Relation::with_rows(
            vec!["a.id".into()],
            vec![
                vec![Value::Int64(1)],
                vec![Value::Int64(2)],
                vec![Value::Int64(3)],
            ],
        )
    }

    fn books() -> Relation {
        Relation::with_rows(
            vec!["b.id".into(), "b.author_id".into()],
            vec![
                vec![Value::Int64(10), Value::Int64(2)],
                vec![Value::Int64(11), Value::Int64(2)],
                vec![Value::Int64(12), Value::Null],
                vec![Value::Int64(13), Value::Int64(9)],
            ],
        )
    }

    #[test]
    fn test_outer_join_keeps_unmatched_both_sides() {
        let rel = outer_join(authors(), "a.id", books(), "b.author_id");
        assert_eq!(rel.columns(), &["a.id", "b.id", "b.author_id"]);

        let matched = rel
            .rows()
            .iter()
            .filter(|r| !r[0].is_null() && !r[1].is_null())
            .count();
        assert_eq!(matched, 2);

        // Authors 1 and 3 have no books.
        let left_only = rel.rows().iter().filter(|r| r[1].is_null()).count();
        assert_eq!(left_only, 2);

        // Books 12 (null key) and 13 (dangling key) have no author.
        let right_only = rel.rows().iter().filter(|r| r[0].is_null()).count();
        assert_eq!(right_only, 2);
        assert_eq!(rel.len(), 6);
    }

    #[test]
    fn test_outer_join_null_keys_never_match() {
        let left = Relation::with_rows(vec!["x.k".into()], vec![vec![Value::Null]]);
        let right = Relation::with_rows(vec!["y.k".into()], vec![vec![Value::Null]]);
        let rel = outer_join(left, "x.k", right, "y.k");
        assert_eq!(rel.len(), 2);
    }

    #[test]
    fn test_outer_join_mixed_numeric_keys() {
        let left = Relation::with_rows(vec!["x.k".into()], vec![vec![Value::Int64(2)]]);
        let right = Relation::with_rows(vec!["y.k".into()], vec![vec![Value::Float64(2.0)]]);
        let rel = outer_join(left, "x.k", right, "y.k");
        assert_eq!(rel.len(), 1);
    }

    #[test]
    fn test_outer_join_collision_keeps_left() {
        let left = Relation::with_rows(
            vec!["a.id".into(), "shared".into()],
            vec![vec![Value::Int64(1), Value::String("left".into())]],
        );
        let right = Relation::with_rows(
            vec!["b.a_id".into(), "shared".into()],
            vec![vec![Value::Int64(1), Value::String("right".into())]],
        );
        let rel = outer_join(left, "a.id", right, "b.a_id");
        assert_eq!(rel.columns(), &["a.id", "shared", "b.a_id"]);
        assert_eq!(rel.value(0, "shared"), &Value::String("left".into()));
    }

    #[test]
    fn test_cartesian() {
        let rel = cartesian(authors(), books());
        assert_eq!(rel.len(), 12);
        assert_eq!(rel.columns().len(), 3);

        let rel = cartesian(authors(), Relation::new(vec!["c.id".into()]));
        assert!(rel.is_empty());
    }
}
