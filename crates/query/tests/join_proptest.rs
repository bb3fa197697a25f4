//! Property-based tests for the tuple engine.

use kvorm_core::{Record, Value};
use kvorm_query::{compile, InMemorySource, QueryExecutor, TupleRow};
use proptest::prelude::*;
use std::collections::BTreeSet;

/// Records with ids 1..=n and a small `key` domain so joins have partners.
fn records_strategy(max_rows: usize) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(prop::option::of(0i64..5), 0..max_rows).prop_map(|keys| {
        keys.into_iter()
            .enumerate()
            .map(|(i, key)| {
                let record = Record::with_id(i as i64 + 1);
                match key {
                    Some(k) => record.field("key", k),
                    None => record,
                }
            })
            .collect()
    })
}

fn run(sql: &str, left: &[Record], right: &[Record]) -> Vec<TupleRow> {
    let tree = compile(sql).unwrap();
    let mut source = InMemorySource::new()
        .with_table("l", left.to_vec())
        .with_table("r", right.to_vec());
    QueryExecutor::new().execute(&tree, &mut source).unwrap()
}

fn id_pairs(rows: &[TupleRow]) -> BTreeSet<(Option<i64>, Option<i64>)> {
    rows.iter()
        .map(|row| {
            (
                row.record("l").and_then(Record::id),
                row.record("r").and_then(Record::id),
            )
        })
        .collect()
}

proptest! {
    /// Property: a single-table select without filters returns every record once.
    #[test]
    fn single_table_returns_every_record(records in records_strategy(40)) {
        let rows = run("SELECT * FROM l", &records, &[]);
        prop_assert_eq!(rows.len(), records.len());
    }

    /// Property: an inner join returns exactly the key-equal pairs, in either operand order.
    #[test]
    fn inner_join_matches_nested_loop(
        left in records_strategy(25),
        right in records_strategy(25),
    ) {
        let forward = run("SELECT * FROM l, r WHERE l.key = r.key", &left, &right);
        let backward = run("SELECT * FROM l, r WHERE r.key = l.key", &left, &right);
        prop_assert_eq!(id_pairs(&forward), id_pairs(&backward));

        let mut expected = BTreeSet::new();
        for a in &left {
            for b in &right {
                if let (Some(x), Some(y)) = (a.get("key"), b.get("key")) {
                    if x == y {
                        expected.insert((a.id(), b.id()));
                    }
                }
            }
        }
        prop_assert_eq!(id_pairs(&forward), expected);
    }

    /// Property: without join pairs the result is the cartesian product.
    #[test]
    fn cartesian_cardinality(
        left in records_strategy(12),
        right in records_strategy(12),
    ) {
        let rows = run("SELECT * FROM l, r", &left, &right);
        prop_assert_eq!(rows.len(), left.len() * right.len());
    }

    /// Property: a LEFT JOIN keeps every left record at least once.
    #[test]
    fn left_join_preserves_left(
        left in records_strategy(25),
        right in records_strategy(25),
    ) {
        let rows = run("SELECT * FROM l LEFT JOIN r ON l.key = r.key", &left, &right);
        let kept: BTreeSet<_> = rows.iter().filter_map(|r| r.record("l").and_then(Record::id)).collect();
        let all: BTreeSet<_> = left.iter().filter_map(Record::id).collect();
        prop_assert_eq!(kept, all);
    }

    /// Property: count(*) agrees with the number of unaggregated rows.
    #[test]
    fn count_matches_rows(
        left in records_strategy(25),
        right in records_strategy(25),
    ) {
        let rows = run("SELECT * FROM l, r WHERE l.key = r.key", &left, &right);
        let counted = run("SELECT count(*) FROM l, r WHERE l.key = r.key", &left, &right);
        prop_assert_eq!(counted[0].value("count(*)"), Some(&Value::Int64(rows.len() as i64)));
    }
}
