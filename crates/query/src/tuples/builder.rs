//! Tuple builder.
//!
//! Turns a compiled query tree plus one record set per table into result
//! rows:
//!
//! 1. index every record set by id and work out the narrow set of columns the
//!    join and filter arithmetic needs;
//! 2. extract join pairs from the joining clauses;
//! 3. merge sources: join pairs are grouped into connected components with a
//!    union-find, each pair outer-joins the two components it connects (in
//!    clause order), and the surviving components are combined with a
//!    cartesian product;
//! 4. filter on the conjunction of the join equalities (or their LEFT JOIN
//!    relaxation) and every where clause. The other conditions of a LEFT
//!    JOIN's `ON` never drop a left row: those on the optional side alone
//!    narrow its source before merging, the rest turn failing matches into
//!    unmatched rows;
//! 5. aggregate, or project the selected labels' ids, drop duplicate id
//!    tuples and rehydrate full records.
//!
//! A name that does not resolve to a FROM label anywhere in the join graph
//! yields an empty result rather than an error.

use super::aggregate::aggregate;
use super::join::{cartesian, outer_join};
use super::pairs::{extract_join_pairs, JoinPair, QualifiedColumn};
use super::relation::Relation;
use crate::ast::{evaluate, Bindings, ColumnRef, Expr, Scope};
use crate::parser::CompilerOptions;
use crate::tree::{AggregateFunc, Attribute, QueryTree};
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::format;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use hashbrown::{HashMap, HashSet};
use kvorm_core::schema::SchemaRegistry;
use kvorm_core::{Codec, DataType, IdentityCodec, Record, RecordId, Result, Value, ID_FIELD};

static IDENTITY: IdentityCodec = IdentityCodec;

/// One result row: the rehydrated records of the selected labels (in FROM
/// order) and the values of the selected columns or aggregates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TupleRow {
    records: Vec<(String, Arc<Record>)>,
    values: Vec<(String, Value)>,
}

impl TupleRow {
    /// Record bound to a FROM label. Absent for the optional side of an
    /// unmatched LEFT JOIN row.
    pub fn record(&self, label: &str) -> Option<&Record> {
        self.records
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, r)| r.as_ref())
    }

    pub fn records(&self) -> impl Iterator<Item = (&str, &Record)> {
        self.records.iter().map(|(l, r)| (l.as_str(), r.as_ref()))
    }

    /// Shared handles to the records, for callers that keep them around.
    pub fn shared_records(&self) -> &[(String, Arc<Record>)] {
        &self.records
    }

    /// Value of a selected column (`label.column` as written in the SELECT
    /// list) or aggregate (`func(attr)`).
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn values(&self) -> &[(String, Value)] {
        &self.values
    }

    /// First selected value, or the id of the first record for `*` selects.
    pub fn first_value(&self) -> Value {
        if let Some((_, value)) = self.values.first() {
            return value.clone();
        }
        self.records
            .first()
            .and_then(|(_, r)| r.get(ID_FIELD).cloned())
            .unwrap_or(Value::Null)
    }
}

/// One FROM item with its records indexed by id.
struct Source {
    label: String,
    table: String,
    index: BTreeMap<RecordId, Arc<Record>>,
}

/// Outcome of resolving a column reference against the FROM list.
enum Resolved {
    Column(QualifiedColumn),
    /// The qualifier names no FROM label.
    UnknownTable,
    /// A bare column no source has.
    UnknownColumn,
}

/// What an aggregate is computed over.
enum AggregateTarget {
    /// `count(*)`
    Rows,
    Column(String),
    Nothing,
}

/// Disjoint-set forest over source positions.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Joins the sets rooted at `a` and `b`; `a` stays the root.
    fn union(&mut self, a: usize, b: usize) -> usize {
        self.parent[b] = a;
        a
    }
}

/// Row view handed to the predicate evaluator. Column references have been
/// flattened to relation column names by then.
struct RowScope<'r> {
    positions: &'r HashMap<String, usize>,
    row: &'r [Value],
}

impl Scope for RowScope<'_> {
    fn lookup(&self, column: &ColumnRef) -> Value {
        if column.table.is_some() {
            return Value::Null;
        }
        self.positions
            .get(column.column.as_str())
            .map(|&i| self.row[i].clone())
            .unwrap_or(Value::Null)
    }
}

/// Builds result rows from a query tree and per-table record sets.
pub struct TupleBuilder<'a> {
    registry: Option<&'a SchemaRegistry>,
    codec: &'a dyn Codec,
    bindings: Bindings,
    max_depth: usize,
}

impl Default for TupleBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> TupleBuilder<'a> {
    pub fn new() -> Self {
        Self {
            registry: None,
            codec: &IDENTITY,
            bindings: Bindings::new(),
            max_depth: CompilerOptions::default().max_depth,
        }
    }

    /// Uses the registry to resolve bare column names and find temporal
    /// columns.
    pub fn with_registry(mut self, registry: &'a SchemaRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Codec used to decode temporal columns before comparison.
    pub fn with_codec(mut self, codec: &'a dyn Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Nesting bound for re-parsing stored clauses; match the compiler's.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_bindings(mut self, bindings: Bindings) -> Self {
        self.bindings = bindings;
        self
    }

    /// Binds a subquery placeholder to its values.
    pub fn bind(&mut self, placeholder: impl Into<String>, values: Vec<Value>) {
        self.bindings.insert(placeholder.into(), values);
    }

    /// Computes the result rows of `tree`. `records` maps table names to the
    /// full record sets pulled from the backend.
    pub fn build(
        &self,
        tree: &QueryTree,
        records: &BTreeMap<String, Vec<Record>>,
    ) -> Result<Vec<TupleRow>> {
        // Indexing.
        let mut sources = Vec::with_capacity(tree.labels.len());
        for (label, table) in tree.labels.iter().zip(tree.models.iter()) {
            let Some(set) = records.get(table) else {
                tracing::debug!(table = table.as_str(), "no record set for table, result is empty");
                return Ok(self.empty_result(tree));
            };
            let mut index = BTreeMap::new();
            for record in set {
                if let Some(id) = record.id() {
                    index
                        .entry(id)
                        .or_insert_with(|| Arc::new(record.clone()));
                }
            }
            sources.push(Source {
                label: label.clone(),
                table: table.clone(),
                index,
            });
        }
        if sources.is_empty() {
            return Ok(self.empty_result(tree));
        }

        // Join pairs.
        let Some(pairs) = resolve_pairs(tree, &tree.joining_clauses) else {
            return Ok(self.empty_result(tree));
        };
        let Some(outer_pairs) = resolve_pairs(tree, &tree.outer_joins) else {
            return Ok(self.empty_result(tree));
        };

        // Where clauses, with every column pinned to a label.
        let mut filters = Vec::with_capacity(tree.where_clauses.len());
        for clause in &tree.where_clauses {
            let Some(expr) = self.pin_clause(tree, &sources, clause)? else {
                return Ok(self.empty_result(tree));
            };
            filters.push(expr);
        }

        // LEFT JOIN conditions, split by whether they only look at the
        // optional side.
        let mut narrowing: Vec<(usize, Expr)> = Vec::new();
        let mut matching: BTreeMap<usize, Vec<Expr>> = BTreeMap::new();
        for (label, clauses) in &tree.outer_join_filters {
            let Some(pos) = tree.label_position(label) else {
                return Ok(self.empty_result(tree));
            };
            for clause in clauses {
                let Some(expr) = self.pin_clause(tree, &sources, clause)? else {
                    return Ok(self.empty_result(tree));
                };
                let mut own = true;
                expr.visit_columns(&mut |c: &ColumnRef| {
                    if c.table.as_deref() != Some(label.as_str()) {
                        own = false;
                    }
                });
                if own {
                    narrowing.push((pos, expr));
                } else {
                    matching.entry(pos).or_default().push(expr);
                }
            }
        }

        // Aggregate targets.
        let mut aggregates: Vec<(String, AggregateFunc, AggregateTarget)> = Vec::new();
        for (&idx, &func) in &tree.function_calls {
            let Some(key) = tree.aggregate_key(idx) else {
                continue;
            };
            let target = match &tree.attributes[idx] {
                Attribute::Wildcard | Attribute::AllOf(_) => AggregateTarget::Rows,
                Attribute::Column(c) => match self.resolve_ref(tree, &sources, c) {
                    Resolved::Column(q) => AggregateTarget::Column(q.flat()),
                    Resolved::UnknownTable => return Ok(self.empty_result(tree)),
                    Resolved::UnknownColumn => AggregateTarget::Nothing,
                },
            };
            aggregates.push((key, func, target));
        }

        // Needed columns per source.
        let mut needed: Vec<BTreeSet<String>> = sources
            .iter()
            .map(|_| {
                let mut set = BTreeSet::new();
                set.insert(String::from(ID_FIELD));
                set
            })
            .collect();
        let mut need = |label: &str, column: &str| {
            if let Some(pos) = tree.label_position(label) {
                needed[pos].insert(String::from(column));
            }
        };
        for pair in &pairs {
            need(&pair.left.table, &pair.left.column);
            need(&pair.right.table, &pair.right.column);
        }
        let conditions = filters
            .iter()
            .chain(narrowing.iter().map(|(_, e)| e))
            .chain(matching.values().flatten());
        for filter in conditions {
            filter.visit_columns(&mut |c: &ColumnRef| {
                if let Some(label) = &c.table {
                    need(label, &c.column);
                }
            });
        }
        for (_, _, target) in &aggregates {
            if let AggregateTarget::Column(flat) = target {
                if let Some((label, column)) = flat.split_once('.') {
                    need(label, column);
                }
            }
        }

        // Optional sides of LEFT joins.
        let mut optional: BTreeSet<usize> = BTreeSet::new();
        for pair in &outer_pairs {
            if let Some(pos) = optional_side(tree, pair) {
                optional.insert(pos);
            }
        }
        optional.extend(
            tree.outer_join_filters
                .keys()
                .filter_map(|label| tree.label_position(label)),
        );

        if let Some(empty) = sources
            .iter()
            .enumerate()
            .find(|(i, s)| s.index.is_empty() && !optional.contains(i))
        {
            tracing::debug!(table = empty.1.table.as_str(), "source is empty, result is empty");
            return Ok(self.empty_result(tree));
        }

        let mut relations: Vec<Option<Relation>> = sources
            .iter()
            .zip(needed.iter())
            .map(|(source, columns)| Some(self.project(source, columns)))
            .collect();
        for (pos, mut expr) in narrowing {
            flatten_columns(&mut expr);
            if let Some(relation) = relations[pos].as_mut() {
                self.retain_matching(relation, core::slice::from_ref(&expr));
            }
        }

        // Merge: outer-join along pairs inside each component.
        let mut components = UnionFind::new(sources.len());
        for pair in &pairs {
            let (Some(lp), Some(rp)) = (
                tree.label_position(&pair.left.table),
                tree.label_position(&pair.right.table),
            ) else {
                continue;
            };
            let (a, b) = (components.find(lp), components.find(rp));
            if a == b {
                continue;
            }
            if let (Some(left), Some(right)) = (relations[a].take(), relations[b].take()) {
                let merged = outer_join(left, &pair.left.flat(), right, &pair.right.flat());
                let root = components.union(a, b);
                relations[root] = Some(merged);
            }
        }

        // Cartesian product across components.
        let mut relation: Option<Relation> = None;
        for pos in 0..sources.len() {
            let root = components.find(pos);
            if let Some(mut component) = relations[root].take() {
                let all_optional = (0..sources.len())
                    .filter(|&p| components.find(p) == root)
                    .all(|p| optional.contains(&p));
                if component.is_empty() && all_optional {
                    // Left rows still survive, without a match.
                    let width = component.columns().len();
                    component = Relation::with_rows(
                        component.columns().to_vec(),
                        alloc::vec![alloc::vec![Value::Null; width]],
                    );
                }
                relation = Some(match relation {
                    None => component,
                    Some(acc) => cartesian(acc, component),
                });
            }
        }
        let mut relation = relation.unwrap_or_default();
        tracing::debug!(rows = relation.len(), pairs = pairs.len(), "merged sources");

        for (pos, mut conditions) in matching {
            conditions.iter_mut().for_each(flatten_columns);
            let equalities: Vec<Expr> = outer_pairs
                .iter()
                .filter(|p| optional_side(tree, p) == Some(pos))
                .map(|p| Expr::eq(flat_column(&p.left), flat_column(&p.right)))
                .collect();
            relation =
                self.demote_failed_matches(relation, &sources[pos].label, &equalities, &conditions);
        }

        // Filter.
        let mut predicates: Vec<Expr> = Vec::with_capacity(pairs.len() + filters.len());
        for pair in &pairs {
            let equality = Expr::eq(flat_column(&pair.left), flat_column(&pair.right));
            let predicate = match outer_pairs
                .iter()
                .find(|p| *p == pair)
                .and_then(|p| optional_side(tree, p))
            {
                Some(pos) => {
                    let id = Expr::Column(ColumnRef::bare(format!(
                        "{}.{}",
                        sources[pos].label, ID_FIELD
                    )));
                    // Matched, or the optional side is absent.
                    Expr::or(equality, Expr::ne(id.clone(), id))
                }
                None => equality,
            };
            predicates.push(predicate);
        }
        for mut filter in filters {
            flatten_columns(&mut filter);
            predicates.push(filter);
        }

        self.retain_matching(&mut relation, &predicates);
        tracing::debug!(rows = relation.len(), predicates = predicates.len(), "filtered relation");

        // Aggregation.
        if !aggregates.is_empty() {
            let values = aggregates
                .into_iter()
                .map(|(key, func, target)| {
                    let value = match target {
                        AggregateTarget::Rows => Value::Int64(relation.len() as i64),
                        AggregateTarget::Column(flat) => match relation.column_index(&flat) {
                            Some(ci) => aggregate(func, relation.rows().iter().map(|r| &r[ci])),
                            None => aggregate(func, core::iter::empty()),
                        },
                        AggregateTarget::Nothing => aggregate(func, core::iter::empty()),
                    };
                    (key, value)
                })
                .collect();
            return Ok(alloc::vec![TupleRow {
                records: Vec::new(),
                values,
            }]);
        }

        // Projection, dedup, rehydration.
        let selected = self.selected_sources(tree, &sources);
        let id_columns: Vec<Option<usize>> = selected
            .iter()
            .map(|&pos| relation.column_index(&format!("{}.{}", sources[pos].label, ID_FIELD)))
            .collect();
        let column_attributes: Vec<(String, Option<QualifiedColumn>)> = tree
            .attributes
            .iter()
            .filter_map(|attr| match attr {
                Attribute::Column(c) => Some((
                    attr.to_string(),
                    match self.resolve_ref(tree, &sources, c) {
                        Resolved::Column(q) => Some(q),
                        _ => None,
                    },
                )),
                _ => None,
            })
            .collect();

        let mut seen: HashSet<Vec<Value>> = HashSet::new();
        let mut rows = Vec::new();
        for row in relation.rows() {
            let key: Vec<Value> = id_columns
                .iter()
                .map(|c| c.map(|ci| row[ci].clone()).unwrap_or(Value::Null))
                .collect();
            if key.iter().all(Value::is_null) || seen.contains(&key) {
                continue;
            }

            let mut tuple = TupleRow::default();
            for (&pos, id) in selected.iter().zip(key.iter()) {
                let source = &sources[pos];
                if let Some(record) = id.as_i64().and_then(|id| source.index.get(&id)) {
                    tuple.records.push((source.label.clone(), Arc::clone(record)));
                }
            }
            for (name, column) in &column_attributes {
                let value = column
                    .as_ref()
                    .and_then(|q| {
                        let record = tuple.record(&q.table)?;
                        let value = record.get(&q.column)?.clone();
                        Some(self.decode_if_temporal(tree, &q.table, &q.column, value))
                    })
                    .unwrap_or(Value::Null);
                tuple.values.push((name.clone(), value));
            }
            seen.insert(key);
            rows.push(tuple);
        }

        tracing::debug!(rows = rows.len(), "built tuples");
        Ok(rows)
    }

    /// Parses a stored clause and pins every column to a FROM label. `None`
    /// when a qualifier names no label.
    fn pin_clause(
        &self,
        tree: &QueryTree,
        sources: &[Source],
        clause: &str,
    ) -> Result<Option<Expr>> {
        let mut expr = Expr::parse_with(clause, self.max_depth)?;
        let mut unresolved_table = false;
        expr.visit_columns_mut(&mut |c: &mut ColumnRef| {
            match self.resolve_ref(tree, sources, c) {
                Resolved::Column(q) => c.table = Some(q.table),
                Resolved::UnknownTable => unresolved_table = true,
                Resolved::UnknownColumn => {}
            }
        });
        if unresolved_table {
            tracing::debug!(clause, "clause names an unknown table");
            return Ok(None);
        }
        self.decode_temporal_literals(tree, &mut expr);
        Ok(Some(expr))
    }

    /// Keeps the rows satisfying every (flattened) predicate.
    fn retain_matching(&self, relation: &mut Relation, predicates: &[Expr]) {
        if predicates.is_empty() {
            return;
        }
        let positions = column_positions(relation);
        relation.retain(|row| {
            let scope = RowScope {
                positions: &positions,
                row,
            };
            predicates
                .iter()
                .all(|p| evaluate(p, &scope, &self.bindings))
        });
    }

    /// Nulls the `label` side of rows that satisfy the join `equalities` but
    /// fail `conditions`. Such a row is kept once, and only when the rest of
    /// it found no passing match.
    fn demote_failed_matches(
        &self,
        relation: Relation,
        label: &str,
        equalities: &[Expr],
        conditions: &[Expr],
    ) -> Relation {
        let prefix = format!("{}.", label);
        let Some(id) = relation.column_index(&format!("{}{}", prefix, ID_FIELD)) else {
            return relation;
        };
        let own: Vec<bool> = relation
            .columns()
            .iter()
            .map(|c| c.starts_with(&prefix))
            .collect();
        let positions = column_positions(&relation);
        let columns = relation.columns().to_vec();
        let rest = |row: &[Value]| -> Vec<Value> {
            row.iter()
                .zip(own.iter())
                .filter(|(_, o)| !**o)
                .map(|(v, _)| v.clone())
                .collect()
        };

        let mut kept = Vec::new();
        let mut demoted = Vec::new();
        let mut matched: HashSet<Vec<Value>> = HashSet::new();
        for mut row in relation.into_rows() {
            let (joined, passes) = {
                let scope = RowScope {
                    positions: &positions,
                    row: &row,
                };
                let joined = !row[id].is_null()
                    && equalities
                        .iter()
                        .all(|p| evaluate(p, &scope, &self.bindings));
                let passes = joined
                    && conditions
                        .iter()
                        .all(|p| evaluate(p, &scope, &self.bindings));
                (joined, passes)
            };
            if !joined {
                kept.push(row);
            } else if passes {
                matched.insert(rest(&row[..]));
                kept.push(row);
            } else {
                for (value, is_own) in row.iter_mut().zip(own.iter()) {
                    if *is_own {
                        *value = Value::Null;
                    }
                }
                demoted.push(row);
            }
        }

        let mut seen = HashSet::new();
        for row in demoted {
            let key = rest(&row[..]);
            if !matched.contains(&key) && seen.insert(key) {
                kept.push(row);
            }
        }
        Relation::with_rows(columns, kept)
    }

    /// Result of a statement whose joined relation is empty: no rows, or one
    /// row of empty-input aggregates.
    fn empty_result(&self, tree: &QueryTree) -> Vec<TupleRow> {
        if !tree.is_aggregate() {
            return Vec::new();
        }
        let values = tree
            .function_calls
            .iter()
            .filter_map(|(&idx, &func)| {
                let key = tree.aggregate_key(idx)?;
                Some((key, aggregate(func, core::iter::empty())))
            })
            .collect();
        alloc::vec![TupleRow {
            records: Vec::new(),
            values,
        }]
    }

    fn resolve_ref(&self, tree: &QueryTree, sources: &[Source], c: &ColumnRef) -> Resolved {
        match &c.table {
            Some(name) => match tree.resolve_label(name) {
                Some(label) => Resolved::Column(QualifiedColumn::new(label, c.column.clone())),
                None => Resolved::UnknownTable,
            },
            None => match self.find_bare(sources, &c.column) {
                Some(pos) => Resolved::Column(QualifiedColumn::new(
                    sources[pos].label.clone(),
                    c.column.clone(),
                )),
                None => Resolved::UnknownColumn,
            },
        }
    }

    /// First source that declares (registry) or carries (data) a column.
    fn find_bare(&self, sources: &[Source], column: &str) -> Option<usize> {
        if sources.len() == 1 {
            return Some(0);
        }
        if let Some(registry) = self.registry {
            let declared = sources.iter().position(|s| {
                registry
                    .table(&s.table)
                    .map(|t| t.has_column(column))
                    .unwrap_or(false)
            });
            if declared.is_some() {
                return declared;
            }
        }
        sources
            .iter()
            .position(|s| s.index.values().any(|r| r.contains(column)))
    }

    fn is_temporal(&self, tree: &QueryTree, label: &str, column: &str) -> bool {
        let Some(registry) = self.registry else {
            return false;
        };
        tree.table_of_label(label)
            .and_then(|table| registry.table(table))
            .and_then(|t| t.column(column))
            .map(|c| c.is_temporal())
            .unwrap_or(false)
    }

    fn decode_if_temporal(&self, tree: &QueryTree, label: &str, column: &str, value: Value) -> Value {
        if !value.is_null() && self.is_temporal(tree, label, column) {
            self.codec.decode(&value, DataType::DateTime)
        } else {
            value
        }
    }

    /// Decodes literals compared against temporal columns so both sides of
    /// the comparison are in decoded form.
    fn decode_temporal_literals(&self, tree: &QueryTree, expr: &mut Expr) {
        match expr {
            Expr::Compare { left, right, .. } => {
                if self.is_temporal_column(tree, left) {
                    self.decode_literal(right);
                }
                if self.is_temporal_column(tree, right) {
                    self.decode_literal(left);
                }
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                if self.is_temporal_column(tree, expr) {
                    self.decode_literal(low);
                    self.decode_literal(high);
                }
            }
            Expr::InList { expr, list, .. } => {
                if self.is_temporal_column(tree, expr) {
                    for item in list.iter_mut() {
                        self.decode_literal(item);
                    }
                }
            }
            Expr::And(l, r) | Expr::Or(l, r) => {
                self.decode_temporal_literals(tree, l);
                self.decode_temporal_literals(tree, r);
            }
            Expr::Not(e) => self.decode_temporal_literals(tree, e),
            Expr::Column(_) | Expr::Literal(_) | Expr::Placeholder(_) | Expr::Like { .. } => {}
        }
    }

    fn is_temporal_column(&self, tree: &QueryTree, expr: &Expr) -> bool {
        match expr {
            Expr::Column(ColumnRef {
                table: Some(label),
                column,
            }) => self.is_temporal(tree, label, column),
            _ => false,
        }
    }

    fn decode_literal(&self, expr: &mut Expr) {
        if let Expr::Literal(value) = expr {
            if !value.is_null() {
                *value = self.codec.decode(value, DataType::DateTime);
            }
        }
    }

    /// Projects a source down to its needed columns, decoding temporal ones.
    fn project(&self, source: &Source, columns: &BTreeSet<String>) -> Relation {
        let temporal: Vec<bool> = columns
            .iter()
            .map(|c| {
                self.registry
                    .and_then(|r| r.table(&source.table))
                    .and_then(|t| t.column(c))
                    .map(|col| col.is_temporal())
                    .unwrap_or(false)
            })
            .collect();
        let names = columns
            .iter()
            .map(|c| format!("{}.{}", source.label, c))
            .collect();
        let rows = source
            .index
            .values()
            .map(|record| {
                columns
                    .iter()
                    .zip(temporal.iter())
                    .map(|(column, &is_temporal)| {
                        let value = record.get_or_null(column);
                        if is_temporal && !value.is_null() {
                            self.codec.decode(&value, DataType::DateTime)
                        } else {
                            value
                        }
                    })
                    .collect()
            })
            .collect();
        Relation::with_rows(names, rows)
    }

    /// Sources whose records the SELECT list asks for, in FROM order. Falls
    /// back to every source when nothing resolves.
    fn selected_sources(&self, tree: &QueryTree, sources: &[Source]) -> Vec<usize> {
        let mut mask = alloc::vec![false; sources.len()];
        for attr in &tree.attributes {
            match attr {
                Attribute::Wildcard => mask.iter_mut().for_each(|m| *m = true),
                Attribute::AllOf(name) => {
                    if let Some(pos) = tree
                        .resolve_label(name)
                        .and_then(|label| tree.label_position(label))
                    {
                        mask[pos] = true;
                    }
                }
                Attribute::Column(c) => {
                    if let Resolved::Column(q) = self.resolve_ref(tree, sources, c) {
                        if let Some(pos) = tree.label_position(&q.table) {
                            mask[pos] = true;
                        }
                    }
                }
            }
        }
        if !mask.contains(&true) {
            mask.iter_mut().for_each(|m| *m = true);
        }
        (0..sources.len()).filter(|&i| mask[i]).collect()
    }
}

/// Extracts join pairs and pins both sides to FROM labels. `None` when a side
/// names no label.
fn resolve_pairs(tree: &QueryTree, clauses: &[String]) -> Option<Vec<JoinPair>> {
    let mut out = Vec::new();
    for pair in extract_join_pairs(clauses) {
        let (Some(left), Some(right)) = (
            tree.resolve_label(&pair.left.table),
            tree.resolve_label(&pair.right.table),
        ) else {
            tracing::debug!(
                left = pair.left.table.as_str(),
                right = pair.right.table.as_str(),
                "join pair names an unknown table"
            );
            return None;
        };
        let resolved = JoinPair::new(
            QualifiedColumn::new(left, pair.left.column),
            QualifiedColumn::new(right, pair.right.column),
        );
        if !out.contains(&resolved) {
            out.push(resolved);
        }
    }
    Some(out)
}

/// The optional side of a LEFT JOIN pair: the label introduced later in FROM.
fn optional_side(tree: &QueryTree, pair: &JoinPair) -> Option<usize> {
    let left = tree.label_position(&pair.left.table)?;
    let right = tree.label_position(&pair.right.table)?;
    Some(left.max(right))
}

fn column_positions(relation: &Relation) -> HashMap<String, usize> {
    relation
        .columns()
        .iter()
        .enumerate()
        .map(|(i, c)| (c.clone(), i))
        .collect()
}

fn flat_column(column: &QualifiedColumn) -> Expr {
    Expr::Column(ColumnRef::bare(column.flat()))
}

/// Rewrites `label.column` references into flattened relation column names.
fn flatten_columns(expr: &mut Expr) {
    expr.visit_columns_mut(&mut |c: &mut ColumnRef| {
        if let Some(label) = c.table.take() {
            c.column = format!("{}.{}", label, c.column);
        }
    });
}
