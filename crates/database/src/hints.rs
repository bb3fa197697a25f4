//! Backend read hints derived from WHERE clauses.
//!
//! A top-level conjunct `label.id = literal`, `label.col = literal` on a
//! secondary-indexed column, or `label.col IN (literals)` must hold for every
//! result row, so the backend only needs to return the records it selects.
//! Hints from several conjuncts are unioned by the backend; the result is a
//! superset of what the filter keeps, which the tuple engine then narrows.

use kvorm_core::schema::SchemaRegistry;
use kvorm_core::{Value, ID_FIELD};
use kvorm_query::ast::{ColumnRef, CompareOp, Expr};
use kvorm_query::QueryTree;
use kvorm_storage::Hint;

/// Hints for loading `table` on behalf of `tree`. Empty means "read
/// everything".
///
/// Only tables that appear exactly once in FROM are hinted; a self-joined
/// table feeds several labels from one record set.
pub fn derive_hints(
    tree: &QueryTree,
    registry: &SchemaRegistry,
    table: &str,
    max_depth: usize,
) -> Vec<Hint> {
    let mut positions = tree
        .models
        .iter()
        .enumerate()
        .filter(|(_, model)| model.as_str() == table)
        .map(|(i, _)| i);
    let (Some(position), None) = (positions.next(), positions.next()) else {
        return Vec::new();
    };
    let label = tree.labels[position].as_str();

    let mut hints = Vec::new();
    for clause in &tree.where_clauses {
        let Ok(expr) = Expr::parse_with(clause, max_depth) else {
            return Vec::new();
        };
        match &expr {
            Expr::Compare {
                left,
                op: CompareOp::Eq,
                right,
            } => {
                let pair = match (left.as_ref(), right.as_ref()) {
                    (Expr::Column(c), Expr::Literal(v)) | (Expr::Literal(v), Expr::Column(c)) => {
                        Some((c, v))
                    }
                    _ => None,
                };
                if let Some((column, value)) = pair {
                    if let Some(hint) = hint_for(tree, registry, table, label, column, value) {
                        push_unique(&mut hints, hint);
                    }
                }
            }
            Expr::InList {
                expr,
                list,
                negated: false,
            } => {
                let Expr::Column(column) = expr.as_ref() else {
                    continue;
                };
                let mut found = Vec::with_capacity(list.len());
                for item in list {
                    match item {
                        Expr::Literal(value) => {
                            match hint_for(tree, registry, table, label, column, value) {
                                Some(hint) => found.push(hint),
                                None => {
                                    found.clear();
                                    break;
                                }
                            }
                        }
                        // A placeholder makes the set unknown at load time.
                        _ => {
                            found.clear();
                            break;
                        }
                    }
                }
                for hint in found {
                    push_unique(&mut hints, hint);
                }
            }
            _ => {}
        }
    }
    if !hints.is_empty() {
        tracing::debug!(table, hints = hints.len(), "derived read hints");
    }
    hints
}

fn hint_for(
    tree: &QueryTree,
    registry: &SchemaRegistry,
    table: &str,
    label: &str,
    column: &ColumnRef,
    value: &Value,
) -> Option<Hint> {
    let refers_to_label = match &column.table {
        Some(name) => tree.resolve_label(name) == Some(label),
        None => tree.labels.len() == 1,
    };
    if !refers_to_label || value.is_null() {
        return None;
    }
    if column.column == ID_FIELD {
        return match value {
            Value::Int64(id) => Some(Hint::Id(*id)),
            _ => None,
        };
    }
    let declared = registry.table(table)?.column(&column.column)?;
    // Temporal values are stored encoded; the literal is not.
    if declared.is_indexed() && !declared.is_temporal() {
        Some(Hint::index(column.column.clone(), value.clone()))
    } else {
        None
    }
}

fn push_unique(hints: &mut Vec<Hint>, hint: Hint) {
    if !hints.contains(&hint) {
        hints.push(hint);
    }
}
