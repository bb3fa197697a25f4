//! Compiled query tree.

use crate::ast::ColumnRef;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// Aggregate functions supported in the SELECT list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AggregateFunc {
    Count,
    Sum,
    Min,
    Max,
}

impl AggregateFunc {
    /// Looks up a function name, case-insensitively.
    pub fn lookup(name: &str) -> Option<AggregateFunc> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Some(AggregateFunc::Count),
            "sum" => Some(AggregateFunc::Sum),
            "min" => Some(AggregateFunc::Min),
            "max" => Some(AggregateFunc::Max),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunc::Count => "count",
            AggregateFunc::Sum => "sum",
            AggregateFunc::Min => "min",
            AggregateFunc::Max => "max",
        }
    }
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One item of the SELECT list.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Attribute {
    /// `*`
    Wildcard,
    /// `label.*`
    AllOf(String),
    Column(ColumnRef),
}

impl Attribute {
    /// The FROM label this attribute names explicitly, if any.
    pub fn label(&self) -> Option<&str> {
        match self {
            Attribute::Wildcard => None,
            Attribute::AllOf(label) => Some(label),
            Attribute::Column(c) => c.table.as_deref(),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Wildcard => f.write_str("*"),
            Attribute::AllOf(label) => {
                crate::ast::expr::write_ident(f, label)?;
                f.write_str(".*")
            }
            Attribute::Column(c) => write!(f, "{}", c),
        }
    }
}

/// Structural form of a SELECT statement.
///
/// `models` and `labels` are parallel: `labels[i]` is the name FROM item `i`
/// is referred to by (its alias, or the table name). `where_clauses`,
/// `joining_clauses`, `outer_joins` and `outer_join_filters` hold canonical
/// predicate text.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QueryTree {
    pub attributes: Vec<Attribute>,
    pub models: Vec<String>,
    pub labels: Vec<String>,
    /// alias → table name.
    pub aliases: BTreeMap<String, String>,
    /// One entry per top-level conjunct.
    pub where_clauses: Vec<String>,
    /// `label.column = label.column` equalities.
    pub joining_clauses: Vec<String>,
    /// The joining clauses that came from a LEFT JOIN; the label introduced
    /// later in FROM is the optional side.
    pub outer_joins: Vec<String>,
    /// optional label → the other conditions of its LEFT JOIN's `ON`. They
    /// decide whether a row matches, never whether the left row survives.
    pub outer_join_filters: BTreeMap<String, Vec<String>>,
    /// attribute index → aggregate applied to it.
    pub function_calls: BTreeMap<usize, AggregateFunc>,
    /// placeholder name → nested statement.
    pub variables: BTreeMap<String, QueryTree>,
}

impl QueryTree {
    /// Resolves a label or table name used in a clause to the underlying table.
    pub fn table_for(&self, name: &str) -> Option<&str> {
        if let Some(table) = self.aliases.get(name) {
            return Some(table);
        }
        self.models
            .iter()
            .find(|m| m.as_str() == name)
            .map(String::as_str)
    }

    /// Resolves a name used in a clause to a FROM label. A bare table name
    /// resolves when that table appears exactly once.
    pub fn resolve_label(&self, name: &str) -> Option<&str> {
        if let Some(label) = self.labels.iter().find(|l| l.as_str() == name) {
            return Some(label);
        }
        let mut matches = self
            .models
            .iter()
            .zip(self.labels.iter())
            .filter(|(model, _)| model.as_str() == name);
        match (matches.next(), matches.next()) {
            (Some((_, label)), None) => Some(label),
            _ => None,
        }
    }

    /// Table behind a FROM label.
    pub fn table_of_label(&self, label: &str) -> Option<&str> {
        self.labels
            .iter()
            .position(|l| l == label)
            .map(|i| self.models[i].as_str())
    }

    /// Position of a label in the FROM list.
    pub fn label_position(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Whether the SELECT list contains an aggregate.
    #[inline]
    pub fn is_aggregate(&self) -> bool {
        !self.function_calls.is_empty()
    }

    /// Distinct table names in FROM order.
    pub fn tables(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for model in &self.models {
            if !out.contains(&model.as_str()) {
                out.push(model);
            }
        }
        out
    }

    /// Key under which an aggregate attribute is reported: `func(attr)`.
    pub fn aggregate_key(&self, index: usize) -> Option<String> {
        let func = self.function_calls.get(&index)?;
        let attr = self.attributes.get(index)?;
        Some(alloc::format!("{}({})", func, attr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    fn tree() -> QueryTree {
        let mut tree = QueryTree::default();
        tree.models = alloc::vec!["authors".into(), "books".into(), "books".into()];
        tree.labels = alloc::vec!["authors".into(), "b1".into(), "b2".into()];
        tree.aliases.insert("b1".into(), "books".into());
        tree.aliases.insert("b2".into(), "books".into());
        tree
    }

    #[test]
    fn test_resolve_label() {
        let tree = tree();
        assert_eq!(tree.resolve_label("authors"), Some("authors"));
        assert_eq!(tree.resolve_label("b2"), Some("b2"));
        // `books` appears twice, so the bare table name is ambiguous.
        assert_eq!(tree.resolve_label("books"), None);
        assert_eq!(tree.resolve_label("shelves"), None);
    }

    #[test]
    fn test_table_for() {
        let tree = tree();
        assert_eq!(tree.table_for("b1"), Some("books"));
        assert_eq!(tree.table_for("authors"), Some("authors"));
        assert_eq!(tree.table_of_label("b2"), Some("books"));
        assert_eq!(tree.tables(), alloc::vec!["authors", "books"]);
    }

    #[test]
    fn test_aggregate_key() {
        let mut tree = QueryTree::default();
        tree.attributes = alloc::vec![Attribute::Column(ColumnRef::bare("id"))];
        tree.function_calls.insert(0, AggregateFunc::Count);
        assert_eq!(tree.aggregate_key(0).unwrap(), "count(id)");
        assert!(tree.aggregate_key(1).is_none());
    }

    #[test]
    fn test_attribute_display() {
        assert_eq!(Attribute::Wildcard.to_string(), "*");
        assert_eq!(Attribute::AllOf("b".into()).to_string(), "b.*");
        assert_eq!(
            Attribute::Column(ColumnRef::new("b", "title")).to_string(),
            "b.title"
        );
    }
}
