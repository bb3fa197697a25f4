//! Predicate expression AST.
//!
//! Where clauses travel through the query tree as canonical text; this module
//! is the structured form the compiler renders from and the tuple engine
//! parses back into. `Display` produces the canonical text.

use crate::parser::lexer::Keyword;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use kvorm_core::{Result, Value};

/// Reference to a column, optionally qualified by a FROM label.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnRef {
    /// Table name or alias; `None` for bare column names.
    pub table: Option<String>,
    pub column: String,
}

impl ColumnRef {
    /// Creates a qualified column reference.
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            column: column.into(),
        }
    }

    /// Creates an unqualified column reference.
    pub fn bare(column: impl Into<String>) -> Self {
        Self {
            table: None,
            column: column.into(),
        }
    }

    /// Returns the flattened name (`table.column`, or `column` when bare).
    pub fn normalized_name(&self) -> String {
        match &self.table {
            Some(table) => alloc::format!("{}.{}", table, self.column),
            None => self.column.clone(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(table) = &self.table {
            write_ident(f, table)?;
            f.write_str(".")?;
        }
        write_ident(f, &self.column)
    }
}

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Predicate expression node.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    Literal(Value),
    /// Name of a subquery whose values are bound at execution time.
    Placeholder(String),
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: String,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
}

/// Prefix of generated subquery placeholder names.
pub const PLACEHOLDER_PREFIX: &str = "__subquery_";

/// Builds the placeholder name for the `n`-th subquery of a statement.
pub fn placeholder_name(n: usize) -> String {
    alloc::format!("{}{}__", PLACEHOLDER_PREFIX, n)
}

/// Whether an identifier is a generated subquery placeholder.
pub fn is_placeholder(name: &str) -> bool {
    name.strip_prefix(PLACEHOLDER_PREFIX)
        .and_then(|rest| rest.strip_suffix("__"))
        .map(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

impl Expr {
    /// Parses canonical predicate text (as stored in a query tree).
    pub fn parse(text: &str) -> Result<Expr> {
        crate::parser::parse_predicate(text, crate::parser::CompilerOptions::default().max_depth)
    }

    /// Like [`Expr::parse`], with the nesting bound the statement was
    /// compiled under.
    pub fn parse_with(text: &str, max_depth: usize) -> Result<Expr> {
        crate::parser::parse_predicate(text, max_depth)
    }

    pub fn column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column(ColumnRef::new(table, column))
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn compare(left: Expr, op: CompareOp, right: Expr) -> Self {
        Expr::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::compare(left, CompareOp::Eq, right)
    }

    pub fn ne(left: Expr, right: Expr) -> Self {
        Self::compare(left, CompareOp::Ne, right)
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Expr::Or(Box::new(left), Box::new(right))
    }

    pub fn not(expr: Expr) -> Self {
        Expr::Not(Box::new(expr))
    }

    /// Conjunction of all expressions; `None` for an empty input.
    pub fn and_all(exprs: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        exprs.into_iter().reduce(Expr::and)
    }

    /// Splits top-level AND chains into their conjuncts.
    pub fn into_conjuncts(self) -> Vec<Expr> {
        let mut out = Vec::new();
        let mut stack = alloc::vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Expr::And(l, r) => {
                    stack.push(*r);
                    stack.push(*l);
                }
                other => out.push(other),
            }
        }
        out
    }

    /// Returns `(left, right)` when this is an equality between two columns
    /// qualified by different labels.
    pub fn as_join_equality(&self) -> Option<(&ColumnRef, &ColumnRef)> {
        match self {
            Expr::Compare {
                left,
                op: CompareOp::Eq,
                right,
            } => match (left.as_ref(), right.as_ref()) {
                (Expr::Column(l), Expr::Column(r))
                    if l.table.is_some() && r.table.is_some() && l.table != r.table =>
                {
                    Some((l, r))
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// Visits every column reference.
    pub fn visit_columns<'a>(&'a self, f: &mut impl FnMut(&'a ColumnRef)) {
        match self {
            Expr::Column(c) => f(c),
            Expr::Literal(_) | Expr::Placeholder(_) => {}
            Expr::Compare { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
                left.visit_columns(f);
                right.visit_columns(f);
            }
            Expr::Not(e) | Expr::Like { expr: e, .. } => e.visit_columns(f),
            Expr::InList { expr, list, .. } => {
                expr.visit_columns(f);
                for item in list {
                    item.visit_columns(f);
                }
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                expr.visit_columns(f);
                low.visit_columns(f);
                high.visit_columns(f);
            }
        }
    }

    /// Mutable counterpart of [`visit_columns`](Self::visit_columns).
    pub fn visit_columns_mut(&mut self, f: &mut impl FnMut(&mut ColumnRef)) {
        match self {
            Expr::Column(c) => f(c),
            Expr::Literal(_) | Expr::Placeholder(_) => {}
            Expr::Compare { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
                left.visit_columns_mut(f);
                right.visit_columns_mut(f);
            }
            Expr::Not(e) | Expr::Like { expr: e, .. } => e.visit_columns_mut(f),
            Expr::InList { expr, list, .. } => {
                expr.visit_columns_mut(f);
                for item in list {
                    item.visit_columns_mut(f);
                }
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                expr.visit_columns_mut(f);
                low.visit_columns_mut(f);
                high.visit_columns_mut(f);
            }
        }
    }

    /// Binding strength used when rendering; higher binds tighter.
    fn precedence(&self) -> u8 {
        match self {
            Expr::Or(..) => 1,
            Expr::And(..) => 2,
            Expr::Not(_) => 3,
            Expr::Compare { .. } | Expr::InList { .. } | Expr::Like { .. } | Expr::Between { .. } => 4,
            Expr::Column(_) | Expr::Literal(_) | Expr::Placeholder(_) => 5,
        }
    }

    fn fmt_child(&self, f: &mut fmt::Formatter<'_>, min_precedence: u8) -> fmt::Result {
        if self.precedence() < min_precedence {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{}", c),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Placeholder(name) => f.write_str(name),
            Expr::Compare { left, op, right } => {
                left.fmt_child(f, 5)?;
                write!(f, " {} ", op.symbol())?;
                right.fmt_child(f, 5)
            }
            Expr::And(l, r) => {
                l.fmt_child(f, 2)?;
                f.write_str(" AND ")?;
                r.fmt_child(f, 3)
            }
            Expr::Or(l, r) => {
                l.fmt_child(f, 1)?;
                f.write_str(" OR ")?;
                r.fmt_child(f, 2)
            }
            Expr::Not(e) => {
                f.write_str("NOT ")?;
                e.fmt_child(f, 3)
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                expr.fmt_child(f, 5)?;
                f.write_str(if *negated { " NOT IN (" } else { " IN (" })?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt_child(f, 5)?;
                }
                f.write_str(")")
            }
            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                expr.fmt_child(f, 5)?;
                f.write_str(if *negated { " NOT LIKE " } else { " LIKE " })?;
                write!(f, "{}", Value::String(pattern.clone()))
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                expr.fmt_child(f, 5)?;
                f.write_str(if *negated { " NOT BETWEEN " } else { " BETWEEN " })?;
                low.fmt_child(f, 5)?;
                f.write_str(" AND ")?;
                high.fmt_child(f, 5)
            }
        }
    }
}

/// Writes an identifier, quoting it when it would not lex back as a bare
/// identifier.
pub(crate) fn write_ident(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    let bare = name
        .bytes()
        .next()
        .map(|b| b.is_ascii_alphabetic() || b == b'_')
        .unwrap_or(false)
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
        && Keyword::lookup(name).is_none();
    if bare {
        return f.write_str(name);
    }
    f.write_str("\"")?;
    for ch in name.chars() {
        if ch == '"' {
            f.write_str("\"\"")?;
        } else {
            write!(f, "{}", ch)?;
        }
    }
    f.write_str("\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_render_compare() {
        let e = Expr::eq(Expr::column("authors", "name"), Expr::literal("Author3"));
        assert_eq!(e.to_string(), "authors.name = 'Author3'");
    }

    #[test]
    fn test_render_quotes_keywords_and_odd_names() {
        let e = Expr::eq(Expr::column("Order", "from"), Expr::column("my table", "id"));
        assert_eq!(e.to_string(), "\"Order\".\"from\" = \"my table\".id");
    }

    #[test]
    fn test_render_precedence() {
        let a = Expr::eq(Expr::column("t", "a"), Expr::literal(1i64));
        let b = Expr::eq(Expr::column("t", "b"), Expr::literal(2i64));
        let c = Expr::eq(Expr::column("t", "c"), Expr::literal(3i64));

        let e = Expr::and(Expr::or(a.clone(), b.clone()), c.clone());
        assert_eq!(e.to_string(), "(t.a = 1 OR t.b = 2) AND t.c = 3");

        let e = Expr::or(a.clone(), Expr::and(b.clone(), c.clone()));
        assert_eq!(e.to_string(), "t.a = 1 OR t.b = 2 AND t.c = 3");

        let e = Expr::not(Expr::and(a, b));
        assert_eq!(e.to_string(), "NOT (t.a = 1 AND t.b = 2)");
    }

    #[test]
    fn test_render_in_like_between() {
        let e = Expr::InList {
            expr: Box::new(Expr::column("b", "id")),
            list: alloc::vec![Expr::Placeholder(placeholder_name(0))],
            negated: true,
        };
        assert_eq!(e.to_string(), "b.id NOT IN (__subquery_0__)");

        let e = Expr::Like {
            expr: Box::new(Expr::column("b", "title")),
            pattern: "Book%".into(),
            negated: false,
        };
        assert_eq!(e.to_string(), "b.title LIKE 'Book%'");

        let e = Expr::Between {
            expr: Box::new(Expr::column("b", "id")),
            low: Box::new(Expr::literal(1i64)),
            high: Box::new(Expr::literal(4i64)),
            negated: false,
        };
        assert_eq!(e.to_string(), "b.id BETWEEN 1 AND 4");
    }

    #[test]
    fn test_placeholder_names() {
        assert_eq!(placeholder_name(3), "__subquery_3__");
        assert!(is_placeholder("__subquery_12__"));
        assert!(!is_placeholder("__subquery___"));
        assert!(!is_placeholder("subquery_1"));
    }

    #[test]
    fn test_conjuncts() {
        let a = Expr::eq(Expr::column("t", "a"), Expr::literal(1i64));
        let b = Expr::eq(Expr::column("t", "b"), Expr::literal(2i64));
        let c = Expr::eq(Expr::column("t", "c"), Expr::literal(3i64));
        let e = Expr::and(Expr::and(a.clone(), b.clone()), c.clone());
        assert_eq!(e.into_conjuncts(), alloc::vec![a, b, c]);
    }

    #[test]
    fn test_join_equality() {
        let e = Expr::eq(Expr::column("a", "id"), Expr::column("b", "a_id"));
        assert!(e.as_join_equality().is_some());

        let same_label = Expr::eq(Expr::column("a", "x"), Expr::column("a", "y"));
        assert!(same_label.as_join_equality().is_none());

        let literal = Expr::eq(Expr::column("a", "x"), Expr::literal(1i64));
        assert!(literal.as_join_equality().is_none());
    }
}
