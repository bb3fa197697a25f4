//! Join-pair extraction.
//!
//! A joining clause is canonical text of the shape `label.column = label.column`
//! (identifiers bare or double-quoted). Anything else is dropped with a warning.

use crate::parser::lexer::{tokenize, TokenKind};
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

/// A fully qualified column reference.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualifiedColumn {
    pub table: String,
    pub column: String,
}

impl QualifiedColumn {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Flattened relation column name.
    pub fn flat(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }
}

/// An equality constraint between two columns. The sides keep the order they
/// were written in; identity is order-independent.
#[derive(Clone, Debug, Eq)]
pub struct JoinPair {
    pub left: QualifiedColumn,
    pub right: QualifiedColumn,
}

impl JoinPair {
    pub fn new(left: QualifiedColumn, right: QualifiedColumn) -> Self {
        Self { left, right }
    }

    /// The two sides in canonical (sorted) order.
    pub fn normalized(&self) -> (&QualifiedColumn, &QualifiedColumn) {
        if self.left <= self.right {
            (&self.left, &self.right)
        } else {
            (&self.right, &self.left)
        }
    }
}

impl PartialEq for JoinPair {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

/// Parses one joining clause.
pub fn parse_join_pair(clause: &str) -> Option<JoinPair> {
    let tokens = tokenize(clause).ok()?;
    let kinds: Vec<&TokenKind> = tokens.iter().map(|t| &t.kind).collect();
    match kinds.as_slice() {
        [TokenKind::Ident(lt), TokenKind::Dot, TokenKind::Ident(lc), TokenKind::Eq, TokenKind::Ident(rt), TokenKind::Dot, TokenKind::Ident(rc), TokenKind::Eof] => {
            Some(JoinPair::new(
                QualifiedColumn::new(lt.clone(), lc.clone()),
                QualifiedColumn::new(rt.clone(), rc.clone()),
            ))
        }
        _ => None,
    }
}

/// Extracts join pairs from joining clauses, dropping malformed clauses and
/// duplicates (by unordered pair). Order of first occurrence is kept.
pub fn extract_join_pairs<S: AsRef<str>>(clauses: &[S]) -> Vec<JoinPair> {
    let mut pairs: Vec<JoinPair> = Vec::new();
    for clause in clauses {
        let clause = clause.as_ref();
        match parse_join_pair(clause) {
            Some(pair) => {
                if !pairs.contains(&pair) {
                    pairs.push(pair);
                }
            }
            None => {
                tracing::warn!(clause, "dropping joining clause that is not a column equality");
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_join_pair() {
        let pair = parse_join_pair("Authors.id = Books.author_id").unwrap();
        assert_eq!(pair.left, QualifiedColumn::new("Authors", "id"));
        assert_eq!(pair.right, QualifiedColumn::new("Books", "author_id"));
        assert_eq!(pair.right.flat(), "Books.author_id");
    }

    #[test]
    fn test_parse_join_pair_quoted() {
        let pair = parse_join_pair("\"Order\".\"from\" = b.id").unwrap();
        assert_eq!(pair.left, QualifiedColumn::new("Order", "from"));
    }

    #[test]
    fn test_parse_join_pair_malformed() {
        assert!(parse_join_pair("a.id = 1").is_none());
        assert!(parse_join_pair("a.id > b.id").is_none());
        assert!(parse_join_pair("a.id = b.id AND c.x = d.y").is_none());
        assert!(parse_join_pair("id = b.id").is_none());
        assert!(parse_join_pair("'unterminated").is_none());
    }

    #[test]
    fn test_extract_dedupes_unordered() {
        let pairs = extract_join_pairs(&[
            "a.id = b.a_id",
            "b.a_id = a.id",
            "nonsense",
            "b.id = c.b_id",
            "a.id = b.a_id",
        ]);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].left.table, "a");
        assert_eq!(pairs[1].left.table, "b");
    }
}
