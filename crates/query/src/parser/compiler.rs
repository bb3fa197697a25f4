//! SQL SELECT compiler.
//!
//! Turns a single `SELECT` statement into a [`QueryTree`]. The grammar:
//!
//! ```text
//! statement  := SELECT select_list FROM from_list [WHERE predicate] [';']
//! select_list:= '*' | item (',' item)*
//! item       := func '(' column | '*' ')' [AS name] | label '.' '*' | column [AS name]
//! from_list  := from_item (',' from_item | [INNER] JOIN from_item ON predicate
//!                         | LEFT [OUTER] JOIN from_item ON predicate)*
//! from_item  := table [[AS] alias]
//! predicate  := conj (OR conj)*
//! conj       := neg (AND neg)*
//! neg        := NOT neg | '(' predicate ')' | operand test
//! test       := cmp operand | IS [NOT] NULL | [NOT] IN '(' list | select ')'
//!             | [NOT] LIKE 'pattern' | [NOT] BETWEEN operand AND operand
//! operand    := column | literal | '(' select ')'
//! ```
//!
//! Recursion through parentheses, `NOT` and subqueries is bounded by
//! [`CompilerOptions::max_depth`]. No table or column is validated here.

use super::lexer::{tokenize, Keyword, Token, TokenKind};
use crate::ast::{placeholder_name, is_placeholder, ColumnRef, CompareOp, Expr};
use crate::tree::{AggregateFunc, Attribute, QueryTree};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use kvorm_core::{Error, Result, Value};

/// Compiler settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CompilerOptions {
    /// Maximum nesting of parentheses, `NOT` and subqueries.
    pub max_depth: usize,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self { max_depth: 8 }
    }
}

impl CompilerOptions {
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Compiles SELECT statements into query trees.
#[derive(Clone, Debug, Default)]
pub struct Compiler {
    options: CompilerOptions,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CompilerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn compile(&self, text: &str) -> Result<QueryTree> {
        let mut parser = Parser::new(tokenize(text)?, self.options.max_depth, true);
        let first = parser.peek().clone();
        if !first.is_keyword(Keyword::Select) {
            return Err(Error::parse(
                "only SELECT statements are supported",
                parser.position(),
            ));
        }

        let tree = parser.parse_select(0)?;

        if parser.eat(&TokenKind::Semicolon) && !parser.at_eof() {
            return Err(Error::parse(
                "multiple statements are not supported",
                parser.position(),
            ));
        }
        if !parser.at_eof() {
            return Err(parser.unexpected("end of statement"));
        }

        tracing::debug!(
            attributes = tree.attributes.len(),
            models = tree.models.len(),
            where_clauses = tree.where_clauses.len(),
            joining_clauses = tree.joining_clauses.len(),
            variables = tree.variables.len(),
            "compiled query"
        );
        Ok(tree)
    }
}

/// Compiles a statement with default options.
pub fn compile(text: &str) -> Result<QueryTree> {
    Compiler::new().compile(text)
}

/// Parses a standalone predicate. Subqueries are not allowed; placeholders
/// referring to already compiled subqueries are.
pub(crate) fn parse_predicate(text: &str, max_depth: usize) -> Result<Expr> {
    let mut parser = Parser::new(tokenize(text)?, max_depth, false);
    let mut variables = BTreeMap::new();
    let expr = parser.parse_or(0, &mut variables)?;
    if !parser.at_eof() {
        return Err(parser.unexpected("end of predicate"));
    }
    Ok(expr)
}

/// A joining equality and whether it came from a LEFT JOIN.
struct JoinClause {
    expr: Expr,
    outer: bool,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    max_depth: usize,
    allow_subqueries: bool,
    next_placeholder: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, max_depth: usize, allow_subqueries: bool) -> Self {
        Self {
            tokens,
            pos: 0,
            max_depth,
            allow_subqueries,
            next_placeholder: 0,
        }
    }

    fn peek(&self) -> &TokenKind {
        // The token list always ends with Eof and `advance` never moves past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].kind
    }

    fn position(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].position
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if !matches!(kind, TokenKind::Eof) {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        if self.peek().is_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> Result<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("{:?}", kw).to_ascii_uppercase()))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn unexpected(&self, expected: &str) -> Error {
        let found = match self.peek() {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Ident(name) => format!("identifier '{}'", name),
            TokenKind::Keyword(kw) => format!("keyword {:?}", kw).to_ascii_uppercase(),
            other => format!("{:?}", other),
        };
        Error::parse(format!("expected {}, found {}", expected, found), self.position())
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            Err(Error::parse(
                format!("maximum nesting depth {} exceeded", self.max_depth),
                self.position(),
            ))
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Statement
    // =========================================================================

    fn parse_select(&mut self, depth: usize) -> Result<QueryTree> {
        self.check_depth(depth)?;
        self.expect_keyword(Keyword::Select)?;

        let mut tree = QueryTree::default();
        self.parse_select_list(&mut tree)?;
        self.expect_keyword(Keyword::From)?;

        let mut joins: Vec<JoinClause> = Vec::new();
        let mut filters: Vec<Expr> = Vec::new();
        let mut on_filters: Vec<(String, Expr)> = Vec::new();
        let mut variables = BTreeMap::new();

        self.parse_from_item(&mut tree)?;
        loop {
            if self.eat(&TokenKind::Comma) {
                self.parse_from_item(&mut tree)?;
                continue;
            }
            let outer = if self.eat_keyword(Keyword::Left) {
                self.eat_keyword(Keyword::Outer);
                true
            } else if self.eat_keyword(Keyword::Inner) {
                false
            } else if self.peek().is_keyword(Keyword::Join) {
                false
            } else {
                break;
            };
            self.expect_keyword(Keyword::Join)?;
            self.parse_from_item(&mut tree)?;
            self.expect_keyword(Keyword::On)?;
            let on = self.parse_or(depth, &mut variables)?;
            let optional = tree.labels.last().cloned().unwrap_or_default();
            for conjunct in on.into_conjuncts() {
                if conjunct.as_join_equality().is_some() {
                    joins.push(JoinClause {
                        expr: conjunct,
                        outer,
                    });
                } else if outer {
                    // Part of the match condition: failing it leaves the
                    // left row unmatched instead of dropping it.
                    on_filters.push((optional.clone(), conjunct));
                } else {
                    filters.push(conjunct);
                }
            }
        }

        if self.eat_keyword(Keyword::Where) {
            let predicate = self.parse_or(depth, &mut variables)?;
            for conjunct in predicate.into_conjuncts() {
                if conjunct.as_join_equality().is_some() {
                    joins.push(JoinClause {
                        expr: conjunct,
                        outer: false,
                    });
                } else {
                    filters.push(conjunct);
                }
            }
        }

        // Bare column names are qualified when there is only one FROM item.
        let single_label = match tree.labels.as_slice() {
            [label] => Some(label.clone()),
            _ => None,
        };
        let qualify = |mut expr: Expr| {
            if let Some(label) = &single_label {
                expr.visit_columns_mut(&mut |c: &mut ColumnRef| {
                    if c.table.is_none() {
                        c.table = Some(label.clone());
                    }
                });
            }
            expr
        };

        for join in joins {
            let text = join.expr.to_string();
            if join.outer {
                tree.outer_joins.push(text.clone());
            }
            if !tree.joining_clauses.contains(&text) {
                tree.joining_clauses.push(text);
            }
        }
        for filter in filters {
            tree.where_clauses.push(qualify(filter).to_string());
        }
        for (label, filter) in on_filters {
            tree.outer_join_filters
                .entry(label)
                .or_default()
                .push(qualify(filter).to_string());
        }
        tree.variables = variables;
        Ok(tree)
    }

    fn parse_select_list(&mut self, tree: &mut QueryTree) -> Result<()> {
        if self.eat(&TokenKind::Star) {
            tree.attributes.push(Attribute::Wildcard);
            return Ok(());
        }
        loop {
            let name = self.expect_ident("column or aggregate")?;
            if matches!(self.peek(), TokenKind::LParen) {
                let position = self.position();
                let func = AggregateFunc::lookup(&name).ok_or_else(|| {
                    Error::parse(format!("unsupported function '{}'", name), position)
                })?;
                self.advance();
                let attr = if self.eat(&TokenKind::Star) {
                    if func != AggregateFunc::Count {
                        return Err(Error::parse(
                            format!("{}(*) is not supported", func),
                            position,
                        ));
                    }
                    Attribute::Wildcard
                } else {
                    Attribute::Column(self.parse_column_rest(None)?)
                };
                self.expect(&TokenKind::RParen, "')'")?;
                tree.function_calls.insert(tree.attributes.len(), func);
                tree.attributes.push(attr);
            } else if self.eat(&TokenKind::Dot) {
                if self.eat(&TokenKind::Star) {
                    tree.attributes.push(Attribute::AllOf(name));
                } else {
                    let column = self.expect_ident("column name")?;
                    tree.attributes
                        .push(Attribute::Column(ColumnRef::new(name, column)));
                }
            } else {
                tree.attributes.push(Attribute::Column(ColumnRef::bare(name)));
            }

            // Output names are accepted and ignored.
            if self.eat_keyword(Keyword::As) {
                self.expect_ident("output name")?;
            }
            if !self.eat(&TokenKind::Comma) {
                return Ok(());
            }
        }
    }

    fn parse_from_item(&mut self, tree: &mut QueryTree) -> Result<()> {
        let position = self.position();
        let table = self.expect_ident("table name")?;
        let alias = if self.eat_keyword(Keyword::As) {
            Some(self.expect_ident("alias")?)
        } else if let TokenKind::Ident(name) = self.peek().clone() {
            self.advance();
            Some(name)
        } else {
            None
        };

        let label = alias.clone().unwrap_or_else(|| table.clone());
        if tree.labels.contains(&label) {
            return Err(Error::parse(
                format!("table name '{}' specified more than once", label),
                position,
            ));
        }
        if let Some(alias) = alias {
            tree.aliases.insert(alias, table.clone());
        }
        tree.models.push(table);
        tree.labels.push(label);
        Ok(())
    }

    // =========================================================================
    // Predicates
    // =========================================================================

    fn parse_or(
        &mut self,
        depth: usize,
        vars: &mut BTreeMap<String, QueryTree>,
    ) -> Result<Expr> {
        let mut left = self.parse_and(depth, vars)?;
        while self.eat_keyword(Keyword::Or) {
            let right = self.parse_and(depth, vars)?;
            left = Expr::or(left, right);
        }
        Ok(left)
    }

    fn parse_and(
        &mut self,
        depth: usize,
        vars: &mut BTreeMap<String, QueryTree>,
    ) -> Result<Expr> {
        let mut left = self.parse_not(depth, vars)?;
        while self.eat_keyword(Keyword::And) {
            let right = self.parse_not(depth, vars)?;
            left = Expr::and(left, right);
        }
        Ok(left)
    }

    fn parse_not(
        &mut self,
        depth: usize,
        vars: &mut BTreeMap<String, QueryTree>,
    ) -> Result<Expr> {
        if self.eat_keyword(Keyword::Not) {
            self.check_depth(depth + 1)?;
            let inner = self.parse_not(depth + 1, vars)?;
            return Ok(Expr::not(inner));
        }
        if matches!(self.peek(), TokenKind::LParen)
            && !self.peek_at(1).is_keyword(Keyword::Select)
        {
            self.advance();
            self.check_depth(depth + 1)?;
            let inner = self.parse_or(depth + 1, vars)?;
            self.expect(&TokenKind::RParen, "')'")?;
            return Ok(inner);
        }
        self.parse_test(depth, vars)
    }

    fn parse_test(
        &mut self,
        depth: usize,
        vars: &mut BTreeMap<String, QueryTree>,
    ) -> Result<Expr> {
        let left = self.parse_operand(depth, vars)?;

        let op = match self.peek() {
            TokenKind::Eq => Some(CompareOp::Eq),
            TokenKind::Ne => Some(CompareOp::Ne),
            TokenKind::Lt => Some(CompareOp::Lt),
            TokenKind::Le => Some(CompareOp::Le),
            TokenKind::Gt => Some(CompareOp::Gt),
            TokenKind::Ge => Some(CompareOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let right = self.parse_operand(depth, vars)?;
            return Ok(Expr::compare(left, op, right));
        }

        if self.eat_keyword(Keyword::Is) {
            let negated = self.eat_keyword(Keyword::Not);
            self.expect_keyword(Keyword::Null)?;
            // An absent value is not equal to itself.
            let op = if negated { CompareOp::Eq } else { CompareOp::Ne };
            return Ok(Expr::compare(left.clone(), op, left));
        }

        let negated = self.eat_keyword(Keyword::Not);
        if self.eat_keyword(Keyword::In) {
            self.expect(&TokenKind::LParen, "'('")?;
            let list = if self.peek().is_keyword(Keyword::Select) {
                alloc::vec![self.parse_subquery(depth, vars)?]
            } else {
                let mut list = alloc::vec![self.parse_operand(depth, vars)?];
                while self.eat(&TokenKind::Comma) {
                    list.push(self.parse_operand(depth, vars)?);
                }
                list
            };
            self.expect(&TokenKind::RParen, "')'")?;
            return Ok(Expr::InList {
                expr: Box::new(left),
                list,
                negated,
            });
        }
        if self.eat_keyword(Keyword::Like) {
            let pattern = match self.advance() {
                TokenKind::Str(s) => s,
                _ => return Err(self.unexpected("pattern string")),
            };
            return Ok(Expr::Like {
                expr: Box::new(left),
                pattern,
                negated,
            });
        }
        if self.eat_keyword(Keyword::Between) {
            let low = self.parse_operand(depth, vars)?;
            self.expect_keyword(Keyword::And)?;
            let high = self.parse_operand(depth, vars)?;
            return Ok(Expr::Between {
                expr: Box::new(left),
                low: Box::new(low),
                high: Box::new(high),
                negated,
            });
        }

        Err(self.unexpected("comparison"))
    }

    fn parse_operand(
        &mut self,
        depth: usize,
        vars: &mut BTreeMap<String, QueryTree>,
    ) -> Result<Expr> {
        let position = self.position();
        match self.advance() {
            TokenKind::Ident(name) => {
                if is_placeholder(&name) && !matches!(self.peek(), TokenKind::Dot) {
                    return Ok(Expr::Placeholder(name));
                }
                Ok(Expr::Column(self.parse_column_rest(Some(name))?))
            }
            TokenKind::Integer(i) => Ok(Expr::Literal(Value::Int64(i))),
            TokenKind::Float(f) => Ok(Expr::Literal(Value::Float64(f))),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::String(s))),
            TokenKind::Keyword(Keyword::True) => Ok(Expr::Literal(Value::Boolean(true))),
            TokenKind::Keyword(Keyword::False) => Ok(Expr::Literal(Value::Boolean(false))),
            TokenKind::Keyword(Keyword::Null) => Ok(Expr::Literal(Value::Null)),
            TokenKind::Minus => match self.advance() {
                TokenKind::Integer(i) => Ok(Expr::Literal(Value::Int64(-i))),
                TokenKind::Float(f) => Ok(Expr::Literal(Value::Float64(-f))),
                _ => Err(Error::parse("expected number after '-'", position)),
            },
            TokenKind::LParen if self.peek().is_keyword(Keyword::Select) => {
                let placeholder = self.parse_subquery(depth, vars)?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(placeholder)
            }
            other => {
                if !matches!(other, TokenKind::Eof) {
                    self.pos -= 1;
                }
                Err(self.unexpected("column or literal"))
            }
        }
    }

    /// Parses `[table '.'] column`; `first` is an identifier already consumed.
    fn parse_column_rest(&mut self, first: Option<String>) -> Result<ColumnRef> {
        let first = match first {
            Some(name) => name,
            None => self.expect_ident("column name")?,
        };
        if self.eat(&TokenKind::Dot) {
            let column = self.expect_ident("column name")?;
            Ok(ColumnRef::new(first, column))
        } else {
            Ok(ColumnRef::bare(first))
        }
    }

    /// Compiles a nested SELECT (the opening parenthesis already consumed)
    /// and registers it under a fresh placeholder.
    fn parse_subquery(
        &mut self,
        depth: usize,
        vars: &mut BTreeMap<String, QueryTree>,
    ) -> Result<Expr> {
        if !self.allow_subqueries {
            return Err(Error::parse(
                "subqueries are not allowed here",
                self.position(),
            ));
        }
        let nested = self.parse_select(depth + 1)?;
        let name = placeholder_name(self.next_placeholder);
        self.next_placeholder += 1;
        vars.insert(name.clone(), nested);
        Ok(Expr::Placeholder(name))
    }
}
