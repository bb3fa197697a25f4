//! AST module for predicate expressions and their evaluation.

pub mod eval;
pub(crate) mod expr;

pub use eval::{evaluate, Bindings, Scope};
pub use expr::{is_placeholder, placeholder_name, ColumnRef, CompareOp, Expr, PLACEHOLDER_PREFIX};
