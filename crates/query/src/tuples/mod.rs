//! Join/tuple engine.
//!
//! Everything between a compiled query tree and its result rows: join-pair
//! extraction, the narrow intermediate relation, outer and cartesian joins,
//! aggregates and the tuple builder that drives them.

mod aggregate;
mod builder;
mod join;
mod pairs;
mod relation;

pub use aggregate::aggregate;
pub use builder::{TupleBuilder, TupleRow};
pub use join::{cartesian, outer_join};
pub use pairs::{extract_join_pairs, parse_join_pair, JoinPair, QualifiedColumn};
pub use relation::Relation;
