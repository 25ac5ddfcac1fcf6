#![forbid(unsafe_code)]
//! cubeq-operators: pull-based cell streams and the operators built on them.
//!
//! Design intent:
//! - Every operator implements [`CellStream`] and runs on the calling thread.
//! - Operators are thin: errors from children or storage are relayed with `?`
//!   and never reinterpreted.
//! - Aggregation state ([`aggregate::CellMap`]) and contribution expansion
//!   ([`aggregate::AggregationTarget`]) are public so the exec crate can run
//!   the same logic on worker threads.

pub mod aggregate;
pub mod combination;
pub mod constant;
pub mod disjunctive;
pub mod materialized;
pub mod source;
pub mod traits;

pub use aggregate::{AggregationInput, AggregationProcessor, AggregationTarget, CellMap};
pub use combination::CombinationProcessor;
pub use constant::ConstantStream;
pub use disjunctive::DisjunctiveCombinationProcessor;
pub use materialized::CellVecStream;
pub use source::SourceStream;
pub use traits::{drain, CellStream};
