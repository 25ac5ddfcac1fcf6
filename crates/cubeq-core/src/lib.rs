#![forbid(unsafe_code)]
//! cubeq-core: shared vocabulary for the cube query engine.
//!
//! Design intent:
//! - Pure data and validation only: no threads, no storage access.
//! - Paths, areas, and plan nodes are cheap to clone and serde-friendly so
//!   that plan caches can key on them.
//! - Every fallible constructor reports through [`error::Error`].

pub mod aggregation;
pub mod area;
pub mod cell;
pub mod config;
pub mod error;
pub mod hash;
pub mod id;
pub mod path;
pub mod plan;
pub mod prelude;
pub mod translator;
