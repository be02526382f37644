//! Dependency graph over stack descriptors.
//!
//! This module provides:
//! - [`DependencyGraph`], a validated set of descriptors and their edges
//! - [`OrderedWaves`], the deterministic wave ordering used for deployment

mod builder;
mod dag;

pub use builder::DependencyGraph;
pub use dag::{DependencyEdge, OrderedWaves};
