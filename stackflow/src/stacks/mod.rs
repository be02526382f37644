//! Stack descriptors and the environment they are deployed into.
//!
//! This module provides:
//! - [`StackDescriptor`], the declarative definition of one deployable unit
//! - [`ApplicationEnvironment`], naming conventions shared by all stacks
//! - the built-in catalog of stacks for the to-do application

mod catalog;
mod descriptor;
mod environment;

pub use catalog::{todo_app_catalog, ARTIFACT_PARAMETER};
pub use descriptor::{RequiredInput, ResourceSpec, StackDescriptor};
pub use environment::ApplicationEnvironment;
