//! CLI command implementations

pub mod build;
pub mod markers;
pub mod validate;
