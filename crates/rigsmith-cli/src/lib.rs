//! Rigsmith CLI library.
//!
//! Command implementations live here so the integration tests can drive them
//! without spawning the binary.

pub mod commands;
pub mod input;
