//! Rigsmith End-to-End Test Infrastructure
//!
//! Integration tests for the rig pipeline:
//!
//! - Workflow: markers -> skeleton -> controls -> cleanup
//! - Snapping: FK/IK pose matching on built rigs
//! - CLI: config files in, rig reports out
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p rigsmith-tests
//! ```

pub mod fixtures;

pub use fixtures::{built_rig, hops, ConfigFixture};
