//! Rigsmith rig-construction engine
//!
//! This crate turns a handful of named 3D markers into a character control
//! rig: a joint skeleton, FK and IK controls, FK/IK switch networks with
//! pose-preserving snapping, an optional spline spine and a single top group
//! that scales uniformly.
//!
//! All scene mutation goes through the [`scene::SceneAdapter`] trait.
//! [`scene::MemoryScene`] implements it in memory and backs the tests and the
//! command-line tool.
//!
//! # Example
//!
//! ```
//! use rigsmith_core::{LimbMode, MemoryScene, RigConfig, RigWorkflow, Stage};
//!
//! let config = RigConfig::new()
//!     .with_arms(LimbMode::FkIk)
//!     .with_legs(LimbMode::Ik);
//! let mut workflow = RigWorkflow::new(MemoryScene::new(), config).unwrap();
//!
//! // Markers can be adjusted until the skeleton is built.
//! workflow
//!     .move_marker("knee_l", glam::DVec3::new(10.0, 52.0, 6.0))
//!     .unwrap();
//! workflow.build_all().unwrap();
//!
//! assert_eq!(workflow.stage(), Stage::Done);
//! assert!(workflow.scene().find("arm_l_switch").is_some());
//! ```
//!
//! # Modules
//!
//! - [`topology`]: default marker layouts and the chains they form
//! - [`markers`]: marker sets and their scene locators
//! - [`scene`]: the Scene Adapter trait and the in-memory scene
//! - [`skeleton`], [`fk`], [`ik`], [`fkik`], [`spline`], [`scale`]: rig builders
//! - [`snap`]: FK/IK pose matching
//! - [`config`], [`hash`]: rig configuration and its canonical hash
//! - [`workflow`]: the staged pipeline

pub mod config;
pub mod controller;
pub mod error;
pub mod fk;
pub mod fkik;
pub mod hash;
pub mod ik;
pub mod markers;
pub mod math;
pub mod scale;
pub mod scene;
pub mod skeleton;
pub mod snap;
pub mod spline;
pub mod topology;
pub mod workflow;

#[cfg(test)]
mod test_support;

pub use config::{ConfigError, LimbMode, LimbRadii, RadiusSettings, RigConfig};
pub use controller::Controller;
pub use error::{DegenerateGeometry, RigError, RigResult};
pub use markers::{MarkerBoard, MarkerSet};
pub use scene::{MemoryScene, NodeId, NodeKind, Plug, SceneAdapter, SceneError};
pub use skeleton::SkeletonHandles;
pub use snap::{SnapOutcome, POLE_VECTOR_OFFSET_FACTOR};
pub use topology::{BodyKind, Marker, Side, SpineKind, Topology};
pub use workflow::{Limb, LimbRig, RigHandles, RigWorkflow, SnapDirection, SpineRig, Stage};
