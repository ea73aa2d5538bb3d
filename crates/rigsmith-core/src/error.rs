//! Error types for rig construction.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::scene::{NodeId, SceneError};
use crate::workflow::Stage;

/// Result type for rig construction operations.
pub type RigResult<T> = Result<T, RigError>;

/// Errors raised by the rig builders and the workflow.
///
/// Builders fail fast: scene mutations issued before the failure are not
/// rolled back. The caller decides whether to discard the in-progress rig.
#[derive(Debug, Error)]
pub enum RigError {
    /// The selected topology needs a marker that is not on the board.
    #[error("missing marker '{name}'")]
    MissingMarker { name: String },

    /// No single path connects the requested start and end joints.
    #[error("invalid chain '{start}' -> '{end}': {reason}")]
    InvalidChain {
        start: String,
        end: String,
        reason: String,
    },

    /// Snap input points are collinear; the resulting bend direction is unstable.
    #[error(transparent)]
    DegenerateGeometry(#[from] DegenerateGeometry),

    /// A workflow step was invoked out of order.
    #[error("stage '{actual}' cannot run yet, the workflow is at stage '{expected}'")]
    StageOrder { expected: Stage, actual: Stage },

    /// Marker mirroring was requested for a full body rig.
    #[error("markers can only be mirrored on a half body rig")]
    MirrorUnavailable,

    /// Snapping was requested for a limb that has no FK/IK switch.
    #[error("snapping is unavailable for {limb}: {reason}")]
    SnapUnavailable { limb: String, reason: String },

    /// A controller that must carry an offset node has none.
    #[error("controller {0} has no offset node")]
    MissingOffset(NodeId),

    /// The rig configuration is invalid.
    #[error("invalid rig configuration: {0}")]
    Config(#[from] ConfigError),

    /// The scene adapter rejected an operation.
    #[error("scene error: {0}")]
    Scene(#[from] SceneError),
}

impl RigError {
    /// Creates a missing marker error.
    pub fn missing_marker(name: impl Into<String>) -> Self {
        Self::MissingMarker { name: name.into() }
    }

    /// Creates an invalid chain error.
    pub fn invalid_chain(
        start: impl Into<String>,
        end: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidChain {
            start: start.into(),
            end: end.into(),
            reason: reason.into(),
        }
    }
}

/// Collinear pole-vector input.
///
/// Recoverable: the snap still moves the pole controller to whatever target
/// the computation yields, this value only reports the condition.
#[derive(Debug, Clone, Copy, PartialEq, Error, Serialize, Deserialize)]
#[error(
    "chain points {start:?}, {mid:?}, {end:?} are collinear (bend offset {offset:.3e}); pole vector direction is unstable"
)]
pub struct DegenerateGeometry {
    pub start: DVec3,
    pub mid: DVec3,
    pub end: DVec3,
    /// Length of the chord-midpoint to bend-joint offset.
    pub offset: f64,
}
