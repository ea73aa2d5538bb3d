//! FK/IK snapping.
//!
//! Snapping copies a pose from one representation of a limb onto the other
//! at the moment the switch flips, so the bind chain does not pop.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::controller::Controller;
use crate::error::{DegenerateGeometry, RigError, RigResult};
use crate::scene::{Attr, Axis, NodeId, Plug, SceneAdapter};

/// How far past the bend joint the pole target is pushed, in multiples of
/// the chord-midpoint to bend-joint offset.
pub const POLE_VECTOR_OFFSET_FACTOR: f64 = 2.0;

/// Sine of the bend angle below which three chain points count as collinear.
pub const COLLINEAR_TOLERANCE: f64 = 1e-6;

/// Result of an IK-to-FK snap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapOutcome {
    /// World position the pole controller was moved to.
    pub pole_target: DVec3,
    /// Set when the chain was straight; the pole target is then unstable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degenerate: Option<DegenerateGeometry>,
}

impl SnapOutcome {
    pub fn is_degenerate(&self) -> bool {
        self.degenerate.is_some()
    }
}

/// Pole target for a start, bend and end position.
///
/// `p1 + (p1 - (p0 + p2) / 2) * POLE_VECTOR_OFFSET_FACTOR`
pub fn pole_vector_target(p0: DVec3, p1: DVec3, p2: DVec3) -> DVec3 {
    pole_vector_target_with_factor(p0, p1, p2, POLE_VECTOR_OFFSET_FACTOR)
}

pub fn pole_vector_target_with_factor(p0: DVec3, p1: DVec3, p2: DVec3, factor: f64) -> DVec3 {
    let mean = (p0 + p2) / 2.0;
    let direction = p1 - mean;
    p1 + direction * factor
}

/// Reports collinear start, bend and end positions.
pub fn check_bend(p0: DVec3, p1: DVec3, p2: DVec3) -> Option<DegenerateGeometry> {
    let upper = p1 - p0;
    let chord = p2 - p0;
    let lengths = upper.length() * chord.length();
    let straight =
        lengths <= f64::EPSILON || upper.cross(chord).length() / lengths < COLLINEAR_TOLERANCE;
    straight.then(|| DegenerateGeometry {
        start: p0,
        mid: p1,
        end: p2,
        offset: (p1 - (p0 + p2) / 2.0).length(),
    })
}

/// Copies each IK joint's rotation channels onto the matching FK controller.
pub fn snap_fk_to_ik<S: SceneAdapter>(
    scene: &mut S,
    fk_controllers: &[Controller],
    ik_joints: &[NodeId],
) -> RigResult<()> {
    if fk_controllers.len() != ik_joints.len() {
        return Err(RigError::invalid_chain(
            "fk",
            "ik",
            format!(
                "{} FK controllers for {} IK joints",
                fk_controllers.len(),
                ik_joints.len()
            ),
        ));
    }

    for (ctrl, joint) in fk_controllers.iter().zip(ik_joints) {
        for axis in Axis::ALL {
            let value = scene.get_attr(&Plug::new(*joint, Attr::Rotate(axis)))?;
            scene.set_attr(&Plug::new(ctrl.shape, Attr::Rotate(axis)), value)?;
        }
    }
    debug!(controllers = fk_controllers.len(), "snapped FK to IK");
    Ok(())
}

/// Moves the IK target onto the last FK controller and places the pole
/// controller in the FK pose's bend plane.
///
/// `chain_offset` selects the FK controller the IK chain starts at. A
/// straight chain still snaps; the outcome then carries the diagnostic.
pub fn snap_ik_to_fk<S: SceneAdapter>(
    scene: &mut S,
    fk_controllers: &[Controller],
    ik_target: NodeId,
    pole_controller: NodeId,
    chain_offset: usize,
) -> RigResult<SnapOutcome> {
    if fk_controllers.len() < chain_offset + 2 {
        return Err(RigError::invalid_chain(
            "fk",
            "ik",
            format!(
                "chain offset {} needs at least {} FK controllers, got {}",
                chain_offset,
                chain_offset + 2,
                fk_controllers.len()
            ),
        ));
    }
    let end = fk_controllers[fk_controllers.len() - 1].shape;

    let position = scene.world_position(end)?;
    let rotation = scene.world_rotation(end)?;
    scene.set_world_position(ik_target, position)?;
    scene.set_world_rotation(ik_target, rotation)?;

    let p0 = scene.world_position(fk_controllers[chain_offset].shape)?;
    let p1 = scene.world_position(fk_controllers[chain_offset + 1].shape)?;
    let p2 = position;
    let pole_target = pole_vector_target(p0, p1, p2);
    let degenerate = check_bend(p0, p1, p2);
    if let Some(diagnostic) = &degenerate {
        warn!(%diagnostic, "snapping a straight chain");
    }
    scene.set_world_position(pole_controller, pole_target)?;

    Ok(SnapOutcome {
        pole_target,
        degenerate,
    })
}
