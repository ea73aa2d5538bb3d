//! IK rig builder: rotate-plane handles and their controls.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::controller::{
    controller_name, create_aligned_controller, create_controller_at, mark_ik_control, Controller,
};
use crate::error::{RigError, RigResult};
use crate::scene::{Attr, ConstraintKind, ControllerShape, IkSolver, NodeId, SceneAdapter};
use crate::skeleton::joint_path;

/// A rotate-plane IK handle and the joints it spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IkHandle {
    pub handle: NodeId,
    pub effector: NodeId,
    pub start: NodeId,
    pub end: NodeId,
}

/// Creates a rotate-plane IK handle from `start` to `end`.
///
/// `end` must be a strict descendant of `start`.
pub fn create_ik_handle<S: SceneAdapter>(
    scene: &mut S,
    start: NodeId,
    end: NodeId,
    name: &str,
) -> RigResult<IkHandle> {
    let path = joint_path(scene, start, end)?;
    if path.len() < 2 {
        return Err(RigError::invalid_chain(
            scene.name(start)?,
            scene.name(end)?,
            "an IK handle needs at least two joints",
        ));
    }
    let nodes = scene.create_ik_handle(name, start, end, IkSolver::RotatePlane)?;
    debug!(handle = name, joints = path.len(), "created IK handle");
    Ok(IkHandle {
        handle: nodes.handle,
        effector: nodes.effector,
        start,
        end,
    })
}

/// Controller `ctrl_<name>` at `guide_child` that aims `joint` at itself.
///
/// Only translation stays animatable.
pub fn create_start_joint_controller<S: SceneAdapter>(
    scene: &mut S,
    joint: NodeId,
    parent: Option<NodeId>,
    guide_child: NodeId,
    name: &str,
    radius: f64,
) -> RigResult<Controller> {
    let ctrl = create_controller_at(
        scene,
        &controller_name(name),
        &ControllerShape::circle(radius),
        guide_child,
    )?;
    mark_ik_control(scene, &ctrl)?;
    if parent.is_some() {
        scene.set_parent(ctrl.shape, parent)?;
    }
    scene.freeze_transforms(ctrl.shape)?;
    scene.delete_history(ctrl.shape)?;

    scene.create_constraint(ConstraintKind::Aim, &[ctrl.shape], joint, true)?;
    scene.lock_and_hide(ctrl.shape, &Attr::rotate_scale_channels())?;
    Ok(ctrl)
}

/// Offset-wrapped controller `ctrl_<name>` aligned to `end_joint`.
///
/// It drives the handle's position and the end joint's orientation.
pub fn create_ik_controller<S: SceneAdapter>(
    scene: &mut S,
    handle: &IkHandle,
    end_joint: NodeId,
    parent: Option<NodeId>,
    name: &str,
    radius: f64,
) -> RigResult<Controller> {
    let ctrl = create_aligned_controller(
        scene,
        &controller_name(name),
        &ControllerShape::circle(radius),
        end_joint,
    )?;
    mark_ik_control(scene, &ctrl)?;

    scene.create_constraint(ConstraintKind::Point, &[ctrl.shape], handle.handle, true)?;
    scene.create_constraint(ConstraintKind::Orient, &[ctrl.shape], end_joint, true)?;
    if parent.is_some() {
        scene.set_parent(ctrl.top(), parent)?;
    }
    Ok(ctrl)
}

/// Pole vector controller `ctrl_<name>` at `guide_joint`, the bend joint.
pub fn create_pole_vector_constraint<S: SceneAdapter>(
    scene: &mut S,
    handle: &IkHandle,
    parent: Option<NodeId>,
    guide_joint: NodeId,
    name: &str,
    radius: f64,
) -> RigResult<Controller> {
    let ctrl = create_controller_at(
        scene,
        &controller_name(name),
        &ControllerShape::circle(radius),
        guide_joint,
    )?;
    mark_ik_control(scene, &ctrl)?;

    scene.create_constraint(ConstraintKind::PoleVector, &[ctrl.shape], handle.handle, false)?;
    if parent.is_some() {
        scene.set_parent(ctrl.shape, parent)?;
    }
    Ok(ctrl)
}
