//! Spline spine builder.
//!
//! A spline IK handle runs along the spine. Its curve is split between two
//! clusters, each carried by a control, and a body control moves the
//! whole assembly.

use std::ops::RangeInclusive;

use glam::DVec3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::controller::{controller_name, create_controller_at, mark_ik_control, Controller};
use crate::error::{RigError, RigResult};
use crate::scene::{
    Attr, Axis, ConstraintKind, ControllerShape, IkSolver, NodeId, Plug, SceneAdapter,
};
use crate::skeleton::joint_path;

pub const BODY_RADIUS: f64 = 25.0;
pub const CONTROL_RADIUS: f64 = 20.0;

/// Nodes of a spline spine rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplineSpineRig {
    pub handle: NodeId,
    pub effector: NodeId,
    pub curve: NodeId,
    pub lower_cluster: NodeId,
    pub upper_cluster: NodeId,
    pub lower: Controller,
    pub upper: Controller,
    pub body: Controller,
    pub middle: Controller,
    pub group: NodeId,
}

impl SplineSpineRig {
    /// Control the chest hangs off.
    pub fn chest(&self) -> &Controller {
        &self.upper
    }
}

fn create_spine_control<S: SceneAdapter>(
    scene: &mut S,
    name: &str,
    target: NodeId,
    radius: f64,
) -> RigResult<Controller> {
    let ctrl = create_controller_at(
        scene,
        &controller_name(name),
        &ControllerShape::circle(radius).with_normal(DVec3::Z),
        target,
    )?;
    mark_ik_control(scene, &ctrl)?;
    scene.set_attr(&Plug::new(ctrl.shape, Attr::Rotate(Axis::X)), 90.0)?;
    scene.freeze_transforms(ctrl.shape)?;
    scene.delete_history(ctrl.shape)?;
    Ok(ctrl)
}

/// Builds a spline spine from `start` to `end` with a middle control at `middle`.
///
/// `middle` must lie on the chain between `start` and `end`.
pub fn create_spline_spine_ik<S: SceneAdapter>(
    scene: &mut S,
    start: NodeId,
    middle: NodeId,
    end: NodeId,
    name: &str,
) -> RigResult<SplineSpineRig> {
    let path = joint_path(scene, start, end)?;
    if path.len() < 3 || !path.contains(&middle) {
        return Err(RigError::invalid_chain(
            scene.name(start)?,
            scene.name(end)?,
            format!(
                "a spline spine needs three joints with '{}' on the chain",
                scene.name(middle)?
            ),
        ));
    }

    let nodes = scene.create_ik_handle(name, start, end, IkSolver::Spline)?;
    let curve = nodes.curve.ok_or_else(|| {
        RigError::invalid_chain(name, name, "spline handle was created without a curve")
    })?;
    let cv_count = scene.curve_cv_count(curve)?;
    let Some((lower_cvs, upper_cvs)) = cluster_ranges(cv_count) else {
        return Err(RigError::invalid_chain(
            scene.name(start)?,
            scene.name(end)?,
            format!("spline curve has {} control vertices", cv_count),
        ));
    };
    let lower_cluster =
        scene.create_cluster(&format!("{}_lowerCluster", name), curve, lower_cvs)?;
    let upper_cluster =
        scene.create_cluster(&format!("{}_upperCluster", name), curve, upper_cvs)?;

    let lower = create_spine_control(
        scene,
        &format!("{}_lower", name),
        lower_cluster,
        CONTROL_RADIUS,
    )?;
    let upper = create_spine_control(
        scene,
        &format!("{}_upper", name),
        upper_cluster,
        CONTROL_RADIUS,
    )?;
    let body = create_spine_control(scene, &format!("{}_body", name), start, BODY_RADIUS)?;
    let middle = create_spine_control(
        scene,
        &format!("{}_middle", name),
        middle,
        CONTROL_RADIUS,
    )?;

    scene.set_parent(lower_cluster, Some(lower.shape))?;
    scene.set_parent(upper_cluster, Some(upper.shape))?;
    scene.set_parent(lower.shape, Some(body.shape))?;
    scene.set_parent(upper.shape, Some(middle.shape))?;
    scene.set_parent(middle.shape, Some(body.shape))?;

    scene.create_constraint(ConstraintKind::Parent, &[lower.shape], start, true)?;
    scene.create_constraint(ConstraintKind::Parent, &[upper.shape], end, true)?;

    let group = scene.create_group(&format!("{}_grp", name))?;
    scene.set_parent(nodes.handle, Some(group))?;
    scene.set_parent(curve, Some(group))?;
    scene.set_parent(body.shape, Some(group))?;

    scene.connect_attr(
        &Plug::new(upper.shape, Attr::Rotate(Axis::Y)),
        &Plug::new(nodes.handle, Attr::Twist),
    )?;

    debug!(handle = name, joints = path.len(), "built spline spine");
    Ok(SplineSpineRig {
        handle: nodes.handle,
        effector: nodes.effector,
        curve,
        lower_cluster,
        upper_cluster,
        lower,
        upper,
        body,
        middle,
        group,
    })
}

/// CVs owned by the lower and upper clusters: the first two and the last
/// two. Any CVs in between stay with the curve. Needs at least four CVs.
fn cluster_ranges(cv_count: usize) -> Option<(RangeInclusive<usize>, RangeInclusive<usize>)> {
    if cv_count < 4 {
        return None;
    }
    Some((0..=1, cv_count - 2..=cv_count - 1))
}
