//! Controller primitives shared by the FK, IK, switch and spline builders.

use serde::{Deserialize, Serialize};

use crate::error::{RigError, RigResult};
use crate::scene::{ConstraintKind, ControllerShape, DisplayOverride, NodeId, SceneAdapter};

/// Colour index of IK start, IK end and pole vector controls.
pub const IK_CONTROL_COLOR: u8 = 13;
/// Colour index of FK/IK switch controls.
pub const SWITCH_COLOR: u8 = 17;
pub const SWITCH_LINE_WIDTH: f64 = 2.0;

/// A controller shape, optionally wrapped in an offset node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controller {
    pub shape: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<NodeId>,
}

impl Controller {
    /// A controller without offset node.
    pub fn bare(shape: NodeId) -> Self {
        Self {
            shape,
            offset: None,
        }
    }

    pub fn with_offset(shape: NodeId, offset: NodeId) -> Self {
        Self {
            shape,
            offset: Some(offset),
        }
    }

    /// Topmost node: the offset if present, else the shape.
    pub fn top(&self) -> NodeId {
        self.offset.unwrap_or(self.shape)
    }

    /// The offset node, or `MissingOffset` for bare controllers.
    pub fn offset(&self) -> RigResult<NodeId> {
        self.offset.ok_or(RigError::MissingOffset(self.shape))
    }
}

/// Controller name for a joint or logical control, `ctrl_<name>`.
pub fn controller_name(name: &str) -> String {
    format!("ctrl_{}", name)
}

/// Offset node name for a controller name, `<ctrl>_parent`.
pub fn offset_name(controller: &str) -> String {
    format!("{}_parent", controller)
}

/// Creates `shape` named `name` inside an offset node aligned to `target`.
///
/// The offset is snapped onto the target's world position and orientation
/// with temporary point and orient constraints that are removed again, then
/// the shape's transforms are frozen so its channels read zero at rest.
pub fn create_aligned_controller<S: SceneAdapter>(
    scene: &mut S,
    name: &str,
    shape: &ControllerShape,
    target: NodeId,
) -> RigResult<Controller> {
    let ctrl = scene.create_controller(name, shape)?;
    let ctrl_name = scene.name(ctrl)?;
    let offset = scene.create_group(&offset_name(&ctrl_name))?;
    scene.set_parent(ctrl, Some(offset))?;

    scene.create_constraint(ConstraintKind::Point, &[target], offset, false)?;
    scene.create_constraint(ConstraintKind::Orient, &[target], offset, false)?;
    scene.delete_constraints(offset)?;
    scene.freeze_transforms(ctrl)?;

    Ok(Controller::with_offset(ctrl, offset))
}

/// Creates a bare controller and moves it onto `target`'s world position.
pub fn create_controller_at<S: SceneAdapter>(
    scene: &mut S,
    name: &str,
    shape: &ControllerShape,
    target: NodeId,
) -> RigResult<Controller> {
    let ctrl = scene.create_controller(name, shape)?;
    scene.create_constraint(ConstraintKind::Point, &[target], ctrl, false)?;
    scene.delete_constraints(ctrl)?;
    Ok(Controller::bare(ctrl))
}

/// Applies the IK control colour.
pub fn mark_ik_control<S: SceneAdapter>(scene: &mut S, controller: &Controller) -> RigResult<()> {
    scene.set_display(controller.shape, DisplayOverride::color(IK_CONTROL_COLOR))?;
    Ok(())
}
