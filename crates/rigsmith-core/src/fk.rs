//! FK rig builder.
//!
//! One controller per joint. Each controller's offset hangs under the
//! previous controller's shape, so the controller tree mirrors the joint
//! tree, and each joint is parent-constrained to its controller.

use tracing::debug;

use crate::controller::{controller_name, create_aligned_controller, Controller};
use crate::error::RigResult;
use crate::scene::{ConstraintKind, ControllerShape, NodeId, SceneAdapter};
use crate::skeleton::joint_path;

/// Creates `ctrl_<joint>` inside `ctrl_<joint>_parent` and binds the joint to it.
pub fn create_fk_controller<S: SceneAdapter>(
    scene: &mut S,
    joint: NodeId,
    parent: Option<&Controller>,
    radius: f64,
) -> RigResult<Controller> {
    let joint_name = scene.name(joint)?;
    let ctrl = create_aligned_controller(
        scene,
        &controller_name(&joint_name),
        &ControllerShape::circle(radius),
        joint,
    )?;
    scene.create_constraint(ConstraintKind::Parent, &[ctrl.shape], joint, true)?;
    if let Some(parent) = parent {
        scene.set_parent(ctrl.top(), Some(parent.shape))?;
    }
    Ok(ctrl)
}

/// Builds FK controllers from `root_joint` down the joint tree.
///
/// Traversal is pre-order and stops below `end_joint` (inclusive) or at
/// leaves. `root_joint == end_joint` yields a single controller.
pub fn build_fk_chain<S: SceneAdapter>(
    scene: &mut S,
    root_joint: NodeId,
    end_joint: Option<NodeId>,
    parent: Option<&Controller>,
    radius: f64,
) -> RigResult<Vec<Controller>> {
    if let Some(end) = end_joint {
        joint_path(scene, root_joint, end)?;
    }

    let mut controllers = Vec::new();
    let mut pending = vec![(root_joint, parent.copied())];
    while let Some((joint, parent)) = pending.pop() {
        let ctrl = create_fk_controller(scene, joint, parent.as_ref(), radius)?;
        controllers.push(ctrl);
        if Some(joint) == end_joint {
            continue;
        }
        for child in scene.child_joints(joint)?.into_iter().rev() {
            pending.push((child, Some(ctrl)));
        }
    }

    debug!(
        root = %scene.name(root_joint)?,
        controllers = controllers.len(),
        "built FK chain"
    );
    Ok(controllers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RigError;
    use crate::scene::MemoryScene;
    use crate::test_support::{bent_leg, character, joint_chain};
    use crate::topology::{BodyKind, Side, SpineKind};
    use glam::{DQuat, DVec3};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_controller_when_root_is_end() {
        let mut scene = MemoryScene::new();
        let leg = bent_leg(&mut scene);
        let ctrls = build_fk_chain(&mut scene, leg[1], Some(leg[1]), None, 13.0).unwrap();
        assert_eq!(ctrls.len(), 1);
        assert_eq!(scene.name(ctrls[0].shape).unwrap(), "ctrl_knee_l");
    }

    #[test]
    fn test_controller_tree_mirrors_joints() {
        let mut scene = MemoryScene::new();
        let leg = bent_leg(&mut scene);
        let ctrls = build_fk_chain(&mut scene, leg[0], None, None, 13.0).unwrap();
        assert_eq!(ctrls.len(), 3);
        for pair in ctrls.windows(2) {
            assert_eq!(scene.parent(pair[1].top()).unwrap(), Some(pair[0].shape));
        }
        for (ctrl, joint) in ctrls.iter().zip(&leg) {
            let constraints = scene.constraints_on(*joint).unwrap();
            assert_eq!(constraints.len(), 1);
            let info = scene.constraint_info(constraints[0]).unwrap();
            assert_eq!(info.kind, ConstraintKind::Parent);
            assert_eq!(info.drivers, vec![ctrl.shape]);
            assert!(info.maintain_offset);
        }
    }

    #[test]
    fn test_rotating_controller_drives_joint() {
        let mut scene = MemoryScene::new();
        let leg = bent_leg(&mut scene);
        let ctrls = build_fk_chain(&mut scene, leg[0], None, None, 13.0).unwrap();

        let knee_before = scene.world_position(leg[1]).unwrap();
        let rotation = DQuat::from_rotation_x(0.5) * scene.world_rotation(ctrls[0].shape).unwrap();
        scene.set_world_rotation(ctrls[0].shape, rotation).unwrap();

        let constraint = scene.constraints_on(leg[0]).unwrap()[0];
        scene.apply_constraint(constraint).unwrap();
        let thigh = scene.world_position(leg[0]).unwrap();
        let expected = thigh + DQuat::from_rotation_x(0.5) * (knee_before - thigh);
        assert!(scene.world_position(leg[1]).unwrap().abs_diff_eq(expected, 1e-6));
        // The knee controller follows through the hierarchy.
        assert!(scene.world_position(ctrls[1].shape).unwrap().abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn test_pre_order_over_branches() {
        let mut scene = MemoryScene::new();
        let chain = joint_chain(
            &mut scene,
            &[("a", DVec3::ZERO), ("b", DVec3::Y), ("c", DVec3::Y * 2.0)],
        );
        let side = scene.create_joint("d", DVec3::new(1.0, 1.0, 0.0)).unwrap();
        scene.set_parent(side, Some(chain[0])).unwrap();

        let ctrls = build_fk_chain(&mut scene, chain[0], None, None, 1.0).unwrap();
        let names: Vec<String> = ctrls.iter().map(|c| scene.name(c.shape).unwrap()).collect();
        assert_eq!(names, vec!["ctrl_a", "ctrl_b", "ctrl_c", "ctrl_d"]);
    }

    #[test]
    fn test_end_joint_stops_traversal() {
        let (mut scene, skeleton) = character(BodyKind::Full, SpineKind::Plain);
        let torso = skeleton.torso().unwrap();
        let ctrls =
            build_fk_chain(&mut scene, skeleton.spine[0], Some(torso), None, 20.0).unwrap();
        assert_eq!(ctrls.len(), 3);

        let limb = skeleton.limb(Side::Left).unwrap();
        let err = build_fk_chain(&mut scene, limb.arm[0], Some(limb.leg[0]), None, 8.0)
            .unwrap_err();
        assert!(matches!(err, RigError::InvalidChain { .. }));
    }

    #[test]
    fn test_arm_chain_includes_digits() {
        let (mut scene, skeleton) = character(BodyKind::Half, SpineKind::Plain);
        let limb = skeleton.limb(Side::Left).unwrap().clone();
        let ctrls = build_fk_chain(&mut scene, limb.arm[0], None, None, 8.0).unwrap();
        assert_eq!(ctrls.len(), 4 + 9);
    }
}
