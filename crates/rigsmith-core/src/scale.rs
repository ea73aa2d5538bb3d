//! Scale propagation.
//!
//! After cleanup the rig group holds the root controller's offset next to the
//! skeleton, IK handles and switches. Moving all of those under the root
//! controller shape lets a single scale channel resize the whole character.

use tracing::debug;

use crate::controller::Controller;
use crate::error::RigResult;
use crate::scene::{NodeId, NodeKind, SceneAdapter};

/// Re-parents the rig under `root_controller` so its scale reaches every node.
///
/// Siblings of the controller's offset inside `rig_group` move first, then
/// every other child of the offset. Constraint nodes stay where they are.
pub fn apply_uniform_scale<S: SceneAdapter>(
    scene: &mut S,
    root_controller: &Controller,
    rig_group: NodeId,
) -> RigResult<()> {
    let offset = root_controller.offset()?;
    let shape = root_controller.shape;

    let mut moved = 0;
    for sibling in scene.children(rig_group)? {
        if sibling == offset || scene.kind(sibling)? == NodeKind::Constraint {
            continue;
        }
        scene.set_parent(sibling, Some(shape))?;
        moved += 1;
    }
    for child in scene.children(offset)? {
        if child == shape || scene.kind(child)? == NodeKind::Constraint {
            continue;
        }
        scene.set_parent(child, Some(shape))?;
        moved += 1;
    }

    debug!(moved, "propagated uniform scale");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{controller_name, create_aligned_controller};
    use crate::error::RigError;
    use crate::scene::{ControllerShape, MemoryScene};
    use glam::DVec3;

    /// Hops from `node` up to `ancestor`, `None` if it is not an ancestor.
    fn hops(scene: &MemoryScene, node: NodeId, ancestor: NodeId) -> Option<usize> {
        let mut count = 0;
        let mut current = node;
        while current != ancestor {
            current = scene.parent(current).unwrap()?;
            count += 1;
        }
        Some(count)
    }

    #[test]
    fn test_everything_hangs_off_the_root_shape() {
        let mut scene = MemoryScene::new();
        let root = scene.create_joint("root", DVec3::ZERO).unwrap();
        let rig = scene.create_group("rig").unwrap();
        let ctrl = create_aligned_controller(
            &mut scene,
            &controller_name("root"),
            &ControllerShape::circle(20.0),
            root,
        )
        .unwrap();
        let offset = ctrl.offset().unwrap();
        let handle = scene.create_group("leg_l_ik").unwrap();
        let switch = scene.create_group("leg_l_switch").unwrap();
        let ik_ctrl = scene.create_group("ctrl_leg_l_ik_parent").unwrap();
        for node in [offset, root, handle, switch] {
            scene.set_parent(node, Some(rig)).unwrap();
        }
        scene.set_parent(ik_ctrl, Some(offset)).unwrap();

        apply_uniform_scale(&mut scene, &ctrl, rig).unwrap();

        assert_eq!(scene.children(rig).unwrap(), vec![offset]);
        assert_eq!(scene.children(offset).unwrap(), vec![ctrl.shape]);
        for node in [root, handle, switch, ik_ctrl] {
            assert_eq!(hops(&scene, node, ctrl.shape), Some(1));
            assert_eq!(hops(&scene, node, rig), Some(3));
        }
    }

    #[test]
    fn test_world_transforms_survive() {
        let mut scene = MemoryScene::new();
        let rig = scene.create_group("rig").unwrap();
        let root = scene.create_joint("root", DVec3::new(0.0, 1.0, 0.0)).unwrap();
        let ctrl = create_aligned_controller(
            &mut scene,
            &controller_name("root"),
            &ControllerShape::circle(20.0),
            root,
        )
        .unwrap();
        let hand = scene.create_joint("hand_l", DVec3::new(60.0, 140.0, -3.0)).unwrap();
        scene.set_parent(ctrl.offset().unwrap(), Some(rig)).unwrap();
        scene.set_parent(hand, Some(rig)).unwrap();

        apply_uniform_scale(&mut scene, &ctrl, rig).unwrap();
        assert!(scene
            .world_position(hand)
            .unwrap()
            .abs_diff_eq(DVec3::new(60.0, 140.0, -3.0), 1e-9));
    }

    #[test]
    fn test_bare_root_controller_is_rejected() {
        let mut scene = MemoryScene::new();
        let rig = scene.create_group("rig").unwrap();
        let shape = scene
            .create_controller("ctrl_root", &ControllerShape::circle(20.0))
            .unwrap();
        let err = apply_uniform_scale(&mut scene, &Controller::bare(shape), rig).unwrap_err();
        assert!(matches!(err, RigError::MissingOffset(_)));
    }
}
