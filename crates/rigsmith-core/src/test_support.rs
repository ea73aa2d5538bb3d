//! Fixtures for unit tests.

use glam::DVec3;

use crate::markers::{MarkerBoard, MarkerSet};
use crate::scene::{MemoryScene, NodeId, SceneAdapter};
use crate::skeleton::{build_skeleton, SkeletonHandles};
use crate::topology::{default_markers, BodyKind, SpineKind, Topology};

/// Builds a parented, oriented joint chain.
pub fn joint_chain(scene: &mut MemoryScene, joints: &[(&str, DVec3)]) -> Vec<NodeId> {
    let mut chain: Vec<NodeId> = Vec::new();
    for (name, position) in joints {
        let joint = scene.create_joint(name, *position).unwrap();
        if let Some(parent) = chain.last().copied() {
            scene.set_parent(joint, Some(parent)).unwrap();
            scene.orient_joint(parent).unwrap();
        }
        chain.push(joint);
    }
    chain
}

/// Bent three-joint leg: thigh, knee, foot.
pub fn bent_leg(scene: &mut MemoryScene) -> Vec<NodeId> {
    joint_chain(
        scene,
        &[
            ("thigh_l", DVec3::new(9.0, 95.0, 1.0)),
            ("knee_l", DVec3::new(14.0, 55.0, 6.0)),
            ("foot_l", DVec3::new(15.5, 15.5, -6.0)),
        ],
    )
}

/// Skeleton built from the default markers.
pub fn character(body: BodyKind, spine: SpineKind) -> (MemoryScene, SkeletonHandles) {
    let mut scene = MemoryScene::new();
    let mut board = MarkerBoard::new(MarkerSet::from_markers(default_markers(body, spine)));
    let topology = Topology::character(spine, body.sides());
    let skeleton = build_skeleton(&mut scene, &mut board, &topology).unwrap();
    (scene, skeleton)
}
