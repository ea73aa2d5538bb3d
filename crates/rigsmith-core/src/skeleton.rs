//! Skeleton builder: markers to a joint hierarchy.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RigError, RigResult};
use crate::markers::MarkerBoard;
use crate::scene::{NodeId, SceneAdapter};
use crate::topology::{
    Attachment, Region, Side, Topology, NECK_ATTACHMENT, TORSO_ATTACHMENT,
};

/// Joints of one side of the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimbJoints {
    pub side: Side,
    /// Clavicle, upper arm, lower arm, hand.
    pub arm: Vec<NodeId>,
    pub thumb: Vec<NodeId>,
    pub index: Vec<NodeId>,
    pub middle: Vec<NodeId>,
    /// Thigh, knee, foot, ball, toe.
    pub leg: Vec<NodeId>,
}

impl LimbJoints {
    /// Thigh, knee and foot: the chain an IK leg solves.
    pub fn leg_chain(&self) -> &[NodeId] {
        &self.leg[..self.leg.len().min(3)]
    }

    pub fn digits(&self) -> [&[NodeId]; 3] {
        [&self.thumb, &self.index, &self.middle]
    }
}

/// Typed handles to every joint the skeleton builder created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkeletonHandles {
    pub root: NodeId,
    pub pelvis: NodeId,
    /// Spine joints followed by neck and head.
    pub spine: Vec<NodeId>,
    pub limbs: BTreeMap<Side, LimbJoints>,
    /// Every joint by marker name.
    pub joints: BTreeMap<String, NodeId>,
}

impl SkeletonHandles {
    /// Joints of one side.
    ///
    /// A side that was never built reports its first marker as missing.
    pub fn limb(&self, side: Side) -> RigResult<&LimbJoints> {
        self.limbs
            .get(&side)
            .ok_or_else(|| RigError::missing_marker(side.name("clavicle")))
    }

    pub fn joint(&self, name: &str) -> RigResult<NodeId> {
        self.joints
            .get(name)
            .copied()
            .ok_or_else(|| RigError::missing_marker(name))
    }

    /// Spine joints without neck and head.
    pub fn spine_joints(&self) -> &[NodeId] {
        &self.spine[..self.spine.len().saturating_sub(2)]
    }

    /// Spine joint the arms hang from.
    pub fn torso(&self) -> RigResult<NodeId> {
        self.spine_at(TORSO_ATTACHMENT.resolve(self.spine.len()))
    }

    pub fn neck(&self) -> RigResult<NodeId> {
        self.spine_at(NECK_ATTACHMENT.resolve(self.spine.len()))
    }

    fn spine_at(&self, index: Option<usize>) -> RigResult<NodeId> {
        index
            .and_then(|i| self.spine.get(i).copied())
            .ok_or_else(|| RigError::invalid_chain("pelvis", "head", "spine chain is too short"))
    }

    /// Sides present in the skeleton.
    pub fn sides(&self) -> Vec<Side> {
        self.limbs.keys().copied().collect()
    }
}

/// Joints from `start` down to `end`, both included.
///
/// Fails with `InvalidChain` unless `end` is `start` or one of its descendants.
pub fn joint_path<S: SceneAdapter>(scene: &S, start: NodeId, end: NodeId) -> RigResult<Vec<NodeId>> {
    let mut path = vec![end];
    let mut current = end;
    while current != start {
        match scene.parent(current)? {
            Some(parent) => {
                path.push(parent);
                current = parent;
            }
            None => {
                return Err(RigError::invalid_chain(
                    scene.name(start)?,
                    scene.name(end)?,
                    "end joint is not below the start joint",
                ))
            }
        }
    }
    path.reverse();
    Ok(path)
}

/// Builds the joint hierarchy described by `topology` from the board's markers.
///
/// Every required marker is checked before the scene is touched. Each joint
/// consumes its marker; the marker group is deleted once empty.
pub fn build_skeleton<S: SceneAdapter>(
    scene: &mut S,
    markers: &mut MarkerBoard,
    topology: &Topology,
) -> RigResult<SkeletonHandles> {
    markers.require(topology.required_markers())?;

    let mut chains: HashMap<Region, Vec<NodeId>> = HashMap::new();
    let mut joints = BTreeMap::new();

    for entry in &topology.entries {
        let mut parent = match entry.attachment {
            Attachment::World => None,
            Attachment::Chain { region, index } => {
                let chain = chains.get(&region).ok_or_else(|| {
                    RigError::invalid_chain(
                        format!("{:?}", region),
                        entry.markers.first().cloned().unwrap_or_default(),
                        "attachment chain is built later",
                    )
                })?;
                let joint = index.resolve(chain.len()).map(|i| chain[i]).ok_or_else(|| {
                    RigError::invalid_chain(
                        format!("{:?}", region),
                        entry.markers.first().cloned().unwrap_or_default(),
                        format!("attachment index {:?} is outside the chain", index),
                    )
                })?;
                Some(joint)
            }
        };

        let mut chain = Vec::with_capacity(entry.markers.len());
        for name in &entry.markers {
            let marker = markers.take(scene, name)?;
            let joint = scene.create_joint(&marker.name, marker.position)?;
            scene.set_parent(joint, parent)?;
            if let Some(parent) = parent {
                scene.orient_joint(parent)?;
            }
            joints.insert(marker.name, joint);
            chain.push(joint);
            parent = Some(joint);
        }
        debug!(region = ?entry.region, joints = chain.len(), "built joint chain");
        chains.insert(entry.region, chain);
    }
    markers.finish(scene)?;

    let single = |region: Region, chains: &HashMap<Region, Vec<NodeId>>| -> RigResult<NodeId> {
        chains
            .get(&region)
            .and_then(|c| c.first().copied())
            .ok_or_else(|| RigError::invalid_chain(format!("{:?}", region), "", "chain is empty"))
    };
    let root = single(Region::Root, &chains)?;
    let pelvis = single(Region::Pelvis, &chains)?;
    let spine = chains.get(&Region::Spine).cloned().unwrap_or_default();

    let mut limbs = BTreeMap::new();
    for side in &topology.sides {
        let side = *side;
        let take = |region: Region| chains.get(&region).cloned().unwrap_or_default();
        limbs.insert(
            side,
            LimbJoints {
                side,
                arm: take(Region::Arm(side)),
                thumb: take(Region::Thumb(side)),
                index: take(Region::Index(side)),
                middle: take(Region::Middle(side)),
                leg: take(Region::Leg(side)),
            },
        );
    }

    info!(joints = joints.len(), sides = limbs.len(), "skeleton built");
    Ok(SkeletonHandles {
        root,
        pelvis,
        spine,
        limbs,
        joints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::MarkerSet;
    use crate::scene::{MemoryScene, NodeKind};
    use crate::topology::{default_markers, BodyKind, SpineKind};
    use glam::DVec3;
    use std::collections::BTreeSet;
    use pretty_assertions::assert_eq;

    fn build(body: BodyKind, spine: SpineKind) -> (MemoryScene, MarkerBoard, SkeletonHandles) {
        let mut scene = MemoryScene::new();
        let mut board = MarkerBoard::new(MarkerSet::from_markers(default_markers(body, spine)));
        board.place(&mut scene).unwrap();
        let topology = Topology::character(spine, body.sides());
        let skeleton = build_skeleton(&mut scene, &mut board, &topology).unwrap();
        (scene, board, skeleton)
    }

    #[test]
    fn test_full_body_hierarchy() {
        let (scene, board, skeleton) = build(BodyKind::Full, SpineKind::Plain);

        assert_eq!(scene.parent(skeleton.root).unwrap(), None);
        assert_eq!(scene.parent(skeleton.pelvis).unwrap(), Some(skeleton.root));
        assert_eq!(scene.parent(skeleton.spine[0]).unwrap(), Some(skeleton.pelvis));

        let torso = skeleton.torso().unwrap();
        assert_eq!(scene.name(torso).unwrap(), "spine3");
        for side in Side::BOTH {
            let limb = skeleton.limb(side).unwrap();
            assert_eq!(scene.parent(limb.arm[0]).unwrap(), Some(torso));
            assert_eq!(scene.parent(limb.leg[0]).unwrap(), Some(skeleton.pelvis));
            for digit in limb.digits() {
                assert_eq!(scene.parent(digit[0]).unwrap(), Some(limb.arm[3]));
            }
        }

        assert!(scene.find("MarkersGrp").is_none());
        assert_eq!(board.set().len(), 0);
        assert_eq!(skeleton.joints.len(), board.consumed().len());
    }

    #[test]
    fn test_joints_are_named_after_consumed_markers() {
        for body in [BodyKind::Half, BodyKind::Full] {
            for spine in [SpineKind::Plain, SpineKind::Spline] {
                let (scene, board, skeleton) = build(body, spine);
                let joints: BTreeSet<&str> =
                    skeleton.joints.keys().map(String::as_str).collect();
                let consumed: BTreeSet<&str> =
                    board.consumed().iter().map(String::as_str).collect();
                assert_eq!(joints, consumed);

                let markers: Vec<String> =
                    default_markers(body, spine).into_iter().map(|m| m.name).collect();
                let markers: BTreeSet<&str> = markers.iter().map(String::as_str).collect();
                assert_eq!(joints, markers);

                for (name, joint) in &skeleton.joints {
                    assert_eq!(&scene.name(*joint).unwrap(), name);
                    assert_eq!(scene.kind(*joint).unwrap(), NodeKind::Joint);
                }
            }
        }
    }

    #[test]
    fn test_joints_keep_marker_positions() {
        let (scene, _, skeleton) = build(BodyKind::Full, SpineKind::Spline);
        let knee = skeleton.joint("knee_r").unwrap();
        assert!(scene
            .world_position(knee)
            .unwrap()
            .abs_diff_eq(DVec3::new(-14.0, 55.0, 0.0), 1e-6));
        assert_eq!(skeleton.spine_joints().len(), 9);
        assert_eq!(scene.name(skeleton.neck().unwrap()).unwrap(), "neck");
    }

    #[test]
    fn test_parent_x_axis_points_at_child() {
        let (scene, _, skeleton) = build(BodyKind::Half, SpineKind::Plain);
        let limb = skeleton.limb(Side::Left).unwrap();
        let upper = scene.world_position(limb.arm[1]).unwrap();
        let lower = scene.world_position(limb.arm[2]).unwrap();
        let x_axis = scene.world_rotation(limb.arm[1]).unwrap() * DVec3::X;
        assert!(x_axis.abs_diff_eq((lower - upper).normalize(), 1e-6));
    }

    #[test]
    fn test_half_body_has_no_right_side() {
        let (scene, _, skeleton) = build(BodyKind::Half, SpineKind::Plain);
        assert_eq!(skeleton.sides(), vec![Side::Left]);
        let err = skeleton.limb(Side::Right).unwrap_err();
        assert!(matches!(err, RigError::MissingMarker { ref name } if name == "clavicle_r"));
        assert!(scene.find("clavicle_r").is_none());
    }

    #[test]
    fn test_missing_marker_fails_before_mutation() {
        let mut scene = MemoryScene::new();
        let mut set = MarkerSet::from_markers(default_markers(BodyKind::Half, SpineKind::Plain));
        set.remove("knee_l");
        let mut board = MarkerBoard::new(set);
        board.place(&mut scene).unwrap();
        let before = scene.len();

        let topology = Topology::character(SpineKind::Plain, &[Side::Left]);
        let err = build_skeleton(&mut scene, &mut board, &topology).unwrap_err();
        assert!(matches!(err, RigError::MissingMarker { ref name } if name == "knee_l"));
        assert_eq!(scene.len(), before);
        assert!(board.consumed().is_empty());
    }

    #[test]
    fn test_joint_path() {
        let (scene, _, skeleton) = build(BodyKind::Half, SpineKind::Plain);
        let limb = skeleton.limb(Side::Left).unwrap();
        let path = joint_path(&scene, limb.arm[0], limb.arm[3]).unwrap();
        assert_eq!(path, limb.arm);
        assert_eq!(joint_path(&scene, limb.arm[2], limb.arm[2]).unwrap(), vec![limb.arm[2]]);
        assert!(matches!(
            joint_path(&scene, limb.arm[3], limb.arm[0]),
            Err(RigError::InvalidChain { .. })
        ));
    }

    #[test]
    fn test_every_joint_has_one_parent_except_root() {
        let (scene, _, skeleton) = build(BodyKind::Full, SpineKind::Plain);
        for joint in skeleton.joints.values() {
            assert_eq!(scene.kind(*joint).unwrap(), NodeKind::Joint);
            let parent = scene.parent(*joint).unwrap();
            if *joint == skeleton.root {
                assert!(parent.is_none());
            } else {
                assert_eq!(scene.kind(parent.unwrap()).unwrap(), NodeKind::Joint);
            }
        }
    }
}
