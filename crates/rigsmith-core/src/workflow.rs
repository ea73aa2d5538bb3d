//! Rig construction workflow.
//!
//! [`RigWorkflow`] owns the scene and walks a character through the rigging
//! steps in a fixed order:
//!
//! ```text
//! markers -> skeleton -> root -> spine -> head -> arms -> legs -> done
//! ```
//!
//! Each step checks the current [`Stage`] and fails with
//! [`RigError::StageOrder`] when called out of turn. Steps that fail part
//! way leave their scene mutations in place.

use std::collections::BTreeMap;
use std::fmt;

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{LimbMode, LimbRadii, RigConfig};
use crate::controller::Controller;
use crate::error::{RigError, RigResult};
use crate::fk::build_fk_chain;
use crate::fkik::{
    create_fkik_accessories, create_fkik_switch, AccessoryOptions, FkIkAccessories, SwitchControl,
};
use crate::ik::{
    create_ik_controller, create_ik_handle, create_pole_vector_constraint,
    create_start_joint_controller, IkHandle,
};
use crate::markers::{MarkerBoard, MarkerSet};
use crate::scale::apply_uniform_scale;
use crate::scene::{ConstraintKind, NodeId, SceneAdapter};
use crate::skeleton::{build_skeleton, LimbJoints, SkeletonHandles};
use crate::snap::{snap_fk_to_ik, snap_ik_to_fk, SnapOutcome};
use crate::spline::{create_spline_spine_ik, SplineSpineRig};
use crate::topology::{default_markers, BodyKind, Side, SpineKind, Topology, SPLINE_MIDDLE_INDEX};

/// Name of the spline spine handle.
pub const SPINE_IK_NAME: &str = "spine_ik";

/// The next step a workflow will run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Markers are placed and can be moved or mirrored.
    Markers,
    /// Markers are mirrored; only moving and building the skeleton remain.
    Skeleton,
    Root,
    Spine,
    Head,
    Arms,
    Legs,
    /// Every step ran; FK/IK snapping is available.
    Done,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Markers,
        Stage::Skeleton,
        Stage::Root,
        Stage::Spine,
        Stage::Head,
        Stage::Arms,
        Stage::Legs,
        Stage::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Markers => "markers",
            Stage::Skeleton => "skeleton",
            Stage::Root => "root",
            Stage::Spine => "spine",
            Stage::Head => "head",
            Stage::Arms => "arms",
            Stage::Legs => "legs",
            Stage::Done => "done",
        }
    }

    /// Stage following this one; `Done` is terminal.
    pub fn next(&self) -> Stage {
        match self {
            Stage::Markers => Stage::Skeleton,
            Stage::Skeleton => Stage::Root,
            Stage::Root => Stage::Spine,
            Stage::Spine => Stage::Head,
            Stage::Head => Stage::Arms,
            Stage::Arms => Stage::Legs,
            Stage::Legs | Stage::Done => Stage::Done,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limb pair addressed by snapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Limb {
    Arm,
    Leg,
}

impl Limb {
    /// Index of the FK controller the IK chain starts at.
    ///
    /// Arms start below the clavicle, legs at the thigh.
    pub fn chain_offset(&self) -> usize {
        match self {
            Limb::Arm => 1,
            Limb::Leg => 0,
        }
    }
}

impl fmt::Display for Limb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limb::Arm => write!(f, "arm"),
            Limb::Leg => write!(f, "leg"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapDirection {
    /// Pose the FK controllers like the IK chain.
    FkToIk,
    /// Move the IK and pole controllers onto the FK pose.
    IkToFk,
}

/// Root and pelvis controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootRig {
    pub root: Controller,
    pub pelvis: Controller,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SpineRig {
    Fk { controllers: Vec<Controller> },
    Spline { rig: SplineSpineRig },
}

impl SpineRig {
    /// Controller the head and arms hang from.
    pub fn chest(&self) -> Option<Controller> {
        match self {
            SpineRig::Fk { controllers } => controllers.last().copied(),
            SpineRig::Spline { rig } => Some(*rig.chest()),
        }
    }
}

/// Controls built for one limb.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum LimbRig {
    Fk {
        controllers: Vec<Controller>,
    },
    Ik {
        start: Controller,
        handle: IkHandle,
        controller: Controller,
        pole: Controller,
    },
    FkIk {
        accessories: FkIkAccessories,
        switch: SwitchControl,
    },
}

impl LimbRig {
    pub fn mode(&self) -> LimbMode {
        match self {
            LimbRig::Fk { .. } => LimbMode::Fk,
            LimbRig::Ik { .. } => LimbMode::Ik,
            LimbRig::FkIk { .. } => LimbMode::FkIk,
        }
    }

    /// IK handle and switch control that cleanup moves into the rig group.
    fn loose_nodes(&self) -> Vec<NodeId> {
        match self {
            LimbRig::Fk { .. } => Vec::new(),
            LimbRig::Ik { handle, .. } => vec![handle.handle],
            LimbRig::FkIk {
                accessories,
                switch,
            } => vec![accessories.ik.handle, switch.control.shape],
        }
    }
}

/// Typed handles for everything the workflow built so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RigHandles {
    pub skeleton: Option<SkeletonHandles>,
    pub root: Option<RootRig>,
    pub spine: Option<SpineRig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub head: Vec<Controller>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub arms: BTreeMap<Side, LimbRig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub legs: BTreeMap<Side, LimbRig>,
    /// Top-level group created by cleanup.
    pub rig_group: Option<NodeId>,
}

impl RigHandles {
    pub fn limb(&self, limb: Limb, side: Side) -> Option<&LimbRig> {
        match limb {
            Limb::Arm => self.arms.get(&side),
            Limb::Leg => self.legs.get(&side),
        }
    }
}

/// Step-by-step rig construction over a scene.
#[derive(Debug)]
pub struct RigWorkflow<S: SceneAdapter> {
    scene: S,
    config: RigConfig,
    stage: Stage,
    board: MarkerBoard,
    mirrored: bool,
    rig: RigHandles,
}

impl<S: SceneAdapter> RigWorkflow<S> {
    /// Validates `config` and places its markers, or the default layout for
    /// its body and spine, as locators in the scene.
    pub fn new(mut scene: S, config: RigConfig) -> RigResult<Self> {
        config.validate()?;
        let markers = config.markers.clone().unwrap_or_else(|| {
            MarkerSet::from_markers(default_markers(config.body, config.spine))
        });
        let mut board = MarkerBoard::new(markers);
        board.place(&mut scene)?;
        info!(
            body = ?config.body,
            spine = ?config.spine,
            markers = board.set().len(),
            "placed markers"
        );
        Ok(Self {
            scene,
            config,
            stage: Stage::Markers,
            board,
            mirrored: false,
            rig: RigHandles::default(),
        })
    }

    /// Like [`RigWorkflow::new`] with caller-provided markers.
    pub fn with_markers(scene: S, config: RigConfig, markers: MarkerSet) -> RigResult<Self> {
        Self::new(scene, config.with_markers(markers))
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn into_scene(self) -> S {
        self.scene
    }

    pub fn rig(&self) -> &RigHandles {
        &self.rig
    }

    /// Current marker data, refreshed from the scene locators.
    pub fn markers(&mut self) -> RigResult<&MarkerSet> {
        self.board.refresh(&self.scene)?;
        Ok(self.board.set())
    }

    /// Skeleton handles, once the skeleton is built.
    pub fn skeleton(&self) -> RigResult<&SkeletonHandles> {
        self.rig.skeleton.as_ref().ok_or(RigError::StageOrder {
            expected: self.stage,
            actual: Stage::Root,
        })
    }

    fn ensure_stage(&self, step: Stage) -> RigResult<()> {
        let ready = self.stage == step || (step == Stage::Skeleton && self.stage == Stage::Markers);
        if ready {
            Ok(())
        } else {
            Err(RigError::StageOrder {
                expected: self.stage,
                actual: step,
            })
        }
    }

    fn advance(&mut self, finished: Stage) {
        self.stage = finished.next();
        info!(finished = %finished, next = %self.stage, "rig stage complete");
    }

    pub fn move_marker(&mut self, name: &str, position: DVec3) -> RigResult<()> {
        self.ensure_stage(Stage::Skeleton)?;
        self.board.move_marker(&mut self.scene, name, position)
    }

    /// Copies the left markers to the right side with X negated.
    ///
    /// Half body only, and only once; afterwards the skeleton gets both sides.
    pub fn mirror_markers(&mut self) -> RigResult<usize> {
        self.ensure_stage(Stage::Markers)?;
        if self.config.body != BodyKind::Half {
            return Err(RigError::MirrorUnavailable);
        }
        let mirrored = self.board.mirror(&mut self.scene)?;
        self.mirrored = true;
        self.stage = Stage::Skeleton;
        info!(mirrored, "mirrored markers");
        Ok(mirrored)
    }

    fn sides(&self) -> &'static [Side] {
        if self.config.body == BodyKind::Full || self.mirrored {
            &Side::BOTH
        } else {
            BodyKind::Half.sides()
        }
    }

    /// Turns the markers into joints and removes them from the scene.
    pub fn build_skeleton(&mut self) -> RigResult<&SkeletonHandles> {
        self.ensure_stage(Stage::Skeleton)?;
        let topology = Topology::character(self.config.spine, self.sides());
        let skeleton = build_skeleton(&mut self.scene, &mut self.board, &topology)?;
        self.board.discard(&mut self.scene)?;
        self.advance(Stage::Skeleton);
        Ok(self.rig.skeleton.insert(skeleton))
    }

    /// Root and pelvis controllers.
    ///
    /// The root offset ends up unrotated at the origin so the whole rig can
    /// be scaled along clean axes.
    pub fn build_root(&mut self) -> RigResult<&RootRig> {
        self.ensure_stage(Stage::Root)?;
        let skeleton = self.skeleton()?.clone();
        let scene = &mut self.scene;

        let controllers = build_fk_chain(
            scene,
            skeleton.root,
            Some(skeleton.pelvis),
            None,
            self.config.radii.root,
        )?;
        let (root, pelvis) = match controllers.as_slice() {
            [root, pelvis] => (*root, *pelvis),
            _ => {
                return Err(RigError::invalid_chain(
                    "root",
                    "pelvis",
                    "pelvis is not a direct child of the root",
                ))
            }
        };

        scene.delete_constraints(skeleton.root)?;
        scene.delete_constraints(skeleton.pelvis)?;
        reset_offset(scene, root.offset()?)?;
        scene.create_constraint(ConstraintKind::Parent, &[root.shape], skeleton.root, true)?;
        scene.create_constraint(ConstraintKind::Parent, &[pelvis.shape], skeleton.pelvis, true)?;

        self.advance(Stage::Root);
        Ok(self.rig.root.insert(RootRig { root, pelvis }))
    }

    fn root_rig(&self) -> RigResult<RootRig> {
        self.rig.root.ok_or(RigError::StageOrder {
            expected: self.stage,
            actual: Stage::Spine,
        })
    }

    fn chest(&self) -> RigResult<Controller> {
        self.rig
            .spine
            .as_ref()
            .and_then(SpineRig::chest)
            .ok_or(RigError::StageOrder {
                expected: self.stage,
                actual: Stage::Head,
            })
    }

    /// FK spine, or a spline spine for spline topologies, under the pelvis.
    pub fn build_spine(&mut self) -> RigResult<&SpineRig> {
        self.ensure_stage(Stage::Spine)?;
        let skeleton = self.skeleton()?.clone();
        let pelvis = self.root_rig()?.pelvis;
        let torso = skeleton.torso()?;
        let start = *skeleton
            .spine
            .first()
            .ok_or_else(|| RigError::invalid_chain("pelvis", "head", "spine chain is empty"))?;

        let spine = match self.config.spine {
            SpineKind::Plain => SpineRig::Fk {
                controllers: build_fk_chain(
                    &mut self.scene,
                    start,
                    Some(torso),
                    Some(&pelvis),
                    self.config.radii.spine,
                )?,
            },
            SpineKind::Spline => {
                let middle = *skeleton.spine.get(SPLINE_MIDDLE_INDEX).ok_or_else(|| {
                    RigError::invalid_chain("pelvis", "head", "spine chain is too short")
                })?;
                let rig = create_spline_spine_ik(
                    &mut self.scene,
                    start,
                    middle,
                    torso,
                    SPINE_IK_NAME,
                )?;
                self.scene.set_parent(rig.group, Some(pelvis.shape))?;
                SpineRig::Spline { rig }
            }
        };

        self.advance(Stage::Spine);
        Ok(self.rig.spine.insert(spine))
    }

    /// FK controllers from the neck up, under the chest.
    pub fn build_head(&mut self) -> RigResult<&[Controller]> {
        self.ensure_stage(Stage::Head)?;
        let neck = self.skeleton()?.neck()?;
        let chest = self.chest()?;
        self.rig.head = build_fk_chain(
            &mut self.scene,
            neck,
            None,
            Some(&chest),
            self.config.radii.head,
        )?;
        self.advance(Stage::Head);
        Ok(&self.rig.head)
    }

    /// Arm rigs for every built side, in the configured mode.
    pub fn build_arms(&mut self) -> RigResult<&BTreeMap<Side, LimbRig>> {
        self.ensure_stage(Stage::Arms)?;
        let skeleton = self.skeleton()?.clone();
        let chest = self.chest()?;
        let root_offset = self.root_rig()?.root.offset()?;
        let radii = self.config.radii.arm;

        for side in skeleton.sides() {
            let limb = skeleton.limb(side)?;
            let arm = self.build_arm(limb, &chest, root_offset, &radii)?;
            self.rig.arms.insert(side, arm);
        }
        self.advance(Stage::Arms);
        Ok(&self.rig.arms)
    }

    fn build_arm(
        &mut self,
        limb: &LimbJoints,
        chest: &Controller,
        root_offset: NodeId,
        radii: &LimbRadii,
    ) -> RigResult<LimbRig> {
        let scene = &mut self.scene;
        let side = limb.side;
        let [clavicle, upper_arm, lower_arm, hand] = match limb.arm.as_slice() {
            [a, b, c, d] => [*a, *b, *c, *d],
            _ => return Err(RigError::missing_marker(side.name("hand"))),
        };

        Ok(match self.config.arms {
            LimbMode::Fk => LimbRig::Fk {
                controllers: build_fk_chain(scene, clavicle, None, Some(chest), radii.fk)?,
            },
            LimbMode::Ik => {
                let start = create_start_joint_controller(
                    scene,
                    clavicle,
                    Some(chest.shape),
                    upper_arm,
                    &side.name("clavicle"),
                    radii.ik_start,
                )?;
                let handle = create_ik_handle(scene, upper_arm, hand, &side.name("arm_ik"))?;
                let controller = create_ik_controller(
                    scene,
                    &handle,
                    hand,
                    Some(root_offset),
                    &side.name("arm"),
                    radii.ik_end,
                )?;
                let pole = create_pole_vector_constraint(
                    scene,
                    &handle,
                    Some(root_offset),
                    lower_arm,
                    &side.name("pv_arm"),
                    radii.pole,
                )?;
                LimbRig::Ik {
                    start,
                    handle,
                    controller,
                    pole,
                }
            }
            LimbMode::FkIk => {
                let prefix = side.name("arm");
                let options = AccessoryOptions::new(radii.fk)
                    .with_fk_parent(chest.shape)
                    .with_ik_parent(root_offset)
                    .with_ik_start_parent(chest.shape)
                    .with_ik_offset(Limb::Arm.chain_offset());
                let accessories = create_fkik_accessories(scene, &limb.arm, &prefix, &options)?;
                let switch = create_fkik_switch(
                    scene,
                    &accessories,
                    &limb.arm,
                    &format!("{}_switch", prefix),
                )?;
                LimbRig::FkIk {
                    accessories,
                    switch,
                }
            }
        })
    }

    /// Leg rigs for every built side, then cleanup into the rig group.
    pub fn build_legs(&mut self) -> RigResult<&BTreeMap<Side, LimbRig>> {
        self.ensure_stage(Stage::Legs)?;
        let skeleton = self.skeleton()?.clone();
        let root_rig = self.root_rig()?;
        let root_offset = root_rig.root.offset()?;
        let radii = self.config.radii.leg;

        for side in skeleton.sides() {
            let limb = skeleton.limb(side)?;
            let leg = self.build_leg(limb, &root_rig.pelvis, root_offset, &radii)?;
            self.rig.legs.insert(side, leg);
        }
        self.cleanup(&skeleton, &root_rig)?;
        self.advance(Stage::Legs);
        Ok(&self.rig.legs)
    }

    fn build_leg(
        &mut self,
        limb: &LimbJoints,
        pelvis: &Controller,
        root_offset: NodeId,
        radii: &LimbRadii,
    ) -> RigResult<LimbRig> {
        let scene = &mut self.scene;
        let side = limb.side;
        let [thigh, knee, foot, ball] = match limb.leg.as_slice() {
            [a, b, c, d, ..] => [*a, *b, *c, *d],
            _ => return Err(RigError::missing_marker(side.name("ball"))),
        };

        Ok(match self.config.legs {
            LimbMode::Fk => LimbRig::Fk {
                controllers: build_fk_chain(scene, thigh, None, Some(pelvis), radii.fk)?,
            },
            LimbMode::Ik => {
                let start = create_start_joint_controller(
                    scene,
                    thigh,
                    Some(pelvis.shape),
                    thigh,
                    &side.name("thigh"),
                    radii.ik_start,
                )?;
                let handle = create_ik_handle(scene, thigh, foot, &side.name("leg_ik"))?;
                let controller = create_ik_controller(
                    scene,
                    &handle,
                    ball,
                    Some(root_offset),
                    &side.name("leg"),
                    radii.ik_end,
                )?;
                let pole = create_pole_vector_constraint(
                    scene,
                    &handle,
                    Some(root_offset),
                    knee,
                    &side.name("pv_leg"),
                    radii.pole,
                )?;
                LimbRig::Ik {
                    start,
                    handle,
                    controller,
                    pole,
                }
            }
            LimbMode::FkIk => {
                let prefix = side.name("leg");
                let chain = limb.leg_chain().to_vec();
                let options = AccessoryOptions::new(radii.fk)
                    .with_fk_parent(pelvis.shape)
                    .with_ik_parent(root_offset)
                    .with_ik_start_parent(pelvis.shape)
                    .with_ik_offset(Limb::Leg.chain_offset());
                let accessories = create_fkik_accessories(scene, &chain, &prefix, &options)?;
                let switch = create_fkik_switch(
                    scene,
                    &accessories,
                    &chain,
                    &format!("{}_switch", prefix),
                )?;
                LimbRig::FkIk {
                    accessories,
                    switch,
                }
            }
        })
    }

    /// Gathers the rig under one group and applies uniform scaling.
    fn cleanup(&mut self, skeleton: &SkeletonHandles, root_rig: &RootRig) -> RigResult<()> {
        let scene = &mut self.scene;
        let group = scene.create_group(&self.config.name)?;
        scene.set_parent(root_rig.root.offset()?, Some(group))?;
        scene.set_parent(skeleton.root, Some(group))?;
        for limb in self.rig.arms.values().chain(self.rig.legs.values()) {
            for node in limb.loose_nodes() {
                scene.set_parent(node, Some(group))?;
            }
        }
        if self.config.uniform_scale {
            apply_uniform_scale(scene, &root_rig.root, group)?;
        }
        self.rig.rig_group = Some(group);
        Ok(())
    }

    /// Runs every remaining step up to [`Stage::Done`].
    pub fn build_all(&mut self) -> RigResult<&RigHandles> {
        while self.stage != Stage::Done {
            match self.stage {
                Stage::Markers | Stage::Skeleton => {
                    self.build_skeleton()?;
                }
                Stage::Root => {
                    self.build_root()?;
                }
                Stage::Spine => {
                    self.build_spine()?;
                }
                Stage::Head => {
                    self.build_head()?;
                }
                Stage::Arms => {
                    self.build_arms()?;
                }
                Stage::Legs => {
                    self.build_legs()?;
                }
                Stage::Done => {}
            }
        }
        Ok(&self.rig)
    }

    /// Snaps one FK/IK limb.
    ///
    /// Returns the pole outcome for IK-to-FK snaps and `None` for FK-to-IK.
    pub fn snap(
        &mut self,
        limb: Limb,
        side: Side,
        direction: SnapDirection,
    ) -> RigResult<Option<SnapOutcome>> {
        self.ensure_stage(Stage::Done)?;
        let unavailable = |reason: String| RigError::SnapUnavailable {
            limb: format!("{} {}", side, limb),
            reason,
        };
        let accessories = match self.rig.limb(limb, side) {
            Some(LimbRig::FkIk { accessories, .. }) => accessories,
            Some(other) => {
                return Err(unavailable(format!("built in {} mode", other.mode())));
            }
            None => return Err(unavailable("not built".to_string())),
        };

        match direction {
            SnapDirection::FkToIk => {
                snap_fk_to_ik(
                    &mut self.scene,
                    &accessories.fk_controllers,
                    &accessories.ik_chain,
                )?;
                info!(%limb, %side, "snapped FK to IK");
                Ok(None)
            }
            SnapDirection::IkToFk => {
                let outcome = snap_ik_to_fk(
                    &mut self.scene,
                    &accessories.fk_controllers,
                    accessories.ik_controller.shape,
                    accessories.pole.shape,
                    limb.chain_offset(),
                )?;
                info!(%limb, %side, degenerate = outcome.is_degenerate(), "snapped IK to FK");
                Ok(Some(outcome))
            }
        }
    }
}

/// Moves `offset` to the origin without rotation, keeping its children in place.
fn reset_offset<S: SceneAdapter>(scene: &mut S, offset: NodeId) -> RigResult<()> {
    let children = scene.children(offset)?;
    for child in &children {
        scene.set_parent(*child, None)?;
    }
    scene.set_world_position(offset, DVec3::ZERO)?;
    scene.set_world_rotation(offset, DQuat::IDENTITY)?;
    scene.freeze_transforms(offset)?;
    for child in children {
        scene.set_parent(child, Some(offset))?;
    }
    Ok(())
}
