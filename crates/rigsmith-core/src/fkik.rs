//! FK/IK accessories and the switch network.
//!
//! A bind chain gets two parent-only duplicates, one driven by FK
//! controllers and one by an IK handle. Each bind joint is orient-constrained
//! to both; the switch's `FKIK_Switch` attribute feeds the IK weight directly
//! and the FK weight through a complement node, so the two always sum to one.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::controller::{Controller, SWITCH_COLOR, SWITCH_LINE_WIDTH};
use crate::error::{RigError, RigResult};
use crate::fk::build_fk_chain;
use crate::ik::{
    create_ik_controller, create_ik_handle, create_pole_vector_constraint,
    create_start_joint_controller, IkHandle,
};
use crate::scene::{
    Attr, ConstraintKind, ControllerShape, DisplayOverride, NodeId, Plug, SceneAdapter,
};
use crate::skeleton::joint_path;

/// Name of the enum attribute on switch controls.
pub const SWITCH_ATTR: &str = "FKIK_Switch";
/// Enum fields of the switch attribute: `fk = 0`, `ik = 1`.
pub const SWITCH_FIELDS: [&str; 2] = ["fk", "ik"];
pub const SWITCH_RADIUS: f64 = 5.0;
/// Switch circle centre, offset to the side of the end joint.
pub const SWITCH_CENTER: [f64; 3] = [-20.0, 0.0, 0.0];

/// Options for [`create_fkik_accessories`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessoryOptions {
    pub radius: f64,
    /// Node the first FK controller's offset is parented under.
    #[serde(default)]
    pub fk_parent: Option<NodeId>,
    /// Node the IK end and pole controllers are parented under.
    #[serde(default)]
    pub ik_parent: Option<NodeId>,
    /// Node the IK start controller is parented under.
    #[serde(default)]
    pub ik_start_parent: Option<NodeId>,
    /// Index of the first joint the IK handle spans.
    #[serde(default)]
    pub ik_offset: usize,
}

impl Default for AccessoryOptions {
    fn default() -> Self {
        Self {
            radius: 20.0,
            fk_parent: None,
            ik_parent: None,
            ik_start_parent: None,
            ik_offset: 0,
        }
    }
}

impl AccessoryOptions {
    pub fn new(radius: f64) -> Self {
        Self {
            radius,
            ..Self::default()
        }
    }

    pub fn with_fk_parent(mut self, parent: NodeId) -> Self {
        self.fk_parent = Some(parent);
        self
    }

    pub fn with_ik_parent(mut self, parent: NodeId) -> Self {
        self.ik_parent = Some(parent);
        self
    }

    pub fn with_ik_start_parent(mut self, parent: NodeId) -> Self {
        self.ik_start_parent = Some(parent);
        self
    }

    pub fn with_ik_offset(mut self, offset: usize) -> Self {
        self.ik_offset = offset;
        self
    }
}

/// Everything built by [`create_fkik_accessories`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FkIkAccessories {
    pub prefix: String,
    pub fk_chain: Vec<NodeId>,
    pub ik_chain: Vec<NodeId>,
    pub fk_controllers: Vec<Controller>,
    pub start: Controller,
    pub ik: IkHandle,
    pub ik_controller: Controller,
    pub pole: Controller,
    pub ik_offset: usize,
}

/// A switch control and the network it drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchControl {
    pub control: Controller,
    /// The `FKIK_Switch` plug.
    pub attr: Plug,
    /// Orient constraint per bind joint, drivers `[fk, ik]`.
    pub constraints: Vec<NodeId>,
    /// Complement per bind joint feeding the FK weight.
    pub complements: Vec<NodeId>,
    /// Complement feeding FK controller visibility.
    pub visibility: NodeId,
}

/// Duplicates each joint (without children) as `<prefix>_<joint>` and
/// chains the copies in order. The first copy keeps the source's parent.
pub fn duplicate_chain<S: SceneAdapter>(
    scene: &mut S,
    chain: &[NodeId],
    prefix: &str,
) -> RigResult<Vec<NodeId>> {
    let mut copies = Vec::with_capacity(chain.len());
    for joint in chain {
        let name = format!("{}_{}", prefix, scene.name(*joint)?);
        copies.push(scene.duplicate_joint(*joint, &name)?);
    }
    for pair in copies.windows(2) {
        scene.set_parent(pair[1], Some(pair[0]))?;
    }
    Ok(copies)
}

/// Builds the FK and IK duplicates of `chain` and their controls.
pub fn create_fkik_accessories<S: SceneAdapter>(
    scene: &mut S,
    chain: &[NodeId],
    prefix: &str,
    options: &AccessoryOptions,
) -> RigResult<FkIkAccessories> {
    let (first, last) = match (chain.first(), chain.last()) {
        (Some(first), Some(last)) if chain.len() >= 2 => (*first, *last),
        _ => {
            return Err(RigError::invalid_chain(
                prefix,
                prefix,
                "an FK/IK chain needs at least two joints",
            ))
        }
    };
    if joint_path(scene, first, last)? != chain {
        return Err(RigError::invalid_chain(
            scene.name(first)?,
            scene.name(last)?,
            "joints are not a contiguous parent-child chain",
        ));
    }
    if options.ik_offset + 1 >= chain.len() {
        return Err(RigError::invalid_chain(
            scene.name(first)?,
            scene.name(last)?,
            format!(
                "IK offset {} leaves fewer than two joints for the handle",
                options.ik_offset
            ),
        ));
    }

    let fk_chain = duplicate_chain(scene, chain, &format!("fk_{}", prefix))?;
    let ik_chain = duplicate_chain(scene, chain, &format!("ik_{}", prefix))?;
    let ik_end = ik_chain[ik_chain.len() - 1];

    let fk_controllers = build_fk_chain(
        scene,
        fk_chain[0],
        fk_chain.last().copied(),
        None,
        options.radius,
    )?;
    if let (Some(first), Some(parent)) = (fk_controllers.first(), options.fk_parent) {
        scene.set_parent(first.top(), Some(parent))?;
    }

    let start = create_start_joint_controller(
        scene,
        ik_chain[0],
        options.ik_start_parent,
        ik_chain[options.ik_offset],
        &format!("{}_start_ik", prefix),
        options.radius,
    )?;
    let ik = create_ik_handle(
        scene,
        ik_chain[options.ik_offset],
        ik_end,
        &format!("{}_ik", prefix),
    )?;
    let ik_controller = create_ik_controller(
        scene,
        &ik,
        ik_end,
        options.ik_parent,
        &format!("{}_ik", prefix),
        options.radius,
    )?;
    let pole_joint = ik_chain[ik_chain.len() - 2];
    let pole = create_pole_vector_constraint(
        scene,
        &ik,
        options.ik_parent,
        pole_joint,
        &format!("{}_pv", prefix),
        options.radius,
    )?;

    debug!(prefix, joints = chain.len(), "built FK/IK accessories");
    Ok(FkIkAccessories {
        prefix: prefix.to_string(),
        fk_chain,
        ik_chain,
        fk_controllers,
        start,
        ik,
        ik_controller,
        pole,
        ik_offset: options.ik_offset,
    })
}

/// Wires the bind chain to blend between the FK and IK duplicates.
pub fn create_fkik_switch<S: SceneAdapter>(
    scene: &mut S,
    accessories: &FkIkAccessories,
    bind_chain: &[NodeId],
    name: &str,
) -> RigResult<SwitchControl> {
    let lengths = [
        accessories.fk_chain.len(),
        accessories.ik_chain.len(),
        bind_chain.len(),
    ];
    if lengths[0] != lengths[2] || lengths[1] != lengths[2] || bind_chain.is_empty() {
        return Err(RigError::invalid_chain(
            format!("fk_{}", accessories.prefix),
            name,
            format!(
                "fk, ik and bind chains differ in length ({}, {}, {})",
                lengths[0], lengths[1], lengths[2]
            ),
        ));
    }

    let shape = ControllerShape::circle(SWITCH_RADIUS)
        .with_normal(DVec3::Z)
        .with_center(DVec3::from_array(SWITCH_CENTER));
    let switch = scene.create_controller(name, &shape)?;
    let switch_name = scene.name(switch)?;
    scene.set_display(
        switch,
        DisplayOverride::color(SWITCH_COLOR).with_line_width(SWITCH_LINE_WIDTH),
    )?;
    let bind_end = bind_chain[bind_chain.len() - 1];
    scene.create_constraint(ConstraintKind::Parent, &[bind_end], switch, false)?;
    scene.delete_constraints(switch)?;

    let attr = scene.add_enum_attr(switch, SWITCH_ATTR, &SWITCH_FIELDS)?;

    let mut constraints = Vec::with_capacity(bind_chain.len());
    let mut complements = Vec::with_capacity(bind_chain.len());
    for ((fk, ik), bind) in accessories
        .fk_chain
        .iter()
        .zip(&accessories.ik_chain)
        .zip(bind_chain)
    {
        let constraint = scene.create_constraint(ConstraintKind::Orient, &[*fk, *ik], *bind, true)?;
        scene.connect_attr(&attr, &Plug::new(constraint, Attr::Weight(1)))?;

        let bind_name = scene.name(*bind)?;
        let complement = scene.create_complement(&format!("reverse_{}", bind_name))?;
        scene.connect_attr(&attr, &Plug::new(complement, Attr::Input))?;
        scene.connect_attr(
            &Plug::new(complement, Attr::Output),
            &Plug::new(constraint, Attr::Weight(0)),
        )?;
        constraints.push(constraint);
        complements.push(complement);
    }

    let visibility = scene.create_complement(&format!("{}_reverseVis", switch_name))?;
    scene.connect_attr(&attr, &Plug::new(visibility, Attr::Input))?;
    for ctrl in &accessories.fk_controllers {
        scene.connect_attr(
            &Plug::new(visibility, Attr::Output),
            &Plug::new(ctrl.shape, Attr::Visibility),
        )?;
    }
    for ctrl in [&accessories.start, &accessories.ik_controller, &accessories.pole] {
        scene.connect_attr(&attr, &Plug::new(ctrl.shape, Attr::Visibility))?;
    }

    scene.lock_and_hide(switch, &Attr::transform_channels())?;
    debug!(switch = %switch_name, joints = bind_chain.len(), "built FK/IK switch");

    Ok(SwitchControl {
        control: Controller::bare(switch),
        attr,
        constraints,
        complements,
        visibility,
    })
}
