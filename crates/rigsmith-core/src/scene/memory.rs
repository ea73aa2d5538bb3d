//! In-memory scene graph.
//!
//! `MemoryScene` keeps a transform hierarchy with per-node rest matrices and
//! animatable channels. The local matrix of a node is
//!
//! ```text
//! rest * translate * (joint_orient * rotate) * scale
//! ```
//!
//! with `rotate` stored as `xyz` Euler degrees. Freezing bakes the channels
//! into `rest`; re-parenting compensates `rest` so world transforms and
//! channel values are both preserved.
//!
//! Constraints are recorded as child nodes of the node they drive. A
//! constraint created without offset is applied once at creation time;
//! afterwards [`MemoryScene::evaluate_constraint`] and
//! [`MemoryScene::apply_constraint`] evaluate it on demand. There is no
//! dependency graph and no IK solve.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::RangeInclusive;

use glam::{DAffine3, DQuat, DVec3};
use serde::Serialize;

use super::{
    Attr, Axis, ConstraintKind, ControllerShape, DisplayOverride, IkHandleNodes, IkSolver, NodeId,
    NodeKind, Plug, SceneAdapter, SceneError, SceneResult,
};
use crate::math::{self, euler_degrees_to_quat, quat_to_euler_degrees, EPSILON};

/// Number of control vertices on a spline IK curve.
pub const SPLINE_CURVE_CVS: usize = 4;

#[derive(Debug, Clone)]
struct Node {
    name: String,
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    rest: DAffine3,
    translate: DVec3,
    joint_orient: DQuat,
    rotate: DVec3,
    scale: DVec3,
    visibility: f64,
    enums: BTreeMap<String, EnumAttr>,
    locked: BTreeSet<Attr>,
    display: DisplayOverride,
    payload: Payload,
}

impl Node {
    fn new(name: String, kind: NodeKind, rest: DAffine3, payload: Payload) -> Self {
        Self {
            name,
            kind,
            parent: None,
            children: Vec::new(),
            rest,
            translate: DVec3::ZERO,
            joint_orient: DQuat::IDENTITY,
            rotate: DVec3::ZERO,
            scale: DVec3::ONE,
            visibility: 1.0,
            enums: BTreeMap::new(),
            locked: BTreeSet::new(),
            display: DisplayOverride::default(),
            payload,
        }
    }

    fn has_transform(&self) -> bool {
        self.kind != NodeKind::Complement
    }

    fn channel_matrix(&self) -> DAffine3 {
        DAffine3::from_scale_rotation_translation(
            self.scale,
            self.joint_orient * euler_degrees_to_quat(self.rotate),
            self.translate,
        )
    }
}

#[derive(Debug, Clone)]
struct EnumAttr {
    fields: Vec<String>,
    value: f64,
}

#[derive(Debug, Clone)]
enum Payload {
    None,
    Shape(ControllerShape),
    Constraint(ConstraintData),
    IkHandle(IkHandleData),
    Curve(Vec<DVec3>),
    Cluster {
        curve: NodeId,
        cvs: RangeInclusive<usize>,
    },
    Complement {
        input: f64,
    },
}

#[derive(Debug, Clone)]
struct ConstraintData {
    kind: ConstraintKind,
    driven: NodeId,
    drivers: Vec<NodeId>,
    weights: Vec<f64>,
    offsets: Vec<DAffine3>,
    maintain_offset: bool,
}

#[derive(Debug, Clone)]
struct IkHandleData {
    solver: IkSolver,
    start: NodeId,
    end: NodeId,
    effector: NodeId,
    curve: Option<NodeId>,
    twist: f64,
}

/// Read-only view of a constraint node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstraintInfo {
    pub kind: ConstraintKind,
    pub driven: NodeId,
    pub drivers: Vec<NodeId>,
    pub maintain_offset: bool,
}

/// Read-only view of an IK handle node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IkHandleInfo {
    pub solver: IkSolver,
    pub start: NodeId,
    pub end: NodeId,
    pub effector: NodeId,
    pub curve: Option<NodeId>,
}

/// World-space result of evaluating a constraint.
///
/// A field is `None` when the constraint does not drive that component or
/// when all of its weights are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConstraintOutput {
    pub position: Option<DVec3>,
    pub rotation: Option<DQuat>,
}

/// One line of a scene outline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlineEntry {
    pub name: String,
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub depth: usize,
    pub world_position: DVec3,
}

/// Node and connection counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneSummary {
    pub nodes: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub connections: usize,
}

/// In-memory [`SceneAdapter`].
#[derive(Debug, Clone, Default)]
pub struct MemoryScene {
    nodes: Vec<Option<Node>>,
    names: HashMap<String, NodeId>,
    /// Destination plug to source plug.
    connections: BTreeMap<Plug, Plug>,
}

impl MemoryScene {
    /// Creates an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks a node up by its exact name.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nodes parented to the world, in creation order.
    pub fn roots(&self) -> Vec<NodeId> {
        self.live()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(id, _)| id)
            .collect()
    }

    /// Every connection as `(source, destination)`.
    pub fn connections(&self) -> Vec<(Plug, Plug)> {
        self.connections
            .iter()
            .map(|(dst, src)| (src.clone(), dst.clone()))
            .collect()
    }

    /// Full world matrix of a node.
    pub fn world_matrix(&self, id: NodeId) -> SceneResult<DAffine3> {
        let mut matrix = self.local_matrix(id)?;
        let mut current = self.node(id)?.parent;
        while let Some(parent) = current {
            matrix = self.local_matrix(parent)? * matrix;
            current = self.node(parent)?.parent;
        }
        Ok(matrix)
    }

    /// Euler rotation channels in degrees.
    pub fn rotation_channels(&self, id: NodeId) -> SceneResult<DVec3> {
        Ok(self.node(id)?.rotate)
    }

    pub fn joint_orient(&self, id: NodeId) -> SceneResult<DQuat> {
        Ok(self.node(id)?.joint_orient)
    }

    pub fn display(&self, id: NodeId) -> SceneResult<DisplayOverride> {
        Ok(self.node(id)?.display)
    }

    /// Circle shape of a controller node.
    pub fn controller_shape(&self, id: NodeId) -> SceneResult<ControllerShape> {
        let node = self.node(id)?;
        match &node.payload {
            Payload::Shape(shape) => Ok(*shape),
            _ => Err(wrong_kind(node, NodeKind::Controller)),
        }
    }

    pub fn constraint_info(&self, id: NodeId) -> SceneResult<ConstraintInfo> {
        let data = self.constraint_data(id)?;
        Ok(ConstraintInfo {
            kind: data.kind,
            driven: data.driven,
            drivers: data.drivers.clone(),
            maintain_offset: data.maintain_offset,
        })
    }

    pub fn ik_handle_info(&self, id: NodeId) -> SceneResult<IkHandleInfo> {
        let node = self.node(id)?;
        match &node.payload {
            Payload::IkHandle(data) => Ok(IkHandleInfo {
                solver: data.solver,
                start: data.start,
                end: data.end,
                effector: data.effector,
                curve: data.curve,
            }),
            _ => Err(wrong_kind(node, NodeKind::IkHandle)),
        }
    }

    /// World-space control vertices of a curve.
    pub fn curve_cvs(&self, id: NodeId) -> SceneResult<Vec<DVec3>> {
        let node = self.node(id)?;
        match &node.payload {
            Payload::Curve(cvs) => {
                let world = self.world_matrix(id)?;
                Ok(cvs.iter().map(|cv| world.transform_point3(*cv)).collect())
            }
            _ => Err(wrong_kind(node, NodeKind::Curve)),
        }
    }

    /// Curve and CV range deformed by a cluster.
    pub fn cluster_range(&self, id: NodeId) -> SceneResult<(NodeId, RangeInclusive<usize>)> {
        let node = self.node(id)?;
        match &node.payload {
            Payload::Cluster { curve, cvs } => Ok((*curve, cvs.clone())),
            _ => Err(wrong_kind(node, NodeKind::Cluster)),
        }
    }

    /// Evaluates a constraint against the current driver transforms and weights.
    pub fn evaluate_constraint(&self, id: NodeId) -> SceneResult<ConstraintOutput> {
        let data = self.constraint_data(id)?;

        let mut weights = Vec::with_capacity(data.drivers.len());
        for index in 0..data.drivers.len() {
            let weight = self.get_attr(&Plug::new(id, Attr::Weight(index)))?;
            weights.push(weight.max(0.0));
        }
        let total: f64 = weights.iter().sum();
        if total <= EPSILON {
            return Ok(ConstraintOutput::default());
        }

        let mut worlds = Vec::with_capacity(data.drivers.len());
        for driver in &data.drivers {
            worlds.push(self.world_matrix(*driver)?);
        }
        let weighted_position = |positions: &[DVec3]| -> DVec3 {
            positions
                .iter()
                .zip(&weights)
                .map(|(p, w)| *p * *w)
                .sum::<DVec3>()
                / total
        };

        let output = match data.kind {
            ConstraintKind::Point => {
                let positions: Vec<DVec3> = worlds
                    .iter()
                    .zip(&data.offsets)
                    .map(|(world, offset)| world.translation + offset.translation)
                    .collect();
                ConstraintOutput {
                    position: Some(weighted_position(&positions)),
                    rotation: None,
                }
            }
            ConstraintKind::Orient => {
                let candidates: Vec<(DQuat, f64)> = worlds
                    .iter()
                    .zip(&data.offsets)
                    .zip(&weights)
                    .map(|((world, offset), w)| (rotation_of(world) * rotation_of(offset), *w))
                    .collect();
                ConstraintOutput {
                    position: None,
                    rotation: math::blend_weighted(&candidates),
                }
            }
            ConstraintKind::Parent => {
                let targets: Vec<DAffine3> = worlds
                    .iter()
                    .zip(&data.offsets)
                    .map(|(world, offset)| rigid(world) * *offset)
                    .collect();
                let positions: Vec<DVec3> = targets.iter().map(|t| t.translation).collect();
                let candidates: Vec<(DQuat, f64)> = targets
                    .iter()
                    .zip(&weights)
                    .map(|(t, w)| (rotation_of(t), *w))
                    .collect();
                ConstraintOutput {
                    position: Some(weighted_position(&positions)),
                    rotation: math::blend_weighted(&candidates),
                }
            }
            ConstraintKind::Aim => {
                let positions: Vec<DVec3> = worlds.iter().map(|w| w.translation).collect();
                let target = weighted_position(&positions);
                let origin = self.world_position(data.driven)?;
                let offset = data
                    .offsets
                    .first()
                    .map(rotation_of)
                    .unwrap_or(DQuat::IDENTITY);
                ConstraintOutput {
                    position: None,
                    rotation: aim_rotation(origin, target).map(|aim| (aim * offset).normalize()),
                }
            }
            ConstraintKind::PoleVector => ConstraintOutput::default(),
        };
        Ok(output)
    }

    /// Evaluates a constraint and writes the result onto the driven node.
    pub fn apply_constraint(&mut self, id: NodeId) -> SceneResult<()> {
        let driven = self.constraint_data(id)?.driven;
        let output = self.evaluate_constraint(id)?;
        if let Some(position) = output.position {
            self.set_world_position(driven, position)?;
        }
        if let Some(rotation) = output.rotation {
            self.set_world_rotation(driven, rotation)?;
        }
        Ok(())
    }

    /// Depth-first listing of the whole scene.
    pub fn outline(&self) -> SceneResult<Vec<OutlineEntry>> {
        let mut entries = Vec::with_capacity(self.len());
        let mut stack: Vec<(NodeId, usize)> =
            self.roots().into_iter().rev().map(|id| (id, 0)).collect();

        while let Some((id, depth)) = stack.pop() {
            let node = self.node(id)?;
            let parent = match node.parent {
                Some(parent) => Some(self.node(parent)?.name.clone()),
                None => None,
            };
            entries.push(OutlineEntry {
                name: node.name.clone(),
                kind: node.kind,
                parent,
                depth,
                world_position: self.world_position(id)?,
            });
            for child in node.children.iter().rev() {
                stack.push((*child, depth + 1));
            }
        }
        Ok(entries)
    }

    pub fn summary(&self) -> SceneSummary {
        let mut by_kind = BTreeMap::new();
        for (_, node) in self.live() {
            *by_kind.entry(node.kind.as_str().to_string()).or_insert(0) += 1;
        }
        SceneSummary {
            nodes: self.len(),
            by_kind,
            connections: self.connections.len(),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn live(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(index, node)| node.as_ref().map(|n| (NodeId(index as u32), n)))
    }

    fn node(&self, id: NodeId) -> SceneResult<&Node> {
        self.nodes
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(SceneError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> SceneResult<&mut Node> {
        self.nodes
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(SceneError::UnknownNode(id))
    }

    fn constraint_data(&self, id: NodeId) -> SceneResult<&ConstraintData> {
        let node = self.node(id)?;
        match &node.payload {
            Payload::Constraint(data) => Ok(data),
            _ => Err(wrong_kind(node, NodeKind::Constraint)),
        }
    }

    fn expect_kind(&self, id: NodeId, expected: NodeKind) -> SceneResult<()> {
        let node = self.node(id)?;
        if node.kind == expected {
            Ok(())
        } else {
            Err(wrong_kind(node, expected))
        }
    }

    fn unique_name(&self, requested: &str) -> SceneResult<String> {
        if requested.is_empty() {
            return Err(SceneError::EmptyName);
        }
        if !self.names.contains_key(requested) {
            return Ok(requested.to_string());
        }
        let mut suffix = 1usize;
        loop {
            let candidate = format!("{}{}", requested, suffix);
            if !self.names.contains_key(&candidate) {
                return Ok(candidate);
            }
            suffix += 1;
        }
    }

    fn insert(
        &mut self,
        name: &str,
        kind: NodeKind,
        rest: DAffine3,
        payload: Payload,
    ) -> SceneResult<NodeId> {
        let name = self.unique_name(name)?;
        let id = NodeId(self.nodes.len() as u32);
        self.names.insert(name.clone(), id);
        self.nodes.push(Some(Node::new(name, kind, rest, payload)));
        Ok(id)
    }

    /// Links `id` under `parent` without touching any transform.
    fn attach(&mut self, id: NodeId, parent: Option<NodeId>) -> SceneResult<()> {
        if let Some(old) = self.node(id)?.parent {
            self.node_mut(old)?.children.retain(|child| *child != id);
        }
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.push(id);
        }
        self.node_mut(id)?.parent = parent;
        Ok(())
    }

    fn is_descendant(&self, candidate: NodeId, ancestor: NodeId) -> SceneResult<bool> {
        let mut current = self.node(candidate)?.parent;
        while let Some(id) = current {
            if id == ancestor {
                return Ok(true);
            }
            current = self.node(id)?.parent;
        }
        Ok(false)
    }

    fn resolved_channel(&self, id: NodeId, stored: DVec3, attr: fn(Axis) -> Attr) -> SceneResult<DVec3> {
        let mut value = stored;
        for axis in Axis::ALL {
            if let Some(source) = self.connections.get(&Plug::new(id, attr(axis))) {
                value[axis.index()] = self.get_attr(source)?;
            }
        }
        Ok(value)
    }

    fn local_matrix(&self, id: NodeId) -> SceneResult<DAffine3> {
        let node = self.node(id)?;
        let translate = self.resolved_channel(id, node.translate, Attr::Translate)?;
        let rotate = self.resolved_channel(id, node.rotate, Attr::Rotate)?;
        let scale = self.resolved_channel(id, node.scale, Attr::Scale)?;
        Ok(node.rest
            * DAffine3::from_scale_rotation_translation(
                scale,
                node.joint_orient * euler_degrees_to_quat(rotate),
                translate,
            ))
    }

    fn parent_world(&self, id: NodeId) -> SceneResult<DAffine3> {
        match self.node(id)?.parent {
            Some(parent) => self.world_matrix(parent),
            None => Ok(DAffine3::IDENTITY),
        }
    }

    /// Space the translate channel of `id` is expressed in.
    fn channel_frame(&self, id: NodeId) -> SceneResult<DAffine3> {
        Ok(self.parent_world(id)? * self.node(id)?.rest)
    }

    /// Rewrites the rest matrix so the node keeps `world` with its current
    /// parent and channels.
    fn keep_world(&mut self, id: NodeId, world: DAffine3) -> SceneResult<()> {
        let parent_world = self.parent_world(id)?;
        let channels = self.node(id)?.channel_matrix();
        self.node_mut(id)?.rest = parent_world.inverse() * world * channels.inverse();
        Ok(())
    }

    fn check_writable(&self, id: NodeId, attrs: &[Attr]) -> SceneResult<()> {
        let node = self.node(id)?;
        for attr in attrs {
            if node.locked.contains(attr) {
                return Err(SceneError::LockedAttribute {
                    name: node.name.clone(),
                    attr: attr.to_string(),
                });
            }
            if self.connections.contains_key(&Plug::new(id, attr.clone())) {
                return Err(SceneError::ConnectedAttribute {
                    name: node.name.clone(),
                    attr: attr.to_string(),
                });
            }
        }
        Ok(())
    }

    fn unknown_attr(&self, plug: &Plug) -> SceneError {
        SceneError::UnknownAttribute {
            name: self
                .node(plug.node)
                .map(|n| n.name.clone())
                .unwrap_or_else(|_| plug.node.to_string()),
            attr: plug.attr.to_string(),
        }
    }

    /// Stored (unconnected) value of an attribute.
    fn stored_attr(&self, plug: &Plug) -> SceneResult<f64> {
        let node = self.node(plug.node)?;
        let value = match (&plug.attr, &node.payload) {
            (Attr::Translate(axis), _) if node.has_transform() => node.translate[axis.index()],
            (Attr::Rotate(axis), _) if node.has_transform() => node.rotate[axis.index()],
            (Attr::Scale(axis), _) if node.has_transform() => node.scale[axis.index()],
            (Attr::Visibility, _) if node.has_transform() => node.visibility,
            (Attr::Twist, Payload::IkHandle(data)) => data.twist,
            (Attr::Weight(index), Payload::Constraint(data)) => data
                .weights
                .get(*index)
                .copied()
                .ok_or_else(|| self.unknown_attr(plug))?,
            (Attr::Input, Payload::Complement { input }) => *input,
            (Attr::Output, Payload::Complement { input }) => 1.0 - *input,
            (Attr::Custom(name), _) => node
                .enums
                .get(name)
                .map(|e| e.value)
                .ok_or_else(|| self.unknown_attr(plug))?,
            _ => return Err(self.unknown_attr(plug)),
        };
        Ok(value)
    }

    fn constraint_offsets(
        &self,
        kind: ConstraintKind,
        drivers: &[NodeId],
        driven: NodeId,
    ) -> SceneResult<Vec<DAffine3>> {
        let driven_world = self.world_matrix(driven)?;
        let driven_rotation = rotation_of(&driven_world);

        let aim_offset = if kind == ConstraintKind::Aim {
            let mut target = DVec3::ZERO;
            for driver in drivers {
                target += self.world_position(*driver)?;
            }
            target /= drivers.len() as f64;
            let aim = aim_rotation(driven_world.translation, target).unwrap_or(DQuat::IDENTITY);
            DAffine3::from_quat(aim.inverse() * driven_rotation)
        } else {
            DAffine3::IDENTITY
        };

        drivers
            .iter()
            .map(|driver| {
                let world = self.world_matrix(*driver)?;
                Ok(match kind {
                    ConstraintKind::Point => {
                        DAffine3::from_translation(driven_world.translation - world.translation)
                    }
                    ConstraintKind::Orient => {
                        DAffine3::from_quat(rotation_of(&world).inverse() * driven_rotation)
                    }
                    ConstraintKind::Parent => rigid(&world).inverse() * rigid(&driven_world),
                    ConstraintKind::Aim => aim_offset,
                    ConstraintKind::PoleVector => DAffine3::IDENTITY,
                })
            })
            .collect()
    }
}

impl SceneAdapter for MemoryScene {
    fn create_group(&mut self, name: &str) -> SceneResult<NodeId> {
        self.insert(name, NodeKind::Group, DAffine3::IDENTITY, Payload::None)
    }

    fn create_locator(&mut self, name: &str, position: DVec3) -> SceneResult<NodeId> {
        self.insert(
            name,
            NodeKind::Locator,
            DAffine3::from_translation(position),
            Payload::None,
        )
    }

    fn create_joint(&mut self, name: &str, position: DVec3) -> SceneResult<NodeId> {
        self.insert(
            name,
            NodeKind::Joint,
            DAffine3::from_translation(position),
            Payload::None,
        )
    }

    fn create_controller(&mut self, name: &str, shape: &ControllerShape) -> SceneResult<NodeId> {
        self.insert(
            name,
            NodeKind::Controller,
            DAffine3::IDENTITY,
            Payload::Shape(*shape),
        )
    }

    fn create_complement(&mut self, name: &str) -> SceneResult<NodeId> {
        self.insert(
            name,
            NodeKind::Complement,
            DAffine3::IDENTITY,
            Payload::Complement { input: 0.0 },
        )
    }

    fn duplicate_joint(&mut self, joint: NodeId, name: &str) -> SceneResult<NodeId> {
        self.expect_kind(joint, NodeKind::Joint)?;
        let source = self.node(joint)?.clone();
        let id = self.insert(name, NodeKind::Joint, source.rest, Payload::None)?;
        {
            let copy = self.node_mut(id)?;
            copy.translate = source.translate;
            copy.joint_orient = source.joint_orient;
            copy.rotate = source.rotate;
            copy.scale = source.scale;
            copy.visibility = source.visibility;
        }
        self.attach(id, source.parent)?;
        Ok(id)
    }

    fn delete(&mut self, node: NodeId) -> SceneResult<()> {
        self.node(node)?;
        self.attach(node, None)?;

        let mut doomed = BTreeSet::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            doomed.insert(id);
            stack.extend(self.node(id)?.children.iter().copied());
        }
        for id in &doomed {
            if let Some(removed) = self.nodes[id.0 as usize].take() {
                self.names.remove(&removed.name);
            }
        }
        self.connections
            .retain(|dst, src| !doomed.contains(&dst.node) && !doomed.contains(&src.node));
        Ok(())
    }

    fn exists(&self, node: NodeId) -> bool {
        self.node(node).is_ok()
    }

    fn name(&self, node: NodeId) -> SceneResult<String> {
        Ok(self.node(node)?.name.clone())
    }

    fn kind(&self, node: NodeId) -> SceneResult<NodeKind> {
        Ok(self.node(node)?.kind)
    }

    fn parent(&self, node: NodeId) -> SceneResult<Option<NodeId>> {
        Ok(self.node(node)?.parent)
    }

    fn children(&self, node: NodeId) -> SceneResult<Vec<NodeId>> {
        Ok(self.node(node)?.children.clone())
    }

    fn set_parent(&mut self, node: NodeId, parent: Option<NodeId>) -> SceneResult<()> {
        if let Some(parent) = parent {
            if parent == node || self.is_descendant(parent, node)? {
                return Err(SceneError::Cycle {
                    node: self.name(node)?,
                    parent: self.name(parent)?,
                });
            }
        }
        if self.node(node)?.parent == parent {
            return Ok(());
        }
        let world = self.world_matrix(node)?;
        self.attach(node, parent)?;
        self.keep_world(node, world)
    }

    fn world_position(&self, node: NodeId) -> SceneResult<DVec3> {
        Ok(self.world_matrix(node)?.translation)
    }

    fn world_rotation(&self, node: NodeId) -> SceneResult<DQuat> {
        Ok(rotation_of(&self.world_matrix(node)?))
    }

    fn set_world_position(&mut self, node: NodeId, position: DVec3) -> SceneResult<()> {
        let channels: Vec<Attr> = Axis::ALL.iter().map(|a| Attr::Translate(*a)).collect();
        self.check_writable(node, &channels)?;
        let frame = self.channel_frame(node)?;
        self.node_mut(node)?.translate = frame.inverse().transform_point3(position);
        Ok(())
    }

    fn set_world_rotation(&mut self, node: NodeId, rotation: DQuat) -> SceneResult<()> {
        let channels: Vec<Attr> = Axis::ALL.iter().map(|a| Attr::Rotate(*a)).collect();
        self.check_writable(node, &channels)?;
        let frame = rotation_of(&self.channel_frame(node)?);
        let target = self.node_mut(node)?;
        let local = (frame * target.joint_orient).inverse() * rotation;
        target.rotate = quat_to_euler_degrees(local.normalize());
        Ok(())
    }

    fn freeze_transforms(&mut self, node: NodeId) -> SceneResult<()> {
        let target = self.node_mut(node)?;
        target.rest = target.rest * target.channel_matrix();
        target.translate = DVec3::ZERO;
        target.joint_orient = DQuat::IDENTITY;
        target.rotate = DVec3::ZERO;
        target.scale = DVec3::ONE;
        Ok(())
    }

    fn delete_history(&mut self, node: NodeId) -> SceneResult<()> {
        self.node(node).map(|_| ())
    }

    fn orient_joint(&mut self, joint: NodeId) -> SceneResult<()> {
        self.expect_kind(joint, NodeKind::Joint)?;
        let Some(aim_child) = self.child_joints(joint)?.first().copied() else {
            return Ok(());
        };

        let children = self.children(joint)?;
        let mut saved = Vec::with_capacity(children.len());
        for child in &children {
            saved.push((*child, self.world_matrix(*child)?));
        }

        let origin = self.world_position(joint)?;
        let target = math::chain_frame(origin, self.world_position(aim_child)?, DVec3::Y);
        let frame = rotation_of(&self.channel_frame(joint)?);
        {
            let node = self.node_mut(joint)?;
            node.rotate = DVec3::ZERO;
            node.joint_orient = (frame.inverse() * target).normalize();
        }

        for (child, world) in saved {
            self.keep_world(child, world)?;
        }
        Ok(())
    }

    fn create_constraint(
        &mut self,
        kind: ConstraintKind,
        drivers: &[NodeId],
        driven: NodeId,
        maintain_offset: bool,
    ) -> SceneResult<NodeId> {
        if drivers.is_empty() {
            return Err(SceneError::NoDrivers);
        }
        for driver in drivers {
            self.node(*driver)?;
        }
        let driven_name = self.name(driven)?;

        let offsets = if maintain_offset {
            self.constraint_offsets(kind, drivers, driven)?
        } else {
            vec![DAffine3::IDENTITY; drivers.len()]
        };
        let data = ConstraintData {
            kind,
            driven,
            drivers: drivers.to_vec(),
            weights: vec![1.0; drivers.len()],
            offsets,
            maintain_offset,
        };

        let name = format!("{}_{}", driven_name, kind.node_suffix());
        let id = self.insert(
            &name,
            NodeKind::Constraint,
            DAffine3::IDENTITY,
            Payload::Constraint(data),
        )?;
        self.attach(id, Some(driven))?;

        if !maintain_offset {
            self.apply_constraint(id)?;
        }
        Ok(id)
    }

    fn constraints_on(&self, node: NodeId) -> SceneResult<Vec<NodeId>> {
        let mut found = Vec::new();
        for child in &self.node(node)?.children {
            if let Payload::Constraint(data) = &self.node(*child)?.payload {
                if data.driven == node {
                    found.push(*child);
                }
            }
        }
        Ok(found)
    }

    fn create_ik_handle(
        &mut self,
        name: &str,
        start: NodeId,
        end: NodeId,
        solver: IkSolver,
    ) -> SceneResult<IkHandleNodes> {
        self.expect_kind(start, NodeKind::Joint)?;
        self.expect_kind(end, NodeKind::Joint)?;
        if start == end || !self.is_descendant(end, start)? {
            return Err(SceneError::NotAChain {
                start: self.name(start)?,
                end: self.name(end)?,
            });
        }

        let mut chain = vec![end];
        let mut current = self.node(end)?.parent;
        while let Some(id) = current {
            chain.push(id);
            if id == start {
                break;
            }
            current = self.node(id)?.parent;
        }
        chain.reverse();

        let end_position = self.world_position(end)?;
        let effector = self.insert(
            &format!("{}_effector", name),
            NodeKind::IkEffector,
            DAffine3::from_translation(end_position),
            Payload::None,
        )?;
        let end_parent = self.node(end)?.parent;
        self.set_parent(effector, end_parent)?;

        let curve = match solver {
            IkSolver::RotatePlane => None,
            IkSolver::Spline => {
                let mut positions = Vec::with_capacity(chain.len());
                for joint in &chain {
                    positions.push(self.world_position(*joint)?);
                }
                let cvs = math::resample_polyline(&positions, SPLINE_CURVE_CVS);
                Some(self.insert(
                    &format!("{}_curve", name),
                    NodeKind::Curve,
                    DAffine3::IDENTITY,
                    Payload::Curve(cvs),
                )?)
            }
        };

        let handle = self.insert(
            name,
            NodeKind::IkHandle,
            DAffine3::from_translation(end_position),
            Payload::IkHandle(IkHandleData {
                solver,
                start,
                end,
                effector,
                curve,
                twist: 0.0,
            }),
        )?;

        Ok(IkHandleNodes {
            handle,
            effector,
            curve,
        })
    }

    fn curve_cv_count(&self, curve: NodeId) -> SceneResult<usize> {
        let node = self.node(curve)?;
        match &node.payload {
            Payload::Curve(cvs) => Ok(cvs.len()),
            _ => Err(wrong_kind(node, NodeKind::Curve)),
        }
    }

    fn create_cluster(
        &mut self,
        name: &str,
        curve: NodeId,
        cvs: RangeInclusive<usize>,
    ) -> SceneResult<NodeId> {
        let points = self.curve_cvs(curve)?;
        let (first, last) = (*cvs.start(), *cvs.end());
        if first > last || last >= points.len() {
            return Err(SceneError::InvalidCvRange {
                curve: self.name(curve)?,
                start: first,
                end: last,
                count: points.len(),
            });
        }
        let pivot = math::centroid(&points[first..=last]);
        self.insert(
            name,
            NodeKind::Cluster,
            DAffine3::from_translation(pivot),
            Payload::Cluster { curve, cvs },
        )
    }

    fn add_enum_attr(&mut self, node: NodeId, name: &str, fields: &[&str]) -> SceneResult<Plug> {
        if name.is_empty() || fields.is_empty() {
            return Err(SceneError::EmptyName);
        }
        let target = self.node_mut(node)?;
        if target.enums.contains_key(name) {
            return Err(SceneError::DuplicateAttribute {
                name: target.name.clone(),
                attr: name.to_string(),
            });
        }
        target.enums.insert(
            name.to_string(),
            EnumAttr {
                fields: fields.iter().map(|f| f.to_string()).collect(),
                value: 0.0,
            },
        );
        Ok(Plug::new(node, Attr::Custom(name.to_string())))
    }

    fn get_attr(&self, plug: &Plug) -> SceneResult<f64> {
        if let Some(source) = self.connections.get(plug) {
            return self.get_attr(source);
        }
        if plug.attr == Attr::Output {
            self.stored_attr(plug)?;
            return Ok(1.0 - self.get_attr(&Plug::new(plug.node, Attr::Input))?);
        }
        self.stored_attr(plug)
    }

    fn set_attr(&mut self, plug: &Plug, value: f64) -> SceneResult<()> {
        self.stored_attr(plug)?;
        if plug.attr == Attr::Output {
            return Err(SceneError::ReadOnlyAttribute {
                name: self.name(plug.node)?,
                attr: plug.attr.to_string(),
            });
        }
        self.check_writable(plug.node, std::slice::from_ref(&plug.attr))?;

        let node = self.node_mut(plug.node)?;
        match (&plug.attr, &mut node.payload) {
            (Attr::Translate(axis), _) => node.translate[axis.index()] = value,
            (Attr::Rotate(axis), _) => node.rotate[axis.index()] = value,
            (Attr::Scale(axis), _) => node.scale[axis.index()] = value,
            (Attr::Visibility, _) => node.visibility = value,
            (Attr::Twist, Payload::IkHandle(data)) => data.twist = value,
            (Attr::Weight(index), Payload::Constraint(data)) => data.weights[*index] = value,
            (Attr::Input, Payload::Complement { input }) => *input = value,
            (Attr::Custom(attr), _) => {
                let name = node.name.clone();
                if let Some(entry) = node.enums.get_mut(attr) {
                    // Fractional values blend between neighbouring fields.
                    let max = (entry.fields.len() - 1) as f64;
                    if !value.is_finite() || value < 0.0 || value > max {
                        return Err(SceneError::InvalidValue {
                            name,
                            attr: attr.clone(),
                            value,
                        });
                    }
                    entry.value = value;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn connect_attr(&mut self, source: &Plug, destination: &Plug) -> SceneResult<()> {
        self.stored_attr(source)?;
        self.stored_attr(destination)?;
        if destination.attr == Attr::Output {
            return Err(SceneError::ReadOnlyAttribute {
                name: self.name(destination.node)?,
                attr: destination.attr.to_string(),
            });
        }
        let node = self.node(destination.node)?;
        if node.locked.contains(&destination.attr) {
            return Err(SceneError::LockedAttribute {
                name: node.name.clone(),
                attr: destination.attr.to_string(),
            });
        }

        // Every plug has at most one upstream plug, so the walk is linear.
        let mut upstream = Some(source.clone());
        while let Some(plug) = upstream {
            if plug == *destination {
                return Err(SceneError::ConnectionCycle {
                    name: self.name(destination.node)?,
                    attr: destination.attr.to_string(),
                });
            }
            upstream = match self.connections.get(&plug) {
                Some(next) => Some(next.clone()),
                None if plug.attr == Attr::Output => Some(Plug::new(plug.node, Attr::Input)),
                None => None,
            };
        }

        self.connections.insert(destination.clone(), source.clone());
        Ok(())
    }

    fn connection_into(&self, destination: &Plug) -> SceneResult<Option<Plug>> {
        self.node(destination.node)?;
        Ok(self.connections.get(destination).cloned())
    }

    fn lock_and_hide(&mut self, node: NodeId, attrs: &[Attr]) -> SceneResult<()> {
        for attr in attrs {
            self.stored_attr(&Plug::new(node, attr.clone()))?;
        }
        let target = self.node_mut(node)?;
        target.locked.extend(attrs.iter().cloned());
        Ok(())
    }

    fn is_locked(&self, plug: &Plug) -> SceneResult<bool> {
        Ok(self.node(plug.node)?.locked.contains(&plug.attr))
    }

    fn set_display(&mut self, node: NodeId, display: DisplayOverride) -> SceneResult<()> {
        self.node_mut(node)?.display = display;
        Ok(())
    }
}

fn wrong_kind(node: &Node, expected: NodeKind) -> SceneError {
    SceneError::WrongKind {
        name: node.name.clone(),
        expected,
        actual: node.kind,
    }
}

fn rotation_of(matrix: &DAffine3) -> DQuat {
    let (_, rotation, _) = matrix.to_scale_rotation_translation();
    rotation.normalize()
}

/// Rotation and translation of a matrix with scale removed.
fn rigid(matrix: &DAffine3) -> DAffine3 {
    DAffine3::from_rotation_translation(rotation_of(matrix), matrix.translation)
}

/// Rotation taking +X onto the direction from `origin` to `target`.
fn aim_rotation(origin: DVec3, target: DVec3) -> Option<DQuat> {
    let direction = (target - origin).normalize_or_zero();
    if direction.length_squared() < EPSILON {
        None
    } else {
        Some(DQuat::from_rotation_arc(DVec3::X, direction))
    }
}
