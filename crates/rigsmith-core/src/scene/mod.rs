//! Scene Adapter interface.
//!
//! Every scene mutation the builders perform goes through [`SceneAdapter`].
//! Nodes are addressed by [`NodeId`] handles returned from creation calls,
//! attributes by typed [`Plug`]s. Name uniqueness is the adapter's job: a
//! requested name may come back with a numeric suffix.
//!
//! [`MemoryScene`] is the in-memory implementation used by the CLI and tests.

pub mod memory;

pub use memory::{
    ConstraintInfo, ConstraintOutput, IkHandleInfo, MemoryScene, OutlineEntry, SceneSummary,
    SPLINE_CURVE_CVS,
};

use std::fmt;
use std::ops::RangeInclusive;

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for scene adapter operations.
pub type SceneResult<T> = Result<T, SceneError>;

/// Handle to a node owned by a scene adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of a scene node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Empty transform used for grouping and controller offsets.
    Group,
    /// Marker locator.
    Locator,
    /// Skeleton joint.
    Joint,
    /// Transform carrying a closed-curve controller shape.
    Controller,
    /// Constraint node, parented under the node it drives.
    Constraint,
    /// IK solver handle.
    IkHandle,
    /// IK end effector.
    IkEffector,
    /// NURBS curve driven by a spline IK handle.
    Curve,
    /// Cluster handle deforming curve control vertices.
    Cluster,
    /// Utility node computing `output = 1 - input`.
    Complement,
}

impl NodeKind {
    /// Returns the lowercase name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Group => "group",
            NodeKind::Locator => "locator",
            NodeKind::Joint => "joint",
            NodeKind::Controller => "controller",
            NodeKind::Constraint => "constraint",
            NodeKind::IkHandle => "ik_handle",
            NodeKind::IkEffector => "ik_effector",
            NodeKind::Curve => "curve",
            NodeKind::Cluster => "cluster",
            NodeKind::Complement => "complement",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transform axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// All three axes in order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Component index (0, 1, 2).
    pub fn index(&self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
        }
    }
}

/// Node attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attr {
    Translate(Axis),
    Rotate(Axis),
    Scale(Axis),
    Visibility,
    /// Twist of an IK handle.
    Twist,
    /// Weight of the n-th driver of a constraint.
    Weight(usize),
    /// Input of a complement node.
    Input,
    /// Output of a complement node.
    Output,
    /// User-defined attribute added with [`SceneAdapter::add_enum_attr`].
    Custom(String),
}

impl Attr {
    /// Translate, rotate and scale channels.
    pub fn transform_channels() -> Vec<Attr> {
        Axis::ALL
            .iter()
            .map(|a| Attr::Translate(*a))
            .chain(Axis::ALL.iter().map(|a| Attr::Rotate(*a)))
            .chain(Axis::ALL.iter().map(|a| Attr::Scale(*a)))
            .collect()
    }

    /// Rotate and scale channels.
    pub fn rotate_scale_channels() -> Vec<Attr> {
        Axis::ALL
            .iter()
            .map(|a| Attr::Rotate(*a))
            .chain(Axis::ALL.iter().map(|a| Attr::Scale(*a)))
            .collect()
    }
}

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attr::Translate(a) => write!(f, "translate{}", a.suffix()),
            Attr::Rotate(a) => write!(f, "rotate{}", a.suffix()),
            Attr::Scale(a) => write!(f, "scale{}", a.suffix()),
            Attr::Visibility => f.write_str("visibility"),
            Attr::Twist => f.write_str("twist"),
            Attr::Weight(i) => write!(f, "w{}", i),
            Attr::Input => f.write_str("inputX"),
            Attr::Output => f.write_str("outputX"),
            Attr::Custom(name) => f.write_str(name),
        }
    }
}

/// Address of one attribute on one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Plug {
    pub node: NodeId,
    pub attr: Attr,
}

impl Plug {
    /// Creates a plug.
    pub fn new(node: NodeId, attr: Attr) -> Self {
        Self { node, attr }
    }
}

/// Constraint types the builders use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Position only.
    Point,
    /// Orientation only.
    Orient,
    /// Position and orientation.
    Parent,
    /// Points the driven node's X axis at the driver, no up vector.
    Aim,
    /// Fixes the bend plane of a rotate-plane IK handle.
    PoleVector,
}

impl ConstraintKind {
    /// Suffix used when naming constraint nodes.
    pub fn node_suffix(&self) -> &'static str {
        match self {
            ConstraintKind::Point => "pointConstraint",
            ConstraintKind::Orient => "orientConstraint",
            ConstraintKind::Parent => "parentConstraint",
            ConstraintKind::Aim => "aimConstraint",
            ConstraintKind::PoleVector => "poleVectorConstraint",
        }
    }
}

/// Closed circle used as a controller's visible shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControllerShape {
    pub radius: f64,
    /// Circle normal in the controller's local space.
    pub normal: DVec3,
    /// Circle centre in the controller's local space.
    pub center: DVec3,
}

impl ControllerShape {
    /// Circle facing +X centred on the pivot.
    pub fn circle(radius: f64) -> Self {
        Self {
            radius,
            normal: DVec3::X,
            center: DVec3::ZERO,
        }
    }

    /// Sets the circle normal.
    pub fn with_normal(mut self, normal: DVec3) -> Self {
        self.normal = normal;
        self
    }

    /// Sets the circle centre.
    pub fn with_center(mut self, center: DVec3) -> Self {
        self.center = center;
        self
    }
}

/// Drawing override applied to a controller shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayOverride {
    /// Palette colour index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_width: Option<f64>,
}

impl DisplayOverride {
    /// Override with only a colour.
    pub fn color(color: u8) -> Self {
        Self {
            color: Some(color),
            line_width: None,
        }
    }

    /// Sets the line width.
    pub fn with_line_width(mut self, width: f64) -> Self {
        self.line_width = Some(width);
        self
    }
}

/// IK solver type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IkSolver {
    /// Analytic two-segment rotate-plane solver.
    RotatePlane,
    /// Curve-driven spline solver.
    Spline,
}

/// Nodes produced when an IK handle is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IkHandleNodes {
    pub handle: NodeId,
    pub effector: NodeId,
    /// Driven curve, present for spline handles.
    pub curve: Option<NodeId>,
}

/// Errors reported by a scene adapter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("node '{name}' is a {actual}, expected {expected}")]
    WrongKind {
        name: String,
        expected: NodeKind,
        actual: NodeKind,
    },

    #[error("node name cannot be empty")]
    EmptyName,

    #[error("node '{name}' has no attribute '{attr}'")]
    UnknownAttribute { name: String, attr: String },

    #[error("attribute '{name}.{attr}' is locked")]
    LockedAttribute { name: String, attr: String },

    #[error("attribute '{name}.{attr}' is driven by a connection")]
    ConnectedAttribute { name: String, attr: String },

    #[error("attribute '{name}.{attr}' is read-only")]
    ReadOnlyAttribute { name: String, attr: String },

    #[error("value {value} is not valid for '{name}.{attr}'")]
    InvalidValue {
        name: String,
        attr: String,
        value: f64,
    },

    #[error("connecting into '{name}.{attr}' would create a cycle")]
    ConnectionCycle { name: String, attr: String },

    #[error("attribute '{name}.{attr}' already exists")]
    DuplicateAttribute { name: String, attr: String },

    #[error("parenting '{node}' under '{parent}' would create a cycle")]
    Cycle { node: String, parent: String },

    #[error("'{end}' is not below '{start}' in the joint hierarchy")]
    NotAChain { start: String, end: String },

    #[error("curve '{curve}' has {count} control vertices, range {start}..={end} is out of bounds")]
    InvalidCvRange {
        curve: String,
        start: usize,
        end: usize,
        count: usize,
    },

    #[error("a constraint needs at least one driver")]
    NoDrivers,
}

/// Abstract scene graph the rig builders operate on.
pub trait SceneAdapter {
    // ---------------------------------------------------------------------
    // Creation and deletion
    // ---------------------------------------------------------------------

    /// Creates an empty transform at the world origin.
    fn create_group(&mut self, name: &str) -> SceneResult<NodeId>;

    /// Creates a marker locator at a world position.
    fn create_locator(&mut self, name: &str, position: DVec3) -> SceneResult<NodeId>;

    /// Creates an unparented joint at a world position.
    fn create_joint(&mut self, name: &str, position: DVec3) -> SceneResult<NodeId>;

    /// Creates an unparented controller shape at the world origin.
    fn create_controller(&mut self, name: &str, shape: &ControllerShape) -> SceneResult<NodeId>;

    /// Creates a complement utility node (`outputX = 1 - inputX`).
    fn create_complement(&mut self, name: &str) -> SceneResult<NodeId>;

    /// Duplicates a joint without its children or constraints.
    ///
    /// The copy keeps the source's parent and local orientation.
    fn duplicate_joint(&mut self, joint: NodeId, name: &str) -> SceneResult<NodeId>;

    /// Deletes a node and everything below it.
    fn delete(&mut self, node: NodeId) -> SceneResult<()>;

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    fn exists(&self, node: NodeId) -> bool;

    fn name(&self, node: NodeId) -> SceneResult<String>;

    fn kind(&self, node: NodeId) -> SceneResult<NodeKind>;

    fn parent(&self, node: NodeId) -> SceneResult<Option<NodeId>>;

    /// Direct children in creation order, constraint nodes included.
    fn children(&self, node: NodeId) -> SceneResult<Vec<NodeId>>;

    /// Direct children that are joints.
    fn child_joints(&self, node: NodeId) -> SceneResult<Vec<NodeId>> {
        let mut joints = Vec::new();
        for child in self.children(node)? {
            if self.kind(child)? == NodeKind::Joint {
                joints.push(child);
            }
        }
        Ok(joints)
    }

    // ---------------------------------------------------------------------
    // Hierarchy and transforms
    // ---------------------------------------------------------------------

    /// Re-parents a node, keeping its world transform. `None` means world.
    fn set_parent(&mut self, node: NodeId, parent: Option<NodeId>) -> SceneResult<()>;

    fn world_position(&self, node: NodeId) -> SceneResult<DVec3>;

    fn world_rotation(&self, node: NodeId) -> SceneResult<DQuat>;

    fn set_world_position(&mut self, node: NodeId, position: DVec3) -> SceneResult<()>;

    fn set_world_rotation(&mut self, node: NodeId, rotation: DQuat) -> SceneResult<()>;

    /// Bakes the current transform channels into the node's rest transform,
    /// resetting translate/rotate to zero and scale to one.
    fn freeze_transforms(&mut self, node: NodeId) -> SceneResult<()>;

    /// Discards construction history on a node.
    fn delete_history(&mut self, node: NodeId) -> SceneResult<()>;

    /// Re-orients a joint so X points at its first child joint and Y is up,
    /// zeroing scale orientation. Children keep their world transforms.
    fn orient_joint(&mut self, joint: NodeId) -> SceneResult<()>;

    // ---------------------------------------------------------------------
    // Constraints and solvers
    // ---------------------------------------------------------------------

    /// Constrains `driven` to `drivers`. Without `maintain_offset` the driven
    /// node snaps to the drivers immediately.
    fn create_constraint(
        &mut self,
        kind: ConstraintKind,
        drivers: &[NodeId],
        driven: NodeId,
        maintain_offset: bool,
    ) -> SceneResult<NodeId>;

    /// Constraint nodes driving `node`.
    fn constraints_on(&self, node: NodeId) -> SceneResult<Vec<NodeId>>;

    /// Deletes every constraint driving `node`.
    fn delete_constraints(&mut self, node: NodeId) -> SceneResult<()> {
        for constraint in self.constraints_on(node)? {
            self.delete(constraint)?;
        }
        Ok(())
    }

    /// Creates an IK handle spanning `start..=end`.
    fn create_ik_handle(
        &mut self,
        name: &str,
        start: NodeId,
        end: NodeId,
        solver: IkSolver,
    ) -> SceneResult<IkHandleNodes>;

    /// Number of control vertices on a curve.
    fn curve_cv_count(&self, curve: NodeId) -> SceneResult<usize>;

    /// Creates a cluster over a range of a curve's control vertices.
    fn create_cluster(
        &mut self,
        name: &str,
        curve: NodeId,
        cvs: RangeInclusive<usize>,
    ) -> SceneResult<NodeId>;

    // ---------------------------------------------------------------------
    // Attributes
    // ---------------------------------------------------------------------

    /// Adds a keyable enum attribute, initialised to its first field.
    ///
    /// Any value between the first and last field index is accepted, so an
    /// enum can be keyed mid-way between two fields.
    fn add_enum_attr(&mut self, node: NodeId, name: &str, fields: &[&str]) -> SceneResult<Plug>;

    /// Reads an attribute, following incoming connections.
    fn get_attr(&self, plug: &Plug) -> SceneResult<f64>;

    fn set_attr(&mut self, plug: &Plug, value: f64) -> SceneResult<()>;

    /// Connects `source` into `destination`, replacing any existing input.
    fn connect_attr(&mut self, source: &Plug, destination: &Plug) -> SceneResult<()>;

    /// Source plug connected into `destination`, if any.
    fn connection_into(&self, destination: &Plug) -> SceneResult<Option<Plug>>;

    fn lock_and_hide(&mut self, node: NodeId, attrs: &[Attr]) -> SceneResult<()>;

    fn is_locked(&self, plug: &Plug) -> SceneResult<bool>;

    fn set_display(&mut self, node: NodeId, display: DisplayOverride) -> SceneResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_names() {
        assert_eq!(Attr::Rotate(Axis::Y).to_string(), "rotateY");
        assert_eq!(Attr::Translate(Axis::X).to_string(), "translateX");
        assert_eq!(Attr::Weight(1).to_string(), "w1");
        assert_eq!(Attr::Input.to_string(), "inputX");
        assert_eq!(Attr::Custom("FKIK_Switch".into()).to_string(), "FKIK_Switch");
    }

    #[test]
    fn test_channel_lists() {
        assert_eq!(Attr::transform_channels().len(), 9);
        let rs = Attr::rotate_scale_channels();
        assert_eq!(rs.len(), 6);
        assert!(!rs.contains(&Attr::Translate(Axis::X)));
    }

    #[test]
    fn test_node_id_serde() {
        let json = serde_json::to_string(&NodeId(7)).unwrap();
        assert_eq!(json, "7");
    }
}
