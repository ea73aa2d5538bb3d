//! Topology catalog: default marker layouts and the chains a character is
//! built from.
//!
//! Positions are in centimetres with +Y up and the character facing +Z.

use std::fmt;

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// A named marker position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Marker {
    pub name: String,
    pub position: DVec3,
}

impl Marker {
    pub fn new(name: impl Into<String>, position: DVec3) -> Self {
        Self {
            name: name.into(),
            position,
        }
    }
}

/// Body side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Both sides, left first.
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    /// Name suffix, `_l` or `_r`.
    pub fn suffix(&self) -> &'static str {
        match self {
            Side::Left => "_l",
            Side::Right => "_r",
        }
    }

    /// Appends this side's suffix to a base name.
    pub fn name(&self, base: &str) -> String {
        format!("{}{}", base, self.suffix())
    }

    /// Side encoded in a marker or joint name.
    pub fn of(name: &str) -> Option<Side> {
        if name.ends_with("_l") {
            Some(Side::Left)
        } else if name.ends_with("_r") {
            Some(Side::Right)
        } else {
            None
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// Spine flavour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpineKind {
    /// Three spine joints driven by FK controllers.
    #[default]
    Plain,
    /// Nine spine joints driven by a spline IK curve.
    Spline,
}

/// Which sides get markers when a rig is started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    /// Left side only; the right side comes from mirroring.
    Half,
    #[default]
    Full,
}

impl BodyKind {
    /// Sides that have markers right after placement.
    pub fn sides(&self) -> &'static [Side] {
        match self {
            BodyKind::Half => &[Side::Left],
            BodyKind::Full => &Side::BOTH,
        }
    }
}

// ============================================================================
// Default marker layouts
// ============================================================================

const BASE_MARKERS: [(&str, [f64; 3]); 7] = [
    ("root", [0.0, 0.0, 0.0]),
    ("pelvis", [0.0, 105.0, 0.0]),
    ("spine1", [0.0, 125.0, 5.0]),
    ("spine2", [0.0, 138.0, 2.5]),
    ("spine3", [0.0, 150.0, -4.5]),
    ("neck", [0.0, 158.5, -3.0]),
    ("head", [0.0, 181.5, 1.0]),
];

const SPLINE_BASE_MARKERS: [(&str, [f64; 3]); 13] = [
    ("root", [0.0, 0.0, 0.0]),
    ("pelvis", [0.0, 105.0, 0.0]),
    ("spine1", [0.0, 111.0, 1.5]),
    ("spine2", [0.0, 117.0, 3.0]),
    ("spine3", [0.0, 125.0, 5.0]),
    ("spine4", [0.0, 129.0, 4.0]),
    ("spine5", [0.0, 133.0, 3.0]),
    ("spine6", [0.0, 138.0, 2.5]),
    ("spine7", [0.0, 142.0, 0.5]),
    ("spine8", [0.0, 146.0, -2.0]),
    ("spine9", [0.0, 150.0, -4.5]),
    ("neck", [0.0, 158.5, -3.0]),
    ("head", [0.0, 181.5, 1.0]),
];

const LEFT_MARKERS: [(&str, [f64; 3]); 18] = [
    ("clavicle_l", [14.0, 149.5, -4.5]),
    ("upperArm_l", [23.5, 145.5, -4.5]),
    ("lowerArm_l", [36.0, 129.0, -5.5]),
    ("hand_l", [58.5, 110.0, 5.0]),
    ("thumb1_l", [57.0, 106.0, 11.5]),
    ("thumb2_l", [57.0, 104.5, 15.0]),
    ("thumb3_l", [57.5, 102.0, 19.0]),
    ("index1_l", [64.0, 103.0, 12.5]),
    ("index2_l", [65.0, 98.0, 15.0]),
    ("index3_l", [64.5, 94.5, 17.0]),
    ("middle1_l", [65.0, 102.0, 9.0]),
    ("middle2_l", [66.0, 96.5, 11.0]),
    ("middle3_l", [62.0, 92.0, 12.5]),
    ("thigh_l", [9.0, 95.0, 1.0]),
    ("knee_l", [14.0, 55.0, 0.0]),
    ("foot_l", [15.5, 15.5, -6.0]),
    ("ball_l", [17.0, 3.5, 5.0]),
    ("toe_l", [17.0, 3.5, 15.5]),
];

/// Base names of the arm chain, shoulder to wrist.
pub const ARM_JOINTS: [&str; 4] = ["clavicle", "upperArm", "lowerArm", "hand"];
/// Base names of the leg chain, hip to toe tip.
pub const LEG_JOINTS: [&str; 5] = ["thigh", "knee", "foot", "ball", "toe"];
/// Digits, each a three-joint chain `<digit>1..<digit>3`.
pub const DIGITS: [&str; 3] = ["thumb", "index", "middle"];

/// Offset from the end of the spine chain to the joint limbs attach to.
pub const TORSO_ATTACHMENT: ChainIndex = ChainIndex::FromEnd(3);
/// Offset from the end of the spine chain to the neck joint.
pub const NECK_ATTACHMENT: ChainIndex = ChainIndex::FromEnd(2);
/// Spine joint (zero based) carrying the middle control of a spline spine.
pub const SPLINE_MIDDLE_INDEX: usize = 3;

fn to_markers(table: &[(&str, [f64; 3])]) -> Vec<Marker> {
    table
        .iter()
        .map(|(name, p)| Marker::new(*name, DVec3::from_array(*p)))
        .collect()
}

/// Root, pelvis, three spine joints, neck and head.
pub fn default_base_markers() -> Vec<Marker> {
    to_markers(&BASE_MARKERS)
}

/// Root, pelvis, nine spine joints, neck and head.
pub fn default_spline_base_markers() -> Vec<Marker> {
    to_markers(&SPLINE_BASE_MARKERS)
}

/// Left arm, digits and leg.
pub fn default_left_markers() -> Vec<Marker> {
    to_markers(&LEFT_MARKERS)
}

/// Right arm, digits and leg, mirrored from the left layout.
pub fn default_right_markers() -> Vec<Marker> {
    mirror_markers(&default_left_markers())
}

/// Every default marker for a body and spine selection.
pub fn default_markers(body: BodyKind, spine: SpineKind) -> Vec<Marker> {
    let mut markers = match spine {
        SpineKind::Plain => default_base_markers(),
        SpineKind::Spline => default_spline_base_markers(),
    };
    markers.extend(default_left_markers());
    if body == BodyKind::Full {
        markers.extend(default_right_markers());
    }
    markers
}

/// Reflects a marker across the YZ plane.
///
/// X is negated and a trailing `_l` becomes `_r`. Positions are restored by
/// a second application, names are not.
pub fn mirror_marker(marker: &Marker) -> Marker {
    let name = match marker.name.strip_suffix("_l") {
        Some(base) => Side::Right.name(base),
        None => marker.name.clone(),
    };
    Marker {
        name,
        position: DVec3::new(-marker.position.x, marker.position.y, marker.position.z),
    }
}

pub fn mirror_markers(markers: &[Marker]) -> Vec<Marker> {
    markers.iter().map(mirror_marker).collect()
}

// ============================================================================
// Chains
// ============================================================================

/// A chain of the character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "region", content = "side")]
pub enum Region {
    Root,
    Pelvis,
    /// Spine joints followed by neck and head.
    Spine,
    Arm(Side),
    Thumb(Side),
    Index(Side),
    Middle(Side),
    /// Thigh to toe tip.
    Leg(Side),
}

impl Region {
    pub fn side(&self) -> Option<Side> {
        match self {
            Region::Root | Region::Pelvis | Region::Spine => None,
            Region::Arm(side)
            | Region::Thumb(side)
            | Region::Index(side)
            | Region::Middle(side)
            | Region::Leg(side) => Some(*side),
        }
    }
}

/// Position of a joint inside a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainIndex {
    FromStart(usize),
    /// `FromEnd(1)` is the last joint.
    FromEnd(usize),
}

impl ChainIndex {
    pub const FIRST: ChainIndex = ChainIndex::FromStart(0);
    pub const LAST: ChainIndex = ChainIndex::FromEnd(1);

    /// Resolves against a chain length.
    pub fn resolve(&self, len: usize) -> Option<usize> {
        match *self {
            ChainIndex::FromStart(index) if index < len => Some(index),
            ChainIndex::FromEnd(back) if back >= 1 && back <= len => Some(len - back),
            _ => None,
        }
    }
}

/// Where the first joint of a chain is parented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attachment {
    World,
    Chain { region: Region, index: ChainIndex },
}

/// One chain of a topology: ordered marker names and their attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyEntry {
    pub region: Region,
    pub markers: Vec<String>,
    pub attachment: Attachment,
}

/// Chains making up a character, in build order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub spine: SpineKind,
    pub sides: Vec<Side>,
    pub entries: Vec<TopologyEntry>,
}

impl Topology {
    /// Humanoid topology for a spine flavour and set of sides.
    pub fn character(spine: SpineKind, sides: &[Side]) -> Self {
        let base = match spine {
            SpineKind::Plain => &BASE_MARKERS[..],
            SpineKind::Spline => &SPLINE_BASE_MARKERS[..],
        };
        let names = |table: &[(&str, [f64; 3])]| -> Vec<String> {
            table.iter().map(|(name, _)| name.to_string()).collect()
        };

        let mut entries = vec![
            TopologyEntry {
                region: Region::Root,
                markers: vec![base[0].0.to_string()],
                attachment: Attachment::World,
            },
            TopologyEntry {
                region: Region::Pelvis,
                markers: vec![base[1].0.to_string()],
                attachment: Attachment::Chain {
                    region: Region::Root,
                    index: ChainIndex::LAST,
                },
            },
            TopologyEntry {
                region: Region::Spine,
                markers: names(&base[2..]),
                attachment: Attachment::Chain {
                    region: Region::Pelvis,
                    index: ChainIndex::LAST,
                },
            },
        ];

        let mut ordered: Vec<Side> = sides.to_vec();
        ordered.sort();
        ordered.dedup();
        for &side in &ordered {
            entries.push(TopologyEntry {
                region: Region::Arm(side),
                markers: ARM_JOINTS.iter().map(|j| side.name(j)).collect(),
                attachment: Attachment::Chain {
                    region: Region::Spine,
                    index: TORSO_ATTACHMENT,
                },
            });
            for (digit, region) in DIGITS
                .iter()
                .zip([Region::Thumb(side), Region::Index(side), Region::Middle(side)])
            {
                entries.push(TopologyEntry {
                    region,
                    markers: (1..=3)
                        .map(|n| side.name(&format!("{}{}", digit, n)))
                        .collect(),
                    attachment: Attachment::Chain {
                        region: Region::Arm(side),
                        index: ChainIndex::LAST,
                    },
                });
            }
            entries.push(TopologyEntry {
                region: Region::Leg(side),
                markers: LEG_JOINTS.iter().map(|j| side.name(j)).collect(),
                attachment: Attachment::Chain {
                    region: Region::Pelvis,
                    index: ChainIndex::LAST,
                },
            });
        }

        Self {
            spine,
            sides: ordered,
            entries,
        }
    }

    pub fn entry(&self, region: Region) -> Option<&TopologyEntry> {
        self.entries.iter().find(|e| e.region == region)
    }

    /// Every marker name the topology consumes, in build order.
    pub fn required_markers(&self) -> Vec<&str> {
        self.entries
            .iter()
            .flat_map(|e| e.markers.iter().map(String::as_str))
            .collect()
    }

    /// Number of spine joints, neck and head excluded.
    pub fn spine_joint_count(&self) -> usize {
        self.entry(Region::Spine)
            .map(|e| e.markers.len().saturating_sub(2))
            .unwrap_or(0)
    }

    pub fn has_side(&self, side: Side) -> bool {
        self.sides.contains(&side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_layout_sizes() {
        assert_eq!(default_base_markers().len(), 7);
        assert_eq!(default_spline_base_markers().len(), 13);
        assert_eq!(default_left_markers().len(), 18);
        assert_eq!(
            default_markers(BodyKind::Full, SpineKind::Plain).len(),
            7 + 18 + 18
        );
        assert_eq!(
            default_markers(BodyKind::Half, SpineKind::Spline).len(),
            13 + 18
        );
    }

    #[test]
    fn test_right_markers_mirror_left() {
        let right = default_right_markers();
        assert_eq!(right[0].name, "clavicle_r");
        assert_eq!(right[0].position, DVec3::new(-14.0, 149.5, -4.5));
        assert!(right.iter().all(|m| Side::of(&m.name) == Some(Side::Right)));
    }

    #[test]
    fn test_mirror_restores_geometry_not_names() {
        let marker = Marker::new("knee_l", DVec3::new(14.0, 55.0, 0.0));
        let twice = mirror_marker(&mirror_marker(&marker));
        assert_eq!(twice.position, marker.position);
        assert_eq!(twice.name, "knee_r");

        let centre = Marker::new("pelvis", DVec3::new(0.0, 105.0, 0.0));
        assert_eq!(mirror_marker(&centre).name, "pelvis");
    }

    #[test]
    fn test_chain_index_resolve() {
        assert_eq!(ChainIndex::FIRST.resolve(5), Some(0));
        assert_eq!(ChainIndex::LAST.resolve(5), Some(4));
        assert_eq!(TORSO_ATTACHMENT.resolve(5), Some(2));
        assert_eq!(TORSO_ATTACHMENT.resolve(2), None);
        assert_eq!(ChainIndex::FromEnd(0).resolve(3), None);
        assert_eq!(ChainIndex::FromStart(3).resolve(3), None);
    }

    #[test]
    fn test_character_entries() {
        let topology = Topology::character(SpineKind::Plain, &[Side::Left]);
        let spine = topology.entry(Region::Spine).unwrap();
        assert_eq!(spine.markers, vec!["spine1", "spine2", "spine3", "neck", "head"]);
        assert_eq!(topology.spine_joint_count(), 3);
        assert!(topology.entry(Region::Arm(Side::Right)).is_none());
        assert_eq!(
            topology.entry(Region::Thumb(Side::Left)).unwrap().markers,
            vec!["thumb1_l", "thumb2_l", "thumb3_l"]
        );
        assert_eq!(topology.required_markers().len(), 7 + 18);
        assert_eq!(topology.sides, vec![Side::Left]);
    }

    #[test]
    fn test_spline_topology_torso_joint() {
        let topology = Topology::character(SpineKind::Spline, &Side::BOTH);
        let spine = topology.entry(Region::Spine).unwrap();
        let torso = TORSO_ATTACHMENT.resolve(spine.markers.len()).unwrap();
        assert_eq!(spine.markers[torso], "spine9");
        assert_eq!(spine.markers[SPLINE_MIDDLE_INDEX], "spine4");
        assert_eq!(topology.spine_joint_count(), 9);
    }
}
