//! Marker sets and the marker board.
//!
//! A [`MarkerSet`] is plain data. A [`MarkerBoard`] owns a set and, once
//! placed, one locator per marker under a marker group in the scene. The
//! skeleton builder consumes markers from the board as it creates joints.

use std::collections::BTreeMap;

use glam::DVec3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RigError, RigResult};
use crate::scene::{NodeId, SceneAdapter};
use crate::topology::{mirror_marker, Marker, Side};

/// Name of the scene group holding marker locators.
pub const MARKER_GROUP: &str = "MarkersGrp";

/// Ordered collection of uniquely named markers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerSet {
    markers: Vec<Marker>,
}

impl MarkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from markers; a later duplicate name replaces the earlier
    /// position in place.
    pub fn from_markers(markers: impl IntoIterator<Item = Marker>) -> Self {
        let mut set = Self::new();
        for marker in markers {
            set.set(marker.name, marker.position);
        }
        set
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.markers.iter().map(|m| m.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Marker> {
        self.markers.iter().find(|m| m.name == name)
    }

    /// Position of a marker, or `MissingMarker`.
    pub fn position(&self, name: &str) -> RigResult<DVec3> {
        self.get(name)
            .map(|m| m.position)
            .ok_or_else(|| RigError::missing_marker(name))
    }

    /// Inserts a marker or moves an existing one.
    pub fn set(&mut self, name: impl Into<String>, position: DVec3) {
        let name = name.into();
        match self.markers.iter_mut().find(|m| m.name == name) {
            Some(existing) => existing.position = position,
            None => self.markers.push(Marker { name, position }),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Marker> {
        let index = self.markers.iter().position(|m| m.name == name)?;
        Some(self.markers.remove(index))
    }

    /// Copies every left marker to the right side with X negated.
    ///
    /// Existing right markers are overwritten.
    pub fn mirror_left_to_right(&mut self) {
        let mirrored: Vec<Marker> = self
            .markers
            .iter()
            .filter(|m| Side::of(&m.name) == Some(Side::Left))
            .map(mirror_marker)
            .collect();
        for marker in mirrored {
            self.set(marker.name, marker.position);
        }
    }

    /// First name in `required` that is not in the set.
    pub fn first_missing<'a>(&self, required: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
        required.into_iter().find(|name| !self.contains(name))
    }
}

impl FromIterator<Marker> for MarkerSet {
    fn from_iter<T: IntoIterator<Item = Marker>>(iter: T) -> Self {
        Self::from_markers(iter)
    }
}

/// Markers during rig setup, optionally mirrored as scene locators.
#[derive(Debug, Clone, Default)]
pub struct MarkerBoard {
    set: MarkerSet,
    group: Option<NodeId>,
    locators: BTreeMap<String, NodeId>,
    consumed: Vec<String>,
}

impl MarkerBoard {
    /// A board that is not yet placed in a scene.
    pub fn new(set: MarkerSet) -> Self {
        Self {
            set,
            ..Self::default()
        }
    }

    pub fn set(&self) -> &MarkerSet {
        &self.set
    }

    /// Whether locators exist in the scene.
    pub fn is_placed(&self) -> bool {
        self.group.is_some()
    }

    pub fn group(&self) -> Option<NodeId> {
        self.group
    }

    pub fn locator(&self, name: &str) -> Option<NodeId> {
        self.locators.get(name).copied()
    }

    /// Names taken by [`MarkerBoard::take`], in consumption order.
    pub fn consumed(&self) -> &[String] {
        &self.consumed
    }

    /// Creates the marker group and one locator per marker.
    pub fn place<S: SceneAdapter>(&mut self, scene: &mut S) -> RigResult<NodeId> {
        if let Some(group) = self.group {
            return Ok(group);
        }
        let group = scene.create_group(MARKER_GROUP)?;
        for marker in self.set.iter() {
            let locator = scene.create_locator(&marker.name, marker.position)?;
            scene.set_parent(locator, Some(group))?;
            self.locators.insert(marker.name.clone(), locator);
        }
        debug!(count = self.locators.len(), "placed marker locators");
        self.group = Some(group);
        Ok(group)
    }

    /// Reads locator positions back into the set.
    pub fn refresh<S: SceneAdapter>(&mut self, scene: &S) -> RigResult<()> {
        for (name, locator) in &self.locators {
            let position = scene.world_position(*locator)?;
            self.set.set(name.clone(), position);
        }
        Ok(())
    }

    /// Moves a marker and its locator.
    pub fn move_marker<S: SceneAdapter>(
        &mut self,
        scene: &mut S,
        name: &str,
        position: DVec3,
    ) -> RigResult<()> {
        if !self.set.contains(name) {
            return Err(RigError::missing_marker(name));
        }
        if let Some(locator) = self.locators.get(name) {
            scene.set_world_position(*locator, position)?;
        }
        self.set.set(name, position);
        Ok(())
    }

    /// Mirrors every left marker onto the right side, creating or moving the
    /// right locators when the board is placed.
    pub fn mirror<S: SceneAdapter>(&mut self, scene: &mut S) -> RigResult<usize> {
        self.refresh(scene)?;
        let left: Vec<Marker> = self
            .set
            .iter()
            .filter(|m| Side::of(&m.name) == Some(Side::Left))
            .cloned()
            .collect();

        for marker in &left {
            let mirrored = mirror_marker(marker);
            if let Some(group) = self.group {
                match self.locators.get(&mirrored.name) {
                    Some(locator) => scene.set_world_position(*locator, mirrored.position)?,
                    None => {
                        let locator = scene.create_locator(&mirrored.name, mirrored.position)?;
                        scene.set_parent(locator, Some(group))?;
                        self.locators.insert(mirrored.name.clone(), locator);
                    }
                }
            }
            self.set.set(mirrored.name, mirrored.position);
        }
        debug!(count = left.len(), "mirrored left markers");
        Ok(left.len())
    }

    /// Fails with `MissingMarker` on the first absent name.
    pub fn require<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> RigResult<()> {
        match self.set.first_missing(names) {
            Some(name) => Err(RigError::missing_marker(name)),
            None => Ok(()),
        }
    }

    /// Removes a marker, deleting its locator, and returns its data.
    pub fn take<S: SceneAdapter>(&mut self, scene: &mut S, name: &str) -> RigResult<Marker> {
        if let Some(locator) = self.locators.get(name) {
            let position = scene.world_position(*locator)?;
            self.set.set(name, position);
        }
        let marker = self
            .set
            .remove(name)
            .ok_or_else(|| RigError::missing_marker(name))?;
        if let Some(locator) = self.locators.remove(name) {
            scene.delete(locator)?;
        }
        self.consumed.push(marker.name.clone());
        Ok(marker)
    }

    /// Deletes the marker group once every locator has been consumed.
    ///
    /// Returns whether the group was deleted.
    pub fn finish<S: SceneAdapter>(&mut self, scene: &mut S) -> RigResult<bool> {
        let Some(group) = self.group else {
            return Ok(false);
        };
        if !self.locators.is_empty() {
            return Ok(false);
        }
        scene.delete(group)?;
        self.group = None;
        Ok(true)
    }

    /// Deletes the marker group and every remaining locator.
    pub fn discard<S: SceneAdapter>(&mut self, scene: &mut S) -> RigResult<()> {
        if let Some(group) = self.group.take() {
            scene.delete(group)?;
        }
        self.locators.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::MemoryScene;
    use crate::topology::{default_left_markers, default_markers, BodyKind, SpineKind};
    use pretty_assertions::assert_eq;

    fn board() -> MarkerBoard {
        MarkerBoard::new(MarkerSet::from_markers(default_markers(
            BodyKind::Half,
            SpineKind::Plain,
        )))
    }

    #[test]
    fn test_set_replaces_duplicates() {
        let set = MarkerSet::from_markers([
            Marker::new("root", DVec3::ZERO),
            Marker::new("root", DVec3::ONE),
        ]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.position("root").unwrap(), DVec3::ONE);
        assert!(matches!(
            set.position("head"),
            Err(RigError::MissingMarker { .. })
        ));
    }

    #[test]
    fn test_mirror_left_to_right() {
        let mut set = MarkerSet::from_markers(default_left_markers());
        set.mirror_left_to_right();
        assert_eq!(set.len(), 36);
        assert_eq!(
            set.position("hand_r").unwrap(),
            DVec3::new(-58.5, 110.0, 5.0)
        );
    }

    #[test]
    fn test_place_and_refresh() {
        let mut scene = MemoryScene::new();
        let mut board = board();
        let group = board.place(&mut scene).unwrap();
        assert_eq!(scene.name(group).unwrap(), MARKER_GROUP);
        assert_eq!(scene.children(group).unwrap().len(), board.set().len());

        let knee = board.locator("knee_l").unwrap();
        scene.set_world_position(knee, DVec3::new(15.0, 50.0, 2.0)).unwrap();
        board.refresh(&scene).unwrap();
        assert_eq!(
            board.set().position("knee_l").unwrap(),
            DVec3::new(15.0, 50.0, 2.0)
        );
    }

    #[test]
    fn test_mirror_creates_right_locators() {
        let mut scene = MemoryScene::new();
        let mut board = board();
        board.place(&mut scene).unwrap();
        board
            .move_marker(&mut scene, "hand_l", DVec3::new(60.0, 100.0, 0.0))
            .unwrap();

        let mirrored = board.mirror(&mut scene).unwrap();
        assert_eq!(mirrored, 18);
        let hand_r = scene.find("hand_r").unwrap();
        assert!(scene
            .world_position(hand_r)
            .unwrap()
            .abs_diff_eq(DVec3::new(-60.0, 100.0, 0.0), 1e-9));
    }

    #[test]
    fn test_take_consumes_and_finish_deletes_group() {
        let mut scene = MemoryScene::new();
        let mut board = MarkerBoard::new(MarkerSet::from_markers([
            Marker::new("root", DVec3::ZERO),
            Marker::new("pelvis", DVec3::Y),
        ]));
        let group = board.place(&mut scene).unwrap();

        let root = board.take(&mut scene, "root").unwrap();
        assert_eq!(root.position, DVec3::ZERO);
        assert!(scene.find("root").is_none());
        assert!(!board.finish(&mut scene).unwrap());

        board.take(&mut scene, "pelvis").unwrap();
        assert!(board.finish(&mut scene).unwrap());
        assert!(!scene.exists(group));
        assert_eq!(board.consumed(), ["root", "pelvis"]);
        assert!(matches!(
            board.take(&mut scene, "root"),
            Err(RigError::MissingMarker { .. })
        ));
    }
}
