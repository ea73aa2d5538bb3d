//! Rig configuration document.
//!
//! A [`RigConfig`] selects the body layout, the spine flavour, the rig mode
//! of each limb pair and the controller sizes. It is usually read from JSON:
//!
//! ```json
//! {
//!   "name": "hero",
//!   "body": "full",
//!   "spine": "spline",
//!   "arms": "fk_ik",
//!   "legs": "fk_ik"
//! }
//! ```
//!
//! Every field is optional; missing fields take the defaults of
//! [`RigConfig::default`].

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::markers::MarkerSet;
use crate::topology::{BodyKind, SpineKind, Topology};

/// Pattern for rig names: a scene node name without separators.
pub const RIG_NAME_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]{0,63}$";

static RIG_NAME_REGEX: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn rig_name_regex() -> Result<&'static Regex, ConfigError> {
    RIG_NAME_REGEX
        .get_or_init(|| Regex::new(RIG_NAME_PATTERN))
        .as_ref()
        .map_err(|e| ConfigError::Pattern(e.to_string()))
}

/// Errors raised while reading or validating a [`RigConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("rig name '{0}' must match {pattern}", pattern = RIG_NAME_PATTERN)]
    InvalidName(String),

    #[error("radius '{field}' must be a positive finite number, got {value}")]
    InvalidRadius { field: String, value: f64 },

    #[error("marker '{0}' appears more than once")]
    DuplicateMarker(String),

    #[error("marker '{0}' has a non-finite position")]
    NonFiniteMarker(String),

    #[error("marker set is missing {}", .0.join(", "))]
    MissingMarkers(Vec<String>),

    #[error("invalid name pattern: {0}")]
    Pattern(String),

    #[error("malformed rig configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// How a limb pair is rigged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimbMode {
    /// One FK controller per joint.
    #[default]
    Fk,
    /// Start controller, rotate-plane handle, end controller and pole vector.
    Ik,
    /// FK and IK duplicate chains blended by a switch control.
    FkIk,
}

impl LimbMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimbMode::Fk => "fk",
            LimbMode::Ik => "ik",
            LimbMode::FkIk => "fk_ik",
        }
    }
}

impl std::fmt::Display for LimbMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controller radii for one limb pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimbRadii {
    /// FK controllers, also used for the FK/IK accessories.
    pub fk: f64,
    /// IK start controller.
    pub ik_start: f64,
    /// IK end controller.
    pub ik_end: f64,
    /// Pole vector controller.
    pub pole: f64,
}

impl LimbRadii {
    pub const ARM: LimbRadii = LimbRadii {
        fk: 8.0,
        ik_start: 12.0,
        ik_end: 8.0,
        pole: 8.0,
    };

    pub const LEG: LimbRadii = LimbRadii {
        fk: 13.0,
        ik_start: 15.0,
        ik_end: 8.0,
        pole: 15.0,
    };

    fn fields(&self) -> [(&'static str, f64); 4] {
        [
            ("fk", self.fk),
            ("ik_start", self.ik_start),
            ("ik_end", self.ik_end),
            ("pole", self.pole),
        ]
    }
}

/// Controller radii for the whole rig.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RadiusSettings {
    pub root: f64,
    pub spine: f64,
    pub head: f64,
    pub arm: LimbRadii,
    pub leg: LimbRadii,
}

impl Default for RadiusSettings {
    fn default() -> Self {
        Self {
            root: 20.0,
            spine: 20.0,
            head: 10.0,
            arm: LimbRadii::ARM,
            leg: LimbRadii::LEG,
        }
    }
}

impl RadiusSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        let mut fields = vec![
            ("root".to_string(), self.root),
            ("spine".to_string(), self.spine),
            ("head".to_string(), self.head),
        ];
        for (limb, radii) in [("arm", &self.arm), ("leg", &self.leg)] {
            fields.extend(
                radii
                    .fields()
                    .into_iter()
                    .map(|(name, value)| (format!("{}.{}", limb, name), value)),
            );
        }
        for (field, value) in fields {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidRadius { field, value });
            }
        }
        Ok(())
    }
}

/// Options for building a rig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RigConfig {
    /// Name of the top-level rig group.
    pub name: String,
    pub body: BodyKind,
    pub spine: SpineKind,
    pub arms: LimbMode,
    pub legs: LimbMode,
    /// Parent the rig under the root controller so it scales as one.
    pub uniform_scale: bool,
    pub radii: RadiusSettings,
    /// Marker positions; the default layout is used when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markers: Option<MarkerSet>,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            name: "rig".to_string(),
            body: BodyKind::default(),
            spine: SpineKind::default(),
            arms: LimbMode::default(),
            legs: LimbMode::default(),
            uniform_scale: true,
            radii: RadiusSettings::default(),
            markers: None,
        }
    }
}

impl RigConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_body(mut self, body: BodyKind) -> Self {
        self.body = body;
        self
    }

    pub fn with_spine(mut self, spine: SpineKind) -> Self {
        self.spine = spine;
        self
    }

    pub fn with_arms(mut self, mode: LimbMode) -> Self {
        self.arms = mode;
        self
    }

    pub fn with_legs(mut self, mode: LimbMode) -> Self {
        self.legs = mode;
        self
    }

    pub fn with_uniform_scale(mut self, enabled: bool) -> Self {
        self.uniform_scale = enabled;
        self
    }

    pub fn with_radii(mut self, radii: RadiusSettings) -> Self {
        self.radii = radii;
        self
    }

    pub fn with_markers(mut self, markers: MarkerSet) -> Self {
        self.markers = Some(markers);
        self
    }

    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RigConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Topology the configuration selects before any mirroring.
    pub fn topology(&self) -> Topology {
        Topology::character(self.spine, self.body.sides())
    }

    /// Checks names, radii and, if present, the marker set.
    ///
    /// A half-body marker set only needs the left side; the right side is
    /// produced by mirroring.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !rig_name_regex()?.is_match(&self.name) {
            return Err(ConfigError::InvalidName(self.name.clone()));
        }
        self.radii.validate()?;

        if let Some(markers) = &self.markers {
            let mut seen = std::collections::HashSet::new();
            for marker in markers.iter() {
                if !seen.insert(marker.name.as_str()) {
                    return Err(ConfigError::DuplicateMarker(marker.name.clone()));
                }
                if !marker.position.is_finite() {
                    return Err(ConfigError::NonFiniteMarker(marker.name.clone()));
                }
            }
            let missing: Vec<String> = self
                .topology()
                .required_markers()
                .into_iter()
                .filter(|name| !markers.contains(name))
                .map(str::to_string)
                .collect();
            if !missing.is_empty() {
                return Err(ConfigError::MissingMarkers(missing));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{default_markers, Marker};
    use glam::DVec3;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = RigConfig::from_json("{}").unwrap();
        assert_eq!(config, RigConfig::default());
        assert_eq!(config.name, "rig");
        assert_eq!(config.arms, LimbMode::Fk);
        assert!(config.uniform_scale);
        assert_eq!(config.radii.leg.pole, 15.0);
    }

    #[test]
    fn test_parse_full_document() {
        let json = r#"{
            "name": "hero_rig",
            "body": "half",
            "spine": "spline",
            "arms": "fk_ik",
            "legs": "ik",
            "uniform_scale": false,
            "radii": { "head": 12.5, "arm": { "fk": 6, "ik_start": 10, "ik_end": 6, "pole": 6 } }
        }"#;
        let config = RigConfig::from_json(json).unwrap();
        assert_eq!(config.body, BodyKind::Half);
        assert_eq!(config.spine, SpineKind::Spline);
        assert_eq!(config.arms, LimbMode::FkIk);
        assert_eq!(config.legs, LimbMode::Ik);
        assert_eq!(config.radii.head, 12.5);
        assert_eq!(config.radii.arm.ik_start, 10.0);
        assert_eq!(config.radii.leg, LimbRadii::LEG);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = RigConfig::from_json(r#"{ "stretchy": true }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
        let err = RigConfig::from_json(r#"{ "arms": "spline" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_name_must_be_a_node_name() {
        for name in ["", "1rig", "my rig", "rig|grp"] {
            let err = RigConfig::new().with_name(name).validate().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidName(_)), "{name}");
        }
        assert!(RigConfig::new().with_name("_hero2").validate().is_ok());
    }

    #[test]
    fn test_radii_must_be_positive() {
        let mut radii = RadiusSettings::default();
        radii.leg.pole = 0.0;
        let err = RigConfig::new().with_radii(radii).validate().unwrap_err();
        match err {
            ConfigError::InvalidRadius { field, .. } => assert_eq!(field, "leg.pole"),
            other => panic!("unexpected error: {other}"),
        }
        radii.leg.pole = f64::NAN;
        assert!(RigConfig::new().with_radii(radii).validate().is_err());
    }

    #[test]
    fn test_marker_validation() {
        let full = MarkerSet::from_markers(default_markers(BodyKind::Full, SpineKind::Plain));
        assert!(RigConfig::new().with_markers(full.clone()).validate().is_ok());

        let mut partial = full.clone();
        partial.remove("knee_r");
        partial.remove("root");
        let err = RigConfig::new().with_markers(partial).validate().unwrap_err();
        match err {
            ConfigError::MissingMarkers(names) => {
                assert_eq!(names, vec!["root".to_string(), "knee_r".to_string()])
            }
            other => panic!("unexpected error: {other}"),
        }

        let half = MarkerSet::from_markers(default_markers(BodyKind::Half, SpineKind::Plain));
        assert!(RigConfig::new()
            .with_body(BodyKind::Half)
            .with_markers(half)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_duplicate_markers_in_json() {
        let markers = serde_json::to_value(vec![
            Marker::new("root", DVec3::ZERO),
            Marker::new("root", DVec3::Y),
        ])
        .unwrap();
        let json = serde_json::json!({ "markers": markers }).to_string();
        let err = RigConfig::from_json(&json).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateMarker(name) if name == "root"));
    }

    #[test]
    fn test_json_round_trip_keeps_settings() {
        let config = RigConfig::new()
            .with_name("hero")
            .with_legs(LimbMode::FkIk)
            .with_uniform_scale(false);
        let parsed = RigConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
