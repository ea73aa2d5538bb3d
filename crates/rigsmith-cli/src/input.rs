//! Config file loading and argument parsing helpers shared by the commands.

use anyhow::{bail, Context, Result};
use rigsmith_core::{BodyKind, RigConfig, SnapDirection, SpineKind};
use std::fs;

/// Reads a rig config from `path` without validating it.
///
/// Unknown fields are still rejected by the config's serde attributes.
pub fn read_config(path: &str) -> Result<RigConfig> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read config file: {}", path))?;
    let config: RigConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config JSON: {}", path))?;
    Ok(config)
}

/// Reads and validates a config, or returns the default config when no path
/// is given.
pub fn load_config(path: Option<&str>) -> Result<RigConfig> {
    let config = match path {
        Some(path) => read_config(path)?,
        None => RigConfig::default(),
    };
    config.validate().context("Invalid rig config")?;
    Ok(config)
}

pub fn parse_body(value: &str) -> Result<BodyKind> {
    match value {
        "full" => Ok(BodyKind::Full),
        "half" => Ok(BodyKind::Half),
        other => bail!("unknown body kind: {} (expected full or half)", other),
    }
}

pub fn parse_spine(value: &str) -> Result<SpineKind> {
    match value {
        "plain" => Ok(SpineKind::Plain),
        "spline" => Ok(SpineKind::Spline),
        other => bail!("unknown spine kind: {} (expected plain or spline)", other),
    }
}

pub fn parse_snap_direction(value: &str) -> Result<SnapDirection> {
    match value {
        "fk-to-ik" => Ok(SnapDirection::FkToIk),
        "ik-to-fk" => Ok(SnapDirection::IkToFk),
        other => bail!("unknown snap direction: {} (expected fk-to-ik or ik-to-fk)", other),
    }
}
