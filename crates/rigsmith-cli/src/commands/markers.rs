//! Markers command implementation
//!
//! Prints the default marker layout for a body and spine kind as JSON.

use anyhow::{Context, Result};
use colored::Colorize;
use rigsmith_core::topology::default_markers;
use rigsmith_core::{BodyKind, MarkerSet, SpineKind};
use std::fs;
use std::process::ExitCode;

use crate::input::{parse_body, parse_spine};

/// Default markers as a set, in placement order.
pub fn default_marker_set(body: BodyKind, spine: SpineKind) -> MarkerSet {
    MarkerSet::from_markers(default_markers(body, spine))
}

/// Run the markers command
///
/// # Arguments
/// * `body` - `full` or `half`
/// * `spine` - `plain` or `spline`
/// * `output` - Output file path (default: stdout)
pub fn run(body: &str, spine: &str, output: Option<&str>) -> Result<ExitCode> {
    let body = parse_body(body)?;
    let spine = parse_spine(spine)?;
    let set = default_marker_set(body, spine);
    let json = serde_json::to_string_pretty(&set).context("Failed to serialize markers")?;

    match output {
        Some(path) => {
            fs::write(path, &json).with_context(|| format!("Failed to write to: {}", path))?;
            println!(
                "{} {} markers written to: {}",
                "SUCCESS".green().bold(),
                set.len(),
                path
            );
        }
        None => println!("{}", json),
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_body_has_no_right_markers() {
        let set = default_marker_set(BodyKind::Half, SpineKind::Plain);
        assert!(set.contains("clavicle_l"));
        assert!(!set.names().any(|name| name.ends_with("_r")));
    }

    #[test]
    fn test_spline_layout_is_larger() {
        let plain = default_marker_set(BodyKind::Full, SpineKind::Plain);
        let spline = default_marker_set(BodyKind::Full, SpineKind::Spline);
        assert!(spline.len() > plain.len());
    }

    #[test]
    fn test_writes_marker_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("markers.json");
        let code = run("full", "plain", path.to_str()).unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
        let set: MarkerSet =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(set, default_marker_set(BodyKind::Full, SpineKind::Plain));
    }
}
