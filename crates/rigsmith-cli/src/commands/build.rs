//! Build command implementation
//!
//! Runs the whole rig workflow on an in-memory scene and writes a JSON rig
//! report: the config hash, the created handles and the scene outline.

use anyhow::{Context, Result};
use colored::Colorize;
use rigsmith_core::hash::config_hash;
use rigsmith_core::scene::{OutlineEntry, SceneSummary};
use rigsmith_core::{
    Limb, LimbMode, MemoryScene, RigConfig, RigHandles, RigWorkflow, Side, SnapDirection,
    SnapOutcome, Stage,
};
use serde::Serialize;
use std::fs;
use std::process::ExitCode;

use crate::input::{load_config, parse_snap_direction};

/// Extra steps around the workflow.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Mirror left markers to the right before building (half body only).
    pub mirror: bool,
    /// Snap every FK/IK limb in this direction once the rig is done.
    pub snap: Option<SnapDirection>,
}

/// One snapped limb.
#[derive(Debug, Clone, Serialize)]
pub struct SnapRecord {
    pub limb: Limb,
    pub side: Side,
    pub direction: SnapDirection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SnapOutcome>,
}

/// Everything the build command reports.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub name: String,
    pub tool_version: String,
    pub config_hash: String,
    pub stage: Stage,
    /// Markers created by mirroring.
    pub mirrored: usize,
    pub summary: SceneSummary,
    pub handles: RigHandles,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub snaps: Vec<SnapRecord>,
    pub outline: Vec<OutlineEntry>,
}

/// Builds a rig from `config` and collects the report.
pub fn build_report(config: RigConfig, options: BuildOptions) -> Result<BuildReport> {
    let hash = config_hash(&config).context("Failed to hash config")?;
    let mut workflow =
        RigWorkflow::new(MemoryScene::new(), config).context("Failed to place markers")?;

    let mirrored = if options.mirror {
        workflow
            .mirror_markers()
            .context("Failed to mirror markers")?
    } else {
        0
    };
    workflow.build_all().context("Failed to build rig")?;

    let mut snaps = Vec::new();
    if let Some(direction) = options.snap {
        for (limb, side) in switch_limbs(workflow.rig()) {
            let outcome = workflow
                .snap(limb, side, direction)
                .with_context(|| format!("Failed to snap {} {}", side, limb))?;
            snaps.push(SnapRecord {
                limb,
                side,
                direction,
                outcome,
            });
        }
    }

    let scene = workflow.scene();
    Ok(BuildReport {
        name: workflow.config().name.clone(),
        tool_version: format!("rigsmith-cli v{}", env!("CARGO_PKG_VERSION")),
        config_hash: hash,
        stage: workflow.stage(),
        mirrored,
        summary: scene.summary(),
        handles: workflow.rig().clone(),
        snaps,
        outline: scene.outline().context("Failed to walk scene")?,
    })
}

/// Limbs that were built with an FK/IK switch.
fn switch_limbs(rig: &RigHandles) -> Vec<(Limb, Side)> {
    let arms = rig.arms.iter().map(|(side, r)| (Limb::Arm, *side, r));
    let legs = rig.legs.iter().map(|(side, r)| (Limb::Leg, *side, r));
    arms.chain(legs)
        .filter(|(_, _, r)| r.mode() == LimbMode::FkIk)
        .map(|(limb, side, _)| (limb, side))
        .collect()
}

/// Run the build command
///
/// # Arguments
/// * `config_path` - Rig config JSON (default config when absent)
/// * `output` - Report file path (default: stdout)
/// * `mirror` - Mirror half-body markers before building
/// * `snap` - Optional snap direction (`fk-to-ik` or `ik-to-fk`)
///
/// # Returns
/// Exit code: 0 success, 1 error
pub fn run(
    config_path: Option<&str>,
    output: Option<&str>,
    mirror: bool,
    snap: Option<&str>,
) -> Result<ExitCode> {
    let options = BuildOptions {
        mirror,
        snap: snap.map(parse_snap_direction).transpose()?,
    };
    let config = load_config(config_path)?;
    let print_text = output.is_some();

    if print_text {
        println!(
            "{} {}",
            "Building:".cyan().bold(),
            config_path.unwrap_or("default config")
        );
    }

    let report = build_report(config, options)?;
    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;

    let Some(path) = output else {
        println!("{}", json);
        return Ok(ExitCode::SUCCESS);
    };
    fs::write(path, &json).with_context(|| format!("Failed to write to: {}", path))?;

    println!("{} {}", "Hash:".dimmed(), &report.config_hash[..16]);
    if report.mirrored > 0 {
        println!("{} {} markers", "Mirrored:".dimmed(), report.mirrored);
    }
    for (kind, count) in &report.summary.by_kind {
        println!("  {} {:>4} {}", "-".dimmed(), count, kind);
    }
    for record in &report.snaps {
        let status = match &record.outcome {
            Some(outcome) if outcome.is_degenerate() => "straight chain, pole kept".yellow(),
            _ => "ok".green(),
        };
        println!(
            "  {} snapped {} {}: {}",
            "~".cyan(),
            record.side,
            record.limb,
            status
        );
    }
    println!(
        "{} {} nodes written to: {}",
        "SUCCESS".green().bold(),
        report.summary.nodes,
        path
    );

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigsmith_core::BodyKind;

    #[test]
    fn test_default_build_reaches_done() {
        let report = build_report(RigConfig::default(), BuildOptions::default()).unwrap();
        assert_eq!(report.stage, Stage::Done);
        assert_eq!(report.name, "rig");
        assert_eq!(report.outline.len(), report.summary.nodes);
        assert!(report.outline.iter().any(|e| e.name == "ctrl_root"));
        assert!(report.snaps.is_empty());
    }

    #[test]
    fn test_snaps_only_switch_limbs() {
        let config = RigConfig::new()
            .with_arms(LimbMode::FkIk)
            .with_legs(LimbMode::Ik);
        let options = BuildOptions {
            mirror: false,
            snap: Some(SnapDirection::IkToFk),
        };
        let report = build_report(config, options).unwrap();
        assert_eq!(report.snaps.len(), 2);
        assert!(report.snaps.iter().all(|s| s.limb == Limb::Arm));
        assert!(report.snaps.iter().all(|s| s.outcome.is_some()));
    }

    #[test]
    fn test_mirror_needs_half_body() {
        let options = BuildOptions {
            mirror: true,
            snap: None,
        };
        let err = build_report(RigConfig::default(), options).unwrap_err();
        assert!(format!("{:#}", err).contains("half body"));

        let half = RigConfig::new().with_body(BodyKind::Half);
        let report = build_report(half, options).unwrap();
        assert!(report.mirrored > 0);
        assert!(report.handles.legs.contains_key(&Side::Right));
    }
}
