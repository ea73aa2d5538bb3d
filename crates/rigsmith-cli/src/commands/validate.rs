//! Validate command implementation
//!
//! Checks a rig config file and reports its canonical hash.

use anyhow::{Context, Result};
use colored::Colorize;
use rigsmith_core::hash::config_hash;
use rigsmith_core::{RigConfig, SpineKind};
use serde::Serialize;
use std::process::ExitCode;

use crate::input::read_config;

/// Machine-readable validate result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidateOutput {
    pub path: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_markers: Vec<String>,
}

/// Validates an already parsed config.
pub fn check(path: &str, config: &RigConfig) -> ValidateOutput {
    let failure = |error: String| ValidateOutput {
        path: path.to_string(),
        valid: false,
        config_hash: None,
        error: Some(error),
        required_markers: Vec::new(),
    };
    if let Err(e) = config.validate() {
        return failure(e.to_string());
    }
    match config_hash(config) {
        Ok(hash) => ValidateOutput {
            path: path.to_string(),
            valid: true,
            config_hash: Some(hash),
            error: None,
            required_markers: config
                .topology()
                .required_markers()
                .into_iter()
                .map(str::to_string)
                .collect(),
        },
        Err(e) => failure(e.to_string()),
    }
}

/// Run the validate command
///
/// # Arguments
/// * `config_path` - Path to the rig config JSON file
/// * `json_output` - Whether to output machine-readable JSON
///
/// # Returns
/// Exit code: 0 if valid, 1 if invalid
pub fn run(config_path: &str, json_output: bool) -> Result<ExitCode> {
    if !json_output {
        println!("{} {}", "Validating:".cyan().bold(), config_path);
    }

    let config = read_config(config_path)?;
    let output = check(config_path, &config);

    if json_output {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialize result")?;
        println!("{}", json);
    } else if output.valid {
        println!(
            "{} {} ({} arms, {} legs, {} spine)",
            "Rig:".dimmed(),
            config.name,
            config.arms,
            config.legs,
            match config.spine {
                SpineKind::Plain => "plain",
                SpineKind::Spline => "spline",
            }
        );
        println!(
            "{} {} markers required",
            "Topology:".dimmed(),
            output.required_markers.len()
        );
        if let Some(hash) = &output.config_hash {
            println!("{} {}", "Hash:".dimmed(), &hash[..16]);
        }
        println!("{} Config is valid", "SUCCESS".green().bold());
    } else {
        println!(
            "  {} {}",
            "x".red(),
            output.error.as_deref().unwrap_or("unknown error")
        );
        println!("{} Config is invalid", "FAILED".red().bold());
    }

    Ok(if output.valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
