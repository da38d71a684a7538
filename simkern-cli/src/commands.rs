//! CLI command implementations

use anyhow::{Context, bail};
use clap::Subcommand;
use simkern_core::model::catalog::{ModelCategory, model_help};
use simkern_core::version::{VersionCompatibility, version_check, version_string};
use simkern_core::{Engine, SimkernConfig, SimkernError};

use crate::scenarios::{Scenario, ScenarioParams, simulate};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a demonstration scenario and print its report
    Run {
        /// Scenario to simulate
        #[arg(value_enum)]
        scenario: Scenario,
        /// Number of worker hosts (cluster nodes for parallel-task)
        #[arg(short, long, default_value = "4")]
        workers: usize,
        /// Number of tasks or ping-pong rounds
        #[arg(short, long, default_value = "20")]
        tasks: usize,
        /// Work of one task, in flops
        #[arg(long, default_value = "5e8")]
        flops: f64,
        /// Size of one message, in bytes
        #[arg(long, default_value = "1e6")]
        bytes: f64,
        /// Configuration item `key:value`, may be repeated
        #[arg(long = "cfg", value_name = "KEY:VALUE")]
        cfg: Vec<String>,
        /// Stop the simulation at this date
        #[arg(long)]
        until: Option<f64>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Describe the models selectable with --cfg
    Models {
        /// Only this category (network, cpu, host, disk, storage, optimization)
        category: Option<String>,
    },
    /// Print the kernel version, optionally checking compatibility with another
    Version {
        /// Version a program was compiled against, as `major.minor.patch`
        #[arg(long)]
        check: Option<String>,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            scenario,
            workers,
            tasks,
            flops,
            bytes,
            cfg,
            until,
            json,
        } => {
            let params = ScenarioParams {
                workers,
                tasks,
                task_flops: flops,
                message_bytes: bytes,
            };
            run_scenario(scenario, params, &cfg, until, json)
        }
        Commands::Models { category } => show_models(category.as_deref()),
        Commands::Version { check } => show_version(check.as_deref()),
    }
}

/// Runs `scenario` on a fresh engine and prints the report.
///
/// # Errors
/// - `SimkernError::Configuration` - Invalid `--cfg` item or `SIMKERN_CFG`
/// - `SimkernError::Engine` - Platform, deployment or run failure
pub fn run_scenario(
    scenario: Scenario,
    params: ScenarioParams,
    cfg: &[String],
    until: Option<f64>,
    json: bool,
) -> anyhow::Result<()> {
    let config = build_config(scenario, cfg)?;
    let engine = Engine::with_config(config).map_err(SimkernError::from)?;
    let result = simulate(&engine, scenario, &params, until);
    Engine::shutdown();
    let report = result?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Cannot serialize the report")?
        );
    } else {
        print!("{}", report.summary());
    }
    Ok(())
}

/// Defaults, then `SIMKERN_CFG`, then the scenario's requirements, then `--cfg` items.
fn build_config(scenario: Scenario, cfg: &[String]) -> Result<SimkernConfig, SimkernError> {
    let mut config = SimkernConfig::from_env()?;
    let items = scenario
        .required_config()
        .iter()
        .copied()
        .chain(cfg.iter().map(String::as_str));
    for item in items {
        config.set(item)?;
    }
    Ok(config)
}

/// Prints the long description of one or every model catalog.
///
/// # Errors
/// - Unknown category name
pub fn show_models(category: Option<&str>) -> anyhow::Result<()> {
    let selected: Vec<ModelCategory> = ModelCategory::ALL
        .into_iter()
        .filter(|candidate| category.is_none_or(|name| candidate.as_str().eq_ignore_ascii_case(name)))
        .collect();
    if selected.is_empty() {
        bail!(
            "Unknown model category '{}'",
            category.unwrap_or_default()
        );
    }

    for category in selected {
        println!("{}", model_help(category.as_str(), category.catalog()));
    }
    Ok(())
}

/// Prints the kernel version and, with `check`, whether a program built against it may run.
///
/// # Errors
/// - Malformed `check` version
/// - `SimkernError::Configuration` - Incompatible versions
pub fn show_version(check: Option<&str>) -> anyhow::Result<()> {
    println!("simkern {}", version_string());
    let Some(check) = check else {
        return Ok(());
    };

    let (major, minor, patch) = parse_version(check)?;
    let compatibility = version_check(major, minor, patch).map_err(SimkernError::from)?;
    match compatibility {
        VersionCompatibility::Exact => println!("{check}: compatible"),
        VersionCompatibility::PatchMismatch => println!("{check}: compatible (patch level differs)"),
    }
    Ok(())
}

fn parse_version(version: &str) -> anyhow::Result<(u32, u32, u32)> {
    let parts = version
        .split('.')
        .map(|part| {
            part.parse::<u32>()
                .with_context(|| format!("Invalid version component '{part}' in '{version}'"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    match parts.as_slice() {
        [major, minor, patch] => Ok((*major, *minor, *patch)),
        _ => bail!("Version '{version}' must have the form major.minor.patch"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_valid() {
        assert_eq!(parse_version("3.36.0").unwrap(), (3, 36, 0));
    }

    #[test]
    fn test_parse_version_wrong_arity() {
        assert!(parse_version("3.36").is_err());
        assert!(parse_version("3.36.0.1").is_err());
    }

    #[test]
    fn test_parse_version_invalid_chars() {
        assert!(parse_version("3.x.0").is_err());
    }

    #[test]
    fn test_show_models_unknown_category() {
        assert!(show_models(Some("gpu")).is_err());
        assert!(show_models(Some("network")).is_ok());
        assert!(show_models(None).is_ok());
    }

    #[test]
    fn test_incompatible_version_is_a_configuration_error() {
        let error = show_version(Some("99.0.0")).unwrap_err();
        let simkern = error.downcast_ref::<SimkernError>().unwrap();
        assert!(simkern.is_configuration_error());
    }

    #[test]
    fn test_invalid_cfg_item_is_rejected_before_running() {
        let error = build_config(Scenario::PingPong, &["network/model:Bogus".to_string()]).unwrap_err();
        assert!(error.is_configuration_error());
    }

    #[test]
    fn test_scenario_requirements_come_before_user_items() {
        let config = build_config(Scenario::ParallelTask, &[]).unwrap();
        assert_eq!(config.models.host, "ptask_L07");
    }
}
