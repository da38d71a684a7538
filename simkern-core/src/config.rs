//! Centralized configuration for the simulation kernel.
//!
//! All tunable parameters are grouped here. The single free-form entry point
//! is [`SimkernConfig::set`], which takes `key:value` items and must be applied
//! before the platform is created.

use crate::model::catalog::{self, ModelCategory};
use crate::version::Version;

/// Environment variable holding whitespace-separated `key:value` items.
pub const CONFIG_ENV_VAR: &str = "SIMKERN_CFG";

/// Errors raised while configuring the kernel.
///
/// These are always fatal: they are reported before any simulated activity
/// exists, and the caller is expected to stop after printing them.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Model '{requested}' is invalid! Valid models are: {valid}.")]
    UnknownModel {
        category: &'static str,
        requested: String,
        valid: String,
    },

    #[error("No {category} model is valid")]
    EmptyCatalog { category: &'static str },

    #[error("Model '{name}' is not available: {reason}")]
    UnsupportedModel { name: String, reason: String },

    #[error("Optimization mode '{mode}' is not available for the {category} model")]
    UnsupportedOptimization {
        category: &'static str,
        mode: String,
    },

    #[error("Malformed configuration item '{item}': expected 'key:value'")]
    MalformedItem { item: String },

    #[error("Unknown configuration key '{key}'")]
    UnknownKey { key: String },

    #[error("Invalid value '{value}' for configuration key '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Cannot apply '{item}': the platform is already created")]
    PlatformAlreadyCreated { item: String },

    #[error(
        "Program compiled with simkern {compiled} but linked against simkern {linked}. Please fix this."
    )]
    VersionMismatch { compiled: Version, linked: Version },

    #[error(
        "Program compiled with simkern {compiled} but linked against simkern {linked}. \
         One of them is a development version and should not be mixed with a stable release."
    )]
    DevelopmentVersionMismatch { compiled: Version, linked: Version },
}

/// Central configuration for all kernel components.
#[derive(Debug, Clone, Default)]
pub struct SimkernConfig {
    pub models: ModelSelection,
    pub network: NetworkTuning,
    pub precision: PrecisionConfig,
    pub simulation: SimulationSettings,
}

/// Which variant of each resource model to instantiate.
#[derive(Debug, Clone)]
pub struct ModelSelection {
    pub network: String,
    pub cpu: String,
    pub host: String,
    pub disk: String,
    pub storage: String,
    /// Optimization mode of the network model
    pub network_optim: String,
    /// Optimization mode of the CPU model
    pub cpu_optim: String,
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self {
            network: "LV08".to_string(),
            cpu: "Cas01".to_string(),
            host: "default".to_string(),
            disk: "default".to_string(),
            storage: "default".to_string(),
            network_optim: "Lazy".to_string(),
            cpu_optim: "Lazy".to_string(),
        }
    }
}

/// Network model tuning. `None` keeps the selected variant's own value.
#[derive(Debug, Clone)]
pub struct NetworkTuning {
    /// TCP window size bounding the rate of a flow (`gamma / (2 * latency)`)
    pub tcp_gamma: f64,
    pub latency_factor: Option<f64>,
    pub bandwidth_factor: Option<f64>,
    /// Payload size used to evaluate RTT-unfair sharing weights
    pub weight_s: Option<f64>,
}

impl Default for NetworkTuning {
    fn default() -> Self {
        Self {
            tcp_gamma: 4_194_304.0, // 4 MiB
            latency_factor: None,
            bandwidth_factor: None,
            weight_s: None,
        }
    }
}

/// Numeric tolerances shared by every model.
#[derive(Debug, Clone, Copy)]
pub struct PrecisionConfig {
    /// Dates closer than this (seconds) are considered equal
    pub timing: f64,
    /// Remaining work below this fraction of the total cost is considered done
    pub work_amount: f64,
}

impl Default for PrecisionConfig {
    fn default() -> Self {
        Self {
            timing: 1e-9,
            work_amount: 1e-9,
        }
    }
}

/// Run-level settings.
#[derive(Debug, Clone)]
pub struct SimulationSettings {
    /// Seed of the deterministic RNG handed to actors
    pub seed: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self { seed: 42 }
    }
}

impl SimkernConfig {
    /// Creates configuration with `SIMKERN_CFG` environment overrides.
    ///
    /// # Errors
    ///
    /// - `ConfigurationError` - An item of the environment variable is invalid
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let mut config = Self::default();

        if let Ok(items) = std::env::var(CONFIG_ENV_VAR) {
            for item in items.split_whitespace() {
                config.set(item)?;
            }
        }

        Ok(config)
    }

    /// Applies one `key:value` configuration item.
    ///
    /// Model names are validated against their catalog right away, so an
    /// unknown name is reported with the list of valid names.
    ///
    /// # Errors
    ///
    /// - `ConfigurationError::MalformedItem` - No `:` separator or empty key
    /// - `ConfigurationError::UnknownKey` - Key is not recognized
    /// - `ConfigurationError::InvalidValue` - Value cannot be parsed for this key
    /// - `ConfigurationError::UnknownModel` - Model name absent from its catalog
    /// - `ConfigurationError::UnsupportedOptimization` - `TI` requested for the network
    pub fn set(&mut self, item: &str) -> Result<(), ConfigurationError> {
        let (key, value) = item
            .split_once(':')
            .map(|(key, value)| (key.trim(), value.trim()))
            .filter(|(key, _)| !key.is_empty())
            .ok_or_else(|| ConfigurationError::MalformedItem {
                item: item.to_string(),
            })?;

        match key {
            "network/model" => {
                self.models.network = select_model(ModelCategory::Network, value)?;
            }
            "cpu/model" => self.models.cpu = select_model(ModelCategory::Cpu, value)?,
            "host/model" => self.models.host = select_model(ModelCategory::Host, value)?,
            "disk/model" => self.models.disk = select_model(ModelCategory::Disk, value)?,
            "storage/model" => {
                self.models.storage = select_model(ModelCategory::Storage, value)?;
            }
            "network/optim" => {
                let mode = select_model(ModelCategory::Optimization, value)?;
                if mode == "TI" {
                    return Err(ConfigurationError::UnsupportedOptimization {
                        category: "network",
                        mode,
                    });
                }
                self.models.network_optim = mode;
            }
            "cpu/optim" => {
                self.models.cpu_optim = select_model(ModelCategory::Optimization, value)?;
            }
            "network/TCP-gamma" => self.network.tcp_gamma = parse_positive(key, value)?,
            "network/latency-factor" => {
                self.network.latency_factor = Some(parse_positive(key, value)?);
            }
            "network/bandwidth-factor" => {
                self.network.bandwidth_factor = Some(parse_positive(key, value)?);
            }
            "network/weight-S" => self.network.weight_s = Some(parse_non_negative(key, value)?),
            "precision/timing" => self.precision.timing = parse_positive(key, value)?,
            "precision/work-amount" => self.precision.work_amount = parse_positive(key, value)?,
            "simulation/seed" => {
                self.simulation.seed =
                    value
                        .parse()
                        .map_err(|_| ConfigurationError::InvalidValue {
                            key: key.to_string(),
                            value: value.to_string(),
                            reason: "expected an unsigned integer".to_string(),
                        })?;
            }
            _ => {
                return Err(ConfigurationError::UnknownKey {
                    key: key.to_string(),
                });
            }
        }

        tracing::debug!("Configuration '{}' set to '{}'", key, value);
        Ok(())
    }

    /// Applies every `--cfg=key:value` argument and removes it from `args`.
    ///
    /// Other arguments are left untouched, in order.
    ///
    /// # Errors
    ///
    /// See [`SimkernConfig::set`].
    pub fn apply_args(&mut self, args: &mut Vec<String>) -> Result<(), ConfigurationError> {
        let mut kept = Vec::with_capacity(args.len());
        for arg in args.drain(..) {
            match arg.strip_prefix("--cfg=") {
                Some(item) => self.set(item)?,
                None => kept.push(arg),
            }
        }
        *args = kept;
        Ok(())
    }
}

fn select_model(category: ModelCategory, name: &str) -> Result<String, ConfigurationError> {
    let description =
        catalog::find_model_description(category.as_str(), category.catalog(), name)?;
    Ok(description.name.to_string())
}

fn parse_positive(key: &str, value: &str) -> Result<f64, ConfigurationError> {
    match value.parse::<f64>() {
        Ok(number) if number.is_finite() && number > 0.0 => Ok(number),
        _ => Err(ConfigurationError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected a positive number".to_string(),
        }),
    }
}

fn parse_non_negative(key: &str, value: &str) -> Result<f64, ConfigurationError> {
    match value.parse::<f64>() {
        Ok(number) if number.is_finite() && number >= 0.0 => Ok(number),
        _ => Err(ConfigurationError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected a non-negative number".to_string(),
        }),
    }
}
