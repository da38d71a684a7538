//! Fixed catalogs of model variants, one per resource kind.
//!
//! Selection is an exact, case-sensitive name match. Catalog order is the
//! order used when listing valid names.

use super::{ResourceModel, cpu, host, io, network};
use crate::config::{ConfigurationError, SimkernConfig};

/// Builds a model instance from the configuration.
pub type ModelInit = fn(&SimkernConfig) -> Result<Box<dyn ResourceModel>, ConfigurationError>;

/// Immutable `(name, description, initializer)` entry of a catalog.
#[derive(Debug)]
pub struct ModelDescription {
    pub name: &'static str,
    pub description: &'static str,
    /// `None` for entries that only select a behavior, such as optimization modes
    pub init: Option<ModelInit>,
}

impl ModelDescription {
    /// Runs the initializer of this entry.
    ///
    /// # Errors
    ///
    /// - `ConfigurationError::UnsupportedModel` - The entry has no initializer,
    ///   or its initializer is not available in this build
    pub fn instantiate(
        &self,
        config: &SimkernConfig,
    ) -> Result<Box<dyn ResourceModel>, ConfigurationError> {
        match self.init {
            Some(init) => init(config),
            None => Err(ConfigurationError::UnsupportedModel {
                name: self.name.to_string(),
                reason: "this entry does not build a model".to_string(),
            }),
        }
    }
}

pub static NETWORK_MODELS: &[ModelDescription] = &[
    ModelDescription {
        name: "LV08",
        description: "Realistic network analytic model (slow-start modeled by multiplying latency by 13.01, \
                      bandwidth by .97; bottleneck sharing uses a payload of S=20537 for evaluating RTT). \
                      Used by default.",
        init: Some(network::init_lv08),
    },
    ModelDescription {
        name: "Constant",
        description: "Simplistic network model where all communications take a constant time (one second). \
                      This model provides the lowest realism, but is (marginally) faster.",
        init: Some(network::init_constant),
    },
    ModelDescription {
        name: "SMPI",
        description: "Realistic network model specifically tailored for HPC settings (accurate modeling of \
                      slow start with correction factors on three intervals: < 1KiB, < 64 KiB, >= 64 KiB).",
        init: Some(network::init_smpi),
    },
    ModelDescription {
        name: "IB",
        description: "Realistic network model specifically tailored for HPC settings, with Infiniband \
                      contention model.",
        init: Some(network::init_infiniband),
    },
    ModelDescription {
        name: "CM02",
        description: "Legacy network analytic model (very similar to LV08, but without corrective factors. \
                      The timings of small messages are thus poorly modeled).",
        init: Some(network::init_cm02),
    },
    ModelDescription {
        name: "ns-3",
        description: "Network pseudo-model using the ns-3 tcp model instead of an analytic model.",
        init: Some(network::init_ns3),
    },
];

pub static CPU_MODELS: &[ModelDescription] = &[ModelDescription {
    name: "Cas01",
    description: "Simplistic CPU model (time=size/speed).",
    init: Some(cpu::init_cas01),
}];

pub static HOST_MODELS: &[ModelDescription] = &[
    ModelDescription {
        name: "default",
        description: "Default host model. Currently, CPU:Cas01 and network:LV08.",
        init: Some(host::init_default),
    },
    ModelDescription {
        name: "compound",
        description: "Host model that is automatically chosen if you change the network and CPU models.",
        init: Some(host::init_compound),
    },
    ModelDescription {
        name: "ptask_L07",
        description: "Host model somehow similar to Cas01+CM02 but allowing parallel tasks.",
        init: Some(host::init_ptask_l07),
    },
];

pub static DISK_MODELS: &[ModelDescription] = &[ModelDescription {
    name: "default",
    description: "Simplistic disk model.",
    init: Some(io::init_disk),
}];

pub static STORAGE_MODELS: &[ModelDescription] = &[ModelDescription {
    name: "default",
    description: "Simplistic storage model.",
    init: Some(io::init_storage),
}];

pub static OPTIMIZATION_MODES: &[ModelDescription] = &[
    ModelDescription {
        name: "Lazy",
        description: "Lazy action management (the sharing system is only solved again after a change).",
        init: None,
    },
    ModelDescription {
        name: "TI",
        description: "Trace integration. Optimized mode when using availability traces (only available \
                      for the Cas01 CPU model for now).",
        init: None,
    },
    ModelDescription {
        name: "Full",
        description: "Full update of remaining work and rates at every step. Slow but may be useful when \
                      debugging.",
        init: None,
    },
];

/// The catalogs that can be selected through configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelCategory {
    Network,
    Cpu,
    Host,
    Disk,
    Storage,
    Optimization,
}

impl ModelCategory {
    pub const ALL: [ModelCategory; 6] = [
        ModelCategory::Network,
        ModelCategory::Cpu,
        ModelCategory::Host,
        ModelCategory::Disk,
        ModelCategory::Storage,
        ModelCategory::Optimization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelCategory::Network => "network",
            ModelCategory::Cpu => "CPU",
            ModelCategory::Host => "host",
            ModelCategory::Disk => "disk",
            ModelCategory::Storage => "storage",
            ModelCategory::Optimization => "optimization",
        }
    }

    pub fn catalog(&self) -> &'static [ModelDescription] {
        match self {
            ModelCategory::Network => NETWORK_MODELS,
            ModelCategory::Cpu => CPU_MODELS,
            ModelCategory::Host => HOST_MODELS,
            ModelCategory::Disk => DISK_MODELS,
            ModelCategory::Storage => STORAGE_MODELS,
            ModelCategory::Optimization => OPTIMIZATION_MODES,
        }
    }
}

/// Finds `name` in `table`.
///
/// # Errors
///
/// - `ConfigurationError::EmptyCatalog` - `table` has no entry at all
/// - `ConfigurationError::UnknownModel` - No entry has this exact name; the
///   message lists every valid name in catalog order
pub fn find_model_description(
    category: &'static str,
    table: &'static [ModelDescription],
    name: &str,
) -> Result<&'static ModelDescription, ConfigurationError> {
    if let Some(description) = table.iter().find(|item| item.name == name) {
        return Ok(description);
    }

    if table.is_empty() {
        return Err(ConfigurationError::EmptyCatalog { category });
    }

    Err(ConfigurationError::UnknownModel {
        category,
        requested: name.to_string(),
        valid: table
            .iter()
            .map(|item| item.name)
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Renders the long description of every entry of `table`.
pub fn model_help(category: &str, table: &[ModelDescription]) -> String {
    let mut help = format!("Long description of the {category} models accepted by this simulator:\n");
    for item in table {
        help.push_str(&format!("  {}: {}\n", item.name, item.description));
    }
    help
}

#[cfg(test)]
mod tests {
    use super::*;

    static LETTERS: &[ModelDescription] = &[
        ModelDescription {
            name: "A",
            description: "first",
            init: None,
        },
        ModelDescription {
            name: "B",
            description: "second",
            init: None,
        },
    ];

    static NOTHING: &[ModelDescription] = &[];

    #[test]
    fn test_unknown_name_lists_catalog_in_order() {
        let error = find_model_description("letter", LETTERS, "C").unwrap_err();
        assert_eq!(
            error,
            ConfigurationError::UnknownModel {
                category: "letter",
                requested: "C".to_string(),
                valid: "A, B".to_string(),
            }
        );
        assert!(error.to_string().contains("A, B"));
    }

    #[test]
    fn test_lookup_is_stable() {
        let first = find_model_description("letter", LETTERS, "B").unwrap();
        let second = find_model_description("letter", LETTERS, "B").unwrap();
        assert!(std::ptr::eq(first, second));
        assert_eq!(first.description, "second");
    }

    #[test]
    fn test_empty_catalog() {
        assert_eq!(
            find_model_description("nothing", NOTHING, "A").unwrap_err(),
            ConfigurationError::EmptyCatalog { category: "nothing" }
        );
    }

    #[test]
    fn test_catalog_orders() {
        let names = |table: &[ModelDescription]| table.iter().map(|item| item.name).collect::<Vec<_>>();
        assert_eq!(
            names(NETWORK_MODELS),
            vec!["LV08", "Constant", "SMPI", "IB", "CM02", "ns-3"]
        );
        assert_eq!(names(HOST_MODELS), vec!["default", "compound", "ptask_L07"]);
        assert_eq!(names(OPTIMIZATION_MODES), vec!["Lazy", "TI", "Full"]);
    }

    #[test]
    fn test_every_model_entry_has_an_initializer() {
        for category in ModelCategory::ALL {
            let expects_init = category != ModelCategory::Optimization;
            for item in category.catalog() {
                assert_eq!(item.init.is_some(), expects_init, "{}", item.name);
            }
        }
    }

    #[test]
    fn test_model_help_lists_every_entry() {
        let help = model_help("network", NETWORK_MODELS);
        assert!(help.starts_with("Long description of the network models"));
        for item in NETWORK_MODELS {
            assert!(help.contains(&format!("  {}: ", item.name)));
        }
    }

    #[test]
    fn test_optimization_entries_do_not_instantiate() {
        let lazy = find_model_description("optimization", OPTIMIZATION_MODES, "Lazy").unwrap();
        assert!(lazy.instantiate(&SimkernConfig::default()).is_err());
    }
}
