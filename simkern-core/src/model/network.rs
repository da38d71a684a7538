//! Analytic network models.

use std::collections::HashMap;
use std::sync::Arc;

use super::{
    ActionId, ActionSpec, ConstraintId, Demand, ModelCore, ModelError, ModelKind, ResourceModel,
    UpdateAlgorithm, check_amount,
};
use crate::config::{ConfigurationError, SimkernConfig};
use crate::platform::{Host, Link, ResourceKey, ResourceKind, SharingPolicy};

/// Bandwidth of the implicit link used when a host talks to itself.
pub const LOOPBACK_BANDWIDTH: f64 = 498_000_000.0;
/// Latency of the implicit loopback link.
pub const LOOPBACK_LATENCY: f64 = 0.000_015;

const LV08_LATENCY_FACTOR: f64 = 13.01;
const LV08_BANDWIDTH_FACTOR: f64 = 0.97;
const LV08_WEIGHT_S: f64 = 20537.0;

/// `(size upper bound, latency factor, bandwidth factor)` for SMPI messages.
const SMPI_FACTORS: [(f64, f64, f64); 3] = [
    (1024.0, 1.95341, 0.338112),
    (65536.0, 3.48845, 0.697866),
    (f64::INFINITY, 11.6436, 0.940694),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    Cm02,
    Lv08,
    Smpi,
    Constant,
}

impl Variant {
    fn name(self) -> &'static str {
        match self {
            Variant::Cm02 => "CM02",
            Variant::Lv08 => "LV08",
            Variant::Smpi => "SMPI",
            Variant::Constant => "Constant",
        }
    }
}

/// Flow-level network model sharing link bandwidth among transfers.
#[derive(Debug)]
pub struct NetworkModel {
    variant: Variant,
    core: ModelCore,
    loopback: ConstraintId,
    endpoints: HashMap<String, ConstraintId>,
    tcp_gamma: f64,
    latency_factor: Option<f64>,
    bandwidth_factor: Option<f64>,
    weight_s: f64,
}

impl NetworkModel {
    fn new(variant: Variant, config: &SimkernConfig) -> Result<Self, ConfigurationError> {
        let update = match config.models.network_optim.as_str() {
            "Full" => UpdateAlgorithm::Full,
            "Lazy" => UpdateAlgorithm::Lazy,
            other => {
                return Err(ConfigurationError::UnsupportedOptimization {
                    category: "network",
                    mode: other.to_string(),
                });
            }
        };

        let mut core = ModelCore::new(ModelKind::Network, update, config.precision);
        let loopback = core.add_constraint(None, "__loopback__", LOOPBACK_BANDWIDTH, SharingPolicy::FatPipe);

        let default_weight_s = match variant {
            Variant::Lv08 | Variant::Smpi => LV08_WEIGHT_S,
            Variant::Cm02 | Variant::Constant => 0.0,
        };

        Ok(Self {
            variant,
            core,
            loopback,
            endpoints: HashMap::new(),
            tcp_gamma: config.network.tcp_gamma,
            latency_factor: config.network.latency_factor,
            bandwidth_factor: config.network.bandwidth_factor,
            weight_s: config.network.weight_s.unwrap_or(default_weight_s),
        })
    }

    /// `(latency factor, bandwidth factor)` applied to a message of `bytes`.
    fn factors(&self, bytes: f64) -> (f64, f64) {
        let (latency, bandwidth) = match self.variant {
            Variant::Cm02 | Variant::Constant => (1.0, 1.0),
            Variant::Lv08 => (LV08_LATENCY_FACTOR, LV08_BANDWIDTH_FACTOR),
            Variant::Smpi => SMPI_FACTORS
                .iter()
                .find(|(limit, _, _)| bytes < *limit)
                .map_or((1.0, 1.0), |&(_, latency, bandwidth)| (latency, bandwidth)),
        };
        (
            self.latency_factor.unwrap_or(latency),
            self.bandwidth_factor.unwrap_or(bandwidth),
        )
    }

    fn endpoint(&self, host: &str) -> Result<ConstraintId, ModelError> {
        self.endpoints
            .get(host)
            .copied()
            .ok_or_else(|| ModelError::UnknownResource {
                model: ModelKind::Network,
                resource: ResourceKey::new(ResourceKind::Host, host),
            })
    }

    fn link(&self, link: &Link) -> Result<ConstraintId, ModelError> {
        let key = ResourceKey::new(ResourceKind::Link, link.name());
        self.core
            .constraints_of(&key)?
            .first()
            .copied()
            .ok_or(ModelError::UnknownResource {
                model: ModelKind::Network,
                resource: key,
            })
    }

    fn transfer(
        &self,
        src: &str,
        dst: &str,
        bytes: f64,
        route: &[Arc<Link>],
        rate: Option<f64>,
    ) -> Result<ActionSpec, ModelError> {
        check_amount("transfer size", bytes)?;
        let mut spec = ActionSpec::new(bytes)
            .uses(self.endpoint(src)?, 0.0)
            .uses(self.endpoint(dst)?, 0.0);
        if let Some(rate) = rate {
            spec = spec.bound(rate);
        }

        if self.variant == Variant::Constant {
            // One simulated second whatever the size and the contention.
            return Ok(if bytes > 0.0 { spec.bound(bytes) } else { spec });
        }

        let (latency_factor, bandwidth_factor) = self.factors(bytes);

        let (latency, penalty) = if route.is_empty() {
            spec = spec.uses(self.loopback, 1.0 / bandwidth_factor);
            (
                LOOPBACK_LATENCY,
                LOOPBACK_LATENCY + self.weight_s / LOOPBACK_BANDWIDTH,
            )
        } else {
            let mut latency = 0.0;
            let mut penalty = 0.0;
            for link in route {
                spec = spec.uses(self.link(link)?, 1.0 / bandwidth_factor);
                latency += link.latency();
                penalty += link.latency() + self.weight_s / link.bandwidth();
            }
            (latency, penalty)
        };

        let latency = latency * latency_factor;
        spec = spec.latency(latency);
        if latency > 0.0 {
            spec = spec.bound(self.tcp_gamma / (2.0 * latency));
        }

        let penalty = match self.variant {
            Variant::Lv08 | Variant::Smpi if penalty > 0.0 => penalty,
            _ => 1.0,
        };
        Ok(spec.penalty(penalty))
    }
}

impl ResourceModel for NetworkModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Network
    }

    fn variant(&self) -> &'static str {
        self.variant.name()
    }

    fn core(&self) -> &ModelCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModelCore {
        &mut self.core
    }

    fn attach_host(&mut self, host: &Host) {
        let key = ResourceKey::new(ResourceKind::Host, host.name());
        let endpoint = self
            .core
            .add_constraint(Some(&key), host.name(), f64::INFINITY, SharingPolicy::Shared);
        self.endpoints.insert(host.name().to_string(), endpoint);
    }

    fn attach_link(&mut self, link: &Link) {
        let key = ResourceKey::new(ResourceKind::Link, link.name());
        self.core
            .add_constraint(Some(&key), link.name(), link.bandwidth(), link.policy());
    }

    fn accepts(&self, demand: &Demand) -> bool {
        matches!(demand, Demand::Transfer { .. })
    }

    fn admit(&mut self, demand: &Demand) -> Result<ActionId, ModelError> {
        let Demand::Transfer {
            src,
            dst,
            bytes,
            route,
            rate,
        } = demand
        else {
            return Err(ModelError::InvalidDemand {
                reason: "the network model only handles transfers".to_string(),
            });
        };

        let spec = self.transfer(src, dst, *bytes, route, *rate)?;
        Ok(self.core.admit(spec))
    }
}

pub(crate) fn init_cm02(config: &SimkernConfig) -> Result<Box<dyn ResourceModel>, ConfigurationError> {
    Ok(Box::new(NetworkModel::new(Variant::Cm02, config)?))
}

pub(crate) fn init_lv08(config: &SimkernConfig) -> Result<Box<dyn ResourceModel>, ConfigurationError> {
    Ok(Box::new(NetworkModel::new(Variant::Lv08, config)?))
}

pub(crate) fn init_smpi(config: &SimkernConfig) -> Result<Box<dyn ResourceModel>, ConfigurationError> {
    Ok(Box::new(NetworkModel::new(Variant::Smpi, config)?))
}

pub(crate) fn init_constant(config: &SimkernConfig) -> Result<Box<dyn ResourceModel>, ConfigurationError> {
    Ok(Box::new(NetworkModel::new(Variant::Constant, config)?))
}

pub(crate) fn init_infiniband(_: &SimkernConfig) -> Result<Box<dyn ResourceModel>, ConfigurationError> {
    Err(ConfigurationError::UnsupportedModel {
        name: "IB".to_string(),
        reason: "Infiniband contention modeling is not built into this kernel".to_string(),
    })
}

pub(crate) fn init_ns3(_: &SimkernConfig) -> Result<Box<dyn ResourceModel>, ConfigurationError> {
    Err(ConfigurationError::UnsupportedModel {
        name: "ns-3".to_string(),
        reason: "ns-3 packet-level simulation is not built into this kernel".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: &str) -> NetworkModel {
        let mut config = SimkernConfig::default();
        config.set(&format!("network/model:{name}")).unwrap();
        let variant = match name {
            "CM02" => Variant::Cm02,
            "LV08" => Variant::Lv08,
            "SMPI" => Variant::Smpi,
            _ => Variant::Constant,
        };
        let mut model = NetworkModel::new(variant, &config).unwrap();
        model.attach_host(&Host::new("a", 1e9));
        model.attach_host(&Host::new("b", 1e9));
        model
    }

    fn transfer(bytes: f64, route: &[Arc<Link>]) -> Demand {
        Demand::Transfer {
            src: "a".to_string(),
            dst: "b".to_string(),
            bytes,
            route: route.to_vec(),
            rate: None,
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-9 * expected.abs().max(1.0),
            "{actual} != {expected}"
        );
    }

    #[test]
    fn test_cm02_latency_then_bandwidth() {
        let mut model = model("CM02");
        let link = Arc::new(Link::new("l", 1e6, 0.01));
        model.attach_link(&link);

        model.admit(&transfer(1e6, &[link])).unwrap();
        assert_close(model.next_occurring_event().unwrap(), 0.01);

        model.update_actions_state(0.01);
        assert!(model.take_completed().is_empty());
        assert_close(model.next_occurring_event().unwrap(), 1.0);
    }

    #[test]
    fn test_tcp_window_bounds_long_fat_links() {
        let mut model = model("CM02");
        // 1 GB/s but 100 ms: 4 MiB / 0.2 s = 20 MiB/s max
        let link = Arc::new(Link::new("wan", 1e9, 0.1));
        model.attach_link(&link);

        let id = model.admit(&transfer(1e8, &[link])).unwrap();
        let latency = model.next_occurring_event().unwrap();
        model.update_actions_state(latency);
        model.take_completed();
        model.next_occurring_event();
        assert_close(model.core().rate(id).unwrap(), 4_194_304.0 / 0.2);
    }

    #[test]
    fn test_lv08_applies_factors() {
        let mut model = model("LV08");
        let link = Arc::new(Link::new("l", 1e6, 0.001));
        model.attach_link(&link);

        model.admit(&transfer(97.0, &[link])).unwrap();
        assert_close(model.next_occurring_event().unwrap(), 0.001 * LV08_LATENCY_FACTOR);
        model.update_actions_state(0.001 * LV08_LATENCY_FACTOR);
        model.take_completed();
        // 97 bytes at 0.97 MB/s
        assert_close(model.next_occurring_event().unwrap(), 1e-4);
    }

    #[test]
    fn test_smpi_factor_intervals() {
        let model = model("SMPI");
        assert_eq!(model.factors(10.0), (1.95341, 0.338112));
        assert_eq!(model.factors(4096.0), (3.48845, 0.697866));
        assert_eq!(model.factors(1e6), (11.6436, 0.940694));
    }

    #[test]
    fn test_constant_takes_one_second() {
        let mut model = model("Constant");
        let link = Arc::new(Link::new("l", 1.0, 100.0));
        model.attach_link(&link);

        model.admit(&transfer(5e9, &[Arc::clone(&link)])).unwrap();
        model.admit(&transfer(1.0, &[link])).unwrap();
        assert_close(model.next_occurring_event().unwrap(), 1.0);

        let empty = model.admit(&transfer(0.0, &[])).unwrap();
        assert!(model.take_completed().contains(&(empty, super::super::ActionOutcome::Finished)));
    }

    #[test]
    fn test_loopback_for_local_transfers() {
        let mut model = model("CM02");
        let demand = Demand::Transfer {
            src: "a".to_string(),
            dst: "a".to_string(),
            bytes: LOOPBACK_BANDWIDTH,
            route: Vec::new(),
            rate: None,
        };
        model.admit(&demand).unwrap();
        assert_close(model.next_occurring_event().unwrap(), LOOPBACK_LATENCY);
    }

    #[test]
    fn test_unknown_link_is_rejected() {
        let mut model = model("CM02");
        let stray = Arc::new(Link::new("stray", 1e6, 0.0));
        assert!(matches!(
            model.admit(&transfer(1.0, &[stray])),
            Err(ModelError::UnknownResource { .. })
        ));
    }

    #[test]
    fn test_ti_rejected_for_network() {
        let mut config = SimkernConfig::default();
        config.models.network_optim = "TI".to_string();
        assert!(init_lv08(&config).is_err());
    }
}
