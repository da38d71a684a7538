//! CPU model: hosts share their computing power among executions.

use std::collections::HashMap;

use super::{
    ActionId, ActionSpec, ConstraintId, Demand, ModelCore, ModelError, ModelKind, ResourceModel,
    UpdateAlgorithm, check_amount,
};
use crate::config::{ConfigurationError, SimkernConfig};
use crate::platform::{Host, ResourceKey, ResourceKind, SharingPolicy};

/// Compute constraint of one host.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HostCpu {
    pub constraint: ConstraintId,
    /// Speed of a single core, in flop/s
    pub core_speed: f64,
}

/// Creates the compute constraint of `host` in `core`.
pub(crate) fn attach_cpu(core: &mut ModelCore, host: &Host) -> HostCpu {
    let key = ResourceKey::new(ResourceKind::Host, host.name());
    let capacity = host.speed() * f64::from(host.core_count().max(1));
    HostCpu {
        constraint: core.add_constraint(Some(&key), host.name(), capacity, SharingPolicy::Shared),
        core_speed: host.speed(),
    }
}

/// Describes an execution of `flops` on `cpu`.
///
/// One execution never runs faster than a single core, and `priority` is its
/// share of the host when several executions compete.
pub(crate) fn execution_spec(
    cpu: HostCpu,
    flops: f64,
    priority: f64,
    bound: Option<f64>,
) -> Result<ActionSpec, ModelError> {
    check_amount("flop amount", flops)?;
    if !(priority.is_finite() && priority > 0.0) {
        return Err(ModelError::InvalidDemand {
            reason: format!("priority must be positive, got {priority}"),
        });
    }

    let mut spec = ActionSpec::new(flops)
        .uses(cpu.constraint, 1.0)
        .scaled_bound(cpu.constraint, cpu.core_speed)
        .penalty(1.0 / priority);
    if let Some(bound) = bound {
        spec = spec.bound(bound);
    }
    Ok(spec)
}

pub(crate) fn unknown_host(model: ModelKind, host: &str) -> ModelError {
    ModelError::UnknownResource {
        model,
        resource: ResourceKey::new(ResourceKind::Host, host),
    }
}

/// `Cas01`: time = size / speed, with capacity shared among executions.
#[derive(Debug)]
pub struct CpuModel {
    core: ModelCore,
    hosts: HashMap<String, HostCpu>,
}

impl CpuModel {
    fn new(update: UpdateAlgorithm, config: &SimkernConfig) -> Self {
        Self {
            core: ModelCore::new(ModelKind::Cpu, update, config.precision),
            hosts: HashMap::new(),
        }
    }
}

impl ResourceModel for CpuModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Cpu
    }

    fn variant(&self) -> &'static str {
        "Cas01"
    }

    fn core(&self) -> &ModelCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModelCore {
        &mut self.core
    }

    fn attach_host(&mut self, host: &Host) {
        let cpu = attach_cpu(&mut self.core, host);
        self.hosts.insert(host.name().to_string(), cpu);
    }

    fn accepts(&self, demand: &Demand) -> bool {
        matches!(demand, Demand::Execute { .. })
    }

    fn admit(&mut self, demand: &Demand) -> Result<ActionId, ModelError> {
        let Demand::Execute {
            host,
            flops,
            priority,
            bound,
        } = demand
        else {
            return Err(ModelError::InvalidDemand {
                reason: "the CPU model only handles executions".to_string(),
            });
        };

        let cpu = self
            .hosts
            .get(host)
            .copied()
            .ok_or_else(|| unknown_host(ModelKind::Cpu, host))?;
        let spec = execution_spec(cpu, *flops, *priority, *bound)?;
        Ok(self.core.admit(spec))
    }
}

pub(crate) fn init_cas01(config: &SimkernConfig) -> Result<Box<dyn ResourceModel>, ConfigurationError> {
    let update = UpdateAlgorithm::from_name(&config.models.cpu_optim).ok_or_else(|| {
        ConfigurationError::UnsupportedOptimization {
            category: "CPU",
            mode: config.models.cpu_optim.clone(),
        }
    })?;
    Ok(Box::new(CpuModel::new(update, config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ActionOutcome;

    fn model() -> CpuModel {
        let mut model = CpuModel::new(UpdateAlgorithm::Lazy, &SimkernConfig::default());
        model.attach_host(&Host::new("single", 100.0));
        model.attach_host(&Host::new("quad", 100.0).with_cores(4));
        model
    }

    fn execute(host: &str, flops: f64, priority: f64) -> Demand {
        Demand::Execute {
            host: host.to_string(),
            flops,
            priority,
            bound: None,
        }
    }

    #[test]
    fn test_single_execution_runs_at_host_speed() {
        let mut model = model();
        let id = model.admit(&execute("single", 500.0, 1.0)).unwrap();

        assert_eq!(model.next_occurring_event(), Some(5.0));
        model.update_actions_state(5.0);
        assert_eq!(model.take_completed(), vec![(id, ActionOutcome::Finished)]);
    }

    #[test]
    fn test_executions_share_a_core() {
        let mut model = model();
        model.admit(&execute("single", 100.0, 1.0)).unwrap();
        model.admit(&execute("single", 100.0, 1.0)).unwrap();
        assert_eq!(model.next_occurring_event(), Some(2.0));
    }

    #[test]
    fn test_priority_weights_the_share() {
        let mut model = model();
        let favored = model.admit(&execute("single", 100.0, 3.0)).unwrap();
        let other = model.admit(&execute("single", 100.0, 1.0)).unwrap();

        model.next_occurring_event();
        assert_eq!(model.core().rate(favored), Some(75.0));
        assert_eq!(model.core().rate(other), Some(25.0));
    }

    #[test]
    fn test_multicore_bounds_each_execution_to_one_core() {
        let mut model = model();
        let alone = model.admit(&execute("quad", 100.0, 1.0)).unwrap();
        model.next_occurring_event();
        assert_eq!(model.core().rate(alone), Some(100.0));

        for _ in 0..4 {
            model.admit(&execute("quad", 100.0, 1.0)).unwrap();
        }
        model.next_occurring_event();
        assert_eq!(model.core().rate(alone), Some(80.0));
    }

    #[test]
    fn test_speed_scale_applies_to_core_bound() {
        let mut model = model();
        let id = model.admit(&execute("quad", 100.0, 1.0)).unwrap();
        model.set_resource_scale(&ResourceKey::new(ResourceKind::Host, "quad"), 0.5);
        model.next_occurring_event();
        assert_eq!(model.core().rate(id), Some(50.0));
    }

    #[test]
    fn test_rejects_bad_requests() {
        let mut model = model();
        assert!(matches!(
            model.admit(&execute("nowhere", 1.0, 1.0)),
            Err(ModelError::UnknownResource { .. })
        ));
        assert!(matches!(
            model.admit(&execute("single", -1.0, 1.0)),
            Err(ModelError::InvalidDemand { .. })
        ));
        assert!(matches!(
            model.admit(&execute("single", 1.0, 0.0)),
            Err(ModelError::InvalidDemand { .. })
        ));
    }

    #[test]
    fn test_trace_integration_is_accepted() {
        let mut config = SimkernConfig::default();
        config.set("cpu/optim:TI").unwrap();
        let model = init_cas01(&config).unwrap();
        assert_eq!(model.core().update_algorithm(), UpdateAlgorithm::TraceIntegration);
    }
}
