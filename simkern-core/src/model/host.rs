//! Host models: how executions and communications are composed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::cpu::{HostCpu, attach_cpu, execution_spec, unknown_host};
use super::network::{LOOPBACK_BANDWIDTH, LOOPBACK_LATENCY};
use super::{
    ActionId, ActionSpec, ConstraintId, Demand, ModelCore, ModelError, ModelKind, ResourceModel,
    UpdateAlgorithm, check_amount,
};
use crate::config::{ConfigurationError, SimkernConfig};
use crate::platform::{Host, Link, ResourceKey, ResourceKind, SharingPolicy};

/// Delegates executions to the CPU model and transfers to the network model.
///
/// It owns no constraint of its own.
#[derive(Debug)]
pub struct CompoundHostModel {
    name: &'static str,
    core: ModelCore,
}

impl ResourceModel for CompoundHostModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Host
    }

    fn variant(&self) -> &'static str {
        self.name
    }

    fn core(&self) -> &ModelCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModelCore {
        &mut self.core
    }

    fn accepts(&self, _demand: &Demand) -> bool {
        false
    }

    fn admit(&mut self, _demand: &Demand) -> Result<ActionId, ModelError> {
        Err(ModelError::InvalidDemand {
            reason: format!("the '{}' host model delegates every request", self.name),
        })
    }
}

fn compound(name: &'static str, config: &SimkernConfig) -> Box<dyn ResourceModel> {
    Box::new(CompoundHostModel {
        name,
        core: ModelCore::new(ModelKind::Host, UpdateAlgorithm::Lazy, config.precision),
    })
}

pub(crate) fn init_default(config: &SimkernConfig) -> Result<Box<dyn ResourceModel>, ConfigurationError> {
    Ok(compound("default", config))
}

pub(crate) fn init_compound(config: &SimkernConfig) -> Result<Box<dyn ResourceModel>, ConfigurationError> {
    Ok(compound("compound", config))
}

/// `ptask_L07`: one sharing system for hosts and links, so that a single
/// action can consume several CPUs and links at once.
#[derive(Debug)]
pub struct PtaskModel {
    core: ModelCore,
    hosts: HashMap<String, HostCpu>,
    loopback: ConstraintId,
}

impl PtaskModel {
    fn new(config: &SimkernConfig) -> Self {
        let mut core = ModelCore::new(ModelKind::Host, UpdateAlgorithm::Full, config.precision);
        let loopback = core.add_constraint(None, "__loopback__", LOOPBACK_BANDWIDTH, SharingPolicy::FatPipe);
        Self {
            core,
            hosts: HashMap::new(),
            loopback,
        }
    }

    fn cpu(&self, host: &str) -> Result<HostCpu, ModelError> {
        self.hosts
            .get(host)
            .copied()
            .ok_or_else(|| unknown_host(ModelKind::Host, host))
    }

    fn link(&self, link: &Link) -> Result<ConstraintId, ModelError> {
        let key = ResourceKey::new(ResourceKind::Link, link.name());
        self.core
            .constraints_of(&key)?
            .first()
            .copied()
            .ok_or(ModelError::UnknownResource {
                model: ModelKind::Host,
                resource: key,
            })
    }

    /// Adds the consumption of moving `bytes` along `route` and returns its latency.
    fn route_usage(
        &self,
        route: &[Arc<Link>],
        bytes: f64,
        usages: &mut BTreeMap<ConstraintId, f64>,
    ) -> Result<f64, ModelError> {
        if route.is_empty() {
            *usages.entry(self.loopback).or_default() += bytes;
            return Ok(LOOPBACK_LATENCY);
        }
        let mut latency = 0.0;
        for link in route {
            *usages.entry(self.link(link)?).or_default() += bytes;
            latency += link.latency();
        }
        Ok(latency)
    }

    /// One unit of work standing for the whole task: its rate is the
    /// fraction of the task completed per second.
    fn parallel_spec(
        &self,
        hosts: &[String],
        flops: &[f64],
        bytes: &[f64],
        routes: &[Vec<Arc<Link>>],
        rate: Option<f64>,
    ) -> Result<ActionSpec, ModelError> {
        let count = hosts.len();
        if flops.len() != count || bytes.len() != count * count || routes.len() != count * count {
            return Err(ModelError::InvalidDemand {
                reason: format!(
                    "a parallel task on {count} hosts needs {count} flop amounts and a {count}x{count} matrix"
                ),
            });
        }

        let mut usages = BTreeMap::new();
        for (host, &amount) in hosts.iter().zip(flops) {
            check_amount("flop amount", amount)?;
            *usages.entry(self.cpu(host)?.constraint).or_default() += amount;
        }

        let mut latency: f64 = 0.0;
        for (route, &amount) in routes.iter().zip(bytes) {
            check_amount("communication size", amount)?;
            if amount > 0.0 {
                latency = latency.max(self.route_usage(route, amount, &mut usages)?);
            }
        }

        let mut spec = ActionSpec::new(1.0).latency(latency);
        for (constraint, coefficient) in usages {
            spec = spec.uses(constraint, coefficient);
        }
        if let Some(rate) = rate {
            spec = spec.bound(rate);
        }
        Ok(spec)
    }

    fn transfer_spec(
        &self,
        src: &str,
        dst: &str,
        bytes: f64,
        route: &[Arc<Link>],
        rate: Option<f64>,
    ) -> Result<ActionSpec, ModelError> {
        check_amount("transfer size", bytes)?;
        let mut usages = BTreeMap::new();
        usages.insert(self.cpu(src)?.constraint, 0.0);
        usages.insert(self.cpu(dst)?.constraint, 0.0);
        let latency = self.route_usage(route, 1.0, &mut usages)?;

        let mut spec = ActionSpec::new(bytes).latency(latency);
        for (constraint, coefficient) in usages {
            spec = spec.uses(constraint, coefficient);
        }
        if let Some(rate) = rate {
            spec = spec.bound(rate);
        }
        Ok(spec)
    }
}

impl ResourceModel for PtaskModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Host
    }

    fn variant(&self) -> &'static str {
        "ptask_L07"
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

    fn attach_link(&mut self, link: &Link) {
        let key = ResourceKey::new(ResourceKind::Link, link.name());
        self.core
            .add_constraint(Some(&key), link.name(), link.bandwidth(), link.policy());
    }

    fn accepts(&self, demand: &Demand) -> bool {
        matches!(
            demand,
            Demand::Execute { .. } | Demand::Transfer { .. } | Demand::Parallel { .. }
        )
    }

    fn owns_network_and_cpu(&self) -> bool {
        true
    }

    fn admit(&mut self, demand: &Demand) -> Result<ActionId, ModelError> {
        let spec = match demand {
            Demand::Execute {
                host,
                flops,
                priority,
                bound,
            } => execution_spec(self.cpu(host)?, *flops, *priority, *bound)?,
            Demand::Transfer {
                src,
                dst,
                bytes,
                route,
                rate,
            } => self.transfer_spec(src, dst, *bytes, route, *rate)?,
            Demand::Parallel {
                hosts,
                flops,
                bytes,
                routes,
                rate,
            } => self.parallel_spec(hosts, flops, bytes, routes, *rate)?,
            Demand::Io { .. } => {
                return Err(ModelError::InvalidDemand {
                    reason: "I/O requests belong to the disk and storage models".to_string(),
                });
            }
        };
        Ok(self.core.admit(spec))
    }
}

pub(crate) fn init_ptask_l07(config: &SimkernConfig) -> Result<Box<dyn ResourceModel>, ConfigurationError> {
    Ok(Box::new(PtaskModel::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ActionOutcome;

    fn model() -> (PtaskModel, Arc<Link>) {
        let mut model = PtaskModel::new(&SimkernConfig::default());
        model.attach_host(&Host::new("a", 100.0));
        model.attach_host(&Host::new("b", 200.0));
        let link = Arc::new(Link::new("ab", 50.0, 0.0));
        model.attach_link(&link);
        (model, link)
    }

    fn parallel(flops: [f64; 2], bytes: [f64; 4], link: &Arc<Link>) -> Demand {
        Demand::Parallel {
            hosts: vec!["a".to_string(), "b".to_string()],
            flops: flops.to_vec(),
            bytes: bytes.to_vec(),
            routes: vec![
                Vec::new(),
                vec![Arc::clone(link)],
                vec![Arc::clone(link)],
                Vec::new(),
            ],
            rate: None,
        }
    }

    #[test]
    fn test_compound_model_delegates_everything() {
        let model = init_default(&SimkernConfig::default()).unwrap();
        assert!(!model.owns_network_and_cpu());
        assert!(!model.accepts(&Demand::Execute {
            host: "a".to_string(),
            flops: 1.0,
            priority: 1.0,
            bound: None,
        }));
    }

    #[test]
    fn test_parallel_task_limited_by_slowest_part() {
        let (mut model, link) = model();
        // a needs 1 s of CPU, b 0.5 s, the link 2 s.
        let id = model.admit(&parallel([100.0, 100.0], [0.0, 100.0, 0.0, 0.0], &link)).unwrap();

        assert_eq!(model.next_occurring_event(), Some(2.0));
        model.update_actions_state(2.0);
        assert_eq!(model.take_completed(), vec![(id, ActionOutcome::Finished)]);
    }

    #[test]
    fn test_parallel_task_without_work_completes_immediately() {
        let (mut model, link) = model();
        let id = model.admit(&parallel([0.0, 0.0], [0.0; 4], &link)).unwrap();
        assert_eq!(model.take_completed(), vec![(id, ActionOutcome::Finished)]);
    }

    #[test]
    fn test_parallel_task_rejects_bad_matrix() {
        let (mut model, _) = model();
        let demand = Demand::Parallel {
            hosts: vec!["a".to_string()],
            flops: vec![1.0],
            bytes: vec![1.0, 2.0],
            routes: vec![Vec::new()],
            rate: None,
        };
        assert!(matches!(model.admit(&demand), Err(ModelError::InvalidDemand { .. })));
    }

    #[test]
    fn test_execution_and_transfer_share_one_system() {
        let (mut model, link) = model();
        let exec = model
            .admit(&Demand::Execute {
                host: "b".to_string(),
                flops: 400.0,
                priority: 1.0,
                bound: None,
            })
            .unwrap();
        let comm = model
            .admit(&Demand::Transfer {
                src: "a".to_string(),
                dst: "b".to_string(),
                bytes: 100.0,
                route: vec![link],
                rate: None,
            })
            .unwrap();

        assert_eq!(model.next_occurring_event(), Some(2.0));
        model.update_actions_state(2.0);
        let completed = model.take_completed();
        assert!(completed.contains(&(exec, ActionOutcome::Finished)));
        assert!(completed.contains(&(comm, ActionOutcome::Finished)));
    }

    #[test]
    fn test_host_failure_fails_parallel_task() {
        let (mut model, link) = model();
        let id = model.admit(&parallel([100.0, 100.0], [0.0; 4], &link)).unwrap();
        model.set_resource_state(&ResourceKey::new(ResourceKind::Host, "b"), false);
        assert_eq!(model.take_completed(), vec![(id, ActionOutcome::Failed)]);
    }
}
