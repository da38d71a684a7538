//! Resource models: capacity sharing and next-completion reporting.
//!
//! Each model owns the actions currently consuming its resource kind. A model
//! shares the capacity of its constraints among those actions with weighted
//! max-min fairness, reports the delay until its next action completes, and
//! hands completed actions back to the engine.

pub mod catalog;
pub mod cpu;
pub mod host;
pub mod io;
pub mod network;
pub mod sharing;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{PrecisionConfig, SimkernConfig};
use crate::platform::{Disk, Host, Link, ResourceKey, SharingPolicy, Storage};
pub use io::IoOp;
use sharing::{ConstraintInput, VariableInput};

/// Resource kinds, in the order the engine consults their models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelKind {
    Network,
    Cpu,
    Host,
    Disk,
    Storage,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Network => "network",
            ModelKind::Cpu => "cpu",
            ModelKind::Host => "host",
            ModelKind::Disk => "disk",
            ModelKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a model keeps its sharing solution current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAlgorithm {
    /// Re-solve the sharing system at every step
    Full,
    /// Re-solve only after the action set or a capacity changed
    Lazy,
    /// CPU-only alias of `Lazy`.
    ///
    /// Profile events are replayed as capacity changes between two steps,
    /// so progress already integrates the trace piecewise.
    TraceIntegration,
}

impl UpdateAlgorithm {
    /// Maps an optimization catalog name to its algorithm.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Full" => Some(UpdateAlgorithm::Full),
            "Lazy" => Some(UpdateAlgorithm::Lazy),
            "TI" => Some(UpdateAlgorithm::TraceIntegration),
            _ => None,
        }
    }
}

static NEXT_ACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of an action, across every model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(u64);

impl ActionId {
    fn next() -> Self {
        Self(NEXT_ACTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action#{}", self.0)
    }
}

/// Index of a constraint inside its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(usize);

/// How an action left its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Finished,
    Failed,
}

/// Work requested from the models on behalf of an activity.
#[derive(Debug, Clone)]
pub enum Demand {
    Execute {
        host: String,
        flops: f64,
        priority: f64,
        bound: Option<f64>,
    },
    /// `flops[i]` on `hosts[i]`, and `bytes[i * n + j]` from `hosts[i]` to `hosts[j]`
    Parallel {
        hosts: Vec<String>,
        flops: Vec<f64>,
        bytes: Vec<f64>,
        routes: Vec<Vec<Arc<Link>>>,
        rate: Option<f64>,
    },
    Transfer {
        src: String,
        dst: String,
        bytes: f64,
        route: Vec<Arc<Link>>,
        rate: Option<f64>,
    },
    Io {
        target: ResourceKey,
        op: IoOp,
        bytes: f64,
    },
}

/// Errors admitting work into a model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("The {model} model does not know {resource}")]
    UnknownResource {
        model: ModelKind,
        resource: ResourceKey,
    },

    #[error("Invalid request: {reason}")]
    InvalidDemand { reason: String },
}

/// One capacity inequality of a model's sharing system.
#[derive(Debug, Clone)]
pub struct Constraint {
    name: String,
    capacity: f64,
    scale: f64,
    policy: SharingPolicy,
    on: bool,
}

impl Constraint {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capacity currently available, accounting for profiles and state.
    pub fn effective_capacity(&self) -> f64 {
        if self.on {
            self.capacity * self.scale
        } else {
            0.0
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

/// Parameters of an action about to be admitted.
#[derive(Debug, Clone)]
pub struct ActionSpec {
    cost: f64,
    latency: f64,
    penalty: f64,
    bound: f64,
    scaled_bound: Option<(ConstraintId, f64)>,
    usages: Vec<(ConstraintId, f64)>,
}

impl ActionSpec {
    /// Starts describing an action with `cost` units of work.
    pub fn new(cost: f64) -> Self {
        Self {
            cost,
            latency: 0.0,
            penalty: 1.0,
            bound: f64::INFINITY,
            scaled_bound: None,
            usages: Vec::new(),
        }
    }

    pub fn latency(mut self, latency: f64) -> Self {
        self.latency = latency;
        self
    }

    /// Sharing penalty: the rate obtained on a contended constraint is
    /// inversely proportional to it.
    pub fn penalty(mut self, penalty: f64) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn bound(mut self, bound: f64) -> Self {
        self.bound = self.bound.min(bound);
        self
    }

    /// Bound following the scale of `constraint` (e.g. one core of a host).
    pub fn scaled_bound(mut self, constraint: ConstraintId, bound: f64) -> Self {
        self.scaled_bound = Some((constraint, bound));
        self
    }

    /// Consumes `coefficient` units of `constraint` per unit of rate.
    ///
    /// A zero coefficient only ties the action to the constraint's availability.
    pub fn uses(mut self, constraint: ConstraintId, coefficient: f64) -> Self {
        self.usages.push((constraint, coefficient));
        self
    }
}

#[derive(Debug, Clone)]
struct Action {
    cost: f64,
    remaining: f64,
    latency: f64,
    rate: f64,
    penalty: f64,
    bound: f64,
    scaled_bound: Option<(ConstraintId, f64)>,
    usages: Vec<(ConstraintId, f64)>,
}

impl Action {
    fn uses(&self, constraint: ConstraintId) -> bool {
        self.usages.iter().any(|&(used, _)| used == constraint)
            || self
                .scaled_bound
                .is_some_and(|(bounded, _)| bounded == constraint)
    }
}

/// Bookkeeping shared by every model: constraints, actions and the sharing solution.
#[derive(Debug)]
pub struct ModelCore {
    kind: ModelKind,
    update: UpdateAlgorithm,
    precision: PrecisionConfig,
    constraints: Vec<Constraint>,
    resources: HashMap<ResourceKey, Vec<ConstraintId>>,
    actions: BTreeMap<ActionId, Action>,
    completed: Vec<(ActionId, ActionOutcome)>,
    dirty: bool,
}

impl ModelCore {
    pub fn new(kind: ModelKind, update: UpdateAlgorithm, precision: PrecisionConfig) -> Self {
        Self {
            kind,
            update,
            precision,
            constraints: Vec::new(),
            resources: HashMap::new(),
            actions: BTreeMap::new(),
            completed: Vec::new(),
            dirty: false,
        }
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn update_algorithm(&self) -> UpdateAlgorithm {
        self.update
    }

    /// Adds a constraint; when `owner` is given it is bound to that resource.
    pub fn add_constraint(
        &mut self,
        owner: Option<&ResourceKey>,
        name: impl Into<String>,
        capacity: f64,
        policy: SharingPolicy,
    ) -> ConstraintId {
        let id = ConstraintId(self.constraints.len());
        self.constraints.push(Constraint {
            name: name.into(),
            capacity,
            scale: 1.0,
            policy,
            on: true,
        });
        if let Some(owner) = owner {
            self.resources.entry(owner.clone()).or_default().push(id);
        }
        id
    }

    /// Constraints bound to `key`, in creation order.
    pub fn constraints_of(&self, key: &ResourceKey) -> Result<&[ConstraintId], ModelError> {
        self.resources
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| ModelError::UnknownResource {
                model: self.kind,
                resource: key.clone(),
            })
    }

    pub fn constraint(&self, id: ConstraintId) -> Option<&Constraint> {
        self.constraints.get(id.0)
    }

    /// Admits an action. It fails right away if a constraint it uses is off.
    pub fn admit(&mut self, spec: ActionSpec) -> ActionId {
        let id = ActionId::next();
        let unavailable = spec.usages.iter().any(|&(constraint, _)| {
            self.constraints
                .get(constraint.0)
                .is_none_or(|constraint| !constraint.on)
        });

        if unavailable {
            tracing::debug!("{} admitted on an unavailable resource, failing", id);
            self.completed.push((id, ActionOutcome::Failed));
            return id;
        }

        let latency = if spec.latency > self.precision.timing {
            spec.latency
        } else {
            0.0
        };
        self.actions.insert(
            id,
            Action {
                cost: spec.cost,
                remaining: spec.cost.max(0.0),
                latency,
                rate: 0.0,
                penalty: spec.penalty,
                bound: spec.bound,
                scaled_bound: spec.scaled_bound,
                usages: spec.usages,
            },
        );
        self.dirty = true;
        id
    }

    pub fn remaining(&self, id: ActionId) -> Option<f64> {
        self.actions.get(&id).map(|action| action.remaining)
    }

    /// Current rate of an action, once the sharing system is solved.
    pub fn rate(&self, id: ActionId) -> Option<f64> {
        self.actions.get(&id).map(|action| action.rate)
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Withdraws an action; returns false if it was not running.
    pub fn cancel(&mut self, id: ActionId) -> bool {
        let removed = self.actions.remove(&id).is_some();
        self.completed.retain(|(completed, _)| *completed != id);
        if removed {
            self.dirty = true;
        }
        removed
    }

    /// Recomputes every action's rate if the algorithm requires it.
    pub fn share_resources(&mut self) {
        if !self.dirty && self.update != UpdateAlgorithm::Full {
            return;
        }

        let constraints: Vec<ConstraintInput> = self
            .constraints
            .iter()
            .map(|constraint| ConstraintInput {
                capacity: constraint.effective_capacity(),
                policy: constraint.policy,
            })
            .collect();

        let sharing: Vec<ActionId> = self
            .actions
            .iter()
            .filter(|(_, action)| action.latency <= 0.0)
            .map(|(id, _)| *id)
            .collect();

        let variables: Vec<VariableInput> = sharing
            .iter()
            .filter_map(|id| self.actions.get(id))
            .map(|action| {
                let scaled = action.scaled_bound.map_or(f64::INFINITY, |(constraint, bound)| {
                    bound * self.constraints[constraint.0].scale
                });
                VariableInput {
                    penalty: action.penalty,
                    bound: action.bound.min(scaled),
                    usages: action
                        .usages
                        .iter()
                        .map(|&(constraint, coefficient)| (constraint.0, coefficient))
                        .collect(),
                }
            })
            .collect();

        let rates = sharing::solve_max_min(&constraints, &variables);

        for action in self.actions.values_mut() {
            action.rate = 0.0;
        }
        for (id, rate) in sharing.iter().zip(rates) {
            if let Some(action) = self.actions.get_mut(id) {
                action.rate = rate;
            }
        }
        self.dirty = false;
    }

    /// Delay until the next action completes or leaves its latency phase.
    pub fn next_occurring_event(&mut self) -> Option<f64> {
        self.share_resources();

        self.actions
            .values()
            .filter_map(|action| {
                if action.latency > 0.0 {
                    Some(action.latency)
                } else if action.rate == f64::INFINITY {
                    Some(0.0)
                } else if action.rate > 0.0 {
                    Some(action.remaining / action.rate)
                } else {
                    None
                }
            })
            .min_by(f64::total_cmp)
    }

    /// Consumes `delta` seconds of progress on every action.
    pub fn update_actions_state(&mut self, delta: f64) {
        let timing = self.precision.timing;
        let mut latency_ended = false;

        for action in self.actions.values_mut() {
            let mut elapsed = delta;
            if action.latency > 0.0 {
                let consumed = action.latency.min(elapsed);
                action.latency -= consumed;
                elapsed -= consumed;
                if action.latency <= timing {
                    action.latency = 0.0;
                    latency_ended = true;
                }
            }
            if elapsed > 0.0 && action.rate > 0.0 {
                action.remaining = (action.remaining - action.rate * elapsed).max(0.0);
            }
        }

        if latency_ended {
            self.dirty = true;
        }
    }

    fn is_done(&self, action: &Action) -> bool {
        if action.latency > 0.0 {
            return false;
        }
        let work_tolerance = self.precision.work_amount * action.cost.max(1.0);
        action.remaining <= work_tolerance
            || action.rate == f64::INFINITY
            || (action.rate > 0.0 && action.remaining / action.rate <= self.precision.timing)
    }

    /// Removes finished and failed actions, in completion order.
    pub fn take_completed(&mut self) -> Vec<(ActionId, ActionOutcome)> {
        self.share_resources();

        let done: Vec<ActionId> = self
            .actions
            .iter()
            .filter(|(_, action)| self.is_done(action))
            .map(|(id, _)| *id)
            .collect();

        for id in done {
            self.actions.remove(&id);
            self.completed.push((id, ActionOutcome::Finished));
            self.dirty = true;
        }

        std::mem::take(&mut self.completed)
    }

    /// Turns every constraint of `key` on or off; off fails the actions using them.
    pub fn set_resource_state(&mut self, key: &ResourceKey, on: bool) {
        let Some(constraints) = self.resources.get(key).cloned() else {
            return;
        };

        for constraint in &constraints {
            self.constraints[constraint.0].on = on;
        }

        if !on {
            let failed: Vec<ActionId> = self
                .actions
                .iter()
                .filter(|(_, action)| constraints.iter().any(|c| action.uses(*c)))
                .map(|(id, _)| *id)
                .collect();
            for id in failed {
                self.actions.remove(&id);
                self.completed.push((id, ActionOutcome::Failed));
            }
        }
        self.dirty = true;
    }

    /// Scales the capacity of every constraint of `key`.
    pub fn set_resource_scale(&mut self, key: &ResourceKey, scale: f64) {
        let Some(constraints) = self.resources.get(key) else {
            return;
        };
        for constraint in constraints {
            self.constraints[constraint.0].scale = scale.max(0.0);
        }
        self.dirty = true;
    }

    /// Drops every action and constraint.
    pub fn clear(&mut self) {
        self.actions.clear();
        self.completed.clear();
        self.resources.clear();
        self.constraints.clear();
        self.dirty = false;
    }
}

/// A pluggable model for one resource kind.
///
/// Implementations create their constraints when resources are attached and
/// translate [`Demand`]s into actions; the provided methods drive the shared
/// [`ModelCore`].
pub trait ResourceModel {
    fn kind(&self) -> ModelKind;

    /// Catalog name of this variant.
    fn variant(&self) -> &'static str;

    fn core(&self) -> &ModelCore;

    fn core_mut(&mut self) -> &mut ModelCore;

    fn attach_host(&mut self, _host: &Host) {}

    fn attach_link(&mut self, _link: &Link) {}

    fn attach_disk(&mut self, _disk: &Disk) {}

    fn attach_storage(&mut self, _storage: &Storage) {}

    /// Whether this model handles `demand`.
    fn accepts(&self, demand: &Demand) -> bool;

    /// Host models that also handle executions and transfers themselves.
    fn owns_network_and_cpu(&self) -> bool {
        false
    }

    /// Creates the action(s) consuming resources for `demand`.
    ///
    /// # Errors
    ///
    /// - `ModelError::UnknownResource` - A resource of the demand was never attached
    /// - `ModelError::InvalidDemand` - Negative amounts or malformed matrices
    fn admit(&mut self, demand: &Demand) -> Result<ActionId, ModelError>;

    fn next_occurring_event(&mut self) -> Option<f64> {
        self.core_mut().next_occurring_event()
    }

    fn update_actions_state(&mut self, delta: f64) {
        self.core_mut().update_actions_state(delta);
    }

    fn take_completed(&mut self) -> Vec<(ActionId, ActionOutcome)> {
        self.core_mut().take_completed()
    }

    fn cancel_action(&mut self, id: ActionId) -> bool {
        self.core_mut().cancel(id)
    }

    fn remaining(&self, id: ActionId) -> Option<f64> {
        self.core().remaining(id)
    }

    fn set_resource_state(&mut self, key: &ResourceKey, on: bool) {
        self.core_mut().set_resource_state(key, on);
    }

    fn set_resource_scale(&mut self, key: &ResourceKey, scale: f64) {
        self.core_mut().set_resource_scale(key, scale);
    }

    fn action_count(&self) -> usize {
        self.core().action_count()
    }
}

impl fmt::Debug for dyn ResourceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceModel")
            .field("kind", &self.kind())
            .field("variant", &self.variant())
            .field("actions", &self.action_count())
            .finish()
    }
}

pub(crate) fn check_amount(what: &str, amount: f64) -> Result<(), ModelError> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(())
    } else {
        Err(ModelError::InvalidDemand {
            reason: format!("{what} must be a finite non-negative amount, got {amount}"),
        })
    }
}

/// Instantiates the configured models in engine order.
///
/// `ptask_L07` replaces the separate network and CPU models with a single
/// host model owning both kinds of constraints.
///
/// # Errors
///
/// - `ConfigurationError` - A selected model is unknown or unavailable in this build
pub fn build_models(
    config: &SimkernConfig,
) -> Result<Vec<Box<dyn ResourceModel>>, crate::config::ConfigurationError> {
    use catalog::{ModelCategory, find_model_description};

    let select = |category: ModelCategory, name: &str| {
        find_model_description(category.as_str(), category.catalog(), name)
            .and_then(|description| description.instantiate(config))
    };

    let host = select(ModelCategory::Host, &config.models.host)?;
    let mut models = Vec::with_capacity(5);

    if host.owns_network_and_cpu() {
        tracing::debug!(
            "Host model '{}' owns the network and CPU constraints",
            host.variant()
        );
        models.push(host);
    } else {
        models.push(select(ModelCategory::Network, &config.models.network)?);
        models.push(select(ModelCategory::Cpu, &config.models.cpu)?);
        models.push(host);
    }
    models.push(select(ModelCategory::Disk, &config.models.disk)?);
    models.push(select(ModelCategory::Storage, &config.models.storage)?);

    tracing::info!(
        "Resource models: {}",
        models
            .iter()
            .map(|model| format!("{}={}", model.kind(), model.variant()))
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(models)
}
