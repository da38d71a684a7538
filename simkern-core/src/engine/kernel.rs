//! Engine state shared by the run loop, activities and actors.
//!
//! One kernel per thread, reachable through [`Kernel::current`]. Everything
//! but activity cells lives behind `RefCell`s; borrows are kept to single
//! statements so that user code (actor bodies, signal handlers, timer
//! callbacks) never runs while one is held.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use super::EngineError;
use super::clock::{DeterministicRng, SimClock};
use super::events::{EventQueue, TimerId};
use crate::activity::{ActivityCell, ActivityError, ActivityState, Request};
use crate::actor::{ActorCode, ActorContext, ActorId, ActorInfo, ActorLaunch, FunctionRegistry, Scheduler};
use crate::config::{ConfigurationError, SimkernConfig};
use crate::mailbox::{MailboxQueue, Side};
use crate::model::{ActionId, Demand, ResourceModel, build_models};
use crate::platform::profile::{ProfileAttribute, ProfileCursor};
use crate::platform::{NetZone, PlatformError, PlatformState, ResourceKey, ResourceKind};
use crate::signal::EngineSignals;

thread_local! {
    static INSTANCE: RefCell<Option<Rc<Kernel>>> = const { RefCell::new(None) };
}

/// An action inside the model at index `model` of the engine's model list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ActionRef {
    pub model: usize,
    pub action: ActionId,
}

pub(crate) enum TimerEvent {
    Wake(ActorId),
    Callback(Box<dyn FnOnce()>),
}

impl fmt::Debug for TimerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerEvent::Wake(actor) => write!(f, "Wake({actor})"),
            TimerEvent::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Counters reported at the end of a run, cumulated over the engine's life.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RunStats {
    pub activities_finished: u64,
    pub activities_failed: u64,
    pub activities_canceled: u64,
    pub actors_created: u64,
    pub actors_failed: u64,
    pub iterations: u64,
}

pub(crate) struct Kernel {
    this: Weak<Kernel>,
    alive: Cell<bool>,
    pub running: Cell<bool>,
    pub config: RefCell<SimkernConfig>,
    pub clock: RefCell<SimClock>,
    pub rng: RefCell<DeterministicRng>,
    pub platform: RefCell<PlatformState>,
    platform_loaded: Cell<bool>,
    /// Network, CPU, host, disk, storage; the host model alone when it owns the first two
    pub models: RefCell<Vec<Box<dyn ResourceModel>>>,
    pub scheduler: RefCell<Scheduler>,
    pub functions: RefCell<FunctionRegistry>,
    pub mailboxes: RefCell<BTreeMap<String, MailboxQueue>>,
    /// Activity cells waiting on each action; both ends of a matched communication share one
    pub in_flight: RefCell<BTreeMap<ActionRef, Vec<Arc<ActivityCell>>>>,
    pub timers: RefCell<EventQueue<TimerEvent>>,
    pub profiles: RefCell<Vec<ProfileCursor>>,
    pub signals: EngineSignals,
    pub stats: Cell<RunStats>,
    current: Cell<Option<ActorId>>,
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("alive", &self.alive.get())
            .field("now", &self.now())
            .field("platform_loaded", &self.platform_loaded.get())
            .field("current", &self.current.get())
            .finish_non_exhaustive()
    }
}

impl Kernel {
    /// Creates this thread's kernel.
    ///
    /// # Errors
    ///
    /// - `EngineError::AlreadyInitialized` - A kernel is already live on this thread
    pub fn install(config: SimkernConfig) -> Result<Rc<Kernel>, EngineError> {
        INSTANCE.with(|instance| {
            let mut instance = instance.borrow_mut();
            if instance.is_some() {
                return Err(EngineError::AlreadyInitialized);
            }

            let seed = config.simulation.seed;
            let kernel = Rc::new_cyclic(|this| Kernel {
                this: this.clone(),
                alive: Cell::new(true),
                running: Cell::new(false),
                config: RefCell::new(config),
                clock: RefCell::new(SimClock::default()),
                rng: RefCell::new(DeterministicRng::from_seed(seed)),
                platform: RefCell::new(PlatformState::empty()),
                platform_loaded: Cell::new(false),
                models: RefCell::new(Vec::new()),
                scheduler: RefCell::new(Scheduler::default()),
                functions: RefCell::new(FunctionRegistry::default()),
                mailboxes: RefCell::new(BTreeMap::new()),
                in_flight: RefCell::new(BTreeMap::new()),
                timers: RefCell::new(EventQueue::default()),
                profiles: RefCell::new(Vec::new()),
                signals: EngineSignals::default(),
                stats: Cell::new(RunStats::default()),
                current: Cell::new(None),
            });
            *instance = Some(Rc::clone(&kernel));
            Ok(kernel)
        })
    }

    /// This thread's kernel, if one is live.
    ///
    /// Safe to call from destructors running during thread teardown.
    pub fn current() -> Option<Rc<Kernel>> {
        INSTANCE
            .try_with(|instance| {
                instance
                    .try_borrow()
                    .ok()
                    .and_then(|kernel| kernel.as_ref().map(Rc::clone))
            })
            .ok()
            .flatten()
    }

    /// Detaches this thread's kernel; the caller is expected to tear it down.
    pub fn uninstall() -> Option<Rc<Kernel>> {
        INSTANCE
            .try_with(|instance| instance.borrow_mut().take())
            .ok()
            .flatten()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }

    pub fn is_platform_loaded(&self) -> bool {
        self.platform_loaded.get()
    }

    pub fn now(&self) -> f64 {
        self.clock.borrow().now()
    }

    pub fn timing_precision(&self) -> f64 {
        self.config.borrow().precision.timing
    }

    /// Actor whose body is being polled right now.
    pub fn current_actor(&self) -> Option<ActorId> {
        self.current.get()
    }

    pub fn set_current_actor(&self, actor: Option<ActorId>) {
        self.current.set(actor);
    }

    pub fn actor_host(&self, actor: ActorId) -> Option<String> {
        self.scheduler
            .borrow()
            .info(actor)
            .map(|info| info.host.clone())
    }

    pub fn wake(&self, actor: ActorId) {
        self.scheduler.borrow_mut().make_ready(actor);
    }

    pub fn update_stats(&self, update: impl FnOnce(&mut RunStats)) {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }

    pub fn schedule_wake(&self, date: f64, actor: ActorId) -> TimerId {
        self.timers
            .borrow_mut()
            .schedule(date, TimerEvent::Wake(actor))
    }

    pub fn schedule_callback(&self, date: f64, callback: Box<dyn FnOnce()>) -> TimerId {
        self.timers
            .borrow_mut()
            .schedule(date, TimerEvent::Callback(callback))
    }

    pub fn cancel_timer(&self, timer: TimerId) {
        if let Ok(mut timers) = self.timers.try_borrow_mut() {
            timers.cancel(timer);
        }
    }

    /// Applies a configuration item before the platform exists.
    ///
    /// # Errors
    ///
    /// - `ConfigurationError::PlatformAlreadyCreated` - Models are already instantiated
    /// - See [`SimkernConfig::set`]
    pub fn set_config(&self, item: &str) -> Result<(), ConfigurationError> {
        if self.platform_loaded.get() {
            return Err(ConfigurationError::PlatformAlreadyCreated {
                item: item.to_string(),
            });
        }
        self.config.borrow_mut().set(item)
    }

    /// Instantiates the models, realizes `zone` and attaches every resource.
    ///
    /// # Errors
    ///
    /// - `EngineError::PlatformAlreadyLoaded` - Called twice
    /// - `EngineError::Configuration` - A selected model cannot be built
    /// - `EngineError::Platform` - The topology is inconsistent
    pub fn load_platform(&self, zone: NetZone) -> Result<(), EngineError> {
        if self.platform_loaded.get() {
            return Err(EngineError::PlatformAlreadyLoaded);
        }
        self.signals.platform_creation.emit(&());

        let config = self.config.borrow().clone();
        let mut models = build_models(&config)?;
        let state = PlatformState::realize(zone)?;

        let hosts = state.hosts.all();
        let links = state.links.all();
        let disks = state.disks.all();
        let storages = state.storages.all();
        for model in models.iter_mut() {
            hosts.iter().for_each(|host| model.attach_host(host));
            links.iter().for_each(|link| model.attach_link(link));
            disks.iter().for_each(|disk| model.attach_disk(disk));
            storages.iter().for_each(|storage| model.attach_storage(storage));
        }

        *self.profiles.borrow_mut() = state.profile_cursors();
        *self.platform.borrow_mut() = state;
        *self.models.borrow_mut() = models;
        *self.rng.borrow_mut() = DeterministicRng::from_seed(config.simulation.seed);
        self.platform_loaded.set(true);

        tracing::info!(
            "Platform created: {} hosts, {} links",
            hosts.len(),
            links.len()
        );
        self.signals.platform_created.emit(&());
        Ok(())
    }

    /// Creates an actor running `code` on `host`; it runs at the next scheduling round.
    ///
    /// # Errors
    ///
    /// - `EngineError::NoPlatform` - No platform loaded yet
    /// - `EngineError::UnknownHost` - No such host
    /// - `EngineError::HostOff` - The host is turned off
    pub fn spawn_actor(
        &self,
        name: &str,
        host: &str,
        code: ActorCode,
        args: Vec<String>,
    ) -> Result<ActorId, EngineError> {
        if !self.platform_loaded.get() {
            return Err(EngineError::NoPlatform);
        }
        {
            let platform = self.platform.borrow();
            if !platform.hosts.contains(host) {
                return Err(EngineError::UnknownHost {
                    name: host.to_string(),
                });
            }
            if !platform.is_on(&ResourceKey::new(ResourceKind::Host, host)) {
                return Err(EngineError::HostOff {
                    name: host.to_string(),
                });
            }
        }

        let id = self.scheduler.borrow_mut().allocate_id();
        let future = code.call(ActorContext::new(self.this.clone(), id, name, host), args);
        let info = ActorInfo {
            id,
            name: name.to_string(),
            host: host.to_string(),
            daemon: false,
        };
        self.scheduler.borrow_mut().insert(info, future);
        self.update_stats(|stats| stats.actors_created += 1);

        tracing::debug!("Actor '{}' ({}) created on '{}'", name, id, host);
        Ok(id)
    }

    /// Resolves a deployment line against the function table and spawns it.
    ///
    /// # Errors
    ///
    /// - `EngineError::UnknownFunction` - No such function and no default entry point
    /// - See [`Kernel::spawn_actor`]
    pub fn launch(&self, launch: &ActorLaunch) -> Result<ActorId, EngineError> {
        let code = self
            .functions
            .borrow()
            .resolve(&launch.function)
            .ok_or_else(|| EngineError::UnknownFunction {
                name: launch.function.clone(),
            })?;
        self.spawn_actor(&launch.name, &launch.host, code, launch.args.clone())
    }

    /// Kills `actor` and cancels what it owns; false if it is not alive.
    pub fn kill_actor(&self, actor: ActorId) -> bool {
        let killed = self.scheduler.borrow_mut().kill(actor);
        let Some(future) = killed else {
            return false;
        };
        drop(future);
        self.cancel_owned(actor);

        tracing::debug!("{} killed at {}", actor, self.now());
        true
    }

    fn cancel_owned(&self, actor: ActorId) {
        let mut owned: Vec<Arc<ActivityCell>> = self
            .in_flight
            .borrow()
            .values()
            .flatten()
            .filter(|cell| cell.owner() == Some(actor))
            .cloned()
            .collect();
        owned.extend(
            self.mailboxes
                .borrow()
                .values()
                .flat_map(MailboxQueue::cells)
                .filter(|cell| cell.owner() == Some(actor))
                .cloned(),
        );

        for cell in owned {
            self.cancel_activity(&cell);
        }
    }

    /// Admits the work behind `request` and marks `cell` started.
    ///
    /// # Errors
    ///
    /// See [`ActivityCell::start`].
    pub fn start_activity(
        &self,
        cell: &Arc<ActivityCell>,
        request: Request,
    ) -> Result<(), ActivityError> {
        if !self.platform_loaded.get() {
            return Err(ActivityError::Unsupported {
                reason: "no platform is loaded".to_string(),
            });
        }
        let owner = self.current_actor();
        let owner_host = owner.and_then(|actor| self.actor_host(actor));

        let (host, demand) = match request {
            Request::Exec {
                host,
                flops,
                priority,
                bound,
            } => {
                let host = host.or(owner_host).ok_or(ActivityError::NotInActor)?;
                let demand = Demand::Execute {
                    host: host.clone(),
                    flops,
                    priority,
                    bound,
                };
                (host, demand)
            }
            Request::ParallelExec {
                hosts,
                flops,
                bytes,
                rate,
            } => {
                let routes = self.parallel_routes(&hosts, &bytes)?;
                let host = hosts.first().cloned().unwrap_or_default();
                let demand = Demand::Parallel {
                    hosts,
                    flops,
                    bytes,
                    routes,
                    rate,
                };
                (host, demand)
            }
            Request::Transfer {
                src,
                dst,
                bytes,
                rate,
            } => {
                let route = self.platform.borrow().route(&src, &dst)?;
                let demand = Demand::Transfer {
                    src: src.clone(),
                    dst,
                    bytes,
                    route,
                    rate,
                };
                (src, demand)
            }
            Request::MailboxPut { mailbox, .. } => {
                return self.post(cell, owner, owner_host, mailbox, Side::Sender);
            }
            Request::MailboxGet { mailbox } => {
                return self.post(cell, owner, owner_host, mailbox, Side::Receiver);
            }
            Request::Io { target, op, bytes } => {
                let host = self.device_host(&target)?;
                (host, Demand::Io { target, op, bytes })
            }
        };

        let action = self.admit(&demand)?;
        {
            let mut inner = cell.lock();
            inner.state = ActivityState::Started;
            inner.owner = owner;
            inner.host = Some(host);
            inner.action = Some(action);
        }
        self.in_flight
            .borrow_mut()
            .entry(action)
            .or_default()
            .push(Arc::clone(cell));
        Ok(())
    }

    fn parallel_routes(
        &self,
        hosts: &[String],
        bytes: &[f64],
    ) -> Result<Vec<Vec<Arc<crate::platform::Link>>>, PlatformError> {
        let platform = self.platform.borrow();
        let mut routes = Vec::with_capacity(hosts.len() * hosts.len());
        for (index, src) in hosts.iter().enumerate() {
            for (offset, dst) in hosts.iter().enumerate() {
                let amount = bytes.get(index * hosts.len() + offset).copied().unwrap_or(0.0);
                if amount > 0.0 {
                    routes.push(platform.route(src, dst)?);
                } else {
                    routes.push(Vec::new());
                }
            }
        }
        Ok(routes)
    }

    fn device_host(&self, target: &ResourceKey) -> Result<String, PlatformError> {
        let platform = self.platform.borrow();
        platform.ensure_exists(target)?;
        let host = match target.kind {
            ResourceKind::Disk => platform
                .disks
                .by_name_or_null(&target.name)
                .map(|disk| disk.host().to_string()),
            ResourceKind::Storage => platform
                .storages
                .by_name_or_null(&target.name)
                .map(|storage| storage.host().to_string()),
            ResourceKind::Host | ResourceKind::Link => Some(target.name.clone()),
        };
        Ok(host.unwrap_or_default())
    }

    /// Hands `demand` to the first model accepting it, in engine order.
    fn admit(&self, demand: &Demand) -> Result<ActionRef, ActivityError> {
        let mut models = self.models.borrow_mut();
        let (model, handler) = models
            .iter_mut()
            .enumerate()
            .find(|(_, model)| model.accepts(demand))
            .ok_or_else(|| ActivityError::Unsupported {
                reason: match demand {
                    Demand::Parallel { .. } => {
                        "parallel tasks need a host model owning the network and CPUs (ptask_L07)"
                            .to_string()
                    }
                    _ => "no active model handles this request".to_string(),
                },
            })?;
        let action = handler.admit(demand)?;
        Ok(ActionRef { model, action })
    }

    fn post(
        &self,
        cell: &Arc<ActivityCell>,
        owner: Option<ActorId>,
        host: Option<String>,
        mailbox: String,
        side: Side,
    ) -> Result<(), ActivityError> {
        let owner = owner.ok_or(ActivityError::NotInActor)?;
        let host = host.ok_or(ActivityError::NotInActor)?;
        {
            let mut inner = cell.lock();
            inner.state = ActivityState::Started;
            inner.owner = Some(owner);
            inner.host = Some(host);
        }

        let peer = self
            .mailboxes
            .borrow_mut()
            .entry(mailbox)
            .or_default()
            .post(Arc::clone(cell), side);
        match (peer, side) {
            (None, _) => Ok(()),
            (Some(receiver), Side::Sender) => self.connect(cell, &receiver),
            (Some(sender), Side::Receiver) => self.connect(&sender, cell),
        }
    }

    /// Starts the transfer of a matched mailbox pair.
    fn connect(
        &self,
        sender: &Arc<ActivityCell>,
        receiver: &Arc<ActivityCell>,
    ) -> Result<(), ActivityError> {
        let (src, bytes, rate) = {
            let inner = sender.lock();
            let (bytes, rate) = match inner.request {
                Request::MailboxPut { bytes, rate, .. } => (bytes, rate),
                _ => (inner.total, None),
            };
            (inner.host.clone().unwrap_or_default(), bytes, rate)
        };
        let dst = receiver.lock().host.clone().unwrap_or_default();

        let route = self.platform.borrow().route(&src, &dst);
        let admitted = route.map_err(ActivityError::from).and_then(|route| {
            self.admit(&Demand::Transfer {
                src: src.clone(),
                dst: dst.clone(),
                bytes,
                route,
                rate,
            })
        });
        let action = match admitted {
            Ok(action) => action,
            Err(error) => {
                self.terminate(sender, ActivityState::Failed);
                self.terminate(receiver, ActivityState::Failed);
                return Err(error);
            }
        };

        let payload = sender.take_payload();
        {
            let mut inner = receiver.lock();
            inner.payload = payload;
            inner.total = bytes;
            inner.remaining = bytes;
            inner.action = Some(action);
            inner.peer = Some(Arc::downgrade(sender));
        }
        {
            let mut inner = sender.lock();
            inner.action = Some(action);
            inner.peer = Some(Arc::downgrade(receiver));
        }
        self.in_flight
            .borrow_mut()
            .insert(action, vec![Arc::clone(sender), Arc::clone(receiver)]);

        tracing::debug!(
            "{} matched {}: {} bytes from '{}' to '{}'",
            sender.id(),
            receiver.id(),
            bytes,
            src,
            dst
        );
        Ok(())
    }

    /// Moves `cell` to a terminal state and wakes its waiters.
    pub fn terminate(&self, cell: &ActivityCell, state: ActivityState) {
        if cell.state().is_terminal() {
            return;
        }
        let waiters = cell.finish(state);
        self.update_stats(|stats| match state {
            ActivityState::Finished => stats.activities_finished += 1,
            ActivityState::Failed => stats.activities_failed += 1,
            ActivityState::Canceled => stats.activities_canceled += 1,
            ActivityState::Inited | ActivityState::Started => {}
        });
        for actor in waiters {
            self.wake(actor);
        }
        tracing::debug!("{} {} at {}", cell.id(), state, self.now());
    }

    /// Cancels `cell`; the other end of a matched communication fails.
    pub fn cancel_activity(&self, cell: &Arc<ActivityCell>) {
        let (state, action, peer, mailbox) = {
            let inner = cell.lock();
            let mailbox = match &inner.request {
                Request::MailboxPut { mailbox, .. } | Request::MailboxGet { mailbox } => {
                    Some(mailbox.clone())
                }
                _ => None,
            };
            (inner.state, inner.action, inner.peer.clone(), mailbox)
        };
        if state.is_terminal() {
            return;
        }

        if let Some(action) = action {
            cell.remaining();
            self.withdraw(action);
        } else if let Some(mailbox) = mailbox
            && let Some(queue) = self.mailboxes.borrow_mut().get_mut(&mailbox)
        {
            queue.remove(cell);
        }

        self.terminate(cell, ActivityState::Canceled);
        if let Some(peer) = peer.and_then(|peer| peer.upgrade()) {
            self.terminate(&peer, ActivityState::Failed);
        }
    }

    fn withdraw(&self, action: ActionRef) {
        if let Some(model) = self.models.borrow_mut().get_mut(action.model) {
            model.cancel_action(action.action);
        }
        let cells = self.in_flight.borrow_mut().remove(&action);
        drop(cells);
    }

    pub fn action_remaining(&self, action: ActionRef) -> Option<f64> {
        self.models
            .try_borrow()
            .ok()?
            .get(action.model)?
            .remaining(action.action)
    }

    /// Records the remaining work of every in-flight activity.
    fn snapshot_remaining(&self) {
        let cells: Vec<Arc<ActivityCell>> =
            self.in_flight.borrow().values().flatten().cloned().collect();
        for cell in cells {
            cell.remaining();
        }
    }

    /// Transitions every activity whose action left its model.
    ///
    /// Returns whether anything completed.
    pub fn process_completions(&self) -> bool {
        let completed: Vec<_> = self
            .models
            .borrow_mut()
            .iter_mut()
            .enumerate()
            .flat_map(|(model, handler)| {
                handler
                    .take_completed()
                    .into_iter()
                    .map(move |(action, outcome)| (ActionRef { model, action }, outcome))
            })
            .collect();

        for (action, outcome) in &completed {
            let cells = self.in_flight.borrow_mut().remove(action);
            tracing::debug!("{} {:?} at {}", action.action, outcome, self.now());
            for cell in cells.unwrap_or_default() {
                self.terminate(&cell, outcome.activity_state());
            }
        }
        !completed.is_empty()
    }

    /// Turns a resource on or off; returns false if it already was.
    ///
    /// Every action using a resource turned off fails; a host turned off also
    /// kills the actors it runs.
    ///
    /// # Errors
    ///
    /// - `PlatformError::Registry` - No such resource
    pub fn set_resource_state(&self, key: &ResourceKey, on: bool) -> Result<bool, PlatformError> {
        self.platform.borrow().ensure_exists(key)?;
        if !self.platform.borrow_mut().set_on(key, on) {
            return Ok(false);
        }
        tracing::info!(
            "{} turned {} at {}",
            key,
            if on { "on" } else { "off" },
            self.now()
        );

        self.snapshot_remaining();
        for model in self.models.borrow_mut().iter_mut() {
            model.set_resource_state(key, on);
        }
        // Failed activities are reported as such before their owners die.
        self.process_completions();

        if !on && key.kind == ResourceKind::Host {
            let victims = self.scheduler.borrow().actors_on_host(&key.name);
            for actor in victims {
                self.kill_actor(actor);
            }
        }
        Ok(true)
    }

    /// Turns a resource off for good and removes it from its registry.
    ///
    /// Destroying a host also destroys the disks and storages attached to it.
    pub fn destroy_resource(&self, key: &ResourceKey) -> Result<(), PlatformError> {
        self.platform.borrow().ensure_exists(key)?;
        let mut doomed = if key.kind == ResourceKind::Host {
            self.platform.borrow().devices_of(&key.name)
        } else {
            Vec::new()
        };
        doomed.push(key.clone());

        for target in &doomed {
            self.set_resource_state(target, false)?;
            self.platform.borrow_mut().unregister(target)?;
            self.profiles
                .borrow_mut()
                .retain(|cursor| cursor.target != *target);
            tracing::info!("{} destroyed at {}", target, self.now());
        }
        Ok(())
    }

    /// Scales the capacity of a resource, as replayed from its profile.
    pub fn set_resource_scale(&self, key: &ResourceKey, scale: f64) {
        self.snapshot_remaining();
        for model in self.models.borrow_mut().iter_mut() {
            model.set_resource_scale(key, scale);
        }
        tracing::debug!("{} scaled to {} at {}", key, scale, self.now());
    }

    /// Applies every profile event due at the current date.
    ///
    /// Returns whether any event was replayed.
    pub fn replay_profiles(&self) -> bool {
        let horizon = self.now() + self.timing_precision();
        let mut due = Vec::new();
        for cursor in self.profiles.borrow_mut().iter_mut() {
            while cursor.next_date().is_some_and(|date| date <= horizon) {
                if let Some(value) = cursor.advance() {
                    due.push((cursor.target.clone(), cursor.attribute, value));
                }
            }
        }

        for (target, attribute, value) in &due {
            match attribute {
                ProfileAttribute::Scale => self.set_resource_scale(target, *value),
                ProfileAttribute::State => {
                    if let Err(error) = self.set_resource_state(target, *value > 0.0) {
                        tracing::warn!("Cannot replay state event on {}: {}", target, error);
                    }
                }
            }
        }
        !due.is_empty()
    }

    /// Fires every timer due at the current date.
    ///
    /// Returns whether any timer fired.
    pub fn fire_timers(&self) -> bool {
        let horizon = self.now() + self.timing_precision();
        let mut fired = false;
        loop {
            let event = self.timers.borrow_mut().pop_due(horizon);
            let Some(event) = event else {
                break;
            };
            fired = true;
            match event {
                TimerEvent::Wake(actor) => self.wake(actor),
                TimerEvent::Callback(callback) => callback(),
            }
        }
        fired
    }

    /// Releases every actor, activity, model and resource, and resets the clock.
    pub fn teardown(&self) {
        self.alive.set(false);

        let futures = self.scheduler.borrow_mut().clear();
        drop(futures);
        let timers = std::mem::take(&mut *self.timers.borrow_mut());
        drop(timers);

        self.mailboxes.borrow_mut().clear();
        self.in_flight.borrow_mut().clear();
        self.profiles.borrow_mut().clear();
        self.functions.borrow_mut().clear();

        // Resources first, then the models attached to them.
        self.platform.borrow_mut().clear();
        let mut models = std::mem::take(&mut *self.models.borrow_mut());
        for model in models.iter_mut() {
            model.core_mut().clear();
        }
        drop(models);

        self.signals.clear();
        self.clock.borrow_mut().reset();
        self.stats.set(RunStats::default());
        self.platform_loaded.set(false);
        self.current.set(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_instance_per_thread() {
        assert!(Kernel::current().is_none());
        let kernel = Kernel::install(SimkernConfig::default()).unwrap();
        assert!(matches!(
            Kernel::install(SimkernConfig::default()),
            Err(EngineError::AlreadyInitialized)
        ));
        assert!(Rc::ptr_eq(&Kernel::current().unwrap(), &kernel));

        let detached = Kernel::uninstall().unwrap();
        detached.teardown();
        assert!(!detached.is_alive());
        assert!(Kernel::current().is_none());
    }

    #[test]
    fn test_timers_fire_in_date_order() {
        let kernel = Kernel::install(SimkernConfig::default()).unwrap();
        let fired = Rc::new(RefCell::new(Vec::new()));
        for (date, label) in [(2.0, "late"), (0.0, "now"), (0.0, "now-too")] {
            let fired = Rc::clone(&fired);
            kernel.schedule_callback(date, Box::new(move || fired.borrow_mut().push(label)));
        }

        assert!(kernel.fire_timers());
        assert_eq!(*fired.borrow(), vec!["now", "now-too"]);
        assert!(!kernel.fire_timers());

        if let Some(kernel) = Kernel::uninstall() {
            kernel.teardown();
        }
    }

    #[test]
    fn test_spawn_requires_platform() {
        let kernel = Kernel::install(SimkernConfig::default()).unwrap();
        let code = ActorCode::from_fn(|_ctx| async { Ok(()) });
        assert!(matches!(
            kernel.spawn_actor("a", "alice", code, Vec::new()),
            Err(EngineError::NoPlatform)
        ));

        if let Some(kernel) = Kernel::uninstall() {
            kernel.teardown();
        }
    }
}
