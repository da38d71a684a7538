//! The simulation engine.
//!
//! [`Engine`] is a handle on this thread's single kernel. It is created once,
//! fed a platform and actors, run, then shut down; a new engine can be built
//! afterwards. Every handle becomes inert after [`Engine::shutdown`].
//!
//! # Lifecycle
//!
//! 1. `Engine::new()` / `with_config()` / `from_args()`
//! 2. `set_config("key:value")` for anything not given at construction
//! 3. `load_platform(zone)` instantiates the models and the resources
//! 4. `register_function` + `load_deployment`, or `create_actor`
//! 5. `run()` / `run_until(date)`, possibly several times
//! 6. `Engine::shutdown()`

pub(crate) mod clock;
pub(crate) mod events;
pub(crate) mod kernel;
mod run_loop;

#[cfg(test)]
mod tests;

use std::rc::Rc;
use std::sync::Arc;

pub use run_loop::{RunOutcome, SimulationReport};

use crate::actor::{ActorCode, ActorId, ActorInfo, ActorLaunch};
use crate::config::{ConfigurationError, SimkernConfig};
use crate::platform::{
    Disk, Host, Link, NetPoint, NetZone, PlatformError, ResourceKey, ResourceKind, RoutingKind,
    Storage,
};
use crate::registry::RegistryError;
use crate::signal::SignalBusy;
use kernel::Kernel;

/// Errors of the engine lifecycle, the run loop and actor creation.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("An engine is already running on this thread")]
    AlreadyInitialized,

    #[error("The engine was shut down")]
    ShutDown,

    #[error("A platform is already loaded")]
    PlatformAlreadyLoaded,

    #[error("No platform loaded")]
    NoPlatform,

    #[error("The simulation is already running")]
    AlreadyRunning,

    #[error("Cannot move the clock back from {now} to {target}")]
    ClockBackwards { now: f64, target: f64 },

    #[error("No function '{name}' registered and no default entry point")]
    UnknownFunction { name: String },

    #[error("Unknown host '{name}'")]
    UnknownHost { name: String },

    #[error("Host '{name}' is turned off")]
    HostOff { name: String },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    SignalBusy(#[from] SignalBusy),
}

/// Handle on this thread's simulation engine.
#[derive(Debug, Clone)]
pub struct Engine {
    kernel: Rc<Kernel>,
}

impl Engine {
    /// Creates the engine with defaults and `SIMKERN_CFG` overrides.
    ///
    /// # Errors
    ///
    /// - `EngineError::AlreadyInitialized` - An engine is live on this thread
    /// - `EngineError::Configuration` - `SIMKERN_CFG` holds an invalid item
    pub fn new() -> Result<Self, EngineError> {
        Self::with_config(SimkernConfig::from_env()?)
    }

    /// Creates the engine from an explicit configuration.
    ///
    /// # Errors
    ///
    /// - `EngineError::AlreadyInitialized` - An engine is live on this thread
    pub fn with_config(config: SimkernConfig) -> Result<Self, EngineError> {
        let kernel = Kernel::install(config)?;
        tracing::debug!("Engine created");
        Ok(Self { kernel })
    }

    /// Creates the engine, consuming `--cfg=key:value` items from `args`.
    ///
    /// # Errors
    ///
    /// See [`Engine::new`].
    pub fn from_args(args: &mut Vec<String>) -> Result<Self, EngineError> {
        let mut config = SimkernConfig::from_env()?;
        config.apply_args(args)?;
        Self::with_config(config)
    }

    /// This thread's engine, if one is live.
    pub fn get_instance() -> Option<Engine> {
        Kernel::current().map(|kernel| Engine { kernel })
    }

    pub fn is_initialized() -> bool {
        Kernel::current().is_some()
    }

    /// Destroys this thread's engine: actors, activities, resources, then
    /// models. The clock reads 0 again. No-op without an engine.
    pub fn shutdown() {
        if let Some(kernel) = Kernel::uninstall() {
            kernel.teardown();
            tracing::debug!("Engine shut down");
        }
    }

    /// Current simulated date; 0 without an engine.
    pub fn clock() -> f64 {
        Kernel::current().map_or(0.0, |kernel| kernel.now())
    }

    fn kernel(&self) -> Result<&Kernel, EngineError> {
        if self.kernel.is_alive() {
            Ok(&self.kernel)
        } else {
            Err(EngineError::ShutDown)
        }
    }

    pub fn now(&self) -> f64 {
        self.kernel.now()
    }

    pub fn config(&self) -> SimkernConfig {
        self.kernel.config.borrow().clone()
    }

    /// Applies a `key:value` configuration item.
    ///
    /// # Errors
    ///
    /// - `EngineError::Configuration` - Invalid item, or the platform already exists
    pub fn set_config(&self, item: &str) -> Result<(), EngineError> {
        self.kernel()?.set_config(item)?;
        Ok(())
    }

    /// Builds the selected models and the resources of `zone`.
    ///
    /// Fires `platform_creation` before and `platform_created` after.
    ///
    /// # Errors
    ///
    /// - `EngineError::PlatformAlreadyLoaded` - Called twice
    /// - `EngineError::Configuration` - A selected model is not available
    /// - `EngineError::Platform` - Inconsistent topology
    pub fn load_platform(&self, zone: NetZone) -> Result<(), EngineError> {
        self.kernel()?.load_platform(zone)
    }

    pub fn is_platform_loaded(&self) -> bool {
        self.kernel.is_platform_loaded()
    }

    /// Binds an entry point to `name` for deployments.
    pub fn register_function(&self, name: &str, code: ActorCode) {
        if self.kernel.functions.borrow_mut().register(name, code) {
            tracing::debug!("Function '{}' registered again", name);
        }
    }

    /// Entry point used for deployment lines naming an unregistered function.
    pub fn register_default(&self, code: ActorCode) {
        self.kernel.functions.borrow_mut().set_default(code);
    }

    /// Creates an actor running `code` on `host`.
    ///
    /// # Errors
    ///
    /// - `EngineError::NoPlatform` - No platform loaded
    /// - `EngineError::UnknownHost` / `HostOff` - Cannot run on `host`
    pub fn create_actor(&self, name: &str, host: &str, code: ActorCode) -> Result<ActorId, EngineError> {
        self.kernel()?.spawn_actor(name, host, code, Vec::new())
    }

    /// Creates an actor from a registered function.
    ///
    /// # Errors
    ///
    /// - `EngineError::UnknownFunction` - Neither `function` nor a default is registered
    /// - See [`Engine::create_actor`]
    pub fn create_actor_from_function(
        &self,
        name: &str,
        host: &str,
        function: &str,
        args: Vec<String>,
    ) -> Result<ActorId, EngineError> {
        let launch = ActorLaunch {
            name: name.to_string(),
            host: host.to_string(),
            function: function.to_string(),
            args,
        };
        self.kernel()?.launch(&launch)
    }

    /// Creates one actor per deployment line, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// See [`Engine::create_actor_from_function`].
    pub fn load_deployment(&self, launches: &[ActorLaunch]) -> Result<Vec<ActorId>, EngineError> {
        let kernel = self.kernel()?;
        let ids = launches
            .iter()
            .map(|launch| kernel.launch(launch))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::info!("Deployment loaded: {} actors", ids.len());
        Ok(ids)
    }

    /// Runs until every actor is gone or a deadlock is detected.
    ///
    /// # Errors
    ///
    /// - `EngineError::NoPlatform` - No platform loaded
    /// - `EngineError::AlreadyRunning` - Called from inside the simulation
    pub fn run(&self) -> Result<SimulationReport, EngineError> {
        self.kernel()?.run(None)
    }

    /// Like [`Engine::run`], stopping at `date` at the latest.
    ///
    /// # Errors
    ///
    /// - `EngineError::ClockBackwards` - `date` is in the past
    /// - See [`Engine::run`]
    pub fn run_until(&self, date: f64) -> Result<SimulationReport, EngineError> {
        let kernel = self.kernel()?;
        let now = kernel.now();
        if date < now {
            return Err(EngineError::ClockBackwards { now, target: date });
        }
        kernel.run(Some(date))
    }

    /// Calls `callback` when the clock reaches `date`.
    ///
    /// # Errors
    ///
    /// - `EngineError::ClockBackwards` - `date` is in the past
    pub fn add_timer<F>(&self, date: f64, callback: F) -> Result<(), EngineError>
    where
        F: FnOnce() + 'static,
    {
        let kernel = self.kernel()?;
        let now = kernel.now();
        if date < now {
            return Err(EngineError::ClockBackwards { now, target: date });
        }
        kernel.schedule_callback(date, Box::new(callback));
        Ok(())
    }

    fn set_state(&self, kind: ResourceKind, name: &str, on: bool) -> Result<(), EngineError> {
        self.kernel()?
            .set_resource_state(&ResourceKey::new(kind, name), on)?;
        Ok(())
    }

    /// Turns a host off: its actions fail and its actors are killed.
    ///
    /// # Errors
    ///
    /// - `EngineError::Platform` - No such host
    pub fn turn_off_host(&self, name: &str) -> Result<(), EngineError> {
        self.set_state(ResourceKind::Host, name, false)
    }

    /// # Errors
    ///
    /// - `EngineError::Platform` - No such host
    pub fn turn_on_host(&self, name: &str) -> Result<(), EngineError> {
        self.set_state(ResourceKind::Host, name, true)
    }

    /// Turns a link off: every communication crossing it fails.
    ///
    /// # Errors
    ///
    /// - `EngineError::Platform` - No such link
    pub fn turn_off_link(&self, name: &str) -> Result<(), EngineError> {
        self.set_state(ResourceKind::Link, name, false)
    }

    /// # Errors
    ///
    /// - `EngineError::Platform` - No such link
    pub fn turn_on_link(&self, name: &str) -> Result<(), EngineError> {
        self.set_state(ResourceKind::Link, name, true)
    }

    fn destroy(&self, kind: ResourceKind, name: &str) -> Result<(), EngineError> {
        self.kernel()?
            .destroy_resource(&ResourceKey::new(kind, name))?;
        Ok(())
    }

    /// Turns a host off and unregisters it, with its disks and storages.
    ///
    /// # Errors
    ///
    /// - `EngineError::Platform` - No such host
    pub fn destroy_host(&self, name: &str) -> Result<(), EngineError> {
        self.destroy(ResourceKind::Host, name)
    }

    /// Turns a link off and unregisters it; routes crossing it keep failing.
    ///
    /// # Errors
    ///
    /// - `EngineError::Platform` - No such link
    pub fn destroy_link(&self, name: &str) -> Result<(), EngineError> {
        self.destroy(ResourceKind::Link, name)
    }

    /// # Errors
    ///
    /// - `EngineError::Platform` - No such disk
    pub fn destroy_disk(&self, name: &str) -> Result<(), EngineError> {
        self.destroy(ResourceKind::Disk, name)
    }

    /// # Errors
    ///
    /// - `EngineError::Platform` - No such storage
    pub fn destroy_storage(&self, name: &str) -> Result<(), EngineError> {
        self.destroy(ResourceKind::Storage, name)
    }

    pub fn is_host_on(&self, name: &str) -> bool {
        self.is_on(ResourceKind::Host, name)
    }

    pub fn is_link_on(&self, name: &str) -> bool {
        self.is_on(ResourceKind::Link, name)
    }

    fn is_on(&self, kind: ResourceKind, name: &str) -> bool {
        let key = ResourceKey::new(kind, name);
        let platform = self.kernel.platform.borrow();
        platform.ensure_exists(&key).is_ok() && platform.is_on(&key)
    }

    /// # Errors
    ///
    /// - `EngineError::Registry` - No such host
    pub fn host_by_name(&self, name: &str) -> Result<Arc<Host>, EngineError> {
        Ok(self.kernel.platform.borrow().hosts.by_name(name)?)
    }

    pub fn host_by_name_or_null(&self, name: &str) -> Option<Arc<Host>> {
        self.kernel.platform.borrow().hosts.by_name_or_null(name)
    }

    pub fn host_count(&self) -> usize {
        self.kernel.platform.borrow().hosts.count()
    }

    pub fn all_hosts(&self) -> Vec<Arc<Host>> {
        self.kernel.platform.borrow().hosts.all()
    }

    pub fn filtered_hosts<F>(&self, predicate: F) -> Vec<Arc<Host>>
    where
        F: FnMut(&Host) -> bool,
    {
        self.kernel.platform.borrow().hosts.filtered(predicate)
    }

    /// # Errors
    ///
    /// - `EngineError::Registry` - No such link
    pub fn link_by_name(&self, name: &str) -> Result<Arc<Link>, EngineError> {
        Ok(self.kernel.platform.borrow().links.by_name(name)?)
    }

    pub fn link_by_name_or_null(&self, name: &str) -> Option<Arc<Link>> {
        self.kernel.platform.borrow().links.by_name_or_null(name)
    }

    pub fn link_count(&self) -> usize {
        self.kernel.platform.borrow().links.count()
    }

    pub fn all_links(&self) -> Vec<Arc<Link>> {
        self.kernel.platform.borrow().links.all()
    }

    pub fn filtered_links<F>(&self, predicate: F) -> Vec<Arc<Link>>
    where
        F: FnMut(&Link) -> bool,
    {
        self.kernel.platform.borrow().links.filtered(predicate)
    }

    /// # Errors
    ///
    /// - `EngineError::Registry` - No such disk
    pub fn disk_by_name(&self, name: &str) -> Result<Arc<Disk>, EngineError> {
        Ok(self.kernel.platform.borrow().disks.by_name(name)?)
    }

    pub fn disk_by_name_or_null(&self, name: &str) -> Option<Arc<Disk>> {
        self.kernel.platform.borrow().disks.by_name_or_null(name)
    }

    pub fn disk_count(&self) -> usize {
        self.kernel.platform.borrow().disks.count()
    }

    pub fn all_disks(&self) -> Vec<Arc<Disk>> {
        self.kernel.platform.borrow().disks.all()
    }

    pub fn filtered_disks<F>(&self, predicate: F) -> Vec<Arc<Disk>>
    where
        F: FnMut(&Disk) -> bool,
    {
        self.kernel.platform.borrow().disks.filtered(predicate)
    }

    /// # Errors
    ///
    /// - `EngineError::Registry` - No such storage
    pub fn storage_by_name(&self, name: &str) -> Result<Arc<Storage>, EngineError> {
        Ok(self.kernel.platform.borrow().storages.by_name(name)?)
    }

    pub fn storage_by_name_or_null(&self, name: &str) -> Option<Arc<Storage>> {
        self.kernel.platform.borrow().storages.by_name_or_null(name)
    }

    pub fn storage_count(&self) -> usize {
        self.kernel.platform.borrow().storages.count()
    }

    pub fn all_storages(&self) -> Vec<Arc<Storage>> {
        self.kernel.platform.borrow().storages.all()
    }

    pub fn filtered_storages<F>(&self, predicate: F) -> Vec<Arc<Storage>>
    where
        F: FnMut(&Storage) -> bool,
    {
        self.kernel.platform.borrow().storages.filtered(predicate)
    }

    /// # Errors
    ///
    /// - `EngineError::Registry` - No such netpoint
    pub fn netpoint_by_name(&self, name: &str) -> Result<Arc<NetPoint>, EngineError> {
        Ok(self.kernel.platform.borrow().netpoints.by_name(name)?)
    }

    pub fn netpoint_by_name_or_null(&self, name: &str) -> Option<Arc<NetPoint>> {
        self.kernel.platform.borrow().netpoints.by_name_or_null(name)
    }

    pub fn netpoint_count(&self) -> usize {
        self.kernel.platform.borrow().netpoints.count()
    }

    pub fn all_netpoints(&self) -> Vec<Arc<NetPoint>> {
        self.kernel.platform.borrow().netpoints.all()
    }

    pub fn filtered_netpoints<F>(&self, predicate: F) -> Vec<Arc<NetPoint>>
    where
        F: FnMut(&NetPoint) -> bool,
    {
        self.kernel.platform.borrow().netpoints.filtered(predicate)
    }

    pub fn netzone_root(&self) -> Option<Arc<NetZone>> {
        self.kernel.platform.borrow().root.clone()
    }

    pub fn netzone_by_name_or_null(&self, name: &str) -> Option<Arc<NetZone>> {
        self.netzone_root()?.find(name)
    }

    /// Every zone below the root using `routing`, children before their parent.
    pub fn filtered_netzones(&self, routing: RoutingKind) -> Vec<Arc<NetZone>> {
        self.netzone_root()
            .map(|root| root.filtered_children(&|zone: &NetZone| zone.routing() == routing))
            .unwrap_or_default()
    }

    pub fn actor_count(&self) -> usize {
        self.kernel.scheduler.borrow().count()
    }

    pub fn all_actors(&self) -> Vec<ActorInfo> {
        self.kernel.scheduler.borrow().infos()
    }

    pub fn filtered_actors<F>(&self, mut predicate: F) -> Vec<ActorInfo>
    where
        F: FnMut(&ActorInfo) -> bool,
    {
        self.all_actors()
            .into_iter()
            .filter(|info| predicate(info))
            .collect()
    }

    /// Kills an actor; returns false if it is not alive.
    pub fn kill_actor(&self, actor: ActorId) -> bool {
        self.kernel.is_alive() && self.kernel.kill_actor(actor)
    }

    /// # Errors
    ///
    /// - `EngineError::SignalBusy` - Called while the signal is being dispatched
    pub fn on_platform_creation<F>(&self, mut handler: F) -> Result<(), EngineError>
    where
        F: FnMut() + 'static,
    {
        Ok(self.kernel.signals.platform_creation.connect(move |_| handler())?)
    }

    /// # Errors
    ///
    /// - `EngineError::SignalBusy` - Called while the signal is being dispatched
    pub fn on_platform_created<F>(&self, mut handler: F) -> Result<(), EngineError>
    where
        F: FnMut() + 'static,
    {
        Ok(self.kernel.signals.platform_created.connect(move |_| handler())?)
    }

    /// Subscribes to clock advances; the handler receives the new date.
    ///
    /// # Errors
    ///
    /// - `EngineError::SignalBusy` - Called while the signal is being dispatched
    pub fn on_time_advance<F>(&self, mut handler: F) -> Result<(), EngineError>
    where
        F: FnMut(f64) + 'static,
    {
        Ok(self
            .kernel
            .signals
            .time_advance
            .connect(move |now: &f64| handler(*now))?)
    }

    /// # Errors
    ///
    /// - `EngineError::SignalBusy` - Called while the signal is being dispatched
    pub fn on_deadlock<F>(&self, mut handler: F) -> Result<(), EngineError>
    where
        F: FnMut() + 'static,
    {
        Ok(self.kernel.signals.deadlock.connect(move |_| handler())?)
    }

    /// # Errors
    ///
    /// - `EngineError::SignalBusy` - Called while the signal is being dispatched
    pub fn on_simulation_end<F>(&self, mut handler: F) -> Result<(), EngineError>
    where
        F: FnMut() + 'static,
    {
        Ok(self.kernel.signals.simulation_end.connect(move |_| handler())?)
    }
}
