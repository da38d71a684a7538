//! Simkern Core - discrete-event simulation kernel for distributed platforms
//!
//! This crate runs "virtual" distributed programs against a modeled
//! network/CPU/disk substrate. Simulated processes (actors) run cooperatively
//! on a single logical timeline, and the clock only moves when something of
//! interest happens: an activity finishes, a resource becomes unavailable or a
//! timer fires.
//!
//! # Architecture
//!
//! - **Registry**: name-keyed catalogs of hosts, links, disks, storages and netpoints
//! - **Platform**: the topology tree (net zones) consumed by the engine
//! - **Resource models**: one per resource kind, sharing capacity with max-min fairness
//! - **Activities**: `Exec`, `Comm` and `Io`, the asynchronous units of work actors consume
//! - **Actors**: cooperative `async` bodies suspended on activities
//! - **Engine**: the per-thread singleton driving the time-advancement loop
//!
//! # Example
//!
//! ```rust,no_run
//! use simkern_core::platform::{Host, Link, NetZone, RoutingKind};
//! use simkern_core::{ActorCode, Engine};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new()?;
//!
//! let mut zone = NetZone::new("world", RoutingKind::Full);
//! zone.add_host(Host::new("alice", 1e9));
//! zone.add_host(Host::new("bob", 2e9));
//! zone.add_link(Link::new("backbone", 1.25e8, 1e-4));
//! zone.add_route("alice", "bob", &["backbone"], true);
//! engine.load_platform(zone)?;
//!
//! engine.register_function(
//!     "worker",
//!     ActorCode::new(|ctx, _args| async move {
//!         ctx.execute(1e9).await?;
//!         Ok(())
//!     }),
//! );
//! engine.create_actor_from_function("worker-0", "alice", "worker", Vec::new())?;
//!
//! let report = engine.run()?;
//! println!("{}", report.summary());
//! Engine::shutdown();
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod actor;
pub mod config;
pub mod engine;
pub mod mailbox;
pub mod model;
pub mod platform;
pub mod registry;
pub mod signal;
pub mod tracing_setup;
pub mod version;

pub use activity::{Activity, ActivityError, ActivityKind, ActivityState, Comm, Exec, Io, IoOp};
pub use actor::{ActorCode, ActorContext, ActorId, ActorInfo, ActorLaunch};
pub use config::{ConfigurationError, SimkernConfig};
pub use engine::{Engine, EngineError, RunOutcome, SimulationReport};
pub use mailbox::Mailbox;
pub use platform::PlatformError;
pub use registry::RegistryError;
pub use version::{VERSION, Version};

/// Errors that can bubble up from any simkern subsystem.
#[derive(Debug, thiserror::Error)]
pub enum SimkernError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Activity error: {0}")]
    Activity(#[from] ActivityError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

impl SimkernError {
    /// Checks if this error must stop the process before any simulation starts.
    ///
    /// Configuration and version problems are reported before any activity
    /// exists, so the caller can exit without a partially-initialized run.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SimkernError::Configuration(_)
                | SimkernError::Engine(EngineError::Configuration(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, SimkernError>;
