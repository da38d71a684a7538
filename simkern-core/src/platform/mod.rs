//! Simulated platform: resources, topology and routing.
//!
//! The loader side builds a [`NetZone`] tree of plain descriptions. The engine
//! realizes it once, registering every resource and computing the route table
//! consumed by the network models.

pub mod profile;
pub mod routing;
pub mod zone;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

pub use profile::{Profile, ProfileEvent};
pub use zone::{ClusterSpec, NetZone, RouteSpec, RoutingKind};

use crate::model::ModelKind;
use crate::registry::{Registrar, Registry, RegistryError};
use profile::{ProfileAttribute, ProfileCursor};
use routing::RoutingTable;

/// Errors realizing or querying the platform.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlatformError {
    #[error("Invalid resource '{name}': {reason}")]
    InvalidResource { name: String, reason: String },

    #[error("Unknown host '{name}'")]
    UnknownHost { name: String },

    #[error("Route in zone '{zone}' uses unknown link '{name}'")]
    UnknownLink { zone: String, name: String },

    #[error("Route in zone '{zone}' uses unknown point '{name}'")]
    UnknownPoint { zone: String, name: String },

    #[error("No route from '{src}' to '{dst}'")]
    NoRoute { src: String, dst: String },

    #[error("Route from '{src}' to '{dst}' is declared twice")]
    DuplicateRoute { src: String, dst: String },

    #[error("Invalid profile: {reason}")]
    InvalidProfile { reason: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Kinds of resources a model can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Host,
    Link,
    Disk,
    Storage,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Host => "host",
            ResourceKind::Link => "link",
            ResourceKind::Disk => "disk",
            ResourceKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one resource across models.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.name)
    }
}

/// How concurrent flows share a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SharingPolicy {
    /// Flows share the bandwidth with max-min fairness
    #[default]
    Shared,
    /// Each flow may use the full bandwidth on its own
    FatPipe,
}

/// A compute node.
#[derive(Debug, Clone, PartialEq)]
pub struct Host {
    name: String,
    speed: f64,
    core_count: u32,
    speed_profile: Option<Profile>,
    state_profile: Option<Profile>,
}

impl Host {
    /// Creates a single-core host computing `speed` flop/s.
    pub fn new(name: impl Into<String>, speed: f64) -> Self {
        Self {
            name: name.into(),
            speed,
            core_count: 1,
            speed_profile: None,
            state_profile: None,
        }
    }

    pub fn with_cores(mut self, core_count: u32) -> Self {
        self.core_count = core_count;
        self
    }

    pub fn with_speed_profile(mut self, profile: Profile) -> Self {
        self.speed_profile = Some(profile);
        self
    }

    pub fn with_state_profile(mut self, profile: Profile) -> Self {
        self.state_profile = Some(profile);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Peak speed of one core, in flop/s.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn core_count(&self) -> u32 {
        self.core_count
    }

    pub fn speed_profile(&self) -> Option<&Profile> {
        self.speed_profile.as_ref()
    }

    pub fn state_profile(&self) -> Option<&Profile> {
        self.state_profile.as_ref()
    }

    fn validate(&self) -> Result<(), PlatformError> {
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(invalid(&self.name, "speed must be positive"));
        }
        if self.core_count == 0 {
            return Err(invalid(&self.name, "a host needs at least one core"));
        }
        Ok(())
    }
}

/// A network link.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    name: String,
    bandwidth: f64,
    latency: f64,
    policy: SharingPolicy,
    bandwidth_profile: Option<Profile>,
    state_profile: Option<Profile>,
}

impl Link {
    /// Creates a shared link of `bandwidth` bytes/s and `latency` seconds.
    pub fn new(name: impl Into<String>, bandwidth: f64, latency: f64) -> Self {
        Self {
            name: name.into(),
            bandwidth,
            latency,
            policy: SharingPolicy::Shared,
            bandwidth_profile: None,
            state_profile: None,
        }
    }

    pub fn with_policy(mut self, policy: SharingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_bandwidth_profile(mut self, profile: Profile) -> Self {
        self.bandwidth_profile = Some(profile);
        self
    }

    pub fn with_state_profile(mut self, profile: Profile) -> Self {
        self.state_profile = Some(profile);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn latency(&self) -> f64 {
        self.latency
    }

    pub fn policy(&self) -> SharingPolicy {
        self.policy
    }

    pub fn bandwidth_profile(&self) -> Option<&Profile> {
        self.bandwidth_profile.as_ref()
    }

    pub fn state_profile(&self) -> Option<&Profile> {
        self.state_profile.as_ref()
    }

    fn validate(&self) -> Result<(), PlatformError> {
        if !(self.bandwidth.is_finite() && self.bandwidth > 0.0) {
            return Err(invalid(&self.name, "bandwidth must be positive"));
        }
        if !(self.latency.is_finite() && self.latency >= 0.0) {
            return Err(invalid(&self.name, "latency must be non-negative"));
        }
        Ok(())
    }
}

/// A disk attached to a host.
#[derive(Debug, Clone, PartialEq)]
pub struct Disk {
    name: String,
    host: String,
    read_bandwidth: f64,
    write_bandwidth: f64,
}

impl Disk {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        read_bandwidth: f64,
        write_bandwidth: f64,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            read_bandwidth,
            write_bandwidth,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn read_bandwidth(&self) -> f64 {
        self.read_bandwidth
    }

    pub fn write_bandwidth(&self) -> f64 {
        self.write_bandwidth
    }
}

/// A storage volume attached to a host.
#[derive(Debug, Clone, PartialEq)]
pub struct Storage {
    name: String,
    host: String,
    read_bandwidth: f64,
    write_bandwidth: f64,
    size: f64,
}

impl Storage {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        read_bandwidth: f64,
        write_bandwidth: f64,
        size: f64,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            read_bandwidth,
            write_bandwidth,
            size,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn read_bandwidth(&self) -> f64 {
        self.read_bandwidth
    }

    pub fn write_bandwidth(&self) -> f64 {
        self.write_bandwidth
    }

    /// Capacity in bytes.
    pub fn size(&self) -> f64 {
        self.size
    }
}

/// Category of a routable point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetPointKind {
    Host,
    Router,
    NetZone,
}

/// A routable point of the topology.
#[derive(Debug, Clone, PartialEq)]
pub struct NetPoint {
    name: String,
    kind: NetPointKind,
    zone: String,
}

impl NetPoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NetPointKind {
        self.kind
    }

    /// Name of the zone declaring this point.
    pub fn zone(&self) -> &str {
        &self.zone
    }
}

fn invalid(name: &str, reason: &str) -> PlatformError {
    PlatformError::InvalidResource {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_io(name: &str, host: &str, read: f64, write: f64, hosts: &Registry<Host>) -> Result<(), PlatformError> {
    if !(read.is_finite() && read > 0.0 && write.is_finite() && write > 0.0) {
        return Err(invalid(name, "read and write bandwidths must be positive"));
    }
    if !hosts.contains(host) {
        return Err(PlatformError::UnknownHost {
            name: host.to_string(),
        });
    }
    Ok(())
}

/// Realized platform owned by the engine.
#[derive(Debug)]
pub(crate) struct PlatformState {
    pub hosts: Registry<Host>,
    pub links: Registry<Link>,
    pub disks: Registry<Disk>,
    pub storages: Registry<Storage>,
    pub netpoints: Registry<NetPoint>,
    pub routing: RoutingTable,
    pub root: Option<Arc<NetZone>>,
    off: HashSet<ResourceKey>,
}

impl PlatformState {
    pub fn empty() -> Self {
        Self {
            hosts: Registry::new("host"),
            links: Registry::new("link"),
            disks: Registry::new("disk"),
            storages: Registry::new("storage"),
            netpoints: Registry::new("netpoint"),
            routing: RoutingTable::default(),
            root: None,
            off: HashSet::new(),
        }
    }

    /// Registers every resource of the tree and computes its routes.
    ///
    /// # Errors
    ///
    /// - `PlatformError::InvalidResource` - Non-positive speed, bandwidth or core count
    /// - `PlatformError::Registry` - A name is used twice
    /// - `PlatformError::UnknownHost` - A disk or storage refers to a missing host
    /// - `PlatformError::UnknownLink` / `UnknownPoint` - A route refers to a missing element
    /// - `PlatformError::DuplicateRoute` - Two declarations for the same pair
    pub fn realize(root: NetZone) -> Result<Self, PlatformError> {
        let root = Arc::new(root);
        let mut state = Self::empty();

        state.register_zone(&root)?;
        state.register_storage_devices(&root)?;
        state.routing = RoutingTable::build(&root, &state.links, &state.netpoints)?;
        state.root = Some(root);

        tracing::info!(
            "Platform realized: {} hosts, {} links, {} disks, {} storages, {} routes",
            state.hosts.count(),
            state.links.count(),
            state.disks.count(),
            state.storages.count(),
            state.routing.len()
        );
        Ok(state)
    }

    fn register_zone(&mut self, zone: &NetZone) -> Result<(), PlatformError> {
        let point = |name: &str, kind| NetPoint {
            name: name.to_string(),
            kind,
            zone: zone.name().to_string(),
        };

        register(
            &mut self.netpoints,
            zone.name(),
            point(zone.name(), NetPointKind::NetZone),
            ModelKind::Network,
        )?;

        for host in zone.hosts() {
            host.validate()?;
            register(&mut self.hosts, host.name(), host.clone(), ModelKind::Host)?;
            register(
                &mut self.netpoints,
                host.name(),
                point(host.name(), NetPointKind::Host),
                ModelKind::Network,
            )?;
        }

        for link in zone.links() {
            link.validate()?;
            register(&mut self.links, link.name(), link.clone(), ModelKind::Network)?;
        }

        for router in zone.routers() {
            register(
                &mut self.netpoints,
                router,
                point(router, NetPointKind::Router),
                ModelKind::Network,
            )?;
        }

        for child in zone.children() {
            self.register_zone(child)?;
        }
        Ok(())
    }

    fn register_storage_devices(&mut self, zone: &NetZone) -> Result<(), PlatformError> {
        for disk in zone.disks() {
            validate_io(
                disk.name(),
                disk.host(),
                disk.read_bandwidth(),
                disk.write_bandwidth(),
                &self.hosts,
            )?;
            register(&mut self.disks, disk.name(), disk.clone(), ModelKind::Disk)?;
        }

        for storage in zone.storages() {
            validate_io(
                storage.name(),
                storage.host(),
                storage.read_bandwidth(),
                storage.write_bandwidth(),
                &self.hosts,
            )?;
            register(
                &mut self.storages,
                storage.name(),
                storage.clone(),
                ModelKind::Storage,
            )?;
        }

        for child in zone.children() {
            self.register_storage_devices(child)?;
        }
        Ok(())
    }

    /// Returns the links crossed from `src` to `dst`; empty for a host talking to itself.
    ///
    /// # Errors
    ///
    /// - `PlatformError::UnknownHost` - Either end is not a registered host
    /// - `PlatformError::NoRoute` - No route was declared or computed for the pair
    pub fn route(&self, src: &str, dst: &str) -> Result<Vec<Arc<Link>>, PlatformError> {
        for name in [src, dst] {
            if !self.hosts.contains(name) {
                return Err(PlatformError::UnknownHost {
                    name: name.to_string(),
                });
            }
        }
        if src == dst {
            return Ok(Vec::new());
        }
        self.routing
            .get(src, dst)
            .cloned()
            .ok_or_else(|| PlatformError::NoRoute {
                src: src.to_string(),
                dst: dst.to_string(),
            })
    }

    /// Checks that the resource designated by `key` is registered.
    ///
    /// # Errors
    ///
    /// - `PlatformError::Registry` - No such resource
    pub fn ensure_exists(&self, key: &ResourceKey) -> Result<(), PlatformError> {
        let found = match key.kind {
            ResourceKind::Host => self.hosts.contains(&key.name),
            ResourceKind::Link => self.links.contains(&key.name),
            ResourceKind::Disk => self.disks.contains(&key.name),
            ResourceKind::Storage => self.storages.contains(&key.name),
        };
        if found {
            Ok(())
        } else {
            Err(PlatformError::Registry(RegistryError::NotFound {
                kind: key.kind.as_str(),
                name: key.name.clone(),
            }))
        }
    }

    /// Disks and storages attached to `host`.
    pub fn devices_of(&self, host: &str) -> Vec<ResourceKey> {
        let disks = self
            .disks
            .filtered(|disk| disk.host() == host)
            .into_iter()
            .map(|disk| ResourceKey::new(ResourceKind::Disk, disk.name()));
        let storages = self
            .storages
            .filtered(|storage| storage.host() == host)
            .into_iter()
            .map(|storage| ResourceKey::new(ResourceKind::Storage, storage.name()));
        disks.chain(storages).collect()
    }

    /// Removes a resource from its registry, and a host from the netpoints.
    ///
    /// The resource stays recorded as off, so routes still crossing it fail.
    ///
    /// # Errors
    ///
    /// - `PlatformError::Registry` - No such resource
    pub fn unregister(&mut self, key: &ResourceKey) -> Result<(), PlatformError> {
        match key.kind {
            ResourceKind::Host => {
                self.hosts.unregister(&key.name)?;
                self.netpoints.unregister(&key.name)?;
            }
            ResourceKind::Link => {
                self.links.unregister(&key.name)?;
            }
            ResourceKind::Disk => {
                self.disks.unregister(&key.name)?;
            }
            ResourceKind::Storage => {
                self.storages.unregister(&key.name)?;
            }
        }
        self.off.insert(key.clone());
        Ok(())
    }

    pub fn is_on(&self, key: &ResourceKey) -> bool {
        !self.off.contains(key)
    }

    /// Records the new state; returns false if it was already in that state.
    pub fn set_on(&mut self, key: &ResourceKey, on: bool) -> bool {
        if on {
            self.off.remove(key)
        } else {
            self.off.insert(key.clone())
        }
    }

    /// One replay cursor per profile attached to a host or link.
    pub fn profile_cursors(&self) -> Vec<ProfileCursor> {
        let mut cursors = Vec::new();

        for host in self.hosts.all() {
            let key = ResourceKey::new(ResourceKind::Host, host.name());
            if let Some(profile) = host.speed_profile() {
                cursors.push(ProfileCursor::new(key.clone(), ProfileAttribute::Scale, profile.clone()));
            }
            if let Some(profile) = host.state_profile() {
                cursors.push(ProfileCursor::new(key, ProfileAttribute::State, profile.clone()));
            }
        }

        for link in self.links.all() {
            let key = ResourceKey::new(ResourceKind::Link, link.name());
            if let Some(profile) = link.bandwidth_profile() {
                cursors.push(ProfileCursor::new(key.clone(), ProfileAttribute::Scale, profile.clone()));
            }
            if let Some(profile) = link.state_profile() {
                cursors.push(ProfileCursor::new(key, ProfileAttribute::State, profile.clone()));
            }
        }

        cursors
    }

    /// Releases every registered resource.
    pub fn clear(&mut self) {
        self.routing = RoutingTable::default();
        self.disks.clear();
        self.storages.clear();
        self.links.clear();
        self.hosts.clear();
        self.netpoints.clear();
        self.off.clear();
        self.root = None;
    }
}

fn register<T>(
    registry: &mut dyn Registrar<T>,
    name: &str,
    resource: T,
    owner: ModelKind,
) -> Result<(), PlatformError> {
    registry.register(name, Arc::new(resource), owner)?;
    Ok(())
}
