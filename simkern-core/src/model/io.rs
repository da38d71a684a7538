//! Disk and storage models.

use std::collections::HashMap;

use serde::Serialize;

use super::{
    ActionId, ActionSpec, ConstraintId, Demand, ModelCore, ModelError, ModelKind, ResourceModel,
    UpdateAlgorithm, check_amount,
};
use crate::config::{ConfigurationError, SimkernConfig};
use crate::platform::{Disk, Host, ResourceKey, ResourceKind, SharingPolicy, Storage};

/// Direction of an I/O request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IoOp {
    Read,
    Write,
}

impl IoOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            IoOp::Read => "read",
            IoOp::Write => "write",
        }
    }
}

#[derive(Debug, Clone)]
struct Device {
    host: String,
    read: ConstraintId,
    write: ConstraintId,
    /// Capacity in bytes and bytes written so far, for storages
    capacity: Option<(f64, f64)>,
}

/// Read and write throughput of disks (or storages), each shared among the
/// requests targeting that device.
#[derive(Debug)]
pub struct IoModel {
    kind: ModelKind,
    core: ModelCore,
    devices: HashMap<String, Device>,
    hosts: HashMap<String, ConstraintId>,
}

impl IoModel {
    fn new(kind: ModelKind, config: &SimkernConfig) -> Self {
        Self {
            kind,
            core: ModelCore::new(kind, UpdateAlgorithm::Lazy, config.precision),
            devices: HashMap::new(),
            hosts: HashMap::new(),
        }
    }

    fn resource_kind(&self) -> ResourceKind {
        match self.kind {
            ModelKind::Storage => ResourceKind::Storage,
            _ => ResourceKind::Disk,
        }
    }

    fn attach_device(
        &mut self,
        name: &str,
        host: &str,
        read_bandwidth: f64,
        write_bandwidth: f64,
        capacity: Option<f64>,
    ) {
        let key = ResourceKey::new(self.resource_kind(), name);
        let read = self.core.add_constraint(
            Some(&key),
            format!("{name}:read"),
            read_bandwidth,
            SharingPolicy::Shared,
        );
        let write = self.core.add_constraint(
            Some(&key),
            format!("{name}:write"),
            write_bandwidth,
            SharingPolicy::Shared,
        );
        self.devices.insert(
            name.to_string(),
            Device {
                host: host.to_string(),
                read,
                write,
                capacity: capacity.map(|size| (size, 0.0)),
            },
        );
    }
}

impl ResourceModel for IoModel {
    fn kind(&self) -> ModelKind {
        self.kind
    }

    fn variant(&self) -> &'static str {
        "default"
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
        self.hosts.insert(host.name().to_string(), endpoint);
    }

    fn attach_disk(&mut self, disk: &Disk) {
        if self.kind == ModelKind::Disk {
            self.attach_device(
                disk.name(),
                disk.host(),
                disk.read_bandwidth(),
                disk.write_bandwidth(),
                None,
            );
        }
    }

    fn attach_storage(&mut self, storage: &Storage) {
        if self.kind == ModelKind::Storage {
            self.attach_device(
                storage.name(),
                storage.host(),
                storage.read_bandwidth(),
                storage.write_bandwidth(),
                Some(storage.size()),
            );
        }
    }

    fn accepts(&self, demand: &Demand) -> bool {
        matches!(demand, Demand::Io { target, .. } if target.kind == self.resource_kind())
    }

    fn admit(&mut self, demand: &Demand) -> Result<ActionId, ModelError> {
        let Demand::Io { target, op, bytes } = demand else {
            return Err(ModelError::InvalidDemand {
                reason: format!("the {} model only handles I/O requests", self.kind),
            });
        };
        check_amount("I/O size", *bytes)?;

        let unknown = || ModelError::UnknownResource {
            model: self.kind,
            resource: target.clone(),
        };
        let device = self.devices.get_mut(&target.name).ok_or_else(unknown)?;

        let mut amount = *bytes;
        if *op == IoOp::Write
            && let Some((size, used)) = device.capacity.as_mut()
        {
            // A full storage only writes what still fits.
            amount = amount.min((*size - *used).max(0.0));
            *used += amount;
        }

        let constraint = match op {
            IoOp::Read => device.read,
            IoOp::Write => device.write,
        };
        let host = device.host.clone();

        let mut spec = ActionSpec::new(amount).uses(constraint, 1.0);
        if let Some(&endpoint) = self.hosts.get(&host) {
            spec = spec.uses(endpoint, 0.0);
        }
        Ok(self.core.admit(spec))
    }
}

pub(crate) fn init_disk(config: &SimkernConfig) -> Result<Box<dyn ResourceModel>, ConfigurationError> {
    Ok(Box::new(IoModel::new(ModelKind::Disk, config)))
}

pub(crate) fn init_storage(config: &SimkernConfig) -> Result<Box<dyn ResourceModel>, ConfigurationError> {
    Ok(Box::new(IoModel::new(ModelKind::Storage, config)))
}
