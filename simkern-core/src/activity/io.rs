use std::sync::Arc;

use super::{Activity, ActivityCell, ActivityKind, IoOp, Request};
use crate::platform::{ResourceKey, ResourceKind};

/// A read or a write on a disk or a storage.
#[derive(Debug, Clone)]
pub struct Io {
    cell: Arc<ActivityCell>,
}

impl Io {
    pub fn new(target: ResourceKey, op: IoOp, bytes: f64) -> Self {
        Self {
            cell: ActivityCell::new(ActivityKind::Io, bytes, Request::Io { target, op, bytes }),
        }
    }

    pub fn disk_read(disk: impl Into<String>, bytes: f64) -> Self {
        Self::new(ResourceKey::new(ResourceKind::Disk, disk), IoOp::Read, bytes)
    }

    pub fn disk_write(disk: impl Into<String>, bytes: f64) -> Self {
        Self::new(ResourceKey::new(ResourceKind::Disk, disk), IoOp::Write, bytes)
    }

    pub fn storage_read(storage: impl Into<String>, bytes: f64) -> Self {
        Self::new(ResourceKey::new(ResourceKind::Storage, storage), IoOp::Read, bytes)
    }

    pub fn storage_write(storage: impl Into<String>, bytes: f64) -> Self {
        Self::new(ResourceKey::new(ResourceKind::Storage, storage), IoOp::Write, bytes)
    }

    pub fn op(&self) -> IoOp {
        match self.cell.lock().request {
            Request::Io { op, .. } => op,
            _ => IoOp::Read,
        }
    }

    /// Number of bytes read or written so far, rounded down.
    pub fn performed_ioops(&self) -> u64 {
        let total = self.cell.lock().total;
        (total - self.get_remaining()).max(0.0).floor() as u64
    }
}

impl Activity for Io {
    fn cell(&self) -> &Arc<ActivityCell> {
        &self.cell
    }
}
