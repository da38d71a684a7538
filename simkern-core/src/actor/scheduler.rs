//! Bookkeeping of actor slots and of the ready queue.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;

use futures::future::LocalBoxFuture;

use super::{ActorId, ActorInfo};

pub(crate) type ActorFuture = LocalBoxFuture<'static, anyhow::Result<()>>;

struct ActorSlot {
    info: ActorInfo,
    /// `None` while the actor is being polled
    future: Option<ActorFuture>,
    killed: bool,
}

impl fmt::Debug for ActorSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorSlot")
            .field("info", &self.info)
            .field("killed", &self.killed)
            .finish_non_exhaustive()
    }
}

/// Live actors, in creation order, plus the FIFO of runnable ones.
///
/// An actor is either queued as ready, being polled, or blocked on something
/// that will call [`Scheduler::make_ready`] later.
#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    slots: BTreeMap<ActorId, ActorSlot>,
    ready: VecDeque<ActorId>,
    queued: HashSet<ActorId>,
    next_id: u64,
}

impl Scheduler {
    pub fn allocate_id(&mut self) -> ActorId {
        self.next_id += 1;
        ActorId(self.next_id)
    }

    /// Adds a new actor; it gets its first turn at the next scheduling round.
    pub fn insert(&mut self, info: ActorInfo, future: ActorFuture) {
        let id = info.id;
        self.slots.insert(
            id,
            ActorSlot {
                info,
                future: Some(future),
                killed: false,
            },
        );
        self.make_ready(id);
    }

    /// Queues a live actor once, however many times it is woken.
    pub fn make_ready(&mut self, id: ActorId) {
        if self.slots.contains_key(&id) && self.queued.insert(id) {
            self.ready.push_back(id);
        }
    }

    pub fn pop_ready(&mut self) -> Option<ActorId> {
        let id = self.ready.pop_front()?;
        self.queued.remove(&id);
        Some(id)
    }

    /// Takes the future out for polling; `None` if the actor is gone or busy.
    pub fn take_future(&mut self, id: ActorId) -> Option<ActorFuture> {
        self.slots.get_mut(&id)?.future.take()
    }

    /// Puts a still pending future back.
    ///
    /// If the actor was killed while it ran, its slot is dropped and the
    /// future is handed back to be dropped by the caller.
    pub fn restore(&mut self, id: ActorId, future: ActorFuture) -> Option<ActorFuture> {
        match self.slots.get_mut(&id) {
            Some(slot) if !slot.killed => {
                slot.future = Some(future);
                None
            }
            Some(_) => {
                self.slots.remove(&id);
                Some(future)
            }
            None => Some(future),
        }
    }

    /// Removes an actor whose body returned.
    pub fn finish(&mut self, id: ActorId) -> Option<ActorInfo> {
        self.ready.retain(|queued| *queued != id);
        self.queued.remove(&id);
        self.slots.remove(&id).map(|slot| slot.info)
    }

    /// Removes an actor and returns its future, if it was not running.
    ///
    /// Returns `None` if the actor does not exist or was already killed. A
    /// running actor keeps its slot, marked killed, until it yields.
    pub fn kill(&mut self, id: ActorId) -> Option<Option<ActorFuture>> {
        let slot = self.slots.get_mut(&id)?;
        if slot.killed {
            return None;
        }
        self.ready.retain(|queued| *queued != id);
        self.queued.remove(&id);

        match slot.future.take() {
            Some(future) => {
                self.slots.remove(&id);
                Some(Some(future))
            }
            None => {
                slot.killed = true;
                Some(None)
            }
        }
    }

    pub fn info(&self, id: ActorId) -> Option<&ActorInfo> {
        self.slots
            .get(&id)
            .filter(|slot| !slot.killed)
            .map(|slot| &slot.info)
    }

    pub fn count(&self) -> usize {
        self.live().count()
    }

    pub fn non_daemon_count(&self) -> usize {
        self.live().filter(|info| !info.daemon).count()
    }

    pub fn infos(&self) -> Vec<ActorInfo> {
        self.live().cloned().collect()
    }

    pub fn set_daemon(&mut self, id: ActorId) -> bool {
        match self.slots.get_mut(&id) {
            Some(slot) => {
                slot.info.daemon = true;
                true
            }
            None => false,
        }
    }

    pub fn actors_on_host(&self, host: &str) -> Vec<ActorId> {
        self.live()
            .filter(|info| info.host == host)
            .map(|info| info.id)
            .collect()
    }

    pub fn daemon_ids(&self) -> Vec<ActorId> {
        self.live()
            .filter(|info| info.daemon)
            .map(|info| info.id)
            .collect()
    }

    /// Forgets every actor and returns their futures, to be dropped by the caller.
    pub fn clear(&mut self) -> Vec<ActorFuture> {
        self.ready.clear();
        self.queued.clear();
        self.next_id = 0;
        std::mem::take(&mut self.slots)
            .into_values()
            .filter_map(|slot| slot.future)
            .collect()
    }

    fn live(&self) -> impl Iterator<Item = &ActorInfo> {
        self.slots
            .values()
            .filter(|slot| !slot.killed)
            .map(|slot| &slot.info)
    }
}
