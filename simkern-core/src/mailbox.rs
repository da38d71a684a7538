//! Named rendezvous points between senders and receivers.
//!
//! A started put waits in its mailbox until a get arrives, and conversely.
//! Pairs are matched in arrival order; only a matched pair consumes network
//! resources, along the route between the two actors' hosts.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::activity::{Activity, ActivityCell, ActivityError, Comm};
use crate::engine::kernel::Kernel;

/// Which end of a communication is posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Sender,
    Receiver,
}

/// Pending, unmatched communications of one mailbox.
#[derive(Debug, Default)]
pub(crate) struct MailboxQueue {
    senders: VecDeque<Arc<ActivityCell>>,
    receivers: VecDeque<Arc<ActivityCell>>,
}

impl MailboxQueue {
    /// Returns the oldest live counterpart of `cell`, or queues `cell`.
    pub fn post(&mut self, cell: Arc<ActivityCell>, side: Side) -> Option<Arc<ActivityCell>> {
        let (mine, theirs) = match side {
            Side::Sender => (&mut self.senders, &mut self.receivers),
            Side::Receiver => (&mut self.receivers, &mut self.senders),
        };

        while let Some(peer) = theirs.pop_front() {
            if !peer.state().is_terminal() {
                return Some(peer);
            }
        }
        mine.push_back(cell);
        None
    }

    /// Forgets `cell`; returns false if it was not queued here.
    pub fn remove(&mut self, cell: &Arc<ActivityCell>) -> bool {
        let before = self.senders.len() + self.receivers.len();
        self.senders.retain(|queued| !Arc::ptr_eq(queued, cell));
        self.receivers.retain(|queued| !Arc::ptr_eq(queued, cell));
        before != self.senders.len() + self.receivers.len()
    }

    pub fn pending_senders(&self) -> usize {
        self.senders.len()
    }

    pub fn pending_receivers(&self) -> usize {
        self.receivers.len()
    }

    pub fn cells(&self) -> impl Iterator<Item = &Arc<ActivityCell>> {
        self.senders.iter().chain(self.receivers.iter())
    }
}

/// Handle on a mailbox, identified by its name.
///
/// Mailboxes exist implicitly: two handles with the same name designate the
/// same rendezvous point.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mailbox {
    name: String,
}

impl Mailbox {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prepares sending `payload`, accounted as `bytes` on the network.
    pub fn put_init<T: Any + Send>(&self, payload: T, bytes: f64) -> Comm {
        Comm::put(&self.name, Box::new(payload), bytes)
    }

    /// Posts `payload` without waiting for a receiver.
    ///
    /// # Errors
    ///
    /// - `ActivityError::NotInActor` - Only actors can send through mailboxes
    /// - See [`Activity::start`] for the other cases
    pub fn put_async<T: Any + Send>(&self, payload: T, bytes: f64) -> Result<Comm, ActivityError> {
        let comm = self.put_init(payload, bytes);
        comm.start()?;
        Ok(comm)
    }

    /// Sends `payload` and waits until it is fully received.
    ///
    /// # Errors
    ///
    /// - `ActivityError::Failed` - The receiver or a resource on the route went down
    /// - `ActivityError::Canceled` - The communication was canceled
    pub async fn put<T: Any + Send>(&self, payload: T, bytes: f64) -> Result<(), ActivityError> {
        self.put_async(payload, bytes)?.wait().await
    }

    pub fn get_init(&self) -> Comm {
        Comm::get(&self.name)
    }

    /// Posts a receive request without waiting for a sender.
    ///
    /// # Errors
    ///
    /// See [`Mailbox::put_async`].
    pub fn get_async(&self) -> Result<Comm, ActivityError> {
        let comm = self.get_init();
        comm.start()?;
        Ok(comm)
    }

    /// Waits for a value of type `T`.
    ///
    /// # Errors
    ///
    /// - `ActivityError::PayloadType` - The sender posted another type
    /// - See [`Mailbox::put`] for the other cases
    pub async fn get<T: Any>(&self) -> Result<T, ActivityError> {
        let comm = self.get_async()?;
        comm.wait().await?;
        comm.take_payload()
    }

    /// Whether a sender is waiting for a receiver here.
    pub fn listen(&self) -> bool {
        self.with_queue(|queue| queue.pending_senders() > 0)
    }

    /// Whether nothing is waiting in this mailbox.
    pub fn is_empty(&self) -> bool {
        self.with_queue(|queue| queue.pending_senders() + queue.pending_receivers() == 0)
    }

    fn with_queue(&self, inspect: impl FnOnce(&MailboxQueue) -> bool) -> bool {
        let Some(kernel) = Kernel::current() else {
            return inspect(&MailboxQueue::default());
        };
        let mailboxes = kernel.mailboxes.borrow();
        match mailboxes.get(&self.name) {
            Some(queue) => inspect(queue),
            None => inspect(&MailboxQueue::default()),
        }
    }
}
