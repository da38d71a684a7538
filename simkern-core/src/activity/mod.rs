//! Asynchronous units of work consumed by actors.
//!
//! Every activity follows the same lifecycle:
//!
//! ```text
//! Inited --start--> Started --+--> Finished
//!    |                        +--> Failed
//!    +--------cancel----------+--> Canceled
//! ```
//!
//! Handles are cheap clones of one shared cell, so the issuing actor, other
//! waiters and the engine's bookkeeping can all hold the same activity. The
//! cell goes away with its last holder.

mod comm;
mod exec;
mod io;
mod wait;

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};

pub use comm::Comm;
pub use exec::Exec;
pub use io::Io;
pub use wait::WaitFuture;

pub use crate::model::IoOp;
use crate::actor::ActorId;
use crate::engine::kernel::{ActionRef, Kernel};
use crate::model::{ActionOutcome, ModelError};
use crate::platform::{PlatformError, ResourceKey};

pub(crate) type Payload = Box<dyn Any + Send>;

/// Lifecycle state of an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ActivityState {
    Inited,
    Started,
    Finished,
    Failed,
    Canceled,
}

impl ActivityState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActivityState::Finished | ActivityState::Failed | ActivityState::Canceled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityState::Inited => "inited",
            ActivityState::Started => "started",
            ActivityState::Finished => "finished",
            ActivityState::Failed => "failed",
            ActivityState::Canceled => "canceled",
        }
    }
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    Exec,
    Comm,
    Io,
}

static NEXT_ACTIVITY_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivityId(u64);

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "activity#{}", self.0)
    }
}

/// Conditions reported to the actor manipulating an activity.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActivityError {
    #[error("Cannot start an activity that is already {state}")]
    NotInited { state: ActivityState },

    #[error("Activity was canceled")]
    Canceled,

    #[error("Activity failed: a resource it used became unavailable")]
    Failed,

    #[error("Activity still running after waiting {timeout} seconds")]
    Timeout { timeout: f64 },

    #[error("No simulation engine is running on this thread")]
    NoEngine,

    #[error("This operation can only be performed by an actor")]
    NotInActor,

    #[error("Unsupported activity: {reason}")]
    Unsupported { reason: String },

    #[error("Received payload is not a {expected}")]
    PayloadType { expected: &'static str },

    #[error("No payload to take from this communication")]
    NoPayload,

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// What an activity asks from the platform once started.
#[derive(Debug, Clone)]
pub(crate) enum Request {
    Exec {
        host: Option<String>,
        flops: f64,
        priority: f64,
        bound: Option<f64>,
    },
    ParallelExec {
        hosts: Vec<String>,
        flops: Vec<f64>,
        bytes: Vec<f64>,
        rate: Option<f64>,
    },
    Transfer {
        src: String,
        dst: String,
        bytes: f64,
        rate: Option<f64>,
    },
    MailboxPut {
        mailbox: String,
        bytes: f64,
        rate: Option<f64>,
    },
    MailboxGet {
        mailbox: String,
    },
    Io {
        target: ResourceKey,
        op: IoOp,
        bytes: f64,
    },
}

#[derive(Debug)]
pub(crate) struct ActivityInner {
    pub state: ActivityState,
    pub owner: Option<ActorId>,
    /// Host the activity runs from, known once started
    pub host: Option<String>,
    pub total: f64,
    /// Last known remaining work, authoritative once the action is gone
    pub remaining: f64,
    pub action: Option<ActionRef>,
    pub request: Request,
    pub waiters: Vec<ActorId>,
    pub payload: Option<Payload>,
    /// The other side of a matched mailbox communication
    pub peer: Option<Weak<ActivityCell>>,
}

/// Shared state behind every activity handle.
///
/// The reference count is atomic; the lock only guards the fields, which are
/// touched exclusively by the thread running the simulation.
#[derive(Debug)]
pub struct ActivityCell {
    id: ActivityId,
    kind: ActivityKind,
    inner: Mutex<ActivityInner>,
}

impl ActivityCell {
    pub(crate) fn new(kind: ActivityKind, total: f64, request: Request) -> Arc<Self> {
        Arc::new(Self {
            id: ActivityId(NEXT_ACTIVITY_ID.fetch_add(1, Ordering::Relaxed)),
            kind,
            inner: Mutex::new(ActivityInner {
                state: ActivityState::Inited,
                owner: None,
                host: None,
                total,
                remaining: total,
                action: None,
                request,
                waiters: Vec::new(),
                payload: None,
                peer: None,
            }),
        })
    }

    pub fn id(&self) -> ActivityId {
        self.id
    }

    pub fn kind(&self) -> ActivityKind {
        self.kind
    }

    pub fn state(&self) -> ActivityState {
        self.inner.lock().state
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ActivityInner> {
        self.inner.lock()
    }

    pub(crate) fn owner(&self) -> Option<ActorId> {
        self.inner.lock().owner
    }

    /// Result a waiter observes, once terminal.
    pub(crate) fn outcome(&self) -> Option<Result<(), ActivityError>> {
        match self.state() {
            ActivityState::Finished => Some(Ok(())),
            ActivityState::Failed => Some(Err(ActivityError::Failed)),
            ActivityState::Canceled => Some(Err(ActivityError::Canceled)),
            ActivityState::Inited | ActivityState::Started => None,
        }
    }

    pub(crate) fn add_waiter(&self, actor: ActorId) {
        let mut inner = self.inner.lock();
        if !inner.waiters.contains(&actor) {
            inner.waiters.push(actor);
        }
    }

    pub(crate) fn remove_waiter(&self, actor: ActorId) {
        self.inner.lock().waiters.retain(|waiter| *waiter != actor);
    }

    /// Moves to a terminal state and returns the actors to wake.
    ///
    /// Returns nothing if the activity was already terminal.
    pub(crate) fn finish(&self, state: ActivityState) -> Vec<ActorId> {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return Vec::new();
        }
        inner.state = state;
        inner.action = None;
        if state == ActivityState::Finished {
            inner.remaining = 0.0;
        }
        std::mem::take(&mut inner.waiters)
    }

    /// Transitions `inited -> started` and admits the work into the models.
    ///
    /// # Errors
    ///
    /// - `ActivityError::NotInited` - Already started or terminal
    /// - `ActivityError::NoEngine` - No engine on this thread
    /// - `ActivityError::NotInActor` - The activity needs the host of a calling actor
    /// - `ActivityError::Unsupported` - No active model handles this kind of work
    /// - `ActivityError::Platform` / `Model` - Unknown resource, missing route, invalid amount
    pub(crate) fn start(self: &Arc<Self>) -> Result<(), ActivityError> {
        let request = {
            let inner = self.inner.lock();
            if inner.state != ActivityState::Inited {
                return Err(ActivityError::NotInited { state: inner.state });
            }
            inner.request.clone()
        };
        let kernel = Kernel::current().ok_or(ActivityError::NoEngine)?;
        kernel.start_activity(self, request)?;
        tracing::debug!("{} ({:?}) started at {}", self.id, self.kind, kernel.now());
        Ok(())
    }

    /// Withdraws a non-terminal activity. No-op on terminal ones.
    ///
    /// # Errors
    ///
    /// - `ActivityError::NoEngine` - A started activity outlived its engine
    pub(crate) fn cancel(self: &Arc<Self>) -> Result<(), ActivityError> {
        let state = self.state();
        if state.is_terminal() {
            return Ok(());
        }

        match Kernel::current() {
            Some(kernel) => {
                kernel.cancel_activity(self);
                Ok(())
            }
            None if state == ActivityState::Inited => {
                self.finish(ActivityState::Canceled);
                Ok(())
            }
            None => Err(ActivityError::NoEngine),
        }
    }

    /// Remaining amount of work; the total until started, zero once finished.
    pub(crate) fn remaining(&self) -> f64 {
        let (action, snapshot) = {
            let inner = self.inner.lock();
            (inner.action, inner.remaining)
        };
        let Some(action) = action else {
            return snapshot;
        };

        let current = Kernel::current()
            .and_then(|kernel| kernel.action_remaining(action))
            .unwrap_or(snapshot)
            .min(snapshot);
        self.inner.lock().remaining = current;
        current
    }

    pub(crate) fn take_payload(&self) -> Option<Payload> {
        self.inner.lock().payload.take()
    }
}

impl ActionOutcome {
    pub(crate) fn activity_state(self) -> ActivityState {
        match self {
            ActionOutcome::Finished => ActivityState::Finished,
            ActionOutcome::Failed => ActivityState::Failed,
        }
    }
}

/// Operations shared by [`Exec`], [`Comm`] and [`Io`].
pub trait Activity {
    /// Shared cell behind this handle.
    fn cell(&self) -> &Arc<ActivityCell>;

    fn id(&self) -> ActivityId {
        self.cell().id()
    }

    fn state(&self) -> ActivityState {
        self.cell().state()
    }

    /// Starts consuming resources.
    ///
    /// # Errors
    ///
    /// - `ActivityError::NotInited` - Called on an activity that is not `Inited`
    /// - See [`ActivityError`] for admission failures
    fn start(&self) -> Result<(), ActivityError> {
        self.cell().start()
    }

    /// Whether the activity reached a terminal state. Never suspends.
    fn test(&self) -> bool {
        self.state().is_terminal()
    }

    /// Suspends the calling actor until the activity is terminal.
    ///
    /// An `Inited` activity is started first.
    fn wait(&self) -> WaitFuture {
        WaitFuture::new(Arc::clone(self.cell()), None)
    }

    /// Like [`Activity::wait`], giving up after `timeout` simulated seconds.
    ///
    /// On timeout the activity keeps running.
    fn wait_for(&self, timeout: f64) -> WaitFuture {
        WaitFuture::new(Arc::clone(self.cell()), Some(timeout.max(0.0)))
    }

    /// Cancels the activity; succeeds without effect if it is already terminal.
    ///
    /// # Errors
    ///
    /// - `ActivityError::NoEngine` - The engine was shut down under a started activity
    fn cancel(&self) -> Result<(), ActivityError> {
        self.cell().cancel()
    }

    fn get_remaining(&self) -> f64 {
        self.cell().remaining()
    }
}
