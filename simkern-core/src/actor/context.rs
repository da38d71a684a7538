use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use super::{ActorCode, ActorId};
use crate::activity::{Activity, ActivityError, Exec};
use crate::engine::EngineError;
use crate::engine::events::TimerId;
use crate::engine::kernel::Kernel;
use crate::mailbox::Mailbox;

/// What an actor body sees of the simulation.
///
/// Every suspension point of an actor goes through this context or through an
/// activity: `execute`, `sleep_for`, `sleep_until`, `yield_now`, activity
/// waits and mailbox transfers.
#[derive(Debug, Clone)]
pub struct ActorContext {
    kernel: Weak<Kernel>,
    id: ActorId,
    name: Rc<str>,
    host: Rc<str>,
}

impl ActorContext {
    pub(crate) fn new(kernel: Weak<Kernel>, id: ActorId, name: &str, host: &str) -> Self {
        Self {
            kernel,
            id,
            name: Rc::from(name),
            host: Rc::from(host),
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Current simulated date, 0 once the engine is gone.
    pub fn now(&self) -> f64 {
        self.kernel.upgrade().map_or(0.0, |kernel| kernel.now())
    }

    /// Prepares a computation on this actor's host.
    pub fn exec_init(&self, flops: f64) -> Exec {
        Exec::on_host(self.host(), flops)
    }

    /// Starts a computation on this actor's host without waiting for it.
    ///
    /// # Errors
    ///
    /// See [`Activity::start`].
    pub fn exec_async(&self, flops: f64) -> Result<Exec, ActivityError> {
        let exec = self.exec_init(flops);
        exec.start()?;
        Ok(exec)
    }

    /// Computes `flops` on this actor's host.
    ///
    /// # Errors
    ///
    /// - `ActivityError::Failed` - The host went down during the computation
    /// - See [`Activity::start`] for admission failures
    pub async fn execute(&self, flops: f64) -> Result<(), ActivityError> {
        self.exec_init(flops).wait().await
    }

    /// Suspends the actor for `duration` simulated seconds.
    pub fn sleep_for(&self, duration: f64) -> SleepFuture {
        SleepFuture::new(self.id, self.now() + duration.max(0.0))
    }

    /// Suspends the actor until the clock reaches `date`.
    pub fn sleep_until(&self, date: f64) -> SleepFuture {
        SleepFuture::new(self.id, date)
    }

    /// Lets every other runnable actor take a turn at the current date.
    pub fn yield_now(&self) -> YieldFuture {
        YieldFuture {
            actor: self.id,
            yielded: false,
        }
    }

    /// Starts a new actor running `code` on `host`.
    ///
    /// # Errors
    ///
    /// - `EngineError::ShutDown` - The engine is gone
    /// - `EngineError::UnknownHost` - No such host
    pub fn spawn(&self, name: &str, host: &str, code: ActorCode) -> Result<ActorId, EngineError> {
        let kernel = self.kernel.upgrade().ok_or(EngineError::ShutDown)?;
        kernel.spawn_actor(name, host, code, Vec::new())
    }

    /// Kills the actor `id`; returns false if it is not alive.
    ///
    /// An actor killing itself stops at its next suspension point.
    pub fn kill(&self, id: ActorId) -> bool {
        self.kernel
            .upgrade()
            .is_some_and(|kernel| kernel.kill_actor(id))
    }

    /// Marks this actor as a daemon, killed once only daemons remain.
    pub fn daemonize(&self) {
        if let Some(kernel) = self.kernel.upgrade() {
            kernel.scheduler.borrow_mut().set_daemon(self.id);
        }
    }

    pub fn mailbox(&self, name: impl Into<String>) -> Mailbox {
        Mailbox::by_name(name)
    }

    /// Uniform integer in `[min, max)` from the engine's seeded generator.
    pub fn random_range(&self, min: u64, max: u64) -> u64 {
        self.kernel
            .upgrade()
            .map_or(min, |kernel| kernel.rng.borrow_mut().random_range(min, max))
    }

    /// Uniform float in `[0, 1)` from the engine's seeded generator.
    pub fn random_f64(&self) -> f64 {
        self.kernel
            .upgrade()
            .map_or(0.0, |kernel| kernel.rng.borrow_mut().random_f64())
    }
}

/// Completes once the clock reaches a date.
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct SleepFuture {
    actor: ActorId,
    date: f64,
    timer: Option<TimerId>,
}

impl SleepFuture {
    fn new(actor: ActorId, date: f64) -> Self {
        Self {
            actor,
            date,
            timer: None,
        }
    }
}

impl Future for SleepFuture {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let Some(kernel) = Kernel::current() else {
            return Poll::Ready(());
        };

        if kernel.now() >= this.date - kernel.timing_precision() {
            if let Some(timer) = this.timer.take() {
                kernel.cancel_timer(timer);
            }
            return Poll::Ready(());
        }
        if this.timer.is_none() {
            this.timer = Some(kernel.schedule_wake(this.date, this.actor));
        }
        Poll::Pending
    }
}

impl Drop for SleepFuture {
    fn drop(&mut self) {
        if let (Some(timer), Some(kernel)) = (self.timer.take(), Kernel::current()) {
            kernel.cancel_timer(timer);
        }
    }
}

/// Completes at the actor's next turn, after the other runnable actors.
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct YieldFuture {
    actor: ActorId,
    yielded: bool,
}

impl Future for YieldFuture {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.yielded {
            return Poll::Ready(());
        }
        let Some(kernel) = Kernel::current() else {
            return Poll::Ready(());
        };
        this.yielded = true;
        kernel.wake(this.actor);
        Poll::Pending
    }
}
