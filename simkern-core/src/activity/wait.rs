use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use super::{ActivityCell, ActivityError, ActivityState};
use crate::actor::ActorId;
use crate::engine::events::TimerId;
use crate::engine::kernel::Kernel;

/// Suspends the calling actor until an activity is terminal, or a timeout expires.
///
/// Dropping the future before completion withdraws the actor from the
/// activity's waiters; the activity itself is not affected.
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct WaitFuture {
    cell: Arc<ActivityCell>,
    timeout: Option<f64>,
    deadline: Option<f64>,
    waiter: Option<ActorId>,
    timer: Option<TimerId>,
}

impl WaitFuture {
    pub(crate) fn new(cell: Arc<ActivityCell>, timeout: Option<f64>) -> Self {
        Self {
            cell,
            timeout,
            deadline: None,
            waiter: None,
            timer: None,
        }
    }

    fn release(&mut self, kernel: Option<&Kernel>) {
        if let Some(actor) = self.waiter.take() {
            self.cell.remove_waiter(actor);
        }
        if let (Some(timer), Some(kernel)) = (self.timer.take(), kernel) {
            kernel.cancel_timer(timer);
        }
    }
}

impl Future for WaitFuture {
    type Output = Result<(), ActivityError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(kernel) = Kernel::current() else {
            return Poll::Ready(Err(ActivityError::NoEngine));
        };

        if this.cell.state() == ActivityState::Inited
            && let Err(error) = this.cell.start()
        {
            return Poll::Ready(Err(error));
        }

        if let Some(outcome) = this.cell.outcome() {
            this.release(Some(&kernel));
            return Poll::Ready(outcome);
        }

        let now = kernel.now();
        if let Some(timeout) = this.timeout {
            let deadline = *this.deadline.get_or_insert(now + timeout);
            if now >= deadline - kernel.timing_precision() {
                this.release(Some(&kernel));
                return Poll::Ready(Err(ActivityError::Timeout { timeout }));
            }
        }

        let Some(actor) = kernel.current_actor() else {
            return Poll::Ready(Err(ActivityError::NotInActor));
        };

        if this.waiter.is_none() {
            this.cell.add_waiter(actor);
            this.waiter = Some(actor);
        }
        if let (Some(deadline), None) = (this.deadline, this.timer) {
            this.timer = Some(kernel.schedule_wake(deadline, actor));
        }
        Poll::Pending
    }
}

impl Drop for WaitFuture {
    fn drop(&mut self) {
        let kernel = Kernel::current();
        self.release(kernel.as_deref());
    }
}
