//! Synchronous multicast callbacks for engine lifecycle events.

use std::cell::RefCell;
use std::fmt;

type Handler<A> = Box<dyn FnMut(&A)>;

/// Subscribing while the signal is being dispatched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Cannot subscribe to '{signal}' while it is being dispatched")]
pub struct SignalBusy {
    pub signal: &'static str,
}

/// Ordered list of subscribers invoked with a shared argument.
pub struct Signal<A> {
    name: &'static str,
    handlers: RefCell<Vec<Handler<A>>>,
}

impl<A> Signal<A> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handlers: RefCell::new(Vec::new()),
        }
    }

    /// Appends a subscriber. Subscribers run in subscription order.
    ///
    /// # Errors
    ///
    /// - `SignalBusy` - Called from inside a handler of this same signal
    pub fn connect<F>(&self, handler: F) -> Result<(), SignalBusy>
    where
        F: FnMut(&A) + 'static,
    {
        let mut handlers = self
            .handlers
            .try_borrow_mut()
            .map_err(|_| SignalBusy { signal: self.name })?;
        handlers.push(Box::new(handler));
        Ok(())
    }

    /// Invokes every subscriber with `argument`.
    ///
    /// A nested emission of the same signal from one of its handlers is dropped.
    pub fn emit(&self, argument: &A) {
        let Ok(mut handlers) = self.handlers.try_borrow_mut() else {
            tracing::warn!("Nested emission of signal '{}' ignored", self.name);
            return;
        };
        for handler in handlers.iter_mut() {
            handler(argument);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.borrow().len()
    }

    pub fn clear(&self) {
        if let Ok(mut handlers) = self.handlers.try_borrow_mut() {
            handlers.clear();
        }
    }
}

impl<A> fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name)
            .field("subscribers", &self.handlers.try_borrow().map(|h| h.len()).ok())
            .finish()
    }
}

/// The lifecycle signals exposed by the engine.
#[derive(Debug)]
pub struct EngineSignals {
    pub platform_creation: Signal<()>,
    pub platform_created: Signal<()>,
    /// Carries the new clock value
    pub time_advance: Signal<f64>,
    pub deadlock: Signal<()>,
    pub simulation_end: Signal<()>,
}

impl Default for EngineSignals {
    fn default() -> Self {
        Self {
            platform_creation: Signal::new("platform_creation"),
            platform_created: Signal::new("platform_created"),
            time_advance: Signal::new("time_advance"),
            deadlock: Signal::new("deadlock"),
            simulation_end: Signal::new("simulation_end"),
        }
    }
}

impl EngineSignals {
    pub fn clear(&self) {
        self.platform_creation.clear();
        self.platform_created.clear();
        self.time_advance.clear();
        self.deadlock.clear();
        self.simulation_end.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let signal: Signal<f64> = Signal::new("time_advance");
        let seen = Rc::new(RefCell::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Rc::clone(&seen);
            signal
                .connect(move |now| seen.borrow_mut().push(format!("{tag}@{now}")))
                .unwrap();
        }

        signal.emit(&2.5);
        assert_eq!(
            *seen.borrow(),
            vec!["first@2.5", "second@2.5", "third@2.5"]
        );
    }

    #[test]
    fn test_connect_during_dispatch_is_rejected() {
        let signal: Rc<Signal<()>> = Rc::new(Signal::new("deadlock"));
        let outcome = Rc::new(RefCell::new(None));

        {
            let inner = Rc::clone(&signal);
            let outcome = Rc::clone(&outcome);
            signal
                .connect(move |_| {
                    *outcome.borrow_mut() = Some(inner.connect(|_| {}));
                })
                .unwrap();
        }

        signal.emit(&());
        assert_eq!(
            *outcome.borrow(),
            Some(Err(SignalBusy { signal: "deadlock" }))
        );
        assert_eq!(signal.subscriber_count(), 1);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let signal: Signal<()> = Signal::new("simulation_end");
        signal.emit(&());
        assert_eq!(signal.subscriber_count(), 0);
    }
}
