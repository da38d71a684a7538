//! Simulated processes.
//!
//! An actor is an `async` body bound to a host. It runs until it awaits an
//! activity, a delay or a yield, then hands control back to the engine, which
//! resumes it once what it waits for is over. Only one actor runs at a time.

mod context;
mod scheduler;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use serde::Serialize;

pub use context::{ActorContext, SleepFuture, YieldFuture};
pub(crate) use scheduler::{ActorFuture, Scheduler};

/// Process identifier, unique for the lifetime of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ActorId(u64);

impl ActorId {
    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

type EntryPoint = dyn Fn(ActorContext, Vec<String>) -> LocalBoxFuture<'static, anyhow::Result<()>>;

/// Entry point of an actor: a function of its context and string arguments.
///
/// Cloning shares the same function.
#[derive(Clone)]
pub struct ActorCode(Rc<EntryPoint>);

impl ActorCode {
    pub fn new<F, Fut>(code: F) -> Self
    where
        F: Fn(ActorContext, Vec<String>) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        Self(Rc::new(move |ctx: ActorContext, args: Vec<String>| {
            code(ctx, args).boxed_local()
        }))
    }

    /// Adapts an entry point that ignores its arguments.
    pub fn from_fn<F, Fut>(code: F) -> Self
    where
        F: Fn(ActorContext) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        Self::new(move |ctx, _args| code(ctx))
    }

    pub(crate) fn call(&self, ctx: ActorContext, args: Vec<String>) -> ActorFuture {
        (self.0)(ctx, args)
    }
}

impl fmt::Debug for ActorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ActorCode(..)")
    }
}

/// One line of a deployment: which function to run, where, under which name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorLaunch {
    pub name: String,
    pub host: String,
    pub function: String,
    pub args: Vec<String>,
}

impl ActorLaunch {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        function: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            function: function.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Public view of a live actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActorInfo {
    pub id: ActorId,
    pub name: String,
    pub host: String,
    pub daemon: bool,
}

/// Name to entry point table, with an optional fallback.
#[derive(Debug, Default)]
pub(crate) struct FunctionRegistry {
    functions: HashMap<String, ActorCode>,
    default: Option<ActorCode>,
}

impl FunctionRegistry {
    /// Binds `name`; returns true if it replaced a previous binding.
    pub fn register(&mut self, name: &str, code: ActorCode) -> bool {
        self.functions.insert(name.to_string(), code).is_some()
    }

    pub fn set_default(&mut self, code: ActorCode) {
        self.default = Some(code);
    }

    /// Looks `name` up, falling back to the default entry point.
    pub fn resolve(&self, name: &str) -> Option<ActorCode> {
        self.functions
            .get(name)
            .or(self.default.as_ref())
            .cloned()
    }

    pub fn clear(&mut self) {
        self.functions.clear();
        self.default = None;
    }
}
