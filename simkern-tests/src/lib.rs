//! Shared fixtures for the simkern integration tests

use std::cell::RefCell;
use std::ops::Deref;
use std::rc::Rc;

use simkern_core::platform::{Host, Link, NetZone, RoutingKind};
use simkern_core::{Engine, SimkernConfig};

/// Engine handle shutting the thread's engine down when dropped.
pub struct EngineGuard {
    engine: Engine,
}

impl Deref for EngineGuard {
    type Target = Engine;

    fn deref(&self) -> &Engine {
        &self.engine
    }
}

impl Drop for EngineGuard {
    fn drop(&mut self) {
        Engine::shutdown();
    }
}

/// Creates the engine, applies `items` then loads `zone`.
///
/// Panics on any error: fixtures are only used by tests.
pub fn start_engine(items: &[&str], zone: NetZone) -> EngineGuard {
    let engine = Engine::with_config(SimkernConfig::default()).unwrap();
    let guard = EngineGuard { engine };
    for item in items {
        guard.set_config(item).unwrap();
    }
    guard.load_platform(zone).unwrap();
    guard
}

/// Values pushed from inside actors and inspected after the run.
pub type Recorder<T> = Rc<RefCell<Vec<T>>>;

pub fn recorder<T>() -> Recorder<T> {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

/// Two sites of two hosts each, joined by one `core` link.
///
/// Access links: 1 GB/s, 0.1 ms. Core: 100 MB/s, 1 ms. Hosts compute at 1 Gflop/s.
/// Routes: `aN <-> bM` through `[laN, core, lbM]`, `a1 <-> a2` and `b1 <-> b2`
/// through their two access links.
pub fn dumbbell() -> NetZone {
    let mut zone = NetZone::new("dumbbell", RoutingKind::Full);
    for host in ["a1", "a2", "b1", "b2"] {
        zone.add_host(Host::new(host, 1e9))
            .add_link(Link::new(format!("l{host}"), 1e9, 1e-4));
    }
    zone.add_link(Link::new("core", 1e8, 1e-3));

    for src in ["a1", "a2"] {
        for dst in ["b1", "b2"] {
            let access_src = format!("l{src}");
            let access_dst = format!("l{dst}");
            zone.add_route(src, dst, &[&access_src, "core", &access_dst], true);
        }
    }
    zone.add_route("a1", "a2", &["la1", "la2"], true)
        .add_route("b1", "b2", &["lb1", "lb2"], true);
    zone
}

/// Two hosts `x` and `y` on a single zero-latency `wire`.
pub fn wire(bandwidth: f64) -> NetZone {
    let mut zone = NetZone::new("wire", RoutingKind::Full);
    zone.add_host(Host::new("x", 1e9))
        .add_host(Host::new("y", 1e9))
        .add_link(Link::new("wire", bandwidth, 0.0))
        .add_route("x", "y", &["wire"], true);
    zone
}
