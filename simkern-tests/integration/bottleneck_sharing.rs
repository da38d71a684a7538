//! Max-min sharing of links and hosts observed through whole runs

use std::rc::Rc;

use simkern_core::platform::{Host, Link, NetZone, RoutingKind, SharingPolicy};
use simkern_core::{Activity, ActorCode, Comm, RunOutcome};
use simkern_tests::{Recorder, assert_close, dumbbell, recorder, start_engine, wire};

/// Sends `bytes` from `src` to `dst` and records the completion date.
fn transfer(src: &str, dst: &str, bytes: f64, rate: Option<f64>, sink: &Recorder<(String, f64)>) -> ActorCode {
    let src = src.to_string();
    let dst = dst.to_string();
    let sink = Rc::clone(sink);
    ActorCode::from_fn(move |ctx| {
        let comm = Comm::sendto(src.clone(), dst.clone(), bytes);
        let sink = Rc::clone(&sink);
        async move {
            if let Some(rate) = rate {
                comm.set_rate(rate)?;
            }
            comm.wait().await?;
            sink.borrow_mut().push((ctx.name().to_string(), ctx.now()));
            Ok(())
        }
    })
}

/// Latency of an `aN -> bM` route of the dumbbell.
const CROSS_LATENCY: f64 = 1e-4 + 1e-3 + 1e-4;

#[test]
fn test_single_flow_uses_the_whole_bottleneck() {
    let engine = start_engine(&["network/model:CM02"], dumbbell());
    let ends = recorder();
    engine
        .create_actor("flow", "a1", transfer("a1", "b1", 1e8, None, &ends))
        .unwrap();

    let report = engine.run().unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_close(ends.borrow()[0].1, CROSS_LATENCY + 1.0);
}

#[test]
fn test_two_flows_split_the_bottleneck_evenly() {
    let engine = start_engine(&["network/model:CM02"], dumbbell());
    let ends = recorder();
    engine
        .create_actor("first", "a1", transfer("a1", "b1", 1e8, None, &ends))
        .unwrap();
    engine
        .create_actor("second", "a2", transfer("a2", "b2", 1e8, None, &ends))
        .unwrap();

    engine.run().unwrap();
    let ends = ends.borrow();
    assert_eq!(ends.len(), 2);
    for (_, end) in ends.iter() {
        assert_close(*end, CROSS_LATENCY + 2.0);
    }
}

#[test]
fn test_flows_on_disjoint_links_do_not_interfere() {
    let engine = start_engine(&["network/model:CM02"], dumbbell());
    let ends = recorder();
    engine
        .create_actor("west", "a1", transfer("a1", "a2", 1e8, None, &ends))
        .unwrap();
    engine
        .create_actor("east", "b1", transfer("b1", "b2", 1e8, None, &ends))
        .unwrap();

    engine.run().unwrap();
    for (_, end) in ends.borrow().iter() {
        assert_close(*end, 2e-4 + 0.1);
    }
}

#[test]
fn test_short_flow_releases_its_share() {
    let engine = start_engine(&["network/model:CM02"], dumbbell());
    let ends = recorder();
    engine
        .create_actor("short", "a1", transfer("a1", "b1", 5e7, None, &ends))
        .unwrap();
    engine
        .create_actor("long", "a2", transfer("a2", "b2", 1.5e8, None, &ends))
        .unwrap();

    engine.run().unwrap();
    let ends = ends.borrow();
    // Both at 5e7 B/s until the short one is done, then the long one alone at 1e8 B/s
    assert_eq!(ends[0].0, "short");
    assert_close(ends[0].1, CROSS_LATENCY + 1.0);
    assert_eq!(ends[1].0, "long");
    assert_close(ends[1].1, CROSS_LATENCY + 2.0);
}

#[test]
fn test_fatpipe_link_does_not_share() {
    let mut zone = NetZone::new("fat", RoutingKind::Full);
    zone.add_host(Host::new("x", 1e9))
        .add_host(Host::new("y", 1e9))
        .add_link(Link::new("pipe", 1e8, 0.0).with_policy(SharingPolicy::FatPipe))
        .add_route("x", "y", &["pipe"], true);
    let engine = start_engine(&["network/model:CM02"], zone);
    let ends = recorder();
    for name in ["first", "second"] {
        engine
            .create_actor(name, "x", transfer("x", "y", 1e8, None, &ends))
            .unwrap();
    }

    engine.run().unwrap();
    for (_, end) in ends.borrow().iter() {
        assert_close(*end, 1.0);
    }
}

#[test]
fn test_rate_bound_caps_a_lone_flow() {
    let engine = start_engine(&["network/model:CM02"], wire(1e8));
    let ends = recorder();
    engine
        .create_actor("capped", "x", transfer("x", "y", 1e8, Some(5e7), &ends))
        .unwrap();

    engine.run().unwrap();
    assert_close(ends.borrow()[0].1, 2.0);
}

#[test]
fn test_computation_and_communication_progress_independently() {
    let engine = start_engine(&["network/model:CM02"], wire(1e8));
    let ends = recorder();
    engine
        .create_actor("sender", "x", transfer("x", "y", 1e8, None, &ends))
        .unwrap();

    let sink = Rc::clone(&ends);
    engine
        .create_actor(
            "cruncher",
            "x",
            ActorCode::from_fn(move |ctx| {
                let sink = Rc::clone(&sink);
                async move {
                    ctx.execute(5e8).await?;
                    sink.borrow_mut().push((ctx.name().to_string(), ctx.now()));
                    Ok(())
                }
            }),
        )
        .unwrap();

    engine.run().unwrap();
    let ends = ends.borrow();
    assert_eq!(ends[0].0, "cruncher");
    assert_close(ends[0].1, 0.5);
    assert_eq!(ends[1].0, "sender");
    assert_close(ends[1].1, 1.0);
}
