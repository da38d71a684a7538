//! Availability profiles and imperative state changes during a run

use std::rc::Rc;

use simkern_core::platform::{Host, Link, NetZone, Profile, RoutingKind};
use simkern_core::{Activity, ActivityError, ActorCode, Comm, EngineError};
use simkern_tests::{assert_close, recorder, start_engine};

fn wire_with(link: Link) -> NetZone {
    let mut zone = NetZone::new("wire", RoutingKind::Full);
    zone.add_host(Host::new("x", 1e9))
        .add_host(Host::new("y", 1e9))
        .add_link(link)
        .add_route("x", "y", &["wire"], true);
    zone
}

#[test]
fn test_bandwidth_profile_slows_transfer_down() {
    let link = Link::new("wire", 1e8, 0.0)
        .with_bandwidth_profile(Profile::new(&[(0.5, 0.5)]).unwrap());
    let engine = start_engine(&["network/model:CM02"], wire_with(link));

    engine
        .create_actor(
            "sender",
            "x",
            ActorCode::from_fn(|_ctx| async move {
                Comm::sendto("x", "y", 1e8).wait().await?;
                Ok(())
            }),
        )
        .unwrap();

    // Half the bytes in the first 0.5 s, the other half at half the bandwidth
    let report = engine.run().unwrap();
    assert_close(report.end_clock, 1.5);
}

#[test]
fn test_link_state_profile_fails_transfer() {
    let link = Link::new("wire", 1e8, 0.0)
        .with_state_profile(Profile::new(&[(0.5, 0.0)]).unwrap());
    let engine = start_engine(&["network/model:CM02"], wire_with(link));
    let outcomes = recorder();

    let sink = Rc::clone(&outcomes);
    engine
        .create_actor(
            "sender",
            "x",
            ActorCode::from_fn(move |_ctx| {
                let sink = Rc::clone(&sink);
                async move {
                    let outcome = Comm::sendto("x", "y", 1e8).wait().await;
                    sink.borrow_mut().push(outcome);
                    Ok(())
                }
            }),
        )
        .unwrap();

    let report = engine.run().unwrap();
    assert_eq!(*outcomes.borrow(), vec![Err(ActivityError::Failed)]);
    assert_close(report.end_clock, 0.5);
    assert_eq!(report.activities_failed, 1);
    assert!(!engine.is_link_on("wire"));
}

#[test]
fn test_repeating_speed_profile() {
    let mut zone = NetZone::new("solo", RoutingKind::Full);
    zone.add_host(
        Host::new("cpu", 1e9)
            .with_speed_profile(Profile::repeating(&[(0.0, 1.0), (1.0, 0.5)], 2.0).unwrap()),
    );
    let engine = start_engine(&[], zone);

    engine
        .create_actor(
            "worker",
            "cpu",
            ActorCode::from_fn(|ctx| async move {
                ctx.execute(3e9).await?;
                Ok(())
            }),
        )
        .unwrap();

    // 1 + 0.5 Gflop per 2 s cycle
    let report = engine.run().unwrap();
    assert_close(report.end_clock, 4.0);
}

#[test]
fn test_host_comes_back_after_state_profile() {
    let mut zone = NetZone::new("pair", RoutingKind::Full);
    zone.add_host(Host::new("stable", 1e9)).add_host(
        Host::new("flaky", 1e9).with_state_profile(Profile::new(&[(1.0, 0.0), (2.0, 1.0)]).unwrap()),
    );
    let engine = start_engine(&[], zone);
    let attempts = recorder();

    let sink = Rc::clone(&attempts);
    engine
        .create_actor(
            "launcher",
            "stable",
            ActorCode::from_fn(move |ctx| {
                let sink = Rc::clone(&sink);
                async move {
                    let idle = || ActorCode::from_fn(|_ctx| async { Ok(()) });
                    ctx.sleep_until(1.5).await;
                    let down = ctx.spawn("early", "flaky", idle());
                    sink.borrow_mut().push(matches!(down, Err(EngineError::HostOff { .. })));
                    ctx.sleep_until(2.5).await;
                    let up = ctx.spawn("late", "flaky", idle());
                    sink.borrow_mut().push(up.is_ok());
                    Ok(())
                }
            }),
        )
        .unwrap();

    engine.run().unwrap();
    assert_eq!(*attempts.borrow(), vec![true, true]);
    assert!(engine.is_host_on("flaky"));
}

#[test]
fn test_turning_link_back_on_allows_new_transfers() {
    let engine = start_engine(&["network/model:CM02"], wire_with(Link::new("wire", 1e8, 0.0)));
    engine.turn_off_link("wire").unwrap();
    let outcomes = recorder();

    let sink = Rc::clone(&outcomes);
    let handle = engine.clone();
    engine
        .create_actor(
            "sender",
            "x",
            ActorCode::from_fn(move |_ctx| {
                let sink = Rc::clone(&sink);
                let handle = handle.clone();
                async move {
                    let refused = Comm::sendto("x", "y", 1e6).wait().await;
                    sink.borrow_mut().push(refused.is_err());
                    handle.turn_on_link("wire")?;
                    let accepted = Comm::sendto("x", "y", 1e6).wait().await;
                    sink.borrow_mut().push(accepted.is_ok());
                    Ok(())
                }
            }),
        )
        .unwrap();

    let report = engine.run().unwrap();
    assert_eq!(*outcomes.borrow(), vec![true, true]);
    assert_close(report.end_clock, 0.01);
}

#[test]
fn test_unknown_resource_cannot_be_turned_off() {
    let engine = start_engine(&[], wire_with(Link::new("wire", 1e8, 0.0)));
    assert!(engine.turn_off_host("nowhere").is_err());
    assert!(engine.turn_off_link("nothing").is_err());
}
