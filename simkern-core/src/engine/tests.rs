//! End-to-end scenarios for the engine: platform, actors and run loop together.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::activity::{Activity, ActivityError, ActivityState, Exec, Io};
use crate::actor::{ActorCode, ActorLaunch};
use crate::config::{ConfigurationError, SimkernConfig};
use crate::engine::{Engine, EngineError, RunOutcome};
use crate::platform::{
    ClusterSpec, Disk, Host, Link, NetPointKind, NetZone, PlatformError, Profile, RoutingKind,
    Storage,
};
use crate::registry::RegistryError;

type Log<T> = Rc<RefCell<Vec<T>>>;

fn log<T>() -> Log<T> {
    Rc::new(RefCell::new(Vec::new()))
}

/// Shuts the thread's engine down when the test ends, even on failure.
struct Shutdown;

impl Drop for Shutdown {
    fn drop(&mut self) {
        Engine::shutdown();
    }
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

/// alice (1 Gflop/s) and bob (2 Gflop/s) joined by a 100 MB/s, 1 ms link.
fn two_hosts() -> NetZone {
    let mut zone = NetZone::new("world", RoutingKind::Full);
    zone.add_host(Host::new("alice", 1e9))
        .add_host(Host::new("bob", 2e9))
        .add_link(Link::new("l1", 1e8, 1e-3))
        .add_route("alice", "bob", &["l1"], true);
    zone
}

fn engine_on(zone: NetZone, items: &[&str]) -> Engine {
    let engine = Engine::with_config(SimkernConfig::default()).unwrap();
    engine.set_config("network/model:CM02").unwrap();
    for item in items {
        engine.set_config(item).unwrap();
    }
    engine.load_platform(zone).unwrap();
    engine
}

#[test]
fn test_engine_is_a_per_thread_singleton() {
    let _guard = Shutdown;
    assert!(Engine::get_instance().is_none());
    assert_eq!(Engine::clock(), 0.0);

    let engine = Engine::with_config(SimkernConfig::default()).unwrap();
    assert!(Engine::is_initialized());
    assert!(matches!(
        Engine::with_config(SimkernConfig::default()),
        Err(EngineError::AlreadyInitialized)
    ));

    Engine::shutdown();
    assert!(Engine::get_instance().is_none());
    assert!(matches!(engine.run(), Err(EngineError::ShutDown)));

    let _again = Engine::with_config(SimkernConfig::default()).unwrap();
    assert!(Engine::get_instance().is_some());
}

#[test]
fn test_clock_is_reset_by_shutdown() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts(), &[]);
    engine
        .create_actor(
            "worker",
            "alice",
            ActorCode::from_fn(|ctx| async move {
                ctx.execute(1e9).await?;
                Ok(())
            }),
        )
        .unwrap();

    let report = engine.run().unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_close(report.end_clock, 1.0);
    assert_close(Engine::clock(), 1.0);
    assert_eq!(report.activities_finished, 1);

    Engine::shutdown();
    assert_eq!(Engine::clock(), 0.0);
}

#[test]
fn test_zero_work_completes_before_the_clock_moves() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts(), &[]);
    let advances = log();
    let seen = log();

    let recorder = Rc::clone(&advances);
    engine
        .on_time_advance(move |now| recorder.borrow_mut().push(now))
        .unwrap();

    let observed = Rc::clone(&seen);
    engine
        .create_actor(
            "idle",
            "alice",
            ActorCode::from_fn(move |ctx| {
                let observed = Rc::clone(&observed);
                async move {
                    let exec = ctx.exec_init(0.0);
                    exec.wait().await?;
                    observed.borrow_mut().push((ctx.now(), exec.state()));
                    Ok(())
                }
            }),
        )
        .unwrap();

    let report = engine.run().unwrap();
    assert_eq!(*seen.borrow(), vec![(0.0, ActivityState::Finished)]);
    assert!(advances.borrow().is_empty());
    assert_eq!(report.end_clock, 0.0);
}

#[test]
fn test_clock_advances_strictly_increase() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts(), &[]);
    let advances = log();

    let recorder = Rc::clone(&advances);
    engine
        .on_time_advance(move |now| recorder.borrow_mut().push(now))
        .unwrap();

    engine
        .create_actor(
            "sleeper",
            "alice",
            ActorCode::from_fn(|ctx| async move {
                ctx.sleep_for(1.0).await;
                ctx.execute(1e9).await?;
                ctx.sleep_for(0.0).await;
                Ok(())
            }),
        )
        .unwrap();
    engine
        .create_actor(
            "late",
            "bob",
            ActorCode::from_fn(|ctx| async move {
                ctx.sleep_until(2.5).await;
                Ok(())
            }),
        )
        .unwrap();

    engine.run().unwrap();
    let advances = advances.borrow();
    assert!(advances.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(advances.len(), 3);
    assert_close(advances[0], 1.0);
    assert_close(advances[1], 2.0);
    assert_close(advances[2], 2.5);
}

#[test]
fn test_executions_share_their_host() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts(), &[]);
    let ends = log();

    for name in ["first", "second"] {
        let ends = Rc::clone(&ends);
        engine
            .create_actor(
                name,
                "alice",
                ActorCode::from_fn(move |ctx| {
                    let ends = Rc::clone(&ends);
                    async move {
                        ctx.execute(1e9).await?;
                        ends.borrow_mut().push(ctx.now());
                        Ok(())
                    }
                }),
            )
            .unwrap();
    }

    engine.run().unwrap();
    let ends = ends.borrow();
    assert_eq!(ends.len(), 2);
    assert_close(ends[0], 2.0);
    assert_close(ends[1], 2.0);
}

#[test]
fn test_mutual_receive_is_a_deadlock() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts(), &[]);
    let deadlocks = Rc::new(Cell::new(0));
    let ends = Rc::new(Cell::new(0));

    let counter = Rc::clone(&deadlocks);
    engine
        .on_deadlock(move || counter.set(counter.get() + 1))
        .unwrap();
    let counter = Rc::clone(&ends);
    engine
        .on_simulation_end(move || counter.set(counter.get() + 1))
        .unwrap();

    for (name, inbox, outbox) in [("ping", "to-ping", "to-pong"), ("pong", "to-pong", "to-ping")] {
        engine
            .create_actor(
                name,
                "alice",
                ActorCode::from_fn(move |ctx| async move {
                    let _token: u32 = ctx.mailbox(inbox).get().await?;
                    ctx.mailbox(outbox).put(1u32, 8.0).await?;
                    Ok(())
                }),
            )
            .unwrap();
    }

    let report = engine.run().unwrap();
    assert_eq!(
        report.outcome,
        RunOutcome::Deadlock {
            blocked: vec!["ping".to_string(), "pong".to_string()]
        }
    );
    assert_eq!(deadlocks.get(), 1);
    assert_eq!(ends.get(), 1);
    assert_eq!(report.end_clock, 0.0);
    assert_eq!(report.iterations, 0);
}

#[test]
fn test_mailbox_transfer_delivers_payload() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts(), &[]);
    let received = log();

    engine
        .create_actor(
            "sender",
            "alice",
            ActorCode::from_fn(|ctx| async move {
                ctx.mailbox("box").put("hello".to_string(), 1e6).await?;
                Ok(())
            }),
        )
        .unwrap();

    let inbox = Rc::clone(&received);
    engine
        .create_actor(
            "receiver",
            "bob",
            ActorCode::from_fn(move |ctx| {
                let inbox = Rc::clone(&inbox);
                async move {
                    let message: String = ctx.mailbox("box").get().await?;
                    inbox.borrow_mut().push((message, ctx.now()));
                    Ok(())
                }
            }),
        )
        .unwrap();

    let report = engine.run().unwrap();
    let received = received.borrow();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, "hello");
    // 1 ms of latency, then 1 MB at 100 MB/s
    assert_close(received[0].1, 0.011);
    assert_eq!(report.activities_finished, 2);
}

#[test]
fn test_payload_of_unexpected_type_is_reported() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts(), &[]);
    let errors = log();

    engine
        .create_actor(
            "sender",
            "alice",
            ActorCode::from_fn(|ctx| async move {
                ctx.mailbox("box").put(42u64, 8.0).await?;
                Ok(())
            }),
        )
        .unwrap();

    let sink = Rc::clone(&errors);
    engine
        .create_actor(
            "receiver",
            "alice",
            ActorCode::from_fn(move |ctx| {
                let sink = Rc::clone(&sink);
                async move {
                    let result = ctx.mailbox("box").get::<String>().await;
                    sink.borrow_mut().push(result.err());
                    Ok(())
                }
            }),
        )
        .unwrap();

    engine.run().unwrap();
    assert!(matches!(
        errors.borrow()[0],
        Some(ActivityError::PayloadType { .. })
    ));
}

#[test]
fn test_wait_for_times_out_and_leaves_activity_running() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts(), &[]);
    let seen = log();

    let observed = Rc::clone(&seen);
    engine
        .create_actor(
            "impatient",
            "alice",
            ActorCode::from_fn(move |ctx| {
                let observed = Rc::clone(&observed);
                async move {
                    let exec = ctx.exec_async(2e9)?;
                    let first = exec.wait_for(0.5).await;
                    observed.borrow_mut().push((ctx.now(), exec.state(), first));
                    let second = exec.wait().await;
                    observed.borrow_mut().push((ctx.now(), exec.state(), second));
                    Ok(())
                }
            }),
        )
        .unwrap();

    engine.run().unwrap();
    let seen = seen.borrow();
    assert_close(seen[0].0, 0.5);
    assert_eq!(seen[0].1, ActivityState::Started);
    assert_eq!(seen[0].2, Err(ActivityError::Timeout { timeout: 0.5 }));
    assert_close(seen[1].0, 2.0);
    assert_eq!(seen[1].1, ActivityState::Finished);
    assert_eq!(seen[1].2, Ok(()));
}

#[test]
fn test_cancel_withdraws_and_freezes_remaining_work() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts(), &[]);
    let seen = log();

    let observed = Rc::clone(&seen);
    engine
        .create_actor(
            "canceler",
            "alice",
            ActorCode::from_fn(move |ctx| {
                let observed = Rc::clone(&observed);
                async move {
                    let exec = ctx.exec_async(2e9)?;
                    let at_start = exec.get_remaining();
                    ctx.sleep_for(0.5).await;
                    let halfway = exec.get_remaining();
                    exec.cancel()?;
                    exec.cancel()?;
                    let outcome = exec.wait().await;
                    observed.borrow_mut().push((at_start, halfway, exec.get_remaining()));
                    assert_eq!(outcome, Err(ActivityError::Canceled));
                    Ok(())
                }
            }),
        )
        .unwrap();

    let report = engine.run().unwrap();
    let (at_start, halfway, after) = seen.borrow()[0];
    assert_close(at_start, 2e9);
    assert!((halfway - 1.5e9).abs() < 1.0);
    assert_eq!(after, halfway);
    assert_eq!(report.activities_canceled, 1);
    assert_close(report.end_clock, 0.5);
}

#[test]
fn test_lifecycle_rules_of_a_finished_activity() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts(), &[]);
    let seen = log();

    let observed = Rc::clone(&seen);
    engine
        .create_actor(
            "worker",
            "bob",
            ActorCode::from_fn(move |ctx| {
                let observed = Rc::clone(&observed);
                async move {
                    let exec = ctx.exec_init(1e9);
                    exec.start()?;
                    let restart = exec.start();
                    let first = exec.wait().await;
                    let second = exec.wait().await;
                    let cancel = exec.cancel();
                    observed.borrow_mut().push((restart, first, second, cancel, exec.state()));
                    Ok(())
                }
            }),
        )
        .unwrap();

    engine.run().unwrap();
    let seen = seen.borrow();
    let (restart, first, second, cancel, state) = &seen[0];
    assert_eq!(
        *restart,
        Err(ActivityError::NotInited {
            state: ActivityState::Started
        })
    );
    assert_eq!(first, second);
    assert_eq!(*first, Ok(()));
    assert_eq!(*cancel, Ok(()));
    assert_eq!(*state, ActivityState::Finished);
}

#[test]
fn test_turning_host_off_fails_work_and_kills_actors() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts(), &[]);
    let slot: Rc<RefCell<Option<Exec>>> = Rc::new(RefCell::new(None));

    let holder = Rc::clone(&slot);
    engine
        .create_actor(
            "victim",
            "alice",
            ActorCode::from_fn(move |ctx| {
                let holder = Rc::clone(&holder);
                async move {
                    let exec = ctx.exec_init(1e10);
                    holder.borrow_mut().replace(exec.clone());
                    exec.wait().await?;
                    Ok(())
                }
            }),
        )
        .unwrap();

    let handle = engine.clone();
    engine
        .add_timer(1.0, move || {
            handle.turn_off_host("alice").unwrap();
        })
        .unwrap();

    let report = engine.run().unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_close(report.end_clock, 1.0);
    assert_eq!(report.activities_failed, 1);
    assert_eq!(report.actors_failed, 0);
    assert_eq!(slot.borrow().as_ref().map(|exec| exec.state()), Some(ActivityState::Failed));

    assert!(!engine.is_host_on("alice"));
    assert!(matches!(
        engine.create_actor("late", "alice", ActorCode::from_fn(|_ctx| async { Ok(()) })),
        Err(EngineError::HostOff { .. })
    ));
    engine.turn_on_host("alice").unwrap();
    assert!(engine.is_host_on("alice"));
}

#[test]
fn test_turning_link_off_fails_both_ends() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts(), &[]);
    let outcomes = log();

    let sink = Rc::clone(&outcomes);
    engine
        .create_actor(
            "sender",
            "alice",
            ActorCode::from_fn(move |ctx| {
                let sink = Rc::clone(&sink);
                async move {
                    let outcome = ctx.mailbox("box").put(7u64, 1e8).await;
                    sink.borrow_mut().push(outcome);
                    Ok(())
                }
            }),
        )
        .unwrap();
    let sink = Rc::clone(&outcomes);
    engine
        .create_actor(
            "receiver",
            "bob",
            ActorCode::from_fn(move |ctx| {
                let sink = Rc::clone(&sink);
                async move {
                    let outcome = ctx.mailbox("box").get::<u64>().await.map(|_| ());
                    sink.borrow_mut().push(outcome);
                    Ok(())
                }
            }),
        )
        .unwrap();

    let handle = engine.clone();
    engine
        .add_timer(0.5, move || {
            handle.turn_off_link("l1").unwrap();
        })
        .unwrap();

    let report = engine.run().unwrap();
    assert_eq!(
        *outcomes.borrow(),
        vec![Err(ActivityError::Failed), Err(ActivityError::Failed)]
    );
    assert_close(report.end_clock, 0.5);
    assert!(!engine.is_link_on("l1"));
}

#[test]
fn test_daemons_are_killed_with_the_last_regular_actor() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts(), &[]);

    engine
        .create_actor(
            "heartbeat",
            "bob",
            ActorCode::from_fn(|ctx| async move {
                ctx.daemonize();
                loop {
                    ctx.sleep_for(1.0).await;
                }
            }),
        )
        .unwrap();
    engine
        .create_actor(
            "worker",
            "alice",
            ActorCode::from_fn(|ctx| async move {
                ctx.sleep_for(3.0).await;
                Ok(())
            }),
        )
        .unwrap();

    let report = engine.run().unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_close(report.end_clock, 3.0);
    assert_eq!(engine.actor_count(), 0);
}

#[test]
fn test_run_until_stops_at_the_limit_and_resumes() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts(), &[]);
    engine
        .create_actor(
            "sleeper",
            "alice",
            ActorCode::from_fn(|ctx| async move {
                ctx.sleep_for(10.0).await;
                Ok(())
            }),
        )
        .unwrap();

    let report = engine.run_until(4.0).unwrap();
    assert_eq!(report.outcome, RunOutcome::TimeLimit);
    assert_close(report.end_clock, 4.0);
    assert_eq!(engine.actor_count(), 1);

    assert!(matches!(
        engine.run_until(1.0),
        Err(EngineError::ClockBackwards { .. })
    ));

    let report = engine.run().unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_close(report.end_clock, 10.0);
}

#[test]
fn test_deployment_resolves_functions_and_default() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts(), &[]);
    let ends = log();

    let worker_ends = Rc::clone(&ends);
    engine.register_function(
        "worker",
        ActorCode::new(move |ctx, args| {
            let ends = Rc::clone(&worker_ends);
            async move {
                let flops = args
                    .first()
                    .map(|arg| arg.parse::<f64>())
                    .transpose()?
                    .unwrap_or(0.0);
                ctx.execute(flops).await?;
                ends.borrow_mut().push((ctx.name().to_string(), ctx.now()));
                Ok(())
            }
        }),
    );

    let unknown = [ActorLaunch::new("x", "alice", "nope")];
    assert!(matches!(
        engine.load_deployment(&unknown),
        Err(EngineError::UnknownFunction { .. })
    ));

    engine.register_default(ActorCode::from_fn(|_ctx| async { Ok(()) }));
    let deployment = [
        ActorLaunch::new("w0", "alice", "worker").with_args(["1e9"]),
        ActorLaunch::new("w1", "bob", "worker").with_args(["1e9"]),
        ActorLaunch::new("x", "alice", "nope"),
    ];
    let ids = engine.load_deployment(&deployment).unwrap();
    assert_eq!(ids.len(), 3);
    assert_eq!(engine.filtered_actors(|info| info.host == "alice").len(), 2);

    engine.run().unwrap();
    let ends = ends.borrow();
    assert_eq!(ends.len(), 2);
    assert_eq!(ends[0].0, "w1");
    assert_close(ends[0].1, 0.5);
    assert_eq!(ends[1].0, "w0");
    assert_close(ends[1].1, 1.0);
}

#[test]
fn test_speed_profile_slows_host_down() {
    let _guard = Shutdown;
    let mut zone = NetZone::new("world", RoutingKind::Full);
    zone.add_host(
        Host::new("alice", 1e9).with_speed_profile(Profile::new(&[(0.0, 0.5)]).unwrap()),
    );
    let engine = engine_on(zone, &[]);

    engine
        .create_actor(
            "worker",
            "alice",
            ActorCode::from_fn(|ctx| async move {
                ctx.execute(1e9).await?;
                Ok(())
            }),
        )
        .unwrap();

    let report = engine.run().unwrap();
    assert_close(report.end_clock, 2.0);
}

#[test]
fn test_trace_integration_follows_a_stepped_speed_profile() {
    for optim in ["cpu/optim:TI", "cpu/optim:Lazy"] {
        let _guard = Shutdown;
        let mut zone = NetZone::new("world", RoutingKind::Full);
        let profile = Profile::new(&[(0.0, 1.0), (1.0, 0.5), (2.0, 0.25)]).unwrap();
        zone.add_host(Host::new("alice", 1e9).with_speed_profile(profile));
        let engine = engine_on(zone, &[optim]);

        engine
            .create_actor(
                "worker",
                "alice",
                ActorCode::from_fn(|ctx| async move {
                    ctx.execute(2e9).await?;
                    Ok(())
                }),
            )
            .unwrap();

        // 1e9 flops in [0, 1), 5e8 in [1, 2), then 5e8 at a quarter speed.
        let report = engine.run().unwrap();
        assert_close(report.end_clock, 4.0);
    }
}

#[test]
fn test_state_profile_turns_host_off() {
    let _guard = Shutdown;
    let mut zone = NetZone::new("world", RoutingKind::Full);
    zone.add_host(
        Host::new("alice", 1e9).with_state_profile(Profile::new(&[(1.0, 0.0)]).unwrap()),
    );
    let engine = engine_on(zone, &[]);

    engine
        .create_actor(
            "worker",
            "alice",
            ActorCode::from_fn(|ctx| async move {
                ctx.execute(1e10).await?;
                Ok(())
            }),
        )
        .unwrap();

    let report = engine.run().unwrap();
    assert_close(report.end_clock, 1.0);
    assert_eq!(report.activities_failed, 1);
    assert!(!engine.is_host_on("alice"));
}

#[test]
fn test_parallel_tasks_need_ptask_host_model() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts(), &[]);
    let errors = log();

    let sink = Rc::clone(&errors);
    engine
        .create_actor(
            "driver",
            "alice",
            ActorCode::from_fn(move |_ctx| {
                let sink = Rc::clone(&sink);
                async move {
                    let task = Exec::parallel(&["alice", "bob"], vec![1e9, 2e9], vec![0.0; 4]);
                    sink.borrow_mut().push(task.start().err());
                    Ok(())
                }
            }),
        )
        .unwrap();

    engine.run().unwrap();
    assert!(matches!(
        errors.borrow()[0],
        Some(ActivityError::Unsupported { .. })
    ));
}

#[test]
fn test_parallel_task_under_ptask_model() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts(), &["host/model:ptask_L07"]);

    engine
        .create_actor(
            "driver",
            "alice",
            ActorCode::from_fn(|ctx| async move {
                let task = Exec::parallel(
                    &["alice", "bob"],
                    vec![1e9, 2e9],
                    vec![0.0, 1e6, 0.0, 0.0],
                );
                task.wait().await?;
                ctx.execute(1e9).await?;
                Ok(())
            }),
        )
        .unwrap();

    let report = engine.run().unwrap();
    assert_eq!(report.activities_finished, 2);
    assert!(report.end_clock >= 2.0 && report.end_clock < 2.1);
}

#[test]
fn test_actors_spawn_and_kill_each_other() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts(), &[]);
    let kills = log();

    let sink = Rc::clone(&kills);
    engine
        .create_actor(
            "parent",
            "alice",
            ActorCode::from_fn(move |ctx| {
                let sink = Rc::clone(&sink);
                async move {
                    let child = ctx.spawn(
                        "child",
                        "bob",
                        ActorCode::from_fn(|ctx| async move {
                            ctx.execute(1e12).await?;
                            Ok(())
                        }),
                    )?;
                    ctx.sleep_for(1.0).await;
                    sink.borrow_mut().push(ctx.kill(child));
                    sink.borrow_mut().push(ctx.kill(child));
                    Ok(())
                }
            }),
        )
        .unwrap();

    let report = engine.run().unwrap();
    assert_eq!(*kills.borrow(), vec![true, false]);
    assert_close(report.end_clock, 1.0);
    assert_eq!(report.actors_created, 2);
    assert_eq!(report.activities_canceled, 1);
}

#[test]
fn test_yield_lets_other_actors_run_first() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts(), &[]);
    let order = log();

    for name in ["a", "b"] {
        let order = Rc::clone(&order);
        engine
            .create_actor(
                name,
                "alice",
                ActorCode::from_fn(move |ctx| {
                    let order = Rc::clone(&order);
                    async move {
                        order.borrow_mut().push(format!("{}1", ctx.name()));
                        ctx.yield_now().await;
                        order.borrow_mut().push(format!("{}2", ctx.name()));
                        Ok(())
                    }
                }),
            )
            .unwrap();
    }

    engine.run().unwrap();
    assert_eq!(*order.borrow(), vec!["a1", "b1", "a2", "b2"]);
}

#[test]
fn test_random_draws_follow_the_seed() {
    let draws = || {
        let _guard = Shutdown;
        let engine = engine_on(two_hosts(), &["simulation/seed:7"]);
        let values = log();
        let sink = Rc::clone(&values);
        engine
            .create_actor(
                "dice",
                "alice",
                ActorCode::from_fn(move |ctx| {
                    let sink = Rc::clone(&sink);
                    async move {
                        for _ in 0..5 {
                            sink.borrow_mut().push(ctx.random_range(0, 6));
                        }
                        Ok(())
                    }
                }),
            )
            .unwrap();
        let report = engine.run().unwrap();
        assert_eq!(report.seed, 7);
        values.borrow().clone()
    };

    assert_eq!(draws(), draws());
}

#[test]
fn test_disk_write_progresses_at_write_bandwidth() {
    let _guard = Shutdown;
    let mut zone = two_hosts();
    zone.add_disk(Disk::new("sda", "alice", 1e8, 5e7));
    let engine = engine_on(zone, &[]);
    let performed = log();

    let sink = Rc::clone(&performed);
    engine
        .create_actor(
            "writer",
            "alice",
            ActorCode::from_fn(move |_ctx| {
                let sink = Rc::clone(&sink);
                async move {
                    let io = Io::disk_write("sda", 1e8);
                    io.wait().await?;
                    sink.borrow_mut().push(io.performed_ioops());
                    Ok(())
                }
            }),
        )
        .unwrap();

    let report = engine.run().unwrap();
    assert_close(report.end_clock, 2.0);
    assert_eq!(*performed.borrow(), vec![100_000_000_u64]);
    assert!(engine.disk_by_name_or_null("sda").is_some());
}

#[test]
fn test_configuration_is_frozen_by_platform_creation() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts(), &[]);
    assert!(matches!(
        engine.set_config("cpu/optim:Full"),
        Err(EngineError::Configuration(
            ConfigurationError::PlatformAlreadyCreated { .. }
        ))
    ));
    assert!(matches!(
        engine.load_platform(two_hosts()),
        Err(EngineError::PlatformAlreadyLoaded)
    ));
}

#[test]
fn test_failing_actor_is_counted_and_isolated() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts(), &[]);

    engine
        .create_actor(
            "broken",
            "alice",
            ActorCode::from_fn(|_ctx| async { Err(anyhow::anyhow!("boom")) }),
        )
        .unwrap();
    engine
        .create_actor(
            "healthy",
            "bob",
            ActorCode::from_fn(|ctx| async move {
                ctx.execute(2e9).await?;
                Ok(())
            }),
        )
        .unwrap();

    let report = engine.run().unwrap();
    assert_eq!(report.actors_failed, 1);
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_close(report.end_clock, 1.0);
}

#[test]
fn test_platform_signals_and_queries() {
    let _guard = Shutdown;
    let engine = Engine::with_config(SimkernConfig::default()).unwrap();
    let events = log();

    let sink = Rc::clone(&events);
    engine
        .on_platform_creation(move || sink.borrow_mut().push("creation"))
        .unwrap();
    let sink = Rc::clone(&events);
    engine
        .on_platform_created(move || sink.borrow_mut().push("created"))
        .unwrap();

    let mut root = NetZone::new("root", RoutingKind::Full);
    root.add_child(two_hosts());
    let spec = ClusterSpec {
        link_bandwidth: 1.25e8,
        link_latency: 5e-5,
        backbone: None,
    };
    root.add_child(NetZone::cluster("rack", "node-", 4, 1e9, spec));
    engine.load_platform(root).unwrap();

    assert_eq!(*events.borrow(), vec!["creation", "created"]);
    assert!(engine.host_by_name("alice").is_ok());
    assert!(engine.host_by_name("nobody").is_err());
    assert!(engine.host_by_name_or_null("nobody").is_none());
    assert!(engine.link_by_name_or_null("l1").is_some());
    assert_eq!(engine.netzone_root().map(|zone| zone.name().to_string()), Some("root".to_string()));
    assert!(engine.netzone_by_name_or_null("world").is_some());
    assert_eq!(engine.filtered_netzones(RoutingKind::Cluster).len(), 1);
    assert_eq!(
        engine.filtered_hosts(|host| host.speed() > 1.5e9).len(),
        1
    );
}

/// two_hosts() plus a disk and a storage on each host.
fn two_hosts_with_devices() -> NetZone {
    let mut zone = two_hosts();
    zone.add_disk(Disk::new("alice-ssd", "alice", 5e8, 2e8))
        .add_disk(Disk::new("bob-ssd", "bob", 5e8, 2e8))
        .add_storage(Storage::new("alice-vol", "alice", 1e8, 1e8, 1e12))
        .add_storage(Storage::new("bob-vol", "bob", 1e8, 1e8, 1e12));
    zone
}

#[test]
fn test_every_registry_offers_both_lookup_forms() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts_with_devices(), &[]);

    assert_eq!(engine.disk_by_name("bob-ssd").unwrap().host(), "bob");
    assert!(matches!(
        engine.disk_by_name("nvme"),
        Err(EngineError::Registry(RegistryError::NotFound { kind: "disk", .. }))
    ));
    assert_eq!(engine.disk_count(), 2);
    assert_eq!(engine.filtered_disks(|disk| disk.host() == "alice").len(), 1);

    assert_eq!(engine.storage_by_name("alice-vol").unwrap().size(), 1e12);
    assert!(engine.storage_by_name("tape").is_err());
    assert!(engine.storage_by_name_or_null("tape").is_none());
    assert_eq!(engine.storage_count(), 2);
    let volumes: Vec<String> = engine
        .all_storages()
        .iter()
        .map(|storage| storage.name().to_string())
        .collect();
    assert_eq!(volumes, vec!["alice-vol", "bob-vol"]);

    let points: Vec<String> = engine
        .all_netpoints()
        .iter()
        .map(|point| point.name().to_string())
        .collect();
    assert_eq!(points, vec!["world", "alice", "bob"]);
    assert_eq!(engine.netpoint_count(), 3);
    assert_eq!(engine.netpoint_by_name("alice").unwrap().kind(), NetPointKind::Host);
    assert!(engine.netpoint_by_name("router-9").is_err());
    assert_eq!(
        engine
            .filtered_netpoints(|point| point.kind() == NetPointKind::NetZone)
            .len(),
        1
    );
}

#[test]
fn test_destroying_a_host_unregisters_it_and_its_devices() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts_with_devices(), &[]);
    let outcome = log();

    let sink = Rc::clone(&outcome);
    engine
        .create_actor(
            "remote",
            "alice",
            ActorCode::from_fn(move |_ctx| {
                let sink = Rc::clone(&sink);
                async move {
                    let exec = Exec::on_host("bob", 1e10);
                    sink.borrow_mut().push(exec.wait().await);
                    Ok(())
                }
            }),
        )
        .unwrap();

    let handle = engine.clone();
    engine
        .add_timer(1.0, move || {
            handle.destroy_host("bob").unwrap();
        })
        .unwrap();

    let report = engine.run().unwrap();
    assert_eq!(*outcome.borrow(), vec![Err(ActivityError::Failed)]);
    assert_close(report.end_clock, 1.0);

    assert!(engine.host_by_name_or_null("bob").is_none());
    assert!(engine.netpoint_by_name_or_null("bob").is_none());
    assert!(engine.disk_by_name_or_null("bob-ssd").is_none());
    assert!(engine.storage_by_name_or_null("bob-vol").is_none());
    assert_eq!(engine.host_count(), 1);
    assert_eq!(engine.disk_count(), 1);
    assert_eq!(engine.storage_count(), 1);
    assert!(!engine.is_host_on("bob"));

    assert!(matches!(
        engine.destroy_host("bob"),
        Err(EngineError::Platform(PlatformError::Registry(RegistryError::NotFound { .. })))
    ));
    assert!(matches!(
        engine.create_actor("late", "bob", ActorCode::from_fn(|_ctx| async { Ok(()) })),
        Err(EngineError::UnknownHost { .. })
    ));
}

#[test]
fn test_destroyed_link_keeps_failing_its_routes() {
    let _guard = Shutdown;
    let engine = engine_on(two_hosts_with_devices(), &[]);

    engine.destroy_link("l1").unwrap();
    engine.destroy_disk("alice-ssd").unwrap();
    engine.destroy_storage("alice-vol").unwrap();

    assert!(engine.link_by_name("l1").is_err());
    assert_eq!(engine.link_count(), 0);
    assert!(!engine.is_link_on("l1"));
    assert!(engine.disk_by_name("alice-ssd").is_err());
    assert!(engine.storage_by_name("alice-vol").is_err());
    assert!(engine.destroy_link("l1").is_err());

    let outcome = log();
    let sink = Rc::clone(&outcome);
    engine
        .create_actor(
            "sender",
            "alice",
            ActorCode::from_fn(move |ctx| {
                let sink = Rc::clone(&sink);
                async move {
                    let outcome = ctx.mailbox("box").put(7u64, 1e6).await;
                    sink.borrow_mut().push(outcome);
                    Ok(())
                }
            }),
        )
        .unwrap();
    engine
        .create_actor(
            "receiver",
            "bob",
            ActorCode::from_fn(|ctx| async move {
                let _ = ctx.mailbox("box").get::<u64>().await;
                Ok(())
            }),
        )
        .unwrap();

    engine.run().unwrap();
    assert_eq!(*outcome.borrow(), vec![Err(ActivityError::Failed)]);
}
