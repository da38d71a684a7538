//! Reproducibility and conservation properties of whole runs

use std::rc::Rc;

use proptest::prelude::*;
use simkern_core::platform::{Host, NetZone, RoutingKind};
use simkern_core::{ActorCode, SimulationReport};
use simkern_tests::{dumbbell, recorder, start_engine};

fn single_host(speed: f64) -> NetZone {
    let mut zone = NetZone::new("solo", RoutingKind::Full);
    zone.add_host(Host::new("cpu", speed));
    zone
}

/// One actor per amount, all computing on the same host; returns the last end date.
fn run_execs(speed: f64, amounts: &[f64]) -> f64 {
    let engine = start_engine(&[], single_host(speed));
    for (index, &flops) in amounts.iter().enumerate() {
        engine
            .create_actor(
                &format!("exec-{index}"),
                "cpu",
                ActorCode::from_fn(move |ctx| async move {
                    ctx.execute(flops).await?;
                    Ok(())
                }),
            )
            .unwrap();
    }
    engine.run().unwrap().end_clock
}

/// Workers on the dumbbell pull random amounts from the seeded generator.
fn seeded_workload(seed: u64) -> (SimulationReport, Vec<u64>) {
    let item = format!("simulation/seed:{seed}");
    let engine = start_engine(&[&item], dumbbell());
    let draws = recorder();

    for host in ["a1", "a2", "b1", "b2"] {
        let sink = Rc::clone(&draws);
        engine
            .create_actor(
                host,
                host,
                ActorCode::from_fn(move |ctx| {
                    let sink = Rc::clone(&sink);
                    async move {
                        for _ in 0..3 {
                            let megaflops = ctx.random_range(1, 1000);
                            sink.borrow_mut().push(megaflops);
                            ctx.execute(megaflops as f64 * 1e6).await?;
                            if ctx.random_f64() < 0.5 {
                                ctx.mailbox("shared").put(megaflops, 1e5).await?;
                            } else {
                                let _: u64 = ctx.mailbox("shared").get().await?;
                            }
                        }
                        Ok(())
                    }
                }),
            )
            .unwrap();
    }

    let report = engine.run().unwrap();
    let draws = draws.borrow().clone();
    (report, draws)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_shared_host_is_work_conserving(
        amounts in prop::collection::vec(1e6f64..1e9, 1..6),
        speed in 1e8f64..1e10,
    ) {
        let end = run_execs(speed, &amounts);
        let expected = amounts.iter().sum::<f64>() / speed;
        prop_assert!((end - expected).abs() <= 1e-6 * expected.max(1.0), "end {} expected {}", end, expected);
    }

    #[test]
    fn prop_same_seed_same_run(seed in 0u64..10_000) {
        let (first, first_draws) = seeded_workload(seed);
        let (second, second_draws) = seeded_workload(seed);

        prop_assert_eq!(first_draws, second_draws);
        prop_assert_eq!(first.end_clock, second.end_clock);
        prop_assert_eq!(first.iterations, second.iterations);
        prop_assert_eq!(first.outcome, second.outcome);
        prop_assert_eq!(first.seed, seed);
    }
}
