//! Selecting model variants through configuration items

use std::rc::Rc;

use simkern_core::{Activity, ActorCode, Comm, ConfigurationError, Engine, EngineError, SimkernConfig};
use simkern_tests::{assert_close, dumbbell, recorder, start_engine};

/// End date of a lone `a1 -> b1` transfer of `bytes` under `items`.
fn lone_transfer(items: &[&str], bytes: f64) -> f64 {
    let engine = start_engine(items, dumbbell());
    engine
        .create_actor(
            "flow",
            "a1",
            ActorCode::from_fn(move |_ctx| async move {
                Comm::sendto("a1", "b1", bytes).wait().await?;
                Ok(())
            }),
        )
        .unwrap();
    engine.run().unwrap().end_clock
}

#[test]
fn test_constant_network_takes_one_second() {
    assert_close(lone_transfer(&["network/model:Constant"], 1e9), 1.0);
    assert_close(lone_transfer(&["network/model:Constant"], 10.0), 1.0);
    assert_eq!(lone_transfer(&["network/model:Constant"], 0.0), 0.0);
}

#[test]
fn test_lv08_corrections_slow_transfers_down() {
    let cm02 = lone_transfer(&["network/model:CM02"], 1e6);
    let lv08 = lone_transfer(&["network/model:LV08"], 1e6);
    let latency = 1.2e-3;
    assert_close(cm02, latency + 1e6 / 1e8);
    assert_close(lv08, 13.01 * latency + 1e6 / (0.97 * 1e8));
}

#[test]
fn test_factor_overrides_apply_to_cm02() {
    let end = lone_transfer(
        &[
            "network/model:CM02",
            "network/latency-factor:2",
            "network/bandwidth-factor:0.5",
        ],
        1e6,
    );
    assert_close(end, 2.0 * 1.2e-3 + 1e6 / 0.5e8);
}

#[test]
fn test_catalog_entries_without_support_fail_at_platform_creation() {
    for model in ["IB", "ns-3"] {
        let engine = Engine::with_config(SimkernConfig::default()).unwrap();
        engine.set_config(&format!("network/model:{model}")).unwrap();
        let result = engine.load_platform(dumbbell());
        assert!(
            matches!(
                result,
                Err(EngineError::Configuration(ConfigurationError::UnsupportedModel { .. }))
            ),
            "{model}: {result:?}"
        );
        assert!(!engine.is_platform_loaded());
        Engine::shutdown();
    }
}

#[test]
fn test_unknown_model_lists_catalog_in_order() {
    let mut config = SimkernConfig::default();
    let error = config.set("network/model:Reno").unwrap_err();
    match error {
        ConfigurationError::UnknownModel { valid, requested, .. } => {
            assert_eq!(requested, "Reno");
            assert_eq!(valid, "LV08, Constant, SMPI, IB, CM02, ns-3");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(config.set("network/model:cm02").is_err());
}

#[test]
fn test_ti_is_only_available_to_cpu() {
    let mut config = SimkernConfig::default();
    assert!(matches!(
        config.set("network/optim:TI"),
        Err(ConfigurationError::UnsupportedOptimization { .. })
    ));
    config.set("cpu/optim:TI").unwrap();
    assert_eq!(config.models.cpu_optim, "TI");
}

#[test]
fn test_every_cpu_optimization_gives_the_same_dates() {
    for mode in ["Lazy", "Full", "TI"] {
        let item = format!("cpu/optim:{mode}");
        let engine = start_engine(&[&item], dumbbell());
        let ends = recorder();
        for (name, flops) in [("small", 5e8), ("large", 1.5e9)] {
            let sink = Rc::clone(&ends);
            engine
                .create_actor(
                    name,
                    "a1",
                    ActorCode::from_fn(move |ctx| {
                        let sink = Rc::clone(&sink);
                        async move {
                            ctx.execute(flops).await?;
                            sink.borrow_mut().push(ctx.now());
                            Ok(())
                        }
                    }),
                )
                .unwrap();
        }

        engine.run().unwrap();
        let ends = ends.borrow();
        assert_close(ends[0], 1.0);
        assert_close(ends[1], 2.0);
    }
}

#[test]
fn test_compound_host_model_behaves_like_default() {
    let engine = start_engine(&["host/model:compound", "network/model:CM02"], dumbbell());
    engine
        .create_actor(
            "worker",
            "b2",
            ActorCode::from_fn(|ctx| async move {
                ctx.execute(1e9).await?;
                Comm::sendto("b2", "a1", 1e8).wait().await?;
                Ok(())
            }),
        )
        .unwrap();

    let report = engine.run().unwrap();
    assert_close(report.end_clock, 1.0 + 1.2e-3 + 1.0);
}
