//! Command-line configuration, version contract and report serialization

use simkern_core::version::{
    VERSION, Version, VersionCompatibility, check_versions, version_check, version_get,
    version_string,
};
use simkern_core::{
    ActorCode, ConfigurationError, Engine, EngineError, SimkernError, SimkernConfig,
};
use simkern_tests::{EngineGuard, assert_close, dumbbell, start_engine};

#[test]
fn test_from_args_consumes_cfg_items() {
    let mut args = vec![
        "program".to_string(),
        "--cfg=simulation/seed:9".to_string(),
        "platform.xml".to_string(),
        "--cfg=network/model:CM02".to_string(),
        "--verbose".to_string(),
    ];
    let engine = Engine::from_args(&mut args).unwrap();
    let config = engine.config();
    Engine::shutdown();

    assert_eq!(args, vec!["program", "platform.xml", "--verbose"]);
    assert_eq!(config.simulation.seed, 9);
    assert_eq!(config.models.network, "CM02");
}

#[test]
fn test_from_args_rejects_bad_items() {
    let mut args = vec!["program".to_string(), "--cfg=no-separator".to_string()];
    let result = Engine::from_args(&mut args);
    assert!(matches!(
        result,
        Err(EngineError::Configuration(ConfigurationError::MalformedItem { .. }))
    ));
    assert!(!Engine::is_initialized());

    let error = SimkernError::from(result.unwrap_err());
    assert!(error.is_configuration_error());
}

#[test]
fn test_config_keys_are_validated() {
    let mut config = SimkernConfig::default();
    assert!(matches!(
        config.set("network/colour:blue"),
        Err(ConfigurationError::UnknownKey { .. })
    ));
    assert!(matches!(
        config.set("precision/timing:-1"),
        Err(ConfigurationError::InvalidValue { .. })
    ));
    assert!(matches!(
        config.set(":value"),
        Err(ConfigurationError::MalformedItem { .. })
    ));
    config.set("network/TCP-gamma:65536").unwrap();
    assert_eq!(config.network.tcp_gamma, 65536.0);
}

#[test]
fn test_version_contract() {
    assert_eq!(
        version_string(),
        format!("{}.{}.{}", VERSION.major, VERSION.minor, VERSION.patch)
    );
    assert_eq!(version_get(), (VERSION.major, VERSION.minor, VERSION.patch));
    assert_eq!(
        version_check(VERSION.major, VERSION.minor, VERSION.patch).unwrap(),
        VersionCompatibility::Exact
    );
    assert!(matches!(
        version_check(VERSION.major + 1, VERSION.minor, VERSION.patch),
        Err(ConfigurationError::VersionMismatch { .. })
    ));

    // Stable builds tolerate a patch difference, development builds do not
    assert_eq!(
        check_versions(Version::new(3, 36, 1), Version::new(3, 36, 2)).unwrap(),
        VersionCompatibility::PatchMismatch
    );
    assert!(matches!(
        check_versions(Version::new(3, 36, 90), Version::new(3, 36, 2)),
        Err(ConfigurationError::DevelopmentVersionMismatch { .. })
    ));
}

#[test]
fn test_report_serializes_to_json() {
    let engine: EngineGuard = start_engine(&[], dumbbell());
    engine
        .create_actor(
            "worker",
            "a1",
            ActorCode::from_fn(|ctx| async move {
                ctx.execute(2e9).await?;
                Ok(())
            }),
        )
        .unwrap();

    let report = engine.run().unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outcome"]["kind"], "completed");
    assert_close(json["end_clock"].as_f64().unwrap(), 2.0);
    assert_eq!(json["actors_created"], 1);
    assert_eq!(json["seed"], 42);
}

#[test]
fn test_engine_refuses_work_without_platform() {
    let engine = Engine::with_config(SimkernConfig::default()).unwrap();
    let created = engine.create_actor("early", "a1", ActorCode::from_fn(|_ctx| async { Ok(()) }));
    let ran = engine.run();
    Engine::shutdown();

    assert!(matches!(created, Err(EngineError::NoPlatform)));
    assert!(matches!(ran, Err(EngineError::NoPlatform)));
}
