//! End-to-end tests from a config directory on disk to built units

mod common;

use common::fixtures::{MockApiServer, TestConfigBuilder};
use orchestrator::rate_limiter::LimiterRegistry;
use orchestrator::services::ConfigOverrides;
use orchestrator::{ConfigManager, Database, Scheduler, ServiceFactory, ServiceManager};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_config_directory_builds_units() {
    let api = MockApiServer::start().await;
    api.mock_healthy().await;

    let test_config = TestConfigBuilder::new()
        .main_line("stop_timeout_seconds = 3")
        .rate_limiter("remote-api", 4.0, 60.0)
        .heartbeat("pulse", 5)
        .http_poll("poller", &api.status_url(), Some("remote-api"))
        .unit_table("[units.legacy]\nkind = \"heartbeat\"\nenabled = false\n")
        .build();

    let config_manager = ConfigManager::new(test_config.config_dir_string())
        .await
        .unwrap();
    let config = config_manager.get_current_config();
    assert_eq!(config.units.len(), 3);
    assert_eq!(config.stop_timeout(), Duration::from_secs(3));

    let scheduler = Scheduler::from_config(&config.scheduler).unwrap();
    let limiters = Arc::new(LimiterRegistry::from_config(&config.rate_limiters));
    let factory = ServiceFactory::new(config.clone(), scheduler.clone(), limiters.clone()).unwrap();

    let units = factory.build().await;
    let mut names: Vec<_> = units.keys().cloned().collect();
    names.sort();
    assert_eq!(names, vec!["poller", "pulse"]);
    assert_eq!(units["poller"].kind(), "http_poll");
    assert_eq!(units["pulse"].interval_seconds(), 5);

    let manager = ServiceManager::new(units, config.stop_timeout());
    let results = manager.start_services().await;
    assert!(results.values().all(|ok| *ok));

    let poller = manager.get_service("poller").await.unwrap();
    poller.update().await;
    assert_eq!(limiters.get("remote-api").unwrap().get_status().successes, 1);

    let stopped = manager.stop_services(config.stop_timeout()).await;
    assert!(stopped.values().all(|ok| *ok));
}

#[tokio::test]
async fn test_unit_with_unknown_limiter_is_rejected_at_load() {
    let test_config = TestConfigBuilder::new()
        .http_poll("orphan", "http://127.0.0.1:9/", Some("not-configured"))
        .build();

    let err = ConfigManager::new(test_config.config_dir_string())
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("not-configured"));
}

#[tokio::test]
async fn test_unknown_kind_is_left_out() {
    let test_config = TestConfigBuilder::new()
        .heartbeat("pulse", 60)
        .unit_table("[units.mystery]\nkind = \"teleporter\"\nrequired = true\n")
        .build();

    let config = ConfigManager::new(test_config.config_dir_string())
        .await
        .unwrap()
        .get_current_config();

    let scheduler = Scheduler::default();
    let limiters = Arc::new(LimiterRegistry::from_config(&config.rate_limiters));
    let factory = ServiceFactory::new(config.clone(), scheduler, limiters).unwrap();

    let units = factory.build().await;
    assert_eq!(units.len(), 1);
    assert!(units.contains_key("pulse"));

    let err = factory
        .build_unit("mystery", &config.units["mystery"])
        .err()
        .unwrap();
    assert!(err.to_string().contains("teleporter"));
}

#[tokio::test]
async fn test_persisted_overrides_are_applied_on_build() {
    let test_config = TestConfigBuilder::new().heartbeat("pulse", 60).build();
    let config = ConfigManager::new(test_config.config_dir_string())
        .await
        .unwrap()
        .get_current_config();

    let database = Database::in_memory().await.unwrap();
    database
        .save_unit_config("pulse", "interval_seconds", &Value::from(15))
        .await
        .unwrap();
    database
        .save_unit_config("pulse", "message", &Value::from("from the database"))
        .await
        .unwrap();
    database
        .save_unit_config("pulse", "bogus", &Value::from(true))
        .await
        .unwrap();
    let overrides: ConfigOverrides = database.get_all_unit_configs().await.unwrap();

    let factory = ServiceFactory::new(
        config.clone(),
        Scheduler::default(),
        Arc::new(LimiterRegistry::new()),
    )
    .unwrap()
    .with_overrides(overrides);

    let units = factory.build().await;
    let pulse = &units["pulse"];
    assert_eq!(pulse.interval_seconds(), 15);

    let status = pulse.get_status().unwrap();
    assert_eq!(status.extra["message"], "from the database");
}

#[tokio::test]
async fn test_missing_main_config_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let result = ConfigManager::new(dir.path().display().to_string()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_custom_kind_registration() {
    use common::fixtures::ScriptedUnit;
    use orchestrator::services::UnitHooks;

    let test_config = TestConfigBuilder::new()
        .unit_table("[units.custom]\nkind = \"scripted\"\ninterval_seconds = 2\n")
        .build();
    let config = ConfigManager::new(test_config.config_dir_string())
        .await
        .unwrap()
        .get_current_config();

    let mut factory = ServiceFactory::new(
        config,
        Scheduler::default(),
        Arc::new(LimiterRegistry::new()),
    )
    .unwrap();
    factory.register_kind("scripted", |_ctx| {
        Ok(Arc::new(ScriptedUnit::new()) as Arc<dyn UnitHooks>)
    });
    assert!(factory.kinds().contains(&"scripted".to_string()));

    let units: HashMap<_, _> = factory.build().await;
    assert_eq!(units["custom"].interval_seconds(), 2);
}
