use accelerator_connector::config::ACCEL_PRECISION;
use accelerator_connector::{
    AcceleratorConnector, ConnectorConfig, DistributionKind, EnvSnapshot, HostCapabilities,
    Platform, PrecisionKind, StrategyKind,
};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

#[test]
fn test_connector_from_json_file() {
    let file = write_config(r#"{"gpus": 2, "accelerator": "ddp", "num_nodes": 2, "sync_batchnorm": true}"#);
    let config = ConnectorConfig::from_json_file(file.path()).unwrap();
    let platform = Platform::new(HostCapabilities::with_gpus(2), EnvSnapshot::default());

    let connector = AcceleratorConnector::new(config.into(), platform).unwrap();
    assert_eq!(connector.distrib_type(), Some(DistributionKind::Ddp));
    let strategy = connector.training_type_plugin();
    assert_eq!(strategy.kind(), StrategyKind::Ddp);
    assert_eq!(strategy.num_nodes(), Some(2));
    assert_eq!(strategy.sync_batchnorm(), Some(true));
}

#[test]
fn test_plugin_names_from_file() {
    let file = write_config(r#"{"gpus": [0, 1], "plugins": ["deepspeed_stage_2"]}"#);
    let config = ConnectorConfig::from_json_file(file.path()).unwrap();
    let platform = Platform::new(HostCapabilities::with_gpus(2), EnvSnapshot::default());

    let connector = AcceleratorConnector::new(config.into(), platform).unwrap();
    assert!(connector.is_training_type_in_plugins());
    assert_eq!(
        connector.training_type_plugin().kind(),
        StrategyKind::DeepSpeed
    );
}

#[test]
fn test_environment_overrides_file() {
    let file = write_config(r#"{"precision": 16}"#);
    let env = EnvSnapshot::from_pairs([(ACCEL_PRECISION, "64")]);
    let config = ConnectorConfig::from_json_file(file.path())
        .unwrap()
        .with_env_overrides(&env);
    let platform = Platform::new(HostCapabilities::cpu_only(), env);

    let connector = AcceleratorConnector::new(config.into(), platform).unwrap();
    assert_eq!(connector.precision(), 64);
    assert_eq!(
        connector.precision_plugin().unwrap().kind(),
        PrecisionKind::Double
    );
}
