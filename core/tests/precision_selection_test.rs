use accelerator_connector::plugins::BuiltinPrecision;
use accelerator_connector::{
    AcceleratorConnector, AmpType, ConnectorError, EnvSnapshot, GpuRequest, HostCapabilities,
    Platform, PrecisionKind, PrecisionPlugin, ResolutionInput, TpuCores,
};
use std::sync::Arc;

fn on_gpus(input: ResolutionInput, host: HostCapabilities) -> Result<AcceleratorConnector, ConnectorError> {
    AcceleratorConnector::new(
        input.with_gpus(GpuRequest::Count(2)),
        Platform::new(host, EnvSnapshot::default()),
    )
}

fn precision_kind(input: ResolutionInput, host: HostCapabilities) -> PrecisionKind {
    on_gpus(input, host).unwrap().precision_plugin().unwrap().kind()
}

fn apex_host() -> HostCapabilities {
    HostCapabilities {
        apex_available: true,
        ..HostCapabilities::with_gpus(2)
    }
}

#[test]
fn test_full_and_double() {
    let host = HostCapabilities::with_gpus(2);
    assert_eq!(
        precision_kind(ResolutionInput::new(), host.clone()),
        PrecisionKind::Full
    );
    assert_eq!(
        precision_kind(ResolutionInput::new().with_precision(64), host),
        PrecisionKind::Double
    );
}

#[test]
fn test_unsupported_bit_width() {
    let err = on_gpus(
        ResolutionInput::new().with_precision(8),
        HostCapabilities::with_gpus(2),
    )
    .unwrap_err();
    assert!(matches!(err, ConnectorError::UnsupportedPrecision(8)));
}

#[test]
fn test_native_half_follows_strategy() {
    let host = HostCapabilities::with_gpus(2);
    for (backend, expected) in [
        ("ddp", PrecisionKind::NativeMixed),
        ("ddp_sharded", PrecisionKind::ShardedNativeMixed),
        ("ddp_sharded_spawn", PrecisionKind::ShardedNativeMixed),
        ("ddp_fully_sharded", PrecisionKind::FullyShardedNativeMixed),
    ] {
        let input = ResolutionInput::new()
            .with_backend(backend)
            .with_precision(16);
        assert_eq!(precision_kind(input, host.clone()), expected, "{backend}");
    }
}

#[test]
fn test_native_half_on_cpu() {
    let err = AcceleratorConnector::new(
        ResolutionInput::new().with_precision(16),
        Platform::new(HostCapabilities::cpu_only(), EnvSnapshot::default()),
    )
    .unwrap_err();
    assert!(matches!(err, ConnectorError::NativeAmpOnCpu));
}

#[test]
fn test_native_unavailable_falls_back_to_apex() {
    let host = HostCapabilities {
        native_amp_available: false,
        ..apex_host()
    };
    let connector = on_gpus(
        ResolutionInput::new().with_backend("ddp").with_precision(16),
        host,
    )
    .unwrap();
    assert_eq!(
        connector.precision_plugin().unwrap().kind(),
        PrecisionKind::ApexMixed
    );
    assert!(connector
        .warnings()
        .iter()
        .any(|warning| warning.contains("NVIDIA Apex")));

    let host = HostCapabilities {
        native_amp_available: false,
        ..HostCapabilities::with_gpus(2)
    };
    let err = on_gpus(
        ResolutionInput::new().with_backend("ddp").with_precision(16),
        host,
    )
    .unwrap_err();
    assert!(matches!(err, ConnectorError::NativeAmpUnavailable));
}

#[test]
fn test_apex_backend() {
    let connector = on_gpus(
        ResolutionInput::new()
            .with_backend("ddp")
            .with_precision(16)
            .with_amp_backend(AmpType::Apex)
            .with_amp_level("O1"),
        apex_host(),
    )
    .unwrap();
    let plugin = connector.precision_plugin().unwrap();
    assert_eq!(plugin.kind(), PrecisionKind::ApexMixed);
    assert_eq!(plugin.precision(), 16);
    assert_eq!(connector.amp_level(), "O1");
    assert!(connector.use_amp());

    let err = on_gpus(
        ResolutionInput::new()
            .with_backend("ddp")
            .with_precision(16)
            .with_amp_backend(AmpType::Apex),
        HostCapabilities::with_gpus(2),
    )
    .unwrap_err();
    assert!(matches!(err, ConnectorError::ApexUnavailable));
}

#[test]
fn test_apex_rejects_sharded_strategies() {
    let err = on_gpus(
        ResolutionInput::new()
            .with_backend("ddp_sharded")
            .with_precision(16)
            .with_amp_backend(AmpType::Apex),
        apex_host(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ConnectorError::ShardedWithApex { ref strategy } if strategy == "ddp_sharded"
    ));
}

#[test]
fn test_tpu_half() {
    let host = HostCapabilities {
        tpu_available: true,
        ..HostCapabilities::cpu_only()
    };
    let connector = AcceleratorConnector::new(
        ResolutionInput::new()
            .with_tpu_cores(TpuCores::Count(8))
            .with_precision(16),
        Platform::new(host, EnvSnapshot::default()),
    )
    .unwrap();
    assert_eq!(
        connector.precision_plugin().unwrap().kind(),
        PrecisionKind::TpuHalf
    );
}

#[test]
fn test_deepspeed_and_ipu_take_precedence() {
    let connector = on_gpus(
        ResolutionInput::new()
            .with_backend("deepspeed")
            .with_precision(16),
        HostCapabilities::with_gpus(2),
    )
    .unwrap();
    let plugin = connector.precision_plugin().unwrap();
    assert_eq!(plugin.kind(), PrecisionKind::DeepSpeed);
    assert_eq!(plugin.precision(), 16);

    let host = HostCapabilities {
        ipu_available: true,
        ..HostCapabilities::cpu_only()
    };
    let connector = AcceleratorConnector::new(
        ResolutionInput::new().with_ipus(2).with_precision(16),
        Platform::new(host, EnvSnapshot::default()),
    )
    .unwrap();
    let plugin = connector.precision_plugin().unwrap();
    assert_eq!(plugin.kind(), PrecisionKind::Ipu);
    assert_eq!(plugin.precision(), 16);
}

#[test]
fn test_precision_override_is_kept() {
    let precision: Arc<dyn PrecisionPlugin> = Arc::new(BuiltinPrecision::double());
    let connector = on_gpus(
        ResolutionInput::new()
            .with_backend("ddp")
            .with_precision(16)
            .with_plugin(Arc::clone(&precision)),
        HostCapabilities::with_gpus(2),
    )
    .unwrap();
    let first = connector.precision_plugin().unwrap();
    assert!(Arc::ptr_eq(&first, &precision));
    assert!(Arc::ptr_eq(&connector.precision_plugin().unwrap(), &first));
    assert!(Arc::ptr_eq(
        &connector.accelerator().unwrap().precision_plugin(),
        &precision
    ));
}
