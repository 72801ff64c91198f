use accelerator_connector::env::HOROVOD_FUSION_THRESHOLD;
use accelerator_connector::process::{numeric_flags, NumericFlags};
use accelerator_connector::{
    AcceleratorConnector, EnvSnapshot, HostCapabilities, Platform, ResolutionInput,
};
use serial_test::serial;

fn resolve(input: ResolutionInput) -> AcceleratorConnector {
    AcceleratorConnector::new(
        input,
        Platform::new(HostCapabilities::cpu_only(), EnvSnapshot::default()),
    )
    .unwrap()
}

#[test]
#[serial]
fn test_last_resolution_sets_numeric_flags() {
    std::env::remove_var(HOROVOD_FUSION_THRESHOLD);

    let connector = resolve(ResolutionInput::new().with_deterministic(true));
    assert!(connector.deterministic());
    assert_eq!(
        numeric_flags(),
        NumericFlags {
            benchmark: false,
            deterministic: true
        }
    );
    assert_eq!(std::env::var(HOROVOD_FUSION_THRESHOLD).as_deref(), Ok("0"));

    resolve(ResolutionInput::new().with_benchmark(true));
    assert_eq!(
        numeric_flags(),
        NumericFlags {
            benchmark: true,
            deterministic: false
        }
    );
    std::env::remove_var(HOROVOD_FUSION_THRESHOLD);
}
