//! # accelerator-connector
//!
//! `accelerator-connector` decides *where* and *how* a distributed training job runs. From
//! loosely specified intent (device counts, a backend name, a precision request, plugin hints)
//! and the ambient environment (scheduler variables, launcher variables, host capabilities) it
//! resolves one consistent configuration:
//!
//! - the **device kind**: CPU, GPU, TPU or IPU,
//! - the **distribution kind** and the strategy implementing it (DP, DDP and its variants,
//!   Horovod, DeepSpeed, ...),
//! - the **cluster environment** that assigns ranks (Slurm, elastic launcher, Kubeflow, local),
//! - the **precision plugin** (32, 64, or 16-bit through native AMP or Apex).
//!
//! ## Modules
//!
//! - [`connector`]: [`AcceleratorConnector`], the entry point.
//! - [`plugins`]: strategy and precision plugins, the strategy registry, plugin hints.
//! - [`environments`]: cluster environments and Slurm detection.
//! - [`config`]: JSON configuration with `ACCEL_*` environment overrides.
//!
//! ## Example
//!
//! ```rust
//! use accelerator_connector::{AcceleratorConnector, ConnectorConfig, Platform};
//! use accelerator_connector::{EnvSnapshot, HostCapabilities, StrategyKind};
//!
//! let env = EnvSnapshot::from_pairs([("ACCEL_NUM_PROCESSES", "4")]);
//! let config = ConnectorConfig::default().with_env_overrides(&env);
//! let platform = Platform::new(HostCapabilities::cpu_only(), env);
//!
//! let connector = AcceleratorConnector::new(config.into(), platform).unwrap();
//! let strategy = connector.training_type_plugin();
//! assert_eq!(strategy.kind(), StrategyKind::DdpSpawn);
//! assert_eq!(strategy.num_processes(), Some(4));
//! ```

pub mod accelerator;
pub mod config;
pub mod connector;
pub mod device_parser;
pub mod diagnostics;
pub mod env;
pub mod environments;
pub mod error;
pub mod host;
pub mod plugins;
pub mod process;
pub mod types;

pub use accelerator::Accelerator;
pub use config::ConnectorConfig;
pub use connector::{AcceleratorConnector, BackendSelection, ResolutionInput};
pub use env::EnvSnapshot;
pub use environments::ClusterEnvironment;
pub use error::{ConnectorError, Result};
pub use host::{HorovodRuntime, HostCapabilities, Platform};
pub use plugins::{
    PluginHint, PrecisionKind, PrecisionPlugin, StrategyKind, StrategyPlugin, StrategyRegistry,
};
pub use types::{AmpType, DeviceKind, DistributionKind, GpuRequest, ParallelDevice, TpuCores};
