//! # Accelerator Connector
//!
//! Turns loosely specified user intent into one consistent execution configuration:
//!
//! 1.  **Devices**: GPU, TPU and IPU requests are validated against the host.
//! 2.  **Distributed mode**: the device kind and distribution kind are settled by an ordered
//!     rule table (see `mode`).
//! 3.  **Plugins**: the hint list is classified; name hints re-open distributed mode.
//! 4.  **Scheduler detection**: Slurm is checked against the final distribution kind.
//! 5.  **Accelerator**: the strategy is selected and back-filled, then the precision plugin is
//!     chosen from the strategy, and both are bound to the device kind.
//!
//! Strategy, precision, cluster environment and accelerator are each computed once and cached;
//! later reads return the same `Arc`.
//!
//! ## Example
//!
//! ```rust
//! use accelerator_connector::{AcceleratorConnector, EnvSnapshot, HostCapabilities, Platform};
//! use accelerator_connector::{DeviceKind, DistributionKind, GpuRequest, ResolutionInput};
//!
//! let platform = Platform::new(HostCapabilities::with_gpus(2), EnvSnapshot::default());
//! let input = ResolutionInput::new().with_gpus(GpuRequest::Count(2));
//! let connector = AcceleratorConnector::new(input, platform).unwrap();
//!
//! assert_eq!(connector.device_kind(), DeviceKind::Gpu);
//! assert_eq!(connector.distrib_type(), Some(DistributionKind::DdpSpawn));
//! ```

mod input;
mod mode;
mod precision;
mod selection;

pub use input::{BackendSelection, ResolutionInput};

use crate::accelerator::Accelerator;
use crate::device_parser::{determine_root_gpu, parse_gpu_ids, parse_tpu_cores};
use crate::diagnostics::Diagnostics;
use crate::environments::{
    select_cluster_environment, slurm_manages_tasks, ClusterEnvironment, TorchElasticEnvironment,
};
use crate::error::{ConnectorError, Result};
use crate::host::Platform;
use crate::plugins::{
    classify_plugins, PluginHint, PrecisionPlugin, StrategyPlugin, StrategyRegistry,
};
use crate::process::{configure_numeric_backend, NumericFlags};
use crate::types::{AmpType, DeviceKind, DistributionKind, ParallelDevice, TpuCores};
use mode::{set_distributed_mode, ModeContext, ModeState};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Resolved execution configuration of a training job.
#[derive(Debug)]
pub struct AcceleratorConnector {
    mode: ModeState,
    sync_batchnorm: bool,
    benchmark: bool,
    deterministic: bool,
    replace_sampler_ddp: bool,
    auto_select_gpus: bool,
    precision: u32,
    amp_type: AmpType,
    amp_level: String,
    is_slurm_managing_tasks: bool,
    training_type_in_plugins: bool,

    custom_accelerator: Option<Arc<Accelerator>>,
    has_strategy_override: bool,
    /// User strategy waiting for its first (and only) back-fill.
    pending_strategy: Mutex<Option<Box<dyn StrategyPlugin>>>,
    precision_override: Option<Arc<dyn PrecisionPlugin>>,
    cluster_environment_override: Option<Arc<dyn ClusterEnvironment>>,

    cluster_environment: OnceLock<Arc<dyn ClusterEnvironment>>,
    training_type_plugin: OnceLock<Arc<dyn StrategyPlugin>>,
    precision_plugin: OnceLock<Arc<dyn PrecisionPlugin>>,
    accelerator: OnceLock<Arc<Accelerator>>,

    platform: Platform,
    diagnostics: Diagnostics,
}

impl AcceleratorConnector {
    /// Resolves `input` with the built-in strategy registry.
    pub fn new(input: ResolutionInput, platform: Platform) -> Result<Self> {
        Self::with_registry(input, platform, &StrategyRegistry::default())
    }

    /// Resolves `input`, looking registered strategy names up in `registry`.
    ///
    /// # Errors
    ///
    /// Any fatal configuration error: invalid device requests, conflicting plugin hints,
    /// unknown backends, incompatible or unavailable distribution and precision choices.
    pub fn with_registry(
        input: ResolutionInput,
        platform: Platform,
        registry: &StrategyRegistry,
    ) -> Result<Self> {
        let diagnostics = Diagnostics::for_env(&platform.env);

        let tpu_cores = parse_tpu_cores(input.tpu_cores.as_ref(), &platform.host)?;
        let parallel_device_ids =
            parse_gpu_ids(input.gpus.as_ref(), &platform.host, input.auto_select_gpus)?;
        if let Some(ipus) = input.ipus.filter(|&ipus| ipus > 0) {
            if !platform.host.ipu_available {
                return Err(ConnectorError::IpuUnavailable(ipus));
            }
        }

        let (distributed_backend, custom_accelerator) = match input.backend {
            Some(BackendSelection::Name(name)) => (Some(name), None),
            Some(BackendSelection::Accelerator(accelerator)) => (None, Some(accelerator)),
            None => (None, None),
        };
        let training_type_in_plugins = input
            .plugins
            .iter()
            .any(|hint| matches!(hint, PluginHint::Name(name) if registry.contains(name)));

        let mut mode = ModeState {
            device_kind: DeviceKind::Cpu,
            distrib_type: None,
            distributed_backend,
            num_processes: input.num_processes,
            parallel_device_ids,
            num_nodes: input.num_nodes,
            tpu_cores,
            ipus: input.ipus,
        };

        let classified = {
            let ctx = ModeContext {
                platform: &platform,
                registry,
                diagnostics: &diagnostics,
                custom_accelerator: custom_accelerator.is_some(),
                training_type_in_plugins,
            };
            set_distributed_mode(&mut mode, &ctx, None)?;
            classify_plugins(input.plugins, registry, |name| {
                // An explicit plugin name overrides whatever was inferred so far.
                mode.distrib_type = None;
                set_distributed_mode(&mut mode, &ctx, Some(name))
            })?
        };

        let is_slurm_managing_tasks = slurm_manages_tasks(
            mode.distrib_type,
            mode.num_gpus(),
            mode.num_nodes,
            mode.num_processes,
            &platform.env,
        );
        if is_slurm_managing_tasks {
            diagnostics.info("Multi-processing is handled by Slurm.");
        }

        configure_numeric_backend(NumericFlags {
            benchmark: input.benchmark,
            deterministic: input.deterministic,
        });

        let mut connector = Self {
            mode,
            sync_batchnorm: input.sync_batchnorm,
            benchmark: input.benchmark,
            deterministic: input.deterministic,
            replace_sampler_ddp: input.replace_sampler_ddp,
            auto_select_gpus: input.auto_select_gpus,
            precision: input.precision,
            amp_type: input.amp_backend,
            amp_level: input.amp_level,
            is_slurm_managing_tasks,
            training_type_in_plugins,
            custom_accelerator,
            has_strategy_override: classified.strategy.is_some(),
            pending_strategy: Mutex::new(classified.strategy),
            precision_override: classified.precision,
            cluster_environment_override: classified.cluster_environment,
            cluster_environment: OnceLock::new(),
            training_type_plugin: OnceLock::new(),
            precision_plugin: OnceLock::new(),
            accelerator: OnceLock::new(),
            platform,
            diagnostics,
        };

        connector.accelerator()?;
        if connector.on_tpu() {
            connector.mode.distributed_backend = Some("tpu".to_string());
        }
        tracing::debug!(
            device = %connector.device_kind(),
            distrib_type = ?connector.distrib_type(),
            strategy = %connector.training_type_plugin().kind(),
            "resolved accelerator"
        );
        Ok(connector)
    }

    /// The assembled accelerator. A user-supplied accelerator is returned as is.
    pub fn accelerator(&self) -> Result<Arc<Accelerator>> {
        if let Some(accelerator) = self.accelerator.get() {
            return Ok(Arc::clone(accelerator));
        }
        let accelerator = self.select_accelerator()?;
        Ok(Arc::clone(self.accelerator.get_or_init(|| accelerator)))
    }

    fn select_accelerator(&self) -> Result<Arc<Accelerator>> {
        if let Some(accelerator) = &self.custom_accelerator {
            if self.has_strategy_override || self.precision_override.is_some() {
                self.diagnostics.warn(
                    "Specified `Precision` and `TrainingType` plugins will be ignored, \
                     since an `Accelerator` instance was provided.",
                );
            }
            return Ok(Arc::clone(accelerator));
        }
        // The precision plugin depends on the strategy kind: strategy first.
        let training_type_plugin = self.training_type_plugin();
        let precision_plugin = self.precision_plugin()?;
        Ok(Arc::new(Accelerator::new(
            self.device_kind(),
            training_type_plugin,
            precision_plugin,
        )))
    }

    /// The strategy, selected and back-filled on first access.
    pub fn training_type_plugin(&self) -> Arc<dyn StrategyPlugin> {
        if let Some(accelerator) = &self.custom_accelerator {
            return accelerator.training_type_plugin();
        }
        Arc::clone(self.training_type_plugin.get_or_init(|| {
            let pending = self
                .pending_strategy
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            let strategy = pending.unwrap_or_else(|| self.select_training_type_plugin());
            Arc::from(self.resolve_training_type_plugin(strategy))
        }))
    }

    /// The precision plugin, selected on first access.
    pub fn precision_plugin(&self) -> Result<Arc<dyn PrecisionPlugin>> {
        if let Some(accelerator) = &self.custom_accelerator {
            return Ok(accelerator.precision_plugin());
        }
        if let Some(plugin) = self.precision_plugin.get() {
            return Ok(Arc::clone(plugin));
        }
        let plugin = match &self.precision_override {
            Some(plugin) => Arc::clone(plugin),
            None => self.select_precision_plugin(&*self.training_type_plugin())?,
        };
        Ok(Arc::clone(self.precision_plugin.get_or_init(|| plugin)))
    }

    /// The cluster environment, selected on first access.
    pub fn cluster_environment(&self) -> Arc<dyn ClusterEnvironment> {
        Arc::clone(self.cluster_environment.get_or_init(|| {
            select_cluster_environment(
                self.cluster_environment_override.as_ref(),
                self.is_slurm_managing_tasks,
                &self.platform.env,
            )
        }))
    }

    /// One device per process of the resolved layout.
    pub fn parallel_devices(&self) -> Vec<ParallelDevice> {
        if self.on_gpu() {
            self.parallel_device_ids()
                .unwrap_or_default()
                .iter()
                .map(|&id| ParallelDevice::Cuda(id))
                .collect()
        } else if self.on_tpu() {
            match &self.mode.tpu_cores {
                Some(TpuCores::Count(n)) => (0..*n).map(ParallelDevice::Tpu).collect(),
                Some(TpuCores::Ids(ids)) => ids.iter().map(|&id| ParallelDevice::Tpu(id)).collect(),
                None => Vec::new(),
            }
        } else if self.on_ipu() {
            (0..self.mode.ipus.unwrap_or(0)).map(ParallelDevice::Ipu).collect()
        } else {
            vec![ParallelDevice::Cpu; self.num_processes()]
        }
    }

    pub fn device_kind(&self) -> DeviceKind {
        self.mode.device_kind
    }

    pub fn distrib_type(&self) -> Option<DistributionKind> {
        self.mode.distrib_type
    }

    /// Backend name after aliasing; `"tpu"` once resolution landed on a TPU.
    pub fn distributed_backend(&self) -> Option<&str> {
        self.mode.distributed_backend.as_deref()
    }

    pub fn on_cpu(&self) -> bool {
        self.mode.device_kind == DeviceKind::Cpu
    }

    pub fn on_gpu(&self) -> bool {
        self.mode.device_kind == DeviceKind::Gpu
            && self.num_gpus() > 0
            && self.platform.host.cuda_available()
    }

    pub fn on_tpu(&self) -> bool {
        self.mode.device_kind == DeviceKind::Tpu
    }

    pub fn on_ipu(&self) -> bool {
        self.mode.device_kind == DeviceKind::Ipu
    }

    pub fn use_dp(&self) -> bool {
        self.mode.distrib_type == Some(DistributionKind::Dp)
    }

    /// Any member of the DDP family, DeepSpeed and TPU-spawn included.
    pub fn use_ddp(&self) -> bool {
        self.mode.distrib_type.is_some_and(|kind| kind.is_ddp_family())
    }

    pub fn use_ddp2(&self) -> bool {
        self.mode.distrib_type == Some(DistributionKind::Ddp2)
    }

    pub fn use_horovod(&self) -> bool {
        self.mode.distrib_type == Some(DistributionKind::Horovod)
    }

    pub fn use_deepspeed(&self) -> bool {
        self.mode.distrib_type == Some(DistributionKind::DeepSpeed)
    }

    /// Whether more than one process takes part in training.
    pub fn is_distributed(&self) -> bool {
        let strategy_distributed = self.training_type_plugin().is_distributed();
        if !self.on_tpu() {
            return strategy_distributed;
        }
        self.use_ddp() || self.use_ddp2() || self.use_horovod() || strategy_distributed
    }

    pub fn num_gpus(&self) -> usize {
        self.mode.num_gpus()
    }

    pub fn num_processes(&self) -> usize {
        self.mode.num_processes()
    }

    pub fn num_nodes(&self) -> usize {
        self.mode.num_nodes
    }

    pub fn parallel_device_ids(&self) -> Option<&[usize]> {
        self.mode.parallel_device_ids.as_deref()
    }

    pub fn root_gpu(&self) -> Option<usize> {
        if self.on_gpu() {
            determine_root_gpu(self.parallel_device_ids())
        } else {
            None
        }
    }

    pub fn tpu_cores(&self) -> Option<&TpuCores> {
        self.mode.tpu_cores.as_ref()
    }

    /// The pinned core when a single TPU core id was requested.
    pub fn tpu_id(&self) -> Option<usize> {
        match &self.mode.tpu_cores {
            Some(TpuCores::Ids(ids)) if self.on_tpu() => ids.first().copied(),
            _ => None,
        }
    }

    pub fn ipus(&self) -> Option<usize> {
        self.mode.ipus
    }

    pub fn is_slurm_managing_tasks(&self) -> bool {
        self.is_slurm_managing_tasks
    }

    /// A registered strategy name was among the plugin hints.
    pub fn is_training_type_in_plugins(&self) -> bool {
        self.training_type_in_plugins
    }

    /// Launched by an elastic launcher, or carrying its rank variables.
    pub fn is_using_torchelastic(&self) -> bool {
        let env = &self.platform.env;
        TorchElasticEnvironment::is_active(env)
            || (env.contains("WORLD_SIZE")
                && (env.contains("GROUP_RANK") || env.contains("NODE_RANK")))
    }

    pub fn use_amp(&self) -> bool {
        self.precision == 16
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    /// Requested mixed-precision backend. The resolved one is the precision plugin's kind.
    pub fn amp_type(&self) -> AmpType {
        self.amp_type
    }

    pub fn amp_level(&self) -> &str {
        &self.amp_level
    }

    pub fn sync_batchnorm(&self) -> bool {
        self.sync_batchnorm
    }

    pub fn benchmark(&self) -> bool {
        self.benchmark
    }

    pub fn deterministic(&self) -> bool {
        self.deterministic
    }

    pub fn replace_sampler_ddp(&self) -> bool {
        self.replace_sampler_ddp
    }

    pub fn auto_select_gpus(&self) -> bool {
        self.auto_select_gpus
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Warnings emitted during resolution.
    pub fn warnings(&self) -> Vec<String> {
        self.diagnostics.warnings()
    }
}
