//! What the caller asks for.

use crate::accelerator::Accelerator;
use crate::plugins::PluginHint;
use crate::types::{AmpType, GpuRequest, TpuCores};
use std::sync::Arc;

/// The distributed-backend argument: a name, or a fully assembled accelerator that bypasses
/// strategy and precision selection.
#[derive(Debug, Clone)]
pub enum BackendSelection {
    Name(String),
    Accelerator(Arc<Accelerator>),
}

impl From<&str> for BackendSelection {
    fn from(name: &str) -> Self {
        BackendSelection::Name(name.to_string())
    }
}

impl From<Arc<Accelerator>> for BackendSelection {
    fn from(accelerator: Arc<Accelerator>) -> Self {
        BackendSelection::Accelerator(accelerator)
    }
}

/// Everything the caller supplies to resolution.
#[derive(Debug)]
pub struct ResolutionInput {
    /// Number of processes; only meaningful on CPU. `None` means "not set" (1).
    pub num_processes: Option<usize>,
    pub gpus: Option<GpuRequest>,
    pub tpu_cores: Option<TpuCores>,
    pub ipus: Option<usize>,
    pub num_nodes: usize,
    pub backend: Option<BackendSelection>,
    /// Pick free GPUs instead of the first ones.
    pub auto_select_gpus: bool,
    pub sync_batchnorm: bool,
    pub benchmark: bool,
    pub deterministic: bool,
    pub replace_sampler_ddp: bool,
    /// Requested bit width: 16, 32 or 64.
    pub precision: u32,
    pub amp_backend: AmpType,
    /// Apex optimization level.
    pub amp_level: String,
    pub plugins: Vec<PluginHint>,
}

impl Default for ResolutionInput {
    fn default() -> Self {
        Self {
            num_processes: None,
            gpus: None,
            tpu_cores: None,
            ipus: None,
            num_nodes: 1,
            backend: None,
            auto_select_gpus: false,
            sync_batchnorm: false,
            benchmark: false,
            deterministic: false,
            replace_sampler_ddp: true,
            precision: 32,
            amp_backend: AmpType::Native,
            amp_level: "O2".to_string(),
            plugins: Vec::new(),
        }
    }
}

impl ResolutionInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gpus(mut self, gpus: GpuRequest) -> Self {
        self.gpus = Some(gpus);
        self
    }

    pub fn with_tpu_cores(mut self, tpu_cores: TpuCores) -> Self {
        self.tpu_cores = Some(tpu_cores);
        self
    }

    pub fn with_ipus(mut self, ipus: usize) -> Self {
        self.ipus = Some(ipus);
        self
    }

    pub fn with_num_processes(mut self, num_processes: usize) -> Self {
        self.num_processes = Some(num_processes);
        self
    }

    pub fn with_num_nodes(mut self, num_nodes: usize) -> Self {
        self.num_nodes = num_nodes;
        self
    }

    pub fn with_backend(mut self, backend: impl Into<BackendSelection>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_amp_backend(mut self, amp_backend: AmpType) -> Self {
        self.amp_backend = amp_backend;
        self
    }

    pub fn with_amp_level(mut self, amp_level: impl Into<String>) -> Self {
        self.amp_level = amp_level.into();
        self
    }

    pub fn with_plugin(mut self, plugin: impl Into<PluginHint>) -> Self {
        self.plugins.push(plugin.into());
        self
    }

    pub fn with_sync_batchnorm(mut self, sync_batchnorm: bool) -> Self {
        self.sync_batchnorm = sync_batchnorm;
        self
    }

    pub fn with_auto_select_gpus(mut self, auto_select_gpus: bool) -> Self {
        self.auto_select_gpus = auto_select_gpus;
        self
    }

    pub fn with_deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    pub fn with_benchmark(mut self, benchmark: bool) -> Self {
        self.benchmark = benchmark;
        self
    }
}
