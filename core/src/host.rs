//! What the hosting machine and runtime can do.
//!
//! Resolution never probes hardware itself. Device counts and the availability of optional
//! backends are handed in through [`HostCapabilities`]; the Horovod launcher is reached through
//! the [`HorovodRuntime`] collaborator. Both are bundled with the [`EnvSnapshot`] into a
//! [`Platform`].

use crate::env::EnvSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::{Arc, Once};

/// Capability flags of the host, supplied by the embedding application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostCapabilities {
    /// Number of visible CUDA devices.
    pub gpu_count: usize,
    /// GPU ordinals currently busy; excluded by automatic GPU selection.
    pub busy_gpus: Vec<usize>,
    pub tpu_available: bool,
    pub ipu_available: bool,
    /// The framework's native mixed precision is usable.
    pub native_amp_available: bool,
    /// The Apex optimizer-level mixed precision backend is installed.
    pub apex_available: bool,
    pub horovod_available: bool,
    /// Running inside a REPL or notebook that cannot re-launch itself.
    pub interactive: bool,
    /// Logical CPU count of the host.
    pub cpu_count: usize,
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self::cpu_only()
    }
}

impl HostCapabilities {
    /// A host without accelerators, with the native AMP backend and the real logical CPU count.
    pub fn cpu_only() -> Self {
        Self {
            gpu_count: 0,
            busy_gpus: Vec::new(),
            tpu_available: false,
            ipu_available: false,
            native_amp_available: true,
            apex_available: false,
            horovod_available: false,
            interactive: false,
            cpu_count: std::thread::available_parallelism().map_or(1, usize::from),
        }
    }

    /// A host with `gpu_count` CUDA devices.
    pub fn with_gpus(gpu_count: usize) -> Self {
        Self {
            gpu_count,
            ..Self::cpu_only()
        }
    }

    pub fn cuda_available(&self) -> bool {
        self.gpu_count > 0
    }

    /// GPU ordinals not marked busy, in ascending order.
    pub fn free_gpus(&self) -> Vec<usize> {
        (0..self.gpu_count)
            .filter(|id| !self.busy_gpus.contains(id))
            .collect()
    }
}

/// The Horovod launcher's rank/size discovery.
pub trait HorovodRuntime: Debug + Send + Sync {
    /// Initializes rank/size discovery. Implementations must tolerate repeated calls.
    fn init(&self);

    /// Number of Horovod processes on this host.
    fn local_size(&self) -> usize;
}

/// Horovod discovery backed by the variables `horovodrun`/`mpirun` export.
#[derive(Debug)]
pub struct EnvHorovodRuntime {
    env: EnvSnapshot,
    initialized: Once,
}

impl EnvHorovodRuntime {
    pub fn new(env: EnvSnapshot) -> Self {
        Self {
            env,
            initialized: Once::new(),
        }
    }
}

impl HorovodRuntime for EnvHorovodRuntime {
    fn init(&self) {
        self.initialized.call_once(|| {
            tracing::debug!(
                local_size = self.local_size(),
                "initialized Horovod rank/size discovery"
            );
        });
    }

    fn local_size(&self) -> usize {
        self.env
            .parse("HOROVOD_LOCAL_SIZE")
            .or_else(|| self.env.parse("OMPI_COMM_WORLD_LOCAL_SIZE"))
            .unwrap_or(1)
    }
}

/// Everything resolution reads from outside its input.
#[derive(Debug, Clone)]
pub struct Platform {
    pub host: HostCapabilities,
    pub env: EnvSnapshot,
    pub horovod: Arc<dyn HorovodRuntime>,
}

impl Platform {
    pub fn new(host: HostCapabilities, env: EnvSnapshot) -> Self {
        let horovod = Arc::new(EnvHorovodRuntime::new(env.clone()));
        Self { host, env, horovod }
    }

    /// The current process environment on a CPU-only host.
    pub fn detect() -> Self {
        Self::new(HostCapabilities::cpu_only(), EnvSnapshot::from_process())
    }

    pub fn with_horovod(mut self, horovod: Arc<dyn HorovodRuntime>) -> Self {
        self.horovod = horovod;
        self
    }
}
