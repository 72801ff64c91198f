//! Training-type (parallelization strategy) plugins.
//!
//! A strategy owns the list of devices its processes run on and, for multi-process
//! strategies, a shared handle to the [`ClusterEnvironment`] that tells each process its rank.
//!
//! # Back-fill slots
//!
//! Users may hand in a strategy they constructed themselves, leaving some settings unset. The
//! connector fills them from trainer-level settings through the `*_slot` accessors:
//!
//! - the outer `Option` says whether the strategy *has* the setting at all,
//! - for device list and cluster environment, the inner `Option` says whether it is set yet.
//!
//! A strategy without a setting keeps the default `None` implementation.

use crate::environments::ClusterEnvironment;
use crate::types::ParallelDevice;
use std::fmt::{self, Debug};
use std::sync::Arc;

/// The concrete parallelization approach of a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    SingleDevice,
    SingleTpu,
    DataParallel,
    Ddp,
    DdpSpawn,
    Ddp2,
    DdpSharded,
    DdpShardedSpawn,
    DdpFullySharded,
    TpuSpawn,
    Horovod,
    DeepSpeed,
    Ipu,
    /// A user-defined strategy outside the built-in set.
    Custom,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::SingleDevice => "single_device",
            StrategyKind::SingleTpu => "single_tpu",
            StrategyKind::DataParallel => "dp",
            StrategyKind::Ddp => "ddp",
            StrategyKind::DdpSpawn => "ddp_spawn",
            StrategyKind::Ddp2 => "ddp2",
            StrategyKind::DdpSharded => "ddp_sharded",
            StrategyKind::DdpShardedSpawn => "ddp_sharded_spawn",
            StrategyKind::DdpFullySharded => "ddp_fully_sharded",
            StrategyKind::TpuSpawn => "tpu_spawn",
            StrategyKind::Horovod => "horovod",
            StrategyKind::DeepSpeed => "deepspeed",
            StrategyKind::Ipu => "ipu",
            StrategyKind::Custom => "custom",
        }
    }

    /// Partitions optimizer state across workers.
    pub fn is_sharded(&self) -> bool {
        matches!(self, StrategyKind::DdpSharded | StrategyKind::DdpShardedSpawn)
    }

    /// Partitions parameters, gradients and optimizer state across workers.
    pub fn is_fully_sharded(&self) -> bool {
        *self == StrategyKind::DdpFullySharded
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parallelization strategy.
pub trait StrategyPlugin: Debug + Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Human readable name used in error messages.
    fn name(&self) -> String {
        self.kind().as_str().to_string()
    }

    /// Whether more than one process takes part in training.
    fn is_distributed(&self) -> bool;

    /// Device of the root (local rank zero) process.
    fn root_device(&self) -> Option<ParallelDevice>;

    fn parallel_devices(&self) -> Option<&[ParallelDevice]> {
        None
    }

    fn cluster_environment(&self) -> Option<&Arc<dyn ClusterEnvironment>> {
        None
    }

    fn num_nodes(&self) -> Option<usize> {
        None
    }

    fn num_processes(&self) -> Option<usize> {
        None
    }

    fn sync_batchnorm(&self) -> Option<bool> {
        None
    }

    fn parallel_devices_slot(&mut self) -> Option<&mut Option<Vec<ParallelDevice>>> {
        None
    }

    fn num_processes_slot(&mut self) -> Option<&mut usize> {
        None
    }

    fn cluster_environment_slot(&mut self) -> Option<&mut Option<Arc<dyn ClusterEnvironment>>> {
        None
    }

    fn num_nodes_slot(&mut self) -> Option<&mut usize> {
        None
    }

    fn sync_batchnorm_slot(&mut self) -> Option<&mut bool> {
        None
    }
}

/// Runs everything in the current process on one device.
///
/// Bound to a TPU core this is the single-TPU strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleDeviceStrategy {
    device: ParallelDevice,
}

impl SingleDeviceStrategy {
    pub fn new(device: ParallelDevice) -> Self {
        Self { device }
    }

    pub fn device(&self) -> ParallelDevice {
        self.device
    }
}

impl StrategyPlugin for SingleDeviceStrategy {
    fn kind(&self) -> StrategyKind {
        match self.device {
            ParallelDevice::Tpu(_) => StrategyKind::SingleTpu,
            _ => StrategyKind::SingleDevice,
        }
    }

    fn is_distributed(&self) -> bool {
        false
    }

    fn root_device(&self) -> Option<ParallelDevice> {
        Some(self.device)
    }
}

/// Strategies that only own a device list: DP, Horovod and IPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelStrategy {
    kind: StrategyKind,
    parallel_devices: Option<Vec<ParallelDevice>>,
}

impl ParallelStrategy {
    /// One process driving every local device.
    pub fn data_parallel(parallel_devices: Option<Vec<ParallelDevice>>) -> Self {
        Self {
            kind: StrategyKind::DataParallel,
            parallel_devices,
        }
    }

    pub fn horovod(parallel_devices: Option<Vec<ParallelDevice>>) -> Self {
        Self {
            kind: StrategyKind::Horovod,
            parallel_devices,
        }
    }

    pub fn ipu(parallel_devices: Option<Vec<ParallelDevice>>) -> Self {
        Self {
            kind: StrategyKind::Ipu,
            parallel_devices,
        }
    }
}

impl StrategyPlugin for ParallelStrategy {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn is_distributed(&self) -> bool {
        self.kind == StrategyKind::Horovod
    }

    fn root_device(&self) -> Option<ParallelDevice> {
        self.parallel_devices.as_ref()?.first().copied()
    }

    fn parallel_devices(&self) -> Option<&[ParallelDevice]> {
        self.parallel_devices.as_deref()
    }

    fn parallel_devices_slot(&mut self) -> Option<&mut Option<Vec<ParallelDevice>>> {
        Some(&mut self.parallel_devices)
    }
}

/// The distributed data-parallel family: DDP, DDP-spawn, DDP2, the sharded variants and
/// TPU-spawn. Every process holds a full replica (or a shard) and syncs gradients.
#[derive(Debug, Clone)]
pub struct DdpStrategy {
    kind: StrategyKind,
    parallel_devices: Option<Vec<ParallelDevice>>,
    num_processes: usize,
    cluster_environment: Option<Arc<dyn ClusterEnvironment>>,
    num_nodes: usize,
    sync_batchnorm: bool,
    find_unused_parameters: bool,
    debug: bool,
}

impl DdpStrategy {
    /// Creates an unconfigured strategy of the given DDP-family kind.
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            parallel_devices: None,
            num_processes: 0,
            cluster_environment: None,
            num_nodes: 1,
            sync_batchnorm: false,
            find_unused_parameters: true,
            debug: false,
        }
    }

    pub fn with_parallel_devices(mut self, parallel_devices: Vec<ParallelDevice>) -> Self {
        self.num_processes = parallel_devices.len();
        self.parallel_devices = Some(parallel_devices);
        self
    }

    pub fn with_cluster_environment(mut self, environment: Arc<dyn ClusterEnvironment>) -> Self {
        self.cluster_environment = Some(environment);
        self
    }

    pub fn with_num_nodes(mut self, num_nodes: usize) -> Self {
        self.num_nodes = num_nodes;
        self
    }

    pub fn with_sync_batchnorm(mut self, sync_batchnorm: bool) -> Self {
        self.sync_batchnorm = sync_batchnorm;
        self
    }

    /// Whether the gradient reducer scans for parameters that took no part in the forward pass.
    pub fn with_find_unused_parameters(mut self, find_unused_parameters: bool) -> Self {
        self.find_unused_parameters = find_unused_parameters;
        self
    }

    /// TPU-spawn debug mode.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn find_unused_parameters(&self) -> bool {
        self.find_unused_parameters
    }

    pub fn debug(&self) -> bool {
        self.debug
    }
}

impl StrategyPlugin for DdpStrategy {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn is_distributed(&self) -> bool {
        match self.kind {
            StrategyKind::TpuSpawn => self.num_processes * self.num_nodes > 1,
            _ => true,
        }
    }

    fn root_device(&self) -> Option<ParallelDevice> {
        self.parallel_devices.as_ref()?.first().copied()
    }

    fn parallel_devices(&self) -> Option<&[ParallelDevice]> {
        self.parallel_devices.as_deref()
    }

    fn cluster_environment(&self) -> Option<&Arc<dyn ClusterEnvironment>> {
        self.cluster_environment.as_ref()
    }

    fn num_nodes(&self) -> Option<usize> {
        Some(self.num_nodes)
    }

    fn num_processes(&self) -> Option<usize> {
        Some(self.num_processes)
    }

    fn sync_batchnorm(&self) -> Option<bool> {
        Some(self.sync_batchnorm)
    }

    fn parallel_devices_slot(&mut self) -> Option<&mut Option<Vec<ParallelDevice>>> {
        Some(&mut self.parallel_devices)
    }

    fn num_processes_slot(&mut self) -> Option<&mut usize> {
        Some(&mut self.num_processes)
    }

    fn cluster_environment_slot(&mut self) -> Option<&mut Option<Arc<dyn ClusterEnvironment>>> {
        Some(&mut self.cluster_environment)
    }

    fn num_nodes_slot(&mut self) -> Option<&mut usize> {
        Some(&mut self.num_nodes)
    }

    fn sync_batchnorm_slot(&mut self) -> Option<&mut bool> {
        Some(&mut self.sync_batchnorm)
    }
}

/// DeepSpeed ZeRO: DDP process layout plus staged partitioning of training state.
#[derive(Debug, Clone)]
pub struct DeepSpeedStrategy {
    ddp: DdpStrategy,
    stage: u8,
    offload_optimizer: bool,
}

impl DeepSpeedStrategy {
    pub fn new(stage: u8, offload_optimizer: bool) -> Self {
        Self {
            ddp: DdpStrategy::new(StrategyKind::DeepSpeed),
            stage,
            offload_optimizer,
        }
    }

    pub fn with_parallel_devices(mut self, parallel_devices: Vec<ParallelDevice>) -> Self {
        self.ddp = self.ddp.with_parallel_devices(parallel_devices);
        self
    }

    pub fn with_cluster_environment(mut self, environment: Arc<dyn ClusterEnvironment>) -> Self {
        self.ddp = self.ddp.with_cluster_environment(environment);
        self
    }

    /// ZeRO stage (1, 2 or 3).
    pub fn stage(&self) -> u8 {
        self.stage
    }

    pub fn offload_optimizer(&self) -> bool {
        self.offload_optimizer
    }
}

impl Default for DeepSpeedStrategy {
    fn default() -> Self {
        Self::new(2, false)
    }
}

impl StrategyPlugin for DeepSpeedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DeepSpeed
    }

    fn is_distributed(&self) -> bool {
        true
    }

    fn root_device(&self) -> Option<ParallelDevice> {
        self.ddp.root_device()
    }

    fn parallel_devices(&self) -> Option<&[ParallelDevice]> {
        self.ddp.parallel_devices()
    }

    fn cluster_environment(&self) -> Option<&Arc<dyn ClusterEnvironment>> {
        self.ddp.cluster_environment()
    }

    fn num_nodes(&self) -> Option<usize> {
        self.ddp.num_nodes()
    }

    fn num_processes(&self) -> Option<usize> {
        self.ddp.num_processes()
    }

    fn sync_batchnorm(&self) -> Option<bool> {
        self.ddp.sync_batchnorm()
    }

    fn parallel_devices_slot(&mut self) -> Option<&mut Option<Vec<ParallelDevice>>> {
        self.ddp.parallel_devices_slot()
    }

    fn num_processes_slot(&mut self) -> Option<&mut usize> {
        self.ddp.num_processes_slot()
    }

    fn cluster_environment_slot(&mut self) -> Option<&mut Option<Arc<dyn ClusterEnvironment>>> {
        self.ddp.cluster_environment_slot()
    }

    fn num_nodes_slot(&mut self) -> Option<&mut usize> {
        self.ddp.num_nodes_slot()
    }

    fn sync_batchnorm_slot(&mut self) -> Option<&mut bool> {
        self.ddp.sync_batchnorm_slot()
    }
}
