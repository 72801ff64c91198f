//! Strategy selection and back-fill.

use super::AcceleratorConnector;
use crate::env::PL_IN_DDP_SUBPROCESS;
use crate::environments::{KubeflowEnvironment, TorchElasticEnvironment};
use crate::plugins::{
    DdpStrategy, DeepSpeedStrategy, ParallelStrategy, SingleDeviceStrategy, StrategyKind,
    StrategyPlugin,
};
use crate::types::{DistributionKind, ParallelDevice};

impl AcceleratorConnector {
    /// Picks the built-in strategy for the resolved device and distribution kind.
    pub(super) fn select_training_type_plugin(&self) -> Box<dyn StrategyPlugin> {
        if self.use_ddp2() {
            return Box::new(
                DdpStrategy::new(StrategyKind::Ddp2)
                    .with_parallel_devices(self.parallel_devices())
                    .with_cluster_environment(self.cluster_environment()),
            );
        }
        if self.use_ddp() && self.use_deepspeed() {
            return Box::new(
                DeepSpeedStrategy::default()
                    .with_cluster_environment(self.cluster_environment())
                    .with_parallel_devices(self.parallel_devices()),
            );
        }
        if self.use_ddp() {
            return Box::new(
                DdpStrategy::new(self.ddp_strategy_kind())
                    .with_parallel_devices(self.parallel_devices())
                    .with_cluster_environment(self.cluster_environment()),
            );
        }
        if self.use_dp() {
            return Box::new(ParallelStrategy::data_parallel(Some(self.parallel_devices())));
        }
        if self.use_horovod() {
            return Box::new(ParallelStrategy::horovod(Some(self.parallel_devices())));
        }
        if let Some(id) = self.tpu_id() {
            return Box::new(SingleDeviceStrategy::new(ParallelDevice::Tpu(id)));
        }
        if self.on_ipu() {
            return Box::new(ParallelStrategy::ipu(Some(self.parallel_devices())));
        }
        let device = match self.root_gpu() {
            Some(ordinal) => ParallelDevice::Cuda(ordinal),
            None => ParallelDevice::Cpu,
        };
        Box::new(SingleDeviceStrategy::new(device))
    }

    /// Chooses among the DDP-family strategies, first match wins.
    fn ddp_strategy_kind(&self) -> StrategyKind {
        let env = &self.platform.env;
        let distrib_type = self.distrib_type();
        // DDP over CPU processes spawns unless a launcher already started them.
        let cpu_spawn = self.on_cpu();
        let elastic = TorchElasticEnvironment::is_active(env);
        // A script re-launched child carries the elastic variables without an elastic launcher.
        let elastic_launched = elastic && (cpu_spawn || !env.contains(PL_IN_DDP_SUBPROCESS));
        let launcher_managed = self.is_slurm_managing_tasks()
            || elastic_launched
            || KubeflowEnvironment::is_active(env);

        if self.on_tpu() && distrib_type == Some(DistributionKind::TpuSpawn) {
            StrategyKind::TpuSpawn
        } else if distrib_type == Some(DistributionKind::DdpSharded) {
            StrategyKind::DdpSharded
        } else if distrib_type == Some(DistributionKind::DdpShardedSpawn) {
            StrategyKind::DdpShardedSpawn
        } else if launcher_managed {
            StrategyKind::Ddp
        } else if distrib_type == Some(DistributionKind::DdpSpawn) || cpu_spawn {
            StrategyKind::DdpSpawn
        } else if distrib_type == Some(DistributionKind::DdpFullySharded) {
            StrategyKind::DdpFullySharded
        } else {
            StrategyKind::Ddp
        }
    }

    /// Fills the settings a strategy has but left unset, and overwrites the trainer-level
    /// ones (node count, batch-norm sync).
    pub(super) fn resolve_training_type_plugin(
        &self,
        mut strategy: Box<dyn StrategyPlugin>,
    ) -> Box<dyn StrategyPlugin> {
        let mut filled_devices = None;
        if let Some(slot) = strategy.parallel_devices_slot() {
            if slot.is_none() {
                let devices = self.parallel_devices();
                filled_devices = Some(devices.len());
                *slot = Some(devices);
            }
        }
        if let Some(num_devices) = filled_devices {
            if let Some(num_processes) = strategy.num_processes_slot() {
                *num_processes = num_devices;
            }
        }
        if let Some(slot) = strategy.cluster_environment_slot() {
            if slot.is_none() {
                *slot = Some(self.cluster_environment());
            }
        }
        if let Some(num_nodes) = strategy.num_nodes_slot() {
            *num_nodes = self.num_nodes();
        }
        if let Some(sync_batchnorm) = strategy.sync_batchnorm_slot() {
            *sync_batchnorm = self.sync_batchnorm();
        }
        tracing::debug!(strategy = %strategy.kind(), "resolved training type plugin");
        strategy
    }
}
