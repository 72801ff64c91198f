//! Named, pre-configured strategies.
//!
//! A registered name such as `"deepspeed_stage_2"` is both a strategy (built by a factory) and
//! an alias for a distributed backend (`"deepspeed"`), which is what mode resolution sees.

use super::strategy::{DdpStrategy, DeepSpeedStrategy, StrategyKind, StrategyPlugin};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

type StrategyFactory = Arc<dyn Fn() -> Box<dyn StrategyPlugin> + Send + Sync>;

/// One registry entry.
#[derive(Clone)]
pub struct RegisteredStrategy {
    distributed_backend: String,
    description: String,
    factory: StrategyFactory,
}

impl RegisteredStrategy {
    /// Backend name mode resolution uses for this entry.
    pub fn distributed_backend(&self) -> &str {
        &self.distributed_backend
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Builds a fresh, unconfigured instance.
    pub fn create(&self) -> Box<dyn StrategyPlugin> {
        (self.factory)()
    }
}

impl fmt::Debug for RegisteredStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredStrategy")
            .field("distributed_backend", &self.distributed_backend)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Name → strategy factory.
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    entries: BTreeMap<String, RegisteredStrategy>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for (name, kind) in [
            ("ddp_find_unused_parameters_false", StrategyKind::Ddp),
            ("ddp_spawn_find_unused_parameters_false", StrategyKind::DdpSpawn),
            ("ddp_sharded_find_unused_parameters_false", StrategyKind::DdpSharded),
            (
                "ddp_sharded_spawn_find_unused_parameters_false",
                StrategyKind::DdpShardedSpawn,
            ),
        ] {
            registry.register(
                name,
                kind.as_str(),
                "DDP with find_unused_parameters disabled",
                move || Box::new(DdpStrategy::new(kind).with_find_unused_parameters(false)),
            );
        }
        registry.register(
            "fsdp",
            "ddp_fully_sharded",
            "Fully sharded data parallel",
            || Box::new(DdpStrategy::new(StrategyKind::DdpFullySharded)),
        );
        registry.register("deepspeed", "deepspeed", "Default DeepSpeed strategy", || {
            Box::new(DeepSpeedStrategy::default())
        });
        for (name, stage, offload) in [
            ("deepspeed_stage_1", 1, false),
            ("deepspeed_stage_2", 2, false),
            ("deepspeed_stage_2_offload", 2, true),
            ("deepspeed_stage_3", 3, false),
            ("deepspeed_stage_3_offload", 3, true),
        ] {
            registry.register(
                name,
                "deepspeed",
                format!("DeepSpeed ZeRO stage {stage}"),
                move || Box::new(DeepSpeedStrategy::new(stage, offload)),
            );
        }
        registry.register(
            "tpu_spawn_debug",
            "tpu_spawn",
            "TPU spawn with debug mode enabled",
            || Box::new(DdpStrategy::new(StrategyKind::TpuSpawn).with_debug(true)),
        );
        registry
    }
}

impl StrategyRegistry {
    /// A registry without the built-in entries.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Registers `name`, replacing any previous entry of that name.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        distributed_backend: impl Into<String>,
        description: impl Into<String>,
        factory: F,
    ) where
        F: Fn() -> Box<dyn StrategyPlugin> + Send + Sync + 'static,
    {
        self.entries.insert(
            name.into(),
            RegisteredStrategy {
                distributed_backend: distributed_backend.into(),
                description: description.into(),
                factory: Arc::new(factory),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredStrategy> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn backend_for(&self, name: &str) -> Option<&str> {
        self.get(name).map(RegisteredStrategy::distributed_backend)
    }

    pub fn create(&self, name: &str) -> Option<Box<dyn StrategyPlugin>> {
        self.get(name).map(RegisteredStrategy::create)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::strategy::SingleDeviceStrategy;
    use crate::types::ParallelDevice;

    #[test]
    fn test_default_entries() {
        let registry = StrategyRegistry::default();
        assert_eq!(registry.names().count(), 12);
        assert_eq!(registry.backend_for("fsdp"), Some("ddp_fully_sharded"));
        assert_eq!(registry.backend_for("deepspeed_stage_3_offload"), Some("deepspeed"));
        assert_eq!(registry.backend_for("tpu_spawn_debug"), Some("tpu_spawn"));
        assert!(!registry.contains("ddp"));
    }

    #[test]
    fn test_create_is_fresh_and_configured() {
        let registry = StrategyRegistry::default();
        let strategy = registry.create("ddp_spawn_find_unused_parameters_false").unwrap();
        assert_eq!(strategy.kind(), StrategyKind::DdpSpawn);
        assert!(strategy.parallel_devices().is_none());
        assert_eq!(
            registry.create("deepspeed_stage_1").unwrap().kind(),
            StrategyKind::DeepSpeed
        );
    }

    #[test]
    fn test_register_custom() {
        let mut registry = StrategyRegistry::empty();
        registry.register("pinned", "ddp", "pinned to cuda:1", || {
            Box::new(SingleDeviceStrategy::new(ParallelDevice::Cuda(1)))
        });
        assert_eq!(registry.backend_for("pinned"), Some("ddp"));
        assert_eq!(
            registry.create("pinned").unwrap().root_device(),
            Some(ParallelDevice::Cuda(1))
        );
    }
}
