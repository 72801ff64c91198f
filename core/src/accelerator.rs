//! The final product of resolution.

use crate::plugins::{PrecisionPlugin, StrategyPlugin};
use crate::types::{DeviceKind, ParallelDevice};
use std::sync::Arc;

/// A device class bound to a parallelization strategy and a precision plugin.
#[derive(Debug, Clone)]
pub struct Accelerator {
    device_kind: DeviceKind,
    training_type_plugin: Arc<dyn StrategyPlugin>,
    precision_plugin: Arc<dyn PrecisionPlugin>,
}

impl Accelerator {
    pub fn new(
        device_kind: DeviceKind,
        training_type_plugin: Arc<dyn StrategyPlugin>,
        precision_plugin: Arc<dyn PrecisionPlugin>,
    ) -> Self {
        Self {
            device_kind,
            training_type_plugin,
            precision_plugin,
        }
    }

    pub fn device_kind(&self) -> DeviceKind {
        self.device_kind
    }

    pub fn training_type_plugin(&self) -> Arc<dyn StrategyPlugin> {
        Arc::clone(&self.training_type_plugin)
    }

    pub fn precision_plugin(&self) -> Arc<dyn PrecisionPlugin> {
        Arc::clone(&self.precision_plugin)
    }

    /// Device of the root process, as chosen by the strategy.
    pub fn root_device(&self) -> Option<ParallelDevice> {
        self.training_type_plugin.root_device()
    }
}
