//! Precision selection.

use super::AcceleratorConnector;
use crate::error::{ConnectorError, Result};
use crate::plugins::{BuiltinPrecision, PrecisionPlugin, StrategyKind, StrategyPlugin};
use crate::types::{AmpType, DistributionKind};
use std::sync::Arc;

impl AcceleratorConnector {
    /// Picks the precision plugin for the requested bit width, given the resolved strategy.
    pub(super) fn select_precision_plugin(
        &self,
        strategy: &dyn StrategyPlugin,
    ) -> Result<Arc<dyn PrecisionPlugin>> {
        if self.on_ipu() {
            return Ok(Arc::new(BuiltinPrecision::ipu(self.precision)));
        }
        if self.distrib_type() == Some(DistributionKind::DeepSpeed)
            || strategy.kind() == StrategyKind::DeepSpeed
        {
            return Ok(Arc::new(BuiltinPrecision::deepspeed(self.precision)));
        }

        match self.precision {
            32 => Ok(Arc::new(BuiltinPrecision::full())),
            64 => Ok(Arc::new(BuiltinPrecision::double())),
            16 => self.select_half_precision(strategy),
            other => Err(ConnectorError::UnsupportedPrecision(other)),
        }
    }

    /// 16-bit: TPU half, else native mixed precision falling back to Apex.
    fn select_half_precision(
        &self,
        strategy: &dyn StrategyPlugin,
    ) -> Result<Arc<dyn PrecisionPlugin>> {
        if self.on_tpu() {
            return Ok(Arc::new(BuiltinPrecision::tpu_half()));
        }
        let host = &self.platform.host;
        let kind = strategy.kind();

        if self.amp_type == AmpType::Native {
            if self.on_cpu() {
                return Err(ConnectorError::NativeAmpOnCpu);
            }
            if !host.native_amp_available {
                if !host.apex_available {
                    return Err(ConnectorError::NativeAmpUnavailable);
                }
                self.diagnostics.warn(
                    "You have asked for native AMP but the runtime does not support it. \
                     We will attempt to use NVIDIA Apex for this session.",
                );
            } else {
                tracing::info!("Using native 16bit precision.");
                return Ok(if kind.is_sharded() {
                    Arc::new(BuiltinPrecision::sharded_native_mixed())
                } else if kind.is_fully_sharded() {
                    Arc::new(BuiltinPrecision::fully_sharded_native_mixed())
                } else {
                    Arc::new(BuiltinPrecision::native_mixed())
                });
            }
        }

        if !host.apex_available {
            return Err(ConnectorError::ApexUnavailable);
        }
        if kind.is_sharded() || kind.is_fully_sharded() {
            return Err(ConnectorError::ShardedWithApex {
                strategy: strategy.name(),
            });
        }
        tracing::info!(amp_level = %self.amp_level, "Using APEX 16bit precision.");
        Ok(Arc::new(BuiltinPrecision::apex_mixed(self.amp_level.clone())))
    }
}
