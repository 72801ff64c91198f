//! Precision plugins: which numeric format training runs in.

use std::fmt::{self, Debug};

/// The concrete precision handling of a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrecisionKind {
    /// 32-bit floats everywhere.
    Full,
    /// 64-bit floats everywhere.
    Double,
    /// Native 16-bit mixed precision.
    NativeMixed,
    /// Native mixed precision with a sharded gradient scaler.
    ShardedNativeMixed,
    /// Native mixed precision with a fully-sharded gradient scaler.
    FullyShardedNativeMixed,
    /// Apex optimizer-level mixed precision.
    ApexMixed,
    /// bfloat16 on TPU.
    TpuHalf,
    /// IPU precision at the requested bit width.
    Ipu,
    /// Precision handled by the DeepSpeed engine.
    DeepSpeed,
    /// A user-defined precision plugin.
    Custom,
}

impl PrecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrecisionKind::Full => "full",
            PrecisionKind::Double => "double",
            PrecisionKind::NativeMixed => "native_mixed",
            PrecisionKind::ShardedNativeMixed => "sharded_native_mixed",
            PrecisionKind::FullyShardedNativeMixed => "fully_sharded_native_mixed",
            PrecisionKind::ApexMixed => "apex_mixed",
            PrecisionKind::TpuHalf => "tpu_half",
            PrecisionKind::Ipu => "ipu",
            PrecisionKind::DeepSpeed => "deepspeed",
            PrecisionKind::Custom => "custom",
        }
    }
}

impl fmt::Display for PrecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A precision plugin.
pub trait PrecisionPlugin: Debug + Send + Sync {
    fn kind(&self) -> PrecisionKind;

    /// Bit width training runs at.
    fn precision(&self) -> u32;

    fn name(&self) -> String {
        self.kind().as_str().to_string()
    }
}

/// The built-in precision plugins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinPrecision {
    kind: PrecisionKind,
    precision: u32,
    amp_level: Option<String>,
}

impl BuiltinPrecision {
    fn new(kind: PrecisionKind, precision: u32) -> Self {
        Self {
            kind,
            precision,
            amp_level: None,
        }
    }

    pub fn full() -> Self {
        Self::new(PrecisionKind::Full, 32)
    }

    pub fn double() -> Self {
        Self::new(PrecisionKind::Double, 64)
    }

    pub fn native_mixed() -> Self {
        Self::new(PrecisionKind::NativeMixed, 16)
    }

    pub fn sharded_native_mixed() -> Self {
        Self::new(PrecisionKind::ShardedNativeMixed, 16)
    }

    pub fn fully_sharded_native_mixed() -> Self {
        Self::new(PrecisionKind::FullyShardedNativeMixed, 16)
    }

    /// Apex at the given optimization level (`"O0"` .. `"O3"`).
    pub fn apex_mixed(amp_level: impl Into<String>) -> Self {
        Self {
            amp_level: Some(amp_level.into()),
            ..Self::new(PrecisionKind::ApexMixed, 16)
        }
    }

    pub fn tpu_half() -> Self {
        Self::new(PrecisionKind::TpuHalf, 16)
    }

    pub fn ipu(precision: u32) -> Self {
        Self::new(PrecisionKind::Ipu, precision)
    }

    pub fn deepspeed(precision: u32) -> Self {
        Self::new(PrecisionKind::DeepSpeed, precision)
    }

    pub fn amp_level(&self) -> Option<&str> {
        self.amp_level.as_deref()
    }
}

impl PrecisionPlugin for BuiltinPrecision {
    fn kind(&self) -> PrecisionKind {
        self.kind
    }

    fn precision(&self) -> u32 {
        self.precision
    }
}
