//! Closed descriptor sets used throughout resolution.
//!
//! # Device kinds vs. distribution kinds
//!
//! A training job is described by two orthogonal choices:
//! - **Where** computation happens: a [`DeviceKind`] (CPU, GPU, TPU, IPU).
//! - **How** work is spread across processes and devices: a [`DistributionKind`]
//!   (data-parallel, distributed data-parallel and its variants, Horovod, DeepSpeed, ...).
//!
//! A single-device job has no distribution kind at all, which is why the connector stores
//! `Option<DistributionKind>`. Every `use_*` view of the job (e.g. "is this DDP?") is a
//! predicate over that one value, so contradictory flags cannot be represented.

use crate::error::{ConnectorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hardware class the job runs on. Exactly one is active per resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Cpu,
    Gpu,
    Tpu,
    Ipu,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Gpu => "gpu",
            DeviceKind::Tpu => "tpu",
            DeviceKind::Ipu => "ipu",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parallelization approach of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionKind {
    /// Single process, module replicated across local GPUs.
    Dp,
    /// One process per device, launched externally or by a script re-launch.
    Ddp,
    /// One process per device, spawned from the current process.
    DdpSpawn,
    /// One process per node, DP within each node.
    Ddp2,
    DdpSharded,
    DdpShardedSpawn,
    DdpFullySharded,
    TpuSpawn,
    Horovod,
    #[serde(rename = "deepspeed")]
    DeepSpeed,
}

impl DistributionKind {
    pub const ALL: [DistributionKind; 10] = [
        DistributionKind::Dp,
        DistributionKind::Ddp,
        DistributionKind::DdpSpawn,
        DistributionKind::Ddp2,
        DistributionKind::DdpSharded,
        DistributionKind::DdpShardedSpawn,
        DistributionKind::DdpFullySharded,
        DistributionKind::TpuSpawn,
        DistributionKind::Horovod,
        DistributionKind::DeepSpeed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionKind::Dp => "dp",
            DistributionKind::Ddp => "ddp",
            DistributionKind::DdpSpawn => "ddp_spawn",
            DistributionKind::Ddp2 => "ddp2",
            DistributionKind::DdpSharded => "ddp_sharded",
            DistributionKind::DdpShardedSpawn => "ddp_sharded_spawn",
            DistributionKind::DdpFullySharded => "ddp_fully_sharded",
            DistributionKind::TpuSpawn => "tpu_spawn",
            DistributionKind::Horovod => "horovod",
            DistributionKind::DeepSpeed => "deepspeed",
        }
    }

    /// Whether this kind can be started from an interactive context (e.g. a REPL).
    ///
    /// Compatible kinds never re-launch the current process out-of-band: they either stay in
    /// one process or spawn children from it.
    pub fn is_interactive_compatible(&self) -> bool {
        matches!(
            self,
            DistributionKind::Dp
                | DistributionKind::DdpSpawn
                | DistributionKind::DdpShardedSpawn
                | DistributionKind::TpuSpawn
        )
    }

    /// All kinds for which [`is_interactive_compatible`](Self::is_interactive_compatible) holds.
    pub fn interactive_compatible_kinds() -> Vec<DistributionKind> {
        Self::ALL
            .into_iter()
            .filter(DistributionKind::is_interactive_compatible)
            .collect()
    }

    /// The DDP family: every kind that runs one process per device.
    pub fn is_ddp_family(&self) -> bool {
        matches!(
            self,
            DistributionKind::Ddp
                | DistributionKind::DdpSpawn
                | DistributionKind::DdpSharded
                | DistributionKind::DdpShardedSpawn
                | DistributionKind::DdpFullySharded
                | DistributionKind::DeepSpeed
                | DistributionKind::TpuSpawn
        )
    }

    /// Kinds that cannot run without at least one GPU.
    pub fn requires_gpu(&self) -> bool {
        matches!(
            self,
            DistributionKind::Dp
                | DistributionKind::Ddp
                | DistributionKind::DdpSpawn
                | DistributionKind::Ddp2
        )
    }

    /// Only the DDP family and DDP2 can span more than one node.
    pub fn supports_multi_node(&self) -> bool {
        self.is_ddp_family() || *self == DistributionKind::Ddp2
    }
}

impl fmt::Display for DistributionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistributionKind {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lowered)
            .ok_or_else(|| ConnectorError::UnknownBackend {
                name: s.to_string(),
                valid: Self::ALL.iter().map(|kind| kind.as_str().to_string()).collect(),
            })
    }
}

/// Preferred backend for 16-bit mixed precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmpType {
    /// The framework's own automatic mixed precision.
    #[default]
    Native,
    /// The optimizer-level alternate backend (NVIDIA Apex).
    Apex,
}

impl FromStr for AmpType {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(AmpType::Native),
            "apex" => Ok(AmpType::Apex),
            _ => Err(ConnectorError::UnknownBackend {
                name: s.to_string(),
                valid: vec!["native".into(), "apex".into()],
            }),
        }
    }
}

/// How the user asked for GPUs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GpuRequestRepr", into = "GpuRequestRepr")]
pub enum GpuRequest {
    /// The first `n` GPUs. `Count(0)` means no GPU.
    Count(usize),
    /// Exactly these device ordinals.
    Ids(Vec<usize>),
    /// Every GPU the host reports.
    All,
}

impl FromStr for GpuRequest {
    type Err = ConnectorError;

    /// Accepts `"-1"`/`"all"`, comma separated ids (`"0,2"`, `"1,"`) or a plain count (`"3"`).
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed == "-1" || trimmed.eq_ignore_ascii_case("all") {
            return Ok(GpuRequest::All);
        }
        let invalid = || ConnectorError::InvalidGpuRequest(format!("cannot parse `{s}`"));
        if trimmed.contains(',') {
            let ids = trimmed
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| part.parse::<usize>().map_err(|_| invalid()))
                .collect::<Result<Vec<_>>>()?;
            return Ok(GpuRequest::Ids(ids));
        }
        trimmed.parse::<usize>().map(GpuRequest::Count).map_err(|_| invalid())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum GpuRequestRepr {
    Count(i64),
    Ids(Vec<usize>),
    Text(String),
}

impl TryFrom<GpuRequestRepr> for GpuRequest {
    type Error = ConnectorError;

    fn try_from(repr: GpuRequestRepr) -> Result<Self> {
        match repr {
            GpuRequestRepr::Count(-1) => Ok(GpuRequest::All),
            GpuRequestRepr::Count(n) => usize::try_from(n)
                .map(GpuRequest::Count)
                .map_err(|_| ConnectorError::InvalidGpuRequest(format!("negative GPU count {n}"))),
            GpuRequestRepr::Ids(ids) => Ok(GpuRequest::Ids(ids)),
            GpuRequestRepr::Text(text) => text.parse(),
        }
    }
}

impl From<GpuRequest> for GpuRequestRepr {
    fn from(request: GpuRequest) -> Self {
        match request {
            GpuRequest::Count(n) => GpuRequestRepr::Count(i64::try_from(n).unwrap_or(i64::MAX)),
            GpuRequest::Ids(ids) => GpuRequestRepr::Ids(ids),
            GpuRequest::All => GpuRequestRepr::Count(-1),
        }
    }
}

/// How the user asked for TPU cores.
///
/// A count spawns one process per core; an explicit core id pins a single process to that core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TpuCores {
    Count(usize),
    Ids(Vec<usize>),
}

impl fmt::Display for TpuCores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TpuCores::Count(n) => write!(f, "{n}"),
            TpuCores::Ids(ids) => write!(f, "{ids:?}"),
        }
    }
}

/// A concrete device a strategy process is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParallelDevice {
    Cpu,
    Cuda(usize),
    Tpu(usize),
    Ipu(usize),
}

impl ParallelDevice {
    /// Device ordinal, if the device has one.
    pub fn index(&self) -> Option<usize> {
        match self {
            ParallelDevice::Cpu => None,
            ParallelDevice::Cuda(i) | ParallelDevice::Tpu(i) | ParallelDevice::Ipu(i) => Some(*i),
        }
    }
}

impl fmt::Display for ParallelDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParallelDevice::Cpu => f.write_str("cpu"),
            ParallelDevice::Cuda(i) => write!(f, "cuda:{i}"),
            ParallelDevice::Tpu(i) => write!(f, "xla:{i}"),
            ParallelDevice::Ipu(i) => write!(f, "ipu:{i}"),
        }
    }
}
