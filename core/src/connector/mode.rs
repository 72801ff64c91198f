//! # Distributed-mode resolution
//!
//! Settles the `(DeviceKind, Option<DistributionKind>)` pair from the backend name, the
//! requested device counts and the environment.
//!
//! Resolution is an ordered table of [`Rule`]s. Each rule has a guard and an action; every
//! rule whose guard holds *at the moment it is reached* runs, in table order. Later guards see
//! the effects of earlier actions, so the order of [`RULES`] is part of the behaviour.
//!
//! The table is re-run whenever a plugin name hint re-opens resolution, with the
//! distribution kind reset first.

use crate::diagnostics::Diagnostics;
use crate::env::{EnvSnapshot, HOROVOD_RANK, OMPI_COMM_WORLD_RANK};
use crate::error::{ConnectorError, Result};
use crate::host::Platform;
use crate::plugins::StrategyRegistry;
use crate::types::{DeviceKind, DistributionKind, TpuCores};

/// Mutable resolution state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ModeState {
    pub device_kind: DeviceKind,
    pub distrib_type: Option<DistributionKind>,
    /// Backend name after registry aliasing.
    pub distributed_backend: Option<String>,
    pub num_processes: Option<usize>,
    pub parallel_device_ids: Option<Vec<usize>>,
    pub num_nodes: usize,
    pub tpu_cores: Option<TpuCores>,
    pub ipus: Option<usize>,
}

impl ModeState {
    pub fn num_gpus(&self) -> usize {
        self.parallel_device_ids.as_ref().map_or(0, Vec::len)
    }

    /// Process count with the unset default of one.
    pub fn num_processes(&self) -> usize {
        self.num_processes.unwrap_or(1)
    }

    fn backend(&self) -> Option<&str> {
        self.distributed_backend.as_deref()
    }

    fn backend_is(&self, name: &str) -> bool {
        self.backend() == Some(name)
    }

    /// The backend name explicitly asks for CPU, e.g. `"ddp_cpu"`.
    fn explicit_cpu(&self) -> bool {
        self.backend().is_some_and(|name| name.contains("cpu"))
    }

    fn multi_process_cpu(&self) -> bool {
        self.num_gpus() == 0 && (self.num_nodes > 1 || self.num_processes() > 1)
    }
}

/// Read-only collaborators of resolution.
pub(crate) struct ModeContext<'a> {
    pub platform: &'a Platform,
    pub registry: &'a StrategyRegistry,
    pub diagnostics: &'a Diagnostics,
    /// A user accelerator replaces mode inference.
    pub custom_accelerator: bool,
    /// A registered strategy name is among the plugin hints.
    pub training_type_in_plugins: bool,
}

/// Launched by `horovodrun`/`mpirun`.
pub(crate) fn has_horovodrun(env: &EnvSnapshot) -> bool {
    env.contains(OMPI_COMM_WORLD_RANK) || env.contains(HOROVOD_RANK)
}

struct Rule {
    name: &'static str,
    applies: fn(&ModeState, &ModeContext<'_>) -> bool,
    apply: fn(&mut ModeState, &ModeContext<'_>) -> Result<()>,
}

const RULES: &[Rule] = &[
    Rule {
        name: "launcher_autodetect",
        applies: |state, ctx| state.backend().is_none() && has_horovodrun(&ctx.platform.env),
        apply: set_horovod_backend,
    },
    Rule {
        name: "cpu_multiprocess_autodetect",
        applies: |state, ctx| {
            state.backend().is_none()
                && !has_horovodrun(&ctx.platform.env)
                && state.multi_process_cpu()
        },
        apply: |state, _| {
            state.distrib_type = Some(DistributionKind::Ddp);
            Ok(())
        },
    },
    Rule {
        name: "multi_gpu_autodetect",
        applies: |state, ctx| {
            state.backend().is_none()
                && !has_horovodrun(&ctx.platform.env)
                && !state.multi_process_cpu()
                && state.num_gpus() > 1
        },
        apply: |state, ctx| {
            ctx.diagnostics.warn(
                "You requested multiple GPUs but did not specify a backend, e.g. \
                 `accelerator=\"dp\"|\"ddp\"|\"ddp2\"`. Setting `accelerator=\"ddp_spawn\"` for you.",
            );
            state.distributed_backend = Some(DistributionKind::DdpSpawn.as_str().to_string());
            Ok(())
        },
    },
    Rule {
        name: "ddp_cpu",
        applies: |state, _| state.backend_is("ddp_cpu"),
        apply: |state, ctx| {
            state.distrib_type = Some(DistributionKind::DdpSpawn);
            if state.num_gpus() > 0 {
                ctx.diagnostics.warn(
                    "You requested one or more GPUs, but set the backend to `ddp_cpu`. \
                     Training will not use GPUs.",
                );
                state.parallel_device_ids = None;
            }
            if state.num_processes.is_none() {
                state.num_processes = Some(ctx.platform.host.cpu_count);
            }
            Ok(())
        },
    },
    Rule {
        name: "tpu",
        applies: |state, _| {
            !state.backend_is("ddp_cpu") && (state.backend_is("tpu") || state.tpu_cores.is_some())
        },
        apply: |state, _| {
            state.device_kind = DeviceKind::Tpu;
            if matches!(state.tpu_cores, Some(TpuCores::Count(_))) {
                state.distrib_type = Some(DistributionKind::TpuSpawn);
            }
            Ok(())
        },
    },
    Rule {
        name: "ipu",
        applies: |state, _| {
            !state.backend_is("ddp_cpu")
                && (state.backend_is("ipu") || state.ipus.is_some())
                && state.tpu_cores.is_none()
                && !state.backend_is("tpu")
        },
        apply: |state, _| {
            state.device_kind = DeviceKind::Ipu;
            Ok(())
        },
    },
    Rule {
        name: "parse_backend",
        applies: |state, _| {
            matches!(state.backend(), Some(name) if !matches!(name, "ddp_cpu" | "tpu" | "ipu"))
                && state.tpu_cores.is_none()
                && state.distrib_type.is_none()
        },
        apply: |state, _| {
            if let Some(name) = state.backend() {
                state.distrib_type = Some(name.parse()?);
            }
            Ok(())
        },
    },
    Rule {
        name: "gpu_promotion",
        applies: |state, _| state.num_gpus() > 0 && !state.explicit_cpu(),
        apply: |state, _| {
            state.device_kind = DeviceKind::Gpu;
            Ok(())
        },
    },
    Rule {
        name: "gpu_availability",
        applies: |state, ctx| {
            state.num_gpus() == 0
                && !ctx.platform.host.cuda_available()
                && state.distrib_type.is_some_and(|kind| kind.requires_gpu())
                && !state.explicit_cpu()
        },
        apply: |state, ctx| {
            ctx.diagnostics.warn(
                "You requested distributed training on GPUs, but none is available, \
                 so we set backend to `ddp_cpu`.",
            );
            if state.num_nodes > 1 || state.num_processes() > 1 {
                state.distrib_type = Some(DistributionKind::Ddp);
            } else {
                ctx.diagnostics.warn(
                    "You are running on single node with no parallelization, so distributed has no effect.",
                );
                state.distrib_type = None;
            }
            Ok(())
        },
    },
    Rule {
        name: "interactive",
        applies: |state, ctx| {
            ctx.platform.host.interactive
                && state
                    .distrib_type
                    .is_some_and(|kind| !kind.is_interactive_compatible())
        },
        apply: |state, _| {
            let kind = state
                .distrib_type
                .map_or_else(String::new, |kind| kind.to_string());
            Err(ConnectorError::InteractiveIncompatible {
                kind,
                compatible: DistributionKind::interactive_compatible_kinds()
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            })
        },
    },
    Rule {
        name: "process_backfill",
        applies: |state, _| {
            state.device_kind == DeviceKind::Gpu
                && matches!(
                    state.distrib_type,
                    Some(DistributionKind::Ddp | DistributionKind::DdpSpawn | DistributionKind::Ddp2)
                )
        },
        apply: |state, _| {
            state.num_processes = Some(match state.distrib_type {
                Some(DistributionKind::Ddp2) => state.num_nodes,
                _ => state.num_gpus(),
            });
            Ok(())
        },
    },
    Rule {
        name: "horovod_backend",
        applies: |state, _| state.backend_is("horovod"),
        apply: set_horovod_backend,
    },
    Rule {
        name: "multi_node",
        applies: |state, _| {
            state.num_nodes > 1
                && !state
                    .distrib_type
                    .is_some_and(|kind| kind.supports_multi_node())
        },
        apply: |state, _| {
            Err(ConnectorError::MultiNodeUnsupported {
                kind: state
                    .distrib_type
                    .map_or_else(|| "none".to_string(), |kind| kind.to_string()),
                num_nodes: state.num_nodes,
            })
        },
    },
    Rule {
        name: "summary",
        applies: |_, _| true,
        apply: |state, ctx| {
            let host = &ctx.platform.host;
            ctx.diagnostics.info(format!(
                "GPU available: {}, used: {}",
                host.cuda_available(),
                state.device_kind == DeviceKind::Gpu
            ));
            let tpu_cores = match &state.tpu_cores {
                Some(TpuCores::Count(n)) => *n,
                Some(TpuCores::Ids(ids)) => ids.len(),
                None => 0,
            };
            ctx.diagnostics.info(format!(
                "TPU available: {}, using: {tpu_cores} TPU cores",
                host.tpu_available
            ));
            ctx.diagnostics.info(format!(
                "IPU available: {}, using: {} IPUs",
                host.ipu_available,
                state.ipus.unwrap_or(0)
            ));
            if host.cuda_available() && state.device_kind != DeviceKind::Gpu {
                ctx.diagnostics.warn(
                    "GPU available but not used. Set the gpus flag in your trainer `Trainer(gpus=1)` \
                     or script `--gpus=1`.",
                );
            }
            Ok(())
        },
    },
];

/// Forces Horovod: checks the installation, initializes rank/size discovery and takes the
/// local process layout from the launcher.
fn set_horovod_backend(state: &mut ModeState, ctx: &ModeContext<'_>) -> Result<()> {
    if !ctx.platform.host.horovod_available {
        return Err(ConnectorError::HorovodUnavailable);
    }
    if state.num_gpus() > 1 || state.num_nodes > 1 {
        return Err(ConnectorError::HorovodDeviceCount {
            num_gpus: state.num_gpus(),
            num_nodes: state.num_nodes,
        });
    }
    state.distrib_type = Some(DistributionKind::Horovod);

    let horovod = &ctx.platform.horovod;
    horovod.init();
    // Runs before GPU promotion on the launcher path, so the device kind is not settled yet.
    if state.num_gpus() > 0 && !state.explicit_cpu() && ctx.platform.host.cuda_available() {
        state.parallel_device_ids = Some((0..horovod.local_size()).collect());
    } else {
        state.num_processes = Some(horovod.local_size());
    }
    Ok(())
}

/// Runs mode resolution.
///
/// `backend` is a name that re-opens resolution (a plugin name hint); `None` resolves with the
/// backend already in `state`.
pub(crate) fn set_distributed_mode(
    state: &mut ModeState,
    ctx: &ModeContext<'_>,
    backend: Option<&str>,
) -> Result<()> {
    match backend {
        None if ctx.training_type_in_plugins => return Ok(()),
        None => {}
        Some(name) => {
            let resolved = ctx.registry.backend_for(name).unwrap_or(name);
            state.distributed_backend = Some(resolved.to_string());
        }
    }
    if ctx.custom_accelerator {
        return Ok(());
    }

    for rule in RULES {
        if (rule.applies)(state, ctx) {
            tracing::trace!(rule = rule.name, "applying distributed mode rule");
            (rule.apply)(state, ctx)?;
        }
    }
    tracing::debug!(
        device = %state.device_kind,
        distrib_type = ?state.distrib_type,
        num_processes = state.num_processes(),
        "resolved distributed mode"
    );
    Ok(())
}
