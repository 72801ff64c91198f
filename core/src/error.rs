//! Error type for accelerator resolution.
//!
//! Every error in this crate is a fatal configuration error: resolution runs once at job
//! startup and nothing is retried. The only non-fatal outcomes are the warn-and-downgrade
//! paths, which are reported through [`Diagnostics`](crate::diagnostics::Diagnostics).

use std::path::PathBuf;
use thiserror::Error;

/// Error type for connector resolution.
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// More than one plugin hint of the same category was supplied.
    #[error(
        "You can only specify one {category} plugin. Found more than one: `{first}` and `{second}`"
    )]
    DuplicatePlugin {
        category: &'static str,
        first: String,
        second: String,
    },

    /// A plugin hint matched none of the recognized capabilities.
    #[error(
        "Found invalid type for plugin `{0}`. Expected a precision, training type or cluster environment plugin"
    )]
    InvalidPlugin(String),

    /// A distributed backend name that neither the registry nor the known kinds recognize.
    #[error("Unknown distributed backend `{name}`. Valid choices are: {}", valid.join(", "))]
    UnknownBackend { name: String, valid: Vec<String> },

    /// The resolved distribution kind needs to re-launch the process, which an interactive
    /// context cannot do.
    #[error(
        "Selected distributed backend `{kind}` is not compatible with an interactive environment. \
         Run your code as a script, or choose one of the compatible backends: {}",
        compatible.join(", ")
    )]
    InteractiveIncompatible {
        kind: String,
        compatible: Vec<String>,
    },

    /// `num_nodes > 1` with a distribution kind other than DDP or DDP2.
    #[error(
        "Your chosen distributed type `{kind}` does not support num_nodes > 1 (got {num_nodes}). \
         Please set accelerator=ddp or accelerator=ddp2"
    )]
    MultiNodeUnsupported { kind: String, num_nodes: usize },

    #[error("Requested `accelerator=\"horovod\"`, but Horovod is not installed")]
    HorovodUnavailable,

    #[error(
        "Horovod does not support setting num_nodes / num_gpus explicitly (got {num_gpus} GPUs, {num_nodes} nodes). \
         Use horovodrun / mpirun to configure the number of processes"
    )]
    HorovodDeviceCount { num_gpus: usize, num_nodes: usize },

    #[error("You have asked for native AMP on CPU, but AMP is only available on GPU")]
    NativeAmpOnCpu,

    #[error(
        "You have asked for native AMP but the runtime does not support it, and Apex is not installed either"
    )]
    NativeAmpUnavailable,

    #[error("You have asked for Apex AMP but you have not installed it yet")]
    ApexUnavailable,

    #[error(
        "Sharded strategy `{strategy}` is not supported with Apex AMP, please use native AMP for 16-bit precision"
    )]
    ShardedWithApex { strategy: String },

    #[error("Precision {0} is not supported. We only support precisions 64, 32 and 16")]
    UnsupportedPrecision(u32),

    #[error("Invalid GPU request: {0}")]
    InvalidGpuRequest(String),

    #[error("You requested GPUs {requested:?}, but your machine only has {available} GPUs")]
    GpusUnavailable {
        requested: Vec<usize>,
        available: usize,
    },

    #[error("`tpu_cores` can only be 1, 8 or [<1-8>], got {0}")]
    InvalidTpuCores(String),

    #[error("You requested {0} TPU cores but no TPU devices were found")]
    TpuUnavailable(String),

    #[error("You requested {0} IPUs but no IPU devices were found")]
    IpuUnavailable(usize),

    /// The configuration file could not be read or parsed.
    #[error("Failed to load connector configuration from {path:?}: {message}")]
    Config { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_plugin_names_both_hints() {
        let error = ConnectorError::DuplicatePlugin {
            category: "training type",
            first: "ddp".into(),
            second: "deepspeed".into(),
        };
        let message = error.to_string();
        assert!(message.contains("`ddp`"));
        assert!(message.contains("`deepspeed`"));
    }

    #[test]
    fn test_interactive_error_lists_alternatives() {
        let error = ConnectorError::InteractiveIncompatible {
            kind: "ddp".into(),
            compatible: vec!["dp".into(), "ddp_spawn".into()],
        };
        assert!(error.to_string().ends_with("dp, ddp_spawn"));
    }

    #[test]
    fn test_unsupported_precision_message() {
        let error = ConnectorError::UnsupportedPrecision(8);
        assert_eq!(
            error.to_string(),
            "Precision 8 is not supported. We only support precisions 64, 32 and 16"
        );
    }
}
