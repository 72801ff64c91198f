//! Process-wide numeric backend flags.
//!
//! Benchmark mode and determinism are properties of the whole process, not of one connector.
//! The last resolution wins.

use crate::env::HOROVOD_FUSION_THRESHOLD;
use std::sync::atomic::{AtomicBool, Ordering};

static BENCHMARK: AtomicBool = AtomicBool::new(false);
static DETERMINISTIC: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NumericFlags {
    /// Let kernels autotune for the input shapes seen.
    pub benchmark: bool,
    /// Only use deterministic kernels.
    pub deterministic: bool,
}

/// Stores the flags process-wide.
///
/// Determinism additionally exports `HOROVOD_FUSION_THRESHOLD=0`, which disables Horovod's
/// non-deterministic tensor fusion.
pub fn configure_numeric_backend(flags: NumericFlags) {
    BENCHMARK.store(flags.benchmark, Ordering::SeqCst);
    DETERMINISTIC.store(flags.deterministic, Ordering::SeqCst);
    if flags.deterministic {
        std::env::set_var(HOROVOD_FUSION_THRESHOLD, "0");
    }
    tracing::debug!(
        benchmark = flags.benchmark,
        deterministic = flags.deterministic,
        "configured numeric backend"
    );
}

pub fn numeric_flags() -> NumericFlags {
    NumericFlags {
        benchmark: BENCHMARK.load(Ordering::SeqCst),
        deterministic: DETERMINISTIC.load(Ordering::SeqCst),
    }
}
