//! Non-fatal messages produced during resolution.
//!
//! In a multi-process job every process runs the same resolution, so messages are only
//! forwarded to `tracing` on the global rank-zero process. They are recorded on every rank
//! so callers can inspect what resolution decided and why.

use crate::env::EnvSnapshot;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
}

/// One recorded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

/// Global rank of this process as seen by the launcher, defaulting to 0.
pub fn global_rank(env: &EnvSnapshot) -> usize {
    ["RANK", "SLURM_PROCID", "JSM_NAMESPACE_RANK"]
        .iter()
        .find_map(|key| env.parse(key))
        .unwrap_or(0)
}

/// Recorder for warnings and informational summaries.
#[derive(Debug)]
pub struct Diagnostics {
    rank_zero: bool,
    entries: Mutex<Vec<Diagnostic>>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Diagnostics {
    pub fn new(rank_zero: bool) -> Self {
        Self {
            rank_zero,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn for_env(env: &EnvSnapshot) -> Self {
        Self::new(global_rank(env) == 0)
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        if self.rank_zero {
            tracing::warn!("{message}");
        }
        self.push(Severity::Warning, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        if self.rank_zero {
            tracing::info!("{message}");
        }
        self.push(Severity::Info, message);
    }

    fn push(&self, severity: Severity, message: String) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Diagnostic { severity, message });
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.severity == Severity::Warning)
            .map(|entry| entry.message)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_rank_precedence() {
        let env = EnvSnapshot::from_pairs([("SLURM_PROCID", "3"), ("RANK", "1")]);
        assert_eq!(global_rank(&env), 1);
        let env = EnvSnapshot::from_pairs([("SLURM_PROCID", "3")]);
        assert_eq!(global_rank(&env), 3);
        assert_eq!(global_rank(&EnvSnapshot::default()), 0);
    }

    #[test]
    fn test_records_on_every_rank() {
        let diagnostics = Diagnostics::for_env(&EnvSnapshot::from_pairs([("RANK", "2")]));
        diagnostics.warn("careful");
        diagnostics.info("fyi");
        assert_eq!(diagnostics.warnings(), vec!["careful".to_string()]);
        assert_eq!(diagnostics.entries().len(), 2);
    }
}
