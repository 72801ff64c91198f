//! Immutable view over environment variables.
//!
//! Launchers and schedulers communicate with a process through environment variables. The
//! connector reads them exactly once, into an [`EnvSnapshot`], so that resolution is a pure
//! function of its inputs and tests can inject any scheduler setup without touching the real
//! process environment.

use std::collections::HashMap;
use std::str::FromStr;

/// Task count of the current Slurm job.
pub const SLURM_NTASKS: &str = "SLURM_NTASKS";
/// Slurm job name; `bash` marks an interactive allocation.
pub const SLURM_JOB_NAME: &str = "SLURM_JOB_NAME";
pub const SLURM_PROCID: &str = "SLURM_PROCID";
pub const SLURM_LOCALID: &str = "SLURM_LOCALID";
pub const SLURM_NODEID: &str = "SLURM_NODEID";
pub const SLURM_NODELIST: &str = "SLURM_NODELIST";
/// Test-only switch that forces the scheduler-managed flag on.
pub const FAKE_SLURM_MANAGING_TASKS: &str = "FAKE_SLURM_MANAGING_TASKS";
pub const OMPI_COMM_WORLD_RANK: &str = "OMPI_COMM_WORLD_RANK";
pub const HOROVOD_RANK: &str = "HOROVOD_RANK";
pub const HOROVOD_FUSION_THRESHOLD: &str = "HOROVOD_FUSION_THRESHOLD";
/// Set by the script launcher in re-launched DDP children.
pub const PL_IN_DDP_SUBPROCESS: &str = "PL_IN_DDP_SUBPROCESS";

/// A point-in-time copy of environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    /// Captures the current process environment. Non-UTF-8 entries are skipped.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
                .collect(),
        }
    }

    /// Builds a snapshot from explicit pairs.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use accelerator_connector::env::EnvSnapshot;
    /// let env = EnvSnapshot::from_pairs([("SLURM_NTASKS", "4")]);
    /// assert_eq!(env.parse::<usize>("SLURM_NTASKS"), Some(4));
    /// ```
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Returns a copy with `key` set to `value`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn contains_all(&self, keys: &[&str]) -> bool {
        keys.iter().all(|key| self.contains(key))
    }

    /// Parses `key`; a missing or malformed value is `None`.
    pub fn parse<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|value| value.trim().parse().ok())
    }

    /// Parses `key` or falls back to `default` when missing or malformed.
    pub fn parse_or<T: FromStr>(&self, key: &str, default: T) -> T {
        self.parse(key).unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_malformed_is_none() {
        let env = EnvSnapshot::from_pairs([("SLURM_NTASKS", "four")]);
        assert_eq!(env.parse::<usize>(SLURM_NTASKS), None);
        assert_eq!(env.parse_or(SLURM_NTASKS, 7usize), 7);
    }

    #[test]
    fn test_contains_all() {
        let env = EnvSnapshot::default().with("RANK", "0").with("LOCAL_RANK", "0");
        assert!(env.contains_all(&["RANK", "LOCAL_RANK"]));
        assert!(!env.contains_all(&["RANK", "GROUP_RANK"]));
    }

    #[test]
    #[serial]
    fn test_from_process_captures_variables() {
        std::env::set_var("ACCEL_SNAPSHOT_PROBE", "1");
        let env = EnvSnapshot::from_process();
        std::env::remove_var("ACCEL_SNAPSHOT_PROBE");

        assert_eq!(env.get("ACCEL_SNAPSHOT_PROBE"), Some("1"));
        assert!(!EnvSnapshot::from_process().contains("ACCEL_SNAPSHOT_PROBE"));
    }
}
