//! # Cluster Environments
//!
//! A distributed job is a set of processes that must agree on who is who: how many of them
//! exist (the *world size*), which one each process is (the *global rank*), and where the
//! rank-zero process listens so the others can rendezvous with it.
//!
//! Who answers those questions depends on how the processes were launched:
//!
//! *   **Slurm** ([`SlurmEnvironment`]): the scheduler starts every task and exports
//!     `SLURM_*` variables.
//! *   **Elastic launcher** ([`TorchElasticEnvironment`]): `torchrun`-style launchers export
//!     `RANK`, `GROUP_RANK`, `LOCAL_RANK`, `LOCAL_WORLD_SIZE`.
//! *   **Kubeflow** ([`KubeflowEnvironment`]): the operator exports `MASTER_*`, `WORLD_SIZE`
//!     and `RANK` inside a Kubernetes pod.
//! *   **Local** ([`LocalEnvironment`]): nothing manages us; the job spawns its own processes
//!     on this host.
//!
//! Resolution picks exactly one of them with [`select_cluster_environment`].

pub mod kubeflow;
pub mod local;
pub mod slurm;
pub mod torchelastic;

pub use kubeflow::KubeflowEnvironment;
pub use local::LocalEnvironment;
pub use slurm::{slurm_manages_tasks, SlurmEnvironment};
pub use torchelastic::TorchElasticEnvironment;

use crate::env::EnvSnapshot;
use std::fmt::Debug;
use std::sync::Arc;

/// Rank and world-size discovery for one launch mechanism.
pub trait ClusterEnvironment: Debug + Send + Sync {
    /// Short identifier, e.g. `"slurm"`.
    fn name(&self) -> &'static str;

    /// Whether the launcher already started every process, so the job must not spawn its own.
    fn creates_children(&self) -> bool;

    /// Address of the rank-zero process.
    fn master_address(&self) -> String;

    /// Port the rank-zero process listens on.
    fn master_port(&self) -> u16;

    /// Total number of processes, if the launcher knows it.
    fn world_size(&self) -> Option<usize>;

    /// Rank of this process across all nodes.
    fn global_rank(&self) -> usize;

    /// Rank of this process on its node.
    fn local_rank(&self) -> usize;

    /// Rank of this node.
    fn node_rank(&self) -> usize;
}

/// Picks the cluster environment, first match wins:
///
/// 1. the user's explicit environment,
/// 2. Slurm, if it was detected to manage the job's tasks,
/// 3. an active elastic launcher,
/// 4. an active Kubeflow operator,
/// 5. the local single-host environment.
pub fn select_cluster_environment(
    explicit: Option<&Arc<dyn ClusterEnvironment>>,
    is_slurm_managing_tasks: bool,
    env: &EnvSnapshot,
) -> Arc<dyn ClusterEnvironment> {
    if let Some(explicit) = explicit {
        return Arc::clone(explicit);
    }
    let selected: Arc<dyn ClusterEnvironment> = if is_slurm_managing_tasks {
        Arc::new(SlurmEnvironment::from_env(env))
    } else if TorchElasticEnvironment::is_active(env) {
        Arc::new(TorchElasticEnvironment::from_env(env))
    } else if KubeflowEnvironment::is_active(env) {
        Arc::new(KubeflowEnvironment::from_env(env))
    } else {
        Arc::new(LocalEnvironment::from_env(env))
    };
    tracing::debug!(environment = selected.name(), "selected cluster environment");
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elastic_env() -> EnvSnapshot {
        EnvSnapshot::from_pairs([
            ("RANK", "0"),
            ("GROUP_RANK", "0"),
            ("LOCAL_RANK", "0"),
            ("LOCAL_WORLD_SIZE", "2"),
        ])
    }

    fn kubeflow_env() -> EnvSnapshot {
        EnvSnapshot::from_pairs([
            ("KUBERNETES_PORT", "tcp://10.0.0.1:443"),
            ("MASTER_ADDR", "pytorch-master"),
            ("MASTER_PORT", "23456"),
            ("WORLD_SIZE", "4"),
            ("RANK", "1"),
        ])
    }

    #[test]
    fn test_explicit_wins() {
        let explicit: Arc<dyn ClusterEnvironment> =
            Arc::new(LocalEnvironment::from_env(&EnvSnapshot::default()));
        let selected = select_cluster_environment(Some(&explicit), true, &elastic_env());
        assert!(Arc::ptr_eq(&selected, &explicit));
    }

    #[test]
    fn test_slurm_before_elastic() {
        let selected = select_cluster_environment(None, true, &elastic_env());
        assert_eq!(selected.name(), "slurm");
    }

    #[test]
    fn test_elastic_before_kubeflow() {
        let mut pairs = kubeflow_env();
        for (key, value) in [("GROUP_RANK", "0"), ("LOCAL_RANK", "0"), ("LOCAL_WORLD_SIZE", "1")] {
            pairs = pairs.with(key, value);
        }
        let selected = select_cluster_environment(None, false, &pairs);
        assert_eq!(selected.name(), "torchelastic");
    }

    #[test]
    fn test_kubeflow_then_local() {
        assert_eq!(
            select_cluster_environment(None, false, &kubeflow_env()).name(),
            "kubeflow"
        );
        assert_eq!(
            select_cluster_environment(None, false, &EnvSnapshot::default()).name(),
            "local"
        );
    }
}
