//! Kubeflow PyTorchJob launches.

use super::ClusterEnvironment;
use crate::env::EnvSnapshot;

const REQUIRED_VARS: [&str; 4] = ["MASTER_ADDR", "MASTER_PORT", "WORLD_SIZE", "RANK"];

/// The operator runs one process per pod, so the local rank is always 0 and the node rank
/// equals the global rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeflowEnvironment {
    world_size: Option<usize>,
    global_rank: usize,
    master_address: String,
    master_port: u16,
}

impl KubeflowEnvironment {
    /// Running in a Kubernetes pod with the operator's rendezvous variables exported.
    pub fn is_active(env: &EnvSnapshot) -> bool {
        env.contains("KUBERNETES_PORT") && env.contains_all(&REQUIRED_VARS)
    }

    pub fn from_env(env: &EnvSnapshot) -> Self {
        Self {
            world_size: env.parse("WORLD_SIZE"),
            global_rank: env.parse_or("RANK", 0),
            master_address: env.get("MASTER_ADDR").unwrap_or("127.0.0.1").to_string(),
            master_port: env.parse_or("MASTER_PORT", 0),
        }
    }
}

impl ClusterEnvironment for KubeflowEnvironment {
    fn name(&self) -> &'static str {
        "kubeflow"
    }

    fn creates_children(&self) -> bool {
        true
    }

    fn master_address(&self) -> String {
        self.master_address.clone()
    }

    fn master_port(&self) -> u16 {
        self.master_port
    }

    fn world_size(&self) -> Option<usize> {
        self.world_size
    }

    fn global_rank(&self) -> usize {
        self.global_rank
    }

    fn local_rank(&self) -> usize {
        0
    }

    fn node_rank(&self) -> usize {
        self.global_rank
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_kubernetes() {
        let env = EnvSnapshot::from_pairs([
            ("MASTER_ADDR", "pytorch-master"),
            ("MASTER_PORT", "23456"),
            ("WORLD_SIZE", "2"),
            ("RANK", "1"),
        ]);
        assert!(!KubeflowEnvironment::is_active(&env));
        let env = env.with("KUBERNETES_PORT", "tcp://10.0.0.1:443");
        assert!(KubeflowEnvironment::is_active(&env));

        let kubeflow = KubeflowEnvironment::from_env(&env);
        assert_eq!(kubeflow.master_address(), "pytorch-master");
        assert_eq!(kubeflow.master_port(), 23456);
        assert_eq!(kubeflow.node_rank(), 1);
        assert_eq!(kubeflow.local_rank(), 0);
    }
}
