//! Elastic-launcher (`torchrun`) launches.

use super::ClusterEnvironment;
use crate::env::EnvSnapshot;

const REQUIRED_VARS: [&str; 4] = ["RANK", "GROUP_RANK", "LOCAL_RANK", "LOCAL_WORLD_SIZE"];
const DEFAULT_MASTER_PORT: u16 = 12910;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorchElasticEnvironment {
    world_size: Option<usize>,
    global_rank: usize,
    local_rank: usize,
    node_rank: usize,
    master_address: String,
    master_port: u16,
}

impl TorchElasticEnvironment {
    /// The launcher exports all of `RANK`, `GROUP_RANK`, `LOCAL_RANK` and `LOCAL_WORLD_SIZE`.
    pub fn is_active(env: &EnvSnapshot) -> bool {
        env.contains_all(&REQUIRED_VARS)
    }

    pub fn from_env(env: &EnvSnapshot) -> Self {
        let master_address = match env.get("MASTER_ADDR") {
            Some(address) => address.to_string(),
            None => {
                tracing::warn!("MASTER_ADDR environment variable is not defined. Set as localhost");
                "127.0.0.1".to_string()
            }
        };
        Self {
            world_size: env.parse("WORLD_SIZE"),
            global_rank: env.parse_or("RANK", 0),
            local_rank: env.parse_or("LOCAL_RANK", 0),
            node_rank: env.parse_or("GROUP_RANK", 0),
            master_address,
            master_port: env.parse_or("MASTER_PORT", DEFAULT_MASTER_PORT),
        }
    }
}

impl ClusterEnvironment for TorchElasticEnvironment {
    fn name(&self) -> &'static str {
        "torchelastic"
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
        self.local_rank
    }

    fn node_rank(&self) -> usize {
        self.node_rank
    }
}
