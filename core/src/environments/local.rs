//! Default single-host environment: the job launches its own processes.

use super::ClusterEnvironment;
use crate::env::EnvSnapshot;
use std::net::TcpListener;
use std::sync::OnceLock;

const FALLBACK_MASTER_PORT: u16 = 12910;

#[derive(Debug)]
pub struct LocalEnvironment {
    world_size: Option<usize>,
    global_rank: usize,
    local_rank: usize,
    node_rank: usize,
    master_address: String,
    master_port: OnceLock<u16>,
    launched_children: bool,
}

impl LocalEnvironment {
    pub fn from_env(env: &EnvSnapshot) -> Self {
        let master_port = OnceLock::new();
        if let Some(port) = env.parse("MASTER_PORT") {
            let _ = master_port.set(port);
        }
        Self {
            world_size: env.parse("WORLD_SIZE"),
            global_rank: env.parse_or("RANK", 0),
            local_rank: env.parse_or("LOCAL_RANK", 0),
            node_rank: env
                .parse("NODE_RANK")
                .or_else(|| env.parse("GROUP_RANK"))
                .unwrap_or(0),
            master_address: env.get("MASTER_ADDR").unwrap_or("127.0.0.1").to_string(),
            master_port,
            // Children re-launched by the job itself carry LOCAL_RANK.
            launched_children: env.contains("LOCAL_RANK"),
        }
    }
}

impl ClusterEnvironment for LocalEnvironment {
    fn name(&self) -> &'static str {
        "local"
    }

    fn creates_children(&self) -> bool {
        self.launched_children
    }

    fn master_address(&self) -> String {
        self.master_address.clone()
    }

    /// `MASTER_PORT`, or a free port picked once on first use.
    fn master_port(&self) -> u16 {
        *self.master_port.get_or_init(|| {
            TcpListener::bind("127.0.0.1:0")
                .and_then(|listener| listener.local_addr())
                .map(|address| address.port())
                .unwrap_or(FALLBACK_MASTER_PORT)
        })
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let local = LocalEnvironment::from_env(&EnvSnapshot::default());
        assert_eq!(local.master_address(), "127.0.0.1");
        assert_eq!(local.global_rank(), 0);
        assert_eq!(local.world_size(), None);
        assert!(!local.creates_children());
    }

    #[test]
    fn test_master_port_is_stable() {
        let local = LocalEnvironment::from_env(&EnvSnapshot::default());
        assert_eq!(local.master_port(), local.master_port());

        let pinned = LocalEnvironment::from_env(&EnvSnapshot::from_pairs([("MASTER_PORT", "29500")]));
        assert_eq!(pinned.master_port(), 29500);
    }
}
