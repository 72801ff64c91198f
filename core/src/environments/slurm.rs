//! Slurm-managed launches.

use super::ClusterEnvironment;
use crate::env::{
    EnvSnapshot, FAKE_SLURM_MANAGING_TASKS, SLURM_JOB_NAME, SLURM_LOCALID, SLURM_NODEID,
    SLURM_NODELIST, SLURM_NTASKS, SLURM_PROCID,
};
use crate::types::DistributionKind;

const DEFAULT_MASTER_PORT: u16 = 12910;

/// Decides whether Slurm is launching the job's processes.
///
/// Only DDP-family and DDP2 jobs are considered. Slurm manages the tasks when its task count
/// equals the processes the job needs: `num_gpus * num_nodes`, or `num_processes` for a
/// CPU-only job. An interactive allocation (job name `bash`) never manages tasks. Missing or
/// malformed variables mean "not managed".
///
/// Setting `FAKE_SLURM_MANAGING_TASKS` to a non-zero integer forces the result to `true`.
pub fn slurm_manages_tasks(
    kind: Option<DistributionKind>,
    num_gpus: usize,
    num_nodes: usize,
    num_processes: Option<usize>,
    env: &EnvSnapshot,
) -> bool {
    let mut managed = false;
    if kind.is_some_and(|kind| kind.supports_multi_node()) {
        let requested_gpus = num_gpus * num_nodes;
        managed = match (env.parse::<usize>(SLURM_NTASKS), env.get(SLURM_JOB_NAME)) {
            (Some(_), Some("bash")) | (None, _) | (_, None) => false,
            (Some(tasks), Some(_)) if requested_gpus == 0 => Some(tasks) == num_processes,
            (Some(tasks), Some(_)) => tasks == requested_gpus,
        };
    }
    if env
        .parse::<i64>(FAKE_SLURM_MANAGING_TASKS)
        .is_some_and(|fake| fake != 0)
    {
        managed = true;
    }
    managed
}

/// Rank discovery from `SLURM_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlurmEnvironment {
    world_size: Option<usize>,
    global_rank: usize,
    local_rank: usize,
    node_rank: usize,
    master_address: String,
    master_port: u16,
}

impl SlurmEnvironment {
    pub fn from_env(env: &EnvSnapshot) -> Self {
        let master_address = env
            .get("MASTER_ADDR")
            .map(str::to_string)
            .or_else(|| env.get(SLURM_NODELIST).map(resolve_root_node_address))
            .unwrap_or_else(|| "127.0.0.1".to_string());
        let master_port = env.parse("MASTER_PORT").unwrap_or_else(|| {
            env.get("SLURM_JOB_ID")
                .and_then(port_from_job_id)
                .unwrap_or(DEFAULT_MASTER_PORT)
        });
        Self {
            world_size: env.parse(SLURM_NTASKS),
            global_rank: env.parse_or(SLURM_PROCID, 0),
            local_rank: env.parse_or(SLURM_LOCALID, 0),
            node_rank: env.parse_or(SLURM_NODEID, 0),
            master_address,
            master_port,
        }
    }
}

impl ClusterEnvironment for SlurmEnvironment {
    fn name(&self) -> &'static str {
        "slurm"
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

/// First host of a Slurm node list, e.g. `gpu[04-07,12]` -> `gpu04`.
fn resolve_root_node_address(nodelist: &str) -> String {
    let first = nodelist.split([' ', ',']).next().unwrap_or(nodelist);
    match nodelist.split_once('[') {
        Some((name, ranges)) if first.contains('[') => {
            let number: String = ranges
                .split([',', '-'])
                .next()
                .unwrap_or_default()
                .chars()
                .filter(char::is_ascii_digit)
                .collect();
            format!("{name}{number}")
        }
        _ => first.to_string(),
    }
}

/// Derives a port from the last four digits of the job id, so jobs sharing a node differ.
fn port_from_job_id(job_id: &str) -> Option<u16> {
    let digits: String = job_id.chars().filter(char::is_ascii_digit).collect();
    let tail = &digits[digits.len().saturating_sub(4)..];
    tail.parse::<u16>().ok().map(|n| n + 15000)
}
