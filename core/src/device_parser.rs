//! Turns loose device requests into validated device ordinals.

use crate::error::{ConnectorError, Result};
use crate::host::HostCapabilities;
use crate::types::{GpuRequest, TpuCores};

/// Resolves a GPU request into the list of CUDA ordinals to use.
///
/// Returns `None` when no GPU was requested (`None`, `Count(0)` or an empty id list). With
/// `auto_select` a count picks the first free GPUs instead of the first GPUs.
///
/// # Errors
///
/// Fails when GPUs are requested on a host without any, or when a requested ordinal does not
/// exist.
pub fn parse_gpu_ids(
    request: Option<&GpuRequest>,
    host: &HostCapabilities,
    auto_select: bool,
) -> Result<Option<Vec<usize>>> {
    let ids = match request {
        None | Some(GpuRequest::Count(0)) => return Ok(None),
        Some(GpuRequest::Ids(ids)) if ids.is_empty() => return Ok(None),
        Some(GpuRequest::Count(n)) if auto_select => pick_multiple_gpus(*n, host)?,
        Some(GpuRequest::Count(n)) => (0..*n).collect(),
        Some(GpuRequest::Ids(ids)) => ids.clone(),
        Some(GpuRequest::All) => (0..host.gpu_count).collect(),
    };
    if !host.cuda_available() || ids.iter().any(|&id| id >= host.gpu_count) {
        return Err(ConnectorError::GpusUnavailable {
            requested: ids,
            available: host.gpu_count,
        });
    }
    Ok(Some(ids))
}

/// Picks the first `n` GPUs that are not busy.
pub fn pick_multiple_gpus(n: usize, host: &HostCapabilities) -> Result<Vec<usize>> {
    let free = host.free_gpus();
    if free.len() < n {
        return Err(ConnectorError::GpusUnavailable {
            requested: (0..n).collect(),
            available: free.len(),
        });
    }
    Ok(free.into_iter().take(n).collect())
}

/// Validates a TPU core request: `1`, `8`, or one explicit core id in `1..=8`.
pub fn parse_tpu_cores(
    request: Option<&TpuCores>,
    host: &HostCapabilities,
) -> Result<Option<TpuCores>> {
    let Some(cores) = request else {
        return Ok(None);
    };
    let valid = match cores {
        TpuCores::Count(n) => matches!(n, 1 | 8),
        TpuCores::Ids(ids) => matches!(ids.as_slice(), [id] if (1..=8).contains(id)),
    };
    if !valid {
        return Err(ConnectorError::InvalidTpuCores(cores.to_string()));
    }
    if !host.tpu_available {
        return Err(ConnectorError::TpuUnavailable(cores.to_string()));
    }
    Ok(Some(cores.clone()))
}

/// The GPU the root process runs on: the first requested ordinal.
pub fn determine_root_gpu(gpu_ids: Option<&[usize]>) -> Option<usize> {
    gpu_ids.and_then(|ids| ids.first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_gpu_requested() {
        let host = HostCapabilities::with_gpus(2);
        assert_eq!(parse_gpu_ids(None, &host, false).unwrap(), None);
        assert_eq!(
            parse_gpu_ids(Some(&GpuRequest::Count(0)), &host, false).unwrap(),
            None
        );
    }

    #[test]
    fn test_count_and_all() {
        let host = HostCapabilities::with_gpus(4);
        assert_eq!(
            parse_gpu_ids(Some(&GpuRequest::Count(2)), &host, false).unwrap(),
            Some(vec![0, 1])
        );
        assert_eq!(
            parse_gpu_ids(Some(&GpuRequest::All), &host, false).unwrap(),
            Some(vec![0, 1, 2, 3])
        );
    }

    #[test]
    fn test_auto_select_skips_busy() {
        let host = HostCapabilities {
            busy_gpus: vec![0],
            ..HostCapabilities::with_gpus(3)
        };
        assert_eq!(
            parse_gpu_ids(Some(&GpuRequest::Count(2)), &host, true).unwrap(),
            Some(vec![1, 2])
        );
        assert!(matches!(
            parse_gpu_ids(Some(&GpuRequest::Count(3)), &host, true),
            Err(ConnectorError::GpusUnavailable { available: 2, .. })
        ));
    }

    #[test]
    fn test_gpus_on_cpu_host_fail() {
        let host = HostCapabilities::cpu_only();
        assert!(matches!(
            parse_gpu_ids(Some(&GpuRequest::Count(1)), &host, false),
            Err(ConnectorError::GpusUnavailable { available: 0, .. })
        ));
        assert!(parse_gpu_ids(Some(&GpuRequest::All), &host, false).is_err());
    }

    #[test]
    fn test_missing_ordinal() {
        let host = HostCapabilities::with_gpus(2);
        let err = parse_gpu_ids(Some(&GpuRequest::Ids(vec![0, 3])), &host, false).unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::GpusUnavailable { ref requested, available: 2 } if requested == &vec![0, 3]
        ));
    }

    #[test]
    fn test_tpu_cores_validation() {
        let host = HostCapabilities {
            tpu_available: true,
            ..HostCapabilities::cpu_only()
        };
        assert!(parse_tpu_cores(Some(&TpuCores::Count(8)), &host).is_ok());
        assert!(parse_tpu_cores(Some(&TpuCores::Ids(vec![5])), &host).is_ok());
        assert!(matches!(
            parse_tpu_cores(Some(&TpuCores::Count(4)), &host),
            Err(ConnectorError::InvalidTpuCores(_))
        ));
        assert!(matches!(
            parse_tpu_cores(Some(&TpuCores::Ids(vec![1, 2])), &host),
            Err(ConnectorError::InvalidTpuCores(_))
        ));
        assert!(matches!(
            parse_tpu_cores(Some(&TpuCores::Count(1)), &HostCapabilities::cpu_only()),
            Err(ConnectorError::TpuUnavailable(_))
        ));
    }

    #[test]
    fn test_root_gpu() {
        assert_eq!(determine_root_gpu(Some(&[2, 0])), Some(2));
        assert_eq!(determine_root_gpu(None), None);
    }
}
