//! Crash recovery
//!
//! Finds jobs a previous process left `running` and fails them, so they can
//! be retried instead of reporting `running` forever.

use tracing::{debug, info, warn};

use crate::domain::{INTERRUPTED_MESSAGE, JobStatus, JobTransition};

use super::store::JobStore;

/// Recovery statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Jobs found in `running` with no task behind them
    pub jobs_to_recover: usize,
}

impl std::fmt::Display for RecoveryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "jobs: {}", self.jobs_to_recover)
    }
}

/// Count interrupted jobs without changing them
pub fn scan_for_recovery(store: &JobStore) -> RecoveryStats {
    let running = store.list(Some(JobStatus::Running));
    for job in &running {
        debug!(job_id = %job.id, processed = job.records_processed, "Found running job needing recovery");
    }
    RecoveryStats {
        jobs_to_recover: running.len(),
    }
}

/// Move every interrupted job to `failed`
///
/// Counters recorded before the interruption are kept.
pub fn recover(store: &mut JobStore) -> eyre::Result<RecoveryStats> {
    let stats = scan_for_recovery(store);
    if stats.jobs_to_recover == 0 {
        debug!("Recovery scan found no interrupted jobs");
        return Ok(stats);
    }

    info!("Recovery scan found interrupted work: {}", stats);
    for mut job in store.list(Some(JobStatus::Running)) {
        warn!(job_id = %job.id, processed = job.records_processed, "Marking interrupted job as failed");
        job.apply(JobTransition::Fail {
            error: INTERRUPTED_MESSAGE.to_string(),
        })?;
        store.put(job)?;
    }

    info!("Recovery complete: {}", stats);
    Ok(stats)
}
