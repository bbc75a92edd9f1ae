//! Job domain type
//!
//! One execution attempt of a MappingSpec. The status machine is:
//!
//! ```text
//! pending -> running -> completed | failed
//! pending | running -> cancelled
//! failed -> pending (retry)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::id::generate_id;

/// Error log of a job whose task stopped without recording an outcome
pub const INTERRUPTED_MESSAGE: &str = "Interrupted before completion";

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, waiting for start
    #[default]
    Pending,
    /// Background task is moving batches
    Running,
    /// All batches consumed (some may have failed)
    Completed,
    /// Setup error; nothing or only part was attempted
    Failed,
    /// Stopped by request
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "JobStatus::from_str: called");
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" | "complete" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(format!(
                "Unknown status: {}. Use: pending, running, completed, failed, cancelled",
                s
            )),
        }
    }
}

/// A requested change of job state
#[derive(Debug, Clone, PartialEq)]
pub enum JobTransition {
    /// pending -> running, stamps `started_at`
    Start,
    /// running -> completed, stamps `completed_at`
    Complete {
        processed: u64,
        failed: u64,
        error_log: Option<String>,
    },
    /// running -> failed; the message replaces the error log
    Fail { error: String },
    /// pending | running -> cancelled, stamps `completed_at`
    Cancel,
    /// failed -> pending, clears counters, log and timestamps
    Retry,
}

impl JobTransition {
    /// Statuses this transition may be applied from
    pub fn allowed_from(&self) -> &'static [JobStatus] {
        match self {
            Self::Start => &[JobStatus::Pending],
            Self::Complete { .. } | Self::Fail { .. } => &[JobStatus::Running],
            Self::Cancel => &[JobStatus::Pending, JobStatus::Running],
            Self::Retry => &[JobStatus::Failed],
        }
    }

    /// Status the job lands in
    pub fn target(&self) -> JobStatus {
        match self {
            Self::Start => JobStatus::Running,
            Self::Complete { .. } => JobStatus::Completed,
            Self::Fail { .. } => JobStatus::Failed,
            Self::Cancel => JobStatus::Cancelled,
            Self::Retry => JobStatus::Pending,
        }
    }

    /// Short verb for messages
    pub fn action(&self) -> &'static str {
        match self {
            Self::Start => "started",
            Self::Complete { .. } => "completed",
            Self::Fail { .. } => "failed",
            Self::Cancel => "cancelled",
            Self::Retry => "retried",
        }
    }
}

/// Rejected status change
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Job {job_id} cannot be {action} in status {from}")]
pub struct TransitionError {
    pub job_id: String,
    pub from: JobStatus,
    pub action: &'static str,
}

/// One execution attempt of a MappingSpec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// MappingSpec this job executes
    pub mapping_id: String,

    /// Current status
    pub status: JobStatus,

    /// Records delivered successfully
    #[serde(default)]
    pub records_processed: u64,

    /// Records in failed batches
    #[serde(default)]
    pub records_failed: u64,

    /// Setup error, or the first batch errors joined with "; "
    #[serde(default)]
    pub error_log: Option<String>,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a pending job with a generated ID
    pub fn new(mapping_id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        let id = generate_id("job", &name);
        Self::with_id(id, mapping_id).with_name(name)
    }

    /// Create with a specific ID (for testing or recovery)
    pub fn with_id(id: impl Into<String>, mapping_id: impl Into<String>) -> Self {
        let id = id.into();
        let mapping_id = mapping_id.into();
        debug!(%id, %mapping_id, "Job::with_id: called");
        let now = Utc::now();
        Self {
            id,
            name: String::new(),
            mapping_id,
            status: JobStatus::Pending,
            records_processed: 0,
            records_failed: 0,
            error_log: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder method to set the name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Apply a status transition, validating it against the state machine
    pub fn apply(&mut self, transition: JobTransition) -> Result<(), TransitionError> {
        debug!(%self.id, from = %self.status, ?transition, "Job::apply: called");
        if !transition.allowed_from().contains(&self.status) {
            debug!(%self.id, from = %self.status, "Job::apply: transition rejected");
            return Err(TransitionError {
                job_id: self.id.clone(),
                from: self.status,
                action: transition.action(),
            });
        }

        let now = Utc::now();
        self.status = transition.target();
        match transition {
            JobTransition::Start => {
                self.started_at = Some(now);
            }
            JobTransition::Complete {
                processed,
                failed,
                error_log,
            } => {
                self.records_processed = self.records_processed.max(processed);
                self.records_failed = self.records_failed.max(failed);
                if error_log.is_some() {
                    self.error_log = error_log;
                }
                self.completed_at = Some(now);
            }
            JobTransition::Fail { error } => {
                self.error_log = Some(error);
                self.completed_at = Some(now);
            }
            JobTransition::Cancel => {
                self.completed_at = Some(now);
            }
            JobTransition::Retry => {
                self.records_processed = 0;
                self.records_failed = 0;
                self.error_log = None;
                self.started_at = None;
                self.completed_at = None;
            }
        }
        self.updated_at = now;
        Ok(())
    }

    /// Record cumulative batch progress
    ///
    /// Both counters move together; neither ever decreases. Returns false if
    /// the job is not in a state that accepts progress.
    pub fn record_progress(&mut self, processed: u64, failed: u64) -> bool {
        debug!(%self.id, processed, failed, "Job::record_progress: called");
        if !matches!(self.status, JobStatus::Running | JobStatus::Cancelled) {
            debug!(%self.id, status = %self.status, "Job::record_progress: not accepting progress");
            return false;
        }
        self.records_processed = self.records_processed.max(processed);
        self.records_failed = self.records_failed.max(failed);
        self.updated_at = Utc::now();
        true
    }

    /// Total records attempted so far
    pub fn records_total(&self) -> u64 {
        self.records_processed + self.records_failed
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Read-only projection returned by status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub id: String,
    pub status: JobStatus,
    pub records_processed: u64,
    pub records_failed: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_log: Option<String>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            status: job.status,
            records_processed: job.records_processed,
            records_failed: job.records_failed,
            started_at: job.started_at,
            completed_at: job.completed_at,
            error_log: job.error_log.clone(),
        }
    }
}
