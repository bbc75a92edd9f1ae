//! State manager messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{Job, JobStatus, JobTransition, TransitionError};

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job already exists: {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Channel error")]
    ChannelError,
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

/// Commands sent to the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    CreateJob {
        job: Job,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    GetJob {
        id: String,
        reply: oneshot::Sender<StateResponse<Option<Job>>>,
    },
    ListJobs {
        status_filter: Option<JobStatus>,
        reply: oneshot::Sender<StateResponse<Vec<Job>>>,
    },
    /// Validate and apply a status change; replies with the updated job
    TransitionJob {
        id: String,
        transition: JobTransition,
        reply: oneshot::Sender<StateResponse<Job>>,
    },
    /// Set both counters in one step; replies false if the job does not accept progress
    RecordProgress {
        id: String,
        processed: u64,
        failed: u64,
        reply: oneshot::Sender<StateResponse<bool>>,
    },

    Shutdown,
}
