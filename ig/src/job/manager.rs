//! JobManager - starts, cancels and retries jobs
//!
//! The JobManager is responsible for:
//! - Spawning each started job as a tokio task
//! - Tracking running jobs and their cancellation flags in a task registry
//! - Driving job status through the StateManager
//! - Shutdown coordination

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::batch::{BatchProcessor, BatchSummary, ProgressObserver};
use crate::catalog::Catalog;
use crate::domain::{INTERRUPTED_MESSAGE, Job, JobStatus, JobStatusView, JobTransition, TransitionError};
use crate::state::{StateError, StateManager};
use crate::transform::CompiledRules;

pub const NO_DATA_MESSAGE: &str = "No data to process";

/// Errors from job control operations
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    State(StateError),

    #[error("Job task for {job_id} panicked: {message}")]
    TaskPanicked { job_id: String, message: String },
}

impl From<StateError> for JobError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::NotFound(id) => Self::NotFound(id),
            StateError::Transition(e) => Self::Transition(e),
            other => Self::State(other),
        }
    }
}

/// Outcome of a job task
#[derive(Debug, Clone, PartialEq)]
pub enum JobTaskResult {
    /// All batches attempted; some may have failed
    Completed(BatchSummary),
    /// Setup failed before any batch ran
    Failed(String),
    /// Cancelled while running
    Cancelled,
}

struct RunningJob {
    /// Taken by `wait` while it awaits the task
    handle: Option<JoinHandle<JobTaskResult>>,
    cancel: Arc<AtomicBool>,
    /// Set by the task itself once `execute` returns
    done: Arc<AtomicBool>,
}

impl RunningJob {
    fn is_finished(&self) -> bool {
        self.done.load(Ordering::SeqCst) || self.handle.as_ref().is_some_and(JoinHandle::is_finished)
    }
}

/// JobManager orchestrates the lifecycle of jobs
pub struct JobManager {
    /// State manager
    state: StateManager,

    /// Resolves mappings and connectors
    catalog: Arc<dyn Catalog>,

    /// Batch settings shared by all jobs
    processor: BatchProcessor,

    /// Running job tasks by job id
    tasks: Mutex<HashMap<String, RunningJob>>,
}

impl JobManager {
    pub fn new(state: StateManager, catalog: Arc<dyn Catalog>) -> Self {
        debug!("JobManager::new: called");
        Self {
            state,
            catalog,
            processor: BatchProcessor::default(),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Builder method to set the batch settings
    pub fn with_processor(mut self, processor: BatchProcessor) -> Self {
        self.processor = processor;
        self
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Create a pending job for a mapping
    pub async fn create_job(&self, mapping_id: &str, name: &str) -> Result<Job, JobError> {
        debug!(%mapping_id, %name, "create_job: called");
        let job = Job::new(mapping_id, name);
        self.state.create_job(job.clone()).await?;
        info!(job_id = %job.id, %mapping_id, "Job created");
        Ok(job)
    }

    /// Move a pending job to running and spawn its task
    ///
    /// Returns once the task is spawned; use `wait` for the outcome.
    pub async fn start_job(&self, job_id: &str) -> Result<Job, JobError> {
        debug!(%job_id, "start_job: called");
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|id, running| {
            let finished = running.is_finished();
            if finished {
                debug!(job_id = %id, "start_job: reaping finished task");
            }
            !finished
        });

        let job = self.state.transition_job(job_id, JobTransition::Start).await?;

        let cancel = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));
        let task = execute(
            job.id.clone(),
            job.mapping_id.clone(),
            self.state.clone(),
            self.catalog.clone(),
            self.processor.clone(),
            cancel.clone(),
        );
        let task_done = done.clone();
        let handle = tokio::spawn(async move {
            let result = task.await;
            task_done.store(true, Ordering::SeqCst);
            result
        });
        tasks.insert(
            job.id.clone(),
            RunningJob {
                handle: Some(handle),
                cancel,
                done,
            },
        );

        info!(job_id = %job.id, mapping_id = %job.mapping_id, "Job started");
        Ok(job)
    }

    /// Cancel a pending or running job
    ///
    /// A running task stops before its next batch; the batch in flight still
    /// finishes and its counters are recorded.
    pub async fn cancel_job(&self, job_id: &str) -> Result<Job, JobError> {
        debug!(%job_id, "cancel_job: called");
        let job = self.state.transition_job(job_id, JobTransition::Cancel).await?;
        if let Some(running) = self.tasks.lock().await.get(job_id) {
            running.cancel.store(true, Ordering::SeqCst);
        }
        info!(%job_id, "Job cancelled");
        Ok(job)
    }

    /// Reset a failed job and start it again
    pub async fn retry_job(&self, job_id: &str) -> Result<Job, JobError> {
        debug!(%job_id, "retry_job: called");
        self.state.transition_job(job_id, JobTransition::Retry).await?;
        info!(%job_id, "Job reset for retry");
        self.start_job(job_id).await
    }

    /// Current counters and status
    pub async fn get_job_status(&self, job_id: &str) -> Result<JobStatusView, JobError> {
        debug!(%job_id, "get_job_status: called");
        let job = self.state.get_job_required(job_id).await?;
        Ok(JobStatusView::from(&job))
    }

    pub async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<Job>, JobError> {
        debug!(?status, "list_jobs: called");
        Ok(self.state.list_jobs(status).await?)
    }

    /// Await the task of a started job
    ///
    /// Returns None when no task is tracked for the job (never started, or
    /// already reaped).
    pub async fn wait(&self, job_id: &str) -> Result<Option<JobTaskResult>, JobError> {
        debug!(%job_id, "wait: called");
        let handle = self
            .tasks
            .lock()
            .await
            .get_mut(job_id)
            .and_then(|running| running.handle.take());
        let Some(handle) = handle else {
            debug!(%job_id, "wait: no task tracked");
            return Ok(None);
        };

        let result = handle.await;

        // the entry stays registered while waiting so cancel can still reach it
        let mut tasks = self.tasks.lock().await;
        if tasks.get(job_id).is_some_and(|running| running.handle.is_none()) {
            tasks.remove(job_id);
        }
        drop(tasks);

        result.map(Some).map_err(|e| JobError::TaskPanicked {
            job_id: job_id.to_string(),
            message: e.to_string(),
        })
    }

    /// IDs of jobs whose task is still running
    pub async fn active_jobs(&self) -> Vec<String> {
        let tasks = self.tasks.lock().await;
        let mut ids: Vec<String> = tasks
            .iter()
            .filter(|(_, running)| !running.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Signal every task to stop, wait for them and stop the state actor
    pub async fn shutdown(&self) -> Result<(), JobError> {
        debug!("shutdown: called");
        let tasks: Vec<(String, RunningJob)> = self.tasks.lock().await.drain().collect();
        info!(task_count = tasks.len(), "JobManager shutting down");

        for (_, running) in &tasks {
            running.cancel.store(true, Ordering::SeqCst);
        }
        for (job_id, running) in tasks {
            let Some(handle) = running.handle else {
                continue;
            };
            if let Err(e) = handle.await {
                warn!(%job_id, error = %e, "shutdown: job task did not finish cleanly");
            }
        }

        self.state.shutdown().await?;
        Ok(())
    }
}

/// Persists counters through the state actor after every batch
struct JobProgress {
    job_id: String,
    state: StateManager,
    cancel: Arc<AtomicBool>,
}

#[async_trait]
impl ProgressObserver for JobProgress {
    async fn record_progress(&self, processed: u64, failed: u64) {
        match self.state.record_progress(&self.job_id, processed, failed).await {
            Ok(true) => {}
            Ok(false) => debug!(job_id = %self.job_id, "JobProgress: progress not accepted"),
            Err(e) => warn!(job_id = %self.job_id, error = %e, "JobProgress: failed to record progress"),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Null, false, zero and empty containers or strings
fn is_empty_data(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::String(s) => s.is_empty(),
    }
}

/// Body of a job task
async fn execute(
    job_id: String,
    mapping_id: String,
    state: StateManager,
    catalog: Arc<dyn Catalog>,
    processor: BatchProcessor,
    cancel: Arc<AtomicBool>,
) -> JobTaskResult {
    debug!(%job_id, %mapping_id, "execute: called");

    let Some(mapping) = catalog.mapping(&mapping_id).await else {
        return fail(&state, &job_id, "Mapping not found".to_string()).await;
    };

    let (Some(source), Some(destination)) = (
        catalog.source(&mapping.source_id).await,
        catalog.destination(&mapping.destination_id).await,
    ) else {
        return fail(&state, &job_id, "Source or destination not found".to_string()).await;
    };

    debug!(%job_id, source = %source.describe(), "execute: fetching source data");
    let data = match source.fetch().await {
        Ok(data) => data,
        Err(e) => return fail(&state, &job_id, format!("Failed to get data from source: {}", e)).await,
    };

    if is_empty_data(&data) {
        info!(%job_id, "execute: source returned no data");
        let transition = JobTransition::Complete {
            processed: 0,
            failed: 0,
            error_log: Some(NO_DATA_MESSAGE.to_string()),
        };
        return finish(&state, &job_id, transition, BatchSummary::default()).await;
    }

    let rules = CompiledRules::compile(&mapping.transformation_rules);
    let invalid = rules.invalid_steps();
    if invalid > 0 {
        debug!(%job_id, invalid, "execute: some transformation steps will be skipped");
    }

    let progress = JobProgress {
        job_id: job_id.clone(),
        state: state.clone(),
        cancel,
    };
    let summary = processor
        .run(&data, &mapping.mapping_config, &rules, destination.as_ref(), &progress)
        .await;

    if summary.cancelled {
        info!(%job_id, processed = summary.processed, "execute: stopped after cancellation");
        return interrupted(&state, &job_id).await;
    }

    let transition = JobTransition::Complete {
        processed: summary.processed,
        failed: summary.failed,
        error_log: summary.error_log(),
    };
    finish(&state, &job_id, transition, summary).await
}

async fn finish(state: &StateManager, job_id: &str, transition: JobTransition, summary: BatchSummary) -> JobTaskResult {
    match state.transition_job(job_id, transition).await {
        Ok(job) => {
            info!(
                %job_id,
                processed = job.records_processed,
                failed = job.records_failed,
                "Job completed"
            );
            JobTaskResult::Completed(summary)
        }
        Err(StateError::Transition(e)) => {
            info!(%job_id, status = %e.from, "execute: completion refused, job left as is");
            JobTaskResult::Cancelled
        }
        Err(e) => fail(state, job_id, e.to_string()).await,
    }
}

/// Settle a job whose batch loop was stopped by its cancel flag
///
/// `cancel_job` has already moved the job to cancelled. Otherwise the flag
/// came from shutdown and the job is failed so it can be retried.
async fn interrupted(state: &StateManager, job_id: &str) -> JobTaskResult {
    let transition = JobTransition::Fail {
        error: INTERRUPTED_MESSAGE.to_string(),
    };
    match state.transition_job(job_id, transition).await {
        Ok(_) => {
            warn!(%job_id, "Job interrupted by shutdown");
            JobTaskResult::Failed(INTERRUPTED_MESSAGE.to_string())
        }
        Err(StateError::Transition(e)) => {
            debug!(%job_id, status = %e.from, "interrupted: job already settled");
            JobTaskResult::Cancelled
        }
        Err(e) => {
            error!(%job_id, error = %e, "interrupted: could not record interruption");
            JobTaskResult::Failed(INTERRUPTED_MESSAGE.to_string())
        }
    }
}

async fn fail(state: &StateManager, job_id: &str, message: String) -> JobTaskResult {
    warn!(%job_id, error = %message, "Job failed");
    let transition = JobTransition::Fail {
        error: message.clone(),
    };
    match state.transition_job(job_id, transition).await {
        Ok(_) => {}
        Err(StateError::Transition(e)) => {
            info!(%job_id, status = %e.from, "fail: job already left running");
            return JobTaskResult::Cancelled;
        }
        Err(e) => error!(%job_id, error = %e, "fail: could not record failure"),
    }
    JobTaskResult::Failed(message)
}
