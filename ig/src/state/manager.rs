//! StateManager - actor that owns the JobStore
//!
//! Processes commands via channels for thread-safe access to job state. All
//! status changes are validated here, so concurrent callers (a cancel request
//! racing a finishing job) are serialized and the loser gets an error.

use std::path::Path;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::domain::{Job, JobStatus, JobTransition};

use super::messages::{StateCommand, StateError, StateResponse};
use super::recovery::recover;
use super::store::JobStore;

/// Event broadcast when job state changes
#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    JobCreated { id: String },
    JobStatusChanged { id: String, status: JobStatus },
    JobProgress { id: String, processed: u64, failed: u64 },
}

/// Handle to send commands to the StateManager
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
    event_tx: broadcast::Sender<StateEvent>,
}

impl StateManager {
    /// Spawn an actor over a file-backed store in `store_dir`
    ///
    /// Jobs left `running` by a previous process are failed first so they
    /// can be retried.
    pub fn spawn(store_dir: impl AsRef<Path>) -> eyre::Result<Self> {
        debug!(store_dir = %store_dir.as_ref().display(), "spawn: called");
        let mut store = JobStore::open(store_dir)?;
        recover(&mut store)?;
        Ok(Self::spawn_with_store(store))
    }

    /// Spawn an actor over a store that is not persisted
    pub fn spawn_in_memory() -> Self {
        debug!("spawn_in_memory: called");
        Self::spawn_with_store(JobStore::in_memory())
    }

    fn spawn_with_store(store: JobStore) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let (event_tx, _) = broadcast::channel(256);
        tokio::spawn(actor_loop(store, rx));
        info!("StateManager spawned");
        Self { tx, event_tx }
    }

    /// Subscribe to job change events
    pub fn subscribe_events(&self) -> broadcast::Receiver<StateEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: StateEvent) {
        // no subscribers is fine
        let _ = self.event_tx.send(event);
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<StateResponse<T>>) -> StateCommand) -> StateResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Create a new job record
    pub async fn create_job(&self, job: Job) -> StateResponse<String> {
        debug!(job_id = %job.id, mapping_id = %job.mapping_id, "create_job: called");
        let id = self.request(|reply| StateCommand::CreateJob { job, reply }).await?;
        self.emit(StateEvent::JobCreated { id: id.clone() });
        Ok(id)
    }

    /// Get a job by ID
    pub async fn get_job(&self, id: &str) -> StateResponse<Option<Job>> {
        debug!(%id, "get_job: called");
        self.request(|reply| StateCommand::GetJob {
            id: id.to_string(),
            reply,
        })
        .await
    }

    /// Get a job by ID, returning error if not found
    pub async fn get_job_required(&self, id: &str) -> StateResponse<Job> {
        debug!(%id, "get_job_required: called");
        self.get_job(id).await?.ok_or_else(|| StateError::NotFound(id.to_string()))
    }

    /// List jobs, oldest first
    pub async fn list_jobs(&self, status_filter: Option<JobStatus>) -> StateResponse<Vec<Job>> {
        debug!(?status_filter, "list_jobs: called");
        self.request(|reply| StateCommand::ListJobs { status_filter, reply }).await
    }

    /// Apply a status transition
    pub async fn transition_job(&self, id: &str, transition: JobTransition) -> StateResponse<Job> {
        debug!(%id, ?transition, "transition_job: called");
        let job = self
            .request(|reply| StateCommand::TransitionJob {
                id: id.to_string(),
                transition,
                reply,
            })
            .await?;
        self.emit(StateEvent::JobStatusChanged {
            id: job.id.clone(),
            status: job.status,
        });
        Ok(job)
    }

    /// Persist cumulative counters
    pub async fn record_progress(&self, id: &str, processed: u64, failed: u64) -> StateResponse<bool> {
        debug!(%id, processed, failed, "record_progress: called");
        let accepted = self
            .request(|reply| StateCommand::RecordProgress {
                id: id.to_string(),
                processed,
                failed,
                reply,
            })
            .await?;
        if accepted {
            self.emit(StateEvent::JobProgress {
                id: id.to_string(),
                processed,
                failed,
            });
        }
        Ok(accepted)
    }

    /// Shutdown the StateManager
    pub async fn shutdown(&self) -> Result<(), StateError> {
        debug!("shutdown: called");
        self.tx
            .send(StateCommand::Shutdown)
            .await
            .map_err(|_| StateError::ChannelError)
    }
}

async fn actor_loop(mut store: JobStore, mut rx: mpsc::Receiver<StateCommand>) {
    debug!("actor_loop: called");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StateCommand::CreateJob { job, reply } => {
                debug!(job_id = %job.id, "actor_loop: CreateJob command");
                let result = if store.contains(&job.id) {
                    Err(StateError::AlreadyExists(job.id))
                } else {
                    let id = job.id.clone();
                    store
                        .put(job)
                        .map(|()| id)
                        .map_err(|e| StateError::StoreError(e.to_string()))
                };
                let _ = reply.send(result);
            }

            StateCommand::GetJob { id, reply } => {
                debug!(%id, "actor_loop: GetJob command");
                let _ = reply.send(Ok(store.get(&id).cloned()));
            }

            StateCommand::ListJobs { status_filter, reply } => {
                debug!(?status_filter, "actor_loop: ListJobs command");
                let _ = reply.send(Ok(store.list(status_filter)));
            }

            StateCommand::TransitionJob { id, transition, reply } => {
                debug!(%id, ?transition, "actor_loop: TransitionJob command");
                let result = match store.get(&id).cloned() {
                    None => Err(StateError::NotFound(id)),
                    Some(mut job) => match job.apply(transition) {
                        Err(e) => {
                            debug!(%id, error = %e, "actor_loop: transition rejected");
                            Err(StateError::from(e))
                        }
                        Ok(()) => store
                            .put(job.clone())
                            .map(|()| job)
                            .map_err(|e| StateError::StoreError(e.to_string())),
                    },
                };
                let _ = reply.send(result);
            }

            StateCommand::RecordProgress {
                id,
                processed,
                failed,
                reply,
            } => {
                debug!(%id, processed, failed, "actor_loop: RecordProgress command");
                let result = match store.get(&id).cloned() {
                    None => Err(StateError::NotFound(id)),
                    Some(mut job) => {
                        if job.record_progress(processed, failed) {
                            store
                                .put(job)
                                .map(|()| true)
                                .map_err(|e| StateError::StoreError(e.to_string()))
                        } else {
                            Ok(false)
                        }
                    }
                };
                if let Err(e) = &result {
                    warn!(error = %e, "actor_loop: progress not recorded");
                }
                let _ = reply.send(result);
            }

            StateCommand::Shutdown => {
                debug!("actor_loop: Shutdown command");
                info!("StateManager shutting down");
                break;
            }
        }
    }

    debug!("StateManager actor stopped");
}
