//! JobStore - job records in memory, optionally backed by a JSONL file
//!
//! The file holds one job per line and is rewritten whole on every mutation
//! (temp file + rename), so a crash never leaves a half-written store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use tracing::{debug, info, warn};

use crate::domain::{Job, JobStatus};

const STORE_FILE: &str = "jobs.jsonl";

#[derive(Debug, Default)]
pub struct JobStore {
    jobs: HashMap<String, Job>,
    path: Option<PathBuf>,
}

impl JobStore {
    /// Store that lives only as long as the process
    pub fn in_memory() -> Self {
        debug!("JobStore::in_memory: called");
        Self::default()
    }

    /// Open (or create) the store in `dir`, loading existing jobs
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        debug!(dir = %dir.display(), "JobStore::open: called");
        std::fs::create_dir_all(dir).context(format!("Failed to create store dir {}", dir.display()))?;

        let path = dir.join(STORE_FILE);
        let mut jobs = HashMap::new();
        if path.exists() {
            let content =
                std::fs::read_to_string(&path).context(format!("Failed to read job store {}", path.display()))?;
            for (i, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Job>(line) {
                    Ok(job) => {
                        jobs.insert(job.id.clone(), job);
                    }
                    Err(e) => {
                        warn!(line = i + 1, error = %e, "JobStore::open: skipping unreadable job record");
                    }
                }
            }
        }

        info!(path = %path.display(), job_count = jobs.len(), "JobStore opened");
        Ok(Self { jobs, path: Some(path) })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, id: &str) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.jobs.contains_key(id)
    }

    /// Jobs oldest first, optionally filtered by status
    pub fn list(&self, status: Option<JobStatus>) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .values()
            .filter(|job| status.is_none_or(|s| job.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    /// Insert or replace a job and persist; on persist failure the previous
    /// state is restored
    pub fn put(&mut self, job: Job) -> Result<()> {
        debug!(id = %job.id, status = %job.status, "JobStore::put: called");
        let id = job.id.clone();
        let previous = self.jobs.insert(id.clone(), job);
        if let Err(e) = self.persist() {
            match previous {
                Some(prev) => self.jobs.insert(id, prev),
                None => self.jobs.remove(&id),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Rewrite the backing file, if any
    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        debug!(path = %path.display(), "JobStore::persist: called");

        let mut content = String::new();
        for job in self.list(None) {
            content.push_str(&serde_json::to_string(&job).context("Failed to serialize job")?);
            content.push('\n');
        }

        let tmp = path.with_extension("jsonl.tmp");
        std::fs::write(&tmp, content).context(format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path).context(format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
