//! Background training jobs
//!
//! A job fetches the labeled rows of one task from the record source, trains
//! on tokio's blocking pool and replaces the stored artifact. Callers get a
//! job id back immediately and poll, wait for, or cancel it. Every job is
//! bounded by a timeout.
//!
//! Cancellation and timeout race the final store write through a per-job
//! commit gate: once a job is aborted it can no longer write, and once it
//! has written it can no longer be aborted. Predictions keep reading the
//! previous artifact until the store swaps it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use practicas_ai_core::{
    ArtifactInfo, ArtifactStore, EvaluationMetrics, PredictionTask, RecordSource,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dataset::load_from_source;
use crate::errors::{Result, TrainerError};
use crate::trainer::{ForestTrainer, TrainingParams};

pub type JobId = u64;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Finished jobs kept for `status` and `list` before the oldest are dropped
pub const RETAINED_FINISHED_JOBS: usize = 128;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Running,
    Succeeded {
        hash: String,
        metrics: Option<EvaluationMetrics>,
    },
    Failed {
        error: String,
    },
    Cancelled,
    TimedOut,
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, JobState::Running)
    }

    /// Hash of the stored artifact, or the error that ended the job
    ///
    /// `timeout` is the bound the job ran under and is reported by
    /// [`TrainerError::TimedOut`].
    pub fn into_result(self, timeout: Duration) -> Result<String> {
        match self {
            JobState::Succeeded { hash, .. } => Ok(hash),
            JobState::Failed { error } => Err(TrainerError::Training(error)),
            JobState::Cancelled => Err(TrainerError::Cancelled),
            JobState::TimedOut => Err(TrainerError::TimedOut(timeout)),
            JobState::Running => Err(TrainerError::Training("job is still running".to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: JobId,
    pub task: PredictionTask,
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Commit {
    Pending,
    Aborted,
    Committed,
}

struct JobEntry {
    status: JobStatus,
    cancel: Arc<AtomicBool>,
    commit: Arc<Mutex<Commit>>,
}

fn abort_gate(gate: &mut Commit, cancel: &AtomicBool) -> bool {
    match *gate {
        Commit::Committed => false,
        Commit::Pending | Commit::Aborted => {
            *gate = Commit::Aborted;
            cancel.store(true, Ordering::Relaxed);
            true
        }
    }
}

/// Abort a job that has not written yet; `false` if it already committed
fn abort(commit: &Mutex<Commit>, cancel: &AtomicBool) -> bool {
    abort_gate(&mut commit.lock(), cancel)
}

/// Non-blocking [`abort`]; `None` while the worker holds the gate to write
fn try_abort(commit: &Mutex<Commit>, cancel: &AtomicBool) -> Option<bool> {
    let mut gate = commit.try_lock()?;
    Some(abort_gate(&mut gate, cancel))
}

type JobTable = Arc<RwLock<HashMap<JobId, JobEntry>>>;

/// Record a final state unless the job already has one
fn finish(jobs: &JobTable, id: JobId, state: JobState) {
    let mut jobs = jobs.write();
    if let Some(entry) = jobs.get_mut(&id) {
        if !entry.status.state.is_finished() {
            entry.status.state = state;
            entry.status.finished_at = Some(Utc::now());
        }
    }
}

/// Body of one job; runs on the blocking pool
fn run_job(
    source: &dyn RecordSource,
    store: &dyn ArtifactStore,
    params: TrainingParams,
    cancel: Arc<AtomicBool>,
    commit: &Mutex<Commit>,
) -> Result<ArtifactInfo> {
    let task = params.task;
    let data = load_from_source(source, task)?;
    let artifact = ForestTrainer::new(params)
        .with_cancel_flag(cancel)
        .train(&data)?;

    let mut gate = commit.lock();
    if *gate == Commit::Aborted {
        debug!(%task, hash = %artifact.hash, "job aborted before commit; artifact discarded");
        return Err(TrainerError::Cancelled);
    }
    store.put(task, &artifact)?;
    *gate = Commit::Committed;
    Ok(artifact.info())
}

fn state_of(result: Result<ArtifactInfo>) -> JobState {
    match result {
        Ok(info) => JobState::Succeeded {
            hash: info.hash,
            metrics: info.summary.metrics,
        },
        Err(TrainerError::Cancelled) => JobState::Cancelled,
        Err(err) => JobState::Failed {
            error: err.to_string(),
        },
    }
}

/// Runs training jobs against one store and one record source
pub struct TrainingJobs {
    store: Arc<dyn ArtifactStore>,
    source: Arc<dyn RecordSource>,
    timeout: Duration,
    next_id: AtomicU64,
    jobs: JobTable,
}

impl TrainingJobs {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        source: Arc<dyn RecordSource>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            source,
            timeout,
            next_id: AtomicU64::new(1),
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start training `params.task`; must be called inside a tokio runtime
    pub fn submit(&self, params: TrainingParams) -> JobId {
        self.prune_finished(RETAINED_FINISHED_JOBS);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let task = params.task;
        let cancel = Arc::new(AtomicBool::new(false));
        let commit = Arc::new(Mutex::new(Commit::Pending));

        self.jobs.write().insert(
            id,
            JobEntry {
                status: JobStatus {
                    id,
                    task,
                    state: JobState::Running,
                    submitted_at: Utc::now(),
                    finished_at: None,
                },
                cancel: Arc::clone(&cancel),
                commit: Arc::clone(&commit),
            },
        );
        info!(job = id, %task, timeout = ?self.timeout, "training job submitted");

        let jobs = Arc::clone(&self.jobs);
        let store = Arc::clone(&self.store);
        let source = Arc::clone(&self.source);
        let timeout = self.timeout;

        tokio::spawn(async move {
            let worker_cancel = Arc::clone(&cancel);
            let worker_commit = Arc::clone(&commit);
            let mut handle = tokio::task::spawn_blocking(move || {
                run_job(
                    source.as_ref(),
                    store.as_ref(),
                    params,
                    worker_cancel,
                    &worker_commit,
                )
            });

            let state = match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(result)) => state_of(result),
                Ok(Err(join_err)) => JobState::Failed {
                    error: format!("training worker failed: {join_err}"),
                },
                Err(_) if try_abort(&commit, &cancel) == Some(true) => {
                    warn!(job = id, %task, ?timeout, "training job timed out");
                    JobState::TimedOut
                }
                // the worker is writing or has written; its result stands
                Err(_) => match handle.await {
                    Ok(result) => state_of(result),
                    Err(join_err) => JobState::Failed {
                        error: format!("training worker failed: {join_err}"),
                    },
                },
            };

            match &state {
                JobState::Succeeded { hash, .. } => {
                    info!(job = id, %task, %hash, "training job succeeded")
                }
                JobState::Failed { error } => warn!(job = id, %task, %error, "training job failed"),
                other => debug!(job = id, %task, state = ?other, "training job ended"),
            }
            finish(&jobs, id, state);
        });

        id
    }

    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.jobs.read().get(&id).map(|entry| entry.status.clone())
    }

    /// All known jobs, oldest first
    pub fn list(&self) -> Vec<JobStatus> {
        let mut all: Vec<JobStatus> = self
            .jobs
            .read()
            .values()
            .map(|entry| entry.status.clone())
            .collect();
        all.sort_by_key(|status| status.id);
        all
    }

    /// Stop a running job before it writes the store
    ///
    /// Returns `false` when the job had already finished or committed.
    pub fn cancel(&self, id: JobId) -> Result<bool> {
        let (cancel, commit) = {
            let jobs = self.jobs.read();
            let entry = jobs.get(&id).ok_or(TrainerError::JobNotFound(id))?;
            if entry.status.state.is_finished() {
                return Ok(false);
            }
            (Arc::clone(&entry.cancel), Arc::clone(&entry.commit))
        };

        if !abort(&commit, &cancel) {
            return Ok(false);
        }
        info!(job = id, "training job cancelled");
        finish(&self.jobs, id, JobState::Cancelled);
        Ok(true)
    }

    /// Drop all but the `keep` most recent finished jobs; returns how many went
    ///
    /// Running jobs are never dropped. `submit` calls this with
    /// [`RETAINED_FINISHED_JOBS`].
    pub fn prune_finished(&self, keep: usize) -> usize {
        let mut jobs = self.jobs.write();
        let mut finished: Vec<JobId> = jobs
            .values()
            .filter(|entry| entry.status.state.is_finished())
            .map(|entry| entry.status.id)
            .collect();
        if finished.len() <= keep {
            return 0;
        }
        finished.sort_unstable();
        let excess = finished.len() - keep;
        for id in &finished[..excess] {
            jobs.remove(id);
        }
        debug!(pruned = excess, "dropped finished training jobs");
        excess
    }

    /// Wait until job `id` reaches a final state
    pub async fn wait(&self, id: JobId) -> Result<JobStatus> {
        loop {
            let status = self.status(id).ok_or(TrainerError::JobNotFound(id))?;
            if status.state.is_finished() {
                return Ok(status);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
