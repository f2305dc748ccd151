//! Job lifecycle: the execution envelope around one optimization run.
//!
//! A [`Job`] is created `Pending` and driven through the state machine by a
//! [`JobRunner`]: validation, optimizer construction, the run itself, and the
//! terminal bookkeeping. Progress flows out through a [`ProgressSink`]
//! (push), the final artifact through a [`ResultSink`] (committed exactly
//! once for jobs reaching `Completed` or `Failed`, never for `Cancelled`).
//!
//! Cancellation is cooperative: the [`CancelToken`] is observed at the top of
//! every objective evaluation, so cancellation latency is bounded by one
//! physics evaluation plus the solver's intra-step work.

use crate::error::SolveError;
use crate::models::{
    Job, JobStatus, OptimizationRequest, ProgressCallback, ProgressUpdate,
};
use crate::optimizer::Optimizer;
use crate::physics::PhysicsModel;
use crate::validation::validate_request;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Shared cancellation flag, observable from the optimizer's objective.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Write-only progress channel. Implementations must tolerate duplicate and
/// out-of-order writes; snapshots for one job are emitted in iteration order.
pub trait ProgressSink: Send + Sync {
    fn record(&self, job_id: Uuid, update: &ProgressUpdate);
}

/// Write-only result channel, called with the final job snapshot (which
/// carries the [`OptimizationResult`](crate::models::OptimizationResult) when
/// the job completed).
pub trait ResultSink: Send + Sync {
    fn commit(&self, job: &Job);
}

/// In-memory progress sink, for tests and single-process hosts.
#[derive(Default)]
pub struct MemoryProgressSink {
    updates: Mutex<Vec<ProgressUpdate>>,
}

impl MemoryProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

impl ProgressSink for MemoryProgressSink {
    fn record(&self, _job_id: Uuid, update: &ProgressUpdate) {
        self.updates.lock().unwrap().push(update.clone());
    }
}

/// In-memory result sink, for tests and single-process hosts.
#[derive(Default)]
pub struct MemoryResultSink {
    commits: Mutex<Vec<Job>>,
}

impl MemoryResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commits(&self) -> Vec<Job> {
        self.commits.lock().unwrap().clone()
    }
}

impl ResultSink for MemoryResultSink {
    fn commit(&self, job: &Job) {
        self.commits.lock().unwrap().push(job.clone());
    }
}

impl Job {
    /// Creates a fresh `Pending` job.
    pub fn new() -> Self {
        let now = Utc::now();
        Job {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            runtime_s: None,
            current_iteration: 0,
            progress_percentage: 0.0,
            estimated_completion_at: None,
            error_message: None,
            iteration_log: Vec::new(),
            result: None,
            memory_usage_mb: None,
            cpu_usage_percentage: None,
        }
    }

    /// Moves the job to `next`, enforcing the state machine.
    ///
    /// Every transition stamps `updated_at`; entering `Running` stamps
    /// `started_at`; entering a terminal state stamps `completed_at` and
    /// derives `runtime_s` when the job ever started.
    ///
    /// # Errors
    ///
    /// [`SolveError::Internal`] for any transition outside the allowed set.
    pub fn transition_to(&mut self, next: JobStatus) -> Result<(), SolveError> {
        if !self.status.can_transition_to(next) {
            return Err(SolveError::Internal(format!(
                "illegal job transition: {} -> {}",
                self.status, next
            )));
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next == JobStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
            if let Some(started) = self.started_at {
                self.runtime_s = Some((now - started).num_milliseconds() as f64 / 1000.0);
            }
        }
        Ok(())
    }
}

impl Default for Job {
    fn default() -> Self {
        Job::new()
    }
}

/// Drives one job from `Pending` to a terminal state.
pub struct JobRunner {
    progress_sink: Arc<dyn ProgressSink>,
    result_sink: Arc<dyn ResultSink>,
}

impl JobRunner {
    pub fn new(progress_sink: Arc<dyn ProgressSink>, result_sink: Arc<dyn ResultSink>) -> Self {
        JobRunner {
            progress_sink,
            result_sink,
        }
    }

    /// Runs the request under a fresh job.
    pub fn run(
        &self,
        request: &OptimizationRequest,
        cancel: CancelToken,
    ) -> Result<Job, SolveError> {
        self.run_job(Job::new(), request, cancel)
    }

    /// Runs the request under a caller-supplied job record, so hosts can
    /// publish the job id before the run starts.
    ///
    /// # Errors
    ///
    /// [`SolveError::Validation`] when the request is malformed; the job
    /// never leaves `Pending`. Optimizer failures do not surface as errors:
    /// they move the job to `Failed` with `error_message` set.
    pub fn run_job(
        &self,
        mut job: Job,
        request: &OptimizationRequest,
        cancel: CancelToken,
    ) -> Result<Job, SolveError> {
        let resolved = validate_request(request)?;

        if cancel.is_cancelled() {
            job.transition_to(JobStatus::Cancelled)?;
            return Ok(job);
        }
        job.transition_to(JobStatus::Initializing)?;

        let physics = PhysicsModel::new(request.configuration.clone());
        let job_id = job.id;
        let shared = Arc::new(Mutex::new(job));

        let callback: ProgressCallback = {
            let shared = Arc::clone(&shared);
            let sink = Arc::clone(&self.progress_sink);
            Box::new(move |update: &ProgressUpdate| {
                {
                    let mut job = shared.lock().unwrap();
                    job.iteration_log.push(update.record.clone());
                    job.current_iteration = update.record.index;
                    job.progress_percentage = update.progress_percentage;
                    job.estimated_completion_at = update.estimated_completion_at;
                    job.updated_at = Utc::now();
                }
                sink.record(job_id, update);
                true
            })
        };

        shared.lock().unwrap().transition_to(JobStatus::Running)?;
        let optimizer = Optimizer::new(physics, resolved, request, Some(&callback), cancel);
        let outcome = optimizer.run();
        drop(callback);

        let mut job = Arc::try_unwrap(shared)
            .map_err(|_| SolveError::Internal("progress callback outlived the run".to_string()))?
            .into_inner()
            .unwrap_or_else(|poison| poison.into_inner());

        match outcome {
            Ok(run) => {
                job.iteration_log = run.iterations;
                job.current_iteration = job.iteration_log.len() as u64;
                job.progress_percentage = 100.0;
                job.estimated_completion_at = None;
                job.result = Some(run.result);
                job.transition_to(JobStatus::Completed)?;
                job.memory_usage_mb = resident_memory_mb();
                self.result_sink.commit(&job);
                Ok(job)
            }
            Err(SolveError::Cancelled) => {
                // Partial iteration log stays on the job; neither sink is
                // committed for cancelled runs.
                job.transition_to(JobStatus::Cancelled)?;
                Ok(job)
            }
            Err(err) => {
                log::error!("optimization job {job_id} failed: {err:?}");
                job.error_message = Some(err.to_string());
                job.transition_to(JobStatus::Failed)?;
                job.memory_usage_mb = resident_memory_mb();
                self.result_sink.commit(&job);
                Ok(job)
            }
        }
    }
}

/// Best-effort resident-set sample. Linux reads `/proc/self/status`; other
/// platforms report nothing.
#[cfg(target_os = "linux")]
fn resident_memory_mb() -> Option<f64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: f64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / 1024.0)
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_mb() -> Option<f64> {
    None
}
