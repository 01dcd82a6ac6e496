//! Submission and lifecycle tracking.
//!
//! The [`Tracker`] submits rendered scripts and follows each job by
//! polling its [`Scheduler`]:
//!
//! ```text
//!   submit() ──→ JobHandle ──→ poll() / wait() ──→ terminal state ──→ get_output()
//!                    │
//!                    └──→ cancel()   (explicit only)
//! ```
//!
//! ## Concurrency
//!
//! A tracker holds no per-job mutable state, so one `Arc<Tracker<_>>` can
//! drive any number of concurrent `wait()` loops, one task per job. Each
//! loop only sleeps between non-blocking queries.
//!
//! Dropping or aborting a `wait()` future stops *watching* the job. It never
//! cancels the job itself; only [`Tracker::cancel`] does that.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::job::{JobFilter, JobHandle, JobId, JobState, JobSummary};
use crate::output::{JobOutput, get_output};
use crate::render::{RenderedScript, ScriptRenderer};
use crate::scheduler::Scheduler;
use crate::spec::JobSpec;

/// Result of a [`Tracker::wait`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WaitOutcome {
    /// `true` only if the job reached `Completed`.
    pub success: bool,
    /// Terminal state, or the last state observed when the wait timed out.
    pub state: JobState,
    /// Number of scheduler queries issued.
    pub polls: u32,
}

/// Submits jobs and follows them to a terminal state.
#[derive(Debug)]
pub struct Tracker<S> {
    scheduler: S,
    poll_interval: Duration,
    max_unknown_polls: u32,
}

impl<S: Scheduler> Tracker<S> {
    pub fn new(scheduler: S, config: &EngineConfig) -> Self {
        Self {
            scheduler,
            poll_interval: config.poll_interval,
            max_unknown_polls: config.max_unknown_polls.max(1),
        }
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Default interval for [`Tracker::wait_for`].
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Submit a script. Rejections are reported immediately, never retried.
    #[instrument(skip_all, fields(job = %script.job_name))]
    pub async fn submit(&self, script: RenderedScript) -> OrchestratorResult<JobHandle> {
        let job_id = self.scheduler.submit(&script).await?;
        let (output_path, error_path) = script.paths_for(&job_id);

        info!(%job_id, scheduler = self.scheduler.name(), "submitted job");

        Ok(JobHandle {
            job_id,
            job_name: script.job_name,
            output_path,
            error_path,
            submit_time: Utc::now(),
        })
    }

    /// Submit `specs` in order, each depending on successful completion of
    /// the one before it. Stops at the first failure; jobs already
    /// submitted stay queued.
    pub async fn submit_chain(
        &self,
        renderer: &ScriptRenderer,
        specs: Vec<JobSpec>,
    ) -> OrchestratorResult<Vec<JobHandle>> {
        let mut handles: Vec<JobHandle> = Vec::with_capacity(specs.len());
        for mut spec in specs {
            if let Some(previous) = handles.last() {
                if !spec.depends_on.contains(&previous.job_id) {
                    spec.depends_on.push(previous.job_id.clone());
                }
            }
            let script = renderer.render(&spec)?;
            handles.push(self.submit(script).await?);
        }
        Ok(handles)
    }

    /// Query the scheduler once.
    #[instrument(skip_all, fields(job_id = %handle.job_id))]
    pub async fn poll(&self, handle: &JobHandle) -> JobState {
        let state = self.scheduler.query(&handle.job_id).await;
        debug!(%state, "polled job");
        state
    }

    /// Poll until the job reaches a terminal state or `timeout` elapses.
    ///
    /// The wait ends early, without sleeping, when the next poll would fall
    /// past the deadline. A timed-out wait leaves the job running and
    /// returns the last observed state. Too many consecutive `Unknown`
    /// answers surface as [`OrchestratorError::LostJob`].
    #[instrument(skip_all, fields(job_id = %handle.job_id))]
    pub async fn wait(
        &self,
        handle: &JobHandle,
        poll_interval: Duration,
        timeout: Duration,
    ) -> OrchestratorResult<WaitOutcome> {
        let deadline = Instant::now() + timeout;
        let mut unknown_streak = 0;
        let mut polls = 0;

        loop {
            let state = self.poll(handle).await;
            polls += 1;

            if state.is_terminal() {
                info!(%state, polls, "job finished");
                return Ok(WaitOutcome {
                    success: state.is_success(),
                    state,
                    polls,
                });
            }

            if state == JobState::Unknown {
                unknown_streak += 1;
                warn!(
                    unknown_streak,
                    limit = self.max_unknown_polls,
                    "scheduler could not report job state"
                );
                if unknown_streak >= self.max_unknown_polls {
                    return Err(OrchestratorError::LostJob {
                        job: handle.job_name.clone(),
                        job_id: handle.job_id.to_string(),
                        polls: unknown_streak,
                    });
                }
            } else {
                unknown_streak = 0;
            }

            if Instant::now() + poll_interval > deadline {
                debug!(%state, polls, "wait timed out; job left running");
                return Ok(WaitOutcome {
                    success: false,
                    state,
                    polls,
                });
            }
            sleep(poll_interval).await;
        }
    }

    /// [`Tracker::wait`] with the configured poll interval.
    pub async fn wait_for(
        &self,
        handle: &JobHandle,
        timeout: Duration,
    ) -> OrchestratorResult<WaitOutcome> {
        self.wait(handle, self.poll_interval, timeout).await
    }

    /// Cancel a job that is still pending or running.
    ///
    /// Returns `false` without contacting the scheduler's cancel command if
    /// the job is already terminal. `true` means the request was accepted;
    /// confirmation needs a later [`Tracker::poll`].
    #[instrument(skip_all, fields(job_id = %handle.job_id))]
    pub async fn cancel(&self, handle: &JobHandle) -> bool {
        let state = self.poll(handle).await;
        if state.is_terminal() {
            debug!(%state, "job already finished; nothing to cancel");
            return false;
        }
        let accepted = self.scheduler.cancel(&handle.job_id).await;
        if accepted {
            info!(job = %handle.job_name, "cancellation accepted");
        }
        accepted
    }

    /// Snapshot of jobs known to the scheduler.
    pub async fn list_jobs(
        &self,
        filter: Option<&JobFilter>,
    ) -> OrchestratorResult<Vec<JobSummary>> {
        let all = JobFilter::default();
        self.scheduler.list(filter.unwrap_or(&all)).await
    }

    /// Captured output of a job, see [`get_output`].
    pub async fn output(&self, handle: &JobHandle) -> OrchestratorResult<JobOutput> {
        get_output(handle).await
    }

    /// Handle for a job submitted elsewhere (e.g. by an earlier run), using
    /// the same output path convention as [`ScriptRenderer`]. The original
    /// submit time is not known, so `submit_time` is the time of the call.
    pub fn reattach(
        &self,
        renderer: &ScriptRenderer,
        job_name: &str,
        job_id: JobId,
    ) -> OrchestratorResult<JobHandle> {
        crate::spec::validate_job_name(job_name)?;
        let (output_path, error_path) = renderer.output_paths(job_name, &job_id);
        Ok(JobHandle {
            job_id,
            job_name: job_name.to_string(),
            output_path,
            error_path,
            submit_time: Utc::now(),
        })
    }
}
