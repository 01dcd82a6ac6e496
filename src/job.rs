//! Job lifecycle types.
//!
//! The job state machine, advanced by polling the scheduler:
//!
//! ```text
//!   submit() ──→ Pending ──→ Running ──→ Completing ──→ Completed
//!                  │            │             │
//!                  │            ├─────────────┴──→ Failed / Timeout
//!                  │            │
//!                  └────────────┴──→ Cancelled
//!
//!   Unknown: the scheduler could not report a state. Not terminal;
//!   the caller polls again.
//! ```
//!
//! **Invariants:**
//! - Terminal states (`Completed`, `Failed`, `Cancelled`, `Timeout`) are permanent.
//! - A [`JobHandle`] is created once per successful submission and never reused.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scheduler-assigned job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new job ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a job as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Accepted by the scheduler, not yet running.
    Pending,
    /// Executing.
    Running,
    /// Scheduler is tearing the job down. Not terminal.
    Completing,
    /// Exited with status 0.
    Completed,
    /// Non-zero exit or scheduler-reported failure.
    Failed,
    /// Cancelled by an operator.
    Cancelled,
    /// Killed for exceeding its time limit.
    Timeout,
    /// Scheduler could not report a state.
    Unknown,
}

impl JobState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled | JobState::Timeout
        )
    }

    /// Check if the job completed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, JobState::Completed)
    }

    /// Check if the scheduler still holds the job (pending or executing).
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobState::Pending | JobState::Running | JobState::Completing
        )
    }

    /// Report `Completing` as `Running`, for callers that don't distinguish them.
    pub fn collapse_completing(self) -> Self {
        match self {
            JobState::Completing => JobState::Running,
            other => other,
        }
    }

    /// Map a Slurm state string (from `squeue %T` or `sacct State`) and an
    /// optional `sacct` exit code (`"0:0"`) to a lifecycle state.
    pub fn from_scheduler(state: &str, exit_code: Option<&str>) -> Self {
        // sacct reports "CANCELLED by 1000"
        let state = state.split_whitespace().next().unwrap_or("");
        // and occasionally a trailing '+' for truncated fields
        let state = state.trim_end_matches('+');

        match state.to_ascii_uppercase().as_str() {
            "PENDING" | "CONFIGURING" | "REQUEUED" | "REQUEUE_HOLD" | "REQUEUE_FED"
            | "RESV_DEL_HOLD" | "SUSPENDED" => JobState::Pending,
            "RUNNING" | "RESIZING" | "SIGNALING" | "STAGE_OUT" | "STOPPED" => JobState::Running,
            "COMPLETING" => JobState::Completing,
            "COMPLETED" => match exit_code.map(exit_status) {
                Some(Some(code)) if code != 0 => JobState::Failed,
                _ => JobState::Completed,
            },
            "FAILED" | "NODE_FAIL" | "OUT_OF_MEMORY" | "BOOT_FAIL" | "DEADLINE" | "PREEMPTED"
            | "REVOKED" | "SPECIAL_EXIT" => JobState::Failed,
            "CANCELLED" => JobState::Cancelled,
            "TIMEOUT" => JobState::Timeout,
            _ => JobState::Unknown,
        }
    }
}

/// Exit status half of a `sacct` `ExitCode` field (`status:signal`).
fn exit_status(code: &str) -> Option<i32> {
    code.split(':').next()?.trim().parse().ok()
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Completing => "COMPLETING",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
            JobState::Timeout => "TIMEOUT",
            JobState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Immutable record of one submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: JobId,
    pub job_name: String,
    /// Captured stdout, `{results_dir}/{job_name}_{job_id}.out`.
    pub output_path: PathBuf,
    /// Captured stderr, `{results_dir}/{job_name}_{job_id}.err`.
    pub error_path: PathBuf,
    pub submit_time: DateTime<Utc>,
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.job_name, self.job_id)
    }
}

/// One row of a job listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub job_name: String,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Restricts a job listing. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilter {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub partition: Option<String>,
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub states: Vec<JobState>,
}

impl JobFilter {
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    pub fn job_name(mut self, name: impl Into<String>) -> Self {
        self.job_name = Some(name.into());
        self
    }

    pub fn state(mut self, state: JobState) -> Self {
        self.states.push(state);
        self
    }

    /// Check a summary against every set criterion.
    pub fn matches(&self, summary: &JobSummary) -> bool {
        let eq = |want: &Option<String>, have: &Option<String>| match want {
            None => true,
            Some(w) => have.as_deref() == Some(w.as_str()),
        };

        eq(&self.user, &summary.user)
            && eq(&self.partition, &summary.partition)
            && self
                .job_name
                .as_ref()
                .is_none_or(|name| *name == summary.job_name)
            && (self.states.is_empty() || self.states.contains(&summary.state))
    }
}
