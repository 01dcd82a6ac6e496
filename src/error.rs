//! Orchestrator error types.
//!
//! Errors are categorized by where they stop the pipeline:
//!
//! | Category | Variants | Recovery |
//! |----------|----------|----------|
//! | **Startup** | `Config` | Fix topology / engine configuration |
//! | **Input** | `Validation` | Fix the job request and rebuild |
//! | **Per-job** | `Template`, `Submission`, `LostJob` | Fatal for that job only |
//! | **Retrieval** | `Io` | Filesystem failure reading captured output |
//!
//! Every job-level variant names the job, and the scheduler job ID where one
//! exists, so operators can cross-reference with `squeue`/`sacct`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building, rendering, submitting, or
/// tracking a job.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OrchestratorError {
    // ── Startup ──────────────────────────────────────────────────────
    /// Malformed topology or engine configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    // ── Input ────────────────────────────────────────────────────────
    /// Job request rejected before any external call.
    #[error("Invalid job '{job}': {reason}")]
    Validation { job: String, reason: String },

    // ── Per-job ──────────────────────────────────────────────────────
    /// Template references a binding the job does not provide.
    #[error("Template error for job '{job}': {reason}")]
    Template { job: String, reason: String },

    /// Scheduler rejected (or never answered) the submission.
    #[error("Submission of job '{job}' failed: {reason}")]
    Submission { job: String, reason: String },

    /// Too many consecutive `UNKNOWN` polls. The job is not cancelled.
    #[error("Lost track of job '{job}' (scheduler id {job_id}) after {polls} unknown polls")]
    LostJob {
        job: String,
        job_id: String,
        polls: u32,
    },

    // ── Retrieval ────────────────────────────────────────────────────
    /// Filesystem failure while reading captured output.
    #[error("I/O error reading output of job '{job}' (scheduler id {job_id}) at '{path}': {source}")]
    Io {
        job: String,
        job_id: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OrchestratorError {
    pub(crate) fn validation(job: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            job: job.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn template(job: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Template {
            job: job.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn submission(job: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Submission {
            job: job.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the caller can fix the input and try again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Returns `true` if the error ends processing of a single job but
    /// leaves the engine usable for others.
    pub fn is_fatal_for_job(&self) -> bool {
        matches!(
            self,
            Self::Template { .. } | Self::Submission { .. } | Self::LostJob { .. }
        )
    }
}

/// Result type for orchestrator operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
