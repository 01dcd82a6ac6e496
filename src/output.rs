//! Result retrieval.
//!
//! Captured stdout/stderr live at the paths recorded in the [`JobHandle`].
//! A file that does not exist yet is not an error: it simply means the job
//! has not produced it (or has not started).

use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::job::JobHandle;

/// Captured output streams of a job. `None` means the file is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutput {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl JobOutput {
    /// Check if neither stream exists yet.
    pub fn is_empty(&self) -> bool {
        self.stdout.is_none() && self.stderr.is_none()
    }
}

/// Read both output files of a job.
pub async fn get_output(handle: &JobHandle) -> OrchestratorResult<JobOutput> {
    Ok(JobOutput {
        stdout: read_optional(handle, &handle.output_path).await?,
        stderr: read_optional(handle, &handle.error_path).await?,
    })
}

async fn read_optional(handle: &JobHandle, path: &Path) -> OrchestratorResult<Option<String>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(OrchestratorError::Io {
            job: handle.job_name.clone(),
            job_id: handle.job_id.to_string(),
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn handle(dir: &Path) -> JobHandle {
        JobHandle {
            job_id: "9".into(),
            job_name: "sim".into(),
            output_path: dir.join("sim_9.out"),
            error_path: dir.join("sim_9.err"),
            submit_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_missing_files_are_absent() {
        let dir = tempfile::tempdir().unwrap();
        let output = get_output(&handle(dir.path())).await.unwrap();
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_reads_existing_streams() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sim_9.out"), "rank 0 done\n").unwrap();
        let output = get_output(&handle(dir.path())).await.unwrap();
        assert_eq!(output.stdout.as_deref(), Some("rank 0 done\n"));
        assert_eq!(output.stderr, None);
    }

    #[tokio::test]
    async fn test_filesystem_failure_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where a file is expected cannot be read as one
        std::fs::create_dir(dir.path().join("sim_9.out")).unwrap();
        let err = get_output(&handle(dir.path())).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Io { ref job_id, .. } if job_id == "9"));
    }
}
