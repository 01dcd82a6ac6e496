//! Scheduler CLI boundary.
//!
//! The engine needs four things from the batch scheduler:
//!
//! | Method | Slurm command | Returns |
//! |--------|---------------|---------|
//! | `submit()` | `sbatch --parsable` (script on stdin) | `JobId` |
//! | `query()` | `squeue`, falling back to `sacct` | `JobState` |
//! | `cancel()` | `scancel` | accepted? |
//! | `list()` | `squeue` | `Vec<JobSummary>` |
//!
//! Every invocation is bounded by the configured command timeout. A query
//! that fails or times out reports [`JobState::Unknown`]; a submission that
//! fails or times out is a submission error. An `squeue` timeout skips the
//! `sacct` fallback, so one query never waits on two timeouts.

use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, trace, warn};

use crate::config::{EngineConfig, SchedulerCommands};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::job::{JobFilter, JobId, JobState, JobSummary};
use crate::render::RenderedScript;

/// Client side of a batch scheduler.
///
/// # Contract
///
/// - `submit()` does not retry; a rejected script is reported immediately.
/// - `query()` never fails: anything it cannot determine is `Unknown`.
/// - `cancel()` reports whether the scheduler accepted the request, not
///   whether the job has stopped.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Get the name of this scheduler.
    fn name(&self) -> &str;

    /// Submit a rendered script.
    async fn submit(&self, script: &RenderedScript) -> OrchestratorResult<JobId>;

    /// Get the current state of a job.
    async fn query(&self, job_id: &JobId) -> JobState;

    /// Ask the scheduler to cancel a job.
    async fn cancel(&self, job_id: &JobId) -> bool;

    /// List jobs known to the scheduler, in the scheduler's order.
    async fn list(&self, filter: &JobFilter) -> OrchestratorResult<Vec<JobSummary>>;
}

#[derive(Debug, Error)]
enum CommandError {
    #[error("command is empty")]
    Empty,
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} failed: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
}

/// Slurm client driving `sbatch`, `squeue`, `sacct`, and `scancel`.
#[derive(Debug, Clone)]
pub struct SlurmScheduler {
    commands: SchedulerCommands,
    timeout: Duration,
}

impl SlurmScheduler {
    pub fn new(commands: SchedulerCommands, timeout: Duration) -> Self {
        Self { commands, timeout }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.scheduler.clone(), config.command_timeout)
    }

    async fn run(
        &self,
        command: &[String],
        args: &[&str],
        stdin: Option<&str>,
    ) -> Result<Output, CommandError> {
        let (program, leading) = command.split_first().ok_or(CommandError::Empty)?;
        trace!(%program, ?leading, ?args, "running scheduler command");

        let mut child = Command::new(program)
            .args(leading)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.clone(),
                source,
            })?;

        let input = child.stdin.take();
        let finish = async move {
            if let (Some(text), Some(mut pipe)) = (stdin, input) {
                match pipe.write_all(text.as_bytes()).await {
                    Ok(()) => {}
                    // the tool may legitimately exit before reading everything
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                    Err(e) => return Err(e),
                }
            }
            child.wait_with_output().await
        };

        match tokio::time::timeout(self.timeout, finish).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(source)) => Err(CommandError::Io {
                program: program.clone(),
                source,
            }),
            Err(_) => Err(CommandError::TimedOut {
                program: program.clone(),
                timeout: self.timeout,
            }),
        }
    }

    /// First non-empty line of `squeue -h -j <id> -o %T`. `Ok(None)` when
    /// squeue no longer knows the job.
    async fn query_active(&self, job_id: &JobId) -> Result<Option<String>, CommandError> {
        let output = self
            .run(
                &self.commands.query,
                &["-h", "-j", job_id.as_str(), "-o", "%T"],
                None,
            )
            .await?;
        if !output.status.success() {
            // "Invalid job id specified" once the job has left the queue
            trace!(%job_id, stderr = %String::from_utf8_lossy(&output.stderr), "squeue rejected job id");
            return Ok(None);
        }
        Ok(first_line(&output.stdout))
    }

    /// `(State, ExitCode)` from `sacct -n -X -P -j <id> -o State,ExitCode`.
    async fn query_accounting(&self, job_id: &JobId) -> Option<(String, Option<String>)> {
        let output = self
            .run(
                &self.commands.accounting,
                &["-n", "-X", "-P", "-j", job_id.as_str(), "-o", "State,ExitCode"],
                None,
            )
            .await
            .inspect_err(|e| debug!(%job_id, "sacct query failed: {e}"))
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let line = first_line(&output.stdout)?;
        let mut fields = line.split('|');
        let state = fields.next()?.trim().to_string();
        let exit_code = fields.next().map(|s| s.trim().to_string());
        Some((state, exit_code))
    }
}

#[async_trait]
impl Scheduler for SlurmScheduler {
    fn name(&self) -> &str {
        "slurm"
    }

    async fn submit(&self, script: &RenderedScript) -> OrchestratorResult<JobId> {
        let job = script.job_name.as_str();
        let output = self
            .run(&self.commands.submit, &["--parsable"], Some(script.text.as_str()))
            .await
            .map_err(|e| OrchestratorError::submission(job, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = match output.status.code() {
                Some(code) => format!("sbatch exited with code {code}: {}", stderr.trim()),
                None => format!("sbatch was terminated by a signal: {}", stderr.trim()),
            };
            return Err(OrchestratorError::submission(job, reason));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_submission(&stdout).ok_or_else(|| {
            OrchestratorError::submission(
                job,
                format!("unexpected sbatch output '{}'", stdout.trim()),
            )
        })
    }

    async fn query(&self, job_id: &JobId) -> JobState {
        match self.query_active(job_id).await {
            Ok(Some(state)) => return JobState::from_scheduler(&state, None),
            Ok(None) => {}
            // one command timeout per poll at most
            Err(e @ CommandError::TimedOut { .. }) => {
                debug!(%job_id, "{e}");
                return JobState::Unknown;
            }
            Err(e) => debug!(%job_id, "squeue query failed: {e}"),
        }
        match self.query_accounting(job_id).await {
            Some((state, exit_code)) => JobState::from_scheduler(&state, exit_code.as_deref()),
            None => JobState::Unknown,
        }
    }

    async fn cancel(&self, job_id: &JobId) -> bool {
        match self.run(&self.commands.cancel, &[job_id.as_str()], None).await {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                warn!(
                    %job_id,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "scancel rejected the request"
                );
                false
            }
            Err(e) => {
                warn!(%job_id, "scancel failed: {e}");
                false
            }
        }
    }

    async fn list(&self, filter: &JobFilter) -> OrchestratorResult<Vec<JobSummary>> {
        let mut args = vec!["-h", "-o", "%i|%j|%T|%P|%u"];
        if let Some(user) = &filter.user {
            args.extend(["-u", user.as_str()]);
        }
        if let Some(partition) = &filter.partition {
            args.extend(["-p", partition.as_str()]);
        }
        if let Some(name) = &filter.job_name {
            args.extend(["-n", name.as_str()]);
        }

        let output = self
            .run(&self.commands.query, &args, None)
            .await
            .map_err(|e| OrchestratorError::Config(format!("cannot list jobs: {e}")))?;
        if !output.status.success() {
            return Err(OrchestratorError::Config(format!(
                "squeue failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|line| {
                let summary = parse_summary(line);
                if summary.is_none() {
                    warn!("Skipping malformed squeue line: {line}");
                }
                summary
            })
            .filter(|s| filter.matches(s))
            .collect())
    }
}

fn first_line(bytes: &[u8]) -> Option<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// Accepts `--parsable` output (`4242` or `4242;cluster`) as well as the
/// human form `Submitted batch job 4242`.
fn parse_submission(stdout: &str) -> Option<JobId> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let token = line.split_whitespace().last()?;
    let id = token.split(';').next()?;
    (!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())).then(|| JobId::new(id))
}

fn parse_summary(line: &str) -> Option<JobSummary> {
    let fields: Vec<&str> = line.trim().split('|').collect();
    let [id, name, state, partition, user] = fields.as_slice() else {
        return None;
    };
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
    Some(JobSummary {
        job_id: JobId::new(*id),
        job_name: name.to_string(),
        state: JobState::from_scheduler(state, None),
        partition: non_empty(*partition),
        user: non_empty(*user),
    })
}
