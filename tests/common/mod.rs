//! Shared fixtures for integration tests: a small cluster, engine
//! configuration rooted in a scratch directory, and an in-memory scheduler.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hpc_orchestrator::{
    ClusterTopology, EngineConfig, Framework, JobFilter, JobId, JobRequest, JobSpec, JobState,
    JobSummary, OrchestratorError, OrchestratorResult, RenderedScript, Scheduler,
};

pub const CLUSTER: &str = r#"
nodes:
  - address: 10.0.0.1
    thread_count: 4
  - address: 10.0.0.2
    thread_count: 2
partitions:
  compute:
    nodes: [10.0.0.1, 10.0.0.2]
    max_walltime: "24:00:00"
"#;

pub fn topology() -> ClusterTopology {
    ClusterTopology::from_yaml_str(CLUSTER).unwrap()
}

pub fn config(results_dir: &Path) -> EngineConfig {
    let mut config = EngineConfig::default().with_results_dir(results_dir);
    config.poll_interval = Duration::from_secs(5);
    config
}

pub fn mpi_spec(name: &str) -> JobSpec {
    let request =
        JobRequest::new(name, Framework::Mpi, "./ring", "00:10:00", "compute").with_tasks(4);
    JobSpec::build(&request, &topology()).unwrap()
}

struct MockJob {
    name: String,
    /// States still to be reported; the last one sticks.
    lifecycle: VecDeque<JobState>,
    output_path: PathBuf,
    output_written: bool,
}

impl MockJob {
    fn current(&self) -> JobState {
        self.lifecycle.front().copied().unwrap_or(JobState::Unknown)
    }
}

/// In-memory scheduler. Every submitted job walks through the configured
/// lifecycle, one state per query.
pub struct MockScheduler {
    lifecycle: Vec<JobState>,
    stdout: Option<String>,
    reject: Option<String>,
    jobs: Mutex<HashMap<String, MockJob>>,
    next_id: Mutex<u64>,
    submitted: Mutex<Vec<RenderedScript>>,
    queries: AtomicU32,
    cancels: AtomicU32,
}

impl MockScheduler {
    pub fn new(lifecycle: impl IntoIterator<Item = JobState>) -> Self {
        Self {
            lifecycle: lifecycle.into_iter().collect(),
            stdout: None,
            reject: None,
            jobs: Mutex::new(HashMap::new()),
            next_id: Mutex::new(1000),
            submitted: Mutex::new(Vec::new()),
            queries: AtomicU32::new(0),
            cancels: AtomicU32::new(0),
        }
    }

    /// Write `text` to the job's output file once it reaches a terminal state.
    pub fn with_stdout(mut self, text: impl Into<String>) -> Self {
        self.stdout = Some(text.into());
        self
    }

    /// Reject every submission with `reason`.
    pub fn rejecting(mut self, reason: impl Into<String>) -> Self {
        self.reject = Some(reason.into());
        self
    }

    pub fn submitted(&self) -> Vec<RenderedScript> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn queries(&self) -> u32 {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> u32 {
        self.cancels.load(Ordering::SeqCst)
    }

    /// State the job would report now, without advancing it.
    pub fn peek(&self, job_id: &JobId) -> JobState {
        self.jobs
            .lock()
            .unwrap()
            .get(job_id.as_str())
            .map(MockJob::current)
            .unwrap_or(JobState::Unknown)
    }
}

#[async_trait]
impl Scheduler for MockScheduler {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(&self, script: &RenderedScript) -> OrchestratorResult<JobId> {
        if let Some(reason) = &self.reject {
            return Err(OrchestratorError::Submission {
                job: script.job_name.clone(),
                reason: reason.clone(),
            });
        }

        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            JobId::new(next.to_string())
        };
        let (output_path, _) = script.paths_for(&id);

        self.submitted.lock().unwrap().push(script.clone());
        self.jobs.lock().unwrap().insert(
            id.to_string(),
            MockJob {
                name: script.job_name.clone(),
                lifecycle: self.lifecycle.iter().copied().collect(),
                output_path,
                output_written: false,
            },
        );
        Ok(id)
    }

    async fn query(&self, job_id: &JobId) -> JobState {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.get_mut(job_id.as_str()) else {
            return JobState::Unknown;
        };

        let state = if job.lifecycle.len() > 1 {
            job.lifecycle.pop_front().unwrap_or(JobState::Unknown)
        } else {
            job.current()
        };

        if state.is_terminal() && !job.output_written {
            if let Some(text) = &self.stdout {
                std::fs::write(&job.output_path, text).unwrap();
            }
            job.output_written = true;
        }
        state
    }

    async fn cancel(&self, job_id: &JobId) -> bool {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(job_id.as_str()) {
            Some(job) if !job.current().is_terminal() => {
                job.lifecycle = VecDeque::from([JobState::Cancelled]);
                true
            }
            _ => false,
        }
    }

    async fn list(&self, filter: &JobFilter) -> OrchestratorResult<Vec<JobSummary>> {
        let jobs = self.jobs.lock().unwrap();
        let mut summaries: Vec<JobSummary> = jobs
            .iter()
            .map(|(id, job)| JobSummary {
                job_id: JobId::new(id.as_str()),
                job_name: job.name.clone(),
                state: job.current(),
                partition: Some("compute".into()),
                user: Some("tester".into()),
            })
            .filter(|s| filter.matches(s))
            .collect();
        summaries.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        Ok(summaries)
    }
}
