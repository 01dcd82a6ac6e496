//! HPC Orchestrator: job orchestration for parallel workloads on
//! batch-scheduled clusters.
//!
//! This crate turns a framework-agnostic job request into a batch script,
//! submits it, follows the job through its lifecycle, and retrieves its
//! captured output. It supports five parallel-programming frameworks
//! (MPI, OpenMP, hybrid MPI+OpenMP, UPC++ and OpenSHMEM) on clusters whose
//! nodes have unequal thread counts.
//!
//! # Overview
//!
//! - [`ClusterTopology`] describes nodes, thread capacities, and partitions
//! - [`JobRequest`] / [`JobSpec`] validate a request and allocate nodes
//! - [`ScriptRenderer`] binds a [`JobSpec`] to a per-framework template
//! - [`Tracker`] submits, polls, waits for, cancels, and lists jobs through a
//!   [`Scheduler`] (Slurm via [`SlurmScheduler`])
//! - [`get_output`] reads a job's captured stdout and stderr
//! - [`OrchestratorError`] with one variant per failure category
//!
//! # Pipeline
//!
//! ```text
//!   JobSpec::build() ──→ render() ──→ submit() ──→ poll()/wait() ──→ get_output()
//!     (sync, pure)      (sync, pure)   (async)       (async)           (async)
//! ```
//!
//! ```ignore
//! use hpc_orchestrator::{
//!     ClusterTopology, EngineConfig, Framework, JobRequest, JobSpec, ScriptRenderer,
//!     SlurmScheduler, Tracker,
//! };
//!
//! let topology = ClusterTopology::load("cluster.yaml")?;
//! let config = EngineConfig::load("engine.yaml")?;
//! let request = JobRequest::new("ring", Framework::Mpi, "./ring", "00:10:00", "compute")
//!     .with_tasks(16);
//!
//! let spec = JobSpec::build(&request, &topology)?;
//! let script = ScriptRenderer::new(&config)?.render(&spec)?;
//! let tracker = Tracker::new(SlurmScheduler::from_config(&config), &config);
//! let handle = tracker.submit(script).await?;
//! let outcome = tracker.wait_for(&handle, std::time::Duration::from_secs(3600)).await?;
//! let output = tracker.output(&handle).await?;
//! ```

pub mod config;
pub mod error;
pub mod job;
pub mod output;
pub mod render;
pub mod scheduler;
pub mod spec;
pub mod topology;
pub mod tracker;

pub use config::{EngineConfig, LauncherCommands, SchedulerCommands};
pub use error::{OrchestratorError, OrchestratorResult};
pub use job::{JobFilter, JobHandle, JobId, JobState, JobSummary};
pub use output::{JobOutput, get_output};
pub use render::{JOB_ID_PLACEHOLDER, RenderedScript, ScriptRenderer, TemplateSet};
pub use scheduler::{Scheduler, SlurmScheduler};
pub use spec::{Conduit, Framework, JobRequest, JobSpec, Parallelism, ThreadClamp, TimeLimit};
pub use topology::{ClusterTopology, Node, OsFamily, Partition};
pub use tracker::{Tracker, WaitOutcome};
