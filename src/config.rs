//! Engine configuration.
//!
//! Tool locations, the results directory, and polling limits are carried
//! in one explicit [`EngineConfig`] value that is threaded into the
//! renderer, the scheduler client, and the tracker. Nothing is read from
//! the process environment.
//!
//! ```yaml
//! results_dir: /shared/results
//! templates_dir: /etc/hpc-orchestrator/templates
//! command_timeout: 30s
//! poll_interval: 5s
//! max_unknown_polls: 5
//! scheduler:
//!   submit: [sbatch]
//!   query: [squeue]
//!   accounting: [sacct]
//!   cancel: [scancel]
//! launchers:
//!   mpi: [mpirun]
//!   mpi_host_flag: --host
//!   upcxx: [upcxx-run]
//!   oshmem: [oshrun]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, OrchestratorResult};

/// Top-level engine configuration. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EngineConfig {
    pub scheduler: SchedulerCommands,
    pub launchers: LauncherCommands,
    /// Directory receiving `{job_name}_{job_id}.out` / `.err`.
    pub results_dir: PathBuf,
    /// Optional directory of per-framework templates (`mpi.sh`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<PathBuf>,
    /// Upper bound on any single scheduler CLI invocation.
    #[serde(with = "duration_str")]
    pub command_timeout: Duration,
    #[serde(with = "duration_str")]
    pub poll_interval: Duration,
    /// Consecutive `UNKNOWN` polls tolerated before a job is declared lost.
    pub max_unknown_polls: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerCommands::default(),
            launchers: LauncherCommands::default(),
            results_dir: PathBuf::from("."),
            templates_dir: None,
            command_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
            max_unknown_polls: 5,
        }
    }
}

impl EngineConfig {
    /// Load a configuration document from disk.
    pub fn load(path: impl AsRef<Path>) -> OrchestratorResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Config(format!(
                "cannot read engine configuration {}: {e}",
                path.display()
            ))
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> OrchestratorResult<Self> {
        let config: Self = serde_yaml::from_str(text).map_err(|e| {
            OrchestratorError::Config(format!("unparsable engine configuration: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> OrchestratorResult<()> {
        let commands = [
            ("scheduler.submit", &self.scheduler.submit),
            ("scheduler.query", &self.scheduler.query),
            ("scheduler.accounting", &self.scheduler.accounting),
            ("scheduler.cancel", &self.scheduler.cancel),
            ("launchers.mpi", &self.launchers.mpi),
            ("launchers.upcxx", &self.launchers.upcxx),
            ("launchers.oshmem", &self.launchers.oshmem),
        ];
        if let Some((name, _)) = commands.iter().find(|(_, c)| c.is_empty()) {
            return Err(OrchestratorError::Config(format!("{name} must not be empty")));
        }
        if self.command_timeout.is_zero() {
            return Err(OrchestratorError::Config(
                "command_timeout must be positive".into(),
            ));
        }
        if self.max_unknown_polls == 0 {
            return Err(OrchestratorError::Config(
                "max_unknown_polls must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }
}

/// Command prefixes for the scheduler CLI. Each is a program followed by
/// leading arguments; the client appends its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SchedulerCommands {
    pub submit: Vec<String>,
    pub query: Vec<String>,
    pub accounting: Vec<String>,
    pub cancel: Vec<String>,
}

impl Default for SchedulerCommands {
    fn default() -> Self {
        Self {
            submit: vec!["sbatch".into()],
            query: vec!["squeue".into()],
            accounting: vec!["sacct".into()],
            cancel: vec!["scancel".into()],
        }
    }
}

/// Parallel runtime launchers referenced by rendered scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LauncherCommands {
    pub mpi: Vec<String>,
    /// Flag the MPI launcher uses for a `host:slots` list.
    pub mpi_host_flag: String,
    pub upcxx: Vec<String>,
    pub oshmem: Vec<String>,
}

impl Default for LauncherCommands {
    fn default() -> Self {
        Self {
            mpi: vec!["mpirun".into()],
            mpi_host_flag: "--host".into(),
            upcxx: vec!["upcxx-run".into()],
            oshmem: vec!["oshrun".into()],
        }
    }
}

/// Durations as human-readable strings (`30s`, `2m 30s`).
mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
