//! Job specification and the builder that produces it.
//!
//! An operator describes a job with a [`JobRequest`]: a flat, serde-friendly
//! record whose sizing fields depend on the framework. [`JobSpec::build`]
//! validates the request against a [`ClusterTopology`] and produces a
//! normalized [`JobSpec`] whose [`Parallelism`] variant carries exactly the
//! sizing fields of its framework.
//!
//! # Node allocation
//!
//! ```text
//!   MPI / Hybrid / UPC++ / OpenSHMEM:  nodes = min(partition nodes, parallel units)
//!   OpenMP:                            nodes = 1
//! ```
//!
//! Nodes are taken from the front of the partition in declared order, so
//! the same request against the same topology always resolves the same way.
//!
//! OpenMP thread requests above the chosen node's capacity are clamped to
//! that capacity. The clamp is logged and recorded in
//! [`JobSpec::thread_clamp`] rather than rejected.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, warn};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::job::JobId;
use crate::topology::ClusterTopology;

/// Parallel-programming framework of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    Mpi,
    #[serde(alias = "omp")]
    OpenMp,
    Hybrid,
    #[serde(alias = "pgas-upcxx")]
    Upcxx,
    #[serde(alias = "pgas-openshmem", alias = "oshmem")]
    OpenShmem,
}

impl Framework {
    /// All frameworks, in a stable order.
    pub const ALL: [Framework; 5] = [
        Framework::Mpi,
        Framework::OpenMp,
        Framework::Hybrid,
        Framework::Upcxx,
        Framework::OpenShmem,
    ];

    /// Stable lowercase key, used for template file names.
    pub fn key(&self) -> &'static str {
        match self {
            Framework::Mpi => "mpi",
            Framework::OpenMp => "openmp",
            Framework::Hybrid => "hybrid",
            Framework::Upcxx => "upcxx",
            Framework::OpenShmem => "oshmem",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framework::Mpi => write!(f, "MPI"),
            Framework::OpenMp => write!(f, "OpenMP"),
            Framework::Hybrid => write!(f, "MPI+OpenMP"),
            Framework::Upcxx => write!(f, "PGAS-UPCXX"),
            Framework::OpenShmem => write!(f, "PGAS-OpenSHMEM"),
        }
    }
}

/// Communication transport for the UPC++ runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conduit {
    /// Shared memory.
    #[default]
    Smp,
    /// UDP sockets.
    Udp,
    /// MPI-based transport.
    Mpi,
}

impl fmt::Display for Conduit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conduit::Smp => write!(f, "smp"),
            Conduit::Udp => write!(f, "udp"),
            Conduit::Mpi => write!(f, "mpi"),
        }
    }
}

/// Framework-specific sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "framework", rename_all = "lowercase")]
pub enum Parallelism {
    Mpi {
        num_tasks: u32,
    },
    /// Single node. `num_threads` is the granted count after any clamp.
    OpenMp {
        num_threads: u32,
    },
    Hybrid {
        num_tasks: u32,
        threads_per_task: u32,
    },
    Upcxx {
        num_processes: u32,
        network_conduit: Conduit,
    },
    OpenShmem {
        num_pes: u32,
    },
}

impl Parallelism {
    pub fn framework(&self) -> Framework {
        match self {
            Parallelism::Mpi { .. } => Framework::Mpi,
            Parallelism::OpenMp { .. } => Framework::OpenMp,
            Parallelism::Hybrid { .. } => Framework::Hybrid,
            Parallelism::Upcxx { .. } => Framework::Upcxx,
            Parallelism::OpenShmem { .. } => Framework::OpenShmem,
        }
    }

    /// Number of parallel units (ranks, processes, PEs) the launcher
    /// starts. OpenMP runs a single process.
    pub fn unit_count(&self) -> u32 {
        match *self {
            Parallelism::Mpi { num_tasks } | Parallelism::Hybrid { num_tasks, .. } => num_tasks,
            Parallelism::OpenMp { .. } => 1,
            Parallelism::Upcxx { num_processes, .. } => num_processes,
            Parallelism::OpenShmem { num_pes } => num_pes,
        }
    }
}

/// Wall-clock limit in `HH:MM:SS` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeLimit {
    secs: u64,
}

impl TimeLimit {
    pub fn from_secs(secs: u64) -> Self {
        Self { secs }
    }

    pub fn as_secs(&self) -> u64 {
        self.secs
    }
}

impl fmt::Display for TimeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = self.secs / 3600;
        let m = (self.secs % 3600) / 60;
        let s = self.secs % 60;
        write!(f, "{h:02}:{m:02}:{s:02}")
    }
}

impl FromStr for TimeLimit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let [h, m, sec] = parts.as_slice() else {
            return Err(format!("time limit '{s}' is not HH:MM:SS"));
        };

        if h.len() < 2
            || m.len() != 2
            || sec.len() != 2
            || ![*h, *m, *sec].into_iter().all(all_digits)
        {
            return Err(format!("time limit '{s}' is not HH:MM:SS"));
        }

        let h: u64 = h
            .parse()
            .map_err(|_| format!("time limit '{s}' has an out-of-range hour field"))?;
        // two ASCII digits always parse
        let m: u64 = m.parse().unwrap_or(60);
        let sec: u64 = sec.parse().unwrap_or(60);
        if m >= 60 || sec >= 60 {
            return Err(format!("time limit '{s}' has minutes or seconds above 59"));
        }

        let secs = h
            .checked_mul(3600)
            .and_then(|x| x.checked_add(m * 60 + sec))
            .ok_or_else(|| format!("time limit '{s}' is out of range"))?;
        if secs == 0 {
            return Err("time limit must be positive".into());
        }
        Ok(Self { secs })
    }
}

impl Serialize for TimeLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Operator-facing job request.
///
/// Only the sizing fields of the chosen framework may be set:
///
/// | Framework | Fields |
/// |-----------|--------|
/// | `mpi` | `num_tasks` |
/// | `openmp` | `num_threads` |
/// | `hybrid` | `num_tasks`, `threads_per_task` |
/// | `upcxx` | `num_processes`, `network_conduit` (default `smp`) |
/// | `openshmem` | `num_pes` |
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobRequest {
    #[serde(alias = "job_name")]
    pub name: String,
    pub framework: Framework,
    pub executable: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub time_limit: String,
    pub partition: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_tasks: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_threads: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads_per_task: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_processes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_conduit: Option<Conduit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_pes: Option<i64>,

    /// Scheduler job IDs that must complete successfully first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl JobRequest {
    /// Create a request with no sizing fields set.
    pub fn new(
        name: impl Into<String>,
        framework: Framework,
        executable: impl Into<String>,
        time_limit: impl Into<String>,
        partition: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            framework,
            executable: executable.into(),
            args: vec![],
            time_limit: time_limit.into(),
            partition: partition.into(),
            num_tasks: None,
            num_threads: None,
            threads_per_task: None,
            num_processes: None,
            network_conduit: None,
            num_pes: None,
            depends_on: vec![],
            workdir: None,
            env: BTreeMap::new(),
        }
    }

    /// Load a request from a YAML or JSON document.
    pub fn from_yaml_str(text: &str) -> OrchestratorResult<Self> {
        serde_yaml::from_str(text).map_err(|e| {
            OrchestratorError::validation("<unparsed>", format!("unparsable job request: {e}"))
        })
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tasks(mut self, n: i64) -> Self {
        self.num_tasks = Some(n);
        self
    }

    pub fn with_threads(mut self, n: i64) -> Self {
        self.num_threads = Some(n);
        self
    }

    pub fn with_threads_per_task(mut self, n: i64) -> Self {
        self.threads_per_task = Some(n);
        self
    }

    pub fn with_processes(mut self, n: i64, conduit: Conduit) -> Self {
        self.num_processes = Some(n);
        self.network_conduit = Some(conduit);
        self
    }

    pub fn with_pes(mut self, n: i64) -> Self {
        self.num_pes = Some(n);
        self
    }

    pub fn with_dependency(mut self, job_id: impl Into<String>) -> Self {
        self.depends_on.push(job_id.into());
        self
    }

    fn sizing_fields(&self) -> [(&'static str, bool); 6] {
        [
            ("num_tasks", self.num_tasks.is_some()),
            ("num_threads", self.num_threads.is_some()),
            ("threads_per_task", self.threads_per_task.is_some()),
            ("num_processes", self.num_processes.is_some()),
            ("network_conduit", self.network_conduit.is_some()),
            ("num_pes", self.num_pes.is_some()),
        ]
    }
}

/// Record of an OpenMP thread request reduced to node capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThreadClamp {
    pub requested: u32,
    pub granted: u32,
    pub node_capacity: u32,
}

impl fmt::Display for ThreadClamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requested {} OpenMP threads but the node provides {}; using {}",
            self.requested, self.node_capacity, self.granted
        )
    }
}

/// Normalized, validated description of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSpec {
    pub job_name: String,
    pub executable: String,
    pub args: Vec<String>,
    pub parallelism: Parallelism,
    pub time_limit: TimeLimit,
    pub partition: String,
    /// Node addresses in allocation order. Never empty after a build.
    pub resolved_nodes: Vec<String>,
    pub thread_clamp: Option<ThreadClamp>,
    pub depends_on: Vec<JobId>,
    pub workdir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl JobSpec {
    pub fn framework(&self) -> Framework {
        self.parallelism.framework()
    }

    /// Validate `request` against `topology` and resolve its nodes.
    pub fn build(request: &JobRequest, topology: &ClusterTopology) -> OrchestratorResult<Self> {
        let job = request.name.as_str();
        validate_job_name(job)?;

        let time_limit: TimeLimit = request
            .time_limit
            .parse()
            .map_err(|e: String| OrchestratorError::validation(job, e))?;

        let partition = topology.partition(&request.partition).ok_or_else(|| {
            OrchestratorError::validation(job, format!("unknown partition '{}'", request.partition))
        })?;

        if let Some(max) = partition.max_walltime {
            if time_limit > max {
                return Err(OrchestratorError::validation(
                    job,
                    format!(
                        "time limit {time_limit} exceeds partition {} maximum {max}",
                        partition.name
                    ),
                ));
            }
        }

        if request.executable.trim().is_empty() {
            return Err(OrchestratorError::validation(job, "executable is empty"));
        }

        let mut parallelism = parallelism_from(request)?;

        let nodes = topology.partition_nodes(&partition.name).unwrap_or_default();
        let node_count = match parallelism {
            Parallelism::OpenMp { .. } => 1,
            _ => nodes.len().min(parallelism.unit_count() as usize),
        };
        let chosen = &nodes[..node_count];

        let mut thread_clamp = None;
        if let Parallelism::OpenMp { num_threads } = &mut parallelism {
            let capacity = chosen[0].thread_count;
            if *num_threads > capacity {
                let clamp = ThreadClamp {
                    requested: *num_threads,
                    granted: capacity,
                    node_capacity: capacity,
                };
                warn!(job, node = %chosen[0].address, "{clamp}");
                *num_threads = capacity;
                thread_clamp = Some(clamp);
            }
        }

        for key in request.env.keys() {
            if !is_env_name(key) {
                return Err(OrchestratorError::validation(
                    job,
                    format!("'{key}' is not a valid environment variable name"),
                ));
            }
        }

        let depends_on = request
            .depends_on
            .iter()
            .map(|id| {
                if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit() || b == b'_') {
                    Ok(JobId::new(id.as_str()))
                } else {
                    Err(OrchestratorError::validation(
                        job,
                        format!("dependency '{id}' is not a scheduler job id"),
                    ))
                }
            })
            .collect::<OrchestratorResult<Vec<_>>>()?;

        let spec = JobSpec {
            job_name: request.name.clone(),
            executable: request.executable.clone(),
            args: request.args.clone(),
            parallelism,
            time_limit,
            partition: partition.name.clone(),
            resolved_nodes: chosen.iter().map(|n| n.address.clone()).collect(),
            thread_clamp,
            depends_on,
            workdir: request.workdir.clone(),
            env: request.env.clone(),
        };

        debug!(
            job,
            framework = %spec.framework(),
            nodes = spec.resolved_nodes.len(),
            units = spec.parallelism.unit_count(),
            "built job spec"
        );
        Ok(spec)
    }

    /// Split the parallel units across resolved nodes in block order:
    /// earlier nodes get one extra unit when the division is uneven.
    pub fn units_per_node(&self) -> Vec<u32> {
        let n = self.resolved_nodes.len() as u32;
        if n == 0 {
            return vec![];
        }
        let units = self.parallelism.unit_count();
        (0..n)
            .map(|i| units / n + u32::from(i < units % n))
            .collect()
    }
}

/// Job names end up in output file names; only a conservative character
/// set is allowed.
pub fn validate_job_name(name: &str) -> OrchestratorResult<()> {
    let safe = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'));
    if safe {
        Ok(())
    } else {
        Err(OrchestratorError::validation(
            name,
            "job name must be non-empty and contain only letters, digits, '.', '_' or '-'",
        ))
    }
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_env_name(s: &str) -> bool {
    let mut bytes = s.bytes();
    matches!(bytes.next(), Some(b) if b.is_ascii_alphabetic() || b == b'_')
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn positive(job: &str, field: &str, value: Option<i64>) -> OrchestratorResult<u32> {
    match value {
        None => Err(OrchestratorError::validation(
            job,
            format!("{field} is required"),
        )),
        Some(v) if v <= 0 => Err(OrchestratorError::validation(
            job,
            format!("{field} must be positive, got {v}"),
        )),
        Some(v) => u32::try_from(v)
            .map_err(|_| OrchestratorError::validation(job, format!("{field} {v} is too large"))),
    }
}

fn parallelism_from(request: &JobRequest) -> OrchestratorResult<Parallelism> {
    let job = request.name.as_str();
    let allowed: &[&str] = match request.framework {
        Framework::Mpi => &["num_tasks"],
        Framework::OpenMp => &["num_threads"],
        Framework::Hybrid => &["num_tasks", "threads_per_task"],
        Framework::Upcxx => &["num_processes", "network_conduit"],
        Framework::OpenShmem => &["num_pes"],
    };
    if let Some((field, _)) = request
        .sizing_fields()
        .into_iter()
        .find(|(field, set)| *set && !allowed.contains(field))
    {
        return Err(OrchestratorError::validation(
            job,
            format!("{field} does not apply to {} jobs", request.framework),
        ));
    }

    Ok(match request.framework {
        Framework::Mpi => Parallelism::Mpi {
            num_tasks: positive(job, "num_tasks", request.num_tasks)?,
        },
        Framework::OpenMp => Parallelism::OpenMp {
            num_threads: positive(job, "num_threads", request.num_threads)?,
        },
        Framework::Hybrid => Parallelism::Hybrid {
            num_tasks: positive(job, "num_tasks", request.num_tasks)?,
            threads_per_task: positive(job, "threads_per_task", request.threads_per_task)?,
        },
        Framework::Upcxx => Parallelism::Upcxx {
            num_processes: positive(job, "num_processes", request.num_processes)?,
            network_conduit: request.network_conduit.unwrap_or_default(),
        },
        Framework::OpenShmem => Parallelism::OpenShmem {
            num_pes: positive(job, "num_pes", request.num_pes)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology() -> ClusterTopology {
        ClusterTopology::from_yaml_str(
            r#"
nodes:
  - {address: n1, thread_count: 32}
  - {address: n2, thread_count: 32}
  - {address: n3, thread_count: 16}
  - {address: n4, thread_count: 16}
partitions:
  compute:
    nodes: [n1, n2, n3, n4]
    max_walltime: "48:00:00"
  tail:
    nodes: [n4, n3]
"#,
        )
        .unwrap()
    }

    fn mpi(tasks: i64) -> JobRequest {
        JobRequest::new("sim", Framework::Mpi, "./sim", "01:00:00", "compute").with_tasks(tasks)
    }

    #[test]
    fn test_mpi_uses_every_node_when_tasks_exceed_partition() {
        let spec = JobSpec::build(&mpi(16), &topology()).unwrap();
        assert_eq!(spec.resolved_nodes, ["n1", "n2", "n3", "n4"]);
        assert_eq!(spec.units_per_node(), [4, 4, 4, 4]);
    }

    #[test]
    fn test_mpi_never_requests_more_nodes_than_tasks() {
        let spec = JobSpec::build(&mpi(2), &topology()).unwrap();
        assert_eq!(spec.resolved_nodes, ["n1", "n2"]);
    }

    #[test]
    fn test_task_counted_node_count_property() {
        let topo = topology();
        for tasks in 1..=10 {
            for framework in [Framework::Mpi, Framework::OpenShmem, Framework::Upcxx] {
                let mut req = JobRequest::new("p", framework, "./a", "00:10:00", "compute");
                match framework {
                    Framework::Mpi => req.num_tasks = Some(tasks),
                    Framework::OpenShmem => req.num_pes = Some(tasks),
                    _ => req.num_processes = Some(tasks),
                }
                let spec = JobSpec::build(&req, &topo).unwrap();
                assert_eq!(spec.resolved_nodes.len(), 4usize.min(tasks as usize));
                let partition = topo.partition("compute").unwrap();
                assert!(
                    spec.resolved_nodes
                        .iter()
                        .all(|n| partition.node_addresses.contains(n))
                );
                assert_eq!(
                    spec.units_per_node().iter().sum::<u32>(),
                    tasks as u32
                );
            }
        }
    }

    #[test]
    fn test_partition_declared_order_is_kept() {
        let req = JobRequest::new("t", Framework::Mpi, "./a", "00:10:00", "tail").with_tasks(1);
        let spec = JobSpec::build(&req, &topology()).unwrap();
        assert_eq!(spec.resolved_nodes, ["n4"]);
    }

    #[test]
    fn test_openmp_is_single_node_and_clamped() {
        let req = JobRequest::new("omp", Framework::OpenMp, "./omp", "00:30:00", "compute")
            .with_threads(64);
        let spec = JobSpec::build(&req, &topology()).unwrap();
        assert_eq!(spec.resolved_nodes, ["n1"]);
        assert_eq!(spec.parallelism, Parallelism::OpenMp { num_threads: 32 });
        assert_eq!(
            spec.thread_clamp,
            Some(ThreadClamp {
                requested: 64,
                granted: 32,
                node_capacity: 32
            })
        );
    }

    #[test]
    fn test_openmp_within_capacity_has_no_clamp() {
        let req = JobRequest::new("omp", Framework::OpenMp, "./omp", "00:30:00", "compute")
            .with_threads(8);
        let spec = JobSpec::build(&req, &topology()).unwrap();
        assert_eq!(spec.resolved_nodes.len(), 1);
        assert!(spec.thread_clamp.is_none());
    }

    #[test]
    fn test_hybrid_follows_task_rule_without_oversubscription_check() {
        let req = JobRequest::new("hy", Framework::Hybrid, "./hy", "00:30:00", "compute")
            .with_tasks(3)
            .with_threads_per_task(64);
        let spec = JobSpec::build(&req, &topology()).unwrap();
        assert_eq!(spec.resolved_nodes.len(), 3);
        assert_eq!(
            spec.parallelism,
            Parallelism::Hybrid {
                num_tasks: 3,
                threads_per_task: 64
            }
        );
    }

    #[test]
    fn test_upcxx_defaults_to_smp_conduit() {
        let mut req = JobRequest::new("pg", Framework::Upcxx, "./pg", "00:30:00", "compute");
        req.num_processes = Some(4);
        let spec = JobSpec::build(&req, &topology()).unwrap();
        assert_eq!(
            spec.parallelism,
            Parallelism::Upcxx {
                num_processes: 4,
                network_conduit: Conduit::Smp
            }
        );
    }

    #[test]
    fn test_rejects_unsafe_names() {
        for name in ["", "a b", "../x", "a/b", "..", "tab\tname"] {
            let mut req = mpi(1);
            req.name = name.into();
            let err = JobSpec::build(&req, &topology()).unwrap_err();
            assert!(err.is_recoverable(), "{name:?}");
        }
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let topo = topology();

        let mut req = mpi(1);
        req.partition = "gpu".into();
        assert!(JobSpec::build(&req, &topo).is_err());

        for limit in ["1:00:00", "01:00", "01:60:00", "aa:00:00", "00:00:00", "72:00:00"] {
            let mut req = mpi(1);
            req.time_limit = limit.into();
            assert!(JobSpec::build(&req, &topo).is_err(), "{limit}");
        }

        assert!(JobSpec::build(&mpi(0), &topo).is_err());
        assert!(JobSpec::build(&mpi(-3), &topo).is_err());

        let missing = JobRequest::new("m", Framework::Mpi, "./a", "00:10:00", "compute");
        assert!(JobSpec::build(&missing, &topo).is_err());

        let stray = mpi(2).with_threads(4);
        let err = JobSpec::build(&stray, &topo).unwrap_err();
        assert!(err.to_string().contains("num_threads does not apply"));

        let mut bad_env = mpi(2);
        bad_env.env.insert("1BAD".into(), "x".into());
        assert!(JobSpec::build(&bad_env, &topo).is_err());

        let bad_dep = mpi(2).with_dependency("abc");
        assert!(JobSpec::build(&bad_dep, &topo).is_err());
    }

    #[test]
    fn test_time_limit_roundtrip_display() {
        let t: TimeLimit = "100:05:09".parse().unwrap();
        assert_eq!(t.as_secs(), 100 * 3600 + 5 * 60 + 9);
        assert_eq!(t.to_string(), "100:05:09");
        assert_eq!(TimeLimit::from_secs(61).to_string(), "00:01:01");
    }

    #[test]
    fn test_request_from_yaml() {
        let req = JobRequest::from_yaml_str(
            "name: ring\nframework: pgas-openshmem\nexecutable: ./ring\ntime_limit: '00:05:00'\npartition: compute\nnum_pes: 8\n",
        )
        .unwrap();
        assert_eq!(req.framework, Framework::OpenShmem);
        let spec = JobSpec::build(&req, &topology()).unwrap();
        assert_eq!(spec.parallelism, Parallelism::OpenShmem { num_pes: 8 });
    }
}
