//! Script renderer.
//!
//! Binds a [`JobSpec`] to the template of its framework and produces the
//! batch script text. Templates use `{{binding}}` placeholders; a line that
//! consists only of a placeholder whose value is empty is dropped, so
//! optional sections leave no blank lines behind.
//!
//! # Bindings
//!
//! | Binding | Frameworks | Value |
//! |---------|------------|-------|
//! | `job_name`, `partition`, `time_limit` | all | copied from the `JobSpec` |
//! | `node_count`, `node_list` | all | resolved nodes, comma separated |
//! | `output_path`, `error_path` | all | `{results_dir}/{job_name}_%j.out` / `.err` |
//! | `directives` | all | dependency / working directory lines |
//! | `environment` | all | `export` lines for the job's environment |
//! | `command` | all | shell-quoted executable and arguments |
//! | `num_tasks`, `host_list`, `mpi_launcher`, `mpi_host_flag` | MPI, Hybrid | |
//! | `num_threads` | OpenMP | granted thread count |
//! | `threads_per_task` | Hybrid | |
//! | `num_processes`, `conduit`, `conduit_env`, `upcxx_launcher` | UPC++ | |
//! | `num_pes`, `oshmem_launcher` | OpenSHMEM | |
//!
//! Output paths carry the scheduler's `%j` token; the scheduler replaces it
//! with the job ID when it opens the files, and the tracker performs the
//! same substitution to locate them.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::config::{EngineConfig, LauncherCommands};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::job::JobId;
use crate::spec::{Conduit, Framework, JobSpec, Parallelism};

/// Token the scheduler replaces with the job ID in output paths.
pub const JOB_ID_PLACEHOLDER: &str = "%j";

const MPI_TEMPLATE: &str = "#!/bin/bash
#SBATCH --job-name={{job_name}}
#SBATCH --partition={{partition}}
#SBATCH --time={{time_limit}}
#SBATCH --nodes={{node_count}}
#SBATCH --nodelist={{node_list}}
#SBATCH --ntasks={{num_tasks}}
#SBATCH --output={{output_path}}
#SBATCH --error={{error_path}}
{{directives}}

{{environment}}
{{mpi_launcher}} -np {{num_tasks}} {{mpi_host_flag}} {{host_list}} {{command}}
";

const OPENMP_TEMPLATE: &str = "#!/bin/bash
#SBATCH --job-name={{job_name}}
#SBATCH --partition={{partition}}
#SBATCH --time={{time_limit}}
#SBATCH --nodes=1
#SBATCH --nodelist={{node_list}}
#SBATCH --ntasks=1
#SBATCH --cpus-per-task={{num_threads}}
#SBATCH --output={{output_path}}
#SBATCH --error={{error_path}}
{{directives}}

export OMP_NUM_THREADS={{num_threads}}
export OMP_PROC_BIND=true
export OMP_PLACES=cores
{{environment}}
{{command}}
";

const HYBRID_TEMPLATE: &str = "#!/bin/bash
#SBATCH --job-name={{job_name}}
#SBATCH --partition={{partition}}
#SBATCH --time={{time_limit}}
#SBATCH --nodes={{node_count}}
#SBATCH --nodelist={{node_list}}
#SBATCH --ntasks={{num_tasks}}
#SBATCH --cpus-per-task={{threads_per_task}}
#SBATCH --output={{output_path}}
#SBATCH --error={{error_path}}
{{directives}}

export OMP_NUM_THREADS={{threads_per_task}}
export OMP_PROC_BIND=true
export OMP_PLACES=cores
{{environment}}
{{mpi_launcher}} -np {{num_tasks}} {{mpi_host_flag}} {{host_list}} {{command}}
";

const UPCXX_TEMPLATE: &str = "#!/bin/bash
#SBATCH --job-name={{job_name}}
#SBATCH --partition={{partition}}
#SBATCH --time={{time_limit}}
#SBATCH --nodes={{node_count}}
#SBATCH --nodelist={{node_list}}
#SBATCH --ntasks={{num_processes}}
#SBATCH --output={{output_path}}
#SBATCH --error={{error_path}}
{{directives}}

export UPCXX_NETWORK={{conduit}}
{{conduit_env}}
{{environment}}
{{upcxx_launcher}} -n {{num_processes}} -N {{node_count}} {{command}}
";

const OPENSHMEM_TEMPLATE: &str = "#!/bin/bash
#SBATCH --job-name={{job_name}}
#SBATCH --partition={{partition}}
#SBATCH --time={{time_limit}}
#SBATCH --nodes={{node_count}}
#SBATCH --nodelist={{node_list}}
#SBATCH --ntasks={{num_pes}}
#SBATCH --output={{output_path}}
#SBATCH --error={{error_path}}
{{directives}}

{{environment}}
{{oshmem_launcher}} -np {{num_pes}} {{command}}
";

/// Script text ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedScript {
    pub job_name: String,
    pub framework: Framework,
    pub text: String,
    /// Stdout path with the `%j` placeholder still in place.
    pub output_pattern: PathBuf,
    /// Stderr path with the `%j` placeholder still in place.
    pub error_pattern: PathBuf,
}

impl RenderedScript {
    /// Output and error paths once the scheduler has assigned `job_id`.
    pub fn paths_for(&self, job_id: &JobId) -> (PathBuf, PathBuf) {
        (
            substitute_job_id(&self.output_pattern, job_id),
            substitute_job_id(&self.error_pattern, job_id),
        )
    }
}

fn substitute_job_id(pattern: &Path, job_id: &JobId) -> PathBuf {
    PathBuf::from(
        pattern
            .to_string_lossy()
            .replace(JOB_ID_PLACEHOLDER, job_id.as_str()),
    )
}

/// One template per framework.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    templates: FxHashMap<Framework, String>,
}

impl TemplateSet {
    /// The templates shipped with the crate.
    pub fn builtin() -> Self {
        let templates = [
            (Framework::Mpi, MPI_TEMPLATE),
            (Framework::OpenMp, OPENMP_TEMPLATE),
            (Framework::Hybrid, HYBRID_TEMPLATE),
            (Framework::Upcxx, UPCXX_TEMPLATE),
            (Framework::OpenShmem, OPENSHMEM_TEMPLATE),
        ]
        .into_iter()
        .map(|(f, t)| (f, t.to_string()))
        .collect();
        Self { templates }
    }

    /// An empty set, for callers that supply every template themselves.
    pub fn empty() -> Self {
        Self {
            templates: FxHashMap::default(),
        }
    }

    /// Built-in templates overridden by any `{framework}.sh` file in `dir`.
    pub fn from_dir(dir: &Path) -> OrchestratorResult<Self> {
        let mut set = Self::builtin();
        for framework in Framework::ALL {
            let path = dir.join(format!("{}.sh", framework.key()));
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    debug!(path = %path.display(), %framework, "loaded template override");
                    set.templates.insert(framework, text);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(OrchestratorError::Config(format!(
                        "cannot read template {}: {e}",
                        path.display()
                    )));
                }
            }
        }
        Ok(set)
    }

    pub fn with_template(mut self, framework: Framework, text: impl Into<String>) -> Self {
        self.templates.insert(framework, text.into());
        self
    }

    pub fn get(&self, framework: Framework) -> Option<&str> {
        self.templates.get(&framework).map(String::as_str)
    }
}

/// Pure function from [`JobSpec`] to [`RenderedScript`].
#[derive(Debug, Clone)]
pub struct ScriptRenderer {
    templates: TemplateSet,
    launchers: LauncherCommands,
    results_dir: PathBuf,
}

impl ScriptRenderer {
    /// Build a renderer from engine configuration, loading template
    /// overrides when `templates_dir` is set.
    pub fn new(config: &EngineConfig) -> OrchestratorResult<Self> {
        let templates = match &config.templates_dir {
            Some(dir) => TemplateSet::from_dir(dir)?,
            None => TemplateSet::builtin(),
        };
        Ok(Self::with_templates(config, templates))
    }

    pub fn with_templates(config: &EngineConfig, templates: TemplateSet) -> Self {
        Self {
            templates,
            launchers: config.launchers.clone(),
            results_dir: config.results_dir.clone(),
        }
    }

    pub fn render(&self, spec: &JobSpec) -> OrchestratorResult<RenderedScript> {
        let framework = spec.framework();
        let template = self.templates.get(framework).ok_or_else(|| {
            OrchestratorError::template(
                &spec.job_name,
                format!("no template for {framework} jobs"),
            )
        })?;

        let (output_pattern, error_pattern) = self.output_patterns(&spec.job_name);

        let bindings = self.bindings(spec, &output_pattern, &error_pattern);
        let text = fill(template, &bindings)
            .map_err(|reason| OrchestratorError::template(&spec.job_name, reason))?;

        debug!(
            job = %spec.job_name,
            %framework,
            bytes = text.len(),
            "rendered script"
        );

        Ok(RenderedScript {
            job_name: spec.job_name.clone(),
            framework,
            text,
            output_pattern,
            error_pattern,
        })
    }

    /// `{results_dir}/{job_name}_%j.out` and `.err`.
    pub fn output_patterns(&self, job_name: &str) -> (PathBuf, PathBuf) {
        (
            self.results_dir
                .join(format!("{job_name}_{JOB_ID_PLACEHOLDER}.out")),
            self.results_dir
                .join(format!("{job_name}_{JOB_ID_PLACEHOLDER}.err")),
        )
    }

    /// Output and error paths of an already submitted job.
    pub fn output_paths(&self, job_name: &str, job_id: &JobId) -> (PathBuf, PathBuf) {
        let (out, err) = self.output_patterns(job_name);
        (substitute_job_id(&out, job_id), substitute_job_id(&err, job_id))
    }

    fn bindings(
        &self,
        spec: &JobSpec,
        output_pattern: &Path,
        error_pattern: &Path,
    ) -> BTreeMap<&'static str, String> {
        let mut b = BTreeMap::new();
        b.insert("job_name", spec.job_name.clone());
        b.insert("partition", spec.partition.clone());
        b.insert("time_limit", spec.time_limit.to_string());
        b.insert("node_count", spec.resolved_nodes.len().to_string());
        b.insert("node_list", spec.resolved_nodes.join(","));
        b.insert("output_path", output_pattern.display().to_string());
        b.insert("error_path", error_pattern.display().to_string());
        b.insert("directives", directives(spec));
        b.insert("environment", environment(spec));
        b.insert("command", command_line(&spec.executable, &spec.args));

        let host_list = host_list(spec);

        match spec.parallelism {
            Parallelism::Mpi { num_tasks } => {
                b.insert("num_tasks", num_tasks.to_string());
                b.insert("mpi_launcher", command_line_parts(&self.launchers.mpi));
                b.insert("mpi_host_flag", self.launchers.mpi_host_flag.clone());
                b.insert("host_list", host_list);
            }
            Parallelism::OpenMp { num_threads } => {
                b.insert("num_threads", num_threads.to_string());
            }
            Parallelism::Hybrid {
                num_tasks,
                threads_per_task,
            } => {
                b.insert("num_tasks", num_tasks.to_string());
                b.insert("threads_per_task", threads_per_task.to_string());
                b.insert("mpi_launcher", command_line_parts(&self.launchers.mpi));
                b.insert("mpi_host_flag", self.launchers.mpi_host_flag.clone());
                b.insert("host_list", host_list);
            }
            Parallelism::Upcxx {
                num_processes,
                network_conduit,
            } => {
                b.insert("num_processes", num_processes.to_string());
                b.insert("conduit", network_conduit.to_string());
                b.insert("upcxx_launcher", command_line_parts(&self.launchers.upcxx));
                b.insert(
                    "conduit_env",
                    self.conduit_env(spec, network_conduit, &host_list),
                );
            }
            Parallelism::OpenShmem { num_pes } => {
                b.insert("num_pes", num_pes.to_string());
                b.insert("oshmem_launcher", command_line_parts(&self.launchers.oshmem));
            }
        }
        b
    }

    /// GASNet spawner settings for multi-node conduits.
    fn conduit_env(&self, spec: &JobSpec, conduit: Conduit, host_list: &str) -> String {
        match conduit {
            Conduit::Smp => String::new(),
            Conduit::Udp => format!(
                "export GASNET_SPAWNFN=S\nexport GASNET_SSH_SERVERS={}",
                shell_quote(&spec.resolved_nodes.join(" "))
            ),
            Conduit::Mpi => {
                let runner = format!(
                    "{} -np %N {} {host_list} %C",
                    command_line_parts(&self.launchers.mpi),
                    self.launchers.mpi_host_flag
                );
                format!("export MPIRUN_CMD={}", shell_quote(&runner))
            }
        }
    }
}

/// `host:slots` pairs in block distribution order.
fn host_list(spec: &JobSpec) -> String {
    spec.resolved_nodes
        .iter()
        .zip(spec.units_per_node())
        .map(|(node, slots)| format!("{node}:{slots}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn directives(spec: &JobSpec) -> String {
    let mut out = String::new();
    if !spec.depends_on.is_empty() {
        let ids: Vec<&str> = spec.depends_on.iter().map(JobId::as_str).collect();
        let _ = writeln!(out, "#SBATCH --dependency=afterok:{}", ids.join(":"));
    }
    if let Some(dir) = &spec.workdir {
        let _ = writeln!(out, "#SBATCH --chdir={}", dir.display());
    }
    out.truncate(out.trim_end().len());
    out
}

fn environment(spec: &JobSpec) -> String {
    spec.env
        .iter()
        .map(|(k, v)| format!("export {k}={}", shell_quote(v)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn command_line(executable: &str, args: &[String]) -> String {
    std::iter::once(executable)
        .chain(args.iter().map(String::as_str))
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}

fn command_line_parts(parts: &[String]) -> String {
    parts
        .iter()
        .map(|p| shell_quote(p))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quote for POSIX shells unless the word is made of unambiguous characters.
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(b, b'_' | b'-' | b'.' | b'/' | b':' | b',' | b'=' | b'+' | b'@' | b'%')
        });
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Substitute `{{name}}` placeholders. Unknown names and unterminated
/// placeholders are errors.
fn fill(template: &str, bindings: &BTreeMap<&'static str, String>) -> Result<String, String> {
    let mut out = String::with_capacity(template.len() + 256);

    for line in template.split_inclusive('\n') {
        let body = line.trim_end_matches(['\n', '\r']);
        let trimmed = body.trim();
        if let Some(name) = trimmed
            .strip_prefix("{{")
            .and_then(|s| s.strip_suffix("}}"))
            .filter(|s| !s.contains("{{") && !s.contains("}}"))
        {
            let value = lookup(bindings, name)?;
            if value.is_empty() {
                continue;
            }
        }

        let mut rest = line;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| format!("unterminated placeholder in line '{body}'"))?;
            out.push_str(lookup(bindings, &after[..end])?);
            rest = &after[end + 2..];
        }
        out.push_str(rest);
    }

    Ok(out)
}

fn lookup<'a>(bindings: &'a BTreeMap<&'static str, String>, name: &str) -> Result<&'a str, String> {
    let name = name.trim();
    bindings
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| format!("template references unknown binding '{name}'"))
}
