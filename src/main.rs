//! `hpc-orchestrator` command line.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use hpc_orchestrator::{
    ClusterTopology, EngineConfig, JobFilter, JobHandle, JobId, JobRequest, JobSpec, JobState,
    ScriptRenderer, SlurmScheduler, Tracker,
};

/// Generate, submit, and monitor parallel jobs on a Slurm cluster
#[derive(Parser, Debug)]
#[command(name = "hpc-orchestrator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generate, submit, and monitor MPI / OpenMP / PGAS jobs")]
struct Cli {
    /// Engine configuration (tool commands, results directory, timeouts)
    #[arg(short, long, global = true, env = "HPC_ORCHESTRATOR_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the batch script for a job request without submitting it
    Render(JobFiles),

    /// Submit a job request
    Submit {
        #[command(flatten)]
        files: JobFiles,

        /// Wait for the job to finish and print its output
        #[arg(long)]
        wait: bool,

        /// Give up waiting after this long (e.g. 30m, 2h)
        #[arg(long, default_value = "24h", value_parser = humantime::parse_duration)]
        timeout: Duration,
    },

    /// Query a job's state once
    Status(JobRef),

    /// Poll a job until it finishes or the timeout elapses
    Wait {
        #[command(flatten)]
        job: NamedJob,

        /// Give up waiting after this long; the job keeps running
        #[arg(long, default_value = "24h", value_parser = humantime::parse_duration)]
        timeout: Duration,

        /// Override the configured poll interval
        #[arg(long, value_parser = humantime::parse_duration)]
        poll_interval: Option<Duration>,
    },

    /// Cancel a pending or running job
    Cancel(JobRef),

    /// List jobs known to the scheduler
    List {
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        partition: Option<String>,
        #[arg(long)]
        name: Option<String>,
        /// Only jobs in these states (repeatable)
        #[arg(long = "state", value_parser = parse_state)]
        states: Vec<JobState>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print a job's captured stdout and stderr
    Output(NamedJob),
}

#[derive(Args, Debug)]
struct JobFiles {
    /// Cluster topology document
    #[arg(long, env = "HPC_ORCHESTRATOR_CLUSTER", value_name = "FILE")]
    cluster: PathBuf,

    /// Job request document
    #[arg(value_name = "JOB")]
    job: PathBuf,
}

#[derive(Args, Debug)]
struct JobRef {
    /// Scheduler job ID
    job_id: String,

    /// Job name, for log messages only
    #[arg(long)]
    name: Option<String>,
}

impl JobRef {
    fn handle(
        self,
        tracker: &Tracker<SlurmScheduler>,
        renderer: &ScriptRenderer,
    ) -> Result<JobHandle> {
        let name = self.name.unwrap_or_else(|| self.job_id.clone());
        Ok(tracker.reattach(renderer, &name, JobId::new(self.job_id))?)
    }
}

/// A job whose output files are needed.
#[derive(Args, Debug)]
struct NamedJob {
    /// Scheduler job ID
    job_id: String,

    /// Job name as submitted; output files are `{name}_{job_id}.out` / `.err`
    #[arg(long)]
    name: String,
}

impl NamedJob {
    fn handle(
        self,
        tracker: &Tracker<SlurmScheduler>,
        renderer: &ScriptRenderer,
    ) -> Result<JobHandle> {
        Ok(tracker.reattach(renderer, &self.name, JobId::new(self.job_id))?)
    }
}

fn parse_state(s: &str) -> Result<JobState, String> {
    match JobState::from_scheduler(s, None) {
        JobState::Unknown if !s.eq_ignore_ascii_case("unknown") => {
            Err(format!("unknown job state '{s}'"))
        }
        state => Ok(state),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let renderer = ScriptRenderer::new(&config)?;
    let tracker = Tracker::new(SlurmScheduler::from_config(&config), &config);

    match cli.command {
        Command::Render(files) => {
            let spec = build_spec(&files)?;
            print!("{}", renderer.render(&spec)?.text);
        }
        Command::Submit {
            files,
            wait,
            timeout,
        } => {
            let spec = build_spec(&files)?;
            let handle = tracker.submit(renderer.render(&spec)?).await?;
            println!("{}", handle.job_id);
            if wait {
                return wait_and_report(&tracker, &handle, tracker.poll_interval(), timeout).await;
            }
        }
        Command::Status(job) => {
            let handle = job.handle(&tracker, &renderer)?;
            println!("{}", tracker.poll(&handle).await);
        }
        Command::Wait {
            job,
            timeout,
            poll_interval,
        } => {
            let handle = job.handle(&tracker, &renderer)?;
            let interval = poll_interval.unwrap_or(tracker.poll_interval());
            return wait_and_report(&tracker, &handle, interval, timeout).await;
        }
        Command::Cancel(job) => {
            let handle = job.handle(&tracker, &renderer)?;
            if !tracker.cancel(&handle).await {
                warn!(job_id = %handle.job_id, "job was not cancelled");
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::List {
            user,
            partition,
            name,
            states,
            json,
        } => {
            let filter = JobFilter {
                user,
                partition,
                job_name: name,
                states,
            };
            let jobs = tracker.list_jobs(Some(&filter)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
            } else {
                for job in jobs {
                    println!(
                        "{:<10} {:<24} {:<11} {}",
                        job.job_id,
                        job.job_name,
                        job.state,
                        job.partition.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        Command::Output(job) => {
            let handle = job.handle(&tracker, &renderer)?;
            print_output(&tracker, &handle).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn build_spec(files: &JobFiles) -> Result<JobSpec> {
    let topology = ClusterTopology::load(&files.cluster)?;
    let text = std::fs::read_to_string(&files.job)
        .with_context(|| format!("reading job request {}", files.job.display()))?;
    let request = JobRequest::from_yaml_str(&text)?;
    Ok(JobSpec::build(&request, &topology)?)
}

async fn wait_and_report(
    tracker: &Tracker<SlurmScheduler>,
    handle: &JobHandle,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<ExitCode> {
    let outcome = tracker.wait(handle, poll_interval, timeout).await?;
    println!("{} {}", handle.job_id, outcome.state);
    if outcome.state.is_terminal() {
        print_output(tracker, handle).await?;
    }
    Ok(if outcome.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn print_output(tracker: &Tracker<SlurmScheduler>, handle: &JobHandle) -> Result<()> {
    let output = tracker.output(handle).await?;
    match output.stdout {
        Some(text) => print!("{text}"),
        None => warn!(path = %handle.output_path.display(), "no stdout captured yet"),
    }
    if let Some(text) = output.stderr.filter(|t| !t.is_empty()) {
        eprint!("{text}");
    }
    Ok(())
}
