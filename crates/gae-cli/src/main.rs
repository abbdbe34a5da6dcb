//! CLI binary for running pipelines against a graph analytics engine and
//! inspecting or cleaning up what it holds.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

use gae_client::{EngineGateway, EngineTransport, HttpTransport, Session};
use gae_pipeline::{PipelineEvent, PipelineRunner};
use gae_types::{EngineConfig, PipelineRequest, ResourceKind, WireNaming};

#[derive(Parser)]
#[command(
    name = "gae",
    version,
    about = "Load, compute, store, and clean up graph analytics engine jobs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    engine: EngineArgs,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args)]
struct EngineArgs {
    /// Base URL of the engine deployment
    #[arg(long, env = "GAE_ENGINE_URL", global = true)]
    engine_url: Option<String>,

    /// Identity endpoint that issues bearer tokens
    #[arg(long, env = "GAE_AUTH_URL", global = true)]
    auth_url: Option<String>,

    #[arg(long, env = "GAE_USERNAME", default_value = "root", global = true)]
    username: String,

    #[arg(long, env = "GAE_PASSWORD", default_value = "", hide_env_values = true, global = true)]
    password: String,

    /// Delay between job status checks
    #[arg(long, env = "GAE_POLL_INTERVAL_MS", default_value = "500", global = true)]
    poll_interval_ms: u64,

    /// Grow the poll delay exponentially up to this cap
    #[arg(long, env = "GAE_POLL_MAX_MS", global = true)]
    poll_max_ms: Option<u64>,

    /// Give up on any single job after this many seconds
    #[arg(long, env = "GAE_JOB_DEADLINE_SECS", global = true)]
    job_deadline_secs: Option<u64>,

    /// Request body field naming: snake or camel
    #[arg(long, env = "GAE_WIRE_NAMING", default_value = "snake", global = true)]
    wire_naming: WireNaming,

    /// HTTP request timeout in seconds
    #[arg(long, env = "GAE_HTTP_TIMEOUT_SECS", default_value = "60", global = true)]
    http_timeout_secs: u64,
}

impl EngineArgs {
    fn to_config(&self) -> anyhow::Result<EngineConfig> {
        let engine_url = self
            .engine_url
            .clone()
            .context("--engine-url (or GAE_ENGINE_URL) is required")?;
        let auth_url = self
            .auth_url
            .clone()
            .context("--auth-url (or GAE_AUTH_URL) is required")?;

        let mut config = EngineConfig::new(engine_url, auth_url, &self.username, &self.password)
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_wire_naming(self.wire_naming);
        if let Some(max) = self.poll_max_ms {
            config = config.with_poll_interval_max(Duration::from_millis(max));
        }
        if let Some(secs) = self.job_deadline_secs {
            config = config.with_job_deadline(Duration::from_secs(secs));
        }
        config.validate()?;
        Ok(config)
    }

    fn transport(&self) -> anyhow::Result<Arc<dyn EngineTransport>> {
        let transport = HttpTransport::with_timeout(Duration::from_secs(self.http_timeout_secs))?;
        Ok(Arc::new(transport))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline described by a JSON request file
    Run {
        /// Path to the pipeline request .json file
        request: PathBuf,

        /// Cancel outstanding waits after this many seconds; cleanup still runs
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Print per-job progress as it is observed
        #[arg(long)]
        progress: bool,
    },

    /// Check a pipeline request file without contacting the engine
    Validate {
        /// Path to the pipeline request .json file
        request: PathBuf,
    },

    /// Show the engine version and supported API range
    Version,

    /// List jobs known to the engine
    Jobs {
        #[arg(long)]
        json: bool,
    },

    /// List graphs loaded in the engine
    Graphs {
        #[arg(long)]
        json: bool,
    },

    /// Delete a job left behind by an earlier run
    DeleteJob { id: u64 },

    /// Delete a graph left behind by an earlier run
    DeleteGraph { id: u64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    match cli.command {
        Commands::Run {
            request,
            timeout_secs,
            progress,
        } => {
            let code = cmd_run(&cli.engine, &request, timeout_secs, progress).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Validate { request } => {
            cmd_validate(&request)?;
        }
        Commands::Version => {
            cmd_version(&cli.engine).await?;
        }
        Commands::Jobs { json } => {
            cmd_jobs(&cli.engine, json).await?;
        }
        Commands::Graphs { json } => {
            cmd_graphs(&cli.engine, json).await?;
        }
        Commands::DeleteJob { id } => {
            cmd_delete(&cli.engine, ResourceKind::Job, id).await?;
        }
        Commands::DeleteGraph { id } => {
            cmd_delete(&cli.engine, ResourceKind::Graph, id).await?;
        }
    }

    Ok(())
}

fn load_request(path: &Path) -> anyhow::Result<PipelineRequest> {
    let request = PipelineRequest::load(path)
        .with_context(|| format!("failed to read pipeline request {}", path.display()))?;
    Ok(request)
}

fn cmd_validate(path: &Path) -> anyhow::Result<()> {
    let request = load_request(path)?;
    request.validate()?;

    println!("Request is valid");
    println!("Database: {}", request.database);
    println!("Vertex collections: {}", request.vertex_collections.join(", "));
    println!("Edge collections: {}", request.edge_collections.join(", "));
    println!("Target collection: {}", request.target_collection);
    println!("\nAlgorithms:");
    for spec in &request.algorithms {
        println!("  {} -> {}", spec.name, spec.attribute_name());
    }
    Ok(())
}

async fn cmd_run(
    args: &EngineArgs,
    path: &Path,
    timeout_secs: Option<u64>,
    progress: bool,
) -> anyhow::Result<i32> {
    let request = load_request(path)?;
    let config = args.to_config()?;
    let cancel = CancellationToken::new();

    let runner = PipelineRunner::new(config, args.transport()?).with_cancellation(cancel.clone());

    if progress {
        let rx = runner.events().subscribe();
        tokio::spawn(follow_progress(rx, |line| println!("{line}")));
    }

    // Ctrl-C or the run timeout only abort waiting; teardown always follows.
    let watchdog = cancel.clone();
    tokio::spawn(async move {
        let deadline = async {
            match timeout_secs {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::warn!("Interrupted; cancelling run"),
            _ = deadline => tracing::warn!("Run timeout reached; cancelling run"),
            _ = watchdog.cancelled() => return,
        }
        watchdog.cancel();
    });

    println!("Running pipeline: {}", path.display());
    println!("Database: {}", request.database);
    println!(
        "Algorithms: {}",
        request
            .algorithms
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let report = runner.run(&request).await;
    cancel.cancel();

    println!();
    print!("{report}");
    Ok(report.exit_code())
}

/// Console line for the events worth showing while a run is in flight.
fn progress_line(event: &PipelineEvent) -> Option<String> {
    match event {
        PipelineEvent::StageStarted { stage } => Some(format!("== {stage}")),
        PipelineEvent::JobProgress {
            job,
            progress,
            total,
        } => Some(format!("   job {} ({}): {}/{}", job.id, job.kind, progress, total)),
        _ => None,
    }
}

/// Print progress until the run finishes. A slow console skips the events it
/// missed rather than going quiet.
async fn follow_progress(
    mut rx: broadcast::Receiver<PipelineEvent>,
    mut print: impl FnMut(String),
) {
    loop {
        match rx.recv().await {
            Ok(PipelineEvent::RunFinished { .. }) => break,
            Ok(event) => {
                if let Some(line) = progress_line(&event) {
                    print(line);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Progress output fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn connect(args: &EngineArgs) -> anyhow::Result<EngineGateway> {
    let config = args.to_config()?;
    let transport = args.transport()?;
    let credential = Session::new(transport.clone()).acquire_for(&config).await?;
    Ok(EngineGateway::new(transport, &config, credential))
}

async fn cmd_version(args: &EngineArgs) -> anyhow::Result<()> {
    let gateway = connect(args).await?;
    let version = gateway.version().await?;

    println!("Engine version: {}", version.version);
    if let (Some(min), Some(max)) = (version.api_min_version, version.api_max_version) {
        println!("API versions: {min}..={max}");
    }
    Ok(())
}

async fn cmd_jobs(args: &EngineArgs, json: bool) -> anyhow::Result<()> {
    let jobs = connect(args).await?.list_jobs().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    if jobs.is_empty() {
        println!("No jobs");
        return Ok(());
    }
    println!("{:>10}  {:>10}  {:<20}  {:>12}  {}", "JOB", "GRAPH", "TYPE", "PROGRESS", "STATE");
    for job in &jobs {
        let graph = job.graph_id.map(|g| g.to_string()).unwrap_or_else(|| "-".into());
        let total = job.total.map(|t| t.to_string()).unwrap_or_else(|| "?".into());
        let state = if job.failed {
            "failed"
        } else if job.total.is_some_and(|t| job.progress >= t) {
            "done"
        } else {
            "running"
        };
        println!(
            "{:>10}  {:>10}  {:<20}  {:>12}  {}",
            job.job_id,
            graph,
            job.comp_type.as_deref().unwrap_or("-"),
            format!("{}/{}", job.progress, total),
            state
        );
    }
    Ok(())
}

async fn cmd_graphs(args: &EngineArgs, json: bool) -> anyhow::Result<()> {
    let graphs = connect(args).await?.list_graphs().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&graphs)?);
        return Ok(());
    }

    if graphs.is_empty() {
        println!("No graphs");
        return Ok(());
    }
    let show = |v: Option<u64>| v.map(|n| n.to_string()).unwrap_or_else(|| "-".into());
    println!("{:>10}  {:>14}  {:>14}  {:>14}", "GRAPH", "VERTICES", "EDGES", "MEMORY");
    for graph in &graphs {
        println!(
            "{:>10}  {:>14}  {:>14}  {:>14}",
            graph.graph_id,
            show(graph.number_of_vertices),
            show(graph.number_of_edges),
            show(graph.memory_usage)
        );
    }
    Ok(())
}

async fn cmd_delete(args: &EngineArgs, kind: ResourceKind, id: u64) -> anyhow::Result<()> {
    connect(args).await?.remove(kind, id).await?;
    println!("Deleted {kind} {id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["gae"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn engine_args_build_config() {
        let cli = parse(&[
            "--engine-url",
            "http://engine:8829",
            "--auth-url",
            "http://db:8529/_open/auth",
            "--poll-interval-ms",
            "250",
            "--poll-max-ms",
            "4000",
            "--job-deadline-secs",
            "600",
            "--wire-naming",
            "camel",
            "version",
        ]);
        let config = cli.engine.to_config().unwrap();
        assert_eq!(config.engine_url, "http://engine:8829");
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.poll_interval_max, Some(Duration::from_millis(4000)));
        assert_eq!(config.job_deadline, Some(Duration::from_secs(600)));
        assert_eq!(config.wire_naming, WireNaming::Camel);
        assert_eq!(config.username, "root");
    }

    #[test]
    fn global_args_accepted_after_subcommand() {
        let cli = parse(&["delete-graph", "12", "--engine-url", "http://e", "--auth-url", "http://a"]);
        assert!(matches!(cli.command, Commands::DeleteGraph { id: 12 }));
        assert!(cli.engine.to_config().is_ok());
    }

    #[test]
    fn unknown_wire_naming_is_rejected() {
        let argv = ["gae", "--wire-naming", "kebab", "version"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn load_request_reads_json_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "database": "imdb",
                "vertex_collections": ["Movie"],
                "edge_collections": ["Acted"],
                "algorithms": [{{"name": "wcc"}}, {{"name": "pagerank", "attribute": "rank"}}],
                "target_collection": "results"
            }}"#
        )
        .unwrap();

        let request = load_request(file.path()).unwrap();
        request.validate().unwrap();
        assert_eq!(request.vertex_attributes, vec!["_id"]);
        assert_eq!(request.load.parallelism, 10);
        assert_eq!(request.algorithms[1].attribute_name(), "rank");
    }

    fn job_progress(id: u64, progress: u64) -> PipelineEvent {
        PipelineEvent::JobProgress {
            job: gae_types::JobHandle::new(id, gae_types::JobKind::Load),
            progress,
            total: 100,
        }
    }

    #[test]
    fn progress_lines_cover_stages_and_jobs() {
        assert_eq!(
            progress_line(&PipelineEvent::StageStarted {
                stage: gae_types::Stage::Compute
            })
            .as_deref(),
            Some("== compute")
        );
        assert_eq!(
            progress_line(&job_progress(1, 40)).as_deref(),
            Some("   job 1 (load): 40/100")
        );
        assert!(progress_line(&PipelineEvent::RunFinished {
            run_id: "r".into(),
            outcome: "done".into(),
            duration_ms: 1,
        })
        .is_none());
    }

    #[tokio::test]
    async fn progress_keeps_printing_after_falling_behind() {
        let events = gae_pipeline::EventEmitter::new(2);
        let rx = events.subscribe();
        for stage in [
            gae_types::Stage::Validate,
            gae_types::Stage::Authenticate,
            gae_types::Stage::Load,
        ] {
            events.emit(PipelineEvent::StageStarted { stage });
        }
        events.emit(job_progress(1, 90));
        events.emit(PipelineEvent::RunFinished {
            run_id: "r".into(),
            outcome: "done".into(),
            duration_ms: 1,
        });

        let mut lines = Vec::new();
        follow_progress(rx, |line| lines.push(line)).await;
        assert_eq!(lines, vec!["   job 1 (load): 90/100".to_string()]);
    }

    #[tokio::test]
    async fn progress_stops_when_events_close() {
        let events = gae_pipeline::EventEmitter::new(8);
        let rx = events.subscribe();
        events.emit(job_progress(2, 10));
        drop(events);

        let mut lines = Vec::new();
        follow_progress(rx, |line| lines.push(line)).await;
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn load_request_reports_path_on_error() {
        let err = load_request(Path::new("/nonexistent/request.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/request.json"));
    }
}
