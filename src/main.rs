//! Reconciler CLI - probe, strategy and compatibility checks plus the retention cleaner

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use reconciler::compat::UpgradeDecision;
use reconciler::config::SchedulerConfig;
use reconciler::{DEFAULT_PROGRESS_INTERVAL, DEFAULT_PROGRESS_TIMEOUT};
use reconciler_common::kube_utils::create_client;
use reconciler_common::poll::PollOutcome;
use reconciler_common::telemetry::{init_telemetry, TelemetryConfig};
use reconciler_kube::{
    ClusterReader, KubeReader, ProgressConfig, ProgressTracker, ReadinessProbe, ResourceRef,
    TargetState, UpdateStrategyResolver,
};
use reconciler_scheduler::{Cleaner, ClusterStatusTransition, MemoryStore};

/// Reconciler - cluster reconciliation engine
#[derive(Parser, Debug)]
#[command(name = "reconciler", version, about, long_about = None)]
struct Cli {
    /// Emit JSON log lines
    #[arg(long, global = true, env = "RECONCILER_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check whether the live resource of a manifest is ready
    Probe(ProbeArgs),

    /// Print how the resource of a manifest would be applied (Skip, Patch or Replace)
    Strategy(StrategyArgs),

    /// Decide how to move an installed component version to a desired one
    Compat(CompatArgs),

    /// Run the retention cleaner on an in-memory store until interrupted
    Cleaner(CleanerArgs),
}

/// Cluster connection arguments
#[derive(Parser, Debug)]
struct ClusterArgs {
    /// Path to the kubeconfig (defaults to the in-cluster or local config)
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Manifest (YAML or JSON) naming the resource
    #[arg(short = 'f', long = "filename")]
    manifest: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Target {
    Ready,
    Terminated,
}

impl From<Target> for TargetState {
    fn from(target: Target) -> Self {
        match target {
            Target::Ready => TargetState::Ready,
            Target::Terminated => TargetState::Terminated,
        }
    }
}

/// Probe arguments
#[derive(Parser, Debug)]
struct ProbeArgs {
    #[command(flatten)]
    cluster: ClusterArgs,

    /// Poll until the target state is reached instead of checking once
    #[arg(long)]
    wait: bool,

    /// State to wait for
    #[arg(long, value_enum, default_value = "ready")]
    target: Target,

    /// Maximum time to wait (e.g. "5m")
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Time between polls (e.g. "5s")
    #[arg(long, value_parser = humantime::parse_duration)]
    interval: Option<Duration>,
}

/// Strategy arguments
#[derive(Parser, Debug)]
struct StrategyArgs {
    #[command(flatten)]
    cluster: ClusterArgs,
}

/// Compat arguments
#[derive(Parser, Debug)]
struct CompatArgs {
    /// Installed version (empty if nothing is installed)
    actual: String,

    /// Desired version
    desired: String,
}

/// Cleaner arguments
#[derive(Parser, Debug)]
struct CleanerArgs {
    /// Path to the scheduler configuration file
    #[arg(short = 'c', long = "config", env = "RECONCILER_CONFIG")]
    config_file: PathBuf,

    /// Override the time between purge passes (e.g. "30m")
    #[arg(long, env = "RECONCILER_CLEANER_INTERVAL", value_parser = humantime::parse_duration)]
    cleaner_interval: Option<Duration>,

    /// Override the retention of reconciliation records (e.g. "168h")
    #[arg(long, env = "RECONCILER_PURGE_OLDER_THAN", value_parser = humantime::parse_duration)]
    purge_older_than: Option<Duration>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut telemetry = TelemetryConfig::default();
    telemetry.json |= cli.log_json;
    init_telemetry(telemetry)?;

    match cli.command {
        Commands::Probe(args) => run_probe(args).await,
        Commands::Strategy(args) => run_strategy(args).await,
        Commands::Compat(args) => run_compat(args),
        Commands::Cleaner(args) => run_cleaner(args).await,
    }
}

/// Read the manifest and connect to its cluster
async fn connect(args: &ClusterArgs) -> anyhow::Result<(Arc<dyn ClusterReader>, ResourceRef)> {
    let resource = read_resource(&args.manifest).await?;
    let client = create_client(args.kubeconfig.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;
    Ok((Arc::new(KubeReader::new(client)), resource))
}

async fn read_resource(path: &Path) -> anyhow::Result<ResourceRef> {
    let manifest = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read manifest {:?}: {}", path, e))?;
    Ok(ResourceRef::from_manifest(&manifest)?)
}

async fn run_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let (client, resource) = connect(&args.cluster).await?;

    if !args.wait {
        let ready = ReadinessProbe::new(client).is_ready(&resource).await?;
        println!("{}: {}", resource, if ready { "ready" } else { "not ready" });
        return Ok(());
    }

    let config = ProgressConfig {
        interval: args.interval.unwrap_or(DEFAULT_PROGRESS_INTERVAL),
        timeout: args.timeout.unwrap_or(DEFAULT_PROGRESS_TIMEOUT),
    };
    let mut tracker = ProgressTracker::new(client, config)?;
    tracker.add_resource(resource.clone());

    let cancel = cancel_on_ctrl_c();
    match tracker.watch(args.target.into(), &cancel).await? {
        PollOutcome::Met => println!("{}: {:?}", resource, args.target),
        PollOutcome::Cancelled => println!("{}: interrupted", resource),
    }
    Ok(())
}

async fn run_strategy(args: StrategyArgs) -> anyhow::Result<()> {
    let (client, resource) = connect(&args.cluster).await?;
    let strategy = UpdateStrategyResolver::new(client).resolve(&resource).await?;
    println!("{}", strategy);
    Ok(())
}

fn run_compat(args: CompatArgs) -> anyhow::Result<()> {
    let decision = UpgradeDecision::decide(Some(args.actual.as_str()), &args.desired)?;
    println!("{}", decision);
    Ok(())
}

async fn run_cleaner(args: CleanerArgs) -> anyhow::Result<()> {
    let config = SchedulerConfig::load(&args.config_file)
        .await?
        .with_overrides(args.cleaner_interval, args.purge_older_than)?;

    let store = Arc::new(MemoryStore::new());
    let transition = ClusterStatusTransition::new(store.clone(), store.clone(), store);
    let cleaner = Cleaner::for_transition(&transition);

    let cancel = cancel_on_ctrl_c();
    cleaner.run(&config.cleaner, cancel).await?;
    info!("cleaner stopped");
    Ok(())
}

/// Token cancelled on the first Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl-C, shutting down"),
            Err(e) => warn!(error = %e, "failed to listen for Ctrl-C, shutting down"),
        }
        token.cancel();
    });
    cancel
}
