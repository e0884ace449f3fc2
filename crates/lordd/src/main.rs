//! lordd — the Lord control plane daemon.
//!
//! Assembles the control plane in one process:
//! - Configuration (TOML, defaults when absent)
//! - Container runtime (docker CLI, or in-memory with `--dry-run`)
//! - Service controller + command dispatch
//! - JSON-lines command loop on stdin/stdout
//!
//! Logs go to stderr so stdout carries replies only.
//!
//! # Usage
//!
//! ```text
//! lordd serve --config /etc/lord/lord.toml
//! lordd check-config --config /etc/lord/lord.toml
//! ```

mod serve;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lord_controller::{ControlPlane, ServiceController};
use lord_core::LordConfig;
use lord_runtime::{ContainerRuntime, DockerCli, FakeRuntime};

const DEFAULT_FILTER: &str = "info,lordd=debug,lord=debug";

#[derive(Parser)]
#[command(name = "lordd", about = "Lord control plane daemon")]
struct Cli {
    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer JSON-lines commands on stdin until end of input or Ctrl-C.
    Serve {
        /// Path to lord.toml. Built-in defaults are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Keep containers in memory instead of driving the engine.
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a config file and print it with defaults filled in.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Serve { config, dry_run } => run_serve(config.as_deref(), dry_run).await,
        Command::CheckConfig { config } => check_config(&config),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<LordConfig> {
    match path {
        Some(path) => {
            let config = LordConfig::from_file(path)?;
            info!(path = %path.display(), "config loaded");
            Ok(config)
        }
        None => {
            info!("no config given, using defaults");
            Ok(LordConfig::default())
        }
    }
}

async fn run_serve(config_path: Option<&Path>, dry_run: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    info!("Lord daemon starting");

    // ── Runtime ────────────────────────────────────────────────

    let runtime: Arc<dyn ContainerRuntime> = if dry_run {
        warn!("dry run: containers are simulated in memory");
        Arc::new(FakeRuntime::new())
    } else {
        info!(
            binary = %config.runtime.binary,
            build_context = %config.runtime.build_context.display(),
            "using container engine"
        );
        Arc::new(DockerCli::new(&config.runtime))
    };

    // ── Controller ─────────────────────────────────────────────

    let controller = Arc::new(ServiceController::new(runtime, config.limits, config.teardown));
    let plane = ControlPlane::new(controller);
    info!(
        max_instances = config.limits.max_instances,
        max_nodes = config.limits.max_nodes,
        "service controller ready"
    );

    // ── Command loop ───────────────────────────────────────────

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let answered = serve::serve_lines(
        &plane,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        shutdown,
    )
    .await?;

    info!(
        answered,
        services = plane.controller().service_count().await,
        "Lord daemon stopped"
    );
    Ok(())
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = LordConfig::from_file(path)?;
    print!("{}", config.to_toml_string()?);
    info!(path = %path.display(), "config is valid");
    Ok(())
}
