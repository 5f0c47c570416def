mod config;

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use waypoint_agents::{AgentRegistry, FixtureAgent, FixtureStore, AGENT_SEQUENCE};
use waypoint_events::EventBus;
use waypoint_observability::{canonical_logs_dir_from_root, init_process_logging, ProcessKind};
use waypoint_server::{app_router, AppState};
use waypoint_store::CheckpointStore;

use config::EngineConfig;

const EXIT_CLEAN: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_STORE_UNAVAILABLE: u8 = 3;
const EXIT_MIGRATION_MISMATCH: u8 = 4;

/// Schema version `CanonicalState` currently writes. `migrate-check`
/// compares every stored checkpoint's `meta.schema_version` against
/// this before the server starts serving traffic against them.
const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Parser, Debug)]
#[command(name = "waypoint-engine")]
#[command(about = "Go-to-market orchestration engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Boot the HTTP/SSE server.
    Serve {
        #[arg(long, env = "WAYPOINT_HOST")]
        hostname: Option<String>,
        #[arg(long, env = "WAYPOINT_PORT")]
        port: Option<u16>,
        #[arg(long, env = "WAYPOINT_STATE_DIR")]
        state_dir: Option<String>,
    },
    /// Scan the checkpoint store for schema drift without serving traffic.
    MigrateCheck {
        #[arg(long, env = "WAYPOINT_STATE_DIR")]
        state_dir: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve {
            hostname,
            port,
            state_dir,
        } => run_serve(hostname, port, state_dir).await,
        Command::MigrateCheck { state_dir } => run_migrate_check(state_dir).await,
    }
}

async fn run_serve(hostname: Option<String>, port: Option<u16>, state_dir: Option<String>) -> ExitCode {
    let config = EngineConfig::load(hostname, port, state_dir);

    let _guard = match init_logging(&config) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("logging initialization failed: {err:#}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let addr: SocketAddr = match format!("{}:{}", config.hostname, config.port).parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, "invalid hostname or port");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let store = match CheckpointStore::open(config.state_dir.join("checkpoints")).await {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, "checkpoint store unavailable");
            return ExitCode::from(EXIT_STORE_UNAVAILABLE);
        }
    };

    if let Err(err) = check_schema_versions(&store, CURRENT_SCHEMA_VERSION).await {
        error!(error = %err, "schema migration mismatch");
        return ExitCode::from(EXIT_MIGRATION_MISMATCH);
    }

    let agents = build_agent_registry(&config.fixtures_dir);
    let events = EventBus::new();
    let state = AppState::new(agents, store, events, config.runtime.clone());
    let router = app_router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, %addr, "failed to bind listener");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    info!(%addr, state_dir = %config.state_dir.display(), "waypoint-engine listening");
    if let Err(err) = axum::serve(listener, router).await {
        error!(error = %err, "server exited with an error");
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }

    ExitCode::from(EXIT_CLEAN)
}

async fn run_migrate_check(state_dir: Option<String>) -> ExitCode {
    tracing_subscriber::fmt().with_env_filter("info").with_target(false).init();

    let config = EngineConfig::load(None, None, state_dir);
    let store = match CheckpointStore::open(config.state_dir.join("checkpoints")).await {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, "checkpoint store unavailable");
            return ExitCode::from(EXIT_STORE_UNAVAILABLE);
        }
    };

    match check_schema_versions(&store, CURRENT_SCHEMA_VERSION).await {
        Ok(()) => {
            info!("all stored checkpoints match schema version {CURRENT_SCHEMA_VERSION}");
            ExitCode::from(EXIT_CLEAN)
        }
        Err(err) => {
            error!(error = %err, "schema migration mismatch");
            ExitCode::from(EXIT_MIGRATION_MISMATCH)
        }
    }
}

async fn check_schema_versions(store: &CheckpointStore, expected: u32) -> anyhow::Result<()> {
    for run_id in store.run_ids().await {
        let latest = store.latest(&run_id).await.context("reading latest checkpoint")?;
        if latest.state.meta.schema_version != expected {
            anyhow::bail!(
                "run {run_id} stored at schema version {}, engine expects {expected}",
                latest.state.meta.schema_version,
            );
        }
    }
    Ok(())
}

fn build_agent_registry(fixtures_dir: &Path) -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    for name in AGENT_SEQUENCE.iter().filter(|name| **name != "validator") {
        let store = FixtureStore::new(fixtures_dir.to_path_buf());
        registry.register(Arc::new(FixtureAgent::new(*name, store)));
    }
    registry
}

fn init_logging(config: &EngineConfig) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let logs_dir = canonical_logs_dir_from_root(&config.state_dir);
    let (guard, info) = init_process_logging(ProcessKind::Engine, &logs_dir, 14)?;
    info!(logs_dir = %info.logs_dir, "logging initialized");
    Ok(guard)
}
