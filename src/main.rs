mod main_runtime;

use anyhow::{anyhow, Context};
use clap::Parser;
use dexflow::adapters::{OrderStore, PostgresStore};
use dexflow::api::{create_router, AppState};
use dexflow::config::AppConfig;
use dexflow::coordination::{install_signal_handlers, GracefulShutdown, ShutdownPhase, ShutdownSignal};
use dexflow::exchange::build_venues;
use dexflow::execution::{recover_unfinished, ExecutionEngine, JobQueue};
use dexflow::services::{PushRegistry, QuoteRouter};
use main_runtime::init_logging;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Duration;
use tracing::{error, info, warn};

/// How long the HTTP server gets to close connections after the last push
/// handle is closed
const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "dexflow", version, about = "Swap-order execution service")]
struct Cli {
    /// Directory holding default.toml and per-environment overrides
    #[arg(long, env = "DEXFLOW_CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Override server.port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match AppConfig::load_from(&cli.config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let _log_guard = init_logging(&config.logging);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("Invalid configuration: {}", e);
        }
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => {
            info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Fatal: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    // Store
    let postgres = PostgresStore::new(
        &config.database.url,
        config.database.max_connections,
        config.database.require_tls,
    )
    .await
    .context("connecting to the order store")?;
    postgres.migrate().await.context("running migrations")?;
    let store: Arc<dyn OrderStore> = Arc::new(postgres);

    // Pipeline
    let venues = build_venues(&config.venues).context("building venue adapters")?;
    let router = Arc::new(QuoteRouter::new(venues));
    info!(venues = ?router.venues(), "Quote router ready");
    let push = PushRegistry::new();
    let queue = JobQueue::new(config.queue.clone());
    let engine = Arc::new(ExecutionEngine::new(
        store.clone(),
        router,
        push.clone(),
        config.engine.clone(),
    ));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    let shutdown = Arc::new(GracefulShutdown::new());
    install_signal_handlers(shutdown.clone());

    let dispatcher = queue.start(engine, shutdown.token());
    let recovered = recover_unfinished(store.as_ref(), &queue)
        .await
        .context("recovering unfinished orders")?;
    info!(recovered, "Job queue running");

    let app = create_router(AppState::new(store, queue.clone(), push.clone()));
    let mut server_token = shutdown.token();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                server_token.wait_for_shutdown().await;
            })
            .await
    });
    info!("Listening on {}", addr);

    let mut token = shutdown.token();
    let signal = tokio::select! {
        signal = token.wait_for_shutdown() => signal,
        result = &mut server => {
            result.context("HTTP server task failed")??;
            return Err(anyhow!("HTTP server stopped unexpectedly"));
        }
    };

    shutdown.set_phase(ShutdownPhase::StoppingIngress);
    if let Err(e) = dispatcher.await {
        warn!("Job dispatcher ended abnormally: {}", e);
    }

    if signal == ShutdownSignal::Graceful {
        shutdown.set_phase(ShutdownPhase::DrainingJobs);
        queue.drain(config.queue.drain_timeout()).await;
    }

    let closed = push.close_all().await;
    if closed > 0 {
        info!(closed, "Closed remaining order connections");
    }
    match tokio::time::timeout(SERVER_STOP_TIMEOUT, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!("HTTP server error during shutdown: {}", e),
        Ok(Err(e)) => warn!("HTTP server task failed: {}", e),
        Err(_) => warn!("HTTP server did not stop within {:?}", SERVER_STOP_TIMEOUT),
    }

    let stats = queue.stats().await;
    info!(
        waiting = stats.waiting,
        completed = stats.completed,
        failed = stats.failed,
        "Unstarted jobs remain in the store for the next run"
    );
    shutdown.set_phase(ShutdownPhase::Complete);
    Ok(())
}
