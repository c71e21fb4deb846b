use brieflock::config::Config;
use brieflock::http::{self, AppState};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "brieflock", version = env!("CARGO_PKG_VERSION"), about = env!("CARGO_PKG_DESCRIPTION"))]
struct Cli {
    /// Path to a TOML config file, layered over built-in defaults and
    /// environment overrides (spec §6).
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (prep stream, day-prep, purpose, cron endpoints).
    Server,
    /// Run the unattended scheduler loop without the HTTP surface.
    Scheduler,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    brieflock::logging::init(config.server.dev_mode);

    let state = AppState::build(&config).await?;
    let cancel = CancellationToken::new();

    match cli.command {
        Command::Server => run_server(state, &config, cancel).await,
        Command::Scheduler => run_scheduler_only(state, cancel).await,
    }
}

async fn run_server(state: AppState, config: &Config, cancel: CancellationToken) -> anyhow::Result<()> {
    let scheduler = state.scheduler.clone();
    let scheduler_cancel = cancel.clone();
    let scheduler_task = tokio::spawn(async move { scheduler.run(scheduler_cancel).await });

    let app = http::build_router(state);
    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "brieflock server listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(cancel.clone()));
    let result = server.await;
    cancel.cancel();
    let _ = scheduler_task.await;
    result.map_err(Into::into)
}

async fn run_scheduler_only(state: AppState, cancel: CancellationToken) -> anyhow::Result<()> {
    tracing::info!("brieflock scheduler starting (no HTTP surface)");
    let scheduler = Arc::clone(&state.scheduler);
    tokio::select! {
        _ = scheduler.run(cancel.clone()) => {}
        _ = shutdown_signal(cancel) => {}
    }
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    cancel.cancel();
}
