pub mod config;
pub mod core;
pub mod history;
pub mod providers;
pub mod server;
pub mod ui;

use crate::config::AppConfig;
use crate::core::{FetchContext, normalize};
use crate::history::HistoryService;
use crate::providers::{HttpDocumentFetcher, XRatesProvider};
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HistoryRequest {
    pub from: String,
    pub to: String,
    pub start_date: String,
    pub end_date: String,
    pub json: bool,
}

#[derive(Debug, Clone)]
pub enum AppCommand {
    Serve,
    History(HistoryRequest),
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("fxhistory starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    match command {
        AppCommand::Serve => serve(&config).await,
        AppCommand::History(request) => print_history(&config, &request).await,
    }
}

/// Wires the HTTP fetcher, the x-rates day provider and the range coordinator.
pub fn build_history_service(config: &AppConfig) -> Result<HistoryService> {
    let xrates = config.xrates();
    let fetcher = HttpDocumentFetcher::new(&xrates.user_agent)?
        .with_default_timeout(config.history.fetch_timeout());
    let provider = XRatesProvider::new(&xrates.base_url, Arc::new(fetcher))?;
    Ok(HistoryService::new(Arc::new(provider))
        .with_max_concurrency(config.history.max_concurrency))
}

pub async fn serve(config: &AppConfig) -> Result<()> {
    let state = server::AppState {
        history: Arc::new(build_history_service(config)?),
        request_timeout: config.history.request_timeout(),
    };
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.addr))?;
    info!("Server is starting at {}...", listener.local_addr()?);

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let mut handle = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .into_future(),
    );

    tokio::select! {
        joined = &mut handle => {
            joined??;
            return Ok(());
        }
        _ = shutdown_signal() => {}
    }

    info!("Signal received, shutting down gracefully...");
    let _ = stop_tx.send(());
    match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
        Ok(joined) => joined?.context("Could not gracefully shutdown the server")?,
        Err(_) => warn!("Graceful shutdown timed out after {:?}", SHUTDOWN_GRACE),
    }
    info!("Finished graceful shutdown");
    Ok(())
}

pub async fn print_history(config: &AppConfig, request: &HistoryRequest) -> Result<()> {
    let (range, pair) = normalize(
        &request.from,
        &request.to,
        &request.start_date,
        &request.end_date,
        Utc::now().date_naive(),
    )?;
    let history = build_history_service(config)?;

    let mut ctx = FetchContext::new();
    if let Some(timeout) = config.history.request_timeout() {
        ctx = ctx.with_timeout(timeout);
    }
    let interrupt = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctx.cancel();
            }
        })
    };

    let result = history.fetch_range(&ctx, &pair, &range).await;
    interrupt.abort();
    let rates = result.with_context(|| format!("Failed to fetch history for {pair}"))?;

    if request.json {
        println!("{}", serde_json::to_string_pretty(&rates)?);
    } else {
        println!("{}", ui::history_table(&pair, &rates));
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
