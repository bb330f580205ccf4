use crate::{logging, tui};
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use stet_core::config::{AppPaths, Credentials};
use stet_core::lockfile::InstanceLock;
use stet_core::{Store, clock};
use stet_providers::{
    OAuthManager, OuraClient, OuraExchange, PlantaClient, PlantaExchange, TokenStore,
};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod args;
#[cfg(test)]
mod tests;

use args::Cli;

const LOG_BUFFER_ENTRIES: usize = 200;
const DEFAULT_LOG_FILTER: &str = "info";
const RUNTIME_SHUTDOWN: Duration = Duration::from_secs(1);

pub fn run() -> anyhow::Result<()> {
    // Must happen while the process is still single-threaded.
    clock::init_local_offset();
    let dotenv = dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let paths = AppPaths::resolve(cli.data_dir.clone())?;
    std::fs::create_dir_all(paths.data_dir()).with_context(|| {
        format!(
            "failed to create data directory {}",
            paths.data_dir().display()
        )
    })?;
    let _lock = InstanceLock::acquire(&paths.lock_file())?;

    let log_buffer = logging::LogBuffer::new(LOG_BUFFER_ENTRIES);
    let _guard = init_tracing(&paths, cli.log_level.as_deref(), log_buffer.clone())?;
    info!(
        data_dir = %paths.data_dir().display(),
        dotenv = ?dotenv,
        "Starting stet"
    );

    let store = Store::open(&paths.database()).context("failed to open the local database")?;
    let credentials = Credentials::from_env();
    if credentials.oura_client_id.is_none() || credentials.oura_client_secret.is_none() {
        warn!("Oura credentials not configured");
    }
    if credentials.planta_app_code.is_none() {
        warn!("Planta app code not configured");
    }
    let (oura, planta) = build_clients(&paths, credentials)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("stet-worker")
        .build()
        .context("failed to start async runtime")?;
    let result = tui::run_tui(runtime.handle().clone(), store, oura, planta, log_buffer);
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN);
    info!("Shut down");
    result
}

fn init_tracing(
    paths: &AppPaths,
    log_level: Option<&str>,
    log_buffer: logging::LogBuffer,
) -> anyhow::Result<WorkerGuard> {
    let filter = log_filter(log_level)?;
    let file_name = paths
        .log_file()
        .file_name()
        .map(|name| name.to_os_string())
        .context("log file path has no file name")?;
    let appender = tracing_appender::rolling::never(paths.data_dir(), file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .with(logging::LogLayer::new(log_buffer))
        .init();
    Ok(guard)
}

/// `--log-level` wins over `RUST_LOG`, which wins over the default.
fn log_filter(log_level: Option<&str>) -> anyhow::Result<EnvFilter> {
    match log_level {
        Some(level) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log filter '{level}'")),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))),
    }
}

fn build_clients(
    paths: &AppPaths,
    credentials: Credentials,
) -> anyhow::Result<(OuraClient, PlantaClient)> {
    let http = stet_providers::http_client()?;
    let oura_auth = OAuthManager::new(
        OuraExchange::new(credentials.oura_client_id, credentials.oura_client_secret),
        TokenStore::new(paths.oura_tokens()),
        http.clone(),
    );
    let planta_auth = OAuthManager::new(
        PlantaExchange::new(credentials.planta_app_code.clone()),
        TokenStore::new(paths.planta_tokens()),
        http,
    );
    Ok((
        OuraClient::new(oura_auth),
        PlantaClient::new(planta_auth, credentials.planta_app_code),
    ))
}
