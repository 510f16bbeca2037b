/// GigHub Server
///
/// Main server entry point. Handles:
/// - Command-line argument parsing
/// - Store and push sender setup
/// - Daily cleanup scheduling
/// - HTTP server startup
use anyhow::Context;
use gighub_server::config::Config;
use gighub_server::functions::Functions;
use gighub_server::scheduler;
use gighub_server::server::{self, AppState};
use std::fs;
use std::process;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .init();

    let config = Config::from_args();

    log::info!("Starting GigHub Server");
    log::info!("Database: {:?}", config.database);
    log::info!("Port: {}", config.port);
    log::info!("Daily cleanup at {:02}:00 UTC", config.cleanup_hour);

    // Write PID file if specified
    if let Some(pidfile) = &config.pidfile {
        let pid = process::id().to_string();
        fs::write(pidfile, pid).with_context(|| format!("Failed to write PID file {:?}", pidfile))?;
        log::info!("PID file written to: {:?}", pidfile);
    }

    let store = config.open_store().context("Failed to open document store")?;
    let functions = Functions::new(store, config.push_sender());

    let tokens = config.token_map();
    if tokens.is_empty() {
        log::warn!("No auth tokens configured; triggerCleanup will reject every call");
    }

    scheduler::spawn_daily_cleanup(functions.clone(), config.cleanup_hour);

    let state = AppState::new(functions, config.retry_policy(), tokens);
    let bind_addr = config.bind_addr();
    log::info!("Starting HTTP server on {}", bind_addr);

    let http_server = server::create_http_server(state, &bind_addr)
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    http_server.await?;
    Ok(())
}
