mod api;
mod domain;
mod notify;
mod predictors;
mod scheduler;
mod utils;
mod worker;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    utils::logging::init("info");

    let settings = match utils::config::Settings::load() {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to load settings");
            return;
        }
    };
    info!(
        db = %settings.db_path.display(),
        poll_secs = settings.poll_interval_secs,
        "sunwindow initialized"
    );

    let defaults = utils::db::UserDefaults {
        tz: settings.default_timezone.clone(),
        daily: settings.daily,
        night: settings.night,
    };
    let store = match utils::db::SqliteStore::open(&settings.db_path, defaults) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return;
        }
    };

    let addr: SocketAddr = match settings.api_addr.parse() {
        Ok(a) => a,
        Err(e) => {
            error!(error = %e, addr = %settings.api_addr, "Invalid api_addr");
            return;
        }
    };
    let state = api::server::AppState { store: store.clone(), settings: Arc::new(settings.clone()) };
    tokio::spawn(async move {
        if let Err(e) = api::server::run_server(state, addr).await {
            error!(error = %e, "API server stopped");
        }
    });

    let notifier = match notify::telegram::TelegramNotifier::new(
        &settings.telegram.api_base,
        settings.telegram.token.as_deref(),
    ) {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "Deliveries disabled; serving API only");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown");
            }
            return;
        }
    };

    tokio::select! {
        _ = worker::run_poller(store, notifier, settings) => {}
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!(error = %e, "Failed to listen for shutdown");
            }
            info!("Shutting down");
        }
    }
}
