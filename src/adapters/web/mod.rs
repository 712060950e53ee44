//! Web server adapter: the JSON API behind the dashboard, plus the static
//! front-end files when a directory is configured.

mod error;
mod handlers;

pub use error::{WebError, status_from_error};
pub use handlers::*;

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::services::ServeDir;

use crate::adapters::sqlite_adapter::SqliteAdapter;
use crate::domain::error::BalancerError;
use crate::domain::settings::Settings;
use crate::ports::alert_port::AlertPort;
use crate::ports::cache_port::CachePort;
use crate::ports::market_port::MarketDataPort;

pub struct AppState {
    pub db: SqliteAdapter,
    pub market: Arc<dyn MarketDataPort + Send + Sync>,
    pub alerts: Arc<dyn AlertPort + Send + Sync>,
    pub cache: Arc<dyn CachePort + Send + Sync>,
    pub settings: Settings,
}

pub fn build_router(state: AppState) -> Router {
    let static_dir = state.settings.server.static_dir.clone();
    let router = Router::new()
        .route("/api/portfolio", get(handlers::portfolio))
        .route("/api/portfolio/summary", get(handlers::portfolio_summary))
        .route("/api/indicators", get(handlers::indicators))
        .route("/api/alerts", get(handlers::alerts))
        .route("/api/icons", get(handlers::icons))
        .route("/api/changes", get(handlers::changes))
        .route("/api/positions/update", post(handlers::update_position_handler))
        .route("/api/admin/portfolio/export", get(handlers::export_portfolio))
        .route("/api/admin/portfolio/import", post(handlers::import_portfolio))
        .route("/api/admin/portfolio/resolve", get(handlers::resolve_portfolio))
        .route("/api/dev/db", get(handlers::dev_db))
        .route("/api/data/health", get(handlers::data_health));

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router.fallback(handlers::not_found),
    };
    router.with_state(Arc::new(state))
}

/// Binds `addr` and serves until the process is stopped.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<(), BalancerError> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("listening on {addr}");
    axum::serve(listener, router).await?;
    Ok(())
}
