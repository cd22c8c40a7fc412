//! syncpatch-server - coordinator for real-time, offline-capable JSON
//! document synchronization.
//!
//! Provides HTTP and WebSocket endpoints implementing the four-RPC wire
//! contract (`getDoc`, `getChangesSince`, `commitChanges`, `deleteDoc`)
//! plus subscribe/unsubscribe and the `syncpatch-core` OT/LWW algorithms'
//! server half, backed by Postgres.

mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod routes;
mod websocket;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use syncpatch_core::branch_manager::BranchManager;
use syncpatch_core::lock::DocLock;
use syncpatch_core::lww::LwwCoordinator;
use syncpatch_core::ot::OtCoordinator;

use crate::config::Config;
use crate::db::{Pool, PgLwwServerStore, PgOtServerStore};
use crate::websocket::ConnectionManager;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub config: Arc<Config>,
    pub ot: Arc<OtCoordinator<PgOtServerStore>>,
    pub lww: Arc<LwwCoordinator<PgLwwServerStore>>,
    /// Owns an independent `OtCoordinator` over the same store/pool as
    /// `ot` — merging is just another `commitChanges` onto the source
    /// document, and `OtCoordinator` carries no state beyond its store
    /// and config, so two instances over the same Postgres pool are
    /// interchangeable.
    pub branches: Arc<BranchManager<PgOtServerStore>>,
    pub doc_lock: Arc<DocLock>,
    pub conn_manager: Arc<ConnectionManager>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "syncpatch_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting syncpatch-server on {}:{}", config.host, config.port);

    let pool = db::create_pool(&config.database_url).await?;

    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    let ot_store = PgOtServerStore::new(pool.clone());
    let lww_store = PgLwwServerStore::new(pool.clone());
    let branch_store = PgOtServerStore::new(pool.clone());

    let ot = Arc::new(OtCoordinator::new(ot_store, config.ot_coordinator_config()));
    let lww = Arc::new(LwwCoordinator::new(lww_store, config.lww_coordinator_config()));
    let branches = Arc::new(BranchManager::new(OtCoordinator::new(branch_store, config.ot_coordinator_config())));

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        ot,
        lww,
        branches,
        doc_lock: Arc::new(DocLock::new()),
        conn_manager: ConnectionManager::new_shared(),
    };

    let app = Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
