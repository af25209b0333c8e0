use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::auth::{self, Sessions};
use crate::config::Config;
use crate::error::Result;
use crate::replay;
use crate::sheets::{GoogleSheets, SheetsApi};
use crate::storage::{MemStorage, Storage};
use crate::sync;

/// Shared state handed to every handler.
pub struct AppState {
    pub store: Arc<dyn Storage>,
    pub sessions: Sessions,
    pub sheets: Arc<dyn SheetsApi>,
    pub config: Config,
}

impl AppState {
    pub fn new(store: Arc<dyn Storage>, sheets: Arc<dyn SheetsApi>, config: Config) -> Self {
        Self {
            store,
            sessions: Sessions::new(config.session_ttl()),
            sheets,
            config,
        }
    }
}

/// Build the full router: `/api` plus the web client as a fallback.
pub fn build_router(state: Arc<AppState>) -> Router {
    let gate = middleware::from_fn_with_state(state.clone(), auth::require_admin);

    let public = Router::new()
        .route("/login", post(auth::handle_login))
        .route("/logout", post(auth::handle_logout))
        .route("/auth-status", get(auth::auth_status))
        .route("/admin/verify", post(auth::handle_verify))
        .route(
            "/volunteers",
            get(api::list_volunteers).post(api::create_volunteer),
        )
        .route(
            "/volunteers/:id",
            get(api::get_volunteer).patch(api::update_volunteer),
        )
        .route("/events", get(api::list_events).post(api::create_event))
        .route(
            "/events/:id",
            put(api::update_event).merge(delete(api::delete_event).route_layer(gate.clone())),
        )
        .route("/sync/status", get(api::sync_status))
        .route("/sync/replay", post(replay::handle_replay));

    let admin = Router::new()
        .route("/admin/password", post(auth::handle_change_password))
        .route("/admin/change-password", post(auth::handle_change_password))
        .route("/admin/export-csv", get(api::export_csv))
        .route("/admin/export-xlsx", get(api::export_xlsx))
        .route("/admin/import-csv", post(api::import_csv))
        .route("/admin/sync-sheets", post(api::push_sheets))
        .route("/admin/sync-sheets/pull", post(api::pull_sheets))
        .route(
            "/admin/sheets-config",
            get(api::get_sheets_config).post(api::save_sheets_config),
        )
        .route("/sync/google-sheets", post(api::sync_google_sheets))
        .route("/sync/auto-toggle", post(api::toggle_auto_sync))
        .route_layer(gate);

    let api_routes = public.merge(admin).fallback(api::api_not_found);

    let static_dir = &state.config.server.static_dir;
    let client =
        ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        .nest("/api", api_routes)
        .fallback_service(client)
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the store and serve until Ctrl-C.
///
/// # Errors
/// * Returns an error if the store cannot be opened or the address bound
pub async fn run(config: Config) -> Result<()> {
    let store: Arc<dyn Storage> = match config.data_path() {
        Some(path) => {
            tracing::info!(path = %path.display(), "opening data file");
            Arc::new(MemStorage::open(path)?)
        }
        None => {
            tracing::warn!("persistence disabled; data is lost on exit");
            Arc::new(MemStorage::new())
        }
    };
    auth::ensure_admin(store.as_ref(), &config.admin)?;

    let sheets = Arc::new(GoogleSheets::new(&config.sync));
    let state = Arc::new(AppState::new(store, sheets, config));
    tokio::spawn(sync::run_auto_sync(state.clone()));

    let addr = state.config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "volunteer tracker listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
