//! EventDesk Backend
//!
//! Event dashboard and door check-in service with SQLite persistence and live
//! attendee projections.

mod api;
mod auth;
mod checkin;
mod config;
mod db;
mod errors;
mod export;
mod models;
mod projection;
mod reconcile;
mod scan;
mod stats;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use checkin::CheckInService;
use config::Config;
use db::{DocumentStore, Repository};
use scan::{EntryVerifier, HttpEntryVerifier, UnavailableVerifier};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub store: Arc<dyn DocumentStore>,
    pub checkin: Arc<CheckInService>,
    pub verifier: Arc<dyn EntryVerifier>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, verifier: Arc<dyn EntryVerifier>, config: Config) -> Self {
        let store: Arc<dyn DocumentStore> = repo.clone();
        let checkin = Arc::new(CheckInService::new(
            store.clone(),
            config.undo_window(),
            config.late_checkin_threshold(),
        ));
        Self {
            repo,
            store,
            checkin,
            verifier,
            config: Arc::new(config),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting EventDesk Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if PSK is not configured
    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (EVENTDESK_API_PSK). Authentication is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    let verifier: Arc<dyn EntryVerifier> = match &config.verify_entry_url {
        Some(url) => {
            tracing::info!("Scans verified against {}", url);
            Arc::new(HttpEntryVerifier::new(url.clone(), config.api_psk.clone())?)
        }
        None => {
            tracing::warn!("No verify-entry endpoint configured; scans are matched locally");
            Arc::new(UnavailableVerifier)
        }
    };

    let bind_addr = config.bind_addr;
    let state = AppState::new(repo, verifier, config);

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    // API routes
    let api_routes = Router::new()
        .route("/revision", get(api::get_revision))
        // Events
        .route("/events", get(api::list_events).post(api::create_event))
        .route("/events/{id}", get(api::get_event))
        // Dashboard
        .route("/events/{id}/dashboard", get(api::get_dashboard))
        .route("/events/{id}/dashboard/stream", get(api::stream_dashboard))
        .route("/events/{id}/stats", get(api::get_stats))
        // Attendees
        .route("/events/{id}/attendees", post(api::register_attendee))
        .route("/events/{id}/attendees/export", get(api::export_attendees))
        .route("/attendees/{id}", get(api::get_attendee))
        // Check-in desk
        .route(
            "/events/{id}/attendees/{attendee_id}/check-in",
            post(api::check_in_attendee),
        )
        .route(
            "/events/{id}/attendees/{attendee_id}/undo",
            post(api::undo_check_in),
        )
        .route("/events/{id}/scan", post(api::scan_code))
        .route("/tickets/verify-entry", post(api::verify_entry))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
