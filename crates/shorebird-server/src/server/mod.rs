//! HTTP server wiring for Shorebird.

use anyhow::Result;
use axum::{
    extract::State,
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::json;
use shorebird_realtime::{
    EventRouter, MessageDeliveryEngine, NotificationFanout, PresenceRegistry,
};
use std::{net::SocketAddr, sync::Arc};
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

use crate::config::ServerConfig;
use crate::db::{Database, MigrationRunner};
use crate::stores::{
    MessageRepository, NotificationRepository, NotificationService, UserRepository,
};

mod routes;

/// Server application state.
///
/// All realtime components are built here and shared by reference; nothing
/// lives in module-level statics, so tests wire up as many independent
/// stacks as they need.
pub struct AppState {
    pub db: Database,
    pub users: Arc<UserRepository>,
    pub presence: Arc<PresenceRegistry<UserRepository>>,
    pub delivery: Arc<MessageDeliveryEngine<UserRepository, MessageRepository>>,
    pub notifications: NotificationService<UserRepository>,
    pub notification_repository: Arc<NotificationRepository>,
    pub event_router: EventRouter<UserRepository, MessageRepository>,
}

impl AppState {
    /// Wire the full component stack on top of a migrated database.
    pub fn new(db: Database) -> Self {
        let users = Arc::new(UserRepository::new(db.clone()));
        let messages = Arc::new(MessageRepository::new(db.clone()));
        let notification_repository = Arc::new(NotificationRepository::new(db.clone()));

        let presence = Arc::new(PresenceRegistry::new(Arc::clone(&users)));
        let delivery = Arc::new(MessageDeliveryEngine::new(
            Arc::clone(&presence),
            Arc::clone(&messages),
        ));
        let fanout = Arc::new(NotificationFanout::new(Arc::clone(&presence)));
        let notifications =
            NotificationService::new(Arc::clone(&notification_repository), Arc::clone(&fanout));
        let event_router = EventRouter::new(
            Arc::clone(&presence),
            Arc::clone(&delivery),
            Arc::clone(&fanout),
        );

        Self {
            db,
            users,
            presence,
            delivery,
            notifications,
            notification_repository,
            event_router,
        }
    }
}

/// Start the HTTP server and block until shutdown.
pub async fn start(config: ServerConfig) -> Result<()> {
    let db = match &config.db_path {
        Some(path) => Database::open_local("shorebird", path).await?,
        None => {
            warn!("SHOREBIRD_DB_PATH not set, using in-memory database");
            Database::in_memory("shorebird").await?
        }
    };
    MigrationRunner::embedded().run(&db).await?;

    let state = Arc::new(AppState::new(db));
    let app = create_router(state, &config);

    let addr: SocketAddr = config.bind_addr;
    info!("Starting Axum HTTP server on {}", addr);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Create the Axum router with all routes and middleware.
fn create_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/health", get(detailed_health_handler))
        .route("/ws", get(routes::ws::websocket_handler))
        .route(
            "/api/v1/conversations/:peer_id",
            get(routes::conversations::get_conversation),
        )
        .route("/api/v1/users/:id", get(routes::users::get_user))
        .route(
            "/api/v1/users/:id/notifications",
            get(routes::notifications::list_notifications),
        )
        .route(
            "/api/v1/notifications",
            post(routes::notifications::create_notification)
                .delete(routes::notifications::delete_notification),
        )
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(cors_layer(config))
}

/// Build the CORS layer from the configured origins.
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
}

/// Simple health check endpoint (for load balancers)
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(true) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "service": "shorebird-server",
                "version": env!("CARGO_PKG_VERSION"),
                "license": "AGPL-3.0"
            })),
        ),
        Ok(false) | Err(_) => {
            warn!("Health check: database unhealthy");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "shorebird-server",
                    "version": env!("CARGO_PKG_VERSION"),
                    "error": "database unhealthy"
                })),
            )
        }
    }
}

/// Detailed health check endpoint (for monitoring)
async fn detailed_health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_healthy = state.db.health_check().await.unwrap_or(false);
    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(json!({
            "status": if db_healthy { "healthy" } else { "unhealthy" },
            "service": "shorebird-server",
            "version": env!("CARGO_PKG_VERSION"),
            "license": "AGPL-3.0",
            "database": { "healthy": db_healthy },
            "realtime": { "connected_users": state.presence.connected_count() }
        })),
    )
}
