use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{delete, get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use retro_api::middleware::require_auth;
use retro_api::state::{AppState, AppStateInner};
use retro_api::{auth, boards, components, events};
use retro_broadcast::{BroadcastRegistry, ReaperConfig};
use retro_log::PartitionedLog;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "retro=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("RETRO_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("RETRO_DB_PATH").unwrap_or_else(|_| "retro.db".into());
    let host = std::env::var("RETRO_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("RETRO_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let log_partitions: usize = std::env::var("RETRO_LOG_PARTITIONS")
        .unwrap_or_else(|_| "4".into())
        .parse()?;
    let sse_timeout_ms: u64 = std::env::var("RETRO_SSE_TIMEOUT_MS")
        .unwrap_or_else(|_| "600000".into())
        .parse()?;
    let reaper_interval_secs: u64 = std::env::var("RETRO_REAPER_INTERVAL_SECS")
        .unwrap_or_else(|_| "1800".into())
        .parse()?;

    // Init database
    let db = Arc::new(retro_db::Database::open(&PathBuf::from(&db_path))?);

    // Event log + materializer: the store's only writer
    let (log, consumer) = PartitionedLog::new(log_partitions);
    retro_materializer::spawn(consumer, db.clone());

    // Broadcast registry + reaper
    let registry = BroadcastRegistry::new();
    tokio::spawn(retro_broadcast::reaper::run(
        registry.clone(),
        ReaperConfig {
            sweep_interval: Duration::from_secs(reaper_interval_secs),
            channel_timeout: Duration::from_millis(sse_timeout_ms),
        },
    ));

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        log: Arc::new(log),
        registry,
        jwt_secret,
        sse_timeout: Duration::from_millis(sse_timeout_ms),
    });

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Retro board server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    // The push stream stays public: EventSource clients cannot set an
    // Authorization header.
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/boards/{id}/events", get(events::subscribe_events))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/users/me", get(auth::me))
        .route("/boards", post(boards::create_board))
        .route("/boards/me", get(boards::my_boards))
        .route(
            "/boards/{id}",
            get(boards::get_board).delete(boards::delete_board),
        )
        .route(
            "/boards/{id}/invite",
            get(boards::get_invite_token).post(boards::add_editor),
        )
        .route("/boards/{id}/invite/rotate", post(boards::rotate_invite_token))
        .route("/boards/{id}/editors", get(boards::list_editors))
        .route(
            "/boards/{id}/editors/{editor_id}",
            delete(boards::remove_editor),
        )
        .route(
            "/boards/{id}/components",
            get(boards::list_components).post(boards::create_component),
        )
        .route(
            "/components/{id}",
            patch(components::edit_component).delete(components::delete_component),
        )
        .route(
            "/components/{id}/vote",
            post(components::add_vote).delete(components::remove_vote),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
