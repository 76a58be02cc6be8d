mod backend;
mod config;
mod correlation;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;
mod vfs;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::backend::{BackingService, LocalBackend};
use crate::config::Config;
use crate::correlation::{Correlator, EventRegistry};
use crate::db::Database;
use crate::models::CreateUserRequest;
use crate::services::{DeletionSync, SessionFactory, StorageOptimizer, UserService};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub correlator: Correlator,
    pub sessions: SessionFactory,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatdrive=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting chatdrive...");

    // Load configuration
    let config = Config::load()?;
    let config = Arc::new(config);
    tracing::info!("Configuration loaded");

    // Initialize database
    let db = Database::new(&config.database.path).await?;
    db.run_migrations().await?;
    tracing::info!("Database initialized");

    if let Some(id) = &config.server.initial_user {
        let req = CreateUserRequest {
            id: id.clone(),
            password: config.server.initial_password.clone(),
            chat_name: None,
            chat_id: None,
        };
        UserService::ensure_user(&db, req).await?;
    } else if !config.server.open_registration {
        tracing::warn!("Registration is closed and no initial user is configured");
    }

    // Connect the backing service; its feed is consumed by one dispatch task
    let (local, events) = LocalBackend::open(
        &config.storage.files_path,
        config.backend.chunk_size,
        config.backend.event_buffer,
    )
    .await?;
    local
        .add_chat(LocalBackend::writable_chat(
            config.backend.chat_id,
            &config.backend.chat_name,
        ))
        .await?;
    let backend: Arc<dyn BackingService> = local;

    let shutdown = CancellationToken::new();
    let registry = Arc::new(EventRegistry::new());
    let correlator = Correlator::new(registry.clone());
    let dispatch = async {
        tokio::spawn(registry.clone().run(events, shutdown.clone()));
        Ok::<_, error::AppError>(())
    };

    tokio::time::timeout(
        Duration::from_secs(config.backend.ready_timeout_secs),
        correlator.await_connection_ready(dispatch, &shutdown),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Backend {} did not become ready", backend.name()))??;
    tracing::info!("Backend {} ready", backend.name());
    if let Some(cache) = backend.cache_dir() {
        tracing::info!("Materialized blobs are kept in {}", cache.display());
    }

    DeletionSync::start(db.clone(), &registry, shutdown.clone())?;
    StorageOptimizer::start(backend.clone(), &config.optimize, shutdown.clone());

    let sessions = SessionFactory::new(
        db.clone(),
        backend.clone(),
        correlator.clone(),
        config.backend.default_chat(),
        &config.storage.temp_path,
        shutdown.clone(),
    );

    // Create app state
    let state = AppState {
        db,
        config: config.clone(),
        correlator,
        sessions,
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    shutdown.cancel();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown requested");
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }
}

fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let mut public_routes = Router::new();

    // Protected routes (auth required)
    let mut protected_routes = Router::new()
        .route("/users/me", get(handlers::user::get_profile))
        // Filesystem
        .route(
            "/fs",
            get(handlers::fs::read_path)
                .put(handlers::fs::write_path)
                .delete(handlers::fs::delete_path),
        )
        .route(
            "/fs/*path",
            get(handlers::fs::read_path)
                .put(handlers::fs::write_path)
                .delete(handlers::fs::delete_path),
        )
        .route("/mkdir", post(handlers::fs::mkdir))
        .route("/rename", post(handlers::fs::rename))
        .route("/stat", get(handlers::fs::stat))
        .route("/stat/*path", get(handlers::fs::stat))
        // Transfers
        .route("/transfers", get(handlers::transfer::list_transfers));

    // Registration is only public when configured so
    if state.config.server.open_registration {
        public_routes = public_routes.route("/users", post(handlers::user::create_user));
    } else {
        protected_routes = protected_routes.route("/users", post(handlers::user::create_user));
    }

    let protected_routes = protected_routes
        .layer(DefaultBodyLimit::disable())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    // Combine all routes under /api, every one behind the address filter
    let api_routes = public_routes
        .merge(protected_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::whitelist_middleware,
        ));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
