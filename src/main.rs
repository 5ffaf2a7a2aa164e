//! changefeed-hub server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use changefeed_hub::api;
use changefeed_hub::app_state::AppState;
use changefeed_hub::config::{FeedBackend, HubConfig, LogFormat};
use changefeed_hub::coordinator::CoordinatorRegistry;
use changefeed_hub::domain::NotificationBus;
use changefeed_hub::upstream::{ChangeFeed, InMemoryChangeFeed, PgChangeFeed};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = HubConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
    tracing::info!(addr = %config.listen_addr, backend = ?config.feed_backend, "starting changefeed-hub");

    // Build the change feed
    let (feed, local_feed): (Arc<dyn ChangeFeed>, Option<Arc<InMemoryChangeFeed>>) =
        match config.feed_backend {
            FeedBackend::Memory => {
                let local = Arc::new(InMemoryChangeFeed::new());
                (Arc::clone(&local) as Arc<dyn ChangeFeed>, Some(local))
            }
            FeedBackend::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.database_max_connections)
                    .min_connections(config.database_min_connections)
                    .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
                    .connect(&config.database_url)
                    .await?;
                if config.run_migrations {
                    sqlx::migrate!().run(&pool).await?;
                    tracing::info!("migrations applied");
                }
                (Arc::new(PgChangeFeed::new(pool)), None)
            }
        };

    // Build coordinators
    let bus = NotificationBus::new(config.bus_capacity);
    let registry = Arc::new(CoordinatorRegistry::new(
        &feed,
        &bus,
        &config.watched_resources,
        config.grace_period,
    ));

    // Build application state
    let app_state = AppState {
        registry: Arc::clone(&registry),
        bus,
        local_feed,
    };

    // Build router
    let app = api::build_app(app_state);

    #[cfg(feature = "swagger-ui")]
    let app = {
        use utoipa::OpenApi;
        app.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", api::openapi::ApiDoc::openapi()),
        )
    };

    let app = app
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Close every upstream watch before exiting
    registry.shutdown().await;
    tracing::info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
