//! Web server setup and routing

use anyhow::Result;
use axum::{routing::post, Router};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api;

/// Build the API router
pub fn router() -> Router {
    Router::new()
        .route(
            "/api/v1/migration-procedures",
            post(api::create_migration_procedure),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Run the API server
pub async fn run(bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, "Starting API server");
    axum::serve(listener, router()).await?;
    Ok(())
}
