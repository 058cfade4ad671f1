//! HTTP surface: `GET /`, `GET /health` and `POST /depixelate`.

mod handlers;

pub use handlers::{DepixelateResponse, HealthResponse, IMAGE_FIELD};

use std::net::SocketAddr;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tracing::info;

use crate::pipeline::SrPipeline;

pub fn router(pipeline: SrPipeline) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/depixelate", post(handlers::depixelate))
        // Uploads are not size-bounded.
        .layer(DefaultBodyLimit::disable())
        .with_state(pipeline)
}

/// Binds `addr` and serves until Ctrl-C.
pub async fn serve(addr: SocketAddr, pipeline: SrPipeline) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}
