//! Image Depixelator server.
//!
//! ```bash
//! depixelator
//! RUST_LOG=debug DEPIXELATOR_WEIGHTS_DIR=/var/lib/depixelator depixelator
//! ```

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use depixelator::{load_model, server, AppConfig, SrPipeline};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let cfg = AppConfig::from_env();
    let model = load_model(&cfg).await.context("model bootstrap failed")?;
    let pipeline = SrPipeline::new(model);

    server::serve(cfg.bind_addr(), pipeline)
        .await
        .with_context(|| format!("server on {} failed", cfg.bind_addr()))
}
