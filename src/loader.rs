use crate::config::AppConfig;
use crate::engine::select_device;
use crate::error::BootstrapError;
use crate::models::realesrgan::RealEsrgan;
use crate::weights::{ensure_weights, WeightsStatus};
use std::sync::Arc;
use tracing::info;

/// One-shot bootstrap: pick a device, provision the weights, build the session.
///
/// Any failure is fatal to startup; nothing is retried.
pub async fn load_model(cfg: &AppConfig) -> Result<Arc<RealEsrgan>, BootstrapError> {
    let device = select_device();
    info!("Using {} for inference", device);

    let path = cfg.weights_path();
    let client = reqwest::Client::new();
    if let WeightsStatus::Present = ensure_weights(&client, &cfg.weights_url, &path).await? {
        info!("Found weights at {}", path.display());
    }

    let model = RealEsrgan::from_path(&path, device, cfg.scale)?;
    info!("Loaded Real-ESRGAN x{} from {} on {}", cfg.scale, path.display(), model.device());
    Ok(Arc::new(model))
}
