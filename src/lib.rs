pub mod config;
pub mod engine;
pub mod error;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod weights;

pub use config::AppConfig;
pub use engine::Device;
pub use error::{BootstrapError, DepixelateError, DownloadError, InferenceError, WeightLoadError};
pub use loader::load_model;
pub use models::SuperResolution;
pub use models::realesrgan::{RealEsrgan, TilingConfig};
pub use pipeline::SrPipeline;
pub use weights::{ensure_weights, WeightsStatus};
