//! Process configuration.
//!
//! Host, port and upscaling factor are fixed. Only the weights location can be
//! overridden, through `DEPIXELATOR_WEIGHTS_DIR` and `DEPIXELATOR_WEIGHTS_URL`.

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

pub const HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
pub const PORT: u16 = 8000;
pub const SCALE: u32 = 4;

/// Real-ESRGAN x4 exported to ONNX. The export must take a dynamic-height,
/// dynamic-width input; `RealEsrgan::from_path` rejects fixed-shape graphs.
pub const DEFAULT_WEIGHTS_URL: &str =
    "https://huggingface.co/qualcomm/Real-ESRGAN-x4plus/resolve/main/Real-ESRGAN-x4plus.onnx";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    pub scale: u32,
    pub weights_dir: PathBuf,
    pub weights_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: HOST,
            port: PORT,
            scale: SCALE,
            weights_dir: PathBuf::from("."),
            weights_url: DEFAULT_WEIGHTS_URL.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(dir) = env::var("DEPIXELATOR_WEIGHTS_DIR") {
            cfg.weights_dir = PathBuf::from(dir);
        }
        if let Ok(url) = env::var("DEPIXELATOR_WEIGHTS_URL") {
            cfg.weights_url = url;
        }
        cfg
    }

    pub fn weights_file_name(&self) -> String {
        format!("RealESRGAN_x{}.onnx", self.scale)
    }

    pub fn weights_path(&self) -> PathBuf {
        self.weights_dir.join(self.weights_file_name())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
