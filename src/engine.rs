use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::Result as OrtResult;
use std::fmt;
use std::path::Path;

/// Compute device an ONNX session runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    /// CUDA execution provider.
    Accelerator,
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Accelerator => f.write_str("cuda"),
            Device::Cpu => f.write_str("cpu"),
        }
    }
}

/// Picks the accelerator when the CUDA execution provider can be loaded, else the CPU.
pub fn select_device() -> Device {
    match CUDAExecutionProvider::default().is_available() {
        Ok(true) => Device::Accelerator,
        _ => Device::Cpu,
    }
}

fn builder_for(device: Device) -> OrtResult<ort::session::builder::SessionBuilder> {
    let builder = Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
    match device {
        Device::Accelerator => builder.with_execution_providers([CUDAExecutionProvider::default().build().error_on_failure()]),
        Device::Cpu => Ok(builder),
    }
}

pub fn session_from_path(path: &Path, device: Device) -> OrtResult<Session> {
    builder_for(device)?.commit_from_file(path)
}

pub fn session_from_bytes(bytes: &[u8], device: Device) -> OrtResult<Session> {
    builder_for(device)?.commit_from_memory(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_names_are_lowercase() {
        assert_eq!(Device::Accelerator.to_string(), "cuda");
        assert_eq!(Device::Cpu.to_string(), "cpu");
    }
}
