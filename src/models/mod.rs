use crate::error::InferenceError;
use opencv::core::Mat;

/// A loaded super-resolution model. Read-only once constructed.
pub trait SuperResolution: Send + Sync {
    /// Fixed factor applied to both image dimensions.
    fn scale(&self) -> u32;

    /// Upscales an 8-bit BGR image by [`scale`](Self::scale).
    fn predict(&self, input: &Mat) -> Result<Mat, InferenceError>;
}

pub mod realesrgan;
