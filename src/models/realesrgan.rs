use crate::engine::{session_from_bytes, session_from_path, Device};
use crate::error::{InferenceError, WeightLoadError};
use crate::models::SuperResolution;
use ndarray::{Array, Ix4};
use opencv::{core, core::Mat, dnn, imgproc, prelude::*};
use ort::{session::Session, tensor::TensorElementType, value::{Tensor, ValueType}};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// Tiling configuration to bound memory and compute for large inputs.
#[derive(Clone, Debug)]
pub struct TilingConfig {
    pub enabled: bool,
    pub tile: i32,
    pub pad: i32,
    pub threshold_pixels: i64,
    pub threshold_max_dim: i32,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tile: 512,
            pad: 16,
            threshold_pixels: 1_000_000,
            threshold_max_dim: 1024,
        }
    }
}

impl TilingConfig {
    pub fn applies_to(&self, w: i32, h: i32) -> bool {
        if !self.enabled {
            return false;
        }
        (w as i64) * (h as i64) > self.threshold_pixels || w.max(h) > self.threshold_max_dim
    }
}

/// Real-ESRGAN on an ONNX Runtime session.
///
/// The session needs exclusive access per run, so concurrent `predict` calls
/// serialize on the inner mutex.
pub struct RealEsrgan {
    session: Mutex<Session>,
    device: Device,
    scale: u32,
    tiling: TilingConfig,
}

impl RealEsrgan {
    pub fn from_path(path: &Path, device: Device, scale: u32) -> Result<Self, WeightLoadError> {
        let origin = path.display().to_string();
        let session = session_from_path(path, device).map_err(|source| WeightLoadError::Session {
            origin: origin.clone(),
            source,
        })?;
        Self::with_session(session, device, scale, origin)
    }

    pub fn from_bytes(bytes: &[u8], device: Device, scale: u32) -> Result<Self, WeightLoadError> {
        let origin = format!("in-memory model ({} bytes)", bytes.len());
        let session = session_from_bytes(bytes, device).map_err(|source| WeightLoadError::Session {
            origin: origin.clone(),
            source,
        })?;
        Self::with_session(session, device, scale, origin)
    }

    fn with_session(session: Session, device: Device, scale: u32, origin: String) -> Result<Self, WeightLoadError> {
        Self::check_input(&session).map_err(|reason| WeightLoadError::Incompatible { origin, reason })?;
        Ok(Self {
            session: Mutex::new(session),
            device,
            scale,
            tiling: TilingConfig::default(),
        })
    }

    /// Replaces the default tiling thresholds.
    pub fn with_tiling(mut self, cfg: TilingConfig) -> Self {
        self.tiling = cfg;
        self
    }

    /// The graph must take one float NCHW image with free height and width.
    fn check_input(session: &Session) -> Result<(), String> {
        let input = session.inputs.first().ok_or_else(|| "graph has no inputs".to_string())?;
        match &input.input_type {
            ValueType::Tensor { ty, shape, .. } => {
                if *ty != TensorElementType::Float32 {
                    return Err(format!("input `{}` is {:?}, expected f32", input.name, ty));
                }
                Self::check_input_dims(shape)
            }
            other => Err(format!("input `{}` is {:?}, expected a tensor", input.name, other)),
        }
    }

    fn check_input_dims(dims: &[i64]) -> Result<(), String> {
        if dims.len() != 4 {
            return Err(format!("input has rank {}, expected NCHW", dims.len()));
        }
        if dims[1] >= 0 && dims[1] != 3 {
            return Err(format!("input has {} channels, expected 3", dims[1]));
        }
        if dims[2] >= 0 || dims[3] >= 0 {
            return Err(format!("input is fixed at {}x{}, height and width must be dynamic", dims[3], dims[2]));
        }
        Ok(())
    }

    pub fn device(&self) -> Device {
        self.device
    }

    fn scale_from_depth(depth: i32) -> f64 {
        match depth {
            core::CV_8U => 1.0 / 255.0,
            core::CV_16U | core::CV_16S => 1.0 / 65535.0,
            _ => 1.0 / 255.0,
        }
    }

    fn ensure_bgr(input: &Mat, channels: i32) -> Result<Mat, InferenceError> {
        let code = match channels {
            4 => imgproc::COLOR_BGRA2BGR,
            1 => imgproc::COLOR_GRAY2BGR,
            3 => return Ok(input.clone()),
            n => return Err(InferenceError::Backend(format!("unsupported channel count {n}"))),
        };
        let mut bgr = Mat::default();
        imgproc::cvt_color(input, &mut bgr, code, 0, core::AlgorithmHint::ALGO_HINT_DEFAULT)?;
        Ok(bgr)
    }

    /// Pads odd width/height by one pixel so the exported graph's reshape stays valid.
    fn pad_even(input: &Mat) -> Result<(Mat, i32, i32), InferenceError> {
        let pad_right = input.cols() % 2;
        let pad_bottom = input.rows() % 2;
        if pad_right == 0 && pad_bottom == 0 {
            return Ok((input.clone(), 0, 0));
        }
        let mut padded = Mat::default();
        // REFLECT_101 avoids visible seams along the padded edge
        core::copy_make_border(
            input,
            &mut padded,
            0,
            pad_bottom,
            0,
            pad_right,
            core::BORDER_REFLECT_101,
            core::Scalar::default(),
        )?;
        Ok((padded, pad_right, pad_bottom))
    }

    fn check_scale(&self, actual: u32) -> Result<(), InferenceError> {
        if actual != self.scale {
            return Err(InferenceError::ScaleMismatch {
                expected: self.scale,
                actual,
            });
        }
        Ok(())
    }
}

impl SuperResolution for RealEsrgan {
    fn scale(&self) -> u32 {
        self.scale
    }

    fn predict(&self, input: &Mat) -> Result<Mat, InferenceError> {
        let (h, w, channels, depth) = (input.rows(), input.cols(), input.channels(), input.depth());
        if h <= 0 || w <= 0 {
            return Err(InferenceError::Backend("empty input image".to_string()));
        }
        let bgr_input = Self::ensure_bgr(input, channels)?;
        let (padded, pad_right, pad_bottom) = Self::pad_even(&bgr_input)?;
        let (w_pad, h_pad) = (padded.cols(), padded.rows());

        // A panic in an earlier run leaves the session itself intact.
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);

        let out_full = if self.tiling.applies_to(w_pad, h_pad) {
            self.infer_tiled(&mut session, &padded, depth)?
        } else {
            let (out, scale_est) = Self::infer_raw(&mut session, &padded, depth)?;
            self.check_scale(scale_est)?;
            out
        };
        drop(session);

        // Crop away padding to match original scaled size
        if pad_right == 0 && pad_bottom == 0 {
            return Ok(out_full);
        }
        let s = self.scale as i32;
        let roi = core::Rect::new(0, 0, w * s, h * s);
        let cropped = out_full.roi(roi)?.try_clone()?;
        Ok(cropped)
    }
}

impl RealEsrgan {
    fn infer_raw(session: &mut Session, padded_bgr: &Mat, depth: i32) -> Result<(Mat, u32), InferenceError> {
        let (h_pad, w_pad) = (padded_bgr.rows(), padded_bgr.cols());
        let blob = dnn::blob_from_image(
            padded_bgr,
            Self::scale_from_depth(depth),
            core::Size::new(w_pad, h_pad),
            core::Scalar::default(),
            true,
            false,
            core::CV_32F,
        )?;

        let blob_slice: &[f32] = blob.data_typed()?;
        let input_array = Array::from_shape_vec((1, 3, h_pad as usize, w_pad as usize), blob_slice.to_vec())
            .map_err(|e| InferenceError::Backend(e.to_string()))?;
        let input_tensor = Tensor::from_array(input_array)?;

        let outputs = session.run(ort::inputs![input_tensor])?;
        let out_view = outputs[0].try_extract_array::<f32>()?;
        let out4 = out_view
            .into_dimensionality::<Ix4>()
            .map_err(|e| InferenceError::Backend(e.to_string()))?;
        let (h_out, w_out) = (out4.shape()[2] as i32, out4.shape()[3] as i32);

        let mut out_mat = Mat::new_rows_cols_with_default(h_out, w_out, core::CV_8UC3, core::Scalar::default())?;
        let buf = out_mat.data_bytes_mut()?;
        let w_out_usize = w_out as usize;
        for (y, row) in buf.chunks_mut(w_out_usize * 3).enumerate() {
            for x in 0..w_out_usize {
                let r = out4[[0, 0, y, x]].clamp(0.0, 1.0);
                let g = out4[[0, 1, y, x]].clamp(0.0, 1.0);
                let b = out4[[0, 2, y, x]].clamp(0.0, 1.0);
                let idx = x * 3;
                row[idx] = (b * 255.0).round() as u8;
                row[idx + 1] = (g * 255.0).round() as u8;
                row[idx + 2] = (r * 255.0).round() as u8;
            }
        }

        let scale_est_w = (w_out as f64) / (w_pad as f64);
        let scale_est_h = (h_out as f64) / (h_pad as f64);
        let scale_est = ((scale_est_w + scale_est_h) / 2.0).round() as u32;
        Ok((out_mat, scale_est))
    }

    fn infer_tiled(&self, session: &mut Session, input: &Mat, depth: i32) -> Result<Mat, InferenceError> {
        let (h, w) = (input.rows(), input.cols());
        let s = self.scale as i32;
        let tile = self.tiling.tile;
        let tile_pad = self.tiling.pad;
        let mut canvas = Mat::new_rows_cols_with_default(h * s, w * s, core::CV_8UC3, core::Scalar::default())?;

        let mut y = 0;
        while y < h {
            let y0 = y;
            let y1 = (y0 + tile).min(h);
            let y0p = (y0 - tile_pad).max(0);
            let y1p = (y1 + tile_pad).min(h);
            let th = y1 - y0;

            let mut x = 0;
            while x < w {
                let x0 = x;
                let x1 = (x0 + tile).min(w);
                let x0p = (x0 - tile_pad).max(0);
                let x1p = (x1 + tile_pad).min(w);
                let tw = x1 - x0;

                let roi_padded = core::Rect::new(x0p, y0p, (x1p - x0p).max(1), (y1p - y0p).max(1));
                let tile_padded = input.roi(roi_padded)?.try_clone()?;

                let (tile_even, _, _) = Self::pad_even(&tile_padded)?;
                let (tile_out, scale_est) = Self::infer_raw(session, &tile_even, depth)?;
                self.check_scale(scale_est)?;

                let crop_rect = core::Rect::new((x0 - x0p) * s, (y0 - y0p) * s, tw.max(1) * s, th.max(1) * s);
                let tile_cropped = tile_out.roi(crop_rect)?.try_clone()?;

                let dst_roi = core::Rect::new(x0 * s, y0 * s, tile_cropped.cols(), tile_cropped.rows());
                let mut dst_view = canvas.roi_mut(dst_roi)?;
                tile_cropped.copy_to(&mut dst_view)?;

                x += tile;
            }
            y += tile;
        }

        Ok(canvas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(rows: i32, cols: i32, typ: i32) -> Mat {
        Mat::new_rows_cols_with_default(rows, cols, typ, core::Scalar::all(200.0)).unwrap()
    }

    #[test]
    fn tiling_kicks_in_above_thresholds() {
        let cfg = TilingConfig::default();
        assert!(!cfg.applies_to(64, 64));
        assert!(!cfg.applies_to(1000, 1000));
        assert!(cfg.applies_to(1001, 1000));
        assert!(cfg.applies_to(2000, 10));
        let off = TilingConfig { enabled: false, ..TilingConfig::default() };
        assert!(!off.applies_to(4096, 4096));
    }

    #[test]
    fn pad_even_only_touches_odd_sides() {
        let (same, r, b) = RealEsrgan::pad_even(&solid(16, 16, core::CV_8UC3)).unwrap();
        assert_eq!((same.rows(), same.cols(), r, b), (16, 16, 0, 0));

        let (padded, r, b) = RealEsrgan::pad_even(&solid(15, 16, core::CV_8UC3)).unwrap();
        assert_eq!((padded.rows(), padded.cols(), r, b), (16, 16, 0, 1));

        let (padded, r, b) = RealEsrgan::pad_even(&solid(7, 9, core::CV_8UC3)).unwrap();
        assert_eq!((padded.rows(), padded.cols(), r, b), (8, 10, 1, 1));
    }

    #[test]
    fn ensure_bgr_expands_gray_and_drops_alpha() {
        let gray = RealEsrgan::ensure_bgr(&solid(4, 4, core::CV_8UC1), 1).unwrap();
        assert_eq!(gray.channels(), 3);
        let bgra = RealEsrgan::ensure_bgr(&solid(4, 4, core::CV_8UC4), 4).unwrap();
        assert_eq!(bgra.channels(), 3);
        assert!(RealEsrgan::ensure_bgr(&solid(4, 4, core::CV_8UC2), 2).is_err());
    }

    #[test]
    fn garbage_weights_fail_to_load() {
        assert!(RealEsrgan::from_bytes(b"not an onnx graph", Device::Cpu, 4).is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("RealESRGAN_x4.onnx");
        std::fs::write(&path, b"truncated").unwrap();
        let err = RealEsrgan::from_path(&path, Device::Cpu, 4).err().expect("corrupt weights loaded");
        assert!(matches!(err, WeightLoadError::Session { .. }));
        assert_eq!(err.origin(), path.display().to_string());
    }

    #[test]
    fn input_dims_must_be_dynamic_nchw() {
        assert!(RealEsrgan::check_input_dims(&[1, 3, -1, -1]).is_ok());
        assert!(RealEsrgan::check_input_dims(&[-1, -1, -1, -1]).is_ok());
        assert!(RealEsrgan::check_input_dims(&[1, 3, 128, 128]).unwrap_err().contains("128x128"));
        assert!(RealEsrgan::check_input_dims(&[1, 3, -1, 64]).is_err());
        assert!(RealEsrgan::check_input_dims(&[1, 1, -1, -1]).is_err());
        assert!(RealEsrgan::check_input_dims(&[3, -1, -1]).is_err());
    }

    #[test]
    fn sixteen_bit_depth_uses_wider_range() {
        assert_eq!(RealEsrgan::scale_from_depth(core::CV_8U), 1.0 / 255.0);
        assert_eq!(RealEsrgan::scale_from_depth(core::CV_16U), 1.0 / 65535.0);
    }
}
