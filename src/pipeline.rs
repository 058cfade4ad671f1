//! Request image pipeline: decode, normalize, upscale, encode.

use crate::error::DepixelateError;
use crate::models::SuperResolution;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use opencv::{core, core::Mat, imgcodecs, imgproc, prelude::*};
use std::sync::Arc;

pub const JPEG_QUALITY: i32 = 75;

/// Upscaling result plus the dimensions the handler logs.
#[derive(Debug, Clone)]
pub struct Depixelated {
    pub image_base64: String,
    pub input_size: (i32, i32),
    pub output_size: (i32, i32),
}

#[derive(Clone)]
pub struct SrPipeline {
    model: Arc<dyn SuperResolution>,
}

impl SrPipeline {
    pub fn new(model: Arc<dyn SuperResolution>) -> Self {
        Self { model }
    }

    pub fn scale(&self) -> u32 {
        self.model.scale()
    }

    /// Decodes any format OpenCV's codecs understand, keeping the source channels and depth.
    pub fn decode(bytes: &[u8]) -> Result<Mat, DepixelateError> {
        if bytes.is_empty() {
            return Err(DepixelateError::Decode("empty file".to_string()));
        }
        let buf = core::Vector::<u8>::from_slice(bytes);
        let mat = imgcodecs::imdecode(&buf, imgcodecs::IMREAD_UNCHANGED).map_err(|e| DepixelateError::Decode(e.to_string()))?;
        if mat.empty() {
            return Err(DepixelateError::Decode("cannot identify image file".to_string()));
        }
        Ok(mat)
    }

    /// Converts to 8-bit, 3-channel BGR whatever the source layout.
    pub fn normalize(input: &Mat) -> Result<Mat, DepixelateError> {
        let err = |e: opencv::Error| DepixelateError::Decode(e.to_string());

        let eight_bit = match input.depth() {
            core::CV_8U => input.clone(),
            depth => {
                let alpha = match depth {
                    core::CV_16U => 255.0 / 65535.0,
                    core::CV_32F | core::CV_64F => 255.0,
                    _ => 1.0,
                };
                let mut out = Mat::default();
                input.convert_to(&mut out, core::CV_8U, alpha, 0.0).map_err(err)?;
                out
            }
        };

        let code = match eight_bit.channels() {
            3 => return Ok(eight_bit),
            4 => imgproc::COLOR_BGRA2BGR,
            1 => imgproc::COLOR_GRAY2BGR,
            n => return Err(DepixelateError::Decode(format!("unsupported channel count {n}"))),
        };
        let mut bgr = Mat::default();
        imgproc::cvt_color(&eight_bit, &mut bgr, code, 0, core::AlgorithmHint::ALGO_HINT_DEFAULT).map_err(err)?;
        Ok(bgr)
    }

    pub fn encode_jpeg(image: &Mat) -> Result<Vec<u8>, DepixelateError> {
        let mut buf = core::Vector::<u8>::new();
        let params = core::Vector::<i32>::from_slice(&[imgcodecs::IMWRITE_JPEG_QUALITY, JPEG_QUALITY]);
        let ok = imgcodecs::imencode(".jpg", image, &mut buf, &params).map_err(|e| DepixelateError::Encode(e.to_string()))?;
        if !ok {
            return Err(DepixelateError::Encode("JPEG encoder rejected the image".to_string()));
        }
        Ok(buf.to_vec())
    }

    /// Runs one upload through the model. Blocking; call from a blocking context.
    pub fn process(&self, bytes: &[u8]) -> Result<Depixelated, DepixelateError> {
        let decoded = Self::decode(bytes)?;
        let image = Self::normalize(&decoded)?;
        let out = self.model.predict(&image)?;
        let jpeg = Self::encode_jpeg(&out)?;
        Ok(Depixelated {
            image_base64: STANDARD.encode(jpeg),
            input_size: (image.cols(), image.rows()),
            output_size: (out.cols(), out.rows()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(ext: &str, mat: &Mat) -> Vec<u8> {
        let mut buf = core::Vector::<u8>::new();
        imgcodecs::imencode(ext, mat, &mut buf, &core::Vector::new()).unwrap();
        buf.to_vec()
    }

    #[test]
    fn text_bytes_are_not_an_image() {
        let err = SrPipeline::decode(b"hello, this is plain text").unwrap_err();
        assert!(matches!(err, DepixelateError::Decode(_)));
        assert!(matches!(SrPipeline::decode(&[]).unwrap_err(), DepixelateError::Decode(_)));
    }

    #[test]
    fn rgba_png_loses_alpha() {
        let bgra = Mat::new_rows_cols_with_default(8, 8, core::CV_8UC4, core::Scalar::new(10.0, 20.0, 30.0, 128.0)).unwrap();
        let decoded = SrPipeline::decode(&encode(".png", &bgra)).unwrap();
        assert_eq!(decoded.channels(), 4);
        let bgr = SrPipeline::normalize(&decoded).unwrap();
        assert_eq!(bgr.channels(), 3);
        assert_eq!(*bgr.at_2d::<core::Vec3b>(0, 0).unwrap(), core::Vec3b::from([10, 20, 30]));
    }

    #[test]
    fn grayscale_becomes_three_channels() {
        let gray = Mat::new_rows_cols_with_default(5, 7, core::CV_8UC1, core::Scalar::all(90.0)).unwrap();
        let bgr = SrPipeline::normalize(&SrPipeline::decode(&encode(".png", &gray)).unwrap()).unwrap();
        assert_eq!((bgr.channels(), bgr.rows(), bgr.cols()), (3, 5, 7));
        assert_eq!(*bgr.at_2d::<core::Vec3b>(2, 3).unwrap(), core::Vec3b::from([90, 90, 90]));
    }

    #[test]
    fn sixteen_bit_is_rescaled() {
        let deep = Mat::new_rows_cols_with_default(4, 4, core::CV_16UC3, core::Scalar::all(65535.0)).unwrap();
        let bgr = SrPipeline::normalize(&deep).unwrap();
        assert_eq!(bgr.depth(), core::CV_8U);
        assert_eq!(*bgr.at_2d::<core::Vec3b>(0, 0).unwrap(), core::Vec3b::from([255, 255, 255]));
    }

    #[test]
    fn jpeg_output_decodes_back() {
        let bgr = Mat::new_rows_cols_with_default(12, 20, core::CV_8UC3, core::Scalar::new(0.0, 128.0, 255.0, 0.0)).unwrap();
        let jpeg = SrPipeline::encode_jpeg(&bgr).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let back = SrPipeline::decode(&jpeg).unwrap();
        assert_eq!((back.rows(), back.cols()), (12, 20));
    }
}
