//! Frame decoding and pixel-descriptor extraction.
//!
//! Descriptors are intentionally crude: grayscale, a small square resize,
//! normalized to [0,1] and flattened. The same function feeds the local
//! backends and the dataset profile, so their dimensions always agree.

use image::DynamicImage;
use image::imageops::FilterType;
use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::PredictError;

const JPEG_QUALITY: u8 = 85;

/// Decode a base64 payload (optionally a `data:image/...;base64,` URL) into
/// an image. Fails fast on malformed input; nothing is mutated on error.
pub fn decode_frame(image_base64: &str) -> Result<DynamicImage, PredictError> {
    let data = image_base64.rsplit(',').next().unwrap_or(image_base64);
    let binary = STANDARD
        .decode(data.trim())
        .map_err(|e| PredictError::InvalidInput(e.to_string()))?;
    image::load_from_memory(&binary).map_err(|e| PredictError::InvalidInput(e.to_string()))
}

/// Grayscale `size`x`size` descriptor in [0,1], row-major.
pub fn descriptor(img: &DynamicImage, size: u32) -> Vec<f32> {
    let gray = img.grayscale().resize_exact(size, size, FilterType::Triangle);
    let luma = gray.to_luma8();
    luma.pixels().map(|p| p.0[0] as f32 / 255.0).collect()
}

/// JPEG-encode a frame for submission to the remote detector.
pub fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, PredictError> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    img.write_with_encoder(encoder)
        .map_err(|e| PredictError::InvalidInput(e.to_string()))?;
    Ok(buf.into_inner())
}

/// A decoded frame as the session window stores it: the descriptor for the
/// local backends and profile, plus JPEG bytes for the remote detector.
#[derive(Clone)]
pub struct WindowFrame {
    pub descriptor: Vec<f32>,
    pub jpeg: Vec<u8>,
}

impl WindowFrame {
    pub fn from_image(img: &DynamicImage, frame_size: u32) -> Result<Self, PredictError> {
        Ok(WindowFrame {
            descriptor: descriptor(img, frame_size),
            jpeg: encode_jpeg(img)?,
        })
    }
}

/// Euclidean distance between two equal-length vectors.
pub fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

/// Concatenate a window of descriptors into one flat query vector.
pub fn flatten_window(window: &[WindowFrame]) -> Vec<f32> {
    let mut flat = Vec::with_capacity(window.len() * window.first().map_or(0, |f| f.descriptor.len()));
    for frame in window {
        flat.extend_from_slice(&frame.descriptor);
    }
    flat
}
