//! Frame type and pixel conversions: YUYV/GREY to RGB, payload decoding, downscaling.

use image::{imageops::FilterType, RgbImage};
use std::time::Instant;

/// A captured RGB frame (row-major, 3 bytes per pixel).
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
    pub sequence: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid {format} length: expected {expected}, got {actual}")]
    InvalidLength {
        format: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

impl Frame {
    pub fn from_image(img: RgbImage, sequence: u32) -> Self {
        let (width, height) = img.dimensions();
        Self {
            data: img.into_raw(),
            width,
            height,
            timestamp: Instant::now(),
            sequence,
        }
    }

    /// Decode an encoded image payload (any format `image` can guess).
    pub fn decode(bytes: &[u8], sequence: u32) -> Result<Self, FrameError> {
        let img = image::load_from_memory(bytes)?.to_rgb8();
        Ok(Self::from_image(img, sequence))
    }

    /// Resize by `factor` (0 < factor ≤ 1 shrinks). Each side stays at least one pixel.
    pub fn scaled(&self, factor: f32) -> Frame {
        if (factor - 1.0).abs() < f32::EPSILON || self.width == 0 || self.height == 0 {
            return self.clone();
        }
        let w = ((self.width as f32 * factor).round() as u32).max(1);
        let h = ((self.height as f32 * factor).round() as u32).max(1);

        let Some(img) = RgbImage::from_raw(self.width, self.height, self.data.clone()) else {
            return self.clone();
        };
        let resized = image::imageops::resize(&img, w, h, FilterType::Triangle);

        Frame {
            data: resized.into_raw(),
            width: w,
            height: h,
            timestamp: self.timestamp,
            sequence: self.sequence,
        }
    }
}

/// Convert packed YUYV 4:2:2 (`[Y0, U, Y1, V]` per pixel pair) to RGB using BT.601.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            format: "YUYV",
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for quad in yuyv[..expected].chunks_exact(4) {
        let (u, v) = (quad[1] as f32 - 128.0, quad[3] as f32 - 128.0);
        for y in [quad[0], quad[2]] {
            let y = y as f32;
            rgb.push((y + 1.402 * v).round().clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344_136 * u - 0.714_136 * v).round().clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).round().clamp(0.0, 255.0) as u8);
        }
    }
    Ok(rgb)
}

/// Replicate 8-bit grayscale into three channels.
pub fn grey_to_rgb(grey: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height) as usize;
    if grey.len() < expected {
        return Err(FrameError::InvalidLength {
            format: "GREY",
            expected,
            actual: grey.len(),
        });
    }
    Ok(grey[..expected].iter().flat_map(|&g| [g, g, g]).collect())
}
