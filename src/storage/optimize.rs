//! Image resizing and re-encoding.
//!
//! WebP output is lossless (the only WebP encoder `image` ships), so
//! `quality` only affects JPEG output.

use std::io::Cursor;

use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, GenericImageView, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

pub const DEFAULT_QUALITY: u8 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Scale to cover the box, cropping the overflow. A source smaller than
    /// the box is cropped to the box's aspect ratio instead of upscaled.
    #[default]
    Cover,
    /// Scale to fit inside the box, never upscaling.
    Contain,
    /// Stretch to the exact box.
    Fill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Webp,
    Jpeg,
}

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Webp => "image/webp",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OptimizeOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: u8,
    pub format: OutputFormat,
    pub fit: FitMode,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            quality: DEFAULT_QUALITY,
            format: OutputFormat::Webp,
            fit: FitMode::Cover,
        }
    }
}

impl OptimizeOptions {
    pub fn bounded(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.quality) {
            return Err(AppError::Validation(format!(
                "La qualità deve essere tra 1 e 100, ricevuto {}",
                self.quality
            )));
        }
        for side in [self.width, self.height].into_iter().flatten() {
            if side == 0 || side > 8192 {
                return Err(AppError::Validation(format!("Dimensione non valida: {side}")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct OptimizedImage {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub extension: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Target box for the requested sizes, deriving a missing side from the
/// source aspect ratio.
pub fn target_dimensions(source: (u32, u32), width: Option<u32>, height: Option<u32>) -> (u32, u32) {
    let (src_w, src_h) = source;
    match (width, height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, scale_side(src_h, w, src_w)),
        (None, Some(h)) => (scale_side(src_w, h, src_h), h),
        (None, None) => source,
    }
}

fn scale_side(side: u32, numerator: u32, denominator: u32) -> u32 {
    ((side as u64 * numerator as u64 + denominator as u64 / 2) / denominator.max(1) as u64).max(1) as u32
}

/// Scales the box down, keeping its aspect ratio, until it fits inside the
/// source.
fn shrink_box_to_source(target: (u32, u32), source: (u32, u32)) -> (u32, u32) {
    let ((w, h), (src_w, src_h)) = (target, source);
    if w <= src_w && h <= src_h {
        return target;
    }
    let factor = (src_w as f64 / w as f64).min(src_h as f64 / h as f64);
    let shrink = |side: u32, limit: u32| ((side as f64 * factor).round() as u32).clamp(1, limit);
    (shrink(w, src_w), shrink(h, src_h))
}

pub fn resize(img: &DynamicImage, options: &OptimizeOptions) -> DynamicImage {
    let (src_w, src_h) = img.dimensions();
    let (w, h) = target_dimensions((src_w, src_h), options.width, options.height);
    if (w, h) == (src_w, src_h) {
        return img.clone();
    }

    match options.fit {
        FitMode::Cover => {
            let (w, h) = shrink_box_to_source((w, h), (src_w, src_h));
            if (w, h) == (src_w, src_h) {
                img.clone()
            } else {
                img.resize_to_fill(w, h, FilterType::Lanczos3)
            }
        }
        FitMode::Contain => {
            if src_w <= w && src_h <= h {
                img.clone()
            } else {
                img.resize(w, h, FilterType::Lanczos3)
            }
        }
        FitMode::Fill => img.resize_exact(w, h, FilterType::Lanczos3),
    }
}

pub fn encode(img: &DynamicImage, options: &OptimizeOptions) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    match options.format {
        OutputFormat::Webp => {
            DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut out, ImageFormat::WebP)?;
        }
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut out, options.quality);
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
        }
    }
    Ok(out.into_inner())
}

/// Decode, resize and re-encode. CPU-bound; callers on the runtime should
/// go through `spawn_blocking`.
pub fn optimize_image(bytes: &[u8], options: &OptimizeOptions) -> Result<OptimizedImage> {
    options.validate()?;

    let img = image::load_from_memory(bytes)?;
    let resized = resize(&img, options);
    let (width, height) = resized.dimensions();

    Ok(OptimizedImage {
        bytes: encode(&resized, options)?,
        content_type: options.format.content_type(),
        extension: options.format.extension(),
        width,
        height,
    })
}

pub async fn optimize_image_blocking(bytes: Vec<u8>, options: OptimizeOptions) -> Result<OptimizedImage> {
    tokio::task::spawn_blocking(move || optimize_image(&bytes, &options))
        .await
        .map_err(|e| AppError::Internal(format!("Image task failed: {e}")))?
}
