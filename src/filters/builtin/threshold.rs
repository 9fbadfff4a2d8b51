//! Binarization steps.
//!
//! Both steps produce a two-tone `Luma8` image: pixels brighter than the
//! level become white (255), the rest black (0).

use super::color::into_luma;
use crate::core::error::TransformError;
use crate::core::transform::TransformStep;
use image::{DynamicImage, GrayImage};

fn binarize(mut gray: GrayImage, level: u8) -> DynamicImage {
    for pixel in gray.pixels_mut() {
        pixel[0] = if pixel[0] > level { 255 } else { 0 };
    }
    DynamicImage::ImageLuma8(gray)
}

/// Global threshold at a fixed level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold {
    /// Brightest value that still becomes black.
    pub level: u8,
}

impl Threshold {
    /// Create a threshold at `level`.
    pub fn new(level: u8) -> Self {
        Self { level }
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self { level: 128 }
    }
}

impl TransformStep for Threshold {
    fn name(&self) -> &str {
        "threshold"
    }

    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        Ok(binarize(into_luma(image), self.level))
    }
}

/// Global threshold at the level chosen by Otsu's method.
#[derive(Debug, Clone, Copy, Default)]
pub struct OtsuThreshold;

impl TransformStep for OtsuThreshold {
    fn name(&self) -> &str {
        "otsu"
    }

    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        let gray = into_luma(image);
        let level = imageproc::contrast::otsu_level(&gray);
        log::trace!("otsu level {} for {}x{}", level, gray.width(), gray.height());
        Ok(binarize(gray, level))
    }
}
