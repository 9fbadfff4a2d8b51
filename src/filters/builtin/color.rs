//! Tone steps: grayscale conversion, inversion and contrast adjustment.

use crate::core::error::TransformError;
use crate::core::transform::TransformStep;
use image::{DynamicImage, GrayImage};

/// Take the luma channel of an image, converting only when needed.
pub(crate) fn into_luma(image: DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray,
        other => other.to_luma8(),
    }
}

/// Converts an image to 8-bit grayscale.
#[derive(Debug, Clone, Copy, Default)]
pub struct Grayscale;

impl TransformStep for Grayscale {
    fn name(&self) -> &str {
        "grayscale"
    }

    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        Ok(DynamicImage::ImageLuma8(into_luma(image)))
    }
}

/// Inverts a grayscale image, for light text on a dark background.
#[derive(Debug, Clone, Copy, Default)]
pub struct Invert;

impl TransformStep for Invert {
    fn name(&self) -> &str {
        "invert"
    }

    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        let mut gray = into_luma(image);
        for pixel in gray.pixels_mut() {
            pixel[0] = 255 - pixel[0];
        }
        Ok(DynamicImage::ImageLuma8(gray))
    }
}

/// Linearly maps the darkest pixel to black and the brightest to white.
///
/// Faded scans keep all their detail in a narrow band of gray levels; a
/// global threshold works much better once that band is spread out.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContrastStretch;

impl TransformStep for ContrastStretch {
    fn name(&self) -> &str {
        "contrast_stretch"
    }

    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        let mut gray = into_luma(image);
        let (low, high) = gray
            .pixels()
            .fold((u8::MAX, u8::MIN), |(low, high), p| (low.min(p[0]), high.max(p[0])));

        if high > low {
            let range = (high - low) as u32;
            for pixel in gray.pixels_mut() {
                pixel[0] = ((pixel[0] - low) as u32 * 255 / range) as u8;
            }
        }
        Ok(DynamicImage::ImageLuma8(gray))
    }
}

/// Histogram equalization.
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualizeHistogram;

impl TransformStep for EqualizeHistogram {
    fn name(&self) -> &str {
        "equalize"
    }

    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        let gray = into_luma(image);
        Ok(DynamicImage::ImageLuma8(imageproc::contrast::equalize_histogram(
            &gray,
        )))
    }
}
