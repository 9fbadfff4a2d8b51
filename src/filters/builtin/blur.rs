//! Noise suppression steps run before thresholding.

use super::color::into_luma;
use crate::core::error::TransformError;
use crate::core::transform::TransformStep;
use image::DynamicImage;

/// Gaussian blur of a grayscale image.
#[derive(Debug, Clone, Copy)]
pub struct GaussianBlur {
    /// Standard deviation of the kernel, in pixels.
    pub sigma: f32,
}

impl GaussianBlur {
    /// Create a blur with the given standard deviation.
    pub fn new(sigma: f32) -> Self {
        Self { sigma }
    }
}

impl TransformStep for GaussianBlur {
    fn name(&self) -> &str {
        "gaussian_blur"
    }

    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        if self.sigma.is_nan() || self.sigma <= 0.0 {
            return Err(TransformError::new(
                self.name(),
                format!("sigma must be positive, got {}", self.sigma),
            ));
        }
        let gray = into_luma(image);
        Ok(DynamicImage::ImageLuma8(imageproc::filter::gaussian_blur_f32(
            &gray, self.sigma,
        )))
    }
}

/// Median filter, removes salt-and-pepper specks without softening edges.
#[derive(Debug, Clone, Copy)]
pub struct Median {
    /// Half-width of the square window.
    pub radius: u32,
}

impl Median {
    /// Create a median filter over a `(2 * radius + 1)` square window.
    pub fn new(radius: u32) -> Self {
        Self { radius }
    }
}

impl TransformStep for Median {
    fn name(&self) -> &str {
        "median"
    }

    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        let gray = into_luma(image);
        if self.radius == 0 {
            return Ok(DynamicImage::ImageLuma8(gray));
        }
        Ok(DynamicImage::ImageLuma8(imageproc::filter::median_filter(
            &gray,
            self.radius,
            self.radius,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_blur_rejects_non_positive_sigma() {
        let image = DynamicImage::ImageLuma8(GrayImage::new(4, 4));
        let err = GaussianBlur::new(0.0).apply(image.clone()).unwrap_err();
        assert_eq!(err.step, "gaussian_blur");
        assert!(GaussianBlur::new(f32::NAN).apply(image).is_err());
    }

    #[test]
    fn test_blur_flat_image_stays_flat() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(9, 9, Luma([120])));
        let out = GaussianBlur::new(1.5).apply(image).unwrap();
        assert!(out
            .as_luma8()
            .unwrap()
            .pixels()
            .all(|p| (119..=121).contains(&p[0])));
    }

    #[test]
    fn test_median_removes_speck() {
        let mut gray = GrayImage::from_pixel(5, 5, Luma([255]));
        gray.put_pixel(2, 2, Luma([0]));
        let out = Median::new(1).apply(DynamicImage::ImageLuma8(gray)).unwrap();
        assert_eq!(out.as_luma8().unwrap().get_pixel(2, 2)[0], 255);
    }
}
