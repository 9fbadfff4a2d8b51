//! Value types that flow through the preprocessing pipeline.
//!
//! Pixel buffers are held behind `Arc` so a finished [`ProcessingResult`]
//! can be shared between the result slot, job handles and event consumers
//! without copying page-sized rasters.

use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Per-target submission counter. Sequence `0` is never issued.
pub type Sequence = u64;

/// Identifier of a logical result slot (e.g. "the page currently on screen").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId(pub String);

impl TargetId {
    /// Create a new target identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TargetId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TargetId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque revision token of a transform chain configuration.
///
/// Versions are only ever compared for equality; their numeric order
/// carries no meaning outside the registry that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainVersion(pub u64);

impl ChainVersion {
    /// The version a fresh registry starts at.
    pub const INITIAL: ChainVersion = ChainVersion(0);
}

impl Default for ChainVersion {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for ChainVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A decoded source page together with the path it was read from.
#[derive(Debug, Clone)]
pub struct SourceImage {
    path: PathBuf,
    image: Arc<DynamicImage>,
}

impl SourceImage {
    /// Wrap an already decoded image.
    pub fn new(path: impl Into<PathBuf>, image: DynamicImage) -> Self {
        Self {
            path: path.into(),
            image: Arc::new(image),
        }
    }

    /// Decode an image file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, image::ImageError> {
        let path = path.into();
        let image = image::open(&path)?;
        Ok(Self::new(path, image))
    }

    /// Path the image was decoded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The decoded pixels.
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A two-tone page raster, stored as 8-bit luma.
///
/// Anything a transform chain returns is normalised to `Luma8` here so the
/// cache artifact can be written and read back without loss.
#[derive(Debug, Clone)]
pub struct BinaryImage {
    pixels: Arc<GrayImage>,
}

impl BinaryImage {
    /// Wrap a luma buffer.
    pub fn new(pixels: GrayImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    /// Convert an arbitrary decoded image to luma.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(gray) => Self::new(gray),
            other => Self::new(other.to_luma8()),
        }
    }

    /// The underlying luma buffer.
    pub fn as_luma(&self) -> &GrayImage {
        &self.pixels
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Whether every pixel is either pure black or pure white.
    pub fn is_two_tone(&self) -> bool {
        self.pixels.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255)
    }
}

impl PartialEq for BinaryImage {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
            || (self.pixels.dimensions() == other.pixels.dimensions()
                && self.pixels.as_raw() == other.pixels.as_raw())
    }
}

impl Eq for BinaryImage {}

/// Where the binary image of a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultOrigin {
    /// The transform chain ran during this job.
    Fresh,
    /// The cache artifact was decoded instead of running the chain.
    Cached,
}

impl fmt::Display for ResultOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultOrigin::Fresh => write!(f, "fresh"),
            ResultOrigin::Cached => write!(f, "cached"),
        }
    }
}

/// Everything the controller needs to display a preprocessed page.
///
/// `binary_image` is always derived from `source_image`; a result never
/// pairs a source with a binary computed from another page.
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// Source the job was submitted for.
    pub source_path: PathBuf,
    /// Decoded source pixels.
    pub source_image: SourceImage,
    /// Where the artifact lives (or should have been written).
    pub cache_path: PathBuf,
    /// Output of the transform chain.
    pub binary_image: BinaryImage,
    /// Chain version that produced (or, for a cache hit, validated) the binary image.
    pub chain_version: ChainVersion,
    /// Whether the chain ran or the artifact was reused.
    pub origin: ResultOrigin,
    /// Wall time spent inside the job.
    pub duration: Duration,
}

impl ProcessingResult {
    /// Whether the binary image was read from the cache artifact.
    pub fn is_cached(&self) -> bool {
        self.origin == ResultOrigin::Cached
    }

    /// A serializable description without pixel data.
    pub fn summary(&self) -> ResultSummary {
        ResultSummary {
            source_path: self.source_path.clone(),
            cache_path: self.cache_path.clone(),
            width: self.binary_image.width(),
            height: self.binary_image.height(),
            chain_version: self.chain_version,
            origin: self.origin,
            duration_ms: self.duration.as_millis() as u64,
        }
    }
}

/// Pixel-free view of a [`ProcessingResult`], for logs and JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSummary {
    /// See [`ProcessingResult::source_path`].
    pub source_path: PathBuf,
    /// See [`ProcessingResult::cache_path`].
    pub cache_path: PathBuf,
    /// Width of the binary image.
    pub width: u32,
    /// Height of the binary image.
    pub height: u32,
    /// See [`ProcessingResult::chain_version`].
    pub chain_version: ChainVersion,
    /// See [`ProcessingResult::origin`].
    pub origin: ResultOrigin,
    /// Job duration in milliseconds.
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, RgbImage};

    #[test]
    fn test_binary_from_rgb_is_luma() {
        let rgb = RgbImage::from_pixel(4, 3, image::Rgb([255, 255, 255]));
        let binary = BinaryImage::from_dynamic(DynamicImage::ImageRgb8(rgb));
        assert_eq!(binary.width(), 4);
        assert_eq!(binary.height(), 3);
        assert_eq!(binary.as_luma().get_pixel(0, 0), &Luma([255]));
        assert!(binary.is_two_tone());
    }

    #[test]
    fn test_binary_equality_compares_pixels() {
        let a = BinaryImage::new(GrayImage::from_pixel(2, 2, Luma([0])));
        let b = BinaryImage::new(GrayImage::from_pixel(2, 2, Luma([0])));
        let c = BinaryImage::new(GrayImage::from_pixel(2, 2, Luma([255])));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!BinaryImage::new(GrayImage::from_pixel(1, 1, Luma([7]))).is_two_tone());
    }

    #[test]
    fn test_chain_version_display() {
        assert_eq!(ChainVersion(3).to_string(), "v3");
        assert_eq!(ChainVersion::default(), ChainVersion::INITIAL);
    }

    #[test]
    fn test_target_id_conversions() {
        let a: TargetId = "page".into();
        let b = TargetId::from(String::from("page"));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "page");
        assert_eq!(a.to_string(), "page");
    }
}
