//! Transform chain capability.
//!
//! The pipeline never looks inside a chain: it holds a [`ChainSnapshot`]
//! taken when the job was submitted and calls [`TransformChain::apply`] on a
//! cache miss. [`StepChain`] is the stock implementation, an ordered list of
//! [`TransformStep`]s.

use crate::core::error::TransformError;
use crate::core::types::{BinaryImage, ChainVersion, SourceImage};
use image::DynamicImage;
use std::fmt;
use std::sync::Arc;

/// A configured `SourceImage -> BinaryImage` function.
pub trait TransformChain: Send + Sync {
    /// Produce the binary image for `source`.
    fn apply(&self, source: &SourceImage) -> Result<BinaryImage, TransformError>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String {
        "transform chain".to_string()
    }
}

impl<F> TransformChain for F
where
    F: Fn(&SourceImage) -> Result<BinaryImage, TransformError> + Send + Sync,
{
    fn apply(&self, source: &SourceImage) -> Result<BinaryImage, TransformError> {
        self(source)
    }
}

/// The chain and version that apply to one source at one point in time.
///
/// A job keeps the snapshot it was submitted with, so a configuration change
/// while the job is running cannot make it mix two configurations.
#[derive(Clone)]
pub struct ChainSnapshot {
    /// Version of the configuration `chain` was built from.
    pub version: ChainVersion,
    /// The chain itself.
    pub chain: Arc<dyn TransformChain>,
}

impl ChainSnapshot {
    /// Create a new snapshot.
    pub fn new(version: ChainVersion, chain: Arc<dyn TransformChain>) -> Self {
        Self { version, chain }
    }
}

impl fmt::Debug for ChainSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainSnapshot")
            .field("version", &self.version)
            .field("chain", &self.chain.describe())
            .finish()
    }
}

/// Hands out the snapshot that applies to a source path.
pub trait ChainProvider: Send + Sync {
    /// Snapshot of the chain currently configured for `source`.
    fn snapshot(&self, source: &std::path::Path) -> ChainSnapshot;
}

/// One image operation inside a [`StepChain`].
pub trait TransformStep: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Apply the operation.
    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, TransformError>;
}

/// Steps applied in order; the final image is reduced to 8-bit luma.
#[derive(Default)]
pub struct StepChain {
    steps: Vec<Box<dyn TransformStep>>,
}

impl StepChain {
    /// Create an empty chain. Applied as-is it only converts to luma.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    pub fn then(mut self, step: impl TransformStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Append an already boxed step.
    pub fn push(&mut self, step: Box<dyn TransformStep>) {
        self.steps.push(step);
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the chain has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step names in application order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

impl TransformChain for StepChain {
    fn apply(&self, source: &SourceImage) -> Result<BinaryImage, TransformError> {
        let mut image = source.image().clone();
        for step in &self.steps {
            image = step.apply(image)?;
        }
        Ok(BinaryImage::from_dynamic(image))
    }

    fn describe(&self) -> String {
        if self.steps.is_empty() {
            "identity".to_string()
        } else {
            self.step_names().join(" -> ")
        }
    }
}

impl fmt::Debug for StepChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.step_names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    struct Invert;

    impl TransformStep for Invert {
        fn name(&self) -> &str {
            "invert"
        }

        fn apply(&self, mut image: DynamicImage) -> Result<DynamicImage, TransformError> {
            image.invert();
            Ok(image)
        }
    }

    struct Broken;

    impl TransformStep for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn apply(&self, _image: DynamicImage) -> Result<DynamicImage, TransformError> {
            Err(TransformError::new("broken", "always fails"))
        }
    }

    fn white_page() -> SourceImage {
        SourceImage::new(
            "page.png",
            DynamicImage::ImageLuma8(GrayImage::from_pixel(3, 2, Luma([255]))),
        )
    }

    #[test]
    fn test_steps_apply_in_order() {
        let chain = StepChain::new().then(Invert).then(Invert).then(Invert);
        assert_eq!(chain.len(), 3);
        let binary = TransformChain::apply(&chain, &white_page()).unwrap();
        assert_eq!(binary.as_luma().get_pixel(1, 1), &Luma([0]));
        assert_eq!(chain.describe(), "invert -> invert -> invert");
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let chain = StepChain::new();
        assert!(chain.is_empty());
        let binary = TransformChain::apply(&chain, &white_page()).unwrap();
        assert_eq!(binary.as_luma().get_pixel(0, 0), &Luma([255]));
        assert_eq!(chain.describe(), "identity");
    }

    #[test]
    fn test_failing_step_stops_chain() {
        let chain = StepChain::new().then(Broken).then(Invert);
        let error = TransformChain::apply(&chain, &white_page()).unwrap_err();
        assert_eq!(error.step, "broken");
    }

    #[test]
    fn test_closure_is_a_chain() {
        let chain = |source: &SourceImage| -> Result<BinaryImage, TransformError> {
            Ok(BinaryImage::from_dynamic(source.image().clone()))
        };
        let snapshot = ChainSnapshot::new(ChainVersion(2), Arc::new(chain));
        let binary = snapshot.chain.apply(&white_page()).unwrap();
        assert_eq!(binary.width(), 3);
        assert!(format!("{:?}", snapshot).contains("ChainVersion(2)"));
    }
}
