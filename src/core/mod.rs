//! Core types and capabilities of the preprocessing pipeline.
//!
//! This module contains:
//! - Value types (source and binary images, results, versions)
//! - Error types
//! - The transform chain capability and step composition
//! - Change tracking

pub mod error;
pub mod tracker;
pub mod transform;
pub mod types;

// Re-export commonly used types
pub use error::{CacheWarning, PipelineError, PrepError, TransformError};
pub use tracker::{ChainRegistry, ChangeTracker};
pub use transform::{ChainProvider, ChainSnapshot, StepChain, TransformChain, TransformStep};
pub use types::{
    BinaryImage, ChainVersion, ProcessingResult, ResultOrigin, ResultSummary, Sequence,
    SourceImage, TargetId,
};
