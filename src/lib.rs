//! # pageprep - Background page binarization with an artifact cache
//!
//! pageprep turns scanned page images into two-tone images ready for OCR.
//! Work runs on a background worker pool; every computed page is written
//! next to the others as a lossless artifact and reused as long as the
//! transform chain configured for it stays the same.
//!
//! ## Features
//!
//! - **Background jobs**: `submit` returns immediately with a [`JobHandle`]
//! - **Artifact cache**: unchanged pages are decoded from disk instead of
//!   recomputed; artifacts are replaced atomically
//! - **Submission order**: when several jobs for one target overlap, the
//!   visible result is the one submitted last, whatever order they finish in
//! - **Configurable chains**: default and per-source step lists, versioned
//!   so any edit invalidates exactly the pages it affects
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pageprep::prelude::*;
//! use std::sync::Arc;
//!
//! let chain = build_chain(&[StepConfig::Grayscale, StepConfig::Otsu]);
//! let registry = Arc::new(ChainRegistry::new(Arc::new(chain)));
//! let pipeline =
//!     PreprocessingPipeline::with_registry(PipelineOptions::default(), registry.clone())?;
//!
//! let handle = pipeline.submit("page", "scans/page1.tif", "preprocessed");
//! if let JobOutcome::Published { result, .. } = handle.wait() {
//!     registry.record(&result);
//!     println!("{}", result.cache_path.display());
//! }
//! # Ok::<(), pageprep::PrepError>(())
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: value types, errors, transform chains and change tracking
//! - [`execution`]: worker pool, artifact store and result slots
//! - [`filters`]: built-in transform steps and step lists
//! - [`config`]: TOML configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod execution;
pub mod filters;

pub use crate::core::error::{PipelineError, PrepError, PrepResult};
pub use crate::execution::events::JobHandle;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use pageprep::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::core::types::{
        BinaryImage, ChainVersion, ProcessingResult, ResultOrigin, ResultSummary, Sequence,
        SourceImage, TargetId,
    };

    // Errors
    pub use crate::core::error::{
        CacheWarning, PipelineError, PrepError, PrepResult, TransformError,
    };

    // Chains and change tracking
    pub use crate::core::tracker::{ChainRegistry, ChangeTracker};
    pub use crate::core::transform::{
        ChainProvider, ChainSnapshot, StepChain, TransformChain, TransformStep,
    };

    // Execution
    pub use crate::execution::cache::{ArtifactFormat, CacheStats, CacheStore};
    pub use crate::execution::events::{JobHandle, JobOutcome, PipelineEvent};
    pub use crate::execution::pipeline::{PipelineOptions, PreprocessingPipeline};
    pub use crate::execution::slot::ResultSlot;

    // Filters
    pub use crate::filters::builtin::{
        ContrastStretch, EqualizeHistogram, GaussianBlur, Grayscale, Invert, Median, OtsuThreshold,
        Threshold,
    };
    pub use crate::filters::recipe::{build_chain, StepConfig};

    // Configuration
    pub use crate::config::PrepConfig;
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
