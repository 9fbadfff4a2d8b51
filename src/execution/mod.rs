//! Execution module.
//!
//! Background jobs, the cache artifact store and the result slots that
//! order job outcomes.

pub mod cache;
pub mod events;
pub mod pipeline;
pub mod slot;

pub use cache::{ArtifactFormat, CacheStats, CacheStore};
pub use events::{JobHandle, JobOutcome, PipelineEvent};
pub use pipeline::{PipelineOptions, PreprocessingPipeline};
pub use slot::ResultSlot;
