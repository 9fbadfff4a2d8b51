//! Filter module.
//!
//! Contains the built-in transform steps and the declarative step lists
//! used to configure them.

pub mod builtin;
pub mod recipe;

pub use builtin::{
    ContrastStretch, EqualizeHistogram, GaussianBlur, Grayscale, Invert, Median, OtsuThreshold,
    Threshold,
};
pub use recipe::{build_chain, ParseStepError, StepConfig};
