//! Built-in transform steps.

mod blur;
mod color;
mod threshold;

pub use blur::{GaussianBlur, Median};
pub use color::{ContrastStretch, EqualizeHistogram, Grayscale, Invert};
pub use threshold::{OtsuThreshold, Threshold};
