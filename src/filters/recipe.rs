//! Declarative step lists.
//!
//! A [`StepConfig`] names one built-in step and its parameters. Lists of them
//! come from the `[[steps]]` tables of a configuration file or from the
//! command line (`"threshold:140"`), and are turned into a [`StepChain`].

use crate::core::transform::{StepChain, TransformStep};
use crate::filters::builtin::{
    ContrastStretch, EqualizeHistogram, GaussianBlur, Grayscale, Invert, Median, OtsuThreshold,
    Threshold,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One configured transform step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepConfig {
    /// [`Grayscale`]
    Grayscale,
    /// [`Invert`]
    Invert,
    /// [`ContrastStretch`]
    ContrastStretch,
    /// [`EqualizeHistogram`]
    Equalize,
    /// [`GaussianBlur`]
    GaussianBlur {
        /// Kernel standard deviation.
        sigma: f32,
    },
    /// [`Median`]
    Median {
        /// Window radius.
        radius: u32,
    },
    /// [`Threshold`]
    Threshold {
        /// Brightest value that becomes black.
        level: u8,
    },
    /// [`OtsuThreshold`]
    Otsu,
}

impl StepConfig {
    /// Instantiate the step.
    pub fn build(&self) -> Box<dyn TransformStep> {
        match *self {
            StepConfig::Grayscale => Box::new(Grayscale),
            StepConfig::Invert => Box::new(Invert),
            StepConfig::ContrastStretch => Box::new(ContrastStretch),
            StepConfig::Equalize => Box::new(EqualizeHistogram),
            StepConfig::GaussianBlur { sigma } => Box::new(GaussianBlur::new(sigma)),
            StepConfig::Median { radius } => Box::new(Median::new(radius)),
            StepConfig::Threshold { level } => Box::new(Threshold::new(level)),
            StepConfig::Otsu => Box::new(OtsuThreshold),
        }
    }

    /// Steps used when nothing is configured.
    pub fn default_steps() -> Vec<StepConfig> {
        vec![StepConfig::Grayscale, StepConfig::Otsu]
    }

    /// Names accepted by [`FromStr`], with their parameter if any.
    pub fn catalog() -> &'static [(&'static str, &'static str)] {
        &[
            ("grayscale", ""),
            ("invert", ""),
            ("stretch", ""),
            ("equalize", ""),
            ("blur", "sigma"),
            ("median", "radius"),
            ("threshold", "level"),
            ("otsu", ""),
        ]
    }
}

/// Build a chain running `steps` in order.
pub fn build_chain(steps: &[StepConfig]) -> StepChain {
    let mut chain = StepChain::new();
    for step in steps {
        chain.push(step.build());
    }
    chain
}

/// Error parsing a step from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid step '{input}': {reason}")]
pub struct ParseStepError {
    /// Text that failed to parse.
    pub input: String,
    /// What is wrong with it.
    pub reason: String,
}

impl FromStr for StepConfig {
    type Err = ParseStepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fail = |reason: &str| ParseStepError {
            input: s.to_string(),
            reason: reason.to_string(),
        };
        let (name, arg) = match s.split_once(':') {
            Some((name, arg)) => (name.trim(), Some(arg.trim())),
            None => (s.trim(), None),
        };

        let name = name.to_lowercase();
        let step = match (name.as_str(), arg) {
            ("grayscale" | "gray", None) => StepConfig::Grayscale,
            ("invert", None) => StepConfig::Invert,
            ("stretch" | "contrast_stretch", None) => StepConfig::ContrastStretch,
            ("equalize", None) => StepConfig::Equalize,
            ("otsu", None) => StepConfig::Otsu,
            ("blur" | "gaussian_blur", Some(arg)) => StepConfig::GaussianBlur {
                sigma: arg.parse().map_err(|_| fail("sigma must be a number"))?,
            },
            ("median", Some(arg)) => StepConfig::Median {
                radius: arg.parse().map_err(|_| fail("radius must be a whole number"))?,
            },
            ("threshold", Some(arg)) => StepConfig::Threshold {
                level: arg.parse().map_err(|_| fail("level must be between 0 and 255"))?,
            },
            ("blur" | "gaussian_blur" | "median" | "threshold", None) => {
                return Err(fail("missing parameter"))
            }
            (
                "grayscale" | "gray" | "invert" | "stretch" | "contrast_stretch" | "equalize"
                | "otsu",
                Some(_),
            ) => return Err(fail("takes no parameter")),
            _ => return Err(fail("unknown step")),
        };
        Ok(step)
    }
}

impl fmt::Display for StepConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepConfig::Grayscale => write!(f, "grayscale"),
            StepConfig::Invert => write!(f, "invert"),
            StepConfig::ContrastStretch => write!(f, "stretch"),
            StepConfig::Equalize => write!(f, "equalize"),
            StepConfig::GaussianBlur { sigma } => write!(f, "blur:{}", sigma),
            StepConfig::Median { radius } => write!(f, "median:{}", radius),
            StepConfig::Threshold { level } => write!(f, "threshold:{}", level),
            StepConfig::Otsu => write!(f, "otsu"),
        }
    }
}
