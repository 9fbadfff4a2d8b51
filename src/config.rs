//! Configuration file support.
//!
//! ```toml
//! output_dir = "cache"
//!
//! [pipeline]
//! worker_threads = 4
//! artifact_format = "png"
//!
//! [[steps]]
//! kind = "grayscale"
//!
//! [[steps]]
//! kind = "otsu"
//!
//! [[overrides."scans/cover.jpg"]]
//! kind = "threshold"
//! level = 90
//! ```

use crate::core::error::PrepResult;
use crate::core::tracker::ChainRegistry;
use crate::core::transform::TransformChain;
use crate::execution::pipeline::PipelineOptions;
use crate::filters::recipe::{build_chain, StepConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepConfig {
    /// Where artifacts are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Worker pool and cache options.
    #[serde(default)]
    pub pipeline: PipelineOptions,

    /// Default chain for every source.
    #[serde(default = "StepConfig::default_steps")]
    pub steps: Vec<StepConfig>,

    /// Chains for individual sources, keyed by source path.
    #[serde(default)]
    pub overrides: BTreeMap<PathBuf, Vec<StepConfig>>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("preprocessed")
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            pipeline: PipelineOptions::default(),
            steps: StepConfig::default_steps(),
            overrides: BTreeMap::new(),
        }
    }
}

impl PrepConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> PrepResult<Self> {
        let config: Self = toml::from_str(text)?;
        log::debug!(
            "loaded configuration: {} steps, {} overrides",
            config.steps.len(),
            config.overrides.len()
        );
        Ok(config)
    }

    /// Read a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> PrepResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Build a registry holding the default chain and every override.
    pub fn build_registry(&self) -> ChainRegistry {
        let default_chain: Arc<dyn TransformChain> = Arc::new(build_chain(&self.steps));
        let overrides = self.overrides.iter().map(|(source, steps)| {
            let chain: Arc<dyn TransformChain> = Arc::new(build_chain(steps));
            (source.clone(), chain)
        });
        ChainRegistry::with_overrides(default_chain, overrides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tracker::ChangeTracker;
    use crate::core::transform::ChainProvider;
    use crate::execution::cache::ArtifactFormat;

    const SAMPLE: &str = r#"
        output_dir = "cache"

        [pipeline]
        worker_threads = 4
        artifact_format = "bmp"

        [[steps]]
        kind = "grayscale"

        [[steps]]
        kind = "gaussian_blur"
        sigma = 0.8

        [[steps]]
        kind = "otsu"

        [[overrides."scans/cover.jpg"]]
        kind = "threshold"
        level = 90
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = PrepConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("cache"));
        assert_eq!(config.pipeline.worker_threads, 4);
        assert_eq!(config.pipeline.artifact_format, ArtifactFormat::Bmp);
        assert_eq!(config.steps.len(), 3);
        assert_eq!(
            config.overrides[Path::new("scans/cover.jpg")],
            vec![StepConfig::Threshold { level: 90 }]
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        assert_eq!(PrepConfig::from_toml_str("").unwrap(), PrepConfig::default());
    }

    #[test]
    fn test_unknown_step_kind_is_error() {
        let text = "[[steps]]\nkind = \"sharpen\"\n";
        assert!(PrepConfig::from_toml_str(text).is_err());
    }

    #[test]
    fn test_registry_from_config() {
        let config = PrepConfig::from_toml_str(SAMPLE).unwrap();
        let registry = config.build_registry();

        let cover = Path::new("scans/cover.jpg");
        assert!(registry.has_override(cover));
        assert!(!registry.has_changed(cover));
        assert_eq!(registry.snapshot(cover).chain.describe(), "threshold");
        assert_eq!(
            registry.snapshot(Path::new("scans/p1.jpg")).chain.describe(),
            "grayscale -> gaussian_blur -> otsu"
        );
    }

    #[test]
    fn test_read_from_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("pageprep.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(PrepConfig::from_toml_file(&path).unwrap().steps.len(), 3);
        assert!(PrepConfig::from_toml_file(temp.path().join("missing.toml")).is_err());
    }
}
