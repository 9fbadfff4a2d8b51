//! Change tracking for transform chain configuration.
//!
//! The pipeline only ever asks [`ChangeTracker::has_changed`]. Keeping
//! track of what was last applied to each page is the controller's job;
//! [`ChainRegistry`] is the controller-side store that does it.

use crate::core::transform::{ChainProvider, ChainSnapshot, TransformChain};
use crate::core::types::{ChainVersion, ProcessingResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Answers whether the chain configured for a source differs from the one
/// last applied to it.
pub trait ChangeTracker: Send + Sync {
    /// `true` if `source` must be recomputed regardless of any artifact.
    fn has_changed(&self, source: &Path) -> bool;
}

/// Versioned chain configuration with per-source overrides.
///
/// Every configuration change issues a new [`ChainVersion`]. A source is
/// reported as changed when the version that applies to it now differs from
/// the version last recorded for it. Sources never recorded in this session
/// are compared against the version the registry started with, so artifacts
/// left by an earlier run are reused until the configuration is edited.
pub struct ChainRegistry {
    state: RwLock<RegistryState>,
}

struct RegistryState {
    baseline: ChainVersion,
    last_issued: u64,
    default: ChainSnapshot,
    overrides: HashMap<PathBuf, ChainSnapshot>,
    applied: HashMap<PathBuf, ChainVersion>,
}

impl RegistryState {
    fn issue(&mut self) -> ChainVersion {
        self.last_issued += 1;
        ChainVersion(self.last_issued)
    }

    fn snapshot_for(&self, source: &Path) -> &ChainSnapshot {
        self.overrides.get(source).unwrap_or(&self.default)
    }
}

impl ChainRegistry {
    /// Create a registry whose default chain is at [`ChainVersion::INITIAL`].
    pub fn new(default_chain: Arc<dyn TransformChain>) -> Self {
        let baseline = ChainVersion::INITIAL;
        Self {
            state: RwLock::new(RegistryState {
                baseline,
                last_issued: baseline.0,
                default: ChainSnapshot::new(baseline, default_chain),
                overrides: HashMap::new(),
                applied: HashMap::new(),
            }),
        }
    }

    /// Create a registry with per-source chains installed at the starting
    /// version, as when they are loaded from a configuration file.
    pub fn with_overrides<I>(default_chain: Arc<dyn TransformChain>, overrides: I) -> Self
    where
        I: IntoIterator<Item = (PathBuf, Arc<dyn TransformChain>)>,
    {
        let registry = Self::new(default_chain);
        {
            let mut state = registry.state.write();
            let baseline = state.baseline;
            for (source, chain) in overrides {
                state
                    .overrides
                    .insert(source, ChainSnapshot::new(baseline, chain));
            }
        }
        registry
    }

    /// Replace the default chain. Every source without an override becomes
    /// changed.
    pub fn set_default(&self, chain: Arc<dyn TransformChain>) -> ChainVersion {
        let mut state = self.state.write();
        let version = state.issue();
        log::info!("default transform chain set to {} ({})", version, chain.describe());
        state.default = ChainSnapshot::new(version, chain);
        version
    }

    /// Keep the default chain but issue a new version for it, forcing
    /// recomputation of every source that uses it.
    pub fn invalidate_default(&self) -> ChainVersion {
        let mut state = self.state.write();
        let version = state.issue();
        state.default.version = version;
        log::debug!("default transform chain invalidated, now {}", version);
        version
    }

    /// Install a chain for one source only.
    pub fn set_for(&self, source: impl Into<PathBuf>, chain: Arc<dyn TransformChain>) -> ChainVersion {
        let source = source.into();
        let mut state = self.state.write();
        let version = state.issue();
        log::debug!("transform chain for {} set to {}", source.display(), version);
        state.overrides.insert(source, ChainSnapshot::new(version, chain));
        version
    }

    /// Remove a per-source chain. Returns `false` if there was none.
    ///
    /// The source is then reported as changed until the default chain has
    /// been recorded for it, even when the override and the default shared a
    /// version.
    pub fn clear_for(&self, source: &Path) -> bool {
        let mut state = self.state.write();
        if state.overrides.remove(source).is_none() {
            return false;
        }
        let retired = state.issue();
        state.applied.insert(source.to_path_buf(), retired);
        log::debug!("transform chain for {} cleared ({} retired)", source.display(), retired);
        true
    }

    /// Whether `source` has its own chain.
    pub fn has_override(&self, source: &Path) -> bool {
        self.state.read().overrides.contains_key(source)
    }

    /// Version that applies to `source` right now.
    pub fn current_version(&self, source: &Path) -> ChainVersion {
        self.state.read().snapshot_for(source).version
    }

    /// Version last recorded as applied to `source`, if any.
    pub fn last_applied(&self, source: &Path) -> Option<ChainVersion> {
        self.state.read().applied.get(source).copied()
    }

    /// Record that `version` has been applied to `source`.
    pub fn mark_applied(&self, source: impl Into<PathBuf>, version: ChainVersion) {
        self.state.write().applied.insert(source.into(), version);
    }

    /// Record the version a finished job used.
    pub fn record(&self, result: &ProcessingResult) {
        self.mark_applied(result.source_path.clone(), result.chain_version);
    }

    /// Forget everything recorded for `source`.
    pub fn forget(&self, source: &Path) {
        self.state.write().applied.remove(source);
    }
}

impl ChangeTracker for ChainRegistry {
    fn has_changed(&self, source: &Path) -> bool {
        let state = self.state.read();
        let reference = state.applied.get(source).copied().unwrap_or(state.baseline);
        state.snapshot_for(source).version != reference
    }
}

impl ChainProvider for ChainRegistry {
    fn snapshot(&self, source: &Path) -> ChainSnapshot {
        self.state.read().snapshot_for(source).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::TransformError;
    use crate::core::types::{BinaryImage, SourceImage};

    fn identity() -> Arc<dyn TransformChain> {
        Arc::new(|source: &SourceImage| -> Result<BinaryImage, TransformError> {
            Ok(BinaryImage::from_dynamic(source.image().clone()))
        })
    }

    #[test]
    fn test_unrecorded_source_unchanged_at_start() {
        let registry = ChainRegistry::new(identity());
        assert!(!registry.has_changed(Path::new("a.png")));
        assert_eq!(registry.current_version(Path::new("a.png")), ChainVersion::INITIAL);
        assert_eq!(registry.last_applied(Path::new("a.png")), None);
    }

    #[test]
    fn test_default_change_marks_all_changed() {
        let registry = ChainRegistry::new(identity());
        let version = registry.set_default(identity());
        assert_ne!(version, ChainVersion::INITIAL);
        assert!(registry.has_changed(Path::new("a.png")));
        assert!(registry.has_changed(Path::new("b.png")));

        registry.mark_applied("a.png", version);
        assert!(!registry.has_changed(Path::new("a.png")));
        assert!(registry.has_changed(Path::new("b.png")));
    }

    #[test]
    fn test_override_only_affects_its_source() {
        let registry = ChainRegistry::new(identity());
        let version = registry.set_for("a.png", identity());
        assert!(registry.has_override(Path::new("a.png")));
        assert!(registry.has_changed(Path::new("a.png")));
        assert!(!registry.has_changed(Path::new("b.png")));
        assert_eq!(registry.snapshot(Path::new("a.png")).version, version);

        registry.mark_applied("a.png", version);
        assert!(!registry.has_changed(Path::new("a.png")));

        // Falling back to the default is itself a change.
        assert!(registry.clear_for(Path::new("a.png")));
        assert!(registry.has_changed(Path::new("a.png")));
        assert!(!registry.clear_for(Path::new("a.png")));
    }

    #[test]
    fn test_invalidate_default_keeps_chain() {
        let registry = ChainRegistry::new(identity());
        let before = registry.snapshot(Path::new("a.png"));
        let version = registry.invalidate_default();
        let after = registry.snapshot(Path::new("a.png"));
        assert!(Arc::ptr_eq(&before.chain, &after.chain));
        assert_eq!(after.version, version);
        assert!(registry.has_changed(Path::new("a.png")));
    }

    #[test]
    fn test_initial_overrides_are_unchanged() {
        let special = identity();
        let registry = ChainRegistry::with_overrides(
            identity(),
            vec![(PathBuf::from("a.png"), Arc::clone(&special))],
        );
        assert!(registry.has_override(Path::new("a.png")));
        assert!(!registry.has_changed(Path::new("a.png")));
        assert!(Arc::ptr_eq(&registry.snapshot(Path::new("a.png")).chain, &special));

        // Later edits still issue fresh versions.
        let version = registry.set_for("a.png", identity());
        assert!(version > ChainVersion::INITIAL);
        assert!(registry.has_changed(Path::new("a.png")));
    }

    #[test]
    fn test_clearing_initial_override_is_a_change() {
        let registry = ChainRegistry::with_overrides(
            identity(),
            vec![(PathBuf::from("a.png"), identity())],
        );
        registry.mark_applied("a.png", registry.current_version(Path::new("a.png")));
        assert!(!registry.has_changed(Path::new("a.png")));

        assert!(registry.clear_for(Path::new("a.png")));
        assert!(registry.has_changed(Path::new("a.png")));
        assert!(!registry.has_changed(Path::new("b.png")));

        registry.mark_applied("a.png", registry.current_version(Path::new("a.png")));
        assert!(!registry.has_changed(Path::new("a.png")));
    }

    #[test]
    fn test_forget_returns_to_baseline() {
        let registry = ChainRegistry::new(identity());
        registry.mark_applied("a.png", ChainVersion(9));
        assert!(registry.has_changed(Path::new("a.png")));
        registry.forget(Path::new("a.png"));
        assert!(!registry.has_changed(Path::new("a.png")));
    }
}
