//! Cache artifact store.
//!
//! Maps a source page to its artifact path under a destination directory
//! and reads and writes binary images there. Writes go to a temporary file
//! in the same directory which is then renamed over the artifact, so a
//! concurrent reader sees either the old artifact or the new one.

use crate::core::error::CacheWarning;
use crate::core::types::BinaryImage;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

/// Lossless formats an artifact can be stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    /// Deflate-compressed PNG.
    #[default]
    Png,
    /// Uncompressed TIFF.
    Tiff,
    /// Windows bitmap.
    Bmp,
}

impl ArtifactFormat {
    /// File extension of artifacts in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactFormat::Png => "png",
            ArtifactFormat::Tiff => "tiff",
            ArtifactFormat::Bmp => "bmp",
        }
    }

    /// Convert to image crate's ImageFormat.
    pub fn to_image_format(&self) -> image::ImageFormat {
        match self {
            ArtifactFormat::Png => image::ImageFormat::Png,
            ArtifactFormat::Tiff => image::ImageFormat::Tiff,
            ArtifactFormat::Bmp => image::ImageFormat::Bmp,
        }
    }

    /// Parse a format name as used in configuration files.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "png" => Some(ArtifactFormat::Png),
            "tif" | "tiff" => Some(ArtifactFormat::Tiff),
            "bmp" => Some(ArtifactFormat::Bmp),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactFormat::Png => write!(f, "PNG"),
            ArtifactFormat::Tiff => write!(f, "TIFF"),
            ArtifactFormat::Bmp => write!(f, "BMP"),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Artifacts decoded instead of running the chain.
    pub hits: u64,
    /// Lookups that found no usable artifact.
    pub misses: u64,
    /// Artifacts that existed but could not be decoded.
    pub unreadable: u64,
    /// Artifacts that decoded but did not fit the source they were read for.
    pub mismatched: u64,
    /// Artifacts written.
    pub writes: u64,
    /// Artifact writes that failed.
    pub write_failures: u64,
}

impl CacheStats {
    /// Calculate hit ratio.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

/// Filesystem-backed artifact store.
pub struct CacheStore {
    format: ArtifactFormat,
    stats: Mutex<CacheStats>,
}

impl CacheStore {
    /// Create a store writing artifacts in `format`.
    pub fn new(format: ArtifactFormat) -> Self {
        Self {
            format,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Artifact format of this store.
    pub fn format(&self) -> ArtifactFormat {
        self.format
    }

    /// Artifact path for `source` under `destination`: the source file name
    /// with its extension replaced by the artifact extension.
    ///
    /// Only the file name of `source` is used, so the result does not depend
    /// on where the source lives.
    pub fn cache_path(&self, destination: &Path, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .or_else(|| source.file_name())
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| "page".into());
        let mut file_name = stem;
        file_name.push(".");
        file_name.push(self.format.extension());
        destination.join(file_name)
    }

    /// Create `destination` and its parents. Succeeds if it already exists.
    pub fn ensure_dir(&self, destination: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(destination)
    }

    /// Whether an artifact file is present at `path`.
    pub fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Whether `artifact` and `source` name the same file on disk.
    ///
    /// Paths that cannot be resolved are treated as distinct.
    pub fn is_source(&self, artifact: &Path, source: &Path) -> bool {
        match (std::fs::canonicalize(artifact), std::fs::canonicalize(source)) {
            (Ok(artifact), Ok(source)) => artifact == source,
            _ => false,
        }
    }

    /// Decode the artifact at `path`.
    ///
    /// Returns `Ok(None)` when there is no artifact and a
    /// [`CacheWarning::ArtifactRead`] when there is one that cannot be used.
    pub fn load(&self, path: &Path) -> Result<Option<BinaryImage>, CacheWarning> {
        self.load_checked(path, None)
    }

    /// Like [`load`](Self::load), but an artifact whose size differs from
    /// `dimensions` is rejected with [`CacheWarning::ArtifactMismatch`].
    pub fn load_matching(
        &self,
        path: &Path,
        dimensions: (u32, u32),
    ) -> Result<Option<BinaryImage>, CacheWarning> {
        self.load_checked(path, Some(dimensions))
    }

    fn load_checked(
        &self,
        path: &Path,
        dimensions: Option<(u32, u32)>,
    ) -> Result<Option<BinaryImage>, CacheWarning> {
        if !self.exists(path) {
            self.stats.lock().misses += 1;
            return Ok(None);
        }

        let image = match image::open(path) {
            Ok(image) => BinaryImage::from_dynamic(image),
            Err(e) => {
                let mut stats = self.stats.lock();
                stats.misses += 1;
                stats.unreadable += 1;
                return Err(CacheWarning::ArtifactRead {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                });
            }
        };

        if let Some((width, height)) = dimensions {
            if (image.width(), image.height()) != (width, height) {
                let mut stats = self.stats.lock();
                stats.misses += 1;
                stats.mismatched += 1;
                return Err(CacheWarning::ArtifactMismatch {
                    path: path.to_path_buf(),
                    error: format!(
                        "artifact is {}x{}, source is {}x{}",
                        image.width(),
                        image.height(),
                        width,
                        height
                    ),
                });
            }
        }

        self.stats.lock().hits += 1;
        Ok(Some(image))
    }

    /// Write `image` to `path`, replacing any existing artifact atomically.
    pub fn store(&self, path: &Path, image: &BinaryImage) -> Result<(), CacheWarning> {
        let result = self.write_atomic(path, image);
        let mut stats = self.stats.lock();
        match result {
            Ok(()) => {
                stats.writes += 1;
                Ok(())
            }
            Err(error) => {
                stats.write_failures += 1;
                Err(CacheWarning::ArtifactWrite {
                    path: path.to_path_buf(),
                    error,
                })
            }
        }
    }

    fn write_atomic(&self, path: &Path, image: &BinaryImage) -> Result<(), String> {
        let mut encoded = Cursor::new(Vec::new());
        image
            .as_luma()
            .write_to(&mut encoded, self.format.to_image_format())
            .map_err(|e| format!("Failed to encode artifact: {}", e))?;

        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut staging = tempfile::Builder::new()
            .prefix(".pageprep-")
            .suffix(".partial")
            .tempfile_in(directory)
            .map_err(|e| format!("Failed to create staging file: {}", e))?;
        staging
            .write_all(encoded.get_ref())
            .and_then(|_| staging.as_file().sync_all())
            .map_err(|e| format!("Failed to write staging file: {}", e))?;
        staging
            .persist(path)
            .map_err(|e| format!("Failed to replace artifact: {}", e.error))?;
        Ok(())
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(ArtifactFormat::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn checkerboard(width: u32, height: u32) -> BinaryImage {
        BinaryImage::new(GrayImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([0])
            } else {
                Luma([255])
            }
        }))
    }

    #[test]
    fn test_cache_path_replaces_extension() {
        let store = CacheStore::default();
        let path = store.cache_path(Path::new("/out"), Path::new("/scans/pageA.tif"));
        assert_eq!(path, PathBuf::from("/out/pageA.png"));

        // Stable across recomputation.
        assert_eq!(
            path,
            store.cache_path(Path::new("/out"), Path::new("/scans/pageA.tif"))
        );
    }

    #[test]
    fn test_cache_path_without_extension() {
        let store = CacheStore::new(ArtifactFormat::Tiff);
        let path = store.cache_path(Path::new("out"), Path::new("scan_0001"));
        assert_eq!(path, PathBuf::from("out/scan_0001.tiff"));
    }

    #[test]
    fn test_cache_path_keeps_inner_dots() {
        let store = CacheStore::default();
        let path = store.cache_path(Path::new("out"), Path::new("book.vol1.page3.jpg"));
        assert_eq!(path, PathBuf::from("out/book.vol1.page3.png"));
    }

    #[test]
    fn test_ensure_dir_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let store = CacheStore::default();
        let destination = temp.path().join("a").join("b");

        store.ensure_dir(&destination).unwrap();
        std::fs::write(destination.join("keep.txt"), b"contents").unwrap();
        store.ensure_dir(&destination).unwrap();

        assert_eq!(
            std::fs::read(destination.join("keep.txt")).unwrap(),
            b"contents"
        );
    }

    #[test]
    fn test_store_then_load_is_pixel_identical() {
        let temp = tempfile::tempdir().unwrap();
        for format in [ArtifactFormat::Png, ArtifactFormat::Tiff, ArtifactFormat::Bmp] {
            let store = CacheStore::new(format);
            let path = store.cache_path(temp.path(), Path::new("page.jpg"));
            let image = checkerboard(17, 9);

            store.store(&path, &image).unwrap();
            let loaded = store.load(&path).unwrap().unwrap();
            assert_eq!(loaded, image, "format {}", format);
        }
    }

    #[test]
    fn test_store_leaves_no_staging_files() {
        let temp = tempfile::tempdir().unwrap();
        let store = CacheStore::default();
        let path = store.cache_path(temp.path(), Path::new("page.jpg"));

        store.store(&path, &checkerboard(4, 4)).unwrap();
        store.store(&path, &checkerboard(6, 6)).unwrap();

        let entries: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("page.png")]);
        assert_eq!(store.load(&path).unwrap().unwrap().width(), 6);
        assert_eq!(store.stats().writes, 2);
    }

    #[test]
    fn test_load_missing_is_none() {
        let temp = tempfile::tempdir().unwrap();
        let store = CacheStore::default();
        let result = store.load(&temp.path().join("missing.png")).unwrap();
        assert!(result.is_none());
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_load_corrupt_is_warning() {
        let temp = tempfile::tempdir().unwrap();
        let store = CacheStore::default();
        let path = temp.path().join("page.png");
        std::fs::write(&path, b"not a png").unwrap();

        let warning = store.load(&path).unwrap_err();
        assert!(matches!(warning, CacheWarning::ArtifactRead { .. }));
        assert_eq!(store.stats().unreadable, 1);
    }

    #[test]
    fn test_load_matching_rejects_other_size() {
        let temp = tempfile::tempdir().unwrap();
        let store = CacheStore::default();
        let path = store.cache_path(temp.path(), Path::new("page.jpg"));
        store.store(&path, &checkerboard(8, 5)).unwrap();

        assert!(store.load_matching(&path, (8, 5)).unwrap().is_some());
        let warning = store.load_matching(&path, (5, 8)).unwrap_err();
        assert!(matches!(warning, CacheWarning::ArtifactMismatch { .. }));
        assert!(warning.to_string().contains("8x5"));

        let stats = store.stats();
        assert_eq!((stats.hits, stats.misses, stats.mismatched), (1, 1, 1));
    }

    #[test]
    fn test_is_source_resolves_paths() {
        let temp = tempfile::tempdir().unwrap();
        let store = CacheStore::default();
        let source = temp.path().join("pageA.png");
        std::fs::write(&source, b"scan").unwrap();

        let artifact = store.cache_path(&temp.path().join("."), &source);
        assert!(store.is_source(&artifact, &source));
        assert!(!store.is_source(&store.cache_path(&temp.path().join("out"), &source), &source));
        assert!(!store.is_source(&temp.path().join("missing.png"), &source));
    }

    #[test]
    fn test_store_into_missing_directory_is_warning() {
        let temp = tempfile::tempdir().unwrap();
        let store = CacheStore::default();
        let path = temp.path().join("missing").join("page.png");

        let warning = store.store(&path, &checkerboard(2, 2)).unwrap_err();
        assert!(matches!(warning, CacheWarning::ArtifactWrite { .. }));
        assert_eq!(store.stats().write_failures, 1);
    }

    #[test]
    fn test_hit_ratio() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_ratio(), 0.75);
        assert_eq!(CacheStats::default().hit_ratio(), 0.0);
    }

    #[test]
    fn test_format_names() {
        assert_eq!(ArtifactFormat::from_name("TIF"), Some(ArtifactFormat::Tiff));
        assert_eq!(ArtifactFormat::from_name("jpg"), None);
        assert_eq!(ArtifactFormat::default().extension(), "png");
    }
}
