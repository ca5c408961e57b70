//! Layer source loading.
//!
//! A layer source is a file in the asset directory: a raster image decoded
//! through the `image` crate, or an SVG rasterized with resvg. Either kind
//! may carry a [`Tint`].
//!
//! Backgrounds and modifiers are typically shared by hundreds of icons, so
//! decoded sources can be kept in a [`SourceCache`] that all batch workers
//! read from.

pub mod svg;
pub mod tint;

pub use tint::Tint;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use image::RgbaImage;

use crate::error::{Error, Result};
use crate::icon::SizePx;

// ============================================================================
// Source Kind
// ============================================================================

/// How a source file is turned into pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Raster,
    Svg,
}

impl SourceKind {
    /// Classifies a path by its extension (`.svg`, case-insensitive).
    pub fn of(path: &Path) -> Self {
        let is_svg = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"));
        if is_svg { Self::Svg } else { Self::Raster }
    }
}

/// Loads a layer source into RGBA pixels.
///
/// `canvas` is the size of the stack being composited. SVG sources render to
/// exactly that size; raster sources keep their native size so the caller
/// can reject mismatches. `None` renders an SVG at its intrinsic size.
pub fn load_source(path: &Path, tint: Option<Tint>, canvas: Option<SizePx>) -> Result<RgbaImage> {
    match SourceKind::of(path) {
        SourceKind::Svg => {
            let data = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
            svg::render_svg(&data, canvas, tint).map_err(|reason| Error::Svg {
                path: path.to_path_buf(),
                reason,
            })
        }
        SourceKind::Raster => {
            let image = image::open(path).map_err(|e| match e {
                image::ImageError::IoError(source) => Error::io(path, source),
                source => Error::Decode {
                    path: path.to_path_buf(),
                    source,
                },
            })?;
            let rgba = image.to_rgba8();
            Ok(match tint {
                Some(tint) => tint.apply(&rgba),
                None => rgba,
            })
        }
    }
}

// ============================================================================
// CacheKey
// ============================================================================

/// Key for cached decoded sources.
///
/// Raster sources are keyed without a size since they decode at native
/// size; SVG sources are keyed by the canvas they were rendered for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    path: PathBuf,
    tint: Option<Tint>,
    size: Option<SizePx>,
}

impl CacheKey {
    pub fn new(path: &Path, tint: Option<Tint>, canvas: Option<SizePx>) -> Self {
        let size = match SourceKind::of(path) {
            SourceKind::Svg => canvas,
            SourceKind::Raster => None,
        };
        Self {
            path: path.to_path_buf(),
            tint,
            size,
        }
    }
}

// ============================================================================
// SourceCache
// ============================================================================

/// A thread-safe cache of decoded layer sources.
///
/// Cloning a `SourceCache` yields a handle to the same storage. Failed loads
/// are not cached, so every icon that references a broken source reports
/// its own error.
#[derive(Debug, Clone, Default)]
pub struct SourceCache {
    inner: Arc<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: RwLock<HashMap<CacheKey, Arc<RgbaImage>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the decoded source, loading and storing it on first use.
    pub fn get_or_load(
        &self,
        path: &Path,
        tint: Option<Tint>,
        canvas: Option<SizePx>,
    ) -> Result<Arc<RgbaImage>> {
        let key = CacheKey::new(path, tint, canvas);

        {
            let entries = self.inner.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(image) = entries.get(&key) {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(image));
            }
        }

        // Two workers may race to decode the same source; the second insert
        // simply replaces an identical image.
        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        let image = Arc::new(load_source(path, tint, canvas)?);
        let mut entries = self.inner.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, Arc::clone(&image));
        Ok(image)
    }

    /// Number of cached sources.
    pub fn len(&self) -> usize {
        self.inner.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `(hits, misses)` since creation.
    pub fn stats(&self) -> (usize, usize) {
        (
            self.inner.hits.load(Ordering::Relaxed),
            self.inner.misses.load(Ordering::Relaxed),
        )
    }

    /// Drops all cached sources. Useful for freeing memory.
    pub fn clear(&self) {
        self.inner.entries.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn classifies_by_extension() {
        assert_eq!(SourceKind::of(Path::new("a/b.svg")), SourceKind::Svg);
        assert_eq!(SourceKind::of(Path::new("a/b.SVG")), SourceKind::Svg);
        assert_eq!(SourceKind::of(Path::new("a/b.png")), SourceKind::Raster);
        assert_eq!(SourceKind::of(Path::new("noext")), SourceKind::Raster);
    }

    #[test]
    fn raster_cache_key_ignores_canvas() {
        let a = CacheKey::new(Path::new("bg.png"), None, Some(SizePx::new(16, 16)));
        let b = CacheKey::new(Path::new("bg.png"), None, Some(SizePx::new(32, 32)));
        assert_eq!(a, b);

        let a = CacheKey::new(Path::new("bg.svg"), None, Some(SizePx::new(16, 16)));
        let b = CacheKey::new(Path::new("bg.svg"), None, Some(SizePx::new(32, 32)));
        assert_ne!(a, b);
    }

    #[test]
    fn cache_decodes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bg.png");
        RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255])).save(&path).unwrap();

        let cache = SourceCache::new();
        let first = cache.get_or_load(&path, None, None).unwrap();
        let second = cache.clone().get_or_load(&path, None, None).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats(), (1, 1));

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_source(Path::new("/nonexistent/layer.png"), None, None).unwrap_err();
        assert!(matches!(err, Error::Io { .. }), "got {err:?}");
    }

    #[test]
    fn corrupt_file_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        let cache = SourceCache::new();
        assert!(cache.get_or_load(&path, None, None).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn tinted_raster_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255])).save(&path).unwrap();

        let img = load_source(&path, Some(Tint::new(0, 0, 255)), None).unwrap();
        assert_eq!(img.get_pixel(1, 1).0, [0, 0, 255, 255]);
    }
}
