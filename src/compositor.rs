//! Pixel-level stacking of resolved layers.
//!
//! Layers are blended back to front onto a fully transparent canvas the
//! size of the base layer, using the "over" operator. Raster layers of any
//! other size are rejected rather than resized, so icon alignment is never
//! silently corrupted.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{ImageFormat, Rgba, RgbaImage};

use crate::database::LayerEntry;
use crate::error::{Error, Result};
use crate::icon::{IconTarget, SizePx};
use crate::layer::{SourceCache, load_source};
use crate::resolver::LayerStack;

// ============================================================================
// Compositor
// ============================================================================

/// Composites layer stacks and writes the results.
///
/// Sources are resolved against the asset directory. With a
/// [`SourceCache`] attached, background and modifier sources are decoded
/// once and shared; base layers are always decoded fresh since each icon
/// has its own.
#[derive(Debug, Clone)]
pub struct Compositor {
    asset_dir: PathBuf,
    cache: Option<SourceCache>,
}

impl Compositor {
    pub fn new(asset_dir: impl Into<PathBuf>) -> Self {
        Self {
            asset_dir: asset_dir.into(),
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: SourceCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&SourceCache> {
        self.cache.as_ref()
    }

    /// Blends every layer of the stack into one image.
    pub fn composite(&self, stack: &LayerStack) -> Result<RgbaImage> {
        let base = self.load(stack.base(), None)?;
        let size = SizePx::of(&base);
        let mut canvas = RgbaImage::new(size.width, size.height);

        for entry in stack.layers() {
            let layer = if entry.is_base() {
                Arc::clone(&base)
            } else {
                self.load(entry, Some(size))?
            };

            let found = SizePx::of(&layer);
            if found != size {
                return Err(Error::DimensionMismatch {
                    path: self.asset_dir.join(&entry.source_path),
                    expected: size,
                    found,
                });
            }

            composite_over(&mut canvas, &layer, 0, 0);
        }

        Ok(canvas)
    }

    /// Composites a target and writes it as PNG, creating parent
    /// directories as needed. Returns the written path.
    pub fn render(&self, target: &IconTarget) -> Result<PathBuf> {
        let image = self.composite(&target.stack)?;
        write_png(&image, &target.output_path)?;
        Ok(target.output_path.clone())
    }

    fn load(&self, entry: &LayerEntry, canvas: Option<SizePx>) -> Result<Arc<RgbaImage>> {
        let path = self.asset_dir.join(&entry.source_path);
        match &self.cache {
            Some(cache) if !entry.is_base() => cache.get_or_load(&path, entry.tint, canvas),
            _ => load_source(&path, entry.tint, canvas).map(Arc::new),
        }
    }
}

/// Encodes an image as PNG and writes it to `path`.
///
/// The image is encoded in memory first, so an encoding failure never
/// leaves a truncated file behind.
pub fn write_png(image: &RgbaImage, path: &Path) -> Result<()> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|source| Error::Encode {
            path: path.to_path_buf(),
            source,
        })?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    std::fs::write(path, buffer).map_err(|e| Error::io(path, e))
}

// ============================================================================
// Blending
// ============================================================================

/// Composites a source image onto a destination image at the specified position.
///
/// Pixels falling outside the destination are skipped.
pub fn composite_over(dest: &mut RgbaImage, src: &RgbaImage, x: i32, y: i32) {
    let dest_width = dest.width() as i32;
    let dest_height = dest.height() as i32;

    for (sx, sy, src_pixel) in src.enumerate_pixels() {
        let dx = x + sx as i32;
        let dy = y + sy as i32;

        if dx < 0 || dy < 0 || dx >= dest_width || dy >= dest_height {
            continue;
        }

        let dst_pixel = dest.get_pixel_mut(dx as u32, dy as u32);
        *dst_pixel = blend_over(*src_pixel, *dst_pixel);
    }
}

/// Alpha blends two RGBA pixels (foreground over background).
///
/// Over an opaque background this is `fg·a + bg·(1-a)` per channel. Over a
/// translucent one the alphas accumulate Porter-Duff style, so a canvas
/// area no layer covers stays fully transparent. Fully opaque and fully
/// transparent foregrounds return one of the inputs exactly.
pub fn blend_over(fg: Rgba<u8>, bg: Rgba<u8>) -> Rgba<u8> {
    match fg[3] {
        255 => return fg,
        0 => return bg,
        _ => {}
    }

    let fa = fg[3] as f32 / 255.0;
    let ba = bg[3] as f32 / 255.0;
    let out_a = fa + ba * (1.0 - fa);

    let blend = |f: u8, b: u8| -> u8 {
        let ff = f as f32 / 255.0;
        let bf = b as f32 / 255.0;
        let out = (ff * fa + bf * ba * (1.0 - fa)) / out_a;
        (out * 255.0).round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        blend(fg[0], bg[0]),
        blend(fg[1], bg[1]),
        blend(fg[2], bg[2]),
        (out_a * 255.0).round() as u8,
    ])
}

// ============================================================================
// Tests
// ============================================================================
