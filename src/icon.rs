//! Icon identifiers, pixel sizes, and render targets.
//!
//! An icon id is a relative, `/`-separated name such as `folders/blue`. It
//! doubles as the output file name, so it must never escape the output
//! directory.

use std::path::{Component, Path, PathBuf};

use image::RgbaImage;

use crate::resolver::LayerStack;

/// File extension of every composited output.
pub const OUTPUT_EXTENSION: &str = "png";

/// A 2D size in pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SizePx {
    pub width: u32,
    pub height: u32,
}

impl SizePx {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns the size of an RGBA image.
    pub fn of(image: &RgbaImage) -> Self {
        Self::new(image.width(), image.height())
    }
}

/// Checks that an icon id is a usable relative output name.
///
/// Returns a short reason on failure.
pub fn check_icon_id(icon_id: &str) -> Result<(), String> {
    if icon_id.trim().is_empty() {
        return Err("empty".into());
    }
    if icon_id.contains('\\') {
        return Err("contains a backslash".into());
    }
    let path = Path::new(icon_id);
    if path.is_absolute() || icon_id.starts_with('/') {
        return Err("absolute path".into());
    }
    for segment in icon_id.split('/') {
        match segment {
            "" => return Err("contains an empty path segment".into()),
            "." | ".." => return Err(format!("contains a '{segment}' segment")),
            _ => {}
        }
    }
    // Catches drive prefixes on Windows.
    if !path.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err("contains a root or prefix component".into());
    }
    Ok(())
}

/// Returns `<output_dir>/<icon_id>.png`.
pub fn output_path(output_dir: &Path, icon_id: &str) -> PathBuf {
    output_dir.join(format!("{icon_id}.{OUTPUT_EXTENSION}"))
}

/// A fully resolved icon: its layer stack and where it is written.
#[derive(Debug, Clone, PartialEq)]
pub struct IconTarget {
    pub stack: LayerStack,
    pub output_path: PathBuf,
}

impl IconTarget {
    pub fn new(stack: LayerStack, output_dir: &Path) -> Self {
        let output_path = output_path(output_dir, stack.icon_id());
        Self { stack, output_path }
    }

    pub fn icon_id(&self) -> &str {
        self.stack.icon_id()
    }
}
