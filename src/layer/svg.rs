//! SVG rasterization using resvg/usvg.
//!
//! SVG layers are rendered straight onto a canvas of the requested size, so
//! they always line up with the raster base they are stacked on.

use image::{Rgba, RgbaImage};
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{Options, Tree};

use super::tint::Tint;
use crate::icon::SizePx;

/// Renders SVG markup to an RGBA image.
///
/// With a `canvas` size the drawing is scaled to fit inside it (aspect ratio
/// preserved, centered) and the result has exactly that size. Without one,
/// the SVG renders at its intrinsic size.
///
/// If `tint` is set, everything the SVG paints takes the tint color while
/// keeping its coverage and opacity. Unpainted (`fill="none"`) areas stay
/// transparent.
pub fn render_svg(
    svg_data: &str,
    canvas: Option<SizePx>,
    tint: Option<Tint>,
) -> Result<RgbaImage, String> {
    let opts = Options::default();
    let tree = Tree::from_str(svg_data, &opts).map_err(|e| e.to_string())?;

    let svg_size = tree.size();
    let (svg_w, svg_h) = (svg_size.width(), svg_size.height());

    let (width, height, transform) = match canvas {
        Some(size) => {
            let scale = (size.width as f32 / svg_w).min(size.height as f32 / svg_h);
            let dx = (size.width as f32 - svg_w * scale) / 2.0;
            let dy = (size.height as f32 - svg_h * scale) / 2.0;
            (
                size.width,
                size.height,
                Transform::from_row(scale, 0.0, 0.0, scale, dx, dy),
            )
        }
        None => (
            svg_w.ceil() as u32,
            svg_h.ceil() as u32,
            Transform::identity(),
        ),
    };

    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| format!("cannot allocate a {width}x{height} canvas"))?;
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    Ok(to_rgba_image(&pixmap, tint))
}

/// Copies a premultiplied pixmap into a straight-alpha image, optionally
/// replacing every painted color with `tint`.
fn to_rgba_image(pixmap: &Pixmap, tint: Option<Tint>) -> RgbaImage {
    let mut img = RgbaImage::new(pixmap.width(), pixmap.height());

    for (src, dst) in pixmap.pixels().iter().zip(img.pixels_mut()) {
        let alpha = src.alpha();
        *dst = match tint {
            _ if alpha == 0 => Rgba([0, 0, 0, 0]),
            Some(tint) => Rgba([tint.r, tint.g, tint.b, alpha]),
            None => {
                let color = src.demultiply();
                Rgba([color.red(), color.green(), color.blue(), alpha])
            }
        };
    }

    img
}
