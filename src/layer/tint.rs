//! Recoloring of grayscale mask layers.

use std::fmt;
use std::str::FromStr;

use image::{DynamicImage, Rgba, RgbaImage};
use palette::Srgb;

/// Luma values below this keep their gray tone when tinting, so dark
/// outlines in a mask stay dark.
pub const TINT_THRESHOLD: u8 = 37;

/// A tint color applied to a grayscale mask.
///
/// Parsed from `#RRGGBB` or `RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tint {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Tint {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Returns the color as lowercase `#rrggbb`.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Recolors a raster layer.
    ///
    /// The image is reduced to luma+alpha first. Pixels at or above
    /// [`TINT_THRESHOLD`] take `luma * tint / 255` per channel, darker pixels
    /// stay gray. Alpha is preserved.
    pub fn apply(&self, image: &RgbaImage) -> RgbaImage {
        let gray = DynamicImage::ImageRgba8(image.clone()).to_luma_alpha8();
        RgbaImage::from_fn(gray.width(), gray.height(), |x, y| {
            let [luma, alpha] = gray.get_pixel(x, y).0;
            if luma < TINT_THRESHOLD {
                Rgba([luma, luma, luma, alpha])
            } else {
                let scale = |c: u8| (luma as u16 * c as u16 / 255) as u8;
                Rgba([scale(self.r), scale(self.g), scale(self.b), alpha])
            }
        })
    }
}

impl FromStr for Tint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 {
            return Err(format!("expected 6 hex digits, got '{s}'"));
        }
        let color: Srgb<u8> = hex.parse().map_err(|e| format!("'{s}': {e}"))?;
        Ok(Self::new(color.red, color.green, color.blue))
    }
}

impl fmt::Display for Tint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
