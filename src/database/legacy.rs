//! Import of the compact `elements_layering.json` layout.
//!
//! ```json
//! {
//!   "Folders": {
//!     "blue": ["frame", "glow#3366ff"],
//!     "red": [""]
//!   }
//! }
//! ```
//!
//! Each category maps file names to the layers drawn beneath them. The base
//! of icon `<category>/<name>` is `<category>/<name>.png` in the asset
//! directory; each layer is `<layer_dir>/<layer>.png`, where `layer_dir` is
//! configured per category. A `#RRGGBB` suffix tints the layer. Empty names
//! and `"none"` are placeholders and are skipped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{Database, LayerEntry, LayerKind};
use crate::error::{Result, ValidationIssue, ValidationReport};
use crate::layer::Tint;

/// Category → file name → layer names.
pub type LegacyLayering = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Converts a legacy layering document into a validated [`Database`].
///
/// `layer_dirs` maps each category to the directory holding its layer
/// images, relative to `asset_dir` unless absolute. Listed layers are placed
/// below the base in list order: the first one is the bottom-most.
pub fn import(
    json: &str,
    layer_dirs: &BTreeMap<String, PathBuf>,
    asset_dir: impl Into<PathBuf>,
) -> Result<Database> {
    let layering: LegacyLayering = serde_json::from_str(json)?;
    let mut report = ValidationReport::new();
    let mut entries = Vec::new();

    for (category, files) in &layering {
        let layer_dir = layer_dirs.get(category).filter(|dir| !dir.as_os_str().is_empty());

        for (file_name, layer_names) in files {
            let icon_id = format!("{category}/{file_name}");
            entries.push(LayerEntry::new(
                &icon_id,
                Path::new(category).join(format!("{file_name}.png")),
                0,
                LayerKind::Base,
            ));

            let layers: Vec<&str> = layer_names
                .iter()
                .map(String::as_str)
                .filter(|name| !is_placeholder(name))
                .collect();
            if layers.is_empty() {
                continue;
            }
            let Some(layer_dir) = layer_dir else {
                report.push(&icon_id, ValidationIssue::MissingLayerDir(category.clone()));
                continue;
            };

            let count = layers.len() as i32;
            for (i, spec) in layers.into_iter().enumerate() {
                let (name, tint) = match spec.split_once('#') {
                    Some((name, hex)) => match hex.parse::<Tint>() {
                        Ok(tint) => (name, Some(tint)),
                        Err(_) => {
                            report.push(&icon_id, ValidationIssue::InvalidTint(hex.to_string()));
                            (name, None)
                        }
                    },
                    None => (spec, None),
                };
                let mut entry = LayerEntry::new(
                    &icon_id,
                    layer_dir.join(format!("{name}.png")),
                    i as i32 - count,
                    LayerKind::Modifier,
                );
                entry.tint = tint;
                entries.push(entry);
            }
        }
    }

    tracing::debug!(
        "Imported legacy layering: {} categories, {} entries",
        layering.len(),
        entries.len()
    );
    Database::build(entries, asset_dir.into(), report)
}

fn is_placeholder(name: &str) -> bool {
    let name = name.trim();
    name.is_empty() || name.eq_ignore_ascii_case("none")
}
