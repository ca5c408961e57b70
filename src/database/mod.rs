//! The layer database: which layers make up each icon.
//!
//! A database is loaded once from JSON, validated as a whole, and then
//! shared read-only by every batch worker.
//!
//! # JSON Format
//!
//! ```json
//! {
//!   "icons": {
//!     "folders/blue": [
//!       { "source": "base/folders/blue.png", "kind": "base" },
//!       { "source": "frames/round.png", "kind": "background", "z": -10 },
//!       { "source": "badges/star.svg", "kind": "modifier", "z": 10, "tint": "#ffcc00" }
//!     ]
//!   }
//! }
//! ```
//!
//! Source paths are relative to the asset directory given at load time.

pub mod legacy;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, ValidationIssue, ValidationReport};
use crate::icon::check_icon_id;
use crate::layer::Tint;

// ============================================================================
// Layer Entries
// ============================================================================

/// The role a layer plays in an icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    /// The icon itself. Exactly one per icon; fixes the canvas size.
    Base,
    /// A backdrop, replaceable by the background policy.
    Background,
    /// Any other decoration (badges, frames, shadows).
    Modifier,
}

/// One layer of one icon.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerEntry {
    pub icon_id: String,
    /// Path as written in the database, relative to the asset directory.
    pub source_path: PathBuf,
    /// Back-to-front position; lower values are drawn first.
    pub z_order: i32,
    pub kind: LayerKind,
    pub tint: Option<Tint>,
}

impl LayerEntry {
    pub fn new(
        icon_id: impl Into<String>,
        source_path: impl Into<PathBuf>,
        z_order: i32,
        kind: LayerKind,
    ) -> Self {
        Self {
            icon_id: icon_id.into(),
            source_path: source_path.into(),
            z_order,
            kind,
            tint: None,
        }
    }

    pub fn with_tint(mut self, tint: Tint) -> Self {
        self.tint = Some(tint);
        self
    }

    pub fn is_base(&self) -> bool {
        self.kind == LayerKind::Base
    }
}

// ============================================================================
// Serializable Document
// ============================================================================

/// Serializable form of a database file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DatabaseDocument {
    pub icons: BTreeMap<String, Vec<LayerDocument>>,
}

/// Serializable form of one layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LayerDocument {
    pub source: PathBuf,
    pub kind: LayerKind,
    #[serde(default)]
    pub z: i32,
    /// `#RRGGBB` color applied to a grayscale mask.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tint: Option<String>,
}

impl DatabaseDocument {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl From<&Database> for DatabaseDocument {
    fn from(db: &Database) -> Self {
        let icons = db
            .icons
            .iter()
            .map(|(id, layers)| {
                let layers = layers
                    .iter()
                    .map(|entry| LayerDocument {
                        source: entry.source_path.clone(),
                        kind: entry.kind,
                        z: entry.z_order,
                        tint: entry.tint.map(|t| t.to_hex()),
                    })
                    .collect();
                (id.clone(), layers)
            })
            .collect();
        Self { icons }
    }
}

// ============================================================================
// Database
// ============================================================================

/// A validated, immutable set of icons and their layers.
///
/// Every icon in a `Database` has exactly one base layer, unique z_order
/// values, and sources that existed at load time. Icons iterate in id order
/// and each icon's layers are sorted by ascending z_order.
#[derive(Debug, Clone, PartialEq)]
pub struct Database {
    icons: BTreeMap<String, Vec<LayerEntry>>,
    asset_dir: PathBuf,
}

impl Database {
    /// Reads and validates a database file.
    pub fn load(path: impl AsRef<Path>, asset_dir: impl Into<PathBuf>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json(&json, asset_dir)
    }

    /// Parses and validates a database from JSON.
    pub fn from_json(json: &str, asset_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::from_document(DatabaseDocument::from_json(json)?, asset_dir)
    }

    /// Validates a parsed document.
    pub fn from_document(doc: DatabaseDocument, asset_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut report = ValidationReport::new();
        let mut entries = Vec::new();

        for (icon_id, layers) in doc.icons {
            if layers.is_empty() {
                report.push(&icon_id, ValidationIssue::EmptyIcon);
                continue;
            }
            for layer in layers {
                let tint = match layer.tint.as_deref().map(str::parse::<Tint>) {
                    None => None,
                    Some(Ok(tint)) => Some(tint),
                    Some(Err(_)) => {
                        report.push(&icon_id, ValidationIssue::InvalidTint(layer.tint.unwrap_or_default()));
                        None
                    }
                };
                entries.push(LayerEntry {
                    icon_id: icon_id.clone(),
                    source_path: layer.source,
                    z_order: layer.z,
                    kind: layer.kind,
                    tint,
                });
            }
        }

        Self::build(entries, asset_dir.into(), report)
    }

    /// Groups loose entries by icon id and validates them.
    pub fn from_entries(
        entries: impl IntoIterator<Item = LayerEntry>,
        asset_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        Self::build(entries, asset_dir.into(), ValidationReport::new())
    }

    fn build(
        entries: impl IntoIterator<Item = LayerEntry>,
        asset_dir: PathBuf,
        mut report: ValidationReport,
    ) -> Result<Self> {
        let icons = group_by_icon(entries);
        report.merge(check_structure(&icons));
        report.merge(check_sources(&icons, &asset_dir));

        if !report.is_empty() {
            tracing::warn!(
                "Layer database rejected: {} issue(s) across {} icon(s)",
                report.len(),
                report.offending_icons().len()
            );
        }
        report.into_result()?;

        tracing::debug!("Loaded layer database with {} icons", icons.len());
        Ok(Self { icons, asset_dir })
    }

    /// Builds a database without touching the filesystem.
    #[cfg(test)]
    pub(crate) fn from_entries_unchecked(entries: impl IntoIterator<Item = LayerEntry>) -> Self {
        let icons = group_by_icon(entries);
        assert!(check_structure(&icons).is_empty(), "invalid test database");
        Self {
            icons,
            asset_dir: PathBuf::new(),
        }
    }

    /// Re-checks that every source still exists on disk.
    ///
    /// Sources are verified at load time; this catches files removed since.
    pub fn check_sources(&self) -> ValidationReport {
        check_sources(&self.icons, &self.asset_dir)
    }

    /// Directory that relative source paths are resolved against.
    pub fn asset_dir(&self) -> &Path {
        &self.asset_dir
    }

    /// Returns the on-disk path of a layer source.
    pub fn source_path(&self, entry: &LayerEntry) -> PathBuf {
        self.asset_dir.join(&entry.source_path)
    }

    /// Icon ids in ascending order.
    pub fn icon_ids(&self) -> impl Iterator<Item = &str> {
        self.icons.keys().map(String::as_str)
    }

    /// The layers of an icon, sorted by ascending z_order.
    pub fn layers(&self, icon_id: &str) -> Option<&[LayerEntry]> {
        self.icons.get(icon_id).map(Vec::as_slice)
    }

    pub fn contains(&self, icon_id: &str) -> bool {
        self.icons.contains_key(icon_id)
    }

    /// Number of icons.
    pub fn len(&self) -> usize {
        self.icons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }

    /// Total number of layer entries across all icons.
    pub fn layer_count(&self) -> usize {
        self.icons.values().map(Vec::len).sum()
    }
}

fn group_by_icon(entries: impl IntoIterator<Item = LayerEntry>) -> BTreeMap<String, Vec<LayerEntry>> {
    let mut icons: BTreeMap<String, Vec<LayerEntry>> = BTreeMap::new();
    for entry in entries {
        icons.entry(entry.icon_id.clone()).or_default().push(entry);
    }
    for layers in icons.values_mut() {
        // Stable, so equal z values keep file order until validation rejects them.
        layers.sort_by_key(|entry| entry.z_order);
    }
    icons
}

/// Checks ids, base layer count, and z_order uniqueness for every icon.
fn check_structure(icons: &BTreeMap<String, Vec<LayerEntry>>) -> ValidationReport {
    let mut report = ValidationReport::new();

    for (icon_id, layers) in icons {
        if let Err(reason) = check_icon_id(icon_id) {
            report.push(icon_id, ValidationIssue::InvalidIconId(reason));
        }

        match layers.iter().filter(|entry| entry.is_base()).count() {
            0 => report.push(icon_id, ValidationIssue::MissingBase),
            1 => {}
            n => report.push(icon_id, ValidationIssue::MultipleBases(n)),
        }

        let mut z_counts: HashMap<i32, usize> = HashMap::new();
        for entry in layers {
            *z_counts.entry(entry.z_order).or_default() += 1;
        }
        let mut duplicated: Vec<i32> = z_counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(z, _)| z)
            .collect();
        duplicated.sort_unstable();
        for z in duplicated {
            report.push(icon_id, ValidationIssue::DuplicateZOrder(z));
        }
    }

    report
}

/// Checks that every referenced source exists under `asset_dir`.
fn check_sources(icons: &BTreeMap<String, Vec<LayerEntry>>, asset_dir: &Path) -> ValidationReport {
    let mut report = ValidationReport::new();
    for (icon_id, layers) in icons {
        for entry in layers {
            let path = asset_dir.join(&entry.source_path);
            if !path.is_file() {
                report.push(icon_id, ValidationIssue::MissingSource(path));
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, rel: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn loads_valid_document() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "base/a.png");
        touch(dir.path(), "bg.png");
        touch(dir.path(), "badge.svg");

        let json = r##"{
            "icons": {
                "apps/a": [
                    { "source": "badge.svg", "kind": "modifier", "z": 5, "tint": "#ff0000" },
                    { "source": "base/a.png", "kind": "base" },
                    { "source": "bg.png", "kind": "background", "z": -1 }
                ]
            }
        }"##;

        let db = Database::from_json(json, dir.path()).unwrap();
        assert_eq!(db.len(), 1);
        assert_eq!(db.layer_count(), 3);

        let layers = db.layers("apps/a").unwrap();
        let zs: Vec<i32> = layers.iter().map(|l| l.z_order).collect();
        assert_eq!(zs, vec![-1, 0, 5]);
        assert_eq!(layers[2].tint, Some(Tint::new(255, 0, 0)));
        assert_eq!(db.source_path(&layers[1]), dir.path().join("base/a.png"));
    }

    #[test]
    fn validation_lists_all_offending_icons() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "ok.png");

        let entries = vec![
            // no base
            LayerEntry::new("no-base", "ok.png", 1, LayerKind::Modifier),
            // two bases
            LayerEntry::new("two-bases", "ok.png", 0, LayerKind::Base),
            LayerEntry::new("two-bases", "ok.png", 1, LayerKind::Base),
            // z clash
            LayerEntry::new("z-clash", "ok.png", 0, LayerKind::Base),
            LayerEntry::new("z-clash", "ok.png", 0, LayerKind::Modifier),
            // missing file
            LayerEntry::new("missing", "gone.png", 0, LayerKind::Base),
            // fine
            LayerEntry::new("good", "ok.png", 0, LayerKind::Base),
        ];

        let err = Database::from_entries(entries, dir.path()).unwrap_err();
        let Error::Validation(report) = err else {
            panic!("expected validation error, got {err:?}");
        };

        assert_eq!(
            report.offending_icons(),
            vec!["missing", "no-base", "two-bases", "z-clash"]
        );
        assert_eq!(
            report.issues_for("two-bases").collect::<Vec<_>>(),
            vec![&ValidationIssue::MultipleBases(2)]
        );
        assert_eq!(
            report.issues_for("z-clash").collect::<Vec<_>>(),
            vec![&ValidationIssue::DuplicateZOrder(0)]
        );
        assert!(matches!(
            report.issues_for("missing").next(),
            Some(ValidationIssue::MissingSource(_))
        ));
    }

    #[test]
    fn rejects_bad_ids_tints_and_empty_icons() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "ok.png");

        let json = r#"{
            "icons": {
                "../escape": [{ "source": "ok.png", "kind": "base" }],
                "bad-tint": [{ "source": "ok.png", "kind": "base", "tint": "blue" }],
                "empty": []
            }
        }"#;

        let Err(Error::Validation(report)) = Database::from_json(json, dir.path()) else {
            panic!("expected validation error");
        };
        assert_eq!(report.offending_icons(), vec!["../escape", "bad-tint", "empty"]);
        assert_eq!(
            report.issues_for("bad-tint").next(),
            Some(&ValidationIssue::InvalidTint("blue".into()))
        );
        assert_eq!(report.issues_for("empty").next(), Some(&ValidationIssue::EmptyIcon));
    }

    #[test]
    fn recheck_catches_removed_sources() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.png");
        let db = Database::from_entries(
            vec![LayerEntry::new("a", "a.png", 0, LayerKind::Base)],
            dir.path(),
        )
        .unwrap();
        assert!(db.check_sources().is_empty());

        std::fs::remove_file(dir.path().join("a.png")).unwrap();
        assert_eq!(db.check_sources().offending_icons(), vec!["a"]);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let json = r#"{ "icons": { "a": [{ "source": "a.png", "kind": "base", "zz": 1 }] } }"#;
        assert!(matches!(Database::from_json(json, "."), Err(Error::Json(_))));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let json = r#"{ "icons": { "a": [{ "source": "a.png", "kind": "sticker" }] } }"#;
        assert!(matches!(Database::from_json(json, "."), Err(Error::Json(_))));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Database::load("/nonexistent/db.json", ".").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn document_export_matches_database() {
        let db = Database::from_entries_unchecked(vec![
            LayerEntry::new("a", "a.png", 0, LayerKind::Base),
            LayerEntry::new("a", "m.png", 3, LayerKind::Modifier).with_tint(Tint::new(1, 2, 3)),
        ]);
        let doc = DatabaseDocument::from(&db);
        let json = doc.to_json_pretty().unwrap();
        assert!(json.contains("\"modifier\""));
        assert!(json.contains("\"#010203\""));
        assert_eq!(doc.icons["a"].len(), 2);
    }
}
