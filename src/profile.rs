//! Serializable run configuration.
//!
//! A [`RenderProfile`] names the database, asset and output directories,
//! the worker count, and the [`BackgroundPolicy`] that the resolver applies.
//!
//! # Example
//!
//! ```
//! use icon_compositor::{BackgroundPolicy, RenderProfile};
//!
//! let profile = RenderProfile::new()
//!     .with_assets("Source_Pack")
//!     .with_output("Output_Pack")
//!     .with_background(
//!         BackgroundPolicy::new()
//!             .with_default("backgrounds/plain.png")
//!             .without_background_for("apps/terminal"),
//!     );
//!
//! let json = profile.to_json().unwrap();
//! let restored = RenderProfile::from_json(&json).unwrap();
//! assert_eq!(restored.background, profile.background);
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::database::{Database, legacy};
use crate::error::{Error, Result, ValidationIssue, ValidationReport};

// ============================================================================
// Background Policy
// ============================================================================

/// Which background each icon gets.
///
/// Precedence: a per-icon entry, then the default, then whatever
/// backgrounds the database declares. A selected background replaces the
/// database's backgrounds for that icon; a per-icon `null` removes them.
///
/// # JSON Format
///
/// ```json
/// {
///   "default": "backgrounds/plain.png",
///   "perIcon": { "apps/terminal": null, "apps/editor": "backgrounds/dark.png" },
///   "z": -100
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BackgroundPolicy {
    /// Background applied to every icon without a per-icon entry.
    #[serde(rename = "default", default, skip_serializing_if = "Option::is_none")]
    pub default_background: Option<PathBuf>,

    /// Per-icon choice; `None` means "no background".
    #[serde(rename = "perIcon", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub per_icon_override: BTreeMap<String, Option<PathBuf>>,

    /// z_order for a selected background. Defaults to one below the lowest
    /// layer of the icon.
    #[serde(rename = "z", default, skip_serializing_if = "Option::is_none")]
    pub background_z: Option<i32>,
}

/// The background decision for one icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundSelection<'a> {
    /// Keep the backgrounds declared in the database.
    FromDatabase,
    /// Replace them with this source.
    Replace(&'a Path),
    /// Drop all backgrounds.
    Remove,
}

impl BackgroundPolicy {
    /// Creates a policy that keeps database backgrounds untouched.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(mut self, source: impl Into<PathBuf>) -> Self {
        self.default_background = Some(source.into());
        self
    }

    pub fn with_override(mut self, icon_id: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        self.per_icon_override
            .insert(icon_id.into(), Some(source.into()));
        self
    }

    pub fn without_background_for(mut self, icon_id: impl Into<String>) -> Self {
        self.per_icon_override.insert(icon_id.into(), None);
        self
    }

    pub fn with_z(mut self, z: i32) -> Self {
        self.background_z = Some(z);
        self
    }

    /// Returns true if the policy never changes what the database declares.
    pub fn is_passthrough(&self) -> bool {
        self.default_background.is_none() && self.per_icon_override.is_empty()
    }

    /// Decides the background for one icon.
    pub fn select(&self, icon_id: &str) -> BackgroundSelection<'_> {
        match self.per_icon_override.get(icon_id) {
            Some(Some(source)) => BackgroundSelection::Replace(source),
            Some(None) => BackgroundSelection::Remove,
            None => match &self.default_background {
                Some(source) => BackgroundSelection::Replace(source),
                None => BackgroundSelection::FromDatabase,
            },
        }
    }

    /// Checks that every background this policy can select exists.
    ///
    /// Overrides naming icons absent from the database are logged and
    /// otherwise ignored.
    pub fn validate(&self, database: &Database) -> ValidationReport {
        let mut report = ValidationReport::new();
        let asset_dir = database.asset_dir();

        if let Some(source) = &self.default_background {
            let path = asset_dir.join(source);
            if !path.is_file() {
                report.push_global(ValidationIssue::MissingSource(path));
            }
        }

        for (icon_id, source) in &self.per_icon_override {
            if !database.contains(icon_id) {
                tracing::warn!("Background override for unknown icon '{}'", icon_id);
                continue;
            }
            if let Some(source) = source {
                let path = asset_dir.join(source);
                if !path.is_file() {
                    report.push(icon_id, ValidationIssue::MissingSource(path));
                }
            }
        }

        report
    }
}

// ============================================================================
// Render Profile
// ============================================================================

/// Layout of the database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[serde(rename_all = "kebab-case")]
pub enum DatabaseFormat {
    /// The `{"icons": {...}}` document.
    #[default]
    Layers,
    /// The compact `{category: {name: [layers]}}` layout.
    Legacy,
}

/// Everything a batch run needs.
///
/// # JSON Format
///
/// ```json
/// {
///   "database": "elements_layering.json",
///   "format": "legacy",
///   "assets": "Source_Pack",
///   "output": "Output_Pack",
///   "layerDirs": { "Folders": "layers/folders" },
///   "jobs": 8,
///   "background": { "default": "backgrounds/plain.png" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RenderProfile {
    /// Path of the database file.
    #[serde(default = "default_database")]
    pub database: PathBuf,

    #[serde(default)]
    pub format: DatabaseFormat,

    /// Directory that layer sources are resolved against.
    #[serde(default = "default_assets")]
    pub assets: PathBuf,

    /// Directory receiving `<icon_id>.png` files.
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Per-category layer directories for the legacy format.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub layer_dirs: BTreeMap<String, PathBuf>,

    /// Worker threads. `None` uses the global rayon pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,

    #[serde(default)]
    pub background: BackgroundPolicy,
}

fn default_database() -> PathBuf {
    PathBuf::from("elements_layering.json")
}

fn default_assets() -> PathBuf {
    PathBuf::from("Source_Pack")
}

fn default_output() -> PathBuf {
    PathBuf::from("Output_Pack")
}

impl Default for RenderProfile {
    fn default() -> Self {
        Self {
            database: default_database(),
            format: DatabaseFormat::default(),
            assets: default_assets(),
            output: default_output(),
            layer_dirs: BTreeMap::new(),
            jobs: None,
            background: BackgroundPolicy::default(),
        }
    }
}

impl RenderProfile {
    /// Creates a profile with the default paths.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(mut self, path: impl Into<PathBuf>, format: DatabaseFormat) -> Self {
        self.database = path.into();
        self.format = format;
        self
    }

    pub fn with_assets(mut self, path: impl Into<PathBuf>) -> Self {
        self.assets = path.into();
        self
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = path.into();
        self
    }

    pub fn with_layer_dir(mut self, category: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.layer_dirs.insert(category.into(), dir.into());
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn with_background(mut self, policy: BackgroundPolicy) -> Self {
        self.background = policy;
        self
    }

    /// Reads a profile file.
    ///
    /// Relative `database`, `assets`, and `output` paths are resolved
    /// against the directory containing the profile.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut profile = Self::from_json(&json)?;
        if let Some(base) = path.parent() {
            profile.resolve_paths(base);
        }
        Ok(profile)
    }

    /// Makes relative paths relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for path in [&mut self.database, &mut self.assets, &mut self.output] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// Loads the database named by this profile in its configured format.
    pub fn load_database(&self) -> Result<Database> {
        match self.format {
            DatabaseFormat::Layers => Database::load(&self.database, &self.assets),
            DatabaseFormat::Legacy => {
                let json = std::fs::read_to_string(&self.database)
                    .map_err(|e| Error::io(&self.database, e))?;
                legacy::import(&json, &self.layer_dirs, &self.assets)
            }
        }
    }

    /// Serializes the profile to a JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serializes the profile to a pretty-printed JSON string.
    pub fn to_json_pretty(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserializes a profile from a JSON string.
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_profile_uses_defaults() {
        let profile = RenderProfile::from_json("{}").unwrap();
        assert_eq!(profile, RenderProfile::default());
        assert_eq!(profile.assets, PathBuf::from("Source_Pack"));
        assert_eq!(profile.output, PathBuf::from("Output_Pack"));
        assert!(profile.background.is_passthrough());
    }

    #[test]
    fn policy_precedence() {
        let policy = BackgroundPolicy::new()
            .with_default("plain.png")
            .with_override("b", "dark.png")
            .without_background_for("c");

        assert_eq!(policy.select("a"), BackgroundSelection::Replace(Path::new("plain.png")));
        assert_eq!(policy.select("b"), BackgroundSelection::Replace(Path::new("dark.png")));
        assert_eq!(policy.select("c"), BackgroundSelection::Remove);
        assert_eq!(BackgroundPolicy::new().select("a"), BackgroundSelection::FromDatabase);
    }

    #[test]
    fn null_override_deserializes_to_removal() {
        let json = r#"{ "background": { "perIcon": { "apps/term": null, "apps/ed": "dark.png" }, "z": -50 } }"#;
        let profile = RenderProfile::from_json(json).unwrap();

        assert_eq!(profile.background.select("apps/term"), BackgroundSelection::Remove);
        assert_eq!(
            profile.background.select("apps/ed"),
            BackgroundSelection::Replace(Path::new("dark.png"))
        );
        assert_eq!(profile.background.background_z, Some(-50));
    }

    #[test]
    fn json_format_is_camel_case() {
        let profile = RenderProfile::new()
            .with_database("layering.json", DatabaseFormat::Legacy)
            .with_layer_dir("Folders", "layers")
            .with_jobs(4);
        let json = profile.to_json_pretty().unwrap();

        assert!(json.contains("\"layerDirs\""));
        assert!(json.contains("\"legacy\""));
        assert!(json.contains("\"jobs\": 4"));
    }

    #[test]
    fn load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "assets": "in", "output": "/abs/out" }"#).unwrap();

        let profile = RenderProfile::load(&path).unwrap();
        assert_eq!(profile.assets, dir.path().join("in"));
        assert_eq!(profile.output, PathBuf::from("/abs/out"));
        assert_eq!(profile.database, dir.path().join("elements_layering.json"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(RenderProfile::from_json(r#"{ "inputPath": "x" }"#).is_err());
    }
}
