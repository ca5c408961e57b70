//! Error types for database loading, compositing, and batch runs.
//!
//! All fallible functions in this crate return [`Result<T>`]. Database and
//! profile problems are gathered into a [`ValidationReport`] so that every
//! offending icon is listed at once instead of failing on the first one.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::icon::SizePx;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, resolving, or compositing icons.
#[derive(Error, Debug)]
pub enum Error {
    /// The database or background policy is inconsistent. Nothing is rendered.
    #[error("validation failed:\n{0}")]
    Validation(ValidationReport),

    /// A file could not be read or written.
    #[error("IO error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A raster source exists but could not be decoded.
    #[error("failed to decode '{}': {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// An SVG source could not be parsed or rasterized.
    #[error("failed to render SVG '{}': {reason}", .path.display())]
    Svg { path: PathBuf, reason: String },

    /// A layer's pixel size differs from the base layer of its stack.
    #[error(
        "dimension mismatch in '{}': expected {}x{}, found {}x{}",
        .path.display(),
        .expected.width,
        .expected.height,
        .found.width,
        .found.height
    )]
    DimensionMismatch {
        path: PathBuf,
        expected: SizePx,
        found: SizePx,
    },

    /// The composited image could not be encoded to the output path.
    #[error("failed to write '{}': {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The icon id is not present in the database.
    #[error("unknown icon id '{0}'")]
    UnknownIcon(String),

    /// Failed to parse or serialize a JSON document.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The dedicated worker pool could not be created.
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// A single problem found while validating a database or a background policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// The icon has no base layer.
    MissingBase,
    /// The icon declares more than one base layer.
    MultipleBases(usize),
    /// Two or more layers of the icon share a z_order.
    DuplicateZOrder(i32),
    /// A referenced source file does not exist.
    MissingSource(PathBuf),
    /// The icon id cannot be used as a relative output name.
    InvalidIconId(String),
    /// A tint string is not a `#RRGGBB` color.
    InvalidTint(String),
    /// An icon declares no layers at all.
    EmptyIcon,
    /// A legacy category lists layers but has no layer directory configured.
    MissingLayerDir(String),
    /// Every z_order at or below this one is taken, so a selected
    /// background has nowhere to go.
    NoFreeZOrder(i32),
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingBase => write!(f, "no base layer"),
            Self::MultipleBases(n) => write!(f, "{n} base layers (expected exactly one)"),
            Self::DuplicateZOrder(z) => write!(f, "z_order {z} used by more than one layer"),
            Self::MissingSource(path) => write!(f, "source not found: {}", path.display()),
            Self::InvalidIconId(reason) => write!(f, "invalid icon id: {reason}"),
            Self::InvalidTint(value) => write!(f, "invalid tint '{value}'"),
            Self::EmptyIcon => write!(f, "no layers"),
            Self::MissingLayerDir(category) => {
                write!(f, "no layer directory configured for '{category}'")
            }
            Self::NoFreeZOrder(z) => write!(f, "no free z_order at or below {z} for the background"),
        }
    }
}

/// Every validation issue found in one pass.
///
/// Issues are attached to an icon id, or to no icon for run-wide settings
/// such as the default background.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    issues: Vec<(Option<String>, ValidationIssue)>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an issue for the given icon.
    pub fn push(&mut self, icon_id: impl Into<String>, issue: ValidationIssue) {
        self.issues.push((Some(icon_id.into()), issue));
    }

    /// Records an issue that is not tied to a single icon.
    pub fn push_global(&mut self, issue: ValidationIssue) {
        self.issues.push((None, issue));
    }

    /// Appends all issues from another report.
    pub fn merge(&mut self, other: ValidationReport) {
        self.issues.extend(other.issues);
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// Returns every issue with the icon it belongs to.
    pub fn issues(&self) -> impl Iterator<Item = (Option<&str>, &ValidationIssue)> {
        self.issues.iter().map(|(id, issue)| (id.as_deref(), issue))
    }

    /// Returns the issues recorded for one icon.
    pub fn issues_for<'a>(&'a self, icon_id: &'a str) -> impl Iterator<Item = &'a ValidationIssue> {
        self.issues
            .iter()
            .filter(move |(id, _)| id.as_deref() == Some(icon_id))
            .map(|(_, issue)| issue)
    }

    /// Returns the sorted, de-duplicated list of icons with at least one issue.
    pub fn offending_icons(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.issues.iter().filter_map(|(id, _)| id.as_deref()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Converts the report into `Ok(())` when empty, or a validation error.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self))
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (id, issue)) in self.issues.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            match id {
                Some(id) => write!(f, " - {id}: {issue}")?,
                None => write!(f, " - {issue}")?,
            }
        }
        Ok(())
    }
}
