//! Batch driver: renders every icon of a database.
//!
//! Each icon is resolved, composited, and written independently on a rayon
//! worker. A failing icon is recorded in the [`BatchReport`] and never stops
//! its siblings. Problems that would affect every icon (an invalid database
//! or background policy) abort the run before anything is written.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::compositor::Compositor;
use crate::database::Database;
use crate::error::{Error, Result};
use crate::layer::SourceCache;
use crate::profile::{BackgroundPolicy, RenderProfile};
use crate::resolver::Resolver;

// ============================================================================
// Report
// ============================================================================

/// An icon that was written successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconOutput {
    pub icon_id: String,
    pub path: PathBuf,
}

/// An icon that could not be rendered.
#[derive(Debug)]
pub struct IconFailure {
    pub icon_id: String,
    pub error: Error,
}

/// Outcome of a batch run, in icon id order.
#[derive(Debug, Default)]
pub struct BatchReport {
    succeeded: Vec<IconOutput>,
    failed: Vec<IconFailure>,
    elapsed: Duration,
}

impl BatchReport {
    pub fn succeeded(&self) -> &[IconOutput] {
        &self.succeeded
    }

    pub fn failed(&self) -> &[IconFailure] {
        &self.failed
    }

    /// Number of icons attempted.
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// `0` when every icon was written, `1` otherwise.
    pub fn exit_status(&self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }

    /// Process exit code for front ends.
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    fn record(&mut self, icon_id: &str, outcome: Result<PathBuf>) {
        match outcome {
            Ok(path) => self.succeeded.push(IconOutput {
                icon_id: icon_id.to_string(),
                path,
            }),
            Err(error) => {
                tracing::warn!("Skipping icon '{}': {}", icon_id, error);
                self.failed.push(IconFailure {
                    icon_id: icon_id.to_string(),
                    error,
                });
            }
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Rendered {}/{} icons in {:.2?}",
            self.succeeded.len(),
            self.total(),
            self.elapsed
        )?;
        if !self.succeeded.is_empty() {
            writeln!(f, "Succeeded:")?;
            for output in &self.succeeded {
                writeln!(f, " - {}", output.icon_id)?;
            }
        }
        if !self.failed.is_empty() {
            writeln!(f, "Failed:")?;
            for failure in &self.failed {
                writeln!(f, " - {}: {}", failure.icon_id, failure.error)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// BatchDriver
// ============================================================================

/// Renders all icons of a database into an output directory.
///
/// # Example
///
/// ```no_run
/// use icon_compositor::{BatchDriver, RenderProfile};
///
/// let profile = RenderProfile::load("settings.json")?;
/// let report = BatchDriver::run_profile(&profile)?;
/// println!("{report}");
/// std::process::exit(report.exit_status().into());
/// # Ok::<(), icon_compositor::Error>(())
/// ```
pub struct BatchDriver {
    database: Database,
    policy: BackgroundPolicy,
    output_dir: PathBuf,
    jobs: Option<usize>,
    cache: SourceCache,
}

impl BatchDriver {
    /// Creates a driver using the profile's output directory, worker count,
    /// and background policy.
    pub fn new(database: Database, profile: &RenderProfile) -> Self {
        Self {
            database,
            policy: profile.background.clone(),
            output_dir: profile.output.clone(),
            jobs: profile.jobs,
            cache: SourceCache::new(),
        }
    }

    /// Loads the profile's database and renders it.
    pub fn run_profile(profile: &RenderProfile) -> Result<BatchReport> {
        let database = profile.load_database()?;
        Self::new(database, profile).run()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Renders every icon.
    ///
    /// Returns `Err` only for run-wide problems: an invalid background
    /// policy or a worker pool that cannot be built. Per-icon failures are
    /// in the report.
    pub fn run(&self) -> Result<BatchReport> {
        self.policy.validate(&self.database).into_result()?;

        let start = Instant::now();
        tracing::info!(
            "Rendering {} icons ({} layers) from {} into {}",
            self.database.len(),
            self.database.layer_count(),
            self.database.asset_dir().display(),
            self.output_dir.display()
        );

        let resolver = Resolver::new(&self.database, &self.policy);
        let compositor = Compositor::new(self.database.asset_dir()).with_cache(self.cache.clone());
        let icon_ids: Vec<&str> = self.database.icon_ids().collect();

        let render_all = || -> Vec<Result<PathBuf>> {
            icon_ids
                .par_iter()
                .map(|icon_id| -> Result<PathBuf> {
                    tracing::debug!("Rendering '{}'", icon_id);
                    let target = resolver.target(icon_id, &self.output_dir)?;
                    compositor.render(&target)
                })
                .collect()
        };

        let outcomes = match self.jobs {
            Some(jobs) => ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build()?
                .install(render_all),
            None => render_all(),
        };

        let mut report = BatchReport::default();
        for (icon_id, outcome) in icon_ids.iter().zip(outcomes) {
            report.record(icon_id, outcome);
        }
        report.elapsed = start.elapsed();

        let (hits, misses) = self.cache.stats();
        tracing::info!(
            "Rendered {}/{} icons in {:.2?} ({} failed, source cache {} hits / {} misses)",
            report.succeeded.len(),
            report.total(),
            report.elapsed,
            report.failed.len(),
            hits,
            misses
        );

        Ok(report)
    }
}
