//! icon-compositor: layered icon generation from a declarative database
//!
//! This crate builds icons by stacking image layers (a base icon, optional
//! backgrounds, optional modifiers) described in a JSON layer database, and
//! writes one PNG per icon.
//!
//! # Example
//!
//! ```no_run
//! use icon_compositor::{BackgroundPolicy, BatchDriver, Database, RenderProfile};
//!
//! let database = Database::load("layers.json", "Source_Pack")?;
//!
//! let profile = RenderProfile::new()
//!     .with_output("Output_Pack")
//!     .with_background(BackgroundPolicy::new().with_default("backgrounds/plain.png"));
//!
//! let report = BatchDriver::new(database, &profile).run()?;
//! print!("{report}");
//! # Ok::<(), icon_compositor::Error>(())
//! ```
//!
//! # Single Icons
//!
//! The pieces of a batch can be driven one icon at a time:
//!
//! ```no_run
//! use icon_compositor::{BackgroundPolicy, Compositor, Database, Resolver};
//!
//! let database = Database::load("layers.json", "Source_Pack")?;
//! let policy = BackgroundPolicy::new();
//!
//! let stack = Resolver::new(&database, &policy).resolve("folders/blue")?;
//! let image = Compositor::new(database.asset_dir()).composite(&stack)?;
//! # Ok::<(), icon_compositor::Error>(())
//! ```

mod batch;
mod compositor;
mod database;
mod error;
mod icon;
mod layer;
mod profile;
mod resolver;

pub use batch::{BatchDriver, BatchReport, IconFailure, IconOutput};
pub use compositor::{Compositor, blend_over, composite_over, write_png};
pub use database::legacy::{self, LegacyLayering};
pub use database::{Database, DatabaseDocument, LayerDocument, LayerEntry, LayerKind};
pub use error::{Error, Result, ValidationIssue, ValidationReport};
pub use icon::{IconTarget, OUTPUT_EXTENSION, SizePx, check_icon_id, output_path};
pub use layer::{CacheKey, SourceCache, SourceKind, Tint, load_source};
pub use profile::{BackgroundPolicy, BackgroundSelection, DatabaseFormat, RenderProfile};
pub use resolver::{LayerStack, Resolver};
