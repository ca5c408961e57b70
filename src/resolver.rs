//! Turns database entries plus a background policy into layer stacks.

use std::path::Path;

use crate::database::{Database, LayerEntry, LayerKind};
use crate::error::{Error, Result, ValidationIssue, ValidationReport};
use crate::icon::IconTarget;
use crate::profile::{BackgroundPolicy, BackgroundSelection};

// ============================================================================
// LayerStack
// ============================================================================

/// The final layers of one icon, in compositing order (ascending z_order).
///
/// A stack always holds exactly one base layer and no two layers share a
/// z_order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerStack {
    icon_id: String,
    layers: Vec<LayerEntry>,
    base_index: usize,
}

impl LayerStack {
    fn new(icon_id: &str, mut layers: Vec<LayerEntry>) -> Result<Self> {
        layers.sort_by_key(|entry| entry.z_order);
        let base_index = layers.iter().position(LayerEntry::is_base).ok_or_else(|| {
            let mut report = ValidationReport::new();
            report.push(icon_id, ValidationIssue::MissingBase);
            Error::Validation(report)
        })?;
        Ok(Self {
            icon_id: icon_id.to_string(),
            layers,
            base_index,
        })
    }

    pub fn icon_id(&self) -> &str {
        &self.icon_id
    }

    /// Layers back to front.
    pub fn layers(&self) -> &[LayerEntry] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Always false; a stack contains at least its base.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn base(&self) -> &LayerEntry {
        &self.layers[self.base_index]
    }

    pub fn backgrounds(&self) -> impl Iterator<Item = &LayerEntry> {
        self.of_kind(LayerKind::Background)
    }

    pub fn modifiers(&self) -> impl Iterator<Item = &LayerEntry> {
        self.of_kind(LayerKind::Modifier)
    }

    /// Layers grouped by role: base, then backgrounds, then modifiers, each
    /// group in ascending z_order.
    pub fn by_role(&self) -> Vec<&LayerEntry> {
        std::iter::once(self.base())
            .chain(self.backgrounds())
            .chain(self.modifiers())
            .collect()
    }

    fn of_kind(&self, kind: LayerKind) -> impl Iterator<Item = &LayerEntry> {
        self.layers.iter().filter(move |entry| entry.kind == kind)
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves icons against a database and a background policy.
///
/// Resolution is a pure function of its inputs: the same database and
/// policy always produce the same stack.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    database: &'a Database,
    policy: &'a BackgroundPolicy,
}

impl<'a> Resolver<'a> {
    pub fn new(database: &'a Database, policy: &'a BackgroundPolicy) -> Self {
        Self { database, policy }
    }

    /// Produces the layer stack for one icon.
    pub fn resolve(&self, icon_id: &str) -> Result<LayerStack> {
        let entries = self
            .database
            .layers(icon_id)
            .ok_or_else(|| Error::UnknownIcon(icon_id.to_string()))?;

        let layers = match self.policy.select(icon_id) {
            BackgroundSelection::FromDatabase => entries.to_vec(),
            BackgroundSelection::Remove => without_backgrounds(entries),
            BackgroundSelection::Replace(source) => {
                let mut layers = without_backgrounds(entries);
                let z = self.background_z(&layers).ok_or_else(|| {
                    let mut report = ValidationReport::new();
                    report.push(icon_id, ValidationIssue::NoFreeZOrder(self.start_z(&layers)));
                    Error::Validation(report)
                })?;
                layers.push(LayerEntry::new(icon_id, source, z, LayerKind::Background));
                layers
            }
        };

        LayerStack::new(icon_id, layers)
    }

    /// Resolves an icon and pairs it with its output path.
    pub fn target(&self, icon_id: &str, output_dir: &Path) -> Result<IconTarget> {
        Ok(IconTarget::new(self.resolve(icon_id)?, output_dir))
    }

    /// Picks a free z_order for a selected background.
    ///
    /// Starts from the configured z, or one below the lowest layer, and
    /// steps down past any layer already using it. `None` when every z from
    /// the start down to `i32::MIN` is taken.
    fn background_z(&self, layers: &[LayerEntry]) -> Option<i32> {
        std::iter::successors(Some(self.start_z(layers)), |z| z.checked_sub(1))
            .find(|&z| layers.iter().all(|entry| entry.z_order != z))
    }

    fn start_z(&self, layers: &[LayerEntry]) -> i32 {
        let lowest = layers.iter().map(|entry| entry.z_order).min().unwrap_or(0);
        self.policy.background_z.unwrap_or(lowest.saturating_sub(1))
    }
}

fn without_backgrounds(entries: &[LayerEntry]) -> Vec<LayerEntry> {
    entries
        .iter()
        .filter(|entry| entry.kind != LayerKind::Background)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_database() -> Database {
        Database::from_entries_unchecked(vec![
            LayerEntry::new("a", "a.png", 0, LayerKind::Base),
            LayerEntry::new("a", "shadow.png", -5, LayerKind::Modifier),
            LayerEntry::new("a", "badge.png", 10, LayerKind::Modifier),
            LayerEntry::new("a", "sky.png", -20, LayerKind::Background),
            LayerEntry::new("b", "b.png", 0, LayerKind::Base),
        ])
    }

    fn sources(stack: &LayerStack) -> Vec<&str> {
        stack
            .layers()
            .iter()
            .map(|l| l.source_path.to_str().unwrap())
            .collect()
    }

    #[test]
    fn database_order_by_z() {
        let db = sample_database();
        let policy = BackgroundPolicy::new();
        let stack = Resolver::new(&db, &policy).resolve("a").unwrap();

        assert_eq!(sources(&stack), vec!["sky.png", "shadow.png", "a.png", "badge.png"]);
        assert_eq!(stack.base().source_path, PathBuf::from("a.png"));
        assert_eq!(stack.backgrounds().count(), 1);
        assert_eq!(stack.modifiers().count(), 2);
    }

    #[test]
    fn role_view_puts_base_first() {
        let db = sample_database();
        let policy = BackgroundPolicy::new();
        let stack = Resolver::new(&db, &policy).resolve("a").unwrap();

        let roles: Vec<&str> = stack
            .by_role()
            .iter()
            .map(|l| l.source_path.to_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["a.png", "sky.png", "shadow.png", "badge.png"]);
    }

    #[test]
    fn resolving_twice_is_identical() {
        let db = sample_database();
        let policy = BackgroundPolicy::new().with_default("plain.png");
        let resolver = Resolver::new(&db, &policy);

        for id in ["a", "b"] {
            assert_eq!(resolver.resolve(id).unwrap(), resolver.resolve(id).unwrap());
        }
    }

    #[test]
    fn default_background_replaces_database_background() {
        let db = sample_database();
        let policy = BackgroundPolicy::new().with_default("plain.png");
        let stack = Resolver::new(&db, &policy).resolve("a").unwrap();

        assert_eq!(sources(&stack), vec!["plain.png", "shadow.png", "a.png", "badge.png"]);
        assert_eq!(stack.layers()[0].z_order, -6);
        assert_eq!(stack.layers()[0].kind, LayerKind::Background);
    }

    #[test]
    fn per_icon_override_wins_over_default() {
        let db = sample_database();
        let policy = BackgroundPolicy::new()
            .with_default("plain.png")
            .with_override("b", "dark.png")
            .without_background_for("a");
        let resolver = Resolver::new(&db, &policy);

        let a = resolver.resolve("a").unwrap();
        assert_eq!(a.backgrounds().count(), 0);
        assert_eq!(sources(&a), vec!["shadow.png", "a.png", "badge.png"]);

        let b = resolver.resolve("b").unwrap();
        assert_eq!(sources(&b), vec!["dark.png", "b.png"]);
        assert_eq!(b.layers()[0].z_order, -1);
    }

    #[test]
    fn configured_background_z_avoids_collisions() {
        let db = sample_database();
        let policy = BackgroundPolicy::new().with_default("plain.png").with_z(-5);
        let stack = Resolver::new(&db, &policy).resolve("a").unwrap();

        let bg = stack.backgrounds().next().unwrap();
        assert_eq!(bg.z_order, -6);
    }

    #[test]
    fn background_fits_at_lowest_z() {
        let db = Database::from_entries_unchecked(vec![LayerEntry::new(
            "a",
            "a.png",
            i32::MIN + 1,
            LayerKind::Base,
        )]);
        let policy = BackgroundPolicy::new().with_default("bg.png");
        let stack = Resolver::new(&db, &policy).resolve("a").unwrap();

        assert_eq!(stack.backgrounds().next().unwrap().z_order, i32::MIN);
    }

    #[test]
    fn no_room_below_base_fails_the_icon() {
        let db = Database::from_entries_unchecked(vec![LayerEntry::new(
            "a",
            "a.png",
            i32::MIN,
            LayerKind::Base,
        )]);
        let policy = BackgroundPolicy::new().with_default("bg.png");
        let err = Resolver::new(&db, &policy).resolve("a").unwrap_err();

        let Error::Validation(report) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(
            report.issues_for("a").collect::<Vec<_>>(),
            vec![&ValidationIssue::NoFreeZOrder(i32::MIN)]
        );
    }

    #[test]
    fn configured_background_z_at_minimum_collides() {
        let db = Database::from_entries_unchecked(vec![
            LayerEntry::new("a", "a.png", 0, LayerKind::Base),
            LayerEntry::new("a", "deep.png", i32::MIN, LayerKind::Modifier),
        ]);
        let policy = BackgroundPolicy::new().with_default("bg.png").with_z(i32::MIN);

        assert!(Resolver::new(&db, &policy).resolve("a").is_err());
    }

    #[test]
    fn unknown_icon_is_an_error() {
        let db = sample_database();
        let policy = BackgroundPolicy::new();
        let err = Resolver::new(&db, &policy).resolve("zzz").unwrap_err();
        assert!(matches!(err, Error::UnknownIcon(id) if id == "zzz"));
    }

    #[test]
    fn target_names_output_after_icon() {
        let db = sample_database();
        let policy = BackgroundPolicy::new();
        let target = Resolver::new(&db, &policy)
            .target("b", Path::new("/out"))
            .unwrap();
        assert_eq!(target.output_path, PathBuf::from("/out/b.png"));
        assert_eq!(target.icon_id(), "b");
    }
}
