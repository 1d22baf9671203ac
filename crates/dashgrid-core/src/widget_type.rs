#![forbid(unsafe_code)]

//! Widget-type registry and instance id conventions.
//!
//! Every placed widget carries an id of the form `<type>` or
//! `<type>-<digits>`. The trailing all-digit segment is the instance suffix;
//! everything before it names an entry in the [`WidgetTypeRegistry`], which
//! owns the size bounds a layout record must respect.
//!
//! ```
//! use dashgrid_core::widget_type::{widget_type_of, WidgetTypeRegistry};
//!
//! assert_eq!(widget_type_of("chart-1"), "chart");
//! assert_eq!(widget_type_of("price-chart-17"), "price-chart");
//! assert_eq!(widget_type_of("unknown-x"), "unknown-x");
//!
//! let registry = WidgetTypeRegistry::builtin();
//! assert!(registry.contains("chart"));
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Minimum `(w, h)` assumed for a type the registry does not know.
pub const FALLBACK_MIN: (u32, u32) = (2, 2);

/// Static description of one widget type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetTypeSpec {
    /// Human-readable label.
    pub label: String,
    pub min_w: u32,
    pub min_h: u32,
    #[serde(default)]
    pub max_w: Option<u32>,
    #[serde(default)]
    pub max_h: Option<u32>,
    /// Span used when a fresh instance is added.
    pub default_w: u32,
    pub default_h: u32,
}

impl WidgetTypeSpec {
    /// Create a spec whose default size equals its minimum.
    #[must_use]
    pub fn new(label: impl Into<String>, min_w: u32, min_h: u32) -> Self {
        let min_w = min_w.max(1);
        let min_h = min_h.max(1);
        Self {
            label: label.into(),
            min_w,
            min_h,
            max_w: None,
            max_h: None,
            default_w: min_w,
            default_h: min_h,
        }
    }

    /// Builder: set the default span (clamped to the minimum).
    #[must_use]
    pub fn with_default_size(mut self, w: u32, h: u32) -> Self {
        self.default_w = w.max(self.min_w);
        self.default_h = h.max(self.min_h);
        self
    }

    /// Builder: set upper bounds.
    #[must_use]
    pub fn with_max(mut self, max_w: Option<u32>, max_h: Option<u32>) -> Self {
        self.max_w = max_w.map(|w| w.max(self.min_w));
        self.max_h = max_h.map(|h| h.max(self.min_h));
        self
    }

    /// Clamp a requested span into this type's bounds.
    #[must_use]
    pub fn clamp_size(&self, w: u32, h: u32) -> (u32, u32) {
        let mut w = w.max(self.min_w);
        let mut h = h.max(self.min_h);
        if let Some(max_w) = self.max_w {
            w = w.min(max_w);
        }
        if let Some(max_h) = self.max_h {
            h = h.min(max_h);
        }
        (w, h)
    }
}

/// Known widget types, keyed by type name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WidgetTypeRegistry {
    types: BTreeMap<String, WidgetTypeSpec>,
}

impl WidgetTypeRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The widget types shipped with dashgrid.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            "chart",
            WidgetTypeSpec::new("Chart", 4, 3).with_default_size(6, 6),
        );
        registry.register(
            "table",
            WidgetTypeSpec::new("Table", 4, 3).with_default_size(6, 5),
        );
        registry.register(
            "watchlist",
            WidgetTypeSpec::new("Watchlist", 3, 4).with_default_size(4, 6),
        );
        registry.register(
            "news",
            WidgetTypeSpec::new("News", 3, 3).with_default_size(4, 5),
        );
        registry.register("notes", WidgetTypeSpec::new("Notes", 2, 2).with_default_size(3, 3));
        registry.register(
            "ticker",
            WidgetTypeSpec::new("Ticker", 2, 2)
                .with_default_size(12, 2)
                .with_max(None, Some(2)),
        );
        registry
    }

    /// Insert or replace a type.
    pub fn register(&mut self, type_name: impl Into<String>, spec: WidgetTypeSpec) {
        self.types.insert(type_name.into(), spec);
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with_type(mut self, type_name: impl Into<String>, spec: WidgetTypeSpec) -> Self {
        self.register(type_name, spec);
        self
    }

    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<&WidgetTypeSpec> {
        self.types.get(type_name)
    }

    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Spec for the type encoded in a widget id.
    #[must_use]
    pub fn spec_for_id(&self, id: &str) -> Option<&WidgetTypeSpec> {
        self.get(widget_type_of(id))
    }

    /// Declared `(min_w, min_h)` for the type behind `id`, or
    /// [`FALLBACK_MIN`] when the type is unknown.
    #[must_use]
    pub fn min_size_for_id(&self, id: &str) -> (u32, u32) {
        self.spec_for_id(id)
            .map_or(FALLBACK_MIN, |spec| (spec.min_w, spec.min_h))
    }

    /// Iterate types in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &WidgetTypeSpec)> {
        self.types.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Split an id into `(type, instance suffix)`.
#[must_use]
pub fn split_instance_id(id: &str) -> (&str, Option<u64>) {
    if let Some((prefix, suffix)) = id.rsplit_once('-')
        && !prefix.is_empty()
        && !suffix.is_empty()
        && suffix.bytes().all(|b| b.is_ascii_digit())
    {
        return (prefix, suffix.parse().ok());
    }
    (id, None)
}

/// Widget type encoded in an id (the id with its instance suffix stripped).
#[must_use]
pub fn widget_type_of(id: &str) -> &str {
    split_instance_id(id).0
}

/// Build a fresh id for `type_name` that none of `existing` uses.
///
/// Suffixes count up from one past the highest suffix already in use for the
/// same type, so removed ids are not recycled while their siblings remain.
pub fn next_instance_id<'a>(type_name: &str, existing: impl IntoIterator<Item = &'a str>) -> String {
    let highest = existing
        .into_iter()
        .filter_map(|id| match split_instance_id(id) {
            (ty, Some(n)) if ty == type_name => Some(n),
            (ty, None) if ty == type_name => Some(0),
            _ => None,
        })
        .max();
    let next = highest.map_or(1, |n| n.saturating_add(1));
    format!("{type_name}-{next}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_must_be_all_digits() {
        assert_eq!(split_instance_id("chart-12"), ("chart", Some(12)));
        assert_eq!(split_instance_id("chart-1a"), ("chart-1a", None));
        assert_eq!(split_instance_id("chart-"), ("chart-", None));
        assert_eq!(split_instance_id("-7"), ("-7", None));
        assert_eq!(split_instance_id("a"), ("a", None));
    }

    #[test]
    fn unknown_type_uses_fallback_minimum() {
        let registry = WidgetTypeRegistry::builtin();
        assert_eq!(registry.min_size_for_id("unknown-x"), FALLBACK_MIN);
        assert_eq!(registry.min_size_for_id("chart-3"), (4, 3));
    }

    #[test]
    fn next_instance_id_skips_used_suffixes() {
        let existing = ["chart-1", "chart-4", "table-9", "chart"];
        assert_eq!(next_instance_id("chart", existing), "chart-5");
        assert_eq!(next_instance_id("table", existing), "table-10");
        assert_eq!(next_instance_id("news", existing), "news-1");
    }

    #[test]
    fn clamp_respects_min_and_max() {
        let spec = WidgetTypeSpec::new("Ticker", 2, 2).with_max(Some(8), Some(2));
        assert_eq!(spec.clamp_size(1, 1), (2, 2));
        assert_eq!(spec.clamp_size(20, 9), (8, 2));
    }

    #[test]
    fn builtin_defaults_satisfy_minimums() {
        for (name, spec) in WidgetTypeRegistry::builtin().iter() {
            assert!(spec.default_w >= spec.min_w, "{name}");
            assert!(spec.default_h >= spec.min_h, "{name}");
        }
    }
}
