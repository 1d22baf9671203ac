#![forbid(unsafe_code)]

//! The serializable layout model.
//!
//! A [`Layout`] is an ordered list of [`LayoutRecord`]s, one per placed
//! widget. Order is insertion order only; geometry lives in each record.
//!
//! # Invariants
//!
//! 1. Record ids are unique within a layout ([`Layout::insert`] replaces).
//! 2. Constructors and mutators clamp `w`/`h` into `[min, max]`, so a record
//!    built through this API never violates its size bounds. Records
//!    deserialized from storage are checked by [`crate::validate`] instead.
//! 3. `view_state` is a snapshot; the live value is owned by the runtime
//!    widget-state registry.

use dashgrid_core::{DeviceClass, GridRect, WidgetTypeRegistry, WidgetTypeSpec, widget_type_of};
use serde::{Deserialize, Serialize};

/// Widget-type-specific UI state persisted alongside geometry.
pub type ViewState = serde_json::Map<String, serde_json::Value>;

/// One placed widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutRecord {
    /// Widget-type prefix plus instance suffix, e.g. `chart-1`.
    pub id: String,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    #[serde(default = "one")]
    pub min_w: u32,
    #[serde(default = "one")]
    pub min_h: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_w: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_h: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_state: Option<ViewState>,
}

fn one() -> u32 {
    1
}

impl LayoutRecord {
    /// Create a record with 1x1 minimums. The span is clamped to at least 1.
    #[must_use]
    pub fn new(id: impl Into<String>, rect: GridRect) -> Self {
        Self {
            id: id.into(),
            x: rect.x,
            y: rect.y,
            w: rect.w.max(1),
            h: rect.h.max(1),
            min_w: 1,
            min_h: 1,
            max_w: None,
            max_h: None,
            view_state: None,
        }
    }

    /// Create a record whose bounds come from `spec`.
    #[must_use]
    pub fn with_spec(id: impl Into<String>, rect: GridRect, spec: &WidgetTypeSpec) -> Self {
        let mut record = Self::new(id, rect);
        record.apply_spec(spec);
        record
    }

    /// Create a record whose bounds come from the registry entry for its type.
    ///
    /// Unknown types get the 2x2 fallback minimum.
    #[must_use]
    pub fn for_registry(
        id: impl Into<String>,
        rect: GridRect,
        registry: &WidgetTypeRegistry,
    ) -> Self {
        let id = id.into();
        match registry.spec_for_id(&id) {
            Some(spec) => {
                let spec = spec.clone();
                Self::with_spec(id, rect, &spec)
            }
            None => {
                let (min_w, min_h) = registry.min_size_for_id(&id);
                let mut record = Self::new(id, rect);
                record.min_w = min_w;
                record.min_h = min_h;
                record.clamp_span();
                record
            }
        }
    }

    /// Builder: attach a view-state snapshot.
    #[must_use]
    pub fn with_view_state(mut self, view_state: ViewState) -> Self {
        self.view_state = Some(view_state);
        self
    }

    /// Adopt the size bounds of `spec` and clamp the span into them.
    pub fn apply_spec(&mut self, spec: &WidgetTypeSpec) {
        self.min_w = spec.min_w.max(1);
        self.min_h = spec.min_h.max(1);
        self.max_w = spec.max_w;
        self.max_h = spec.max_h;
        self.clamp_span();
    }

    #[must_use]
    pub fn rect(&self) -> GridRect {
        GridRect::new(self.x, self.y, self.w, self.h)
    }

    /// Move and resize, clamping the span into this record's bounds.
    pub fn set_rect(&mut self, rect: GridRect) {
        self.x = rect.x;
        self.y = rect.y;
        self.w = rect.w;
        self.h = rect.h;
        self.clamp_span();
    }

    /// Widget type named by this record's id.
    #[must_use]
    pub fn widget_type(&self) -> &str {
        widget_type_of(&self.id)
    }

    /// Whether `w`/`h` sit inside `[min, max]`.
    #[must_use]
    pub fn satisfies_bounds(&self) -> bool {
        self.w >= self.min_w
            && self.h >= self.min_h
            && self.max_w.is_none_or(|max| self.w <= max)
            && self.max_h.is_none_or(|max| self.h <= max)
    }

    /// Same id, geometry, and view state. Bounds are registry-derived and
    /// therefore not compared.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.id == other.id && self.rect() == other.rect() && self.view_state == other.view_state
    }

    fn clamp_span(&mut self) {
        self.w = self.w.max(self.min_w);
        self.h = self.h.max(self.min_h);
        if let Some(max_w) = self.max_w {
            self.w = self.w.min(max_w.max(self.min_w));
        }
        if let Some(max_h) = self.max_h {
            self.h = self.h.min(max_h.max(self.min_h));
        }
    }
}

/// An ordered collection of records with unique ids.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Layout {
    records: Vec<LayoutRecord>,
}

impl Layout {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from records; a later record with a repeated id replaces the
    /// earlier one in place.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = LayoutRecord>) -> Self {
        let mut layout = Self::new();
        for record in records {
            layout.insert(record);
        }
        layout
    }

    #[must_use]
    pub fn records(&self) -> &[LayoutRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LayoutRecord> {
        self.records.iter()
    }

    #[must_use]
    pub fn into_records(self) -> Vec<LayoutRecord> {
        self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&LayoutRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut LayoutRecord> {
        self.records.iter_mut().find(|record| record.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|record| record.id.as_str())
    }

    /// Append a record, or replace the record with the same id in place.
    ///
    /// Returns the replaced record, if any.
    pub fn insert(&mut self, record: LayoutRecord) -> Option<LayoutRecord> {
        match self.records.iter_mut().find(|existing| existing.id == record.id) {
            Some(existing) => Some(std::mem::replace(existing, record)),
            None => {
                self.records.push(record);
                None
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<LayoutRecord> {
        let index = self.records.iter().position(|record| record.id == id)?;
        Some(self.records.remove(index))
    }

    /// First row below every record (0 for an empty layout).
    #[must_use]
    pub fn bottom(&self) -> u32 {
        self.records.iter().map(|r| r.rect().bottom()).max().unwrap_or(0)
    }

    /// Records sorted by `(y, x)`, ties kept in insertion order.
    #[must_use]
    pub fn sorted_row_major(&self) -> Vec<&LayoutRecord> {
        let mut sorted: Vec<&LayoutRecord> = self.records.iter().collect();
        sorted.sort_by_key(|record| record.rect().row_major_key());
        sorted
    }

    /// Derive a single-column layout: records in reading order, stacked at
    /// `x = 0` across the full mobile width, heights preserved. `min_w` is
    /// capped at the column count, matching how mobile layouts validate.
    #[must_use]
    pub fn stacked_for_mobile(&self) -> Self {
        let columns = DeviceClass::Mobile.columns();
        let mut y = 0;
        let mut stacked = Vec::with_capacity(self.records.len());
        for record in self.sorted_row_major() {
            let mut mobile = record.clone();
            mobile.min_w = mobile.min_w.min(columns);
            mobile.max_w = None;
            mobile.x = 0;
            mobile.y = y;
            mobile.w = columns;
            y = y.saturating_add(mobile.h);
            stacked.push(mobile);
        }
        Self { records: stacked }
    }

    /// Same set of ids with the same content, ignoring order.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .records
                .iter()
                .all(|record| other.get(&record.id).is_some_and(|o| o.same_content(record)))
    }
}

impl<'a> IntoIterator for &'a Layout {
    type Item = &'a LayoutRecord;
    type IntoIter = std::slice::Iter<'a, LayoutRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl FromIterator<LayoutRecord> for Layout {
    fn from_iter<I: IntoIterator<Item = LayoutRecord>>(iter: I) -> Self {
        Self::from_records(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constructors_clamp_to_minimums() {
        let registry = WidgetTypeRegistry::builtin();
        let record = LayoutRecord::for_registry("chart-1", GridRect::new(0, 0, 1, 1), &registry);
        assert_eq!((record.w, record.h), (4, 3));
        assert!(record.satisfies_bounds());
    }

    #[test]
    fn set_rect_respects_max() {
        let registry = WidgetTypeRegistry::builtin();
        let mut ticker = LayoutRecord::for_registry("ticker-1", GridRect::new(0, 0, 12, 2), &registry);
        ticker.set_rect(GridRect::new(1, 1, 6, 9));
        assert_eq!(ticker.rect(), GridRect::new(1, 1, 6, 2));
    }

    #[test]
    fn unknown_type_gets_fallback_minimum() {
        let registry = WidgetTypeRegistry::builtin();
        let record = LayoutRecord::for_registry("mystery", GridRect::new(0, 0, 1, 1), &registry);
        assert_eq!((record.min_w, record.min_h), (2, 2));
        assert_eq!((record.w, record.h), (2, 2));
    }

    #[test]
    fn serializes_camel_case_and_omits_absent_fields() {
        let record = LayoutRecord::new("notes-2", GridRect::new(1, 2, 3, 4));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({"id": "notes-2", "x": 1, "y": 2, "w": 3, "h": 4, "minW": 1, "minH": 1})
        );
    }

    #[test]
    fn view_state_round_trips() {
        let mut vs = ViewState::new();
        vs.insert("variant".into(), json!("candles"));
        let record = LayoutRecord::new("chart-1", GridRect::new(0, 0, 6, 6)).with_view_state(vs);
        let text = serde_json::to_string(&record).unwrap();
        assert!(text.contains("\"viewState\""));
        let back: LayoutRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn insert_replaces_same_id_in_place() {
        let mut layout = Layout::new();
        layout.insert(LayoutRecord::new("a", GridRect::new(0, 0, 1, 1)));
        layout.insert(LayoutRecord::new("b", GridRect::new(1, 0, 1, 1)));
        let old = layout.insert(LayoutRecord::new("a", GridRect::new(5, 5, 1, 1)));
        assert!(old.is_some());
        assert_eq!(layout.ids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(layout.get("a").unwrap().x, 5);
    }

    #[test]
    fn stacked_for_mobile_follows_reading_order() {
        let layout = Layout::from_records([
            LayoutRecord::new("b", GridRect::new(6, 0, 6, 3)),
            LayoutRecord::new("c", GridRect::new(0, 3, 12, 2)),
            LayoutRecord::new("a", GridRect::new(0, 0, 6, 4)),
        ]);
        let mobile = layout.stacked_for_mobile();
        let rects: Vec<(&str, GridRect)> =
            mobile.iter().map(|r| (r.id.as_str(), r.rect())).collect();
        assert_eq!(
            rects,
            vec![
                ("a", GridRect::new(0, 0, 1, 4)),
                ("b", GridRect::new(0, 4, 1, 3)),
                ("c", GridRect::new(0, 7, 1, 2)),
            ]
        );
    }

    #[test]
    fn same_content_ignores_order_and_bounds() {
        let a = Layout::from_records([
            LayoutRecord::new("a", GridRect::new(0, 0, 2, 2)),
            LayoutRecord::new("b", GridRect::new(2, 0, 2, 2)),
        ]);
        let mut b = Layout::from_records([
            LayoutRecord::new("b", GridRect::new(2, 0, 2, 2)),
            LayoutRecord::new("a", GridRect::new(0, 0, 2, 2)),
        ]);
        b.get_mut("a").unwrap().min_w = 2;
        assert!(a.same_content(&b));
        b.get_mut("b").unwrap().y = 1;
        assert!(!a.same_content(&b));
    }
}
