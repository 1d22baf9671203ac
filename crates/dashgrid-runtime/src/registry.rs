#![forbid(unsafe_code)]

//! Per-widget ephemeral UI state with change notification.
//!
//! # Design
//!
//! [`WidgetStateRegistry`] owns one [`WidgetState`] per live widget id in
//! shared, reference-counted storage (`Rc<RefCell<..>>`). Cloning the
//! registry hands out another handle to the same entries. Each entry keeps
//! its own subscriber list; mutating an entry notifies that entry's live
//! subscribers in registration order.
//!
//! The layout crate reaches the registry only through the
//! [`ViewStateSource`] and [`WidgetStateBridge`] traits: it seeds state
//! before a widget mounts, releases it on removal, and reads snapshots when
//! a layout is serialized. The registry itself never touches storage.
//!
//! # Invariants
//!
//! 1. `version` of an entry increments by exactly 1 on each value-changing
//!    mutation; writing an equal value is a no-op.
//! 2. Subscribers are notified after the registry borrow is released, so a
//!    callback may read or write the registry.
//! 3. Deleting an entry drops its subscriber list; later notifications for
//!    a re-created id never reach the old subscribers.
//! 4. Dead subscribers (dropped [`Subscription`] guards) are pruned lazily.
//!
//! # Failure Modes
//!
//! - **Re-entrant update closure**: the closure passed to
//!   [`WidgetStateRegistry::update`] runs while the registry is borrowed;
//!   touching the registry from inside it panics. Subscriber callbacks do
//!   not have this restriction.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use dashgrid_layout::{ViewState, ViewStateSource, WidgetStateBridge};
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::debug;

type CallbackRc = Rc<dyn Fn(&WidgetState)>;
type CallbackWeak = Weak<dyn Fn(&WidgetState)>;

const VARIANT_KEY: &str = "variant";
const VIEW_MODE_KEY: &str = "viewMode";
const SELECTION_KEY: &str = "selection";

// =============================================================================
// WidgetState
// =============================================================================

/// UI selections of one widget instance.
///
/// The typed fields cover what every widget type shares; anything else a
/// widget wants to survive a reload goes into `extra`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WidgetState {
    pub variant: Option<String>,
    pub view_mode: Option<String>,
    pub selection: Option<String>,
    pub extra: ViewState,
}

impl WidgetState {
    /// Rebuild state from a persisted snapshot.
    ///
    /// Typed keys holding non-string values are kept in `extra` rather
    /// than dropped.
    #[must_use]
    pub fn from_view_state(view_state: &ViewState) -> Self {
        let mut state = Self::default();
        for (key, value) in view_state {
            let slot = match key.as_str() {
                VARIANT_KEY => &mut state.variant,
                VIEW_MODE_KEY => &mut state.view_mode,
                SELECTION_KEY => &mut state.selection,
                _ => {
                    state.extra.insert(key.clone(), value.clone());
                    continue;
                }
            };
            match value {
                Value::String(s) => *slot = Some(s.clone()),
                other => {
                    state.extra.insert(key.clone(), other.clone());
                }
            }
        }
        state
    }

    /// Snapshot for persistence, or `None` when nothing is set.
    #[must_use]
    pub fn to_view_state(&self) -> Option<ViewState> {
        if self.is_empty() {
            return None;
        }
        let mut map = self.extra.clone();
        let typed = [
            (VARIANT_KEY, &self.variant),
            (VIEW_MODE_KEY, &self.view_mode),
            (SELECTION_KEY, &self.selection),
        ];
        for (key, field) in typed {
            if let Some(value) = field {
                map.insert(key.to_owned(), Value::String(value.clone()));
            }
        }
        Some(map)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variant.is_none()
            && self.view_mode.is_none()
            && self.selection.is_none()
            && self.extra.is_empty()
    }
}

// =============================================================================
// Registry
// =============================================================================

struct Entry {
    state: WidgetState,
    version: u64,
    subscribers: Vec<CallbackWeak>,
}

impl Entry {
    fn new(state: WidgetState) -> Self {
        Self {
            state,
            version: 0,
            subscribers: Vec::new(),
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    entries: FxHashMap<String, Entry>,
    revision: u64,
    notifications: u64,
}

/// Owner of every live widget's [`WidgetState`].
///
/// Constructed explicitly and passed to whoever needs it; there is no
/// process-wide instance. Call [`teardown`](Self::teardown) when the
/// dashboard goes away.
#[derive(Clone, Default)]
pub struct WidgetStateRegistry {
    inner: Rc<RefCell<RegistryInner>>,
}

impl std::fmt::Debug for WidgetStateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("WidgetStateRegistry")
            .field("entries", &inner.entries.len())
            .field("revision", &inner.revision)
            .field("notifications", &inner.notifications)
            .finish()
    }
}

impl WidgetStateRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the state for `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<WidgetState> {
        self.inner.borrow().entries.get(id).map(|entry| entry.state.clone())
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.inner.borrow().entries.contains_key(id)
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted ids with live state.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.borrow().entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Change-counter for `id`, or `None` if it has no state.
    #[must_use]
    pub fn version(&self, id: &str) -> Option<u64> {
        self.inner.borrow().entries.get(id).map(|entry| entry.version)
    }

    /// Value-changing mutations across all entries since creation.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.borrow().revision
    }

    /// Total subscriber callbacks fired since creation.
    #[must_use]
    pub fn notification_count(&self) -> u64 {
        self.inner.borrow().notifications
    }

    /// Replace the state for `id`, creating it if absent.
    ///
    /// Returns `true` if the stored value changed.
    pub fn set(&self, id: &str, state: WidgetState) -> bool {
        self.update(id, move |current| *current = state)
    }

    /// Create default state for `id` if none exists. Existing state is kept.
    pub fn ensure(&self, id: &str) {
        self.inner
            .borrow_mut()
            .entries
            .entry(id.to_owned())
            .or_insert_with(|| Entry::new(WidgetState::default()));
    }

    /// Destroy the state for `id` together with its subscribers.
    pub fn delete(&self, id: &str) -> bool {
        let removed = self.inner.borrow_mut().entries.remove(id).is_some();
        if removed {
            debug!(id, "widget state released");
        }
        removed
    }

    /// Modify the state for `id` in place, creating it if absent.
    ///
    /// Subscribers are notified only if the value changed.
    pub fn update(&self, id: &str, f: impl FnOnce(&mut WidgetState)) -> bool {
        let (callbacks, value) = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let entry = inner
                .entries
                .entry(id.to_owned())
                .or_insert_with(|| Entry::new(WidgetState::default()));
            let before = entry.state.clone();
            f(&mut entry.state);
            if entry.state == before {
                return false;
            }
            entry.version += 1;
            inner.revision += 1;
            entry.subscribers.retain(|weak| weak.strong_count() > 0);
            let callbacks: Vec<CallbackRc> =
                entry.subscribers.iter().filter_map(Weak::upgrade).collect();
            let value = entry.state.clone();
            inner.notifications += callbacks.len() as u64;
            (callbacks, value)
        };
        for callback in &callbacks {
            callback(&value);
        }
        true
    }

    pub fn set_variant(&self, id: &str, variant: impl Into<String>) -> bool {
        let variant = variant.into();
        self.update(id, |state| state.variant = Some(variant))
    }

    pub fn set_view_mode(&self, id: &str, view_mode: impl Into<String>) -> bool {
        let view_mode = view_mode.into();
        self.update(id, |state| state.view_mode = Some(view_mode))
    }

    /// Set or clear the selected item.
    pub fn set_selection(&self, id: &str, selection: Option<String>) -> bool {
        self.update(id, |state| state.selection = selection)
    }

    /// Set one open-ended key. `Value::Null` removes it.
    pub fn set_extra(&self, id: &str, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        self.update(id, |state| {
            if value.is_null() {
                state.extra.remove(&key);
            } else {
                state.extra.insert(key, value);
            }
        })
    }

    /// Subscribe to changes of `id`, creating default state if absent.
    ///
    /// Dropping the returned guard unsubscribes.
    pub fn subscribe(&self, id: &str, callback: impl Fn(&WidgetState) + 'static) -> Subscription {
        let strong: CallbackRc = Rc::new(callback);
        self.inner
            .borrow_mut()
            .entries
            .entry(id.to_owned())
            .or_insert_with(|| Entry::new(WidgetState::default()))
            .subscribers
            .push(Rc::downgrade(&strong));
        Subscription::new(strong)
    }

    /// Live subscriber count for `id`.
    #[must_use]
    pub fn subscriber_count(&self, id: &str) -> usize {
        self.inner.borrow().entries.get(id).map_or(0, |entry| {
            entry
                .subscribers
                .iter()
                .filter(|weak| weak.strong_count() > 0)
                .count()
        })
    }

    /// Drop every entry and subscriber.
    pub fn teardown(&self) {
        let mut inner = self.inner.borrow_mut();
        let released = inner.entries.len();
        inner.entries.clear();
        debug!(released, "widget state registry torn down");
    }
}

impl ViewStateSource for WidgetStateRegistry {
    fn view_state(&self, id: &str) -> Option<ViewState> {
        self.inner
            .borrow()
            .entries
            .get(id)
            .and_then(|entry| entry.state.to_view_state())
    }
}

impl WidgetStateBridge for WidgetStateRegistry {
    fn seed(&self, id: &str, view_state: Option<&ViewState>) {
        match view_state {
            Some(snapshot) => {
                self.set(id, WidgetState::from_view_state(snapshot));
            }
            None => self.ensure(id),
        }
    }

    fn release(&self, id: &str) {
        self.delete(id);
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// RAII guard for a subscriber callback.
///
/// Dropping the guard drops the strong `Rc`, so the `Weak` held by the
/// publisher fails to upgrade on the next notification.
pub struct Subscription {
    _guard: Box<dyn std::any::Any>,
}

impl Subscription {
    pub(crate) fn new<T: 'static>(strong: T) -> Self {
        Self {
            _guard: Box::new(strong),
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    fn snapshot(value: Value) -> ViewState {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn set_and_get() {
        let registry = WidgetStateRegistry::new();
        assert!(registry.get("chart-1").is_none());
        assert!(registry.set_variant("chart-1", "candles"));
        assert_eq!(
            registry.get("chart-1").unwrap().variant.as_deref(),
            Some("candles")
        );
        assert_eq!(registry.version("chart-1"), Some(1));
    }

    #[test]
    fn equal_write_is_noop() {
        let registry = WidgetStateRegistry::new();
        registry.set_view_mode("table-1", "compact");
        assert!(!registry.set_view_mode("table-1", "compact"));
        assert_eq!(registry.version("table-1"), Some(1));
    }

    #[test]
    fn subscribers_fire_on_change_only() {
        let registry = WidgetStateRegistry::new();
        let hits = Rc::new(Cell::new(0));
        let seen = Rc::clone(&hits);
        let _sub = registry.subscribe("news-1", move |_| seen.set(seen.get() + 1));

        registry.set_selection("news-1", Some("AAPL".into()));
        registry.set_selection("news-1", Some("AAPL".into()));
        registry.set_selection("news-1", None);
        assert_eq!(hits.get(), 2);
        assert_eq!(registry.notification_count(), 2);
    }

    #[test]
    fn dropped_subscription_stops_notifications() {
        let registry = WidgetStateRegistry::new();
        let hits = Rc::new(Cell::new(0));
        let seen = Rc::clone(&hits);
        let sub = registry.subscribe("chart-1", move |_| seen.set(seen.get() + 1));
        registry.set_variant("chart-1", "line");
        drop(sub);
        registry.set_variant("chart-1", "bars");
        assert_eq!(hits.get(), 1);
        assert_eq!(registry.subscriber_count("chart-1"), 0);
    }

    #[test]
    fn subscriber_may_write_registry() {
        let registry = WidgetStateRegistry::new();
        let handle = registry.clone();
        let _sub = registry.subscribe("chart-1", move |state| {
            if let Some(variant) = &state.variant {
                handle.set_extra("mirror-1", "variant", json!(variant));
            }
        });
        registry.set_variant("chart-1", "area");
        assert_eq!(
            registry.get("mirror-1").unwrap().extra.get("variant"),
            Some(&json!("area"))
        );
    }

    #[test]
    fn delete_drops_subscribers() {
        let registry = WidgetStateRegistry::new();
        let hits = Rc::new(Cell::new(0));
        let seen = Rc::clone(&hits);
        let _sub = registry.subscribe("chart-1", move |_| seen.set(seen.get() + 1));
        assert!(registry.delete("chart-1"));
        registry.set_variant("chart-1", "line");
        assert_eq!(hits.get(), 0);
        assert!(!registry.delete("missing"));
    }

    #[test]
    fn view_state_round_trip_keeps_extra_and_typed_fields() {
        let source = snapshot(json!({
            "variant": "candles",
            "viewMode": "full",
            "selection": "MSFT",
            "listId": "tech",
            "zoom": 3
        }));
        let state = WidgetState::from_view_state(&source);
        assert_eq!(state.variant.as_deref(), Some("candles"));
        assert_eq!(state.view_mode.as_deref(), Some("full"));
        assert_eq!(state.selection.as_deref(), Some("MSFT"));
        assert_eq!(state.extra.len(), 2);
        assert_eq!(state.to_view_state(), Some(source));
    }

    #[test]
    fn non_string_typed_key_lands_in_extra() {
        let state = WidgetState::from_view_state(&snapshot(json!({"variant": 7})));
        assert!(state.variant.is_none());
        assert_eq!(state.extra.get("variant"), Some(&json!(7)));
    }

    #[test]
    fn empty_state_has_no_snapshot() {
        assert_eq!(WidgetState::default().to_view_state(), None);
    }

    #[test]
    fn bridge_seeds_and_releases() {
        let registry = WidgetStateRegistry::new();
        let seed = snapshot(json!({"variant": "line"}));
        registry.seed("chart-1", Some(&seed));
        registry.seed("table-1", None);
        assert_eq!(registry.view_state("chart-1"), Some(seed));
        assert!(registry.contains("table-1"));
        assert_eq!(registry.view_state("table-1"), None);

        registry.release("chart-1");
        assert!(!registry.contains("chart-1"));
    }

    #[test]
    fn seed_does_not_clobber_with_none() {
        let registry = WidgetStateRegistry::new();
        registry.set_variant("chart-1", "bars");
        registry.seed("chart-1", None);
        assert_eq!(registry.get("chart-1").unwrap().variant.as_deref(), Some("bars"));
    }

    #[test]
    fn teardown_clears_everything() {
        let registry = WidgetStateRegistry::new();
        registry.set_variant("a-1", "x");
        registry.set_variant("b-1", "y");
        registry.teardown();
        assert!(registry.is_empty());
        assert!(registry.ids().is_empty());
    }
}
