#![forbid(unsafe_code)]

//! Seams between the layout core and its host.
//!
//! The layout crate never owns live widget state or widget components. It
//! talks to them through these traits:
//!
//! - [`ViewStateSource`]: read the current view state of a widget when a
//!   layout is serialized (pull model; the state owner never writes storage).
//! - [`WidgetStateBridge`]: additionally seed state before a widget mounts
//!   and release it when the widget is removed.
//! - [`WidgetFactory`]: mount and unmount widget components.
//!
//! Methods take `&self` on the state traits; implementations use interior
//! mutability the same way an observable store does.

use std::fmt;

use crate::record::{Layout, LayoutRecord, ViewState};

/// Read access to live view state.
pub trait ViewStateSource {
    /// Current view state for `id`, or `None` if the widget has none.
    fn view_state(&self, id: &str) -> Option<ViewState>;
}

/// Lifecycle access to live view state.
pub trait WidgetStateBridge: ViewStateSource {
    /// Create or overwrite state for `id` from a persisted snapshot.
    ///
    /// Called before the widget mounts, so the first render already sees it.
    fn seed(&self, id: &str, view_state: Option<&ViewState>);

    /// Destroy the state for `id`.
    fn release(&self, id: &str);
}

/// A bridge with no state, for callers that only care about geometry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoViewState;

impl ViewStateSource for NoViewState {
    fn view_state(&self, _id: &str) -> Option<ViewState> {
        None
    }
}

impl WidgetStateBridge for NoViewState {
    fn seed(&self, _id: &str, _view_state: Option<&ViewState>) {}

    fn release(&self, _id: &str) {}
}

/// Copy `layout`, replacing each record's view state with the live value
/// from `source`. Records without live state keep their stored snapshot.
#[must_use]
pub fn snapshot_view_states(layout: &Layout, source: &dyn ViewStateSource) -> Layout {
    layout
        .iter()
        .map(|record| {
            let mut record = record.clone();
            if let Some(live) = source.view_state(&record.id) {
                record.view_state = Some(live);
            }
            record
        })
        .collect()
}

/// A widget component could not be mounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountError {
    pub id: String,
    pub reason: String,
}

impl fmt::Display for MountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to mount widget `{}`: {}", self.id, self.reason)
    }
}

impl std::error::Error for MountError {}

/// Creates and destroys widget components.
pub trait WidgetFactory {
    /// Mount the component for `record`. View state has already been seeded.
    fn mount(&mut self, record: &LayoutRecord) -> Result<(), MountError>;

    /// Tear down the component for `id`. Unknown ids are ignored.
    fn unmount(&mut self, id: &str);
}

/// A factory that mounts nothing and always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFactory;

impl WidgetFactory for NullFactory {
    fn mount(&mut self, _record: &LayoutRecord) -> Result<(), MountError> {
        Ok(())
    }

    fn unmount(&mut self, _id: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashgrid_core::GridRect;
    use serde_json::json;

    struct Fixed;

    impl ViewStateSource for Fixed {
        fn view_state(&self, id: &str) -> Option<ViewState> {
            (id == "chart-1").then(|| {
                let mut vs = ViewState::new();
                vs.insert("variant".into(), json!("line"));
                vs
            })
        }
    }

    #[test]
    fn snapshot_prefers_live_state() {
        let mut stored = ViewState::new();
        stored.insert("text".into(), json!("keep"));
        let layout = Layout::from_records([
            LayoutRecord::new("chart-1", GridRect::new(0, 0, 6, 6)),
            LayoutRecord::new("notes-1", GridRect::new(6, 0, 3, 3)).with_view_state(stored.clone()),
        ]);
        let snap = snapshot_view_states(&layout, &Fixed);
        assert_eq!(
            snap.get("chart-1").unwrap().view_state.as_ref().unwrap()["variant"],
            json!("line")
        );
        assert_eq!(snap.get("notes-1").unwrap().view_state, Some(stored));
    }
}
