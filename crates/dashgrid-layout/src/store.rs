#![forbid(unsafe_code)]

//! Layout persistence.
//!
//! [`LayoutStore`] owns the storage backend and is the only component that
//! reads or writes persisted layouts.
//!
//! # Design
//!
//! - **Load** never fails. Missing, malformed, or invalid data yields the
//!   built-in default for the device class, which is then persisted so the
//!   next load is clean. Unknown widget types are dropped and counted.
//! - **Save** is debounced per device class. [`LayoutStore::save`] records
//!   the latest geometry and touches the [`Debouncer`]; the write happens in
//!   [`LayoutStore::flush_due`] once the burst settles. View state is pulled
//!   from a [`ViewStateSource`] at write time, so the widget-state owner
//!   never writes storage itself.
//! - Every write re-validates. An invalid layout is not written and the
//!   previously persisted value stays intact.
//! - A failing backend turns writes into logged no-ops; the in-memory grid
//!   stays authoritative.
//! - The mobile layout is fixed and never written by `save`.
//!
//! # Storage keys
//!
//! | Key                          | Value                         |
//! |------------------------------|-------------------------------|
//! | `<prefix>.layout.desktop`    | JSON array of layout records  |
//! | `<prefix>.layout.mobile`     | JSON array of layout records  |
//! | `<prefix>.aux.<name>`        | any JSON value                |

use std::collections::BTreeMap;
use std::io;
use std::time::Duration;

use dashgrid_core::{Debouncer, DeviceClass, GridRect, WidgetTypeRegistry};
use serde_json::Value;
use tracing::{debug, info, warn};
use web_time::Instant;

use crate::bridge::{ViewStateSource, snapshot_view_states};
use crate::clipboard::{self, Auxiliary, ClipboardPayload, ImportError};
use crate::compaction::{CompactNode, resolve_overlaps};
use crate::record::{Layout, LayoutRecord};
use crate::storage::{KeyValueStore, StorageError};
use crate::validate::{
    IssueCode, LayoutValidationError, ValidationIssue, validate_layout_for, validate_text_for,
};

/// Default storage key prefix.
pub const DEFAULT_KEY_PREFIX: &str = "dashgrid";

/// Default quiet window before a save is written.
pub const DEFAULT_SAVE_DEBOUNCE: Duration = Duration::from_millis(250);

/// Store tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub key_prefix: String,
    pub save_debounce: Duration,
    /// Force a write after continuous activity this long.
    pub save_max_wait: Option<Duration>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_owned(),
            save_debounce: DEFAULT_SAVE_DEBOUNCE,
            save_max_wait: Some(Duration::from_secs(2)),
        }
    }
}

/// Why `load` fell back to the default layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// Nothing stored yet.
    Missing,
    /// Stored text is not JSON.
    Malformed(String),
    /// Stored JSON breaks a validation rule.
    Invalid(String),
    /// The backend could not be read.
    Unavailable(String),
}

/// Where a loaded layout came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    Stored,
    Default(FallbackReason),
}

/// Diagnostics from one `load`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub device: DeviceClass,
    pub source: LoadSource,
    /// Ids dropped for naming an unknown widget type.
    pub dropped_unknown: Vec<String>,
    /// Records pushed down to clear stored overlaps.
    pub repaired_overlaps: usize,
    /// Every non-fatal validation finding.
    pub warnings: Vec<ValidationIssue>,
    /// Whether the default was written back to storage.
    pub persisted_default: bool,
}

impl LoadReport {
    fn new(device: DeviceClass, source: LoadSource) -> Self {
        Self {
            device,
            source,
            dropped_unknown: Vec::new(),
            repaired_overlaps: 0,
            warnings: Vec::new(),
            persisted_default: false,
        }
    }

    #[must_use]
    pub fn used_default(&self) -> bool {
        matches!(self.source, LoadSource::Default(_))
    }
}

/// Result of one write attempt.
#[derive(Debug)]
pub enum SaveOutcome {
    Written { bytes: usize },
    /// Serialized text equals what was last written.
    Unchanged,
    /// Mobile layouts are fixed.
    SkippedMobile,
    /// The layout failed validation; storage was not touched.
    Rejected(LayoutValidationError),
    /// The backend refused the write.
    Failed(StorageError),
}

impl SaveOutcome {
    #[must_use]
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written { .. })
    }
}

/// Whether `save` queued anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveSchedule {
    /// First save of a new burst.
    Scheduled,
    /// Folded into a pending burst.
    Coalesced,
    /// Mobile layouts are never saved.
    Ignored,
}

/// Persistence front end over a [`KeyValueStore`].
#[derive(Debug)]
pub struct LayoutStore<S> {
    storage: S,
    registry: WidgetTypeRegistry,
    options: StoreOptions,
    debouncer: Debouncer<DeviceClass>,
    pending: BTreeMap<DeviceClass, Layout>,
    last_written: BTreeMap<DeviceClass, String>,
    desktop_default: Layout,
}

impl<S: KeyValueStore> LayoutStore<S> {
    #[must_use]
    pub fn new(storage: S, registry: WidgetTypeRegistry) -> Self {
        Self::with_options(storage, registry, StoreOptions::default())
    }

    #[must_use]
    pub fn with_options(storage: S, registry: WidgetTypeRegistry, options: StoreOptions) -> Self {
        let mut debouncer = Debouncer::new(options.save_debounce);
        if let Some(max_wait) = options.save_max_wait {
            debouncer = debouncer.with_max_wait(max_wait);
        }
        let desktop_default = builtin_desktop_layout(&registry);
        Self {
            storage,
            registry,
            options,
            debouncer,
            pending: BTreeMap::new(),
            last_written: BTreeMap::new(),
            desktop_default,
        }
    }

    /// Builder: replace the desktop default (the mobile default is derived
    /// from it).
    #[must_use]
    pub fn with_desktop_default(mut self, layout: Layout) -> Self {
        self.desktop_default = layout;
        self
    }

    // ---------------------------------------------------------------------
    // Keys and accessors
    // ---------------------------------------------------------------------

    #[must_use]
    pub fn layout_key(&self, device: DeviceClass) -> String {
        format!("{}.layout.{}", self.options.key_prefix, device.as_str())
    }

    #[must_use]
    pub fn aux_key(&self, name: &str) -> String {
        format!("{}.aux.{name}", self.options.key_prefix)
    }

    #[must_use]
    pub fn registry(&self) -> &WidgetTypeRegistry {
        &self.registry
    }

    #[must_use]
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// The built-in layout for a device class.
    #[must_use]
    pub fn default_layout(&self, device: DeviceClass) -> Layout {
        match device {
            DeviceClass::Desktop => self.desktop_default.clone(),
            DeviceClass::Mobile => self.desktop_default.stacked_for_mobile(),
        }
    }

    // ---------------------------------------------------------------------
    // Load
    // ---------------------------------------------------------------------

    /// Load the layout for `device`, falling back to the default.
    pub fn load(&mut self, device: DeviceClass) -> Layout {
        self.load_with_report(device).0
    }

    /// [`load`](Self::load) plus diagnostics.
    pub fn load_with_report(&mut self, device: DeviceClass) -> (Layout, LoadReport) {
        let key = self.layout_key(device);
        let text = match self.storage.get(&key) {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!(device = %device, "no stored layout; using default");
                return self.fall_back(device, FallbackReason::Missing, true);
            }
            Err(err) => {
                warn!(device = %device, error = %err, "layout storage unreadable; using default");
                return self.fall_back(device, FallbackReason::Unavailable(err.to_string()), false);
            }
        };

        let validated = match validate_text_for(&text, &self.registry, device) {
            Ok(validated) => validated,
            Err(err) => {
                warn!(device = %device, error = %err, "stored layout rejected; using default");
                let reason = match err {
                    LayoutValidationError::Malformed { reason, .. } => {
                        FallbackReason::Malformed(reason)
                    }
                    invalid @ LayoutValidationError::Invalid { .. } => {
                        FallbackReason::Invalid(invalid.to_string())
                    }
                };
                return self.fall_back(device, reason, true);
            }
        };

        let mut report = LoadReport::new(device, LoadSource::Stored);
        for id in validated.report.dropped_unknown() {
            warn!(device = %device, id, "dropping record with unknown widget type");
            report.dropped_unknown.push(id.to_owned());
        }
        report.warnings = validated.report.warnings().cloned().collect();

        let mut layout = validated.layout;
        if validated.report.count(IssueCode::Overlap) > 0 {
            report.repaired_overlaps = repair_overlaps(&mut layout);
            warn!(
                device = %device,
                repaired = report.repaired_overlaps,
                "stored layout had overlapping records; pushed down"
            );
        }
        self.last_written.insert(device, text);
        (layout, report)
    }

    fn fall_back(
        &mut self,
        device: DeviceClass,
        reason: FallbackReason,
        persist: bool,
    ) -> (Layout, LoadReport) {
        let layout = self.default_layout(device);
        let mut report = LoadReport::new(device, LoadSource::Default(reason));
        if persist {
            report.persisted_default = self.write(device, &layout).is_written();
        }
        (layout, report)
    }

    // ---------------------------------------------------------------------
    // Save
    // ---------------------------------------------------------------------

    /// Schedule a debounced save of `layout` for `device`.
    pub fn save(&mut self, layout: &Layout, device: DeviceClass, now: Instant) -> SaveSchedule {
        if !device.is_editable() {
            debug!(device = %device, "ignoring save of fixed layout");
            return SaveSchedule::Ignored;
        }
        self.pending.insert(device, layout.clone());
        if self.debouncer.touch(device, now) {
            SaveSchedule::Scheduled
        } else {
            SaveSchedule::Coalesced
        }
    }

    /// Write every pending save whose quiet window has elapsed.
    pub fn flush_due(
        &mut self,
        now: Instant,
        states: &dyn ViewStateSource,
    ) -> Vec<(DeviceClass, SaveOutcome)> {
        let due = self.debouncer.due(now);
        self.flush_devices(due, states)
    }

    /// Write every pending save immediately (e.g. on shutdown).
    pub fn flush_all(&mut self, states: &dyn ViewStateSource) -> Vec<(DeviceClass, SaveOutcome)> {
        let due = self.debouncer.take_all();
        self.flush_devices(due, states)
    }

    /// Earliest instant at which a pending save becomes due.
    #[must_use]
    pub fn next_flush_deadline(&self) -> Option<Instant> {
        self.debouncer.next_deadline()
    }

    #[must_use]
    pub fn has_pending_save(&self, device: DeviceClass) -> bool {
        self.debouncer.is_pending(&device)
    }

    /// Saves folded into an earlier pending save since creation.
    #[must_use]
    pub fn coalesced_saves(&self) -> u64 {
        self.debouncer.coalesced_count()
    }

    /// Write now, cancelling any pending save for `device`.
    pub fn save_now(
        &mut self,
        layout: &Layout,
        device: DeviceClass,
        states: &dyn ViewStateSource,
    ) -> SaveOutcome {
        self.debouncer.cancel(&device);
        self.pending.remove(&device);
        if !device.is_editable() {
            return SaveOutcome::SkippedMobile;
        }
        let snapshot = snapshot_view_states(layout, states);
        self.write(device, &snapshot)
    }

    fn flush_devices(
        &mut self,
        devices: Vec<DeviceClass>,
        states: &dyn ViewStateSource,
    ) -> Vec<(DeviceClass, SaveOutcome)> {
        devices
            .into_iter()
            .filter_map(|device| {
                let layout = self.pending.remove(&device)?;
                let snapshot = snapshot_view_states(&layout, states);
                Some((device, self.write(device, &snapshot)))
            })
            .collect()
    }

    fn write(&mut self, device: DeviceClass, layout: &Layout) -> SaveOutcome {
        let validated = match validate_layout_for(layout, &self.registry, device) {
            Ok(validated) => validated,
            Err(err) => {
                warn!(device = %device, error = %err, "refusing to persist invalid layout");
                return SaveOutcome::Rejected(err);
            }
        };
        let text = match serde_json::to_string(&validated.layout) {
            Ok(text) => text,
            Err(err) => {
                return SaveOutcome::Failed(StorageError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("failed to serialize layout: {err}"),
                )));
            }
        };
        if self.last_written.get(&device) == Some(&text) {
            return SaveOutcome::Unchanged;
        }
        let key = self.layout_key(device);
        match self.storage.set(&key, &text) {
            Ok(()) => {
                debug!(device = %device, bytes = text.len(), "layout persisted");
                let bytes = text.len();
                self.last_written.insert(device, text);
                SaveOutcome::Written { bytes }
            }
            Err(err) => {
                warn!(
                    device = %device,
                    error = %err,
                    "layout save failed; keeping in-memory state"
                );
                SaveOutcome::Failed(err)
            }
        }
    }

    /// Delete the stored layout for `device`.
    pub fn clear(&mut self, device: DeviceClass) -> Result<(), StorageError> {
        self.debouncer.cancel(&device);
        self.pending.remove(&device);
        self.last_written.remove(&device);
        self.storage.remove(&self.layout_key(device))
    }

    // ---------------------------------------------------------------------
    // Auxiliary collections
    // ---------------------------------------------------------------------

    /// Every stored auxiliary collection. Unparseable entries are skipped.
    pub fn load_auxiliary(&self) -> Result<Auxiliary, StorageError> {
        let prefix = self.aux_key("");
        let mut auxiliary = Auxiliary::new();
        for key in self.storage.keys_with_prefix(&prefix)? {
            let Some(text) = self.storage.get(&key)? else {
                continue;
            };
            let name = key[prefix.len()..].to_owned();
            match serde_json::from_str::<Value>(&text) {
                Ok(value) => {
                    auxiliary.insert(name, value);
                }
                Err(err) => warn!(collection = %name, error = %err, "skipping unreadable collection"),
            }
        }
        Ok(auxiliary)
    }

    /// Write each collection under its own key.
    pub fn save_auxiliary(&mut self, auxiliary: &Auxiliary) -> Result<(), StorageError> {
        for (name, value) in auxiliary {
            let text = value.to_string();
            let key = self.aux_key(name);
            self.storage.set(&key, &text)?;
        }
        if !auxiliary.is_empty() {
            info!(collections = auxiliary.len(), "auxiliary collections persisted");
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Clipboard
    // ---------------------------------------------------------------------

    /// Clipboard text for `layout` with live view state and `auxiliary`.
    #[must_use]
    pub fn export_text(
        &self,
        layout: &Layout,
        states: &dyn ViewStateSource,
        auxiliary: &Auxiliary,
    ) -> String {
        clipboard::export_text(&snapshot_view_states(layout, states), auxiliary)
    }

    /// Parse clipboard text. Storage is not touched.
    pub fn import_text(&self, text: &str) -> Result<ClipboardPayload, ImportError> {
        let mut payload = clipboard::import_text(text, &self.registry)?;
        if payload.report.count(IssueCode::Overlap) > 0 {
            repair_overlaps(&mut payload.layout);
        }
        Ok(payload)
    }
}

/// Push overlapping records down. Returns how many moved.
fn repair_overlaps(layout: &mut Layout) -> usize {
    let nodes: Vec<CompactNode> = layout
        .iter()
        .map(|record| CompactNode::new(record.id.clone(), record.rect()))
        .collect();
    let outcome = resolve_overlaps(&nodes);
    for node_move in &outcome.moves {
        if let Some(record) = layout.get_mut(&node_move.id) {
            record.set_rect(node_move.to);
        }
    }
    outcome.pushed_down
}

/// The built-in desktop arrangement, limited to types the registry knows.
#[must_use]
pub fn builtin_desktop_layout(registry: &WidgetTypeRegistry) -> Layout {
    const ARRANGEMENT: [(&str, GridRect); 5] = [
        ("ticker-1", GridRect::new(0, 0, 12, 2)),
        ("chart-1", GridRect::new(0, 2, 8, 6)),
        ("watchlist-1", GridRect::new(8, 2, 4, 6)),
        ("table-1", GridRect::new(0, 8, 6, 5)),
        ("news-1", GridRect::new(6, 8, 6, 5)),
    ];
    ARRANGEMENT
        .iter()
        .filter_map(|(id, rect)| {
            let spec = registry.spec_for_id(id)?;
            Some(LayoutRecord::with_spec(*id, *rect, spec))
        })
        .collect()
}
