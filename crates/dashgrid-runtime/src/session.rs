#![forbid(unsafe_code)]

//! One dashboard's lifetime: load, reconcile, compact, persist.
//!
//! # Design
//!
//! [`DashboardSession`] owns the store, the grid adapter, the widget
//! factory, the state registry, the event bus, and the task queue. Every
//! entry point takes `&mut self` and finishes its grid work before
//! returning. Callbacks (grid change handlers, bus handlers) never touch the
//! grid; they drop notes into a shared inbox that the session drains:
//!
//! - removal requests published on the bus are applied on the next
//!   [`tick`](DashboardSession::tick), as microtasks;
//! - grid change notifications and view-state revisions schedule a
//!   debounced save.
//!
//! After a layout is applied, animations are re-enabled on the next frame
//! and a settle pass runs either when the host reports the engine ready
//! ([`mark_ready`](DashboardSession::mark_ready)) or once the configured
//! settle delay elapses, whichever comes first.
//!
//! # Invariants
//!
//! 1. Reset, load, paste, and device switches reconcile in
//!    [`ReconcileMode::Replace`]; add, remove, and gestures reconcile or
//!    compact incrementally.
//! 2. Drag gestures compact in [`CompactionMode::Full`], resize gestures in
//!    [`CompactionMode::VerticalOnly`].
//! 3. Mobile layouts are fixed: edits are refused and nothing is saved.
//! 4. A failed import changes neither the grid nor storage.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use dashgrid_core::{DeviceClass, GridRect, WidgetTypeRegistry, next_instance_id};
use dashgrid_layout::{
    AdapterState, Auxiliary, ChangeKind, ChangeSubscription, CompactionMode, CompactionSummary,
    GridAdapter, GridChange, GridEngine, ImportError, KeyValueStore, Layout, LayoutRecord,
    LayoutStore, LoadReport, ReconcileMode, ReconcileReport, SaveOutcome, ViewStateSource,
    WidgetFactory, compact_live, first_overlap, reconcile,
};
use tracing::{debug, info, info_span, warn};
use web_time::Instant;

use crate::bus::{DashboardEvent, EventBus, EventKind, Scope};
use crate::config::DashboardConfig;
use crate::registry::{Subscription, WidgetState, WidgetStateRegistry};
use crate::tasks::TaskQueue;

// =============================================================================
// Reports and errors
// =============================================================================

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Created,
    Running,
    ShutDown,
}

/// Deferred work owned by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTask {
    RemoveWidget(String),
    Compact(CompactionMode),
    RestoreAnimation,
    Settle { generation: u64 },
}

/// Result of a settle pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleReport {
    /// Directly placed nodes handed back to the engine.
    pub adopted: usize,
    /// Nodes moved to clear overlaps found after settling.
    pub repaired_overlaps: usize,
    pub state: AdapterState,
}

/// What a tick (or a gesture) did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub removed: Vec<String>,
    pub compactions: Vec<CompactionSummary>,
    pub animation_restored: bool,
    pub settle: Option<SettleReport>,
    /// A debounced save was scheduled or extended.
    pub save_scheduled: bool,
    pub saves: Vec<(DeviceClass, SaveOutcome)>,
}

/// Errors returned by session operations.
#[derive(Debug)]
pub enum SessionError {
    NotStarted,
    AlreadyStarted,
    ShutDown,
    /// The current device class has a fixed layout.
    NotEditable { device: DeviceClass },
    UnknownWidgetType { type_name: String },
    /// The factory refused to mount the new widget.
    MountFailed { id: String },
    /// Clipboard text was rejected; nothing changed.
    Import(ImportError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "session has not been started"),
            Self::AlreadyStarted => write!(f, "session is already running"),
            Self::ShutDown => write!(f, "session has been shut down"),
            Self::NotEditable { device } => write!(f, "{device} layout is not editable"),
            Self::UnknownWidgetType { type_name } => {
                write!(f, "unknown widget type {type_name:?}")
            }
            Self::MountFailed { id } => write!(f, "widget {id} could not be mounted"),
            Self::Import(err) => write!(f, "import rejected: {err}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Import(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ImportError> for SessionError {
    fn from(err: ImportError) -> Self {
        Self::Import(err)
    }
}

// =============================================================================
// Session
// =============================================================================

#[derive(Default)]
struct Inbox {
    removals: Vec<String>,
    changes: Vec<GridChange>,
}

/// Orchestrates one dashboard.
pub struct DashboardSession<S, E> {
    config: DashboardConfig,
    store: LayoutStore<S>,
    adapter: GridAdapter<E>,
    factory: Box<dyn WidgetFactory>,
    registry: WidgetStateRegistry,
    bus: EventBus,
    tasks: TaskQueue<SessionTask>,
    inbox: Rc<RefCell<Inbox>>,
    bus_subscriptions: Vec<Subscription>,
    _change_subscription: Option<ChangeSubscription>,
    phase: SessionPhase,
    device: DeviceClass,
    locked: bool,
    auxiliary: Auxiliary,
    settle_generation: u64,
    restore_animate: Option<bool>,
    seen_revision: u64,
}

impl<S, E> fmt::Debug for DashboardSession<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DashboardSession")
            .field("phase", &self.phase)
            .field("device", &self.device)
            .field("locked", &self.locked)
            .field("pending_tasks", &self.tasks.len())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl<S: KeyValueStore, E: GridEngine> DashboardSession<S, E> {
    /// Wire a session. Nothing touches the grid until [`start`](Self::start).
    pub fn new(
        config: DashboardConfig,
        storage: S,
        types: WidgetTypeRegistry,
        mut adapter: GridAdapter<E>,
        factory: impl WidgetFactory + 'static,
    ) -> Self {
        let store = LayoutStore::with_options(storage, types, config.store_options());
        let registry = WidgetStateRegistry::new();
        let bus = EventBus::new();
        let inbox = Rc::new(RefCell::new(Inbox::default()));

        let removals = Rc::clone(&inbox);
        let removal_sub = bus.subscribe_kind(EventKind::WidgetRemovalRequested, move |event| {
            if let DashboardEvent::WidgetRemovalRequested { id } = event {
                removals.borrow_mut().removals.push(id.clone());
            }
        });
        let selections = registry.clone();
        let selection_sub = bus.subscribe_kind(EventKind::SelectionChanged, move |event| {
            if let DashboardEvent::SelectionChanged { id, scope } = event {
                apply_selection(&selections, id, scope);
            }
        });
        let changes = Rc::clone(&inbox);
        let change_sub = adapter.on_change(move |change| {
            changes.borrow_mut().changes.push(change.clone());
        });

        let locked = config.locked;
        Self {
            config,
            store,
            adapter,
            factory: Box::new(factory),
            registry,
            bus,
            tasks: TaskQueue::new(),
            inbox,
            bus_subscriptions: vec![removal_sub, selection_sub],
            _change_subscription: Some(change_sub),
            phase: SessionPhase::Created,
            device: DeviceClass::Desktop,
            locked,
            auxiliary: Auxiliary::new(),
            settle_generation: 0,
            restore_animate: None,
            seen_revision: 0,
        }
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Initialize the grid for `device` and apply the stored layout.
    pub fn start(&mut self, device: DeviceClass, now: Instant) -> Result<LoadReport, SessionError> {
        match self.phase {
            SessionPhase::Created => {}
            SessionPhase::Running => return Err(SessionError::AlreadyStarted),
            SessionPhase::ShutDown => return Err(SessionError::ShutDown),
        }
        let _span = info_span!("dashgrid.session.start", device = %device).entered();

        self.device = device;
        self.adapter
            .init(self.config.grid_options(device, self.locked));
        self.auxiliary = match self.store.load_auxiliary() {
            Ok(auxiliary) => auxiliary,
            Err(err) => {
                warn!(error = %err, "auxiliary collections unavailable; starting empty");
                Auxiliary::new()
            }
        };

        let (layout, report) = self.store.load_with_report(device);
        self.phase = SessionPhase::Running;
        self.apply(&layout, ReconcileMode::Replace, now);
        self.discard_pending_changes();
        info!(
            widgets = layout.len(),
            used_default = report.used_default(),
            dropped = report.dropped_unknown.len(),
            "dashboard session started"
        );
        Ok(report)
    }

    /// Flush pending saves, unmount every widget, and release all state.
    ///
    /// Later calls are no-ops returning nothing.
    pub fn shutdown(&mut self) -> Vec<(DeviceClass, SaveOutcome)> {
        if self.phase != SessionPhase::Running {
            self.phase = SessionPhase::ShutDown;
            return Vec::new();
        }
        let mut outcomes = Vec::new();
        if self.take_pending_changes() && self.device.is_editable() {
            let layout = self.current_layout();
            outcomes.push((
                self.device,
                self.store.save_now(&layout, self.device, &self.registry),
            ));
        }
        outcomes.extend(self.store.flush_all(&self.registry));

        for node in self.adapter.nodes() {
            self.factory.unmount(&node.id);
        }
        self.registry.teardown();
        self.tasks.clear();
        self.bus_subscriptions.clear();
        self._change_subscription = None;
        self.phase = SessionPhase::ShutDown;
        info!(saves = outcomes.len(), "dashboard session shut down");
        outcomes
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    /// Add a widget of `type_name` at its default size and let gravity
    /// pull it into the first gap. Returns the new id.
    pub fn add_widget(&mut self, type_name: &str, now: Instant) -> Result<String, SessionError> {
        self.ensure_running()?;
        self.ensure_editable()?;
        let spec = self
            .store
            .registry()
            .get(type_name)
            .cloned()
            .ok_or_else(|| SessionError::UnknownWidgetType {
                type_name: type_name.to_owned(),
            })?;

        let mut desired = self.current_layout();
        let id = next_instance_id(type_name, desired.ids());
        let width = spec.default_w.min(self.adapter.options().columns);
        let rect = GridRect::new(0, desired.bottom(), width, spec.default_h);
        desired.insert(LayoutRecord::with_spec(id.clone(), rect, &spec));

        let report = self.apply(
            &desired,
            ReconcileMode::Incremental(CompactionMode::Full),
            now,
        );
        self.schedule_save_if_changed(now);
        if report.mount_failures.contains(&id) {
            return Err(SessionError::MountFailed { id });
        }
        debug!(id = %id, "widget added");
        Ok(id)
    }

    /// Remove widget `id`. Returns `false` if it was not on the grid.
    pub fn remove_widget(&mut self, id: &str, now: Instant) -> Result<bool, SessionError> {
        self.ensure_running()?;
        self.ensure_editable()?;
        let mut desired = self.current_layout();
        if desired.remove(id).is_none() {
            return Ok(false);
        }
        self.apply(
            &desired,
            ReconcileMode::Incremental(CompactionMode::Full),
            now,
        );
        self.schedule_save_if_changed(now);
        debug!(id, "widget removed");
        Ok(true)
    }

    /// Replace the grid with the default layout and clear view state.
    pub fn reset(&mut self, now: Instant) -> Result<ReconcileReport, SessionError> {
        self.ensure_running()?;
        let desired = self.store.default_layout(self.device);
        for id in self.registry.ids() {
            if desired.contains(&id) {
                self.registry.set(&id, WidgetState::default());
            }
        }
        let report = self.apply(&desired, ReconcileMode::Replace, now);
        self.persist_now();
        info!(widgets = desired.len(), "layout reset to default");
        Ok(report)
    }

    /// Clipboard text for the live layout, view state, and collections.
    pub fn copy_text(&self) -> Result<String, SessionError> {
        self.ensure_running()?;
        let layout = self.current_layout();
        Ok(self
            .store
            .export_text(&layout, &self.registry, &self.auxiliary))
    }

    /// Replace the grid with pasted text.
    ///
    /// Rejected text leaves the grid, state, and storage untouched.
    pub fn paste_text(&mut self, text: &str, now: Instant) -> Result<ReconcileReport, SessionError> {
        self.ensure_running()?;
        self.ensure_editable()?;
        let payload = self.store.import_text(text)?;

        if !payload.auxiliary.is_empty() {
            let names: Vec<String> = payload.auxiliary.keys().cloned().collect();
            self.auxiliary.extend(payload.auxiliary);
            if let Err(err) = self.store.save_auxiliary(&self.auxiliary) {
                warn!(error = %err, "pasted collections kept in memory only");
            }
            for collection_id in names {
                self.bus.publish(DashboardEvent::CollectionUpdated {
                    collection_id,
                    scope: Scope::All,
                });
            }
        }

        let report = self.apply(&payload.layout, ReconcileMode::Replace, now);
        self.persist_now();
        info!(
            widgets = payload.layout.len(),
            shape = ?payload.shape,
            "layout pasted"
        );
        Ok(report)
    }

    /// Switch between desktop and mobile grids.
    pub fn set_device_class(
        &mut self,
        device: DeviceClass,
        now: Instant,
    ) -> Result<ReconcileReport, SessionError> {
        self.ensure_running()?;
        if device == self.device {
            return Ok(ReconcileReport::default());
        }
        let _span = info_span!("dashgrid.session.device", from = %self.device, to = %device).entered();

        if self.take_pending_changes() && self.device.is_editable() {
            let layout = self.current_layout();
            self.store.save(&layout, self.device, now);
        }
        self.store.flush_all(&self.registry);

        let options = self.config.grid_options(device, self.locked);
        let widening = options.columns > self.adapter.options().columns;
        if widening {
            self.set_columns(options.columns);
        }
        self.adapter
            .set_gestures_allowed(options.drag_enabled, options.resize_enabled);
        self.device = device;

        let desired = self.store.load(device);
        let report = self.apply(&desired, ReconcileMode::Replace, now);
        if !widening {
            self.set_columns(options.columns);
        }
        self.discard_pending_changes();
        Ok(report)
    }

    /// Turn locked mode on or off.
    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
        let options = self.config.grid_options(self.device, locked);
        self.adapter
            .set_gestures_allowed(options.drag_enabled, options.resize_enabled);
        debug!(locked, "locked mode changed");
    }

    /// The host reports a finished drag or resize on `ids`.
    ///
    /// Compacts the grid and schedules a save.
    pub fn handle_user_change(
        &mut self,
        kind: ChangeKind,
        ids: &[String],
        now: Instant,
    ) -> Result<TickReport, SessionError> {
        self.ensure_running()?;
        let mut report = TickReport::default();
        if !self.device.is_editable() || self.locked {
            debug!(kind = ?kind, "ignoring gesture on a fixed layout");
            return Ok(report);
        }
        self.adapter.notify_user_change(kind, ids);
        let mode = match kind {
            ChangeKind::Resize => CompactionMode::VerticalOnly,
            ChangeKind::Drag | ChangeKind::Structural => CompactionMode::Full,
        };
        self.tasks.queue_microtask(SessionTask::Compact(mode));
        self.run_microtasks(now, &mut report);
        report.save_scheduled = self.schedule_save_if_changed(now);
        Ok(report)
    }

    /// The host reports the engine signalled readiness. Runs the settle
    /// pass now instead of waiting for the delay.
    pub fn mark_ready(&mut self) -> Result<SettleReport, SessionError> {
        self.ensure_running()?;
        self.adapter.mark_ready();
        self.tasks
            .retain(|task| !matches!(task, SessionTask::Settle { .. }));
        Ok(self.settle())
    }

    /// Run deferred work due at `now`.
    pub fn tick(&mut self, now: Instant) -> Result<TickReport, SessionError> {
        self.ensure_running()?;
        let mut report = TickReport::default();

        let removals = std::mem::take(&mut self.inbox.borrow_mut().removals);
        for id in removals {
            self.tasks.queue_microtask(SessionTask::RemoveWidget(id));
        }
        self.run_microtasks(now, &mut report);

        for task in self.tasks.take_frame() {
            self.run_task(task, now, &mut report);
        }
        for task in self.tasks.take_due(now) {
            self.run_task(task, now, &mut report);
        }
        self.run_microtasks(now, &mut report);

        report.save_scheduled = self.schedule_save_if_changed(now);
        report.saves = self.store.flush_due(now, &self.registry);
        Ok(report)
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// The live layout with current view state.
    #[must_use]
    pub fn current_layout(&self) -> Layout {
        self.adapter
            .nodes()
            .into_iter()
            .map(|node| {
                let mut record = node.to_record();
                // Fixed layouts may place widgets narrower than their type minimum.
                record.min_w = record.min_w.min(record.w);
                record.min_h = record.min_h.min(record.h);
                record.view_state = self.registry.view_state(&record.id);
                record
            })
            .collect()
    }

    /// Earliest instant at which [`tick`](Self::tick) has timed work.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.store.next_flush_deadline(), self.tasks.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn device(&self) -> DeviceClass {
        self.device
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    #[must_use]
    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &WidgetStateRegistry {
        &self.registry
    }

    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    #[must_use]
    pub fn auxiliary(&self) -> &Auxiliary {
        &self.auxiliary
    }

    #[must_use]
    pub fn store(&self) -> &LayoutStore<S> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut LayoutStore<S> {
        &mut self.store
    }

    #[must_use]
    pub fn adapter(&self) -> &GridAdapter<E> {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut GridAdapter<E> {
        &mut self.adapter
    }

    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn ensure_running(&self) -> Result<(), SessionError> {
        match self.phase {
            SessionPhase::Running => Ok(()),
            SessionPhase::Created => Err(SessionError::NotStarted),
            SessionPhase::ShutDown => Err(SessionError::ShutDown),
        }
    }

    fn ensure_editable(&self) -> Result<(), SessionError> {
        if self.device.is_editable() {
            Ok(())
        } else {
            Err(SessionError::NotEditable {
                device: self.device,
            })
        }
    }

    fn apply(&mut self, desired: &Layout, mode: ReconcileMode, now: Instant) -> ReconcileReport {
        let previous_animate = self.adapter.set_animate(false);
        self.restore_animate.get_or_insert(previous_animate);
        let report = reconcile(
            &mut self.adapter,
            desired,
            mode,
            self.factory.as_mut(),
            &self.registry,
        );
        self.tasks.request_frame(SessionTask::RestoreAnimation);

        self.settle_generation += 1;
        self.tasks
            .retain(|task| !matches!(task, SessionTask::Settle { .. }));
        self.tasks.schedule_after(
            now,
            self.config.settle_delay(),
            SessionTask::Settle {
                generation: self.settle_generation,
            },
        );
        report
    }

    fn run_microtasks(&mut self, now: Instant, report: &mut TickReport) {
        while let Some(task) = self.tasks.take_microtask() {
            self.run_task(task, now, report);
        }
    }

    fn run_task(&mut self, task: SessionTask, now: Instant, report: &mut TickReport) {
        match task {
            SessionTask::RemoveWidget(id) => match self.remove_widget(&id, now) {
                Ok(true) => report.removed.push(id),
                Ok(false) => debug!(id = %id, "removal requested for absent widget"),
                Err(err) => warn!(id = %id, error = %err, "removal request refused"),
            },
            SessionTask::Compact(mode) => {
                let mut degraded = Vec::new();
                let summary = compact_live(&mut self.adapter, mode, &mut degraded);
                if !degraded.is_empty() {
                    warn!(ids = ?degraded, "compaction moves placed directly");
                }
                report.compactions.push(summary);
            }
            SessionTask::RestoreAnimation => {
                if let Some(animate) = self.restore_animate.take() {
                    self.adapter.set_animate(animate);
                    report.animation_restored = true;
                }
            }
            SessionTask::Settle { generation } => {
                if generation == self.settle_generation {
                    report.settle = Some(self.settle());
                }
            }
        }
    }

    fn settle(&mut self) -> SettleReport {
        let adopted = self.adapter.recover();
        let rects: Vec<GridRect> = self.adapter.nodes().iter().map(|node| node.rect).collect();
        let mut repaired_overlaps = 0;
        if let Some((a, b)) = first_overlap(&rects) {
            warn!(
                first = ?rects[a],
                second = ?rects[b],
                "overlap found while settling; pushing nodes apart"
            );
            let mut degraded = Vec::new();
            repaired_overlaps =
                compact_live(&mut self.adapter, CompactionMode::VerticalOnly, &mut degraded).moved;
        }
        let report = SettleReport {
            adopted,
            repaired_overlaps,
            state: self.adapter.state(),
        };
        debug!(
            adopted,
            repaired_overlaps,
            state = ?report.state,
            "grid settled"
        );
        report
    }

    fn set_columns(&mut self, columns: u32) {
        if let Err(err) = self.adapter.set_columns(columns) {
            warn!(columns, error = %err, "engine rejected column change");
        }
    }

    /// Consume queued grid changes and view-state revisions.
    fn take_pending_changes(&mut self) -> bool {
        let grid_changed = {
            let mut inbox = self.inbox.borrow_mut();
            let changed = !inbox.changes.is_empty();
            inbox.changes.clear();
            changed
        };
        let revision = self.registry.revision();
        let state_changed = revision != self.seen_revision;
        self.seen_revision = revision;
        grid_changed || state_changed
    }

    fn discard_pending_changes(&mut self) {
        self.take_pending_changes();
    }

    fn schedule_save_if_changed(&mut self, now: Instant) -> bool {
        if !self.take_pending_changes() || !self.device.is_editable() {
            return false;
        }
        let layout = self.current_layout();
        self.store.save(&layout, self.device, now);
        true
    }

    /// Write the live layout immediately, dropping any pending save.
    fn persist_now(&mut self) {
        self.discard_pending_changes();
        if !self.device.is_editable() {
            return;
        }
        let layout = self.current_layout();
        let outcome = self.store.save_now(&layout, self.device, &self.registry);
        debug!(outcome = ?outcome, "layout persisted immediately");
    }
}

/// Entries exist only for mounted widgets, so an instance-scoped selection
/// for an unknown id is dropped rather than creating state.
fn apply_selection(registry: &WidgetStateRegistry, selection: &str, scope: &Scope) {
    let targets = match scope {
        Scope::All => registry.ids(),
        Scope::Instance(id) if registry.contains(id) => vec![id.clone()],
        Scope::Instance(id) => {
            debug!(id = %id, "selection for unmounted widget ignored");
            return;
        }
    };
    for id in targets {
        registry.set_selection(&id, Some(selection.to_owned()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashgrid_layout::{HeadlessEngine, MemoryStore, RecordingFactory};
    use std::time::Duration;

    type Session = DashboardSession<MemoryStore, HeadlessEngine>;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn session() -> (Session, RecordingFactory) {
        let factory = RecordingFactory::new();
        let adapter = GridAdapter::new(HeadlessEngine::new());
        let session = DashboardSession::new(
            DashboardConfig::default(),
            MemoryStore::new(),
            WidgetTypeRegistry::builtin(),
            adapter,
            factory.clone(),
        );
        (session, factory)
    }

    #[test]
    fn operations_before_start_are_refused() {
        let (mut session, _) = session();
        assert!(matches!(
            session.add_widget("chart", Instant::now()),
            Err(SessionError::NotStarted)
        ));
        assert!(matches!(session.tick(Instant::now()), Err(SessionError::NotStarted)));
    }

    #[test]
    fn start_applies_default_and_mounts_widgets() {
        let (mut session, factory) = session();
        let report = session.start(DeviceClass::Desktop, Instant::now()).unwrap();
        assert!(report.used_default());
        assert_eq!(session.current_layout().len(), 5);
        assert_eq!(factory.mounted().len(), 5);
        assert!(matches!(
            session.start(DeviceClass::Desktop, Instant::now()),
            Err(SessionError::AlreadyStarted)
        ));
    }

    #[test]
    fn animation_restored_on_next_frame() {
        let (mut session, _) = session();
        let start = Instant::now();
        session.start(DeviceClass::Desktop, start).unwrap();
        assert!(!session.adapter().animate());
        let report = session.tick(start).unwrap();
        assert!(report.animation_restored);
        assert!(session.adapter().animate());
    }

    #[test]
    fn settle_runs_after_delay() {
        let (mut session, _) = session();
        let start = Instant::now();
        session.start(DeviceClass::Desktop, start).unwrap();
        assert!(session.tick(start + ms(10)).unwrap().settle.is_none());
        let report = session.tick(start + ms(80)).unwrap();
        let settle = report.settle.unwrap();
        assert_eq!(settle.repaired_overlaps, 0);
        assert_eq!(settle.state, AdapterState::Ready);
    }

    #[test]
    fn mark_ready_settles_immediately_and_cancels_timer() {
        let (mut session, _) = session();
        let start = Instant::now();
        session.start(DeviceClass::Desktop, start).unwrap();
        session.mark_ready().unwrap();
        assert!(session.tick(start + ms(200)).unwrap().settle.is_none());
    }

    #[test]
    fn add_widget_fills_gap_and_schedules_save() {
        let (mut session, factory) = session();
        let start = Instant::now();
        session.start(DeviceClass::Desktop, start).unwrap();
        let id = session.add_widget("notes", start).unwrap();
        assert_eq!(id, "notes-1");
        assert!(factory.is_mounted("notes-1"));
        assert!(session.store().has_pending_save(DeviceClass::Desktop));

        let report = session.tick(start + ms(300)).unwrap();
        assert!(report.saves.iter().any(|(_, outcome)| outcome.is_written()));
        let stored = session.store_mut().load(DeviceClass::Desktop);
        assert!(stored.contains("notes-1"));
    }

    #[test]
    fn unknown_type_is_refused() {
        let (mut session, _) = session();
        session.start(DeviceClass::Desktop, Instant::now()).unwrap();
        let err = session.add_widget("clock", Instant::now()).unwrap_err();
        assert!(matches!(err, SessionError::UnknownWidgetType { .. }));
    }

    #[test]
    fn bus_removal_is_applied_on_tick() {
        let (mut session, factory) = session();
        let start = Instant::now();
        session.start(DeviceClass::Desktop, start).unwrap();
        session.bus().request_removal("news-1");
        assert!(factory.is_mounted("news-1"));

        let report = session.tick(start).unwrap();
        assert_eq!(report.removed, vec!["news-1".to_owned()]);
        assert!(!factory.is_mounted("news-1"));
        assert!(!session.registry().contains("news-1"));
    }

    #[test]
    fn selection_event_updates_scoped_state() {
        let (mut session, _) = session();
        session.start(DeviceClass::Desktop, Instant::now()).unwrap();
        session.bus().publish(DashboardEvent::SelectionChanged {
            id: "AAPL".into(),
            scope: Scope::Instance("chart-1".into()),
        });
        let chart = session.registry().get("chart-1").unwrap();
        assert_eq!(chart.selection.as_deref(), Some("AAPL"));
        assert!(session.registry().get("table-1").unwrap().selection.is_none());
    }

    #[test]
    fn selection_for_unmounted_widget_creates_no_state() {
        let (mut session, _) = session();
        session.start(DeviceClass::Desktop, Instant::now()).unwrap();
        let before = session.registry().len();
        for i in 0..20 {
            session.bus().publish(DashboardEvent::SelectionChanged {
                id: "MSFT".into(),
                scope: Scope::Instance(format!("ghost-{i}")),
            });
        }
        assert_eq!(session.registry().len(), before);
        assert!(!session.registry().contains("ghost-0"));

        session.remove_widget("chart-1", Instant::now()).unwrap();
        session.bus().publish(DashboardEvent::SelectionChanged {
            id: "MSFT".into(),
            scope: Scope::Instance("chart-1".into()),
        });
        assert!(!session.registry().contains("chart-1"));
    }

    #[test]
    fn view_state_change_alone_schedules_save() {
        let (mut session, _) = session();
        let start = Instant::now();
        session.start(DeviceClass::Desktop, start).unwrap();
        session.tick(start).unwrap();
        session.registry().set_variant("chart-1", "candles");
        assert!(session.tick(start + ms(1)).unwrap().save_scheduled);
        session.tick(start + ms(400)).unwrap();
        let stored = session.store_mut().load(DeviceClass::Desktop);
        let chart = stored.get("chart-1").unwrap();
        assert_eq!(
            chart.view_state.as_ref().and_then(|vs| vs.get("variant")),
            Some(&serde_json::json!("candles"))
        );
    }

    #[test]
    fn mobile_is_fixed() {
        let (mut session, _) = session();
        let start = Instant::now();
        session.start(DeviceClass::Desktop, start).unwrap();
        session.set_device_class(DeviceClass::Mobile, start).unwrap();
        assert_eq!(session.adapter().options().columns, 1);
        assert!(session.current_layout().iter().all(|r| r.x == 0 && r.w == 1));
        assert!(matches!(
            session.add_widget("notes", start),
            Err(SessionError::NotEditable { .. })
        ));
        let report = session
            .handle_user_change(ChangeKind::Drag, &["chart-1".to_owned()], start)
            .unwrap();
        assert!(report.compactions.is_empty());
    }

    #[test]
    fn locked_mode_disables_gestures() {
        let (mut session, _) = session();
        session.start(DeviceClass::Desktop, Instant::now()).unwrap();
        session.set_locked(true);
        assert_eq!(session.adapter().engine().interaction(), (false, false));
        session.set_locked(false);
        assert_eq!(session.adapter().engine().interaction(), (true, true));
    }

    #[test]
    fn shutdown_flushes_and_releases() {
        let (mut session, factory) = session();
        let start = Instant::now();
        session.start(DeviceClass::Desktop, start).unwrap();
        session.add_widget("notes", start).unwrap();
        let outcomes = session.shutdown();
        assert!(outcomes.iter().any(|(_, outcome)| outcome.is_written()));
        assert!(factory.mounted().is_empty());
        assert!(session.registry().is_empty());
        assert!(matches!(session.tick(start), Err(SessionError::ShutDown)));
        assert!(session.shutdown().is_empty());
    }
}
