#![forbid(unsafe_code)]

//! Failure-tolerant wrapper over a [`GridEngine`].
//!
//! # Design
//!
//! Each adapter instance carries an explicit state machine:
//!
//! ```text
//! Uninitialized --init ok--> Ready --engine failure--> Degraded
//!       ^                      ^                          |
//!       +----init failed       +------recover()-----------+
//! ```
//!
//! Every node operation is keyed off the current state. When the engine is
//! missing, not ready, or refuses a node, the adapter positions the widget
//! through its [`FallbackSurface`] and reports [`NodeOutcome::Degraded`]
//! instead of failing. Directly placed nodes stay visible in
//! [`GridAdapter::nodes`] (tagged [`Placement::Direct`]) so reconciliation
//! still sees the true picture, and [`GridAdapter::recover`] hands them back
//! to the engine once it is ready.
//!
//! # Invariants
//!
//! 1. Inside [`GridAdapter::batch`] no change notification fires; exactly one
//!    fires after the outermost batch if anything changed.
//! 2. The engine's commit step runs after the outermost batch even if the
//!    closure panics. Commit failures are logged, never swallowed, and do
//!    not undo applied changes.
//! 3. A node id appears at most once in [`GridAdapter::nodes`].
//!
//! # Failure Modes
//!
//! - **Re-entrant adapter calls from a change handler** are impossible:
//!   handlers receive only the change, not the adapter. Handlers that need
//!   to act should queue work.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use dashgrid_core::GridRect;
use rustc_hash::FxHashSet;
use tracing::{debug, error, info, warn};

use crate::engine::{
    DetachedSurface, DirectPlacement, EngineError, FallbackSurface, GridEngine, GridNode,
    GridOptions, Placement,
};

/// Lifecycle state of one adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    /// `init` has not succeeded; every node goes to the fallback surface.
    Uninitialized,
    /// The engine owns every node.
    Ready,
    /// At least one node is placed directly or a removal is pending.
    Degraded,
}

/// Result of a node operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    /// The engine applied the operation.
    Ok,
    /// The operation took effect through the fallback path.
    Degraded(EngineError),
    /// No node with that id exists.
    Missing,
}

impl NodeOutcome {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}

/// Why the live grid changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeKind {
    /// The user dragged nodes.
    Drag,
    /// The user resized nodes.
    Resize,
    /// Nodes were added, removed, or moved programmatically.
    Structural,
}

/// One change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridChange {
    pub kind: ChangeKind,
    /// Affected ids in first-touched order.
    pub ids: Vec<String>,
}

impl GridChange {
    fn merge(&mut self, kind: ChangeKind, id: &str) {
        // Structural outranks gestures when a batch mixes both.
        self.kind = self.kind.max(kind);
        if !self.ids.iter().any(|existing| existing == id) {
            self.ids.push(id.to_owned());
        }
    }
}

/// Returned by [`GridAdapter::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridHandle {
    pub state: AdapterState,
    pub options: GridOptions,
    /// Incremented on every `init`.
    pub generation: u64,
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterStats {
    pub engine_ops: u64,
    pub degraded_ops: u64,
    pub commit_failures: u64,
    pub recovered_nodes: u64,
    pub batches: u64,
    pub notifications: u64,
}

type ChangeCallback = Rc<dyn Fn(&GridChange)>;

/// RAII guard for a change handler. Dropping it unsubscribes.
pub struct ChangeSubscription {
    _guard: ChangeCallback,
}

impl std::fmt::Debug for ChangeSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSubscription").finish_non_exhaustive()
    }
}

/// The adapter itself.
pub struct GridAdapter<E> {
    engine: E,
    surface: Box<dyn FallbackSurface>,
    state: AdapterState,
    options: GridOptions,
    direct: Vec<GridNode>,
    hidden: FxHashSet<String>,
    listeners: Vec<Weak<dyn Fn(&GridChange)>>,
    batch_depth: u32,
    batch_open: bool,
    pending: Option<GridChange>,
    generation: u64,
    interaction_enabled: bool,
    float_mode: bool,
    animate: bool,
    stats: AdapterStats,
}

impl<E> std::fmt::Debug for GridAdapter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridAdapter")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("direct", &self.direct.len())
            .field("hidden", &self.hidden.len())
            .field("batch_depth", &self.batch_depth)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<E: GridEngine> GridAdapter<E> {
    /// Wrap `engine` with a fallback surface that positions nothing.
    #[must_use]
    pub fn new(engine: E) -> Self {
        Self::with_surface(engine, DetachedSurface)
    }

    #[must_use]
    pub fn with_surface(engine: E, surface: impl FallbackSurface + 'static) -> Self {
        let options = GridOptions::default();
        Self {
            engine,
            surface: Box::new(surface),
            state: AdapterState::Uninitialized,
            interaction_enabled: options.drag_enabled || options.resize_enabled,
            float_mode: options.float_mode,
            animate: options.animate,
            options,
            direct: Vec::new(),
            hidden: FxHashSet::default(),
            listeners: Vec::new(),
            batch_depth: 0,
            batch_open: false,
            pending: None,
            generation: 0,
            stats: AdapterStats::default(),
        }
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Initialize (or re-initialize) the engine. Never fails: an engine that
    /// cannot start leaves the adapter `Uninitialized` and every node is
    /// placed directly.
    pub fn init(&mut self, options: GridOptions) -> GridHandle {
        self.generation += 1;
        for node in self.direct.drain(..) {
            self.surface.detach(&node.id);
        }
        self.hidden.clear();
        self.interaction_enabled = options.drag_enabled || options.resize_enabled;
        self.float_mode = options.float_mode;
        self.animate = options.animate;
        self.options = options;

        match self.engine.init(&self.options) {
            Ok(()) => {
                self.state = AdapterState::Ready;
                debug!(
                    generation = self.generation,
                    columns = self.options.columns,
                    "grid engine initialized"
                );
            }
            Err(err) => {
                self.state = AdapterState::Uninitialized;
                warn!(
                    generation = self.generation,
                    error = %err,
                    "grid engine failed to initialize; using direct placement"
                );
            }
        }
        self.handle()
    }

    /// The host reports that the engine signalled readiness.
    ///
    /// Retries `init` if it had failed, then re-adopts direct nodes.
    /// Returns the number of nodes handed back to the engine.
    pub fn mark_ready(&mut self) -> usize {
        if self.state == AdapterState::Uninitialized {
            if let Err(err) = self.engine.init(&self.options) {
                warn!(error = %err, "grid engine still failing to initialize");
                return 0;
            }
            self.state = if self.direct.is_empty() {
                AdapterState::Ready
            } else {
                AdapterState::Degraded
            };
        }
        self.recover()
    }

    /// Hand directly placed nodes back to the engine and retry failed
    /// removals. Returns the number of nodes adopted.
    pub fn recover(&mut self) -> usize {
        if self.state == AdapterState::Uninitialized || !self.engine.is_ready() {
            return 0;
        }
        if self.direct.is_empty() && self.hidden.is_empty() {
            return 0;
        }

        self.engine.begin_batch();
        let hidden: Vec<String> = self.hidden.iter().cloned().collect();
        for id in hidden {
            match self.engine.remove_node(&id) {
                Ok(()) | Err(EngineError::UnknownNode { .. }) => {
                    self.hidden.remove(&id);
                }
                Err(err) => debug!(id = %id, error = %err, "pending removal still failing"),
            }
        }

        let mut adopted = 0usize;
        let mut still_direct = Vec::new();
        for node in std::mem::take(&mut self.direct) {
            let managed = GridNode {
                placement: Placement::Managed,
                ..node.clone()
            };
            match self.engine.add_node(&managed) {
                Ok(()) => {
                    self.surface.detach(&node.id);
                    adopted += 1;
                }
                Err(err) => {
                    debug!(id = %node.id, error = %err, "node not yet adoptable");
                    still_direct.push(node);
                }
            }
        }
        self.direct = still_direct;
        self.commit_engine();

        self.stats.recovered_nodes += adopted as u64;
        if self.direct.is_empty() && self.hidden.is_empty() {
            if self.state == AdapterState::Degraded {
                info!(adopted, "grid adapter recovered");
            }
            self.state = AdapterState::Ready;
        }
        adopted
    }

    // ---------------------------------------------------------------------
    // Batching and notification
    // ---------------------------------------------------------------------

    /// Run `f` as one engine transaction.
    ///
    /// Nested calls join the outer batch. Change notifications are held
    /// until the outermost batch ends; the engine commit runs even if `f`
    /// panics, and the panic is then resumed.
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.batch_depth += 1;
        if self.batch_depth == 1 {
            self.stats.batches += 1;
            self.batch_open = self.state != AdapterState::Uninitialized;
            if self.batch_open {
                self.engine.begin_batch();
            }
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| f(self)));

        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            if std::mem::take(&mut self.batch_open) {
                self.commit_engine();
            }
            if let Some(change) = self.pending.take() {
                self.emit(&change);
            }
        }

        match result {
            Ok(value) => value,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    #[must_use]
    pub fn is_batching(&self) -> bool {
        self.batch_depth > 0
    }

    /// Register a change handler. Keep the returned guard alive to stay
    /// subscribed.
    pub fn on_change(&mut self, handler: impl Fn(&GridChange) + 'static) -> ChangeSubscription {
        let callback: ChangeCallback = Rc::new(handler);
        self.listeners.push(Rc::downgrade(&callback));
        ChangeSubscription { _guard: callback }
    }

    /// The host reports a finished user gesture on `ids`.
    pub fn notify_user_change(&mut self, kind: ChangeKind, ids: &[String]) {
        let pending = self.pending.get_or_insert_with(|| GridChange {
            kind,
            ids: Vec::new(),
        });
        pending.kind = pending.kind.max(kind);
        for id in ids {
            pending.merge(kind, id);
        }
        self.flush_if_idle();
    }

    fn record_change(&mut self, kind: ChangeKind, id: &str) {
        self.pending
            .get_or_insert_with(|| GridChange {
                kind,
                ids: Vec::new(),
            })
            .merge(kind, id);
        self.flush_if_idle();
    }

    fn flush_if_idle(&mut self) {
        if self.batch_depth == 0
            && let Some(change) = self.pending.take()
        {
            self.emit(&change);
        }
    }

    fn emit(&mut self, change: &GridChange) {
        self.listeners.retain(|weak| weak.strong_count() > 0);
        let callbacks: Vec<ChangeCallback> =
            self.listeners.iter().filter_map(Weak::upgrade).collect();
        if callbacks.is_empty() {
            return;
        }
        self.stats.notifications += 1;
        for callback in callbacks {
            callback(change);
        }
    }

    fn commit_engine(&mut self) {
        if let Err(err) = self.engine.commit() {
            self.stats.commit_failures += 1;
            error!(error = %err, "grid batch commit failed; applied changes are kept");
        }
    }

    // ---------------------------------------------------------------------
    // Node operations
    // ---------------------------------------------------------------------

    /// Place `node` at exactly its rect.
    pub fn add_node(&mut self, node: GridNode) -> NodeOutcome {
        if !self.engine_usable() {
            return self.place_direct(node, EngineError::NotReady);
        }
        let managed = GridNode {
            placement: Placement::Managed,
            ..node
        };
        match self.engine.add_node(&managed) {
            Ok(()) => {
                self.stats.engine_ops += 1;
                debug!(id = %managed.id, rect = ?managed.rect, "node added");
                self.record_change(ChangeKind::Structural, &managed.id);
                NodeOutcome::Ok
            }
            Err(err) => self.place_direct(managed, err),
        }
    }

    /// Move or resize node `id`.
    pub fn update_node(&mut self, id: &str, rect: GridRect) -> NodeOutcome {
        if let Some(index) = self.direct.iter().position(|node| node.id == id) {
            self.direct[index].rect = rect;
            self.surface
                .place(id, DirectPlacement::for_rect(rect, &self.options));
            self.stats.degraded_ops += 1;
            self.record_change(ChangeKind::Structural, id);
            return NodeOutcome::Degraded(EngineError::NotReady);
        }
        if self.state == AdapterState::Uninitialized || self.hidden.contains(id) {
            return NodeOutcome::Missing;
        }

        match self.engine.update_node(id, rect) {
            Ok(()) => {
                self.stats.engine_ops += 1;
                debug!(id, rect = ?rect, "node updated");
                self.record_change(ChangeKind::Structural, id);
                NodeOutcome::Ok
            }
            Err(EngineError::UnknownNode { .. }) => NodeOutcome::Missing,
            Err(err) => {
                let template = self
                    .engine
                    .nodes()
                    .into_iter()
                    .find(|node| node.id == id)
                    .unwrap_or_else(|| GridNode::new(id, rect));
                if self.engine.remove_node(id).is_err() {
                    self.hidden.insert(id.to_owned());
                }
                self.place_direct(GridNode { rect, ..template }, err)
            }
        }
    }

    /// Remove node `id`.
    pub fn remove_node(&mut self, id: &str) -> NodeOutcome {
        if let Some(index) = self.direct.iter().position(|node| node.id == id) {
            self.direct.remove(index);
            self.surface.detach(id);
            self.record_change(ChangeKind::Structural, id);
            self.settle_state();
            return NodeOutcome::Ok;
        }
        if self.state == AdapterState::Uninitialized || self.hidden.contains(id) {
            return NodeOutcome::Missing;
        }

        match self.engine.remove_node(id) {
            Ok(()) => {
                self.stats.engine_ops += 1;
                debug!(id, "node removed");
                self.record_change(ChangeKind::Structural, id);
                NodeOutcome::Ok
            }
            Err(EngineError::UnknownNode { .. }) => NodeOutcome::Missing,
            Err(err) => {
                warn!(id, error = %err, "grid engine failed to remove node; hiding it");
                self.hidden.insert(id.to_owned());
                self.surface.detach(id);
                self.enter_degraded();
                self.stats.degraded_ops += 1;
                self.record_change(ChangeKind::Structural, id);
                NodeOutcome::Degraded(err)
            }
        }
    }

    /// All live nodes: engine-managed first, then directly placed.
    #[must_use]
    pub fn nodes(&self) -> Vec<GridNode> {
        let mut nodes: Vec<GridNode> = if self.state == AdapterState::Uninitialized {
            Vec::new()
        } else {
            self.engine
                .nodes()
                .into_iter()
                .filter(|node| !self.hidden.contains(&node.id))
                .collect()
        };
        let direct: Vec<GridNode> = self
            .direct
            .iter()
            .filter(|direct| !nodes.iter().any(|node| node.id == direct.id))
            .cloned()
            .collect();
        nodes.extend(direct);
        nodes
    }

    fn place_direct(&mut self, node: GridNode, reason: EngineError) -> NodeOutcome {
        warn!(
            id = %node.id,
            reason = %reason,
            state = ?self.state,
            "grid engine unavailable; placing node directly"
        );
        self.surface
            .place(&node.id, DirectPlacement::for_rect(node.rect, &self.options));
        let node = GridNode {
            placement: Placement::Direct,
            ..node
        };
        let id = node.id.clone();
        match self.direct.iter_mut().find(|existing| existing.id == id) {
            Some(existing) => *existing = node,
            None => self.direct.push(node),
        }
        self.enter_degraded();
        self.stats.degraded_ops += 1;
        self.record_change(ChangeKind::Structural, &id);
        NodeOutcome::Degraded(reason)
    }

    fn engine_usable(&self) -> bool {
        self.state != AdapterState::Uninitialized && self.engine.is_ready()
    }

    fn enter_degraded(&mut self) {
        if self.state == AdapterState::Ready {
            warn!(generation = self.generation, "grid adapter degraded");
            self.state = AdapterState::Degraded;
        }
    }

    fn settle_state(&mut self) {
        if self.state == AdapterState::Degraded && self.direct.is_empty() && self.hidden.is_empty()
        {
            self.state = AdapterState::Ready;
        }
    }

    // ---------------------------------------------------------------------
    // Engine flags
    // ---------------------------------------------------------------------

    /// Enable or disable drag and resize. Returns the previous setting.
    ///
    /// Gestures stay off when the grid options disable them (mobile,
    /// locked mode) regardless of `enabled`.
    pub fn set_interaction_enabled(&mut self, enabled: bool) -> bool {
        let previous = self.interaction_enabled;
        self.interaction_enabled = enabled;
        if self.state != AdapterState::Uninitialized {
            self.engine.set_interaction(
                enabled && self.options.drag_enabled,
                enabled && self.options.resize_enabled,
            );
        }
        previous
    }

    /// Toggle float mode (no engine gravity). Returns the previous setting.
    pub fn set_float_mode(&mut self, enabled: bool) -> bool {
        let previous = self.float_mode;
        self.float_mode = enabled;
        if self.state != AdapterState::Uninitialized {
            self.engine.set_float(enabled);
        }
        previous
    }

    /// Toggle engine animations. Returns the previous setting.
    pub fn set_animate(&mut self, enabled: bool) -> bool {
        let previous = self.animate;
        self.animate = enabled;
        if self.state != AdapterState::Uninitialized {
            self.engine.set_animate(enabled);
        }
        previous
    }

    /// Change the column count, e.g. on a device-class switch.
    pub fn set_columns(&mut self, columns: u32) -> Result<(), EngineError> {
        self.options.columns = columns;
        for node in &self.direct {
            self.surface
                .place(&node.id, DirectPlacement::for_rect(node.rect, &self.options));
        }
        if self.state == AdapterState::Uninitialized {
            return Ok(());
        }
        self.engine.set_columns(columns)
    }

    /// Apply new gesture permissions (device class or locked mode change).
    pub fn set_gestures_allowed(&mut self, drag: bool, resize: bool) {
        self.options.drag_enabled = drag;
        self.options.resize_enabled = resize;
        let enabled = self.interaction_enabled;
        self.set_interaction_enabled(enabled);
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    #[must_use]
    pub fn state(&self) -> AdapterState {
        self.state
    }

    #[must_use]
    pub fn handle(&self) -> GridHandle {
        GridHandle {
            state: self.state,
            options: self.options.clone(),
            generation: self.generation,
        }
    }

    #[must_use]
    pub fn options(&self) -> &GridOptions {
        &self.options
    }

    #[must_use]
    pub fn interaction_enabled(&self) -> bool {
        self.interaction_enabled
    }

    #[must_use]
    pub fn float_mode(&self) -> bool {
        self.float_mode
    }

    #[must_use]
    pub fn animate(&self) -> bool {
        self.animate
    }

    #[must_use]
    pub fn direct_count(&self) -> usize {
        self.direct.len()
    }

    #[must_use]
    pub fn stats(&self) -> AdapterStats {
        self.stats
    }

    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }
}

/// Counts notifications; handy for tests and diagnostics.
#[derive(Debug, Clone, Default)]
pub struct ChangeCounter {
    count: Rc<Cell<u64>>,
}

impl ChangeCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe this counter to `adapter`.
    pub fn attach<E: GridEngine>(&self, adapter: &mut GridAdapter<E>) -> ChangeSubscription {
        let count = Rc::clone(&self.count);
        adapter.on_change(move |_| count.set(count.get() + 1))
    }

    #[must_use]
    pub fn get(&self) -> u64 {
        self.count.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{EngineOp, HeadlessEngine, RecordingSurface};
    use std::cell::RefCell;

    fn ready_adapter() -> GridAdapter<HeadlessEngine> {
        let mut adapter = GridAdapter::new(HeadlessEngine::new());
        adapter.init(GridOptions::default());
        adapter
    }

    fn node(id: &str, x: u32, y: u32) -> GridNode {
        GridNode::new(id, GridRect::new(x, y, 2, 2))
    }

    #[test]
    fn init_success_is_ready() {
        let adapter = ready_adapter();
        assert_eq!(adapter.state(), AdapterState::Ready);
        assert_eq!(adapter.handle().generation, 1);
    }

    #[test]
    fn failed_init_places_directly() {
        let surface = RecordingSurface::new();
        let mut adapter =
            GridAdapter::with_surface(HeadlessEngine::failing_init(), surface.clone());
        let handle = adapter.init(GridOptions::default());
        assert_eq!(handle.state, AdapterState::Uninitialized);

        let outcome = adapter.add_node(node("a", 0, 0));
        assert!(outcome.is_degraded());
        let nodes = adapter.nodes();
        assert_eq!(nodes.len(), 1);
        assert!(nodes[0].is_direct());
        assert!(surface.placement("a").is_some());
    }

    #[test]
    fn engine_rejection_falls_back_and_degrades() {
        let mut adapter = ready_adapter();
        adapter.engine_mut().fail_next(EngineOp::Add, 1);
        assert!(adapter.add_node(node("a", 0, 0)).is_degraded());
        assert_eq!(adapter.state(), AdapterState::Degraded);
        assert!(adapter.add_node(node("b", 2, 0)).is_ok());
        assert_eq!(adapter.nodes().len(), 2);
    }

    #[test]
    fn recover_adopts_direct_nodes() {
        let surface = RecordingSurface::new();
        let mut adapter = GridAdapter::with_surface(HeadlessEngine::new(), surface.clone());
        adapter.init(GridOptions::default());
        adapter.engine_mut().set_ready(false);
        adapter.add_node(node("a", 0, 0));
        assert_eq!(adapter.direct_count(), 1);

        assert_eq!(adapter.recover(), 0);
        adapter.engine_mut().set_ready(true);
        assert_eq!(adapter.recover(), 1);
        assert_eq!(adapter.state(), AdapterState::Ready);
        assert!(surface.placement("a").is_none());
        assert_eq!(adapter.nodes()[0].placement, Placement::Managed);
    }

    #[test]
    fn mark_ready_retries_failed_init() {
        let mut adapter = GridAdapter::new(HeadlessEngine::failing_init());
        adapter.init(GridOptions::default());
        adapter.add_node(node("a", 0, 0));
        adapter.engine_mut().set_init_fails(false);
        assert_eq!(adapter.mark_ready(), 1);
        assert_eq!(adapter.state(), AdapterState::Ready);
    }

    #[test]
    fn batch_coalesces_notifications() {
        let mut adapter = ready_adapter();
        let seen: Rc<RefCell<Vec<GridChange>>> = Rc::default();
        let sink = Rc::clone(&seen);
        let _sub = adapter.on_change(move |change| sink.borrow_mut().push(change.clone()));

        adapter.batch(|grid| {
            grid.add_node(node("a", 0, 0));
            grid.add_node(node("b", 2, 0));
            grid.update_node("a", GridRect::new(0, 2, 2, 2));
            assert!(seen.borrow().is_empty());
        });
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, ChangeKind::Structural);
        assert_eq!(seen[0].ids, vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(adapter.engine().commit_count(), 1);
    }

    #[test]
    fn empty_batch_does_not_notify() {
        let mut adapter = ready_adapter();
        let counter = ChangeCounter::new();
        let _sub = counter.attach(&mut adapter);
        adapter.batch(|_| {});
        assert_eq!(counter.get(), 0);
        assert_eq!(adapter.engine().commit_count(), 1);
    }

    #[test]
    fn commit_runs_when_batch_panics() {
        let mut adapter = ready_adapter();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            adapter.batch(|grid| {
                grid.add_node(node("a", 0, 0));
                if grid.is_batching() {
                    panic!("boom");
                }
            })
        }));
        assert!(result.is_err());
        assert_eq!(adapter.engine().commit_count(), 1);
        assert!(!adapter.is_batching());
        assert_eq!(adapter.nodes().len(), 1);
    }

    #[test]
    fn commit_failure_is_counted_and_changes_kept() {
        let mut adapter = ready_adapter();
        adapter.engine_mut().fail_next(EngineOp::Commit, 1);
        adapter.batch(|grid| {
            grid.add_node(node("a", 0, 0));
        });
        assert_eq!(adapter.stats().commit_failures, 1);
        assert_eq!(adapter.nodes().len(), 1);
    }

    #[test]
    fn dropped_subscription_stops_notifications() {
        let mut adapter = ready_adapter();
        let counter = ChangeCounter::new();
        let sub = counter.attach(&mut adapter);
        adapter.add_node(node("a", 0, 0));
        drop(sub);
        adapter.add_node(node("b", 2, 0));
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn failed_remove_hides_node_until_recovered() {
        let mut adapter = ready_adapter();
        adapter.add_node(node("a", 0, 0));
        adapter.engine_mut().fail_next(EngineOp::Remove, 1);
        assert!(adapter.remove_node("a").is_degraded());
        assert!(adapter.nodes().is_empty());
        assert_eq!(adapter.state(), AdapterState::Degraded);
        adapter.recover();
        assert_eq!(adapter.state(), AdapterState::Ready);
        assert!(adapter.engine().nodes().is_empty());
    }

    #[test]
    fn failed_update_moves_node_to_direct_placement() {
        let mut adapter = ready_adapter();
        adapter.add_node(node("a", 0, 0));
        adapter.engine_mut().fail_next(EngineOp::Update, 1);
        let outcome = adapter.update_node("a", GridRect::new(4, 4, 2, 2));
        assert!(outcome.is_degraded());
        let nodes = adapter.nodes();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].rect, GridRect::new(4, 4, 2, 2));
        assert!(nodes[0].is_direct());
    }

    #[test]
    fn missing_ids_are_reported() {
        let mut adapter = ready_adapter();
        assert_eq!(adapter.remove_node("ghost"), NodeOutcome::Missing);
        assert_eq!(
            adapter.update_node("ghost", GridRect::new(0, 0, 1, 1)),
            NodeOutcome::Missing
        );
    }

    #[test]
    fn flags_return_previous_values() {
        let mut adapter = ready_adapter();
        assert!(adapter.set_interaction_enabled(false));
        assert!(!adapter.set_interaction_enabled(true));
        assert!(!adapter.set_float_mode(true));
        assert!(adapter.engine().float_mode());
        assert!(adapter.set_animate(false));
        assert!(!adapter.engine().animate());
    }

    #[test]
    fn user_gesture_notifies_with_kind() {
        let mut adapter = ready_adapter();
        let seen: Rc<RefCell<Vec<ChangeKind>>> = Rc::default();
        let sink = Rc::clone(&seen);
        let _sub = adapter.on_change(move |change| sink.borrow_mut().push(change.kind));
        adapter.notify_user_change(ChangeKind::Resize, &["a".to_owned()]);
        adapter.notify_user_change(ChangeKind::Drag, &[]);
        assert_eq!(*seen.borrow(), vec![ChangeKind::Resize, ChangeKind::Drag]);
    }
}
