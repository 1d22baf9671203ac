#![forbid(unsafe_code)]

//! Reconciliation of a desired [`Layout`] against the live grid.
//!
//! # Design
//!
//! A pass is a diff followed by an ordered apply:
//!
//! 1. Index desired records and live nodes by id.
//! 2. Plan removals (live, not desired), additions (desired, not live), and
//!    updates (both, rect differs).
//! 3. Inside one adapter batch, with interaction disabled and float mode on
//!    so the engine cannot shuffle nodes mid-pass: remove, then update in
//!    target `(y, x)` order, then add at explicit coordinates.
//! 4. Commit, then restore interaction and float mode to their prior values.
//! 5. In [`ReconcileMode::Incremental`] run gravity compaction over the
//!    result. [`ReconcileMode::Replace`] is authoritative and skips it.
//!
//! # Invariants
//!
//! 1. Degraded node outcomes are counted and logged; they never abort.
//! 2. View state for an added widget is seeded before it mounts.
//! 3. A removed widget's view state is released.
//! 4. Reconciling the same desired layout twice performs no operations the
//!    second time.

use dashgrid_core::GridRect;
use rustc_hash::FxHashMap;
use tracing::{debug, info_span, warn};

use crate::adapter::{GridAdapter, NodeOutcome};
use crate::bridge::{WidgetFactory, WidgetStateBridge};
use crate::compaction::{CompactNode, CompactionMode, compact};
use crate::engine::{GridEngine, GridNode};
use crate::record::{Layout, LayoutRecord};

/// How authoritative the desired layout is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Reset, paste, or load: positions are exact, no compaction.
    Replace,
    /// Add, remove, or gesture follow-up: compact afterwards.
    Incremental(CompactionMode),
}

/// The operations one pass would perform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub to_remove: Vec<String>,
    /// `(id, target)` sorted by target `(y, x)`.
    pub to_update: Vec<(String, GridRect)>,
    /// In desired-layout order.
    pub to_add: Vec<LayoutRecord>,
}

impl ReconcilePlan {
    /// Diff `desired` against `actual`.
    #[must_use]
    pub fn compute(desired: &Layout, actual: &[GridNode]) -> Self {
        let desired_by_id: FxHashMap<&str, &LayoutRecord> = desired
            .iter()
            .map(|record| (record.id.as_str(), record))
            .collect();
        let actual_by_id: FxHashMap<&str, &GridNode> =
            actual.iter().map(|node| (node.id.as_str(), node)).collect();

        let to_remove = actual
            .iter()
            .filter(|node| !desired_by_id.contains_key(node.id.as_str()))
            .map(|node| node.id.clone())
            .collect();

        let mut to_update: Vec<(String, GridRect)> = desired
            .iter()
            .filter_map(|record| {
                let live = actual_by_id.get(record.id.as_str())?;
                (live.rect != record.rect()).then(|| (record.id.clone(), record.rect()))
            })
            .collect();
        to_update.sort_by_key(|(_, rect)| rect.row_major_key());

        let to_add = desired
            .iter()
            .filter(|record| !actual_by_id.contains_key(record.id.as_str()))
            .cloned()
            .collect();

        Self {
            to_remove,
            to_update,
            to_add,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_update.is_empty() && self.to_add.is_empty()
    }

    #[must_use]
    pub fn op_count(&self) -> usize {
        self.to_remove.len() + self.to_update.len() + self.to_add.len()
    }
}

/// Summary of a compaction step run by the reconciler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionSummary {
    pub moved: usize,
    pub pushed_down: usize,
    pub attempts: u64,
}

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub removed: Vec<String>,
    pub updated: Vec<String>,
    pub added: Vec<String>,
    /// Ids whose operation went through the fallback path.
    pub degraded: Vec<String>,
    /// Ids whose widget could not be mounted and were skipped.
    pub mount_failures: Vec<String>,
    /// Ids that existed on both sides but received a new view state.
    pub reseeded: Vec<String>,
    pub compaction: Option<CompactionSummary>,
}

impl ReconcileReport {
    /// Grid operations performed, including compaction moves.
    #[must_use]
    pub fn op_count(&self) -> usize {
        self.removed.len()
            + self.updated.len()
            + self.added.len()
            + self.compaction.map_or(0, |summary| summary.moved)
    }

    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.op_count() == 0 && self.reseeded.is_empty()
    }
}

/// Drive the live grid to match `desired`.
pub fn reconcile<E: GridEngine>(
    adapter: &mut GridAdapter<E>,
    desired: &Layout,
    mode: ReconcileMode,
    factory: &mut dyn WidgetFactory,
    states: &dyn WidgetStateBridge,
) -> ReconcileReport {
    let actual = adapter.nodes();
    let plan = ReconcilePlan::compute(desired, &actual);
    let span = info_span!(
        "dashgrid.reconcile",
        mode = ?mode,
        desired = desired.len(),
        actual = actual.len(),
        remove = plan.to_remove.len(),
        update = plan.to_update.len(),
        add = plan.to_add.len(),
        degraded = tracing::field::Empty,
    );
    let _guard = span.enter();

    let mut report = ReconcileReport::default();

    if mode == ReconcileMode::Replace {
        reseed_existing(desired, &actual, states, &mut report);
    }

    if !plan.is_empty() {
        apply_plan(adapter, plan, factory, states, &mut report);
    }

    if let ReconcileMode::Incremental(compaction_mode) = mode {
        report.compaction = Some(compact_live(adapter, compaction_mode, &mut report.degraded));
    }

    span.record("degraded", report.degraded.len());
    if !report.degraded.is_empty() {
        warn!(
            count = report.degraded.len(),
            ids = ?report.degraded,
            "reconciliation completed with degraded placements"
        );
    }
    debug!(ops = report.op_count(), "reconciliation finished");
    report
}

/// Run gravity over the live nodes and write back only those that moved.
pub fn compact_live<E: GridEngine>(
    adapter: &mut GridAdapter<E>,
    mode: CompactionMode,
    degraded: &mut Vec<String>,
) -> CompactionSummary {
    let nodes: Vec<CompactNode> = adapter
        .nodes()
        .into_iter()
        .map(|node| CompactNode::new(node.id, node.rect))
        .collect();
    let outcome = compact(&nodes, mode);
    let summary = CompactionSummary {
        moved: outcome.moves.len(),
        pushed_down: outcome.pushed_down,
        attempts: outcome.attempts,
    };
    if outcome.is_noop() {
        return summary;
    }

    let previous_interaction = adapter.set_interaction_enabled(false);
    let previous_float = adapter.set_float_mode(true);
    adapter.batch(|grid| {
        for node_move in &outcome.moves {
            if let NodeOutcome::Degraded(_) = grid.update_node(&node_move.id, node_move.to) {
                degraded.push(node_move.id.clone());
            }
        }
    });
    adapter.set_float_mode(previous_float);
    adapter.set_interaction_enabled(previous_interaction);
    debug!(
        moved = summary.moved,
        attempts = summary.attempts,
        "compaction applied"
    );
    summary
}

fn apply_plan<E: GridEngine>(
    adapter: &mut GridAdapter<E>,
    plan: ReconcilePlan,
    factory: &mut dyn WidgetFactory,
    states: &dyn WidgetStateBridge,
    report: &mut ReconcileReport,
) {
    let previous_interaction = adapter.set_interaction_enabled(false);
    let previous_float = adapter.set_float_mode(true);

    adapter.batch(|grid| {
        for id in plan.to_remove {
            let outcome = grid.remove_node(&id);
            factory.unmount(&id);
            states.release(&id);
            match outcome {
                NodeOutcome::Ok => report.removed.push(id),
                NodeOutcome::Degraded(_) => {
                    report.degraded.push(id.clone());
                    report.removed.push(id);
                }
                NodeOutcome::Missing => debug!(id = %id, "node vanished before removal"),
            }
        }

        for (id, rect) in plan.to_update {
            match grid.update_node(&id, rect) {
                NodeOutcome::Ok => report.updated.push(id),
                NodeOutcome::Degraded(_) => {
                    report.degraded.push(id.clone());
                    report.updated.push(id);
                }
                NodeOutcome::Missing => debug!(id = %id, "node vanished before update"),
            }
        }

        for record in plan.to_add {
            states.seed(&record.id, record.view_state.as_ref());
            if let Err(err) = factory.mount(&record) {
                warn!(id = %record.id, error = %err, "widget failed to mount; skipping");
                states.release(&record.id);
                report.mount_failures.push(record.id);
                continue;
            }
            match grid.add_node(GridNode::from_record(&record)) {
                NodeOutcome::Ok => {}
                NodeOutcome::Degraded(_) => report.degraded.push(record.id.clone()),
                NodeOutcome::Missing => {}
            }
            report.added.push(record.id);
        }
    });

    adapter.set_float_mode(previous_float);
    adapter.set_interaction_enabled(previous_interaction);
}

fn reseed_existing(
    desired: &Layout,
    actual: &[GridNode],
    states: &dyn WidgetStateBridge,
    report: &mut ReconcileReport,
) {
    for node in actual {
        let Some(record) = desired.get(&node.id) else {
            continue;
        };
        let Some(wanted) = record.view_state.as_ref() else {
            continue;
        };
        if states.view_state(&node.id).as_ref() != Some(wanted) {
            states.seed(&node.id, Some(wanted));
            report.reseeded.push(node.id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::NoViewState;
    use crate::engine::GridOptions;
    use crate::headless::{EngineOp, FactoryEvent, HeadlessEngine, RecordingFactory};

    fn adapter() -> GridAdapter<HeadlessEngine> {
        let mut adapter = GridAdapter::new(HeadlessEngine::new());
        adapter.init(GridOptions::default());
        adapter
    }

    fn layout(records: &[(&str, u32, u32, u32, u32)]) -> Layout {
        records
            .iter()
            .map(|&(id, x, y, w, h)| LayoutRecord::new(id, GridRect::new(x, y, w, h)))
            .collect()
    }

    #[test]
    fn plan_classifies_ids() {
        let desired = layout(&[("keep", 0, 0, 2, 2), ("move", 2, 0, 2, 2), ("new", 4, 0, 2, 2)]);
        let actual = vec![
            GridNode::new("keep", GridRect::new(0, 0, 2, 2)),
            GridNode::new("move", GridRect::new(6, 6, 2, 2)),
            GridNode::new("gone", GridRect::new(8, 0, 2, 2)),
        ];
        let plan = ReconcilePlan::compute(&desired, &actual);
        assert_eq!(plan.to_remove, vec!["gone".to_owned()]);
        assert_eq!(plan.to_update, vec![("move".to_owned(), GridRect::new(2, 0, 2, 2))]);
        assert_eq!(plan.to_add.len(), 1);
        assert_eq!(plan.to_add[0].id, "new");
    }

    #[test]
    fn updates_sorted_by_target_row_then_column() {
        let desired = layout(&[("a", 4, 2, 1, 1), ("b", 0, 2, 1, 1), ("c", 9, 0, 1, 1)]);
        let actual: Vec<GridNode> = ["a", "b", "c"]
            .iter()
            .map(|id| GridNode::new(*id, GridRect::new(11, 11, 1, 1)))
            .collect();
        let plan = ReconcilePlan::compute(&desired, &actual);
        let order: Vec<&str> = plan.to_update.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn replace_places_exactly_and_restores_flags() {
        let mut grid = adapter();
        let mut factory = RecordingFactory::new();
        let desired = layout(&[("a", 0, 0, 3, 3), ("b", 3, 0, 3, 3)]);
        let report = reconcile(&mut grid, &desired, ReconcileMode::Replace, &mut factory, &NoViewState);
        assert_eq!(report.added, vec!["a".to_owned(), "b".to_owned()]);
        assert!(report.compaction.is_none());
        assert!(grid.interaction_enabled());
        assert!(!grid.float_mode());
        assert_eq!(grid.engine().commit_count(), 1);
    }

    #[test]
    fn second_pass_is_a_noop() {
        let mut grid = adapter();
        let mut factory = RecordingFactory::new();
        let desired = layout(&[("a", 0, 4, 3, 3), ("b", 5, 0, 3, 3)]);
        let mode = ReconcileMode::Incremental(CompactionMode::Full);
        reconcile(&mut grid, &desired, mode, &mut factory, &NoViewState);
        let settled: Layout = grid
            .nodes()
            .into_iter()
            .map(|node| LayoutRecord::new(node.id, node.rect))
            .collect();
        let again = reconcile(&mut grid, &settled, mode, &mut factory, &NoViewState);
        assert!(again.is_noop());
    }

    #[test]
    fn removal_unmounts_before_later_adds() {
        let mut grid = adapter();
        let mut factory = RecordingFactory::new();
        let first = layout(&[("a", 0, 0, 2, 2)]);
        reconcile(&mut grid, &first, ReconcileMode::Replace, &mut factory, &NoViewState);
        let second = layout(&[("b", 0, 0, 2, 2)]);
        let report = reconcile(&mut grid, &second, ReconcileMode::Replace, &mut factory, &NoViewState);
        assert_eq!(report.removed, vec!["a".to_owned()]);
        assert_eq!(
            factory.events(),
            vec![
                FactoryEvent::Mounted("a".into()),
                FactoryEvent::Unmounted("a".into()),
                FactoryEvent::Mounted("b".into()),
            ]
        );
    }

    #[test]
    fn mount_failure_skips_node() {
        let mut grid = adapter();
        let mut factory = RecordingFactory::new();
        factory.refuse("bad");
        let desired = layout(&[("bad", 0, 0, 2, 2), ("good", 2, 0, 2, 2)]);
        let report = reconcile(&mut grid, &desired, ReconcileMode::Replace, &mut factory, &NoViewState);
        assert_eq!(report.mount_failures, vec!["bad".to_owned()]);
        assert_eq!(grid.nodes().len(), 1);
    }

    #[test]
    fn degraded_adds_are_reported_not_fatal() {
        let mut grid = adapter();
        grid.engine_mut().fail_next(EngineOp::Add, 1);
        let mut factory = RecordingFactory::new();
        let desired = layout(&[("a", 0, 0, 2, 2), ("b", 2, 0, 2, 2)]);
        let report = reconcile(&mut grid, &desired, ReconcileMode::Replace, &mut factory, &NoViewState);
        assert_eq!(report.degraded, vec!["a".to_owned()]);
        assert_eq!(report.added.len(), 2);
        assert_eq!(grid.nodes().len(), 2);
    }

    #[test]
    fn incremental_compacts_gaps() {
        let mut grid = adapter();
        let mut factory = RecordingFactory::new();
        let desired = layout(&[("a", 0, 0, 4, 2), ("b", 0, 5, 4, 2)]);
        let report = reconcile(
            &mut grid,
            &desired,
            ReconcileMode::Incremental(CompactionMode::VerticalOnly),
            &mut factory,
            &NoViewState,
        );
        assert_eq!(report.compaction.map(|c| c.moved), Some(1));
        let b = grid.nodes().into_iter().find(|n| n.id == "b").unwrap();
        assert_eq!(b.rect, GridRect::new(0, 2, 4, 2));
    }

    #[test]
    fn compaction_write_back_runs_with_interaction_off() {
        let mut grid = GridAdapter::new(HeadlessEngine::new());
        grid.init(GridOptions::for_device(dashgrid_core::DeviceClass::Desktop, false));
        let mut factory = RecordingFactory::new();
        let desired = layout(&[("a", 0, 0, 4, 2), ("b", 0, 6, 4, 2), ("c", 6, 9, 2, 2)]);
        reconcile(&mut grid, &desired, ReconcileMode::Replace, &mut factory, &NoViewState);
        assert_eq!(grid.engine().interaction(), (true, true));

        let mut degraded = Vec::new();
        let summary = compact_live(&mut grid, CompactionMode::Full, &mut degraded);
        assert_eq!(summary.moved, 2);
        assert_eq!(grid.engine().interactive_update_count(), 0);
        assert_eq!(grid.engine().interaction(), (true, true));
        assert!(grid.interaction_enabled());
    }
}
