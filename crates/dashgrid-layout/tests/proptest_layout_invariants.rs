//! Property tests for the layout core.
//!
//! - Clipboard round-trip preserves ids, geometry, and view state.
//! - Records built through the API never violate their size bounds, and
//!   validation rejects any stored record that does.
//! - Reconciliation is idempotent.
//! - Compaction terminates within its attempt bound, never overlaps, keeps
//!   sizes, and is a fixed point when re-run.

use dashgrid_core::{GridRect, WidgetTypeRegistry};
use dashgrid_layout::{
    Auxiliary, CompactNode, CompactionMode, GridAdapter, GridOptions, HeadlessEngine, Layout,
    LayoutRecord, NoViewState, NullFactory, ReconcileMode, ViewState, compact, first_overlap,
    reconcile, validate_value,
};
use proptest::prelude::*;
use serde_json::json;

const TYPES: [&str; 6] = ["chart", "table", "watchlist", "news", "notes", "ticker"];

fn registry() -> WidgetTypeRegistry {
    WidgetTypeRegistry::builtin()
}

/// Non-overlapping records laid out row by row on a 12-column grid.
fn valid_layout() -> impl Strategy<Value = Layout> {
    proptest::collection::vec((0usize..TYPES.len(), 0u32..3, 0u32..3, any::<bool>()), 0..8)
        .prop_map(|items| {
            let registry = registry();
            let mut layout = Layout::new();
            let mut cursor_y = 0;
            for (index, (type_index, extra_w, extra_h, with_state)) in items.into_iter().enumerate() {
                let type_name = TYPES[type_index];
                let Some(spec) = registry.get(type_name) else {
                    continue;
                };
                let (w, h) = spec.clamp_size(spec.min_w + extra_w, spec.min_h + extra_h);
                let id = format!("{type_name}-{}", index + 1);
                let mut record = LayoutRecord::with_spec(id, GridRect::new(0, cursor_y, w.min(12), h), spec);
                if with_state {
                    let mut vs = ViewState::new();
                    vs.insert("variant".into(), json!(format!("v{index}")));
                    record = record.with_view_state(vs);
                }
                cursor_y += record.h;
                layout.insert(record);
            }
            layout
        })
}

fn arbitrary_nodes() -> impl Strategy<Value = Vec<CompactNode>> {
    proptest::collection::vec((0u32..12, 0u32..20, 1u32..6, 1u32..6), 0..10).prop_map(|rects| {
        rects
            .into_iter()
            .enumerate()
            .map(|(i, (x, y, w, h))| CompactNode::new(format!("n-{i}"), GridRect::new(x, y, w, h)))
            .collect()
    })
}

fn mode() -> impl Strategy<Value = CompactionMode> {
    prop_oneof![Just(CompactionMode::Full), Just(CompactionMode::VerticalOnly)]
}

proptest! {
    // =========================================================================
    // Round-trip
    // =========================================================================

    #[test]
    fn export_import_round_trip(layout in valid_layout()) {
        let text = dashgrid_layout::clipboard::export_text(&layout, &Auxiliary::new());
        let payload = dashgrid_layout::clipboard::import_text(&text, &registry()).unwrap();
        prop_assert!(payload.layout.same_content(&layout));
        prop_assert_eq!(payload.layout.ids().collect::<Vec<_>>(), layout.ids().collect::<Vec<_>>());
    }

    // =========================================================================
    // Minimum size
    // =========================================================================

    #[test]
    fn api_built_records_respect_bounds(
        type_index in 0usize..TYPES.len(),
        w in 0u32..20,
        h in 0u32..20,
        new_w in 0u32..20,
        new_h in 0u32..20,
    ) {
        let registry = registry();
        let id = format!("{}-1", TYPES[type_index]);
        let mut record = LayoutRecord::for_registry(id, GridRect::new(0, 0, w, h), &registry);
        prop_assert!(record.satisfies_bounds());
        record.set_rect(GridRect::new(1, 1, new_w, new_h));
        prop_assert!(record.satisfies_bounds());
    }

    #[test]
    fn validation_rejects_every_undersized_record(
        type_index in 0usize..TYPES.len(),
        w in 0u32..6,
        h in 0u32..6,
    ) {
        let registry = registry();
        let type_name = TYPES[type_index];
        let spec = registry.get(type_name).unwrap();
        let value = json!([{"id": format!("{type_name}-1"), "x": 0, "y": 0, "w": w, "h": h}]);
        let accepted = validate_value(&value, &registry).is_ok();
        let fits = w >= spec.min_w
            && h >= spec.min_h
            && spec.max_w.is_none_or(|max| w <= max)
            && spec.max_h.is_none_or(|max| h <= max);
        prop_assert_eq!(accepted, fits);
    }

    // =========================================================================
    // Idempotence
    // =========================================================================

    #[test]
    fn reconcile_twice_is_a_noop(layout in valid_layout(), incremental in any::<bool>()) {
        let mut adapter = GridAdapter::new(HeadlessEngine::new());
        adapter.init(GridOptions::default());
        let mode = if incremental {
            ReconcileMode::Incremental(CompactionMode::Full)
        } else {
            ReconcileMode::Replace
        };
        reconcile(&mut adapter, &layout, mode, &mut NullFactory, &NoViewState);
        let settled: Layout = adapter
            .nodes()
            .into_iter()
            .map(|node| LayoutRecord::new(node.id, node.rect))
            .collect();
        let second = reconcile(&mut adapter, &settled, mode, &mut NullFactory, &NoViewState);
        prop_assert!(second.is_noop(), "second pass: {:?}", second);
    }

    // =========================================================================
    // Compaction convergence
    // =========================================================================

    #[test]
    fn compaction_converges_without_overlap(nodes in arbitrary_nodes(), mode in mode()) {
        let outcome = compact(&nodes, mode);
        prop_assert!(outcome.attempts <= outcome.attempt_bound);

        let rects: Vec<GridRect> = outcome.nodes.iter().map(|node| node.rect).collect();
        prop_assert_eq!(first_overlap(&rects), None);

        for (before, after) in nodes.iter().zip(&outcome.nodes) {
            prop_assert_eq!(&before.id, &after.id);
            prop_assert_eq!((before.rect.w, before.rect.h), (after.rect.w, after.rect.h));
        }

        let again = compact(&outcome.nodes, mode);
        prop_assert!(again.is_noop());
    }

    #[test]
    fn compaction_only_reports_real_moves(nodes in arbitrary_nodes(), mode in mode()) {
        let outcome = compact(&nodes, mode);
        for node_move in &outcome.moves {
            prop_assert_ne!(node_move.from, node_move.to);
        }
        let unchanged = nodes
            .iter()
            .zip(&outcome.nodes)
            .filter(|(before, after)| before.rect == after.rect)
            .count();
        prop_assert_eq!(unchanged + outcome.moves.len(), nodes.len());
    }
}
