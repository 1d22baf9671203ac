#![forbid(unsafe_code)]

//! Gravity compaction.
//!
//! Packs nodes toward the top-left corner of the grid one cell at a time.
//!
//! # Algorithm
//!
//! 1. **Resolve.** Visit nodes in `(y, x)` order (input order breaks ties).
//!    A node that overlaps an already-visited node is pushed down to the
//!    bottom edge of the lowest offender, repeatedly, until it is clear.
//!    Sizes never change, so occupied area is preserved.
//! 2. **Gravity.** Visit nodes in `(y, x)` order. Each node alternates one
//!    cell up and (in [`CompactionMode::Full`]) one cell left, each move
//!    taken only if the target rectangle overlaps no other node, until
//!    neither move succeeds. Passes repeat until one moves nothing or the
//!    attempt budget is spent, so the result is a fixed point in practice.
//!
//! # Invariants
//!
//! 1. Output never contains an overlapping pair (touching edges are fine).
//! 2. Widths and heights are unchanged.
//! 3. The result is a pure function of the input, including its order.
//! 4. Move attempts (one up-then-left step of one node) never exceed
//!    `N * (max_bottom + max_right)` measured after the resolve step (see
//!    [`CompactionOutcome::attempt_bound`]).

use dashgrid_core::GridRect;

/// Which directions gravity may move nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompactionMode {
    /// Up and left.
    #[default]
    Full,
    /// Up only. Used after a resize so neighbours keep their columns.
    VerticalOnly,
}

/// Input to the packer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactNode {
    pub id: String,
    pub rect: GridRect,
}

impl CompactNode {
    #[must_use]
    pub fn new(id: impl Into<String>, rect: GridRect) -> Self {
        Self {
            id: id.into(),
            rect,
        }
    }
}

/// A node whose position changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMove {
    pub id: String,
    pub from: GridRect,
    pub to: GridRect,
}

/// Result of one compaction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionOutcome {
    /// Final nodes, in input order.
    pub nodes: Vec<CompactNode>,
    /// Only the nodes whose final rect differs from the input, in input order.
    pub moves: Vec<NodeMove>,
    /// Nodes the resolve step had to push down.
    pub pushed_down: usize,
    /// Up-then-left steps tried by gravity.
    pub attempts: u64,
    /// Upper bound on `attempts` for this input.
    pub attempt_bound: u64,
}

impl CompactionOutcome {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.moves.is_empty()
    }
}

/// Run resolve and gravity.
#[must_use]
pub fn compact(nodes: &[CompactNode], mode: CompactionMode) -> CompactionOutcome {
    let mut rects: Vec<GridRect> = nodes.iter().map(|node| node.rect).collect();
    let order = visit_order(&rects);
    let pushed_down = resolve_in_place(&mut rects, &order);

    let max_bottom = rects.iter().map(GridRect::bottom).max().unwrap_or(0);
    let max_right = rects.iter().map(GridRect::right).max().unwrap_or(0);
    let attempt_bound = (nodes.len() as u64) * (u64::from(max_bottom) + u64::from(max_right));

    let mut attempts = 0u64;
    'passes: loop {
        let mut pass_moved = false;
        for index in visit_order(&rects) {
            loop {
                let current = rects[index];
                let can_left = mode == CompactionMode::Full && current.x > 0;
                if current.y == 0 && !can_left {
                    break;
                }
                if attempts == attempt_bound {
                    break 'passes;
                }
                attempts += 1;
                let mut moved = false;
                if current.y > 0 {
                    let candidate = current.at(current.x, current.y - 1);
                    if is_free(&rects, index, &candidate) {
                        rects[index] = candidate;
                        moved = true;
                    }
                }
                let current = rects[index];
                if can_left {
                    let candidate = current.at(current.x - 1, current.y);
                    if is_free(&rects, index, &candidate) {
                        rects[index] = candidate;
                        moved = true;
                    }
                }
                if !moved {
                    break;
                }
                pass_moved = true;
            }
        }
        if !pass_moved {
            break;
        }
    }

    finish(nodes, rects, pushed_down, attempts, attempt_bound)
}

/// Run only the resolve step: push overlapping nodes down, no gravity.
#[must_use]
pub fn resolve_overlaps(nodes: &[CompactNode]) -> CompactionOutcome {
    let mut rects: Vec<GridRect> = nodes.iter().map(|node| node.rect).collect();
    let order = visit_order(&rects);
    let pushed_down = resolve_in_place(&mut rects, &order);
    finish(nodes, rects, pushed_down, 0, 0)
}

/// First overlapping pair, by input index.
#[must_use]
pub fn first_overlap(rects: &[GridRect]) -> Option<(usize, usize)> {
    for (i, a) in rects.iter().enumerate() {
        for (j, b) in rects.iter().enumerate().skip(i + 1) {
            if a.overlaps(b) {
                return Some((i, j));
            }
        }
    }
    None
}

fn visit_order(rects: &[GridRect]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..rects.len()).collect();
    // Stable sort keeps input order for equal (y, x).
    order.sort_by_key(|&i| rects[i].row_major_key());
    order
}

fn resolve_in_place(rects: &mut [GridRect], order: &[usize]) -> usize {
    let mut pushed = 0;
    for (visited, &index) in order.iter().enumerate() {
        let mut was_pushed = false;
        loop {
            let current = rects[index];
            let lowest_offender = order[..visited]
                .iter()
                .map(|&other| rects[other])
                .filter(|other| other.overlaps(&current))
                .map(|other| other.bottom())
                .max();
            match lowest_offender {
                Some(bottom) => {
                    rects[index] = current.at(current.x, bottom);
                    was_pushed = true;
                }
                None => break,
            }
        }
        if was_pushed {
            pushed += 1;
        }
    }
    pushed
}

fn is_free(rects: &[GridRect], moving: usize, candidate: &GridRect) -> bool {
    rects
        .iter()
        .enumerate()
        .all(|(i, other)| i == moving || !other.overlaps(candidate))
}

fn finish(
    nodes: &[CompactNode],
    rects: Vec<GridRect>,
    pushed_down: usize,
    attempts: u64,
    attempt_bound: u64,
) -> CompactionOutcome {
    let mut moves = Vec::new();
    let mut out = Vec::with_capacity(nodes.len());
    for (node, rect) in nodes.iter().zip(rects) {
        if node.rect != rect {
            moves.push(NodeMove {
                id: node.id.clone(),
                from: node.rect,
                to: rect,
            });
        }
        out.push(CompactNode {
            id: node.id.clone(),
            rect,
        });
    }
    CompactionOutcome {
        nodes: out,
        moves,
        pushed_down,
        attempts,
        attempt_bound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, x: u32, y: u32, w: u32, h: u32) -> CompactNode {
        CompactNode::new(id, GridRect::new(x, y, w, h))
    }

    fn rect_of<'a>(outcome: &'a CompactionOutcome, id: &str) -> &'a GridRect {
        &outcome.nodes.iter().find(|n| n.id == id).unwrap().rect
    }

    #[test]
    fn floating_node_rises_to_top() {
        let out = compact(&[node("a", 0, 5, 2, 2)], CompactionMode::Full);
        assert_eq!(*rect_of(&out, "a"), GridRect::new(0, 0, 2, 2));
        assert_eq!(out.moves.len(), 1);
    }

    #[test]
    fn full_mode_moves_left_vertical_does_not() {
        let input = [node("a", 3, 4, 2, 2)];
        let full = compact(&input, CompactionMode::Full);
        assert_eq!(*rect_of(&full, "a"), GridRect::new(0, 0, 2, 2));
        let vertical = compact(&input, CompactionMode::VerticalOnly);
        assert_eq!(*rect_of(&vertical, "a"), GridRect::new(3, 0, 2, 2));
    }

    #[test]
    fn packed_layout_is_untouched() {
        let input = [node("a", 0, 0, 3, 3), node("b", 3, 0, 3, 3), node("c", 0, 3, 6, 2)];
        let out = compact(&input, CompactionMode::Full);
        assert!(out.is_noop());
        assert_eq!(out.pushed_down, 0);
    }

    #[test]
    fn node_stops_under_blocker() {
        let input = [node("top", 0, 0, 4, 2), node("low", 1, 6, 2, 2)];
        let out = compact(&input, CompactionMode::VerticalOnly);
        assert_eq!(*rect_of(&out, "low"), GridRect::new(1, 2, 2, 2));
    }

    #[test]
    fn overlapping_pair_is_separated_without_resizing() {
        let input = [node("a", 0, 0, 4, 4), node("b", 2, 2, 4, 4)];
        let out = compact(&input, CompactionMode::Full);
        let rects: Vec<GridRect> = out.nodes.iter().map(|n| n.rect).collect();
        assert_eq!(first_overlap(&rects), None);
        assert_eq!(out.pushed_down, 1);
        let area: u64 = rects.iter().map(GridRect::area).sum();
        assert_eq!(area, 32);
        assert_eq!(*rect_of(&out, "b"), GridRect::new(0, 4, 4, 4));
    }

    #[test]
    fn resolve_only_pushes_down() {
        let input = [node("a", 0, 0, 4, 4), node("b", 2, 2, 4, 4)];
        let out = resolve_overlaps(&input);
        assert_eq!(*rect_of(&out, "b"), GridRect::new(2, 4, 4, 4));
        assert_eq!(out.attempts, 0);
    }

    #[test]
    fn moves_are_reported_in_input_order() {
        let input = [node("late", 0, 9, 2, 2), node("early", 4, 3, 2, 2)];
        let out = compact(&input, CompactionMode::VerticalOnly);
        let ids: Vec<&str> = out.moves.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["late", "early"]);
    }

    #[test]
    fn attempts_stay_within_bound() {
        let input = [node("a", 7, 9, 2, 2), node("b", 2, 4, 3, 1), node("c", 0, 12, 5, 5)];
        let out = compact(&input, CompactionMode::Full);
        assert!(out.attempts <= out.attempt_bound);
    }

    #[test]
    fn empty_input() {
        let out = compact(&[], CompactionMode::Full);
        assert!(out.nodes.is_empty());
        assert_eq!(out.attempt_bound, 0);
    }
}
