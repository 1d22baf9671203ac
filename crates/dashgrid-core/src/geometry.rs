#![forbid(unsafe_code)]

//! Grid-cell geometry.

use serde::{Deserialize, Serialize};

/// A rectangle measured in grid cells.
///
/// Uses grid coordinates (0-indexed, origin at top-left). `w` and `h` are
/// spans, so the right and bottom edges are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridRect {
    /// Left edge (inclusive).
    pub x: u32,
    /// Top edge (inclusive).
    pub y: u32,
    /// Width in cells.
    pub w: u32,
    /// Height in cells.
    pub h: u32,
}

impl GridRect {
    /// Create a new rectangle.
    #[inline]
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Right edge (exclusive).
    #[inline]
    pub const fn right(&self) -> u32 {
        self.x.saturating_add(self.w)
    }

    /// Bottom edge (exclusive).
    #[inline]
    pub const fn bottom(&self) -> u32 {
        self.y.saturating_add(self.h)
    }

    /// Area in cells.
    #[inline]
    pub const fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    /// Check if the rectangle has zero area.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Axis-aligned overlap test.
    ///
    /// Rectangles that only share an edge do not overlap.
    #[inline]
    pub const fn overlaps(&self, other: &GridRect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Same size, moved to `(x, y)`.
    #[inline]
    pub const fn at(&self, x: u32, y: u32) -> Self {
        Self::new(x, y, self.w, self.h)
    }

    /// Same origin, resized to `w` x `h`.
    #[inline]
    pub const fn sized(&self, w: u32, h: u32) -> Self {
        Self::new(self.x, self.y, w, h)
    }

    /// `(y, x)` ordering key used by row-major sweeps.
    #[inline]
    pub const fn row_major_key(&self) -> (u32, u32) {
        (self.y, self.x)
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &GridRect) -> GridRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        GridRect::new(x, y, right - x, bottom - y)
    }
}

/// Bounding box of every rectangle in `rects`, or `None` when empty.
pub fn bounding_box<'a>(rects: impl IntoIterator<Item = &'a GridRect>) -> Option<GridRect> {
    rects
        .into_iter()
        .filter(|rect| !rect.is_empty())
        .fold(None, |acc: Option<GridRect>, rect| {
            Some(match acc {
                Some(bounds) => bounds.union(rect),
                None => *rect,
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_are_exclusive() {
        let r = GridRect::new(2, 3, 4, 5);
        assert_eq!(r.right(), 6);
        assert_eq!(r.bottom(), 8);
        assert_eq!(r.area(), 20);
    }

    #[test]
    fn touching_edges_do_not_overlap() {
        let a = GridRect::new(0, 0, 3, 3);
        let right = GridRect::new(3, 0, 3, 3);
        let below = GridRect::new(0, 3, 3, 3);
        assert!(!a.overlaps(&right));
        assert!(!a.overlaps(&below));
    }

    #[test]
    fn partial_overlap_detected_both_ways() {
        let a = GridRect::new(0, 0, 4, 4);
        let b = GridRect::new(2, 2, 4, 4);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn empty_rect_never_overlaps() {
        let a = GridRect::new(0, 0, 0, 4);
        let b = GridRect::new(0, 0, 4, 4);
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn bounding_box_spans_all() {
        let rects = [GridRect::new(0, 0, 2, 2), GridRect::new(5, 1, 1, 4)];
        assert_eq!(bounding_box(&rects), Some(GridRect::new(0, 0, 6, 5)));
        assert_eq!(bounding_box(&[]), None);
    }

    #[test]
    fn serde_uses_short_field_names() {
        let json = serde_json::to_string(&GridRect::new(1, 2, 3, 4)).unwrap();
        assert_eq!(json, r#"{"x":1,"y":2,"w":3,"h":4}"#);
    }
}
