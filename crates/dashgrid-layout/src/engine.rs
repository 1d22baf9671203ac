#![forbid(unsafe_code)]

//! Contract with the live grid engine.
//!
//! The grid engine is an external, stateful component that owns placed
//! nodes and handles drag/resize gestures. dashgrid never talks to it
//! directly; everything goes through [`crate::adapter::GridAdapter`], which
//! tolerates the engine being absent, not yet ready, or failing.
//!
//! [`FallbackSurface`] is the direct-placement path the adapter uses when the
//! engine cannot take a node: it positions the widget itself, outside the
//! engine's control.

use std::fmt;

use dashgrid_core::{DeviceClass, GridRect};
use serde::{Deserialize, Serialize};

use crate::record::LayoutRecord;

/// Options passed to the engine at init.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridOptions {
    pub columns: u32,
    /// Row height in pixels.
    pub cell_height: u32,
    /// Gap between cells in pixels.
    pub margin: u32,
    pub drag_enabled: bool,
    pub resize_enabled: bool,
    /// When true the engine must not apply its own gravity.
    pub float_mode: bool,
    pub animate: bool,
}

impl GridOptions {
    /// Options for a device class. Gestures are enabled only on editable
    /// devices outside locked mode.
    #[must_use]
    pub fn for_device(device: DeviceClass, locked: bool) -> Self {
        let interactive = device.is_editable() && !locked;
        Self {
            columns: device.columns(),
            cell_height: 80,
            margin: 8,
            drag_enabled: interactive,
            resize_enabled: interactive,
            float_mode: false,
            animate: true,
        }
    }
}

impl Default for GridOptions {
    fn default() -> Self {
        Self::for_device(DeviceClass::Desktop, false)
    }
}

/// Who is positioning a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Owned by the engine.
    Managed,
    /// Positioned by the adapter's fallback surface.
    Direct,
}

/// A placed element as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridNode {
    pub id: String,
    pub rect: GridRect,
    pub min_w: u32,
    pub min_h: u32,
    pub max_w: Option<u32>,
    pub max_h: Option<u32>,
    pub placement: Placement,
}

impl GridNode {
    /// A managed node with 1x1 minimums.
    #[must_use]
    pub fn new(id: impl Into<String>, rect: GridRect) -> Self {
        Self {
            id: id.into(),
            rect,
            min_w: 1,
            min_h: 1,
            max_w: None,
            max_h: None,
            placement: Placement::Managed,
        }
    }

    /// Node for a layout record, carrying its size bounds.
    #[must_use]
    pub fn from_record(record: &LayoutRecord) -> Self {
        Self {
            id: record.id.clone(),
            rect: record.rect(),
            min_w: record.min_w,
            min_h: record.min_h,
            max_w: record.max_w,
            max_h: record.max_h,
            placement: Placement::Managed,
        }
    }

    /// Layout record for this node, keeping its size bounds as placed.
    #[must_use]
    pub fn to_record(&self) -> LayoutRecord {
        LayoutRecord {
            id: self.id.clone(),
            x: self.rect.x,
            y: self.rect.y,
            w: self.rect.w,
            h: self.rect.h,
            min_w: self.min_w,
            min_h: self.min_h,
            max_w: self.max_w,
            max_h: self.max_h,
            view_state: None,
        }
    }

    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.placement == Placement::Direct
    }
}

/// Failure reported by a grid engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine has not finished initializing.
    NotReady,
    /// The engine refused an operation on a node.
    Rejected { id: String, reason: String },
    /// No node with this id.
    UnknownNode { id: String },
    /// The batch commit step failed.
    CommitFailed { reason: String },
    /// Initialization failed.
    InitFailed { reason: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "grid engine is not ready"),
            Self::Rejected { id, reason } => {
                write!(f, "grid engine rejected node `{id}`: {reason}")
            }
            Self::UnknownNode { id } => write!(f, "grid engine has no node `{id}`"),
            Self::CommitFailed { reason } => write!(f, "grid batch commit failed: {reason}"),
            Self::InitFailed { reason } => write!(f, "grid engine failed to initialize: {reason}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Operations the adapter needs from a grid engine.
///
/// Batch hooks and the animate toggle have no-op defaults so engines
/// without a transaction concept still work behind the adapter.
pub trait GridEngine {
    fn init(&mut self, options: &GridOptions) -> Result<(), EngineError>;

    /// Whether the engine can accept node operations now.
    fn is_ready(&self) -> bool;

    /// Place a node at exactly `node.rect`.
    fn add_node(&mut self, node: &GridNode) -> Result<(), EngineError>;

    fn update_node(&mut self, id: &str, rect: GridRect) -> Result<(), EngineError>;

    fn remove_node(&mut self, id: &str) -> Result<(), EngineError>;

    /// Current nodes, all with [`Placement::Managed`].
    fn nodes(&self) -> Vec<GridNode>;

    fn set_float(&mut self, enabled: bool);

    fn set_interaction(&mut self, drag: bool, resize: bool);

    fn set_columns(&mut self, columns: u32) -> Result<(), EngineError>;

    fn begin_batch(&mut self) {}

    fn commit(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn set_animate(&mut self, _enabled: bool) {}
}

/// Pixel geometry for a node placed outside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectPlacement {
    /// Left edge as a percentage of container width.
    pub left_pct: f64,
    /// Width as a percentage of container width.
    pub width_pct: f64,
    pub top_px: u32,
    pub height_px: u32,
}

impl DirectPlacement {
    /// Compute the equivalent absolute placement for `rect`.
    #[must_use]
    pub fn for_rect(rect: GridRect, options: &GridOptions) -> Self {
        let columns = f64::from(options.columns.max(1));
        let pitch = options.cell_height.saturating_add(options.margin);
        Self {
            left_pct: f64::from(rect.x) * 100.0 / columns,
            width_pct: f64::from(rect.w) * 100.0 / columns,
            top_px: rect.y.saturating_mul(pitch),
            height_px: rect
                .h
                .saturating_mul(pitch)
                .saturating_sub(options.margin),
        }
    }
}

/// Positions widgets directly when the engine cannot.
pub trait FallbackSurface {
    fn place(&mut self, id: &str, placement: DirectPlacement);

    fn detach(&mut self, id: &str);
}

/// A surface that positions nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedSurface;

impl FallbackSurface for DetachedSurface {
    fn place(&mut self, _id: &str, _placement: DirectPlacement) {}

    fn detach(&mut self, _id: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_follow_device_and_lock() {
        let desktop = GridOptions::for_device(DeviceClass::Desktop, false);
        assert_eq!(desktop.columns, 12);
        assert!(desktop.drag_enabled && desktop.resize_enabled);

        let locked = GridOptions::for_device(DeviceClass::Desktop, true);
        assert!(!locked.drag_enabled && !locked.resize_enabled);

        let mobile = GridOptions::for_device(DeviceClass::Mobile, false);
        assert_eq!(mobile.columns, 1);
        assert!(!mobile.drag_enabled);
    }

    #[test]
    fn direct_placement_matches_grid_pitch() {
        let options = GridOptions {
            cell_height: 50,
            margin: 10,
            ..GridOptions::default()
        };
        let placed = DirectPlacement::for_rect(GridRect::new(3, 2, 6, 2), &options);
        assert!((placed.left_pct - 25.0).abs() < f64::EPSILON);
        assert!((placed.width_pct - 50.0).abs() < f64::EPSILON);
        assert_eq!(placed.top_px, 120);
        assert_eq!(placed.height_px, 110);
    }

    #[test]
    fn node_from_record_keeps_bounds() {
        let mut record = LayoutRecord::new("ticker-1", GridRect::new(0, 0, 12, 2));
        record.max_h = Some(2);
        let node = GridNode::from_record(&record);
        assert_eq!(node.max_h, Some(2));
        assert!(!node.is_direct());
        assert_eq!(node.to_record(), record);
    }
}
