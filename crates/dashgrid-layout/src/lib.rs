#![forbid(unsafe_code)]

//! Layout model, persistence, and reconciliation for dashgrid.
//!
//! # Role in dashgrid
//! This crate keeps a declarative, serializable [`Layout`] in lock-step with
//! a live, collision-sensitive grid engine:
//!
//! - [`record`] and [`validate`]: the data model and its trust boundary.
//! - [`storage`] and [`store`]: debounced, validated persistence.
//! - [`clipboard`]: the copy/paste text protocol.
//! - [`engine`], [`adapter`], and [`headless`]: the engine contract, the
//!   failure-tolerant wrapper around it, and an in-process engine.
//! - [`compaction`] and [`reconcile`]: gravity packing and the diff/apply
//!   pass that drives the grid to a desired layout.
//!
//! Live widget state is not owned here; [`bridge`] defines the traits the
//! runtime implements to supply and receive it.

pub mod adapter;
pub mod bridge;
pub mod clipboard;
pub mod compaction;
pub mod engine;
pub mod headless;
pub mod reconcile;
pub mod record;
pub mod storage;
pub mod store;
pub mod validate;

pub use adapter::{
    AdapterState, AdapterStats, ChangeCounter, ChangeKind, ChangeSubscription, GridAdapter,
    GridChange, GridHandle, NodeOutcome,
};
pub use bridge::{
    MountError, NoViewState, NullFactory, ViewStateSource, WidgetFactory, WidgetStateBridge,
    snapshot_view_states,
};
pub use clipboard::{Auxiliary, ClipboardPayload, ClipboardShape, ImportError};
pub use compaction::{
    CompactNode, CompactionMode, CompactionOutcome, NodeMove, compact, first_overlap,
    resolve_overlaps,
};
pub use engine::{
    DetachedSurface, DirectPlacement, EngineError, FallbackSurface, GridEngine, GridNode,
    GridOptions, Placement,
};
pub use headless::{EngineOp, FactoryEvent, HeadlessEngine, RecordingFactory, RecordingSurface};
pub use reconcile::{
    CompactionSummary, ReconcileMode, ReconcilePlan, ReconcileReport, compact_live, reconcile,
};
pub use record::{Layout, LayoutRecord, ViewState};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use store::{
    DEFAULT_KEY_PREFIX, DEFAULT_SAVE_DEBOUNCE, FallbackReason, LayoutStore, LoadReport,
    LoadSource, SaveOutcome, SaveSchedule, StoreOptions, builtin_desktop_layout,
};
pub use validate::{
    IssueCode, IssueSeverity, LayoutValidationError, ValidatedLayout, ValidationIssue,
    MAX_GRID_EXTENT, ValidationReport, validate_layout, validate_layout_for, validate_text,
    validate_text_for, validate_value, validate_value_for,
};
