#![forbid(unsafe_code)]

//! dashgrid public facade crate.
//!
//! Re-exports the types hosts need from the internal crates, the unified
//! [`Error`] with its degradation mapping, and (with the default `runtime`
//! feature) a clock-driven [`Dashboard`] front end.
//!
//! ```no_run
//! use dashgrid::prelude::*;
//!
//! let storage = FileStore::open("/tmp/dashgrid")?;
//! let mut dash = DashboardBuilder::new(storage).build_headless();
//! dash.start(DeviceClass::Desktop)?;
//! let id = dash.add_widget("notes")?;
//! dash.tick()?;
//! # let _ = id;
//! # Ok::<(), dashgrid::Error>(())
//! ```

pub mod error;

#[cfg(feature = "runtime")]
pub mod dashboard;

// --- Core re-exports -------------------------------------------------------

pub use dashgrid_core::{
    Clock, DeviceClass, GridRect, Instant, ManualClock, SystemClock, WidgetTypeRegistry,
    WidgetTypeSpec,
};

// --- Layout re-exports -----------------------------------------------------

pub use dashgrid_layout::{
    AdapterState, ChangeKind, ClipboardPayload, CompactionMode, FileStore, GridAdapter,
    GridEngine, GridNode, GridOptions, HeadlessEngine, KeyValueStore, Layout, LayoutRecord,
    LayoutStore, LoadReport, MemoryStore, ReconcileMode, ReconcileReport, SaveOutcome, ViewState,
    WidgetFactory,
};

// --- Runtime re-exports ----------------------------------------------------

#[cfg(feature = "runtime")]
pub use dashgrid_runtime::{
    DashboardConfig, DashboardEvent, DashboardSession, EventBus, Scope, TickReport, WidgetState,
    WidgetStateRegistry,
};

#[cfg(feature = "runtime")]
pub use dashboard::{Dashboard, DashboardBuilder};

// --- Errors ---------------------------------------------------------------

pub use error::{DegradationAction, Error, Result};

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        ChangeKind, DeviceClass, Error, FileStore, GridRect, Layout, LayoutRecord, MemoryStore,
        Result, WidgetTypeRegistry,
    };

    #[cfg(feature = "runtime")]
    pub use crate::{Dashboard, DashboardBuilder, DashboardConfig, DashboardEvent, Scope};

    pub use crate::{core, layout};

    #[cfg(feature = "runtime")]
    pub use crate::runtime;
}

pub use dashgrid_core as core;
pub use dashgrid_layout as layout;
#[cfg(feature = "runtime")]
pub use dashgrid_runtime as runtime;
