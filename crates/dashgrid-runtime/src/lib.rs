#![forbid(unsafe_code)]

//! Session runtime for dashgrid.
//!
//! # Role in dashgrid
//! `dashgrid-runtime` is where the layout core meets a live dashboard:
//!
//! - [`registry`]: per-widget UI state the layout core seeds and snapshots.
//! - [`bus`]: typed events widgets publish instead of touching the grid.
//! - [`tasks`]: microtask, next-frame, and delayed lanes driven by `tick`.
//! - [`config`]: TOML/JSON configuration.
//! - [`session`]: the orchestrator tying store, adapter, and reconciler
//!   together.
//!
//! Everything is single-threaded (`Rc`/`RefCell`); time only advances when
//! the host calls [`DashboardSession::tick`].

pub mod bus;
pub mod config;
pub mod registry;
pub mod session;
pub mod tasks;

pub use bus::{DashboardEvent, EventBus, EventKind, Scope};
pub use config::{ConfigError, DashboardConfig, GridConfig, PersistenceConfig};
pub use registry::{Subscription, WidgetState, WidgetStateRegistry};
pub use session::{
    DashboardSession, SessionError, SessionPhase, SessionTask, SettleReport, TickReport,
};
pub use tasks::TaskQueue;
