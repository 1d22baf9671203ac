#![forbid(unsafe_code)]

//! Clock-driven front end over [`DashboardSession`].
//!
//! A session takes an explicit `Instant` on every call. [`Dashboard`] pairs
//! one with a [`Clock`] so hosts can call it without threading time through,
//! and lifts every error into [`crate::Error`].

use std::path::Path;

use dashgrid_core::{Clock, DeviceClass, SystemClock, WidgetTypeRegistry};
use dashgrid_layout::{
    ChangeKind, GridAdapter, GridEngine, HeadlessEngine, KeyValueStore, Layout, LoadReport,
    NullFactory, ReconcileReport, SaveOutcome, WidgetFactory,
};
use dashgrid_runtime::{DashboardConfig, DashboardSession, SettleReport, TickReport};

use crate::error::Result;

/// Builder for a [`Dashboard`].
#[derive(Debug)]
pub struct DashboardBuilder<S, C = SystemClock> {
    storage: S,
    config: DashboardConfig,
    types: WidgetTypeRegistry,
    clock: C,
}

impl<S: KeyValueStore> DashboardBuilder<S> {
    /// Start from default configuration, the built-in widget types, and
    /// wall-clock time.
    #[must_use]
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            config: DashboardConfig::default(),
            types: WidgetTypeRegistry::builtin(),
            clock: SystemClock,
        }
    }
}

impl<S: KeyValueStore, C: Clock> DashboardBuilder<S, C> {
    #[must_use]
    pub fn config(mut self, config: DashboardConfig) -> Self {
        self.config = config;
        self
    }

    /// Load and validate configuration from a `.toml` or `.json` file.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        self.config = DashboardConfig::load(path)?;
        Ok(self)
    }

    #[must_use]
    pub fn types(mut self, types: WidgetTypeRegistry) -> Self {
        self.types = types;
        self
    }

    /// Replace the time source.
    #[must_use]
    pub fn clock<C2: Clock>(self, clock: C2) -> DashboardBuilder<S, C2> {
        DashboardBuilder {
            storage: self.storage,
            config: self.config,
            types: self.types,
            clock,
        }
    }

    /// Wire the dashboard to a live engine and widget factory.
    pub fn build<E: GridEngine>(
        self,
        adapter: GridAdapter<E>,
        factory: impl WidgetFactory + 'static,
    ) -> Dashboard<S, E, C> {
        Dashboard {
            session: DashboardSession::new(
                self.config,
                self.storage,
                self.types,
                adapter,
                factory,
            ),
            clock: self.clock,
        }
    }

    /// A dashboard over the in-memory engine with no widget components.
    /// Used for offline tooling.
    pub fn build_headless(self) -> Dashboard<S, HeadlessEngine, C> {
        self.build(GridAdapter::new(HeadlessEngine::new()), NullFactory)
    }
}

/// A [`DashboardSession`] driven by a [`Clock`].
#[derive(Debug)]
pub struct Dashboard<S, E, C = SystemClock> {
    session: DashboardSession<S, E>,
    clock: C,
}

impl<S: KeyValueStore, E: GridEngine, C: Clock> Dashboard<S, E, C> {
    pub fn start(&mut self, device: DeviceClass) -> Result<LoadReport> {
        let now = self.clock.now();
        Ok(self.session.start(device, now)?)
    }

    /// Start with the device class implied by a viewport width.
    pub fn start_for_width(&mut self, width_px: u32) -> Result<LoadReport> {
        let device = self.session.config().device_for_width(width_px);
        self.start(device)
    }

    pub fn add_widget(&mut self, type_name: &str) -> Result<String> {
        let now = self.clock.now();
        Ok(self.session.add_widget(type_name, now)?)
    }

    pub fn remove_widget(&mut self, id: &str) -> Result<bool> {
        let now = self.clock.now();
        Ok(self.session.remove_widget(id, now)?)
    }

    pub fn reset(&mut self) -> Result<ReconcileReport> {
        let now = self.clock.now();
        Ok(self.session.reset(now)?)
    }

    pub fn copy_text(&self) -> Result<String> {
        Ok(self.session.copy_text()?)
    }

    pub fn paste_text(&mut self, text: &str) -> Result<ReconcileReport> {
        let now = self.clock.now();
        Ok(self.session.paste_text(text, now)?)
    }

    pub fn set_device_class(&mut self, device: DeviceClass) -> Result<ReconcileReport> {
        let now = self.clock.now();
        Ok(self.session.set_device_class(device, now)?)
    }

    /// Re-evaluate the device class after a viewport resize.
    pub fn resize_viewport(&mut self, width_px: u32) -> Result<ReconcileReport> {
        let device = self.session.config().device_for_width(width_px);
        self.set_device_class(device)
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.session.set_locked(locked);
    }

    pub fn handle_user_change(&mut self, kind: ChangeKind, ids: &[String]) -> Result<TickReport> {
        let now = self.clock.now();
        Ok(self.session.handle_user_change(kind, ids, now)?)
    }

    pub fn mark_ready(&mut self) -> Result<SettleReport> {
        Ok(self.session.mark_ready()?)
    }

    /// Run whatever deferred work is due now.
    pub fn tick(&mut self) -> Result<TickReport> {
        let now = self.clock.now();
        Ok(self.session.tick(now)?)
    }

    pub fn shutdown(&mut self) -> Vec<(DeviceClass, SaveOutcome)> {
        self.session.shutdown()
    }

    #[must_use]
    pub fn current_layout(&self) -> Layout {
        self.session.current_layout()
    }

    #[must_use]
    pub fn session(&self) -> &DashboardSession<S, E> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut DashboardSession<S, E> {
        &mut self.session
    }

    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }
}
