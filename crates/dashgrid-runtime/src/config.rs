#![forbid(unsafe_code)]

//! Dashboard configuration loaded from TOML or JSON.
//!
//! # Loading
//!
//! ```toml
//! # dashgrid.toml
//! locked = false
//! settle_delay_ms = 80
//!
//! [desktop]
//! columns = 12
//! cell_height = 80
//!
//! [persistence]
//! key_prefix = "dashgrid"
//! debounce_ms = 250
//! ```
//!
//! ```rust,ignore
//! let config = DashboardConfig::from_toml_file("dashgrid.toml")?;
//! ```
//!
//! # Defaults
//!
//! Every field has a default, so an empty document yields
//! `DashboardConfig::default()`: 12 desktop columns, 1 mobile column,
//! 80 px rows with 8 px margins, a 250 ms save window, and an 80 ms
//! settle delay.

use std::path::Path;
use std::time::Duration;

use dashgrid_core::DeviceClass;
use dashgrid_layout::{DEFAULT_KEY_PREFIX, GridOptions, StoreOptions};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level DashboardConfig
// ---------------------------------------------------------------------------

/// Tunables for one dashboard session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Grid shape on desktop.
    pub desktop: GridConfig,
    /// Grid shape on mobile.
    pub mobile: GridConfig,
    /// Save debouncing and storage keys.
    pub persistence: PersistenceConfig,
    /// Upper bound on waiting for the engine to settle after a layout is
    /// applied, in milliseconds.
    pub settle_delay_ms: u64,
    /// Disable drag and resize everywhere.
    pub locked: bool,
    /// Viewports narrower than this many pixels use the mobile layout.
    pub mobile_breakpoint_px: u32,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            desktop: GridConfig::for_device(DeviceClass::Desktop),
            mobile: GridConfig::for_device(DeviceClass::Mobile),
            persistence: PersistenceConfig::default(),
            settle_delay_ms: 80,
            locked: false,
            mobile_breakpoint_px: 768,
        }
    }
}

impl DashboardConfig {
    /// Load from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(ConfigError::Toml)
    }

    /// Load from a TOML file on disk.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(ConfigError::Json)
    }

    /// Load from a JSON file on disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_json_str(&content)
    }

    /// Load by extension (`.json` is JSON, anything else TOML) and reject
    /// out-of-range values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_file(path)?
        } else {
            Self::from_toml_file(path)?
        };
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Validate all parameters are within acceptable ranges.
    ///
    /// Returns a list of validation errors. An empty list means the config
    /// is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for (name, grid) in [("desktop", &self.desktop), ("mobile", &self.mobile)] {
            if grid.columns == 0 {
                errors.push(format!("{name}.columns must be > 0"));
            }
            if grid.cell_height == 0 {
                errors.push(format!("{name}.cell_height must be > 0"));
            }
        }
        if self.mobile.columns > self.desktop.columns {
            errors.push(format!(
                "mobile.columns ({}) must not exceed desktop.columns ({})",
                self.mobile.columns, self.desktop.columns
            ));
        }
        if self.persistence.key_prefix.is_empty() {
            errors.push("persistence.key_prefix must not be empty".into());
        }
        if self
            .persistence
            .key_prefix
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'))
        {
            errors.push(format!(
                "persistence.key_prefix may only contain [A-Za-z0-9._-], got {:?}",
                self.persistence.key_prefix
            ));
        }
        if let Some(max_wait) = self.persistence.max_wait_ms
            && max_wait < self.persistence.debounce_ms
        {
            errors.push(format!(
                "persistence.max_wait_ms ({max_wait}) must be >= debounce_ms ({})",
                self.persistence.debounce_ms
            ));
        }
        errors
    }

    /// Grid options for `device`, honouring the configured shape.
    #[must_use]
    pub fn grid_options(&self, device: DeviceClass, locked: bool) -> GridOptions {
        let grid = match device {
            DeviceClass::Desktop => &self.desktop,
            DeviceClass::Mobile => &self.mobile,
        };
        GridOptions {
            columns: grid.columns,
            cell_height: grid.cell_height,
            margin: grid.margin,
            ..GridOptions::for_device(device, locked || self.locked)
        }
    }

    #[must_use]
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            key_prefix: self.persistence.key_prefix.clone(),
            save_debounce: Duration::from_millis(self.persistence.debounce_ms),
            save_max_wait: self.persistence.max_wait_ms.map(Duration::from_millis),
        }
    }

    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Device class for a viewport width.
    #[must_use]
    pub fn device_for_width(&self, width_px: u32) -> DeviceClass {
        DeviceClass::for_viewport_width(width_px, self.mobile_breakpoint_px)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Shape of one device class's grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub columns: u32,
    /// Row height in pixels.
    pub cell_height: u32,
    /// Gap between cells in pixels.
    pub margin: u32,
}

impl GridConfig {
    #[must_use]
    pub fn for_device(device: DeviceClass) -> Self {
        let options = GridOptions::for_device(device, false);
        Self {
            columns: options.columns,
            cell_height: options.cell_height,
            margin: options.margin,
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self::for_device(DeviceClass::Desktop)
    }
}

/// Save behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub key_prefix: String,
    /// Quiet window before a save is written, in milliseconds.
    pub debounce_ms: u64,
    /// Force a write after continuous activity this long. `None` disables.
    pub max_wait_ms: Option<u64>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        let options = StoreOptions::default();
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_owned(),
            debounce_ms: options.save_debounce.as_millis() as u64,
            max_wait_ms: options.save_max_wait.map(|d| d.as_millis() as u64),
        }
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors that can occur when loading a dashboard configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error reading a file.
    Io(std::io::Error),
    /// TOML parse error.
    Toml(toml::de::Error),
    /// JSON parse error.
    Json(serde_json::Error),
    /// Validation errors.
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Toml(e) => write!(f, "TOML parse error: {e}"),
            Self::Json(e) => write!(f, "JSON parse error: {e}"),
            Self::Validation(errors) => {
                write!(f, "validation errors: {}", errors.join("; "))
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Toml(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Validation(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_validates_clean() {
        let errors = DashboardConfig::default().validate();
        assert!(errors.is_empty(), "default should validate: {errors:?}");
    }

    #[test]
    fn default_matches_store_and_grid_defaults() {
        let config = DashboardConfig::default();
        assert_eq!(config.store_options(), StoreOptions::default());
        assert_eq!(
            config.grid_options(DeviceClass::Desktop, false),
            GridOptions::for_device(DeviceClass::Desktop, false)
        );
        assert_eq!(config.grid_options(DeviceClass::Mobile, false).columns, 1);
        assert_eq!(config.settle_delay(), Duration::from_millis(80));
    }

    #[test]
    fn empty_toml_is_default() {
        let config = DashboardConfig::from_toml_str("").unwrap();
        assert_eq!(config, DashboardConfig::default());
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let config = DashboardConfig::from_toml_str(
            r#"
            locked = true

            [desktop]
            columns = 24

            [persistence]
            debounce_ms = 500
            "#,
        )
        .unwrap();
        assert!(config.locked);
        assert_eq!(config.desktop.columns, 24);
        assert_eq!(config.desktop.cell_height, 80);
        assert_eq!(config.persistence.debounce_ms, 500);
        assert_eq!(config.persistence.key_prefix, "dashgrid");
        let options = config.grid_options(DeviceClass::Desktop, false);
        assert!(!options.drag_enabled);
        assert_eq!(options.columns, 24);
    }

    #[test]
    fn json_loads() {
        let config =
            DashboardConfig::from_json_str(r#"{"settle_delay_ms": 120, "mobile_breakpoint_px": 600}"#)
                .unwrap();
        assert_eq!(config.settle_delay_ms, 120);
        assert_eq!(config.device_for_width(599), DeviceClass::Mobile);
        assert_eq!(config.device_for_width(600), DeviceClass::Desktop);
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        let err = DashboardConfig::from_toml_str("desktop = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn validate_catches_zero_columns() {
        let mut config = DashboardConfig::default();
        config.desktop.columns = 0;
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("desktop.columns")));
    }

    #[test]
    fn validate_catches_bad_prefix() {
        let mut config = DashboardConfig::default();
        config.persistence.key_prefix = "../etc".into();
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("key_prefix")));
    }

    #[test]
    fn validate_catches_max_wait_below_window() {
        let mut config = DashboardConfig::default();
        config.persistence.max_wait_ms = Some(100);
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("max_wait_ms")));
    }

    #[test]
    fn load_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("dash.json");
        std::fs::write(&json_path, r#"{"locked": true}"#).unwrap();
        assert!(DashboardConfig::load(&json_path).unwrap().locked);

        let toml_path = dir.path().join("dash.toml");
        std::fs::write(&toml_path, "[desktop]\ncolumns = 0\n").unwrap();
        let err = DashboardConfig::load(&toml_path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
