#![forbid(unsafe_code)]

//! Device classes and their grid shapes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which family of screen a layout targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    /// Wide canvas, user-editable, persisted.
    #[default]
    Desktop,
    /// Single column, fixed arrangement.
    Mobile,
}

impl DeviceClass {
    /// Default column count for this device class.
    #[must_use]
    pub const fn columns(self) -> u32 {
        match self {
            Self::Desktop => 12,
            Self::Mobile => 1,
        }
    }

    /// Whether user gestures may edit layouts on this device class.
    #[must_use]
    pub const fn is_editable(self) -> bool {
        matches!(self, Self::Desktop)
    }

    /// Stable lowercase name used in storage keys and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
        }
    }

    /// Pick a device class from a viewport width in CSS-like pixels.
    #[must_use]
    pub const fn for_viewport_width(width: u32, mobile_breakpoint: u32) -> Self {
        if width < mobile_breakpoint {
            Self::Mobile
        } else {
            Self::Desktop
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_per_class() {
        assert_eq!(DeviceClass::Desktop.columns(), 12);
        assert_eq!(DeviceClass::Mobile.columns(), 1);
    }

    #[test]
    fn breakpoint_selects_mobile_below() {
        assert_eq!(DeviceClass::for_viewport_width(500, 768), DeviceClass::Mobile);
        assert_eq!(DeviceClass::for_viewport_width(768, 768), DeviceClass::Desktop);
    }
}
