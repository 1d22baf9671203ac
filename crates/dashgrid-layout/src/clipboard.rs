#![forbid(unsafe_code)]

//! Copy/paste text protocol.
//!
//! # Format
//!
//! Export always writes the combined shape:
//!
//! ```json
//! {
//!   "layout": [ { "id": "chart-1", "x": 0, "y": 0, "w": 6, "h": 6 } ],
//!   "auxiliary": { "lists": { "favorites": ["AAPL"] } }
//! }
//! ```
//!
//! Import accepts that shape or a bare array of records (the legacy form,
//! which carries no auxiliary data). Imported layouts are validated with the
//! same rules as storage reads; any failure is an [`ImportError`] and the
//! caller's state is left untouched.

use std::collections::BTreeMap;
use std::fmt;

use dashgrid_core::WidgetTypeRegistry;
use serde::Serialize;
use serde_json::Value;

use crate::record::{Layout, LayoutRecord};
use crate::validate::{LayoutValidationError, ValidationReport, validate_value};

/// Named auxiliary collections carried next to a layout.
pub type Auxiliary = BTreeMap<String, Value>;

/// Which wire shape an import used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardShape {
    /// `{"layout": [...], "auxiliary": {...}}`
    Combined,
    /// `[...]`
    LegacyArray,
}

/// A successfully imported clipboard payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipboardPayload {
    pub layout: Layout,
    pub auxiliary: Auxiliary,
    pub shape: ClipboardShape,
    /// Non-fatal findings (dropped unknown types, overlaps).
    pub report: ValidationReport,
}

/// Clipboard text that cannot be imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    /// The text is not JSON.
    InvalidJson {
        reason: String,
        line: usize,
        column: usize,
    },
    /// JSON of the wrong shape (neither an object with `layout` nor an array).
    UnexpectedShape { found: String },
    /// The layout part failed validation.
    InvalidLayout(LayoutValidationError),
    /// `auxiliary` is present but is not an object.
    InvalidAuxiliary { found: String },
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJson {
                reason,
                line,
                column,
            } => write!(
                f,
                "clipboard text is not valid JSON (line {line}, column {column}): {reason}"
            ),
            Self::UnexpectedShape { found } => write!(
                f,
                "clipboard JSON must be a layout array or an object with a `layout` field, found {found}"
            ),
            Self::InvalidLayout(err) => write!(f, "clipboard layout rejected: {err}"),
            Self::InvalidAuxiliary { found } => {
                write!(f, "clipboard `auxiliary` must be an object, found {found}")
            }
        }
    }
}

impl std::error::Error for ImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidLayout(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LayoutValidationError> for ImportError {
    fn from(err: LayoutValidationError) -> Self {
        Self::InvalidLayout(err)
    }
}

#[derive(Serialize)]
struct ExportDoc<'a> {
    layout: &'a [LayoutRecord],
    auxiliary: &'a Auxiliary,
}

/// Serialize a layout and its auxiliary collections to clipboard text.
#[must_use]
pub fn export_text(layout: &Layout, auxiliary: &Auxiliary) -> String {
    let doc = ExportDoc {
        layout: layout.records(),
        auxiliary,
    };
    // Serializing strings, integers, and JSON values cannot fail.
    serde_json::to_string_pretty(&doc).unwrap_or_else(|_| String::from("[]"))
}

/// Parse and validate clipboard text.
pub fn import_text(
    text: &str,
    registry: &WidgetTypeRegistry,
) -> Result<ClipboardPayload, ImportError> {
    let value: Value = serde_json::from_str(text).map_err(|err| ImportError::InvalidJson {
        reason: err.to_string(),
        line: err.line(),
        column: err.column(),
    })?;

    let (layout_value, auxiliary, shape) = match value {
        Value::Array(_) => (value, Auxiliary::new(), ClipboardShape::LegacyArray),
        Value::Object(mut object) => {
            let Some(layout_value) = object.remove("layout") else {
                return Err(ImportError::UnexpectedShape {
                    found: "an object without `layout`".into(),
                });
            };
            let auxiliary = match object.remove("auxiliary") {
                None | Some(Value::Null) => Auxiliary::new(),
                Some(Value::Object(map)) => map.into_iter().collect(),
                Some(other) => {
                    return Err(ImportError::InvalidAuxiliary {
                        found: kind_name(&other).into(),
                    });
                }
            };
            (layout_value, auxiliary, ClipboardShape::Combined)
        }
        other => {
            return Err(ImportError::UnexpectedShape {
                found: kind_name(&other).into(),
            });
        }
    };

    let validated = validate_value(&layout_value, registry)?;
    Ok(ClipboardPayload {
        layout: validated.layout,
        auxiliary,
        shape,
        report: validated.report,
    })
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
