#![forbid(unsafe_code)]

//! Validation of untrusted layout data.
//!
//! Everything that crosses a trust boundary (storage reads, clipboard
//! imports, the final check before a write) goes through
//! [`validate_value`] or [`validate_layout`]. Validation never panics and
//! never partially applies: it either yields a clean [`Layout`] plus a
//! [`ValidationReport`] of warnings, or a [`LayoutValidationError`] carrying
//! every error-level finding.
//!
//! # Rules
//!
//! - The top-level value is an array.
//! - Each element is an object with a non-empty string `id`, unique within
//!   the layout.
//! - `x`, `y`, `w`, `h` are non-negative integers (integral JSON numbers).
//! - Records whose widget type is unknown are dropped with a warning.
//! - `w >= minW` and `h >= minH`, where the minimums come from the widget
//!   type registry and override whatever the data claims. The device
//!   class caps `minW` at its column count, so a one-column mobile layout
//!   validates with `minW = 1`.
//! - No record reaches past [`MAX_GRID_EXTENT`] rows or columns.
//! - A `viewState` that is not an object is discarded with a warning.
//! - Overlapping records are reported as a repairable warning; callers
//!   decide whether to resolve them.

use std::fmt;

use dashgrid_core::{DeviceClass, WidgetTypeRegistry, widget_type_of};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{Layout, LayoutRecord};

/// Furthest row or column edge a record may reach.
pub const MAX_GRID_EXTENT: u32 = 10_000;

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    /// The layout as a whole is rejected.
    Error,
    /// The layout is accepted after the record or field is dropped.
    Warning,
}

/// Stable code for validation findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    NotAnArray,
    NotAnObject,
    MissingId,
    DuplicateId,
    InvalidGeometry,
    BelowMinimum,
    AboveMaximum,
    OutOfRange,
    UnknownWidgetType,
    InvalidViewState,
    Overlap,
}

/// One finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: IssueCode,
    pub severity: IssueSeverity,
    /// Position of the offending element in the input array.
    pub index: Option<usize>,
    pub id: Option<String>,
    pub message: String,
}

/// All findings from one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|issue| issue.severity == IssueSeverity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity == IssueSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity == IssueSeverity::Warning)
    }

    /// Number of findings with the given code.
    #[must_use]
    pub fn count(&self, code: IssueCode) -> usize {
        self.issues.iter().filter(|issue| issue.code == code).count()
    }

    /// Ids of records dropped for naming an unknown widget type.
    pub fn dropped_unknown(&self) -> impl Iterator<Item = &str> {
        self.issues
            .iter()
            .filter(|issue| issue.code == IssueCode::UnknownWidgetType)
            .filter_map(|issue| issue.id.as_deref())
    }

    fn error(&mut self, code: IssueCode, index: Option<usize>, id: Option<&str>, message: String) {
        self.push(code, IssueSeverity::Error, index, id, message);
    }

    fn warn(&mut self, code: IssueCode, index: Option<usize>, id: Option<&str>, message: String) {
        self.push(code, IssueSeverity::Warning, index, id, message);
    }

    fn push(
        &mut self,
        code: IssueCode,
        severity: IssueSeverity,
        index: Option<usize>,
        id: Option<&str>,
        message: String,
    ) {
        self.issues.push(ValidationIssue {
            code,
            severity,
            index,
            id: id.map(str::to_owned),
            message,
        });
    }
}

/// A layout that passed validation, with its non-fatal findings.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedLayout {
    pub layout: Layout,
    pub report: ValidationReport,
}

/// Layout data that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutValidationError {
    /// The text was not JSON at all.
    Malformed {
        reason: String,
        line: usize,
        column: usize,
    },
    /// The JSON parsed but breaks at least one rule.
    Invalid { report: ValidationReport },
}

impl LayoutValidationError {
    /// The report, when the data parsed.
    #[must_use]
    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            Self::Malformed { .. } => None,
            Self::Invalid { report } => Some(report),
        }
    }

    pub(crate) fn from_json(err: &serde_json::Error) -> Self {
        Self::Malformed {
            reason: err.to_string(),
            line: err.line(),
            column: err.column(),
        }
    }
}

impl fmt::Display for LayoutValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { reason, .. } => write!(f, "layout is not valid JSON: {reason}"),
            Self::Invalid { report } => {
                let errors: Vec<&ValidationIssue> = report.errors().collect();
                match errors.first() {
                    Some(first) => write!(
                        f,
                        "layout failed validation with {} error(s); first: {}",
                        errors.len(),
                        first.message
                    ),
                    None => write!(f, "layout failed validation"),
                }
            }
        }
    }
}

impl std::error::Error for LayoutValidationError {}

/// Parse and validate desktop layout text.
pub fn validate_text(
    text: &str,
    registry: &WidgetTypeRegistry,
) -> Result<ValidatedLayout, LayoutValidationError> {
    validate_text_for(text, registry, DeviceClass::Desktop)
}

/// Parse and validate layout text stored for `device`.
pub fn validate_text_for(
    text: &str,
    registry: &WidgetTypeRegistry,
    device: DeviceClass,
) -> Result<ValidatedLayout, LayoutValidationError> {
    let value: Value =
        serde_json::from_str(text).map_err(|err| LayoutValidationError::from_json(&err))?;
    validate_value_for(&value, registry, device)
}

/// Validate an already-parsed desktop layout.
pub fn validate_value(
    value: &Value,
    registry: &WidgetTypeRegistry,
) -> Result<ValidatedLayout, LayoutValidationError> {
    validate_value_for(value, registry, DeviceClass::Desktop)
}

/// Validate an already-parsed layout for `device`.
pub fn validate_value_for(
    value: &Value,
    registry: &WidgetTypeRegistry,
    device: DeviceClass,
) -> Result<ValidatedLayout, LayoutValidationError> {
    let mut report = ValidationReport::default();
    let Some(items) = value.as_array() else {
        report.error(
            IssueCode::NotAnArray,
            None,
            None,
            format!("expected an array of records, found {}", json_kind(value)),
        );
        return Err(LayoutValidationError::Invalid { report });
    };

    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let checked = check_element(index, item, registry, device, &mut seen, &mut report);
        if let Some(record) = checked {
            records.push(record);
        }
    }
    finish(records, report)
}

/// Re-validate a typed desktop layout.
pub fn validate_layout(
    layout: &Layout,
    registry: &WidgetTypeRegistry,
) -> Result<ValidatedLayout, LayoutValidationError> {
    validate_layout_for(layout, registry, DeviceClass::Desktop)
}

/// Re-validate a typed layout for `device`, e.g. before writing it to
/// storage.
pub fn validate_layout_for(
    layout: &Layout,
    registry: &WidgetTypeRegistry,
    device: DeviceClass,
) -> Result<ValidatedLayout, LayoutValidationError> {
    let mut report = ValidationReport::default();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut records = Vec::with_capacity(layout.len());
    for (index, record) in layout.iter().enumerate() {
        if record.id.is_empty() {
            report.error(
                IssueCode::MissingId,
                Some(index),
                None,
                format!("record {index} has an empty id"),
            );
            continue;
        }
        if !seen.insert(record.id.clone()) {
            report.error(
                IssueCode::DuplicateId,
                Some(index),
                Some(&record.id),
                format!("duplicate id `{}`", record.id),
            );
            continue;
        }
        if let Some(record) = check_bounds(index, record.clone(), registry, device, &mut report) {
            records.push(record);
        }
    }
    finish(records, report)
}

fn finish(
    records: Vec<LayoutRecord>,
    mut report: ValidationReport,
) -> Result<ValidatedLayout, LayoutValidationError> {
    if report.has_errors() {
        return Err(LayoutValidationError::Invalid { report });
    }
    for (i, a) in records.iter().enumerate() {
        for b in &records[i + 1..] {
            if a.rect().overlaps(&b.rect()) {
                report.warn(
                    IssueCode::Overlap,
                    None,
                    Some(&b.id),
                    format!("`{}` overlaps `{}`", b.id, a.id),
                );
            }
        }
    }
    Ok(ValidatedLayout {
        layout: Layout::from_records(records),
        report,
    })
}

fn check_element(
    index: usize,
    item: &Value,
    registry: &WidgetTypeRegistry,
    device: DeviceClass,
    seen: &mut FxHashSet<String>,
    report: &mut ValidationReport,
) -> Option<LayoutRecord> {
    let Some(object) = item.as_object() else {
        report.error(
            IssueCode::NotAnObject,
            Some(index),
            None,
            format!("record {index} is {}, not an object", json_kind(item)),
        );
        return None;
    };

    let id = match object.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => id,
        _ => {
            report.error(
                IssueCode::MissingId,
                Some(index),
                None,
                format!("record {index} has no non-empty string id"),
            );
            return None;
        }
    };
    if !seen.insert(id.to_owned()) {
        report.error(
            IssueCode::DuplicateId,
            Some(index),
            Some(id),
            format!("duplicate id `{id}`"),
        );
        return None;
    }

    let mut geometry = [0u32; 4];
    for (slot, field) in geometry.iter_mut().zip(["x", "y", "w", "h"]) {
        match object.get(field).and_then(cell_count) {
            Some(value) => *slot = value,
            None => {
                report.error(
                    IssueCode::InvalidGeometry,
                    Some(index),
                    Some(id),
                    format!("`{id}`: `{field}` must be a non-negative integer"),
                );
                return None;
            }
        }
    }
    let [x, y, w, h] = geometry;

    let view_state = match object.get("viewState") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map.clone()),
        Some(other) => {
            report.warn(
                IssueCode::InvalidViewState,
                Some(index),
                Some(id),
                format!("`{id}`: viewState is {}, discarded", json_kind(other)),
            );
            None
        }
    };

    let record = LayoutRecord {
        id: id.to_owned(),
        x,
        y,
        w,
        h,
        min_w: 1,
        min_h: 1,
        max_w: None,
        max_h: None,
        view_state,
    };
    check_bounds(index, record, registry, device, report)
}

/// Overwrite bounds from the registry and check the span against them.
fn check_bounds(
    index: usize,
    mut record: LayoutRecord,
    registry: &WidgetTypeRegistry,
    device: DeviceClass,
    report: &mut ValidationReport,
) -> Option<LayoutRecord> {
    let Some(spec) = registry.spec_for_id(&record.id) else {
        report.warn(
            IssueCode::UnknownWidgetType,
            Some(index),
            Some(&record.id),
            format!(
                "`{}`: unknown widget type `{}`, record dropped",
                record.id,
                widget_type_of(&record.id)
            ),
        );
        return None;
    };

    let far_edge = |start: u32, span: u32| u64::from(start) + u64::from(span);
    let limit = u64::from(MAX_GRID_EXTENT);
    if far_edge(record.x, record.w) > limit || far_edge(record.y, record.h) > limit {
        report.error(
            IssueCode::OutOfRange,
            Some(index),
            Some(&record.id),
            format!(
                "`{}`: reaches past row or column {MAX_GRID_EXTENT}",
                record.id
            ),
        );
        return None;
    }

    record.min_w = spec.min_w.min(device.columns());
    record.min_h = spec.min_h;
    record.max_w = spec.max_w;
    record.max_h = spec.max_h;

    if record.w < record.min_w || record.h < record.min_h {
        report.error(
            IssueCode::BelowMinimum,
            Some(index),
            Some(&record.id),
            format!(
                "`{}`: {}x{} is below the {}x{} minimum",
                record.id, record.w, record.h, record.min_w, record.min_h
            ),
        );
        return None;
    }
    if !record.satisfies_bounds() {
        report.error(
            IssueCode::AboveMaximum,
            Some(index),
            Some(&record.id),
            format!("`{}`: {}x{} exceeds the maximum", record.id, record.w, record.h),
        );
        return None;
    }
    Some(record)
}

fn cell_count(value: &Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    let f = value.as_f64()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= f64::from(u32::MAX) {
        // Integral and in range, so the cast is exact.
        Some(f as u32)
    } else {
        None
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
