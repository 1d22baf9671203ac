#![forbid(unsafe_code)]

//! Unified error model and graceful degradation.
//!
//! # Design Principles
//!
//! 1. **Typed per crate.** Each layer returns its own error so callers can
//!    match on what matters; this module only unifies them.
//! 2. **Nothing is fatal.** Every variant maps to a [`DegradationAction`]
//!    describing how the dashboard keeps working.
//! 3. **Observable.** [`Error::error_type`] gives a stable label for log
//!    fields without the error types depending on tracing.

use std::fmt;

#[cfg(feature = "runtime")]
use dashgrid_runtime::{ConfigError, SessionError};

use dashgrid_layout::{EngineError, ImportError, LayoutValidationError, MountError, StorageError};

// ── Unified Error ───────────────────────────────────────────────────────

/// Top-level error type for dashgrid hosts.
///
/// Use [`Error::degradation`] to find the fallback the dashboard applies.
#[derive(Debug)]
pub enum Error {
    /// Stored layout data could not be used.
    Validation(LayoutValidationError),
    /// Clipboard text was rejected.
    Import(ImportError),
    /// The grid engine failed an operation.
    EngineDegraded(EngineError),
    /// A widget component could not be mounted.
    Mount(MountError),
    /// A record or command named a type the registry does not know.
    UnknownWidgetType { type_name: String },
    /// The storage backend refused a read or write.
    StorageUnavailable(StorageError),
    /// A session command was issued in the wrong lifecycle phase or on a
    /// fixed layout.
    #[cfg(feature = "runtime")]
    Session(SessionError),
    /// Configuration could not be read.
    #[cfg(feature = "runtime")]
    Config(ConfigError),
    /// Raw I/O error (convenience variant for `?` on io::Result).
    Io(std::io::Error),
}

/// Standard result type for dashgrid APIs.
pub type Result<T> = std::result::Result<T, Error>;

// ── Graceful Degradation ────────────────────────────────────────────────

/// How the dashboard keeps going after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradationAction {
    /// Discard the unusable data and load the built-in default layout.
    FallbackToDefault,
    /// Leave the grid, widget state, and storage exactly as they were.
    RejectImport,
    /// Position the widget outside the engine until it recovers.
    DirectPlacement,
    /// Skip the offending record or widget and keep the rest.
    DropRecord,
    /// Keep working from in-memory state; persistence resumes later.
    KeepInMemory,
    /// Refuse the command; nothing changed.
    RefuseCommand,
}

impl Error {
    /// Determine the fallback for this error.
    #[must_use]
    pub fn degradation(&self) -> DegradationAction {
        match self {
            Self::Validation(_) => DegradationAction::FallbackToDefault,
            Self::Import(_) => DegradationAction::RejectImport,
            Self::EngineDegraded(_) => DegradationAction::DirectPlacement,
            Self::Mount(_) | Self::UnknownWidgetType { .. } => DegradationAction::DropRecord,
            Self::StorageUnavailable(_) | Self::Io(_) => DegradationAction::KeepInMemory,
            #[cfg(feature = "runtime")]
            Self::Session(_) => DegradationAction::RefuseCommand,
            #[cfg(feature = "runtime")]
            Self::Config(_) => DegradationAction::FallbackToDefault,
        }
    }

    /// Error type label for log fields.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Import(_) => "import",
            Self::EngineDegraded(_) => "engine_degraded",
            Self::Mount(_) => "mount",
            Self::UnknownWidgetType { .. } => "unknown_widget_type",
            Self::StorageUnavailable(_) => "storage_unavailable",
            #[cfg(feature = "runtime")]
            Self::Session(_) => "session",
            #[cfg(feature = "runtime")]
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }

    /// Whether the user should be told (as opposed to a logged fallback).
    ///
    /// Only rejections of something the user just did qualify.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self.degradation(),
            DegradationAction::RejectImport | DegradationAction::RefuseCommand
        ) || matches!(self, Self::UnknownWidgetType { .. })
    }
}

// ── Display ─────────────────────────────────────────────────────────────

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Import(err) => write!(f, "{err}"),
            Self::EngineDegraded(err) => write!(f, "{err}"),
            Self::Mount(err) => write!(f, "{err}"),
            Self::UnknownWidgetType { type_name } => {
                write!(f, "unknown widget type {type_name:?}")
            }
            Self::StorageUnavailable(err) => write!(f, "{err}"),
            #[cfg(feature = "runtime")]
            Self::Session(err) => write!(f, "{err}"),
            #[cfg(feature = "runtime")]
            Self::Config(err) => write!(f, "configuration: {err}"),
            Self::Io(err) => write!(f, "I/O: {err}"),
        }
    }
}

impl fmt::Display for DegradationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FallbackToDefault => write!(f, "fallback_to_default"),
            Self::RejectImport => write!(f, "reject_import"),
            Self::DirectPlacement => write!(f, "direct_placement"),
            Self::DropRecord => write!(f, "drop_record"),
            Self::KeepInMemory => write!(f, "keep_in_memory"),
            Self::RefuseCommand => write!(f, "refuse_command"),
        }
    }
}

// ── std::error::Error ───────────────────────────────────────────────────

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Import(err) => Some(err),
            Self::EngineDegraded(err) => Some(err),
            Self::Mount(err) => Some(err),
            Self::UnknownWidgetType { .. } => None,
            Self::StorageUnavailable(err) => Some(err),
            #[cfg(feature = "runtime")]
            Self::Session(err) => Some(err),
            #[cfg(feature = "runtime")]
            Self::Config(err) => Some(err),
            Self::Io(err) => Some(err),
        }
    }
}

// ── From conversions ────────────────────────────────────────────────────

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<LayoutValidationError> for Error {
    fn from(err: LayoutValidationError) -> Self {
        Self::Validation(err)
    }
}

impl From<ImportError> for Error {
    fn from(err: ImportError) -> Self {
        Self::Import(err)
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        Self::EngineDegraded(err)
    }
}

impl From<MountError> for Error {
    fn from(err: MountError) -> Self {
        Self::Mount(err)
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(io) => Self::Io(io),
            other => Self::StorageUnavailable(other),
        }
    }
}

/// Session errors with a dedicated category are lifted into it.
#[cfg(feature = "runtime")]
impl From<SessionError> for Error {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Import(err) => Self::Import(err),
            SessionError::UnknownWidgetType { type_name } => Self::UnknownWidgetType { type_name },
            SessionError::MountFailed { id } => Self::Mount(MountError {
                id,
                reason: "factory refused the widget".into(),
            }),
            other => Self::Session(other),
        }
    }
}

#[cfg(feature = "runtime")]
impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(io) => Self::Io(io),
            other => Self::Config(other),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
