#![forbid(unsafe_code)]

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Dashgrid(#[from] dashgrid::Error),

    #[error("cannot read {path}: {source}")]
    ReadInput {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path}: layout rejected with {errors} error(s)")]
    InvalidLayout { path: PathBuf, errors: usize },

    #[error("{path}: {reason}")]
    MalformedLayout { path: PathBuf, reason: String },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl CliError {
    /// Rejected input exits with 2; everything else with 1.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidLayout { .. } | Self::MalformedLayout { .. } => 2,
            Self::Dashgrid(dashgrid::Error::Import(_) | dashgrid::Error::Validation(_)) => 2,
            _ => 1,
        }
    }

    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CliError;

    #[test]
    fn rejected_layouts_exit_with_two() {
        let error = CliError::InvalidLayout {
            path: "layout.json".into(),
            errors: 3,
        };
        assert_eq!(error.exit_code(), 2);
        assert_eq!(error.to_string(), "layout.json: layout rejected with 3 error(s)");
    }

    #[test]
    fn other_failures_exit_with_one() {
        let error = CliError::invalid("no widgets");
        assert_eq!(error.exit_code(), 1);
        assert!(error.to_string().contains("no widgets"));
    }
}
