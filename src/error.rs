//! Error type shared by the export service, the HTTP client and the wizard.

use axum::http::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExportError>;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("Invalid dataset descriptor {dataset}: {reason}")]
    InvalidDataset { dataset: String, reason: String },

    #[error("Unknown format: {0}")]
    UnknownFormat(String),

    #[error("Format {format} is not available for dataset {dataset}")]
    UnsupportedFormat { dataset: String, format: String },

    #[error("Unknown field {field} for dataset {dataset}")]
    UnknownField { dataset: String, field: String },

    #[error("Required field {0} must be selected")]
    MissingRequiredField(String),

    #[error("Unknown filter {filter} for dataset {dataset}")]
    UnknownFilter { dataset: String, filter: String },

    #[error("Unknown option {option} for filter {filter}")]
    UnknownFilterOption { filter: String, option: String },

    #[error("Invalid date range: {start} is after {end}")]
    InvalidDateRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    /// A wizard action was attempted before its prerequisites were chosen.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Export not found: {0}")]
    JobNotFound(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Export API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Export {0} is still processing, check back later")]
    PollTimeout(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Failed to render export: {0}")]
    Render(String),
}

impl ExportError {
    /// HTTP status the service answers with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ExportError::UnknownDataset(_) | ExportError::JobNotFound(_) => StatusCode::NOT_FOUND,
            ExportError::UnknownFormat(_)
            | ExportError::UnsupportedFormat { .. }
            | ExportError::UnknownField { .. }
            | ExportError::MissingRequiredField(_)
            | ExportError::UnknownFilter { .. }
            | ExportError::UnknownFilterOption { .. }
            | ExportError::InvalidDateRange { .. }
            | ExportError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ExportError::Transport(_) | ExportError::Api { .. } => StatusCode::BAD_GATEWAY,
            ExportError::PollTimeout(_) => StatusCode::ACCEPTED,
            ExportError::InvalidDataset { .. }
            | ExportError::Cancelled
            | ExportError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for errors raised locally before any request is sent.
    pub fn is_validation(&self) -> bool {
        self.status_code() == StatusCode::UNPROCESSABLE_ENTITY
    }
}

impl From<ExportError> for (StatusCode, String) {
    fn from(err: ExportError) -> Self {
        (err.status_code(), err.to_string())
    }
}
