use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{AppointmentId, UnknownStatus};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("resource {resource:?} already booked by {conflicting}; next free start {}", format_suggestions(.suggested))]
    Conflict {
        resource: String,
        conflicting: AppointmentId,
        suggested: Vec<DateTime<Utc>>,
    },

    #[error("appointment not found: {0}")]
    NotFound(AppointmentId),

    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

/// Coarse classification so callers can branch without matching payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    Conflict,
    NotFound,
    Store,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Store => "store",
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Unauthorized(_) => ErrorKind::Unauthorized,
            EngineError::Conflict { .. } => ErrorKind::Conflict,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Store(_) => ErrorKind::Store,
        }
    }

    /// Alternative start times carried by a conflict. Empty for other kinds.
    pub fn suggestions(&self) -> &[DateTime<Utc>] {
        match self {
            EngineError::Conflict { suggested, .. } => suggested,
            _ => &[],
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Missing(id) => EngineError::NotFound(id),
            other => EngineError::Store(other),
        }
    }
}

impl From<UnknownStatus> for EngineError {
    fn from(e: UnknownStatus) -> Self {
        EngineError::Validation(e.to_string())
    }
}

fn format_suggestions(suggested: &[DateTime<Utc>]) -> String {
    if suggested.is_empty() {
        return "unknown".into();
    }
    suggested
        .iter()
        .map(|t| t.to_rfc3339())
        .collect::<Vec<_>>()
        .join(", ")
}
