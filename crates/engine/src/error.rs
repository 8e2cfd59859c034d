//! The module contains the errors the engine can return.
//!
//! Every variant maps to a stable [`ErrorKind`] so callers (HTTP handlers,
//! the CLI) can translate failures without matching on messages:
//!
//! - [`Validation`] malformed or inconsistent input (bad ids, split sums).
//! - [`NotFound`] a referenced group, expense, split or user is missing.
//! - [`Forbidden`] the caller is not admin/member/party where required.
//! - [`Consistency`] an internal ledger invariant does not hold (a bug).
//!
//!  [`Validation`]: EngineError::Validation
//!  [`NotFound`]: EngineError::NotFound
//!  [`Forbidden`]: EngineError::Forbidden
//!  [`Consistency`]: EngineError::Consistency
use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("\"{0}\" not found!")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("Ledger inconsistency: {0}")]
    Consistency(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

/// Stable, caller-facing classification of an [`EngineError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    Conflict,
    Consistency,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::Conflict => "conflict",
            Self::Consistency => "consistency",
            Self::Internal => "internal",
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::ExistingKey(_) => ErrorKind::Conflict,
            Self::Consistency(_) => ErrorKind::Consistency,
            Self::Database(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to show to end users.
    ///
    /// Database and consistency failures are logged and replaced with a
    /// generic text so storage details never leak.
    pub fn public_message(&self) -> String {
        match self {
            Self::Database(db_err) => {
                tracing::error!("database error: {db_err}");
                "internal error".to_string()
            }
            Self::Consistency(detail) => {
                tracing::error!("ledger inconsistency: {detail}");
                "internal error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (Self::NotFound(a), Self::NotFound(b)) => a == b,
            (Self::Forbidden(a), Self::Forbidden(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::Consistency(a), Self::Consistency(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
