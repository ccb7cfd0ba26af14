//! Error types for the backup orchestration engine.

use thiserror::Error;

/// The error taxonomy exposed at the core boundary.
///
/// Every variant maps to exactly one of the recovery behaviors described in
/// the component design: some are always surfaced verbatim, some attach a
/// warning to an otherwise-successful operation, some force cleanup of a
/// partial artifact before returning.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation error: {0}")]
    Validation(String),

    /// Restore artifact's detected shape is incompatible with the target; no
    /// partial restore occurs.
    #[error("compatibility reject: {0}")]
    CompatibilityReject(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    /// Database-adapter subprocess exited non-zero; carries a captured
    /// stderr snippet.
    #[error("adapter failure ({adapter}): {message}")]
    AdapterFailure { adapter: String, message: String },

    #[error("storage provider failure: {0}")]
    ProviderFailure(String),

    #[error("encryption not configured: {0}")]
    EncryptionNotConfigured(String),
}

pub type Result<T> = std::result::Result<T, BackupError>;

/// A non-fatal warning attached to an otherwise-successful operation.
///
/// Used for the `CompatibilityWarn` kind from the error taxonomy (e.g. a
/// MariaDB dump restored into a MySQL target): the operation still runs to
/// completion, but the warning is recorded in the run's details.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CompatibilityWarning(pub String);
