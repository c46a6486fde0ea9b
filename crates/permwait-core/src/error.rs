//! Error types for `permwait` core library.

use thiserror::Error;

/// Result type alias using `permwait` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `permwait` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// At least one requested permission was not granted.
    #[error("Permission request failed")]
    PermissionRequestFailed,

    /// Grant state was evaluated without a bound host context.
    ///
    /// This is a lifecycle bug on the caller side, not a denial.
    #[error("Can't check permissions without a host context")]
    MissingHostContext,

    /// A sub-screen is not attached to any top-level screen.
    #[error("Screen {0} is not attached to a host screen")]
    NotAttached(crate::host::HandleId),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
