//! Error types for pipelog

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Pipelog error types
#[derive(Error, Debug)]
pub enum Error {
    /// Required backend parameter missing or invalid.
    ///
    /// Raised at construction time, before any connection attempt.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed call arguments (empty run-id list, info key without the
    /// "type" marker). Fatal to the call; the caller must fix its input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The provider registry was configured a second time
    #[error("Logging registry is already configured")]
    AlreadyConfigured,

    /// Backend I/O failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Malformed analytics input
    #[error("Parse error: {0}")]
    Parse(String),
}
