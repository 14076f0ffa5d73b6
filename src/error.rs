//! Error types for opswalk.
//!
//! Only inventory and configuration problems surface to callers as hard
//! errors. Everything that goes wrong after the host drivers start (transport
//! failures, operation failures, timeouts) is folded into [`Response`]
//! records instead, so a single bad host can never abort a run.
//!
//! [`Response`]: crate::response::Response

use thiserror::Error;

/// Result type alias for opswalk operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for opswalk.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Inventory Errors
    // ========================================================================
    /// Inventory failed to load or validate.
    #[error(transparent)]
    Inventory(#[from] crate::inventory::InventoryError),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // ========================================================================
    // IO / Serialization Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ========================================================================
    // Other Errors
    // ========================================================================
    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Inventory(_) | Error::Config(_) | Error::TomlParse(_) => 2,
            _ => 1,
        }
    }
}
