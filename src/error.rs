//! Error types for wg-utils
//!
//! This module defines the error types used throughout the library.
//! We use `thiserror` for ergonomic error definitions and `anyhow` for
//! error propagation in the CLI binary.

use thiserror::Error;

/// Main error type for wg-utils operations
#[derive(Error, Debug)]
pub enum WgUtilsError {
    /// Settings file errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Peer store I/O errors, passed through unchanged
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An external command could not be run or exited unsuccessfully
    #[error("Command error: {0}")]
    Command(String),

    /// Key generation through the external `wg` tool failed
    #[error("Key generation error: {0}")]
    KeyGeneration(String),

    /// No usable host address is left in the subnet
    #[error("Address allocation exhausted: {0}")]
    AllocationExhausted(String),

    /// A peer with the same public key already exists
    #[error("Duplicate peer: public key {0} is already configured")]
    DuplicatePeer(String),

    /// An explicitly requested host address is already assigned
    #[error("Address in use: {0} is already assigned to another peer")]
    AddressInUse(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Platform detection and installation errors
    #[error("Platform error: {0}")]
    Platform(String),

    /// No supported package manager was found
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

/// Result type alias using WgUtilsError
pub type Result<T> = std::result::Result<T, WgUtilsError>;

impl From<serde_json::Error> for WgUtilsError {
    fn from(err: serde_json::Error) -> Self {
        WgUtilsError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for WgUtilsError {
    fn from(err: toml::de::Error) -> Self {
        WgUtilsError::Config(err.to_string())
    }
}
