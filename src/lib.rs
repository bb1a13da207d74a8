//! wg-utils: WireGuard peer provisioning utilities
//!
//! This library reads and writes WireGuard INI-style configuration files,
//! allocates IPv4 tunnel addresses for new peers, and adds or removes
//! `[Peer]` entries in a persisted config. Key generation and live-apply
//! are delegated to the external `wg` and `wg-quick` tools.
//!
//! # Modules
//!
//! - `config`: Config document model, parser, serializer and validation
//! - `wireguard`: Address allocation, peer mutation, keys and tool front-end
//! - `platform`: Command execution and platform/package-manager detection
//! - `settings`: TOML settings for the `wg-utils` binary
//! - `error`: Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod platform;
pub mod settings;
pub mod wireguard;

// Re-export commonly used types
pub use config::{ConfigDocument, PeerEntry, Section};
pub use error::{Result, WgUtilsError};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
