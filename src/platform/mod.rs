//! Platform-specific implementations
//!
//! This module provides the command execution capability used for every
//! external tool, plus platform and package-manager detection for
//! installing WireGuard.

pub(crate) mod command;
pub mod detection;

pub use command::{CommandExecutor, CommandOutput, CommandSpec, SystemExecutor};
pub use detection::{
    detect_environment, install_instructions, InstallInstructions, PackageManager, PlatformInfo,
};
