//! TOML settings for the wg-utils binary
//!
//! Settings say which interface and config file to manage, which subnet
//! peers are allocated from, and where the WireGuard tools live. Every
//! field has a default, so an empty or missing settings file is valid.

use crate::config::validation::{validate_interface_name, validate_subnet};
use crate::error::{Result, WgUtilsError};
use crate::platform::SystemExecutor;
use crate::wireguard::allocator::{DEFAULT_SERVER_ADDRESS, DEFAULT_SUBNET};
use crate::wireguard::{AddressAllocator, DuplicatePolicy, DEFAULT_WG_BINARY, DEFAULT_WG_QUICK_BINARY};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Settings file used when none is given
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/wg-utils/config.toml";

/// Environment variable overriding the default settings path
pub const SETTINGS_PATH_ENV: &str = "WG_UTILS_CONFIG";

/// wg-utils settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// WireGuard interface name
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Path of the interface config file; `/etc/wireguard/<interface>.conf` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,

    /// Subnet new peers are allocated from
    #[serde(default = "default_subnet")]
    pub subnet: String,

    /// Server address inside the subnet, never handed to a peer
    #[serde(default = "default_server_address")]
    pub server_address: String,

    /// Refuse to add a peer whose public key is already present
    #[serde(default = "default_true")]
    pub reject_duplicate_keys: bool,

    /// Run `wg syncconf` after every peer add/delete
    #[serde(default)]
    pub sync_after_change: bool,

    /// External tool settings
    #[serde(default)]
    pub tools: ToolSettings,
}

/// Where the WireGuard tools live and how long they may run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSettings {
    /// `wg` binary name or path
    #[serde(default = "default_wg")]
    pub wg: String,

    /// `wg-quick` binary name or path
    #[serde(default = "default_wg_quick")]
    pub wg_quick: String,

    /// Kill external commands after this many seconds (0 disables)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            wg: default_wg(),
            wg_quick: default_wg_quick(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            config_path: None,
            subnet: default_subnet(),
            server_address: default_server_address(),
            reject_duplicate_keys: true,
            sync_after_change: false,
            tools: ToolSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            WgUtilsError::Config(format!("Failed to read settings file {:?}: {}", path, e))
        })?;

        Self::parse(&contents)
    }

    /// Parse settings from a TOML string
    pub fn parse(toml: &str) -> Result<Self> {
        toml::from_str(toml)
            .map_err(|e| WgUtilsError::Config(format!("Failed to parse TOML settings: {}", e)))
    }

    /// Resolve and load settings
    ///
    /// An explicit path must exist. Otherwise `WG_UTILS_CONFIG` or the
    /// default path is tried, falling back to defaults when that file is
    /// absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let settings = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = std::env::var(SETTINGS_PATH_ENV)
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_SETTINGS_PATH));
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    debug!("No settings file at {:?}, using defaults", path);
                    Self::default()
                }
            }
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        validate_interface_name(&self.interface)
            .and_then(|_| self.allocator().map(|_| ()))
            .map_err(|e| WgUtilsError::Config(e.to_string()))?;

        if self.tools.wg.is_empty() || self.tools.wg_quick.is_empty() {
            return Err(WgUtilsError::Config(
                "Tool binary names cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Config file to manage
    pub fn config_path(&self) -> PathBuf {
        match &self.config_path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(format!("/etc/wireguard/{}.conf", self.interface)),
        }
    }

    /// Allocator for the configured subnet and server address
    pub fn allocator(&self) -> Result<AddressAllocator> {
        AddressAllocator::from_settings(&self.subnet, &self.server_address)
    }

    /// Duplicate-key policy
    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        if self.reject_duplicate_keys {
            DuplicatePolicy::Reject
        } else {
            DuplicatePolicy::Allow
        }
    }

    /// Prefix length of the configured subnet
    pub fn prefix_len(&self) -> Result<u8> {
        Ok(validate_subnet(&self.subnet)?.prefix_len())
    }

    /// Executor honoring the configured timeout
    pub fn executor(&self) -> SystemExecutor {
        match self.tools.timeout_secs {
            0 => SystemExecutor::new(),
            secs => SystemExecutor::new().with_timeout(Duration::from_secs(secs)),
        }
    }
}

// Default value functions for serde
fn default_interface() -> String {
    "wg0".to_string()
}

fn default_subnet() -> String {
    DEFAULT_SUBNET.to_string()
}

fn default_server_address() -> String {
    DEFAULT_SERVER_ADDRESS.to_string()
}

fn default_true() -> bool {
    true
}

fn default_wg() -> String {
    DEFAULT_WG_BINARY.to_string()
}

fn default_wg_quick() -> String {
    DEFAULT_WG_QUICK_BINARY.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}
