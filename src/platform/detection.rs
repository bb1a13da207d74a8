//! Platform detection and WireGuard installation
//!
//! This module detects the operating system, privilege level and the
//! package manager that can install `wireguard-tools`.

use crate::error::{Result, WgUtilsError};
use crate::platform::{CommandExecutor, CommandSpec};
use serde::Serialize;
use tracing::{debug, info};

/// Package managers known to ship WireGuard tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    /// Ubuntu/Debian
    Apt,
    /// CentOS/RHEL
    Yum,
    /// Fedora
    Dnf,
    /// Arch Linux
    Pacman,
    /// Alpine Linux
    Apk,
    /// macOS Homebrew
    Homebrew,
    /// Windows Chocolatey
    Chocolatey,
    /// Windows Winget
    Winget,
}

impl PackageManager {
    /// Candidates for an OS (as in `std::env::consts::OS`), in detection order
    pub fn candidates(os: &str) -> &'static [PackageManager] {
        match os {
            "linux" => &[Self::Apt, Self::Yum, Self::Dnf, Self::Pacman, Self::Apk],
            "macos" => &[Self::Homebrew],
            "windows" => &[Self::Chocolatey, Self::Winget],
            _ => &[],
        }
    }

    /// Command that succeeds when this manager is installed
    pub fn detect_command(&self) -> CommandSpec {
        match self {
            Self::Chocolatey => CommandSpec::new("where").arg("choco"),
            Self::Winget => CommandSpec::new("where").arg("winget"),
            other => CommandSpec::new("which").arg(other.binary()),
        }
    }

    fn binary(&self) -> &'static str {
        match self {
            Self::Apt => "apt",
            Self::Yum => "yum",
            Self::Dnf => "dnf",
            Self::Pacman => "pacman",
            Self::Apk => "apk",
            Self::Homebrew => "brew",
            Self::Chocolatey => "choco",
            Self::Winget => "winget",
        }
    }

    /// Shell command that installs WireGuard tools
    pub fn install_command(&self) -> &'static str {
        match self {
            Self::Apt => "sudo apt update && sudo apt install -y wireguard",
            Self::Yum => "sudo yum install -y epel-release && sudo yum install -y wireguard-tools",
            Self::Dnf => "sudo dnf install -y wireguard-tools",
            Self::Pacman => "sudo pacman -S --noconfirm wireguard-tools",
            Self::Apk => "sudo apk add --no-cache wireguard-tools",
            Self::Homebrew => "brew install wireguard-tools",
            Self::Chocolatey => "choco install wireguard",
            Self::Winget => "winget install WireGuard.WireGuard",
        }
    }

    /// Human-readable platform name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Apt => "Ubuntu/Debian",
            Self::Yum => "CentOS/RHEL",
            Self::Dnf => "Fedora",
            Self::Pacman => "Arch Linux",
            Self::Apk => "Alpine Linux",
            Self::Homebrew => "macOS (Homebrew)",
            Self::Chocolatey => "Windows (Chocolatey)",
            Self::Winget => "Windows (Winget)",
        }
    }
}

/// Platform information
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformInfo {
    /// Operating system name
    pub os: String,
    /// Whether running with elevated privileges
    pub is_privileged: bool,
    /// First package manager found, if any
    pub package_manager: Option<PackageManager>,
}

impl PlatformInfo {
    /// Get a human-readable platform description
    pub fn description(&self) -> String {
        match self.package_manager {
            Some(pm) => pm.display_name().to_string(),
            None => self.os.clone(),
        }
    }
}

/// How to install WireGuard tools on this machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallInstructions {
    /// Operating system name
    pub platform: String,
    /// Detected package manager
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_manager: Option<PackageManager>,
    /// Install command to run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Human-readable platform name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Whether an automatic install is possible
    pub supported: bool,
}

/// Generic manual install hints, used in error messages
pub const MANUAL_INSTALL_HINT: &str = "Please install WireGuard tools:\n  \
     Ubuntu/Debian: sudo apt install wireguard\n  \
     CentOS/RHEL: sudo yum install wireguard-tools\n  \
     Fedora: sudo dnf install wireguard-tools\n  \
     macOS: brew install wireguard-tools\n  \
     Other: https://www.wireguard.com/install/";

/// Detect the current platform environment
pub async fn detect_environment<E: CommandExecutor + ?Sized>(executor: &E) -> PlatformInfo {
    detect_for_os(executor, std::env::consts::OS).await
}

/// Detect the package manager for a given OS name
pub async fn detect_for_os<E: CommandExecutor + ?Sized>(executor: &E, os: &str) -> PlatformInfo {
    let mut package_manager = None;

    for candidate in PackageManager::candidates(os) {
        match executor.run(&candidate.detect_command()).await {
            Ok(output) if output.success() => {
                debug!("Found package manager {:?}", candidate);
                package_manager = Some(*candidate);
                break;
            }
            _ => debug!("Package manager {:?} not available", candidate),
        }
    }

    PlatformInfo {
        os: os.to_string(),
        is_privileged: is_privileged(),
        package_manager,
    }
}

/// Build install instructions from detected platform info
pub fn install_instructions(info: &PlatformInfo) -> InstallInstructions {
    InstallInstructions {
        platform: info.os.clone(),
        package_manager: info.package_manager,
        command: info.package_manager.map(|pm| pm.install_command().to_string()),
        name: info.package_manager.map(|pm| pm.display_name().to_string()),
        supported: info.package_manager.is_some(),
    }
}

/// Run the install command for the detected package manager
///
/// The caller decides whether installation is needed at all.
pub async fn install_with<E: CommandExecutor + ?Sized>(
    executor: &E,
    info: &PlatformInfo,
) -> Result<()> {
    let pm = info.package_manager.ok_or_else(|| {
        WgUtilsError::UnsupportedPlatform(format!("{}. {}", info.os, MANUAL_INSTALL_HINT))
    })?;

    info!("Installing WireGuard on {}...", pm.display_name());
    let spec = shell_command(&info.os, pm.install_command());
    executor.run(&spec).await?.into_stdout(&spec).map_err(|e| {
        WgUtilsError::Platform(format!(
            "Failed to install WireGuard: {}\nCommand: {}\nPlease install WireGuard manually or check your permissions.",
            e,
            pm.install_command()
        ))
    })?;

    Ok(())
}

fn shell_command(os: &str, command: &str) -> CommandSpec {
    if os == "windows" {
        CommandSpec::new("cmd").args(["/C", command])
    } else {
        CommandSpec::new("sh").args(["-c", command])
    }
}

/// Check if running with elevated privileges
pub fn is_privileged() -> bool {
    #[cfg(unix)]
    {
        // Check if running as root (UID 0)
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(not(unix))]
    {
        false
    }
}
