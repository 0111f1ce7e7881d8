//! Native package managers: registry, detection, planning and execution

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CrossfireError;

pub mod detection;
pub mod executor;
pub mod planner;
pub mod registry;
pub mod version;

pub use detection::{list_managers_status, Detect, DetectionMap, ManagerStatus, SystemDetector};
pub use executor::{
    AttemptStatus, InstallResult, ManagerSetupOutcome, OperationAttempt, OperationExecutor,
    OperationOutcome, OperationTimeouts, PackageResult, RemoveResult,
};
pub use planner::{plan, CandidatePlan};
pub use registry::{descriptor, ManagerDescriptor, ManagerSetup, Probe, REGISTRY};
pub use version::extract_package_version;

/// Every package manager the orchestrator knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerKind {
    Pip,
    Npm,
    Brew,
    Apt,
    Dnf,
    Yum,
    Pacman,
    Zypper,
    Apk,
    Choco,
    Winget,
    Snap,
    Flatpak,
}

impl ManagerKind {
    pub const ALL: [ManagerKind; 13] = [
        ManagerKind::Pip,
        ManagerKind::Npm,
        ManagerKind::Brew,
        ManagerKind::Apt,
        ManagerKind::Dnf,
        ManagerKind::Yum,
        ManagerKind::Pacman,
        ManagerKind::Zypper,
        ManagerKind::Apk,
        ManagerKind::Choco,
        ManagerKind::Winget,
        ManagerKind::Snap,
        ManagerKind::Flatpak,
    ];

    /// Stable lowercase key used in config, records and cache keys
    pub fn as_str(&self) -> &'static str {
        match self {
            ManagerKind::Pip => "pip",
            ManagerKind::Npm => "npm",
            ManagerKind::Brew => "brew",
            ManagerKind::Apt => "apt",
            ManagerKind::Dnf => "dnf",
            ManagerKind::Yum => "yum",
            ManagerKind::Pacman => "pacman",
            ManagerKind::Zypper => "zypper",
            ManagerKind::Apk => "apk",
            ManagerKind::Choco => "choco",
            ManagerKind::Winget => "winget",
            ManagerKind::Snap => "snap",
            ManagerKind::Flatpak => "flatpak",
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            ManagerKind::Pip => "pip (Python)",
            ManagerKind::Npm => "npm (Node.js)",
            ManagerKind::Brew => "Homebrew",
            ManagerKind::Apt => "APT",
            ManagerKind::Dnf => "DNF",
            ManagerKind::Yum => "YUM",
            ManagerKind::Pacman => "Pacman",
            ManagerKind::Zypper => "Zypper",
            ManagerKind::Apk => "APK",
            ManagerKind::Choco => "Chocolatey",
            ManagerKind::Winget => "winget",
            ManagerKind::Snap => "Snap",
            ManagerKind::Flatpak => "Flatpak",
        }
    }
}

impl fmt::Display for ManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManagerKind {
    type Err = CrossfireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pip" | "pip3" | "pypi" => Ok(ManagerKind::Pip),
            "npm" => Ok(ManagerKind::Npm),
            "brew" | "homebrew" => Ok(ManagerKind::Brew),
            "apt" | "apt-get" => Ok(ManagerKind::Apt),
            "dnf" => Ok(ManagerKind::Dnf),
            "yum" => Ok(ManagerKind::Yum),
            "pacman" => Ok(ManagerKind::Pacman),
            "zypper" => Ok(ManagerKind::Zypper),
            "apk" => Ok(ManagerKind::Apk),
            "choco" | "chocolatey" => Ok(ManagerKind::Choco),
            "winget" => Ok(ManagerKind::Winget),
            "snap" => Ok(ManagerKind::Snap),
            "flatpak" => Ok(ManagerKind::Flatpak),
            _ => Err(CrossfireError::UnknownManager {
                name: s.to_string(),
            }),
        }
    }
}

/// Which direction an operation goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Install,
    Remove,
}

impl OperationKind {
    pub fn verb(&self) -> &'static str {
        match self {
            OperationKind::Install => "install",
            OperationKind::Remove => "remove",
        }
    }
}
