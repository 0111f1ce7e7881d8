use serde::{Deserialize, Serialize};

/// Supported operating system platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    MacOS,
    Linux,
    Windows,
    Unknown,
}

impl Platform {
    /// Detect the current platform
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOS
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Unknown
        }
    }

    /// Get the display name for the platform
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::MacOS => "macOS",
            Platform::Linux => "Linux",
            Platform::Windows => "Windows",
            Platform::Unknown => "Unknown",
        }
    }

    /// Whether system package managers on this platform need privilege
    /// escalation for the current process
    pub fn uses_sudo(&self) -> bool {
        self.needs_escalation(is_root())
    }

    /// Only Linux system managers escalate, and never from a root process
    pub fn needs_escalation(&self, running_as_root: bool) -> bool {
        match self {
            Platform::Linux => !running_as_root,
            Platform::MacOS | Platform::Windows | Platform::Unknown => false,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Check if a binary is available in PATH
pub fn is_binary_available(binary_name: &str) -> bool {
    which::which(binary_name).is_ok()
}

/// Whether the process runs with an effective uid of 0
#[cfg(unix)]
pub fn is_root() -> bool {
    !matches!(sudo::check(), sudo::RunningAs::User)
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    false
}
