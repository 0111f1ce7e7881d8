use std::path::PathBuf;

/// Errors that cross module boundaries as values.
///
/// External command and network failures are never represented here; they are
/// recorded as attempt/backend data. These variants cover absence conditions and
/// contract violations.
#[derive(Debug, thiserror::Error)]
pub enum CrossfireError {
    #[error("No supported package managers are available on this system")]
    NoManagersAvailable,

    #[error("Unknown package manager: {name}")]
    UnknownManager { name: String },

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("Requirements file not found: {path}")]
    RequirementsNotFound { path: PathBuf },

    #[error("No valid packages found in {path}")]
    EmptyRequirements { path: PathBuf },

    #[error("HTTP request to {url} failed: {message}")]
    Http { url: String, message: String },
}

/// Truncate a message to at most `max` characters, marking the cut with "...".
pub fn truncate_message(message: &str, max: usize) -> String {
    let trimmed = message.trim();
    if trimmed.chars().count() <= max {
        return trimmed.to_string();
    }

    let keep = max.saturating_sub(3);
    let mut truncated: String = trimmed.chars().take(keep).collect();
    truncated.push_str("...");
    truncated
}
