//! Best-effort version extraction from installer output

use once_cell::sync::Lazy;
use regex::Regex;

use super::ManagerKind;

/// Returned when no version can be found in the output
pub const FALLBACK_VERSION: &str = "installed";

const VERSION: &str = r"\d+\.\d+\.\d+[^\s)]*";

fn compile(pattern: &str) -> Regex {
    Regex::new(&pattern.replace("{version}", VERSION)).expect("version pattern is valid")
}

static PIP_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        compile(r"Successfully installed .* (\S+)-({version})"),
        compile(r"Successfully installed (\S+)-({version})"),
        compile(r"Requirement already satisfied: (\S+)==({version})"),
        compile(r"Requirement already satisfied: (\S+) in .*\(({version})\)"),
    ]
});

static NPM_PATTERNS: Lazy<Vec<Regex>> =
    Lazy::new(|| vec![compile(r"@({version})"), compile(r"({version})")]);

static GENERIC_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| vec![compile(r"({version})")]);

fn patterns_for(manager: ManagerKind) -> &'static [Regex] {
    match manager {
        ManagerKind::Pip => &PIP_PATTERNS,
        ManagerKind::Npm => &NPM_PATTERNS,
        ManagerKind::Apt
        | ManagerKind::Dnf
        | ManagerKind::Yum
        | ManagerKind::Zypper
        | ManagerKind::Brew => &GENERIC_PATTERNS,
        _ => &[],
    }
}

/// Extract the installed version from a manager's stdout.
///
/// Patterns are tried in order and the last capture group of the first match
/// wins. Falls back to `"installed"`.
pub fn extract_package_version(output: &str, manager: ManagerKind) -> String {
    for pattern in patterns_for(manager) {
        if let Some(captures) = pattern.captures(output) {
            if let Some(version) = captures.iter().skip(1).flatten().last() {
                return version.as_str().to_string();
            }
        }
    }
    FALLBACK_VERSION.to_string()
}
