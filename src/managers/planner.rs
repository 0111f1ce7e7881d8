//! Ordering of candidate managers for one package

use super::registry::descriptor;
use super::{DetectionMap, ManagerKind, OperationKind};
use crate::error::CrossfireError;
use crate::utils::Platform;

/// Ordered managers to try, plus non-fatal warnings for the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePlan {
    pub candidates: Vec<ManagerKind>,
    pub warnings: Vec<String>,
}

/// Build the ordered candidate list for `package`.
///
/// Only managers present in `detection` are returned. A usable
/// `preferred` manager is moved to the front without disturbing the relative
/// order of the rest; an unusable one is ignored with a warning.
pub fn plan(
    package: &str,
    detection: &DetectionMap,
    preferred: Option<ManagerKind>,
    operation: OperationKind,
    platform: Platform,
) -> Result<CandidatePlan, CrossfireError> {
    let mut candidates: Vec<ManagerKind> = default_order(platform)
        .into_iter()
        .filter(|kind| detection.is_present(*kind))
        .filter(|kind| descriptor(*kind).supports(operation))
        .collect();

    if let Some(hinted) = name_hint(package) {
        move_to_front(&mut candidates, hinted);
    }

    let mut warnings = Vec::new();
    if let Some(preferred) = preferred {
        if candidates.contains(&preferred) {
            move_to_front(&mut candidates, preferred);
        } else {
            let available: Vec<&str> = candidates.iter().map(ManagerKind::as_str).collect();
            warnings.push(format!(
                "--manager '{}' not available. Available: {}",
                preferred,
                if available.is_empty() {
                    "none".to_string()
                } else {
                    available.join(", ")
                }
            ));
        }
    }

    if candidates.is_empty() {
        return Err(CrossfireError::NoManagersAvailable);
    }

    Ok(CandidatePlan {
        candidates,
        warnings,
    })
}

/// Heuristic default order: platform-native first, then cross-platform system
/// managers, then language managers
pub fn default_order(platform: Platform) -> Vec<ManagerKind> {
    use ManagerKind::*;

    let native: &[ManagerKind] = match platform {
        Platform::Linux => &[Apt, Dnf, Yum, Pacman, Zypper, Apk],
        Platform::MacOS => &[Brew],
        Platform::Windows => &[Winget, Choco],
        Platform::Unknown => &[],
    };

    let mut order: Vec<ManagerKind> = native.to_vec();
    for kind in [Brew, Snap, Flatpak, Pip, Npm] {
        if !order.contains(&kind) {
            order.push(kind);
        }
    }
    // Foreign-platform managers last; detection normally filters them out
    for kind in ManagerKind::ALL {
        if !order.contains(&kind) {
            order.push(kind);
        }
    }
    order
}

/// A manager strongly implied by the shape of the package name
fn name_hint(package: &str) -> Option<ManagerKind> {
    if package.starts_with('@') && package.contains('/') {
        return Some(ManagerKind::Npm);
    }

    let segments: Vec<&str> = package.split('.').collect();
    if segments.len() >= 3
        && segments.iter().all(|s| !s.is_empty())
        && segments[0].chars().all(|c| c.is_ascii_lowercase())
        && !package.contains('/')
    {
        return Some(ManagerKind::Flatpak);
    }

    None
}

fn move_to_front(candidates: &mut Vec<ManagerKind>, kind: ManagerKind) {
    if let Some(pos) = candidates.iter().position(|c| *c == kind) {
        let item = candidates.remove(pos);
        candidates.insert(0, item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux_map() -> DetectionMap {
        DetectionMap::from_present([
            ManagerKind::Apt,
            ManagerKind::Snap,
            ManagerKind::Pip,
            ManagerKind::Npm,
        ])
    }

    #[test]
    fn test_plan_only_returns_present_managers() {
        let detection = linux_map();
        let plan = plan(
            "ripgrep",
            &detection,
            None,
            OperationKind::Install,
            Platform::Linux,
        )
        .unwrap();
        assert!(plan.candidates.iter().all(|m| detection.is_present(*m)));
        assert_eq!(
            plan.candidates,
            vec![
                ManagerKind::Apt,
                ManagerKind::Snap,
                ManagerKind::Pip,
                ManagerKind::Npm
            ]
        );
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_preferred_manager_moves_to_front_stably() {
        let plan = plan(
            "requests",
            &linux_map(),
            Some(ManagerKind::Pip),
            OperationKind::Install,
            Platform::Linux,
        )
        .unwrap();
        assert_eq!(
            plan.candidates,
            vec![
                ManagerKind::Pip,
                ManagerKind::Apt,
                ManagerKind::Snap,
                ManagerKind::Npm
            ]
        );
    }

    #[test]
    fn test_absent_preferred_manager_warns_but_plans() {
        let plan = plan(
            "wget",
            &linux_map(),
            Some(ManagerKind::Brew),
            OperationKind::Install,
            Platform::Linux,
        )
        .unwrap();
        assert_eq!(plan.candidates[0], ManagerKind::Apt);
        assert_eq!(plan.warnings.len(), 1);
        assert!(plan.warnings[0].contains("brew"));
    }

    #[test]
    fn test_no_managers_is_an_error() {
        let result = plan(
            "wget",
            &DetectionMap::new(),
            None,
            OperationKind::Remove,
            Platform::Linux,
        );
        assert!(matches!(result, Err(CrossfireError::NoManagersAvailable)));
    }

    #[test]
    fn test_scoped_npm_package_prefers_npm() {
        let plan = plan(
            "@angular/cli",
            &linux_map(),
            None,
            OperationKind::Install,
            Platform::Linux,
        )
        .unwrap();
        assert_eq!(plan.candidates[0], ManagerKind::Npm);
    }

    #[test]
    fn test_preferred_overrides_name_hint() {
        let plan = plan(
            "@angular/cli",
            &linux_map(),
            Some(ManagerKind::Apt),
            OperationKind::Install,
            Platform::Linux,
        )
        .unwrap();
        assert_eq!(plan.candidates[0], ManagerKind::Apt);
        assert_eq!(plan.candidates[1], ManagerKind::Npm);
    }

    #[test]
    fn test_flatpak_app_id_hint() {
        let detection = DetectionMap::from_present([ManagerKind::Apt, ManagerKind::Flatpak]);
        let plan = plan(
            "org.gimp.GIMP",
            &detection,
            None,
            OperationKind::Install,
            Platform::Linux,
        )
        .unwrap();
        assert_eq!(plan.candidates[0], ManagerKind::Flatpak);
    }

    #[test]
    fn test_macos_order_starts_with_brew() {
        let order = default_order(Platform::MacOS);
        assert_eq!(order[0], ManagerKind::Brew);
        assert_eq!(order.iter().filter(|k| **k == ManagerKind::Brew).count(), 1);
        assert_eq!(order.len(), ManagerKind::ALL.len());
    }
}
