//! Human-readable rendering of results and reports

use console::style;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::batch::BatchReport;
use crate::display_println;
use crate::managers::version::FALLBACK_VERSION;
use crate::managers::{
    ManagerKind, ManagerSetupOutcome, ManagerStatus, OperationKind, PackageResult,
};
use crate::search::SearchOutcome;
use crate::tracking::TrackedPackage;

const DESCRIPTION_PREVIEW_CHARS: usize = 60;

/// `1m 05s` above a minute, `4.2s` below
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

fn past_tense(operation: OperationKind) -> &'static str {
    match operation {
        OperationKind::Install => "Installed",
        OperationKind::Remove => "Removed",
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > DESCRIPTION_PREVIEW_CHARS {
        let truncated: String = text.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
        format!("{truncated}...")
    } else {
        text.to_string()
    }
}

/// One line describing a single package result
pub fn format_package_line(result: &PackageResult) -> String {
    if result.success {
        let via = result
            .manager
            .map(|manager| format!(" via {}", manager.display_name()))
            .unwrap_or_default();
        let version = result
            .version
            .as_deref()
            .filter(|version| {
                !version.is_empty() && *version != "unknown" && *version != FALLBACK_VERSION
            })
            .map(|version| format!(" {version}"))
            .unwrap_or_default();
        format!(
            "{} {} {}{}{} {}",
            style("✅").green(),
            past_tense(result.operation),
            style(&result.package).cyan().bold(),
            style(version).dim(),
            via,
            style(format!("({})", format_duration(result.duration))).dim()
        )
    } else {
        format!(
            "{} {} - {}",
            style("❌").red(),
            style(&result.package).red(),
            style(result.error.as_deref().unwrap_or("unknown error")).dim()
        )
    }
}

pub fn print_package_result(result: &PackageResult) {
    display_println!("{}", format_package_line(result));
}

pub fn print_batch_report(report: &BatchReport) {
    display_println!(
        "\n{} Batch {} complete",
        style("📊").blue(),
        style(report.operation.verb()).cyan().bold()
    );
    display_println!(
        "✅ Succeeded: {}",
        style(report.success.len()).green().bold()
    );

    if !report.failed.is_empty() {
        display_println!("❌ Failed: {}", style(report.failed.len()).red().bold());
        for failed in &report.failed {
            display_println!(
                "  • {} - {}",
                style(&failed.package).red(),
                style(failed.error.as_deref().unwrap_or("unknown error")).dim()
            );
        }
    }

    if !report.cancelled.is_empty() {
        display_println!(
            "⏭️  Cancelled: {} ({})",
            style(report.cancelled.len()).yellow().bold(),
            style(report.cancelled.join(", ")).dim()
        );
    }

    display_println!(
        "📈 Success rate: {:.1}% of {}",
        report.success_rate,
        report.packages_processed
    );
    display_println!("⏱️  Total time: {}", format_duration(report.total_time));
}

pub fn print_search_outcome(query: &str, outcome: &SearchOutcome) {
    if outcome.results.is_empty() {
        display_println!(
            "{} No packages found for '{}'",
            style("ℹ️").blue(),
            style(query).cyan()
        );
    } else {
        let source = if outcome.from_cache { " (cached)" } else { "" };
        display_println!(
            "{} {} {}{}",
            style("📦").green(),
            style("Found").green().bold(),
            style(format!("{} packages", outcome.results.len())).dim(),
            style(source).dim()
        );
        for (i, result) in outcome.results.iter().enumerate() {
            display_println!(
                "{:2}. {} {} [{}] {} {}",
                i + 1,
                style(&result.name).cyan().bold(),
                style(&result.version).dim(),
                style(result.manager).blue(),
                preview(&result.description),
                style(format!("({:.0})", result.relevance_score)).dim()
            );
        }
    }

    for status in outcome.backends.iter().filter(|status| !status.ok) {
        display_println!(
            "  {} {}: {}",
            style("⚠️").yellow(),
            status.manager.display_name(),
            style(status.error.as_deref().unwrap_or("failed")).dim()
        );
    }
}

pub fn print_manager_statuses(statuses: &BTreeMap<ManagerKind, ManagerStatus>) {
    display_println!("{}", style("Package managers").cyan().bold());
    for (manager, status) in statuses {
        let marker = match status {
            ManagerStatus::Installed => style("✓").green(),
            ManagerStatus::NotInstalled => style("✗").red(),
            ManagerStatus::Unsupported(_) => style("-").dim(),
        };
        display_println!("  {} {:<20} {}", marker, manager.display_name(), style(status).dim());
    }
}

/// One line describing an attempt to install a package manager
pub fn format_setup_line(manager: ManagerKind, outcome: &ManagerSetupOutcome) -> String {
    let name = manager.display_name();
    match outcome {
        ManagerSetupOutcome::AlreadyInstalled => {
            format!("{} {} is already installed", style("✅").green(), name)
        }
        ManagerSetupOutcome::Installed { duration, .. } => format!(
            "{} Installed {} {}",
            style("✅").green(),
            style(name).cyan().bold(),
            style(format!("({})", format_duration(*duration))).dim()
        ),
        ManagerSetupOutcome::Failed { error, .. } => format!(
            "{} Failed to install {} - {}",
            style("❌").red(),
            style(name).red(),
            style(error).dim()
        ),
        ManagerSetupOutcome::Unsupported { platform } => format!(
            "{} {} is not supported on {}",
            style("❌").red(),
            name,
            platform
        ),
        ManagerSetupOutcome::ManualRequired { instructions } => format!(
            "{} Manual installation required for {}:\n  {}",
            style("⚠️").yellow(),
            name,
            instructions
        ),
    }
}

pub fn print_setup_outcome(manager: ManagerKind, outcome: &ManagerSetupOutcome) {
    display_println!("{}", format_setup_line(manager, outcome));
}

pub fn print_tracked(packages: &[TrackedPackage]) {
    if packages.is_empty() {
        display_println!("{} No tracked packages", style("ℹ️").blue());
        return;
    }
    for package in packages {
        display_println!(
            "  {} {} [{}] {}",
            style(&package.name).cyan().bold(),
            style(&package.version).dim(),
            style(package.manager).blue(),
            style(package.installed_at.format("%Y-%m-%d %H:%M")).dim()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(4200)), "4.2s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 05s");
    }

    #[test]
    fn test_failed_line_shows_error() {
        let result = PackageResult::failure(
            "ghost",
            OperationKind::Install,
            "No package managers available",
            Duration::ZERO,
        );
        let line = format_package_line(&result);
        assert!(line.contains("ghost"));
        assert!(line.contains("No package managers available"));
    }

    #[test]
    fn test_placeholder_version_is_hidden() {
        let result = PackageResult {
            package: "jq".to_string(),
            operation: OperationKind::Install,
            success: true,
            manager: Some(ManagerKind::Apt),
            version: Some(FALLBACK_VERSION.to_string()),
            duration: Duration::from_secs(2),
            attempts: 1,
            timed_out: false,
            error: None,
        };
        let line = format_package_line(&result);
        assert!(!line.contains(FALLBACK_VERSION));
    }

    #[test]
    fn test_manual_setup_line_carries_instructions() {
        let line = format_setup_line(
            ManagerKind::Choco,
            &ManagerSetupOutcome::ManualRequired {
                instructions: "see https://chocolatey.org/install".to_string(),
            },
        );
        assert!(line.contains("Manual installation required"));
        assert!(line.contains("chocolatey.org/install"));
    }

    #[test]
    fn test_preview_truncates_long_descriptions() {
        let long = "x".repeat(100);
        assert_eq!(preview(&long).chars().count(), DESCRIPTION_PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }
}
