use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::{BatchOptions, BatchOrchestrator, BatchReport, PackageOperation};
use crate::error::CrossfireError;
use crate::managers::{OperationKind, PackageResult};

const VERSION_SPECIFIERS: [&str; 5] = ["==", ">=", "<=", "~=", "!="];

/// Package names listed in a requirements file.
///
/// Blank lines and `#` comments are skipped and version specifiers are cut
/// off, so `requests>=2.0` yields `requests`.
pub fn parse_requirements(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let name = VERSION_SPECIFIERS
                .iter()
                .fold(line, |name, spec| name.split(spec).next().unwrap_or(name))
                .trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

/// Read a requirements file and install everything it lists as one batch.
///
/// An unreadable or empty file yields a report with a single failure entry.
pub async fn install_from_requirements(
    path: &Path,
    orchestrator: &BatchOrchestrator,
    operation: Arc<dyn PackageOperation>,
    options: &BatchOptions,
) -> BatchReport {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let error = CrossfireError::RequirementsNotFound {
                path: path.to_path_buf(),
            };
            warn!("{}", error);
            return file_failure(path, error.to_string());
        }
        Err(e) => {
            warn!("Error reading requirements file {}: {}", path.display(), e);
            return file_failure(
                path,
                format!("Error reading requirements file {}: {e}", path.display()),
            );
        }
    };

    let packages = parse_requirements(&contents);
    if packages.is_empty() {
        let error = CrossfireError::EmptyRequirements {
            path: path.to_path_buf(),
        };
        warn!("{}", error);
        return file_failure(path, error.to_string());
    }

    info!(
        "Found {} packages in {}",
        packages.len(),
        path.display()
    );
    orchestrator.run_batch(&packages, operation, options).await
}

fn file_failure(path: &Path, message: String) -> BatchReport {
    let mut report = BatchReport::new(OperationKind::Install, 0);
    report.failed.push(PackageResult::failure(
        path.display().to_string(),
        OperationKind::Install,
        message,
        std::time::Duration::ZERO,
    ));
    report.finalize(std::time::Duration::ZERO);
    report
}
