//! Runs one install or removal across an ordered list of managers

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::planner::plan;
use super::registry::descriptor;
use super::version::extract_package_version;
use super::{Detect, ManagerKind, OperationKind};
use crate::error::truncate_message;
use crate::tracking::{TrackedPackage, TrackingStore};
use crate::utils::{serialize_secs, CommandRunner, Platform, RunOutput};

/// Longest error message carried in a result
pub const MAX_ERROR_CHARS: usize = 200;

/// Longest stderr excerpt logged for a failed attempt
const MAX_ATTEMPT_LOG_CHARS: usize = 180;

/// Per-command timeouts for manager invocations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationTimeouts {
    pub install: Duration,
    pub remove: Duration,
    /// Installing a package manager itself
    pub setup: Duration,
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self {
            install: Duration::from_secs(1800),
            remove: Duration::from_secs(600),
            setup: Duration::from_secs(900),
        }
    }
}

impl OperationTimeouts {
    pub fn for_operation(&self, operation: OperationKind) -> Duration {
        match operation {
            OperationKind::Install => self.install,
            OperationKind::Remove => self.remove,
        }
    }
}

/// How a single manager invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Succeeded,
    /// The manager ran and reported failure
    Failed,
    /// The manager never answered within its timeout
    TimedOut,
    /// The command could not be started
    SpawnFailed,
}

impl AttemptStatus {
    fn classify(output: &RunOutput) -> Self {
        if output.ok {
            AttemptStatus::Succeeded
        } else if output.timed_out {
            AttemptStatus::TimedOut
        } else if output.exit_code.is_none() {
            AttemptStatus::SpawnFailed
        } else {
            AttemptStatus::Failed
        }
    }
}

/// One manager tried for one package
#[derive(Debug, Clone, Serialize)]
pub struct OperationAttempt {
    pub manager: ManagerKind,
    pub status: AttemptStatus,
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
}

impl OperationAttempt {
    fn from_output(manager: ManagerKind, command: String, output: RunOutput) -> Self {
        Self {
            manager,
            status: AttemptStatus::classify(&output),
            command,
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            duration: output.duration,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == AttemptStatus::Succeeded
    }

    /// Last non-empty line of stderr, or of stdout when stderr is empty
    pub fn last_error_line(&self) -> &str {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        source
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("")
    }
}

/// Result of walking a candidate list
#[derive(Debug, Clone, Default)]
pub struct OperationOutcome {
    pub success: bool,
    /// Attempts in the order they were made
    pub attempts: Vec<OperationAttempt>,
    /// Version extracted from the successful install, if any
    pub version: Option<String>,
}

impl OperationOutcome {
    /// The attempt that succeeded
    pub fn successful_attempt(&self) -> Option<&OperationAttempt> {
        self.attempts.iter().find(|attempt| attempt.succeeded())
    }

    /// True when at least one attempt ran and every attempt timed out
    pub fn all_timed_out(&self) -> bool {
        !self.attempts.is_empty()
            && self
                .attempts
                .iter()
                .all(|attempt| attempt.status == AttemptStatus::TimedOut)
    }
}

/// Final outcome of one package operation
#[derive(Debug, Clone, Serialize)]
pub struct PackageResult {
    pub package: String,
    pub operation: OperationKind,
    pub success: bool,
    pub manager: Option<ManagerKind>,
    pub version: Option<String>,
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
    pub attempts: usize,
    pub timed_out: bool,
    pub error: Option<String>,
}

pub type InstallResult = PackageResult;
pub type RemoveResult = PackageResult;

impl PackageResult {
    /// A failure that happened before or outside any manager attempt
    pub fn failure(
        package: impl Into<String>,
        operation: OperationKind,
        message: impl AsRef<str>,
        duration: Duration,
    ) -> Self {
        Self {
            package: package.into(),
            operation,
            success: false,
            manager: None,
            version: None,
            duration,
            attempts: 0,
            timed_out: false,
            error: Some(truncate_message(message.as_ref(), MAX_ERROR_CHARS)),
        }
    }

    /// A unit of work that did not finish inside its deadline
    pub fn timeout(
        package: impl Into<String>,
        operation: OperationKind,
        limit: Duration,
        duration: Duration,
    ) -> Self {
        let package = package.into();
        let message = format!(
            "Timed out: {} of '{}' did not finish within {}s",
            operation.verb(),
            package,
            limit.as_secs()
        );
        Self {
            timed_out: true,
            ..Self::failure(package, operation, message, duration)
        }
    }

    fn from_outcome(
        package: &str,
        operation: OperationKind,
        outcome: OperationOutcome,
        duration: Duration,
        timeout: Duration,
    ) -> Self {
        let attempts = outcome.attempts.len();

        if let Some(winner) = outcome.successful_attempt() {
            return Self {
                package: package.to_string(),
                operation,
                success: true,
                manager: Some(winner.manager),
                version: outcome.version.clone(),
                duration,
                attempts,
                timed_out: false,
                error: None,
            };
        }

        let tried: Vec<&str> = outcome
            .attempts
            .iter()
            .map(|attempt| attempt.manager.as_str())
            .collect();

        let mut result = if outcome.all_timed_out() {
            Self::timeout(package, operation, timeout, duration)
        } else {
            let detail = outcome
                .attempts
                .last()
                .map(|attempt| attempt.last_error_line().to_string())
                .unwrap_or_default();
            let mut message = format!(
                "Failed to {} '{}' with any available manager (tried: {})",
                operation.verb(),
                package,
                tried.join(", ")
            );
            if !detail.is_empty() {
                message.push_str(": ");
                message.push_str(&detail);
            }
            Self::failure(package, operation, message, duration)
        };
        result.attempts = attempts;
        result
    }
}

/// What happened when asked to install a package manager
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ManagerSetupOutcome {
    AlreadyInstalled,
    Installed {
        command: String,
        #[serde(serialize_with = "serialize_secs")]
        duration: Duration,
    },
    Failed {
        command: String,
        error: String,
        timed_out: bool,
    },
    /// The manager does not run on this platform
    Unsupported { platform: Platform },
    /// No unattended installer; the user has to follow these steps
    ManualRequired { instructions: String },
}

impl ManagerSetupOutcome {
    /// The manager is usable afterwards
    pub fn is_ready(&self) -> bool {
        matches!(
            self,
            ManagerSetupOutcome::AlreadyInstalled | ManagerSetupOutcome::Installed { .. }
        )
    }
}

/// Executes single-package operations against the host's managers
pub struct OperationExecutor {
    runner: Arc<dyn CommandRunner>,
    tracking: Arc<dyn TrackingStore>,
    detector: Arc<dyn Detect>,
    timeouts: OperationTimeouts,
    platform: Platform,
}

impl OperationExecutor {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        tracking: Arc<dyn TrackingStore>,
        detector: Arc<dyn Detect>,
    ) -> Self {
        Self {
            runner,
            tracking,
            detector,
            timeouts: OperationTimeouts::default(),
            platform: Platform::current(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: OperationTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn tracking(&self) -> &Arc<dyn TrackingStore> {
        &self.tracking
    }

    pub fn detector(&self) -> &Arc<dyn Detect> {
        &self.detector
    }

    /// Try `candidates` in order and stop at the first successful install.
    ///
    /// A success is recorded in the tracking store together with the command
    /// that performed it.
    pub async fn install_one(&self, package: &str, candidates: &[ManagerKind]) -> OperationOutcome {
        let mut outcome = self
            .walk(package, candidates, OperationKind::Install)
            .await;

        if let Some(winner) = outcome.successful_attempt() {
            let version = extract_package_version(&winner.stdout, winner.manager);
            let record = TrackedPackage::new(package, &version, winner.manager, &winner.command);
            if let Err(e) = self.tracking.upsert(record).await {
                warn!("Installed {} but could not record it: {:#}", package, e);
            }
            info!("Installed {} {} via {}", package, version, winner.manager);
            outcome.version = Some(version);
        }

        outcome
    }

    /// Try `candidates` in order and stop at the first successful removal.
    ///
    /// The manager recorded for a tracked package is tried first; the record
    /// is deleted once a removal succeeds.
    pub async fn remove_one(&self, package: &str, candidates: &[ManagerKind]) -> OperationOutcome {
        let mut ordered = candidates.to_vec();

        match self.tracking.get(package).await {
            Ok(Some(record)) => {
                if let Some(pos) = ordered.iter().position(|m| *m == record.manager) {
                    let recorded = ordered.remove(pos);
                    ordered.insert(0, recorded);
                    debug!("{} was installed via {}, trying it first", package, recorded);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Could not read tracking record for {}: {:#}", package, e),
        }

        let outcome = self.walk(package, &ordered, OperationKind::Remove).await;

        if let Some(winner) = outcome.successful_attempt() {
            match self.tracking.remove(package).await {
                Ok(true) => debug!("Removed tracking record for {}", package),
                Ok(false) => {}
                Err(e) => warn!("Removed {} but could not update records: {:#}", package, e),
            }
            info!("Removed {} via {}", package, winner.manager);
        }

        outcome
    }

    /// Plan and install one package
    pub async fn install(&self, package: &str, preferred: Option<ManagerKind>) -> InstallResult {
        self.run_operation(package, preferred, OperationKind::Install)
            .await
    }

    /// Plan and remove one package
    pub async fn remove(&self, package: &str, preferred: Option<ManagerKind>) -> RemoveResult {
        self.run_operation(package, preferred, OperationKind::Remove)
            .await
    }

    /// Install a package manager that is missing from this machine
    pub async fn install_manager(&self, kind: ManagerKind) -> ManagerSetupOutcome {
        let entry = descriptor(kind);
        if !entry.supports_platform(self.platform) {
            return ManagerSetupOutcome::Unsupported {
                platform: self.platform,
            };
        }

        if self.detector.detect().await.is_present(kind) {
            info!("{} is already installed", kind.display_name());
            return ManagerSetupOutcome::AlreadyInstalled;
        }

        let Some(command) = entry.setup_command(self.platform) else {
            return ManagerSetupOutcome::ManualRequired {
                instructions: entry.setup.instructions.to_string(),
            };
        };

        let command_line = command.to_string();
        info!("Installing {}: {}", kind.display_name(), command_line);
        let output = self.runner.run(&command, self.timeouts.setup, 0).await;

        match AttemptStatus::classify(&output) {
            AttemptStatus::Succeeded => ManagerSetupOutcome::Installed {
                command: command_line,
                duration: output.duration,
            },
            status => {
                let attempt = OperationAttempt::from_output(kind, command_line, output);
                let error = match status {
                    AttemptStatus::TimedOut => format!(
                        "Timed out after {}s",
                        self.timeouts.setup.as_secs()
                    ),
                    _ => truncate_message(attempt.last_error_line(), MAX_ERROR_CHARS),
                };
                warn!("Failed to install {}: {}", kind.display_name(), error);
                ManagerSetupOutcome::Failed {
                    command: attempt.command,
                    error,
                    timed_out: status == AttemptStatus::TimedOut,
                }
            }
        }
    }

    async fn run_operation(
        &self,
        package: &str,
        preferred: Option<ManagerKind>,
        operation: OperationKind,
    ) -> PackageResult {
        let started = Instant::now();
        let package = package.trim();

        if package.is_empty() {
            return PackageResult::failure(
                package,
                operation,
                "Package name is empty",
                started.elapsed(),
            );
        }

        let detection = self.detector.detect().await;
        let plan = match plan(package, &detection, preferred, operation, self.platform) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Cannot {} {}: {}", operation.verb(), package, e);
                return PackageResult::failure(package, operation, e.to_string(), started.elapsed());
            }
        };

        for warning in &plan.warnings {
            warn!("{}", warning);
        }

        let outcome = match operation {
            OperationKind::Install => self.install_one(package, &plan.candidates).await,
            OperationKind::Remove => self.remove_one(package, &plan.candidates).await,
        };

        PackageResult::from_outcome(
            package,
            operation,
            outcome,
            started.elapsed(),
            self.timeouts.for_operation(operation),
        )
    }

    async fn walk(
        &self,
        package: &str,
        candidates: &[ManagerKind],
        operation: OperationKind,
    ) -> OperationOutcome {
        let timeout = self.timeouts.for_operation(operation);
        let mut outcome = OperationOutcome::default();

        for manager in candidates {
            let command = descriptor(*manager).command_for(operation, package, self.platform);
            let command_line = command.to_string();
            debug!("Trying {} for {}: {}", manager, package, command_line);

            // Each manager gets exactly one try; retrying is the caller's call
            let output = self.runner.run(&command, timeout, 0).await;
            let attempt = OperationAttempt::from_output(*manager, command_line, output);
            let succeeded = attempt.succeeded();

            if !succeeded {
                warn!(
                    "{} {} via {} failed ({:?}): {}",
                    operation.verb(),
                    package,
                    manager,
                    attempt.status,
                    truncate_message(attempt.last_error_line(), MAX_ATTEMPT_LOG_CHARS)
                );
            }

            outcome.attempts.push(attempt);
            if succeeded {
                outcome.success = true;
                break;
            }
        }

        outcome
    }
}
