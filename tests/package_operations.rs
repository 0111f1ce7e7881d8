//! End-to-end install and remove against a simulated host

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use crossfire::batch::{BatchOptions, BatchOrchestrator, InstallOperation};
use crossfire::managers::{DetectionMap, ManagerKind, OperationExecutor, OperationKind};
use crossfire::tracking::{SqliteTrackingStore, TrackingStore};
use crossfire::utils::{CommandRunner, CommandSpec, Platform, RunOutput};

/// Pretends to be a machine with brew, pip and npm. Programs listed as
/// broken fail every command; the others keep track of what they installed.
#[derive(Default)]
struct FakeHost {
    broken: HashSet<&'static str>,
    installed: Mutex<HashSet<(String, String)>>,
    calls: Mutex<Vec<String>>,
}

impl FakeHost {
    fn with_broken(programs: &[&'static str]) -> Self {
        Self {
            broken: programs.iter().copied().collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeHost {
    async fn run(&self, command: &CommandSpec, _timeout: Duration, _retries: u32) -> RunOutput {
        self.calls.lock().unwrap().push(command.to_string());

        let program = command.program.clone();
        let package = command.args.last().cloned().unwrap_or_default();
        if self.broken.contains(program.as_str()) {
            return RunOutput {
                stderr: format!("{program}: repository unavailable"),
                exit_code: Some(1),
                ..RunOutput::default()
            };
        }

        let removing = command
            .args
            .iter()
            .any(|arg| arg == "uninstall" || arg == "remove");
        let mut installed = self.installed.lock().unwrap();
        let key = (program.clone(), package.clone());

        if removing {
            if installed.remove(&key) {
                RunOutput {
                    ok: true,
                    exit_code: Some(0),
                    ..RunOutput::default()
                }
            } else {
                RunOutput {
                    stderr: format!("{package} is not installed"),
                    exit_code: Some(1),
                    ..RunOutput::default()
                }
            }
        } else {
            installed.insert(key);
            RunOutput {
                ok: true,
                stdout: format!("Successfully installed {package}-1.2.3"),
                exit_code: Some(0),
                ..RunOutput::default()
            }
        }
    }
}

async fn setup(
    host: Arc<FakeHost>,
) -> (TempDir, Arc<SqliteTrackingStore>, Arc<OperationExecutor>) {
    let temp_dir = TempDir::new().unwrap();
    let tracking = Arc::new(
        SqliteTrackingStore::open(temp_dir.path().join("packages.db"))
            .await
            .unwrap(),
    );
    let detector = Arc::new(DetectionMap::from_present([
        ManagerKind::Brew,
        ManagerKind::Pip,
        ManagerKind::Npm,
    ]));
    let executor = Arc::new(
        OperationExecutor::new(host, tracking.clone(), detector).with_platform(Platform::MacOS),
    );
    (temp_dir, tracking, executor)
}

#[tokio::test]
async fn test_install_falls_back_and_stops_at_first_success() {
    let host = Arc::new(FakeHost::with_broken(&["brew"]));
    let (_dir, tracking, executor) = setup(host.clone()).await;

    let result = executor.install("httpie", None).await;

    assert!(result.success);
    assert_eq!(result.manager, Some(ManagerKind::Pip));
    assert_eq!(result.attempts, 2);
    assert!(result.error.is_none());
    let calls = host.calls();
    assert!(calls[0].starts_with("brew install"));
    assert!(calls.iter().all(|call| !call.starts_with("npm")));

    let record = tracking.get("httpie").await.unwrap().unwrap();
    assert_eq!(record.manager, ManagerKind::Pip);
    assert!(record.command.ends_with("pip install httpie"));
}

#[tokio::test]
async fn test_preferred_manager_goes_first() {
    let host = Arc::new(FakeHost::default());
    let (_dir, tracking, executor) = setup(host.clone()).await;

    let result = executor.install("typescript", Some(ManagerKind::Npm)).await;

    assert!(result.success);
    assert_eq!(result.manager, Some(ManagerKind::Npm));
    assert_eq!(host.calls(), vec!["npm install -g typescript"]);
    assert_eq!(
        tracking.get("typescript").await.unwrap().unwrap().manager,
        ManagerKind::Npm
    );
}

#[tokio::test]
async fn test_remove_is_idempotent() {
    let host = Arc::new(FakeHost::with_broken(&["brew"]));
    let (_dir, tracking, executor) = setup(host.clone()).await;

    assert!(executor.install("httpie", None).await.success);

    let first = executor.remove("httpie", None).await;
    assert!(first.success);
    assert_eq!(first.manager, Some(ManagerKind::Pip));
    assert!(tracking.get("httpie").await.unwrap().is_none());

    let second = executor.remove("httpie", None).await;
    assert!(!second.success);
    assert_eq!(second.operation, OperationKind::Remove);
    let error = second.error.unwrap();
    assert!(error.starts_with("Failed to remove 'httpie'"));
    assert!(error.chars().count() <= 200);
    assert!(tracking.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_every_manager_failing_reports_all_attempts() {
    let host = Arc::new(FakeHost::with_broken(&["brew", "python3", "npm"]));
    let (_dir, tracking, executor) = setup(host).await;

    let result = executor.install("ghost", None).await;

    assert!(!result.success);
    assert_eq!(result.attempts, 3);
    assert!(result.manager.is_none());
    assert!(result.error.unwrap().contains("tried: brew, pip, npm"));
    assert!(tracking.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_no_managers_available() {
    let temp_dir = TempDir::new().unwrap();
    let tracking = Arc::new(
        SqliteTrackingStore::open(temp_dir.path().join("packages.db"))
            .await
            .unwrap(),
    );
    let executor = OperationExecutor::new(
        Arc::new(FakeHost::default()),
        tracking,
        Arc::new(DetectionMap::new()),
    );

    let result = executor.install("git", None).await;

    assert!(!result.success);
    assert_eq!(result.attempts, 0);
    assert!(result.error.is_some());
}

#[tokio::test]
async fn test_batch_install_records_every_package() {
    let host = Arc::new(FakeHost::with_broken(&["brew"]));
    let (_dir, tracking, executor) = setup(host).await;
    let orchestrator = BatchOrchestrator::default();

    let packages: Vec<String> = (0..8).map(|i| format!("tool{i}")).collect();
    let report = orchestrator
        .run_batch(
            &packages,
            Arc::new(InstallOperation::new(executor)),
            &BatchOptions::for_operation(OperationKind::Install).with_max_workers(4),
        )
        .await;

    assert!(report.all_succeeded());
    assert_eq!(report.success_rate, 100.0);
    assert_eq!(tracking.list().await.unwrap().len(), 8);
}
