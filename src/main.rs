use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crossfire::batch::{
    install_from_requirements, BatchOptions, BatchOrchestrator, BatchReport, IndicatifProgress,
    InstallOperation, NoopProgress, PackageOperation, ProgressSink, RemoveOperation,
};
use crossfire::config::{default_config_path, Config};
use crossfire::managers::{
    list_managers_status, Detect, ManagerKind, OperationExecutor, OperationKind, PackageResult,
    SystemDetector,
};
use crossfire::output::{self, report, OutputMode, Verbosity};
use crossfire::search::{
    BackendRegistry, ReqwestHttpClient, SearchAggregator, SearchCache, SearchOptions,
};
use crossfire::tracking::{MemoryTrackingStore, SqliteTrackingStore, TrackingStore};
use crossfire::utils::{Platform, SystemCommandRunner};
use crossfire::display_eprintln;

#[derive(Parser)]
#[command(name = "crossfire")]
#[command(
    about = "Install, remove and search packages across every package manager on this machine",
    long_about = "Crossfire drives the native package managers it finds (apt, dnf, brew, \
                  winget, pip, npm and more) through one interface.\n\n\
                  Installs fall back from one manager to the next until one succeeds, \
                  batches run concurrently, and search queries every manager at once."
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Try this manager first
    #[arg(short, long, global = true)]
    manager: Option<ManagerKind>,

    /// Worker count for batch operations
    #[arg(long, global = true)]
    max_workers: Option<usize>,

    /// Stop starting new packages after the first failure
    #[arg(long, global = true)]
    fail_fast: bool,

    /// Deadline for a whole batch, in seconds
    #[arg(long, global = true)]
    batch_timeout: Option<u64>,

    /// Maximum number of search results
    #[arg(long, global = true)]
    search_limit: Option<usize>,

    /// Search fan-out deadline, in seconds
    #[arg(long, global = true)]
    search_timeout: Option<u64>,

    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Do not record installs in the tracking database
    #[arg(long, global = true)]
    no_track: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a single package
    Install {
        /// Package name
        package: String,
    },

    /// Remove a single package
    Remove {
        /// Package name
        package: String,
    },

    /// Install several packages concurrently
    InstallBatch {
        /// Package names, comma or space separated
        #[arg(required = true, value_delimiter = ',')]
        packages: Vec<String>,
    },

    /// Remove several packages concurrently
    RemoveBatch {
        /// Package names, comma or space separated
        #[arg(required = true, value_delimiter = ',')]
        packages: Vec<String>,
    },

    /// Install every package listed in a requirements file
    InstallFrom {
        /// Requirements file, one package per line
        file: PathBuf,
    },

    /// Search every available package manager
    Search {
        /// Search query
        query: String,
    },

    /// Show which package managers are available
    Managers,

    /// Install a package manager that is missing
    InstallManager {
        /// Manager name, e.g. brew or pip
        name: ManagerKind,
    },

    /// List packages installed through crossfire
    Installed,
}

/// Everything a command needs, built once per process
struct App {
    config: Config,
    platform: Platform,
    detector: Arc<dyn Detect>,
    executor: Arc<OperationExecutor>,
    progress: Arc<dyn ProgressSink>,
    json: bool,
}

impl App {
    async fn build(cli: &Cli) -> Result<Self> {
        let config_path = cli.config.clone().unwrap_or_else(default_config_path);
        let config = Config::load_from_file(&config_path)
            .await
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
        debug!("Loaded configuration from {}", config_path.display());

        let platform = Platform::current();
        let runner = Arc::new(SystemCommandRunner::new());
        let detector: Arc<dyn Detect> = Arc::new(SystemDetector::new(
            runner.clone(),
            config.execution.probe_timeout(),
        ));

        let tracking: Arc<dyn TrackingStore> = if cli.no_track {
            Arc::new(MemoryTrackingStore::new())
        } else {
            Arc::new(SqliteTrackingStore::open(&config.storage.database).await?)
        };

        let executor = Arc::new(
            OperationExecutor::new(runner, tracking, detector.clone())
                .with_timeouts(config.execution.operation_timeouts())
                .with_platform(platform),
        );

        let progress: Arc<dyn ProgressSink> = if cli.json || cli.quiet {
            Arc::new(NoopProgress)
        } else {
            Arc::new(IndicatifProgress::new())
        };

        Ok(Self {
            config,
            platform,
            detector,
            executor,
            progress,
            json: cli.json,
        })
    }

    fn batch_options(&self, cli: &Cli, operation: OperationKind) -> BatchOptions {
        let mut options = BatchOptions::from_config(&self.config.batch, operation)
            .with_preferred(cli.manager);
        if let Some(workers) = cli.max_workers {
            options = options.with_max_workers(workers);
        }
        if cli.fail_fast {
            options = options.with_fail_fast(true);
        }
        if let Some(secs) = cli.batch_timeout {
            options = options.with_timeout(Duration::from_secs(secs));
        }
        options
    }

    fn operation(&self, kind: OperationKind) -> Arc<dyn PackageOperation> {
        match kind {
            OperationKind::Install => Arc::new(InstallOperation::new(self.executor.clone())),
            OperationKind::Remove => Arc::new(RemoveOperation::new(self.executor.clone())),
        }
    }

    async fn run_batch(&self, cli: &Cli, packages: &[String], kind: OperationKind) -> BatchReport {
        BatchOrchestrator::new(self.progress.clone())
            .run_batch(packages, self.operation(kind), &self.batch_options(cli, kind))
            .await
    }

    fn print_result(&self, result: &PackageResult) -> Result<()> {
        if self.json {
            output::print_json(result)
        } else {
            report::print_package_result(result);
            Ok(())
        }
    }

    fn print_report(&self, batch: &BatchReport) -> Result<()> {
        if self.json {
            output::print_json(batch)
        } else {
            report::print_batch_report(batch);
            Ok(())
        }
    }

    fn search_aggregator(&self, cli: &Cli) -> Result<SearchAggregator> {
        let http = Arc::new(ReqwestHttpClient::new(&self.config.http)?);
        let backends = BackendRegistry::with_defaults(
            http,
            Arc::new(SystemCommandRunner::new()),
            &self.config.search,
            Some(self.config.storage.cache_dir.clone()),
            self.platform,
        );

        let mut options = SearchOptions::from_config(&self.config.search);
        if let Some(secs) = cli.search_timeout {
            options.timeout = Duration::from_secs(secs);
        }

        Ok(SearchAggregator::new(
            backends,
            self.detector.clone(),
            Arc::new(SearchCache::from_config(&self.config.search)),
            options,
        )
        .with_progress(self.progress.clone()))
    }
}

/// Runs the command; `Ok(false)` means the command completed but did not
/// fully succeed
async fn run(cli: Cli) -> Result<bool> {
    let app = App::build(&cli).await?;

    match &cli.command {
        Commands::Install { package } => {
            let result = app.executor.install(package, cli.manager).await;
            app.print_result(&result)?;
            Ok(result.success)
        }

        Commands::Remove { package } => {
            let result = app.executor.remove(package, cli.manager).await;
            app.print_result(&result)?;
            Ok(result.success)
        }

        Commands::InstallBatch { packages } => {
            let report = app.run_batch(&cli, packages, OperationKind::Install).await;
            app.print_report(&report)?;
            Ok(report.all_succeeded())
        }

        Commands::RemoveBatch { packages } => {
            let report = app.run_batch(&cli, packages, OperationKind::Remove).await;
            app.print_report(&report)?;
            Ok(report.all_succeeded())
        }

        Commands::InstallFrom { file } => {
            let orchestrator = BatchOrchestrator::new(app.progress.clone());
            let report = install_from_requirements(
                file,
                &orchestrator,
                app.operation(OperationKind::Install),
                &app.batch_options(&cli, OperationKind::Install),
            )
            .await;
            app.print_report(&report)?;
            Ok(report.all_succeeded())
        }

        Commands::Search { query } => {
            let limit = cli.search_limit.unwrap_or(app.config.search.limit);
            let aggregator = app.search_aggregator(&cli)?;
            let outcome = aggregator.search(query, cli.manager, limit).await;
            if app.json {
                output::print_json(&outcome)?;
            } else {
                report::print_search_outcome(query, &outcome);
            }
            Ok(!outcome.results.is_empty())
        }

        Commands::Managers => {
            let detection = app.detector.detect().await;
            let statuses = list_managers_status(&detection, app.platform);
            if app.json {
                output::print_json(&statuses)?;
            } else {
                report::print_manager_statuses(&statuses);
            }
            Ok(detection.any_present())
        }

        Commands::InstallManager { name } => {
            let outcome = app.executor.install_manager(*name).await;
            if app.json {
                output::print_json(&outcome)?;
            } else {
                report::print_setup_outcome(*name, &outcome);
            }
            Ok(outcome.is_ready())
        }

        Commands::Installed => {
            let packages = app.executor.tracking().list().await?;
            if app.json {
                output::print_json(&packages)?;
            } else {
                report::print_tracked(&packages);
            }
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    output::init_with_verbosity(mode, Verbosity::from_flags(cli.verbose, cli.quiet));

    match run(cli).await {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            display_eprintln!("{} {:#}", style("❌").red(), e);
            std::process::exit(2);
        }
    }
}
