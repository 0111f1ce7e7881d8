//! Output configuration and mode management

use console::Term;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// How results are presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Styled text on stdout, logs on stderr
    Human,
    /// One JSON document on stdout, everything else on stderr
    Json,
}

/// How chatty the process is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    /// `--verbose` wins over `--quiet`
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else if quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Normal
        }
    }
}

/// Configuration for the output system
#[derive(Debug, Clone)]
pub struct OutputConfig {
    mode: OutputMode,
    verbosity: Verbosity,
    color_enabled: bool,
    log_level: Level,
}

impl OutputConfig {
    pub fn new(mode: OutputMode, verbosity: Verbosity) -> Self {
        let color_enabled = match mode {
            OutputMode::Human => Term::stderr().features().colors_supported(),
            OutputMode::Json => false,
        };

        let log_level = match verbosity {
            Verbosity::Verbose => Level::DEBUG,
            Verbosity::Quiet => Level::ERROR,
            Verbosity::Normal => match std::env::var("RUST_LOG") {
                Ok(level) => match level.to_lowercase().as_str() {
                    "trace" => Level::TRACE,
                    "debug" => Level::DEBUG,
                    "info" => Level::INFO,
                    "error" => Level::ERROR,
                    _ => Level::WARN,
                },
                Err(_) => Level::WARN,
            },
        };

        Self {
            mode,
            verbosity,
            color_enabled,
            log_level,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn colors_enabled(&self) -> bool {
        self.color_enabled
    }

    pub fn log_level(&self) -> Level {
        self.log_level
    }

    /// Install the global tracing subscriber; logs always go to stderr
    pub fn init_tracing(&self) {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive(self.log_level.into()))
            .with_target(false)
            .with_level(true)
            .with_writer(std::io::stderr);

        let result = match self.mode {
            OutputMode::Human => builder.with_ansi(self.color_enabled).try_init(),
            OutputMode::Json => builder
                .with_ansi(false)
                .without_time()
                .compact()
                .try_init(),
        };

        // A subscriber may already be installed, e.g. by a test harness
        let _ = result;
    }
}
