//! crossfire library
//!
//! One front end over the native package managers of a machine: install and
//! remove through whichever manager works, in batches, and search all of
//! them at once

pub mod batch;
pub mod config;
pub mod error;
pub mod managers;
pub mod output;
pub mod search;
pub mod tracking;
pub mod utils;

// Re-export commonly used types
pub use batch::{BatchOptions, BatchOrchestrator, BatchReport, InstallOperation, RemoveOperation};
pub use config::Config;
pub use error::CrossfireError;
pub use managers::{ManagerKind, OperationExecutor, OperationKind, PackageResult};
pub use search::{SearchAggregator, SearchOutcome, SearchResult};
pub use tracking::{MemoryTrackingStore, SqliteTrackingStore, TrackedPackage, TrackingStore};
