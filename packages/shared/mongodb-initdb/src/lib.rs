//! # MongoDB InitDB
//!
//! Versioned, idempotent schema bootstrap for MongoDB-backed Rust services.
//!
//! A service declares its collections once, in a [`SchemaTable`], and splits
//! the bootstrap into numbered steps (collections, then indexes, then seed
//! data). Steps are listed once with [`migrations!`] and applied strictly in
//! order by a [`MigrationRunner`], which records every applied step in a
//! tracking collection so a second run has nothing left to do.
//!
//! ## Features
//!
//! - **Canonical schema table**: each collection, validator and index is declared exactly once
//! - **Explicit re-run policy**: [`OnExisting::Skip`] makes every step idempotent,
//!   [`OnExisting::Fail`] refuses to touch an already initialized database
//! - **Static step list**: one `migrations!` invocation names every step
//! - **Bounded execution**: every step runs under a timeout
//! - **CLI support**: `init`, `status`, `plan` and `verify` subcommands
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mongodb_initdb::{migrations, Migration, MigrationContext, MigrationRegistration, SchemaInitializer};
//! use async_trait::async_trait;
//! use anyhow::Result;
//!
//! #[derive(Default)]
//! pub struct CreateCollections;
//!
//! pub static STEPS: &[MigrationRegistration] = migrations![CreateCollections];
//!
//! #[async_trait]
//! impl Migration for CreateCollections {
//!     fn version(&self) -> u32 { 1 }
//!     fn description(&self) -> &str { "Create validated collections" }
//!
//!     async fn up(&self, ctx: &MigrationContext) -> Result<()> {
//!         let table = my_schema();
//!         let init = SchemaInitializer::new(ctx);
//!         init.preflight(&table).await?;
//!         for spec in table.collections() {
//!             init.create_collection(spec).await?;
//!         }
//!         Ok(())
//!     }
//! }
//! ```

pub mod migration;
pub mod registry;
pub mod runner;
pub mod schema;
pub mod version;
pub mod factory;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export main types for easy access
pub use migration::{Migration, MigrationContext, MigrationOptions, MigrationResult, MigrationStatus};
pub use registry::{MigrationInfo, MigrationPlan, MigrationRegistry, PlanType};
pub use runner::{MigrationRunner, MigrationRunnerBuilder, MigrationRunnerStatus};
pub use schema::{
    Applied, CollectionSpec, CounterSeed, IndexSpec, SchemaInitializer, SchemaTable, VerifyReport,
};
pub use version::{MigrationStats, MigrationVersion, VersionTracker};
pub use factory::{create_migration_registry, MigrationRegistration};

#[cfg(feature = "cli")]
pub use cli::{InitCli, InitCommand, MigrationCliRunner, ServiceConfig};

/// What to do when a declared collection, index or seed document is already present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnExisting {
    /// Leave the existing object alone and carry on
    #[default]
    Skip,
    /// Abort with [`InitError::AlreadyExists`]
    Fail,
}

impl std::str::FromStr for OnExisting {
    type Err = InitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(OnExisting::Skip),
            "fail" => Ok(OnExisting::Fail),
            other => Err(InitError::ConfigError {
                message: format!("unknown on-existing policy '{}', expected 'skip' or 'fail'", other),
            }),
        }
    }
}

impl std::fmt::Display for OnExisting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OnExisting::Skip => f.write_str("skip"),
            OnExisting::Fail => f.write_str("fail"),
        }
    }
}

/// Configuration for the bootstrap system
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Name of the collection that records applied steps
    pub version_collection: String,
    /// Service name for logging and identification
    pub service_name: String,
    /// Policy for objects that already exist
    pub on_existing: OnExisting,
    /// Default timeout for a single step
    pub default_timeout: std::time::Duration,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            version_collection: "_initdb_versions".to_string(),
            service_name: "default".to_string(),
            on_existing: OnExisting::Skip,
            default_timeout: std::time::Duration::from_secs(300), // 5 minutes
        }
    }
}

/// Build the static list of bootstrap steps a service runs
///
/// Every step type must implement `Default`. Order in the list does not
/// matter, the runner sorts by version.
///
/// # Example
///
/// ```rust,ignore
/// use mongodb_initdb::{migrations, MigrationRegistration};
///
/// pub static STEPS: &[MigrationRegistration] = migrations![CreateCollections, SeedCounters];
/// ```
#[macro_export]
macro_rules! migrations {
    ($($migration_type:ty),+ $(,)?) => {
        &[$(
            $crate::MigrationRegistration::new(
                stringify!($migration_type),
                || Box::new(<$migration_type>::default())
            )
        ),+]
    };
}

/// Error types for the bootstrap system
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("BSON error: {0}")]
    Bson(#[from] bson::de::Error),

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("{kind} '{name}' exists with a different definition: {reason}")]
    Conflict { kind: &'static str, name: String, reason: String },

    #[error("Service '{service}' is already initialized at version {version}")]
    AlreadyInitialized { service: String, version: u32 },

    #[error("Migration version {version} is registered twice")]
    DuplicateVersion { version: u32 },

    #[error("Migration {version} failed: {message}")]
    StepFailed { version: u32, message: String },

    #[error("Timeout after {duration:?}")]
    Timeout { duration: std::time::Duration },

    #[error("Migration sequence error: {message}")]
    SequenceError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

/// Result type for bootstrap operations
pub type Result<T> = std::result::Result<T, InitError>;

/// Server error code for a duplicate key on a unique index
pub const DUPLICATE_KEY: i32 = 11000;

/// Server error code for a document rejected by a collection validator
pub const DOCUMENT_VALIDATION_FAILURE: i32 = 121;

/// Extract the server error code of a single-document write failure, if any
pub fn write_error_code(err: &mongodb::error::Error) -> Option<i32> {
    use mongodb::error::{ErrorKind, WriteFailure};

    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => Some(e.code),
        ErrorKind::Command(e) => Some(e.code),
        ErrorKind::BulkWrite(failure) => failure
            .write_errors
            .as_ref()
            .and_then(|errors| errors.first())
            .map(|e| e.code),
        _ => None,
    }
}

/// Whether the error is a duplicate key violation
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    write_error_code(err) == Some(DUPLICATE_KEY)
}
