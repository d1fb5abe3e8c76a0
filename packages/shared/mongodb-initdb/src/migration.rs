use async_trait::async_trait;
use mongodb::Database;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::OnExisting;

/// Everything a bootstrap step is allowed to touch: an explicit database
/// handle and the re-run policy it must honour.
#[derive(Clone)]
pub struct MigrationContext {
    database: Database,
    on_existing: OnExisting,
}

impl MigrationContext {
    pub fn new(database: Database, on_existing: OnExisting) -> Self {
        Self { database, on_existing }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn on_existing(&self) -> OnExisting {
        self.on_existing
    }
}

/// A single, numbered bootstrap step
#[async_trait]
pub trait Migration: Send + Sync {
    /// Unique version number for this step; steps run in ascending order
    fn version(&self) -> u32;

    /// Human-readable description of what this step does
    fn description(&self) -> &str;

    /// Apply the step
    async fn up(&self, ctx: &MigrationContext) -> Result<()>;

    /// Optional: check preconditions before the step runs
    async fn validate(&self, _ctx: &MigrationContext) -> Result<()> {
        Ok(())
    }
}

/// Step execution result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    pub version: u32,
    pub description: String,
    pub executed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Step execution options
#[derive(Debug, Clone, Default)]
pub struct MigrationOptions {
    pub dry_run: bool,
    /// Overrides the configured per-step timeout
    pub timeout: Option<std::time::Duration>,
}

/// Step status as seen by the tracking collection
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationStatus {
    Pending,
    Applied,
}

impl MigrationResult {
    /// Create a successful step result
    pub fn success(
        version: u32,
        description: String,
        executed_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        Self {
            version,
            description,
            executed_at,
            duration_ms,
            success: true,
            error_message: None,
        }
    }

    /// Create a failed step result
    pub fn failure(
        version: u32,
        description: String,
        executed_at: DateTime<Utc>,
        duration_ms: u64,
        error: String,
    ) -> Self {
        Self {
            version,
            description,
            executed_at,
            duration_ms,
            success: false,
            error_message: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mongodb::{options::ClientOptions, Client};

    #[test]
    fn test_migration_result_success() {
        let now = Utc::now();
        let result = MigrationResult::success(1, "Create collections".to_string(), now, 100);

        assert_eq!(result.version, 1);
        assert_eq!(result.description, "Create collections");
        assert_eq!(result.duration_ms, 100);
        assert!(result.success);
        assert!(result.error_message.is_none());
    }

    #[test]
    fn test_migration_result_failure() {
        let now = Utc::now();
        let result = MigrationResult::failure(
            3,
            "Seed counters".to_string(),
            now,
            50,
            "counter 'sampleSheep' already exists".to_string(),
        );

        assert_eq!(result.version, 3);
        assert!(!result.success);
        assert_eq!(
            result.error_message.as_deref(),
            Some("counter 'sampleSheep' already exists")
        );
    }

    #[test]
    fn test_migration_options_default() {
        let options = MigrationOptions::default();

        assert!(!options.dry_run);
        assert!(options.timeout.is_none());
    }

    #[test]
    fn test_context_exposes_handle_and_policy() {
        tokio_test::block_on(async {
            // Client construction is lazy, no server is contacted here.
            let options = ClientOptions::parse("mongodb://localhost:27017").await.unwrap();
            let client = Client::with_options(options).unwrap();
            let ctx = MigrationContext::new(client.database("smarter"), OnExisting::Fail);

            assert_eq!(ctx.database().name(), "smarter");
            assert_eq!(ctx.on_existing(), OnExisting::Fail);
        });
    }
}
