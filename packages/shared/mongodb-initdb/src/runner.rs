use std::time::Instant;
use mongodb::Database;
use anyhow::{Result, anyhow};
use chrono::Utc;

use crate::{
    InitError, Migration, MigrationConfig, MigrationContext, MigrationOptions, MigrationPlan,
    MigrationRegistry, MigrationResult, MigrationStatus, OnExisting, VersionTracker,
};

/// Applies bootstrap steps against the database, one at a time, in version order
pub struct MigrationRunner {
    context: MigrationContext,
    registry: MigrationRegistry,
    version_tracker: VersionTracker,
    config: MigrationConfig,
}

impl MigrationRunner {
    /// Create a new runner with default configuration
    pub fn new(database: Database, registry: MigrationRegistry) -> Self {
        Self::with_config(database, registry, MigrationConfig::default())
    }

    /// Create a new runner with custom configuration
    pub fn with_config(database: Database, registry: MigrationRegistry, config: MigrationConfig) -> Self {
        let version_tracker = VersionTracker::new(&database, &config);
        let context = MigrationContext::new(database, config.on_existing);
        Self {
            context,
            registry,
            version_tracker,
            config,
        }
    }

    /// Create a builder for configuring the runner
    pub fn builder() -> MigrationRunnerBuilder {
        MigrationRunnerBuilder::new()
    }

    /// Prepare version tracking and check the registered sequence
    pub async fn initialize(&self) -> Result<()> {
        self.registry.validate_sequence()?;
        self.version_tracker.initialize().await?;
        tracing::info!(
            service = %self.config.service_name,
            migrations = self.registry.count(),
            on_existing = %self.config.on_existing,
            "Bootstrap system initialized"
        );
        Ok(())
    }

    /// Run all pending steps. Stops at the first step that fails and returns its error.
    pub async fn migrate_up(&self, options: Option<MigrationOptions>) -> Result<Vec<MigrationResult>> {
        let options = options.unwrap_or_default();

        if self.config.on_existing == OnExisting::Fail {
            if let Some(version) = self.version_tracker.get_latest_version().await? {
                return Err(InitError::AlreadyInitialized {
                    service: self.config.service_name.clone(),
                    version,
                }
                .into());
            }
        }

        let plan = self.registry.get_migration_plan(&self.version_tracker).await?;

        if !plan.has_migrations() {
            tracing::info!("No pending migrations to apply for service '{}'", self.config.service_name);
            return Ok(Vec::new());
        }

        self.execute_plan(plan, options).await
    }

    /// Get bootstrap status
    pub async fn status(&self) -> Result<MigrationRunnerStatus> {
        let all_versions = self.registry.get_versions();
        let latest_available = all_versions.last().copied().unwrap_or(0);

        let stats = self.version_tracker.get_stats().await?;
        let current_version = stats.latest_version.unwrap_or(0);

        let mut steps = Vec::with_capacity(all_versions.len());
        for migration in self.registry.get_all_migrations() {
            let status = self.version_tracker.get_status(migration.version()).await?;
            steps.push((migration.version(), migration.description().to_string(), status));
        }

        Ok(MigrationRunnerStatus {
            service_name: self.config.service_name.clone(),
            current_version,
            pending_count: steps.iter().filter(|(_, _, s)| *s == MigrationStatus::Pending).count(),
            latest_available_version: latest_available,
            total_applied: stats.total_applied,
            avg_duration_ms: stats.avg_duration_ms,
            total_duration_ms: stats.total_duration_ms,
            steps,
        })
    }

    /// Get the pending plan without executing it
    pub async fn plan(&self) -> Result<MigrationPlan> {
        self.registry.get_migration_plan(&self.version_tracker).await
    }

    async fn execute_plan(&self, plan: MigrationPlan, options: MigrationOptions) -> Result<Vec<MigrationResult>> {
        tracing::info!("Executing plan for service '{}': {}",
            self.config.service_name, plan.summary());

        if options.dry_run {
            tracing::info!("DRY RUN: Would execute {} migrations for service '{}'",
                plan.migrations.len(), self.config.service_name);
            return Ok(Vec::new());
        }

        let mut results = Vec::new();

        for migration_info in &plan.migrations {
            let migration = self.registry.get_migration(migration_info.version)
                .ok_or_else(|| anyhow!("Migration {} not found in registry", migration_info.version))?;

            let result = self.execute_migration_up(migration, &options).await?;
            if !result.success {
                // Later steps depend on this one; nothing after it may run.
                return Err(InitError::StepFailed {
                    version: result.version,
                    message: result.error_message.unwrap_or_else(|| "unknown error".to_string()),
                }
                .into());
            }
            results.push(result);
        }

        Ok(results)
    }

    async fn execute_migration_up(&self, migration: &dyn Migration, options: &MigrationOptions) -> Result<MigrationResult> {
        let version = migration.version();
        let description = migration.description().to_string();

        tracing::info!("Applying migration {} for service '{}': {}",
            version, self.config.service_name, description);

        if let Err(e) = migration.validate(&self.context).await {
            tracing::error!("Migration {} validation failed for service '{}': {}",
                version, self.config.service_name, e);
            return Ok(MigrationResult::failure(
                version,
                description,
                Utc::now(),
                0,
                format!("Validation failed: {}", e),
            ));
        }

        let start_time = Instant::now();
        let executed_at = Utc::now();

        let timeout = options.timeout.unwrap_or(self.config.default_timeout);
        let result = tokio::time::timeout(timeout, migration.up(&self.context)).await;

        let duration_ms = start_time.elapsed().as_millis() as u64;

        let migration_result = match result {
            Ok(Ok(())) => {
                tracing::info!("Migration {} applied successfully for service '{}' in {}ms",
                    version, self.config.service_name, duration_ms);
                let result = MigrationResult::success(version, description, executed_at, duration_ms);
                self.version_tracker.record_migration(&result).await?;
                result
            }
            Ok(Err(e)) => {
                tracing::error!("Migration {} failed for service '{}': {:#}",
                    version, self.config.service_name, e);
                MigrationResult::failure(version, description, executed_at, duration_ms, format!("{:#}", e))
            }
            Err(_) => {
                tracing::error!("Migration {} timed out for service '{}' after {:?}",
                    version, self.config.service_name, timeout);
                MigrationResult::failure(
                    version,
                    description,
                    executed_at,
                    duration_ms,
                    InitError::Timeout { duration: timeout }.to_string(),
                )
            }
        };
        Ok(migration_result)
    }

    /// Get the database reference
    pub fn database(&self) -> &Database {
        self.context.database()
    }

    /// Get the version tracker reference
    pub fn version_tracker(&self) -> &VersionTracker {
        &self.version_tracker
    }

    /// Get the configuration reference
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }
}

/// Builder for creating a MigrationRunner with custom configuration
pub struct MigrationRunnerBuilder {
    database: Option<Database>,
    registry: Option<MigrationRegistry>,
    config: MigrationConfig,
}

impl MigrationRunnerBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            database: None,
            registry: None,
            config: MigrationConfig::default(),
        }
    }

    /// Set the database
    pub fn database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    /// Set the registry
    pub fn registry(mut self, registry: MigrationRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the whole configuration
    pub fn config(mut self, config: MigrationConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the service name
    pub fn service_name(mut self, service_name: impl Into<String>) -> Self {
        self.config.service_name = service_name.into();
        self
    }

    /// Set the tracking collection name
    pub fn version_collection(mut self, collection_name: impl Into<String>) -> Self {
        self.config.version_collection = collection_name.into();
        self
    }

    /// Set the re-run policy
    pub fn on_existing(mut self, on_existing: OnExisting) -> Self {
        self.config.on_existing = on_existing;
        self
    }

    /// Set the default per-step timeout
    pub fn default_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    /// Build the MigrationRunner
    pub fn build(self) -> Result<MigrationRunner> {
        let database = self.database.ok_or_else(|| anyhow!("Database is required"))?;
        let registry = self.registry.ok_or_else(|| anyhow!("Registry is required"))?;

        Ok(MigrationRunner::with_config(database, registry, self.config))
    }
}

impl Default for MigrationRunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Status report
#[derive(Debug, Clone)]
pub struct MigrationRunnerStatus {
    pub service_name: String,
    pub current_version: u32,
    pub latest_available_version: u32,
    pub pending_count: usize,
    pub total_applied: u32,
    pub avg_duration_ms: f64,
    pub total_duration_ms: u64,
    /// (version, description, status) for every registered step
    pub steps: Vec<(u32, String, MigrationStatus)>,
}

impl MigrationRunnerStatus {
    /// Check if every registered step has been applied
    pub fn is_up_to_date(&self) -> bool {
        self.pending_count == 0
    }

    /// Get a summary string
    pub fn summary(&self) -> String {
        if self.is_up_to_date() {
            format!("Service '{}' is up to date at version {}",
                self.service_name, self.current_version)
        } else {
            format!(
                "Service '{}' at version {}, {} migration(s) pending (latest: {})",
                self.service_name,
                self.current_version,
                self.pending_count,
                self.latest_available_version
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(current_version: u32, pending_count: usize) -> MigrationRunnerStatus {
        MigrationRunnerStatus {
            service_name: "smarter".to_string(),
            current_version,
            latest_available_version: 3,
            pending_count,
            total_applied: current_version,
            avg_duration_ms: 100.0,
            total_duration_ms: 100 * current_version as u64,
            steps: Vec::new(),
        }
    }

    #[test]
    fn test_migration_runner_builder() {
        let builder = MigrationRunnerBuilder::new()
            .service_name("smarter")
            .version_collection("_smarter_versions")
            .on_existing(OnExisting::Fail)
            .default_timeout(std::time::Duration::from_secs(60));

        assert_eq!(builder.config.service_name, "smarter");
        assert_eq!(builder.config.version_collection, "_smarter_versions");
        assert_eq!(builder.config.on_existing, OnExisting::Fail);
        assert_eq!(builder.config.default_timeout, std::time::Duration::from_secs(60));
    }

    #[test]
    fn test_builder_requires_database() {
        let result = MigrationRunnerBuilder::new()
            .registry(MigrationRegistry::new())
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_migration_status_pending() {
        let status = status(1, 2);

        assert!(!status.is_up_to_date());
        assert_eq!(
            status.summary(),
            "Service 'smarter' at version 1, 2 migration(s) pending (latest: 3)"
        );
    }

    #[test]
    fn test_migration_status_up_to_date() {
        let status = status(3, 0);

        assert!(status.is_up_to_date());
        assert_eq!(status.summary(), "Service 'smarter' is up to date at version 3");
    }
}
