use std::collections::{BTreeMap, HashSet};
use anyhow::Result;

use crate::{InitError, Migration, VersionTracker};

/// Registry of every bootstrap step a service knows about
pub struct MigrationRegistry {
    migrations: BTreeMap<u32, Box<dyn Migration>>,
}

impl MigrationRegistry {
    /// Create a new, empty registry
    pub fn new() -> Self {
        Self {
            migrations: BTreeMap::new(),
        }
    }

    /// Register a step
    pub fn register<M: Migration + 'static>(self, migration: M) -> crate::Result<Self> {
        self.register_boxed(Box::new(migration))
    }

    /// Register a boxed step (see [`crate::create_migration_registry`])
    pub fn register_boxed(mut self, migration: Box<dyn Migration>) -> crate::Result<Self> {
        let version = migration.version();
        if self.migrations.contains_key(&version) {
            return Err(InitError::DuplicateVersion { version });
        }
        self.migrations.insert(version, migration);
        Ok(self)
    }

    /// All registered steps in ascending version order
    pub fn get_all_migrations(&self) -> Vec<&dyn Migration> {
        self.migrations.values().map(|m| m.as_ref()).collect()
    }

    /// Get a specific step by version
    pub fn get_migration(&self, version: u32) -> Option<&dyn Migration> {
        self.migrations.get(&version).map(|m| m.as_ref())
    }

    /// All registered versions, sorted
    pub fn get_versions(&self) -> Vec<u32> {
        self.migrations.keys().copied().collect()
    }

    /// Steps not yet recorded as applied, in the order they must run
    pub async fn get_pending_migrations(&self, version_tracker: &VersionTracker) -> Result<Vec<&dyn Migration>> {
        let applied_versions: HashSet<u32> = version_tracker
            .get_applied_migrations()
            .await?
            .into_iter()
            .map(|m| m.version)
            .collect();

        Ok(self
            .get_all_migrations()
            .into_iter()
            .filter(|m| !applied_versions.contains(&m.version()))
            .collect())
    }

    /// Validate the step sequence: starts at 1, no gaps
    pub fn validate_sequence(&self) -> crate::Result<()> {
        let versions = self.get_versions();

        if versions.is_empty() {
            return Ok(());
        }

        if versions[0] == 0 {
            return Err(InitError::SequenceError {
                message: "Migration versions should start from 1, not 0".to_string(),
            });
        }

        for pair in versions.windows(2) {
            if pair[1] != pair[0] + 1 {
                return Err(InitError::SequenceError {
                    message: format!(
                        "Gap in migration sequence: version {} is followed by version {}",
                        pair[0], pair[1]
                    ),
                });
            }
        }

        tracing::info!("Migration sequence validation passed for {} migrations", versions.len());
        Ok(())
    }

    /// What `migrate_up` would execute right now
    pub async fn get_migration_plan(&self, version_tracker: &VersionTracker) -> Result<MigrationPlan> {
        let current_version = version_tracker.get_latest_version().await?.unwrap_or(0);
        let pending = self.get_pending_migrations(version_tracker).await?;
        Ok(MigrationPlan::forward(current_version, pending))
    }

    /// Get the count of registered steps
    pub fn count(&self) -> usize {
        self.migrations.len()
    }

    /// Check if a version exists in the registry
    pub fn has_migration(&self, version: u32) -> bool {
        self.migrations.contains_key(&version)
    }
}

impl Default for MigrationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Execution plan
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    pub plan_type: PlanType,
    pub current_version: u32,
    pub target_version: Option<u32>,
    pub migrations: Vec<MigrationInfo>,
}

impl MigrationPlan {
    /// Build a forward plan from the pending steps
    pub fn forward(current_version: u32, pending: Vec<&dyn Migration>) -> Self {
        if pending.is_empty() {
            return Self {
                plan_type: PlanType::NoOp,
                current_version,
                target_version: Some(current_version),
                migrations: Vec::new(),
            };
        }

        Self {
            plan_type: PlanType::Forward,
            current_version,
            target_version: pending.last().map(|m| m.version()),
            migrations: pending
                .into_iter()
                .map(|m| MigrationInfo {
                    version: m.version(),
                    description: m.description().to_string(),
                })
                .collect(),
        }
    }

    /// Check if the plan has any steps to execute
    pub fn has_migrations(&self) -> bool {
        !self.migrations.is_empty()
    }

    /// Get summary string for the plan
    pub fn summary(&self) -> String {
        match self.plan_type {
            PlanType::Forward => format!(
                "Apply {} migration(s) from version {} to {}",
                self.migrations.len(),
                self.current_version,
                self.target_version.unwrap_or(0)
            ),
            PlanType::NoOp => "No migrations needed".to_string(),
        }
    }
}

/// Type of plan
#[derive(Debug, Clone, PartialEq)]
pub enum PlanType {
    Forward,
    NoOp,
}

/// Information about a step in a plan
#[derive(Debug, Clone)]
pub struct MigrationInfo {
    pub version: u32,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Migration, MigrationContext};
    use async_trait::async_trait;

    struct TestMigration {
        version: u32,
        description: String,
    }

    impl TestMigration {
        fn new(version: u32, description: &str) -> Self {
            Self {
                version,
                description: description.to_string(),
            }
        }
    }

    #[async_trait]
    impl Migration for TestMigration {
        fn version(&self) -> u32 {
            self.version
        }

        fn description(&self) -> &str {
            &self.description
        }

        async fn up(&self, _ctx: &MigrationContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_creation() {
        let registry = MigrationRegistry::new();
        assert_eq!(registry.count(), 0);
        assert!(registry.get_versions().is_empty());
    }

    #[test]
    fn test_migration_registration() {
        let registry = MigrationRegistry::new()
            .register(TestMigration::new(1, "Create collections")).unwrap()
            .register(TestMigration::new(2, "Create indexes")).unwrap();

        assert_eq!(registry.count(), 2);
        assert_eq!(registry.get_versions(), vec![1, 2]);
        assert!(registry.has_migration(1));
        assert!(registry.has_migration(2));
        assert!(!registry.has_migration(3));
    }

    #[test]
    fn test_duplicate_version_is_rejected() {
        let result = MigrationRegistry::new()
            .register(TestMigration::new(1, "Create collections")).unwrap()
            .register(TestMigration::new(1, "Create collections again"));

        assert!(matches!(result, Err(InitError::DuplicateVersion { version: 1 })));
    }

    #[test]
    fn test_migration_ordering() {
        let registry = MigrationRegistry::new()
            .register(TestMigration::new(3, "Seed counters")).unwrap()
            .register(TestMigration::new(1, "Create collections")).unwrap()
            .register(TestMigration::new(2, "Create indexes")).unwrap();

        let versions: Vec<u32> = registry.get_all_migrations().iter().map(|m| m.version()).collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }

    #[test]
    fn test_sequence_validation() {
        let registry = MigrationRegistry::new()
            .register(TestMigration::new(1, "First")).unwrap()
            .register(TestMigration::new(2, "Second")).unwrap();
        assert!(registry.validate_sequence().is_ok());

        let registry = MigrationRegistry::new()
            .register(TestMigration::new(1, "First")).unwrap()
            .register(TestMigration::new(3, "Third")).unwrap();
        assert!(matches!(registry.validate_sequence(), Err(InitError::SequenceError { .. })));

        let registry = MigrationRegistry::new()
            .register(TestMigration::new(0, "Zero")).unwrap();
        assert!(registry.validate_sequence().is_err());
    }

    #[test]
    fn test_forward_plan() {
        let first = TestMigration::new(2, "Create indexes");
        let second = TestMigration::new(3, "Seed counters");
        let pending: Vec<&dyn Migration> = vec![&first, &second];
        let plan = MigrationPlan::forward(1, pending);

        assert_eq!(plan.plan_type, PlanType::Forward);
        assert_eq!(plan.target_version, Some(3));
        assert!(plan.has_migrations());
        assert_eq!(plan.migrations[0].description, "Create indexes");
        assert_eq!(plan.summary(), "Apply 2 migration(s) from version 1 to 3");
    }

    #[test]
    fn test_empty_plan_is_noop() {
        let plan = MigrationPlan::forward(3, Vec::new());

        assert_eq!(plan.plan_type, PlanType::NoOp);
        assert!(!plan.has_migrations());
        assert_eq!(plan.summary(), "No migrations needed");
    }
}
