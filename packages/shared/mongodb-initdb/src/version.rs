use mongodb::{Collection, Database, IndexModel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use bson::doc;
use futures::TryStreamExt;

use crate::{MigrationConfig, MigrationResult, MigrationStatus, Result};

/// An applied-step record stored in the tracking collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationVersion {
    pub version: u32,
    pub description: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub applied_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub service_name: String,
}

/// Tracks which bootstrap steps have been applied to the database
pub struct VersionTracker {
    collection: Collection<MigrationVersion>,
    service_name: String,
}

impl VersionTracker {
    pub fn new(database: &Database, config: &MigrationConfig) -> Self {
        let collection = database.collection::<MigrationVersion>(&config.version_collection);
        Self {
            collection,
            service_name: config.service_name.clone(),
        }
    }

    /// Create the tracking collection indexes
    pub async fn initialize(&self) -> Result<()> {
        // One record per (service, version)
        self.collection
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "service_name": 1, "version": 1 })
                    .options(
                        mongodb::options::IndexOptions::builder()
                            .unique(true)
                            .build()
                    )
                    .build(),
                None,
            )
            .await?;

        tracing::info!("Version tracking initialized for service: {}", self.service_name);
        Ok(())
    }

    /// Record that a step has been applied
    pub async fn record_migration(&self, result: &MigrationResult) -> Result<()> {
        if !result.success {
            return Ok(()); // Failed steps stay pending
        }

        let version_record = MigrationVersion {
            version: result.version,
            description: result.description.clone(),
            applied_at: result.executed_at,
            duration_ms: result.duration_ms,
            service_name: self.service_name.clone(),
        };

        self.collection
            .replace_one(
                doc! {
                    "service_name": &self.service_name,
                    "version": result.version
                },
                &version_record,
                mongodb::options::ReplaceOptions::builder()
                    .upsert(true)
                    .build(),
            )
            .await?;

        tracing::info!("Recorded version {} for service {}", result.version, self.service_name);
        Ok(())
    }

    /// All applied steps for this service, sorted by version
    pub async fn get_applied_migrations(&self) -> Result<Vec<MigrationVersion>> {
        let cursor = self.collection
            .find(
                doc! { "service_name": &self.service_name },
                mongodb::options::FindOptions::builder()
                    .sort(doc! { "version": 1 })
                    .build(),
            )
            .await?;

        let migrations: Vec<MigrationVersion> = cursor.try_collect().await?;
        Ok(migrations)
    }

    /// Latest applied version for this service
    pub async fn get_latest_version(&self) -> Result<Option<u32>> {
        let result = self.collection
            .find_one(
                doc! { "service_name": &self.service_name },
                mongodb::options::FindOneOptions::builder()
                    .sort(doc! { "version": -1 })
                    .build(),
            )
            .await?;

        Ok(result.map(|m| m.version))
    }

    /// Check if a specific version has been applied for this service
    pub async fn is_applied(&self, version: u32) -> Result<bool> {
        let count = self.collection
            .count_documents(
                doc! {
                    "service_name": &self.service_name,
                    "version": version
                },
                None,
            )
            .await?;

        Ok(count > 0)
    }

    /// Status of a specific version
    pub async fn get_status(&self, version: u32) -> Result<MigrationStatus> {
        if self.is_applied(version).await? {
            Ok(MigrationStatus::Applied)
        } else {
            Ok(MigrationStatus::Pending)
        }
    }

    /// Statistics about applied steps for this service
    pub async fn get_stats(&self) -> Result<MigrationStats> {
        let applied = self.get_applied_migrations().await?;

        let total_duration_ms: u64 = applied.iter().map(|m| m.duration_ms).sum();
        let avg_duration_ms = if applied.is_empty() {
            0.0
        } else {
            total_duration_ms as f64 / applied.len() as f64
        };

        Ok(MigrationStats {
            total_applied: applied.len() as u32,
            latest_version: applied.iter().map(|m| m.version).max(),
            avg_duration_ms,
            total_duration_ms,
        })
    }
}

/// Bootstrap statistics
#[derive(Debug, Clone)]
pub struct MigrationStats {
    pub total_applied: u32,
    pub latest_version: Option<u32>,
    pub avg_duration_ms: f64,
    pub total_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_record_serializes_for_tracking_collection() {
        let record = MigrationVersion {
            version: 2,
            description: "Create indexes".to_string(),
            applied_at: Utc::now(),
            duration_ms: 12,
            service_name: "smarter".to_string(),
        };

        let document = bson::to_document(&record).unwrap();
        assert_eq!(document.get_str("service_name").unwrap(), "smarter");
        assert!(document.get_datetime("applied_at").is_ok());

        let back: MigrationVersion = bson::from_document(document).unwrap();
        assert_eq!(back.version, 2);
    }
}
