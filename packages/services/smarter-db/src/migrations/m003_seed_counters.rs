use anyhow::{anyhow, Result};
use async_trait::async_trait;

use mongodb_initdb::{Migration, MigrationContext, SchemaInitializer};

use crate::schema::smarter_schema;

/// Insert the per-species sample counters, starting at 0
#[derive(Default)]
pub struct SeedCounters;

#[async_trait]
impl Migration for SeedCounters {
    fn version(&self) -> u32 {
        3
    }

    fn description(&self) -> &str {
        "Seed sample counters"
    }

    async fn up(&self, ctx: &MigrationContext) -> Result<()> {
        let table = smarter_schema();
        let collection = table
            .counter_collection()
            .ok_or_else(|| anyhow!("schema declares no counter collection"))?;

        let outcomes = SchemaInitializer::new(ctx)
            .seed_counters(collection, table.counter_seeds())
            .await?;

        tracing::info!(collection, counters = outcomes.len(), "Counters ready");
        Ok(())
    }
}
