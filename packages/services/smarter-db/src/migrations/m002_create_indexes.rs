use anyhow::{Context, Result};
use async_trait::async_trait;

use mongodb_initdb::{Applied, Migration, MigrationContext, SchemaInitializer};

use crate::schema::smarter_schema;

/// Create the unique indexes on breeds and samples
#[derive(Default)]
pub struct CreateIndexes;

#[async_trait]
impl Migration for CreateIndexes {
    fn version(&self) -> u32 {
        2
    }

    fn description(&self) -> &str {
        "Create unique indexes"
    }

    async fn up(&self, ctx: &MigrationContext) -> Result<()> {
        let table = smarter_schema();
        let init = SchemaInitializer::new(ctx);
        let mut created = 0;

        for spec in table.collections() {
            for index in spec.indexes() {
                // Existing duplicates make the build fail; that is fatal.
                let outcome = init
                    .create_index(spec.name(), index)
                    .await
                    .with_context(|| format!("creating index {} on {}", index.name(), spec.name()))?;
                if outcome == Applied::Created {
                    created += 1;
                }
            }
        }

        tracing::info!(created, "Indexes ready");
        Ok(())
    }
}
