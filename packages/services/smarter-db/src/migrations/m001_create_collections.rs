use anyhow::Result;
use async_trait::async_trait;

use mongodb_initdb::{Migration, MigrationContext, SchemaInitializer};

use crate::schema::smarter_schema;

/// Create every declared collection with its validator
#[derive(Default)]
pub struct CreateCollections;

#[async_trait]
impl Migration for CreateCollections {
    fn version(&self) -> u32 {
        1
    }

    fn description(&self) -> &str {
        "Create validated collections"
    }

    async fn validate(&self, _ctx: &MigrationContext) -> Result<()> {
        smarter_schema().validate()?;
        Ok(())
    }

    async fn up(&self, ctx: &MigrationContext) -> Result<()> {
        let table = smarter_schema();
        let init = SchemaInitializer::new(ctx);

        init.preflight(&table).await?;

        for spec in table.collections() {
            init.create_collection(spec).await?;
        }

        tracing::info!(collections = table.collections().len(), "Collections ready");
        Ok(())
    }
}
