//! CLI utilities for schema bootstrap management
//!
//! Services plug in their configuration through [`ServiceConfig`] and their
//! [`SchemaTable`], and get `init`, `status`, `plan` and `verify` for free.

use std::time::Duration;

use clap::{Parser, Subcommand};
use anyhow::{Context, Result};
use bson::doc;
use mongodb::{options::ClientOptions, Client, Database};

use crate::{
    create_migration_registry, InitError, MigrationConfig, MigrationContext, MigrationOptions,
    MigrationRegistration, MigrationRunner, MigrationStatus, SchemaInitializer, SchemaTable,
};

/// CLI commands for schema bootstrap
#[derive(Parser, Debug)]
#[command(name = "initdb")]
#[command(about = "MongoDB schema bootstrap")]
pub struct InitCli {
    #[command(subcommand)]
    pub command: Option<InitCommand>,
}

/// Bootstrap subcommands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum InitCommand {
    /// Apply every pending step (collections, indexes, seed data)
    Init {
        /// Show what would be executed without touching the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Show which steps have been applied
    Status,
    /// Show the steps `init` would run
    Plan,
    /// Compare the live database with the declared schema
    Verify {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Default for InitCommand {
    fn default() -> Self {
        InitCommand::Init { dry_run: false }
    }
}

/// Configuration trait for services using the CLI
pub trait ServiceConfig {
    /// Get the MongoDB connection URI
    fn mongodb_uri(&self) -> &str;

    /// Get the database name
    fn database_name(&self) -> &str;

    /// Upper bound for establishing the connection
    fn connect_timeout(&self) -> Duration;

    /// Get the bootstrap configuration
    fn migration_config(&self) -> MigrationConfig;
}

/// Connect to the configured database, failing after `connect_timeout`
/// instead of waiting on server selection indefinitely
pub async fn connect<C: ServiceConfig>(config: &C) -> Result<Database> {
    let timeout = config.connect_timeout();

    let mut options = ClientOptions::parse(config.mongodb_uri())
        .await
        .context("invalid MongoDB connection string")?;
    options.connect_timeout = Some(timeout);
    options.server_selection_timeout = Some(timeout);
    options.app_name = Some(config.migration_config().service_name);

    let client = Client::with_options(options)?;
    let database = client.database(config.database_name());

    tokio::time::timeout(timeout, database.run_command(doc! { "ping": 1 }, None))
        .await
        .map_err(|_| InitError::Timeout { duration: timeout })??;

    tracing::info!(database = config.database_name(), "Connected to MongoDB");
    Ok(database)
}

/// Runs bootstrap commands for a service
pub struct MigrationCliRunner<C: ServiceConfig> {
    config: C,
    schema: SchemaTable,
    steps: &'static [MigrationRegistration],
}

impl<C: ServiceConfig> MigrationCliRunner<C> {
    pub fn new(config: C, schema: SchemaTable, steps: &'static [MigrationRegistration]) -> Self {
        Self { config, schema, steps }
    }

    /// Connect and execute a specific command
    pub async fn execute_command(&self, command: InitCommand) -> Result<()> {
        let database = connect(&self.config).await?;
        self.execute_with_database(command, database).await
    }

    /// Execute a command against an already connected database
    pub async fn execute_with_database(&self, command: InitCommand, database: Database) -> Result<()> {
        self.schema.validate()?;

        let registry = create_migration_registry(self.steps)?;
        let migration_config = self.config.migration_config();
        let runner = MigrationRunner::with_config(database, registry, migration_config);

        runner.initialize().await?;

        match command {
            InitCommand::Init { dry_run } => {
                let options = MigrationOptions {
                    dry_run,
                    ..Default::default()
                };

                if dry_run {
                    println!("🔍 DRY RUN: Showing what would be executed...");
                    let plan = runner.plan().await?;
                    println!("{}", plan.summary());
                    return Ok(());
                }

                println!("🚀 Initializing database '{}'...", self.config.database_name());
                let results = runner.migrate_up(Some(options)).await?;

                if results.is_empty() {
                    println!("✅ Database already initialized, nothing to do");
                } else {
                    println!("✅ Applied {} step(s):", results.len());
                    for result in results {
                        println!("  ✓ {}: {} ({}ms)",
                            result.version, result.description, result.duration_ms);
                    }
                }
            }

            InitCommand::Status => {
                let status = runner.status().await?;

                println!("📊 Bootstrap status for '{}'", status.service_name);
                println!("========================={}", "=".repeat(status.service_name.len()));
                println!("Current version: {}", status.current_version);
                println!("Latest available: {}", status.latest_available_version);
                println!("Pending steps: {}", status.pending_count);
                for (version, description, state) in &status.steps {
                    let mark = if *state == MigrationStatus::Applied { "✓" } else { "·" };
                    println!("  {} {}: {}", mark, version, description);
                }

                if status.total_applied > 0 {
                    println!("Average duration: {:.1}ms", status.avg_duration_ms);
                    println!("Total duration: {}ms", status.total_duration_ms);
                }

                println!();
                if status.is_up_to_date() {
                    println!("✅ {}", status.summary());
                } else {
                    println!("⚠️  {}", status.summary());
                }
            }

            InitCommand::Plan => {
                let plan = runner.plan().await?;

                println!("📋 Bootstrap plan for '{}'", runner.config().service_name);
                println!("======================={}", "=".repeat(runner.config().service_name.len()));
                println!("{}", plan.summary());

                if plan.has_migrations() {
                    println!("\nSteps to execute:");
                    for info in &plan.migrations {
                        println!("  {} - {}", info.version, info.description);
                    }
                }
            }

            InitCommand::Verify { json } => {
                let ctx = MigrationContext::new(runner.database().clone(), runner.config().on_existing);
                let report = SchemaInitializer::new(&ctx).verify(&self.schema).await?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else if report.is_ok() {
                    println!("✅ {}", report.summary());
                } else {
                    println!("❌ {}", report.summary());
                }

                if !report.is_ok() {
                    anyhow::bail!("schema verification failed: {}", report.summary());
                }
            }
        }

        Ok(())
    }
}
