use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mongodb_initdb::{cli::connect, InitCommand, MigrationCliRunner, MigrationConfig, ServiceConfig};

use crate::{
    config::Config, counters::next_smarter_id, migrations::STEPS, models::Species,
    schema::smarter_schema, SERVICE_NAME,
};

/// Implementation of ServiceConfig for the SMARTER database
impl ServiceConfig for Config {
    fn mongodb_uri(&self) -> &str {
        &self.mongodb_uri
    }

    fn database_name(&self) -> &str {
        &self.database_name
    }

    fn connect_timeout(&self) -> Duration {
        Config::connect_timeout(self)
    }

    fn migration_config(&self) -> MigrationConfig {
        MigrationConfig {
            service_name: SERVICE_NAME.to_string(),
            on_existing: self.on_existing,
            default_timeout: self.step_timeout(),
            ..Default::default()
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "smarter-db", version)]
#[command(about = "Initialize the SMARTER sheep/goat registry database")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    #[command(flatten)]
    Bootstrap(InitCommand),
    /// Issue the next SMARTER ID for a sample
    NextId {
        /// Sheep or Goat
        #[arg(long)]
        species: Species,
        /// Two-letter country code, or "unknown"
        #[arg(long)]
        country: String,
        #[arg(long)]
        breed_code: String,
    },
}

impl Default for Command {
    fn default() -> Self {
        Command::Bootstrap(InitCommand::default())
    }
}

/// Run a parsed command line against the configured database
pub async fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command.unwrap_or_default() {
        Command::Bootstrap(command) => {
            MigrationCliRunner::new(config, smarter_schema(), STEPS)
                .execute_command(command)
                .await
        }
        Command::NextId { species, country, breed_code } => {
            let database = connect(&config).await?;
            let smarter_id = next_smarter_id(&database, &country, species, &breed_code).await?;
            tracing::info!(%species, smarter_id = %smarter_id, "Issued SMARTER ID");
            println!("{}", smarter_id);
            Ok(())
        }
    }
}

/// Run and log the outcome once, returning the process exit status
pub async fn execute(cli: Cli, config: Config) -> i32 {
    match run(cli, config).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Bootstrap failed");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb_initdb::OnExisting;

    fn config() -> Config {
        Config::from_lookup(|k| match k {
            "INIT_ON_EXISTING" => Some("fail".to_string()),
            "STEP_TIMEOUT_SECS" => Some("60".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn test_service_config() {
        let config = config();
        assert_eq!(ServiceConfig::database_name(&config), "smarter");
        assert_eq!(ServiceConfig::connect_timeout(&config), Duration::from_secs(10));

        let migration_config = config.migration_config();
        assert_eq!(migration_config.service_name, "smarter");
        assert_eq!(migration_config.version_collection, "_initdb_versions");
        assert_eq!(migration_config.on_existing, OnExisting::Fail);
        assert_eq!(migration_config.default_timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_unreachable_server_exits_with_failure() {
        let config = Config::from_lookup(|k| match k {
            "MONGODB_URI" => Some("mongodb://127.0.0.1:1".to_string()),
            "CONNECT_TIMEOUT_SECS" => Some("1".to_string()),
            _ => None,
        })
        .unwrap();
        let cli = Cli::try_parse_from([
            "smarter-db", "next-id", "--species", "sheep", "--country", "IT", "--breed-code", "TEX",
        ])
        .unwrap();

        assert_eq!(execute(cli, config).await, 1);
    }

    #[test]
    fn test_no_subcommand_runs_init() {
        let cli = Cli::try_parse_from(["smarter-db"]).unwrap();
        assert_eq!(
            cli.command.unwrap_or_default(),
            Command::Bootstrap(InitCommand::Init { dry_run: false })
        );
    }

    #[test]
    fn test_bootstrap_subcommands_are_flattened() {
        let cli = Cli::try_parse_from(["smarter-db", "init", "--dry-run"]).unwrap();
        assert_eq!(cli.command, Some(Command::Bootstrap(InitCommand::Init { dry_run: true })));

        let cli = Cli::try_parse_from(["smarter-db", "status"]).unwrap();
        assert_eq!(cli.command, Some(Command::Bootstrap(InitCommand::Status)));
    }

    #[test]
    fn test_next_id_arguments() {
        let cli = Cli::try_parse_from([
            "smarter-db", "next-id", "--species", "goat", "--country", "IT", "--breed-code", "ORO",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Some(Command::NextId {
                species: Species::Goat,
                country: "IT".to_string(),
                breed_code: "ORO".to_string(),
            })
        );

        assert!(Cli::try_parse_from([
            "smarter-db", "next-id", "--species", "cow", "--country", "IT", "--breed-code", "X",
        ])
        .is_err());
    }
}
