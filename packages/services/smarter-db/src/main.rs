use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use smarter_db::{cli::{self, Cli}, Config};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false);

    if json {
        fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(true)
            .init();
    } else {
        fmt().with_env_filter(filter).with_target(false).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    tracing::info!(
        mongodb_uri = %config.redacted_uri(),
        database = %config.database_name,
        on_existing = %config.on_existing,
        "Starting SMARTER database bootstrap"
    );

    let code = cli::execute(cli, config).await;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
