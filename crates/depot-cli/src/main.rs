use anyhow::Result;
use clap::Parser;
use depot_cli::{Cli, DepotConfig, run};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = DepotConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(version = depot::version(), "depot starting");

    let mut stdout = tokio::io::stdout();
    let result = run(cli, &config, &mut stdout).await;
    if let Err(e) = &result {
        error!(error = %e, "command failed");
    }
    result
}
