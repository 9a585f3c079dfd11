mod cli;

use clap::Parser;
use cli::{init_logging, init_node, run_node, seed_feeds, Cli, Commands};
use pulse_types::PulseResult;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> PulseResult<()> {
    let cli = Cli::parse();

    init_logging(&cli);

    let data_dir = cli.data_dir.clone().unwrap_or_else(|| {
        dirs::home_dir()
            .map(|h| h.join(".pulse"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/pulse"))
    });

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| data_dir.join("config.toml"));

    match cli.command {
        Commands::Run { pid_file } => {
            run_node(&config_path, &data_dir, pid_file).await?;
        }
        Commands::Init { force } => {
            init_node(&config_path, &data_dir, force)?;
        }
        Commands::SeedFeeds { urls } => {
            seed_feeds(&config_path, &data_dir, urls)?;
        }
    }

    Ok(())
}
