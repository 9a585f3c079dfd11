use clap::{Parser, Subcommand};
use std::path::PathBuf;

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "pulse")]
#[command(version = BUILD_VERSION)]
#[command(about = "Pulse - real-time node coordination and content broadcast daemon")]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(short, long, global = true, value_name = "FILE", help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[arg(short = 'd', long, global = true, value_name = "DIR", env = "PULSE_DATA_DIR", help = "Data directory path")]
    pub data_dir: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase verbosity (-v, -vv, -vvv)")]
    pub verbose: u8,

    #[arg(short, long, global = true, help = "Suppress non-error output")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Start the daemon")]
    #[command(long_about = "Start the Pulse daemon.\n\nRuns the node channel server, the HTTP API and the feed ingestion worker.")]
    Run {
        #[arg(long, value_name = "FILE", help = "Write PID to file")]
        pid_file: Option<PathBuf>,
    },

    #[command(about = "Initialize configuration and data directory")]
    Init {
        #[arg(short, long, help = "Overwrite existing configuration")]
        force: bool,
    },

    #[command(about = "Seed feed sources into storage")]
    #[command(name = "seed-feeds")]
    SeedFeeds {
        #[arg(value_name = "URL", help = "Feed URLs; defaults to seed_urls from config")]
        urls: Vec<String>,
    },
}
