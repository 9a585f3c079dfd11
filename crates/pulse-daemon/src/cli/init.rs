use pulse_daemon::{PulseConfig, PulseStorage};
use pulse_types::{PulseError, PulseResult};
use std::path::PathBuf;

pub fn init_node(config_path: &PathBuf, data_dir: &PathBuf, force: bool) -> PulseResult<()> {
    println!("Initializing Pulse daemon...");

    if config_path.exists() && !force {
        println!("Configuration already exists at {:?}", config_path);
        println!("Use --force to overwrite");
        return Ok(());
    }

    std::fs::create_dir_all(data_dir)
        .map_err(|e| PulseError::Config(format!("Failed to create data directory: {}", e)))?;

    let mut config = PulseConfig::default();
    config.data_dir = data_dir.clone();
    config.save(config_path)?;

    println!("[+] Configuration written to {:?}", config_path);
    println!("[+] Data directory: {:?}", data_dir);
    println!();
    println!("Add feed sources with 'pulse seed-feeds <url>...', then 'pulse run'.");
    Ok(())
}

/// Registers feed sources, idempotently by URL. With no explicit URLs
/// the config's seed list is used.
pub fn seed_feeds(config_path: &PathBuf, data_dir: &PathBuf, urls: Vec<String>) -> PulseResult<()> {
    let config = PulseConfig::load(config_path)?;

    let urls = if urls.is_empty() {
        config.feeds.seed_urls.clone()
    } else {
        urls
    };

    if urls.is_empty() {
        println!("No feed URLs given and none configured under [feeds] seed_urls.");
        return Ok(());
    }

    for url in &urls {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(PulseError::Config(format!("Invalid feed URL: {}", url)));
        }
    }

    let storage = PulseStorage::open(data_dir.join("data"))?;
    for url in &urls {
        let record = storage.seed_source(url)?;
        println!("[+] Source {} -> id {}", record.url, record.id);
    }
    storage.flush()?;

    println!("Seeded {} sources.", urls.len());
    Ok(())
}
