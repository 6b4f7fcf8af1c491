//! Conversion cache CLI commands.

use clap::Subcommand;

use crate::config::BridgeConfig;
use crate::media::{ConversionCache, ConversionKey};

#[derive(Subcommand, Debug, Clone)]
pub enum CacheCommand {
    /// Show artifact count and disk usage
    Stats,

    /// Show the entry stored under a key
    Show {
        /// Conversion key (`<hash>:<codec>[:<variant>]`)
        key: ConversionKey,
    },

    /// Delete the artifact stored under a key
    Invalidate {
        /// Conversion key (`<hash>:<codec>[:<variant>]`)
        key: ConversionKey,
    },

    /// Remove partial artifacts left behind by interrupted conversions
    Sweep,
}

/// Run a cache command.
pub async fn run_cache_command(config: &BridgeConfig, cmd: CacheCommand) -> anyhow::Result<()> {
    let cache = ConversionCache::open(&config.cache.dir).await?;

    match cmd {
        CacheCommand::Stats => {
            let stats = cache.stats().await?;
            println!("Cache: {}", cache.dir().display());
            println!("  Files: {}", stats.files);
            println!("  Size:  {}", format_bytes(stats.bytes));
        }
        CacheCommand::Show { key } => match cache.lookup(&key) {
            Some(entry) => {
                println!("Key:     {}", entry.key);
                println!("Path:    {}", entry.path.display());
                println!("Codec:   {}", entry.kind);
                println!("Size:    {}", format_bytes(entry.size));
                println!("Created: {}", entry.created_at.to_rfc3339());
            }
            None => println!("No entry for {}", key),
        },
        CacheCommand::Invalidate { key } => {
            if cache.invalidate(&key)? {
                println!("Invalidated {}", key);
            } else {
                println!("No entry for {}", key);
            }
        }
        CacheCommand::Sweep => {
            let removed = cache.sweep().await?;
            println!("Removed {} partial artifact(s).", removed);
        }
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    match bytes {
        b if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{} B", b),
    }
}
