//! Status Command
//!
//! Shows object count and per-backend usage.

use super::format_bytes;
use anyhow::Result;
use console::style;
use shardstore_engine::EncodedStorage;

/// Run status command
pub async fn run(storage: &EncodedStorage) -> Result<()> {
    let config = storage.config();

    println!("{}", style("shardstore Status").bold().underlined());
    println!();
    println!("  Root:         {}", config.root.display());
    println!(
        "  Erasure:      {} data + {} parity ({:?})",
        config.data_shards, config.parity_shards, config.algorithm
    );
    println!("  Block Size:   {}", format_bytes(config.block_size as u64));
    println!("  Objects:      {}", style(storage.object_count().await).cyan());
    println!();

    println!("  {}", style("Backends:").bold());
    let mut offline = 0;
    for (slot, stats) in storage.backend_stats().await.into_iter().enumerate() {
        match stats {
            Ok(stats) => println!(
                "    {} #{:<3} {:>8} shards  {:>10}",
                style("●").green(),
                slot,
                stats.shard_count,
                format_bytes(stats.bytes_used)
            ),
            Err(e) => {
                offline += 1;
                println!("    {} #{:<3} {}", style("●").red(), slot, style(e).red());
            }
        }
    }

    if offline > config.parity_shards {
        println!();
        println!(
            "{}",
            style(format!(
                "{} backends unavailable; objects cannot be read",
                offline
            ))
            .yellow()
        );
    }

    Ok(())
}
