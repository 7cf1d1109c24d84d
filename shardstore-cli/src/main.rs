//! shardstore CLI
//!
//! Command-line front end for a local erasure-coded object store.
//!
//! # Commands
//! - `put` - Store a file as an object
//! - `get` - Read an object back to a file or stdout
//! - `stat` - Print the index entry of an object as JSON
//! - `status` - Show object count and per-backend usage
//!
//! # Configuration
//! Config file: ./shardstore.toml (see `--config`), overridden by
//! `SHARDSTORE_*` environment variables and then by command-line flags.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shardstore_engine::{EncodedStorage, EngineConfig};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "shardstore")]
#[command(about = "Erasure-coded object storage")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "shardstore.toml")]
    config: PathBuf,

    /// Storage root (overrides config file)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a file as an object
    Put {
        /// Object path inside the store
        path: String,

        /// File to read the content from
        file: PathBuf,
    },

    /// Read an object
    Get {
        /// Object path inside the store
        path: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the index entry of an object as JSON
    Stat {
        /// Object path inside the store
        path: String,
    },

    /// Show object count and backend usage
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout may carry object content
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(log_filter(cli.verbose, std::env::var("RUST_LOG").ok()))
        .init();

    // Priority: CLI args > environment > config file > defaults
    let config = if cli.config.exists() {
        EngineConfig::from_file(&cli.config)
            .with_context(|| format!("loading {}", cli.config.display()))?
    } else {
        debug!(path = ?cli.config, "No config file, using defaults");
        EngineConfig::default()
    }
    .with_env_overrides()
    .with_overrides(cli.root);

    let storage = EncodedStorage::open(config)
        .await
        .context("opening storage")?;

    match cli.command {
        Commands::Put { path, file } => commands::put(&storage, &path, &file).await?,
        Commands::Get { path, output } => commands::get(&storage, &path, output).await?,
        Commands::Stat { path } => commands::stat(&storage, &path).await?,
        Commands::Status => commands::status(&storage).await?,
    }

    Ok(())
}

/// `RUST_LOG` when set and valid, `warn` otherwise; `--verbose` adds `debug`
fn log_filter(verbose: bool, env: Option<String>) -> EnvFilter {
    let filter = env
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));

    if verbose {
        filter.add_directive(tracing::Level::DEBUG.into())
    } else {
        filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_defaults_to_warn() {
        assert_eq!(log_filter(false, None).to_string(), "warn");
        assert_eq!(log_filter(false, Some("shardstore=loud".into())).to_string(), "warn");
    }

    #[test]
    fn test_log_filter_honors_rust_log() {
        let filter = log_filter(false, Some("shardstore_engine=info".into()));
        assert_eq!(filter.to_string(), "shardstore_engine=info");
    }

    #[test]
    fn test_verbose_adds_debug() {
        let filter = log_filter(true, Some("shardstore_engine=info".into())).to_string();
        assert!(filter.contains("shardstore_engine=info"));
        assert!(filter.contains("debug"));
    }
}
