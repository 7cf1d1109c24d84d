//! Get Command
//!
//! Reads an object back, to a file or to stdout.

use anyhow::{bail, Context, Result};
use shardstore_engine::EncodedStorage;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// Run get command
pub async fn run(storage: &EncodedStorage, path: &str, output: Option<PathBuf>) -> Result<()> {
    let Some(stream) = storage.get(path).await? else {
        bail!("object {} not found", path);
    };
    let mut reader = stream.into_async_read();

    match output {
        Some(target) => {
            let mut file = tokio::fs::File::create(&target)
                .await
                .with_context(|| format!("creating {}", target.display()))?;

            let copied = tokio::io::copy(&mut reader, &mut file).await;
            if let Err(e) = copied {
                drop(file);
                // Leave no truncated copy behind
                let _ = tokio::fs::remove_file(&target).await;
                return Err(e).with_context(|| format!("reading {}", path));
            }
            file.sync_all().await?;
        }
        None => {
            let mut stdout = tokio::io::stdout();
            tokio::io::copy(&mut reader, &mut stdout)
                .await
                .with_context(|| format!("reading {}", path))?;
            stdout.flush().await?;
        }
    }

    Ok(())
}
