//! Atomic JSON persistence.
//!
//! Artifacts are written to a sibling temp file and renamed over the target,
//! so a concurrent reader sees either the old file or the new one.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use batchscan_common::error::{Error, Result, ResultExt};

use super::result::BatchResult;

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "artifact".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if path.file_name().is_none() {
        return Err(Error::InvalidInput(format!(
            "output path has no file name: {}",
            path.display()
        )));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .context(format!("creating {}", parent.display()))?;
    }

    let body = serde_json::to_vec_pretty(value)?;
    let tmp = temp_path(path);

    tokio::fs::write(&tmp, &body)
        .await
        .context(format!("writing {}", tmp.display()))?;

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(Error::from(e).with_context(format!("renaming into {}", path.display())));
    }

    debug!(path = %path.display(), bytes = body.len(), "Artifact written");
    Ok(())
}

/// Read a JSON artifact.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let body = match tokio::fs::read(path).await {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(Error::from(e).with_context(format!("reading {}", path.display()))),
    };
    serde_json::from_slice(&body).context(format!("parsing {}", path.display()))
}

/// Persist a scan artifact.
pub async fn save_batch_result(path: &Path, result: &BatchResult) -> Result<()> {
    write_json_atomic(path, result).await
}

/// Load a previously persisted scan artifact.
pub async fn load_batch_result(path: &Path) -> Result<BatchResult> {
    read_json(path).await
}
