use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Serialize `value` and replace `path` atomically; returns the written bytes' digest.
///
/// Readers observe either the previous file or the new one, never a prefix.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<String> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    let digest = sha256_hex(&bytes);
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(digest)
}

/// Read and decode `path`, or `None` when it does not exist.
pub async fn read_json_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn atomic_write_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("artifact.json");

        let digest = write_json_atomic(&path, &serde_json::json!({"a": 1}))
            .await
            .unwrap();
        assert_eq!(digest.len(), 64);
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let back: Option<serde_json::Value> = read_json_optional(&path).await.unwrap();
        assert_eq!(back, Some(serde_json::json!({"a": 1})));
    }

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let tmp = TempDir::new().unwrap();
        let back: Option<serde_json::Value> =
            read_json_optional(&tmp.path().join("absent.json")).await.unwrap();
        assert!(back.is_none());
    }
}
