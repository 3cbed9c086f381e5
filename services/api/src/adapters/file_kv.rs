//! services/api/src/adapters/file_kv.rs
//!
//! A `KeyValueStore` that keeps one file per key under a data directory. It is
//! the durable local storage behind the embedded study store and the current
//! study pointer.

use async_trait::async_trait;
use research_interview_core::ports::{KeyValueStore, PortError, PortResult};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(file_name)
    }
}

fn io_error(key: &str, e: std::io::Error) -> PortError {
    PortError::BackendUnavailable(format!("Local storage failed for '{}': {}", key, e))
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(key, e)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> PortResult<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(key, e))?;

        // Readers see either the old value or the new one, never a partial write.
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value).await.map_err(|e| io_error(key, e))?;
        fs::rename(&tmp, &path).await.map_err(|e| io_error(key, e))?;
        debug!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> PortResult<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(key, e)),
        }
    }
}
