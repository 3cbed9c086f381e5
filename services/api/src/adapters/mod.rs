pub mod db;
pub mod file_kv;
pub mod remote;

pub use db::DbAdapter;
pub use file_kv::FileKeyValueStore;
pub use remote::RemoteStudyStore;

use crate::config::{Config, StorageMode};
use crate::error::ApiError;
use research_interview_core::ports::{Clock, StudyStore};
use research_interview_core::store::EmbeddedStudyStore;
use std::sync::Arc;
use tracing::info;

/// Picks the study backend for a client process. The choice is made once and
/// every caller shares the returned store.
pub fn build_study_store(
    config: &Config,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn StudyStore>, ApiError> {
    match config.storage_mode {
        StorageMode::Embedded => {
            info!("Using embedded study storage in {}", config.data_dir.display());
            let blob = Arc::new(FileKeyValueStore::new(config.data_dir.clone()));
            Ok(Arc::new(EmbeddedStudyStore::new(blob, clock)))
        }
        StorageMode::Remote => {
            info!("Using remote study storage at {}", config.api_url);
            Ok(Arc::new(RemoteStudyStore::new(
                &config.api_url,
                config.request_timeout,
            )?))
        }
    }
}
