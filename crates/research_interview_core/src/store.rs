//! crates/research_interview_core/src/store.rs
//!
//! The embedded `StudyStore`: every study serialized into one JSON array held
//! under a fixed key of a local `KeyValueStore`.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::domain::Study;
use crate::ports::{Clock, KeyValueStore, PortError, PortResult, StudyStore};

/// Fixed key holding the serialized study collection.
pub const STUDIES_KEY: &str = "user-research-studies";

/// A study store backed by a single blob in a local key-value store.
pub struct EmbeddedStudyStore {
    blob: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    // Serializes read-modify-write of the blob within this process.
    write_lock: Mutex<()>,
}

impl EmbeddedStudyStore {
    pub fn new(blob: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            blob,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// Reads the collection. A missing or unreadable blob is an empty collection.
    async fn read_all(&self) -> PortResult<Vec<Study>> {
        let Some(raw) = self.blob.get(STUDIES_KEY).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Vec<Study>>(&raw) {
            Ok(studies) => Ok(studies),
            Err(e) => {
                warn!("Ignoring unreadable study collection: {}", e);
                Ok(Vec::new())
            }
        }
    }

    async fn write_all(&self, studies: &[Study]) -> PortResult<()> {
        let raw = serde_json::to_string(studies)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        self.blob.set(STUDIES_KEY, &raw).await
    }
}

#[async_trait]
impl StudyStore for EmbeddedStudyStore {
    async fn load_all(&self) -> PortResult<Vec<Study>> {
        self.read_all().await
    }

    async fn load(&self, id: &str) -> PortResult<Option<Study>> {
        Ok(self.read_all().await?.into_iter().find(|s| s.id == id))
    }

    async fn save(&self, study: &Study) -> PortResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut studies = self.read_all().await?;
        let mut stored = study.clone();
        stored.updated_at = self.clock.now();

        match studies.iter_mut().find(|s| s.id == study.id) {
            Some(existing) => {
                // updated_at never moves backwards, even if the clock does.
                stored.updated_at = stored.updated_at.max(existing.updated_at);
                *existing = stored;
            }
            None => studies.push(stored),
        }
        self.write_all(&studies).await
    }

    async fn delete(&self, id: &str) -> PortResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut studies = self.read_all().await?;
        let before = studies.len();
        studies.retain(|s| s.id != id);
        if studies.len() == before {
            return Ok(());
        }
        self.write_all(&studies).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::{Insight, Message, MessageRole, Theme};
    use crate::kv::MemoryKeyValueStore;
    use chrono::Duration;

    fn setup() -> (EmbeddedStudyStore, Arc<ManualClock>, Arc<MemoryKeyValueStore>) {
        let clock = Arc::new(ManualClock::at_millis(1_000_000));
        let blob = Arc::new(MemoryKeyValueStore::new());
        let store = EmbeddedStudyStore::new(blob.clone(), clock.clone());
        (store, clock, blob)
    }

    fn sample_study(clock: &ManualClock) -> Study {
        let theme = Theme::new("Booking a visit", "How people book", clock.now())
            .with_focus_areas(["wait times", "clarity"]);
        Study::new(theme, clock.now())
    }

    #[tokio::test]
    async fn saving_twice_keeps_one_record_and_advances_updated_at() {
        let (store, clock, _) = setup();
        let study = sample_study(&clock);

        store.save(&study).await.unwrap();
        let first = store.load(&study.id).await.unwrap().unwrap();
        clock.advance(Duration::milliseconds(5));
        store.save(&study).await.unwrap();
        let second = store.load(&study.id).await.unwrap().unwrap();

        assert_eq!(store.load_all().await.unwrap().len(), 1);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(second.updated_at, clock.now());
    }

    #[tokio::test]
    async fn store_overrides_caller_updated_at() {
        let (store, clock, _) = setup();
        let mut study = sample_study(&clock);
        study.updated_at = clock.now() - Duration::days(30);
        store.save(&study).await.unwrap();
        let loaded = store.load(&study.id).await.unwrap().unwrap();
        assert_eq!(loaded.updated_at, clock.now());
    }

    #[tokio::test]
    async fn updated_at_is_monotonic_when_clock_steps_back() {
        let (store, clock, _) = setup();
        let study = sample_study(&clock);
        store.save(&study).await.unwrap();
        let first = store.load(&study.id).await.unwrap().unwrap().updated_at;
        clock.advance(Duration::seconds(-60));
        store.save(&study).await.unwrap();
        let second = store.load(&study.id).await.unwrap().unwrap().updated_at;
        assert!(second >= first);
    }

    #[tokio::test]
    async fn created_at_survives_updates() {
        let (store, clock, _) = setup();
        let study = sample_study(&clock);
        store.save(&study).await.unwrap();

        clock.advance(Duration::minutes(10));
        let mut loaded = store.load(&study.id).await.unwrap().unwrap();
        loaded.participants[0]
            .messages
            .push(Message::new(MessageRole::User, "It takes ages", clock.now()));
        store.save(&loaded).await.unwrap();

        let reloaded = store.load(&study.id).await.unwrap().unwrap();
        assert_eq!(reloaded.created_at, study.created_at);
        assert_eq!(reloaded.participants[0].messages.len(), 1);
    }

    #[tokio::test]
    async fn round_trip_preserves_study_content() {
        let (store, clock, _) = setup();
        let mut study = sample_study(&clock);
        study.open_from = Some(clock.now());
        study.open_until = Some(clock.now() + Duration::days(7));
        study.consolidated_insight = Some(Insight {
            id: "insight-1".to_string(),
            title: "t".to_string(),
            summary: "s".to_string(),
            key_needs: Vec::new(),
            patterns: None,
            recommendations: Some(vec!["r".to_string()]),
            created_at: clock.now(),
        });
        store.save(&study).await.unwrap();

        let loaded = store.load(&study.id).await.unwrap().unwrap();
        assert_eq!(loaded.theme, study.theme);
        assert_eq!(loaded.participants, study.participants);
        assert_eq!(loaded.consolidated_insight, study.consolidated_insight);
        assert_eq!(loaded.open_from, study.open_from);
        assert_eq!(loaded.open_until, study.open_until);
    }

    #[tokio::test]
    async fn missing_study_is_absent_not_an_error() {
        let (store, _, _) = setup();
        assert!(store.load("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (store, clock, _) = setup();
        let study = sample_study(&clock);
        store.save(&study).await.unwrap();
        store.delete(&study.id).await.unwrap();
        store.delete(&study.id).await.unwrap();
        assert!(store.load(&study.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_blob_reads_as_empty() {
        let (store, _, blob) = setup();
        blob.set(STUDIES_KEY, "{not json").await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blob_is_a_single_json_array() {
        let (store, clock, blob) = setup();
        store.save(&sample_study(&clock)).await.unwrap();
        store.save(&sample_study(&clock)).await.unwrap();
        let raw = blob.get(STUDIES_KEY).await.unwrap().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.as_array().map(Vec::len), Some(2));
    }
}
