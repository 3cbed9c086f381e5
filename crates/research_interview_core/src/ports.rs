//! crates/research_interview_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture: the survey gate,
//! the conversation loop and the aggregation pipeline only ever see these ports,
//! never a concrete database, HTTP client or browser storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    DerivedTheme, Insight, Message, Need, Participant, Study, StudySummaryAnalysis, Theme,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
    /// Raised by document or speech extraction; the core never inspects it.
    #[error("External extraction failed: {0}")]
    ExternalExtraction(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Persistence for whole studies. Every backend must behave identically.
#[async_trait]
pub trait StudyStore: Send + Sync {
    /// Loads every stored study. No ordering is guaranteed.
    async fn load_all(&self) -> PortResult<Vec<Study>>;

    /// Returns `Ok(None)` when no study has this id.
    async fn load(&self, id: &str) -> PortResult<Option<Study>>;

    /// Upserts by id and stamps `updated_at`; `created_at` is left as given.
    async fn save(&self, study: &Study) -> PortResult<()>;

    /// Removes the study if present. Deleting a missing id is not an error.
    async fn delete(&self, id: &str) -> PortResult<()>;
}

/// A small string blob store, the stand-in for browser local/session storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> PortResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> PortResult<()>;
    async fn remove(&self, key: &str) -> PortResult<()>;
}

/// The interviewer: everything a generative model would otherwise decide.
#[async_trait]
pub trait InterviewerService: Send + Sync {
    /// The next agent utterance for this transcript.
    async fn next_message(&self, theme: &Theme, messages: &[Message]) -> PortResult<String>;

    /// A fresh batch of needs that replaces whatever the participant had.
    async fn generate_needs(&self, theme: &Theme, messages: &[Message]) -> PortResult<Vec<Need>>;

    /// One consolidated insight across the given participants.
    async fn synthesize_insight(
        &self,
        theme: &Theme,
        participants: &[Participant],
    ) -> PortResult<Insight>;

    /// Title, description and focus areas drawn from a research brief.
    async fn derive_theme(&self, document_text: &str) -> PortResult<DerivedTheme>;

    /// Findings and a build prompt drawn from the text of finished study summaries.
    async fn analyze_study_summaries(&self, documents: &[String]) -> PortResult<StudySummaryAnalysis>;
}

/// Wall-clock time, injected so windows and stamps are testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The pause an interviewer takes before answering. Only affects timing.
#[async_trait]
pub trait Latency: Send + Sync {
    async fn pause(&self);
}
