//! crates/research_interview_core/src/domain.rs
//!
//! Defines the core data structures for a research study.
//! The serde attributes pin the JSON wire shape shared by the embedded blob,
//! the CRUD service and its remote clients: camelCase names and integer
//! millisecond timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ports::{PortError, PortResult};

/// Builds an opaque identifier such as `study-6f1c...`.
pub fn generate_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

/// Who authored a message in the interview transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Agent,
    User,
}

/// A single message in the research conversation. Never edited once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[cfg_attr(feature = "openapi", schema(value_type = i64))]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: generate_id("msg"),
            role,
            content: content.into(),
            timestamp,
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }
}

/// The topic a coordinator sets before anyone is interviewed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Consulted cyclically by the interviewer, so order matters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_areas: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_web_service: Option<String>,
    /// Text extracted from an uploaded research brief, kept opaque.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_document_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_document_name: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[cfg_attr(feature = "openapi", schema(value_type = i64))]
    pub created_at: DateTime<Utc>,
}

impl Theme {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_id("theme"),
            title: title.into(),
            description: description.into(),
            focus_areas: None,
            existing_web_service: None,
            source_document_text: None,
            source_document_name: None,
            created_at,
        }
    }

    pub fn with_focus_areas<I, S>(mut self, areas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.focus_areas = Some(areas.into_iter().map(Into::into).collect());
        self
    }

    /// Rejects themes the interviewer cannot work with.
    pub fn validate(&self) -> PortResult<()> {
        if self.title.trim().is_empty() {
            return Err(PortError::InvalidPayload(
                "Theme title must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fields extracted from a research brief to pre-fill a theme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct DerivedTheme {
    pub title: String,
    pub description: String,
    pub focus_areas: Vec<String>,
}

/// One problem found in the study summaries, with ways to address it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySummaryFinding {
    pub finding: String,
    pub resolutions: Vec<String>,
}

/// What to build, read off a set of finished study summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySummaryAnalysis {
    pub synthesis: String,
    pub findings: Vec<StudySummaryFinding>,
    /// A ready-to-paste prompt for building the service with the design system.
    pub design_system_prompt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// A structured user need extracted from one participant's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Need {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Quote from the conversation supporting this need.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[cfg_attr(feature = "openapi", schema(value_type = i64))]
    pub created_at: DateTime<Utc>,
}

/// One respondent's transcript and the needs derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub needs: Vec<Need>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[cfg_attr(feature = "openapi", schema(value_type = i64))]
    pub created_at: DateTime<Utc>,
}

impl Participant {
    /// Creates an empty participant labelled by its 1-based position.
    pub fn new(position: usize, created_at: DateTime<Utc>) -> Self {
        Self {
            id: generate_id("participant"),
            label: format!("Participant {}", position),
            messages: Vec::new(),
            needs: Vec::new(),
            created_at,
        }
    }

    pub fn user_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_user()).count()
    }

    /// True once the participant has said something or has derived needs.
    pub fn has_content(&self) -> bool {
        !self.needs.is_empty() || self.messages.iter().any(Message::is_user)
    }
}

/// A need merged across participants inside an [`Insight`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct KeyNeed {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_count: Option<usize>,
}

/// A synthesized snapshot across participants or studies. Replaced, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub key_needs: Vec<KeyNeed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<String>>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[cfg_attr(feature = "openapi", schema(value_type = i64))]
    pub created_at: DateTime<Utc>,
}

/// The unit of persistence: one theme, its participants and the latest insight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Study {
    pub id: String,
    pub theme: Theme,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub consolidated_insight: Option<Insight>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<i64>))]
    pub open_from: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<i64>))]
    pub open_until: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[cfg_attr(feature = "openapi", schema(value_type = i64))]
    pub created_at: DateTime<Utc>,
    /// Stamped by the store on every save.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[cfg_attr(feature = "openapi", schema(value_type = i64))]
    pub updated_at: DateTime<Utc>,
}

impl Study {
    /// A new study always starts with one participant attached.
    pub fn new(theme: Theme, now: DateTime<Utc>) -> Self {
        Self {
            id: generate_id("study"),
            theme,
            participants: vec![Participant::new(1, now)],
            consolidated_insight: None,
            open_from: None,
            open_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn participant(&self, participant_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == participant_id)
    }

    pub fn participant_mut(&mut self, participant_id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == participant_id)
    }

    /// Appends a fresh participant labelled after the current count.
    pub fn add_participant(&mut self, now: DateTime<Utc>) -> &Participant {
        let participant = Participant::new(self.participants.len() + 1, now);
        self.participants.push(participant);
        &self.participants[self.participants.len() - 1]
    }

    /// Swaps in `updated` at the position of the participant with the same id.
    pub fn replace_participant(&mut self, updated: Participant) -> PortResult<()> {
        let slot = self.participant_mut(&updated.id).ok_or_else(|| {
            PortError::NotFound(format!("Participant {} not found", updated.id))
        })?;
        *slot = updated;
        Ok(())
    }

    pub fn participants_with_content(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.has_content())
    }

    /// A study-level synthesis needs two participants and at least one answer.
    pub fn can_synthesize(&self) -> bool {
        self.participants.len() >= 2 && self.participants_with_content().next().is_some()
    }

    /// `open_from < open_until` whenever both bounds are set.
    pub fn window_is_valid(&self) -> bool {
        match (self.open_from, self.open_until) {
            (Some(from), Some(until)) => from < until,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn new_study_has_one_labelled_participant() {
        let study = Study::new(Theme::new("Booking a visit", "desc", at(0)), at(10));
        assert!(study.id.starts_with("study-"));
        assert_eq!(study.participants.len(), 1);
        assert_eq!(study.participants[0].label, "Participant 1");
        assert!(study.consolidated_insight.is_none());
    }

    #[test]
    fn add_participant_labels_by_position() {
        let mut study = Study::new(Theme::new("t", "d", at(0)), at(0));
        let label = study.add_participant(at(5)).label.clone();
        assert_eq!(label, "Participant 2");
    }

    #[test]
    fn replace_participant_keeps_position() {
        let mut study = Study::new(Theme::new("t", "d", at(0)), at(0));
        study.add_participant(at(1));
        let mut first = study.participants[0].clone();
        first.messages.push(Message::new(MessageRole::User, "hi", at(2)));
        study.replace_participant(first.clone()).unwrap();
        assert_eq!(study.participants[0], first);
        assert_eq!(study.participants.len(), 2);

        let stranger = Participant::new(9, at(3));
        assert!(matches!(
            study.replace_participant(stranger),
            Err(PortError::NotFound(_))
        ));
    }

    #[test]
    fn content_counts_user_messages_or_needs() {
        let mut p = Participant::new(1, at(0));
        assert!(!p.has_content());
        p.messages.push(Message::new(MessageRole::Agent, "hello", at(1)));
        assert!(!p.has_content());
        p.messages.push(Message::new(MessageRole::User, "answer", at(2)));
        assert!(p.has_content());
    }

    #[test]
    fn synthesis_requires_two_participants_with_some_content() {
        let mut study = Study::new(Theme::new("t", "d", at(0)), at(0));
        study.participants[0]
            .messages
            .push(Message::new(MessageRole::User, "x", at(1)));
        assert!(!study.can_synthesize());
        study.add_participant(at(2));
        assert!(study.can_synthesize());
    }

    #[test]
    fn window_validity() {
        let mut study = Study::new(Theme::new("t", "d", at(0)), at(0));
        assert!(study.window_is_valid());
        study.open_from = Some(at(2_000));
        study.open_until = Some(at(1_000));
        assert!(!study.window_is_valid());
        study.open_until = Some(at(3_000));
        assert!(study.window_is_valid());
    }

    #[test]
    fn serializes_with_camel_case_and_millisecond_timestamps() {
        let study = Study::new(Theme::new("t", "d", at(1_700)), at(1_800));
        let json = serde_json::to_value(&study).unwrap();
        assert_eq!(json["createdAt"], 1_800);
        assert_eq!(json["theme"]["createdAt"], 1_700);
        assert!(json["consolidatedInsight"].is_null());
        assert!(json.get("openFrom").is_none());
        assert_eq!(json["participants"][0]["label"], "Participant 1");
    }

    #[test]
    fn theme_without_title_is_rejected() {
        let theme = Theme::new("   ", "d", at(0));
        assert!(matches!(theme.validate(), Err(PortError::InvalidPayload(_))));
    }
}
