//! crates/research_interview_core/src/gate.rs
//!
//! The survey access gate. Resolves an anonymous visitor against a study's window
//! and binds them to exactly one participant per visitor and study.
//!
//! Binding is load → append → save → bind with no mutual exclusion. Two visits that
//! race between the load and the save each create a participant and the later save
//! discards the earlier one (last write wins).

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::{Participant, Study};
use crate::ports::{Clock, KeyValueStore, PortResult, StudyStore};

/// Prefix of the per-study visitor binding key.
pub const BINDING_KEY_PREFIX: &str = "user-research-survey-participant-";

pub fn binding_key(study_id: &str) -> String {
    format!("{}{}", BINDING_KEY_PREFIX, study_id)
}

/// Where `now` falls relative to a study's survey window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStatus {
    NotYet(DateTime<Utc>),
    Closed(DateTime<Utc>),
    Open,
}

pub fn window_status(study: &Study, now: DateTime<Utc>) -> WindowStatus {
    if let Some(open_from) = study.open_from {
        if now < open_from {
            return WindowStatus::NotYet(open_from);
        }
    }
    if let Some(open_until) = study.open_until {
        if now > open_until {
            return WindowStatus::Closed(open_until);
        }
    }
    WindowStatus::Open
}

/// A visitor bound to a participant of an open survey.
#[derive(Debug, Clone)]
pub struct SurveySession {
    pub study: Study,
    pub participant: Participant,
    /// True when this visit created the participant.
    pub created: bool,
}

/// Outcome of one visit to a survey link.
#[derive(Debug, Clone)]
pub enum SurveyAccess {
    NotFound,
    NotYet { study: Study, opens_at: DateTime<Utc> },
    Closed { study: Study, closed_at: DateTime<Utc> },
    Open(SurveySession),
}

impl SurveyAccess {
    /// The message shown to a visitor who cannot take part. `None` when open.
    pub fn notice(&self) -> Option<String> {
        match self {
            SurveyAccess::NotFound => Some(
                "Survey not found. This survey link may be incorrect or the survey may have been removed."
                    .to_string(),
            ),
            SurveyAccess::NotYet { opens_at, .. } => Some(format!(
                "Survey is not open yet. This survey will open for responses at {}.",
                opens_at.to_rfc3339()
            )),
            SurveyAccess::Closed { closed_at, .. } => Some(format!(
                "Survey has closed. This survey closed at {}. Thank you for your interest.",
                closed_at.to_rfc3339()
            )),
            SurveyAccess::Open(_) => None,
        }
    }
}

pub struct SurveyGate {
    store: Arc<dyn StudyStore>,
    clock: Arc<dyn Clock>,
}

impl SurveyGate {
    pub fn new(store: Arc<dyn StudyStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Handles a visitor opening the survey link for `study_id`.
    ///
    /// `bindings` is the visitor's own storage (scoped to their browsing session).
    /// Terminal states never create or bind a participant.
    pub async fn visit(
        &self,
        study_id: &str,
        bindings: &dyn KeyValueStore,
    ) -> PortResult<SurveyAccess> {
        let Some(mut study) = self.store.load(study_id).await? else {
            return Ok(SurveyAccess::NotFound);
        };

        match window_status(&study, self.clock.now()) {
            WindowStatus::NotYet(opens_at) => return Ok(SurveyAccess::NotYet { study, opens_at }),
            WindowStatus::Closed(closed_at) => {
                return Ok(SurveyAccess::Closed { study, closed_at })
            }
            WindowStatus::Open => {}
        }

        let key = binding_key(study_id);
        if let Some(bound_id) = bindings.get(&key).await? {
            if let Some(existing) = study.participant(&bound_id) {
                let participant = existing.clone();
                return Ok(SurveyAccess::Open(SurveySession {
                    study,
                    participant,
                    created: false,
                }));
            }
            warn!(
                "Binding for study {} points at missing participant {}; creating a new one",
                study_id, bound_id
            );
        }

        let participant = study.add_participant(self.clock.now()).clone();
        self.store.save(&study).await?;
        bindings.set(&key, &participant.id).await?;
        info!("Bound new {} to study {}", participant.label, study_id);

        Ok(SurveyAccess::Open(SurveySession {
            study,
            participant,
            created: true,
        }))
    }
}
