//! crates/research_interview_core/src/conversation.rs
//!
//! The load → interviewer → persist loop. Every operation reads the study fresh from
//! the store, asks the interviewer, applies the result and saves the whole study
//! back (last write wins). Interviewer calls race a `CancellationToken`; a cancelled
//! call returns `PortError::Cancelled` and nothing is written.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::domain::{
    DerivedTheme, Insight, Message, MessageRole, Participant, Study, StudySummaryAnalysis, Theme,
};
use crate::ports::{Clock, InterviewerService, PortError, PortResult, StudyStore};

/// Awaits `call` unless `cancel` fires first.
pub async fn cancellable<T, F>(cancel: &CancellationToken, call: F) -> PortResult<T>
where
    F: Future<Output = PortResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PortError::Cancelled),
        result = call => result,
    }
}

/// Drives participants of stored studies through the interview.
#[derive(Clone)]
pub struct ConversationLoop {
    store: Arc<dyn StudyStore>,
    interviewer: Arc<dyn InterviewerService>,
    clock: Arc<dyn Clock>,
}

impl ConversationLoop {
    pub fn new(
        store: Arc<dyn StudyStore>,
        interviewer: Arc<dyn InterviewerService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            interviewer,
            clock,
        }
    }

    /// Loads a study that must exist.
    pub async fn load_study(&self, study_id: &str) -> PortResult<Study> {
        self.store
            .load(study_id)
            .await?
            .ok_or_else(|| PortError::NotFound(format!("Study {} not found", study_id)))
    }

    /// Creates a study for `theme` with its first participant already greeted.
    pub async fn create_study(&self, theme: Theme, cancel: &CancellationToken) -> PortResult<Study> {
        theme.validate()?;
        let mut study = Study::new(theme, self.clock.now());
        let greeting = cancellable(cancel, self.interviewer.next_message(&study.theme, &[])).await?;
        let now = self.clock.now();
        study.participants[0]
            .messages
            .push(Message::new(MessageRole::Agent, greeting, now));

        self.store.save(&study).await?;
        info!("Created study {} ('{}')", study.id, study.theme.title);
        Ok(study)
    }

    /// Derives theme fields from a document's text.
    pub async fn derive_theme(
        &self,
        document_text: &str,
        cancel: &CancellationToken,
    ) -> PortResult<DerivedTheme> {
        cancellable(cancel, self.interviewer.derive_theme(document_text)).await
    }

    /// Reads finished study summaries. Nothing is stored.
    pub async fn analyze_study_summaries(
        &self,
        documents: &[String],
        cancel: &CancellationToken,
    ) -> PortResult<StudySummaryAnalysis> {
        let analysis =
            cancellable(cancel, self.interviewer.analyze_study_summaries(documents)).await?;
        info!(
            "Analysed {} study summary document(s) into {} finding(s)",
            documents.len(),
            analysis.findings.len()
        );
        Ok(analysis)
    }

    /// Appends a new, greeted participant to the study.
    pub async fn add_participant(
        &self,
        study_id: &str,
        cancel: &CancellationToken,
    ) -> PortResult<Participant> {
        let mut study = self.load_study(study_id).await?;
        let greeting = cancellable(cancel, self.interviewer.next_message(&study.theme, &[])).await?;
        let now = self.clock.now();
        let mut participant = Participant::new(study.participants.len() + 1, now);
        participant
            .messages
            .push(Message::new(MessageRole::Agent, greeting, now));
        study.participants.push(participant.clone());

        self.store.save(&study).await?;
        info!("Added {} to study {}", participant.label, study.id);
        Ok(participant)
    }

    /// Opens the conversation for a participant that has no messages yet.
    /// A participant that already has a transcript is returned unchanged.
    pub async fn greet(
        &self,
        study_id: &str,
        participant_id: &str,
        cancel: &CancellationToken,
    ) -> PortResult<Participant> {
        let study = self.load_study(study_id).await?;
        let participant = find_participant(&study, participant_id)?;
        if !participant.messages.is_empty() {
            return Ok(participant.clone());
        }
        let greeting = cancellable(cancel, self.interviewer.next_message(&study.theme, &[])).await?;
        self.append_and_save(study, participant_id, |p, now| {
            p.messages.push(Message::new(MessageRole::Agent, greeting, now));
        })
        .await
    }

    /// Records a user turn and the interviewer's reply to it.
    pub async fn send_user_message(
        &self,
        study_id: &str,
        participant_id: &str,
        content: &str,
        cancel: &CancellationToken,
    ) -> PortResult<Participant> {
        if content.trim().is_empty() {
            return Err(PortError::InvalidPayload(
                "Message content must not be empty".to_string(),
            ));
        }
        let study = self.load_study(study_id).await?;
        let participant = find_participant(&study, participant_id)?;

        let user_message = Message::new(MessageRole::User, content, self.clock.now());
        let mut history = participant.messages.clone();
        history.push(user_message.clone());

        let reply = cancellable(cancel, self.interviewer.next_message(&study.theme, &history)).await?;
        self.append_and_save(study, participant_id, |p, now| {
            p.messages.push(user_message);
            p.messages.push(Message::new(MessageRole::Agent, reply, now));
        })
        .await
    }

    /// Replaces the participant's needs with a freshly generated batch.
    pub async fn generate_needs(
        &self,
        study_id: &str,
        participant_id: &str,
        cancel: &CancellationToken,
    ) -> PortResult<Participant> {
        let study = self.load_study(study_id).await?;
        let participant = find_participant(&study, participant_id)?;
        let needs = cancellable(
            cancel,
            self.interviewer
                .generate_needs(&study.theme, &participant.messages),
        )
        .await?;
        info!(
            "Generated {} need(s) for participant {} of study {}",
            needs.len(),
            participant_id,
            study_id
        );
        self.append_and_save(study, participant_id, |p, _| p.needs = needs)
            .await
    }

    /// Synthesizes and stores a consolidated insight for the whole study.
    pub async fn synthesize_study(
        &self,
        study_id: &str,
        cancel: &CancellationToken,
    ) -> PortResult<Insight> {
        let mut study = self.load_study(study_id).await?;
        if !study.can_synthesize() {
            return Err(PortError::InvalidPayload(
                "Synthesis needs at least two participants and at least one response".to_string(),
            ));
        }
        let insight = cancellable(
            cancel,
            self.interviewer
                .synthesize_insight(&study.theme, &study.participants),
        )
        .await?;
        study.consolidated_insight = Some(insight.clone());
        self.store.save(&study).await?;
        info!("Stored consolidated insight {} on study {}", insight.id, study.id);
        Ok(insight)
    }

    /// Sets (or clears) the survey window after checking its bounds are ordered.
    pub async fn set_survey_window(
        &self,
        study_id: &str,
        open_from: Option<DateTime<Utc>>,
        open_until: Option<DateTime<Utc>>,
    ) -> PortResult<Study> {
        let mut study = self.load_study(study_id).await?;
        study.open_from = open_from;
        study.open_until = open_until;
        if !study.window_is_valid() {
            return Err(PortError::InvalidPayload(
                "Survey window must open before it closes".to_string(),
            ));
        }
        self.store.save(&study).await?;
        Ok(study)
    }

    async fn append_and_save<F>(
        &self,
        mut study: Study,
        participant_id: &str,
        apply: F,
    ) -> PortResult<Participant>
    where
        F: FnOnce(&mut Participant, DateTime<Utc>),
    {
        let now = self.clock.now();
        let participant = study
            .participant_mut(participant_id)
            .ok_or_else(|| participant_not_found(participant_id))?;
        apply(participant, now);
        let updated = participant.clone();
        self.store.save(&study).await?;
        Ok(updated)
    }
}

fn find_participant<'a>(study: &'a Study, participant_id: &str) -> PortResult<&'a Participant> {
    study
        .participant(participant_id)
        .ok_or_else(|| participant_not_found(participant_id))
}

fn participant_not_found(participant_id: &str) -> PortError {
    PortError::NotFound(format!("Participant {} not found", participant_id))
}
