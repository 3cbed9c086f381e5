//! crates/research_interview_core/src/aggregation.rs
//!
//! Cross-study synthesis: flatten every participant with content from every study
//! and hand them to the interviewer as one combined theme.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::conversation::cancellable;
use crate::domain::{generate_id, Insight, Participant, Study, Theme};
use crate::ports::{Clock, InterviewerService, PortResult, StudyStore};

/// Synthesizes one insight from all contentful participants of `studies`.
///
/// With nothing to synthesize a placeholder insight with no key needs is returned
/// and the interviewer is not consulted.
pub async fn synthesize_from_studies(
    interviewer: &dyn InterviewerService,
    clock: &dyn Clock,
    studies: &[Study],
) -> PortResult<Insight> {
    let participants: Vec<Participant> = studies
        .iter()
        .flat_map(|s| s.participants_with_content())
        .cloned()
        .collect();
    let now = clock.now();

    if participants.is_empty() {
        return Ok(Insight {
            id: generate_id("insight"),
            title: "Aggregated insight (no participant data yet)".to_string(),
            summary: "Add participants and collect responses across studies, then synthesize again."
                .to_string(),
            key_needs: Vec::new(),
            patterns: None,
            recommendations: None,
            created_at: now,
        });
    }

    let combined = match studies.first() {
        Some(first) => Theme {
            id: generate_id("aggregate"),
            title: format!("{} (aggregated across sessions)", first.theme.title),
            description: format!(
                "Insight aggregated from {} session(s) and {} participant(s).",
                studies.len(),
                participants.len()
            ),
            created_at: now,
            ..first.theme.clone()
        },
        None => Theme {
            id: generate_id("aggregate"),
            ..Theme::new(
                "Aggregated research",
                format!(
                    "Data from {} session(s), {} participant(s).",
                    studies.len(),
                    participants.len()
                ),
                now,
            )
        },
    };

    interviewer.synthesize_insight(&combined, &participants).await
}

/// Loads every study and synthesizes across them. Holds no state between runs.
pub struct AggregationPipeline {
    store: Arc<dyn StudyStore>,
    interviewer: Arc<dyn InterviewerService>,
    clock: Arc<dyn Clock>,
}

impl AggregationPipeline {
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

    pub async fn run(&self, cancel: &CancellationToken) -> PortResult<Insight> {
        let studies = self.store.load_all().await?;
        info!("Aggregating insight across {} stud(ies)", studies.len());
        cancellable(
            cancel,
            synthesize_from_studies(self.interviewer.as_ref(), self.clock.as_ref(), &studies),
        )
        .await
    }
}
