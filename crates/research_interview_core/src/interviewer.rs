//! crates/research_interview_core/src/interviewer.rs
//!
//! The scripted interviewer: a deterministic stand-in for a generative model that
//! implements the `InterviewerService` port. Each decision lives in a plain
//! function so it can be tested without any runtime; the service wrapper only adds
//! the injected latency and clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{
    generate_id, DerivedTheme, Insight, KeyNeed, Message, MessageRole, Need, Participant,
    Priority, StudySummaryAnalysis, StudySummaryFinding, Theme,
};
use crate::ports::{Clock, InterviewerService, Latency, PortError, PortResult};

/// Focus areas used when a theme declares none.
pub const DEFAULT_FOCUS_AREAS: [&str; 3] = ["pain points", "goals", "current workflow"];

/// Focus areas attached to every theme derived from a document.
pub const DERIVED_FOCUS_AREAS: [&str; 3] = ["goals", "pain points", "current process"];

const EVIDENCE_LIMIT: usize = 80;
const DOCUMENT_EXCERPT_CHARS: usize = 500;
const SUMMARY_DOCUMENT_CHARS: usize = 3000;
const SUMMARY_EXCERPT_CHARS: usize = 800;
const SUMMARY_QUOTE_CHARS: usize = 400;
const ELLIPSIS: char = '…';

//=========================================================================================
// Latency
//=========================================================================================

/// Sleeps for a fixed duration, like a model round-trip would.
#[derive(Debug, Clone, Copy)]
pub struct FixedLatency(pub Duration);

#[async_trait]
impl Latency for FixedLatency {
    async fn pause(&self) {
        tokio::time::sleep(self.0).await;
    }
}

/// Answers immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLatency;

#[async_trait]
impl Latency for NoLatency {
    async fn pause(&self) {}
}

//=========================================================================================
// The Service
//=========================================================================================

pub struct ScriptedInterviewer {
    latency: Arc<dyn Latency>,
    clock: Arc<dyn Clock>,
}

impl ScriptedInterviewer {
    pub fn new(latency: Arc<dyn Latency>, clock: Arc<dyn Clock>) -> Self {
        Self { latency, clock }
    }

    /// An interviewer without any artificial delay.
    pub fn instant(clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(NoLatency), clock)
    }
}

#[async_trait]
impl InterviewerService for ScriptedInterviewer {
    async fn next_message(&self, theme: &Theme, messages: &[Message]) -> PortResult<String> {
        self.latency.pause().await;
        Ok(next_question(theme, messages))
    }

    async fn generate_needs(&self, _theme: &Theme, messages: &[Message]) -> PortResult<Vec<Need>> {
        self.latency.pause().await;
        Ok(extract_needs(messages, self.clock.now()))
    }

    async fn synthesize_insight(
        &self,
        theme: &Theme,
        participants: &[Participant],
    ) -> PortResult<Insight> {
        self.latency.pause().await;
        Ok(consolidate(theme, participants, self.clock.now()))
    }

    async fn derive_theme(&self, document_text: &str) -> PortResult<DerivedTheme> {
        self.latency.pause().await;
        theme_from_document(document_text)
    }

    async fn analyze_study_summaries(&self, documents: &[String]) -> PortResult<StudySummaryAnalysis> {
        self.latency.pause().await;
        analyze_summaries(documents)
    }
}

//=========================================================================================
// Decision Rules
//=========================================================================================

/// Picks the next question from the number of user turns so far.
pub fn next_question(theme: &Theme, messages: &[Message]) -> String {
    let user_turns = messages.iter().filter(|m| m.role == MessageRole::User).count();
    let agent_turns = messages.len() - user_turns;

    match user_turns {
        0 => {
            let doc_context = if theme.source_document_text.is_some() {
                " I’ll use the research brief you provided to guide my questions."
            } else {
                ""
            };
            format!(
                "I'm here to understand your needs around **{}**. {}{}\n\nTo start, how would you describe your main goal or challenge in this area?",
                theme.title, theme.description, doc_context
            )
        }
        1 => "Can you tell me more about a specific situation where that comes up? What would an ideal outcome look like for you?".to_string(),
        2 => "What’s the biggest friction or frustration you run into today when trying to achieve that?".to_string(),
        3 | 4 => {
            let area = focus_area_for(theme, agent_turns);
            format!(
                "To wrap up, is there anything else about **{}** that we haven’t covered yet that matters to you?",
                area
            )
        }
        _ => "Thanks — I have enough to summarize your needs. You can review and edit the structured needs below, or add more to the conversation if you’d like.".to_string(),
    }
}

/// Cycles through the theme's focus areas, falling back to the defaults.
fn focus_area_for(theme: &Theme, agent_turns: usize) -> &str {
    match theme.focus_areas.as_deref() {
        Some(areas) if !areas.is_empty() => areas[agent_turns % areas.len()].as_str(),
        _ => DEFAULT_FOCUS_AREAS[agent_turns % DEFAULT_FOCUS_AREAS.len()],
    }
}

/// Builds the fixed three-need batch, or nothing when the user has not spoken.
pub fn extract_needs(messages: &[Message], now: DateTime<Utc>) -> Vec<Need> {
    let user_content = messages
        .iter()
        .filter(|m| m.role == MessageRole::User)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    if user_content.trim().is_empty() {
        return Vec::new();
    }

    let need = |title: &str, description: &str, category: &str, priority, evidence| Need {
        id: generate_id("need"),
        title: title.to_string(),
        description: description.to_string(),
        category: Some(category.to_string()),
        priority: Some(priority),
        evidence,
        created_at: now,
    };

    vec![
        need(
            "Clear visibility of status",
            "User wants to see where things stand at a glance without digging through multiple places.",
            "transparency",
            Priority::High,
            Some(truncate(&user_content, EVIDENCE_LIMIT, EVIDENCE_LIMIT)),
        ),
        need(
            "Reduced friction in key workflow",
            "User wants fewer steps and less cognitive load when doing the main task.",
            "efficiency",
            Priority::Medium,
            None,
        ),
        need(
            "Alignment with real-world context",
            "Solution should fit how they actually work, not assume an ideal process.",
            "fit",
            Priority::High,
            None,
        ),
    ]
}

/// Merges participants into one insight. Only participants with content count.
pub fn consolidate(theme: &Theme, participants: &[Participant], now: DateTime<Utc>) -> Insight {
    let count = participants.iter().filter(|p| p.has_content()).count();

    let key_need = |title: &str, description: &str, category: &str, priority, participants| KeyNeed {
        title: title.to_string(),
        description: description.to_string(),
        category: Some(category.to_string()),
        priority: Some(priority),
        participant_count: Some(participants),
    };

    Insight {
        id: generate_id("insight"),
        title: format!("{} — consolidated insight", theme.title),
        summary: format!(
            "Across {} participant(s), users consistently need clearer visibility of status and outcomes, fewer steps in key workflows, and solutions that fit their real-world context. Pain points center on uncertainty about what happens next and extra effort to complete the main task.",
            count
        ),
        key_needs: vec![
            key_need(
                "Clear visibility of status and outcomes",
                "Users want to see where things stand at a glance and what happens next, without digging through multiple places or waiting for confirmation.",
                "transparency",
                Priority::High,
                count,
            ),
            key_need(
                "Reduced friction in the main workflow",
                "Fewer steps and less cognitive load when completing the core task; less back-and-forth and fewer dead ends.",
                "efficiency",
                Priority::High,
                count,
            ),
            // Lowest-confidence need never claims full consensus.
            key_need(
                "Fit with how people actually work",
                "The service should support real-world contexts (e.g. interruptions, partial completion, different devices) rather than assuming an ideal linear flow.",
                "fit",
                Priority::Medium,
                count.saturating_sub(1).max(1),
            ),
        ],
        patterns: Some(vec![
            "Uncertainty about next steps and timelines".to_string(),
            "Desire for one place to see status and actions".to_string(),
            "Frustration with repetitive or redundant steps".to_string(),
        ]),
        recommendations: Some(vec![
            "Provide a single, clear status view (e.g. dashboard or checklist) with next actions.".to_string(),
            "Minimize required steps; pre-fill and remember context where possible.".to_string(),
            "Support saving progress and resuming; avoid long, unbreakable flows.".to_string(),
        ]),
        created_at: now,
    }
}

/// Placeholder extraction of theme fields from a document's opening text.
pub fn theme_from_document(document_text: &str) -> PortResult<DerivedTheme> {
    let head: String = document_text.chars().take(DOCUMENT_EXCERPT_CHARS).collect();
    let excerpt = head.split_whitespace().collect::<Vec<_>>().join(" ");
    if excerpt.is_empty() {
        return Err(PortError::InvalidPayload(
            "Document contains no text".to_string(),
        ));
    }

    // Text that opens with a terminator yields an empty title.
    let first_sentence = excerpt.split(['.', '!', '?']).next().unwrap_or_default();

    Ok(DerivedTheme {
        title: truncate(first_sentence, 57, 60),
        description: truncate(&excerpt, 297, 300),
        focus_areas: DERIVED_FOCUS_AREAS.iter().map(|a| a.to_string()).collect(),
    })
}

/// The fixed study-summary reading: a templated synthesis quoting the documents,
/// seven findings with resolutions, and a design-system build prompt.
pub fn analyze_summaries(documents: &[String]) -> PortResult<StudySummaryAnalysis> {
    if documents.is_empty() {
        return Err(PortError::InvalidPayload(
            "At least one study summary is required".to_string(),
        ));
    }
    if let Some(blank) = documents.iter().position(|d| d.trim().is_empty()) {
        return Err(PortError::InvalidPayload(format!(
            "Study summary {} contains no text",
            blank + 1
        )));
    }

    let combined = documents
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let head: String = text.chars().take(SUMMARY_DOCUMENT_CHARS).collect();
            format!("--- Document {} ---\n{}", i + 1, head)
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    let head: String = combined.chars().take(SUMMARY_EXCERPT_CHARS).collect();
    let excerpt = head.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut quote: String = excerpt.chars().take(SUMMARY_QUOTE_CHARS).collect();
    if excerpt.chars().count() > SUMMARY_QUOTE_CHARS {
        quote.push(ELLIPSIS);
    }

    let synthesis = format!(
        "Synthesis based on {count} study summary document(s)\n\
         ================================================================\n\n\
         Overview\n--------\n\
         The study summaries describe user needs, pain points and desired outcomes. Users need a digital service that provides clear visibility of status and next steps, reduces friction in the main workflow, and fits real-world use (saving/resuming, multiple devices, partial completion).\n\n\
         Key themes from the documents\n-----------------------------\n\
         • Visibility: Users want one place to see where they are, what has been done, and what to do next.\n\
         • Friction: Too many steps, repeated data entry and unclear progress cause drop-off and frustration.\n\
         • Context: The service should remember context, pre-fill where possible and support interrupted or non-linear use.\n\
         • Trust: Clear confirmation, timelines and expectations (e.g. “You’ll hear back within X days”) build confidence.\n\n\
         Document excerpt (for context)\n--------------------------------\n\
         \"{quote}\"\n\n\
         Recommended direction for the digital service: a status-led experience with minimal steps, clear calls to action, and support for saving and resuming. The sections below list main findings and possible resolutions.",
        count = documents.len(),
        quote = quote,
    );

    Ok(StudySummaryAnalysis {
        synthesis,
        findings: summary_findings(),
        design_system_prompt: DESIGN_SYSTEM_PROMPT.to_string(),
    })
}

fn summary_findings() -> Vec<StudySummaryFinding> {
    let finding = |finding: &str, resolutions: [&str; 3]| StudySummaryFinding {
        finding: finding.to_string(),
        resolutions: resolutions.iter().map(|r| r.to_string()).collect(),
    };
    vec![
        finding(
            "Users cannot see the current status of their case or request at a glance; they have to hunt across multiple channels or pages.",
            [
                "Provide a single status view (e.g. dashboard or summary card) showing current stage, last update and next action.",
                "Use clear status labels (e.g. Badge/Tag: In progress, Waiting on you, Done) and optional timeline.",
                "Send status updates by email or notification with a direct link back to the status view.",
            ],
        ),
        finding(
            "The main task requires too many steps or repeated data entry, leading to abandonment or errors.",
            [
                "Reduce the number of steps; combine or skip steps where the system already has the data.",
                "Pre-fill from previous submissions or account data; allow “same as before” where relevant.",
                "Use progressive disclosure: show only the next 1–2 steps and keep the rest for later.",
            ],
        ),
        finding(
            "Users cannot save progress and resume later; they fear losing work or must complete in one sitting.",
            [
                "Support saving drafts and resuming by email link or account; persist form state.",
                "Show a clear “Save and continue later” action and confirm that progress is saved.",
                "Allow re-entry from the status view (“Continue where you left off”) instead of starting over.",
            ],
        ),
        finding(
            "Unclear what happens after submission (e.g. no confirmation, timeline or next steps).",
            [
                "Show an immediate confirmation with a reference number and summary of what was submitted.",
                "Set expectations: e.g. “We’ll respond within 5 working days” or “Next step: we’ll contact you.”",
                "Include a link to the status view and optional email confirmation.",
            ],
        ),
        finding(
            "Information and actions are spread across multiple places; users don’t know where to go.",
            [
                "Centralise key actions (e.g. “What do you want to do?”) and status on one landing or dashboard.",
                "Use simple navigation (tabs or links) so the main journey is obvious; avoid deep hierarchies.",
                "Provide a short “How this works” or checklist so users see the full path.",
            ],
        ),
        finding(
            "Forms and language are complex or assume prior knowledge; some users are unsure what to enter.",
            [
                "Use plain language for labels, hints and errors; avoid jargon and acronyms.",
                "Add short help text or examples for non-obvious fields; consider optional “What’s this?”.",
                "Validate in real time and explain what’s wrong and how to fix it.",
            ],
        ),
        finding(
            "The experience doesn’t work well on mobile or when switching devices.",
            [
                "Design for small screens first: large tap targets, single column, minimal horizontal scroll.",
                "Ensure the same journey works on desktop and mobile; use responsive layout from the design system.",
                "Use links that work across devices (e.g. “Continue on this device” via email link).",
            ],
        ),
    ]
}

const DESIGN_SYSTEM_PROMPT: &str = "Create a digital service using the Chakra Design System (from /gds/chakra-app/src/design-system) with the following requirements derived from user study summaries:\n\n\
1. **Layout & navigation**\n\
\x20  - Use Container, Stack (VStack/HStack), and Box from the design system.\n\
\x20  - Provide a clear main heading and optional sub-navigation (Tabs or links).\n\n\
2. **Content and status**\n\
\x20  - Use Heading, Text, and Card to show status and key information at a glance.\n\
\x20  - Use Badge or Tag for status labels (e.g. \"In progress\", \"Done\").\n\n\
3. **Actions and forms**\n\
\x20  - Use Button for primary and secondary actions (colorScheme=\"teal\" for primary).\n\
\x20  - Use Input, Textarea, and Field/FormControl for any forms; keep required steps to a minimum.\n\n\
4. **Feedback**\n\
\x20  - Use Alert for success or error messages; use Spinner or Skeleton for loading states.\n\n\
5. **Theme**\n\
\x20  - Wrap the app in ChakraProvider with the design-system theme; use semantic tokens (e.g. figma.fg, figma.bgSubtle) for colours.\n\n\
Context from study summaries: Users need visibility of status, fewer steps, and support for partial completion. Design the service so the main task is achievable in as few steps as possible with a clear status view.";

/// Keeps `keep` characters plus an ellipsis when `text` is longer than `limit`.
fn truncate(text: &str, keep: usize, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(keep).collect();
    out.push(ELLIPSIS);
    out
}
