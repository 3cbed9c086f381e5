//! services/api/src/cli.rs
//!
//! The `research` command line client. It drives the conversation loop, the
//! survey gate and the aggregation pipeline against whichever study backend the
//! configuration selects.

use crate::adapters::{build_study_store, FileKeyValueStore};
use crate::config::Config;
use crate::error::ApiError;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use research_interview_core::aggregation::AggregationPipeline;
use research_interview_core::clock::SystemClock;
use research_interview_core::conversation::ConversationLoop;
use research_interview_core::domain::{
    Insight, Need, Participant, Priority, StudySummaryAnalysis, Theme,
};
use research_interview_core::gate::{SurveyAccess, SurveyGate};
use research_interview_core::interviewer::{FixedLatency, ScriptedInterviewer};
use research_interview_core::kv::{CurrentStudyPointer, MemoryKeyValueStore};
use research_interview_core::ports::{
    Clock, InterviewerService, KeyValueStore, PortError, StudyStore,
};
use research_interview_core::recruitment::{
    facet_values, Availability, ProfileFilter, RecruitmentDesk, RecruitmentProfile,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

//=========================================================================================
// Command Line Definition
//=========================================================================================

#[derive(Parser, Debug)]
#[command(name = "research", version, about = "Run user research interviews from the terminal")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List every study, most recently updated first
    List,
    /// Print a study as JSON
    Show { id: String },
    /// Create a study and make it the current one
    Create {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Repeat to give several focus areas, in order
        #[arg(long = "focus-area")]
        focus_areas: Vec<String>,
        /// The existing web service the research is about
        #[arg(long)]
        service: Option<String>,
        /// A plain text research brief; missing fields are derived from it
        #[arg(long)]
        document: Option<PathBuf>,
    },
    /// Suggest a theme from a plain text research brief
    Derive { file: PathBuf },
    /// Make a study the current one
    Use { id: String },
    /// Print the current study id
    Current,
    /// Add a greeted participant
    AddParticipant { id: Option<String> },
    /// Interview a participant interactively
    Chat {
        id: Option<String>,
        /// Defaults to the most recent participant
        #[arg(long)]
        participant: Option<String>,
    },
    /// Regenerate a participant's needs
    Needs {
        id: Option<String>,
        #[arg(long)]
        participant: String,
    },
    /// Synthesize an insight across the study's participants
    Synthesize { id: Option<String> },
    /// Synthesize one insight across every study
    Aggregate,
    /// Set or clear the survey window (RFC 3339 timestamps)
    Window {
        id: String,
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        #[arg(long)]
        until: Option<DateTime<Utc>>,
    },
    /// Take the survey as a visitor would
    Survey { id: String },
    /// Print the shareable survey link
    SurveyLink { id: String },
    /// Delete a study
    Delete { id: String },
    /// Analyse plain text study summaries into findings and a design prompt
    Analyze {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List the participant profiles being recruited for
    Profiles {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        segment: Option<String>,
        #[arg(long)]
        topic: Option<String>,
        /// open or full
        #[arg(long)]
        availability: Option<Availability>,
    },
    /// Volunteer for a recruitment profile
    Signup {
        profile_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        message: Option<String>,
    },
    /// List the recruitment sign-ups made on this machine
    Signups,
}

//=========================================================================================
// Ctrl-C Handling
//=========================================================================================

/// Where interrupt requests come from.
#[derive(Clone, Debug)]
pub enum Interrupts {
    /// Ctrl-C on the controlling terminal.
    Terminal,
    /// Interrupts raised in-process through the `Notify`.
    Manual(Arc<Notify>),
}

impl Interrupts {
    /// Resolves on the next interrupt.
    async fn next(&self) {
        match self {
            Interrupts::Terminal => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Cannot listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
            Interrupts::Manual(notify) => notify.notified().await,
        }
    }
}

/// Cancels its token when an interrupt arrives while it is alive.
struct CtrlCCancel {
    token: CancellationToken,
    watcher: JoinHandle<()>,
}

impl CtrlCCancel {
    fn arm(interrupts: &Interrupts) -> Self {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let interrupts = interrupts.clone();
        let watcher = tokio::spawn(async move {
            interrupts.next().await;
            trigger.cancel();
        });
        Self { token, watcher }
    }

    fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for CtrlCCancel {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

//=========================================================================================
// The Runner
//=========================================================================================

pub struct Research {
    config: Config,
    store: Arc<dyn StudyStore>,
    clock: Arc<dyn Clock>,
    conversation: ConversationLoop,
    gate: SurveyGate,
    aggregation: AggregationPipeline,
    recruitment: RecruitmentDesk,
    pointer: CurrentStudyPointer,
    interrupts: Interrupts,
}

impl Research {
    pub fn new(
        config: Config,
        store: Arc<dyn StudyStore>,
        interviewer: Arc<dyn InterviewerService>,
        clock: Arc<dyn Clock>,
        local: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            conversation: ConversationLoop::new(store.clone(), interviewer.clone(), clock.clone()),
            gate: SurveyGate::new(store.clone(), clock.clone()),
            aggregation: AggregationPipeline::new(store.clone(), interviewer, clock.clone()),
            recruitment: RecruitmentDesk::new(local.clone(), clock.clone()),
            pointer: CurrentStudyPointer::new(local),
            interrupts: Interrupts::Terminal,
            store,
            clock,
            config,
        }
    }

    pub fn with_interrupts(mut self, interrupts: Interrupts) -> Self {
        self.interrupts = interrupts;
        self
    }

    /// Wires the production adapters. The current study pointer always lives in
    /// the local data directory, whichever backend holds the studies.
    pub fn from_config(config: Config) -> Result<Self, ApiError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = build_study_store(&config, clock.clone())?;
        let interviewer = Arc::new(ScriptedInterviewer::new(
            Arc::new(FixedLatency(config.agent_delay)),
            clock.clone(),
        ));
        let local = Arc::new(FileKeyValueStore::new(config.data_dir.clone()));
        Ok(Self::new(config, store, interviewer, clock, local))
    }

    pub async fn run<R, W>(&self, command: Command, input: &mut R, out: &mut W) -> Result<(), ApiError>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        debug!("Running {:?}", command);
        match command {
            Command::List => self.list(out).await,
            Command::Show { id } => {
                let study = self.conversation.load_study(&id).await?;
                let json = serde_json::to_string_pretty(&study)
                    .map_err(|e| ApiError::Internal(e.to_string()))?;
                writeln!(out, "{}", json)?;
                Ok(())
            }
            Command::Create {
                title,
                description,
                focus_areas,
                service,
                document,
            } => {
                self.create(title, description, focus_areas, service, document, out)
                    .await
            }
            Command::Derive { file } => {
                let text = tokio::fs::read_to_string(&file).await?;
                let interrupt = CtrlCCancel::arm(&self.interrupts);
                let derived = self.conversation.derive_theme(&text, interrupt.token()).await?;
                writeln!(out, "Title:       {}", derived.title)?;
                writeln!(out, "Description: {}", derived.description)?;
                writeln!(out, "Focus areas: {}", derived.focus_areas.join(", "))?;
                Ok(())
            }
            Command::Use { id } => {
                let study = self.conversation.load_study(&id).await?;
                self.pointer.set(Some(&study.id)).await?;
                writeln!(out, "Current study is now {} ({})", study.id, study.theme.title)?;
                Ok(())
            }
            Command::Current => {
                match self.pointer.get().await? {
                    Some(id) => writeln!(out, "{}", id)?,
                    None => writeln!(out, "No current study")?,
                }
                Ok(())
            }
            Command::AddParticipant { id } => {
                let id = self.resolve(id).await?;
                let interrupt = CtrlCCancel::arm(&self.interrupts);
                let participant = self.conversation.add_participant(&id, interrupt.token()).await?;
                writeln!(out, "Added {} ({})", participant.label, participant.id)?;
                Ok(())
            }
            Command::Chat { id, participant } => {
                let id = self.resolve(id).await?;
                let study = self.conversation.load_study(&id).await?;
                let participant = match participant {
                    Some(pid) => pid,
                    None => study
                        .participants
                        .last()
                        .map(|p| p.id.clone())
                        .ok_or_else(|| {
                            PortError::NotFound(format!("Study {} has no participants", id))
                        })?,
                };
                self.chat(&id, &participant, input, out).await
            }
            Command::Needs { id, participant } => {
                let id = self.resolve(id).await?;
                let interrupt = CtrlCCancel::arm(&self.interrupts);
                let updated = self
                    .conversation
                    .generate_needs(&id, &participant, interrupt.token())
                    .await?;
                print_needs(out, &updated.needs)?;
                Ok(())
            }
            Command::Synthesize { id } => {
                let id = self.resolve(id).await?;
                let interrupt = CtrlCCancel::arm(&self.interrupts);
                let insight = self.conversation.synthesize_study(&id, interrupt.token()).await?;
                print_insight(out, &insight)?;
                Ok(())
            }
            Command::Aggregate => {
                let interrupt = CtrlCCancel::arm(&self.interrupts);
                let insight = self.aggregation.run(interrupt.token()).await?;
                print_insight(out, &insight)?;
                Ok(())
            }
            Command::Window { id, from, until } => {
                let study = self.conversation.set_survey_window(&id, from, until).await?;
                writeln!(
                    out,
                    "Survey window for {}: {} until {}",
                    study.id,
                    study.open_from.map_or("any time".to_string(), |t| t.to_rfc3339()),
                    study.open_until.map_or("no end".to_string(), |t| t.to_rfc3339()),
                )?;
                Ok(())
            }
            Command::Survey { id } => self.survey(&id, input, out).await,
            Command::SurveyLink { id } => {
                writeln!(out, "{}", self.config.survey_link(&id))?;
                Ok(())
            }
            Command::Delete { id } => {
                self.store.delete(&id).await?;
                if self.pointer.get().await?.as_deref() == Some(id.as_str()) {
                    self.pointer.set(None).await?;
                }
                writeln!(out, "Deleted {}", id)?;
                Ok(())
            }
            Command::Analyze { files } => {
                let mut documents = Vec::with_capacity(files.len());
                for file in &files {
                    documents.push(tokio::fs::read_to_string(file).await?);
                }
                let interrupt = CtrlCCancel::arm(&self.interrupts);
                let analysis = self
                    .conversation
                    .analyze_study_summaries(&documents, interrupt.token())
                    .await?;
                print_analysis(out, &analysis)?;
                Ok(())
            }
            Command::Profiles {
                category,
                segment,
                topic,
                availability,
            } => {
                let filter = ProfileFilter {
                    category,
                    segment,
                    topic,
                    availability,
                };
                self.profiles(&filter, out)
            }
            Command::Signup {
                profile_id,
                name,
                email,
                message,
            } => {
                let signup = self
                    .recruitment
                    .sign_up(&profile_id, &name, &email, message.as_deref())
                    .await?;
                writeln!(
                    out,
                    "Signed up {} for {} ({})",
                    signup.name, signup.profile_id, signup.id
                )?;
                Ok(())
            }
            Command::Signups => {
                let signups = self.recruitment.signups().await?;
                if signups.is_empty() {
                    writeln!(out, "No sign-ups yet")?;
                }
                for signup in &signups {
                    writeln!(
                        out,
                        "{}  {}  {} <{}>{}",
                        signup.created_at.to_rfc3339(),
                        signup.profile_id,
                        signup.name,
                        signup.email,
                        signup
                            .message
                            .as_deref()
                            .map(|m| format!(": {}", m))
                            .unwrap_or_default()
                    )?;
                }
                Ok(())
            }
        }
    }

    /// The explicit id, or the current study when none is given.
    async fn resolve(&self, id: Option<String>) -> Result<String, ApiError> {
        if let Some(id) = id {
            return Ok(id);
        }
        self.pointer.get().await?.ok_or_else(|| {
            ApiError::Port(PortError::NotFound(
                "No current study; pass a study id or run `research use <id>`".to_string(),
            ))
        })
    }

    async fn list<W: Write>(&self, out: &mut W) -> Result<(), ApiError> {
        let mut studies = self.store.load_all().await?;
        studies.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if studies.is_empty() {
            writeln!(out, "No studies yet")?;
            return Ok(());
        }
        let current = self.pointer.get().await?;
        for study in &studies {
            let marker = if current.as_deref() == Some(study.id.as_str()) {
                "*"
            } else {
                " "
            };
            writeln!(
                out,
                "{} {}  {}  ({} participant(s), updated {})",
                marker,
                study.id,
                study.theme.title,
                study.participants.len(),
                study.updated_at.to_rfc3339()
            )?;
        }
        Ok(())
    }

    /// Matching profiles, or the values the filters can take when none match.
    fn profiles<W: Write>(&self, filter: &ProfileFilter, out: &mut W) -> Result<(), ApiError> {
        let all = self.recruitment.profiles();
        let matching = filter.apply(all);
        if matching.is_empty() {
            writeln!(out, "No profiles match those filters")?;
            writeln!(out, "categories: {}", facet_values(all, |p| p.category.as_str()).join(", "))?;
            writeln!(out, "segments:   {}", facet_values(all, |p| p.segment.as_str()).join(", "))?;
            writeln!(out, "topics:     {}", facet_values(all, |p| p.topic.as_str()).join(", "))?;
            return Ok(());
        }
        for profile in matching {
            print_profile(out, profile)?;
        }
        Ok(())
    }

    async fn create<W: Write>(
        &self,
        title: Option<String>,
        description: Option<String>,
        focus_areas: Vec<String>,
        service: Option<String>,
        document: Option<PathBuf>,
        out: &mut W,
    ) -> Result<(), ApiError> {
        let interrupt = CtrlCCancel::arm(&self.interrupts);

        let (document_text, derived) = match &document {
            Some(path) => {
                let text = tokio::fs::read_to_string(path).await?;
                let derived = self.conversation.derive_theme(&text, interrupt.token()).await?;
                (Some(text), Some(derived))
            }
            None => (None, None),
        };

        let title = title
            .or_else(|| derived.as_ref().map(|d| d.title.clone()))
            .unwrap_or_default();
        let description = description
            .or_else(|| derived.as_ref().map(|d| d.description.clone()))
            .unwrap_or_default();
        let focus_areas = if focus_areas.is_empty() {
            derived.map(|d| d.focus_areas).unwrap_or_default()
        } else {
            focus_areas
        };

        let mut theme = Theme::new(title, description, self.clock.now());
        if !focus_areas.is_empty() {
            theme = theme.with_focus_areas(focus_areas);
        }
        theme.existing_web_service = service.filter(|s| !s.trim().is_empty());
        theme.source_document_text = document_text;
        theme.source_document_name = document.as_deref().and_then(file_name);

        let study = self.conversation.create_study(theme, interrupt.token()).await?;
        self.pointer.set(Some(&study.id)).await?;
        info!("Study {} is now the current study", study.id);

        writeln!(out, "Created study {} ({})", study.id, study.theme.title)?;
        writeln!(out, "Survey link: {}", self.config.survey_link(&study.id))?;
        Ok(())
    }

    async fn survey<R, W>(&self, id: &str, input: &mut R, out: &mut W) -> Result<(), ApiError>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        // One process is one browsing session.
        let bindings = MemoryKeyValueStore::new();
        let access = self.gate.visit(id, &bindings).await?;
        if let Some(notice) = access.notice() {
            writeln!(out, "{}", notice)?;
            return Ok(());
        }
        let SurveyAccess::Open(session) = access else {
            return Ok(());
        };
        if session.created {
            let interrupt = CtrlCCancel::arm(&self.interrupts);
            self.conversation
                .greet(id, &session.participant.id, interrupt.token())
                .await?;
        }
        writeln!(out, "{}: {}", session.study.theme.title, session.participant.label)?;
        self.chat(id, &session.participant.id, input, out).await
    }

    /// One input line is one user turn. `/needs` regenerates needs, `/quit` or
    /// end of input leaves. Ctrl-C abandons a pending reply, or leaves when
    /// pressed at the prompt.
    async fn chat<R, W>(
        &self,
        study_id: &str,
        participant_id: &str,
        input: &mut R,
        out: &mut W,
    ) -> Result<(), ApiError>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let study = self.conversation.load_study(study_id).await?;
        let participant = study
            .participant(participant_id)
            .ok_or_else(|| {
                PortError::NotFound(format!("Participant {} not found", participant_id))
            })?;
        print_transcript(out, participant)?;

        let mut lines = input.lines();
        loop {
            write!(out, "> ")?;
            out.flush()?;
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = self.interrupts.next() => {
                    writeln!(out)?;
                    break;
                }
            };
            let Some(line) = line else {
                break;
            };
            let line = line.trim();
            match line {
                "" => continue,
                "/quit" => break,
                "/needs" => {
                    let interrupt = CtrlCCancel::arm(&self.interrupts);
                    let updated = self
                        .conversation
                        .generate_needs(study_id, participant_id, interrupt.token())
                        .await?;
                    print_needs(out, &updated.needs)?;
                }
                content => {
                    let interrupt = CtrlCCancel::arm(&self.interrupts);
                    match self
                        .conversation
                        .send_user_message(study_id, participant_id, content, interrupt.token())
                        .await
                    {
                        Ok(updated) => {
                            if let Some(reply) = updated.messages.last() {
                                writeln!(out, "agent: {}", reply.content)?;
                            }
                        }
                        Err(PortError::Cancelled) => {
                            writeln!(out, "(reply cancelled, nothing was saved)")?;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
        Ok(())
    }
}

//=========================================================================================
// Output Helpers
//=========================================================================================

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

fn priority_label(priority: Option<Priority>) -> &'static str {
    match priority {
        Some(Priority::High) => "high",
        Some(Priority::Medium) => "medium",
        Some(Priority::Low) => "low",
        None => "-",
    }
}

fn print_transcript<W: Write>(out: &mut W, participant: &Participant) -> std::io::Result<()> {
    for message in &participant.messages {
        let speaker = if message.is_user() { "you" } else { "agent" };
        writeln!(out, "{}: {}", speaker, message.content)?;
    }
    Ok(())
}

fn print_needs<W: Write>(out: &mut W, needs: &[Need]) -> std::io::Result<()> {
    if needs.is_empty() {
        return writeln!(out, "No needs yet; the participant has not said anything.");
    }
    for need in needs {
        writeln!(
            out,
            "- [{}] {}: {}",
            priority_label(need.priority),
            need.title,
            need.description
        )?;
    }
    Ok(())
}

fn print_profile<W: Write>(out: &mut W, profile: &RecruitmentProfile) -> std::io::Result<()> {
    writeln!(out, "{}  [{}]  {}", profile.id, profile.availability, profile.title)?;
    writeln!(
        out,
        "    {} / {} / {}{}",
        profile.category,
        profile.segment,
        profile.topic,
        profile
            .study_title
            .as_deref()
            .map(|t| format!("  ({})", t))
            .unwrap_or_default()
    )
}

fn print_analysis<W: Write>(out: &mut W, analysis: &StudySummaryAnalysis) -> std::io::Result<()> {
    writeln!(out, "{}", analysis.synthesis)?;
    writeln!(out)?;
    for (n, finding) in analysis.findings.iter().enumerate() {
        writeln!(out, "{}. {}", n + 1, finding.finding)?;
        for resolution in &finding.resolutions {
            writeln!(out, "   - {}", resolution)?;
        }
    }
    writeln!(out)?;
    writeln!(out, "{}", analysis.design_system_prompt)
}

fn print_insight<W: Write>(out: &mut W, insight: &Insight) -> std::io::Result<()> {
    writeln!(out, "{}", insight.title)?;
    writeln!(out, "{}", insight.summary)?;
    for need in &insight.key_needs {
        let count = need
            .participant_count
            .map(|n| format!(" ({} participant(s))", n))
            .unwrap_or_default();
        writeln!(
            out,
            "- [{}] {}{}: {}",
            priority_label(need.priority),
            need.title,
            count,
            need.description
        )?;
    }
    for pattern in insight.patterns.iter().flatten() {
        writeln!(out, "pattern: {}", pattern)?;
    }
    for recommendation in insight.recommendations.iter().flatten() {
        writeln!(out, "recommendation: {}", recommendation)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageMode;
    use research_interview_core::clock::ManualClock;
    use research_interview_core::store::EmbeddedStudyStore;
    use std::time::Duration;

    struct Harness {
        research: Research,
        store: Arc<dyn StudyStore>,
        pointer: CurrentStudyPointer,
        clock: Arc<ManualClock>,
        interrupts: Arc<Notify>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            database_url: "sqlite::memory:".to_string(),
            log_level: tracing::Level::INFO,
            storage_mode: StorageMode::Embedded,
            api_url: "http://localhost:4000/api".to_string(),
            data_dir: dir.path().to_path_buf(),
            agent_delay: Duration::ZERO,
            request_timeout: Duration::from_secs(1),
            survey_base_url: "http://localhost:5173".to_string(),
        };
        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
        let local: Arc<dyn KeyValueStore> = Arc::new(FileKeyValueStore::new(dir.path()));
        let store: Arc<dyn StudyStore> = Arc::new(EmbeddedStudyStore::new(local.clone(), clock.clone()));
        let interviewer = Arc::new(ScriptedInterviewer::instant(clock.clone()));
        let interrupts = Arc::new(Notify::new());
        let research = Research::new(config, store.clone(), interviewer, clock.clone(), local.clone())
            .with_interrupts(Interrupts::Manual(interrupts.clone()));
        Harness {
            research,
            store,
            pointer: CurrentStudyPointer::new(local),
            clock,
            interrupts,
            _dir: dir,
        }
    }

    async fn run(h: &Harness, args: &[&str], input: &str) -> Result<String, ApiError> {
        let cli = Cli::try_parse_from(std::iter::once("research").chain(args.iter().copied()))
            .expect("arguments parse");
        let mut reader = tokio::io::BufReader::new(input.as_bytes());
        let mut out = Vec::new();
        h.research.run(cli.command, &mut reader, &mut out).await?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn parses_repeated_focus_areas_and_window_bounds() {
        let cli = Cli::try_parse_from([
            "research", "create", "--title", "T", "--description", "D",
            "--focus-area", "goals", "--focus-area", "pricing",
        ])
        .unwrap();
        match cli.command {
            Command::Create { focus_areas, .. } => assert_eq!(focus_areas, vec!["goals", "pricing"]),
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::try_parse_from([
            "research", "window", "study-1", "--from", "2024-01-01T00:00:00Z",
        ])
        .unwrap();
        match cli.command {
            Command::Window { from, until, .. } => {
                assert_eq!(from.map(|t| t.timestamp()), Some(1_704_067_200));
                assert!(until.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[tokio::test]
    async fn create_sets_the_current_study_and_chat_records_turns() {
        let h = harness();
        let created = run(&h, &["create", "--title", "Booking a visit", "--description", "How people book"], "")
            .await
            .unwrap();
        assert!(created.contains("Created study"));

        let current = h.pointer.get().await.unwrap().expect("current study");
        let transcript = run(&h, &["chat"], "I call the front desk\n/needs\n/quit\nignored\n")
            .await
            .unwrap();
        assert!(transcript.contains("**Booking a visit**"));
        assert!(transcript.contains("- [high] Clear visibility of status"));

        let study = h.store.load(&current).await.unwrap().unwrap();
        let participant = &study.participants[0];
        assert_eq!(participant.messages.len(), 3);
        assert_eq!(participant.user_message_count(), 1);
        assert_eq!(participant.needs.len(), 3);
    }

    #[tokio::test]
    async fn commands_without_an_id_need_a_current_study() {
        let h = harness();
        let err = run(&h, &["synthesize"], "").await.unwrap_err();
        assert!(matches!(err, ApiError::Port(PortError::NotFound(_))));
    }

    #[tokio::test]
    async fn survey_visit_adds_a_greeted_participant() {
        let h = harness();
        run(&h, &["create", "--title", "Booking a visit", "--description", "d"], "")
            .await
            .unwrap();
        let id = h.pointer.get().await.unwrap().unwrap();

        let out = run(&h, &["survey", &id], "It takes too long\n").await.unwrap();
        assert!(out.contains("Participant 2"));

        let study = h.store.load(&id).await.unwrap().unwrap();
        assert_eq!(study.participants.len(), 2);
        assert_eq!(study.participants[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn closed_survey_prints_the_notice_and_adds_nobody() {
        let h = harness();
        run(&h, &["create", "--title", "T", "--description", "d"], "").await.unwrap();
        let id = h.pointer.get().await.unwrap().unwrap();
        run(&h, &["window", &id, "--until", "2020-01-01T00:00:00Z"], "").await.unwrap();

        let out = run(&h, &["survey", &id], "hello\n").await.unwrap();
        assert!(out.starts_with("Survey has closed."));
        let study = h.store.load(&id).await.unwrap().unwrap();
        assert_eq!(study.participants.len(), 1);
    }

    #[tokio::test]
    async fn deleting_the_current_study_clears_the_pointer() {
        let h = harness();
        run(&h, &["create", "--title", "T", "--description", "d"], "").await.unwrap();
        let id = h.pointer.get().await.unwrap().unwrap();
        run(&h, &["delete", &id], "").await.unwrap();
        assert_eq!(h.pointer.get().await.unwrap(), None);
        assert_eq!(run(&h, &["list"], "").await.unwrap(), "No studies yet\n");
    }

    #[tokio::test]
    async fn list_puts_the_most_recently_updated_study_first() {
        let h = harness();
        run(&h, &["create", "--title", "Older", "--description", "d"], "").await.unwrap();
        let older = h.pointer.get().await.unwrap().unwrap();
        h.clock.advance(chrono::Duration::minutes(1));
        run(&h, &["create", "--title", "Newer", "--description", "d"], "").await.unwrap();

        let titles = |listing: &str| -> Vec<String> {
            listing
                .lines()
                .map(|l| l.split("  ").nth(1).unwrap_or_default().to_string())
                .collect()
        };
        let listing = run(&h, &["list"], "").await.unwrap();
        assert_eq!(titles(&listing), vec!["Newer", "Older"]);
        assert!(listing.lines().next().unwrap().starts_with('*'));

        h.clock.advance(chrono::Duration::minutes(1));
        run(&h, &["chat", &older], "Still here\n").await.unwrap();
        let listing = run(&h, &["list"], "").await.unwrap();
        assert_eq!(titles(&listing), vec!["Older", "Newer"]);
    }

    #[tokio::test]
    async fn chat_without_a_participant_uses_the_newest_one() {
        let h = harness();
        run(&h, &["create", "--title", "T", "--description", "d"], "").await.unwrap();
        let id = h.pointer.get().await.unwrap().unwrap();
        run(&h, &["add-participant"], "").await.unwrap();

        run(&h, &["chat"], "hello\n").await.unwrap();

        let study = h.store.load(&id).await.unwrap().unwrap();
        assert_eq!(study.participants.len(), 2);
        assert_eq!(study.participants[0].messages.len(), 1);
        assert_eq!(study.participants[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn interrupt_at_an_idle_prompt_leaves_the_chat() {
        let h = harness();
        run(&h, &["create", "--title", "T", "--description", "d"], "").await.unwrap();
        tokio::task::yield_now().await;
        h.interrupts.notify_one();

        // The writer half stays open, so the prompt would otherwise wait forever.
        let (_writer, reader) = tokio::io::duplex(64);
        let mut input = tokio::io::BufReader::new(reader);
        let mut out = Vec::new();
        let cli = Cli::try_parse_from(["research", "chat"]).unwrap();
        tokio::time::timeout(
            Duration::from_secs(5),
            h.research.run(cli.command, &mut input, &mut out),
        )
        .await
        .expect("chat returns after the interrupt")
        .unwrap();
        assert!(String::from_utf8(out).unwrap().ends_with("> \n"));
    }

    #[tokio::test]
    async fn analyze_prints_findings_for_each_summary_file() {
        let h = harness();
        let first = h._dir.path().join("round-1.txt");
        let second = h._dir.path().join("round-2.txt");
        std::fs::write(&first, "People could not find the form.").unwrap();
        std::fs::write(&second, "Status updates never arrived.").unwrap();

        let out = run(
            &h,
            &["analyze", first.to_str().unwrap(), second.to_str().unwrap()],
            "",
        )
        .await
        .unwrap();
        assert!(out.starts_with("Synthesis based on 2 study summary document(s)"));
        assert!(out.contains("\n1. "));
        assert!(out.contains("\n7. "));
        assert!(h.store.load_all().await.unwrap().is_empty());

        let blank = h._dir.path().join("blank.txt");
        std::fs::write(&blank, "   \n").unwrap();
        let err = run(&h, &["analyze", blank.to_str().unwrap()], "").await.unwrap_err();
        assert!(matches!(err, ApiError::Port(PortError::InvalidPayload(_))));
        assert!(Cli::try_parse_from(["research", "analyze"]).is_err());
    }

    #[tokio::test]
    async fn profiles_filter_and_explain_empty_results() {
        let h = harness();
        let out = run(&h, &["profiles", "--topic", "Tax", "--availability", "open"], "")
            .await
            .unwrap();
        assert!(out.starts_with("profile-3  [open]"));
        assert!(out.contains("profile-5  [open]  Landlords reporting income"));
        assert_eq!(out.lines().count(), 4);

        let out = run(&h, &["profiles", "--topic", "Licences", "--availability", "open"], "")
            .await
            .unwrap();
        assert!(out.starts_with("No profiles match those filters"));
        assert!(out.contains("categories: Business, Citizens"));
    }

    #[tokio::test]
    async fn signups_are_kept_in_local_storage() {
        let h = harness();
        assert_eq!(run(&h, &["signups"], "").await.unwrap(), "No sign-ups yet\n");

        let out = run(
            &h,
            &["signup", "profile-7", "--name", "Ada", "--email", "ada@example.com", "--message", "Mornings"],
            "",
        )
        .await
        .unwrap();
        assert!(out.starts_with("Signed up Ada for profile-7"));
        assert!(h
            ._dir
            .path()
            .join(research_interview_core::recruitment::SIGNUPS_KEY)
            .exists());

        let err = run(&h, &["signup", "profile-4", "--name", "Bo", "--email", "bo@example.com"], "")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Port(PortError::InvalidPayload(_))));

        let out = run(&h, &["signups"], "").await.unwrap();
        assert_eq!(out.lines().count(), 1);
        assert!(out.contains("profile-7  Ada <ada@example.com>: Mornings"));
    }
}
