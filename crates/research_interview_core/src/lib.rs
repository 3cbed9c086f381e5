pub mod aggregation;
pub mod clock;
pub mod conversation;
pub mod domain;
pub mod gate;
pub mod interviewer;
pub mod kv;
pub mod ports;
pub mod recruitment;
pub mod store;

pub use aggregation::{synthesize_from_studies, AggregationPipeline};
pub use clock::{ManualClock, SystemClock};
pub use conversation::ConversationLoop;
pub use domain::{
    DerivedTheme, Insight, KeyNeed, Message, MessageRole, Need, Participant, Priority, Study,
    StudySummaryAnalysis, StudySummaryFinding, Theme,
};
pub use gate::{SurveyAccess, SurveyGate, SurveySession};
pub use interviewer::{FixedLatency, NoLatency, ScriptedInterviewer};
pub use kv::{CurrentStudyPointer, MemoryKeyValueStore};
pub use ports::{
    Clock, InterviewerService, KeyValueStore, Latency, PortError, PortResult, StudyStore,
};
pub use recruitment::{
    Availability, ProfileFilter, RecruitmentDesk, RecruitmentProfile, RecruitmentSignup,
};
pub use store::EmbeddedStudyStore;
