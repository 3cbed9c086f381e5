//! crates/research_interview_core/src/recruitment.rs
//!
//! The recruitment portal: a fixed catalogue of participant profiles being
//! recruited for, filtering over it, and sign-ups kept as one JSON array in a
//! local `KeyValueStore`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::generate_id;
use crate::ports::{Clock, KeyValueStore, PortError, PortResult};

/// Fixed key holding every sign-up made on this machine.
pub const SIGNUPS_KEY: &str = "user-research-recruitment-signups";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Open,
    Full,
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Open => f.write_str("open"),
            Availability::Full => f.write_str("full"),
        }
    }
}

impl FromStr for Availability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(Availability::Open),
            "full" => Ok(Availability::Full),
            other => Err(format!("'{}' is not one of open, full", other)),
        }
    }
}

/// A kind of person a study is recruiting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecruitmentProfile {
    pub id: String,
    pub title: String,
    pub description: String,
    /// e.g. "Citizens", "Business"
    pub category: String,
    pub segment: String,
    pub topic: String,
    pub availability: Availability,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_title: Option<String>,
}

/// Someone volunteering for a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecruitmentSignup {
    pub id: String,
    pub profile_id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// Catalogue & Filtering
//=========================================================================================

/// The profiles currently being recruited for.
pub fn recruitment_profiles() -> Vec<RecruitmentProfile> {
    let profile = |id: &str,
                   title: &str,
                   description: &str,
                   category: &str,
                   segment: &str,
                   topic: &str,
                   availability,
                   study_title: &str| RecruitmentProfile {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        category: category.to_string(),
        segment: segment.to_string(),
        topic: topic.to_string(),
        availability,
        study_title: Some(study_title.to_string()),
    };

    vec![
        profile(
            "profile-1",
            "Parents with young children",
            "We're looking for parents or guardians with at least one child under 5 to share their experience of applying for family benefits and childcare support.",
            "Citizens",
            "Parents",
            "Benefits",
            Availability::Open,
            "Family benefits service",
        ),
        profile(
            "profile-2",
            "First-time benefit applicants",
            "Adults who have never applied for government benefits before and are considering or have just started an application.",
            "Citizens",
            "First-time users",
            "Benefits",
            Availability::Open,
            "Benefits application journey",
        ),
        profile(
            "profile-3",
            "Small business owners (1–10 employees)",
            "Owner or main decision-maker of a small business. We want to understand how you handle tax and reporting obligations.",
            "Business",
            "Small business",
            "Tax",
            Availability::Open,
            "Business tax portal",
        ),
        profile(
            "profile-4",
            "Drivers renewing a licence",
            "People who have renewed or are about to renew their driving licence (any age). We're improving the renewal process.",
            "Citizens",
            "General",
            "Licences",
            Availability::Full,
            "Licence renewal",
        ),
        profile(
            "profile-5",
            "Landlords reporting income",
            "Individuals who earn rental income and need to report it. We're testing a new way to declare property income.",
            "Citizens",
            "Landlords",
            "Tax",
            Availability::Open,
            "Property income reporting",
        ),
        profile(
            "profile-6",
            "Newly registered companies",
            "Someone who has registered a company in the last 12 months. We want to learn about your experience of the registration and first steps.",
            "Business",
            "Start-ups",
            "Registration",
            Availability::Open,
            "Company registration",
        ),
        profile(
            "profile-7",
            "Older adults (65+) using digital services",
            "Adults aged 65 or over who use online government services. We're making our services easier to use for everyone.",
            "Citizens",
            "Older adults",
            "Accessibility",
            Availability::Open,
            "Inclusive digital services",
        ),
        profile(
            "profile-8",
            "Jobseekers using employment support",
            "People who are looking for work and have used or are considering employment support, job search tools or benefit-related services.",
            "Citizens",
            "Jobseekers",
            "Benefits",
            Availability::Open,
            "Employment support",
        ),
    ]
}

/// Exact-match filters; an unset field matches every profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileFilter {
    pub category: Option<String>,
    pub segment: Option<String>,
    pub topic: Option<String>,
    pub availability: Option<Availability>,
}

impl ProfileFilter {
    pub fn matches(&self, profile: &RecruitmentProfile) -> bool {
        let field = |wanted: &Option<String>, actual: &str| {
            wanted.as_deref().map_or(true, |w| w.is_empty() || w == actual)
        };
        field(&self.category, &profile.category)
            && field(&self.segment, &profile.segment)
            && field(&self.topic, &profile.topic)
            && self.availability.map_or(true, |a| a == profile.availability)
    }

    pub fn apply<'a>(&self, profiles: &'a [RecruitmentProfile]) -> Vec<&'a RecruitmentProfile> {
        profiles.iter().filter(|p| self.matches(p)).collect()
    }
}

/// The distinct, sorted, non-empty values of one profile field.
pub fn facet_values<F>(profiles: &[RecruitmentProfile], field: F) -> Vec<String>
where
    F: Fn(&RecruitmentProfile) -> &str,
{
    profiles
        .iter()
        .map(|p| field(p))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

//=========================================================================================
// Sign-ups
//=========================================================================================

/// Takes sign-ups against the catalogue and keeps them in local storage.
pub struct RecruitmentDesk {
    local: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    profiles: Vec<RecruitmentProfile>,
    write_lock: Mutex<()>,
}

impl RecruitmentDesk {
    pub fn new(local: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_profiles(local, clock, recruitment_profiles())
    }

    pub fn with_profiles(
        local: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        profiles: Vec<RecruitmentProfile>,
    ) -> Self {
        Self {
            local,
            clock,
            profiles,
            write_lock: Mutex::new(()),
        }
    }

    pub fn profiles(&self) -> &[RecruitmentProfile] {
        &self.profiles
    }

    /// Every stored sign-up, oldest first. An unreadable list reads as empty.
    pub async fn signups(&self) -> PortResult<Vec<RecruitmentSignup>> {
        let Some(raw) = self.local.get(SIGNUPS_KEY).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Vec<RecruitmentSignup>>(&raw) {
            Ok(signups) => Ok(signups),
            Err(e) => {
                warn!("Ignoring unreadable recruitment sign-ups: {}", e);
                Ok(Vec::new())
            }
        }
    }

    /// Records a sign-up for an open profile. Name and email are required;
    /// a blank message is dropped.
    pub async fn sign_up(
        &self,
        profile_id: &str,
        name: &str,
        email: &str,
        message: Option<&str>,
    ) -> PortResult<RecruitmentSignup> {
        let (name, email) = (name.trim(), email.trim());
        if name.is_empty() || email.is_empty() {
            return Err(PortError::InvalidPayload(
                "Name and email are required to sign up".to_string(),
            ));
        }
        let profile = self
            .profiles
            .iter()
            .find(|p| p.id == profile_id)
            .ok_or_else(|| PortError::NotFound(format!("Profile {} not found", profile_id)))?;
        if profile.availability == Availability::Full {
            return Err(PortError::InvalidPayload(format!(
                "Profile '{}' is no longer recruiting",
                profile.title
            )));
        }

        let signup = RecruitmentSignup {
            id: generate_id("signup"),
            profile_id: profile.id.clone(),
            name: name.to_string(),
            email: email.to_string(),
            message: message
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string),
            created_at: self.clock.now(),
        };

        let _guard = self.write_lock.lock().await;
        let mut signups = self.signups().await?;
        signups.push(signup.clone());
        let raw =
            serde_json::to_string(&signups).map_err(|e| PortError::Unexpected(e.to_string()))?;
        self.local.set(SIGNUPS_KEY, &raw).await?;
        info!("Recorded sign-up {} for {}", signup.id, profile.id);
        Ok(signup)
    }
}
