use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Role carried by an authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Seeker,
    Employer,
    Admin,
}

impl Role {
    /// Returns the canonical wire representation for the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Seeker => "jobseeker",
            Self::Employer => "employer",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "jobseeker" => Ok(Self::Seeker),
            "employer" => Ok(Self::Employer),
            "admin" => Ok(Self::Admin),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Role {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Role::from_str(&value).map_err(|_| D::Error::custom("unknown role"))
    }
}

/// Authenticated caller identity passed explicitly into every core
/// operation. Never stored globally; decoded from the session token at the
/// HTTP boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub user_id: String,
    pub role: Role,
    pub display_name: String,
    pub email: String,
}

/// Publication state of a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Draft,
    Published,
}

impl JobStatus {
    /// Returns the canonical database representation for the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }
}

impl FromStr for JobStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            _ => Err(()),
        }
    }
}

/// Where the work happens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkMode {
    #[default]
    Onsite,
    Hybrid,
    Remote,
}

impl WorkMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Onsite => "onsite",
            Self::Hybrid => "hybrid",
            Self::Remote => "remote",
        }
    }
}

impl FromStr for WorkMode {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "onsite" => Ok(Self::Onsite),
            "hybrid" => Ok(Self::Hybrid),
            "remote" => Ok(Self::Remote),
            _ => Err(()),
        }
    }
}

/// A job posting owned by exactly one employer. Ownership never transfers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub employer_id: String,
    pub title: String,
    pub company: String,
    pub category: String,
    pub job_type: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salary_min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salary_max: Option<i64>,
    pub description: String,
    pub skills: Vec<String>,
    pub experience_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub education_level: Option<String>,
    pub work_mode: WorkMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    pub deadline: NaiveDate,
    pub openings: u32,
    pub status: JobStatus,
    pub applications_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Review state of an application. Transitions are deliberately
/// unconstrained: the employer may move an application to any status from
/// any status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Reviewed,
    Shortlisted,
    Rejected,
}

impl ApplicationStatus {
    /// Returns the canonical database representation for the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Reviewed => "reviewed",
            Self::Shortlisted => "shortlisted",
            Self::Rejected => "rejected",
        }
    }

    /// All statuses, in dashboard display order.
    pub const ALL: [ApplicationStatus; 4] = [
        Self::Pending,
        Self::Reviewed,
        Self::Shortlisted,
        Self::Rejected,
    ];
}

impl FromStr for ApplicationStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "reviewed" => Ok(Self::Reviewed),
            "shortlisted" => Ok(Self::Shortlisted),
            "rejected" => Ok(Self::Rejected),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applicant-submitted profile snapshot, frozen at submission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicantProfile {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub education: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portfolio_url: Option<String>,
}

/// A seeker's application to one job. At most one exists per
/// (seeker, job) pair; the identifier is derived from that pair rather
/// than generated, so the uniqueness rule is enforced by the store's key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub seeker_id: String,
    pub job_id: String,
    pub applicant: ApplicantProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_letter: Option<String>,
    pub resume_url: String,
    pub resume_filename: String,
    /// Denormalized for display; goes stale if the job is later edited.
    pub job_title: String,
    pub company: String,
    pub status: ApplicationStatus,
    pub applied_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Application {
    /// Deterministic identity for the (seeker, job) pair.
    pub fn key(seeker_id: &str, job_id: &str) -> String {
        format!("{seeker_id}:{job_id}")
    }
}

/// A two-party message thread. The participant pair is fixed at creation;
/// display names are denormalized copies of the profiles at that moment and
/// are not refreshed when a profile changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub employer_id: String,
    pub seeker_id: String,
    pub employer_name: String,
    pub seeker_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    pub last_message: String,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Returns the participant that is not `sender_id`, or `None` when the
    /// sender is not part of the pair.
    pub fn counterpart_of(&self, sender_id: &str) -> Option<&str> {
        if sender_id == self.employer_id {
            Some(self.seeker_id.as_str())
        } else if sender_id == self.seeker_id {
            Some(self.employer_id.as_str())
        } else {
            None
        }
    }

    /// Role-relative display name: each side sees the other side's name.
    pub fn other_name(&self, viewer_id: &str) -> &str {
        if viewer_id == self.employer_id {
            &self.seeker_name
        } else {
            &self.employer_name
        }
    }
}

/// One chat entry within a conversation. Append-only; never edited or
/// deleted. `seq` is the storage sequence used to splice live streams
/// without gaps, and plays no part in display ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub conversation_id: String,
    pub seq: i64,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

/// Type-specific notification payload. New variants may be added without
/// touching the existing ones; unknown payloads never occur because
/// notifications are only produced by the application and conversation
/// write paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NoticeKind {
    #[serde(rename_all = "snake_case")]
    NewApplication {
        job_id: String,
        job_title: String,
        applicant_id: String,
        applicant_name: String,
    },
    #[serde(rename_all = "snake_case")]
    NewMessage {
        conversation_id: String,
        from_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        job_title: Option<String>,
        preview: String,
    },
}

impl NoticeKind {
    /// Canonical event type string used for storage and metrics labels.
    pub fn type_str(&self) -> &'static str {
        match self {
            Self::NewApplication { .. } => "new_application",
            Self::NewMessage { .. } => "new_message",
        }
    }
}

/// A derived, read-tracked event pointing back at an application or
/// conversation change. Created only as a side effect of those writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    #[serde(flatten)]
    pub kind: NoticeKind,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_wire_form() {
        for role in [Role::Seeker, Role::Employer, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn application_key_is_deterministic() {
        assert_eq!(Application::key("u-7", "j-3"), "u-7:j-3");
        assert_eq!(
            Application::key("u-7", "j-3"),
            Application::key("u-7", "j-3")
        );
    }

    #[test]
    fn counterpart_is_derived_by_set_difference() {
        let conv = Conversation {
            id: "c-1".to_string(),
            employer_id: "emp-1".to_string(),
            seeker_id: "seek-1".to_string(),
            employer_name: "Acme HR".to_string(),
            seeker_name: "Alice".to_string(),
            job_id: None,
            job_title: None,
            last_message: String::new(),
            last_message_at: Utc::now(),
            created_at: Utc::now(),
        };
        assert_eq!(conv.counterpart_of("emp-1"), Some("seek-1"));
        assert_eq!(conv.counterpart_of("seek-1"), Some("emp-1"));
        assert_eq!(conv.counterpart_of("stranger"), None);
    }

    #[test]
    fn other_name_is_role_relative() {
        let conv = Conversation {
            id: "c-1".to_string(),
            employer_id: "emp-1".to_string(),
            seeker_id: "seek-1".to_string(),
            employer_name: "Acme HR".to_string(),
            seeker_name: "Alice".to_string(),
            job_id: None,
            job_title: None,
            last_message: String::new(),
            last_message_at: Utc::now(),
            created_at: Utc::now(),
        };
        assert_eq!(conv.other_name("emp-1"), "Alice");
        assert_eq!(conv.other_name("seek-1"), "Acme HR");
    }

    #[test]
    fn notice_kind_serializes_with_type_tag() {
        let kind = NoticeKind::NewMessage {
            conversation_id: "c-1".to_string(),
            from_name: "Acme HR".to_string(),
            job_title: Some("Backend Engineer".to_string()),
            preview: "When can you interview?".to_string(),
        };
        let value = serde_json::to_value(&kind).unwrap();
        assert_eq!(value["type"].as_str(), Some("new_message"));
        assert_eq!(value["conversation_id"].as_str(), Some("c-1"));
    }
}
