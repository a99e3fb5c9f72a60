use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

use crate::types::WorkMode;

/// Field-keyed validation errors. An empty map means the input may be
/// persisted; callers must not write anything while the map is non-empty.
pub type FieldErrors = BTreeMap<&'static str, String>;

const MIN_TITLE_CHARS: usize = 5;
const MIN_DESCRIPTION_CHARS: usize = 100;

/// Client-submitted posting payload, validated before any write.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JobForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub job_type: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub salary_min: Option<i64>,
    #[serde(default)]
    pub salary_max: Option<i64>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience_level: String,
    #[serde(default)]
    pub education_level: Option<String>,
    #[serde(default = "default_work_mode")]
    pub work_mode: WorkMode,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub openings: u32,
}

fn default_work_mode() -> WorkMode {
    WorkMode::Onsite
}

/// Validates a posting against the publication contract.
///
/// `today` is the caller-local calendar date; the deadline comparison is
/// date-only and strict, so a deadline equal to `today` is rejected.
pub fn validate_job(form: &JobForm, today: NaiveDate) -> FieldErrors {
    let mut errors = FieldErrors::new();

    let title = form.title.trim();
    if title.is_empty() {
        errors.insert("title", "Job title is required".to_string());
    } else if title.chars().count() < MIN_TITLE_CHARS {
        errors.insert("title", "Title must be at least 5 characters".to_string());
    }

    if form.category.trim().is_empty() {
        errors.insert("category", "Please select a category".to_string());
    }
    if form.job_type.trim().is_empty() {
        errors.insert("job_type", "Please select a job type".to_string());
    }
    if form.location.trim().is_empty() {
        errors.insert("location", "Location is required".to_string());
    }

    if let (Some(min), Some(max)) = (form.salary_min, form.salary_max) {
        if min >= max {
            errors.insert(
                "salary_max",
                "Maximum salary must be greater than minimum".to_string(),
            );
        }
    }

    let description = form.description.trim();
    if description.is_empty() {
        errors.insert("description", "Job description is required".to_string());
    } else if description.chars().count() < MIN_DESCRIPTION_CHARS {
        errors.insert(
            "description",
            "Description must be at least 100 characters".to_string(),
        );
    }

    if form.experience_level.trim().is_empty() {
        errors.insert(
            "experience_level",
            "Please select experience level".to_string(),
        );
    }

    match form.deadline {
        None => {
            errors.insert("deadline", "Application deadline is required".to_string());
        }
        Some(deadline) if deadline <= today => {
            errors.insert("deadline", "Deadline must be a future date".to_string());
        }
        Some(_) => {}
    }

    if form.openings < 1 {
        errors.insert("openings", "At least 1 opening is required".to_string());
    }

    errors
}

/// Returns the skill list in submission order with duplicates and blanks
/// removed (case-insensitive comparison, first spelling wins).
pub fn normalize_skills(skills: &[String]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut result = Vec::new();
    for skill in skills {
        let trimmed = skill.trim();
        if trimmed.is_empty() {
            continue;
        }
        let folded = trimmed.to_lowercase();
        if seen.contains(&folded) {
            continue;
        }
        seen.push(folded);
        result.push(trimmed.to_string());
    }
    result
}

/// Applicant-submitted form fields accompanying a résumé.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApplicationForm {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub cover_letter: Option<String>,
    #[serde(default)]
    pub current_role: Option<String>,
    #[serde(default)]
    pub experience: Option<String>,
    #[serde(default)]
    pub education: Option<String>,
    #[serde(default)]
    pub portfolio_url: Option<String>,
}

/// Validates the application form fields. The résumé attachment is checked
/// separately by [`validate_resume`] so the two failure modes stay distinct.
pub fn validate_application(form: &ApplicationForm) -> FieldErrors {
    let mut errors = FieldErrors::new();

    if form.full_name.trim().is_empty() {
        errors.insert("full_name", "Full name is required".to_string());
    }

    let email = form.email.trim();
    if email.is_empty() {
        errors.insert("email", "Email is required".to_string());
    } else if !is_basic_email(email) {
        errors.insert("email", "Enter a valid email address".to_string());
    }

    if form.phone.trim().is_empty() {
        errors.insert("phone", "Phone number is required".to_string());
    }

    errors
}

/// Minimal `local@domain` shape check; anything stricter belongs to the
/// identity provider.
fn is_basic_email(value: &str) -> bool {
    let mut parts = value.splitn(2, '@');
    match (parts.next(), parts.next()) {
        (Some(local), Some(domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@')
        }
        _ => false,
    }
}

/// Largest résumé accepted, in bytes.
pub const MAX_RESUME_BYTES: usize = 5 * 1024 * 1024;

/// Declared content types accepted for a résumé upload.
pub const ALLOWED_RESUME_TYPES: [&str; 3] = [
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Rejection reasons for a résumé attachment, checked before any upload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachmentError {
    #[error("unsupported resume type: {0}")]
    UnsupportedType(String),
    #[error("resume exceeds the {MAX_RESUME_BYTES} byte limit ({0} bytes)")]
    TooLarge(usize),
}

/// Checks the declared content type and size of a résumé attachment.
pub fn validate_resume(content_type: &str, size_bytes: usize) -> Result<(), AttachmentError> {
    if !ALLOWED_RESUME_TYPES.contains(&content_type) {
        return Err(AttachmentError::UnsupportedType(content_type.to_string()));
    }
    if size_bytes > MAX_RESUME_BYTES {
        return Err(AttachmentError::TooLarge(size_bytes));
    }
    Ok(())
}
