use chrono::{DateTime, Utc};

use crate::types::{NoticeKind, Notification};

/// Longest message excerpt carried inside a `new_message` notification.
pub const PREVIEW_CHARS: usize = 100;

/// Pure constructors for the notification payloads emitted by the two
/// fan-out paths. Identifiers and persistence are the store's concern;
/// these only shape the payload.
pub struct Notice;

impl Notice {
    /// Payload announcing a fresh application to the job's employer.
    pub fn new_application(
        job_id: &str,
        job_title: &str,
        applicant_id: &str,
        applicant_name: &str,
    ) -> NoticeKind {
        NoticeKind::NewApplication {
            job_id: job_id.to_string(),
            job_title: job_title.to_string(),
            applicant_id: applicant_id.to_string(),
            applicant_name: applicant_name.to_string(),
        }
    }

    /// Payload announcing a new chat message to the counterpart.
    pub fn new_message(
        conversation_id: &str,
        from_name: &str,
        job_title: Option<&str>,
        text: &str,
    ) -> NoticeKind {
        NoticeKind::NewMessage {
            conversation_id: conversation_id.to_string(),
            from_name: from_name.to_string(),
            job_title: job_title.map(|t| t.to_string()),
            preview: preview(text),
        }
    }
}

/// First [`PREVIEW_CHARS`] characters of the message text.
pub fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

/// Human-readable one-line summary for a notification list entry.
pub fn summary(notification: &Notification) -> String {
    match &notification.kind {
        NoticeKind::NewApplication {
            applicant_name,
            job_title,
            ..
        } => format!("{applicant_name} applied for {job_title}"),
        NoticeKind::NewMessage {
            from_name,
            job_title: Some(title),
            ..
        } => format!("{from_name} sent you a message about {title}"),
        NoticeKind::NewMessage { from_name, .. } => {
            format!("{from_name} sent you a message")
        }
    }
}

/// Coarse relative-time label used by the notification read model.
pub fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = now.signed_duration_since(at).num_seconds();
    if seconds < 60 {
        return "Just now".to_string();
    }
    if seconds < 3600 {
        return format!("{}m ago", seconds / 60);
    }
    if seconds < 86_400 {
        return format!("{}h ago", seconds / 3600);
    }
    if seconds < 604_800 {
        return format!("{}d ago", seconds / 86_400);
    }
    at.format("%-d %b").to_string()
}
