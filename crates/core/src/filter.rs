use serde::Deserialize;

use crate::types::{Job, JobStatus};

/// Listing filter applied to published postings. Both needles are plain
/// case-insensitive substring matches (no ranking), combined with AND.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobFilter {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl JobFilter {
    /// Returns `true` when no needle is set.
    pub fn is_empty(&self) -> bool {
        needle(&self.text).is_none() && needle(&self.location).is_none()
    }

    /// Returns `true` when the job satisfies every set needle.
    ///
    /// The free-text needle is matched against title, company, job type,
    /// skills and industry; the location needle against location and work
    /// mode.
    pub fn matches(&self, job: &Job) -> bool {
        if let Some(text) = needle(&self.text) {
            let hit = contains_ci(&job.title, &text)
                || contains_ci(&job.company, &text)
                || contains_ci(&job.job_type, &text)
                || job.skills.iter().any(|skill| contains_ci(skill, &text))
                || job
                    .industry
                    .as_deref()
                    .map(|industry| contains_ci(industry, &text))
                    .unwrap_or(false);
            if !hit {
                return false;
            }
        }

        if let Some(location) = needle(&self.location) {
            let hit = contains_ci(&job.location, &location)
                || contains_ci(job.work_mode.as_str(), &location);
            if !hit {
                return false;
            }
        }

        true
    }

    /// Applies the filter to a listing, preserving the input order.
    pub fn apply(&self, jobs: Vec<Job>) -> Vec<Job> {
        jobs.into_iter().filter(|job| self.matches(job)).collect()
    }
}

fn needle(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_lowercase)
}

fn contains_ci(haystack: &str, lowered_needle: &str) -> bool {
    haystack.to_lowercase().contains(lowered_needle)
}

/// Listings never include drafts, whatever the filter says.
pub fn published_only(jobs: Vec<Job>) -> Vec<Job> {
    jobs.into_iter()
        .filter(|job| job.status == JobStatus::Published)
        .collect()
}
