use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::json;
use ulid::Ulid;

use joblane_core::filter::{published_only, JobFilter};
use joblane_core::notice::relative_time;
use joblane_core::types::{Job, JobStatus, Role, WorkMode};
use joblane_core::validate::{normalize_skills, validate_job, FieldErrors, JobForm};
use joblane_storage::{JobChanges, JobError, NewJob};

use crate::problem::ProblemResponse;
use crate::router::AppState;
use crate::session::{authenticate, require_role};

/// Posting payload. The optional IANA timezone anchors the date-only
/// deadline check to the caller's calendar; absent, UTC is used.
#[derive(Debug, Deserialize)]
pub struct JobPayload {
    #[serde(flatten)]
    pub form: JobForm,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub status: Option<JobStatus>,
}

/// Job enriched with the computed time-since-posted label.
#[derive(Debug, Serialize)]
struct JobView {
    #[serde(flatten)]
    job: Job,
    posted: String,
}

fn view(job: Job, now: DateTime<Utc>) -> JobView {
    JobView {
        posted: relative_time(job.created_at, now),
        job,
    }
}

/// Resolves "today" on the caller's calendar for the deadline comparison.
fn local_today(now: DateTime<Utc>, timezone: Option<&str>) -> Result<NaiveDate, FieldErrors> {
    let Some(name) = timezone else {
        return Ok(now.date_naive());
    };
    let tz: Tz = name.parse().map_err(|_| {
        let mut errors = FieldErrors::new();
        errors.insert("timezone", format!("unknown timezone: {name}"));
        errors
    })?;
    Ok(now.with_timezone(&tz).date_naive())
}

/// `POST /jobs`: validates and publishes a posting owned by the caller.
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<JobPayload>,
) -> Result<impl IntoResponse, ProblemResponse> {
    submit_posting(state, headers, payload, JobStatus::Published).await
}

/// `POST /jobs/drafts`: same contract, stored as a draft.
pub async fn create_draft(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<JobPayload>,
) -> Result<impl IntoResponse, ProblemResponse> {
    submit_posting(state, headers, payload, JobStatus::Draft).await
}

async fn submit_posting(
    state: AppState,
    headers: HeaderMap,
    payload: JobPayload,
    status: JobStatus,
) -> Result<impl IntoResponse, ProblemResponse> {
    let now = state.now();
    let session = authenticate(state.token_validator(), &headers, now)?;
    require_role(&session, Role::Employer)?;

    let today = local_today(now, payload.timezone.as_deref()).map_err(ProblemResponse::validation)?;
    let errors = validate_job(&payload.form, today);
    if !errors.is_empty() {
        return Err(ProblemResponse::validation(errors));
    }

    let form = payload.form;
    let record = NewJob {
        id: Ulid::new().to_string(),
        employer_id: &session.user_id,
        title: form.title.trim().to_string(),
        company: form.company.trim().to_string(),
        category: form.category,
        job_type: form.job_type,
        location: form.location,
        salary_min: form.salary_min,
        salary_max: form.salary_max,
        description: form.description,
        skills: normalize_skills(&form.skills),
        experience_level: form.experience_level,
        education_level: form.education_level,
        work_mode: form.work_mode,
        industry: form.industry,
        // Validation guarantees the deadline is present and in the future.
        deadline: form.deadline.unwrap_or(today),
        openings: form.openings,
        status,
        created_at: now,
    };
    let job_id = record.id.clone();
    state.storage().jobs().insert(&record).await.map_err(internal)?;

    Ok((StatusCode::CREATED, Json(json!({ "id": job_id }))))
}

/// `PATCH /jobs/{id}`: replaces the editable fields; owner only. The
/// stored status is kept unless the payload asks for a change (this is how
/// a draft gets published).
pub async fn update(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<JobPayload>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let now = state.now();
    let session = authenticate(state.token_validator(), &headers, now)?;
    require_role(&session, Role::Employer)?;

    let existing = fetch_job(&state, &job_id).await?;
    require_owner(&existing, &session.user_id)?;

    let today = local_today(now, payload.timezone.as_deref()).map_err(ProblemResponse::validation)?;
    let errors = validate_job(&payload.form, today);
    if !errors.is_empty() {
        return Err(ProblemResponse::validation(errors));
    }

    let form = payload.form;
    let skills = normalize_skills(&form.skills);
    let changes = JobChanges {
        title: form.title.trim().to_string(),
        company: form.company.trim().to_string(),
        category: form.category,
        job_type: form.job_type,
        location: form.location,
        salary_min: form.salary_min,
        salary_max: form.salary_max,
        description: form.description,
        skills: &skills,
        experience_level: form.experience_level,
        education_level: form.education_level,
        work_mode: form.work_mode,
        industry: form.industry,
        deadline: form.deadline.unwrap_or(today),
        openings: form.openings,
        status: payload.status.unwrap_or(existing.status),
        updated_at: now,
    };
    state
        .storage()
        .jobs()
        .update(&job_id, &changes)
        .await
        .map_err(job_error)?;

    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /jobs/{id}`: removes a posting; owner only.
pub async fn delete(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ProblemResponse> {
    let session = authenticate(state.token_validator(), &headers, state.now())?;
    require_role(&session, Role::Employer)?;

    let existing = fetch_job(&state, &job_id).await?;
    require_owner(&existing, &session.user_id)?;

    state
        .storage()
        .jobs()
        .delete(&job_id)
        .await
        .map_err(job_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /jobs`: published postings, newest first, with the optional
/// free-text and location needles applied conjunctively. A cold store
/// falls back to the fixed sample listing so the page is never empty.
pub async fn list_published(
    State(state): State<AppState>,
    Query(filter): Query<JobFilter>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let now = state.now();
    let mut jobs = state.storage().jobs().list_published().await.map_err(internal)?;
    if jobs.is_empty() {
        jobs = sample_jobs(now);
    }
    // The repository query already excludes drafts; keep the invariant
    // visible at the read-model layer too, sample set included.
    let jobs = filter.apply(published_only(jobs));

    let views: Vec<JobView> = jobs.into_iter().map(|job| view(job, now)).collect();
    Ok(Json(json!({ "count": views.len(), "jobs": views })))
}

/// `GET /jobs/{id}`: public posting detail.
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let job = fetch_job(&state, &job_id).await?;
    Ok(Json(view(job, state.now())))
}

/// `GET /employer/jobs`: everything the caller posted, drafts included.
pub async fn list_mine(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ProblemResponse> {
    let now = state.now();
    let session = authenticate(state.token_validator(), &headers, now)?;
    require_role(&session, Role::Employer)?;

    let jobs = state
        .storage()
        .jobs()
        .list_by_employer(&session.user_id)
        .await
        .map_err(internal)?;
    let views: Vec<JobView> = jobs.into_iter().map(|job| view(job, now)).collect();
    Ok(Json(views))
}

pub(crate) async fn fetch_job(state: &AppState, job_id: &str) -> Result<Job, ProblemResponse> {
    state
        .storage()
        .jobs()
        .fetch(job_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            ProblemResponse::new(StatusCode::NOT_FOUND, "job_not_found", "no such job")
        })
}

pub(crate) fn require_owner(job: &Job, user_id: &str) -> Result<(), ProblemResponse> {
    if job.employer_id == user_id {
        return Ok(());
    }
    Err(ProblemResponse::new(
        StatusCode::FORBIDDEN,
        "not_owner",
        "only the posting employer may modify this job",
    ))
}

fn job_error(err: JobError) -> ProblemResponse {
    match err {
        JobError::NotFound => {
            ProblemResponse::new(StatusCode::NOT_FOUND, "job_not_found", "no such job")
        }
        other => internal(other),
    }
}

fn internal<E: std::fmt::Display>(err: E) -> ProblemResponse {
    ProblemResponse::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "storage_error",
        err.to_string(),
    )
}

/// Fixed illustrative listing served while the store has no published
/// postings. Purely a cold-start affordance of this read model; the
/// repository itself never fabricates rows.
pub(crate) fn sample_jobs(now: DateTime<Utc>) -> Vec<Job> {
    fn entry(
        now: DateTime<Utc>,
        n: u32,
        title: &str,
        company: &str,
        location: &str,
        job_type: &str,
        mode: WorkMode,
        industry: &str,
        salary: (i64, i64),
        skills: &[&str],
        posted_ago: Duration,
    ) -> Job {
        Job {
            id: format!("sample-{n}"),
            employer_id: "sample-employer".to_string(),
            title: title.to_string(),
            company: company.to_string(),
            category: industry.to_string(),
            job_type: job_type.to_string(),
            location: location.to_string(),
            salary_min: Some(salary.0),
            salary_max: Some(salary.1),
            description: format!(
                "{company} is hiring a {title}. This is an illustrative listing shown while no \
                 real postings have been published yet; browse back soon for live roles."
            ),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            experience_level: "Mid-Senior".to_string(),
            education_level: None,
            work_mode: mode,
            industry: Some(industry.to_string()),
            deadline: (now + Duration::days(30)).date_naive(),
            openings: 1,
            status: JobStatus::Published,
            applications_count: 0,
            created_at: now - posted_ago,
            updated_at: now - posted_ago,
        }
    }

    vec![
        entry(
            now,
            1,
            "Senior Software Engineer",
            "TechCorp Industries",
            "New York, NY",
            "Full-Time",
            WorkMode::Hybrid,
            "Technology & IT",
            (120_000, 180_000),
            &["React", "Node.js", "AWS"],
            Duration::days(2),
        ),
        entry(
            now,
            2,
            "Production Manager",
            "GlobalManufacture Co.",
            "Detroit, MI",
            "Full-Time",
            WorkMode::Onsite,
            "Manufacturing",
            (95_000, 130_000),
            &["Manufacturing", "Lean", "Leadership"],
            Duration::days(1),
        ),
        entry(
            now,
            3,
            "Data Scientist",
            "AnalyticsPro",
            "San Francisco, CA",
            "Remote",
            WorkMode::Remote,
            "Technology & IT",
            (140_000, 200_000),
            &["Python", "ML", "TensorFlow"],
            Duration::days(3),
        ),
        entry(
            now,
            4,
            "Financial Analyst",
            "Capital Dynamics",
            "Chicago, IL",
            "Full-Time",
            WorkMode::Onsite,
            "Finance & Banking",
            (85_000, 110_000),
            &["Excel", "SQL", "Finance"],
            Duration::hours(5),
        ),
        entry(
            now,
            5,
            "Civil Engineer",
            "BuildRight Construction",
            "Houston, TX",
            "Full-Time",
            WorkMode::Onsite,
            "Construction",
            (90_000, 125_000),
            &["AutoCAD", "Project Mgmt", "Civil"],
            Duration::days(4),
        ),
        entry(
            now,
            6,
            "Healthcare Administrator",
            "MedGroup Health",
            "Boston, MA",
            "Full-Time",
            WorkMode::Onsite,
            "Healthcare",
            (75_000, 100_000),
            &["Healthcare", "Admin", "HIPAA"],
            Duration::days(7),
        ),
    ]
}
