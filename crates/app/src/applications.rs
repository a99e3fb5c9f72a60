use axum::{
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use metrics::counter;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use joblane_clients::BlobClient;
use joblane_core::notice::Notice;
use joblane_core::types::{ApplicantProfile, Application, ApplicationStatus, Role};
use joblane_core::validate::{validate_application, validate_resume, ApplicationForm};
use joblane_storage::{ApplicationError, NewApplication};

use crate::jobs::{fetch_job, require_owner};
use crate::notifications::fan_out;
use crate::problem::ProblemResponse;
use crate::router::AppState;
use crate::session::{authenticate, require_role};

/// Résumé attachment pulled out of the multipart body.
struct ResumeUpload {
    filename: String,
    content_type: String,
    bytes: Vec<u8>,
}

/// `POST /jobs/{id}/applications`: a seeker submits an application with a
/// résumé attachment.
///
/// Order of checks matters: form and attachment validation run before any
/// upload or write, the duplicate fast-check runs before the upload, and
/// the insert itself is the atomic arbiter of the (seeker, job) uniqueness
/// rule. The employer notification afterwards is best-effort only.
pub async fn submit(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<impl IntoResponse, ProblemResponse> {
    let now = state.now();
    let session = authenticate(state.token_validator(), &headers, now)?;
    require_role(&session, Role::Seeker)?;

    let (form, resume) = read_multipart(multipart).await?;

    let mut errors = validate_application(&form);
    let resume = match resume {
        Some(resume) => resume,
        None => {
            errors.insert("resume", "Resume attachment is required".to_string());
            return Err(ProblemResponse::validation(errors));
        }
    };
    if !errors.is_empty() {
        return Err(ProblemResponse::validation(errors));
    }

    validate_resume(&resume.content_type, resume.bytes.len()).map_err(|err| {
        ProblemResponse::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_attachment",
            err.to_string(),
        )
    })?;

    let job = fetch_job(&state, &job_id).await?;
    if job.status != joblane_core::types::JobStatus::Published {
        return Err(ProblemResponse::new(
            StatusCode::NOT_FOUND,
            "job_not_found",
            "no such job",
        ));
    }

    // Fast path for the common double-click; the insert below still closes
    // the race window atomically.
    let existing = state
        .storage()
        .applications()
        .fetch_for_seeker(&session.user_id, &job_id)
        .await
        .map_err(internal)?;
    if existing.is_some() {
        counter!("applications_duplicate_total").increment(1);
        return Err(already_applied());
    }

    let path = BlobClient::resume_path(&session.user_id, now, &resume.filename);
    let resume_url = state
        .blob()
        .put(&path, &resume.content_type, resume.bytes)
        .await
        .map_err(|err| {
            ProblemResponse::new(
                StatusCode::BAD_GATEWAY,
                "resume_upload_failed",
                err.to_string(),
            )
        })?;

    let record = NewApplication {
        seeker_id: &session.user_id,
        job_id: &job_id,
        profile: ApplicantProfile {
            full_name: form.full_name.trim().to_string(),
            email: form.email.trim().to_string(),
            phone: form.phone.trim().to_string(),
            current_role: form.current_role,
            experience: form.experience,
            education: form.education,
            portfolio_url: form.portfolio_url,
        },
        cover_letter: form.cover_letter,
        resume_url: &resume_url,
        resume_filename: &resume.filename,
        job_title: &job.title,
        company: &job.company,
        applied_at: now,
    };
    let application = match state.storage().applications().insert(&record).await {
        Ok(application) => application,
        Err(ApplicationError::AlreadyApplied) => {
            counter!("applications_duplicate_total").increment(1);
            return Err(already_applied());
        }
        Err(other) => return Err(internal(other)),
    };

    counter!("applications_submitted_total").increment(1);
    info!(
        stage = "applications",
        job_id,
        seeker_id = %session.user_id,
        "application submitted"
    );

    fan_out(
        &state,
        &job.employer_id,
        Notice::new_application(
            &job.id,
            &job.title,
            &session.user_id,
            &application.applicant.full_name,
        ),
    )
    .await;

    Ok((StatusCode::CREATED, Json(application)))
}

/// `GET /jobs/{id}/applications/me`: the caller's own application to this
/// job, if any.
pub async fn my_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ProblemResponse> {
    let session = authenticate(state.token_validator(), &headers, state.now())?;
    let application = state
        .storage()
        .applications()
        .fetch_for_seeker(&session.user_id, &job_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            ProblemResponse::new(
                StatusCode::NOT_FOUND,
                "not_applied",
                "no application exists for this job",
            )
        })?;
    Ok(Json(application))
}

/// `GET /jobs/{id}/applications`: applications for one posting; owner
/// only.
pub async fn list_for_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ProblemResponse> {
    let session = authenticate(state.token_validator(), &headers, state.now())?;
    require_role(&session, Role::Employer)?;
    let job = fetch_job(&state, &job_id).await?;
    require_owner(&job, &session.user_id)?;

    let applications = state
        .storage()
        .applications()
        .list_for_job(&job_id)
        .await
        .map_err(internal)?;
    Ok(Json(applications))
}

/// `GET /employer/applications`: applications across every posting the
/// caller owns, with per-status counts for the review dashboard.
pub async fn list_for_employer(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ProblemResponse> {
    let session = authenticate(state.token_validator(), &headers, state.now())?;
    require_role(&session, Role::Employer)?;

    let jobs = state
        .storage()
        .jobs()
        .list_by_employer(&session.user_id)
        .await
        .map_err(internal)?;
    let job_ids: Vec<String> = jobs.into_iter().map(|job| job.id).collect();

    let applications = state
        .storage()
        .applications()
        .list_for_jobs(&job_ids)
        .await
        .map_err(internal)?;

    let counts = status_counts(&applications);
    Ok(Json(json!({
        "applications": applications,
        "counts": counts,
    })))
}

/// `POST /applications/{id}/status`: moves an application to any status;
/// only the employer owning the underlying job may call this, and every
/// call stamps the review time.
pub async fn update_status(
    State(state): State<AppState>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<StatusPayload>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let now = state.now();
    let session = authenticate(state.token_validator(), &headers, now)?;
    require_role(&session, Role::Employer)?;

    let application = state
        .storage()
        .applications()
        .fetch(&application_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            ProblemResponse::new(
                StatusCode::NOT_FOUND,
                "application_not_found",
                "no such application",
            )
        })?;

    let job = fetch_job(&state, &application.job_id).await?;
    require_owner(&job, &session.user_id)?;

    let updated = state
        .storage()
        .applications()
        .update_status(&application_id, payload.status, now)
        .await
        .map_err(|err| match err {
            ApplicationError::NotFound => ProblemResponse::new(
                StatusCode::NOT_FOUND,
                "application_not_found",
                "no such application",
            ),
            other => internal(other),
        })?;
    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
pub struct StatusPayload {
    pub status: ApplicationStatus,
}

fn status_counts(applications: &[Application]) -> serde_json::Value {
    let count_of = |status: ApplicationStatus| {
        applications
            .iter()
            .filter(|app| app.status == status)
            .count()
    };
    json!({
        "total": applications.len(),
        "pending": count_of(ApplicationStatus::Pending),
        "reviewed": count_of(ApplicationStatus::Reviewed),
        "shortlisted": count_of(ApplicationStatus::Shortlisted),
        "rejected": count_of(ApplicationStatus::Rejected),
    })
}

async fn read_multipart(
    mut multipart: Multipart,
) -> Result<(ApplicationForm, Option<ResumeUpload>), ProblemResponse> {
    let mut form = ApplicationForm::default();
    let mut resume = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "resume" => {
                let filename = field
                    .file_name()
                    .filter(|f| !f.is_empty())
                    .unwrap_or("resume")
                    .to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(bad_multipart)?.to_vec();
                resume = Some(ResumeUpload {
                    filename,
                    content_type,
                    bytes,
                });
            }
            "full_name" => form.full_name = field.text().await.map_err(bad_multipart)?,
            "email" => form.email = field.text().await.map_err(bad_multipart)?,
            "phone" => form.phone = field.text().await.map_err(bad_multipart)?,
            "cover_letter" => {
                form.cover_letter = non_empty(field.text().await.map_err(bad_multipart)?)
            }
            "current_role" => {
                form.current_role = non_empty(field.text().await.map_err(bad_multipart)?)
            }
            "experience" => form.experience = non_empty(field.text().await.map_err(bad_multipart)?),
            "education" => form.education = non_empty(field.text().await.map_err(bad_multipart)?),
            "portfolio_url" => {
                form.portfolio_url = non_empty(field.text().await.map_err(bad_multipart)?)
            }
            _ => {}
        }
    }

    Ok((form, resume))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> ProblemResponse {
    ProblemResponse::new(
        StatusCode::BAD_REQUEST,
        "invalid_multipart",
        err.to_string(),
    )
}

fn already_applied() -> ProblemResponse {
    ProblemResponse::new(
        StatusCode::CONFLICT,
        "already_applied",
        "you have already applied to this job",
    )
}

fn internal<E: std::fmt::Display>(err: E) -> ProblemResponse {
    ProblemResponse::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "storage_error",
        err.to_string(),
    )
}
