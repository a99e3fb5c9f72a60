use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::{sse::KeepAlive, IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;

use joblane_clients::{BlobClient, IdentityClient};
use joblane_core::dashboard::dashboard_for;
use joblane_core::types::Role;
use joblane_storage::Database;

use crate::hub::LiveHub;
use crate::problem::ProblemResponse;
use crate::session::{authenticate, SessionTokenValidator};
use crate::{applications, conversations, jobs, notifications, telemetry};

/// Uploads may carry a résumé of up to 5 MiB plus the form fields around
/// it.
const BODY_LIMIT_BYTES: usize = 6 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    identity: IdentityClient,
    blob: BlobClient,
    token_validator: SessionTokenValidator,
    hub: LiveHub,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    sse_heartbeat_secs: u64,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        storage: Database,
        identity: IdentityClient,
        blob: BlobClient,
        session_token_secret: &[u8],
        sse_heartbeat_secs: u64,
    ) -> Self {
        Self {
            metrics,
            storage,
            identity,
            blob,
            token_validator: SessionTokenValidator::new(session_token_secret),
            hub: LiveHub::new(),
            clock: Arc::new(Utc::now),
            sse_heartbeat_secs,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn identity(&self) -> &IdentityClient {
        &self.identity
    }

    pub fn blob(&self) -> &BlobClient {
        &self.blob
    }

    pub fn token_validator(&self) -> &SessionTokenValidator {
        &self.token_validator
    }

    pub fn hub(&self) -> &LiveHub {
        &self.hub
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn sse_keep_alive(&self) -> KeepAlive {
        KeepAlive::new().interval(Duration::from_secs(self.sse_heartbeat_secs))
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/jobs", get(jobs::list_published).post(jobs::create))
        .route("/jobs/drafts", post(jobs::create_draft))
        .route(
            "/jobs/:id",
            get(jobs::get_by_id)
                .patch(jobs::update)
                .delete(jobs::delete),
        )
        .route("/employer/jobs", get(jobs::list_mine))
        .route(
            "/jobs/:id/applications",
            post(applications::submit).get(applications::list_for_job),
        )
        .route("/jobs/:id/applications/me", get(applications::my_status))
        .route("/employer/applications", get(applications::list_for_employer))
        .route("/applications/:id/status", post(applications::update_status))
        .route(
            "/conversations",
            post(conversations::start).get(conversations::list),
        )
        .route(
            "/conversations/:id/messages",
            get(conversations::list_messages).post(conversations::send),
        )
        .route("/conversations/:id/stream", get(conversations::stream))
        .route("/notifications", get(notifications::list))
        .route("/notifications/read-all", post(notifications::read_all))
        .route("/notifications/:id/open", post(notifications::open))
        .route(
            "/notifications/unread/stream",
            get(notifications::unread_stream),
        )
        .route("/profile/role", put(set_role))
        .route("/dashboard", get(dashboard))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(body))
        .unwrap()
}

#[derive(Debug, Deserialize)]
struct RolePayload {
    role: Role,
}

/// `PUT /profile/role`: self-service role switch, proxied to the identity
/// service as an idempotent set-role call.
async fn set_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RolePayload>,
) -> Result<StatusCode, ProblemResponse> {
    let session = authenticate(state.token_validator(), &headers, state.now())?;
    state
        .identity()
        .set_role(&session.user_id, payload.role)
        .await
        .map_err(|err| {
            ProblemResponse::new(
                StatusCode::BAD_GATEWAY,
                "identity_unavailable",
                err.to_string(),
            )
        })?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /dashboard`: the caller's role mapped to its dashboard
/// configuration.
async fn dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ProblemResponse> {
    let session = authenticate(state.token_validator(), &headers, state.now())?;
    Ok(Json(dashboard_for(session.role)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, Request};
    use chrono::TimeZone;
    use http_body_util::BodyExt;
    use httpmock::prelude::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use url::Url;

    use crate::session::SessionClaims;

    const SECRET: &[u8] = b"test-secret";

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    async fn test_state(identity_url: &str, blob_url: &str) -> AppState {
        let metrics = telemetry::init_metrics().expect("metrics recorder");
        let storage = Database::connect("sqlite::memory:?cache=shared")
            .await
            .expect("connect");
        storage.run_migrations().await.expect("migrations");

        let http = reqwest::Client::new();
        let identity = IdentityClient::new(
            Url::parse(identity_url).expect("identity url"),
            "svc-token",
            http.clone(),
        );
        let blob = BlobClient::new(Url::parse(blob_url).expect("blob url"), http);

        AppState::new(metrics, storage, identity, blob, SECRET, 15)
            .with_clock(Arc::new(fixed_now))
    }

    async fn offline_state() -> AppState {
        test_state("http://127.0.0.1:1/", "http://127.0.0.1:1/").await
    }

    fn token(user_id: &str, role: &str, name: &str) -> String {
        let claims = SessionClaims {
            sub: user_id.to_string(),
            role: role.to_string(),
            name: name.to_string(),
            email: format!("{user_id}@example.com"),
            exp: (fixed_now().timestamp() + 3600) as usize,
            nbf: None,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .expect("encode token")
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible router");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("read body")
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).expect("request")
    }

    fn job_payload(title: &str, deadline: &str) -> Value {
        json!({
            "title": title,
            "company": "TechCorp Industries",
            "category": "Engineering",
            "job_type": "Full-Time",
            "location": "New York, NY",
            "salary_min": 120_000,
            "salary_max": 180_000,
            "description": "We are hiring a backend engineer to build and operate the services \
                            behind our hiring marketplace, from postings to messaging.",
            "skills": ["Rust", "SQL"],
            "experience_level": "Senior",
            "work_mode": "remote",
            "industry": "Technology & IT",
            "deadline": deadline,
            "openings": 2,
        })
    }

    const BOUNDARY: &str = "x-test-boundary";

    fn multipart_body(
        fields: &[(&str, &str)],
        resume: Option<(&str, &str, &[u8])>,
    ) -> (String, Vec<u8>) {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((filename, content_type, bytes)) = resume {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"resume\"; \
                     filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        (format!("multipart/form-data; boundary={BOUNDARY}"), body)
    }

    fn apply_request(job_id: &str, token: &str, resume: Option<(&str, &str, &[u8])>) -> Request<Body> {
        let (content_type, body) = multipart_body(
            &[
                ("full_name", "Alice Chen"),
                ("email", "alice@example.com"),
                ("phone", "555-0100"),
                ("cover_letter", "I would love to join."),
            ],
            resume,
        );
        Request::builder()
            .method(Method::POST)
            .uri(format!("/jobs/{job_id}/applications"))
            .header(header::CONTENT_TYPE, content_type)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::from(body))
            .expect("request")
    }

    async fn create_job(router: &Router, employer_token: &str) -> String {
        let (status, body) = send(
            router,
            json_request(
                Method::POST,
                "/jobs",
                Some(employer_token),
                job_payload("Backend Engineer", "2025-07-01"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "job create failed: {body}");
        body["id"].as_str().expect("job id").to_string()
    }

    #[tokio::test]
    async fn posting_flow_publishes_and_lists() {
        let state = offline_state().await;
        let router = app_router(state);
        let employer = token("emp-1", "employer", "Acme HR");

        let job_id = create_job(&router, &employer).await;

        // Listed publicly, newest first, with the computed posted label.
        let (status, body) = send(&router, get_request("/jobs", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"].as_u64(), Some(1));
        assert_eq!(body["jobs"][0]["id"].as_str(), Some(job_id.as_str()));
        assert_eq!(body["jobs"][0]["posted"].as_str(), Some("Just now"));

        // Drafts never show up in the public listing.
        let (status, _) = send(
            &router,
            json_request(
                Method::POST,
                "/jobs/drafts",
                Some(&employer),
                job_payload("Unannounced Role", "2025-07-01"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, body) = send(&router, get_request("/jobs", None)).await;
        assert_eq!(body["count"].as_u64(), Some(1));

        // But the employer sees both.
        let (_, mine) = send(&router, get_request("/employer/jobs", Some(&employer))).await;
        assert_eq!(mine.as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn posting_requires_an_employer_session() {
        let state = offline_state().await;
        let router = app_router(state);

        let (status, _) = send(
            &router,
            json_request(
                Method::POST,
                "/jobs",
                None,
                job_payload("Backend Engineer", "2025-07-01"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let seeker = token("seek-1", "jobseeker", "Alice");
        let (status, _) = send(
            &router,
            json_request(
                Method::POST,
                "/jobs",
                Some(&seeker),
                job_payload("Backend Engineer", "2025-07-01"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn validation_boundaries_for_description_and_deadline() {
        let state = offline_state().await;
        let router = app_router(state);
        let employer = token("emp-1", "employer", "Acme HR");

        // 99 characters fail, 100 pass.
        let mut payload = job_payload("Backend Engineer", "2025-07-01");
        payload["description"] = json!("x".repeat(99));
        let (status, body) = send(
            &router,
            json_request(Method::POST, "/jobs", Some(&employer), payload.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["errors"]["description"].is_string());

        payload["description"] = json!("x".repeat(100));
        let (status, _) = send(
            &router,
            json_request(Method::POST, "/jobs", Some(&employer), payload),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        // A deadline of "today" (clock is pinned to 2025-06-01) fails;
        // tomorrow passes.
        let (status, body) = send(
            &router,
            json_request(
                Method::POST,
                "/jobs",
                Some(&employer),
                job_payload("Backend Engineer", "2025-06-01"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["errors"]["deadline"].is_string());

        let (status, _) = send(
            &router,
            json_request(
                Method::POST,
                "/jobs",
                Some(&employer),
                job_payload("Backend Engineer", "2025-06-02"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn application_flow_with_duplicate_and_notification() {
        let blob_server = MockServer::start();
        let upload = blob_server.mock(|when, then| {
            when.method(PUT).path_contains("resumes/seek-1/");
            then.status(201)
                .json_body(json!({ "url": "https://cdn.example/resume-1" }));
        });

        let state = test_state("http://127.0.0.1:1/", &format!("{}/", blob_server.base_url())).await;
        let router = app_router(state);
        let employer = token("emp-1", "employer", "Acme HR");
        let seeker = token("seek-1", "jobseeker", "Alice Chen");
        let job_id = create_job(&router, &employer).await;

        // Scenario B: a valid PDF application lands as pending and the
        // employer gains one unread new_application notification.
        let pdf = vec![0x25u8; 2 * 1024 * 1024];
        let (status, body) = send(
            &router,
            apply_request(&job_id, &seeker, Some(("cv.pdf", "application/pdf", &pdf))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "submit failed: {body}");
        assert_eq!(body["status"].as_str(), Some("pending"));
        assert_eq!(body["resume_url"].as_str(), Some("https://cdn.example/resume-1"));
        upload.assert();

        let (_, notifs) = send(&router, get_request("/notifications", Some(&employer))).await;
        let notifs = notifs.as_array().unwrap();
        assert_eq!(notifs.len(), 1);
        assert_eq!(notifs[0]["type"].as_str(), Some("new_application"));
        assert_eq!(notifs[0]["read"].as_bool(), Some(false));
        assert_eq!(
            notifs[0]["summary"].as_str(),
            Some("Alice Chen applied for Backend Engineer")
        );

        // Scenario C: the second submission conflicts and adds nothing.
        let (status, _) = send(
            &router,
            apply_request(&job_id, &seeker, Some(("cv.pdf", "application/pdf", &pdf))),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, aggregated) = send(
            &router,
            get_request("/employer/applications", Some(&employer)),
        )
        .await;
        assert_eq!(aggregated["counts"]["total"].as_u64(), Some(1));
        assert_eq!(aggregated["counts"]["pending"].as_u64(), Some(1));
        let (_, notifs) = send(&router, get_request("/notifications", Some(&employer))).await;
        assert_eq!(notifs.as_array().map(Vec::len), Some(1));

        // The seeker can read back their own application status.
        let (status, mine) = send(
            &router,
            get_request(&format!("/jobs/{job_id}/applications/me"), Some(&seeker)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mine["status"].as_str(), Some("pending"));
    }

    #[tokio::test]
    async fn invalid_attachments_are_rejected_before_any_upload() {
        let blob_server = MockServer::start();
        let upload = blob_server.mock(|when, then| {
            when.method(PUT).path_contains("resumes");
            then.status(201).json_body(json!({ "url": "unused" }));
        });

        let state = test_state("http://127.0.0.1:1/", &format!("{}/", blob_server.base_url())).await;
        let router = app_router(state);
        let employer = token("emp-1", "employer", "Acme HR");
        let seeker = token("seek-1", "jobseeker", "Alice Chen");
        let job_id = create_job(&router, &employer).await;

        // Wrong declared type.
        let (status, body) = send(
            &router,
            apply_request(&job_id, &seeker, Some(("cv.png", "image/png", b"png"))),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["type"].as_str(), Some("invalid_attachment"));

        // Missing attachment is a field error.
        let (status, body) = send(&router, apply_request(&job_id, &seeker, None)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["errors"]["resume"].is_string());

        assert_eq!(upload.hits(), 0);
    }

    #[tokio::test]
    async fn status_updates_are_unconstrained_and_stamp_review_time() {
        let blob_server = MockServer::start();
        blob_server.mock(|when, then| {
            when.method(PUT).path_contains("resumes");
            then.status(201).json_body(json!({ "url": "https://cdn.example/r" }));
        });

        let state = test_state("http://127.0.0.1:1/", &format!("{}/", blob_server.base_url())).await;
        let router = app_router(state);
        let employer = token("emp-1", "employer", "Acme HR");
        let seeker = token("seek-1", "jobseeker", "Alice Chen");
        let job_id = create_job(&router, &employer).await;

        let pdf = b"%PDF-1.4 tiny".to_vec();
        let (_, application) = send(
            &router,
            apply_request(&job_id, &seeker, Some(("cv.pdf", "application/pdf", &pdf))),
        )
        .await;
        let application_id = application["id"].as_str().unwrap().to_string();

        for target in ["shortlisted", "rejected", "pending"] {
            let (status, updated) = send(
                &router,
                json_request(
                    Method::POST,
                    &format!("/applications/{application_id}/status"),
                    Some(&employer),
                    json!({ "status": target }),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(updated["status"].as_str(), Some(target));
            assert!(updated["reviewed_at"].is_string());
        }

        // Another employer cannot touch it.
        let other = token("emp-2", "employer", "Rival Co");
        let (status, _) = send(
            &router,
            json_request(
                Method::POST,
                &format!("/applications/{application_id}/status"),
                Some(&other),
                json!({ "status": "reviewed" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn conversation_flow_notifies_and_marks_read_once() {
        let identity_server = MockServer::start();
        identity_server.mock(|when, then| {
            when.method(GET).path("/users/seek-1");
            then.status(200).json_body(json!({
                "id": "seek-1",
                "email": "alice@example.com",
                "display_name": "Alice Chen",
                "role": "jobseeker",
            }));
        });

        let state = test_state(
            &format!("{}/", identity_server.base_url()),
            "http://127.0.0.1:1/",
        )
        .await;
        let router = app_router(state);
        let employer = token("emp-1", "employer", "Acme HR");
        let seeker = token("seek-1", "jobseeker", "Alice Chen");

        // Scenario D: the employer opens a thread with the applicant.
        let (status, created) = send(
            &router,
            json_request(
                Method::POST,
                "/conversations",
                Some(&employer),
                json!({
                    "seeker_id": "seek-1",
                    "job_id": "j-1",
                    "job_title": "Backend Engineer",
                    "text": "When can you interview?",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "start failed: {created}");
        let conversation_id = created["conversation"]["id"].as_str().unwrap().to_string();

        // The seeker's list shows the thread, last message and the
        // employer's name as the counterpart.
        let (_, threads) = send(&router, get_request("/conversations", Some(&seeker))).await;
        let threads = threads.as_array().unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(
            threads[0]["last_message"].as_str(),
            Some("When can you interview?")
        );
        assert_eq!(threads[0]["other_name"].as_str(), Some("Acme HR"));

        // One unread new_message notification with a preview.
        let (_, notifs) = send(&router, get_request("/notifications", Some(&seeker))).await;
        let notifs = notifs.as_array().unwrap();
        assert_eq!(notifs.len(), 1);
        assert_eq!(notifs[0]["type"].as_str(), Some("new_message"));
        assert_eq!(notifs[0]["preview"].as_str(), Some("When can you interview?"));
        let notification_id = notifs[0]["id"].as_str().unwrap().to_string();

        // Opening it marks it read and resolves to the conversation.
        let (status, opened) = send(
            &router,
            json_request(
                Method::POST,
                &format!("/notifications/{notification_id}/open"),
                Some(&seeker),
                json!({}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(opened["notification"]["read"].as_bool(), Some(true));
        assert_eq!(
            opened["target"]["conversation_id"].as_str(),
            Some(conversation_id.as_str())
        );

        // Opening again is a quiet no-op.
        let (status, opened) = send(
            &router,
            json_request(
                Method::POST,
                &format!("/notifications/{notification_id}/open"),
                Some(&seeker),
                json!({}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(opened["notification"]["read"].as_bool(), Some(true));

        // The reply flows back: transcript ordering and the employer's
        // notification.
        let (status, _) = send(
            &router,
            json_request(
                Method::POST,
                &format!("/conversations/{conversation_id}/messages"),
                Some(&seeker),
                json!({ "text": "Tomorrow works." }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, transcript) = send(
            &router,
            get_request(
                &format!("/conversations/{conversation_id}/messages"),
                Some(&seeker),
            ),
        )
        .await;
        let texts: Vec<&str> = transcript
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["text"].as_str().unwrap())
            .collect();
        assert_eq!(texts, vec!["When can you interview?", "Tomorrow works."]);

        let (_, employer_notifs) =
            send(&router, get_request("/notifications", Some(&employer))).await;
        assert_eq!(employer_notifs.as_array().map(Vec::len), Some(1));

        // A stranger is not a participant.
        let stranger = token("emp-9", "employer", "Nobody");
        let (status, _) = send(
            &router,
            json_request(
                Method::POST,
                &format!("/conversations/{conversation_id}/messages"),
                Some(&stranger),
                json!({ "text": "let me in" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn fresh_thread_per_initiation_even_for_the_same_pair() {
        let identity_server = MockServer::start();
        identity_server.mock(|when, then| {
            when.method(GET).path("/users/seek-1");
            then.status(200).json_body(json!({
                "id": "seek-1",
                "email": "alice@example.com",
                "display_name": "Alice Chen",
                "role": "jobseeker",
            }));
        });

        let state = test_state(
            &format!("{}/", identity_server.base_url()),
            "http://127.0.0.1:1/",
        )
        .await;
        let router = app_router(state);
        let employer = token("emp-1", "employer", "Acme HR");

        for job in ["j-1", "j-2"] {
            let (status, _) = send(
                &router,
                json_request(
                    Method::POST,
                    "/conversations",
                    Some(&employer),
                    json!({ "seeker_id": "seek-1", "job_id": job, "text": "Hello!" }),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        // Deliberately two threads: initiations are never deduplicated
        // across job contexts.
        let (_, threads) = send(&router, get_request("/conversations", Some(&employer))).await;
        assert_eq!(threads.as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn cold_start_listing_serves_filtered_samples() {
        let state = offline_state().await;
        let router = app_router(state);

        let (_, body) = send(&router, get_request("/jobs", None)).await;
        assert_eq!(body["count"].as_u64(), Some(6));

        // Scenario E shape: free text and location applied conjunctively,
        // case-insensitively.
        let (_, body) = send(
            &router,
            get_request("/jobs?text=engineer&location=houston", None),
        )
        .await;
        assert_eq!(body["count"].as_u64(), Some(1));
        assert_eq!(body["jobs"][0]["title"].as_str(), Some("Civil Engineer"));
    }

    #[tokio::test]
    async fn read_all_is_idempotent() {
        let blob_server = MockServer::start();
        blob_server.mock(|when, then| {
            when.method(PUT).path_contains("resumes");
            then.status(201).json_body(json!({ "url": "https://cdn.example/r" }));
        });

        let state = test_state("http://127.0.0.1:1/", &format!("{}/", blob_server.base_url())).await;
        let router = app_router(state);
        let employer = token("emp-1", "employer", "Acme HR");
        let seeker = token("seek-1", "jobseeker", "Alice Chen");
        let job_id = create_job(&router, &employer).await;
        let pdf = b"%PDF".to_vec();
        send(
            &router,
            apply_request(&job_id, &seeker, Some(("cv.pdf", "application/pdf", &pdf))),
        )
        .await;

        let (_, first) = send(
            &router,
            json_request(Method::POST, "/notifications/read-all", Some(&employer), json!({})),
        )
        .await;
        assert_eq!(first["updated"].as_u64(), Some(1));

        let (_, second) = send(
            &router,
            json_request(Method::POST, "/notifications/read-all", Some(&employer), json!({})),
        )
        .await;
        assert_eq!(second["updated"].as_u64(), Some(0));
    }

    #[tokio::test]
    async fn dashboard_and_role_switch() {
        let identity_server = MockServer::start();
        let set_role_mock = identity_server.mock(|when, then| {
            when.method(httpmock::Method::PUT)
                .path("/users/seek-1/role")
                .json_body(json!({ "role": "employer" }));
            then.status(204);
        });

        let state = test_state(
            &format!("{}/", identity_server.base_url()),
            "http://127.0.0.1:1/",
        )
        .await;
        let router = app_router(state);
        let seeker = token("seek-1", "jobseeker", "Alice Chen");

        let (status, dashboard) = send(&router, get_request("/dashboard", Some(&seeker))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dashboard["role"].as_str(), Some("jobseeker"));

        let (status, _) = send(
            &router,
            json_request(
                Method::PUT,
                "/profile/role",
                Some(&seeker),
                json!({ "role": "employer" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        set_role_mock.assert();
    }
}
