use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{sse::Sse, IntoResponse},
    Json,
};
use metrics::counter;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use joblane_core::notice::{relative_time, summary};
use joblane_core::types::{Application, NoticeKind, Notification};
use joblane_storage::NewNotification;

use crate::hub::SseStream;
use crate::problem::ProblemResponse;
use crate::router::AppState;
use crate::session::authenticate;

/// Persists a notification and refreshes the recipient's live unread
/// count.
///
/// Fan-out is strictly best-effort: the primary write that triggered it has
/// already committed, so every failure here is swallowed after logging.
/// Callers never see an error from this function.
pub(crate) async fn fan_out(state: &AppState, recipient_id: &str, kind: NoticeKind) {
    let type_label = kind.type_str();
    let record = NewNotification {
        recipient_id,
        kind,
        created_at: state.now(),
    };
    match state.storage().notifications().insert(&record).await {
        Ok(_) => {
            counter!("notifications_emitted_total", "type" => type_label).increment(1);
            refresh_unread(state, recipient_id).await;
        }
        Err(err) => {
            counter!("notify_failures_total", "type" => type_label).increment(1);
            warn!(
                stage = "notify",
                recipient_id,
                error = %err,
                "notification fan-out failed; primary write kept"
            );
        }
    }
}

/// Recomputes the unread count and pushes it to live subscribers.
pub(crate) async fn refresh_unread(state: &AppState, recipient_id: &str) {
    match state
        .storage()
        .notifications()
        .unread_count(recipient_id)
        .await
    {
        Ok(count) => state.hub().publish_unread(recipient_id, count).await,
        Err(err) => {
            warn!(stage = "notify", recipient_id, error = %err, "failed to refresh unread count");
        }
    }
}

/// Notification list entry enriched for the view layer.
#[derive(Debug, Serialize)]
struct NotificationView {
    #[serde(flatten)]
    notification: Notification,
    summary: String,
    time_ago: String,
}

fn view(state: &AppState, notification: Notification) -> NotificationView {
    let now = state.now();
    NotificationView {
        summary: summary(&notification),
        time_ago: relative_time(notification.created_at, now),
        notification,
    }
}

/// `GET /notifications`: everything addressed to the caller, newest first.
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ProblemResponse> {
    let session = authenticate(state.token_validator(), &headers, state.now())?;
    let notifications = state
        .storage()
        .notifications()
        .list_for_user(&session.user_id)
        .await
        .map_err(internal)?;

    let views: Vec<NotificationView> = notifications
        .into_iter()
        .map(|notification| view(&state, notification))
        .collect();
    Ok(Json(views))
}

/// `POST /notifications/{id}/open`: marks the notification read (exactly
/// once, idempotently) and resolves its referent. A missing referent still
/// leaves the notification marked; the target is simply `null`.
pub async fn open(
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ProblemResponse> {
    let session = authenticate(state.token_validator(), &headers, state.now())?;

    let notification = state
        .storage()
        .notifications()
        .mark_read(&notification_id, &session.user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            ProblemResponse::new(
                StatusCode::NOT_FOUND,
                "notification_not_found",
                "no such notification for this recipient",
            )
        })?;

    refresh_unread(&state, &session.user_id).await;

    let target = resolve_target(&state, &notification).await;
    Ok(Json(json!({
        "notification": view(&state, notification),
        "target": target,
    })))
}

/// `POST /notifications/read-all`: marks every unread notification read,
/// leaving already-read rows untouched. Calling it twice changes nothing
/// the second time.
pub async fn read_all(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ProblemResponse> {
    let session = authenticate(state.token_validator(), &headers, state.now())?;
    let updated = state
        .storage()
        .notifications()
        .mark_all_read(&session.user_id)
        .await
        .map_err(internal)?;

    if updated > 0 {
        refresh_unread(&state, &session.user_id).await;
    }
    Ok(Json(json!({ "updated": updated })))
}

/// `GET /notifications/unread/stream`: live unread count: the current
/// value immediately, then a new value on every change until the client
/// disconnects.
pub async fn unread_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Sse<SseStream>, ProblemResponse> {
    let session = authenticate(state.token_validator(), &headers, state.now())?;
    let initial = state
        .storage()
        .notifications()
        .unread_count(&session.user_id)
        .await
        .map_err(internal)?;

    let subscription = state.hub().subscribe_unread(&session.user_id, initial).await;
    Ok(Sse::new(subscription.into_stream()).keep_alive(state.sse_keep_alive()))
}

/// Pure derivation from a notification to the view it points at. Returns
/// `None` when the referent no longer exists.
async fn resolve_target(state: &AppState, notification: &Notification) -> Option<Value> {
    match &notification.kind {
        NoticeKind::NewApplication {
            job_id,
            applicant_id,
            ..
        } => {
            let key = Application::key(applicant_id, job_id);
            state
                .storage()
                .applications()
                .fetch(&key)
                .await
                .ok()
                .flatten()
                .map(|_| {
                    json!({
                        "view": "applications",
                        "job_id": job_id,
                        "applicant_id": applicant_id,
                    })
                })
        }
        NoticeKind::NewMessage {
            conversation_id, ..
        } => state
            .storage()
            .conversations()
            .fetch(conversation_id)
            .await
            .ok()
            .flatten()
            .map(|conversation| {
                json!({
                    "view": "conversation",
                    "conversation_id": conversation.id,
                })
            }),
    }
}

fn internal<E: std::fmt::Display>(err: E) -> ProblemResponse {
    ProblemResponse::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "storage_error",
        err.to_string(),
    )
}
