use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{sse::Sse, IntoResponse},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use ulid::Ulid;

use joblane_core::notice::Notice;
use joblane_core::types::{Conversation, Role};
use joblane_storage::{ConversationError, NewChatMessage, NewConversation};

use crate::hub::SseStream;
use crate::notifications::fan_out;
use crate::problem::ProblemResponse;
use crate::router::AppState;
use crate::session::{authenticate, require_role};

/// Body for opening a conversation with an applicant or seeker.
#[derive(Debug, Deserialize)]
pub struct StartConversation {
    pub seeker_id: String,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    pub text: String,
}

/// Body for appending a message.
#[derive(Debug, Deserialize)]
pub struct SendMessage {
    pub text: String,
}

/// Conversation list entry with the role-relative counterpart name.
#[derive(Debug, Serialize)]
struct ConversationView {
    #[serde(flatten)]
    conversation: Conversation,
    other_name: String,
}

/// `POST /conversations`: an employer opens a fresh thread with a seeker.
///
/// Every initiation creates a new conversation, even when the same two
/// parties already share one for another job; threads are cheap and the
/// job anchor keeps them meaningful. The row and its first message are one
/// transaction; the seeker's notification afterwards is best-effort.
pub async fn start(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<StartConversation>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let now = state.now();
    let session = authenticate(state.token_validator(), &headers, now)?;
    require_role(&session, Role::Employer)?;

    let text = payload.text.trim();
    if text.is_empty() {
        let mut errors = joblane_core::validate::FieldErrors::new();
        errors.insert("text", "Message text is required".to_string());
        return Err(ProblemResponse::validation(errors));
    }

    // Denormalized names are frozen at creation time; a later profile
    // rename does not rewrite existing threads.
    let seeker = state
        .identity()
        .fetch_user(&payload.seeker_id)
        .await
        .map_err(|err| {
            ProblemResponse::new(
                StatusCode::BAD_GATEWAY,
                "identity_unavailable",
                err.to_string(),
            )
        })?
        .ok_or_else(|| {
            ProblemResponse::new(
                StatusCode::NOT_FOUND,
                "seeker_not_found",
                "the identity service does not know this user",
            )
        })?;

    let record = NewConversation {
        id: Ulid::new().to_string(),
        employer_id: &session.user_id,
        seeker_id: &payload.seeker_id,
        employer_name: &session.display_name,
        seeker_name: &seeker.display_name,
        job_id: payload.job_id.as_deref(),
        job_title: payload.job_title.as_deref(),
        sender_id: &session.user_id,
        sender_name: &session.display_name,
        first_message: text,
        created_at: now,
    };
    let (conversation, message) = state
        .storage()
        .conversations()
        .create_with_first_message(&record)
        .await
        .map_err(internal)?;

    counter!("messages_sent_total").increment(1);
    state.hub().publish_message(message.clone()).await;
    fan_out(
        &state,
        &payload.seeker_id,
        Notice::new_message(
            &conversation.id,
            &session.display_name,
            conversation.job_title.as_deref(),
            text,
        ),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "conversation": conversation, "message": message })),
    ))
}

/// `GET /conversations`: threads the caller participates in, most
/// recently active first.
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ProblemResponse> {
    let session = authenticate(state.token_validator(), &headers, state.now())?;
    let conversations = state
        .storage()
        .conversations()
        .list_for_user(&session.user_id)
        .await
        .map_err(internal)?;

    let views: Vec<ConversationView> = conversations
        .into_iter()
        .map(|conversation| ConversationView {
            other_name: conversation.other_name(&session.user_id).to_string(),
            conversation,
        })
        .collect();
    Ok(Json(views))
}

/// `GET /conversations/{id}/messages`: the stored transcript in send
/// order; participants only.
pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ProblemResponse> {
    let session = authenticate(state.token_validator(), &headers, state.now())?;
    let conversation = fetch_conversation(&state, &conversation_id).await?;
    require_participant(&conversation, &session.user_id)?;

    let messages = state
        .storage()
        .conversations()
        .list_messages(&conversation_id)
        .await
        .map_err(internal)?;
    Ok(Json(messages))
}

/// `POST /conversations/{id}/messages`: appends a message, updates the
/// thread's last-message fields in the same transaction, then notifies the
/// counterpart best-effort.
pub async fn send(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<SendMessage>,
) -> Result<impl IntoResponse, ProblemResponse> {
    let now = state.now();
    let session = authenticate(state.token_validator(), &headers, now)?;

    let text = payload.text.trim();
    if text.is_empty() {
        let mut errors = joblane_core::validate::FieldErrors::new();
        errors.insert("text", "Message text is required".to_string());
        return Err(ProblemResponse::validation(errors));
    }

    let conversation = fetch_conversation(&state, &conversation_id).await?;
    let counterpart = conversation
        .counterpart_of(&session.user_id)
        .ok_or_else(invalid_participant)?
        .to_string();

    let message = state
        .storage()
        .conversations()
        .append_message(&NewChatMessage {
            conversation_id: &conversation_id,
            sender_id: &session.user_id,
            sender_name: &session.display_name,
            text,
            sent_at: now,
        })
        .await
        .map_err(|err| match err {
            ConversationError::NotFound => not_found(),
            other => internal(other),
        })?;

    counter!("messages_sent_total").increment(1);
    state.hub().publish_message(message.clone()).await;
    fan_out(
        &state,
        &counterpart,
        Notice::new_message(
            &conversation.id,
            &session.display_name,
            conversation.job_title.as_deref(),
            text,
        ),
    )
    .await;

    Ok((StatusCode::CREATED, Json(message)))
}

/// `GET /conversations/{id}/stream`: live transcript: every stored
/// message immediately, then each new message exactly once, until the
/// client disconnects. Cancelling is dropping the connection; nothing is
/// written.
pub async fn stream(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
) -> Result<Sse<SseStream>, ProblemResponse> {
    let session = authenticate(state.token_validator(), &headers, state.now())?;
    let conversation = fetch_conversation(&state, &conversation_id).await?;
    require_participant(&conversation, &session.user_id)?;

    // Attach to the live feed before reading the backlog so nothing lands
    // in the gap; the splice drops whatever shows up in both.
    let subscription = state.hub().subscribe_messages(&conversation_id).await;
    let backlog = state
        .storage()
        .conversations()
        .list_messages(&conversation_id)
        .await
        .map_err(internal)?;

    Ok(Sse::new(subscription.into_stream(backlog)).keep_alive(state.sse_keep_alive()))
}

async fn fetch_conversation(
    state: &AppState,
    conversation_id: &str,
) -> Result<Conversation, ProblemResponse> {
    state
        .storage()
        .conversations()
        .fetch(conversation_id)
        .await
        .map_err(internal)?
        .ok_or_else(not_found)
}

fn require_participant(
    conversation: &Conversation,
    user_id: &str,
) -> Result<(), ProblemResponse> {
    if conversation.counterpart_of(user_id).is_some() {
        return Ok(());
    }
    Err(invalid_participant())
}

fn invalid_participant() -> ProblemResponse {
    ProblemResponse::new(
        StatusCode::FORBIDDEN,
        "invalid_participant",
        "the caller is not a participant of this conversation",
    )
}

fn not_found() -> ProblemResponse {
    ProblemResponse::new(
        StatusCode::NOT_FOUND,
        "conversation_not_found",
        "no such conversation",
    )
}

fn internal<E: std::fmt::Display>(err: E) -> ProblemResponse {
    ProblemResponse::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "storage_error",
        err.to_string(),
    )
}
