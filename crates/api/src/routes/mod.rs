use axum::extract::{Extension, Path, State};
use axum::{
    Json, Router,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use domus_domain::{
    chat::{ChatMessage, ChatThread, MessageView, ThreadSummary},
    identity::ActorIdentity,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::middleware::AuthContext;
use crate::observability;
use crate::{error::ApiError, middleware as app_middleware, state::AppState, validation};

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/chat/create", post(create_chat))
        .route("/v1/chat/my-chats", get(my_chats))
        .route("/v1/chat/unread-count", get(unread_total))
        .route("/v1/chat/:chat_id", get(get_chat).delete(delete_chat))
        .route(
            "/v1/chat/:chat_id/messages",
            get(list_messages).post(send_message),
        )
        .route("/v1/chat/:chat_id/mark-read", post(mark_read))
        .route("/v1/chat/:chat_id/unread-count", get(unread_in_thread))
        .route("/v1/chat/:chat_id/send-contract", post(send_contract))
        .route_layer(middleware::from_fn(app_middleware::require_auth_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .merge(protected)
        .layer(app_middleware::timeout_layer())
        .layer(app_middleware::trace_layer())
        .layer(app_middleware::set_request_id_layer())
        .layer(app_middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(app_middleware::metrics_layer))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::auth_middleware,
        ))
        .layer(middleware::from_fn(
            app_middleware::correlation_id_middleware,
        ))
        .with_state(state)
}

fn actor(ctx: &AuthContext) -> Result<ActorIdentity, ApiError> {
    let user_id = ctx.user_id.clone().ok_or(ApiError::Unauthorized)?;
    let username = ctx.username.clone().unwrap_or_else(|| user_id.clone());
    Ok(ActorIdentity { user_id, username })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
    backend: &'static str,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = match state.db.health_check().await {
        Ok(()) => "ok",
        Err(err) => {
            tracing::warn!(error = %err, "db health check failed");
            "degraded"
        }
    };
    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.app_env.clone(),
        backend: state.db.name(),
    })
}

async fn metrics() -> Response {
    match observability::render_metrics() {
        Some(body) => body.into_response(),
        None => ApiError::Unavailable("metrics recorder not installed".into()).into_response(),
    }
}

#[derive(Debug, Deserialize, Validate)]
struct CreateChatRequest {
    #[validate(length(min = 1, max = 128))]
    property_id: String,
}

#[derive(Serialize)]
struct CreateChatResponse {
    chat_id: String,
    created: bool,
    thread: ChatThread,
}

async fn create_chat(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(payload): Json<CreateChatRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let actor = actor(&ctx)?;
    let (thread, created) = state
        .chat
        .create_or_get_thread(&actor, &payload.property_id)
        .await?;
    if created {
        observability::register_chat_thread_created();
    }
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let body = CreateChatResponse {
        chat_id: thread.thread_id.clone(),
        created,
        thread,
    };
    Ok((status, Json(body)).into_response())
}

async fn my_chats(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Vec<ThreadSummary>>, ApiError> {
    let actor = actor(&ctx)?;
    let summaries = state.chat.list_threads_for_user(&actor).await?;
    Ok(Json(summaries))
}

#[derive(Serialize)]
struct UnreadCountResponse {
    unread_count: u64,
}

async fn unread_total(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let actor = actor(&ctx)?;
    let unread_count = state.chat.unread_total(&actor.user_id).await?;
    Ok(Json(UnreadCountResponse { unread_count }))
}

async fn get_chat(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(chat_id): Path<String>,
) -> Result<Json<ChatThread>, ApiError> {
    let actor = actor(&ctx)?;
    let thread = state.chat.authorize(&chat_id, &actor.user_id).await?;
    Ok(Json(thread))
}

async fn delete_chat(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(chat_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let actor = actor(&ctx)?;
    state.chat.delete_thread(&actor, &chat_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_messages(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(chat_id): Path<String>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let actor = actor(&ctx)?;
    let views = state.chat.list_messages(&actor, &chat_id).await?;
    Ok(Json(views))
}

#[derive(Debug, Deserialize, Validate)]
struct SendMessageRequest {
    #[validate(length(min = 1, max = 4000))]
    message_text: String,
}

async fn send_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(chat_id): Path<String>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessage>), ApiError> {
    validation::validate(&payload)?;
    let actor = actor(&ctx)?;
    let message = state
        .chat
        .send_message(&actor, &chat_id, &payload.message_text)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn mark_read(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(chat_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let actor = actor(&ctx)?;
    state.chat.mark_thread_read(&actor, &chat_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unread_in_thread(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(chat_id): Path<String>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let actor = actor(&ctx)?;
    let unread_count = state.chat.unread_in_thread(&chat_id, &actor.user_id).await?;
    Ok(Json(UnreadCountResponse { unread_count }))
}

#[derive(Serialize)]
struct SendContractResponse {
    deal_id: String,
}

async fn send_contract(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(chat_id): Path<String>,
) -> Result<Json<SendContractResponse>, ApiError> {
    let actor = actor(&ctx)?;
    let deal_id = state.chat.send_contract(&actor, &chat_id).await?;
    observability::register_contract_sent();
    Ok(Json(SendContractResponse { deal_id }))
}
