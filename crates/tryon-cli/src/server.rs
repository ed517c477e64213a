use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{error, instrument, warn};
use tryon_contracts::api::{
    ApiEnvelope, EditRequest, FaceSwapRequest, OperationResult, TryOnRequest, VideoRequest,
};
use tryon_engine::{ErrorKind, Studio, StudioError, StudioResult, UserMessage};

#[derive(Clone)]
pub struct AppState {
    pub studio: Arc<Studio>,
}

pub fn router(studio: Arc<Studio>) -> Router {
    let max_body_bytes = studio.config().max_body_bytes;
    Router::new()
        .route("/api/health", get(health))
        .route("/api/try-on", post(try_on))
        .route("/api/face-swap", post(face_swap))
        .route("/api/edit", post(edit))
        .route("/api/video", post(video))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(AppState { studio })
}

#[instrument(skip_all)]
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.studio.config();
    Json(ApiEnvelope::ok(json!({
        "status": "ok",
        "replicateConfigured": config.replicate_api_token.is_some(),
        "geminiConfigured": config.gemini_api_key.is_some(),
        "videoConfigured": config.video_model_version.is_some(),
        "imageModel": config.image_model,
    })))
}

async fn try_on(
    State(state): State<AppState>,
    payload: Result<Json<TryOnRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(request)) => respond(&state, state.studio.try_on(&request).await),
        Err(rejection) => reject(&state, rejection),
    }
}

async fn face_swap(
    State(state): State<AppState>,
    payload: Result<Json<FaceSwapRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(request)) => respond(&state, state.studio.face_swap(&request).await),
        Err(rejection) => reject(&state, rejection),
    }
}

async fn edit(
    State(state): State<AppState>,
    payload: Result<Json<EditRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(request)) => respond(&state, state.studio.edit(&request).await),
        Err(rejection) => reject(&state, rejection),
    }
}

async fn video(
    State(state): State<AppState>,
    payload: Result<Json<VideoRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(request)) => respond(&state, state.studio.generate_video(&request).await),
        Err(rejection) => reject(&state, rejection),
    }
}

fn respond(state: &AppState, result: StudioResult<OperationResult>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiEnvelope::ok(data))).into_response(),
        Err(err) => failure(state, &err),
    }
}

pub fn status_for(err: &StudioError) -> StatusCode {
    match err.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::UpstreamRejection | ErrorKind::NoOutput => {
            if err.user_message() == UserMessage::QuotaExceeded {
                StatusCode::TOO_MANY_REQUESTS
            } else {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}

/// Diagnostics go to the log always and to the caller only outside
/// production.
fn failure(state: &AppState, err: &StudioError) -> Response {
    let status = status_for(err);
    let user_message = err.user_message();
    if status.is_server_error() {
        error!(status = status.as_u16(), error = %err, "request failed");
    } else {
        warn!(status = status.as_u16(), error = %err, "request rejected");
    }
    let message = match err {
        StudioError::Validation(detail) => detail.clone(),
        _ => user_message.text().to_string(),
    };
    let details = (!state.studio.config().production).then(|| err.to_string());
    let envelope: ApiEnvelope<OperationResult> =
        ApiEnvelope::failure(message, user_message.code(), details);
    (status, Json(envelope)).into_response()
}

fn reject(state: &AppState, rejection: JsonRejection) -> Response {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!("request body over limit");
        let envelope: ApiEnvelope<OperationResult> = ApiEnvelope::failure(
            "The uploaded images are too large.",
            "payload_too_large",
            None,
        );
        return (StatusCode::PAYLOAD_TOO_LARGE, Json(envelope)).into_response();
    }
    failure(
        state,
        &StudioError::validation(format!("malformed request body: {}", rejection.body_text())),
    )
}
