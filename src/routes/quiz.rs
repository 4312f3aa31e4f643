use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use validator::Validate;

use crate::{
    dto::quiz_dto::{QuizAttemptResponse, RecordQuizAttemptPayload},
    error::{Error, Result},
    middleware::auth::{ensure_user_access, Claims},
    AppState,
};

#[utoipa::path(
    post,
    path = "/quiz-attempts",
    request_body = RecordQuizAttemptPayload,
    responses(
        (status = 201, description = "Attempt recorded and graded", body = Json<QuizAttemptResponse>),
        (status = 400, description = "Invalid payload or lesson is not a quiz"),
        (status = 404, description = "User, lesson or formation not found")
    )
)]
#[axum::debug_handler]
pub async fn record_quiz_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: std::result::Result<Json<RecordQuizAttemptPayload>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(payload) = payload.map_err(|e| Error::BadRequest(e.body_text()))?;
    payload.validate()?;
    ensure_user_access(state.store.as_ref(), &claims, payload.user_id).await?;
    let attempt = state.quiz_service.record_attempt(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(QuizAttemptResponse {
            success: true,
            attempt,
        }),
    ))
}
