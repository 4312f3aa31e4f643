use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::catalog_dto::{
        CreateFormationPayload, CreateLessonPayload, CreateUserPayload, FormationResponse,
        LessonListResponse, LessonResponse, UserResponse,
    },
    error::{Error, Result},
    AppState,
};

fn validated<T: Validate>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    let Json(inner) = payload.map_err(|e| Error::BadRequest(e.body_text()))?;
    inner.validate()?;
    Ok(inner)
}

#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserPayload,
    responses(
        (status = 201, description = "User created", body = Json<UserResponse>),
        (status = 400, description = "Invalid payload"),
        (status = 409, description = "Email already registered")
    )
)]
#[axum::debug_handler]
pub async fn create_user(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateUserPayload>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let user = state.catalog_service.create_user(validated(payload)?).await?;
    Ok((StatusCode::CREATED, Json(UserResponse { success: true, user })))
}

#[utoipa::path(
    post,
    path = "/formations",
    request_body = CreateFormationPayload,
    responses(
        (status = 201, description = "Formation created", body = Json<FormationResponse>),
        (status = 400, description = "Invalid payload")
    )
)]
#[axum::debug_handler]
pub async fn create_formation(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateFormationPayload>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let formation = state
        .catalog_service
        .create_formation(validated(payload)?)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(FormationResponse {
            success: true,
            formation,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/formations/{id}/lessons",
    params(
        ("id" = Uuid, Path, description = "Formation ID")
    ),
    request_body = CreateLessonPayload,
    responses(
        (status = 201, description = "Lesson created", body = Json<LessonResponse>),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "Formation not found")
    )
)]
#[axum::debug_handler]
pub async fn create_lesson(
    State(state): State<AppState>,
    Path(formation_id): Path<Uuid>,
    payload: std::result::Result<Json<CreateLessonPayload>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let lesson = state
        .catalog_service
        .create_lesson(formation_id, validated(payload)?)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(LessonResponse {
            success: true,
            lesson,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/formations/{id}/lessons",
    params(
        ("id" = Uuid, Path, description = "Formation ID")
    ),
    responses(
        (status = 200, description = "Lessons ordered by position", body = Json<LessonListResponse>),
        (status = 404, description = "Formation not found")
    )
)]
#[axum::debug_handler]
pub async fn list_lessons(
    State(state): State<AppState>,
    Path(formation_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let lessons = state.catalog_service.list_lessons(formation_id).await?;
    Ok(Json(LessonListResponse {
        success: true,
        count: lessons.len(),
        lessons,
    }))
}
