use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    response::{IntoResponse, Json},
    Extension,
};
use uuid::Uuid;

use crate::{
    dto::progress_dto::{
        GetProgressQuery, ProgressListResponse, ProgressResponse, SaveProgressRequest,
        UserProgressQuery,
    },
    error::{Error, Result},
    middleware::auth::{ensure_user_access, Claims},
    AppState,
};

#[utoipa::path(
    post,
    path = "/progress/save",
    request_body = SaveProgressRequest,
    responses(
        (status = 200, description = "Progress stored", body = Json<ProgressResponse>),
        (status = 400, description = "Missing or invalid fields"),
        (status = 404, description = "User, lesson or formation not found")
    )
)]
#[axum::debug_handler]
pub async fn save_progress(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: std::result::Result<Json<SaveProgressRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(request) = payload.map_err(|e| Error::BadRequest(e.body_text()))?;
    if let Some(user_id) = request.user_id {
        ensure_user_access(state.store.as_ref(), &claims, user_id).await?;
    }
    let record = state.progress_service.save_progress(request).await?;
    Ok(Json(ProgressResponse {
        success: true,
        progress: Some(record),
    }))
}

#[utoipa::path(
    get,
    path = "/progress/get",
    params(
        ("userId" = Uuid, Query, description = "Learner ID"),
        ("lessonId" = Uuid, Query, description = "Lesson ID"),
        ("formationId" = Uuid, Query, description = "Formation ID")
    ),
    responses(
        (status = 200, description = "Stored progress, null when the lesson was never opened", body = Json<ProgressResponse>),
        (status = 400, description = "Missing identifiers")
    )
)]
#[axum::debug_handler]
pub async fn get_progress(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    query: std::result::Result<Query<GetProgressQuery>, QueryRejection>,
) -> Result<impl IntoResponse> {
    let Query(query) = query.map_err(|e| Error::BadRequest(e.body_text()))?;
    let (user_id, lesson_id, formation_id) =
        match (query.user_id, query.lesson_id, query.formation_id) {
            (Some(u), Some(l), Some(f)) => (u, l, f),
            (u, l, f) => {
                let missing = [(u, "userId"), (l, "lessonId"), (f, "formationId")]
                    .into_iter()
                    .filter(|(id, _)| id.is_none())
                    .map(|(_, name)| name)
                    .collect();
                return Err(Error::MissingFields(missing));
            }
        };

    ensure_user_access(state.store.as_ref(), &claims, user_id).await?;
    let progress = state
        .progress_service
        .get_progress(user_id, lesson_id, formation_id)
        .await?;
    Ok(Json(ProgressResponse {
        success: true,
        progress,
    }))
}

#[utoipa::path(
    get,
    path = "/progress/user/{user_id}",
    params(
        ("user_id" = Uuid, Path, description = "Learner ID"),
        ("formationId" = Option<Uuid>, Query, description = "Restrict to one formation")
    ),
    responses(
        (status = 200, description = "Progress records ordered by formation and lesson", body = Json<ProgressListResponse>)
    )
)]
#[axum::debug_handler]
pub async fn list_user_progress(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
    query: std::result::Result<Query<UserProgressQuery>, QueryRejection>,
) -> Result<impl IntoResponse> {
    let Query(query) = query.map_err(|e| Error::BadRequest(e.body_text()))?;
    ensure_user_access(state.store.as_ref(), &claims, user_id).await?;
    let records = state
        .progress_service
        .get_all_progress_for_user(user_id, query.formation_id)
        .await?;
    Ok(Json(ProgressListResponse::from(records)))
}
