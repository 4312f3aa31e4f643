use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
    Extension,
};
use uuid::Uuid;

use crate::{
    dto::summary_dto::{UserProgressCounts, UserProgressSummary},
    error::Result,
    middleware::auth::{ensure_user_access, Claims},
    AppState,
};

#[utoipa::path(
    get,
    path = "/user-progress/user/{user_id}",
    params(
        ("user_id" = Uuid, Path, description = "Learner ID")
    ),
    responses(
        (status = 200, description = "Dashboard summary with per-formation detail", body = Json<UserProgressSummary>),
        (status = 404, description = "User not found")
    )
)]
#[axum::debug_handler]
pub async fn get_user_progress(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    ensure_user_access(state.store.as_ref(), &claims, user_id).await?;
    let summary: UserProgressSummary = state.summary_service.user_summary(user_id).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    get,
    path = "/user-progress/user/{user_id}/summary",
    params(
        ("user_id" = Uuid, Path, description = "Learner ID")
    ),
    responses(
        (status = 200, description = "Counts only", body = Json<UserProgressCounts>),
        (status = 404, description = "User not found")
    )
)]
#[axum::debug_handler]
pub async fn get_user_progress_counts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    ensure_user_access(state.store.as_ref(), &claims, user_id).await?;
    let summary = state.summary_service.user_summary(user_id).await?;
    Ok(Json(UserProgressCounts::from(summary)))
}

#[utoipa::path(
    get,
    path = "/user-progress/user/{user_id}/formation/{formation_id}",
    params(
        ("user_id" = Uuid, Path, description = "Learner ID"),
        ("formation_id" = Uuid, Path, description = "Formation ID")
    ),
    responses(
        (status = 200, description = "Summary restricted to one formation", body = Json<UserProgressSummary>),
        (status = 404, description = "User or formation not found")
    )
)]
#[axum::debug_handler]
pub async fn get_formation_progress(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((user_id, formation_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    ensure_user_access(state.store.as_ref(), &claims, user_id).await?;
    let summary = state
        .summary_service
        .formation_summary(user_id, formation_id)
        .await?;
    Ok(Json(summary))
}
