pub mod catalog;
pub mod health;
pub mod progress;
pub mod quiz;
pub mod user_progress;

use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{
    auth::{require_admin, require_bearer_auth},
    rate_limit::{new_rps_state, rps_middleware},
};
use crate::AppState;

const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let config = crate::config::get_config();

    let learner_api = Router::new()
        .route("/progress/save", post(progress::save_progress))
        .route("/progress/get", get(progress::get_progress))
        .route("/progress/user/:user_id", get(progress::list_user_progress))
        .route(
            "/user-progress/user/:user_id",
            get(user_progress::get_user_progress),
        )
        .route(
            "/user-progress/user/:user_id/summary",
            get(user_progress::get_user_progress_counts),
        )
        .route(
            "/user-progress/user/:user_id/formation/:formation_id",
            get(user_progress::get_formation_progress),
        )
        .route("/quiz-attempts", post(quiz::record_quiz_attempt))
        .route_layer(from_fn(require_bearer_auth));

    let admin_api = Router::new()
        .route("/users", post(catalog::create_user))
        .route("/formations", post(catalog::create_formation))
        .route(
            "/formations/:id/lessons",
            get(catalog::list_lessons).post(catalog::create_lesson),
        )
        .route_layer(from_fn(require_admin));

    Router::new()
        .route("/health", get(health::health))
        .merge(learner_api)
        .merge(admin_api)
        .layer(from_fn_with_state(
            new_rps_state(config.api_rps, &config.jwt_secret),
            rps_middleware,
        ))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
