use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::progress::ProgressRecord;

/// Body of `POST /progress/save`. Identifiers are optional at the type level
/// so a missing one is reported as a 400 naming the field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SaveProgressRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formation_id: Option<Uuid>,
    #[validate(range(min = 1, message = "currentPage must be a positive integer"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_page: Option<i32>,
    #[validate(range(min = 1, message = "totalPages must be a positive integer"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<i32>,
    #[validate(range(
        min = 0,
        max = 2_147_483_647,
        message = "timeSpent must be between 0 and 2147483647"
    ))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<i64>,
    #[validate(range(
        min = 0,
        max = 2_147_483_647,
        message = "totalTime must be between 0 and 2147483647"
    ))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetProgressQuery {
    pub user_id: Option<Uuid>,
    pub lesson_id: Option<Uuid>,
    pub formation_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgressQuery {
    pub formation_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub success: bool,
    pub progress: Option<ProgressRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressListResponse {
    pub success: bool,
    pub count: usize,
    pub progressions: Vec<ProgressRecord>,
}

impl From<Vec<ProgressRecord>> for ProgressListResponse {
    fn from(progressions: Vec<ProgressRecord>) -> Self {
        Self {
            success: true,
            count: progressions.len(),
            progressions,
        }
    }
}
