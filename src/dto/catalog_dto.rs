use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::formation::{Formation, Lesson, LessonKind};
use crate::models::user::User;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserPayload {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub name: String,
    pub role: Option<String>,
    pub bank_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateFormationPayload {
    #[validate(length(min = 1))]
    pub title: String,
    pub description: Option<String>,
    pub bank_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateLessonPayload {
    #[validate(length(min = 1))]
    pub title: String,
    pub content_type: LessonKind,
    pub position: Option<i32>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub passing_score: Option<f64>,
    /// Completing this lesson completes the formation under the final-lesson rule.
    #[serde(default)]
    pub is_completion_lesson: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub success: bool,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormationResponse {
    pub success: bool,
    pub formation: Formation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonResponse {
    pub success: bool,
    pub lesson: Lesson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonListResponse {
    pub success: bool,
    pub count: usize,
    pub lessons: Vec<Lesson>,
}
