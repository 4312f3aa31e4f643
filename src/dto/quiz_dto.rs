use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::quiz_attempt::QuizAttempt;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecordQuizAttemptPayload {
    pub user_id: Uuid,
    pub formation_id: Uuid,
    pub lesson_id: Uuid,
    #[validate(range(min = 0.0, max = 100.0, message = "score must be between 0 and 100"))]
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizAttemptResponse {
    pub success: bool,
    pub attempt: QuizAttempt,
}
