use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttempt {
    pub id: Uuid,
    pub user_id: Uuid,
    pub formation_id: Uuid,
    pub lesson_id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub score: Decimal,
    /// Passing score of the quiz at the time of the attempt.
    #[serde(with = "rust_decimal::serde::float")]
    pub passing_score: Decimal,
    pub passed: bool,
    pub created_at: DateTime<Utc>,
}
