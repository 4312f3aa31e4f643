use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormationStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormationProgress {
    pub formation_id: Uuid,
    pub title: Option<String>,
    pub status: FormationStatus,
    pub progress: i32,
    pub completed_lessons: usize,
    pub total_lessons: usize,
    pub time_spent_minutes: i64,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

/// Dashboard view of one learner, recomputed on every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgressSummary {
    pub user_id: Uuid,
    pub total_formations: usize,
    pub completed_formations: usize,
    pub in_progress_formations: usize,
    pub pending_formations: usize,
    pub total_time_spent: i64,
    pub total_quiz_attempts: usize,
    pub passed_quiz_attempts: usize,
    pub failed_quiz_attempts: usize,
    pub average_quiz_score: f64,
    pub last_activity: Option<DateTime<Utc>>,
    pub formations: Vec<FormationProgress>,
}

/// Counts-only projection of [`UserProgressSummary`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgressCounts {
    pub user_id: Uuid,
    pub total_formations: usize,
    pub completed_formations: usize,
    pub in_progress_formations: usize,
    pub pending_formations: usize,
    pub total_time_spent: i64,
    pub total_quiz_attempts: usize,
    pub passed_quiz_attempts: usize,
    pub failed_quiz_attempts: usize,
    pub average_quiz_score: f64,
    pub last_activity: Option<DateTime<Utc>>,
}

impl From<UserProgressSummary> for UserProgressCounts {
    fn from(s: UserProgressSummary) -> Self {
        Self {
            user_id: s.user_id,
            total_formations: s.total_formations,
            completed_formations: s.completed_formations,
            in_progress_formations: s.in_progress_formations,
            pending_formations: s.pending_formations,
            total_time_spent: s.total_time_spent,
            total_quiz_attempts: s.total_quiz_attempts,
            passed_quiz_attempts: s.passed_quiz_attempts,
            failed_quiz_attempts: s.failed_quiz_attempts,
            average_quiz_score: s.average_quiz_score,
            last_activity: s.last_activity,
        }
    }
}
