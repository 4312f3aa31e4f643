use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Score a quiz lesson requires when none is configured.
pub const DEFAULT_PASSING_SCORE: i64 = 70;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Formation {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// `None` means the formation is offered to every bank.
    pub bank_id: Option<Uuid>,
    pub completion_lesson_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonKind {
    Video,
    Document,
    Slide,
    Quiz,
}

impl LessonKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonKind::Video => "video",
            LessonKind::Document => "document",
            LessonKind::Slide => "slide",
            LessonKind::Quiz => "quiz",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: Uuid,
    pub formation_id: Uuid,
    pub title: String,
    pub content_type: String,
    pub position: i32,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub passing_score: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl Lesson {
    pub fn is_quiz(&self) -> bool {
        self.content_type == LessonKind::Quiz.as_str()
    }

    pub fn effective_passing_score(&self) -> Decimal {
        self.passing_score
            .unwrap_or_else(|| Decimal::from(DEFAULT_PASSING_SCORE))
    }
}
