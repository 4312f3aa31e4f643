use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::config::CompletionPolicy;

pub const MIN_PROGRESS: i32 = 0;
pub const MAX_PROGRESS: i32 = 100;

/// Where the learner was when a write was captured, kept so a session can
/// resume on the exact page and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    pub timestamp: DateTime<Utc>,
}

/// Durable state of one learner on one lesson. `(user_id, lesson_id)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lesson_id: Uuid,
    pub formation_id: Uuid,
    pub progress: i32,
    pub current_page: Option<i32>,
    pub total_pages: Option<i32>,
    pub current_time_seconds: i64,
    pub total_time_seconds: i64,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub last_position_snapshot: Option<Json<PositionSnapshot>>,
}

/// A validated, normalized progress write. Absent fields leave the stored
/// value untouched.
#[derive(Debug, Clone)]
pub struct ProgressWrite {
    pub user_id: Uuid,
    pub lesson_id: Uuid,
    pub formation_id: Uuid,
    pub current_page: Option<i32>,
    pub total_pages: Option<i32>,
    pub time_spent: Option<i64>,
    pub total_time: Option<i64>,
    pub progress: Option<i32>,
    pub completed: Option<bool>,
    pub at: DateTime<Utc>,
}

pub fn clamp_progress(value: f64) -> i32 {
    if value.is_nan() {
        return MIN_PROGRESS;
    }
    value
        .round()
        .clamp(f64::from(MIN_PROGRESS), f64::from(MAX_PROGRESS)) as i32
}

impl ProgressWrite {
    pub fn snapshot(&self) -> PositionSnapshot {
        PositionSnapshot {
            page: self.current_page,
            total_pages: self.total_pages,
            time_spent: self.time_spent,
            progress: self.progress,
            completed: self.completed,
            timestamp: self.at,
        }
    }
}

impl ProgressRecord {
    /// First write for a `(user, lesson)` pair.
    pub fn from_write(write: &ProgressWrite) -> Self {
        let is_completed = write.completed.unwrap_or(false);
        Self {
            id: Uuid::new_v4(),
            user_id: write.user_id,
            lesson_id: write.lesson_id,
            formation_id: write.formation_id,
            progress: write.progress.unwrap_or(MIN_PROGRESS),
            current_page: write.current_page,
            total_pages: write.total_pages,
            current_time_seconds: write.time_spent.unwrap_or(0),
            total_time_seconds: write.total_time.unwrap_or(0),
            is_completed,
            completed_at: is_completed.then_some(write.at),
            started_at: write.at,
            last_accessed_at: write.at,
            last_position_snapshot: Some(Json(write.snapshot())),
        }
    }

    /// Merges a later write into this record. `started_at` and `id` never change.
    pub fn apply_write(&mut self, write: &ProgressWrite, policy: CompletionPolicy) {
        if let Some(progress) = write.progress {
            self.progress = progress;
        }
        if write.current_page.is_some() {
            self.current_page = write.current_page;
        }
        if write.total_pages.is_some() {
            self.total_pages = write.total_pages;
        }
        if let Some(time_spent) = write.time_spent {
            self.current_time_seconds = time_spent;
        }
        if let Some(total_time) = write.total_time {
            self.total_time_seconds = total_time;
        }

        match (write.completed, policy) {
            (Some(true), _) => {
                if !self.is_completed {
                    self.is_completed = true;
                    self.completed_at = Some(write.at);
                }
            }
            (Some(false), CompletionPolicy::Overwrite) => {
                self.is_completed = false;
                self.completed_at = None;
            }
            (Some(false), CompletionPolicy::Monotonic) | (None, _) => {}
        }

        self.last_accessed_at = write.at.max(self.started_at);
        self.last_position_snapshot = Some(Json(write.snapshot()));
    }

    /// Progress counted by aggregations: a completed lesson is always 100.
    pub fn effective_progress(&self) -> i32 {
        if self.is_completed {
            MAX_PROGRESS
        } else {
            self.progress
        }
    }
}
