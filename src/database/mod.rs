pub mod memory;
pub mod pool;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::CompletionPolicy;
use crate::error::Result;
use crate::models::formation::{Formation, Lesson};
use crate::models::progress::{ProgressRecord, ProgressWrite};
use crate::models::quiz_attempt::QuizAttempt;
use crate::models::user::User;

pub use memory::MemoryProgressStore;
pub use postgres::PgProgressStore;

/// Persistence contract behind the progress, catalog and summary services.
///
/// `upsert_progress` is the only mutation with a concurrency requirement: two
/// writers for the same `(user, lesson)` must never produce two records.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_formation(&self, id: Uuid) -> Result<Option<Formation>>;

    async fn find_lesson(&self, id: Uuid) -> Result<Option<Lesson>>;

    /// Creates the record on first write, otherwise merges into it under the
    /// given completion policy. Returns the stored record.
    async fn upsert_progress(
        &self,
        write: &ProgressWrite,
        policy: CompletionPolicy,
    ) -> Result<ProgressRecord>;

    async fn find_progress(&self, user_id: Uuid, lesson_id: Uuid)
        -> Result<Option<ProgressRecord>>;

    /// Records of a user ordered by `(formation_id, lesson_id)`.
    async fn list_progress(
        &self,
        user_id: Uuid,
        formation_id: Option<Uuid>,
    ) -> Result<Vec<ProgressRecord>>;

    async fn insert_user(&self, user: &User) -> Result<User>;

    async fn insert_formation(&self, formation: &Formation) -> Result<Formation>;

    async fn insert_lesson(&self, lesson: &Lesson) -> Result<Lesson>;

    /// Marks the lesson whose completion completes the formation.
    async fn set_completion_lesson(&self, formation_id: Uuid, lesson_id: Uuid) -> Result<()>;

    /// Active formations offered to a bank: global ones plus the bank's own.
    async fn list_formations_for_bank(&self, bank_id: Option<Uuid>) -> Result<Vec<Formation>>;

    async fn list_formations(&self, ids: &[Uuid]) -> Result<Vec<Formation>>;

    /// Lessons of the given formations ordered by `(formation_id, position)`.
    async fn list_lessons(&self, formation_ids: &[Uuid]) -> Result<Vec<Lesson>>;

    async fn insert_quiz_attempt(&self, attempt: &QuizAttempt) -> Result<QuizAttempt>;

    async fn list_quiz_attempts(
        &self,
        user_id: Uuid,
        formation_id: Option<Uuid>,
    ) -> Result<Vec<QuizAttempt>>;
}
