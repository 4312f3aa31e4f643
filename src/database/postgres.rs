use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::ProgressStore;
use crate::config::CompletionPolicy;
use crate::error::{Entity, Error, Result};
use crate::models::formation::{Formation, Lesson};
use crate::models::progress::{ProgressRecord, ProgressWrite};
use crate::models::quiz_attempt::QuizAttempt;
use crate::models::user::User;

const PROGRESS_COLUMNS: &str = "id, user_id, lesson_id, formation_id, progress, current_page, \
     total_pages, current_time_seconds, total_time_seconds, is_completed, completed_at, \
     started_at, last_accessed_at, last_position_snapshot";

const FORMATION_COLUMNS: &str =
    "id, title, description, bank_id, completion_lesson_id, is_active, created_at";

const LESSON_COLUMNS: &str =
    "id, formation_id, title, content_type, position, passing_score, created_at";

#[derive(Clone)]
pub struct PgProgressStore {
    pool: PgPool,
}

impl PgProgressStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressStore for PgProgressStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"SELECT id, email, name, role, bank_id, is_active, created_at FROM users WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_formation(&self, id: Uuid) -> Result<Option<Formation>> {
        let formation = sqlx::query_as::<_, Formation>(&format!(
            "SELECT {FORMATION_COLUMNS} FROM formations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(formation)
    }

    async fn find_lesson(&self, id: Uuid) -> Result<Option<Lesson>> {
        let lesson = sqlx::query_as::<_, Lesson>(&format!(
            "SELECT {LESSON_COLUMNS} FROM lessons WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(lesson)
    }

    async fn upsert_progress(
        &self,
        write: &ProgressWrite,
        policy: CompletionPolicy,
    ) -> Result<ProgressRecord> {
        let mut tx = self.pool.begin().await?;

        // The unique (user_id, lesson_id) constraint arbitrates racing creators;
        // the loser falls through to the locked update below.
        let fresh = ProgressRecord::from_write(write);
        let inserted = sqlx::query_as::<_, ProgressRecord>(&format!(
            r#"
            INSERT INTO lesson_progress ({PROGRESS_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (user_id, lesson_id) DO NOTHING
            RETURNING {PROGRESS_COLUMNS}
            "#
        ))
        .bind(fresh.id)
        .bind(fresh.user_id)
        .bind(fresh.lesson_id)
        .bind(fresh.formation_id)
        .bind(fresh.progress)
        .bind(fresh.current_page)
        .bind(fresh.total_pages)
        .bind(fresh.current_time_seconds)
        .bind(fresh.total_time_seconds)
        .bind(fresh.is_completed)
        .bind(fresh.completed_at)
        .bind(fresh.started_at)
        .bind(fresh.last_accessed_at)
        .bind(&fresh.last_position_snapshot)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(record) = inserted {
            tx.commit().await?;
            return Ok(record);
        }

        let mut record = sqlx::query_as::<_, ProgressRecord>(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM lesson_progress WHERE user_id = $1 AND lesson_id = $2 FOR UPDATE"
        ))
        .bind(write.user_id)
        .bind(write.lesson_id)
        .fetch_one(&mut *tx)
        .await?;

        record.apply_write(write, policy);

        let updated = sqlx::query_as::<_, ProgressRecord>(&format!(
            r#"
            UPDATE lesson_progress
            SET
                progress = $2,
                current_page = $3,
                total_pages = $4,
                current_time_seconds = $5,
                total_time_seconds = $6,
                is_completed = $7,
                completed_at = $8,
                last_accessed_at = $9,
                last_position_snapshot = $10,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PROGRESS_COLUMNS}
            "#
        ))
        .bind(record.id)
        .bind(record.progress)
        .bind(record.current_page)
        .bind(record.total_pages)
        .bind(record.current_time_seconds)
        .bind(record.total_time_seconds)
        .bind(record.is_completed)
        .bind(record.completed_at)
        .bind(record.last_accessed_at)
        .bind(&record.last_position_snapshot)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn find_progress(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<Option<ProgressRecord>> {
        let record = sqlx::query_as::<_, ProgressRecord>(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM lesson_progress WHERE user_id = $1 AND lesson_id = $2"
        ))
        .bind(user_id)
        .bind(lesson_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn list_progress(
        &self,
        user_id: Uuid,
        formation_id: Option<Uuid>,
    ) -> Result<Vec<ProgressRecord>> {
        let records = sqlx::query_as::<_, ProgressRecord>(&format!(
            r#"
            SELECT {PROGRESS_COLUMNS}
            FROM lesson_progress
            WHERE user_id = $1 AND ($2::uuid IS NULL OR formation_id = $2)
            ORDER BY formation_id, lesson_id
            "#
        ))
        .bind(user_id)
        .bind(formation_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn insert_user(&self, user: &User) -> Result<User> {
        let row = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, name, role, bank_id, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, email, name, role, bank_id, is_active, created_at
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.role)
        .bind(user.bank_id)
        .bind(user.is_active)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_formation(&self, formation: &Formation) -> Result<Formation> {
        let row = sqlx::query_as::<_, Formation>(&format!(
            r#"
            INSERT INTO formations ({FORMATION_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {FORMATION_COLUMNS}
            "#
        ))
        .bind(formation.id)
        .bind(&formation.title)
        .bind(&formation.description)
        .bind(formation.bank_id)
        .bind(formation.completion_lesson_id)
        .bind(formation.is_active)
        .bind(formation.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_lesson(&self, lesson: &Lesson) -> Result<Lesson> {
        let row = sqlx::query_as::<_, Lesson>(&format!(
            r#"
            INSERT INTO lessons ({LESSON_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {LESSON_COLUMNS}
            "#
        ))
        .bind(lesson.id)
        .bind(lesson.formation_id)
        .bind(&lesson.title)
        .bind(&lesson.content_type)
        .bind(lesson.position)
        .bind(lesson.passing_score)
        .bind(lesson.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn set_completion_lesson(&self, formation_id: Uuid, lesson_id: Uuid) -> Result<()> {
        let res = sqlx::query("UPDATE formations SET completion_lesson_id = $2 WHERE id = $1")
            .bind(formation_id)
            .bind(lesson_id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(Error::NotFound(Entity::Formation));
        }
        Ok(())
    }

    async fn list_formations_for_bank(&self, bank_id: Option<Uuid>) -> Result<Vec<Formation>> {
        let rows = sqlx::query_as::<_, Formation>(&format!(
            r#"
            SELECT {FORMATION_COLUMNS}
            FROM formations
            WHERE is_active = TRUE AND (bank_id IS NULL OR bank_id = $1)
            ORDER BY id
            "#
        ))
        .bind(bank_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_formations(&self, ids: &[Uuid]) -> Result<Vec<Formation>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, Formation>(&format!(
            "SELECT {FORMATION_COLUMNS} FROM formations WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_lessons(&self, formation_ids: &[Uuid]) -> Result<Vec<Lesson>> {
        if formation_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, Lesson>(&format!(
            "SELECT {LESSON_COLUMNS} FROM lessons WHERE formation_id = ANY($1) ORDER BY formation_id, position, id"
        ))
        .bind(formation_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_quiz_attempt(&self, attempt: &QuizAttempt) -> Result<QuizAttempt> {
        let row = sqlx::query_as::<_, QuizAttempt>(
            r#"
            INSERT INTO quiz_attempts (id, user_id, formation_id, lesson_id, score, passing_score, passed, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, user_id, formation_id, lesson_id, score, passing_score, passed, created_at
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.user_id)
        .bind(attempt.formation_id)
        .bind(attempt.lesson_id)
        .bind(attempt.score)
        .bind(attempt.passing_score)
        .bind(attempt.passed)
        .bind(attempt.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_quiz_attempts(
        &self,
        user_id: Uuid,
        formation_id: Option<Uuid>,
    ) -> Result<Vec<QuizAttempt>> {
        let rows = sqlx::query_as::<_, QuizAttempt>(
            r#"
            SELECT id, user_id, formation_id, lesson_id, score, passing_score, passed, created_at
            FROM quiz_attempts
            WHERE user_id = $1 AND ($2::uuid IS NULL OR formation_id = $2)
            ORDER BY created_at, id
            "#,
        )
        .bind(user_id)
        .bind(formation_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
