use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::config::CompletionPolicy;
use crate::database::ProgressStore;
use crate::dto::progress_dto::SaveProgressRequest;
use crate::error::{Entity, Error, Result};
use crate::models::progress::{clamp_progress, ProgressRecord, ProgressWrite};

#[derive(Clone)]
pub struct ProgressService {
    store: Arc<dyn ProgressStore>,
    policy: CompletionPolicy,
}

impl ProgressService {
    pub fn new(store: Arc<dyn ProgressStore>, policy: CompletionPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> CompletionPolicy {
        self.policy
    }

    pub async fn save_progress(&self, request: SaveProgressRequest) -> Result<ProgressRecord> {
        let (user_id, lesson_id, formation_id) = require_ids(&request)?;
        request.validate()?;

        let (user, lesson, formation) = tokio::try_join!(
            self.store.find_user(user_id),
            self.store.find_lesson(lesson_id),
            self.store.find_formation(formation_id),
        )?;
        user.ok_or(Error::NotFound(Entity::User))?;
        let lesson = lesson.ok_or(Error::NotFound(Entity::Lesson))?;
        formation.ok_or(Error::NotFound(Entity::Formation))?;

        if lesson.formation_id != formation_id {
            return Err(Error::BadRequest(format!(
                "Lesson {} does not belong to formation {}",
                lesson_id, formation_id
            )));
        }

        let write = ProgressWrite {
            user_id,
            lesson_id,
            formation_id,
            current_page: request.current_page,
            total_pages: request.total_pages,
            time_spent: request.time_spent,
            total_time: request.total_time,
            progress: request.progress.map(clamp_progress),
            completed: request.completed,
            at: Utc::now(),
        };

        let record = self.store.upsert_progress(&write, self.policy).await?;
        tracing::debug!(
            %user_id,
            %lesson_id,
            %formation_id,
            progress = record.progress,
            completed = record.is_completed,
            "progress saved"
        );
        Ok(record)
    }

    /// `Ok(None)` when the learner has not touched the lesson yet.
    pub async fn get_progress(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
        formation_id: Uuid,
    ) -> Result<Option<ProgressRecord>> {
        let record = self.store.find_progress(user_id, lesson_id).await?;
        Ok(record.filter(|r| r.formation_id == formation_id))
    }

    pub async fn get_all_progress_for_user(
        &self,
        user_id: Uuid,
        formation_id: Option<Uuid>,
    ) -> Result<Vec<ProgressRecord>> {
        self.store.list_progress(user_id, formation_id).await
    }
}

fn require_ids(request: &SaveProgressRequest) -> Result<(Uuid, Uuid, Uuid)> {
    match (request.user_id, request.lesson_id, request.formation_id) {
        (Some(user_id), Some(lesson_id), Some(formation_id)) => {
            Ok((user_id, lesson_id, formation_id))
        }
        (user_id, lesson_id, formation_id) => {
            let mut missing = Vec::new();
            if user_id.is_none() {
                missing.push("userId");
            }
            if lesson_id.is_none() {
                missing.push("lessonId");
            }
            if formation_id.is_none() {
                missing.push("formationId");
            }
            Err(Error::MissingFields(missing))
        }
    }
}
