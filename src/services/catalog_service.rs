use std::sync::Arc;

use chrono::Utc;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::database::ProgressStore;
use crate::dto::catalog_dto::{CreateFormationPayload, CreateLessonPayload, CreateUserPayload};
use crate::error::{Entity, Error, Result};
use crate::models::formation::{Formation, Lesson};
use crate::models::user::{User, ROLE_ADMIN, ROLE_LEARNER, ROLE_MANAGER};

/// Users, formations and lessons referenced by progress records.
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn ProgressStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self { store }
    }

    pub async fn create_user(&self, payload: CreateUserPayload) -> Result<User> {
        let role = payload
            .role
            .map(|r| r.trim().to_ascii_lowercase())
            .unwrap_or_else(|| ROLE_LEARNER.to_string());
        if ![ROLE_ADMIN, ROLE_MANAGER, ROLE_LEARNER].contains(&role.as_str()) {
            return Err(Error::BadRequest(format!("Unknown role '{}'", role)));
        }

        let user = User {
            id: Uuid::new_v4(),
            email: payload.email.trim().to_ascii_lowercase(),
            name: payload.name.trim().to_string(),
            role,
            bank_id: payload.bank_id,
            is_active: true,
            created_at: Utc::now(),
        };
        let user = self.store.insert_user(&user).await?;
        tracing::info!(user_id = %user.id, role = %user.role, "user created");
        Ok(user)
    }

    pub async fn create_formation(&self, payload: CreateFormationPayload) -> Result<Formation> {
        let formation = Formation {
            id: Uuid::new_v4(),
            title: payload.title.trim().to_string(),
            description: payload.description,
            bank_id: payload.bank_id,
            completion_lesson_id: None,
            is_active: true,
            created_at: Utc::now(),
        };
        let formation = self.store.insert_formation(&formation).await?;
        tracing::info!(formation_id = %formation.id, bank_id = ?formation.bank_id, "formation created");
        Ok(formation)
    }

    pub async fn create_lesson(
        &self,
        formation_id: Uuid,
        payload: CreateLessonPayload,
    ) -> Result<Lesson> {
        self.store
            .find_formation(formation_id)
            .await?
            .ok_or(Error::NotFound(Entity::Formation))?;

        let position = match payload.position {
            Some(position) => position,
            None => self.store.list_lessons(&[formation_id]).await?.len() as i32,
        };
        let passing_score = payload
            .passing_score
            .map(|score| {
                Decimal::from_f64(score)
                    .map(|d| d.round_dp(2))
                    .ok_or_else(|| Error::BadRequest("Invalid passing score".into()))
            })
            .transpose()?;

        let lesson = Lesson {
            id: Uuid::new_v4(),
            formation_id,
            title: payload.title.trim().to_string(),
            content_type: payload.content_type.as_str().to_string(),
            position,
            passing_score,
            created_at: Utc::now(),
        };
        let lesson = self.store.insert_lesson(&lesson).await?;
        if payload.is_completion_lesson {
            self.store
                .set_completion_lesson(formation_id, lesson.id)
                .await?;
        }
        tracing::info!(%formation_id, lesson_id = %lesson.id, position, "lesson created");
        Ok(lesson)
    }

    pub async fn list_lessons(&self, formation_id: Uuid) -> Result<Vec<Lesson>> {
        self.store
            .find_formation(formation_id)
            .await?
            .ok_or(Error::NotFound(Entity::Formation))?;
        self.store.list_lessons(&[formation_id]).await
    }
}
