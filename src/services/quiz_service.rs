use std::sync::Arc;

use chrono::Utc;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::database::ProgressStore;
use crate::dto::quiz_dto::RecordQuizAttemptPayload;
use crate::error::{Entity, Error, Result};
use crate::models::quiz_attempt::QuizAttempt;

#[derive(Clone)]
pub struct QuizService {
    store: Arc<dyn ProgressStore>,
}

impl QuizService {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self { store }
    }

    /// Stores a graded attempt. The quiz's passing score is captured with the
    /// attempt so later changes to the quiz do not rewrite history.
    pub async fn record_attempt(&self, payload: RecordQuizAttemptPayload) -> Result<QuizAttempt> {
        let (user, lesson, formation) = tokio::try_join!(
            self.store.find_user(payload.user_id),
            self.store.find_lesson(payload.lesson_id),
            self.store.find_formation(payload.formation_id),
        )?;
        user.ok_or(Error::NotFound(Entity::User))?;
        let lesson = lesson.ok_or(Error::NotFound(Entity::Lesson))?;
        formation.ok_or(Error::NotFound(Entity::Formation))?;

        if lesson.formation_id != payload.formation_id {
            return Err(Error::BadRequest(format!(
                "Lesson {} does not belong to formation {}",
                lesson.id, payload.formation_id
            )));
        }
        if !lesson.is_quiz() {
            return Err(Error::BadRequest(format!("Lesson {} is not a quiz", lesson.id)));
        }

        let score = Decimal::from_f64(payload.score)
            .map(|d| d.round_dp(2))
            .ok_or_else(|| Error::BadRequest("Invalid score".into()))?;
        let passing_score = lesson.effective_passing_score();

        let attempt = QuizAttempt {
            id: Uuid::new_v4(),
            user_id: payload.user_id,
            formation_id: payload.formation_id,
            lesson_id: payload.lesson_id,
            score,
            passing_score,
            passed: score >= passing_score,
            created_at: Utc::now(),
        };
        let attempt = self.store.insert_quiz_attempt(&attempt).await?;
        tracing::info!(
            user_id = %attempt.user_id,
            lesson_id = %attempt.lesson_id,
            score = %attempt.score,
            passed = attempt.passed,
            "quiz attempt recorded"
        );
        Ok(attempt)
    }
}
