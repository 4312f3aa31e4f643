use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::config::FormationCompletionRule;
use crate::database::ProgressStore;
use crate::dto::summary_dto::{FormationProgress, FormationStatus, UserProgressSummary};
use crate::error::{Entity, Error, Result};
use crate::models::formation::{Formation, Lesson};
use crate::models::progress::ProgressRecord;
use crate::models::quiz_attempt::QuizAttempt;
use crate::utils::time::whole_minutes;

/// What the aggregation needs to know about a formation besides its records.
#[derive(Debug, Clone)]
pub struct FormationOutline {
    pub id: Uuid,
    pub title: Option<String>,
    pub completion_lesson_id: Option<Uuid>,
    /// Lesson ids ordered by position.
    pub lesson_ids: Vec<Uuid>,
}

impl FormationOutline {
    pub fn build(formations: Vec<Formation>, lessons: &[Lesson]) -> Vec<FormationOutline> {
        formations
            .into_iter()
            .map(|f| FormationOutline {
                id: f.id,
                title: Some(f.title),
                completion_lesson_id: f.completion_lesson_id,
                lesson_ids: lessons
                    .iter()
                    .filter(|l| l.formation_id == f.id)
                    .map(|l| l.id)
                    .collect(),
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct SummaryService {
    store: Arc<dyn ProgressStore>,
    rule: FormationCompletionRule,
}

impl SummaryService {
    pub fn new(store: Arc<dyn ProgressStore>, rule: FormationCompletionRule) -> Self {
        Self { store, rule }
    }

    /// Summary across every formation offered to the user or touched by them.
    pub async fn user_summary(&self, user_id: Uuid) -> Result<UserProgressSummary> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or(Error::NotFound(Entity::User))?;

        let (records, attempts, offered) = tokio::try_join!(
            self.store.list_progress(user_id, None),
            self.store.list_quiz_attempts(user_id, None),
            self.store.list_formations_for_bank(user.bank_id),
        )?;

        let mut formation_ids: Vec<Uuid> = offered.iter().map(|f| f.id).collect();
        let touched: Vec<Uuid> = records
            .iter()
            .map(|r| r.formation_id)
            .filter(|id| !formation_ids.contains(id))
            .collect();
        let mut formations = offered;
        if !touched.is_empty() {
            formations.extend(self.store.list_formations(&touched).await?);
        }
        formation_ids = formations.iter().map(|f| f.id).collect();
        let lessons = self.store.list_lessons(&formation_ids).await?;
        let outlines = FormationOutline::build(formations, &lessons);

        Ok(summarize(user_id, &records, &attempts, &outlines, self.rule))
    }

    /// Summary restricted to a single formation.
    pub async fn formation_summary(
        &self,
        user_id: Uuid,
        formation_id: Uuid,
    ) -> Result<UserProgressSummary> {
        self.store
            .find_user(user_id)
            .await?
            .ok_or(Error::NotFound(Entity::User))?;
        let formation = self
            .store
            .find_formation(formation_id)
            .await?
            .ok_or(Error::NotFound(Entity::Formation))?;

        let lesson_scope = [formation_id];
        let (records, attempts, lessons) = tokio::try_join!(
            self.store.list_progress(user_id, Some(formation_id)),
            self.store.list_quiz_attempts(user_id, Some(formation_id)),
            self.store.list_lessons(&lesson_scope),
        )?;
        let outlines = FormationOutline::build(vec![formation], &lessons);

        Ok(summarize(user_id, &records, &attempts, &outlines, self.rule))
    }
}

/// Folds raw records into the dashboard summary.
///
/// Every formation in `outlines` appears in the result, plus any formation
/// that only shows up through records. Formation progress is the mean of the
/// per-lesson effective progress (completed lessons count as 100), rounded
/// half away from zero. Time is reported in whole minutes, floored.
pub fn summarize(
    user_id: Uuid,
    records: &[ProgressRecord],
    attempts: &[QuizAttempt],
    outlines: &[FormationOutline],
    rule: FormationCompletionRule,
) -> UserProgressSummary {
    let mut by_formation: BTreeMap<Uuid, Vec<&ProgressRecord>> = BTreeMap::new();
    for outline in outlines {
        by_formation.entry(outline.id).or_default();
    }
    for record in records {
        by_formation.entry(record.formation_id).or_default().push(record);
    }

    let formations: Vec<FormationProgress> = by_formation
        .iter()
        .map(|(formation_id, lesson_records)| {
            let outline = outlines.iter().find(|o| o.id == *formation_id);
            formation_progress(*formation_id, lesson_records, outline, rule)
        })
        .collect();

    let count = |status: FormationStatus| formations.iter().filter(|f| f.status == status).count();
    let total_seconds = saturating_total(records.iter().map(|r| r.current_time_seconds));
    let quiz = QuizStats::from_attempts(attempts);

    let last_activity = records
        .iter()
        .max_by_key(|r| (r.last_accessed_at, r.lesson_id))
        .map(|r| r.last_accessed_at);

    UserProgressSummary {
        user_id,
        total_formations: formations.len(),
        completed_formations: count(FormationStatus::Completed),
        in_progress_formations: count(FormationStatus::InProgress),
        pending_formations: count(FormationStatus::Pending),
        total_time_spent: whole_minutes(total_seconds),
        total_quiz_attempts: quiz.total,
        passed_quiz_attempts: quiz.passed,
        failed_quiz_attempts: quiz.failed,
        average_quiz_score: quiz.average,
        last_activity,
        formations,
    }
}

fn formation_progress(
    formation_id: Uuid,
    records: &[&ProgressRecord],
    outline: Option<&FormationOutline>,
    rule: FormationCompletionRule,
) -> FormationProgress {
    let status = if is_formation_completed(records, outline, rule) {
        FormationStatus::Completed
    } else if records.iter().any(|r| r.effective_progress() > 0) {
        FormationStatus::InProgress
    } else {
        FormationStatus::Pending
    };

    let progress = if records.is_empty() {
        0
    } else {
        let sum: i64 = records.iter().map(|r| i64::from(r.effective_progress())).sum();
        (sum as f64 / records.len() as f64).round() as i32
    };

    let total_lessons = outline
        .map(|o| o.lesson_ids.len())
        .filter(|n| *n > 0)
        .unwrap_or(records.len());

    FormationProgress {
        formation_id,
        title: outline.and_then(|o| o.title.clone()),
        status,
        progress,
        completed_lessons: records.iter().filter(|r| r.is_completed).count(),
        total_lessons,
        time_spent_minutes: whole_minutes(saturating_total(
            records.iter().map(|r| r.current_time_seconds),
        )),
        last_accessed_at: records.iter().map(|r| r.last_accessed_at).max(),
    }
}

/// Time counters come from clients; the total pins at `i64::MAX`.
fn saturating_total(seconds: impl Iterator<Item = i64>) -> i64 {
    seconds.fold(0, i64::saturating_add)
}

fn is_formation_completed(
    records: &[&ProgressRecord],
    outline: Option<&FormationOutline>,
    rule: FormationCompletionRule,
) -> bool {
    let completed: HashSet<Uuid> = records
        .iter()
        .filter(|r| r.is_completed)
        .map(|r| r.lesson_id)
        .collect();

    match outline {
        Some(outline) if !outline.lesson_ids.is_empty() => match rule {
            FormationCompletionRule::AllLessons => {
                outline.lesson_ids.iter().all(|id| completed.contains(id))
            }
            FormationCompletionRule::FinalLesson => outline
                .completion_lesson_id
                .or_else(|| outline.lesson_ids.last().copied())
                .map_or(false, |id| completed.contains(&id)),
        },
        _ => !records.is_empty() && records.iter().all(|r| r.is_completed),
    }
}

struct QuizStats {
    total: usize,
    passed: usize,
    failed: usize,
    average: f64,
}

impl QuizStats {
    /// Average is rounded to two decimals, half away from zero; 0 without attempts.
    fn from_attempts(attempts: &[QuizAttempt]) -> Self {
        let passed = attempts
            .iter()
            .filter(|a| a.score >= a.passing_score)
            .count();
        let average = if attempts.is_empty() {
            Decimal::ZERO
        } else {
            let sum: Decimal = attempts.iter().map(|a| a.score).sum();
            (sum / Decimal::from(attempts.len()))
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        };
        Self {
            total: attempts.len(),
            passed,
            failed: attempts.len() - passed,
            average: average.to_f64().unwrap_or_default(),
        }
    }
}
