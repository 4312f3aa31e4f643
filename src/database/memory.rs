use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use super::ProgressStore;
use crate::config::CompletionPolicy;
use crate::error::{Entity, Error, Result};
use crate::models::formation::{Formation, Lesson};
use crate::models::progress::{ProgressRecord, ProgressWrite};
use crate::models::quiz_attempt::QuizAttempt;
use crate::models::user::User;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    formations: HashMap<Uuid, Formation>,
    lessons: HashMap<Uuid, Lesson>,
    progress: HashMap<(Uuid, Uuid), ProgressRecord>,
    quiz_attempts: Vec<QuizAttempt>,
}

/// In-process store for local runs and tests. All tables sit behind one lock,
/// so every upsert is a single critical section.
#[derive(Clone, Default)]
pub struct MemoryProgressStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|e| Error::Internal(format!("memory store lock poisoned: {e}")))
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.tables()?.users.get(&id).cloned())
    }

    async fn find_formation(&self, id: Uuid) -> Result<Option<Formation>> {
        Ok(self.tables()?.formations.get(&id).cloned())
    }

    async fn find_lesson(&self, id: Uuid) -> Result<Option<Lesson>> {
        Ok(self.tables()?.lessons.get(&id).cloned())
    }

    async fn upsert_progress(
        &self,
        write: &ProgressWrite,
        policy: CompletionPolicy,
    ) -> Result<ProgressRecord> {
        let mut tables = self.tables()?;
        let record = tables
            .progress
            .entry((write.user_id, write.lesson_id))
            .and_modify(|existing| existing.apply_write(write, policy))
            .or_insert_with(|| ProgressRecord::from_write(write));
        Ok(record.clone())
    }

    async fn find_progress(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<Option<ProgressRecord>> {
        Ok(self.tables()?.progress.get(&(user_id, lesson_id)).cloned())
    }

    async fn list_progress(
        &self,
        user_id: Uuid,
        formation_id: Option<Uuid>,
    ) -> Result<Vec<ProgressRecord>> {
        let tables = self.tables()?;
        let mut records: Vec<ProgressRecord> = tables
            .progress
            .values()
            .filter(|r| r.user_id == user_id)
            .filter(|r| formation_id.map_or(true, |f| r.formation_id == f))
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.formation_id, r.lesson_id));
        Ok(records)
    }

    async fn insert_user(&self, user: &User) -> Result<User> {
        let mut tables = self.tables()?;
        if tables.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(Error::Conflict("Resource already exists".to_string()));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn insert_formation(&self, formation: &Formation) -> Result<Formation> {
        self.tables()?
            .formations
            .insert(formation.id, formation.clone());
        Ok(formation.clone())
    }

    async fn insert_lesson(&self, lesson: &Lesson) -> Result<Lesson> {
        self.tables()?.lessons.insert(lesson.id, lesson.clone());
        Ok(lesson.clone())
    }

    async fn set_completion_lesson(&self, formation_id: Uuid, lesson_id: Uuid) -> Result<()> {
        let mut tables = self.tables()?;
        let formation = tables
            .formations
            .get_mut(&formation_id)
            .ok_or(Error::NotFound(Entity::Formation))?;
        formation.completion_lesson_id = Some(lesson_id);
        Ok(())
    }

    async fn list_formations_for_bank(&self, bank_id: Option<Uuid>) -> Result<Vec<Formation>> {
        let tables = self.tables()?;
        let mut formations: Vec<Formation> = tables
            .formations
            .values()
            .filter(|f| f.is_active)
            .filter(|f| f.bank_id.is_none() || f.bank_id == bank_id)
            .cloned()
            .collect();
        formations.sort_by_key(|f| f.id);
        Ok(formations)
    }

    async fn list_formations(&self, ids: &[Uuid]) -> Result<Vec<Formation>> {
        let tables = self.tables()?;
        let mut formations: Vec<Formation> = ids
            .iter()
            .filter_map(|id| tables.formations.get(id).cloned())
            .collect();
        formations.sort_by_key(|f| f.id);
        formations.dedup_by_key(|f| f.id);
        Ok(formations)
    }

    async fn list_lessons(&self, formation_ids: &[Uuid]) -> Result<Vec<Lesson>> {
        let tables = self.tables()?;
        let mut lessons: Vec<Lesson> = tables
            .lessons
            .values()
            .filter(|l| formation_ids.contains(&l.formation_id))
            .cloned()
            .collect();
        lessons.sort_by_key(|l| (l.formation_id, l.position, l.id));
        Ok(lessons)
    }

    async fn insert_quiz_attempt(&self, attempt: &QuizAttempt) -> Result<QuizAttempt> {
        self.tables()?.quiz_attempts.push(attempt.clone());
        Ok(attempt.clone())
    }

    async fn list_quiz_attempts(
        &self,
        user_id: Uuid,
        formation_id: Option<Uuid>,
    ) -> Result<Vec<QuizAttempt>> {
        let tables = self.tables()?;
        Ok(tables
            .quiz_attempts
            .iter()
            .filter(|a| a.user_id == user_id)
            .filter(|a| formation_id.map_or(true, |f| a.formation_id == f))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn write(user_id: Uuid, lesson_id: Uuid, formation_id: Uuid, progress: i32) -> ProgressWrite {
        ProgressWrite {
            user_id,
            lesson_id,
            formation_id,
            current_page: None,
            total_pages: None,
            time_spent: None,
            total_time: None,
            progress: Some(progress),
            completed: None,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn concurrent_upserts_keep_a_single_record() {
        let store = MemoryProgressStore::new();
        let (user, lesson, formation) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert_progress(&write(user, lesson, formation, i), CompletionPolicy::Monotonic)
                    .await
            }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }

        let records = store.list_progress(user, None).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(ids.iter().all(|id| *id == records[0].id));
    }

    #[tokio::test]
    async fn list_progress_is_ordered_and_filtered() {
        let store = MemoryProgressStore::new();
        let user = Uuid::new_v4();
        let formation_a = Uuid::from_u128(1);
        let formation_b = Uuid::from_u128(2);
        for (formation, lesson) in [
            (formation_b, Uuid::from_u128(10)),
            (formation_a, Uuid::from_u128(30)),
            (formation_a, Uuid::from_u128(20)),
        ] {
            store
                .upsert_progress(&write(user, lesson, formation, 10), CompletionPolicy::Monotonic)
                .await
                .unwrap();
        }

        let all = store.list_progress(user, None).await.unwrap();
        let keys: Vec<(Uuid, Uuid)> = all.iter().map(|r| (r.formation_id, r.lesson_id)).collect();
        assert_eq!(
            keys,
            vec![
                (formation_a, Uuid::from_u128(20)),
                (formation_a, Uuid::from_u128(30)),
                (formation_b, Uuid::from_u128(10)),
            ]
        );

        let only_b = store.list_progress(user, Some(formation_b)).await.unwrap();
        assert_eq!(only_b.len(), 1);
        assert!(store.list_progress(Uuid::new_v4(), None).await.unwrap().is_empty());
    }
}
