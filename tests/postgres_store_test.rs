//! Runs against a real database only when `DATABASE_URL` is set.

use std::env;

use chrono::Utc;
use formation_progress::{
    config::CompletionPolicy,
    database::{
        pool::{connect, run_migrations},
        PgProgressStore, ProgressStore,
    },
    models::{
        formation::{Formation, Lesson},
        progress::ProgressWrite,
        user::{User, ROLE_LEARNER},
    },
};
use uuid::Uuid;

async fn store() -> Option<PgProgressStore> {
    let url = env::var("DATABASE_URL").ok()?;
    let pool = connect(&url).await.expect("connect");
    run_migrations(&pool).await.expect("migrations");
    Some(PgProgressStore::new(pool))
}

async fn seed(store: &PgProgressStore) -> (Uuid, Uuid, Uuid) {
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        email: format!("pg-{}@bank.test", Uuid::new_v4()),
        name: "Pg Learner".into(),
        role: ROLE_LEARNER.into(),
        bank_id: None,
        is_active: true,
        created_at: now,
    };
    let formation = Formation {
        id: Uuid::new_v4(),
        title: "Pg formation".into(),
        description: None,
        bank_id: None,
        completion_lesson_id: None,
        is_active: true,
        created_at: now,
    };
    let lesson = Lesson {
        id: Uuid::new_v4(),
        formation_id: formation.id,
        title: "Pg lesson".into(),
        content_type: "document".into(),
        position: 0,
        passing_score: None,
        created_at: now,
    };
    store.insert_user(&user).await.expect("user");
    store.insert_formation(&formation).await.expect("formation");
    store.insert_lesson(&lesson).await.expect("lesson");
    (user.id, lesson.id, formation.id)
}

fn write(user_id: Uuid, lesson_id: Uuid, formation_id: Uuid) -> ProgressWrite {
    ProgressWrite {
        user_id,
        lesson_id,
        formation_id,
        current_page: None,
        total_pages: None,
        time_spent: None,
        total_time: None,
        progress: None,
        completed: None,
        at: Utc::now(),
    }
}

#[tokio::test]
async fn concurrent_upserts_produce_one_row() {
    let Some(store) = store().await else {
        return;
    };
    let (user_id, lesson_id, formation_id) = seed(&store).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let w = ProgressWrite {
                progress: Some(i * 10),
                ..write(user_id, lesson_id, formation_id)
            };
            store.upsert_progress(&w, CompletionPolicy::Monotonic).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().expect("upsert");
    }

    let records = store.list_progress(user_id, None).await.unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn completion_and_started_at_survive_updates() {
    let Some(store) = store().await else {
        return;
    };
    let (user_id, lesson_id, formation_id) = seed(&store).await;

    let first = store
        .upsert_progress(
            &ProgressWrite {
                completed: Some(true),
                ..write(user_id, lesson_id, formation_id)
            },
            CompletionPolicy::Monotonic,
        )
        .await
        .unwrap();
    let second = store
        .upsert_progress(
            &ProgressWrite {
                completed: Some(false),
                current_page: Some(2),
                ..write(user_id, lesson_id, formation_id)
            },
            CompletionPolicy::Monotonic,
        )
        .await
        .unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.started_at, first.started_at);
    assert!(second.is_completed);
    assert_eq!(second.completed_at, first.completed_at);
    assert_eq!(second.current_page, Some(2));
    assert!(second.last_accessed_at >= second.started_at);
}
