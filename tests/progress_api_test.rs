use std::env;
use std::sync::{Arc, Once};

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use formation_progress::{
    database::MemoryProgressStore, middleware::auth::Claims, routes::build_router, AppState,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "test_secret_key";

fn setup() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        env::set_var("SERVER_ADDRESS", "127.0.0.1:0");
        env::set_var("STORAGE_BACKEND", "memory");
        env::set_var("JWT_SECRET", SECRET);
        env::set_var("API_RPS", "10000");
        formation_progress::config::init_config().expect("init config");
    });
}

fn app() -> Router {
    setup();
    build_router(AppState::new(Arc::new(MemoryProgressStore::new())))
}

fn token(sub: Uuid, role: &str, bank_id: Option<Uuid>) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        exp: (Utc::now().timestamp() + 3600) as usize,
        role: Some(role.to_string()),
        bank_id,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("encode token")
}

fn admin_token() -> String {
    token(Uuid::new_v4(), "admin", None)
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<String>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, JsonValue) {
    let response = app.clone().oneshot(req).await.expect("router response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null);
    (status, body)
}

async fn post(app: &Router, uri: &str, token: &str, body: JsonValue) -> (StatusCode, JsonValue) {
    call(app, request("POST", uri, Some(token), Some(body.to_string()))).await
}

async fn get(app: &Router, uri: &str, token: &str) -> (StatusCode, JsonValue) {
    call(app, request("GET", uri, Some(token), None)).await
}

fn id(value: &JsonValue) -> Uuid {
    Uuid::parse_str(value.as_str().expect("uuid string")).expect("uuid")
}

struct Catalog {
    user_id: Uuid,
    bank_id: Uuid,
    formation_id: Uuid,
    lessons: Vec<Uuid>,
}

async fn seed(app: &Router, lesson_kinds: &[&str]) -> Catalog {
    let admin = admin_token();
    let bank_id = Uuid::new_v4();

    let (status, body) = post(
        app,
        "/users",
        &admin,
        json!({
            "email": format!("learner-{}@bank.test", Uuid::new_v4()),
            "name": "Learner",
            "bankId": bank_id,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let user_id = id(&body["user"]["id"]);

    let (status, body) = post(
        app,
        "/formations",
        &admin,
        json!({ "title": "Anti money laundering", "bankId": bank_id }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let formation_id = id(&body["formation"]["id"]);

    let mut lessons = Vec::new();
    for (i, kind) in lesson_kinds.iter().enumerate() {
        let (status, body) = post(
            app,
            &format!("/formations/{}/lessons", formation_id),
            &admin,
            json!({ "title": format!("Lesson {}", i + 1), "contentType": kind }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        lessons.push(id(&body["lesson"]["id"]));
    }

    Catalog {
        user_id,
        bank_id,
        formation_id,
        lessons,
    }
}

#[tokio::test]
async fn health_needs_no_token() {
    let app = app();
    let (status, body) = call(&app, request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn save_is_an_idempotent_upsert() {
    let app = app();
    let c = seed(&app, &["document", "video"]).await;
    let learner = token(c.user_id, "learner", Some(c.bank_id));

    let save = |progress: f64| {
        json!({
            "userId": c.user_id,
            "lessonId": c.lessons[0],
            "formationId": c.formation_id,
            "currentPage": 3,
            "totalPages": 10,
            "progress": progress,
        })
    };

    let (status, first) = post(&app, "/progress/save", &learner, save(40.0)).await;
    assert_eq!(status, StatusCode::OK, "{first}");
    assert_eq!(first["success"], true);
    assert_eq!(first["progress"]["progress"], 40);
    assert_eq!(first["progress"]["lastPositionSnapshot"]["page"], 3);

    let (status, second) = post(&app, "/progress/save", &learner, save(150.0)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["progress"]["id"], first["progress"]["id"]);
    assert_eq!(second["progress"]["progress"], 100);
    assert_eq!(second["progress"]["startedAt"], first["progress"]["startedAt"]);

    let uri = format!(
        "/progress/get?userId={}&lessonId={}&formationId={}",
        c.user_id, c.lessons[0], c.formation_id
    );
    let (status, fetched) = get(&app, &uri, &learner).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["progress"]["id"], first["progress"]["id"]);

    let (status, list) = get(&app, &format!("/progress/user/{}", c.user_id), &learner).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["count"], 1);
    assert_eq!(list["progressions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn untouched_lesson_reads_as_null() {
    let app = app();
    let c = seed(&app, &["document"]).await;
    let learner = token(c.user_id, "learner", None);

    let uri = format!(
        "/progress/get?userId={}&lessonId={}&formationId={}",
        c.user_id, c.lessons[0], c.formation_id
    );
    let (status, body) = get(&app, &uri, &learner).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["progress"].is_null());
}

#[tokio::test]
async fn invalid_writes_are_rejected_with_400() {
    let app = app();
    let c = seed(&app, &["document"]).await;
    let learner = token(c.user_id, "learner", None);

    let (status, body) = post(&app, "/progress/save", &learner, json!({ "userId": c.user_id })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Missing required fields: lessonId, formationId");

    let (status, _) = call(
        &app,
        request("POST", "/progress/save", Some(&learner), Some("{not json".into())),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(
        &app,
        "/progress/save",
        &learner,
        json!({
            "userId": c.user_id,
            "lessonId": c.lessons[0],
            "formationId": c.formation_id,
            "currentPage": 0,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = get(&app, "/progress/get?userId=", &learner).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
}

#[tokio::test]
async fn malformed_list_filter_and_oversized_counters_are_400() {
    let app = app();
    let c = seed(&app, &["video"]).await;
    let learner = token(c.user_id, "learner", None);

    let uri = format!("/progress/user/{}?formationId=not-a-uuid", c.user_id);
    let (status, body) = get(&app, &uri, &learner).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["success"], false);

    let (status, body) = post(
        &app,
        "/progress/save",
        &learner,
        json!({
            "userId": c.user_id,
            "lessonId": c.lessons[0],
            "formationId": c.formation_id,
            "timeSpent": i64::MAX,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn unknown_references_are_404() {
    let app = app();
    let c = seed(&app, &["document"]).await;
    let learner = token(c.user_id, "learner", None);

    let (status, body) = post(
        &app,
        "/progress/save",
        &learner,
        json!({
            "userId": c.user_id,
            "lessonId": Uuid::new_v4(),
            "formationId": c.formation_id,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Lesson not found");

    let (status, body) = get(
        &app,
        &format!("/user-progress/user/{}", Uuid::new_v4()),
        &admin_token(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");
}

#[tokio::test]
async fn access_follows_token_and_role() {
    let app = app();
    let c = seed(&app, &["document"]).await;
    let own = format!("/progress/user/{}", c.user_id);

    let (status, _) = call(&app, request("GET", &own, None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, request("GET", &own, Some("garbage"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let stranger = token(Uuid::new_v4(), "learner", Some(c.bank_id));
    let (status, _) = get(&app, &own, &stranger).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let manager = token(Uuid::new_v4(), "manager", Some(c.bank_id));
    let (status, _) = get(&app, &own, &manager).await;
    assert_eq!(status, StatusCode::OK);

    let foreign_manager = token(Uuid::new_v4(), "manager", Some(Uuid::new_v4()));
    let (status, _) = get(&app, &own, &foreign_manager).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let learner = token(c.user_id, "learner", Some(c.bank_id));
    let (status, _) = post(
        &app,
        "/formations",
        &learner,
        json!({ "title": "Not allowed" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn summary_reports_formation_progress() {
    let app = app();
    let c = seed(&app, &["document", "video"]).await;
    let learner = token(c.user_id, "learner", Some(c.bank_id));

    let (status, _) = post(
        &app,
        "/progress/save",
        &learner,
        json!({
            "userId": c.user_id,
            "lessonId": c.lessons[0],
            "formationId": c.formation_id,
            "progress": 40,
            "timeSpent": 150,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = post(
        &app,
        "/progress/save",
        &learner,
        json!({
            "userId": c.user_id,
            "lessonId": c.lessons[1],
            "formationId": c.formation_id,
            "completed": true,
            "timeSpent": 45,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, full) = get(&app, &format!("/user-progress/user/{}", c.user_id), &learner).await;
    assert_eq!(status, StatusCode::OK, "{full}");
    assert_eq!(full["totalFormations"], 1);
    assert_eq!(full["inProgressFormations"], 1);
    assert_eq!(full["totalTimeSpent"], 3);
    let formation = &full["formations"][0];
    assert_eq!(formation["progress"], 70);
    assert_eq!(formation["status"], "in_progress");
    assert_eq!(formation["completedLessons"], 1);
    assert_eq!(formation["totalLessons"], 2);

    let (status, counts) = get(
        &app,
        &format!("/user-progress/user/{}/summary", c.user_id),
        &learner,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(counts["inProgressFormations"], 1);
    assert!(counts.get("formations").is_none());

    let (status, scoped) = get(
        &app,
        &format!("/user-progress/user/{}/formation/{}", c.user_id, c.formation_id),
        &learner,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(scoped["formations"][0]["progress"], 70);
}

#[tokio::test]
async fn quiz_attempts_feed_the_summary() {
    let app = app();
    let c = seed(&app, &["quiz"]).await;
    let learner = token(c.user_id, "learner", Some(c.bank_id));

    for score in [90.0, 60.0, 85.0] {
        let (status, body) = post(
            &app,
            "/quiz-attempts",
            &learner,
            json!({
                "userId": c.user_id,
                "formationId": c.formation_id,
                "lessonId": c.lessons[0],
                "score": score,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }

    let (status, summary) = get(
        &app,
        &format!("/user-progress/user/{}/summary", c.user_id),
        &learner,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["totalQuizAttempts"], 3);
    assert_eq!(summary["passedQuizAttempts"], 2);
    assert_eq!(summary["failedQuizAttempts"], 1);
    let average = summary["averageQuizScore"].as_f64().unwrap();
    assert!((average - 78.33).abs() < 1e-9, "average was {average}");
}
