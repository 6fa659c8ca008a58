// tests/api_tests.rs

use std::sync::Arc;

use chrono::{Duration, Utc};
use quiz_proctor::{
    clock::FixedClock,
    config::Config,
    notifications::InMemoryDismissalStore,
    repository::memory::{InMemoryQuizRepository, InMemoryViolationRepository},
    routes,
    state::{AppState, Collaborators},
    utils::jwt::{ROLE_STUDENT, ROLE_TEACHER, sign_jwt},
};

const SECRET: &str = "test_secret_for_integration_tests";

struct TestApp {
    address: String,
    quizzes: Arc<InMemoryQuizRepository>,
}

impl TestApp {
    fn token(&self, user_id: i64, role: &str) -> String {
        sign_jwt(user_id, role, SECRET, 600).expect("Failed to sign token")
    }
}

/// Spawns the app on a random port backed by in-memory repositories.
async fn spawn_app() -> TestApp {
    let quizzes = Arc::new(InMemoryQuizRepository::new());
    let violations = Arc::new(InMemoryViolationRepository::new(quizzes.clone()));

    let config = Config {
        database_url: "postgres://unused".to_string(),
        jwt_secret: SECRET.to_string(),
        rust_log: "error".to_string(),
        dismissal_dir: std::env::temp_dir().join(format!("dismissals-{}", uuid::Uuid::new_v4())),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
    };

    let state = AppState::new(
        config,
        Collaborators {
            clock: Arc::new(FixedClock::new(Utc::now())),
            quizzes: quizzes.clone(),
            violations,
            dismissals: Arc::new(InMemoryDismissalStore::new()),
        },
    );

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp { address, quizzes }
}

fn ids(set: &serde_json::Value, bucket: &str) -> Vec<i64> {
    set[bucket]
        .as_array()
        .expect("bucket missing")
        .iter()
        .map(|q| q["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn health_check_404() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(&format!("{}/random_path_that_does_not_exist", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn quizzes_require_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(&format!("{}/api/quizzes", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn join_then_list_classifies_quizzes() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let student = 42;
    let token = app.token(student, ROLE_STUDENT);

    let open = app.quizzes.add_quiz(1, "Open", "OPEN1", None);
    let later = app
        .quizzes
        .add_quiz(1, "Later", "LATER1", Some(Utc::now() + Duration::hours(1)));
    let done = app.quizzes.add_quiz(1, "Done", "DONE1", None);
    app.quizzes.add_participant(student, done.id);
    app.quizzes.add_submission(student, done.id, Utc::now());

    // Act: join two quizzes
    for code in ["OPEN1", "LATER1"] {
        let response = client
            .post(&format!("{}/api/quizzes/join", app.address))
            .header("Authorization", format!("Bearer {}", token))
            .json(&serde_json::json!({ "code": code }))
            .send()
            .await
            .expect("Join failed");
        assert_eq!(response.status().as_u16(), 200);
    }

    let set: serde_json::Value = client
        .get(&format!("{}/api/quizzes", app.address))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("List failed")
        .json()
        .await
        .expect("Failed to parse quiz set");

    // Assert
    assert_eq!(ids(&set, "active"), vec![open.id]);
    assert_eq!(ids(&set, "upcoming"), vec![later.id]);
    assert_eq!(ids(&set, "completed"), vec![done.id]);
}

#[tokio::test]
async fn join_reports_invalid_and_duplicate_codes() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let token = app.token(7, ROLE_STUDENT);
    app.quizzes.add_quiz(1, "Only", "ONLY", None);

    let join = |code: &'static str| {
        client
            .post(format!("{}/api/quizzes/join", app.address))
            .header("Authorization", format!("Bearer {}", token))
            .json(&serde_json::json!({ "code": code }))
            .send()
    };

    assert_eq!(join("MISSING").await.unwrap().status().as_u16(), 404);
    assert_eq!(join("ONLY").await.unwrap().status().as_u16(), 200);
    assert_eq!(join("ONLY").await.unwrap().status().as_u16(), 409);
    assert_eq!(join("").await.unwrap().status().as_u16(), 400);
}

#[tokio::test]
async fn repository_outage_is_reported_as_unavailable() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let token = app.token(7, ROLE_TEACHER);
    app.quizzes.set_unavailable(true);

    let response = client
        .get(&format!("{}/api/quizzes", app.address))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 503);
}
