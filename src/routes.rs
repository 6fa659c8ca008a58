// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{quiz, violation},
    state::AppState,
    utils::jwt::{auth_middleware, teacher_middleware},
};

/// Assembles the main application router.
///
/// * Student quiz routes and the proctoring report route require any valid token.
/// * Teacher violation routes additionally require the 'teacher' role.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let quiz_routes = Router::new()
        .route("/", get(quiz::list_my_quizzes))
        .route("/join", post(quiz::join_quiz))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let proctor_routes = Router::new()
        .route("/violations", post(violation::report_violation))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let teacher_routes = Router::new()
        .route("/violations", get(violation::list_violations))
        .route("/violations/stream", get(violation::stream_violations))
        .route("/violations/{id}/dismiss", post(violation::dismiss_violation))
        .route("/violations/feed", delete(violation::close_feed))
        // Auth first, then the role check
        .layer(middleware::from_fn(teacher_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/quizzes", quiz_routes)
        .nest("/api/proctor", proctor_routes)
        .nest("/api/teacher", teacher_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
