// src/handlers/quiz.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};
use validator::Validate;

use crate::{
    error::AppError, lifecycle::QuizBoard, models::quiz::JoinQuizRequest, utils::jwt::Claims,
};

/// Lists the caller's joined quizzes split into active, upcoming and completed.
pub async fn list_my_quizzes(
    State(board): State<QuizBoard>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let set = board.load(student_id).await.map_err(|e| {
        tracing::error!("Failed to load quizzes for {}: {:?}", student_id, e);
        AppError::from(e)
    })?;

    Ok(Json(set))
}

/// Joins a quiz by code.
///
/// * 404 when the code matches no quiz.
/// * 409 when the caller already joined it.
/// * On success returns the freshly re-classified quiz set.
pub async fn join_quiz(
    State(board): State<QuizBoard>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<JoinQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let student_id = claims.user_id()?;

    let set = board.join(student_id, req.code.trim()).await?;
    Ok(Json(set))
}
