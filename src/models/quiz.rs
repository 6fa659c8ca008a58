// src/models/quiz.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'quizzes' table, as seen by a student who joined it.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,

    pub title: String,

    /// Join code handed out by the teacher.
    pub code: String,

    /// When the quiz opens. `None` means the quiz is always available.
    pub release_at: Option<chrono::DateTime<chrono::Utc>>,

    pub duration_minutes: Option<i32>,
}

/// Represents the 'submissions' table.
/// At most one row exists per (student_id, quiz_id).
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Submission {
    pub quiz_id: i64,
    pub student_id: i64,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
}

/// A student's joined quizzes split by lifecycle stage.
///
/// The three lists are disjoint and together hold every joined quiz.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassifiedQuizSet {
    pub active: Vec<Quiz>,
    pub upcoming: Vec<Quiz>,
    pub completed: Vec<Quiz>,

    /// Earliest release among `upcoming`; the set is stale from this instant on.
    pub next_release_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for joining a quiz by its code.
#[derive(Debug, Deserialize, Validate)]
pub struct JoinQuizRequest {
    #[validate(length(min = 1, max = 32, message = "Quiz code must be 1-32 characters."))]
    pub code: String,
}
