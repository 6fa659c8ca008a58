// src/repository/mod.rs

//! Narrow interfaces to the quiz and violation tables.
//!
//! Handlers and engines only ever see these traits; `postgres` backs them in
//! production and `memory` backs them in tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    quiz::{Quiz, Submission},
    violation::{Violation, ViolationType},
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(String),

    #[error("{0} not found")]
    NotFound(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row".to_string()),
            other => RepositoryError::Database(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JoinError {
    #[error("No quiz matches that code")]
    InvalidCode,

    #[error("Quiz already joined")]
    AlreadyJoined,

    #[error("Quiz service unreachable: {0}")]
    Network(String),
}

impl From<RepositoryError> for JoinError {
    fn from(err: RepositoryError) -> Self {
        JoinError::Network(err.to_string())
    }
}

/// A violation about to be written to the historical table.
#[derive(Debug, Clone)]
pub struct NewViolation {
    pub quiz_id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub violation_type: ViolationType,
    pub occurred_at: DateTime<Utc>,
}

#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Quizzes the student joined, in the repository's own order.
    async fn list_joined_quizzes(&self, student_id: i64) -> Result<Vec<Quiz>, RepositoryError>;

    async fn list_submissions(&self, student_id: i64) -> Result<Vec<Submission>, RepositoryError>;

    async fn join_quiz(&self, student_id: i64, code: &str) -> Result<(), JoinError>;

    /// Whether the student has joined the quiz.
    async fn is_participant(&self, student_id: i64, quiz_id: i64) -> Result<bool, RepositoryError>;

    /// Ids of every quiz the teacher owns.
    async fn list_owned_quiz_ids(&self, teacher_id: i64) -> Result<Vec<i64>, RepositoryError>;
}

#[async_trait]
pub trait ViolationRepository: Send + Sync {
    /// Historical violations for the given quizzes, newest first.
    async fn list_violations(&self, quiz_ids: &[i64]) -> Result<Vec<Violation>, RepositoryError>;

    /// Persists a violation and returns it with its durable id, owning
    /// teacher and quiz title filled in.
    async fn record_violation(&self, new: NewViolation) -> Result<Violation, RepositoryError>;
}
