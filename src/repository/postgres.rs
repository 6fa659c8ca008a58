// src/repository/postgres.rs

use async_trait::async_trait;
use sqlx::PgPool;

use super::{JoinError, NewViolation, QuizRepository, RepositoryError, ViolationRepository};
use crate::models::{
    quiz::{Quiz, Submission},
    violation::{Violation, ViolationType},
};

/// Helper struct for reading rows of 'security_violations'.
#[derive(sqlx::FromRow)]
struct ViolationRow {
    id: i64,
    teacher_id: i64,
    quiz_id: i64,
    student_name: String,
    quiz_title: String,
    violation_type: String,
    occurred_at: chrono::DateTime<chrono::Utc>,
}

impl ViolationRow {
    fn into_violation(self) -> Option<Violation> {
        let violation_type = match self.violation_type.parse::<ViolationType>() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("Skipping violation {}: {}", self.id, e);
                return None;
            }
        };
        Some(Violation {
            id: self.id.to_string(),
            teacher_id: self.teacher_id,
            quiz_id: Some(self.quiz_id),
            student_name: self.student_name,
            quiz_title: self.quiz_title,
            violation_type,
            occurred_at: self.occurred_at,
        })
    }
}

#[derive(Clone)]
pub struct PgQuizRepository {
    pool: PgPool,
}

impl PgQuizRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuizRepository for PgQuizRepository {
    async fn list_joined_quizzes(&self, student_id: i64) -> Result<Vec<Quiz>, RepositoryError> {
        sqlx::query_as::<_, Quiz>(
            r#"
            SELECT q.id, q.title, q.code, q.release_at, q.duration_minutes
            FROM quiz_participants p
            JOIN quizzes q ON q.id = p.quiz_id
            WHERE p.student_id = $1
            ORDER BY p.joined_at DESC, q.id DESC
            "#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch joined quizzes: {:?}", e);
            RepositoryError::from(e)
        })
    }

    async fn list_submissions(&self, student_id: i64) -> Result<Vec<Submission>, RepositoryError> {
        sqlx::query_as::<_, Submission>(
            "SELECT quiz_id, student_id, submitted_at FROM submissions WHERE student_id = $1",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch submissions: {:?}", e);
            RepositoryError::from(e)
        })
    }

    async fn join_quiz(&self, student_id: i64, code: &str) -> Result<(), JoinError> {
        let quiz_id: Option<i64> = sqlx::query_scalar("SELECT id FROM quizzes WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| JoinError::Network(e.to_string()))?;

        let Some(quiz_id) = quiz_id else {
            return Err(JoinError::InvalidCode);
        };

        // The (student_id, quiz_id) primary key makes a second join a no-op.
        let result = sqlx::query(
            r#"
            INSERT INTO quiz_participants (student_id, quiz_id)
            VALUES ($1, $2)
            ON CONFLICT (student_id, quiz_id) DO NOTHING
            "#,
        )
        .bind(student_id)
        .bind(quiz_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to join quiz {}: {:?}", quiz_id, e);
            JoinError::Network(e.to_string())
        })?;

        if result.rows_affected() == 0 {
            return Err(JoinError::AlreadyJoined);
        }

        Ok(())
    }

    async fn is_participant(&self, student_id: i64, quiz_id: i64) -> Result<bool, RepositoryError> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM quiz_participants WHERE student_id = $1 AND quiz_id = $2)",
        )
        .bind(student_id)
        .bind(quiz_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to check participation: {:?}", e);
            RepositoryError::from(e)
        })
    }

    async fn list_owned_quiz_ids(&self, teacher_id: i64) -> Result<Vec<i64>, RepositoryError> {
        sqlx::query_scalar("SELECT id FROM quizzes WHERE teacher_id = $1 ORDER BY id")
            .bind(teacher_id)
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)
    }
}

#[derive(Clone)]
pub struct PgViolationRepository {
    pool: PgPool,
}

impl PgViolationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ViolationRepository for PgViolationRepository {
    async fn list_violations(&self, quiz_ids: &[i64]) -> Result<Vec<Violation>, RepositoryError> {
        if quiz_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, ViolationRow>(
            r#"
            SELECT
                v.id,
                q.teacher_id,
                v.quiz_id,
                v.student_name,
                q.title AS quiz_title,
                v.violation_type,
                v.occurred_at
            FROM security_violations v
            JOIN quizzes q ON q.id = v.quiz_id
            WHERE v.quiz_id = ANY($1)
            ORDER BY v.occurred_at DESC, v.id DESC
            "#,
        )
        .bind(quiz_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch violations: {:?}", e);
            RepositoryError::from(e)
        })?;

        Ok(rows.into_iter().filter_map(ViolationRow::into_violation).collect())
    }

    async fn record_violation(&self, new: NewViolation) -> Result<Violation, RepositoryError> {
        let row = sqlx::query_as::<_, ViolationRow>(
            r#"
            WITH inserted AS (
                INSERT INTO security_violations
                    (quiz_id, student_id, student_name, violation_type, occurred_at)
                SELECT q.id, $2, $3, $4, $5 FROM quizzes q WHERE q.id = $1
                RETURNING id, quiz_id, student_name, violation_type, occurred_at
            )
            SELECT
                i.id,
                q.teacher_id,
                i.quiz_id,
                i.student_name,
                q.title AS quiz_title,
                i.violation_type,
                i.occurred_at
            FROM inserted i
            JOIN quizzes q ON q.id = i.quiz_id
            "#,
        )
        .bind(new.quiz_id)
        .bind(new.student_id)
        .bind(&new.student_name)
        .bind(new.violation_type.as_str())
        .bind(new.occurred_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to record violation: {:?}", e);
            RepositoryError::from(e)
        })?;

        row.and_then(ViolationRow::into_violation)
            .ok_or_else(|| RepositoryError::NotFound(format!("Quiz {}", new.quiz_id)))
    }
}
