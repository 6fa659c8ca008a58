// src/repository/memory.rs

//! In-process repositories used by the test suites and local experiments.

use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicI64, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{JoinError, NewViolation, QuizRepository, RepositoryError, ViolationRepository};
use crate::models::{
    quiz::{Quiz, Submission},
    violation::{Violation, ViolationType},
};

#[derive(Debug, Clone)]
struct OwnedQuiz {
    teacher_id: i64,
    quiz: Quiz,
}

#[derive(Debug, Default)]
struct QuizTables {
    quizzes: Vec<OwnedQuiz>,
    /// (student_id, quiz_id) in join order.
    participants: Vec<(i64, i64)>,
    submissions: Vec<Submission>,
}

/// Quiz repository backed by plain vectors.
///
/// `set_unavailable(true)` makes every call fail as if the database were down.
#[derive(Debug, Default)]
pub struct InMemoryQuizRepository {
    tables: Mutex<QuizTables>,
    next_id: AtomicI64,
    unavailable: AtomicBool,
}

impl InMemoryQuizRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_quiz(
        &self,
        teacher_id: i64,
        title: &str,
        code: &str,
        release_at: Option<DateTime<Utc>>,
    ) -> Quiz {
        let quiz = Quiz {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            title: title.to_string(),
            code: code.to_string(),
            release_at,
            duration_minutes: None,
        };
        self.with_tables(|t| {
            t.quizzes.push(OwnedQuiz {
                teacher_id,
                quiz: quiz.clone(),
            })
        });
        quiz
    }

    pub fn add_participant(&self, student_id: i64, quiz_id: i64) {
        self.with_tables(|t| {
            if !t.participants.contains(&(student_id, quiz_id)) {
                t.participants.push((student_id, quiz_id));
            }
        });
    }

    /// Records a submission; a second submission for the same pair is ignored.
    pub fn add_submission(&self, student_id: i64, quiz_id: i64, submitted_at: DateTime<Utc>) {
        self.with_tables(|t| {
            let exists = t
                .submissions
                .iter()
                .any(|s| s.student_id == student_id && s.quiz_id == quiz_id);
            if !exists {
                t.submissions.push(Submission {
                    quiz_id,
                    student_id,
                    submitted_at,
                });
            }
        });
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn check_available(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(RepositoryError::Database("connection refused".to_string()));
        }
        Ok(())
    }

    fn with_tables<R>(&self, f: impl FnOnce(&mut QuizTables) -> R) -> R {
        let mut guard = match self.tables.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn quiz_title(&self, quiz_id: i64) -> Option<(i64, String)> {
        self.with_tables(|t| {
            t.quizzes
                .iter()
                .find(|o| o.quiz.id == quiz_id)
                .map(|o| (o.teacher_id, o.quiz.title.clone()))
        })
    }
}

#[async_trait]
impl QuizRepository for InMemoryQuizRepository {
    async fn list_joined_quizzes(&self, student_id: i64) -> Result<Vec<Quiz>, RepositoryError> {
        self.check_available()?;
        Ok(self.with_tables(|t| {
            t.participants
                .iter()
                .filter(|(s, _)| *s == student_id)
                .filter_map(|(_, quiz_id)| {
                    t.quizzes
                        .iter()
                        .find(|o| o.quiz.id == *quiz_id)
                        .map(|o| o.quiz.clone())
                })
                .collect()
        }))
    }

    async fn list_submissions(&self, student_id: i64) -> Result<Vec<Submission>, RepositoryError> {
        self.check_available()?;
        Ok(self.with_tables(|t| {
            t.submissions
                .iter()
                .filter(|s| s.student_id == student_id)
                .cloned()
                .collect()
        }))
    }

    async fn join_quiz(&self, student_id: i64, code: &str) -> Result<(), JoinError> {
        self.check_available()?;
        self.with_tables(|t| {
            let quiz_id = t
                .quizzes
                .iter()
                .find(|o| o.quiz.code == code)
                .map(|o| o.quiz.id)
                .ok_or(JoinError::InvalidCode)?;

            if t.participants.contains(&(student_id, quiz_id)) {
                return Err(JoinError::AlreadyJoined);
            }
            t.participants.push((student_id, quiz_id));
            Ok(())
        })
    }

    async fn is_participant(&self, student_id: i64, quiz_id: i64) -> Result<bool, RepositoryError> {
        self.check_available()?;
        Ok(self.with_tables(|t| t.participants.contains(&(student_id, quiz_id))))
    }

    async fn list_owned_quiz_ids(&self, teacher_id: i64) -> Result<Vec<i64>, RepositoryError> {
        self.check_available()?;
        Ok(self.with_tables(|t| {
            t.quizzes
                .iter()
                .filter(|o| o.teacher_id == teacher_id)
                .map(|o| o.quiz.id)
                .collect()
        }))
    }
}

/// Violation repository backed by a vector, sharing quiz metadata with an
/// `InMemoryQuizRepository`.
#[derive(Debug)]
pub struct InMemoryViolationRepository {
    quizzes: std::sync::Arc<InMemoryQuizRepository>,
    rows: Mutex<Vec<Violation>>,
    next_id: AtomicI64,
    unavailable: AtomicBool,
}

impl InMemoryViolationRepository {
    pub fn new(quizzes: std::sync::Arc<InMemoryQuizRepository>) -> Self {
        Self {
            quizzes,
            rows: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Inserts a historical row directly, bypassing quiz lookup.
    pub fn insert(&self, violation: Violation) {
        let mut rows = match self.rows.lock() {
            Ok(rows) => rows,
            Err(poisoned) => poisoned.into_inner(),
        };
        rows.push(violation);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }
}

#[async_trait]
impl ViolationRepository for InMemoryViolationRepository {
    async fn list_violations(&self, quiz_ids: &[i64]) -> Result<Vec<Violation>, RepositoryError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(RepositoryError::Database("connection refused".to_string()));
        }
        let rows = match self.rows.lock() {
            Ok(rows) => rows,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut found: Vec<Violation> = rows
            .iter()
            .filter(|v| v.quiz_id.is_some_and(|id| quiz_ids.contains(&id)))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        Ok(found)
    }

    async fn record_violation(&self, new: NewViolation) -> Result<Violation, RepositoryError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(RepositoryError::Database("connection refused".to_string()));
        }
        let (teacher_id, quiz_title) = self
            .quizzes
            .quiz_title(new.quiz_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Quiz {}", new.quiz_id)))?;

        let violation = Violation {
            id: (self.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string(),
            teacher_id,
            quiz_id: Some(new.quiz_id),
            student_name: new.student_name,
            quiz_title,
            violation_type: new.violation_type,
            occurred_at: new.occurred_at,
        };
        self.insert(violation.clone());
        Ok(violation)
    }
}

/// Convenience constructor for historical rows in tests.
pub fn historical_violation(
    id: &str,
    teacher_id: i64,
    quiz_id: i64,
    occurred_at: DateTime<Utc>,
) -> Violation {
    Violation {
        id: id.to_string(),
        teacher_id,
        quiz_id: Some(quiz_id),
        student_name: "student".to_string(),
        quiz_title: "quiz".to_string(),
        violation_type: ViolationType::TabSwitch,
        occurred_at,
    }
}
