// src/lifecycle.rs

//! Splits a student's joined quizzes into active, upcoming and completed.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};

use crate::{
    clock::Clock,
    models::quiz::{ClassifiedQuizSet, Quiz, Submission},
    repository::{JoinError, QuizRepository, RepositoryError},
};

/// Classifies quizzes against the submissions and the current instant.
///
/// * A submitted quiz is `completed`, whatever its release time.
/// * An unsubmitted quiz released strictly after `now` is `upcoming`.
/// * Everything else (no release time, or released at or before `now`) is `active`.
///
/// Relative order from `quizzes` is kept inside each bucket.
pub fn classify(quizzes: Vec<Quiz>, submissions: &[Submission], now: DateTime<Utc>) -> ClassifiedQuizSet {
    let submitted: HashSet<i64> = submissions.iter().map(|s| s.quiz_id).collect();

    let mut set = ClassifiedQuizSet::default();
    for quiz in quizzes {
        if submitted.contains(&quiz.id) {
            set.completed.push(quiz);
            continue;
        }
        match quiz.release_at {
            Some(release_at) if release_at > now => {
                set.next_release_at = Some(match set.next_release_at {
                    Some(current) => current.min(release_at),
                    None => release_at,
                });
                set.upcoming.push(quiz);
            }
            _ => set.active.push(quiz),
        }
    }
    set
}

/// A student's view of their quizzes, always rebuilt from fresh repository data.
#[derive(Clone)]
pub struct QuizBoard {
    quizzes: Arc<dyn QuizRepository>,
    clock: Arc<dyn Clock>,
}

impl QuizBoard {
    pub fn new(quizzes: Arc<dyn QuizRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { quizzes, clock }
    }

    pub async fn load(&self, student_id: i64) -> Result<ClassifiedQuizSet, RepositoryError> {
        let joined = self.quizzes.list_joined_quizzes(student_id).await?;
        let submissions = self.quizzes.list_submissions(student_id).await?;
        let set = classify(joined, &submissions, self.clock.now());

        tracing::debug!(
            student_id,
            active = set.active.len(),
            upcoming = set.upcoming.len(),
            completed = set.completed.len(),
            "Classified quizzes"
        );
        Ok(set)
    }

    /// Joins by code, then re-classifies from a full re-fetch.
    pub async fn join(&self, student_id: i64, code: &str) -> Result<ClassifiedQuizSet, JoinError> {
        self.quizzes
            .join_quiz(student_id, code)
            .await
            .inspect_err(|e| tracing::info!(student_id, "Join rejected: {}", e))?;
        tracing::info!(student_id, code, "Student joined quiz");

        Ok(self.load(student_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::FixedClock, repository::memory::InMemoryQuizRepository};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn quiz(id: i64, release_at: Option<DateTime<Utc>>) -> Quiz {
        Quiz {
            id,
            title: format!("Quiz {}", id),
            code: format!("C{}", id),
            release_at,
            duration_minutes: Some(30),
        }
    }

    fn submission(quiz_id: i64) -> Submission {
        Submission {
            quiz_id,
            student_id: 1,
            submitted_at: now(),
        }
    }

    fn ids(quizzes: &[Quiz]) -> Vec<i64> {
        quizzes.iter().map(|q| q.id).collect()
    }

    #[test]
    fn test_quiz_without_release_is_active() {
        let set = classify(vec![quiz(1, None)], &[], now());
        assert_eq!(ids(&set.active), vec![1]);
        assert!(set.upcoming.is_empty());
        assert!(set.completed.is_empty());
        assert_eq!(set.next_release_at, None);
    }

    #[test]
    fn test_future_release_is_upcoming() {
        let release = now() + Duration::hours(1);
        let set = classify(vec![quiz(2, Some(release))], &[], now());
        assert_eq!(ids(&set.upcoming), vec![2]);
        assert_eq!(set.next_release_at, Some(release));
    }

    #[test]
    fn test_submission_beats_future_release() {
        let set = classify(
            vec![quiz(3, Some(now() + Duration::hours(1)))],
            &[submission(3)],
            now(),
        );
        assert_eq!(ids(&set.completed), vec![3]);
        assert!(set.upcoming.is_empty());
        assert_eq!(set.next_release_at, None);
    }

    #[test]
    fn test_release_exactly_now_is_active() {
        let set = classify(vec![quiz(4, Some(now()))], &[], now());
        assert_eq!(ids(&set.active), vec![4]);
        assert!(set.upcoming.is_empty());
    }

    #[test]
    fn test_buckets_are_disjoint_and_exhaustive() {
        let quizzes = vec![
            quiz(1, None),
            quiz(2, Some(now() + Duration::minutes(1))),
            quiz(3, Some(now() - Duration::minutes(1))),
            quiz(4, Some(now() + Duration::days(2))),
            quiz(5, None),
            quiz(6, Some(now())),
        ];
        let submissions = vec![submission(4), submission(5), submission(5)];
        let set = classify(quizzes.clone(), &submissions, now());

        assert_eq!(
            set.active.len() + set.upcoming.len() + set.completed.len(),
            quizzes.len()
        );
        for q in &quizzes {
            let hits = [&set.active, &set.upcoming, &set.completed]
                .iter()
                .filter(|bucket| bucket.iter().any(|x| x.id == q.id))
                .count();
            assert_eq!(hits, 1, "quiz {} must land in exactly one bucket", q.id);
        }

        // Input order is kept within buckets.
        assert_eq!(ids(&set.active), vec![1, 3, 6]);
        assert_eq!(ids(&set.upcoming), vec![2]);
        assert_eq!(ids(&set.completed), vec![4, 5]);
        assert_eq!(set.next_release_at, Some(now() + Duration::minutes(1)));
    }

    #[test]
    fn test_null_release_is_never_upcoming() {
        for offset in [-1000, -1, 0, 1, 1000] {
            let set = classify(vec![quiz(1, None)], &[], now() + Duration::days(offset));
            assert!(set.upcoming.is_empty());
        }
    }

    #[test]
    fn test_advancing_clock_moves_quiz_to_active() {
        let release = now() + Duration::minutes(10);
        let quizzes = vec![quiz(1, Some(release))];

        let before = classify(quizzes.clone(), &[], now());
        assert_eq!(ids(&before.upcoming), vec![1]);

        let after = classify(quizzes, &[], release);
        assert_eq!(ids(&after.active), vec![1]);
    }

    #[tokio::test]
    async fn test_join_reclassifies_from_fresh_data() {
        let repo = Arc::new(InMemoryQuizRepository::new());
        let early = repo.add_quiz(1, "Early", "EARLY", None);
        let later = repo.add_quiz(1, "Later", "LATER", Some(now() + Duration::hours(2)));
        repo.add_participant(5, early.id);

        let clock = Arc::new(FixedClock::new(now()));
        let board = QuizBoard::new(repo.clone(), clock.clone());

        let set = board.join(5, "LATER").await.unwrap();
        assert_eq!(ids(&set.active), vec![early.id]);
        assert_eq!(ids(&set.upcoming), vec![later.id]);

        // A submission recorded elsewhere shows up on the next load.
        repo.add_submission(5, early.id, now());
        clock.advance(Duration::hours(3));
        let set = board.load(5).await.unwrap();
        assert_eq!(ids(&set.completed), vec![early.id]);
        assert_eq!(ids(&set.active), vec![later.id]);
    }

    #[tokio::test]
    async fn test_join_failures_are_reported() {
        let repo = Arc::new(InMemoryQuizRepository::new());
        repo.add_quiz(1, "Only", "ONLY", None);
        let board = QuizBoard::new(repo.clone(), Arc::new(FixedClock::new(now())));

        assert_eq!(board.join(5, "MISSING").await, Err(JoinError::InvalidCode));
        board.join(5, "ONLY").await.unwrap();
        assert_eq!(board.join(5, "ONLY").await, Err(JoinError::AlreadyJoined));
    }
}
