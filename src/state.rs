use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    clock::Clock,
    config::Config,
    lifecycle::QuizBoard,
    notifications::{FeedContext, FeedHub, InMemoryViolationChannel},
    repository::{QuizRepository, ViolationRepository},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub board: QuizBoard,
    pub quizzes: Arc<dyn QuizRepository>,
    pub violations: Arc<dyn ViolationRepository>,
    pub channel: Arc<InMemoryViolationChannel>,
    pub hub: Arc<FeedHub>,
    pub clock: Arc<dyn Clock>,
}

/// Collaborators the state is wired from.
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub quizzes: Arc<dyn QuizRepository>,
    pub violations: Arc<dyn ViolationRepository>,
    pub dismissals: Arc<dyn crate::notifications::DismissalStore>,
}

impl AppState {
    pub fn new(config: Config, parts: Collaborators) -> Self {
        let channel = Arc::new(InMemoryViolationChannel::new());
        let ctx = FeedContext {
            clock: parts.clock.clone(),
            quizzes: parts.quizzes.clone(),
            violations: parts.violations.clone(),
            channel: channel.clone(),
            dismissals: parts.dismissals,
        };

        Self {
            config,
            board: QuizBoard::new(parts.quizzes.clone(), parts.clock.clone()),
            quizzes: parts.quizzes,
            violations: parts.violations,
            channel,
            hub: Arc::new(FeedHub::new(ctx)),
            clock: parts.clock,
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for QuizBoard {
    fn from_ref(state: &AppState) -> Self {
        state.board.clone()
    }
}

impl FromRef<AppState> for Arc<FeedHub> {
    fn from_ref(state: &AppState) -> Self {
        state.hub.clone()
    }
}
