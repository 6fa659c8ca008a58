// src/notifications/mod.rs

//! Live proctoring alerts for teachers.
//!
//! A [`ViolationFeed`] merges three sources into one visible list:
//! historical rows from the [`ViolationRepository`](crate::repository::ViolationRepository),
//! events from a [`ViolationChannel`], and the teacher's [`DismissalStore`].

pub mod channel;
pub mod dismissal;
pub mod feed;
pub mod hub;

use std::sync::Arc;

use thiserror::Error;

use crate::{
    clock::Clock,
    repository::{QuizRepository, RepositoryError, ViolationRepository},
};

pub use channel::{
    ChannelError, EventSink, InMemoryViolationChannel, SubscriptionError, SubscriptionHandle,
    ViolationChannel,
};
pub use dismissal::{DismissalStore, FileDismissalStore, InMemoryDismissalStore, PersistenceError};
pub use feed::{FeedState, ViolationFeed};
pub use hub::FeedHub;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("historical violations unavailable: {0}")]
    Repository(#[from] RepositoryError),

    #[error("live channel unavailable: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("feed cannot be initialized from state {0:?}")]
    InvalidState(FeedState),
}

/// Collaborators a feed is built from. Passed in explicitly so tests can swap
/// any of them for a fake.
#[derive(Clone)]
pub struct FeedContext {
    pub clock: Arc<dyn Clock>,
    pub quizzes: Arc<dyn QuizRepository>,
    pub violations: Arc<dyn ViolationRepository>,
    pub channel: Arc<dyn ViolationChannel>,
    pub dismissals: Arc<dyn DismissalStore>,
}
