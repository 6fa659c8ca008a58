// src/notifications/hub.rs

use std::{collections::HashMap, sync::Mutex};

use super::{FeedContext, FeedError, FeedState, ViolationFeed};

/// Keeps at most one live feed per teacher for this process.
pub struct FeedHub {
    ctx: FeedContext,
    feeds: Mutex<HashMap<i64, ViolationFeed>>,
}

impl FeedHub {
    pub fn new(ctx: FeedContext) -> Self {
        Self {
            ctx,
            feeds: Mutex::new(HashMap::new()),
        }
    }

    fn existing(&self, teacher_id: i64) -> Option<ViolationFeed> {
        let feeds = match self.feeds.lock() {
            Ok(feeds) => feeds,
            Err(poisoned) => poisoned.into_inner(),
        };
        feeds.get(&teacher_id).cloned()
    }

    /// Returns the teacher's live feed, building and initializing one when
    /// none is registered or the registered one has been torn down.
    ///
    /// A history failure is returned alongside the still-subscribed feed so
    /// the caller can show live alerts while reporting the gap.
    pub async fn open(&self, teacher_id: i64) -> Result<(ViolationFeed, Option<FeedError>), FeedError> {
        if let Some(feed) = self.existing(teacher_id) {
            if feed.state() != FeedState::TornDown {
                return Ok((feed, None));
            }
        }

        let feed = ViolationFeed::new(self.ctx.clone());
        let outcome = feed.initialize(teacher_id).await;

        if feed.state() != FeedState::Subscribed {
            return Err(outcome.err().unwrap_or(FeedError::InvalidState(feed.state())));
        }

        // Another request may have registered a feed while this one was loading.
        let winner = {
            let mut feeds = match self.feeds.lock() {
                Ok(feeds) => feeds,
                Err(poisoned) => poisoned.into_inner(),
            };
            match feeds.get(&teacher_id) {
                Some(current) if current.state() != FeedState::TornDown => current.clone(),
                _ => {
                    feeds.insert(teacher_id, feed.clone());
                    feed.clone()
                }
            }
        };

        if !winner.ptr_eq(&feed) {
            feed.teardown();
            return Ok((winner, None));
        }
        Ok((feed, outcome.err()))
    }

    /// Tears down and forgets the teacher's feed. Returns whether one existed.
    pub fn close(&self, teacher_id: i64) -> bool {
        let removed = {
            let mut feeds = match self.feeds.lock() {
                Ok(feeds) => feeds,
                Err(poisoned) => poisoned.into_inner(),
            };
            feeds.remove(&teacher_id)
        };
        match removed {
            Some(feed) => {
                feed.teardown();
                true
            }
            None => false,
        }
    }

    /// Tears down every feed, used on shutdown.
    pub fn close_all(&self) {
        let drained: Vec<ViolationFeed> = {
            let mut feeds = match self.feeds.lock() {
                Ok(feeds) => feeds,
                Err(poisoned) => poisoned.into_inner(),
            };
            feeds.drain().map(|(_, feed)| feed).collect()
        };
        for feed in drained {
            feed.teardown();
        }
    }
}
