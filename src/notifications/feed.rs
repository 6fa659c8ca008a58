// src/notifications/feed.rs

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{EventSink, FeedContext, FeedError, PersistenceError, SubscriptionHandle, ViolationChannel};
use crate::{
    models::violation::{Violation, ViolationEvent},
    repository::RepositoryError,
};

/// Lifecycle of a feed instance. A feed never goes back to `Loading`; once
/// `TornDown` it stays dead and a new feed must be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedState {
    Uninitialized,
    Loading,
    Subscribed,
    TornDown,
}

#[derive(Debug)]
struct FeedInner {
    teacher_id: Option<i64>,
    state: FeedState,
    /// Newest first.
    visible: Vec<Violation>,
    dismissed: HashSet<String>,
    /// Whether the stored dismissals and history have been merged in.
    merged: bool,
    /// Set by dismissals made before `merged`.
    pending_persist: bool,
    handle: Option<SubscriptionHandle>,
}

struct Shared {
    inner: Mutex<FeedInner>,
    snapshots: watch::Sender<Vec<Violation>>,
    /// Serializes writes so the last write always carries every dismissal.
    persist_lock: tokio::sync::Mutex<()>,
    channel: Arc<dyn ViolationChannel>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, FeedInner> {
        match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn publish(&self, visible: &[Violation]) {
        self.snapshots.send_replace(visible.to_vec());
    }

    fn apply_live(&self, event: ViolationEvent, now: DateTime<Utc>) -> bool {
        let mut inner = self.lock();

        let Some(teacher_id) = inner.teacher_id else {
            return false;
        };
        if !matches!(inner.state, FeedState::Loading | FeedState::Subscribed) {
            return false;
        }
        if event.teacher_id != teacher_id {
            warn!(
                teacher_id,
                event_teacher_id = event.teacher_id,
                "Discarded violation scoped to another teacher"
            );
            return false;
        }

        let lag_ms = (now - event.timestamp).num_milliseconds();
        let violation = event.into_violation();

        if inner.dismissed.contains(&violation.id) {
            debug!(teacher_id, id = %violation.id, "Dropped dismissed violation");
            return false;
        }
        if inner.visible.iter().any(|v| v.id == violation.id) {
            debug!(teacher_id, id = %violation.id, "Dropped duplicate violation");
            return false;
        }

        info!(
            teacher_id,
            id = %violation.id,
            kind = %violation.violation_type,
            lag_ms,
            "Violation received"
        );
        inner.visible.insert(0, violation);
        sort_newest_first(&mut inner.visible);
        self.publish(&inner.visible);
        true
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let handle = match self.inner.get_mut() {
            Ok(inner) => inner.handle.take(),
            Err(poisoned) => poisoned.into_inner().handle.take(),
        };
        if let Some(handle) = handle {
            self.channel.unsubscribe(handle);
            debug!(%handle, "Released subscription of dropped feed");
        }
    }
}

/// One teacher's live list of violations.
///
/// Cloning yields another handle to the same feed. Dropping the last handle
/// releases the channel subscription.
#[derive(Clone)]
pub struct ViolationFeed {
    ctx: FeedContext,
    shared: Arc<Shared>,
}

impl ViolationFeed {
    pub fn new(ctx: FeedContext) -> Self {
        let (snapshots, _) = watch::channel(Vec::new());
        let shared = Arc::new(Shared {
            inner: Mutex::new(FeedInner {
                teacher_id: None,
                state: FeedState::Uninitialized,
                visible: Vec::new(),
                dismissed: HashSet::new(),
                merged: false,
                pending_persist: false,
                handle: None,
            }),
            snapshots,
            persist_lock: tokio::sync::Mutex::new(()),
            channel: ctx.channel.clone(),
        });
        Self { ctx, shared }
    }

    /// Loads dismissals and history for `teacher_id`, then subscribes to the
    /// live channel.
    ///
    /// A failed history query still leaves the feed subscribed; the error is
    /// returned afterwards. A failed subscription leaves the feed `TornDown`.
    pub async fn initialize(&self, teacher_id: i64) -> Result<(), FeedError> {
        {
            let mut inner = self.shared.lock();
            if inner.state != FeedState::Uninitialized {
                return Err(FeedError::InvalidState(inner.state));
            }
            inner.state = FeedState::Loading;
            inner.teacher_id = Some(teacher_id);
        }
        info!(teacher_id, "Initializing violation feed");

        let stored = match self.ctx.dismissals.get(teacher_id).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(teacher_id, "Dismissals unavailable, showing everything: {}", e);
                HashSet::new()
            }
        };

        let history = self.load_history(teacher_id).await;

        let persist_now = {
            let mut inner = self.shared.lock();
            if inner.state == FeedState::TornDown {
                debug!(teacher_id, "Feed torn down while loading");
                return Err(FeedError::InvalidState(FeedState::TornDown));
            }

            inner.dismissed.extend(stored);
            if let Ok(rows) = &history {
                let FeedInner {
                    visible, dismissed, ..
                } = &mut *inner;
                let mut seen: HashSet<String> = visible.iter().map(|v| v.id.clone()).collect();
                for row in rows {
                    if dismissed.contains(&row.id) || !seen.insert(row.id.clone()) {
                        continue;
                    }
                    visible.push(row.clone());
                }
                sort_newest_first(visible);
            }
            inner.merged = true;
            self.shared.publish(&inner.visible);
            std::mem::take(&mut inner.pending_persist)
        };

        if persist_now {
            if let Err(e) = self.persist(teacher_id).await {
                warn!(teacher_id, "Failed to persist early dismissals: {}", e);
            }
        }

        let handle = match self.ctx.channel.subscribe(teacher_id, self.sink()).await {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.lock().state = FeedState::TornDown;
                if let Err(history_err) = &history {
                    warn!(teacher_id, "History also failed: {}", history_err);
                }
                warn!(teacher_id, "Live subscription failed: {}", e);
                return Err(FeedError::Subscription(e));
            }
        };

        {
            let mut inner = self.shared.lock();
            if inner.state == FeedState::TornDown {
                drop(inner);
                self.ctx.channel.unsubscribe(handle);
                debug!(teacher_id, %handle, "Released subscription finished after teardown");
                return Err(FeedError::InvalidState(FeedState::TornDown));
            }
            inner.handle = Some(handle);
            inner.state = FeedState::Subscribed;
            info!(
                teacher_id,
                %handle,
                visible = inner.visible.len(),
                "Violation feed subscribed"
            );
        }

        history.map(|_| ()).map_err(FeedError::from)
    }

    async fn load_history(&self, teacher_id: i64) -> Result<Vec<Violation>, RepositoryError> {
        let quiz_ids = self.ctx.quizzes.list_owned_quiz_ids(teacher_id).await?;
        let rows = self.ctx.violations.list_violations(&quiz_ids).await?;
        // Rows outside the teacher's scope never enter the list.
        Ok(rows.into_iter().filter(|v| v.teacher_id == teacher_id).collect())
    }

    fn sink(&self) -> EventSink {
        let shared = Arc::downgrade(&self.shared);
        let clock = self.ctx.clock.clone();
        Arc::new(move |event: ViolationEvent| {
            if let Some(shared) = shared.upgrade() {
                shared.apply_live(event, clock.now());
            }
        })
    }

    /// Applies one delivered event. Returns whether it became visible.
    pub fn on_live_event(&self, event: ViolationEvent) -> bool {
        self.shared.apply_live(event, self.ctx.clock.now())
    }

    /// Hides a visible violation and persists the dismissal.
    ///
    /// Returns `Ok(false)` when the id is not currently visible (already
    /// dismissed or unknown) or the feed is not live. Before the stored set
    /// has been merged the write is left to `initialize`. When the write fails
    /// the violation stays hidden in this feed but will show again after a
    /// fresh initialize.
    pub async fn dismiss(&self, violation_id: &str) -> Result<bool, PersistenceError> {
        let teacher_id = {
            let mut inner = self.shared.lock();
            let Some(teacher_id) = inner.teacher_id else {
                return Ok(false);
            };
            if matches!(inner.state, FeedState::Uninitialized | FeedState::TornDown) {
                return Ok(false);
            }
            let Some(pos) = inner.visible.iter().position(|v| v.id == violation_id) else {
                debug!(teacher_id, id = violation_id, "Ignored dismissal of unknown violation");
                return Ok(false);
            };

            inner.visible.remove(pos);
            inner.dismissed.insert(violation_id.to_string());
            self.shared.publish(&inner.visible);

            if !inner.merged {
                inner.pending_persist = true;
                return Ok(true);
            }
            teacher_id
        };

        info!(teacher_id, id = violation_id, "Violation dismissed");
        self.persist(teacher_id).await.inspect_err(|e| {
            warn!(teacher_id, id = violation_id, "Failed to persist dismissal: {}", e)
        })?;
        Ok(true)
    }

    async fn persist(&self, teacher_id: i64) -> Result<(), PersistenceError> {
        let _guard = self.shared.persist_lock.lock().await;
        let dismissed = self.shared.lock().dismissed.clone();
        self.ctx.dismissals.set(teacher_id, &dismissed).await
    }

    /// Releases the live subscription. Safe to call repeatedly and at any point,
    /// including while `initialize` is still running.
    pub fn teardown(&self) {
        let (teacher_id, handle) = {
            let mut inner = self.shared.lock();
            if inner.state == FeedState::TornDown {
                return;
            }
            inner.state = FeedState::TornDown;
            (inner.teacher_id, inner.handle.take())
        };
        if let Some(handle) = handle {
            self.ctx.channel.unsubscribe(handle);
        }
        info!(?teacher_id, "Violation feed torn down");
    }

    pub fn visible(&self) -> Vec<Violation> {
        self.shared.lock().visible.clone()
    }

    pub fn state(&self) -> FeedState {
        self.shared.lock().state
    }

    /// Whether both handles point at the same feed.
    pub fn ptr_eq(&self, other: &ViolationFeed) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Receives the visible list again after every change.
    pub fn watch(&self) -> watch::Receiver<Vec<Violation>> {
        self.shared.snapshots.subscribe()
    }
}

fn sort_newest_first(list: &mut [Violation]) {
    list.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
}
