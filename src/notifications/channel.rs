// src/notifications/channel.rs

//! Publish/subscribe transport for `violation_occurred` events.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, RwLock, RwLockReadGuard,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::violation::ViolationEvent;

/// Callback a subscriber registers; invoked once per delivered event.
pub type EventSink = Arc<dyn Fn(ViolationEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("channel closed")]
    Closed,

    #[error("subscription rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("invalid violation payload: {0}")]
    InvalidPayload(String),
}

#[async_trait]
pub trait ViolationChannel: Send + Sync {
    /// Registers `sink` for events scoped to `teacher_id`.
    async fn subscribe(
        &self,
        teacher_id: i64,
        sink: EventSink,
    ) -> Result<SubscriptionHandle, SubscriptionError>;

    /// Releases a subscription. Unknown or already released handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}

/// In-process channel shared by every teacher's feed.
///
/// Delivery is at-most-once per publish and only to subscribers whose teacher
/// id matches the event; other tenants never see the event at all.
#[derive(Default)]
pub struct InMemoryViolationChannel {
    subscribers: RwLock<HashMap<SubscriptionHandle, (i64, EventSink)>>,
    next_handle: AtomicU64,
    closed: AtomicBool,
}

impl InMemoryViolationChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `event` to every subscriber of its teacher.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, event: ViolationEvent) -> usize {
        // Sinks are cloned out so none runs while the registry is locked.
        let sinks: Vec<EventSink> = self
            .read_subscribers()
            .values()
            .filter(|(teacher_id, _)| *teacher_id == event.teacher_id)
            .map(|(_, sink)| sink.clone())
            .collect();

        if sinks.is_empty() {
            debug!(teacher_id = event.teacher_id, "Event dropped (no subscribers)");
            return 0;
        }

        for sink in &sinks {
            sink(event.clone());
        }
        sinks.len()
    }

    /// Parses a raw JSON payload and publishes it.
    ///
    /// Payloads with an unknown `violation_type` are rejected here rather than
    /// forwarded.
    pub fn publish_json(&self, raw: &str) -> Result<usize, ChannelError> {
        let event: ViolationEvent = serde_json::from_str(raw).map_err(|e| {
            warn!("Rejected violation payload: {}", e);
            ChannelError::InvalidPayload(e.to_string())
        })?;
        Ok(self.publish(event))
    }

    pub fn subscriber_count(&self) -> usize {
        self.read_subscribers().len()
    }

    fn read_subscribers(&self) -> RwLockReadGuard<'_, HashMap<SubscriptionHandle, (i64, EventSink)>> {
        match self.subscribers.read() {
            Ok(subs) => subs,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Stops accepting subscriptions and drops every registered sink.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        if let Ok(mut subs) = self.subscribers.write() {
            subs.clear();
        }
    }
}

#[async_trait]
impl ViolationChannel for InMemoryViolationChannel {
    async fn subscribe(
        &self,
        teacher_id: i64,
        sink: EventSink,
    ) -> Result<SubscriptionHandle, SubscriptionError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(SubscriptionError::Closed);
        }

        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        let mut subs = self
            .subscribers
            .write()
            .map_err(|_| SubscriptionError::Rejected("subscriber registry poisoned".to_string()))?;
        subs.insert(handle, (teacher_id, sink));

        debug!(teacher_id, %handle, "New subscription created");
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        let removed = match self.subscribers.write() {
            Ok(mut subs) => subs.remove(&handle).is_some(),
            Err(poisoned) => poisoned.into_inner().remove(&handle).is_some(),
        };
        if removed {
            debug!(%handle, "Subscription dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::violation::ViolationType;
    use std::sync::Mutex;

    fn event(teacher_id: i64) -> ViolationEvent {
        ViolationEvent {
            id: None,
            teacher_id,
            quiz_id: None,
            student_name: "Kim".to_string(),
            quiz_title: "Chemistry".to_string(),
            violation_type: ViolationType::FullscreenExit,
            timestamp: chrono::Utc::now(),
        }
    }

    fn recorder() -> (EventSink, Arc<Mutex<Vec<ViolationEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: EventSink = Arc::new(move |e: ViolationEvent| sink_seen.lock().unwrap().push(e));
        (sink, seen)
    }

    #[tokio::test]
    async fn test_publish_only_reaches_matching_teacher() {
        let channel = InMemoryViolationChannel::new();
        let (sink_a, seen_a) = recorder();
        let (sink_b, seen_b) = recorder();
        channel.subscribe(1, sink_a).await.unwrap();
        channel.subscribe(2, sink_b).await.unwrap();

        assert_eq!(channel.publish(event(1)), 1);
        assert_eq!(seen_a.lock().unwrap().len(), 1);
        assert!(seen_b.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let channel = InMemoryViolationChannel::new();
        let (sink, seen) = recorder();
        let handle = channel.subscribe(1, sink).await.unwrap();
        assert_eq!(channel.subscriber_count(), 1);

        channel.unsubscribe(handle);
        channel.unsubscribe(handle);
        assert_eq!(channel.subscriber_count(), 0);

        assert_eq!(channel.publish(event(1)), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_json_rejects_unknown_type() {
        let channel = InMemoryViolationChannel::new();
        let (sink, seen) = recorder();
        channel.subscribe(4, sink).await.unwrap();

        let bad = r#"{"teacher_id":4,"student_name":"a","quiz_title":"b","violation_type":"copy_paste","timestamp":"2026-01-01T00:00:00Z"}"#;
        assert!(matches!(
            channel.publish_json(bad),
            Err(ChannelError::InvalidPayload(_))
        ));

        let good = r#"{"teacher_id":4,"student_name":"a","quiz_title":"b","violation_type":"other","timestamp":"2026-01-01T00:00:00Z"}"#;
        assert_eq!(channel.publish_json(good), Ok(1));
        assert_eq!(seen.lock().unwrap()[0].violation_type, ViolationType::Other);
    }

    #[tokio::test]
    async fn test_closed_channel_rejects_subscribers() {
        let channel = InMemoryViolationChannel::new();
        channel.close();
        let (sink, _) = recorder();
        assert_eq!(
            channel.subscribe(1, sink).await,
            Err(SubscriptionError::Closed)
        );
    }
}
