//! Test utilities and shared test helpers for herald.
//!
//! This module provides an in-memory recording [`Destination`] and history
//! fixtures used by unit and integration tests across the workspace. It is
//! compiled for this crate's own tests and exported behind the `testing`
//! feature for downstream crates.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;

use crate::announcement::Announcement;
use crate::destination::{
    Destination, MessageId, MessageSnapshot, ParticipantId, SentMessageHandle,
};
use crate::error::TransportError;
use crate::message::Message;
use crate::scheduler::{ScheduleId, ScheduledSend};

/// Initialize test logging once per test run.
static INIT: Once = Once::new();

/// Initialize logging for tests with a sensible default configuration.
/// Safe to call multiple times; only initializes once.
#[cfg(feature = "testing")]
pub fn init_test_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        fmt().with_test_writer().with_env_filter(filter).init();
    });
}

/// No-op version when the `testing` feature (and with it
/// tracing-subscriber) is not enabled.
#[cfg(not(feature = "testing"))]
pub fn init_test_logging() {
    INIT.call_once(|| {});
}

/// Build a [`MessageSnapshot`] authored `age` ago by the given participant.
pub fn snapshot(author: u64, age: Duration, has_image: bool) -> MessageSnapshot {
    MessageSnapshot {
        author_id: ParticipantId(author),
        sent_at: Utc::now() - chrono::Duration::from_std(age).expect("age out of range"),
        has_image_attachment: has_image,
    }
}

/// Build a [`ScheduledSend`] over a trivial announcement, for exercising
/// predicates directly without going through a scheduler.
pub fn scheduled_send(destination: std::sync::Arc<TestDestination>) -> ScheduledSend {
    let announcement = Announcement::with_content("test announcement");
    let message = announcement.build().expect("test announcement must build");
    ScheduledSend::new(
        ScheduleId::new_v4(),
        announcement,
        message,
        destination,
        Vec::new(),
    )
}

/// An in-memory [`Destination`] that records deliveries and can be told to
/// fail any of its operations.
///
/// History is held newest first, matching the trait contract. All state is
/// behind plain mutexes; the critical sections never await, so the type is
/// safe to share across concurrently firing schedules.
#[derive(Debug, Default)]
pub struct TestDestination {
    history: Mutex<Vec<MessageSnapshot>>,
    sent: Mutex<Vec<Message>>,
    pinned: Mutex<Vec<MessageId>>,
    fail_history: AtomicBool,
    fail_send: AtomicBool,
    fail_pin: AtomicBool,
    send_attempts: AtomicUsize,
    next_message_id: AtomicU64,
}

impl TestDestination {
    /// Create an empty destination.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a destination seeded with history, newest first.
    pub fn with_history(history: Vec<MessageSnapshot>) -> Self {
        Self {
            history: Mutex::new(history),
            ..Self::default()
        }
    }

    /// Prepend a snapshot as the newest message.
    pub fn push_history(&self, snapshot: MessageSnapshot) {
        self.history.lock().unwrap().insert(0, snapshot);
    }

    /// Make history fetches fail with a transport error.
    pub fn fail_history(&self, fail: bool) {
        self.fail_history.store(fail, Ordering::SeqCst);
    }

    /// Make sends fail with a transport error.
    pub fn fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    /// Make pins fail with a transport error.
    pub fn fail_pin(&self, fail: bool) {
        self.fail_pin.store(fail, Ordering::SeqCst);
    }

    /// Messages delivered so far, in delivery order.
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    /// Ids of messages pinned so far.
    pub fn pinned(&self) -> Vec<MessageId> {
        self.pinned.lock().unwrap().clone()
    }

    /// How many times `send` was attempted, including failures.
    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Destination for TestDestination {
    async fn recent_messages(&self, count: usize) -> Result<Vec<MessageSnapshot>, TransportError> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(TransportError::Api("history fetch refused (test)".into()));
        }
        let history = self.history.lock().unwrap();
        Ok(history.iter().take(count).cloned().collect())
    }

    async fn send(&self, message: &Message) -> Result<SentMessageHandle, TransportError> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(TransportError::Api("send refused (test)".into()));
        }
        self.sent.lock().unwrap().push(message.clone());
        let id = self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SentMessageHandle {
            message_id: MessageId(id),
        })
    }

    async fn pin(&self, handle: &SentMessageHandle) -> Result<(), TransportError> {
        if self.fail_pin.load(Ordering::SeqCst) {
            return Err(TransportError::Api("pin refused (test)".into()));
        }
        self.pinned.lock().unwrap().push(handle.message_id);
        Ok(())
    }
}
