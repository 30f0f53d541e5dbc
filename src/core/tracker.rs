//! Call outcome tracker.
//!
//! Correlates a call id with whoever is waiting for that call's transcript.
//! One tracker is created per process and shared by `Arc` between the
//! bridges (which complete calls) and the API handlers (which wait on them).
//!
//! Each wait is a single-resolution handle: exactly one of completion,
//! timeout or supersession ends it, and its registry entry is removed on
//! every exit path, including the waiting future being dropped.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::core::call_state::ConversationMessage;

/// Default time a caller waits for a call to finish.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(300_000);

/// Errors surfaced to a waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// No completion arrived in time; the call itself carries on
    #[error("Call {call_sid} timed out after {timeout_ms}ms")]
    Timeout { call_sid: String, timeout_ms: u64 },

    /// A newer wait for the same call replaced this one
    #[error("Wait for call {call_sid} was superseded by a newer request")]
    Superseded { call_sid: String },
}

/// The most recently completed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
    pub call_sid: String,
    pub transcript: Vec<ConversationMessage>,
}

struct Pending {
    token: u64,
    tx: oneshot::Sender<Vec<ConversationMessage>>,
}

/// Registry of pending call waits plus the last-result slot.
#[derive(Default)]
pub struct CallTracker {
    pending: DashMap<String, Pending>,
    next_token: AtomicU64,
    last_result: Mutex<Option<CallResult>>,
}

impl CallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wait for `call_sid` and return the future that resolves it.
    ///
    /// The registration happens immediately, so a completion that races ahead
    /// of the first poll is still delivered. A second wait for the same id
    /// replaces the first, which then fails with [`TrackerError::Superseded`].
    pub fn wait_for_call(
        self: &Arc<Self>,
        call_sid: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<ConversationMessage>, TrackerError>> + Send + use<> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        if self
            .pending
            .insert(call_sid.to_string(), Pending { token, tx })
            .is_some()
        {
            tracing::warn!(call_sid, "Superseding earlier wait for call");
        }

        let guard = PendingGuard {
            tracker: Arc::clone(self),
            call_sid: call_sid.to_string(),
            token,
        };

        async move {
            let guard = guard;
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(transcript)) => Ok(transcript),
                Ok(Err(_)) => Err(TrackerError::Superseded {
                    call_sid: guard.call_sid.clone(),
                }),
                Err(_) => {
                    tracing::warn!(call_sid = %guard.call_sid, "Timed out waiting for call");
                    Err(TrackerError::Timeout {
                        call_sid: guard.call_sid.clone(),
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    })
                }
            }
        }
    }

    /// Record a finished call and wake its waiter, if any.
    pub fn complete_call(&self, call_sid: &str, transcript: Vec<ConversationMessage>) {
        *self.last_result.lock() = Some(CallResult {
            call_sid: call_sid.to_string(),
            transcript: transcript.clone(),
        });

        match self.pending.remove(call_sid) {
            Some((_, pending)) => {
                if pending.tx.send(transcript).is_err() {
                    tracing::debug!(call_sid, "Waiter went away before completion");
                } else {
                    tracing::info!(call_sid, "Call completed, waiter resolved");
                }
            }
            None => tracing::debug!(call_sid, "Call completed with no pending waiter"),
        }
    }

    pub fn last_result(&self) -> Option<CallResult> {
        self.last_result.lock().clone()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, call_sid: &str) -> bool {
        self.pending.contains_key(call_sid)
    }
}

impl std::fmt::Debug for CallTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallTracker")
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Removes a wait's own registry entry when the wait ends.
struct PendingGuard {
    tracker: Arc<CallTracker>,
    call_sid: String,
    token: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.tracker
            .pending
            .remove_if(&self.call_sid, |_, pending| pending.token == self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript() -> Vec<ConversationMessage> {
        vec![
            ConversationMessage::assistant("Hi, I'd like to book a table."),
            ConversationMessage::user("Sure, for how many?"),
        ]
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let tracker = Arc::new(CallTracker::new());
        let err = tracker
            .wait_for_call("CA1", Duration::from_millis(50))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            TrackerError::Timeout {
                call_sid: "CA1".to_string(),
                timeout_ms: 50
            }
        );
        assert_eq!(err.to_string(), "Call CA1 timed out after 50ms");
        assert_eq!(tracker.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_completion_before_timeout_resolves() {
        let tracker = Arc::new(CallTracker::new());
        let wait = tracker.wait_for_call("CA1", Duration::from_millis(50));

        let completer = tracker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            completer.complete_call("CA1", transcript());
        });

        assert_eq!(wait.await.unwrap(), transcript());
        assert_eq!(tracker.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_completion_racing_first_poll_is_delivered() {
        let tracker = Arc::new(CallTracker::new());
        let wait = tracker.wait_for_call("CA1", Duration::from_secs(1));
        tracker.complete_call("CA1", transcript());
        assert_eq!(wait.await.unwrap(), transcript());
    }

    #[tokio::test]
    async fn test_complete_without_waiter_keeps_last_result() {
        let tracker = CallTracker::new();
        assert!(tracker.last_result().is_none());

        tracker.complete_call("CA9", transcript());

        let last = tracker.last_result().unwrap();
        assert_eq!(last.call_sid, "CA9");
        assert_eq!(last.transcript, transcript());
    }

    #[tokio::test]
    async fn test_last_result_is_overwritten() {
        let tracker = CallTracker::new();
        tracker.complete_call("CA1", transcript());
        tracker.complete_call("CA2", Vec::new());

        let last = tracker.last_result().unwrap();
        assert_eq!(last.call_sid, "CA2");
        assert!(last.transcript.is_empty());
    }

    #[tokio::test]
    async fn test_independent_calls() {
        let tracker = Arc::new(CallTracker::new());
        let first = tracker.wait_for_call("CA1", Duration::from_secs(1));
        let second = tracker.wait_for_call("CA2", Duration::from_millis(100));

        tracker.complete_call("CA1", transcript());
        assert_eq!(first.await.unwrap(), transcript());
        assert!(tracker.is_pending("CA2"));

        assert!(matches!(
            second.await,
            Err(TrackerError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_wait_supersedes_earlier() {
        let tracker = Arc::new(CallTracker::new());
        let first = tracker.wait_for_call("CA1", Duration::from_secs(1));
        let second = tracker.wait_for_call("CA1", Duration::from_secs(1));

        assert_eq!(
            first.await,
            Err(TrackerError::Superseded {
                call_sid: "CA1".to_string()
            })
        );
        // The superseded waiter must not remove the newer registration.
        assert!(tracker.is_pending("CA1"));

        tracker.complete_call("CA1", transcript());
        assert_eq!(second.await.unwrap(), transcript());
    }

    #[tokio::test]
    async fn test_dropped_wait_unregisters() {
        let tracker = Arc::new(CallTracker::new());
        let wait = tracker.wait_for_call("CA1", Duration::from_secs(1));
        assert!(tracker.is_pending("CA1"));

        drop(wait);
        assert!(!tracker.is_pending("CA1"));

        tracker.complete_call("CA1", transcript());
        assert_eq!(tracker.last_result().unwrap().call_sid, "CA1");
    }
}
