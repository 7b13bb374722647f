//! # Pending RPC Calls
//!
//! `correlation_id -> {completion, deadline timer}`. Two producers race to
//! retire an entry: the response handler and the deadline timer. Both go
//! through [`PendingCalls::complete`], which removes the entry atomically,
//! so exactly one of them resolves the caller and the other is a no-op.

use crate::error::RequestError;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

pub type CallResult = Result<Value, RequestError>;

struct PendingCall {
    completion: oneshot::Sender<CallResult>,
    timer: Option<AbortHandle>,
}

pub struct PendingCalls {
    calls: DashMap<String, PendingCall>,
    timeout: Duration,
}

impl PendingCalls {
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: DashMap::new(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Track `correlation_id` and arm its deadline
    ///
    /// `request` is the wire form of the call, echoed in the timeout error.
    pub fn register(self: &Arc<Self>, correlation_id: &str, request: Value) -> oneshot::Receiver<CallResult> {
        let (completion, receiver) = oneshot::channel();
        self.calls.insert(
            correlation_id.to_string(),
            PendingCall {
                completion,
                timer: None,
            },
        );

        let table: Weak<Self> = Arc::downgrade(self);
        let id = correlation_id.to_string();
        let timeout = self.timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(table) = table.upgrade() {
                let error = RequestError::Response {
                    status: 408,
                    data: json!({
                        "status": 408,
                        "message": "Request timed out",
                        "request": request,
                    }),
                };
                if table.complete(&id, Err(error)) {
                    warn!(correlation_id = %id, timeout_ms = timeout.as_millis() as u64, "RPC request timed out");
                }
            }
        })
        .abort_handle();

        match self.calls.get_mut(correlation_id) {
            Some(mut entry) => entry.timer = Some(timer),
            // Already answered
            None => timer.abort(),
        }
        receiver
    }

    /// Resolve `correlation_id` with `result`; false when it is no longer pending
    pub fn complete(&self, correlation_id: &str, result: CallResult) -> bool {
        match self.calls.remove(correlation_id) {
            Some((_, call)) => {
                if let Some(timer) = call.timer {
                    timer.abort();
                }
                if call.completion.send(result).is_err() {
                    debug!(correlation_id, "RPC caller went away before completion");
                }
                true
            }
            None => {
                debug!(correlation_id, "Ignored response for unknown or expired call");
                false
            }
        }
    }

    /// Forget `correlation_id` without resolving it
    pub fn cancel(&self, correlation_id: &str) {
        if let Some((_, call)) = self.calls.remove(correlation_id) {
            if let Some(timer) = call.timer {
                timer.abort();
            }
        }
    }

    /// Fail every pending call with an error built by `error`
    pub fn fail_all(&self, error: impl Fn() -> RequestError) -> usize {
        let ids: Vec<String> = self.calls.iter().map(|entry| entry.key().clone()).collect();
        ids.iter().filter(|id| self.complete(id, Err(error()))).count()
    }

    pub fn contains(&self, correlation_id: &str) -> bool {
        self.calls.contains_key(correlation_id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_response_wins_over_timer() {
        let pending = PendingCalls::new(Duration::from_secs(5));
        let receiver = pending.register("c-1", json!({}));

        assert!(pending.complete("c-1", Ok(json!({"id": "0"}))));
        assert_eq!(receiver.await.unwrap().unwrap(), json!({"id": "0"}));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(pending.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_wins_and_late_response_is_ignored() {
        let pending = PendingCalls::new(Duration::from_secs(5));
        let receiver = pending.register("c-2", json!({"name": "RPCRequestEvent"}));

        let err = receiver.await.unwrap().unwrap_err();
        match err {
            RequestError::Response { status, data } => {
                assert_eq!(status, 408);
                assert_eq!(data["status"], 408);
                assert_eq!(data["message"], "Request timed out");
                assert_eq!(data["request"]["name"], "RPCRequestEvent");
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(!pending.contains("c-2"));
        assert!(!pending.complete("c-2", Ok(json!(null))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_all() {
        let pending = PendingCalls::new(Duration::from_secs(5));
        let first = pending.register("a", json!({}));
        let second = pending.register("b", json!({}));

        let failed = pending.fail_all(|| RequestError::network("shutting down"));

        assert_eq!(failed, 2);
        assert!(first.await.unwrap().is_err());
        assert!(second.await.unwrap().is_err());
        assert!(pending.is_empty());
    }
}
