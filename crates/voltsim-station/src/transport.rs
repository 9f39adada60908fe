//! Transport sink seam and the pending-call registry.
//!
//! The engine never touches a socket: outbound requests go through
//! [`TransportSink`], and implementations pair CALLRESULTs back to their
//! CALLs with a [`PendingCalls`] registry bounded by the configured call
//! timeout.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use voltsim_types::{Call, CallError, CallResult, OcppError, OcppResult};

/// WebSocket sub-protocol sinks must negotiate with the CSMS.
pub const OCPP_SUBPROTOCOL: &str = "ocpp1.6";

/// Outbound edge of the engine: send a CALL, get the matching CALLRESULT.
#[async_trait]
pub trait TransportSink: Send + Sync {
    async fn send(&self, call: Call) -> OcppResult<CallResult>;
}

/// Registry of calls awaiting their response, keyed by unique id.
///
/// A waiter either resolves when the response arrives, fails with
/// `connection timeout` after the bound elapses, or fails with
/// `connection closed` when the station shuts down.
pub struct PendingCalls {
    waiters: DashMap<String, oneshot::Sender<OcppResult<CallResult>>>,
    timeout: Duration,
}

impl PendingCalls {
    pub fn new(timeout: Duration) -> Self {
        Self { waiters: DashMap::new(), timeout }
    }

    /// Register a call and await its outcome under the timeout bound.
    pub async fn wait_for(&self, call: &Call) -> OcppResult<CallResult> {
        let (sender, receiver) = oneshot::channel();
        self.waiters.insert(call.unique_id.clone(), sender);

        match tokio::time::timeout(self.timeout, receiver).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped without resolving.
            Ok(Err(_)) => Err(OcppError::ConnectionClosed),
            Err(_) => {
                self.waiters.remove(&call.unique_id);
                warn!(unique_id = %call.unique_id, action = %call.action, "call timed out");
                Err(OcppError::Timeout { action: call.action.clone() })
            }
        }
    }

    /// Resolve a waiter with its CALLRESULT. False when no waiter matches.
    pub fn resolve(&self, result: CallResult) -> bool {
        match self.waiters.remove(&result.unique_id) {
            Some((_, sender)) => sender.send(Ok(result)).is_ok(),
            None => {
                debug!(unique_id = %result.unique_id, "dropping response with no pending call");
                false
            }
        }
    }

    /// Resolve a waiter with the CALLERROR the remote side answered.
    pub fn reject(&self, error: CallError) -> bool {
        match self.waiters.remove(&error.unique_id) {
            Some((_, sender)) => sender
                .send(Err(OcppError::CallFailed {
                    code: error.code,
                    description: error.description,
                }))
                .is_ok(),
            None => false,
        }
    }

    /// Fail every pending call; used at station shutdown.
    pub fn close_all(&self) {
        let ids: Vec<String> = self.waiters.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            if let Some((_, sender)) = self.waiters.remove(&id) {
                let _ = sender.send(Err(OcppError::ConnectionClosed));
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.waiters.len()
    }
}

/// In-memory sink with scripted responses, for tests and dry runs.
///
/// Responses are queued per action and served in FIFO order; an action with
/// no scripted response is answered with an empty object, which satisfies
/// the empty-payload responses (`StatusNotification`, `MeterValues`) and
/// lets state-machine tests run without scripting each exchange.
#[derive(Default)]
pub struct ScriptedSink {
    responses:
        std::sync::Mutex<std::collections::HashMap<String, std::collections::VecDeque<serde_json::Value>>>,
    sent: std::sync::Mutex<Vec<Call>>,
}

impl ScriptedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next response payload for an action.
    pub fn push_response(&self, action: &str, payload: serde_json::Value) {
        self.responses
            .lock()
            .expect("sink poisoned")
            .entry(action.to_string())
            .or_default()
            .push_back(payload);
    }

    /// Every call sent so far, in order.
    pub fn sent(&self) -> Vec<Call> {
        self.sent.lock().expect("sink poisoned").clone()
    }

    /// Calls sent for one action, in order.
    pub fn sent_for(&self, action: &str) -> Vec<Call> {
        self.sent().into_iter().filter(|call| call.action == action).collect()
    }
}

#[async_trait]
impl TransportSink for ScriptedSink {
    async fn send(&self, call: Call) -> OcppResult<CallResult> {
        let payload = self
            .responses
            .lock()
            .expect("sink poisoned")
            .get_mut(&call.action)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
        let unique_id = call.unique_id.clone();
        self.sent.lock().expect("sink poisoned").push(call);
        CallResult::new(unique_id, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use voltsim_types::CallErrorCode;

    fn call(action: &str) -> Call {
        Call::new(action, json!({})).unwrap()
    }

    #[tokio::test]
    async fn resolved_call_returns_its_result() {
        let pending = std::sync::Arc::new(PendingCalls::new(Duration::from_secs(5)));
        let outgoing = call("Heartbeat");
        let unique_id = outgoing.unique_id.clone();

        let waiter = {
            let pending = pending.clone();
            tokio::spawn(async move { pending.wait_for(&outgoing).await })
        };
        tokio::task::yield_now().await;

        let resolved = pending.resolve(
            CallResult::new(unique_id, json!({"currentTime": "2025-06-01T12:00:00Z"})).unwrap(),
        );
        assert!(resolved);

        let result = waiter.await.unwrap().unwrap();
        assert_eq!(result.payload["currentTime"], "2025-06-01T12:00:00Z");
        assert_eq!(pending.pending(), 0);
    }

    #[tokio::test]
    async fn timed_out_call_reports_connection_timeout() {
        let pending = PendingCalls::new(Duration::from_millis(20));
        let outgoing = call("MeterValues");

        let outcome = pending.wait_for(&outgoing).await;
        match outcome {
            Err(OcppError::Timeout { action }) => assert_eq!(action, "MeterValues"),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(pending.pending(), 0);
    }

    #[tokio::test]
    async fn shutdown_fails_pending_calls_with_connection_closed() {
        let pending = std::sync::Arc::new(PendingCalls::new(Duration::from_secs(60)));
        let outgoing = call("StartTransaction");

        let waiter = {
            let pending = pending.clone();
            tokio::spawn(async move { pending.wait_for(&outgoing).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(pending.pending(), 1);

        pending.close_all();
        match waiter.await.unwrap() {
            Err(OcppError::ConnectionClosed) => {}
            other => panic!("expected connection closed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn call_error_rejects_the_waiter() {
        let pending = std::sync::Arc::new(PendingCalls::new(Duration::from_secs(60)));
        let outgoing = call("Authorize");
        let unique_id = outgoing.unique_id.clone();

        let waiter = {
            let pending = pending.clone();
            tokio::spawn(async move { pending.wait_for(&outgoing).await })
        };
        tokio::task::yield_now().await;

        pending.reject(CallError::new(unique_id, CallErrorCode::InternalError, "boom"));
        match waiter.await.unwrap() {
            Err(OcppError::CallFailed { code, .. }) => {
                assert_eq!(code, CallErrorCode::InternalError)
            }
            other => panic!("expected call failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn scripted_sink_serves_responses_per_action() {
        let sink = ScriptedSink::new();
        sink.push_response("A", json!({"first": true}));
        sink.push_response("A", json!({"second": true}));

        let a1 = sink.send(call("A")).await.unwrap();
        let b = sink.send(call("B")).await.unwrap();
        let a2 = sink.send(call("A")).await.unwrap();

        assert_eq!(a1.payload["first"], true);
        assert_eq!(b.payload, json!({}));
        assert_eq!(a2.payload["second"], true);
        assert_eq!(sink.sent().len(), 3);
        assert_eq!(sink.sent_for("A").len(), 2);
    }
}
