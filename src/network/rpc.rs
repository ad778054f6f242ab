//! Async RPC shim: the exactly-once callback layer sitting below the
//! scheduler and query-worker dispatch.
//!
//! Grounded on the original `scheduler.c` send/callback pairing
//! (`SSchCallbackParam`, `schBuildAndSendMsg`, `schAsyncSendMsg`,
//! `schHandleCallback`): every outbound request registers a `SendInfo`
//! (callback + opaque param + request id + message type) keyed by
//! `(query_id, task_id, msg_type)`. Exactly one response — success, failure,
//! or timeout — consumes and removes that entry.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::time::timeout;

use crate::error::DbError;
use crate::Result;

/// Wire message types exchanged between the scheduler/query-worker layer and
/// remote vnodes, per SPEC_FULL.md §6.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum TaskMsgType {
    Query = 1,
    QueryRsp = 2,
    Ready = 3,
    ReadyRsp = 4,
    Fetch = 5,
    FetchRsp = 6,
    DropTask = 7,
    DropTaskRsp = 8,
}

impl TaskMsgType {
    /// The response type expected to follow a successful request of this
    /// type, mirroring the `rsp type == last_sent_type + 1` rule from
    /// `query_worker::dispatch`.
    pub fn expected_response(self) -> TaskMsgType {
        use TaskMsgType::*;
        match self {
            Query => QueryRsp,
            Ready => ReadyRsp,
            Fetch => FetchRsp,
            DropTask => DropTaskRsp,
            other => other,
        }
    }
}

/// Key identifying one in-flight request awaiting exactly one callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RpcKey {
    pub query_id: u64,
    pub task_id: u64,
    pub msg_type: TaskMsgType,
}

/// The outcome handed to a registered callback. `code` carries the
/// remote-reported status; `Timeout`/`Cancelled` are locally synthesized
/// outcomes that never touched the wire.
#[derive(Debug)]
pub enum RpcOutcome {
    Response { code: i32, payload: Vec<u8> },
    Timeout,
    Cancelled,
}

impl fmt::Display for RpcOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcOutcome::Response { code, payload } => {
                write!(f, "Response(code={code}, {} bytes)", payload.len())
            }
            RpcOutcome::Timeout => write!(f, "Timeout"),
            RpcOutcome::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// A registered in-flight send: the transport-agnostic equivalent of the
/// original's `SSendInfo` (fp + param + requestId). The `oneshot::Sender`
/// stands in for the original's function-pointer callback; exactly one
/// `send` call against it is permitted, enforced by `oneshot` itself.
struct SendInfo {
    reply: oneshot::Sender<RpcOutcome>,
}

/// Registry of in-flight RPCs, pairing each outbound request to its
/// eventual callback. One `RpcShim` is shared per executor task / scheduler
/// job (see DESIGN.md Open Question on exchange-operator pooling — shared,
/// not per-source).
#[derive(Clone, Default)]
pub struct RpcShim {
    inflight: Arc<DashMap<RpcKey, SendInfo>>,
}

impl RpcShim {
    pub fn new() -> Self {
        Self { inflight: Arc::new(DashMap::new()) }
    }

    /// Register a pending request and return a future that resolves exactly
    /// once, either via `complete` or after `wait_timeout` elapses.
    pub fn register(&self, key: RpcKey) -> oneshot::Receiver<RpcOutcome> {
        let (tx, rx) = oneshot::channel();
        // A second registration under the same key would silently replace
        // the stale waiter's sender, losing its wakeup — callers must ensure
        // keys are not reused while in flight (query_id/task_id/msg_type is
        // unique per in-flight request by construction).
        self.inflight.insert(key, SendInfo { reply: tx });
        rx
    }

    /// Deliver the single callback for `key`. A caller for an unknown key
    /// (late/duplicate network delivery) is a no-op, matching the original's
    /// tolerance of callbacks racing a local cleanup.
    pub fn complete(&self, key: RpcKey, outcome: RpcOutcome) {
        if let Some((_, info)) = self.inflight.remove(&key) {
            let _ = info.reply.send(outcome);
        }
    }

    /// Cancel and drop a pending request without waiting for a remote
    /// response (used by job/task drop fan-out).
    pub fn cancel(&self, key: RpcKey) {
        self.complete(key, RpcOutcome::Cancelled);
    }

    pub fn pending_count(&self) -> usize {
        self.inflight.len()
    }

    /// Await a response with a bound, synthesizing `RpcOutcome::Timeout` if
    /// it doesn't arrive in time. The entry is removed on timeout so a late
    /// reply is harmlessly dropped by `complete`.
    pub async fn wait_timeout(
        &self,
        key: RpcKey,
        rx: oneshot::Receiver<RpcOutcome>,
        dur: Duration,
    ) -> Result<RpcOutcome> {
        match timeout(dur, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_recv_error)) => Ok(RpcOutcome::Cancelled),
            Err(_elapsed) => {
                self.inflight.remove(&key);
                Ok(RpcOutcome::Timeout)
            }
        }
    }
}

/// Result of validating an inbound response against the last-sent message
/// type for a task, per SPEC_FULL.md §4.6.
pub fn validate_sequence(last_sent: TaskMsgType, got: TaskMsgType) -> Result<()> {
    if last_sent.expected_response() == got {
        Ok(())
    } else {
        Err(DbError::StatusError {
            expected: last_sent.expected_response() as u32,
            got: got as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn callback_delivers_exactly_once() {
        let shim = RpcShim::new();
        let key = RpcKey { query_id: 1, task_id: 1, msg_type: TaskMsgType::Query };
        let rx = shim.register(key);

        shim.complete(key, RpcOutcome::Response { code: 0, payload: vec![1, 2, 3] });
        // Second delivery for the same key is a no-op: the entry is gone.
        shim.complete(key, RpcOutcome::Response { code: 0, payload: vec![] });

        let outcome = rx.await.unwrap();
        match outcome {
            RpcOutcome::Response { code, payload } => {
                assert_eq!(code, 0);
                assert_eq!(payload, vec![1, 2, 3]);
            }
            other => panic!("unexpected outcome {other}"),
        }
        assert_eq!(shim.pending_count(), 0);
    }

    #[tokio::test]
    async fn timeout_synthesizes_outcome() {
        let shim = RpcShim::new();
        let key = RpcKey { query_id: 2, task_id: 1, msg_type: TaskMsgType::Fetch };
        let rx = shim.register(key);

        let outcome = shim.wait_timeout(key, rx, Duration::from_millis(10)).await.unwrap();
        assert!(matches!(outcome, RpcOutcome::Timeout));
        assert_eq!(shim.pending_count(), 0);
    }

    #[test]
    fn sequence_validation() {
        assert!(validate_sequence(TaskMsgType::Query, TaskMsgType::QueryRsp).is_ok());
        assert!(validate_sequence(TaskMsgType::Query, TaskMsgType::FetchRsp).is_err());
    }
}
