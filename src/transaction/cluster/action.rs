//! Redo/undo RPC actions dispatched to vnodes during a cluster transaction,
//! grounded on `mndDb.c`'s `mndSetCreateDbRedoActions` (each action carries
//! a target epset, a message type, a serialized payload, and the
//! `acceptableCode` that means "remote side already reached the desired
//! state" — idempotence per SPEC_FULL.md §1.2).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// One node (or set of candidate addresses) an action is sent to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionTarget {
    pub addrs: Vec<SocketAddr>,
}

/// A single redo or undo action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub target: ActionTarget,
    pub msg_type: u32,
    pub payload: Vec<u8>,
    /// A remote response code that should be treated as success even
    /// though it isn't zero (e.g. "vnode already deployed" on a create
    /// that's retried after a partial prior attempt).
    pub acceptable_code: Option<i32>,
}

impl Action {
    pub fn is_acceptable(&self, code: i32) -> bool {
        code == 0 || self.acceptable_code == Some(code)
    }
}

/// The result of dispatching one action.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub code: i32,
    pub accepted: bool,
}

impl ActionOutcome {
    pub fn from_action(action: &Action, code: i32) -> Self {
        Self { code, accepted: action.is_acceptable(code) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acceptable_code_treated_as_success() {
        let action = Action {
            target: ActionTarget { addrs: vec![] },
            msg_type: 1,
            payload: vec![],
            acceptable_code: Some(-100),
        };
        assert!(action.is_acceptable(0));
        assert!(action.is_acceptable(-100));
        assert!(!action.is_acceptable(-200));

        let outcome = ActionOutcome::from_action(&action, -100);
        assert!(outcome.accepted);
    }
}
