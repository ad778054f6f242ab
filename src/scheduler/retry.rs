//! Retry policy, grounded on SPEC_FULL.md §4.7/§7 and the Open Question on
//! `schTaskCheckAndSetRetry` (a stub in the original source). Per
//! DESIGN.md's decision: retryable iff the error is a transient
//! network/timeout class *and* another candidate address remains.

use crate::error::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-dispatch to the next candidate address.
    Retry,
    /// No more candidates, or the error class is non-retryable: fail the
    /// task.
    Fail,
}

/// Classify an error as transient (retryable on a fresh candidate) or
/// terminal, per SPEC_FULL.md §7's error table: `Timeout` / transient
/// network errors retry; everything else (`StatusError`,
/// `TooManyTimeWindows`, `DataVersionMismatch`, `InvalidInput`, ...) is
/// non-retryable.
pub fn is_transient(err: &DbError) -> bool {
    matches!(err, DbError::Timeout(_) | DbError::Network(_) | DbError::Unavailable(_))
}

/// Decide whether a failed task should be retried on the next candidate
/// address. `has_next_candidate` should be `task.advance_candidate()`'s
/// return value — callers must only advance the index when this returns
/// `Retry`; a `Fail` result must not consume a retry attempt.
pub fn check_and_set_retry(err: &DbError, has_next_candidate: bool) -> RetryDecision {
    if is_transient(err) && has_next_candidate {
        RetryDecision::Retry
    } else {
        RetryDecision::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_with_remaining_candidate_retries() {
        assert_eq!(check_and_set_retry(&DbError::Timeout("x".into()), true), RetryDecision::Retry);
    }

    #[test]
    fn timeout_with_no_remaining_candidate_fails() {
        assert_eq!(check_and_set_retry(&DbError::Timeout("x".into()), false), RetryDecision::Fail);
    }

    #[test]
    fn status_error_never_retries() {
        assert_eq!(
            check_and_set_retry(&DbError::StatusError { expected: 2, got: 4 }, true),
            RetryDecision::Fail
        );
    }
}
