//! The execution collaborator boundary.
//!
//! The runtime never executes tasks itself; it dispatches the wire
//! [`TaskRequest`](crate::task::TaskRequest) to a [`TaskCollaborator`] and
//! treats the response as opaque JSON to be validated. Collaborator failures
//! are split into transient (safe to retry) and terminal; retry policy lives
//! here at the boundary — wrap any collaborator in [`Retrying`] — never in
//! the executor, which only guarantees that a failed or invalid call is
//! never recorded as succeeded.

use std::time::Duration;

use async_trait::async_trait;
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

use crate::task::TaskRequest;

/// Errors raised by an execution collaborator.
#[derive(Debug, Error, Diagnostic)]
pub enum CollaboratorError {
    /// The dispatch failed for a reason expected to be temporary.
    #[error("transient collaborator failure: {message}")]
    #[diagnostic(
        code(duraloom::collaborator::transient),
        help("Retry the dispatch; wrap the collaborator in Retrying to do so automatically.")
    )]
    Transient { message: String },

    /// The dispatch failed and retrying cannot help.
    #[error("terminal collaborator failure: {message}")]
    #[diagnostic(code(duraloom::collaborator::terminal))]
    Terminal { message: String },
}

impl CollaboratorError {
    pub fn transient(message: impl Into<String>) -> Self {
        CollaboratorError::Transient {
            message: message.into(),
        }
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        CollaboratorError::Terminal {
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, CollaboratorError::Transient { .. })
    }
}

/// Executes dispatched task requests.
///
/// Implementations must be side-effect safe under duplicate dispatch of the
/// same request: the ledger guarantees at most one response is *recorded*,
/// but a timed-out dispatch may be issued again.
#[async_trait]
pub trait TaskCollaborator: Send + Sync {
    async fn dispatch(&self, request: &TaskRequest) -> Result<Value, CollaboratorError>;
}

/// Retry policy applied at the collaborator boundary.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Must be at least 1.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), exponential from
    /// `base_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << (retry.saturating_sub(1)).min(16))
    }
}

/// Decorator retrying transient failures of an inner collaborator.
///
/// Terminal failures propagate immediately; transient failures are retried
/// with exponential backoff until the attempt budget is exhausted, after
/// which the last transient error propagates.
pub struct Retrying<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> Retrying<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<C: TaskCollaborator> TaskCollaborator for Retrying<C> {
    async fn dispatch(&self, request: &TaskRequest) -> Result<Value, CollaboratorError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.dispatch(request).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < attempts => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::debug!(
                        task = %request.task,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient collaborator failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }
}
