//! Error types for the event stream.

use thiserror::Error;

/// Main error type for stream operations.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The subscription was closed server-side, e.g. because the consumer's
    /// credentials were revoked. The handle is finished: the consumer must
    /// unsubscribe and open a new subscription.
    #[error("subscription closed by server, client should resubscribe")]
    SubscriptionClosed,

    /// A blocking read was aborted through the caller's cancel token.
    /// Retryable on the same subscription.
    #[error("wait cancelled by caller")]
    Cancelled,

    /// A bounded read ran out of time before a matching batch arrived.
    /// Retryable on the same subscription.
    #[error("timed out waiting for events")]
    Timeout,

    /// An exact-index start was requested but the buffer no longer retains
    /// that index.
    #[error("start index {requested} not in buffer (closest is {closest})")]
    StartIndexUnavailable { requested: u64, closest: u64 },
}

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;
