//! Consumer-side subscription handle over the shared event buffer.

use crate::buffer::BufferItem;
use crate::error::{Result, StreamError};
use crate::filter::filter;
use crate::signal::CancelToken;
use crate::types::{EventBatch, SubscribeRequest};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default state of a subscription; an open subscription may receive events.
const STATE_OPEN: u32 = 0;

/// The subscription was closed server-side and will not receive events. The
/// consumer must issue a new subscribe request.
const STATE_CLOSED: u32 = 1;

/// Close state shared between a [`Subscription`] and its closers.
struct CloseState {
    /// `STATE_OPEN` or `STATE_CLOSED`; written once via compare-and-swap.
    state: AtomicU32,
    /// Fired by the winning close transition to abort blocked reads.
    signal: CancelToken,
}

impl CloseState {
    fn new() -> Self {
        CloseState {
            state: AtomicU32::new(STATE_OPEN),
            signal: CancelToken::new(),
        }
    }

    fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_CLOSED
    }

    fn force_close(&self) {
        if self
            .state
            .compare_exchange(STATE_OPEN, STATE_CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            debug!("subscription force-closed");
            self.signal.cancel();
        }
    }
}

/// A consumer's cursor into the shared event buffer.
///
/// Retrieval takes `&mut self`: exactly one thread consumes a subscription.
/// Closing it from elsewhere goes through a [`SubscriptionCloser`], and
/// racing a close against in-flight reads is safe.
pub struct Subscription {
    req: SubscribeRequest,

    /// Current buffer position; mutated only by retrieval calls.
    current: Arc<BufferItem>,

    close: Arc<CloseState>,

    /// Releases broker-side resources when the subscription is no longer
    /// needed. Must be idempotent and callable from any thread; that is the
    /// contract of whoever constructs the subscription.
    unsub: Box<dyn Fn() + Send + Sync>,
}

impl Subscription {
    /// Create a subscription positioned at `start`, typically obtained from
    /// [`EventBuffer::start_from`](crate::EventBuffer::start_from).
    pub fn new(
        req: SubscribeRequest,
        start: Arc<BufferItem>,
        unsub: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Subscription {
            req,
            current: start,
            close: Arc::new(CloseState::new()),
            unsub: Box::new(unsub),
        }
    }

    /// Block until the next batch with at least one event matching the
    /// request, and return the matching events with the batch's index.
    ///
    /// Batches that filter down to nothing are skipped without returning.
    /// Fails with `Cancelled` when `cancel` fires and `SubscriptionClosed`
    /// when the subscription is closed; once the closed state is observed
    /// the error is always `SubscriptionClosed`, whatever interrupted the
    /// wait.
    pub fn next(&mut self, cancel: &CancelToken) -> Result<EventBatch> {
        self.next_inner(cancel, None)
    }

    /// [`next`](Self::next) with a bound on the total wait; fails with
    /// `Timeout` once `timeout` has elapsed.
    pub fn next_timeout(&mut self, cancel: &CancelToken, timeout: Duration) -> Result<EventBatch> {
        self.next_inner(cancel, Some(Instant::now() + timeout))
    }

    fn next_inner(&mut self, cancel: &CancelToken, deadline: Option<Instant>) -> Result<EventBatch> {
        if self.close.is_closed() {
            return Err(StreamError::SubscriptionClosed);
        }

        loop {
            let next = match self.current.next(cancel, &self.close.signal, deadline) {
                Ok(item) => item,
                // A closed subscription reports SubscriptionClosed even if
                // the wait ended for another reason.
                Err(_) if self.close.is_closed() => return Err(StreamError::SubscriptionClosed),
                Err(err) => return Err(err),
            };
            self.current = next;

            if let Some(events) = filter(&self.req, &self.current.batch().events) {
                return Ok(EventBatch {
                    index: self.current.index(),
                    events,
                });
            }
        }
    }

    /// Next matching batch without blocking.
    ///
    /// Returns `Ok(None)` once the cursor has caught up with the buffer;
    /// that is "no data yet", not an error.
    pub fn next_no_block(&mut self) -> Result<Option<EventBatch>> {
        if self.close.is_closed() {
            return Err(StreamError::SubscriptionClosed);
        }

        loop {
            let next = match self.current.next_no_block() {
                Some(item) => item,
                None => return Ok(None),
            };
            self.current = next;

            if let Some(events) = filter(&self.req, &self.current.batch().events) {
                return Ok(Some(EventBatch {
                    index: self.current.index(),
                    events,
                }));
            }
        }
    }

    /// Close the subscription server-side.
    ///
    /// The first close wins; any blocked retrieval wakes with
    /// `SubscriptionClosed` and every later call fails the same way.
    /// Callable any number of times, from any thread.
    pub fn force_close(&self) {
        self.close.force_close();
    }

    /// Handle for closing this subscription from other threads while the
    /// consumer owns it exclusively.
    pub fn closer(&self) -> SubscriptionCloser {
        SubscriptionCloser {
            close: Arc::clone(&self.close),
        }
    }

    /// The request this subscription was created with.
    pub fn request(&self) -> &SubscribeRequest {
        &self.req
    }

    /// Release broker-side resources for this subscription.
    ///
    /// Pure delegation to the callback passed at construction; does not
    /// close the subscription.
    pub fn unsubscribe(&self) {
        (self.unsub)()
    }
}

/// Cloneable handle that force-closes a [`Subscription`] from any thread.
#[derive(Clone)]
pub struct SubscriptionCloser {
    close: Arc<CloseState>,
}

impl SubscriptionCloser {
    /// See [`Subscription::force_close`].
    pub fn force_close(&self) {
        self.close.force_close();
    }
}
