//! One-shot broadcast signals for aborting blocking reads.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::Arc;

/// A one-shot broadcast used to cancel blocking waits.
///
/// Clones share the same signal. Firing it wakes every thread currently
/// blocked on it and makes every later wait return immediately; it never
/// carries data. Built on channel disconnection: the token holds the only
/// [`Sender`], and dropping it disconnects every [`Receiver`] at once.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    /// Present until the token fires; dropping it is the broadcast.
    armed: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

impl CancelToken {
    /// Create an unfired token.
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        CancelToken {
            inner: Arc::new(Inner {
                armed: Mutex::new(Some(tx)),
                rx,
            }),
        }
    }

    /// Fire the signal. Only the first call has an effect.
    pub fn cancel(&self) {
        self.inner.armed.lock().take();
    }

    /// Whether the signal has fired.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.inner.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Receiver that becomes ready once the signal fires. Select on it
    /// alongside other wake sources.
    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.inner.rx
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        CancelToken::new()
    }
}
