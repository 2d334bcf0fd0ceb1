//! Append-only shared buffer of event batches.
//!
//! The buffer is a singly-linked sequence of immutable items. A producer
//! appends at the tail; each subscription walks the links at its own pace,
//! blocking on a per-item gate until the following item is linked. Once the
//! buffer holds more than `max_size` items the oldest is dropped from the
//! head, but an evicted item stays readable for any subscription still
//! holding a reference to it.

use crate::error::{Result, StreamError};
use crate::signal::CancelToken;
use crate::types::EventBatch;
use crossbeam_channel::{after, bounded, never, select, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Link from a buffer item to its successor.
///
/// Invariant: `next` is published under its write lock before `gate` is
/// dropped, so a waiter woken by the gate always observes the successor.
#[derive(Debug)]
struct Link {
    next: RwLock<Option<Arc<BufferItem>>>,
    /// Disconnects when the successor is published; this wakes waiters.
    ready: Receiver<()>,
    /// Held until the successor is published.
    gate: Mutex<Option<Sender<()>>>,
}

impl Link {
    fn new() -> Self {
        let (tx, rx) = bounded(0);
        Link {
            next: RwLock::new(None),
            ready: rx,
            gate: Mutex::new(Some(tx)),
        }
    }

    /// Publish the successor and wake all waiters.
    fn open(&self, next: Arc<BufferItem>) {
        let mut slot = self.next.write();
        debug_assert!(slot.is_none(), "buffer item linked twice");
        *slot = Some(next);
        drop(slot);
        self.gate.lock().take();
    }
}

/// One immutable batch in the buffer.
#[derive(Debug)]
pub struct BufferItem {
    batch: EventBatch,
    link: Link,
}

impl BufferItem {
    fn new(batch: EventBatch) -> Arc<Self> {
        Arc::new(BufferItem {
            batch,
            link: Link::new(),
        })
    }

    /// Detached item wired just before `first`, so that the first call to
    /// `next` on it delivers `first`. Start positions for new subscriptions
    /// are built this way.
    fn before(first: Arc<BufferItem>) -> Arc<Self> {
        let item = BufferItem::new(EventBatch::empty(first.index()));
        item.link.open(first);
        item
    }

    /// Index of the batch this item holds.
    pub fn index(&self) -> u64 {
        self.batch.index
    }

    /// The batch this item holds.
    pub fn batch(&self) -> &EventBatch {
        &self.batch
    }

    /// Successor item, if one has been linked yet.
    pub(crate) fn next_no_block(&self) -> Option<Arc<BufferItem>> {
        self.link.next.read().clone()
    }

    /// Wait until a successor is linked and return it.
    ///
    /// The wait aborts when `cancel` fires (`Cancelled`), when `close`
    /// fires (`SubscriptionClosed`), or when `deadline` passes (`Timeout`).
    pub(crate) fn next(
        &self,
        cancel: &CancelToken,
        close: &CancelToken,
        deadline: Option<Instant>,
    ) -> Result<Arc<BufferItem>> {
        loop {
            if let Some(next) = self.next_no_block() {
                return Ok(next);
            }

            let timer = match deadline {
                Some(at) => after(at.saturating_duration_since(Instant::now())),
                None => never(),
            };
            select! {
                recv(self.link.ready) -> _ => {}
                recv(cancel.receiver()) -> _ => return Err(StreamError::Cancelled),
                recv(close.receiver()) -> _ => return Err(StreamError::SubscriptionClosed),
                recv(timer) -> _ => return Err(StreamError::Timeout),
            }
        }
    }
}

/// Append-only buffer shared by every subscription of one stream.
///
/// Appends are internally synchronized; readers never block appends beyond
/// the link publication itself.
pub struct EventBuffer {
    /// Oldest retained item.
    head: RwLock<Arc<BufferItem>>,
    /// Newest item; appends link after it.
    tail: RwLock<Arc<BufferItem>>,
    /// Retained item count, the empty seed item included.
    size: AtomicUsize,
    max_size: usize,
}

impl EventBuffer {
    /// Create a buffer retaining at most `max_size` items.
    ///
    /// The buffer is seeded with an empty item at index 0 so that
    /// subscriptions created before the first append have a position to
    /// wait on.
    pub fn new(max_size: usize) -> Self {
        let seed = BufferItem::new(EventBatch::empty(0));
        EventBuffer {
            head: RwLock::new(Arc::clone(&seed)),
            tail: RwLock::new(seed),
            size: AtomicUsize::new(1),
            max_size,
        }
    }

    /// Append a batch, waking every subscription blocked at the tail.
    ///
    /// Evicts from the head once the buffer grows past its bound.
    pub fn append(&self, batch: EventBatch) {
        let item = BufferItem::new(batch);
        {
            let mut tail = self.tail.write();
            tail.link.open(Arc::clone(&item));
            *tail = item;
        }
        if self.size.fetch_add(1, Ordering::SeqCst) + 1 > self.max_size {
            self.evict_head();
        }
    }

    fn evict_head(&self) {
        let mut head = self.head.write();
        if let Some(next) = head.next_no_block() {
            debug!(index = head.index(), "evicting oldest buffer item");
            *head = next;
            self.size.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Oldest retained item.
    pub(crate) fn head(&self) -> Arc<BufferItem> {
        Arc::clone(&self.head.read())
    }

    /// Retained item whose index is closest to `index` without passing it
    /// (the head when everything retained is newer), and its distance from
    /// the request.
    pub fn start_at_closest(&self, index: u64) -> (Arc<BufferItem>, u64) {
        let mut item = self.head();
        if index < item.index() {
            let offset = item.index() - index;
            return (item, offset);
        }

        loop {
            let next = match item.next_no_block() {
                Some(next) => next,
                None => {
                    let offset = index - item.index();
                    return (item, offset);
                }
            };
            if next.index() > index {
                let offset = index - item.index();
                return (item, offset);
            }
            item = next;
            if item.index() == index {
                return (item, 0);
            }
        }
    }

    /// Detached start position for a new subscription.
    ///
    /// The returned item is not part of the buffer; the first `next` call
    /// on it delivers the batch closest to `index`, or the oldest retained
    /// batch when `index` is 0. With `exact` set, fails unless the buffer
    /// still retains `index` itself.
    pub fn start_from(&self, index: u64, exact: bool) -> Result<Arc<BufferItem>> {
        let (first, offset) = if index == 0 {
            (self.head(), 0)
        } else {
            self.start_at_closest(index)
        };
        if exact && offset != 0 {
            return Err(StreamError::StartIndexUnavailable {
                requested: index,
                closest: first.index(),
            });
        }
        Ok(BufferItem::before(first))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Event, Topic};
    use std::thread;
    use std::time::Duration;

    fn batch(index: u64, n_events: usize) -> EventBatch {
        let events = (0..n_events)
            .map(|i| Event {
                topic: Topic::from("job"),
                event_type: "test".to_string(),
                key: format!("key-{}", i),
                filter_keys: Vec::new(),
                index,
                namespace: String::new(),
                payload: serde_json::Value::Null,
            })
            .collect();
        EventBatch::new(index, events)
    }

    fn collect_indexes(mut item: Arc<BufferItem>) -> Vec<u64> {
        let mut indexes = Vec::new();
        while let Some(next) = item.next_no_block() {
            indexes.push(next.index());
            item = next;
        }
        indexes
    }

    #[test]
    fn test_append_links_in_order() {
        let buffer = EventBuffer::new(10);
        for index in 1..=3 {
            buffer.append(batch(index, 1));
        }

        assert_eq!(collect_indexes(buffer.head()), vec![1, 2, 3]);
    }

    #[test]
    fn test_eviction_drops_oldest() {
        let buffer = EventBuffer::new(3);
        for index in 1..=5 {
            buffer.append(batch(index, 1));
        }

        // Seed and the two oldest batches are gone.
        assert_eq!(buffer.head().index(), 3);
        assert_eq!(collect_indexes(buffer.head()), vec![4, 5]);
    }

    #[test]
    fn test_evicted_items_stay_readable_for_holders() {
        let buffer = EventBuffer::new(2);
        buffer.append(batch(1, 1));
        let (held, _) = buffer.start_at_closest(1);
        assert_eq!(held.index(), 1);

        for index in 2..=6 {
            buffer.append(batch(index, 1));
        }

        // The held chain still walks through everything ever appended.
        assert_eq!(collect_indexes(held), vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_start_at_closest_exact_match() {
        let buffer = EventBuffer::new(10);
        for index in [2, 4, 6] {
            buffer.append(batch(index, 1));
        }

        let (item, offset) = buffer.start_at_closest(4);
        assert_eq!(item.index(), 4);
        assert_eq!(offset, 0);
    }

    #[test]
    fn test_start_at_closest_between_items() {
        let buffer = EventBuffer::new(10);
        for index in [2, 4, 6] {
            buffer.append(batch(index, 1));
        }

        let (item, offset) = buffer.start_at_closest(5);
        assert_eq!(item.index(), 4);
        assert_eq!(offset, 1);
    }

    #[test]
    fn test_start_at_closest_before_head() {
        let buffer = EventBuffer::new(2);
        for index in 1..=5 {
            buffer.append(batch(index, 1));
        }

        let head_index = buffer.head().index();
        let (item, offset) = buffer.start_at_closest(1);
        assert_eq!(item.index(), head_index);
        assert_eq!(offset, head_index - 1);
    }

    #[test]
    fn test_start_at_closest_past_tail() {
        let buffer = EventBuffer::new(10);
        buffer.append(batch(3, 1));

        let (item, offset) = buffer.start_at_closest(9);
        assert_eq!(item.index(), 3);
        assert_eq!(offset, 6);
    }

    #[test]
    fn test_start_from_exact_miss_fails() {
        let buffer = EventBuffer::new(2);
        for index in 1..=5 {
            buffer.append(batch(index, 1));
        }

        let err = buffer.start_from(1, true).unwrap_err();
        assert!(matches!(
            err,
            StreamError::StartIndexUnavailable { requested: 1, .. }
        ));
    }

    #[test]
    fn test_start_from_delivers_first_item() {
        let buffer = EventBuffer::new(10);
        for index in [2, 4] {
            buffer.append(batch(index, 1));
        }

        let start = buffer.start_from(2, true).unwrap();
        let first = start.next_no_block().unwrap();
        assert_eq!(first.index(), 2);
    }

    #[test]
    fn test_blocking_next_wakes_on_append() {
        let buffer = Arc::new(EventBuffer::new(10));
        let start = buffer.head();

        let appender = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                buffer.append(batch(1, 1));
            })
        };

        let cancel = CancelToken::new();
        let close = CancelToken::new();
        let next = start.next(&cancel, &close, None).unwrap();
        assert_eq!(next.index(), 1);

        appender.join().unwrap();
    }

    #[test]
    fn test_blocking_next_deadline() {
        let buffer = EventBuffer::new(10);
        let start = buffer.head();

        let cancel = CancelToken::new();
        let close = CancelToken::new();
        let deadline = Some(Instant::now() + Duration::from_millis(30));
        let err = start.next(&cancel, &close, deadline).unwrap_err();
        assert!(matches!(err, StreamError::Timeout));
    }

    #[test]
    fn test_blocking_next_cancelled() {
        let buffer = EventBuffer::new(10);
        let start = buffer.head();

        let cancel = CancelToken::new();
        let close = CancelToken::new();
        cancel.cancel();
        let err = start.next(&cancel, &close, None).unwrap_err();
        assert!(matches!(err, StreamError::Cancelled));
    }
}
