//! # eventstream
//!
//! An in-memory event stream core: an append-only buffer of indexed event
//! batches, fanned out to consumers through filterable, cancellable
//! subscriptions.
//!
//! ## Core Concepts
//!
//! - **Buffer**: append-only, bounded sequence of immutable batches shared
//!   by every subscription
//! - **Subscription**: per-consumer cursor delivering matching batches in
//!   strict index order, at most once each
//! - **Filtering**: topic/key/namespace selection with wildcard sentinels
//! - **Closure**: server-side force-close that wakes blocked readers
//!
//! ## Example
//!
//! ```ignore
//! use eventstream::{CancelToken, EventBuffer, SubscribeRequest, Subscription};
//!
//! let buffer = EventBuffer::new(1024);
//!
//! let req = SubscribeRequest { /* topics, namespace, start index */ ..Default::default() };
//! let start = buffer.start_from(req.index, req.start_exactly_at_index)?;
//! let mut sub = Subscription::new(req, start, || { /* release broker state */ });
//!
//! let cancel = CancelToken::new();
//! while let Ok(batch) = sub.next(&cancel) {
//!     println!("index {}: {} events", batch.index, batch.events.len());
//! }
//! ```

pub mod buffer;
pub mod error;
mod filter;
pub mod signal;
pub mod subscription;
pub mod types;

// Re-exports
pub use buffer::{BufferItem, EventBuffer};
pub use error::{Result, StreamError};
pub use signal::CancelToken;
pub use subscription::{Subscription, SubscriptionCloser};
pub use types::*;
