//! Pure filtering of event batches against a subscribe request.

use crate::types::{Event, SubscribeRequest, KEY_ALL};
use std::sync::Arc;

/// Events from `events` matching `req`, in input order.
///
/// Runs a counting pass before allocating anything: zero matches returns
/// `None`, a count equal to the input length returns the input `Arc`
/// unchanged, and anything in between allocates exactly once at the counted
/// capacity. This runs on every delivered batch, so the pass-through case
/// must stay allocation-free.
pub(crate) fn filter(req: &SubscribeRequest, events: &Arc<[Event]>) -> Option<Arc<[Event]>> {
    if events.is_empty() {
        return None;
    }

    let count: usize = events.iter().map(|event| match_count(req, event)).sum();
    match count {
        0 => None,
        n if n == events.len() => Some(Arc::clone(events)),
        _ => {
            let mut matched = Vec::with_capacity(count);
            for event in events.iter() {
                // One copy per matching key, mirroring the counting pass.
                for _ in 0..match_count(req, event) {
                    matched.push(event.clone());
                }
            }
            Some(matched.into())
        }
    }
}

/// Number of keys in the request that select `event`.
fn match_count(req: &SubscribeRequest, event: &Event) -> usize {
    let keys = match req.topic_keys(&event.topic) {
        Some(keys) => keys,
        None => return 0,
    };

    // A namespace mismatch excludes the event before any key matching.
    if !req.namespace.is_empty() && !event.namespace.is_empty() && event.namespace != req.namespace
    {
        return 0;
    }

    keys.iter()
        .filter(|key| key_matches(event, key))
        .count()
}

fn key_matches(event: &Event, key: &str) -> bool {
    key == KEY_ALL || event.key == key || event.filter_keys.iter().any(|fk| fk == key)
}
