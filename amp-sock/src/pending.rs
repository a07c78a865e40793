//! Request/reply correlation.
//!
//! Every in-flight request owns a single-slot rendezvous keyed by its id
//! string. The dispatcher deposits the stripped reply into the slot; the
//! requester waits on the other half with a deadline. Replies whose id has no
//! slot (the deadline already passed, or the id was never ours) are dropped.

use std::collections::HashMap;
use std::sync::Mutex;

use amp_codec::Message;
use tokio::sync::oneshot;

use crate::lock;

/// The map of outstanding request slots, keyed by request id.
#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    slots: Mutex<HashMap<String, oneshot::Sender<Message>>>,
}

impl PendingRequests {
    /// Open a slot for `id` and return the receiving half.
    pub(crate) fn register(&self, id: &str) -> oneshot::Receiver<Message> {
        let (tx, rx) = oneshot::channel();
        lock(&self.slots).insert(id.to_owned(), tx);
        rx
    }

    /// Deposit a reply, waking the waiting requester.
    pub(crate) fn fulfill(&self, id: &str, message: Message) {
        let slot = lock(&self.slots).remove(id);
        match slot {
            Some(tx) => {
                // The receiver may have just timed out; the reply is then lost.
                let _ = tx.send(message);
            }
            None => tracing::debug!(id, "reply with no outstanding request, dropping"),
        }
    }

    /// Discard the slot for `id`, if still present.
    pub(crate) fn remove(&self, id: &str) {
        lock(&self.slots).remove(id);
    }

    /// Drop every slot, waking all waiters with a closed channel.
    pub(crate) fn drain(&self) {
        lock(&self.slots).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amp_codec::Field;

    #[tokio::test]
    async fn test_fulfill_wakes_waiter() {
        let pending = PendingRequests::default();
        let rx = pending.register("100:0");

        pending.fulfill("100:0", Message::new().with_string("reply"));

        let reply = rx.await.expect("reply delivered");
        assert_eq!(reply.first().and_then(Field::as_str), Some("reply"));
    }

    #[tokio::test]
    async fn test_unknown_id_is_dropped() {
        let pending = PendingRequests::default();
        let rx = pending.register("100:0");

        pending.fulfill("100:99", Message::new().with_string("stray"));

        // The registered slot is untouched.
        pending.fulfill("100:0", Message::new().with_string("real"));
        let reply = rx.await.expect("reply delivered");
        assert_eq!(reply.first().and_then(Field::as_str), Some("real"));
    }

    #[tokio::test]
    async fn test_removed_slot_drops_late_reply() {
        let pending = PendingRequests::default();
        let rx = pending.register("100:1");
        pending.remove("100:1");

        pending.fulfill("100:1", Message::new().with_string("late"));
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_drain_wakes_waiters_with_error() {
        let pending = PendingRequests::default();
        let rx = pending.register("100:2");

        pending.drain();
        assert!(rx.await.is_err());
    }
}
