//! The live peer table and its round-robin cursor.

use std::collections::BTreeMap;
use std::ops::Bound;

use tokio::sync::mpsc;

/// Stable identifier of a live peer connection.
///
/// Assigned monotonically when the peer enters the table and never reused,
/// so a departed peer's id can safely appear in queued work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(pub(crate) u64);

/// How a peer entered the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Accepted by a listener. Forgotten on link drop.
    Accepted,
    /// Established by an outbound connector, which reconnects on link drop.
    Outbound,
}

/// Handle to one live peer: the channel feeding its connection task.
#[derive(Debug, Clone)]
pub(crate) struct PeerHandle {
    pub(crate) sender: mpsc::UnboundedSender<Vec<u8>>,
    #[allow(dead_code)]
    pub(crate) origin: Origin,
}

/// The global set of live peers, observed atomically under one lock.
///
/// Peers are kept ordered by id so the round-robin cursor can pick the next
/// peer strictly after the previously used one, wrapping at the end.
#[derive(Debug, Default)]
pub(crate) struct PeerTable {
    peers: BTreeMap<u64, PeerHandle>,
    cursor: u64,
}

impl PeerTable {
    pub(crate) fn insert(&mut self, id: PeerId, handle: PeerHandle) {
        self.peers.insert(id.0, handle);
    }

    pub(crate) fn remove(&mut self, id: PeerId) -> Option<PeerHandle> {
        self.peers.remove(&id.0)
    }

    pub(crate) fn get(&self, id: PeerId) -> Option<PeerHandle> {
        self.peers.get(&id.0).cloned()
    }

    pub(crate) fn clear(&mut self) {
        self.peers.clear();
    }

    /// The next peer strictly after the cursor, wrapping; advances the
    /// cursor to the returned peer.
    pub(crate) fn next_round_robin(&mut self) -> Option<(PeerId, PeerHandle)> {
        let key = *self
            .peers
            .range((Bound::Excluded(self.cursor), Bound::Unbounded))
            .next()
            .or_else(|| self.peers.iter().next())
            .map(|(key, _)| key)?;
        self.cursor = key;
        let handle = self.peers.get(&key).cloned()?;
        Some((PeerId(key), handle))
    }

    /// Every live peer, for a broadcast.
    pub(crate) fn all(&self) -> Vec<(PeerId, PeerHandle)> {
        self.peers
            .iter()
            .map(|(key, handle)| (PeerId(*key), handle.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (PeerHandle, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            PeerHandle {
                sender: tx,
                origin: Origin::Accepted,
            },
            rx,
        )
    }

    #[test]
    fn test_round_robin_rotates_fairly() {
        let mut table = PeerTable::default();
        let mut receivers = Vec::new();
        for id in 1..=3u64 {
            let (h, rx) = handle();
            table.insert(PeerId(id), h);
            receivers.push(rx);
        }

        let picks: Vec<u64> = (0..9)
            .map(|_| table.next_round_robin().expect("peer available").0.0)
            .collect();

        assert_eq!(picks, vec![1, 2, 3, 1, 2, 3, 1, 2, 3]);
    }

    #[test]
    fn test_round_robin_starts_after_cursor() {
        let mut table = PeerTable::default();
        let (h1, _rx1) = handle();
        let (h2, _rx2) = handle();
        table.insert(PeerId(1), h1);

        assert_eq!(table.next_round_robin().expect("peer").0, PeerId(1));

        // A peer arriving after the cursor is picked next.
        table.insert(PeerId(2), h2);
        assert_eq!(table.next_round_robin().expect("peer").0, PeerId(2));
        assert_eq!(table.next_round_robin().expect("peer").0, PeerId(1));
    }

    #[test]
    fn test_round_robin_skips_evicted_peer() {
        let mut table = PeerTable::default();
        let mut receivers = Vec::new();
        for id in 1..=3u64 {
            let (h, rx) = handle();
            table.insert(PeerId(id), h);
            receivers.push(rx);
        }

        assert_eq!(table.next_round_robin().expect("peer").0, PeerId(1));
        table.remove(PeerId(2));
        assert_eq!(table.next_round_robin().expect("peer").0, PeerId(3));
        assert_eq!(table.next_round_robin().expect("peer").0, PeerId(1));
    }

    #[test]
    fn test_empty_table_has_no_next() {
        let mut table = PeerTable::default();
        assert!(table.next_round_robin().is_none());
    }

    #[test]
    fn test_fair_split_over_k_sends() {
        let mut table = PeerTable::default();
        let mut receivers = Vec::new();
        for id in 1..=3u64 {
            let (h, rx) = handle();
            table.insert(PeerId(id), h);
            receivers.push(rx);
        }

        let mut counts = std::collections::HashMap::new();
        let k = 10;
        for _ in 0..k {
            let (id, _) = table.next_round_robin().expect("peer");
            *counts.entry(id).or_insert(0u32) += 1;
        }

        for count in counts.values() {
            assert!(*count == k / 3 || *count == k / 3 + 1);
        }
    }
}
