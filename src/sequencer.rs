// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Total-order sequencer for inbound changes.
//!
//! The server stamps every rebroadcast change with a global sequence
//! number. TCP keeps one connection ordered, but a reconnect splices a
//! backlog replay against live traffic, so changes can still reach the
//! coordinator out of order or twice. The sequencer restores the server's
//! total order: out-of-order arrivals are parked until the gap below them
//! fills, and every release comes out in strict `seq` order.
//!
//! Arrivals at or below the delivery watermark are passed straight
//! through instead of dropped; the tree's per-actor dedup makes their
//! import a no-op, and counting them there keeps duplicate handling in
//! one place.
//!
//! A sequencer instance is tied to one connection. On reconnect the
//! server assigns a fresh numbering, so the coordinator discards the old
//! instance, buffered changes and all.

use crate::tree::change::SequencedChange;
use std::collections::BTreeMap;
use tracing::trace;

/// Re-orders inbound sequenced changes into strict `seq` order.
#[derive(Debug, Default)]
pub struct Sequencer {
    /// Highest seq released so far.
    last_delivered: u64,
    /// Out-of-order arrivals parked by seq.
    parked: BTreeMap<u64, SequencedChange>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest sequence number released so far.
    pub fn last_delivered(&self) -> u64 {
        self.last_delivered
    }

    /// Number of changes parked behind a gap.
    pub fn parked_len(&self) -> usize {
        self.parked.len()
    }

    /// Accept one arrival; returns every change now releasable, in order.
    ///
    /// Duplicates (at or below the watermark) are released immediately for
    /// downstream dedup. A change above the watermark parks until the run
    /// below it is contiguous.
    pub fn accept(&mut self, change: SequencedChange) -> Vec<SequencedChange> {
        if change.seq <= self.last_delivered {
            trace!(seq = change.seq, watermark = self.last_delivered, "duplicate arrival");
            return vec![change];
        }
        self.parked.insert(change.seq, change);
        let mut released = Vec::new();
        while let Some(next) = self.parked.remove(&(self.last_delivered + 1)) {
            self.last_delivered += 1;
            released.push(next);
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::change::{ActorId, Change};

    fn sc(seq: u64) -> SequencedChange {
        SequencedChange {
            seq,
            change: Change {
                actor: ActorId::from_u128(1),
                seq,
                start_counter: 1,
                ops: vec![],
            },
        }
    }

    fn seqs(changes: &[SequencedChange]) -> Vec<u64> {
        changes.iter().map(|c| c.seq).collect()
    }

    #[test]
    fn test_in_order_passthrough() {
        let mut s = Sequencer::new();
        assert_eq!(seqs(&s.accept(sc(1))), vec![1]);
        assert_eq!(seqs(&s.accept(sc(2))), vec![2]);
        assert_eq!(s.parked_len(), 0);
    }

    #[test]
    fn test_gap_parks_until_filled() {
        let mut s = Sequencer::new();
        assert!(s.accept(sc(2)).is_empty());
        assert!(s.accept(sc(3)).is_empty());
        assert_eq!(s.parked_len(), 2);
        assert_eq!(seqs(&s.accept(sc(1))), vec![1, 2, 3]);
        assert_eq!(s.parked_len(), 0);
        assert_eq!(s.last_delivered(), 3);
    }

    #[test]
    fn test_duplicate_released_immediately() {
        let mut s = Sequencer::new();
        s.accept(sc(1));
        s.accept(sc(2));
        // Backlog replay after reconnect re-sends old seqs.
        assert_eq!(seqs(&s.accept(sc(1))), vec![1]);
        assert_eq!(s.last_delivered(), 2);
    }

    #[test]
    fn test_duplicate_parked_seq_overwrites() {
        let mut s = Sequencer::new();
        assert!(s.accept(sc(3)).is_empty());
        assert!(s.accept(sc(3)).is_empty());
        assert_eq!(s.parked_len(), 1);
        s.accept(sc(1));
        assert_eq!(seqs(&s.accept(sc(2))), vec![2, 3]);
    }

    #[test]
    fn test_interleaved_gaps() {
        let mut s = Sequencer::new();
        assert!(s.accept(sc(4)).is_empty());
        assert_eq!(seqs(&s.accept(sc(1))), vec![1]);
        assert!(s.accept(sc(3)).is_empty());
        assert_eq!(seqs(&s.accept(sc(2))), vec![2, 3, 4]);
    }
}
