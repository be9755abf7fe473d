// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replicated growable array.
//!
//! The ordering core shared by list and text containers. Elements carry the
//! id of the operation that inserted them and an anchor (`Head` or
//! `After(id)`); deletion tombstones the element but keeps it as an anchor
//! for concurrent inserts.
//!
//! Concurrent inserts at the same anchor are ordered by descending id, so
//! every replica that has seen the same operations places them identically.
//! Causal delivery is assumed: an element's anchor has always been
//! integrated before the element itself arrives (the server's total order
//! plus the sequencer guarantee this).

use crate::tree::change::{Anchor, OpId};

/// One sequence element.
#[derive(Debug, Clone)]
pub struct Elem<T> {
    pub id: OpId,
    pub origin: Anchor,
    pub value: T,
    pub deleted: bool,
}

/// A tombstone-keeping replicated sequence.
#[derive(Debug, Clone, Default)]
pub struct Rga<T> {
    elems: Vec<Elem<T>>,
}

impl<T> Rga<T> {
    pub fn new() -> Self {
        Rga { elems: Vec::new() }
    }

    /// Array position of the element with `id`, tombstones included.
    pub fn position_of(&self, id: OpId) -> Option<usize> {
        self.elems.iter().position(|e| e.id == id)
    }

    /// Count of live (non-tombstoned) elements.
    pub fn visible_len(&self) -> usize {
        self.elems.iter().filter(|e| !e.deleted).count()
    }

    /// Iterate live elements in order.
    pub fn iter_visible(&self) -> impl Iterator<Item = &Elem<T>> {
        self.elems.iter().filter(|e| !e.deleted)
    }

    /// The live element at visible index `idx`.
    pub fn visible_get(&self, idx: usize) -> Option<&Elem<T>> {
        self.iter_visible().nth(idx)
    }

    /// Visible index of the array position `pos` (count of live elements
    /// strictly before it).
    fn visible_index_of_pos(&self, pos: usize) -> usize {
        self.elems[..pos].iter().filter(|e| !e.deleted).count()
    }

    /// Conceptual array position of an anchor: `-1` for head, else the
    /// position of the anchored element.
    fn anchor_pos(&self, anchor: Anchor) -> Option<isize> {
        match anchor {
            Anchor::Head => Some(-1),
            Anchor::After(id) => self.position_of(id).map(|p| p as isize),
        }
    }

    /// Integrate an element into the sequence.
    ///
    /// Returns the visible index the element landed at, or `None` when the
    /// anchor is unknown (a causality violation upstream).
    ///
    /// Placement: scan right from the anchor, skipping elements anchored at
    /// the same point with a larger id (and everything anchored under
    /// them); stop at the first same-anchor element with a smaller id, or
    /// at anything attached before our anchor.
    pub fn integrate(&mut self, id: OpId, origin: Anchor, value: T) -> Option<usize> {
        let origin_pos = self.anchor_pos(origin)?;
        let mut pos = (origin_pos + 1) as usize;
        while pos < self.elems.len() {
            let other = &self.elems[pos];
            let other_origin = self.anchor_pos(other.origin)?;
            if other_origin < origin_pos {
                break;
            }
            if other_origin == origin_pos && other.id < id {
                break;
            }
            pos += 1;
        }
        let visible = self.visible_index_of_pos(pos);
        self.elems.insert(
            pos,
            Elem {
                id,
                origin,
                value,
                deleted: false,
            },
        );
        Some(visible)
    }

    /// Tombstone the element with `id`.
    ///
    /// Returns the visible index it occupied, or `None` if it was already
    /// deleted or unknown (concurrent deletes are idempotent).
    pub fn delete(&mut self, id: OpId) -> Option<usize> {
        let pos = self.position_of(id)?;
        if self.elems[pos].deleted {
            return None;
        }
        let visible = self.visible_index_of_pos(pos);
        self.elems[pos].deleted = true;
        Some(visible)
    }

    /// Visible index of a live element by id.
    pub fn visible_index_of(&self, id: OpId) -> Option<usize> {
        let pos = self.position_of(id)?;
        if self.elems[pos].deleted {
            return None;
        }
        Some(self.visible_index_of_pos(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::change::ActorId;

    fn id(counter: u64, actor: u128) -> OpId {
        OpId::new(counter, ActorId::from_u128(actor))
    }

    fn contents(rga: &Rga<char>) -> String {
        rga.iter_visible().map(|e| e.value).collect()
    }

    #[test]
    fn test_sequential_inserts() {
        let mut rga = Rga::new();
        rga.integrate(id(1, 1), Anchor::Head, 'a').unwrap();
        rga.integrate(id(2, 1), Anchor::After(id(1, 1)), 'b').unwrap();
        rga.integrate(id(3, 1), Anchor::After(id(2, 1)), 'c').unwrap();
        assert_eq!(contents(&rga), "abc");
    }

    #[test]
    fn test_concurrent_head_inserts_order_by_id_desc() {
        // Two actors insert at head concurrently; both replicas converge
        // on larger-id-first regardless of arrival order.
        let build = |first_actor: u128, second_actor: u128| {
            let mut rga = Rga::new();
            rga.integrate(id(1, first_actor), Anchor::Head, char::from(b'0' + first_actor as u8))
                .unwrap();
            rga.integrate(id(1, second_actor), Anchor::Head, char::from(b'0' + second_actor as u8))
                .unwrap();
            contents(&rga)
        };
        assert_eq!(build(1, 2), build(2, 1));
        assert_eq!(build(1, 2), "21");
    }

    #[test]
    fn test_concurrent_inserts_keep_runs_contiguous() {
        // Actor 1 types "ab" after head, actor 2 types "xy" after head,
        // concurrently. Runs must not interleave.
        let ops = [
            (id(1, 1), Anchor::Head, 'a'),
            (id(2, 1), Anchor::After(id(1, 1)), 'b'),
            (id(1, 2), Anchor::Head, 'x'),
            (id(2, 2), Anchor::After(id(1, 2)), 'y'),
        ];
        let mut forward = Rga::new();
        for (i, o, v) in ops {
            forward.integrate(i, o, v).unwrap();
        }
        let mut swapped = Rga::new();
        for (i, o, v) in [ops[2], ops[3], ops[0], ops[1]] {
            swapped.integrate(i, o, v).unwrap();
        }
        assert_eq!(contents(&forward), contents(&swapped));
        let s = contents(&forward);
        assert!(s == "abxy" || s == "xyab", "interleaved: {}", s);
    }

    #[test]
    fn test_delete_returns_visible_index() {
        let mut rga = Rga::new();
        rga.integrate(id(1, 1), Anchor::Head, 'a').unwrap();
        rga.integrate(id(2, 1), Anchor::After(id(1, 1)), 'b').unwrap();
        rga.integrate(id(3, 1), Anchor::After(id(2, 1)), 'c').unwrap();
        assert_eq!(rga.delete(id(2, 1)), Some(1));
        assert_eq!(contents(&rga), "ac");
        // Idempotent
        assert_eq!(rga.delete(id(2, 1)), None);
        // Tombstone still anchors
        rga.integrate(id(4, 2), Anchor::After(id(2, 1)), 'x').unwrap();
        assert_eq!(contents(&rga), "axc");
    }

    #[test]
    fn test_insert_after_tombstone_at_end() {
        let mut rga = Rga::new();
        rga.integrate(id(1, 1), Anchor::Head, 'a').unwrap();
        rga.delete(id(1, 1));
        let visible = rga.integrate(id(2, 1), Anchor::After(id(1, 1)), 'b').unwrap();
        assert_eq!(visible, 0);
        assert_eq!(contents(&rga), "b");
    }

    #[test]
    fn test_unknown_anchor_rejected() {
        let mut rga = Rga::new();
        assert!(rga.integrate(id(1, 1), Anchor::After(id(9, 9)), 'a').is_none());
    }
}
