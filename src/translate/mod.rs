// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The two translators between the editable document and the replicated
//! tree.
//!
//! ```text
//!   editor ops ──► local::encode_batch ──► Change ──► wire
//!   wire ──► DocTree::import ──► events ──► remote::apply_batch ──► editor
//! ```
//!
//! [`local`] turns editor operation batches into committed tree changes;
//! [`remote`] replays imported tree events back onto the document. The two
//! deliberately do not share a code path: local edits never produce
//! events, and remote events never re-enter the local encoder, so an
//! imported change can never echo back out as a fresh local change.

pub mod local;
pub mod remote;

#[cfg(test)]
mod tests {
    use super::{local, remote};
    use crate::editor::Document;
    use crate::op::{patch_set, Operation};
    use crate::tree::change::{ActorId, Change};
    use crate::tree::DocTree;
    use crate::value::Value;

    /// One collaborating client: an editable document plus its replica of
    /// the tree, wired through both translators.
    struct Replica {
        doc: Document,
        tree: DocTree,
    }

    impl Replica {
        fn new(actor: u128) -> Self {
            Replica {
                doc: Document::new(),
                tree: DocTree::new(ActorId::from_u128(actor)),
            }
        }

        /// Apply a local edit batch to both sides; return the change.
        fn edit(&mut self, ops: &[Operation]) -> Change {
            self.doc.apply_batch(ops).unwrap();
            let change = local::encode_batch(&mut self.tree, ops).unwrap();
            assert_eq!(self.doc.to_value(), self.tree.to_value());
            change.expect("batch had no effect")
        }

        /// Receive a change from the wire: import, replay, verify.
        fn recv(&mut self, change: &Change) {
            let batch = self.tree.import(change).unwrap();
            remote::apply_batch(&mut self.doc, &batch).unwrap();
            remote::verify(&self.doc, &self.tree.to_value()).unwrap();
        }
    }

    fn paragraph(speaker: &str, tokens: &[&str]) -> Value {
        Value::map_of([
            ("speaker", Value::str(speaker)),
            (
                "children",
                Value::List(
                    tokens
                        .iter()
                        .map(|t| Value::map_of([("text", Value::text(*t))]))
                        .collect(),
                ),
            ),
        ])
    }

    fn insert(path: Vec<usize>, node: Value) -> Operation {
        Operation::InsertNode { path, node }
    }

    #[test]
    fn test_round_trip_insert_and_edit() {
        let mut a = Replica::new(1);
        let mut b = Replica::new(2);

        let c1 = a.edit(&[insert(vec![0], paragraph("s1", &["hello"]))]);
        b.recv(&c1);
        assert_eq!(a.doc.to_value(), b.doc.to_value());

        let c2 = b.edit(&[Operation::InsertText {
            path: vec![0, 0],
            offset: 5,
            text: " world".to_string(),
        }]);
        a.recv(&c2);
        assert_eq!(a.doc.to_value(), b.doc.to_value());
    }

    #[test]
    fn test_round_trip_structural_edits() {
        let mut a = Replica::new(1);
        let mut b = Replica::new(2);

        let c1 = a.edit(&[
            insert(vec![0], paragraph("s1", &["one", "two"])),
            insert(vec![1], paragraph("s2", &["three"])),
        ]);
        b.recv(&c1);

        // Structural edits (split, merge, move, patch) replayed remotely.
        let c2 = a.edit(&[Operation::SplitNode {
            path: vec![0],
            offset: 1,
            patch: patch_set("speaker", Value::str("s3")),
        }]);
        b.recv(&c2);
        assert_eq!(a.doc.to_value(), b.doc.to_value());

        let c3 = b.edit(&[Operation::MergeNode { path: vec![1] }]);
        a.recv(&c3);
        assert_eq!(a.doc.to_value(), b.doc.to_value());

        let c4 = a.edit(&[Operation::MoveNode { from: vec![1], to: vec![0] }]);
        b.recv(&c4);
        assert_eq!(a.doc.to_value(), b.doc.to_value());

        let c5 = b.edit(&[Operation::SetNode {
            path: vec![0],
            patch: patch_set("language", Value::str("en")),
        }]);
        a.recv(&c5);
        assert_eq!(a.doc.to_value(), b.doc.to_value());
    }

    #[test]
    fn test_concurrent_edits_converge_via_server_order() {
        let mut a = Replica::new(1);
        let mut b = Replica::new(2);

        let base = a.edit(&[insert(vec![0], paragraph("s1", &["shared"]))]);
        b.recv(&base);

        // Both edit concurrently; the server picks an order and both
        // replicas see the same interleaving (own changes dedupe on echo).
        let from_a = a.edit(&[Operation::InsertText {
            path: vec![0, 0],
            offset: 6,
            text: " text".to_string(),
        }]);
        let from_b = b.edit(&[insert(vec![1], paragraph("s2", &["reply"]))]);

        for change in [&from_a, &from_b] {
            a.recv(change);
            b.recv(change);
        }
        assert_eq!(a.doc.to_value(), b.doc.to_value());
        assert_eq!(a.doc.paragraphs().len(), 2);
    }

    #[test]
    fn test_remote_replay_of_own_echo_is_noop() {
        let mut a = Replica::new(1);
        let c = a.edit(&[insert(vec![0], paragraph("s1", &["x"]))]);
        let before = a.doc.to_value();
        a.recv(&c);
        assert_eq!(a.doc.to_value(), before);
    }

    #[test]
    fn test_speaker_table_round_trip() {
        let mut a = Replica::new(1);
        let mut b = Replica::new(2);

        let c1 = local::set_speaker(&mut a.tree, "s1", "Ada").unwrap().unwrap();
        a.doc.set_speaker_name("s1", "Ada");
        b.recv(&c1);
        assert_eq!(b.doc.speakers().get("s1").map(String::as_str), Some("Ada"));

        let c2 = local::set_speaker(&mut b.tree, "s1", "Ada Lovelace").unwrap().unwrap();
        b.doc.set_speaker_name("s1", "Ada Lovelace");
        a.recv(&c2);
        assert_eq!(a.doc.to_value(), b.doc.to_value());

        let c3 = local::remove_speaker(&mut a.tree, "s1").unwrap().unwrap();
        a.doc.remove_speaker("s1");
        b.recv(&c3);
        assert_eq!(a.doc.to_value(), b.doc.to_value());
    }

    #[test]
    fn test_repair_flows_through_local_pipeline() {
        let mut a = Replica::new(1);
        let mut b = Replica::new(2);

        let repair = a.doc.repair_ops();
        assert!(!repair.is_empty());
        let c = a.edit(&repair);
        b.recv(&c);
        assert_eq!(a.doc.to_value(), b.doc.to_value());
        assert!(b.doc.repair_ops().is_empty());
    }

    #[test]
    fn test_concurrent_remove_and_edit_under_removed_node() {
        let mut a = Replica::new(1);
        let mut b = Replica::new(2);

        let base = a.edit(&[insert(vec![0], paragraph("s1", &["doomed"]))]);
        b.recv(&base);

        let removal = a.edit(&[Operation::RemoveNode { path: vec![0] }]);
        let edit = b.edit(&[Operation::InsertText {
            path: vec![0, 0],
            offset: 0,
            text: "still ".to_string(),
        }]);

        // Server orders the removal first; b's edit lands on a detached
        // subtree and must not resurface anywhere.
        a.recv(&removal);
        a.recv(&edit);
        b.recv(&removal);
        b.recv(&edit);
        assert_eq!(a.doc.to_value(), b.doc.to_value());
        assert!(a.doc.paragraphs().is_empty());
    }

    #[test]
    fn test_undo_style_inverse_batch() {
        // Undo is modeled as an ordinary inverse batch through the same
        // local pipeline.
        let mut a = Replica::new(1);
        let mut b = Replica::new(2);

        let c1 = a.edit(&[insert(vec![0], paragraph("s1", &["keep"]))]);
        b.recv(&c1);
        let c2 = a.edit(&[Operation::InsertText {
            path: vec![0, 0],
            offset: 4,
            text: "???".to_string(),
        }]);
        b.recv(&c2);
        let undo = a.edit(&[Operation::RemoveText { path: vec![0, 0], offset: 4, len: 3 }]);
        b.recv(&undo);
        assert_eq!(a.doc.to_value(), b.doc.to_value());
        assert_eq!(
            a.doc.node_at(&[0, 0]).unwrap().to_value().get("text"),
            Some(&Value::text("keep"))
        );
    }

    #[test]
    fn test_selection_batch_produces_no_change() {
        let mut a = Replica::new(1);
        a.doc.apply_batch(&[Operation::SetSelection]).unwrap();
        let change = local::encode_batch(&mut a.tree, &[Operation::SetSelection]).unwrap();
        assert!(change.is_none());
    }
}
