// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local edit operations.
//!
//! A local edit cycle produces an ordered batch of [`Operation`]s. The same
//! enum is used in both directions: the editor emits batches into the local
//! operation translator, and the remote event translator emits batches back
//! onto the editable document.
//!
//! Operations address nodes by [`Path`]: a root-relative sequence of child
//! indices, interpreted fresh against the current tree on every operation.
//! Paths are positions, not stable identities.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root-relative child-index path.
///
/// `[]` is the document root, `[1]` its second paragraph, `[1, 0]` that
/// paragraph's first token.
pub type Path = Vec<usize>;

/// Split a path into parent path and final index.
///
/// Returns `None` for the root path, which has no parent.
pub fn split_last(path: &[usize]) -> Option<(&[usize], usize)> {
    let (last, parent) = path.split_last()?;
    Some((parent, *last))
}

/// One entry of a property patch.
///
/// The source protocol patches with `undefined` to mean deletion; here the
/// two cases are separate variants so a key can never be ambiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatchEntry {
    /// Set the key to a value (converted to containers as needed).
    Set(Value),
    /// Remove the key.
    Delete,
}

/// A property patch: key → set/delete.
pub type PropPatch = BTreeMap<String, PatchEntry>;

/// A fine-grained local edit operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    /// Insert a new node at `path`.
    InsertNode { path: Path, node: Value },

    /// Remove the node at `path`.
    RemoveNode { path: Path },

    /// Patch properties of the node at `path`.
    SetNode { path: Path, patch: PropPatch },

    /// Join the node at `path` with its preceding sibling.
    ///
    /// Text-bearing nodes append their text to the predecessor's text;
    /// container nodes relocate their children into the predecessor's
    /// child list, then disappear.
    MergeNode { path: Path },

    /// Break the node at `path` into two at `offset`.
    ///
    /// The newly created successor is the node's current value overlaid
    /// with `patch`, and takes the text suffix (or child suffix) from
    /// `offset` onward.
    SplitNode {
        path: Path,
        offset: usize,
        patch: PropPatch,
    },

    /// Relocate a node from `from` to `to`, possibly across parents.
    /// Node identity is preserved, not deep-copied.
    MoveNode { from: Path, to: Path },

    /// Insert `text` at character `offset` in the node at `path`.
    InsertText {
        path: Path,
        offset: usize,
        text: String,
    },

    /// Remove `len` characters starting at `offset` in the node at `path`.
    RemoveText {
        path: Path,
        offset: usize,
        len: usize,
    },

    /// Cursor movement. No document effect; ignored by the translator.
    SetSelection,
}

/// Build a patch that sets a single key.
pub fn patch_set(key: &str, value: Value) -> PropPatch {
    let mut patch = PropPatch::new();
    patch.insert(key.to_string(), PatchEntry::Set(value));
    patch
}

/// Build a patch that deletes a single key.
pub fn patch_delete(key: &str) -> PropPatch {
    let mut patch = PropPatch::new();
    patch.insert(key.to_string(), PatchEntry::Delete);
    patch
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_last() {
        assert_eq!(split_last(&[0, 2]), Some((&[0][..], 2)));
        assert_eq!(split_last(&[5]), Some((&[][..], 5)));
        assert_eq!(split_last(&[]), None);
    }

    #[test]
    fn test_operation_serde_tagging() {
        let op = Operation::InsertText {
            path: vec![0, 1],
            offset: 3,
            text: "hi".to_string(),
        };
        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains("\"type\":\"insert_text\""));
        let back: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn test_patch_helpers() {
        let p = patch_set("speaker", Value::str("s2"));
        assert_eq!(p.get("speaker"), Some(&PatchEntry::Set(Value::str("s2"))));
        let d = patch_delete("speaker");
        assert_eq!(d.get("speaker"), Some(&PatchEntry::Delete));
    }
}
