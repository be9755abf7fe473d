// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local operation translator: editor operations → tree transactions.
//!
//! Every effectful [`Operation`] the editor emits is re-expressed as
//! replicated-tree operations inside a single [`Transaction`], then
//! committed into one [`Change`]. The editor has already applied the batch
//! to its own document, so the contract here is exact parity: after
//! [`encode_batch`], the tree's materialization equals the editor's.
//!
//! Paths are positions, not identities, and are resolved against the tree
//! *as the transaction has mutated it so far*, the same way the editor
//! resolved them against its own evolving document. A path that does not
//! resolve is a contract violation and fatal.

use crate::error::{Result, SyncError};
use crate::op::{split_last, Operation, PatchEntry, PropPatch};
use crate::tree::change::{Change, ObjId};
use crate::tree::{DocTree, Transaction};
use crate::value::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Encode one editor batch as a single committed change.
///
/// Returns `None` when the batch had no effect (selection-only batches,
/// empty batches).
pub fn encode_batch(tree: &mut DocTree, ops: &[Operation]) -> Result<Option<Change>> {
    let mut txn = tree.transaction();
    for op in ops {
        encode_op(&mut txn, op)?;
    }
    let change = txn.commit();
    if let Some(c) = &change {
        debug!(seq = c.seq, ops = c.ops.len(), "encoded local batch");
    }
    Ok(change)
}

/// Set a speaker's display name, replacing the current one.
///
/// An existing name keeps its text container so concurrent splices from
/// other replicas still merge against it.
pub fn set_speaker(tree: &mut DocTree, speaker_id: &str, name: &str) -> Result<Option<Change>> {
    let mut txn = tree.transaction();
    match txn.tree().map_child(ObjId::Speakers, speaker_id) {
        Some(text_obj) if txn.tree().text_of(text_obj).is_some() => {
            if txn.tree().text_of(text_obj).as_deref() == Some(name) {
                return Ok(None);
            }
            let len = txn.tree().text_len(text_obj).unwrap_or(0);
            txn.text_remove(text_obj, 0, len)?;
            txn.text_insert(text_obj, 0, name)?;
        }
        _ => {
            txn.put_text(ObjId::Speakers, speaker_id, name)?;
        }
    }
    Ok(txn.commit())
}

/// Remove a speaker from the table. A no-op for unknown ids.
pub fn remove_speaker(tree: &mut DocTree, speaker_id: &str) -> Result<Option<Change>> {
    if !tree.map_has(ObjId::Speakers, speaker_id) {
        return Ok(None);
    }
    let mut txn = tree.transaction();
    txn.map_delete(ObjId::Speakers, speaker_id)?;
    Ok(txn.commit())
}

fn encode_op(txn: &mut Transaction<'_>, op: &Operation) -> Result<()> {
    match op {
        Operation::SetSelection => Ok(()),

        Operation::InsertNode { path, node } => {
            let (parent, idx) = split_last(path)
                .ok_or_else(|| SyncError::bad_path(path, "cannot insert at root"))?;
            let list = txn.tree().resolve_parent_list(parent)?;
            let len = txn.tree().list_len(list).unwrap_or(0);
            if idx > len {
                return Err(SyncError::bad_path(path, "insert index out of bounds"));
            }
            txn.insert_node(list, idx, node)?;
            Ok(())
        }

        Operation::RemoveNode { path } => {
            let (parent, idx) = split_last(path)
                .ok_or_else(|| SyncError::bad_path(path, "cannot remove root"))?;
            let list = txn.tree().resolve_parent_list(parent)?;
            let len = txn.tree().list_len(list).unwrap_or(0);
            if idx >= len {
                return Err(SyncError::bad_path(path, "remove index out of bounds"));
            }
            txn.list_remove(list, idx)
        }

        Operation::SetNode { path, patch } => {
            let node = txn.tree().resolve_node(path)?;
            encode_patch(txn, node, patch)
        }

        Operation::MergeNode { path } => encode_merge(txn, path),

        Operation::SplitNode { path, offset, patch } => {
            encode_split(txn, path, *offset, patch)
        }

        Operation::MoveNode { from, to } => {
            let (from_parent, from_idx) = split_last(from)
                .ok_or_else(|| SyncError::bad_path(from, "cannot move root"))?;
            let (to_parent, to_idx) = split_last(to)
                .ok_or_else(|| SyncError::bad_path(to, "cannot move onto root"))?;
            let from_list = txn.tree().resolve_parent_list(from_parent)?;
            let node = txn
                .tree()
                .list_child(from_list, from_idx)
                .ok_or_else(|| SyncError::bad_path(from, "move source out of bounds"))?;
            txn.list_remove(from_list, from_idx)?;
            // Destination is resolved after removal, matching the editor.
            let to_list = txn.tree().resolve_parent_list(to_parent)?;
            let len = txn.tree().list_len(to_list).unwrap_or(0);
            if to_idx > len {
                return Err(SyncError::bad_path(to, "move destination out of bounds"));
            }
            txn.list_insert_existing(to_list, to_idx, node)
        }

        Operation::InsertText { path, offset, text } => {
            let node = txn.tree().resolve_node(path)?;
            let text_obj = txn
                .tree()
                .node_text(node)
                .ok_or_else(|| SyncError::bad_path(path, "insert_text on a container node"))?;
            let total = txn.tree().text_len(text_obj).unwrap_or(0);
            txn.text_insert(text_obj, (*offset).min(total), text)
        }

        Operation::RemoveText { path, offset, len } => {
            let node = txn.tree().resolve_node(path)?;
            let text_obj = txn
                .tree()
                .node_text(node)
                .ok_or_else(|| SyncError::bad_path(path, "remove_text on a container node"))?;
            let total = txn.tree().text_len(text_obj).unwrap_or(0);
            let at = (*offset).min(total);
            txn.text_remove(text_obj, at, (*len).min(total - at))
        }
    }
}

/// Apply a property patch to a node's map container.
///
/// `text` and `children` replace the node's content wholesale; the stale
/// content key is deleted first so remote replay never sees a node with
/// both.
fn encode_patch(txn: &mut Transaction<'_>, node: ObjId, patch: &PropPatch) -> Result<()> {
    for (key, entry) in patch {
        match key.as_str() {
            "children" => {
                if txn.tree().map_has(node, "text") {
                    txn.map_delete(node, "text")?;
                }
                let items = match entry {
                    PatchEntry::Set(Value::List(items)) => items.clone(),
                    _ => Vec::new(),
                };
                txn.put_child_list(node, "children", &items)?;
            }
            "text" => {
                if txn.tree().map_has(node, "children") {
                    txn.map_delete(node, "children")?;
                }
                txn.put_text(node, "text", &patch_text_content(entry))?;
            }
            _ => match entry {
                PatchEntry::Set(v) => txn.map_put(node, key, v)?,
                PatchEntry::Delete => txn.map_delete(node, key)?,
            },
        }
    }
    Ok(())
}

fn encode_merge(txn: &mut Transaction<'_>, path: &[usize]) -> Result<()> {
    let (parent, idx) = split_last(path)
        .ok_or_else(|| SyncError::bad_path(path, "cannot merge root"))?;
    if idx == 0 {
        return Err(SyncError::bad_path(path, "no preceding sibling to merge into"));
    }
    let list = txn.tree().resolve_parent_list(parent)?;
    let here = txn
        .tree()
        .list_child(list, idx)
        .ok_or_else(|| SyncError::bad_path(path, "merge index out of bounds"))?;
    let prev = txn
        .tree()
        .list_child(list, idx - 1)
        .ok_or_else(|| SyncError::bad_path(path, "merge predecessor missing"))?;

    match (txn.tree().node_text(prev), txn.tree().node_text(here)) {
        (Some(prev_text), Some(here_text)) => {
            // Text merge copies characters; the merged-away node is gone
            // either way.
            let suffix = txn.tree().text_of(here_text).unwrap_or_default();
            let at = txn.tree().text_len(prev_text).unwrap_or(0);
            txn.text_insert(prev_text, at, &suffix)?;
            txn.list_remove(list, idx)
        }
        (None, None) => {
            let prev_children = txn
                .tree()
                .node_children(prev)
                .ok_or_else(|| SyncError::bad_path(path, "merge target has no content"))?;
            let here_children = txn
                .tree()
                .node_children(here)
                .ok_or_else(|| SyncError::bad_path(path, "merge source has no content"))?;
            // Children relocate by identity so concurrent edits inside
            // them survive the merge.
            let count = txn.tree().list_len(here_children).unwrap_or(0);
            let movers: Vec<ObjId> = (0..count)
                .map(|k| txn.tree().list_child(here_children, k))
                .collect::<Option<_>>()
                .ok_or_else(|| {
                    SyncError::Internal("non-node child in merge source".into())
                })?;
            let base = txn.tree().list_len(prev_children).unwrap_or(0);
            for (k, child) in movers.into_iter().enumerate() {
                txn.list_insert_existing(prev_children, base + k, child)?;
            }
            txn.list_remove(list, idx)
        }
        _ => Err(SyncError::bad_path(path, "cannot merge text into container")),
    }
}

fn encode_split(
    txn: &mut Transaction<'_>,
    path: &[usize],
    offset: usize,
    patch: &PropPatch,
) -> Result<()> {
    let (parent, idx) = split_last(path)
        .ok_or_else(|| SyncError::bad_path(path, "cannot split root"))?;
    let list = txn.tree().resolve_parent_list(parent)?;
    let here = txn
        .tree()
        .list_child(list, idx)
        .ok_or_else(|| SyncError::bad_path(path, "split index out of bounds"))?;

    // Successor props: the node's own, minus content keys.
    let here_value = txn.tree().value_of(here);
    let mut next_map: BTreeMap<String, Value> =
        here_value.as_map().cloned().unwrap_or_default();
    next_map.remove("children");
    next_map.remove("text");
    let patched_content = patch.contains_key("children") || patch.contains_key("text");

    if let Some(text_obj) = txn.tree().node_text(here) {
        let total = txn.tree().text_len(text_obj).unwrap_or(0);
        let at = offset.min(total);
        let suffix: String = txn
            .tree()
            .text_of(text_obj)
            .unwrap_or_default()
            .chars()
            .skip(at)
            .collect();
        txn.text_remove(text_obj, at, total - at)?;
        next_map.insert("text".to_string(), Value::text(suffix));
        overlay_patch(&mut next_map, patch);
        txn.insert_node(list, idx + 1, &Value::Map(next_map))?;
        Ok(())
    } else if let Some(children_obj) = txn.tree().node_children(here) {
        let total = txn.tree().list_len(children_obj).unwrap_or(0);
        let at = offset.min(total);
        let movers: Vec<ObjId> = (at..total)
            .map(|k| txn.tree().list_child(children_obj, k))
            .collect::<Option<_>>()
            .ok_or_else(|| SyncError::Internal("non-node child in split source".into()))?;
        // The suffix leaves the split node unconditionally, mirroring the
        // editor; where it ends up depends on whether the patch replaced
        // the successor's content.
        for _ in at..total {
            txn.list_remove(children_obj, at)?;
        }
        next_map.insert("children".to_string(), Value::empty_list());
        overlay_patch(&mut next_map, patch);
        let next = txn.insert_node(list, idx + 1, &Value::Map(next_map))?;
        if !patched_content {
            let next_children = txn
                .tree()
                .node_children(next)
                .ok_or_else(|| SyncError::Internal("split successor has no children".into()))?;
            for (k, child) in movers.into_iter().enumerate() {
                txn.list_insert_existing(next_children, k, child)?;
            }
        }
        Ok(())
    } else {
        Err(SyncError::bad_path(path, "split target has no content"))
    }
}

/// Overlay a patch onto a plain node map, with the editor's content-key
/// semantics.
fn overlay_patch(map: &mut BTreeMap<String, Value>, patch: &PropPatch) {
    for (key, entry) in patch {
        match key.as_str() {
            "children" => {
                map.remove("text");
                let v = match entry {
                    PatchEntry::Set(v @ Value::List(_)) => v.clone(),
                    _ => Value::empty_list(),
                };
                map.insert("children".to_string(), v);
            }
            "text" => {
                map.remove("children");
                map.insert("text".to_string(), Value::text(patch_text_content(entry)));
            }
            _ => match entry {
                PatchEntry::Set(v) => {
                    map.insert(key.clone(), v.clone());
                }
                PatchEntry::Delete => {
                    map.remove(key);
                }
            },
        }
    }
}

fn patch_text_content(entry: &PatchEntry) -> String {
    match entry {
        PatchEntry::Set(Value::Text(s)) => s.clone(),
        PatchEntry::Set(Value::Scalar(s)) => {
            s.as_str().unwrap_or_default().to_string()
        }
        _ => String::new(),
    }
}
