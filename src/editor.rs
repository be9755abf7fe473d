// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The client-local editable document.
//!
//! A [`Document`] is a tree of paragraph nodes, each holding properties
//! (language tag, speaker id, alternative speakers) and an ordered list of
//! text-token children. It is single-writer and mutable: the editor applies
//! [`Operation`]s directly, and the remote event translator replays
//! translated operations onto it through the same [`Document::apply`] call.
//!
//! There is deliberately no change-subscription machinery here. Whether an
//! apply originates locally or remotely is decided by which code path calls
//! it, not by a mutable "remote in progress" flag.
//!
//! # Invariants
//!
//! - every paragraph has at least one child
//! - the root has at least one paragraph
//!
//! Violations are repaired by [`Document::repair_ops`], which emits ordinary
//! operations for the caller to feed through the local pipeline. Repair is
//! never run during remote replay: the remote batch itself restores a valid
//! shape by construction, and injecting extra ops would break the post-batch
//! consistency check.

use crate::error::{Result, SyncError};
use crate::op::{split_last, Operation, PatchEntry, PropPatch};
use crate::value::Value;
use std::collections::BTreeMap;

/// Node content: either ordered child nodes or literal text.
///
/// A node is "text-bearing" when its content is `Text`.
#[derive(Debug, Clone, PartialEq)]
pub enum Children {
    Nodes(Vec<Node>),
    Text(String),
}

/// One node of the editable document.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Plain properties (speaker, language, timestamps, ...).
    pub props: BTreeMap<String, Value>,
    /// Child nodes or literal text.
    pub children: Children,
}

impl Node {
    /// Empty container node.
    pub fn empty() -> Self {
        Node {
            props: BTreeMap::new(),
            children: Children::Nodes(Vec::new()),
        }
    }

    /// Text node with the given content.
    pub fn text(s: impl Into<String>) -> Self {
        Node {
            props: BTreeMap::new(),
            children: Children::Text(s.into()),
        }
    }

    /// Whether this node carries literal text.
    pub fn is_text(&self) -> bool {
        matches!(self.children, Children::Text(_))
    }

    /// Child nodes, or an error if this is a text node.
    pub fn nodes(&self) -> Option<&Vec<Node>> {
        match &self.children {
            Children::Nodes(n) => Some(n),
            Children::Text(_) => None,
        }
    }

    fn nodes_mut(&mut self) -> Option<&mut Vec<Node>> {
        match &mut self.children {
            Children::Nodes(n) => Some(n),
            Children::Text(_) => None,
        }
    }

    /// Build a node from a plain value.
    ///
    /// A map with a `text` entry becomes a text node; a map with a
    /// `children` entry becomes a container node; remaining map entries
    /// become properties. Anything else is rejected: list elements of the
    /// document are always nodes.
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = value.as_map().ok_or_else(|| {
            SyncError::Internal(format!("node value must be a map, got {:?}", value))
        })?;

        let mut node = match map.get("text") {
            Some(Value::Text(s)) => Node::text(s.clone()),
            Some(Value::Scalar(s)) => Node::text(s.as_str().unwrap_or_default().to_string()),
            Some(other) => {
                return Err(SyncError::Internal(format!(
                    "text entry must be textual, got {:?}",
                    other
                )))
            }
            None => Node::empty(),
        };

        if let Some(children) = map.get("children") {
            let list = children.as_list().ok_or_else(|| {
                SyncError::Internal("children entry must be a list".to_string())
            })?;
            let mut nodes = Vec::with_capacity(list.len());
            for child in list {
                nodes.push(Node::from_value(child)?);
            }
            node.children = Children::Nodes(nodes);
        }

        for (key, v) in map {
            if key == "text" || key == "children" {
                continue;
            }
            node.props.insert(key.clone(), v.clone());
        }
        Ok(node)
    }

    /// Read this node back as a plain value.
    pub fn to_value(&self) -> Value {
        let mut map: BTreeMap<String, Value> = self.props.clone();
        match &self.children {
            Children::Nodes(nodes) => {
                map.insert(
                    "children".to_string(),
                    Value::List(nodes.iter().map(Node::to_value).collect()),
                );
            }
            Children::Text(s) => {
                map.insert("text".to_string(), Value::Text(s.clone()));
            }
        }
        Value::Map(map)
    }
}

/// The editable document: a list of paragraph nodes plus a speaker-name
/// table (speaker id → display name).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    paragraphs: Vec<Node>,
    speakers: BTreeMap<String, String>,
}

impl Document {
    /// Empty document. Callers are expected to run [`repair_ops`](Self::repair_ops)
    /// before handing it to an editor.
    pub fn new() -> Self {
        Self::default()
    }

    /// The paragraph list.
    pub fn paragraphs(&self) -> &[Node] {
        &self.paragraphs
    }

    /// The speaker-name table.
    pub fn speakers(&self) -> &BTreeMap<String, String> {
        &self.speakers
    }

    /// Set a speaker's display name.
    pub fn set_speaker_name(&mut self, speaker_id: &str, name: impl Into<String>) {
        self.speakers.insert(speaker_id.to_string(), name.into());
    }

    /// Splice a speaker's display name at a character offset (remote edits
    /// arrive as text diffs, not whole names).
    pub fn splice_speaker_name(&mut self, speaker_id: &str, offset: usize, delete: usize, insert: &str) {
        let name = self.speakers.entry(speaker_id.to_string()).or_default();
        let mut chars: Vec<char> = name.chars().collect();
        let offset = offset.min(chars.len());
        let delete = delete.min(chars.len() - offset);
        chars.splice(offset..offset + delete, insert.chars());
        *name = chars.into_iter().collect();
    }

    /// Remove a speaker from the table.
    pub fn remove_speaker(&mut self, speaker_id: &str) {
        self.speakers.remove(speaker_id);
    }

    /// Resolve a node by path.
    pub fn node_at(&self, path: &[usize]) -> Result<&Node> {
        let (first, rest) = path
            .split_first()
            .ok_or_else(|| SyncError::bad_path(path, "root is not a node"))?;
        let mut node = self
            .paragraphs
            .get(*first)
            .ok_or_else(|| SyncError::bad_path(path, "no paragraph at index"))?;
        for idx in rest {
            node = node
                .nodes()
                .and_then(|n| n.get(*idx))
                .ok_or_else(|| SyncError::bad_path(path, "no child at index"))?;
        }
        Ok(node)
    }

    fn node_at_mut(&mut self, path: &[usize]) -> Result<&mut Node> {
        let (first, rest) = path
            .split_first()
            .ok_or_else(|| SyncError::bad_path(path, "root is not a node"))?;
        let err = || SyncError::bad_path(path, "path does not resolve");
        let mut node = self.paragraphs.get_mut(*first).ok_or_else(err)?;
        for idx in rest {
            node = node.nodes_mut().and_then(|n| n.get_mut(*idx)).ok_or_else(err)?;
        }
        Ok(node)
    }

    /// The child list containing the node addressed by `path`.
    fn sibling_list_mut(&mut self, path: &[usize]) -> Result<&mut Vec<Node>> {
        let (parent, _) =
            split_last(path).ok_or_else(|| SyncError::bad_path(path, "root has no siblings"))?;
        if parent.is_empty() {
            Ok(&mut self.paragraphs)
        } else {
            self.node_at_mut(parent)?
                .nodes_mut()
                .ok_or_else(|| SyncError::bad_path(path, "parent is a text node"))
        }
    }

    /// Apply a single operation.
    ///
    /// Used for both local edits and remote replay; the caller decides
    /// which pipeline the resulting state feeds (or doesn't feed) into.
    pub fn apply(&mut self, op: &Operation) -> Result<()> {
        match op {
            Operation::InsertNode { path, node } => {
                let node = Node::from_value(node)?;
                let (_, idx) =
                    split_last(path).ok_or_else(|| SyncError::bad_path(path, "cannot insert at root"))?;
                let list = self.sibling_list_mut(path)?;
                if idx > list.len() {
                    return Err(SyncError::bad_path(path, "insert index out of bounds"));
                }
                list.insert(idx, node);
            }

            Operation::RemoveNode { path } => {
                let (_, idx) =
                    split_last(path).ok_or_else(|| SyncError::bad_path(path, "cannot remove root"))?;
                let list = self.sibling_list_mut(path)?;
                if idx >= list.len() {
                    return Err(SyncError::bad_path(path, "remove index out of bounds"));
                }
                list.remove(idx);
            }

            Operation::SetNode { path, patch } => {
                let node = self.node_at_mut(path)?;
                apply_patch(node, patch);
            }

            Operation::MergeNode { path } => {
                let (_, idx) =
                    split_last(path).ok_or_else(|| SyncError::bad_path(path, "cannot merge root"))?;
                if idx == 0 {
                    return Err(SyncError::bad_path(path, "no preceding sibling to merge into"));
                }
                let list = self.sibling_list_mut(path)?;
                if idx >= list.len() {
                    return Err(SyncError::bad_path(path, "merge index out of bounds"));
                }
                let here = list.remove(idx);
                let prev = &mut list[idx - 1];
                match (&mut prev.children, here.children) {
                    (Children::Text(prev_text), Children::Text(here_text)) => {
                        prev_text.push_str(&here_text);
                    }
                    (Children::Nodes(prev_nodes), Children::Nodes(here_nodes)) => {
                        prev_nodes.extend(here_nodes);
                    }
                    _ => {
                        return Err(SyncError::bad_path(path, "cannot merge text into container"));
                    }
                }
            }

            Operation::SplitNode { path, offset, patch } => {
                let (_, idx) =
                    split_last(path).ok_or_else(|| SyncError::bad_path(path, "cannot split root"))?;
                let list = self.sibling_list_mut(path)?;
                let here = list
                    .get_mut(idx)
                    .ok_or_else(|| SyncError::bad_path(path, "split index out of bounds"))?;
                let mut next = Node {
                    props: here.props.clone(),
                    children: match &mut here.children {
                        Children::Text(s) => {
                            let chars: Vec<char> = s.chars().collect();
                            let at = (*offset).min(chars.len());
                            let suffix: String = chars[at..].iter().collect();
                            *s = chars[..at].iter().collect();
                            Children::Text(suffix)
                        }
                        Children::Nodes(nodes) => {
                            let at = (*offset).min(nodes.len());
                            Children::Nodes(nodes.split_off(at))
                        }
                    },
                };
                apply_patch(&mut next, patch);
                list.insert(idx + 1, next);
            }

            Operation::MoveNode { from, to } => {
                let (_, from_idx) =
                    split_last(from).ok_or_else(|| SyncError::bad_path(from, "cannot move root"))?;
                let (_, to_idx) =
                    split_last(to).ok_or_else(|| SyncError::bad_path(to, "cannot move onto root"))?;
                let node = {
                    let list = self.sibling_list_mut(from)?;
                    if from_idx >= list.len() {
                        return Err(SyncError::bad_path(from, "move source out of bounds"));
                    }
                    list.remove(from_idx)
                };
                // Destination is resolved after removal, per operation semantics.
                let list = self.sibling_list_mut(to)?;
                if to_idx > list.len() {
                    return Err(SyncError::bad_path(to, "move destination out of bounds"));
                }
                list.insert(to_idx, node);
            }

            Operation::InsertText { path, offset, text } => {
                let node = self.node_at_mut(path)?;
                match &mut node.children {
                    Children::Text(s) => {
                        let mut chars: Vec<char> = s.chars().collect();
                        let at = (*offset).min(chars.len());
                        chars.splice(at..at, text.chars());
                        *s = chars.into_iter().collect();
                    }
                    Children::Nodes(_) => {
                        return Err(SyncError::bad_path(path, "insert_text on a container node"));
                    }
                }
            }

            Operation::RemoveText { path, offset, len } => {
                let node = self.node_at_mut(path)?;
                match &mut node.children {
                    Children::Text(s) => {
                        let mut chars: Vec<char> = s.chars().collect();
                        let at = (*offset).min(chars.len());
                        let n = (*len).min(chars.len() - at);
                        chars.drain(at..at + n);
                        *s = chars.into_iter().collect();
                    }
                    Children::Nodes(_) => {
                        return Err(SyncError::bad_path(path, "remove_text on a container node"));
                    }
                }
            }

            Operation::SetSelection => {}
        }
        Ok(())
    }

    /// Apply an ordered batch of operations.
    pub fn apply_batch(&mut self, ops: &[Operation]) -> Result<()> {
        for op in ops {
            self.apply(op)?;
        }
        Ok(())
    }

    /// Compute the operations needed to restore the document invariants.
    ///
    /// Returns an empty vec when the document is already well-formed. The
    /// caller applies these through the normal local pipeline so the
    /// replicated tree stays in step.
    pub fn repair_ops(&self) -> Vec<Operation> {
        let mut ops = Vec::new();
        if self.paragraphs.is_empty() {
            ops.push(Operation::InsertNode {
                path: vec![0],
                node: default_paragraph(),
            });
            return ops;
        }
        for (i, para) in self.paragraphs.iter().enumerate() {
            if let Children::Nodes(children) = &para.children {
                if children.is_empty() {
                    ops.push(Operation::InsertNode {
                        path: vec![i, 0],
                        node: Value::map_of([("text", Value::text(""))]),
                    });
                }
            }
        }
        ops
    }

    /// Read the whole document back as a plain value.
    ///
    /// The shape matches the replicated tree's materialization exactly;
    /// the two are compared with deep equality after every remote batch.
    pub fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert(
            "children".to_string(),
            Value::List(self.paragraphs.iter().map(Node::to_value).collect()),
        );
        map.insert(
            "speakers".to_string(),
            Value::Map(
                self.speakers
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::Text(v.clone())))
                    .collect(),
            ),
        );
        Value::Map(map)
    }
}

/// A fresh paragraph satisfying the document invariants.
pub fn default_paragraph() -> Value {
    Value::map_of([(
        "children",
        Value::List(vec![Value::map_of([("text", Value::text(""))])]),
    )])
}

fn apply_patch(node: &mut Node, patch: &PropPatch) {
    for (key, entry) in patch {
        match key.as_str() {
            // Structural entries replace the node's content wholesale.
            "children" => {
                node.children = match entry {
                    PatchEntry::Set(Value::List(list)) => Children::Nodes(
                        list.iter()
                            .filter_map(|v| Node::from_value(v).ok())
                            .collect(),
                    ),
                    _ => Children::Nodes(Vec::new()),
                };
            }
            "text" => {
                node.children = match entry {
                    PatchEntry::Set(Value::Text(s)) => Children::Text(s.clone()),
                    PatchEntry::Set(Value::Scalar(s)) => {
                        Children::Text(s.as_str().unwrap_or_default().to_string())
                    }
                    _ => Children::Text(String::new()),
                };
            }
            _ => match entry {
                PatchEntry::Set(v) => {
                    node.props.insert(key.clone(), v.clone());
                }
                PatchEntry::Delete => {
                    node.props.remove(key);
                }
            },
        }
    }
}
