// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The replicated document tree.
//!
//! A [`DocTree`] is one replica's copy of the shared document state: an
//! arena of containers addressed by [`ObjId`], mutated only through
//! recorded operations. Local mutations go through a [`Transaction`],
//! which applies operations eagerly and yields a [`Change`] on commit;
//! remote changes enter through [`DocTree::import`], which applies them
//! and emits the [`EventBatch`] the remote translator replays onto the
//! editable document.
//!
//! ```text
//!                 Transaction::commit ──► Change (to the wire)
//!                        │
//!   local mutation ──────┘
//!                             DocTree arena
//!                 ┌───────────────────────────────┐
//!                 │ Root map ── "speakers" map    │
//!                 │    └── "children" list        │
//!                 │          └── paragraph maps   │
//!                 │                └── token maps │
//!                 │                     └── text  │
//!                 └───────────────────────────────┘
//!                        ▲
//!   wire change ── DocTree::import ──► EventBatch (to the editor)
//! ```
//!
//! # Container kinds
//!
//! | Kind | Conflict rule                                       |
//! |------|-----------------------------------------------------|
//! | Map  | Last writer wins per key, ordered by [`OpId`]       |
//! | List | RGA: tombstoned elements, siblings by descending id |
//! | Text | RGA over characters                                 |
//!
//! Only document *content* becomes nested containers: a node's `text`
//! entry is a text container and its `children` entry a node list, so
//! concurrent edits inside them merge. Every other map entry is a plain
//! register replaced whole on write.
//!
//! The root map, its `children` paragraph list, and its `speakers` map
//! exist implicitly on every replica. All other containers are created by
//! an operation and keep that operation's id for life, so a node move is a
//! delete plus a re-insert of the *same* container id and never forks the
//! subtree.
//!
//! Causal delivery is a precondition of `import`: the server's total order
//! plus the sequencer deliver every actor's changes gap-free, so a gap
//! here is a consistency failure, not something to buffer around.

pub mod change;
pub mod event;
pub mod rga;

use crate::error::{Result, SyncError};
use crate::tree::change::{
    ActorId, Anchor, Change, ContainerKind, ObjId, OpId, OpValue, TreeOp,
};
use crate::tree::event::{
    Diff, EventBatch, ListRun, MapEntryDiff, PathSeg, TextRun, TreeEvent, TreePath,
};
use crate::tree::rga::Rga;
use crate::value::{Scalar, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

/// A value stored inside a container.
#[derive(Debug, Clone, PartialEq)]
enum StoredValue {
    /// Opaque register content, replaced whole on write.
    Literal(Value),
    /// Reference to a nested container.
    Child(ObjId),
}

/// One map register. `value: None` is a delete tombstone; the id stays so
/// later concurrent writes can still lose to it.
#[derive(Debug, Clone)]
struct MapSlot {
    id: OpId,
    value: Option<StoredValue>,
}

#[derive(Debug, Clone)]
enum Container {
    Map(HashMap<String, MapSlot>),
    List(Rga<StoredValue>),
    Text(Rga<char>),
}

impl Container {
    fn new(kind: ContainerKind) -> Self {
        match kind {
            ContainerKind::Map => Container::Map(HashMap::new()),
            ContainerKind::List => Container::List(Rga::new()),
            ContainerKind::Text => Container::Text(Rga::new()),
        }
    }

    fn kind(&self) -> ContainerKind {
        match self {
            Container::Map(_) => ContainerKind::Map,
            Container::List(_) => ContainerKind::List,
            Container::Text(_) => ContainerKind::Text,
        }
    }
}

/// How a container hangs off its parent.
#[derive(Debug, Clone)]
enum Link {
    Key(String),
    Elem(OpId),
}

#[derive(Debug, Clone)]
struct ParentLink {
    parent: ObjId,
    link: Link,
}

/// The concrete mutation one applied operation performed, before it is
/// addressed with a path. Operations that lose a race (stale LWW write,
/// double delete) produce no effect.
enum Effect {
    Map {
        obj: ObjId,
        key: String,
        value: Option<Value>,
    },
    ListInsert {
        obj: ObjId,
        index: usize,
        value: Value,
    },
    ListDelete {
        obj: ObjId,
        index: usize,
    },
    TextInsert {
        obj: ObjId,
        offset: usize,
        text: String,
    },
    TextDelete {
        obj: ObjId,
        offset: usize,
    },
}

/// One replica's copy of the shared document.
#[derive(Debug, Clone)]
pub struct DocTree {
    actor: ActorId,
    containers: HashMap<ObjId, Container>,
    parents: HashMap<ObjId, ParentLink>,
    /// Highest lamport counter seen anywhere, local or imported.
    counter: u64,
    /// Highest change seq applied per actor (our own commits included).
    applied: HashMap<ActorId, u64>,
    /// Every applied change, in application order. Snapshot source.
    history: Vec<Change>,
}

impl DocTree {
    pub fn new(actor: ActorId) -> Self {
        let mut containers = HashMap::new();
        containers.insert(ObjId::Root, Container::new(ContainerKind::Map));
        containers.insert(ObjId::Children, Container::new(ContainerKind::List));
        containers.insert(ObjId::Speakers, Container::new(ContainerKind::Map));
        DocTree {
            actor,
            containers,
            parents: HashMap::new(),
            counter: 0,
            applied: HashMap::new(),
            history: Vec::new(),
        }
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    /// Open a transaction for local mutations.
    ///
    /// Operations apply to the tree as they are issued; `commit` seals them
    /// into a [`Change`]. A transaction that errors mid-way leaves the
    /// session unusable; callers treat that as fatal and tear down.
    pub fn transaction(&mut self) -> Transaction<'_> {
        let start = self.counter + 1;
        Transaction {
            tree: self,
            ops: Vec::new(),
            start_counter: start,
            next_counter: start,
        }
    }

    /// Apply a remote change and report what it did as replayable events.
    ///
    /// Re-delivery of an already-applied change (our own echo included) is
    /// a no-op yielding an empty batch. A per-actor sequence gap means the
    /// delivery layer above is broken and is reported as fatal.
    pub fn import(&mut self, change: &Change) -> Result<EventBatch> {
        let seen = self.applied.get(&change.actor).copied().unwrap_or(0);
        if change.seq <= seen {
            trace!(actor = %change.actor, seq = change.seq, "duplicate change skipped");
            return Ok(EventBatch::remote(Vec::new()));
        }
        if change.seq != seen + 1 {
            return Err(SyncError::Internal(format!(
                "change gap for actor {}: got seq {}, expected {}",
                change.actor,
                change.seq,
                seen + 1
            )));
        }
        let mut events = Vec::new();
        let mut counter = change.start_counter;
        for op in &change.ops {
            let id = OpId::new(counter, change.actor);
            if let Some(effect) = self.apply_op(id, op)? {
                // Paths are resolved immediately: later operations in the
                // same change shift visible indices.
                if let Some(ev) = self.event_for(effect) {
                    events.push(ev);
                }
            }
            counter += op.counter_span();
        }
        self.applied.insert(change.actor, change.seq);
        self.counter = self.counter.max(change.max_counter());
        self.history.push(change.clone());
        Ok(EventBatch::remote(events))
    }

    /// Every applied change, encoded in application order. Replaying these
    /// into a fresh tree reproduces this replica's state exactly.
    pub fn export_snapshot(&self) -> Vec<Vec<u8>> {
        self.history.iter().map(Change::encode).collect()
    }

    pub fn history(&self) -> &[Change] {
        &self.history
    }

    /// Materialize the whole document.
    pub fn to_value(&self) -> Value {
        self.value_of(ObjId::Root)
    }

    /// Materialize one container.
    pub fn value_of(&self, obj: ObjId) -> Value {
        match self.containers.get(&obj) {
            Some(Container::Map(map)) => {
                let mut out = BTreeMap::new();
                if obj == ObjId::Root {
                    out.insert("children".to_string(), self.value_of(ObjId::Children));
                    out.insert("speakers".to_string(), self.value_of(ObjId::Speakers));
                }
                for (key, slot) in map {
                    // The implicit root containers cannot be shadowed.
                    if obj == ObjId::Root && (key == "children" || key == "speakers") {
                        continue;
                    }
                    if let Some(stored) = &slot.value {
                        out.insert(key.clone(), self.stored_value(stored));
                    }
                }
                Value::Map(out)
            }
            Some(Container::List(rga)) => Value::List(
                rga.iter_visible().map(|e| self.stored_value(&e.value)).collect(),
            ),
            Some(Container::Text(rga)) => {
                Value::Text(rga.iter_visible().map(|e| e.value).collect())
            }
            None => Value::empty_map(),
        }
    }

    // ---- read access for the translators ------------------------------

    /// The container a map key currently points at.
    pub fn map_child(&self, obj: ObjId, key: &str) -> Option<ObjId> {
        match self.containers.get(&obj)? {
            Container::Map(map) => match map.get(key)?.value {
                Some(StoredValue::Child(child)) => Some(child),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether a map key currently holds any value.
    pub fn map_has(&self, obj: ObjId, key: &str) -> bool {
        match self.containers.get(&obj) {
            Some(Container::Map(map)) => {
                matches!(map.get(key), Some(slot) if slot.value.is_some())
            }
            _ => false,
        }
    }

    /// The container at a visible list index.
    pub fn list_child(&self, obj: ObjId, idx: usize) -> Option<ObjId> {
        match self.containers.get(&obj)? {
            Container::List(rga) => match rga.visible_get(idx)?.value {
                StoredValue::Child(child) => Some(child),
                _ => None,
            },
            _ => None,
        }
    }

    /// Id of the insert that created the visible list element at `idx`.
    pub fn list_target(&self, obj: ObjId, idx: usize) -> Option<OpId> {
        match self.containers.get(&obj)? {
            Container::List(rga) => rga.visible_get(idx).map(|e| e.id),
            _ => None,
        }
    }

    pub fn list_len(&self, obj: ObjId) -> Option<usize> {
        match self.containers.get(&obj)? {
            Container::List(rga) => Some(rga.visible_len()),
            _ => None,
        }
    }

    /// The visible characters of a text container.
    pub fn text_of(&self, obj: ObjId) -> Option<String> {
        match self.containers.get(&obj)? {
            Container::Text(rga) => Some(rga.iter_visible().map(|e| e.value).collect()),
            _ => None,
        }
    }

    pub fn text_len(&self, obj: ObjId) -> Option<usize> {
        match self.containers.get(&obj)? {
            Container::Text(rga) => Some(rga.visible_len()),
            _ => None,
        }
    }

    /// Ids of the visible characters in `offset..offset + len`.
    pub fn text_char_ids(&self, obj: ObjId, offset: usize, len: usize) -> Vec<OpId> {
        match self.containers.get(&obj) {
            Some(Container::Text(rga)) => rga
                .iter_visible()
                .skip(offset)
                .take(len)
                .map(|e| e.id)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn kind_of(&self, obj: ObjId) -> Option<ContainerKind> {
        self.containers.get(&obj).map(Container::kind)
    }

    /// A node's own text container, if it is a text node.
    pub fn node_text(&self, node: ObjId) -> Option<ObjId> {
        let child = self.map_child(node, "text")?;
        (self.kind_of(child) == Some(ContainerKind::Text)).then_some(child)
    }

    /// A node's child-node list, if it is a container node.
    pub fn node_children(&self, node: ObjId) -> Option<ObjId> {
        let child = self.map_child(node, "children")?;
        (self.kind_of(child) == Some(ContainerKind::List)).then_some(child)
    }

    /// Resolve an editor node path (indices into nested `children` lists)
    /// to the node's map container.
    pub fn resolve_node(&self, path: &[usize]) -> Result<ObjId> {
        let mut list = ObjId::Children;
        for (depth, &idx) in path.iter().enumerate() {
            let node = self.list_child(list, idx).ok_or_else(|| {
                SyncError::bad_path(&path[..=depth], "no node at index")
            })?;
            if depth + 1 == path.len() {
                return Ok(node);
            }
            list = self.node_children(node).ok_or_else(|| {
                SyncError::bad_path(&path[..=depth], "node has no children")
            })?;
        }
        Err(SyncError::bad_path(&[], "empty node path"))
    }

    /// Resolve the list container a node at `parent_path ++ [i]` would live
    /// in. The empty path is the root paragraph list.
    pub fn resolve_parent_list(&self, parent_path: &[usize]) -> Result<ObjId> {
        if parent_path.is_empty() {
            return Ok(ObjId::Children);
        }
        let node = self.resolve_node(parent_path)?;
        self.node_children(node)
            .ok_or_else(|| SyncError::bad_path(parent_path, "node cannot hold children"))
    }

    // ---- internals ----------------------------------------------------

    fn stored_value(&self, stored: &StoredValue) -> Value {
        match stored {
            StoredValue::Literal(v) => v.clone(),
            StoredValue::Child(obj) => self.value_of(*obj),
        }
    }

    fn map_mut(&mut self, obj: ObjId) -> Result<&mut HashMap<String, MapSlot>> {
        match self.containers.get_mut(&obj) {
            Some(Container::Map(map)) => Ok(map),
            Some(c) => Err(SyncError::Internal(format!(
                "map operation on {:?} container",
                c.kind()
            ))),
            None => Err(SyncError::Internal("map operation on unknown container".into())),
        }
    }

    fn list_mut(&mut self, obj: ObjId) -> Result<&mut Rga<StoredValue>> {
        match self.containers.get_mut(&obj) {
            Some(Container::List(rga)) => Ok(rga),
            Some(c) => Err(SyncError::Internal(format!(
                "list operation on {:?} container",
                c.kind()
            ))),
            None => Err(SyncError::Internal("list operation on unknown container".into())),
        }
    }

    fn text_mut(&mut self, obj: ObjId) -> Result<&mut Rga<char>> {
        match self.containers.get_mut(&obj) {
            Some(Container::Text(rga)) => Ok(rga),
            Some(c) => Err(SyncError::Internal(format!(
                "text operation on {:?} container",
                c.kind()
            ))),
            None => Err(SyncError::Internal("text operation on unknown container".into())),
        }
    }

    /// Turn an operation value into its stored form, creating fresh
    /// containers in the arena. A freshly created container takes the
    /// operation's own id.
    fn resolve_op_value(&mut self, id: OpId, value: &OpValue) -> Result<StoredValue> {
        match value {
            OpValue::Literal(v) => Ok(StoredValue::Literal(v.clone())),
            OpValue::New(kind) => {
                let obj = ObjId::Obj(id);
                self.containers.insert(obj, Container::new(*kind));
                Ok(StoredValue::Child(obj))
            }
            OpValue::Existing(obj) => {
                if !self.containers.contains_key(obj) {
                    return Err(SyncError::Internal(
                        "re-attach of unknown container".into(),
                    ));
                }
                Ok(StoredValue::Child(*obj))
            }
        }
    }

    fn apply_op(&mut self, id: OpId, op: &TreeOp) -> Result<Option<Effect>> {
        match op {
            TreeOp::MapSet { obj, key, value } => {
                let stored = self.resolve_op_value(id, value)?;
                let map = self.map_mut(*obj)?;
                if let Some(slot) = map.get(key) {
                    if slot.id > id {
                        // Stale write; a created container stays in the
                        // arena unreachable, which is harmless.
                        return Ok(None);
                    }
                }
                map.insert(key.clone(), MapSlot { id, value: Some(stored.clone()) });
                if let StoredValue::Child(child) = stored {
                    self.parents.insert(
                        child,
                        ParentLink { parent: *obj, link: Link::Key(key.clone()) },
                    );
                }
                let value = Some(self.stored_value(&stored));
                Ok(Some(Effect::Map { obj: *obj, key: key.clone(), value }))
            }
            TreeOp::MapDelete { obj, key } => {
                let map = self.map_mut(*obj)?;
                let had_value = match map.get(key) {
                    Some(slot) if slot.id > id => return Ok(None),
                    Some(slot) => slot.value.is_some(),
                    None => false,
                };
                map.insert(key.clone(), MapSlot { id, value: None });
                if !had_value {
                    return Ok(None);
                }
                Ok(Some(Effect::Map { obj: *obj, key: key.clone(), value: None }))
            }
            TreeOp::ListInsert { obj, origin, value } => {
                let stored = self.resolve_op_value(id, value)?;
                let list = self.list_mut(*obj)?;
                let index = list.integrate(id, *origin, stored.clone()).ok_or_else(|| {
                    SyncError::Internal("list insert anchor unknown".into())
                })?;
                if let StoredValue::Child(child) = stored {
                    self.parents.insert(
                        child,
                        ParentLink { parent: *obj, link: Link::Elem(id) },
                    );
                }
                let value = self.stored_value(&stored);
                Ok(Some(Effect::ListInsert { obj: *obj, index, value }))
            }
            TreeOp::ListDelete { obj, target } => {
                let list = self.list_mut(*obj)?;
                Ok(list
                    .delete(*target)
                    .map(|index| Effect::ListDelete { obj: *obj, index }))
            }
            TreeOp::TextInsert { obj, origin, text } => {
                let rga = self.text_mut(*obj)?;
                let mut anchor = *origin;
                let mut first = None;
                for (k, ch) in text.chars().enumerate() {
                    let char_id = OpId::new(id.counter + k as u64, id.actor);
                    let vis = rga.integrate(char_id, anchor, ch).ok_or_else(|| {
                        SyncError::Internal("text insert anchor unknown".into())
                    })?;
                    if first.is_none() {
                        first = Some(vis);
                    }
                    anchor = Anchor::After(char_id);
                }
                Ok(first.map(|offset| Effect::TextInsert {
                    obj: *obj,
                    offset,
                    text: text.clone(),
                }))
            }
            TreeOp::TextDelete { obj, target } => {
                let rga = self.text_mut(*obj)?;
                Ok(rga
                    .delete(*target)
                    .map(|offset| Effect::TextDelete { obj: *obj, offset }))
            }
        }
    }

    /// Address an effect with its current root-relative path. Effects on
    /// detached subtrees resolve to no path and emit nothing: they cannot
    /// change the materialized document.
    fn event_for(&self, effect: Effect) -> Option<TreeEvent> {
        let (obj, diff) = match effect {
            Effect::Map { obj, key, value } => {
                (obj, Diff::Map(vec![MapEntryDiff { key, value }]))
            }
            Effect::ListInsert { obj, index, value } => {
                let mut runs = Vec::new();
                if index > 0 {
                    runs.push(ListRun::Retain(index));
                }
                runs.push(ListRun::Insert(vec![value]));
                (obj, Diff::List(runs))
            }
            Effect::ListDelete { obj, index } => {
                let mut runs = Vec::new();
                if index > 0 {
                    runs.push(ListRun::Retain(index));
                }
                runs.push(ListRun::Delete(1));
                (obj, Diff::List(runs))
            }
            Effect::TextInsert { obj, offset, text } => {
                let mut runs = Vec::new();
                if offset > 0 {
                    runs.push(TextRun::Retain(offset));
                }
                runs.push(TextRun::Insert(text));
                (obj, Diff::Text(runs))
            }
            Effect::TextDelete { obj, offset } => {
                let mut runs = Vec::new();
                if offset > 0 {
                    runs.push(TextRun::Retain(offset));
                }
                runs.push(TextRun::Delete(1));
                (obj, Diff::Text(runs))
            }
        };
        let path = self.path_of(obj)?;
        Some(TreeEvent { path, diff })
    }

    /// Root-relative path of a container, or `None` when the container is
    /// detached (its parent link is stale or an ancestor is deleted).
    fn path_of(&self, obj: ObjId) -> Option<TreePath> {
        match obj {
            ObjId::Root => Some(Vec::new()),
            ObjId::Children => Some(vec![PathSeg::Key("children".to_string())]),
            ObjId::Speakers => Some(vec![PathSeg::Key("speakers".to_string())]),
            ObjId::Obj(_) => {
                let link = self.parents.get(&obj)?;
                let mut path = self.path_of(link.parent)?;
                match &link.link {
                    Link::Key(key) => {
                        // The slot must still point at us.
                        match self.containers.get(&link.parent)? {
                            Container::Map(map) => match &map.get(key)?.value {
                                Some(StoredValue::Child(c)) if *c == obj => {}
                                _ => return None,
                            },
                            _ => return None,
                        }
                        path.push(PathSeg::Key(key.clone()));
                    }
                    Link::Elem(id) => match self.containers.get(&link.parent)? {
                        Container::List(rga) => {
                            let index = rga.visible_index_of(*id)?;
                            match &rga.visible_get(index)?.value {
                                StoredValue::Child(c) if *c == obj => {}
                                _ => return None,
                            }
                            path.push(PathSeg::Index(index));
                        }
                        _ => return None,
                    },
                }
                Some(path)
            }
        }
    }
}

/// An open batch of local mutations.
///
/// Operations apply to the tree as they are issued, so later calls in the
/// same transaction observe earlier ones. Local commits emit no events;
/// the editable document was already mutated by the caller.
pub struct Transaction<'a> {
    tree: &'a mut DocTree,
    ops: Vec<TreeOp>,
    start_counter: u64,
    next_counter: u64,
}

impl Transaction<'_> {
    /// Read access to the tree, reflecting this transaction's operations
    /// so far.
    pub fn tree(&self) -> &DocTree {
        self.tree
    }

    /// The id the next recorded operation will take.
    fn next_id(&self) -> OpId {
        OpId::new(self.next_counter, self.tree.actor)
    }

    fn record(&mut self, op: TreeOp) -> Result<()> {
        let id = OpId::new(self.next_counter, self.tree.actor);
        self.next_counter += op.counter_span();
        self.tree.apply_op(id, &op)?;
        self.ops.push(op);
        Ok(())
    }

    /// Set a plain property register on a map container.
    pub fn map_put(&mut self, obj: ObjId, key: &str, value: &Value) -> Result<()> {
        self.record(TreeOp::MapSet {
            obj,
            key: key.to_string(),
            value: OpValue::Literal(value.clone()),
        })
    }

    pub fn map_delete(&mut self, obj: ObjId, key: &str) -> Result<()> {
        self.record(TreeOp::MapDelete { obj, key: key.to_string() })
    }

    /// Create a text container under `key` and fill it. Returns the new
    /// container's id.
    pub fn put_text(&mut self, obj: ObjId, key: &str, text: &str) -> Result<ObjId> {
        let created = ObjId::Obj(self.next_id());
        self.record(TreeOp::MapSet {
            obj,
            key: key.to_string(),
            value: OpValue::New(ContainerKind::Text),
        })?;
        self.text_insert(created, 0, text)?;
        Ok(created)
    }

    /// Create a node-list container under `key` and fill it with node
    /// values. Returns the new container's id.
    pub fn put_child_list(&mut self, obj: ObjId, key: &str, nodes: &[Value]) -> Result<ObjId> {
        let created = ObjId::Obj(self.next_id());
        self.record(TreeOp::MapSet {
            obj,
            key: key.to_string(),
            value: OpValue::New(ContainerKind::List),
        })?;
        for (idx, node) in nodes.iter().enumerate() {
            self.insert_node(created, idx, node)?;
        }
        Ok(created)
    }

    /// Insert a node (a map value) into a list container at a visible
    /// index. Returns the node container's id.
    ///
    /// The `text` entry becomes a text container and the `children` entry
    /// a nested node list; every other entry is a plain register.
    pub fn insert_node(&mut self, list: ObjId, idx: usize, node: &Value) -> Result<ObjId> {
        let map = node.as_map().ok_or_else(|| {
            SyncError::Internal(format!("node value must be a map, got {:?}", node))
        })?;
        let origin = self.anchor_at(list, idx)?;
        let created = ObjId::Obj(self.next_id());
        self.record(TreeOp::ListInsert {
            obj: list,
            origin,
            value: OpValue::New(ContainerKind::Map),
        })?;
        for (key, entry) in map {
            match (key.as_str(), entry) {
                ("text", Value::Text(s)) => {
                    self.put_text(created, "text", s)?;
                }
                ("text", other) => {
                    let s = other
                        .as_scalar()
                        .and_then(Scalar::as_str)
                        .unwrap_or_default()
                        .to_string();
                    self.put_text(created, "text", &s)?;
                }
                ("children", Value::List(items)) => {
                    self.put_child_list(created, "children", items)?;
                }
                ("children", _) => {
                    self.put_child_list(created, "children", &[])?;
                }
                (_, v) => self.map_put(created, key, v)?,
            }
        }
        // A node always has content; a map with neither entry is an empty
        // container node, matching the editor's reading of it.
        if !map.contains_key("text") && !map.contains_key("children") {
            self.put_child_list(created, "children", &[])?;
        }
        Ok(created)
    }

    /// Re-insert an existing container at a visible list index.
    pub fn list_insert_existing(&mut self, obj: ObjId, idx: usize, child: ObjId) -> Result<()> {
        let origin = self.anchor_at(obj, idx)?;
        self.record(TreeOp::ListInsert {
            obj,
            origin,
            value: OpValue::Existing(child),
        })
    }

    /// Remove the visible list element at `idx`.
    pub fn list_remove(&mut self, obj: ObjId, idx: usize) -> Result<()> {
        let target = self.tree.list_target(obj, idx).ok_or_else(|| {
            SyncError::Internal(format!("list remove index {} out of range", idx))
        })?;
        self.record(TreeOp::ListDelete { obj, target })
    }

    /// Insert characters at a visible text offset.
    pub fn text_insert(&mut self, obj: ObjId, offset: usize, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let origin = self.text_anchor_at(obj, offset)?;
        self.record(TreeOp::TextInsert { obj, origin, text: text.to_string() })
    }

    /// Remove `len` characters starting at a visible text offset.
    pub fn text_remove(&mut self, obj: ObjId, offset: usize, len: usize) -> Result<()> {
        let targets = self.tree.text_char_ids(obj, offset, len);
        if targets.len() != len {
            return Err(SyncError::Internal(format!(
                "text remove range {}..{} out of range",
                offset,
                offset + len
            )));
        }
        for target in targets {
            self.record(TreeOp::TextDelete { obj, target })?;
        }
        Ok(())
    }

    /// Seal the transaction. Returns `None` when nothing was recorded.
    pub fn commit(self) -> Option<Change> {
        if self.ops.is_empty() {
            return None;
        }
        let seq = self.tree.applied.get(&self.tree.actor).copied().unwrap_or(0) + 1;
        let change = Change {
            actor: self.tree.actor,
            seq,
            start_counter: self.start_counter,
            ops: self.ops,
        };
        self.tree.applied.insert(self.tree.actor, seq);
        self.tree.counter = self.tree.counter.max(change.max_counter());
        self.tree.history.push(change.clone());
        trace!(
            actor = %change.actor,
            seq = change.seq,
            ops = change.ops.len(),
            "committed local change"
        );
        Some(change)
    }

    fn anchor_at(&self, obj: ObjId, idx: usize) -> Result<Anchor> {
        if idx == 0 {
            return Ok(Anchor::Head);
        }
        self.tree
            .list_target(obj, idx - 1)
            .map(Anchor::After)
            .ok_or_else(|| {
                SyncError::Internal(format!("list insert index {} out of range", idx))
            })
    }

    fn text_anchor_at(&self, obj: ObjId, offset: usize) -> Result<Anchor> {
        if offset == 0 {
            return Ok(Anchor::Head);
        }
        let prev = self.tree.text_char_ids(obj, offset - 1, 1);
        prev.first().copied().map(Anchor::After).ok_or_else(|| {
            SyncError::Internal(format!("text insert offset {} out of range", offset))
        })
    }
}
