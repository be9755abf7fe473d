// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Change-events emitted when changes are imported into the tree.
//!
//! Each event describes a diff on exactly one container, addressed by a
//! path from the document root. Events are emitted in application order;
//! the remote event translator consumes them with a running cursor and
//! replays them onto the editable document.
//!
//! There are exactly three diff shapes, one per container kind. Inserted
//! and updated values are carried as tagged [`Value`]s: their `Map` /
//! `List` / `Text` / `Scalar` discriminant replaces the runtime
//! key-sniffing the source protocol used. A freshly created container
//! arrives as an empty value and is filled in by the nested events that
//! follow in the same batch; a re-attached container (a node move) arrives
//! with its full materialized value.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Where a batch of mutations originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    /// Committed by this replica's own local translator.
    Local,
    /// Imported from another replica (or replayed by undo).
    Remote,
}

/// One segment of a container path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathSeg {
    /// Map entry key.
    Key(String),
    /// Visible list index.
    Index(usize),
}

/// Root-relative path of the container an event describes.
pub type TreePath = Vec<PathSeg>;

/// One run of a list diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ListRun {
    /// Advance the cursor without mutation.
    Retain(usize),
    /// Remove this many elements at the cursor.
    Delete(usize),
    /// Insert these values at the cursor.
    Insert(Vec<Value>),
}

/// One run of a text diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TextRun {
    Retain(usize),
    Delete(usize),
    Insert(String),
}

/// One updated entry of a map diff. `None` means the key was deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntryDiff {
    pub key: String,
    pub value: Option<Value>,
}

/// A structural diff on one container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Diff {
    List(Vec<ListRun>),
    Map(Vec<MapEntryDiff>),
    Text(Vec<TextRun>),
}

/// A diff on one container, addressed from the document root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEvent {
    pub path: TreePath,
    pub diff: Diff,
}

/// The events produced by importing one change (or snapshot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    pub origin: Origin,
    pub events: Vec<TreeEvent>,
}

impl EventBatch {
    pub fn remote(events: Vec<TreeEvent>) -> Self {
        EventBatch {
            origin: Origin::Remote,
            events,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
