// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Actor identity, operation ids, and change units.
//!
//! A [`Change`] is the unit of replication: the ordered operations recorded
//! by one committed transaction, stamped with the committing actor and that
//! actor's next contiguous sequence number. Changes are opaque bytes on the
//! wire; [`Change::encode`]/[`Change::decode`] define the payload format.
//!
//! # Operation ids
//!
//! Every operation (and every inserted character) gets an [`OpId`]: a
//! lamport counter paired with the actor id. Ids are totally ordered
//! (counter first, actor as tiebreak), which is what the last-writer-wins
//! map registers and the RGA sibling ordering sort on. A change records only
//! its `start_counter`; the ids of its operations are reconstructed
//! deterministically on every replica.

use crate::error::Result;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Globally unique id of one editing client (replica).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ActorId(Uuid);

impl ActorId {
    /// Fresh random actor identity.
    pub fn random() -> Self {
        ActorId(Uuid::new_v4())
    }

    /// Fixed actor id for deterministic tests.
    pub fn from_u128(n: u128) -> Self {
        ActorId(Uuid::from_u128(n))
    }
}

impl fmt::Display for ActorId {
    // Actor ids show up in logs constantly; eight hex chars is plenty.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0.simple().to_string();
        write!(f, "{}", &s[..8])
    }
}

/// Unique id of one operation (or one inserted character).
///
/// Ordered by counter, then actor: the total order behind LWW registers
/// and RGA sibling placement.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct OpId {
    pub counter: u64,
    pub actor: ActorId,
}

impl OpId {
    pub fn new(counter: u64, actor: ActorId) -> Self {
        OpId { counter, actor }
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.counter, self.actor)
    }
}

/// Id of a container in the replicated tree.
///
/// The root map, its paragraph list, and its speaker map exist implicitly
/// on every replica, so two clients can never race to create them. All
/// other containers are identified by the id of the operation that created
/// them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum ObjId {
    /// The document root map.
    Root,
    /// The root's paragraph list (`children`).
    Children,
    /// The root's speaker-name map (`speakers`).
    Speakers,
    /// A container created by the operation with this id.
    Obj(OpId),
}

/// Insertion anchor in a list or text container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Anchor {
    /// Insert at the head of the sequence.
    Head,
    /// Insert after the element with this id.
    After(OpId),
}

/// The kind of container an operation creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerKind {
    Map,
    List,
    Text,
}

/// The value carried by a set/insert operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpValue {
    /// An opaque register value, replaced whole on every write. Scalars
    /// and plain property values (such as a list of speaker ids) travel
    /// this way.
    Literal(Value),
    /// Create a fresh, empty container; its id is the operation's own id.
    New(ContainerKind),
    /// Re-attach an existing container (node moves preserve identity).
    Existing(ObjId),
}

/// One replicated-tree operation inside a change.
///
/// Operations do not carry their own id; it is derived from the change's
/// `start_counter` plus the counter span of the preceding operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TreeOp {
    /// Set `key` on a map container (last-writer-wins).
    MapSet {
        obj: ObjId,
        key: String,
        value: OpValue,
    },
    /// Delete `key` from a map container (LWW tombstone).
    MapDelete { obj: ObjId, key: String },
    /// Insert a value after `origin` in a list container.
    ListInsert {
        obj: ObjId,
        origin: Anchor,
        value: OpValue,
    },
    /// Tombstone a list element.
    ListDelete { obj: ObjId, target: OpId },
    /// Insert a run of characters after `origin` in a text container.
    ///
    /// The run's characters take consecutive counters starting at the
    /// operation's id; each later character anchors on its predecessor.
    TextInsert {
        obj: ObjId,
        origin: Anchor,
        text: String,
    },
    /// Tombstone one character of a text container.
    TextDelete { obj: ObjId, target: OpId },
}

impl TreeOp {
    /// How many counter values this operation consumes.
    pub fn counter_span(&self) -> u64 {
        match self {
            TreeOp::TextInsert { text, .. } => text.chars().count().max(1) as u64,
            _ => 1,
        }
    }
}

/// A committed batch of tree operations: the unit of replication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// The committing replica.
    pub actor: ActorId,
    /// Per-actor contiguous sequence number, starting at 1.
    pub seq: u64,
    /// Lamport counter of the first operation.
    pub start_counter: u64,
    /// The recorded operations, in application order.
    pub ops: Vec<TreeOp>,
}

impl Change {
    /// Total counter span of the change.
    pub fn counter_span(&self) -> u64 {
        self.ops.iter().map(TreeOp::counter_span).sum()
    }

    /// Highest counter consumed by this change.
    pub fn max_counter(&self) -> u64 {
        self.start_counter + self.counter_span().saturating_sub(1)
    }

    /// Serialize to opaque payload bytes.
    pub fn encode(&self) -> Vec<u8> {
        // Infallible for this type; the enum has no non-serializable states.
        serde_json::to_vec(self).expect("change serialization cannot fail")
    }

    /// Deserialize from payload bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A change wrapped with the server-assigned global sequence number.
///
/// The server stamps every change it rebroadcasts; `seq` is what the
/// [`Sequencer`](crate::sequencer::Sequencer) orders on. Client→server
/// messages carry `seq = 0` and are renumbered by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencedChange {
    /// Server-assigned position in the document's total order.
    pub seq: u64,
    /// The replicated change itself.
    pub change: Change,
}

impl SequencedChange {
    /// Serialize to one wire frame payload.
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("envelope serialization cannot fail")
    }

    /// Deserialize from one wire frame payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(n: u128) -> ActorId {
        ActorId::from_u128(n)
    }

    #[test]
    fn test_op_id_ordering() {
        let a = actor(1);
        let b = actor(2);
        assert!(OpId::new(1, a) < OpId::new(2, a));
        assert!(OpId::new(5, a) < OpId::new(5, b));
        assert!(OpId::new(9, b) > OpId::new(8, b));
    }

    #[test]
    fn test_counter_span() {
        let op = TreeOp::TextInsert {
            obj: ObjId::Children,
            origin: Anchor::Head,
            text: "héllo".to_string(),
        };
        assert_eq!(op.counter_span(), 5);
        let op = TreeOp::MapDelete {
            obj: ObjId::Root,
            key: "x".to_string(),
        };
        assert_eq!(op.counter_span(), 1);
    }

    #[test]
    fn test_change_counters() {
        let change = Change {
            actor: actor(1),
            seq: 1,
            start_counter: 10,
            ops: vec![
                TreeOp::ListInsert {
                    obj: ObjId::Children,
                    origin: Anchor::Head,
                    value: OpValue::New(ContainerKind::Map),
                },
                TreeOp::TextInsert {
                    obj: ObjId::Children,
                    origin: Anchor::Head,
                    text: "abc".to_string(),
                },
            ],
        };
        assert_eq!(change.counter_span(), 4);
        assert_eq!(change.max_counter(), 13);
    }

    #[test]
    fn test_change_encode_decode() {
        let change = Change {
            actor: actor(7),
            seq: 3,
            start_counter: 42,
            ops: vec![TreeOp::MapSet {
                obj: ObjId::Root,
                key: "title".to_string(),
                value: OpValue::Literal(Value::str("x")),
            }],
        };
        let bytes = change.encode();
        let back = Change::decode(&bytes).unwrap();
        assert_eq!(back, change);
    }

    #[test]
    fn test_decode_garbage_is_encoding_error() {
        let err = Change::decode(b"not json").unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_envelope_roundtrip() {
        let env = SequencedChange {
            seq: 12,
            change: Change {
                actor: actor(1),
                seq: 1,
                start_counter: 1,
                ops: vec![],
            },
        };
        let back = SequencedChange::decode(&env.encode()).unwrap();
        assert_eq!(back, env);
    }
}
