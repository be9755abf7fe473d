// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote event translator: tree events → editor operations.
//!
//! Imported changes surface as [`TreeEvent`]s addressed by container path.
//! This module routes each event to its editor-side target (the paragraph
//! list, a node, a node's text, the speaker table) and replays it through
//! the ordinary [`Document::apply`] call, the same entry point local
//! edits use. There is no "remote in progress" flag anywhere; remote
//! mutations are remote because they enter through this code path.
//!
//! After a whole batch is applied the caller runs [`verify`]: the editor's
//! materialized value must deep-equal the tree's. Divergence is fatal.

use crate::editor::Document;
use crate::error::{Result, SyncError};
use crate::op::{Operation, PatchEntry, PropPatch};
use crate::tree::event::{Diff, EventBatch, ListRun, MapEntryDiff, PathSeg, TextRun, TreeEvent};
use crate::value::Value;
use tracing::trace;

/// Replay a batch of tree events onto the editable document.
///
/// Returns the number of editor operations applied.
pub fn apply_batch(doc: &mut Document, batch: &EventBatch) -> Result<usize> {
    let mut applied = 0;
    for event in &batch.events {
        applied += apply_event(doc, event)?;
    }
    if applied > 0 {
        trace!(events = batch.events.len(), ops = applied, "replayed remote batch");
    }
    Ok(applied)
}

/// Post-batch consistency check: the editor must mirror the tree exactly.
pub fn verify(doc: &Document, tree_value: &Value) -> Result<()> {
    if doc.to_value() != *tree_value {
        return Err(SyncError::Consistency(
            "editable document diverged from replicated tree after remote batch".to_string(),
        ));
    }
    Ok(())
}

/// What a container path addresses on the editor side.
#[derive(Debug, PartialEq, Eq)]
enum Target {
    /// The root paragraph list.
    Paragraphs,
    /// A node's child list; the path is the node's.
    ChildList(Vec<usize>),
    /// A node's property map.
    Node(Vec<usize>),
    /// A node's text content.
    NodeText(Vec<usize>),
    /// The speaker-name table.
    SpeakerTable,
    /// One speaker's name text.
    SpeakerName(String),
}

fn unroutable(path: &[PathSeg]) -> SyncError {
    SyncError::Internal(format!("unroutable event path {:?}", path))
}

/// Route a tree path to its editor target.
///
/// Document paths alternate `children` keys and list indices, optionally
/// ending in `text`; speaker paths are `speakers` plus at most one id.
fn classify(path: &[PathSeg]) -> Result<Target> {
    match path.split_first() {
        Some((PathSeg::Key(k), rest)) if k == "speakers" => match rest {
            [] => Ok(Target::SpeakerTable),
            [PathSeg::Key(id)] => Ok(Target::SpeakerName(id.clone())),
            _ => Err(unroutable(path)),
        },
        Some((PathSeg::Key(k), rest)) if k == "children" => {
            let mut indices = Vec::new();
            let mut iter = rest.iter().peekable();
            loop {
                match iter.next() {
                    None => {
                        return Ok(if indices.is_empty() {
                            Target::Paragraphs
                        } else {
                            Target::ChildList(indices)
                        });
                    }
                    Some(PathSeg::Index(n)) => {
                        indices.push(*n);
                        match iter.next() {
                            None => return Ok(Target::Node(indices)),
                            Some(PathSeg::Key(k)) if k == "children" => continue,
                            Some(PathSeg::Key(k)) if k == "text" && iter.peek().is_none() => {
                                return Ok(Target::NodeText(indices));
                            }
                            _ => return Err(unroutable(path)),
                        }
                    }
                    _ => return Err(unroutable(path)),
                }
            }
        }
        _ => Err(unroutable(path)),
    }
}

fn apply_event(doc: &mut Document, event: &TreeEvent) -> Result<usize> {
    let target = classify(&event.path)?;
    match (target, &event.diff) {
        (Target::Paragraphs, Diff::List(runs)) => apply_list(doc, &[], runs),
        (Target::ChildList(node), Diff::List(runs)) => apply_list(doc, &node, runs),
        (Target::Node(path), Diff::Map(entries)) => {
            doc.apply(&Operation::SetNode { path, patch: to_patch(entries) })?;
            Ok(1)
        }
        (Target::NodeText(path), Diff::Text(runs)) => apply_text(doc, path, runs),
        (Target::SpeakerTable, Diff::Map(entries)) => {
            for entry in entries {
                match &entry.value {
                    Some(Value::Text(name)) => doc.set_speaker_name(&entry.key, name.clone()),
                    Some(Value::Scalar(s)) => {
                        doc.set_speaker_name(&entry.key, s.as_str().unwrap_or_default())
                    }
                    Some(other) => {
                        return Err(SyncError::Internal(format!(
                            "speaker name must be textual, got {:?}",
                            other
                        )));
                    }
                    None => doc.remove_speaker(&entry.key),
                }
            }
            Ok(entries.len())
        }
        (Target::SpeakerName(id), Diff::Text(runs)) => {
            let mut cursor = 0;
            for run in runs {
                match run {
                    TextRun::Retain(n) => cursor += n,
                    TextRun::Delete(n) => doc.splice_speaker_name(&id, cursor, *n, ""),
                    TextRun::Insert(s) => {
                        doc.splice_speaker_name(&id, cursor, 0, s);
                        cursor += s.chars().count();
                    }
                }
            }
            Ok(1)
        }
        (target, _) => Err(SyncError::Internal(format!(
            "event diff kind does not match target {:?}",
            target
        ))),
    }
}

fn apply_list(doc: &mut Document, parent: &[usize], runs: &[ListRun]) -> Result<usize> {
    let mut cursor = 0;
    let mut applied = 0;
    for run in runs {
        match run {
            ListRun::Retain(n) => cursor += n,
            ListRun::Delete(n) => {
                for _ in 0..*n {
                    let mut path = parent.to_vec();
                    path.push(cursor);
                    doc.apply(&Operation::RemoveNode { path })?;
                    applied += 1;
                }
            }
            ListRun::Insert(values) => {
                for value in values {
                    let mut path = parent.to_vec();
                    path.push(cursor);
                    doc.apply(&Operation::InsertNode { path, node: value.clone() })?;
                    cursor += 1;
                    applied += 1;
                }
            }
        }
    }
    Ok(applied)
}

fn apply_text(doc: &mut Document, path: Vec<usize>, runs: &[TextRun]) -> Result<usize> {
    let mut cursor = 0;
    let mut applied = 0;
    for run in runs {
        match run {
            TextRun::Retain(n) => cursor += n,
            TextRun::Delete(n) => {
                doc.apply(&Operation::RemoveText {
                    path: path.clone(),
                    offset: cursor,
                    len: *n,
                })?;
                applied += 1;
            }
            TextRun::Insert(s) => {
                doc.apply(&Operation::InsertText {
                    path: path.clone(),
                    offset: cursor,
                    text: s.clone(),
                })?;
                cursor += s.chars().count();
                applied += 1;
            }
        }
    }
    Ok(applied)
}

fn to_patch(entries: &[MapEntryDiff]) -> PropPatch {
    entries
        .iter()
        .map(|entry| {
            let patch = match &entry.value {
                Some(v) => PatchEntry::Set(v.clone()),
                None => PatchEntry::Delete,
            };
            (entry.key.clone(), patch)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::event::Origin;

    fn key(s: &str) -> PathSeg {
        PathSeg::Key(s.to_string())
    }

    #[test]
    fn test_classify_document_paths() {
        assert_eq!(classify(&[key("children")]).unwrap(), Target::Paragraphs);
        assert_eq!(
            classify(&[key("children"), PathSeg::Index(2)]).unwrap(),
            Target::Node(vec![2])
        );
        assert_eq!(
            classify(&[key("children"), PathSeg::Index(2), key("children")]).unwrap(),
            Target::ChildList(vec![2])
        );
        assert_eq!(
            classify(&[
                key("children"),
                PathSeg::Index(2),
                key("children"),
                PathSeg::Index(0),
                key("text"),
            ])
            .unwrap(),
            Target::NodeText(vec![2, 0])
        );
    }

    #[test]
    fn test_classify_speaker_paths() {
        assert_eq!(classify(&[key("speakers")]).unwrap(), Target::SpeakerTable);
        assert_eq!(
            classify(&[key("speakers"), key("s1")]).unwrap(),
            Target::SpeakerName("s1".to_string())
        );
    }

    #[test]
    fn test_classify_rejects_stray_paths() {
        assert!(classify(&[]).is_err());
        assert!(classify(&[key("title")]).is_err());
        assert!(classify(&[key("children"), key("text")]).is_err());
        assert!(classify(&[key("children"), PathSeg::Index(0), key("speaker")]).is_err());
    }

    #[test]
    fn test_list_runs_replay_with_moving_cursor() {
        let mut doc = Document::new();
        let node = |t: &str| {
            Value::map_of([(
                "children",
                Value::List(vec![Value::map_of([("text", Value::text(t))])]),
            )])
        };
        let batch = EventBatch {
            origin: Origin::Remote,
            events: vec![TreeEvent {
                path: vec![key("children")],
                diff: Diff::List(vec![
                    ListRun::Insert(vec![node("a"), node("b"), node("c")]),
                ]),
            }],
        };
        apply_batch(&mut doc, &batch).unwrap();
        assert_eq!(doc.paragraphs().len(), 3);

        // Retain 1, delete the middle, insert at the end.
        let batch = EventBatch {
            origin: Origin::Remote,
            events: vec![TreeEvent {
                path: vec![key("children")],
                diff: Diff::List(vec![
                    ListRun::Retain(1),
                    ListRun::Delete(1),
                    ListRun::Retain(1),
                    ListRun::Insert(vec![node("d")]),
                ]),
            }],
        };
        apply_batch(&mut doc, &batch).unwrap();
        let texts: Vec<_> = (0..doc.paragraphs().len())
            .map(|i| {
                doc.node_at(&[i, 0])
                    .unwrap()
                    .to_value()
                    .get("text")
                    .cloned()
                    .unwrap()
            })
            .collect();
        assert_eq!(texts, vec![Value::text("a"), Value::text("c"), Value::text("d")]);
    }

    #[test]
    fn test_text_runs_replay() {
        let mut doc = Document::new();
        doc.apply(&Operation::InsertNode {
            path: vec![0],
            node: Value::map_of([(
                "children",
                Value::List(vec![Value::map_of([("text", Value::text("held"))])]),
            )]),
        })
        .unwrap();
        let batch = EventBatch {
            origin: Origin::Remote,
            events: vec![TreeEvent {
                path: vec![
                    key("children"),
                    PathSeg::Index(0),
                    key("children"),
                    PathSeg::Index(0),
                    key("text"),
                ],
                diff: Diff::Text(vec![
                    TextRun::Retain(3),
                    TextRun::Delete(1),
                    TextRun::Insert("lo".to_string()),
                ]),
            }],
        };
        apply_batch(&mut doc, &batch).unwrap();
        assert_eq!(
            doc.node_at(&[0, 0]).unwrap().to_value().get("text"),
            Some(&Value::text("hello"))
        );
    }

    #[test]
    fn test_speaker_events() {
        let mut doc = Document::new();
        let batch = EventBatch {
            origin: Origin::Remote,
            events: vec![TreeEvent {
                path: vec![key("speakers")],
                diff: Diff::Map(vec![MapEntryDiff {
                    key: "s1".to_string(),
                    value: Some(Value::text("Ada")),
                }]),
            }],
        };
        apply_batch(&mut doc, &batch).unwrap();
        assert_eq!(doc.speakers().get("s1").map(String::as_str), Some("Ada"));

        let batch = EventBatch {
            origin: Origin::Remote,
            events: vec![
                TreeEvent {
                    path: vec![key("speakers"), key("s1")],
                    diff: Diff::Text(vec![
                        TextRun::Retain(3),
                        TextRun::Insert(" Lovelace".to_string()),
                    ]),
                },
                TreeEvent {
                    path: vec![key("speakers")],
                    diff: Diff::Map(vec![MapEntryDiff { key: "s2".to_string(), value: None }]),
                },
            ],
        };
        apply_batch(&mut doc, &batch).unwrap();
        assert_eq!(
            doc.speakers().get("s1").map(String::as_str),
            Some("Ada Lovelace")
        );
    }

    #[test]
    fn test_verify_detects_divergence() {
        let doc = Document::new();
        assert!(verify(&doc, &doc.to_value()).is_ok());
        let other = Value::map_of([("children", Value::empty_list())]);
        assert!(matches!(
            verify(&doc, &other).unwrap_err(),
            SyncError::Consistency(_)
        ));
    }

    #[test]
    fn test_mismatched_diff_kind_is_fatal() {
        let mut doc = Document::new();
        let batch = EventBatch {
            origin: Origin::Remote,
            events: vec![TreeEvent {
                path: vec![key("speakers")],
                diff: Diff::Text(vec![TextRun::Insert("x".to_string())]),
            }],
        };
        let err = apply_batch(&mut doc, &batch).unwrap_err();
        assert!(err.is_fatal());
    }
}
