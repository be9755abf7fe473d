// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Wire protocol: typed frame runs over a byte stream.
//!
//! The stream is a sequence of *runs*. A run opens with a type byte and
//! carries zero or more frames, each a 4-byte big-endian payload length
//! followed by that many payload bytes. The next type byte closes the
//! current run.
//!
//! | Type byte | Meaning                                                |
//! |-----------|--------------------------------------------------------|
//! | `1`       | Live changes; each frame is one sequenced change       |
//! | `2`       | Backlog complete (no frames follow)                    |
//! | `3`       | Full-document snapshot; frames replay the history      |
//!
//! Frame payloads are capped by `max_frame_len` and must be strictly
//! below it; anything at or above the cap is a garbled stream. The cap
//! also keeps length prefixes disjoint from type bytes: an in-range
//! length always starts with a zero byte, so the byte after a frame is
//! unambiguous. That only holds while the cap is at most
//! [`FRAME_LEN_CEILING`], so the decoder clamps to it and configuration
//! validation rejects anything larger.
//!
//! Framing violations surface as [`SyncError::Framing`]: retryable, but
//! only by dropping the connection and starting over; there is no way to
//! resynchronize a garbled stream mid-flight.
//!
//! The [`Decoder`] is incremental: feed it whatever the socket produced
//! and pull messages until it runs dry. Frames split across arbitrary
//! read boundaries decode identically.

use crate::error::{Result, SyncError};
use crate::tree::change::SequencedChange;
use bytes::{Buf, BytesMut};

/// Run of live sequenced changes.
pub const MSG_CHANGE: u8 = 1;
/// Backlog-complete marker.
pub const MSG_BACKLOG_COMPLETE: u8 = 2;
/// Run of snapshot (backlog) changes.
pub const MSG_FULL_DOCUMENT: u8 = 3;

/// Hard ceiling on the frame cap: 2^24 bytes. Every in-range length
/// prefix must start with a zero byte so the byte after a frame can
/// never be read as a type byte.
pub const FRAME_LEN_CEILING: u32 = 16 * 1024 * 1024;

/// One decoded protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A live change from the current run.
    Change(SequencedChange),
    /// A backlog change from a snapshot run.
    SnapshotChange(SequencedChange),
    /// The server finished replaying the backlog.
    BacklogComplete,
}

/// Which kind of frame run is currently open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunKind {
    Changes,
    Snapshot,
}

/// Incremental stream decoder.
#[derive(Debug)]
pub struct Decoder {
    buf: BytesMut,
    run: Option<RunKind>,
    max_frame_len: usize,
}

impl Decoder {
    pub fn new(max_frame_len: u32) -> Self {
        Decoder {
            buf: BytesMut::new(),
            run: None,
            max_frame_len: max_frame_len.min(FRAME_LEN_CEILING) as usize,
        }
    }

    /// Append raw bytes from the socket.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pull the next complete message, if the buffer holds one.
    ///
    /// `Ok(None)` means more bytes are needed. An error poisons the
    /// stream; the connection must be dropped.
    pub fn next(&mut self) -> Result<Option<Message>> {
        loop {
            if self.buf.is_empty() {
                return Ok(None);
            }
            match self.run {
                None => {
                    let type_byte = self.buf[0];
                    self.buf.advance(1);
                    match type_byte {
                        MSG_CHANGE => self.run = Some(RunKind::Changes),
                        MSG_FULL_DOCUMENT => self.run = Some(RunKind::Snapshot),
                        MSG_BACKLOG_COMPLETE => return Ok(Some(Message::BacklogComplete)),
                        other => {
                            return Err(SyncError::Framing(format!(
                                "unknown message type byte {}",
                                other
                            )));
                        }
                    }
                }
                Some(kind) => {
                    let next_byte = self.buf[0];
                    if matches!(next_byte, MSG_CHANGE | MSG_BACKLOG_COMPLETE | MSG_FULL_DOCUMENT)
                    {
                        // A type byte ends the run; reprocess it above.
                        self.run = None;
                        continue;
                    }
                    if self.buf.len() < 4 {
                        return Ok(None);
                    }
                    let len = u32::from_be_bytes([
                        self.buf[0],
                        self.buf[1],
                        self.buf[2],
                        self.buf[3],
                    ]) as usize;
                    if len >= self.max_frame_len {
                        return Err(SyncError::Framing(format!(
                            "frame length {} exceeds limit {}",
                            len, self.max_frame_len
                        )));
                    }
                    if self.buf.len() < 4 + len {
                        return Ok(None);
                    }
                    self.buf.advance(4);
                    let payload = self.buf.split_to(len);
                    let change = SequencedChange::decode(&payload)
                        .map_err(|e| SyncError::Framing(format!("bad frame payload: {}", e)))?;
                    return Ok(Some(match kind {
                        RunKind::Changes => Message::Change(change),
                        RunKind::Snapshot => Message::SnapshotChange(change),
                    }));
                }
            }
        }
    }
}

/// Encode one live change as its own run.
pub fn encode_change(change: &SequencedChange) -> Vec<u8> {
    let mut out = vec![MSG_CHANGE];
    push_frame(&mut out, &change.encode());
    out
}

/// Encode a full-document snapshot run followed by the backlog marker.
pub fn encode_snapshot(changes: &[SequencedChange]) -> Vec<u8> {
    let mut out = vec![MSG_FULL_DOCUMENT];
    for change in changes {
        push_frame(&mut out, &change.encode());
    }
    out.push(MSG_BACKLOG_COMPLETE);
    out
}

/// Encode the bare backlog-complete marker.
pub fn encode_backlog_complete() -> Vec<u8> {
    vec![MSG_BACKLOG_COMPLETE]
}

fn push_frame(out: &mut Vec<u8>, payload: &[u8]) {
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::change::{ActorId, Change};

    fn sc(seq: u64) -> SequencedChange {
        SequencedChange {
            seq,
            change: Change {
                actor: ActorId::from_u128(7),
                seq: 1,
                start_counter: 1,
                ops: vec![],
            },
        }
    }

    fn drain(decoder: &mut Decoder) -> Vec<Message> {
        let mut out = Vec::new();
        while let Some(msg) = decoder.next().unwrap() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn test_change_roundtrip() {
        let mut decoder = Decoder::new(1024);
        decoder.feed(&encode_change(&sc(5)));
        assert_eq!(drain(&mut decoder), vec![Message::Change(sc(5))]);
    }

    #[test]
    fn test_snapshot_run_then_live() {
        let mut decoder = Decoder::new(1024);
        decoder.feed(&encode_snapshot(&[sc(1), sc(2)]));
        decoder.feed(&encode_change(&sc(3)));
        assert_eq!(
            drain(&mut decoder),
            vec![
                Message::SnapshotChange(sc(1)),
                Message::SnapshotChange(sc(2)),
                Message::BacklogComplete,
                Message::Change(sc(3)),
            ]
        );
    }

    #[test]
    fn test_split_feeds_decode_identically() {
        let mut bytes = encode_snapshot(&[sc(1)]);
        bytes.extend_from_slice(&encode_change(&sc(2)));
        // Feed one byte at a time.
        let mut decoder = Decoder::new(1024);
        let mut messages = Vec::new();
        for b in &bytes {
            decoder.feed(&[*b]);
            messages.extend(drain(&mut decoder));
        }
        assert_eq!(
            messages,
            vec![
                Message::SnapshotChange(sc(1)),
                Message::BacklogComplete,
                Message::Change(sc(2)),
            ]
        );
    }

    #[test]
    fn test_empty_change_run_closed_by_marker() {
        let mut decoder = Decoder::new(1024);
        decoder.feed(&[MSG_CHANGE]);
        decoder.feed(&encode_backlog_complete());
        assert_eq!(drain(&mut decoder), vec![Message::BacklogComplete]);
    }

    #[test]
    fn test_unknown_type_byte_is_framing_error() {
        let mut decoder = Decoder::new(1024);
        decoder.feed(&[9]);
        let err = decoder.next().unwrap_err();
        assert!(matches!(err, SyncError::Framing(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_oversized_frame_is_framing_error() {
        let mut decoder = Decoder::new(64);
        decoder.feed(&[MSG_CHANGE, 0, 0, 0, 200]);
        assert!(matches!(
            decoder.next().unwrap_err(),
            SyncError::Framing(_)
        ));
    }

    #[test]
    fn test_cap_above_ceiling_is_clamped() {
        // A frame length at or above 2^24 starts with a non-zero byte and
        // cannot be framed unambiguously; even a decoder asked for a
        // larger cap must reject it rather than misparse the stream.
        let mut decoder = Decoder::new(1 << 30);
        // 128 MiB length prefix: in range for the requested cap, far
        // beyond the ceiling.
        decoder.feed(&[MSG_CHANGE, 0x08, 0, 0, 0]);
        assert!(matches!(
            decoder.next().unwrap_err(),
            SyncError::Framing(_)
        ));
    }

    #[test]
    fn test_garbage_payload_is_framing_error() {
        let mut decoder = Decoder::new(1024);
        let mut bytes = vec![MSG_CHANGE];
        bytes.extend_from_slice(&4u32.to_be_bytes());
        bytes.extend_from_slice(b"!!!!");
        decoder.feed(&bytes);
        assert!(matches!(
            decoder.next().unwrap_err(),
            SyncError::Framing(_)
        ));
    }

    #[test]
    fn test_incomplete_frame_waits() {
        let mut decoder = Decoder::new(1024);
        let encoded = encode_change(&sc(1));
        decoder.feed(&encoded[..encoded.len() - 1]);
        assert_eq!(decoder.next().unwrap(), None);
        decoder.feed(&encoded[encoded.len() - 1..]);
        assert_eq!(decoder.next().unwrap(), Some(Message::Change(sc(1))));
    }
}
