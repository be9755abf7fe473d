// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the sync engine.
//!
//! This module defines the error types used throughout the sync engine.
//! Errors are categorized by their source (transport, framing, translation)
//! and include context to help with debugging.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Transport` | Yes | Connection refused/dropped, read/write failures |
//! | `Framing` | Yes | Truncated or garbled frame; fatal to the attempt, fixed by reconnect |
//! | `Translator` | No | An operation addressed a path that does not resolve |
//! | `Consistency` | No | Post-batch editor/tree divergence; session must abort |
//! | `Encoding` | No | Change bytes failed to decode (corrupt at the source) |
//! | `Config` | No | Configuration invalid |
//! | `Closed` | No | Session has been torn down |
//! | `Internal` | No | Unexpected internal error |
//!
//! # Retry Behavior
//!
//! Use [`SyncError::is_retryable()`] to determine whether an error resolves
//! via the reconnect loop. Retryable errors cost the current connection
//! attempt and nothing more. Non-retryable errors either indicate bugs
//! or, for `Consistency`, a divergence that would corrupt the document for
//! every collaborator if the session continued.

use thiserror::Error;

/// Result type alias for sync engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur during document synchronization.
///
/// Each variant includes context about where the error occurred.
/// Use [`is_retryable()`](Self::is_retryable) to check whether the
/// reconnect loop will recover from it.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Transport-level failure.
    ///
    /// Connection refused, dropped mid-read, or a write failed.
    /// Retryable: the transport reconnects and the server replays a
    /// fresh backlog.
    #[error("transport error ({operation}): {message}")]
    Transport {
        operation: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Wire framing violation.
    ///
    /// A frame length exceeded the sanity limit, or an unknown message
    /// type byte appeared. Fatal to the current connection attempt;
    /// treated like a transport error and fixed by reconnecting.
    #[error("framing error: {0}")]
    Framing(String),

    /// A local operation addressed a path that does not resolve.
    ///
    /// This is a programming-contract violation: batches must be applied
    /// atomically against a tree that has not changed mid-batch.
    /// Not retryable - indicates a bug in the caller.
    #[error("translator error at path {path:?}: {message}")]
    Translator { path: Vec<usize>, message: String },

    /// Post-batch divergence between the editable document and the tree.
    ///
    /// After replaying a remote event batch, the editor's materialized
    /// value must deep-equal the tree's. A mismatch means continuing
    /// would corrupt the document for all collaborators, so the session
    /// aborts instead.
    #[error("consistency check failed: {0}")]
    Consistency(String),

    /// Change bytes failed to decode.
    ///
    /// The payload is corrupt at the source. Not retryable.
    #[error("change decode error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Invalid or missing configuration.
    ///
    /// Not retryable - fix the configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// The session has been closed.
    ///
    /// Returned when operations are attempted after teardown.
    #[error("session closed")]
    Closed,

    /// Unexpected internal error.
    ///
    /// Catch-all for errors that shouldn't happen.
    /// Not retryable - indicates a bug that needs investigation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Create a transport error from an I/O error.
    pub fn transport(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a transport error without an I/O source.
    pub fn transport_msg(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a translator error for an unresolvable path.
    pub fn bad_path(path: &[usize], message: impl Into<String>) -> Self {
        Self::Translator {
            path: path.to_vec(),
            message: message.into(),
        }
    }

    /// Check if this error resolves via the reconnect loop.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Framing(_) => true, // Costs the connection attempt only
            Self::Translator { .. } => false,
            Self::Consistency(_) => false, // Session must abort
            Self::Encoding(_) => false,
            Self::Config(_) => false,
            Self::Closed => false,
            Self::Internal(_) => false,
        }
    }

    /// Check if this error must abort the session rather than reconnect.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Consistency(_) | Self::Translator { .. } | Self::Internal(_)
        )
    }
}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        Self::transport("io", e)
    }
}
