// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::fmt;

/// Lifecycle of one sync session.
///
/// ```text
///   Connecting ──connected──► AwaitingBacklog ──backlog complete──► Live
///       ▲                           │                                │
///       └──────── disconnect ───────┴─────────── disconnect ─────────┘
///
///   any state ──fatal error──► Failed
///   any state ──shutdown────► Closed
/// ```
///
/// `Failed` and `Closed` are terminal. A disconnect is not: the transport
/// retries forever, and every reconnect restarts the session from
/// `Connecting` with a fresh backlog replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No connection; the transport is dialing (or waiting to retry).
    Connecting,
    /// Connected; the server is replaying the document backlog.
    AwaitingBacklog,
    /// Backlog applied; local edits are accepted and remote changes flow.
    Live,
    /// A fatal error poisoned the session; the document is frozen.
    Failed,
    /// Shut down on request.
    Closed,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Connecting => "connecting",
            SyncState::AwaitingBacklog => "awaiting_backlog",
            SyncState::Live => "live",
            SyncState::Failed => "failed",
            SyncState::Closed => "closed",
        }
    }

    /// Terminal states never transition out.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Failed | SyncState::Closed)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
