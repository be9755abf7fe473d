// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Collaborative synchronization engine for speaker-attributed transcript
//! documents.
//!
//! Each client owns an editable [`editor::Document`] and a replicated
//! [`tree::DocTree`]. Local edit batches are translated into tree changes
//! and shipped to a change-propagation server, which stamps every change
//! with a global sequence number and rebroadcasts it; remote changes are
//! imported into the tree and the resulting events are replayed onto the
//! document. Because every replica applies the same changes in the same
//! server order, all replicas converge.
//!
//! ```text
//!   application
//!       │ edits                      ▲ state / document snapshots
//!       ▼                            │
//!   ┌───────────────── coordinator ──────────────────┐
//!   │ Document ◄── translate ──► DocTree   Sequencer │
//!   └───────────────────────┬──────────────────────--┘
//!                           │ changes (framed)
//!                      transport ◄──► server
//! ```
//!
//! Entry point: [`coordinator::SyncCoordinator::spawn`] with a
//! [`config::SyncConfig`]; drive the session through the returned
//! [`coordinator::SyncHandle`].

pub mod config;
pub mod coordinator;
pub mod editor;
pub mod error;
pub mod metrics;
pub mod op;
pub mod protocol;
pub mod sequencer;
pub mod transcript;
pub mod translate;
pub mod transport;
pub mod tree;
pub mod value;

pub use config::SyncConfig;
pub use coordinator::{SyncCoordinator, SyncHandle, SyncState};
pub use error::{Result, SyncError};
pub use value::Value;
