// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync coordinator: the single owner of one document's sync pipeline.
//!
//! One spawned task owns the editable document, the replicated tree, and
//! the sequencer, and is the only code that touches them. Everything else
//! talks to it through the [`SyncHandle`]: local edits go in over an mpsc
//! queue, document snapshots and session state come out over watch
//! channels. No locks, no shared mutable state.
//!
//! ```text
//!                 ┌────────────────────────────────────────┐
//!   edits ──mpsc──►                                        │
//!                 │  Document ◄─ translators ─► DocTree    ├──watch──► state
//!   transport ────►           Sequencer                    ├──watch──► document
//!                 └────────────────────────────────────────┘
//! ```
//!
//! Session lifecycle is driven entirely by transport events: a connect
//! resets the replica (fresh tree, document, and sequencer under the same
//! actor id) and enters `AwaitingBacklog`; the backlog-complete marker
//! runs document repair through the ordinary local pipeline and goes
//! `Live`; a disconnect drops back to `Connecting` and waits for the
//! transport to dial again. Fatal errors (consistency, translator,
//! internal) freeze the session in `Failed`: a poisoned replica must not
//! keep accepting edits.
//!
//! Local edits submitted outside `Live` are dropped with a warning rather
//! than queued: they were made against a document that is about to be
//! replaced by a backlog replay.

mod types;

pub use types::SyncState;

use crate::config::SyncConfig;
use crate::editor::Document;
use crate::error::{Result, SyncError};
use crate::metrics;
use crate::op::Operation;
use crate::protocol::Message;
use crate::sequencer::Sequencer;
use crate::translate::{local, remote};
use crate::transport::{Transport, TransportEvent};
use crate::tree::change::{ActorId, Change, SequencedChange};
use crate::tree::DocTree;
use crate::value::Value;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Local inputs accepted by the session task.
enum Command {
    Edit(Vec<Operation>),
    SetSpeaker { speaker_id: String, name: String },
    RemoveSpeaker { speaker_id: String },
}

/// Spawns and wires up a sync session.
pub struct SyncCoordinator;

impl SyncCoordinator {
    /// Validate the config, spawn the transport and session tasks, and
    /// return the handle the application drives the session through.
    pub fn spawn(config: SyncConfig) -> Result<SyncHandle> {
        config.validate()?;
        let actor = ActorId::random();
        info!(document_id = %config.document_id, %actor, "starting sync session");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (command_tx, command_rx) = mpsc::channel(64);
        let (state_tx, state_rx) = watch::channel(SyncState::Connecting);
        let (doc_tx, doc_rx) = watch::channel(None);
        metrics::set_sync_state(SyncState::Connecting.as_str());

        let transport = Transport::spawn(
            config.server_addr.clone(),
            config.document_id.clone(),
            config.reconnect.clone(),
            config.limits.clone(),
            shutdown_rx.clone(),
        );

        let session = Session {
            document_id: config.document_id,
            tree: DocTree::new(actor),
            doc: Document::new(),
            sequencer: Sequencer::new(),
            snapshot_changes: 0,
            state_tx,
            doc_tx,
        };
        let task = tokio::spawn(session.run(command_rx, transport, shutdown_rx));

        Ok(SyncHandle {
            commands: command_tx,
            state: state_rx,
            document: doc_rx,
            shutdown: shutdown_tx,
            task,
        })
    }
}

/// Application-facing handle to a running sync session.
pub struct SyncHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SyncState>,
    document: watch::Receiver<Option<Value>>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Submit one batch of editor operations.
    ///
    /// The batch is applied atomically: one committed change, one
    /// sequence number, replayed as a unit on every replica.
    pub async fn submit_edit(&self, ops: Vec<Operation>) -> Result<()> {
        self.commands
            .send(Command::Edit(ops))
            .await
            .map_err(|_| SyncError::Closed)
    }

    /// Create or rename a speaker.
    pub async fn set_speaker(&self, speaker_id: &str, name: &str) -> Result<()> {
        self.commands
            .send(Command::SetSpeaker {
                speaker_id: speaker_id.to_string(),
                name: name.to_string(),
            })
            .await
            .map_err(|_| SyncError::Closed)
    }

    /// Remove a speaker from the table.
    pub async fn remove_speaker(&self, speaker_id: &str) -> Result<()> {
        self.commands
            .send(Command::RemoveSpeaker {
                speaker_id: speaker_id.to_string(),
            })
            .await
            .map_err(|_| SyncError::Closed)
    }

    /// Current session state.
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Watch channel for state transitions.
    pub fn state_watch(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }

    /// Latest published document value (`None` until the first `Live`).
    pub fn document(&self) -> Option<Value> {
        self.document.borrow().clone()
    }

    /// Watch channel for document snapshots.
    pub fn document_watch(&self) -> watch::Receiver<Option<Value>> {
        self.document.clone()
    }

    /// Wait until the session reaches `target`.
    ///
    /// Errors if the session lands in a different terminal state first.
    pub async fn wait_for_state(&self, target: SyncState) -> Result<()> {
        let mut rx = self.state.clone();
        loop {
            let current = *rx.borrow();
            if current == target {
                return Ok(());
            }
            match current {
                SyncState::Failed => {
                    return Err(SyncError::Internal("sync session failed".to_string()))
                }
                SyncState::Closed => return Err(SyncError::Closed),
                _ => {}
            }
            rx.changed().await.map_err(|_| SyncError::Closed)?;
        }
    }

    /// Stop the session and wait for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// State owned exclusively by the session task.
struct Session {
    document_id: String,
    tree: DocTree,
    doc: Document,
    sequencer: Sequencer,
    /// Changes imported during the current backlog replay.
    snapshot_changes: usize,
    state_tx: watch::Sender<SyncState>,
    doc_tx: watch::Sender<Option<Value>>,
}

impl Session {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut transport: Transport,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                event = transport.events.recv() => {
                    let Some(event) = event else {
                        self.fail(SyncError::Internal("transport task ended".to_string()));
                        break;
                    };
                    if let Err(e) = self.on_transport_event(event, &transport.outbound).await {
                        self.fail(e);
                        break;
                    }
                }
                command = commands.recv() => match command {
                    Some(command) => {
                        if let Err(e) = self.on_command(command, &transport.outbound).await {
                            self.fail(e);
                            break;
                        }
                    }
                    None => {
                        self.set_state(SyncState::Closed);
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    self.set_state(SyncState::Closed);
                    break;
                }
            }
        }
        // The transport must not outlive the session: a failed session
        // would otherwise keep it redialing forever.
        transport.abort();
    }

    async fn on_transport_event(
        &mut self,
        event: TransportEvent,
        outbound: &mpsc::Sender<SequencedChange>,
    ) -> Result<()> {
        match event {
            TransportEvent::Connected => {
                // Fresh replica against a fresh backlog; same actor id.
                self.tree = DocTree::new(self.tree.actor());
                self.doc = Document::new();
                self.sequencer = Sequencer::new();
                self.snapshot_changes = 0;
                self.set_state(SyncState::AwaitingBacklog);
                Ok(())
            }
            TransportEvent::Message(Message::SnapshotChange(change)) => {
                self.snapshot_changes += 1;
                self.ingest(change)
            }
            TransportEvent::Message(Message::Change(change)) => self.ingest(change),
            TransportEvent::Message(Message::BacklogComplete) => {
                metrics::record_snapshot_import(&self.document_id, self.snapshot_changes);
                info!(
                    document_id = %self.document_id,
                    changes = self.snapshot_changes,
                    "backlog complete"
                );
                // Restore document invariants through the ordinary local
                // pipeline so every replica sees the repair.
                let repairs = self.doc.repair_ops();
                if !repairs.is_empty() {
                    debug!(ops = repairs.len(), "repairing document after backlog");
                    self.apply_local(&repairs, outbound).await?;
                }
                self.set_state(SyncState::Live);
                self.publish_document();
                Ok(())
            }
            TransportEvent::Disconnected { reason } => {
                if *self.state_tx.borrow() != SyncState::Connecting {
                    warn!(document_id = %self.document_id, reason = %reason, "disconnected");
                    self.set_state(SyncState::Connecting);
                }
                Ok(())
            }
        }
    }

    /// Feed one wire arrival through sequencer, tree, and remote translator.
    fn ingest(&mut self, change: SequencedChange) -> Result<()> {
        metrics::record_changes_received(&self.document_id, 1);
        let released = self.sequencer.accept(change);
        metrics::record_sequencer_buffered(&self.document_id, self.sequencer.parked_len());

        let mut imported = 0;
        let mut deduped = 0;
        for sequenced in released {
            let started = Instant::now();
            let history_before = self.tree.history().len();
            let batch = self.tree.import(&sequenced.change)?;
            if self.tree.history().len() == history_before {
                deduped += 1;
                continue;
            }
            imported += 1;
            remote::apply_batch(&mut self.doc, &batch)?;
            if let Err(e) = remote::verify(&self.doc, &self.tree.to_value()) {
                metrics::record_consistency_failure(&self.document_id);
                return Err(e);
            }
            metrics::record_remote_batch(&self.document_id, batch.events.len(), started.elapsed());
        }
        if imported > 0 {
            metrics::record_changes_imported(&self.document_id, imported);
            if *self.state_tx.borrow() == SyncState::Live {
                self.publish_document();
            }
        }
        if deduped > 0 {
            metrics::record_changes_deduped(&self.document_id, deduped);
        }
        Ok(())
    }

    async fn on_command(
        &mut self,
        command: Command,
        outbound: &mpsc::Sender<SequencedChange>,
    ) -> Result<()> {
        if *self.state_tx.borrow() != SyncState::Live {
            warn!(
                document_id = %self.document_id,
                state = %*self.state_tx.borrow(),
                "local edit dropped: session not live"
            );
            return Ok(());
        }
        match command {
            Command::Edit(ops) => self.apply_local(&ops, outbound).await?,
            Command::SetSpeaker { speaker_id, name } => {
                self.doc.set_speaker_name(&speaker_id, name.as_str());
                let change = local::set_speaker(&mut self.tree, &speaker_id, &name)?;
                self.send_change(change, outbound).await;
            }
            Command::RemoveSpeaker { speaker_id } => {
                self.doc.remove_speaker(&speaker_id);
                let change = local::remove_speaker(&mut self.tree, &speaker_id)?;
                self.send_change(change, outbound).await;
            }
        }
        self.publish_document();
        Ok(())
    }

    /// Apply one local batch to both sides and ship the committed change.
    async fn apply_local(
        &mut self,
        ops: &[Operation],
        outbound: &mpsc::Sender<SequencedChange>,
    ) -> Result<()> {
        let started = Instant::now();
        self.doc.apply_batch(ops)?;
        let change = local::encode_batch(&mut self.tree, ops)?;
        metrics::record_local_batch(&self.document_id, ops.len(), started.elapsed());
        self.send_change(change, outbound).await;
        Ok(())
    }

    async fn send_change(
        &self,
        change: Option<Change>,
        outbound: &mpsc::Sender<SequencedChange>,
    ) {
        let Some(change) = change else { return };
        // The server assigns the real sequence number.
        let sequenced = SequencedChange { seq: 0, change };
        if outbound.send(sequenced).await.is_err() {
            warn!(document_id = %self.document_id, "transport gone; change not sent");
        }
    }

    fn publish_document(&self) {
        self.doc_tx.send_replace(Some(self.doc.to_value()));
    }

    fn set_state(&self, state: SyncState) {
        info!(document_id = %self.document_id, state = %state, "sync state");
        metrics::set_sync_state(state.as_str());
        self.state_tx.send_replace(state);
    }

    fn fail(&self, error: SyncError) {
        error!(document_id = %self.document_id, error = %error, "fatal sync error");
        self.set_state(SyncState::Failed);
    }
}
