// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reconnecting framed transport.
//!
//! Owns the TCP connection to the change-propagation server and the
//! reconnect loop around it. The coordinator sees only two channels: an
//! outbound queue of local changes and an inbound stream of
//! [`TransportEvent`]s. Connection lifecycle is the transport's problem;
//! what a reconnect *means* for session state is the coordinator's.
//!
//! Reconnect policy is a fixed interval with unlimited attempts: the
//! server replays a full backlog on every connection, so a stale session
//! costs nothing and there is no point spacing attempts out. Framing
//! errors tear down the connection like any I/O error: a garbled stream
//! cannot be resynchronized, but a fresh connection starts clean.
//!
//! Local changes that were queued when the connection died are dropped
//! with a warning: they were accepted against a session whose numbering
//! no longer exists, and the editor state they came from is rebuilt from
//! the next backlog anyway.

use crate::config::{LimitsConfig, ReconnectConfig};
use crate::metrics;
use crate::protocol::{self, Decoder, Message};
use crate::tree::change::SequencedChange;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// What the connection task reports upward.
#[derive(Debug)]
pub enum TransportEvent {
    /// A connection was established; the server will now replay the backlog.
    Connected,
    /// One decoded protocol message.
    Message(Message),
    /// The connection ended; the transport will retry after the fixed delay.
    Disconnected { reason: String },
}

/// Handle to the spawned connection task.
pub struct Transport {
    /// Local changes to send (client side stamps `seq = 0`).
    pub outbound: mpsc::Sender<SequencedChange>,
    /// Decoded inbound events.
    pub events: mpsc::Receiver<TransportEvent>,
    task: tokio::task::JoinHandle<()>,
}

impl Transport {
    pub fn spawn(
        server_addr: String,
        document_id: String,
        reconnect: ReconnectConfig,
        limits: LimitsConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Transport {
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (events_tx, events_rx) = mpsc::channel(64);
        let task = tokio::spawn(run(
            server_addr,
            document_id,
            reconnect,
            limits,
            outbound_rx,
            events_tx,
            shutdown,
        ));
        Transport {
            outbound: outbound_tx,
            events: events_rx,
            task,
        }
    }

    /// Tear the connection task down immediately.
    pub fn abort(&self) {
        self.task.abort();
    }
}

async fn run(
    server_addr: String,
    document_id: String,
    reconnect: ReconnectConfig,
    limits: LimitsConfig,
    mut outbound: mpsc::Receiver<SequencedChange>,
    events: mpsc::Sender<TransportEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempts: u64 = 0;
    loop {
        if *shutdown.borrow() {
            break;
        }
        if attempts > 0 {
            metrics::record_reconnect(&document_id);
        }
        attempts += 1;

        let reason = match timeout(reconnect.connect_timeout(), TcpStream::connect(&server_addr))
            .await
        {
            Ok(Ok(stream)) => {
                info!(addr = %server_addr, attempt = attempts, "connected");
                if events.send(TransportEvent::Connected).await.is_err() {
                    break;
                }
                pump(stream, &document_id, &limits, &mut outbound, &events, &mut shutdown).await
            }
            Ok(Err(e)) => format!("connect failed: {}", e),
            Err(_) => "connect attempt timed out".to_string(),
        };
        if *shutdown.borrow() {
            break;
        }
        debug!(reason = %reason, "connection ended");
        if events
            .send(TransportEvent::Disconnected { reason })
            .await
            .is_err()
        {
            break;
        }

        // Anything still queued was accepted against the dead session.
        let mut stale = 0;
        while outbound.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            warn!(dropped = stale, "discarded local changes queued across a disconnect");
        }

        tokio::select! {
            _ = sleep(reconnect.delay()) => {}
            _ = shutdown.changed() => break,
        }
    }
}

/// Drive one live connection until it ends; returns the reason.
async fn pump(
    mut stream: TcpStream,
    document_id: &str,
    limits: &LimitsConfig,
    outbound: &mut mpsc::Receiver<SequencedChange>,
    events: &mpsc::Sender<TransportEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> String {
    let mut decoder = Decoder::new(limits.max_frame_len);
    let mut read_buf = [0u8; 8192];
    loop {
        tokio::select! {
            read = stream.read(&mut read_buf) => match read {
                Ok(0) => return "connection closed by server".to_string(),
                Ok(n) => {
                    decoder.feed(&read_buf[..n]);
                    if let Err(reason) = drain(&mut decoder, events).await {
                        metrics::record_framing_error(document_id);
                        return reason;
                    }
                }
                Err(e) => return format!("read failed: {}", e),
            },
            change = outbound.recv() => match change {
                Some(change) => {
                    let bytes = protocol::encode_change(&change);
                    metrics::record_change_sent(document_id, bytes.len());
                    if let Err(e) = stream.write_all(&bytes).await {
                        return format!("write failed: {}", e);
                    }
                }
                None => return "handle dropped".to_string(),
            },
            _ = shutdown.changed() => return "shutdown".to_string(),
        }
    }
}

async fn drain(
    decoder: &mut Decoder,
    events: &mpsc::Sender<TransportEvent>,
) -> std::result::Result<(), String> {
    loop {
        match decoder.next() {
            Ok(Some(message)) => {
                if events.send(TransportEvent::Message(message)).await.is_err() {
                    return Err("coordinator gone".to_string());
                }
            }
            Ok(None) => return Ok(()),
            Err(e) => return Err(e.to_string()),
        }
    }
}
