//! Mock change-propagation server.

use collab_engine::protocol::{self, Decoder, Message};
use collab_engine::tree::change::{Change, SequencedChange};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;

/// In-process stand-in for the change-propagation server.
///
/// Semantics mirror the real server: a global log of sequenced changes,
/// full-snapshot replay on connect followed by the backlog-complete
/// marker, and rebroadcast of every accepted change to all connections,
/// the sender included, so clients must dedup their own echo.
pub struct MockServer {
    pub addr: String,
    log: Arc<Mutex<Vec<SequencedChange>>>,
    relay: broadcast::Sender<SequencedChange>,
    kill: Arc<Notify>,
    accept_task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> MockServer {
        super::init_logging();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (relay, _) = broadcast::channel(1024);
        let kill = Arc::new(Notify::new());
        let accept_task = tokio::spawn(accept_loop(
            listener,
            log.clone(),
            relay.clone(),
            kill.clone(),
        ));
        MockServer {
            addr,
            log,
            relay,
            kill,
            accept_task,
        }
    }

    /// Number of changes the server has accepted so far.
    pub async fn log_len(&self) -> usize {
        self.log.lock().await.len()
    }

    /// Append a change to the log as if another client had sent it.
    pub async fn seed(&self, change: Change) -> u64 {
        let mut log = self.log.lock().await;
        let seq = log.len() as u64 + 1;
        let sequenced = SequencedChange { seq, change };
        log.push(sequenced.clone());
        let _ = self.relay.send(sequenced);
        seq
    }

    /// Hard-drop every open connection. The listener stays up, so clients
    /// reconnect and get a fresh snapshot.
    pub fn drop_connections(&self) {
        self.kill.notify_waiters();
    }

    pub fn stop(&self) {
        self.accept_task.abort();
        self.kill.notify_waiters();
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn accept_loop(
    listener: TcpListener,
    log: Arc<Mutex<Vec<SequencedChange>>>,
    relay: broadcast::Sender<SequencedChange>,
    kill: Arc<Notify>,
) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        tokio::spawn(serve(stream, log.clone(), relay.clone(), kill.clone()));
    }
}

async fn serve(
    mut stream: TcpStream,
    log: Arc<Mutex<Vec<SequencedChange>>>,
    relay: broadcast::Sender<SequencedChange>,
    kill: Arc<Notify>,
) {
    // Register for the kill signal up front and keep the same future for
    // the whole connection; recreating it each select! iteration would
    // drop notifications that arrive while another branch is running.
    let killed = kill.notified();
    tokio::pin!(killed);
    killed.as_mut().enable();

    // Subscribe before snapshotting the log so nothing falls in between;
    // anything in both is filtered by seq below.
    let mut inbox = relay.subscribe();
    let snapshot = log.lock().await.clone();
    let mut sent = snapshot.last().map(|c| c.seq).unwrap_or(0);
    if stream
        .write_all(&protocol::encode_snapshot(&snapshot))
        .await
        .is_err()
    {
        return;
    }

    let mut decoder = Decoder::new(16 * 1024 * 1024);
    let mut buf = [0u8; 8192];
    loop {
        tokio::select! {
            _ = &mut killed => return,
            relayed = inbox.recv() => {
                let Ok(change) = relayed else { return };
                if change.seq <= sent {
                    continue;
                }
                sent = change.seq;
                if stream.write_all(&protocol::encode_change(&change)).await.is_err() {
                    return;
                }
            }
            read = stream.read(&mut buf) => {
                let n = match read {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                decoder.feed(&buf[..n]);
                loop {
                    match decoder.next() {
                        Ok(Some(Message::Change(mut change))) => {
                            let mut log = log.lock().await;
                            change.seq = log.len() as u64 + 1;
                            log.push(change.clone());
                            let _ = relay.send(change);
                        }
                        Ok(Some(_)) => {} // clients never send these
                        Ok(None) => break,
                        Err(_) => return,
                    }
                }
            }
        }
    }
}
