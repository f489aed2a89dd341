use std::{collections::HashMap, sync::Mutex};

use anyhow::{anyhow, Context, Result};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{self, Duration, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::{db::Database, session::SessionSnapshot};

use super::SessionSink;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Fallback wake-up while nothing is pending; the branch is disabled anyway.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

enum SaverCommand {
    Save {
        snapshot: SessionSnapshot,
        version: u64,
        is_final: bool,
    },
    Flush(oneshot::Sender<()>),
}

struct PendingSnapshot {
    snapshot: SessionSnapshot,
    version: u64,
    due: Instant,
}

/// Debounced snapshot writer.
///
/// `save` only enqueues, so the engine never waits on storage. Each session's
/// latest non-final snapshot is written once its debounce window passes
/// quietly; final snapshots are written immediately. Versions at or below the
/// last one seen for a session are discarded.
pub struct SnapshotSaver {
    sender: mpsc::UnboundedSender<SaverCommand>,
    cancel_token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SnapshotSaver {
    /// Must be called from within a tokio runtime.
    pub fn spawn(db: Database, debounce: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(saver_loop(db, debounce, receiver, cancel_token.clone()));

        Self {
            sender,
            cancel_token,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Write everything still waiting in its debounce window.
    pub async fn flush(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SaverCommand::Flush(reply_tx))
            .map_err(|_| anyhow!("snapshot saver is not running"))?;
        reply_rx
            .await
            .map_err(|_| anyhow!("snapshot saver stopped before flushing"))
    }

    /// Flush pending snapshots and stop the background task.
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel_token.cancel();

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        match handle {
            Some(handle) => handle.await.context("snapshot saver task failed to join"),
            None => Ok(()),
        }
    }
}

impl SessionSink for SnapshotSaver {
    fn save(&self, snapshot: SessionSnapshot, version: u64, is_final: bool) {
        let command = SaverCommand::Save {
            snapshot,
            version,
            is_final,
        };
        if let Err(err) = self.sender.send(command) {
            if let SaverCommand::Save { snapshot, .. } = err.0 {
                log_warn!(
                    "Snapshot saver stopped; dropping version {version} of session {}",
                    snapshot.session_id
                );
            }
        }
    }
}

struct SaverState {
    db: Database,
    debounce: Duration,
    pending: HashMap<String, PendingSnapshot>,
    last_seen: HashMap<String, u64>,
}

impl SaverState {
    async fn accept(&mut self, snapshot: SessionSnapshot, version: u64, is_final: bool) {
        let session_id = snapshot.session_id.clone();
        if let Some(&seen) = self.last_seen.get(&session_id) {
            if version <= seen {
                log_info!("Discarding stale snapshot v{version} of {session_id} (seen v{seen})");
                return;
            }
        }
        if is_final {
            // The store rejects anything after a final row, so the session
            // needs no more bookkeeping here.
            self.pending.remove(&session_id);
            self.last_seen.remove(&session_id);
            write(&self.db, snapshot, version, true).await;
        } else {
            self.last_seen.insert(session_id.clone(), version);
            self.pending.insert(
                session_id,
                PendingSnapshot {
                    snapshot,
                    version,
                    due: Instant::now() + self.debounce,
                },
            );
        }
    }

    fn next_due(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.due).min()
    }

    async fn flush_due(&mut self, now: Instant) {
        let due: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| p.due <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for id in due {
            if let Some(pending) = self.pending.remove(&id) {
                write(&self.db, pending.snapshot, pending.version, false).await;
            }
        }
    }

    async fn flush_all(&mut self) {
        for (_, pending) in self.pending.drain() {
            write(&self.db, pending.snapshot, pending.version, false).await;
        }
    }

    async fn handle(&mut self, command: SaverCommand) {
        match command {
            SaverCommand::Save {
                snapshot,
                version,
                is_final,
            } => self.accept(snapshot, version, is_final).await,
            SaverCommand::Flush(reply) => {
                self.flush_all().await;
                let _ = reply.send(());
            }
        }
    }
}

async fn write(db: &Database, snapshot: SessionSnapshot, version: u64, is_final: bool) {
    let session_id = snapshot.session_id.clone();
    match db.save_snapshot(snapshot, version, is_final).await {
        Ok(true) => {}
        Ok(false) => log_info!("Store kept a newer snapshot of {session_id} than v{version}"),
        Err(err) => log_error!("Failed to save snapshot v{version} of {session_id}: {err:#}"),
    }
}

async fn saver_loop(
    db: Database,
    debounce: Duration,
    mut receiver: mpsc::UnboundedReceiver<SaverCommand>,
    cancel_token: CancellationToken,
) {
    let mut state = SaverState {
        db,
        debounce,
        pending: HashMap::new(),
        last_seen: HashMap::new(),
    };

    loop {
        let deadline = state.next_due();
        let wake_at = deadline.unwrap_or_else(|| Instant::now() + IDLE_WAIT);

        tokio::select! {
            command = receiver.recv() => match command {
                Some(command) => state.handle(command).await,
                None => {
                    state.flush_all().await;
                    break;
                }
            },
            _ = time::sleep_until(wake_at), if deadline.is_some() => {
                state.flush_due(Instant::now()).await;
            }
            _ = cancel_token.cancelled() => {
                while let Ok(command) = receiver.try_recv() {
                    state.handle(command).await;
                }
                state.flush_all().await;
                log_info!("Snapshot saver shutting down");
                break;
            }
        }
    }
}
