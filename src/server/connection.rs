// Per-client connection state
//
// The read half stays with the worker task; everything a command handler
// or a closer may touch concurrently lives here: the selected database,
// the serialized write half, and the in-flight counter `close` drains.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::warn;

use crate::engine::Session;

/// How long `close` waits for pending replies before forcing the socket
/// shut.
pub(crate) const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Connection {
    writer: Mutex<OwnedWriteHalf>,
    selected_db: AtomicUsize,
    in_flight: AtomicUsize,
    drained: Notify,
}

impl Connection {
    pub fn new(writer: OwnedWriteHalf) -> Self {
        Self {
            writer: Mutex::new(writer),
            selected_db: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Serialized write: the mutex keeps concurrent writers from
    /// interleaving bytes, the counter lets `close` wait for replies
    /// still in flight. An empty slice (NoReply) writes nothing.
    pub async fn write(&self, bytes: &[u8]) -> std::io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let result = {
            let mut writer = self.writer.lock().await;
            writer.write_all(bytes).await
        };
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
        result
    }

    /// Waits up to [`DRAIN_TIMEOUT`] for in-flight replies, then shuts
    /// the write side down.
    pub async fn close(&self) {
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        while self.in_flight.load(Ordering::Acquire) > 0 {
            let drained = self.drained.notified();
            if self.in_flight.load(Ordering::Acquire) == 0 {
                break;
            }
            if tokio::time::timeout_at(deadline, drained).await.is_err() {
                warn!("pending replies did not drain in time, forcing close");
                break;
            }
        }
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

impl Session for Connection {
    fn db_index(&self) -> usize {
        self.selected_db.load(Ordering::Relaxed)
    }

    fn select_db(&self, index: usize) {
        self.selected_db.store(index, Ordering::Relaxed);
    }
}
