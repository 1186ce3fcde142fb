// Append-only file persistence
//
// Write commands flow through a bounded channel to a single writer thread
// that owns the file handle. The channel is the backpressure boundary:
// when the disk falls behind, producers block rather than drop records.
// Replay happens synchronously at startup, before any write hook exists,
// so a loaded log can never append to itself.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use anyhow::Context;
use bytes::{BufMut, BytesMut};
use crossbeam::channel::{bounded, Receiver, Sender};
use tracing::{error, info, warn};

use crate::commands::CommandLine;
use crate::engine::{Engine, Session};
use crate::protocol::{Reply, RespParser};

const AOF_BUFFER_SIZE: usize = 1 << 16;

enum AofMsg {
    Record { db_index: usize, cmd: CommandLine },
    Shutdown,
}

/// The write-side capability handed to each database. Cloneable; all
/// clones feed the same writer thread.
#[derive(Clone)]
pub struct AofSink {
    tx: Sender<AofMsg>,
}

impl AofSink {
    /// Blocks when the writer falls behind; records are never dropped
    /// while the writer is alive.
    pub fn append(&self, db_index: usize, cmd: CommandLine) {
        if self.tx.send(AofMsg::Record { db_index, cmd }).is_err() {
            warn!("append-only writer has stopped, record lost");
        }
    }
}

pub struct AofHandler {
    tx: Sender<AofMsg>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AofHandler {
    /// Replays an existing log through `engine`, then opens the file for
    /// appending and starts the writer thread. Must run before the write
    /// hooks are installed on the databases.
    pub fn new(path: &Path, engine: &Engine) -> anyhow::Result<Self> {
        replay(path, engine)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open append-only file {}", path.display()))?;

        let (tx, rx) = bounded(AOF_BUFFER_SIZE);
        let worker = thread::Builder::new()
            .name("aof-writer".to_string())
            .spawn(move || writer_loop(file, rx))
            .context("failed to spawn append-only writer thread")?;

        Ok(Self {
            tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn sink(&self) -> AofSink {
        AofSink {
            tx: self.tx.clone(),
        }
    }

    /// Drains every queued record, then stops the writer and closes the
    /// file. Idempotent.
    pub fn close(&self) {
        let handle = self.worker.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            let _ = self.tx.send(AofMsg::Shutdown);
            if handle.join().is_err() {
                error!("append-only writer thread panicked");
            }
        }
    }
}

/// The sole writer of the file after startup. Tracks which database the
/// log is "positioned" on and emits a SELECT shim whenever consecutive
/// records cross databases, which makes the log a self-contained replay
/// transcript independent of client identity.
fn writer_loop(mut file: File, rx: Receiver<AofMsg>) {
    let mut curr_db = 0usize;
    for msg in rx {
        let (db_index, cmd) = match msg {
            AofMsg::Record { db_index, cmd } => (db_index, cmd),
            AofMsg::Shutdown => break,
        };

        let mut buf = BytesMut::new();
        if db_index != curr_db {
            let select = Reply::MultiBulk(vec![
                b"SELECT".to_vec(),
                db_index.to_string().into_bytes(),
            ]);
            buf.put_slice(&select.to_bytes());
            curr_db = db_index;
        }
        buf.put_slice(&Reply::MultiBulk(cmd).to_bytes());

        if let Err(err) = file.write_all(&buf) {
            error!(%err, "append-only write failed, record skipped");
            continue;
        }
        if let Err(err) = file.sync_all() {
            error!(%err, "append-only fsync failed");
        }
    }
    info!("append-only writer stopped");
}

/// Stand-in connection for replay: starts at database 0 and is advanced
/// only by SELECT records embedded in the log.
struct ReplaySession {
    selected: AtomicUsize,
}

impl ReplaySession {
    fn new() -> Self {
        Self {
            selected: AtomicUsize::new(0),
        }
    }
}

impl Session for ReplaySession {
    fn db_index(&self) -> usize {
        self.selected.load(Ordering::Relaxed)
    }

    fn select_db(&self, index: usize) {
        self.selected.store(index, Ordering::Relaxed);
    }
}

/// Feeds the log through the regular parser and executes every array
/// payload. Malformed entries are skipped; a truncated trailing record
/// ends the load.
fn replay(path: &Path, engine: &Engine) -> anyhow::Result<usize> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!("no append-only file at {}, starting empty", path.display());
            return Ok(0);
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to open append-only file {}", path.display()))
        }
    };

    let session = ReplaySession::new();
    let mut parser = RespParser::new();
    let mut chunk = [0u8; 4096];
    let mut loaded = 0usize;

    loop {
        let n = file
            .read(&mut chunk)
            .context("failed to read append-only file")?;
        if n == 0 {
            break;
        }
        for payload in parser.feed(&chunk[..n]) {
            match payload {
                Err(err) => warn!(%err, "skipping malformed append-only entry"),
                Ok(Reply::MultiBulk(args)) if !args.is_empty() => {
                    if engine.exec(&session, &args).is_error() {
                        error!("append-only entry failed during replay");
                    }
                    loaded += 1;
                }
                Ok(_) => {}
            }
        }
    }

    if parser.is_partial() {
        warn!("append-only file ends mid-record, tail ignored");
    }
    info!(commands = loaded, path = %path.display(), "append-only file loaded");
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use tempfile::TempDir;

    fn aof_config(dir: &TempDir) -> ServerConfig {
        ServerConfig {
            append_only: true,
            append_filename: dir
                .path()
                .join("test.aof")
                .to_string_lossy()
                .into_owned(),
            ..ServerConfig::default()
        }
    }

    fn cmd(parts: &[&str]) -> Vec<Vec<u8>> {
        parts.iter().map(|p| p.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_write_and_replay() {
        let dir = TempDir::new().unwrap();
        let config = aof_config(&dir);

        let engine = Engine::new(&config).unwrap();
        let session = ReplaySession::new();
        assert_eq!(engine.exec(&session, &cmd(&["set", "key1", "value1"])), Reply::Ok);
        assert_eq!(engine.exec(&session, &cmd(&["set", "key2", "value2"])), Reply::Ok);
        assert_eq!(engine.exec(&session, &cmd(&["del", "key2"])), Reply::Int(1));
        engine.close();

        let restarted = Engine::new(&config).unwrap();
        let session = ReplaySession::new();
        assert_eq!(
            restarted.exec(&session, &cmd(&["get", "key1"])),
            Reply::Bulk(b"value1".to_vec())
        );
        assert_eq!(
            restarted.exec(&session, &cmd(&["get", "key2"])),
            Reply::NullBulk
        );
        restarted.close();
    }

    #[test]
    fn test_cross_database_coherence() {
        let dir = TempDir::new().unwrap();
        let config = aof_config(&dir);

        let engine = Engine::new(&config).unwrap();
        let session = ReplaySession::new();
        engine.exec(&session, &cmd(&["set", "a", "1"]));
        engine.exec(&session, &cmd(&["select", "3"]));
        engine.exec(&session, &cmd(&["set", "b", "2"]));
        engine.exec(&session, &cmd(&["select", "0"]));
        engine.exec(&session, &cmd(&["set", "c", "3"]));
        engine.close();

        // the log must carry SELECT shims around the db-3 record
        let log = std::fs::read(&config.append_filename).unwrap();
        let select_shim = b"*2\r\n$6\r\nSELECT\r\n$1\r\n3\r\n";
        assert!(log
            .windows(select_shim.len())
            .any(|window| window == select_shim));

        let restarted = Engine::new(&config).unwrap();
        let session = ReplaySession::new();
        assert_eq!(
            restarted.exec(&session, &cmd(&["get", "a"])),
            Reply::Bulk(b"1".to_vec())
        );
        assert_eq!(
            restarted.exec(&session, &cmd(&["get", "c"])),
            Reply::Bulk(b"3".to_vec())
        );
        restarted.exec(&session, &cmd(&["select", "3"]));
        assert_eq!(
            restarted.exec(&session, &cmd(&["get", "b"])),
            Reply::Bulk(b"2".to_vec())
        );
        restarted.exec(&session, &cmd(&["select", "1"]));
        let Reply::MultiBulk(keys) = restarted.exec(&session, &cmd(&["keys", "*"])) else {
            panic!("expected multibulk");
        };
        assert!(keys.is_empty());
        restarted.close();
    }

    #[test]
    fn test_replay_does_not_self_amplify() {
        let dir = TempDir::new().unwrap();
        let config = aof_config(&dir);

        let engine = Engine::new(&config).unwrap();
        let session = ReplaySession::new();
        engine.exec(&session, &cmd(&["set", "k", "v"]));
        engine.close();

        let len_before = std::fs::metadata(&config.append_filename).unwrap().len();
        let restarted = Engine::new(&config).unwrap();
        restarted.close();
        let len_after = std::fs::metadata(&config.append_filename).unwrap().len();
        assert_eq!(len_before, len_after);
    }

    #[test]
    fn test_conditional_writes_persist_only_on_change() {
        let dir = TempDir::new().unwrap();
        let config = aof_config(&dir);

        let engine = Engine::new(&config).unwrap();
        let session = ReplaySession::new();
        engine.exec(&session, &cmd(&["setnx", "k", "v1"]));
        engine.exec(&session, &cmd(&["setnx", "k", "v2"])); // no-op, not logged
        engine.exec(&session, &cmd(&["setex", "k", "v3"]));
        engine.close();

        let restarted = Engine::new(&config).unwrap();
        let session = ReplaySession::new();
        assert_eq!(
            restarted.exec(&session, &cmd(&["get", "k"])),
            Reply::Bulk(b"v3".to_vec())
        );
        restarted.close();

        let log = std::fs::read(&config.append_filename).unwrap();
        let occurrences = log
            .windows(b"SETNX".len())
            .filter(|window| window == b"SETNX")
            .count();
        assert_eq!(occurrences, 1);
    }

    #[test]
    fn test_replay_tolerates_truncated_tail() {
        let dir = TempDir::new().unwrap();
        let config = aof_config(&dir);

        let engine = Engine::new(&config).unwrap();
        let session = ReplaySession::new();
        engine.exec(&session, &cmd(&["set", "k", "v"]));
        engine.close();

        // simulate a crash mid-append
        let mut log = std::fs::read(&config.append_filename).unwrap();
        log.extend_from_slice(b"*3\r\n$3\r\nSET\r\n$1\r\nx");
        std::fs::write(&config.append_filename, &log).unwrap();

        let restarted = Engine::new(&config).unwrap();
        let session = ReplaySession::new();
        assert_eq!(
            restarted.exec(&session, &cmd(&["get", "k"])),
            Reply::Bulk(b"v".to_vec())
        );
        assert_eq!(restarted.exec(&session, &cmd(&["get", "x"])), Reply::NullBulk);
        restarted.close();
    }

    #[test]
    fn test_missing_file_is_clean_start() {
        let dir = TempDir::new().unwrap();
        let config = aof_config(&dir);
        let engine = Engine::new(&config).unwrap();
        let session = ReplaySession::new();
        assert_eq!(engine.exec(&session, &cmd(&["get", "k"])), Reply::NullBulk);
        engine.close();
    }
}
