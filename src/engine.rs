// Multi-database engine
//
// Owns the ordered set of logical databases and routes each command line
// to the one the client selected. SELECT is intercepted here because it
// touches connection state rather than a keyspace.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::error;

use crate::commands::{build_table, CommandTable};
use crate::config::ServerConfig;
use crate::persistence::aof::AofHandler;
use crate::protocol::Reply;
use crate::storage::Db;

/// The slice of per-client state command routing needs: which database
/// the client has selected. Implemented by the server connection and by
/// the throw-away session AOF replay runs under.
pub trait Session: Send + Sync {
    fn db_index(&self) -> usize;
    fn select_db(&self, index: usize);
}

pub struct Engine {
    dbs: Vec<Arc<Db>>,
    aof: Option<AofHandler>,
}

impl Engine {
    /// Builds the databases and, when AOF is enabled, replays the
    /// existing log *before* installing the write hooks, so replay never
    /// feeds back into the log.
    pub fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        Self::with_table(config, build_table())
    }

    fn with_table(config: &ServerConfig, table: CommandTable) -> anyhow::Result<Self> {
        let table = Arc::new(table);
        let count = if config.databases == 0 {
            16
        } else {
            config.databases
        };
        let dbs = (0..count)
            .map(|index| Arc::new(Db::new(index, Arc::clone(&table))))
            .collect();

        let mut engine = Self { dbs, aof: None };
        if config.append_only {
            let aof = AofHandler::new(Path::new(&config.append_filename), &engine)
                .context("failed to initialize append-only persistence")?;
            for db in &engine.dbs {
                db.install_aof(aof.sink());
            }
            engine.aof = Some(aof);
        }
        Ok(engine)
    }

    pub fn exec(&self, session: &dyn Session, cmd_line: &[Vec<u8>]) -> Reply {
        if cmd_line.is_empty() {
            return Reply::Error("ERR empty command".to_string());
        }
        let name = String::from_utf8_lossy(&cmd_line[0]).to_lowercase();
        if name == "select" {
            if cmd_line.len() != 2 {
                return Reply::Error("ERR wrong number of arguments for 'select'".to_string());
            }
            return self.exec_select(session, &cmd_line[1]);
        }

        let db = &self.dbs[session.db_index()];
        match panic::catch_unwind(AssertUnwindSafe(|| db.exec(cmd_line))) {
            Ok(reply) => reply,
            Err(_) => {
                error!(command = %name, "command handler panicked");
                Reply::Error("ERR internal error".to_string())
            }
        }
    }

    fn exec_select(&self, session: &dyn Session, arg: &[u8]) -> Reply {
        let index = match std::str::from_utf8(arg).ok().and_then(|s| s.parse::<i64>().ok()) {
            Some(index) => index,
            None => return Reply::Error("ERR invalid DB index".to_string()),
        };
        if index < 0 || index as usize >= self.dbs.len() {
            return Reply::Error("ERR DB index out of range".to_string());
        }
        session.select_db(index as usize);
        Reply::Int(index)
    }

    pub fn db_count(&self) -> usize {
        self.dbs.len()
    }

    /// Drains and stops the AOF writer. Safe to call when AOF is off.
    pub fn close(&self) {
        if let Some(aof) = &self.aof {
            aof.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestSession {
        selected: AtomicUsize,
    }

    impl TestSession {
        fn new() -> Self {
            Self {
                selected: AtomicUsize::new(0),
            }
        }
    }

    impl Session for TestSession {
        fn db_index(&self) -> usize {
            self.selected.load(Ordering::Relaxed)
        }

        fn select_db(&self, index: usize) {
            self.selected.store(index, Ordering::Relaxed);
        }
    }

    fn cmd(parts: &[&str]) -> Vec<Vec<u8>> {
        parts.iter().map(|p| p.as_bytes().to_vec()).collect()
    }

    fn make_engine() -> Engine {
        Engine::new(&ServerConfig::default()).unwrap()
    }

    #[test]
    fn test_select_routes_commands() {
        let engine = make_engine();
        let session = TestSession::new();

        assert_eq!(engine.exec(&session, &cmd(&["select", "1"])), Reply::Int(1));
        assert_eq!(session.db_index(), 1);
        assert_eq!(engine.exec(&session, &cmd(&["set", "k", "v"])), Reply::Ok);

        // the same key is absent from database 0
        engine.exec(&session, &cmd(&["select", "0"]));
        assert_eq!(engine.exec(&session, &cmd(&["get", "k"])), Reply::NullBulk);

        engine.exec(&session, &cmd(&["select", "1"]));
        assert_eq!(
            engine.exec(&session, &cmd(&["get", "k"])),
            Reply::Bulk(b"v".to_vec())
        );
    }

    #[test]
    fn test_select_is_case_insensitive() {
        let engine = make_engine();
        let session = TestSession::new();
        assert_eq!(engine.exec(&session, &cmd(&["SELECT", "2"])), Reply::Int(2));
    }

    #[test]
    fn test_select_rejects_bad_indices() {
        let engine = make_engine();
        let session = TestSession::new();
        assert_eq!(
            engine.exec(&session, &cmd(&["select", "abc"])),
            Reply::Error("ERR invalid DB index".into())
        );
        assert_eq!(
            engine.exec(&session, &cmd(&["select", "16"])),
            Reply::Error("ERR DB index out of range".into())
        );
        assert_eq!(
            engine.exec(&session, &cmd(&["select", "-1"])),
            Reply::Error("ERR DB index out of range".into())
        );
        assert_eq!(
            engine.exec(&session, &cmd(&["select"])),
            Reply::Error("ERR wrong number of arguments for 'select'".into())
        );
        assert_eq!(session.db_index(), 0);
    }

    #[test]
    fn test_empty_command() {
        let engine = make_engine();
        let session = TestSession::new();
        assert_eq!(
            engine.exec(&session, &[]),
            Reply::Error("ERR empty command".into())
        );
    }

    #[test]
    fn test_zero_databases_coerced() {
        let config = ServerConfig {
            databases: 0,
            ..ServerConfig::default()
        };
        let engine = Engine::new(&config).unwrap();
        assert_eq!(engine.db_count(), 16);
    }

    #[test]
    fn test_handler_panic_becomes_error_reply() {
        fn exec_boom(_db: &Db, _args: &[Vec<u8>]) -> Reply {
            panic!("boom");
        }

        let mut table = build_table();
        table.register("boom", exec_boom, 0);
        let engine = Engine::with_table(&ServerConfig::default(), table).unwrap();
        let session = TestSession::new();
        assert_eq!(
            engine.exec(&session, &cmd(&["boom"])),
            Reply::Error("ERR internal error".into())
        );
        // the engine keeps serving afterwards
        assert_eq!(engine.exec(&session, &cmd(&["ping"])), Reply::Pong);
    }
}
