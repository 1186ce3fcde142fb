// Logical database
//
// One of N independent keyspaces. A Db executes commands against its own
// dict through the injected command table; the AOF hook is installed once
// after startup replay, so replayed commands never persist themselves.

use std::sync::{Arc, OnceLock};

use crate::commands::{validate_arity, CommandLine, CommandTable};
use crate::persistence::aof::AofSink;
use crate::protocol::Reply;

use super::dict::Dict;
use super::entity::DataEntity;

pub struct Db {
    index: usize,
    data: Dict,
    table: Arc<CommandTable>,
    aof: OnceLock<AofSink>,
}

impl Db {
    pub fn new(index: usize, table: Arc<CommandTable>) -> Self {
        Self {
            index,
            data: Dict::new(),
            table,
            aof: OnceLock::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Look the command up, validate its arity, run it. `cmd_line`
    /// includes the command name; handlers receive only the arguments.
    pub fn exec(&self, cmd_line: &[Vec<u8>]) -> Reply {
        let name = String::from_utf8_lossy(&cmd_line[0]).to_lowercase();
        let Some(cmd) = self.table.get(&name) else {
            return Reply::Error(format!("[Command Error] Unknown command {name}"));
        };
        if !validate_arity(cmd.arity, &cmd_line[1..]) {
            return Reply::Error(format!("ERR wrong number of arguments for '{name}'"));
        }
        (cmd.exec)(self, &cmd_line[1..])
    }

    pub fn get_entity(&self, key: &str) -> Option<DataEntity> {
        self.data.get(key)
    }

    pub fn put_entity(&self, key: String, entity: DataEntity) -> usize {
        self.data.put(key, entity)
    }

    pub fn put_if_absent(&self, key: String, entity: DataEntity) -> usize {
        self.data.put_if_absent(key, entity)
    }

    pub fn put_if_exists(&self, key: &str, entity: DataEntity) -> usize {
        self.data.put_if_exists(key, entity)
    }

    pub fn remove(&self, key: &str) -> usize {
        self.data.remove(key)
    }

    /// Batch removal; the count of keys actually deleted is the reply
    /// value for DEL.
    pub fn removes(&self, keys: &[String]) -> usize {
        keys.iter().map(|key| self.data.remove(key)).sum()
    }

    pub fn flush(&self) {
        self.data.clear();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn for_each<F>(&self, consumer: F)
    where
        F: FnMut(&str, &DataEntity) -> bool,
    {
        self.data.for_each(consumer)
    }

    /// Enqueue a write-class command for persistence. A no-op until the
    /// hook is installed (AOF disabled, or startup replay in progress).
    pub(crate) fn add_aof(&self, cmd: CommandLine) {
        if let Some(sink) = self.aof.get() {
            sink.append(self.index, cmd);
        }
    }

    pub(crate) fn install_aof(&self, sink: AofSink) {
        let _ = self.aof.set(sink);
    }
}
