// Command table and registration
//
// Commands are registered into a table once at startup; the table is
// immutable from then on and shared by every logical database.

pub mod keys;
pub mod pattern;
pub mod ping;
pub mod strings;

use std::collections::HashMap;

use crate::protocol::Reply;
use crate::storage::Db;

/// A full command line: the name followed by its arguments, raw bytes.
pub type CommandLine = Vec<Vec<u8>>;

/// Command executor. Receives the target database and the arguments
/// (name excluded).
pub type ExecFn = fn(&Db, &[Vec<u8>]) -> Reply;

pub struct Command {
    pub exec: ExecFn,
    /// Argument count excluding the name. Negative means "at least
    /// |arity|" for variadic commands.
    pub arity: i32,
}

pub struct CommandTable {
    commands: HashMap<String, Command>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, exec: ExecFn, arity: i32) {
        self.commands
            .insert(name.trim().to_lowercase(), Command { exec, arity });
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The full command set served by the engine.
pub fn build_table() -> CommandTable {
    let mut table = CommandTable::new();
    ping::register(&mut table);
    strings::register(&mut table);
    keys::register(&mut table);
    table
}

pub(crate) fn validate_arity(arity: i32, args: &[Vec<u8>]) -> bool {
    if arity >= 0 {
        args.len() == arity as usize
    } else {
        args.len() >= arity.unsigned_abs() as usize
    }
}

/// Rebuild a command line from a canonical name plus the arguments a
/// handler received, for AOF persistence.
pub(crate) fn with_name(name: &str, args: &[Vec<u8>]) -> CommandLine {
    let mut line = Vec::with_capacity(args.len() + 1);
    line.push(name.as_bytes().to_vec());
    line.extend(args.iter().cloned());
    line
}

pub(crate) fn arg_to_key(arg: &[u8]) -> String {
    String::from_utf8_lossy(arg).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_table_registers_command_set() {
        let table = build_table();
        for name in [
            "ping", "get", "set", "setnx", "setex", "getset", "strlen", "del", "exists",
            "flush", "type", "rename", "renamenx", "keys",
        ] {
            assert!(table.get(name).is_some(), "missing command {name}");
        }
        assert_eq!(table.len(), 14);
    }

    #[test]
    fn test_register_normalizes_names() {
        let mut table = CommandTable::new();
        table.register(" PING ", ping::exec_ping, 0);
        assert!(table.get("ping").is_some());
    }

    #[test]
    fn test_validate_arity() {
        // exact
        assert!(validate_arity(2, &[vec![b'a'], vec![b'b']]));
        assert!(!validate_arity(2, &[vec![b'a']]));
        assert!(!validate_arity(2, &[vec![b'a'], vec![b'b'], vec![b'c']]));
        // at-least
        assert!(validate_arity(-1, &[vec![b'a']]));
        assert!(validate_arity(-1, &[vec![b'a'], vec![b'b']]));
        assert!(!validate_arity(-1, &[]));
        // zero
        assert!(validate_arity(0, &[]));
        assert!(!validate_arity(0, &[vec![b'a']]));
    }

    #[test]
    fn test_with_name() {
        let line = with_name("SET", &[b"k".to_vec(), b"v".to_vec()]);
        assert_eq!(line, vec![b"SET".to_vec(), b"k".to_vec(), b"v".to_vec()]);
    }
}
