// Keyspace commands: DEL, EXISTS, FLUSH, TYPE, RENAME, RENAMENX, KEYS

use crate::protocol::Reply;
use crate::storage::Db;

use super::pattern::Pattern;
use super::{arg_to_key, with_name, CommandTable};

pub(crate) fn register(table: &mut CommandTable) {
    table.register("del", exec_del, -1);
    table.register("exists", exec_exists, -1);
    table.register("flush", exec_flush, 0);
    table.register("type", exec_type, 1);
    table.register("rename", exec_rename, 2);
    table.register("renamenx", exec_rename_nx, 2);
    table.register("keys", exec_keys, 1);
}

fn exec_del(db: &Db, args: &[Vec<u8>]) -> Reply {
    let keys: Vec<String> = args.iter().map(|arg| arg_to_key(arg)).collect();
    let removed = db.removes(&keys);
    db.add_aof(with_name("DEL", args));
    Reply::Int(removed as i64)
}

fn exec_exists(db: &Db, args: &[Vec<u8>]) -> Reply {
    let present = args
        .iter()
        .filter(|arg| db.get_entity(&arg_to_key(arg)).is_some())
        .count();
    Reply::Int(present as i64)
}

fn exec_flush(db: &Db, args: &[Vec<u8>]) -> Reply {
    db.flush();
    db.add_aof(with_name("FLUSH", args));
    Reply::Ok
}

fn exec_type(db: &Db, args: &[Vec<u8>]) -> Reply {
    match db.get_entity(&arg_to_key(&args[0])) {
        Some(entity) => Reply::Status(entity.type_name().to_string()),
        None => Reply::Status("none".to_string()),
    }
}

fn exec_rename(db: &Db, args: &[Vec<u8>]) -> Reply {
    let src = arg_to_key(&args[0]);
    let dst = arg_to_key(&args[1]);
    let Some(entity) = db.get_entity(&src) else {
        return Reply::Error("no such key".to_string());
    };
    db.put_entity(dst, entity);
    db.remove(&src);
    db.add_aof(with_name("RENAME", args));
    Reply::Ok
}

/// RENAME that refuses to clobber an existing destination.
fn exec_rename_nx(db: &Db, args: &[Vec<u8>]) -> Reply {
    let src = arg_to_key(&args[0]);
    let dst = arg_to_key(&args[1]);
    if db.get_entity(&dst).is_some() {
        return Reply::Error("key already exists".to_string());
    }
    let Some(entity) = db.get_entity(&src) else {
        return Reply::Error("no such key".to_string());
    };
    db.put_entity(dst, entity);
    db.remove(&src);
    db.add_aof(with_name("RENAMENX", args));
    Reply::Ok
}

fn exec_keys(db: &Db, args: &[Vec<u8>]) -> Reply {
    let pattern = Pattern::compile(&arg_to_key(&args[0]));
    let mut matched = Vec::new();
    db.for_each(|key, _| {
        if pattern.matches(key) {
            matched.push(key.as_bytes().to_vec());
        }
        true
    });
    Reply::MultiBulk(matched)
}
