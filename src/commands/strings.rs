// String commands: GET, SET, SETNX, SETEX, GETSET, STRLEN

use crate::protocol::Reply;
use crate::storage::{DataEntity, Db};

use super::{arg_to_key, with_name, CommandTable};

pub(crate) fn register(table: &mut CommandTable) {
    table.register("get", exec_get, 1);
    table.register("set", exec_set, 2);
    table.register("setnx", exec_set_nx, 2);
    table.register("setex", exec_set_ex, 2);
    table.register("getset", exec_get_set, 2);
    table.register("strlen", exec_str_len, 1);
}

fn exec_get(db: &Db, args: &[Vec<u8>]) -> Reply {
    match db.get_entity(&arg_to_key(&args[0])) {
        Some(entity) => Reply::Bulk(entity.as_bytes().to_vec()),
        None => Reply::NullBulk,
    }
}

fn exec_set(db: &Db, args: &[Vec<u8>]) -> Reply {
    db.put_entity(arg_to_key(&args[0]), DataEntity::from(args[1].clone()));
    db.add_aof(with_name("SET", args));
    Reply::Ok
}

/// Insert-if-absent. Replies 1 when the key was created.
fn exec_set_nx(db: &Db, args: &[Vec<u8>]) -> Reply {
    let inserted = db.put_if_absent(arg_to_key(&args[0]), DataEntity::from(args[1].clone()));
    if inserted == 1 {
        db.add_aof(with_name("SETNX", args));
    }
    Reply::Int(inserted as i64)
}

/// Conditional replace: only overwrites an existing key. Replies 1 when
/// the value was replaced.
fn exec_set_ex(db: &Db, args: &[Vec<u8>]) -> Reply {
    let replaced = db.put_if_exists(&arg_to_key(&args[0]), DataEntity::from(args[1].clone()));
    if replaced == 1 {
        db.add_aof(with_name("SETEX", args));
    }
    Reply::Int(replaced as i64)
}

fn exec_get_set(db: &Db, args: &[Vec<u8>]) -> Reply {
    let key = arg_to_key(&args[0]);
    let previous = db.get_entity(&key);
    db.put_entity(key, DataEntity::from(args[1].clone()));
    db.add_aof(with_name("GETSET", args));
    match previous {
        Some(entity) => Reply::Bulk(entity.as_bytes().to_vec()),
        None => Reply::NullBulk,
    }
}

fn exec_str_len(db: &Db, args: &[Vec<u8>]) -> Reply {
    match db.get_entity(&arg_to_key(&args[0])) {
        Some(entity) => Reply::Int(entity.as_bytes().len() as i64),
        None => Reply::Int(0),
    }
}
