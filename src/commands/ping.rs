// PING

use crate::protocol::Reply;
use crate::storage::Db;

use super::CommandTable;

pub(crate) fn register(table: &mut CommandTable) {
    table.register("ping", exec_ping, 0);
}

pub(crate) fn exec_ping(_db: &Db, _args: &[Vec<u8>]) -> Reply {
    Reply::Pong
}
