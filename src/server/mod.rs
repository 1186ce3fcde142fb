// TCP server: accept loop, per-connection workers, graceful shutdown

pub mod connection;
pub mod listener;

pub use connection::Connection;
pub use listener::Server;
