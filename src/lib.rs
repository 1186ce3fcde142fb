pub mod commands;
pub mod config;
pub mod engine;
pub mod persistence;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types
pub use config::ServerConfig;
pub use engine::{Engine, Session};
pub use protocol::{Payload, ProtocolError, Reply, RespParser};
pub use server::{Connection, Server};
pub use storage::{DataEntity, Db, Dict};
