// Persistence - append-only file pipeline and startup replay

pub mod aof;

pub use aof::{AofHandler, AofSink};
