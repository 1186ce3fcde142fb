// Protocol module - RESP reply types and the streaming parser

pub mod parser;
pub mod reply;

pub use parser::{Payload, ProtocolError, RespParser};
pub use reply::Reply;
