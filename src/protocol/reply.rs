// RESP reply values and their wire encodings

use bytes::{BufMut, Bytes, BytesMut};

const CRLF: &[u8] = b"\r\n";

/// A typed server reply. `to_bytes` produces the canonical RESP form.
///
/// `Bulk` and `NullBulk` are distinct on the wire (`$0\r\n\r\n` carries an
/// empty string, `$-1\r\n` carries no value at all).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Simple status line: `+<s>\r\n`
    Status(String),
    /// Error line: `-<s>\r\n`
    Error(String),
    /// Integer: `:<n>\r\n`
    Int(i64),
    /// Length-prefixed byte string: `$<len>\r\n<bytes>\r\n`
    Bulk(Vec<u8>),
    /// Absent value: `$-1\r\n`
    NullBulk,
    /// Array of bulk strings: `*<k>\r\n` followed by each element
    MultiBulk(Vec<Vec<u8>>),
    /// Canned `+PONG\r\n`
    Pong,
    /// Canned `+OK\r\n`
    Ok,
    /// No bytes are written at all
    NoReply,
}

impl Reply {
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.write_to(&mut buf);
        buf.freeze()
    }

    fn write_to(&self, buf: &mut BytesMut) {
        match self {
            Reply::Status(s) => {
                buf.put_u8(b'+');
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            Reply::Error(msg) => {
                buf.put_u8(b'-');
                buf.put_slice(msg.as_bytes());
                buf.put_slice(CRLF);
            }
            Reply::Int(n) => {
                buf.put_u8(b':');
                buf.put_slice(n.to_string().as_bytes());
                buf.put_slice(CRLF);
            }
            Reply::Bulk(data) => write_bulk(buf, data),
            Reply::NullBulk => buf.put_slice(b"$-1\r\n"),
            Reply::MultiBulk(parts) => {
                buf.put_u8(b'*');
                buf.put_slice(parts.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                for part in parts {
                    write_bulk(buf, part);
                }
            }
            Reply::Pong => buf.put_slice(b"+PONG\r\n"),
            Reply::Ok => buf.put_slice(b"+OK\r\n"),
            Reply::NoReply => {}
        }
    }

    /// True iff the first serialized byte is `-`.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

fn write_bulk(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u8(b'$');
    buf.put_slice(data.len().to_string().as_bytes());
    buf.put_slice(CRLF);
    buf.put_slice(data);
    buf.put_slice(CRLF);
}
