// Streaming RESP parser
//
// Push-style state machine: callers feed raw socket (or file) chunks and
// receive zero or more payloads per call. A protocol error resets the
// in-progress frame and parsing resumes with the next line; I/O errors are
// the caller's concern and never appear here.

use bytes::BytesMut;
use thiserror::Error;

use super::Reply;

/// Output unit of the parser: a decoded reply or a protocol error.
pub type Payload = Result<Reply, ProtocolError>;

/// Bulk bodies above this are rejected as malformed rather than buffered.
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("ERR Protocol error: line is not terminated by CRLF")]
    BadLineTerminator,
    #[error("ERR Protocol error: invalid integer")]
    InvalidInteger,
    #[error("ERR Protocol error: invalid bulk length")]
    InvalidBulkLength,
    #[error("ERR Protocol error: invalid multibulk length")]
    InvalidMultibulkLength,
    #[error("ERR Protocol error: expected '$', got '{0}'")]
    ExpectedBulkHeader(char),
    #[error("ERR Protocol error: unexpected byte '{0}'")]
    UnexpectedByte(char),
}

/// Resumable parser state. One instance per stream; survives arbitrarily
/// small chunk boundaries, including mid-line and mid-bulk-body splits.
pub struct RespParser {
    buf: BytesMut,
    reading_multi_line: bool,
    expected_args: usize,
    msg_type: u8,
    args: Vec<Vec<u8>>,
    /// Non-zero while the next read must take a counted bulk body rather
    /// than scanning for a line terminator.
    bulk_len: usize,
}

impl RespParser {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            reading_multi_line: false,
            expected_args: 0,
            msg_type: 0,
            args: Vec::new(),
            bulk_len: 0,
        }
    }

    /// Feed a chunk of stream bytes, returning every payload that became
    /// complete. An empty chunk is a no-op.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Payload> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        loop {
            if self.bulk_len > 0 {
                let need = self.bulk_len + 2;
                if self.buf.len() < need {
                    break;
                }
                let mut body = self.buf.split_to(need);
                self.bulk_len = 0;
                if !body.ends_with(b"\r\n") {
                    out.push(Err(ProtocolError::BadLineTerminator));
                    self.reset_frame();
                    continue;
                }
                body.truncate(need - 2);
                self.args.push(body.to_vec());
                if self.args.len() == self.expected_args {
                    out.push(Ok(self.take_frame()));
                }
                continue;
            }

            let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
                break;
            };
            let mut line = self.buf.split_to(pos + 1);
            if line.len() < 2 || line[line.len() - 2] != b'\r' {
                out.push(Err(ProtocolError::BadLineTerminator));
                self.reset_frame();
                continue;
            }
            line.truncate(line.len() - 2);
            if line.is_empty() {
                continue;
            }

            if self.reading_multi_line {
                match self.read_bulk_header(&line) {
                    Ok(Some(reply)) => out.push(Ok(reply)),
                    Ok(None) => {}
                    Err(err) => {
                        out.push(Err(err));
                        self.reset_frame();
                    }
                }
            } else if let Some(payload) = self.dispatch_line(&line) {
                out.push(payload);
            }
        }

        out
    }

    /// True while bytes of an unfinished frame are pending. Used by AOF
    /// replay to report a truncated trailing record.
    pub fn is_partial(&self) -> bool {
        self.reading_multi_line || !self.buf.is_empty()
    }

    /// Handle a line seen outside any frame: a single-line reply or the
    /// header that opens a bulk / multi-bulk frame. `None` means a frame
    /// was opened and nothing is complete yet.
    fn dispatch_line(&mut self, line: &[u8]) -> Option<Payload> {
        match line[0] {
            b'+' => Some(Ok(Reply::Status(
                String::from_utf8_lossy(&line[1..]).into_owned(),
            ))),
            b'-' => Some(Ok(Reply::Error(
                String::from_utf8_lossy(&line[1..]).into_owned(),
            ))),
            b':' => Some(match parse_i64(&line[1..]) {
                Some(n) => Ok(Reply::Int(n)),
                None => Err(ProtocolError::InvalidInteger),
            }),
            b'$' => {
                let len = match parse_i64(&line[1..]) {
                    Some(n) => n,
                    None => return Some(Err(ProtocolError::InvalidBulkLength)),
                };
                if len < 0 {
                    return Some(Ok(Reply::NullBulk));
                }
                if len as usize > MAX_BULK_LEN {
                    return Some(Err(ProtocolError::InvalidBulkLength));
                }
                if len == 0 {
                    // The empty body line that follows is skipped as a
                    // blank line.
                    return Some(Ok(Reply::Bulk(Vec::new())));
                }
                self.msg_type = b'$';
                self.expected_args = 1;
                self.reading_multi_line = true;
                self.bulk_len = len as usize;
                None
            }
            b'*' => {
                let count = match parse_i64(&line[1..]) {
                    Some(n) => n,
                    None => return Some(Err(ProtocolError::InvalidMultibulkLength)),
                };
                if count < 0 {
                    return Some(Err(ProtocolError::InvalidMultibulkLength));
                }
                if count == 0 {
                    return Some(Ok(Reply::MultiBulk(Vec::new())));
                }
                self.msg_type = b'*';
                self.expected_args = count as usize;
                self.reading_multi_line = true;
                None
            }
            other => Some(Err(ProtocolError::UnexpectedByte(other as char))),
        }
    }

    /// Inside a frame, every scanned line must be a `$<len>` element
    /// header. Returns a completed reply when the zero-length shortcut
    /// finishes the frame.
    fn read_bulk_header(&mut self, line: &[u8]) -> Result<Option<Reply>, ProtocolError> {
        if line[0] != b'$' {
            return Err(ProtocolError::ExpectedBulkHeader(line[0] as char));
        }
        let len = parse_i64(&line[1..]).ok_or(ProtocolError::InvalidBulkLength)?;
        if len < 0 || len as usize > MAX_BULK_LEN {
            return Err(ProtocolError::InvalidBulkLength);
        }
        if len == 0 {
            self.args.push(Vec::new());
            if self.args.len() == self.expected_args {
                return Ok(Some(self.take_frame()));
            }
            return Ok(None);
        }
        self.bulk_len = len as usize;
        Ok(None)
    }

    fn take_frame(&mut self) -> Reply {
        let args = std::mem::take(&mut self.args);
        let reply = if self.msg_type == b'*' {
            Reply::MultiBulk(args)
        } else {
            Reply::Bulk(args.into_iter().next().unwrap_or_default())
        };
        self.reset_frame();
        reply
    }

    fn reset_frame(&mut self) {
        self.reading_multi_line = false;
        self.expected_args = 0;
        self.msg_type = 0;
        self.args.clear();
        self.bulk_len = 0;
    }
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_i64(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}
