//! Reads JSON-RPC frames off a byte stream and writes replies back.

use proto::{GatewayError, RpcResponse};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound for a single buffered frame.
pub const MAX_MESSAGE_LEN: usize = 1_048_576;

const READ_CHUNK: usize = 8 * 1024;

/// Incremental reader yielding one JSON value per call.
///
/// Frames may be separated by whitespace or simply concatenated. Each buffered
/// byte is scanned once to find where a frame ends, and the frame is parsed
/// once that end is known.
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
    scanner: FrameScanner,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wraps a readable half of a connection.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            scanner: FrameScanner::default(),
        }
    }

    /// Returns the next frame, `Ok(None)` on a clean end of stream.
    pub async fn next_frame(&mut self) -> Result<Option<Value>, GatewayError> {
        loop {
            if self.scanner.is_idle() {
                trim_leading_whitespace(&mut self.buf);
            }
            if let Some(end) = self.scanner.scan(&self.buf) {
                let frame = parse_frame(&self.buf[..end]);
                self.buf.drain(..end);
                self.scanner = FrameScanner::default();
                return frame.map(Some);
            }
            ensure_message_len(self.buf.len())?;

            let mut chunk = [0u8; READ_CHUNK];
            let n = self
                .inner
                .read(&mut chunk)
                .await
                .map_err(|e| GatewayError::Connection(e.to_string()))?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                // A bare scalar at the end of the stream has no delimiter.
                return match try_parse_frame(&self.buf)? {
                    Some((frame, consumed)) => {
                        self.buf.drain(..consumed);
                        self.scanner = FrameScanner::default();
                        Ok(Some(frame))
                    }
                    None => Err(GatewayError::Protocol(
                        "stream closed inside a frame".into(),
                    )),
                };
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Writes one newline-terminated response frame and flushes it.
pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &RpcResponse,
) -> Result<(), GatewayError> {
    let bytes = response
        .to_line()
        .map_err(|e| GatewayError::Protocol(e.to_string()))?;
    writer
        .write_all(&bytes)
        .await
        .map_err(|e| GatewayError::Connection(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| GatewayError::Connection(e.to_string()))
}

fn trim_leading_whitespace(buf: &mut Vec<u8>) {
    let start = buf
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(buf.len());
    buf.drain(..start);
}

/// Tracks nesting across reads to locate the end of the current frame.
#[derive(Debug, Default)]
struct FrameScanner {
    /// Bytes of the buffer already examined.
    pos: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
    scalar: bool,
}

impl FrameScanner {
    fn is_idle(&self) -> bool {
        self.pos == 0
    }

    /// Resumes scanning at `pos` and returns the end offset of the frame once
    /// it is complete. Malformed input is left for the parser to reject.
    fn scan(&mut self, buf: &[u8]) -> Option<usize> {
        while let Some(&b) = buf.get(self.pos) {
            if self.in_string {
                self.pos += 1;
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                    if self.depth == 0 {
                        return Some(self.pos);
                    }
                }
                continue;
            }

            match b {
                b'"' | b'{' | b'[' | b'}' | b']' if self.scalar => return Some(self.pos),
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        self.pos += 1;
                        return Some(self.pos);
                    }
                }
                _ if self.depth == 0 => {
                    if !b.is_ascii_whitespace() {
                        self.scalar = true;
                    } else if self.scalar {
                        return Some(self.pos);
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
        None
    }
}

/// Parses a slice the scanner reported as one complete frame.
fn parse_frame(frame: &[u8]) -> Result<Value, GatewayError> {
    serde_json::from_slice(frame)
        .map_err(|e| GatewayError::Protocol(format!("Deserialize error: {e}")))
}

/// Parses the first complete JSON value in `buf`.
///
/// Returns the value with the number of bytes it spans, `None` when more input
/// is needed, or a protocol error for malformed input.
fn try_parse_frame(buf: &[u8]) -> Result<Option<(Value, usize)>, GatewayError> {
    let mut stream = serde_json::Deserializer::from_slice(buf).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => Ok(Some((value, stream.byte_offset()))),
        Some(Err(e)) if e.is_eof() => Ok(None),
        Some(Err(e)) => Err(GatewayError::Protocol(format!("Deserialize error: {e}"))),
        None => Ok(None),
    }
}

/// Validates buffered payload size against the maximum frame size.
fn ensure_message_len(len: usize) -> Result<(), GatewayError> {
    if len > MAX_MESSAGE_LEN {
        return Err(GatewayError::Connection("Message too large".into()));
    }
    Ok(())
}
