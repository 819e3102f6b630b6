//! Newline-delimited JSON framing over any async byte stream.

use std::io;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use runbridge_core::TransportError;

/// Default upper bound for a single envelope line, newline included.
pub const DEFAULT_MAX_LINE: usize = 16 * 1024 * 1024;

/// Reads one JSON envelope per line.
pub struct FrameReader<R: AsyncRead + Unpin> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    max_line: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_line(reader, DEFAULT_MAX_LINE)
    }

    pub fn with_max_line(reader: R, max_line: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
            max_line,
        }
    }

    pub fn max_line(&self) -> usize {
        self.max_line
    }

    /// Next non-empty line, without the trailing newline. `Ok(None)` on clean EOF.
    ///
    /// At most `max_line + 1` bytes of a line are held in memory. A longer
    /// line is drained and reported as `FrameTooLarge`, carrying the envelope
    /// id when its prefix reveals one. A line that is not UTF-8 is a decode
    /// error. In both cases the stream stays positioned at the next line.
    pub async fn next_frame(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            self.buf.clear();
            let mut len = 0usize;
            loop {
                let available = self.reader.fill_buf().await.map_err(io_error)?;
                if available.is_empty() {
                    break;
                }
                let (used, done) = match available.iter().position(|b| *b == b'\n') {
                    Some(i) => (i + 1, true),
                    None => (available.len(), false),
                };
                let keep = (self.max_line + 1).saturating_sub(self.buf.len()).min(used);
                self.buf.extend_from_slice(&available[..keep]);
                self.reader.consume(used);
                len += used;
                if done {
                    break;
                }
            }

            if len == 0 {
                return Ok(None);
            }
            if len > self.max_line {
                return Err(TransportError::FrameTooLarge {
                    len,
                    limit: self.max_line,
                    id: leading_id(&self.buf),
                });
            }
            let text = std::str::from_utf8(&self.buf)
                .map_err(|e| TransportError::Decode(format!("frame is not valid UTF-8: {e}")))?;
            let line = text.trim();
            if !line.is_empty() {
                return Ok(Some(line.to_string()));
            }
        }
    }
}

/// Serialize `message` as one newline-terminated line of at most `max_line` bytes.
pub fn encode_frame<T>(message: &T, max_line: usize) -> Result<Vec<u8>, TransportError>
where
    T: Serialize + ?Sized,
{
    let mut bytes =
        serde_json::to_vec(message).map_err(|e| TransportError::Encode(e.to_string()))?;
    bytes.push(b'\n');
    if bytes.len() > max_line {
        return Err(TransportError::Encode(format!(
            "frame of {} bytes exceeds limit of {max_line}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Write an already encoded frame and flush.
pub async fn write_encoded<W>(writer: &mut W, frame: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(frame).await.map_err(io_error)?;
    writer.flush().await.map_err(io_error)?;
    Ok(())
}

/// Serialize `message` and write it as one line.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin + ?Sized,
    T: Serialize,
{
    let frame = encode_frame(message, DEFAULT_MAX_LINE)?;
    write_encoded(writer, &frame).await
}

/// Id of an envelope from the start of its line.
///
/// Both envelopes serialize `id` first, so `{"id":<n>` is all that is needed.
pub(crate) fn leading_id(prefix: &[u8]) -> Option<u64> {
    let text = match std::str::from_utf8(prefix) {
        Ok(text) => text,
        Err(e) => std::str::from_utf8(&prefix[..e.valid_up_to()]).ok()?,
    };
    let rest = text
        .trim_start()
        .strip_prefix('{')?
        .trim_start()
        .strip_prefix("\"id\"")?
        .trim_start()
        .strip_prefix(':')?
        .trim_start();
    let end = rest.find(|c: char| !c.is_ascii_digit())?;
    rest[..end].parse().ok()
}

pub(crate) fn io_error(e: io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::UnexpectedEof => TransportError::ChannelClosed,
        _ => TransportError::Io(e.to_string()),
    }
}
