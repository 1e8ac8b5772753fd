//! Self-delimiting JSON record stream used on both sides of the connection
//!
//! Writers emit one JSON object per record followed by a newline. Readers do
//! not depend on that newline: record boundaries come from the JSON syntax, so
//! several records in one read, or one record split over many reads, decode
//! the same way.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single buffered record
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

const READ_CHUNK: usize = 4096;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed record: {0}")]
    Json(#[from] serde_json::Error),
    #[error("stream ended inside a record")]
    Truncated,
    #[error("record exceeds {max} bytes")]
    TooLarge { max: usize },
}

/// Encodes one record, newline terminated, ready to be written as-is
pub fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>, FrameError> {
    let mut data = serde_json::to_vec(value)?;
    data.push(b'\n');
    Ok(data)
}

/// Tries to take one complete record off the front of `buffer`.
///
/// Returns `Ok(None)` when the buffer holds only whitespace or the start of a
/// record that needs more bytes.
pub fn decode_buffered<T: DeserializeOwned>(buffer: &mut Vec<u8>) -> Result<Option<T>, FrameError> {
    let (result, consumed) = {
        let mut stream = serde_json::Deserializer::from_slice(&buffer[..]).into_iter::<T>();
        let result = stream.next();
        (result, stream.byte_offset())
    };

    match result {
        Some(Ok(value)) => {
            buffer.drain(..consumed);
            Ok(Some(value))
        }
        Some(Err(e)) if e.is_eof() => Ok(None),
        Some(Err(e)) => Err(FrameError::Json(e)),
        None => {
            buffer.clear();
            Ok(None)
        }
    }
}

pub struct FrameReader<R> {
    reader: R,
    buffer: Vec<u8>,
    max_frame_len: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_frame_len(reader, MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(reader: R, max_frame_len: usize) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            max_frame_len,
        }
    }

    /// Reads the next record. `Ok(None)` means the peer closed the stream
    /// cleanly between records.
    pub async fn read_frame<T: DeserializeOwned>(&mut self) -> Result<Option<T>, FrameError> {
        let mut chunk = [0u8; READ_CHUNK];
        // Leftovers from the previous call may already hold a whole record
        let mut may_complete = true;

        loop {
            if may_complete {
                if let Some(value) = decode_buffered(&mut self.buffer)? {
                    return Ok(Some(value));
                }
            }

            if self.buffer.len() > self.max_frame_len {
                return Err(FrameError::TooLarge {
                    max: self.max_frame_len,
                });
            }

            let len = self.reader.read(&mut chunk).await?;
            if len == 0 {
                if self.buffer.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                return match decode_buffered(&mut self.buffer)? {
                    Some(value) => Ok(Some(value)),
                    None => Err(FrameError::Truncated),
                };
            }
            self.buffer.extend_from_slice(&chunk[..len]);

            // Records are JSON objects, so none can end in a chunk without a
            // closing brace. Skipping those keeps a large record linear.
            may_complete = chunk[..len].contains(&b'}');
        }
    }
}

pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_frame<T: Serialize>(&mut self, value: &T) -> Result<(), FrameError> {
        let data = encode_frame(value)?;
        self.write_encoded(&data).await
    }

    /// Writes bytes produced by [`encode_frame`], so one encoding can be shared
    /// across many connections.
    pub async fn write_encoded(&mut self, data: &[u8]) -> Result<(), FrameError> {
        self.writer.write_all(data).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), FrameError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
