//! Streaming decoder for the V2 response: one JSON array of frame objects.
//!
//! The whole payload is never buffered; the scanner yields one frame object
//! at a time and forwards the decoded frame on a bounded channel. Dropping
//! the receiving half stops the reader within one pending read.

use crate::error::{Error, ErrorKind, OpKind, ParseError, Result};
use crate::models::v2::Frame;
use futures::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

/// Capacity of the decoded-frame channel.
pub const FRAME_CHANNEL_CAPACITY: usize = 16;

const READ_CHUNK: usize = 8192;

/// Spawns a reader task decoding frames from `reader` and returns the
/// receiving half of the frame channel.
///
/// A decode failure is forwarded as a terminal `Err` item, after which the
/// channel closes.
pub fn spawn_frame_decoder<R>(reader: R, op: OpKind) -> mpsc::Receiver<Result<Frame>>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
    tokio::spawn(decode_frames(reader, tx, op));
    rx
}

async fn decode_frames<R>(reader: R, tx: mpsc::Sender<Result<Frame>>, op: OpKind)
where
    R: AsyncRead + Send + Unpin,
{
    let mut scanner = FrameScanner::new(reader);
    loop {
        match scanner.next_object().await {
            Ok(Some(raw)) => match serde_json::from_slice::<Frame>(&raw) {
                Ok(frame) => {
                    // A closed receiver means the consumer stopped; just exit.
                    if tx.send(Ok(frame)).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "failed to decode response frame");
                    let _ = tx
                        .send(Err(Error::wrapping(op, ErrorKind::Internal, e)))
                        .await;
                    return;
                }
            },
            Ok(None) => return,
            Err(e) => {
                let _ = tx.send(Err(e.with_op(op))).await;
                return;
            }
        }
    }
}

/// Collects all frames of a complete response body.
///
/// Only used for responses that are small enough to hold in memory; the
/// streaming path goes through [spawn_frame_decoder].
pub async fn parse_frames_full(mut reader: impl AsyncRead + Send + Unpin) -> Result<Vec<Frame>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(serde_json::from_slice(&buf)?)
}

/// Incremental scanner over `[ {..}, {..}, ... ]`.
///
/// Tracks string and escape state so braces inside string values do not
/// confuse the object-depth count.
struct FrameScanner<R> {
    reader: R,
    buf: Vec<u8>,
    pos: usize,
    len: usize,
    started: bool,
    finished: bool,
}

impl<R: AsyncRead + Send + Unpin> FrameScanner<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buf: vec![0; READ_CHUNK],
            pos: 0,
            len: 0,
            started: false,
            finished: false,
        }
    }

    async fn next_byte(&mut self) -> Result<Option<u8>> {
        if self.pos == self.len {
            self.len = self.reader.read(&mut self.buf).await?;
            self.pos = 0;
            if self.len == 0 {
                return Ok(None);
            }
        }
        let byte = self.buf[self.pos];
        self.pos += 1;
        Ok(Some(byte))
    }

    async fn next_byte_skipping_ws(&mut self) -> Result<Option<u8>> {
        loop {
            match self.next_byte().await? {
                Some(b) if b.is_ascii_whitespace() => continue,
                other => return Ok(other),
            }
        }
    }

    fn unexpected(byte: u8) -> Error {
        ParseError::Frame(format!("unexpected character '{}' in frame stream", byte as char))
            .into()
    }

    fn truncated() -> Error {
        ParseError::Frame("response stream ended mid-frame".to_string()).into()
    }

    /// Yields the raw bytes of the next frame object, `None` at the end of
    /// the array.
    async fn next_object(&mut self) -> Result<Option<Vec<u8>>> {
        if self.finished {
            return Ok(None);
        }
        if !self.started {
            match self.next_byte_skipping_ws().await? {
                Some(b'[') => self.started = true,
                Some(other) => return Err(Self::unexpected(other)),
                None => return Err(Self::truncated()),
            }
        }

        let first = match self.next_byte_skipping_ws().await? {
            Some(b']') => {
                self.finished = true;
                return Ok(None);
            }
            Some(b',') => match self.next_byte_skipping_ws().await? {
                Some(b) => b,
                None => return Err(Self::truncated()),
            },
            Some(b) => b,
            None => return Err(Self::truncated()),
        };
        if first != b'{' {
            return Err(Self::unexpected(first));
        }

        let mut object = vec![first];
        let mut depth = 1u32;
        let mut in_string = false;
        let mut escaped = false;
        while depth > 0 {
            let byte = self.next_byte().await?.ok_or_else(Self::truncated)?;
            object.push(byte);
            if in_string {
                if escaped {
                    escaped = false;
                } else if byte == b'\\' {
                    escaped = true;
                } else if byte == b'"' {
                    in_string = false;
                }
            } else {
                match byte {
                    b'"' => in_string = true,
                    b'{' => depth += 1,
                    b'}' => depth -= 1,
                    _ => {}
                }
            }
        }
        Ok(Some(object))
    }
}
