//! Newline framing over a raw byte stream.
//!
//! Accumulates bytes from a connection until a complete delimited frame is
//! available, bounded by a single wall-clock deadline covering the whole
//! read phase. The three failure reasons are reported distinctly so the
//! handler can log them apart, even though all of them end the connection
//! without a response.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{self, Instant};

/// Frame delimiter
const DELIMITER: u8 = b'\n';

/// Read buffer size per read call
const READ_BUFFER_SIZE: usize = 4096;

/// Why a frame could not be read
#[derive(Debug)]
pub enum FrameError {
    /// Deadline elapsed with a partial frame buffered
    Timeout,
    /// Peer closed the connection with a partial frame buffered
    Closed,
    /// The attempt concluded without a single byte received
    Empty,
    /// Transport error other than a transient timeout
    Io(std::io::Error),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::Timeout => write!(f, "timed out waiting for a complete frame"),
            FrameError::Closed => write!(f, "connection closed before frame was complete"),
            FrameError::Empty => write!(f, "no data received"),
            FrameError::Io(e) => write!(f, "read error: {e}"),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Read one delimited frame from `stream`.
///
/// Returns the bytes up to the first delimiter, delimiter stripped. Any
/// bytes buffered after the delimiter are discarded; each connection
/// carries exactly one request/response exchange.
pub async fn read_frame<R>(stream: &mut R, timeout: std::time::Duration) -> Result<BytesMut, FrameError>
where
    R: AsyncRead + Unpin,
{
    let deadline = Instant::now() + timeout;
    let mut buffer = BytesMut::with_capacity(READ_BUFFER_SIZE);

    loop {
        if let Some(pos) = buffer.iter().position(|&b| b == DELIMITER) {
            let frame = buffer.split_to(pos);
            // Remaining bytes (the delimiter and anything after it) are dropped
            return Ok(frame);
        }

        buffer.reserve(READ_BUFFER_SIZE);
        match time::timeout_at(deadline, stream.read_buf(&mut buffer)).await {
            Err(_elapsed) => {
                return Err(if buffer.is_empty() {
                    FrameError::Empty
                } else {
                    FrameError::Timeout
                });
            }
            Ok(Ok(0)) => {
                return Err(if buffer.is_empty() {
                    FrameError::Empty
                } else {
                    FrameError::Closed
                });
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                // Transient socket timeouts are retried up to the deadline
                match e.kind() {
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {}
                    _ => return Err(FrameError::Io(e)),
                }
            }
        }
    }
}
