use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};
use tracing::trace;
use upblink_transport::{LinkStream, PortSettings};

use crate::codec::{decode_frame, TERMINATOR};
use crate::error::{FrameError, Result};
use crate::message::Frame;

const INITIAL_BUFFER_CAPACITY: usize = 1024;
const READ_CHUNK_SIZE: usize = 256;

/// Maximum accumulated run length before the stream is declared corrupt.
///
/// The longest legal PIM line is a full 24-byte packet in hex plus its
/// two-byte prefix; 256 leaves generous slack for register reports.
pub const DEFAULT_MAX_RUN: usize = 256;

/// Reads complete CR-terminated frames from any `Read` stream.
///
/// Handles partial reads and receive timeouts internally. A timed-out read
/// is not an error: [`poll_frame`](Self::poll_frame) returns `Ok(None)` so
/// the caller can observe its shutdown flag between polls.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    max_run: usize,
    /// Set after an overrun: drop everything up to the next terminator.
    discarding: bool,
}

impl<T: Read> FrameReader<T> {
    /// Create a frame reader with the default run bound.
    pub fn new(inner: T) -> Self {
        Self::with_max_run(inner, DEFAULT_MAX_RUN)
    }

    /// Create a frame reader with an explicit run bound.
    pub fn with_max_run(inner: T, max_run: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_run,
            discarding: false,
        }
    }

    /// Try to produce the next complete frame.
    ///
    /// Returns `Ok(None)` when no complete frame is available yet (receive
    /// timeout or partial run). Parse errors and overruns condemn one run
    /// and leave the reader synchronized for the next call.
    pub fn poll_frame(&mut self) -> Result<Option<Frame>> {
        // Drain anything already buffered before touching the stream again.
        if let Some(run) = self.take_run()? {
            return Ok(Some(decode_frame(&run)?));
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let read = match self.inner.read(&mut chunk) {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => n,
            Err(err) if is_receive_timeout(&err) => return Ok(None),
            Err(err) if err.kind() == ErrorKind::Interrupted => return Ok(None),
            Err(err) => return Err(FrameError::Io(err)),
        };
        self.buf.extend_from_slice(&chunk[..read]);

        match self.take_run()? {
            Some(run) => Ok(Some(decode_frame(&run)?)),
            None => Ok(None),
        }
    }

    /// Extract the next terminated run from the buffer, applying overrun
    /// resynchronization and skipping blank lines (CRLF noise).
    fn take_run(&mut self) -> Result<Option<BytesMut>> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == TERMINATOR) {
                let mut run = self.buf.split_to(pos);
                self.buf.advance(1);

                if self.discarding {
                    trace!(dropped = run.len(), "resynchronized at terminator");
                    self.discarding = false;
                    continue;
                }
                if run.len() > self.max_run {
                    // The run is consumed; the stream is already synchronized.
                    return Err(FrameError::Overrun { max: self.max_run });
                }

                // Bridges that append LF leave it at the head of the next run.
                while run.first() == Some(&b'\n') {
                    run.advance(1);
                }
                if run.is_empty() {
                    continue;
                }
                return Ok(Some(run));
            }

            if self.discarding {
                self.buf.clear();
                return Ok(None);
            }
            if self.buf.len() > self.max_run {
                self.buf.clear();
                self.discarding = true;
                return Err(FrameError::Overrun { max: self.max_run });
            }
            return Ok(None);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl FrameReader<LinkStream> {
    /// Create a frame reader for a [`LinkStream`] and apply the receive
    /// timeout from the port settings.
    pub fn for_link(inner: LinkStream, settings: &PortSettings) -> Result<Self> {
        inner
            .set_read_timeout(Some(settings.receive_timeout))
            .map_err(transport_to_frame_error)?;
        Ok(Self::new(inner))
    }
}

fn transport_to_frame_error(err: upblink_transport::TransportError) -> FrameError {
    match err {
        upblink_transport::TransportError::Io(io) => FrameError::Io(io),
        upblink_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}

fn is_receive_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
