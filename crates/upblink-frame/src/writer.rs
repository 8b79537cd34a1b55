use std::io::{ErrorKind, Write};

use crate::codec::{encode_command, encode_message_mode_init, encode_register_write};
use crate::error::{FrameError, Result};
use crate::message::Command;

/// Writes complete command frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Encode a command and put it on the wire, flushed.
    pub fn write_command(&mut self, command: &Command) -> Result<()> {
        let wire = encode_command(command)?;
        self.write_all(&wire)?;
        self.flush()
    }

    /// Encode a register write and put it on the wire, flushed.
    pub fn write_register(&mut self, register: u8, values: &[u8]) -> Result<()> {
        let wire = encode_register_write(register, values);
        self.write_all(&wire)?;
        self.flush()
    }

    /// Put the PIM into structured message mode.
    pub fn write_message_mode_init(&mut self) -> Result<()> {
        let wire = encode_message_mode_init();
        self.write_all(&wire)?;
        self.flush()
    }

    fn write_all(&mut self, wire: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < wire.len() {
            match self.inner.write(&wire[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(())
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
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

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
