/// Structural decode failures for a single terminated byte run.
///
/// A parse error condemns one run only; the reader discards it and the
/// stream stays synchronized at the next terminator.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    /// A bare terminator with no content in front of it.
    #[error("empty frame")]
    Empty,

    /// The hex body contains a non-hex digit or an odd digit count.
    #[error("invalid hex body")]
    InvalidHex,

    /// The decoded packet is shorter than the minimum UPB packet.
    #[error("packet too short ({len} bytes, minimum {min})")]
    TooShort { len: usize, min: usize },

    /// The trailing 2's-complement checksum does not cover the packet.
    #[error("checksum mismatch (expected {expected:#04x}, got {actual:#04x})")]
    Checksum { expected: u8, actual: u8 },
}

/// Errors that can occur while framing bytes to and from the link.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A terminated run failed structural decoding.
    #[error("frame parse error: {0}")]
    Parse(#[from] ParseError),

    /// A run exceeded the maximum length before a terminator appeared.
    #[error("frame overrun ({max} bytes without terminator)")]
    Overrun { max: usize },

    /// The message data exceeds what fits in a UPB packet.
    #[error("message data too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link was closed before a complete frame was received.
    #[error("link closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
