//! UPB PIM message-mode framing.
//!
//! In message mode the PIM speaks ASCII lines terminated by CR. Every inbound
//! line carries a two-byte classifier prefix (`PU` report, `PK` ack, `PN`
//! nak, `PA` accept, `PE` error) followed by an upper-hex packet body.
//! Outbound commands are a control byte (0x14 transmit, 0x17 register write)
//! followed by the upper-hex packet and CR.
//!
//! No partial reads, no buffer management in user code.

pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_command, encode_message_mode_init, encode_register_write,
    CTRL_TRANSMIT, CTRL_WRITE_REGISTER, MAX_MESSAGE_DATA, MESSAGE_MODE, PIM_MODE_REGISTER,
    TERMINATOR,
};
pub use error::{FrameError, ParseError, Result};
pub use message::{kind_name, Command, Frame, FrameKind, DEFAULT_SOURCE};
pub use reader::{FrameReader, DEFAULT_MAX_RUN};
pub use writer::FrameWriter;
