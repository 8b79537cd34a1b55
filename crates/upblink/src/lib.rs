//! UPB powerline interface module (PIM) engine.
//!
//! upblink talks the PIM's message-mode serial protocol: CR-terminated
//! upper-hex report lines in, control-prefixed transmit commands out. The
//! session layer serializes command transmission, correlates ACK/NAK
//! responses, and retries with a bounded budget.
//!
//! # Crate Structure
//!
//! - [`transport`] — Link abstraction over the serial bridge (TCP, Unix socket)
//! - [`frame`] — Wire codec, frame reader, and command writer
//! - [`session`] — Reader/writer engine with ack correlation and retry

/// Re-export transport types.
pub mod transport {
    pub use upblink_transport::*;
}

/// Re-export frame and codec types.
pub mod frame {
    pub use upblink_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use upblink_session::*;
}
