//! Serialized command dispatch and ack correlation for a UPB PIM link.
//!
//! This is the "just works" layer. One [`PimSession`] owns a connected
//! [`LinkStream`](upblink_transport::LinkStream) and runs two threads over
//! it: a reader loop that decodes every inbound frame and fans it out to the
//! registered listener, and a write dispatcher that puts exactly one command
//! at a time on the wire, correlates the PIM's ACK/NAK to it, and retries
//! with a bounded budget before resolving the caller's handle.

pub mod config;
pub mod error;
pub mod listener;
pub mod session;
pub mod status;

mod pending;
mod reader;
mod writer;

pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use listener::{FrameListener, NullListener};
pub use session::{PimSession, SessionState};
pub use status::{Status, SubmitHandle};
