//! Byte-link abstraction for UPB serial bridges.
//!
//! The engine above this crate is agnostic to how bytes reach the Powerline
//! Interface Module: a ser2net/RFC2217-style TCP bridge, or a local bridge
//! daemon behind a Unix domain socket. Everything else builds on the
//! [`LinkStream`] type provided here.

pub mod bridge;
pub mod error;
pub mod settings;
pub mod traits;

pub use bridge::{connect, TcpBridge, UnixBridge};
pub use error::{Result, TransportError};
pub use settings::{Parity, PortSettings, StopBits};
pub use traits::LinkStream;
