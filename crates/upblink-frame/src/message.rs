use bytes::Bytes;

/// Source address used for commands when the caller does not override it.
///
/// 0xFF is the conventional "controller" source id on UPB networks.
pub const DEFAULT_SOURCE: u8 = 0xFF;

/// Classification of a decoded PIM frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// `PU` — a message report (unsolicited or echoed powerline traffic).
    Data,
    /// `PK` — positive acknowledgment of the in-flight command.
    Ack,
    /// `PN` — negative acknowledgment of the in-flight command.
    Nak,
    /// `PA` — the PIM accepted a command for transmission.
    Accept,
    /// `PE` — the PIM rejected input it could not act on.
    Error,
    /// Any other line (`PB` busy, `PI` idle, register reports, noise).
    Other,
}

/// Returns a human-readable name for a frame kind.
pub fn kind_name(kind: FrameKind) -> &'static str {
    match kind {
        FrameKind::Data => "DATA",
        FrameKind::Ack => "ACK",
        FrameKind::Nak => "NAK",
        FrameKind::Accept => "ACCEPT",
        FrameKind::Error => "ERROR",
        FrameKind::Other => "OTHER",
    }
}

/// One decoded protocol message unit.
///
/// Created by the codec on every successful parse of a terminated run,
/// dispatched once by the reader loop, and not retained by the engine.
#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: FrameKind,
    /// Network id of a report frame; 0 for PIM-local responses.
    pub network: u8,
    /// Source unit id of a report frame.
    pub source: u8,
    /// Destination unit or link id of a report frame.
    pub destination: u8,
    /// Whether the destination is a link (group) rather than a unit.
    pub link: bool,
    /// Message data (MDID + arguments) for reports; raw trailing bytes for
    /// control-class frames.
    pub payload: Bytes,
}

impl Frame {
    /// A PIM-local response frame with no powerline addressing.
    pub(crate) fn control(kind: FrameKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            network: 0,
            source: 0,
            destination: 0,
            link: false,
            payload: payload.into(),
        }
    }
}

/// An outbound request built by the caller. Immutable once submitted.
#[derive(Debug, Clone)]
pub struct Command {
    network: u8,
    destination: u8,
    source: u8,
    link: bool,
    ack_requested: bool,
    payload: Bytes,
}

impl Command {
    /// A direct command to a single device; acknowledgment is requested.
    pub fn to_device(network: u8, destination: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            network,
            destination,
            source: DEFAULT_SOURCE,
            link: false,
            ack_requested: true,
            payload: payload.into(),
        }
    }

    /// A link (group) command. Link transmissions have many receivers, so no
    /// single acknowledgment exists to wait for.
    pub fn to_link(network: u8, link_id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            network,
            destination: link_id,
            source: DEFAULT_SOURCE,
            link: true,
            ack_requested: false,
            payload: payload.into(),
        }
    }

    /// Override the source unit id.
    pub fn with_source(mut self, source: u8) -> Self {
        self.source = source;
        self
    }

    /// Override whether an acknowledgment is expected.
    pub fn with_ack(mut self, ack_requested: bool) -> Self {
        self.ack_requested = ack_requested;
        self
    }

    pub fn network(&self) -> u8 {
        self.network
    }

    pub fn destination(&self) -> u8 {
        self.destination
    }

    pub fn source(&self) -> u8 {
        self.source
    }

    pub fn is_link(&self) -> bool {
        self.link
    }

    pub fn ack_requested(&self) -> bool {
        self.ack_requested
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}
