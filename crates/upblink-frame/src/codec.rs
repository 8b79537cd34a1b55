use bytes::Bytes;

use crate::error::{FrameError, ParseError, Result};
use crate::message::{Command, Frame, FrameKind};

/// Every PIM line ends with a carriage return.
pub const TERMINATOR: u8 = 0x0D;

/// Control byte prefixing an outbound powerline transmission.
pub const CTRL_TRANSMIT: u8 = 0x14;

/// Control byte prefixing an outbound PIM register write.
pub const CTRL_WRITE_REGISTER: u8 = 0x17;

/// PIM operating-mode register.
pub const PIM_MODE_REGISTER: u8 = 0x70;

/// Mode value selecting structured message mode.
pub const MESSAGE_MODE: u8 = 0x02;

/// Maximum message data (MDID + arguments) that fits in one UPB packet.
///
/// The 5-bit length field in the control word covers the whole packet:
/// 2 control bytes + 3 address bytes + data + 1 checksum, capped at 24.
pub const MAX_MESSAGE_DATA: usize = 18;

const PACKET_OVERHEAD: usize = 6;
const MIN_PACKET: usize = PACKET_OVERHEAD;

/// Control-word low-byte flag requesting a message acknowledgment.
const CW_ACK_MESSAGE: u8 = 0x10;
/// Control-word high-byte flag marking a link (group) transmission.
const CW_LINK: u8 = 0x80;

/// Decode one terminated byte run (terminator excluded) into a [`Frame`].
///
/// Classification comes purely from the two-byte prefix. Unrecognized
/// prefixes decode to [`FrameKind::Other`] with the raw run retained as
/// payload; structurally malformed report bodies raise [`ParseError`].
///
/// Stateless and safe to call from the reader loop without synchronization.
pub fn decode_frame(run: &[u8]) -> std::result::Result<Frame, ParseError> {
    if run.is_empty() {
        return Err(ParseError::Empty);
    }

    let kind = match run {
        [b'P', b'U', ..] => return parse_report(&run[2..]),
        [b'P', b'K', ..] => FrameKind::Ack,
        [b'P', b'N', ..] => FrameKind::Nak,
        [b'P', b'A', ..] => FrameKind::Accept,
        [b'P', b'E', ..] => FrameKind::Error,
        _ => return Ok(Frame::control(FrameKind::Other, Bytes::copy_from_slice(run))),
    };

    Ok(Frame::control(kind, Bytes::copy_from_slice(&run[2..])))
}

/// Parse the hex body of a `PU` message report.
fn parse_report(body: &[u8]) -> std::result::Result<Frame, ParseError> {
    let raw = decode_hex(body)?;
    if raw.len() < MIN_PACKET {
        return Err(ParseError::TooShort {
            len: raw.len(),
            min: MIN_PACKET,
        });
    }

    let sum = raw.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if sum != 0 {
        let actual = raw[raw.len() - 1];
        let expected = actual.wrapping_sub(sum);
        return Err(ParseError::Checksum { expected, actual });
    }

    let link = raw[0] & CW_LINK != 0;
    let payload = Bytes::copy_from_slice(&raw[5..raw.len() - 1]);

    Ok(Frame {
        kind: FrameKind::Data,
        network: raw[2],
        destination: raw[3],
        source: raw[4],
        link,
        payload,
    })
}

/// Encode a command into its exact on-wire byte sequence, control byte and
/// terminator included.
pub fn encode_command(command: &Command) -> Result<Vec<u8>> {
    let data = command.payload();
    if data.len() > MAX_MESSAGE_DATA {
        return Err(FrameError::MessageTooLarge {
            size: data.len(),
            max: MAX_MESSAGE_DATA,
        });
    }

    let mut packet = Vec::with_capacity(PACKET_OVERHEAD + data.len());
    let length = (PACKET_OVERHEAD + data.len()) as u8;
    let cw_hi = if command.is_link() {
        CW_LINK | length
    } else {
        length
    };
    let cw_lo = if command.ack_requested() {
        CW_ACK_MESSAGE
    } else {
        0
    };

    packet.push(cw_hi);
    packet.push(cw_lo);
    packet.push(command.network());
    packet.push(command.destination());
    packet.push(command.source());
    packet.extend_from_slice(data);
    packet.push(checksum(&packet));

    Ok(wrap(CTRL_TRANSMIT, &packet))
}

/// Encode a PIM register write, control byte and terminator included.
pub fn encode_register_write(register: u8, values: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(1 + values.len() + 1);
    packet.push(register);
    packet.extend_from_slice(values);
    packet.push(checksum(&packet));
    wrap(CTRL_WRITE_REGISTER, &packet)
}

/// The fixed message-mode initialization write (`0x17 "70028E" CR`).
pub fn encode_message_mode_init() -> Vec<u8> {
    encode_register_write(PIM_MODE_REGISTER, &[MESSAGE_MODE])
}

/// 2's complement of the byte sum; a valid packet sums to zero overall.
fn checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    0u8.wrapping_sub(sum)
}

fn wrap(ctrl: u8, packet: &[u8]) -> Vec<u8> {
    let mut wire = Vec::with_capacity(2 + packet.len() * 2);
    wire.push(ctrl);
    for byte in packet {
        wire.push(HEX_UPPER[(byte >> 4) as usize]);
        wire.push(HEX_UPPER[(byte & 0x0F) as usize]);
    }
    wire.push(TERMINATOR);
    wire
}

const HEX_UPPER: [u8; 16] = *b"0123456789ABCDEF";

fn decode_hex(body: &[u8]) -> std::result::Result<Vec<u8>, ParseError> {
    if body.len() % 2 != 0 {
        return Err(ParseError::InvalidHex);
    }
    let mut raw = Vec::with_capacity(body.len() / 2);
    for pair in body.chunks_exact(2) {
        let hi = hex_digit(pair[0])?;
        let lo = hex_digit(pair[1])?;
        raw.push((hi << 4) | lo);
    }
    Ok(raw)
}

fn hex_digit(byte: u8) -> std::result::Result<u8, ParseError> {
    match byte {
        b'0'..=b'9' => Ok(byte - b'0'),
        b'A'..=b'F' => Ok(byte - b'A' + 10),
        b'a'..=b'f' => Ok(byte - b'a' + 10),
        _ => Err(ParseError::InvalidHex),
    }
}
