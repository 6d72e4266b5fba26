//! Typed messages and their field-level reader/writer.
//!
//! Every envelope carries exactly one message. The library header names its
//! [`MessageKind`]; the payload is a sequence of big-endian fields written by
//! [`OutgoingMessage`] and read back, in the same order, by [`IncomingMessage`].

use std::io::{self, Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use tether_core::{
    error::{ErrorKind, Result},
    shared::SharedBytes,
};

/// Kind tag carried in the library header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Application payload, handed to the session layer untouched.
    Data = 0,
    /// Liveness probe: `counter:u32`.
    Ping = 1,
    /// Probe reply: `counter:u32 | timestamp:f32`.
    Pong = 2,
    /// Path MTU advertisement: `mtu:u16`.
    MtuAnnounce = 3,
    /// Confirms that no further MTU negotiation is needed: `finalized:bool`.
    MtuFinalized = 4,
    /// Graceful teardown notice: `reason:string`.
    Disconnect = 5,
}

impl MessageKind {
    /// Returns the wire tag of this kind.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Parses a wire tag.
    pub fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            0 => MessageKind::Data,
            1 => MessageKind::Ping,
            2 => MessageKind::Pong,
            3 => MessageKind::MtuAnnounce,
            4 => MessageKind::MtuFinalized,
            5 => MessageKind::Disconnect,
            other => return Err(ErrorKind::UnknownMessageKind(other)),
        })
    }

    /// Returns true for messages consumed by the connection itself rather than the session layer.
    pub fn is_control(self) -> bool {
        !matches!(self, MessageKind::Data)
    }
}

/// A writable message, created per kind and routed by its channel.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    kind: MessageKind,
    channel: u8,
    payload: Vec<u8>,
}

impl OutgoingMessage {
    /// Creates an empty message of `kind` for `channel`.
    pub fn new(kind: MessageKind, channel: u8) -> Self {
        Self { kind, channel, payload: Vec::new() }
    }

    /// Creates a data message carrying `payload`.
    pub fn data(channel: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self { kind: MessageKind::Data, channel, payload: payload.into() }
    }

    /// Returns the message kind.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Returns the channel this message declares.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Returns the encoded payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Appends a big-endian `u32`.
    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        // Writing into a Vec cannot fail.
        let _ = self.payload.write_u32::<BigEndian>(value);
        self
    }

    /// Appends a big-endian `i32`.
    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        let _ = self.payload.write_i32::<BigEndian>(value);
        self
    }

    /// Appends a big-endian `u16`.
    pub fn write_u16(&mut self, value: u16) -> &mut Self {
        let _ = self.payload.write_u16::<BigEndian>(value);
        self
    }

    /// Appends a big-endian `f32`.
    pub fn write_f32(&mut self, value: f32) -> &mut Self {
        let _ = self.payload.write_f32::<BigEndian>(value);
        self
    }

    /// Appends a bool as one byte.
    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.payload.push(u8::from(value));
        self
    }

    /// Appends a length-prefixed UTF-8 string. Strings over 65535 bytes are truncated.
    pub fn write_string(&mut self, value: &str) -> &mut Self {
        let bytes = value.as_bytes();
        let len = bytes.len().min(u16::MAX as usize);
        self.write_u16(len as u16);
        self.payload.extend_from_slice(&bytes[..len]);
        self
    }

    /// Appends raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.payload.extend_from_slice(bytes);
        self
    }
}

/// A received message with a read cursor over its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    kind: MessageKind,
    channel: u8,
    sequence: u16,
    payload: SharedBytes,
    position: usize,
}

impl IncomingMessage {
    /// Wraps a received payload.
    pub fn new(kind: MessageKind, channel: u8, sequence: u16, payload: SharedBytes) -> Self {
        Self { kind, channel, sequence, payload, position: 0 }
    }

    /// Returns the message kind.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Returns the channel the message arrived on.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Returns the channel sequence number of the message.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Returns the whole payload regardless of the read position.
    pub fn payload(&self) -> &[u8] {
        self.payload.as_slice()
    }

    /// Returns the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.payload.len() - self.position
    }

    fn read_with<T>(
        &mut self,
        width: usize,
        read: impl FnOnce(&mut Cursor<&[u8]>) -> io::Result<T>,
    ) -> Result<T> {
        let mut cursor = Cursor::new(&self.payload.as_slice()[self.position..]);
        let value = read(&mut cursor).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => ErrorKind::ReceivedDataTooShort,
            _ => ErrorKind::CouldNotReadHeader(e.to_string()),
        })?;
        self.position += width;
        Ok(value)
    }

    /// Reads a big-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_with(4, |c| c.read_u32::<BigEndian>())
    }

    /// Reads a big-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_with(4, |c| c.read_i32::<BigEndian>())
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_with(2, |c| c.read_u16::<BigEndian>())
    }

    /// Reads a big-endian `f32`.
    pub fn read_f32(&mut self) -> Result<f32> {
        self.read_with(4, |c| c.read_f32::<BigEndian>())
    }

    /// Reads a one-byte bool; any non-zero value is true.
    pub fn read_bool(&mut self) -> Result<bool> {
        self.read_with(1, |c| c.read_u8()).map(|b| b != 0)
    }

    /// Reads `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        self.read_with(len, |c| {
            let mut bytes = vec![0u8; len];
            c.read_exact(&mut bytes)?;
            Ok(bytes)
        })
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|e| ErrorKind::CouldNotReadHeader(e.to_string()))
    }
}

/// Control traffic exchanged between the two connection cores.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// Liveness probe.
    Ping {
        /// Monotonic counter correlating this ping with its pong
        counter: u32,
    },
    /// Reply to a ping.
    Pong {
        /// Counter echoed from the ping
        counter: u32,
        /// Replier's clock, in seconds
        timestamp: f32,
    },
    /// Path MTU advertisement.
    MtuAnnounce {
        /// Announced MTU in bytes
        mtu: u16,
    },
    /// MTU negotiation confirmation.
    MtuFinalized {
        /// True once no further shrink is needed
        finalized: bool,
    },
    /// Graceful teardown notice.
    Disconnect {
        /// Human-readable reason
        reason: String,
    },
}

impl ControlMessage {
    /// Returns the kind tag this control message is sent with.
    pub fn kind(&self) -> MessageKind {
        match self {
            ControlMessage::Ping { .. } => MessageKind::Ping,
            ControlMessage::Pong { .. } => MessageKind::Pong,
            ControlMessage::MtuAnnounce { .. } => MessageKind::MtuAnnounce,
            ControlMessage::MtuFinalized { .. } => MessageKind::MtuFinalized,
            ControlMessage::Disconnect { .. } => MessageKind::Disconnect,
        }
    }

    /// Encodes the control message for `channel`.
    pub fn into_message(self, channel: u8) -> OutgoingMessage {
        let mut message = OutgoingMessage::new(self.kind(), channel);
        match self {
            ControlMessage::Ping { counter } => {
                message.write_u32(counter);
            }
            ControlMessage::Pong { counter, timestamp } => {
                message.write_u32(counter).write_f32(timestamp);
            }
            ControlMessage::MtuAnnounce { mtu } => {
                message.write_u16(mtu);
            }
            ControlMessage::MtuFinalized { finalized } => {
                message.write_bool(finalized);
            }
            ControlMessage::Disconnect { reason } => {
                message.write_string(&reason);
            }
        }
        message
    }
}
