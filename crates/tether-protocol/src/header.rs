//! Library and fragment headers.
//!
//! ```text
//! LibraryHeader  = kind:u8 | channel:u8 | flags:u8 | sequence:u16
//! FragmentHeader = group_id:u32 | fragment_number:u16 | fragment_size:u16 | total_bits:u32
//! ```
//!
//! The fragment header is present only when [`LibraryHeader::is_fragment`] is set.

use std::io::{Cursor, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use tether_core::{
    constants::{FRAGMENT_HEADER_SIZE, LIBRARY_HEADER_SIZE},
    error::{ErrorKind, Result},
};

use crate::message::MessageKind;

/// Flag bit marking an envelope as one fragment of a larger message.
pub const FLAG_FRAGMENT: u8 = 0b0000_0001;

/// Header prefixed on every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryHeader {
    /// Kind of the (reassembled) message
    pub kind: MessageKind,
    /// Channel the message travels on
    pub channel: u8,
    /// Flag bits, see [`FLAG_FRAGMENT`]
    pub flags: u8,
    /// Channel sequence number of the (reassembled) message
    pub sequence: u16,
}

impl LibraryHeader {
    /// Creates a header for an unfragmented message.
    pub fn new(kind: MessageKind, channel: u8, sequence: u16) -> Self {
        Self { kind, channel, flags: 0, sequence }
    }

    /// Returns a copy with the fragment flag set.
    pub fn fragmented(mut self) -> Self {
        self.flags |= FLAG_FRAGMENT;
        self
    }

    /// Returns true if a fragment header follows.
    pub fn is_fragment(&self) -> bool {
        self.flags & FLAG_FRAGMENT != 0
    }

    /// Appends the encoded header to `buffer`.
    pub fn encode_into(&self, buffer: &mut Vec<u8>) {
        buffer.push(self.kind.tag());
        buffer.push(self.channel);
        buffer.push(self.flags);
        let _ = buffer.write_u16::<BigEndian>(self.sequence);
    }

    /// Decodes a header from the start of `data`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < LIBRARY_HEADER_SIZE {
            return Err(ErrorKind::ReceivedDataTooShort);
        }
        let mut cursor = Cursor::new(data);
        let kind = MessageKind::from_tag(cursor.read_u8()?)?;
        let channel = cursor.read_u8()?;
        let flags = cursor.read_u8()?;
        let sequence = cursor.read_u16::<BigEndian>()?;
        Ok(Self { kind, channel, flags, sequence })
    }

    /// Reads only the channel byte, for routing before full parsing.
    pub fn peek_channel(data: &[u8]) -> Option<u8> {
        data.get(1).copied()
    }
}

/// Header carried by each fragment of a fragmented message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    /// Correlates the fragments of one logical message
    pub group_id: u32,
    /// Position of this fragment within the group
    pub fragment_number: u16,
    /// Payload bytes carried by this fragment
    pub fragment_size: u16,
    /// Size of the reassembled message, in bits
    pub total_bits: u32,
}

impl FragmentHeader {
    /// Size of the reassembled message in bytes, `ceil(total_bits / 8)`.
    pub fn total_bytes(&self) -> usize {
        (self.total_bits as usize).div_ceil(8)
    }

    /// Appends the encoded header to `buffer`.
    pub fn encode_into(&self, buffer: &mut Vec<u8>) {
        let _ = buffer.write_u32::<BigEndian>(self.group_id);
        let _ = buffer.write_u16::<BigEndian>(self.fragment_number);
        let _ = buffer.write_u16::<BigEndian>(self.fragment_size);
        let _ = buffer.write_u32::<BigEndian>(self.total_bits);
    }

    /// Decodes a header from the start of `data`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < FRAGMENT_HEADER_SIZE {
            return Err(ErrorKind::ReceivedDataTooShort);
        }
        let mut cursor = Cursor::new(data);
        Ok(Self {
            group_id: cursor.read_u32::<BigEndian>()?,
            fragment_number: cursor.read_u16::<BigEndian>()?,
            fragment_size: cursor.read_u16::<BigEndian>()?,
            total_bits: cursor.read_u32::<BigEndian>()?,
        })
    }
}

/// Writes `header`, an optional fragment header and `payload` as one datagram.
pub fn write_envelope(
    buffer: &mut Vec<u8>,
    header: &LibraryHeader,
    fragment: Option<&FragmentHeader>,
    payload: &[u8],
) {
    header.encode_into(buffer);
    if let Some(fragment) = fragment {
        fragment.encode_into(buffer);
    }
    let _ = buffer.write_all(payload);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_header_layout() {
        let header = LibraryHeader::new(MessageKind::Ping, 3, 0x0102).fragmented();
        let mut buffer = Vec::new();
        header.encode_into(&mut buffer);

        assert_eq!(buffer, vec![1, 3, FLAG_FRAGMENT, 0x01, 0x02]);
        assert_eq!(buffer.len(), LIBRARY_HEADER_SIZE);
        assert_eq!(LibraryHeader::peek_channel(&buffer), Some(3));

        let decoded = LibraryHeader::decode(&buffer).unwrap();
        assert!(decoded.is_fragment());
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_library_header_rejects_short_and_unknown() {
        assert!(matches!(LibraryHeader::decode(&[0, 0]), Err(ErrorKind::ReceivedDataTooShort)));
        assert!(matches!(
            LibraryHeader::decode(&[42, 0, 0, 0, 0]),
            Err(ErrorKind::UnknownMessageKind(42))
        ));
    }

    #[test]
    fn test_fragment_header_total_bytes_rounds_up() {
        let header =
            FragmentHeader { group_id: 7, fragment_number: 0, fragment_size: 100, total_bits: 2000 };
        assert_eq!(header.total_bytes(), 250);

        let header = FragmentHeader { total_bits: 2001, ..header };
        assert_eq!(header.total_bytes(), 251);

        let mut buffer = Vec::new();
        header.encode_into(&mut buffer);
        assert_eq!(buffer.len(), FRAGMENT_HEADER_SIZE);
        assert_eq!(FragmentHeader::decode(&buffer).unwrap(), header);
    }
}
