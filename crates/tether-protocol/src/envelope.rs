//! Envelope framing: one datagram = library header [+ fragment header] + payload.
//!
//! Outbound, [`encode_message`] splits a message that does not fit the MTU into
//! fragments sharing one group id. Inbound, [`Envelope::decode`] peels the
//! headers off a received datagram without copying the payload.

use tether_core::{
    constants::{FRAGMENT_HEADER_SIZE, LIBRARY_HEADER_SIZE},
    error::{ErrorKind, Result},
    shared::SharedBytes,
};

use crate::{
    header::{write_envelope, FragmentHeader, LibraryHeader},
    message::OutgoingMessage,
};

/// A decoded datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// A complete message.
    Whole {
        /// Library header
        header: LibraryHeader,
        /// Message payload
        payload: SharedBytes,
    },
    /// One piece of a fragmented message.
    Fragment {
        /// Library header (fragment flag set)
        header: LibraryHeader,
        /// Fragment header
        fragment: FragmentHeader,
        /// This fragment's bytes
        payload: SharedBytes,
    },
}

impl Envelope {
    /// Parses the headers of a raw datagram.
    pub fn decode(data: SharedBytes) -> Result<Self> {
        let header = LibraryHeader::decode(&data)?;
        let body = data.skip(LIBRARY_HEADER_SIZE).ok_or(ErrorKind::ReceivedDataTooShort)?;

        if !header.is_fragment() {
            return Ok(Envelope::Whole { header, payload: body });
        }

        let fragment = FragmentHeader::decode(&body)?;
        let payload = body.skip(FRAGMENT_HEADER_SIZE).ok_or(ErrorKind::ReceivedDataTooShort)?;
        Ok(Envelope::Fragment { header, fragment, payload })
    }

    /// Returns the library header.
    pub fn header(&self) -> &LibraryHeader {
        match self {
            Envelope::Whole { header, .. } | Envelope::Fragment { header, .. } => header,
        }
    }
}

/// Largest message payload that fits one unfragmented datagram under `mtu`.
pub fn max_whole_payload(mtu: u16) -> usize {
    (mtu as usize).saturating_sub(LIBRARY_HEADER_SIZE)
}

/// Largest fragment payload that fits one datagram under `mtu`.
pub fn max_fragment_payload(mtu: u16) -> usize {
    (mtu as usize).saturating_sub(LIBRARY_HEADER_SIZE + FRAGMENT_HEADER_SIZE)
}

/// Encodes `message` into one or more datagrams no larger than `mtu`.
///
/// Messages that fit are sent whole; larger ones are split into fragments
/// numbered from zero, all tagged with `group_id` and the total size in bits.
pub fn encode_message(
    message: &OutgoingMessage,
    sequence: u16,
    group_id: u32,
    mtu: u16,
    max_fragments: u16,
) -> Result<Vec<Vec<u8>>> {
    let payload = message.payload();
    let header = LibraryHeader::new(message.kind(), message.channel(), sequence);

    if payload.len() <= max_whole_payload(mtu) {
        let mut datagram = Vec::with_capacity(LIBRARY_HEADER_SIZE + payload.len());
        write_envelope(&mut datagram, &header, None, payload);
        return Ok(vec![datagram]);
    }

    let fragment_payload = max_fragment_payload(mtu).min(u16::MAX as usize);
    if fragment_payload == 0 {
        tracing::error!("MTU {} too small to carry any fragment payload", mtu);
        return Err(ErrorKind::MessageTooLarge { size: payload.len(), fragments: 0, max: max_fragments });
    }

    let fragments = payload.len().div_ceil(fragment_payload);
    if fragments > max_fragments as usize || payload.len() * 8 > u32::MAX as usize {
        tracing::warn!(
            "Payload {} bytes too large to fragment: would require {} fragments (max {})",
            payload.len(),
            fragments,
            max_fragments
        );
        return Err(ErrorKind::MessageTooLarge { size: payload.len(), fragments, max: max_fragments });
    }

    tracing::trace!(
        "Fragmenting {} byte payload into {} fragments ({} bytes each)",
        payload.len(),
        fragments,
        fragment_payload
    );

    let header = header.fragmented();
    let total_bits = (payload.len() * 8) as u32;
    let datagrams = payload
        .chunks(fragment_payload)
        .enumerate()
        .map(|(number, chunk)| {
            let fragment = FragmentHeader {
                group_id,
                fragment_number: number as u16,
                fragment_size: chunk.len() as u16,
                total_bits,
            };
            let mut datagram =
                Vec::with_capacity(LIBRARY_HEADER_SIZE + FRAGMENT_HEADER_SIZE + chunk.len());
            write_envelope(&mut datagram, &header, Some(&fragment), chunk);
            datagram
        })
        .collect();

    Ok(datagrams)
}
