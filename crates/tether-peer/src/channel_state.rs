//! Per-channel release policy for complete messages.
//!
//! The inbound processor hands every complete message (unfragmented, or just
//! reassembled) to [`ChannelState::release`], which applies the channel kind:
//!
//! - **Unreliable / ReliableUnordered**: released immediately, in completion order
//! - **UnreliableSequenced**: released only if newer than anything seen so far
//! - **ReliableOrdered**: buffered until every earlier sequence has been released
//!
//! Control messages bypass the policy; they are always released immediately
//! and carry no meaningful sequence.

use std::collections::{HashMap, VecDeque};

use tether_protocol::{channel::ChannelKind, message::IncomingMessage};

/// Half of the u16 sequence space; distances beyond this count as "behind".
const SEQUENCE_HALF_RANGE: u16 = 32768;

/// Tracks per-channel ordering state.
#[derive(Debug)]
pub struct ChannelState {
    /// Policy applied to data messages
    kind: ChannelKind,
    /// Expected next sequence number for ordered delivery
    expected_sequence: u16,
    /// Buffered out-of-order messages waiting for missing sequences
    buffered: HashMap<u16, IncomingMessage>,
    /// Latest sequence number seen (for sequenced/drop-old behavior)
    latest_sequence: Option<u16>,
}

impl ChannelState {
    /// Creates the state for a channel of `kind`, expecting sequence 0 first.
    pub fn new(kind: ChannelKind) -> Self {
        Self { kind, expected_sequence: 0, buffered: HashMap::new(), latest_sequence: None }
    }

    /// Returns the number of messages held back waiting for earlier sequences.
    pub fn buffered(&self) -> usize {
        self.buffered.len()
    }

    /// Applies the channel policy to `message`, appending whatever becomes deliverable to `ready`.
    pub fn release(&mut self, message: IncomingMessage, ready: &mut VecDeque<IncomingMessage>) {
        if message.kind().is_control() {
            ready.push_back(message);
            return;
        }

        match self.kind {
            ChannelKind::Unreliable | ChannelKind::ReliableUnordered => ready.push_back(message),
            ChannelKind::UnreliableSequenced => {
                if let Some(message) = self.process_sequenced(message) {
                    ready.push_back(message);
                }
            }
            ChannelKind::ReliableOrdered => self.process_ordered(message, ready),
        }
    }

    /// Buffers `message` and releases all consecutive messages starting from the expected sequence.
    fn process_ordered(&mut self, message: IncomingMessage, ready: &mut VecDeque<IncomingMessage>) {
        let sequence = message.sequence();
        if sequence.wrapping_sub(self.expected_sequence) >= SEQUENCE_HALF_RANGE {
            tracing::trace!(
                "Dropping duplicate ordered message {} (expecting {})",
                sequence,
                self.expected_sequence
            );
            return;
        }

        self.buffered.insert(sequence, message);

        while let Some(message) = self.buffered.remove(&self.expected_sequence) {
            ready.push_back(message);
            self.expected_sequence = self.expected_sequence.wrapping_add(1);
        }
    }

    /// Returns the message if it is newer than the latest seen, None if old or repeated.
    fn process_sequenced(&mut self, message: IncomingMessage) -> Option<IncomingMessage> {
        let sequence = message.sequence();
        let is_newer = match self.latest_sequence {
            None => true,
            Some(latest) => {
                sequence != latest && sequence.wrapping_sub(latest) < SEQUENCE_HALF_RANGE
            }
        };

        if is_newer {
            self.latest_sequence = Some(sequence);
            Some(message)
        } else {
            tracing::trace!("Dropping stale sequenced message {}", sequence);
            None
        }
    }
}
