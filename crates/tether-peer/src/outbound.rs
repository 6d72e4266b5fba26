//! Outbound senders and an in-memory datagram sink.
//!
//! A connection owns one [`OutboundSender`] per channel. The default
//! [`FragmentingSender`] stamps sequence numbers, splits messages that do not
//! fit the negotiated MTU and writes the datagrams to a [`DatagramSink`]. It
//! never retransmits; acknowledgment and resend belong to a reliability layer
//! implementing the same trait.

use std::{
    collections::VecDeque,
    io,
    net::SocketAddr,
    time::Instant,
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use rand::Rng;
use tether_core::{error::Result, transport::DatagramSink};
use tether_protocol::{channel::Channel, envelope::encode_message, message::OutgoingMessage};

/// Per-channel outbound queue as seen by the connection.
pub trait OutboundSender: Send {
    /// Queues a message for the next flush.
    fn enqueue(&mut self, message: OutgoingMessage);

    /// Sets the largest datagram this sender may produce.
    fn set_mtu(&mut self, mtu: u16);

    /// Returns the current datagram ceiling.
    fn mtu(&self) -> u16;

    /// Writes everything queued, returning the number of datagrams sent.
    fn flush(&mut self, time: Instant) -> Result<usize>;
}

/// Unreliable sender that fragments messages larger than the MTU.
#[derive(Debug)]
pub struct FragmentingSender<S> {
    channel: Channel,
    remote: SocketAddr,
    sink: S,
    mtu: u16,
    max_fragments: u16,
    queue: VecDeque<OutgoingMessage>,
    /// Sequence of the next data message on this channel
    next_sequence: u16,
    /// Group id of the next fragmented message
    next_group_id: u32,
    last_flush_at: Option<Instant>,
}

impl<S: DatagramSink> FragmentingSender<S> {
    /// Creates a sender for `channel` writing to `remote` through `sink`.
    pub fn new(channel: Channel, remote: SocketAddr, sink: S, mtu: u16, max_fragments: u16) -> Self {
        Self {
            channel,
            remote,
            sink,
            mtu,
            max_fragments,
            queue: VecDeque::new(),
            next_sequence: 0,
            next_group_id: rand::rng().random(),
            last_flush_at: None,
        }
    }

    /// Returns the channel this sender serves.
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Returns the number of messages waiting for a flush.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Returns when the last flush ran.
    pub fn last_flush_at(&self) -> Option<Instant> {
        self.last_flush_at
    }

    /// Control messages carry sequence 0; data messages carry the next channel sequence.
    fn sequence_for(&self, message: &OutgoingMessage) -> u16 {
        if message.kind().is_control() {
            0
        } else {
            self.next_sequence
        }
    }
}

impl<S: DatagramSink> OutboundSender for FragmentingSender<S> {
    fn enqueue(&mut self, message: OutgoingMessage) {
        self.queue.push_back(message);
    }

    fn set_mtu(&mut self, mtu: u16) {
        if mtu != self.mtu {
            tracing::debug!(
                "Channel {} to {} now limited to {} byte datagrams",
                self.channel.id(),
                self.remote,
                mtu
            );
        }
        self.mtu = mtu;
    }

    fn mtu(&self) -> u16 {
        self.mtu
    }

    fn flush(&mut self, time: Instant) -> Result<usize> {
        self.last_flush_at = Some(time);
        let mut sent = 0;

        while let Some(message) = self.queue.pop_front() {
            let sequence = self.sequence_for(&message);
            let group_id = self.next_group_id;

            let datagrams =
                match encode_message(&message, sequence, group_id, self.mtu, self.max_fragments) {
                    Ok(datagrams) => datagrams,
                    Err(err) => {
                        tracing::warn!(
                            "Dropping message on channel {} to {}: {}",
                            self.channel.id(),
                            self.remote,
                            err
                        );
                        continue;
                    }
                };

            // Only encoded messages consume a sequence, so dropped ones leave no gap.
            if !message.kind().is_control() {
                self.next_sequence = self.next_sequence.wrapping_add(1);
            }
            if datagrams.len() > 1 {
                self.next_group_id = self.next_group_id.wrapping_add(1);
            }

            for datagram in &datagrams {
                self.sink.send_datagram(&self.remote, datagram)?;
                sent += 1;
            }
        }

        Ok(sent)
    }
}

/// A datagram captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Destination address
    pub addr: SocketAddr,
    /// Encoded envelope
    pub payload: Vec<u8>,
}

/// Sink that queues datagrams in memory instead of putting them on the wire.
///
/// Clones share the same queue, so every channel of a connection can write
/// into one receiver.
#[derive(Debug, Clone)]
pub struct MemorySink {
    sender: Sender<Datagram>,
}

impl MemorySink {
    /// Creates a sink and the receiver that observes everything sent through it.
    pub fn unbounded() -> (Self, Receiver<Datagram>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }
}

impl DatagramSink for MemorySink {
    fn send_datagram(&mut self, addr: &SocketAddr, payload: &[u8]) -> io::Result<usize> {
        self.sender
            .send(Datagram { addr: *addr, payload: payload.to_vec() })
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "memory sink receiver dropped"))?;
        Ok(payload.len())
    }
}
