//! Inbound channel processing.
//!
//! Raw envelopes are pushed by the transport's receive path, usually another
//! thread, through an [`InboundHandle`] or an [`InboundRouter`]. They sit in
//! a `crossbeam_channel` queue until the connection's heartbeat drains it on
//! the processing thread:
//!
//! ```text
//!  I/O thread                       heartbeat thread
//!  ──────────                       ────────────────
//!  InboundRouter::route ──queue──▶ InboundChannel::heartbeat
//!                                     ├─ whole message ──┐
//!                                     └─ fragment ─▶ FragmentGroups
//!                                                        │ (complete)
//!                                                        ▼
//!                                                  ChannelState ─▶ delivered
//! ```
//!
//! Only the queue is shared between threads; fragment groups, ordering state
//! and the delivered list belong to the heartbeat side.

use std::{collections::VecDeque, time::Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tether_core::{config::Config, shared::SharedBytes};
use tether_protocol::{
    channel::Channel,
    envelope::Envelope,
    header::LibraryHeader,
    message::IncomingMessage,
};

use crate::{channel_state::ChannelState, fragment_buffer::FragmentGroups};

/// Producer side of one channel's inbound queue.
#[derive(Debug, Clone)]
pub struct InboundHandle {
    sender: Sender<SharedBytes>,
}

impl InboundHandle {
    /// Queues a raw envelope for the next heartbeat. Never blocks.
    ///
    /// Returns false if the channel has been dropped.
    pub fn enqueue_raw(&self, envelope: impl Into<SharedBytes>) -> bool {
        self.sender.send(envelope.into()).is_ok()
    }
}

/// Routes raw envelopes to the inbound queue named in their library header.
///
/// Cheap to clone and `Send`, so the socket thread can own one per connection.
#[derive(Debug, Clone)]
pub struct InboundRouter {
    handles: Vec<InboundHandle>,
}

impl InboundRouter {
    /// Creates a router over per-channel handles, indexed by channel id.
    pub fn new(handles: Vec<InboundHandle>) -> Self {
        Self { handles }
    }

    /// Queues `datagram` on its channel. Returns false if it names no known channel.
    pub fn route(&self, datagram: impl Into<SharedBytes>) -> bool {
        let datagram = datagram.into();
        let handle = LibraryHeader::peek_channel(&datagram)
            .and_then(|channel| self.handles.get(channel as usize));

        match handle {
            Some(handle) => handle.enqueue_raw(datagram),
            None => {
                tracing::warn!("Dropping {} byte datagram for unknown channel", datagram.len());
                false
            }
        }
    }
}

/// What one heartbeat did on a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Envelopes taken off the queue
    pub envelopes: u64,
    /// Fragment envelopes among them
    pub fragments: u64,
    /// Groups completed and reassembled
    pub reassembled: u64,
    /// Incomplete groups discarded by the expiry policy
    pub evicted: u64,
    /// Envelopes dropped because they could not be parsed
    pub malformed: u64,
}

/// Converts a stream of raw envelopes into complete messages for one channel.
#[derive(Debug)]
pub struct InboundChannel {
    channel: Channel,
    sender: Sender<SharedBytes>,
    receiver: Receiver<SharedBytes>,
    fragments: FragmentGroups,
    state: ChannelState,
    delivered: VecDeque<IncomingMessage>,
}

impl InboundChannel {
    /// Creates the processor for `channel`, with expiry policy from `config`.
    pub fn new(channel: Channel, config: &Config) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            channel,
            sender,
            receiver,
            fragments: FragmentGroups::new(config),
            state: ChannelState::new(channel.kind()),
            delivered: VecDeque::new(),
        }
    }

    /// Returns the channel this processor serves.
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Returns a producer handle for the transport's receive path.
    pub fn handle(&self) -> InboundHandle {
        InboundHandle { sender: self.sender.clone() }
    }

    /// Queues a raw envelope. Equivalent to `self.handle().enqueue_raw(envelope)`.
    pub fn enqueue_raw(&self, envelope: impl Into<SharedBytes>) {
        // The receiver lives in `self`, so the send cannot fail.
        let _ = self.sender.send(envelope.into());
    }

    /// Drains everything queued at the time of the call and processes it in FIFO order.
    pub fn heartbeat(&mut self, time: Instant) -> DrainReport {
        let mut report = DrainReport {
            evicted: self.fragments.cleanup_stale(time) as u64,
            ..Default::default()
        };

        // Bounded by the queue length now; envelopes arriving meanwhile wait for the next tick.
        let queued = self.receiver.len();
        for _ in 0..queued {
            let Ok(envelope) = self.receiver.try_recv() else {
                break;
            };
            report.envelopes += 1;
            self.process(envelope, time, &mut report);
        }

        report
    }

    fn process(&mut self, envelope: SharedBytes, time: Instant, report: &mut DrainReport) {
        let envelope = match Envelope::decode(envelope) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!("Dropping malformed envelope on channel {}: {}", self.channel.id(), err);
                report.malformed += 1;
                return;
            }
        };

        if envelope.header().channel != self.channel.id() {
            tracing::warn!(
                "Dropping envelope for channel {} queued on channel {}",
                envelope.header().channel,
                self.channel.id()
            );
            report.malformed += 1;
            return;
        }

        match envelope {
            Envelope::Whole { header, payload } => {
                self.deliver(IncomingMessage::new(header.kind, header.channel, header.sequence, payload));
            }
            Envelope::Fragment { header, fragment, payload } => {
                report.fragments += 1;
                let reassembled =
                    self.fragments.insert(header, fragment, payload, time, &mut report.evicted);
                if let Some(done) = reassembled {
                    report.reassembled += 1;
                    tracing::trace!(
                        "Reassembled group {} on channel {} ({} bytes)",
                        fragment.group_id,
                        self.channel.id(),
                        done.payload.len()
                    );
                    self.deliver(IncomingMessage::new(
                        done.header.kind,
                        done.header.channel,
                        done.header.sequence,
                        SharedBytes::from_vec(done.payload),
                    ));
                }
            }
        }
    }

    fn deliver(&mut self, message: IncomingMessage) {
        self.state.release(message, &mut self.delivered);
    }

    /// Pops the next delivered message, in completion order.
    pub fn dequeue(&mut self) -> Option<IncomingMessage> {
        self.delivered.pop_front()
    }

    /// Returns the number of delivered messages not yet dequeued.
    pub fn delivered_len(&self) -> usize {
        self.delivered.len()
    }

    /// Returns the number of incomplete fragment groups.
    pub fn pending_groups(&self) -> usize {
        self.fragments.pending()
    }
}
