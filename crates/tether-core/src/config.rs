use std::{default::Default, time::Duration};

use crate::constants::DEFAULT_MTU;

/// Delivery policy of one logical channel.
///
/// Reliability itself (acks, resends) belongs to the outbound sender; on the
/// inbound side the kind only decides how complete messages are released.
#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Delivered as they complete, duplicates and gaps allowed.
    Unreliable,
    /// Delivered as they complete, but anything older than the newest seen sequence is dropped.
    UnreliableSequenced,
    /// Delivered as they complete; the sender guarantees arrival.
    ReliableUnordered,
    /// Held back until every earlier sequence has been delivered.
    ///
    /// A lost sequence stalls the channel until it arrives, so this kind needs
    /// an outbound sender that retransmits.
    ReliableOrdered,
}

impl ChannelKind {
    /// Returns true if messages on this channel are released strictly by sequence.
    pub fn is_ordered(&self) -> bool {
        matches!(self, ChannelKind::ReliableOrdered)
    }

    /// Returns true if stale sequences are discarded on this channel.
    pub fn is_sequenced(&self) -> bool {
        matches!(self, ChannelKind::UnreliableSequenced)
    }
}

#[derive(Clone, Debug)]
/// Configuration options to tune liveness, MTU negotiation and reassembly.
pub struct Config {
    /// MTU this side announces to its peer, and the starting ceiling for outbound datagrams.
    pub mtu: u16,
    /// Smallest MTU accepted from a peer announcement.
    pub mtu_min: u16,
    /// Largest MTU accepted from a peer announcement.
    pub mtu_max: u16,
    /// Interval between pings once a connection is established.
    pub ping_interval: Duration,
    /// Max time without a matching pong before the connection is dropped.
    pub connection_timeout: Duration,
    /// Delay between MTU announce resends until the peer confirms.
    pub mtu_resend_delay: Duration,
    /// Number of round-trip samples kept for the rolling average.
    pub rtt_sample_capacity: usize,
    /// Kind of each channel, indexed by channel id. Channel 0 carries control traffic.
    ///
    /// Defaults to `[Unreliable, ReliableUnordered]`, which never stalls on loss.
    pub channels: Vec<ChannelKind>,
    /// Age after which an incomplete fragment group is discarded. None disables age-based expiry.
    pub fragment_group_timeout: Option<Duration>,
    /// Max incomplete fragment groups per channel; the oldest is evicted beyond this (0 = unlimited).
    ///
    /// The default of 256 means a channel does evict abandoned groups once
    /// that many are pending. Set 0 to keep every group until it completes.
    pub max_pending_fragment_groups: usize,
    /// Max fragments a single outbound message may be split into.
    pub max_fragments: u16,
}

impl Config {
    /// Returns the number of configured channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Returns true if `mtu` lies within the accepted announcement range.
    pub fn is_valid_mtu(&self, mtu: u16) -> bool {
        (self.mtu_min..=self.mtu_max).contains(&mtu)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            mtu_min: 576,
            mtu_max: 1500,
            ping_interval: Duration::from_secs(1),
            connection_timeout: Duration::from_secs(10),
            mtu_resend_delay: Duration::from_millis(500),
            rtt_sample_capacity: 10,
            channels: vec![ChannelKind::Unreliable, ChannelKind::ReliableUnordered],
            fragment_group_timeout: None,
            max_pending_fragment_groups: 256,
            max_fragments: 1024,
        }
    }
}
