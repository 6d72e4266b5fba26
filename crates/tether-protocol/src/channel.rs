use tether_core::config::Config;
pub use tether_core::config::ChannelKind;

/// Represents a communication channel with independent ordering/sequencing.
/// Each connection has one channel per configured kind, identified by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    /// Channel identifier
    id: u8,
    /// Delivery policy for this channel
    kind: ChannelKind,
}

impl Channel {
    /// Creates a new channel with the given kind.
    pub fn new(id: u8, kind: ChannelKind) -> Self {
        Self { id, kind }
    }

    /// Creates an unreliable channel (like UDP).
    pub fn unreliable(id: u8) -> Self {
        Self::new(id, ChannelKind::Unreliable)
    }

    /// Creates an unreliable, sequenced channel (drops old messages).
    pub fn unreliable_sequenced(id: u8) -> Self {
        Self::new(id, ChannelKind::UnreliableSequenced)
    }

    /// Creates a reliable, unordered channel.
    pub fn reliable_unordered(id: u8) -> Self {
        Self::new(id, ChannelKind::ReliableUnordered)
    }

    /// Creates a reliable, ordered channel (like TCP).
    pub fn reliable_ordered(id: u8) -> Self {
        Self::new(id, ChannelKind::ReliableOrdered)
    }

    /// Builds the channel list described by `config`. Channels beyond 256 are ignored.
    pub fn from_config(config: &Config) -> Vec<Channel> {
        config
            .channels
            .iter()
            .take(u8::MAX as usize + 1)
            .enumerate()
            .map(|(id, kind)| Channel::new(id as u8, *kind))
            .collect()
    }

    /// Returns the channel ID.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Returns the channel kind.
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }
}
