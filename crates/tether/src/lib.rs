#![warn(missing_docs)]

//! Tether: a small public API facade for the workspace.
//!
//! This crate re-exports the surface most applications need to keep a UDP
//! peer alive and exchange messages with it:
//!
//! - Connections and their status (`Connection`, `ConnectionStatus`)
//! - Messages (`OutgoingMessage`, `IncomingMessage`, `MessageKind`)
//! - Transport seams (`DatagramSink`, `OutboundSender`, `InboundRouter`)
//! - Core configuration (`Config`, `ChannelKind`)
//!
//! Example
//! ```ignore
//! use std::time::Instant;
//! use tether::{Config, Connection, MemorySink, OutgoingMessage};
//!
//! let (sink, datagrams) = MemorySink::unbounded();
//! let start = Instant::now();
//! let mut connection =
//!     Connection::with_sink("127.0.0.1:7777".parse().unwrap(), Config::default(), start, sink);
//! connection.mark_connected();
//!
//! connection.enqueue_outbound(OutgoingMessage::data(1, b"hello".to_vec())).unwrap();
//! connection.heartbeat(start).unwrap();
//!
//! // Ping, MTU announce and the data message
//! assert_eq!(datagrams.try_iter().count(), 3);
//! ```

// Core config, errors and time
pub use tether_core::{
    config::{ChannelKind, Config},
    error::{ErrorKind, Result},
    time::{Clock, SystemClock},
    transport::DatagramSink,
};
// Peer: connection state and channel plumbing
pub use tether_peer::{
    Connection, ConnectionStatistics, ConnectionStatus, FragmentingSender, InboundRouter,
    MemorySink, OutboundSender,
};
// Protocol: messages and channels
pub use tether_protocol::{Channel, IncomingMessage, MessageKind, OutgoingMessage};

/// Convenience prelude with the most commonly used items.
pub mod prelude {
    pub use crate::{
        ChannelKind, Clock, Config, Connection, ConnectionStatus, DatagramSink, IncomingMessage,
        MessageKind, OutgoingMessage, SystemClock,
    };
}
