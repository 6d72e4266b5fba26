#![warn(missing_docs)]

//! tether-peer: per-peer connection state.
//!
//! A [`Connection`] tracks one remote endpoint: ping/pong liveness with RTT
//! sampling, MTU negotiation, and per-channel inbound processing that
//! reassembles fragmented messages and applies the channel's ordering policy.

/// Ordering and sequencing applied to complete inbound messages.
pub mod channel_state;
mod connection;
/// Connection lifecycle states.
pub mod connection_status;
/// Fragment group reassembly.
pub mod fragment_buffer;
/// Inbound envelope queues and their processors.
pub mod inbound;
/// Liveness timers and the pure tick function driving them.
pub mod liveness;
/// Outbound senders and datagram sinks.
pub mod outbound;
/// Round-trip time samples.
pub mod rtt;
/// Per-connection counters.
pub mod statistics;

pub use connection::Connection;
pub use connection_status::ConnectionStatus;
pub use inbound::{InboundChannel, InboundHandle, InboundRouter};
pub use outbound::{FragmentingSender, MemorySink, OutboundSender};
pub use statistics::ConnectionStatistics;
