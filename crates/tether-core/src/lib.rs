#![warn(missing_docs)]

//! tether-core: foundational types shared by every layer.
//!
//! This crate holds the pieces the protocol and peer crates both depend on:
//! - Configuration types
//! - Error handling
//! - Protocol constants
//! - Shared byte buffers and time helpers
//! - The datagram sink trait at the transport boundary
//!
//! Wire formats live in `tether-protocol`; connection state lives in
//! `tether-peer`.

/// Protocol constants shared across layers.
pub mod constants {
    /// Size of the library header prefixed on every envelope.
    ///
    /// `kind:u8 | channel:u8 | flags:u8 | sequence:u16`
    pub const LIBRARY_HEADER_SIZE: usize = 5;
    /// Size of the fragment header following the library header when the fragment flag is set.
    ///
    /// `group_id:u32 | fragment_number:u16 | fragment_size:u16 | total_bits:u32`
    pub const FRAGMENT_HEADER_SIZE: usize = 12;
    /// Maximum transmission unit used when nothing else is configured.
    ///
    /// Derived from ethernet_mtu - ipv6_header_size - udp_header_size
    ///       1452 = 1500         - 40               - 8
    pub const DEFAULT_MTU: u16 = 1452;
    /// MTU that is assumed to be deliverable on any path.
    ///
    /// A connection configured with exactly this value never probes.
    pub const SAFE_MTU: u16 = 1200;
    /// Channel carrying pings, pongs, MTU negotiation and disconnect notices.
    pub const CONTROL_CHANNEL: u8 = 0;
}

/// Configuration options for connections and channels.
pub mod config;
/// Error types and results.
pub mod error;
/// Shared, reference-counted byte slices with zero-copy slicing.
pub mod shared;
/// Conversions between monotonic instants and wire timestamps.
pub mod time;
/// Transport boundary for outbound datagrams.
pub mod transport;
