use std::{io, net::SocketAddr, result};

use thiserror::Error;

/// Convenience alias used throughout the tether crates.
pub type Result<T> = result::Result<T, ErrorKind>;

/// Everything that can go wrong inside the connection core.
///
/// Apart from `Io`, these are protocol-level conditions: the offending message
/// is dropped and the connection carries on.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Underlying I/O failure while handing a datagram to the transport.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// An envelope was shorter than the header it claims to carry.
    #[error("received data is too short to contain a header")]
    ReceivedDataTooShort,
    /// A header or message field could not be decoded.
    #[error("could not read header: {0}")]
    CouldNotReadHeader(String),
    /// The library header named a message kind this side does not know.
    #[error("unknown message kind {0}")]
    UnknownMessageKind(u8),
    /// A peer announced an MTU outside the configured bounds.
    #[error("announced mtu {mtu} outside [{min}, {max}]")]
    InvalidMtu {
        /// Announced value
        mtu: u16,
        /// Lower bound
        min: u16,
        /// Upper bound
        max: u16,
    },
    /// A pong did not answer the most recent ping.
    #[error("unexpected pong {received} (expected {expected})")]
    UnexpectedPong {
        /// Counter carried by the pong
        received: u32,
        /// Counter of the last ping sent
        expected: u32,
    },
    /// A message addressed a channel that is not configured.
    #[error("unknown channel {0}")]
    UnknownChannel(u8),
    /// The connection to this address is already disconnected.
    #[error("connection to {0} is disconnected")]
    Disconnected(SocketAddr),
    /// A message needs more fragments than allowed.
    #[error("message of {size} bytes needs {fragments} fragments (max {max})")]
    MessageTooLarge {
        /// Message size in bytes
        size: usize,
        /// Fragments required
        fragments: usize,
        /// Configured maximum
        max: u16,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts() {
        fn fails() -> Result<()> {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "busy"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(ErrorKind::Io(_))));
    }

    #[test]
    fn test_display_includes_bounds() {
        let err = ErrorKind::InvalidMtu { mtu: 100, min: 576, max: 1500 };
        assert_eq!(err.to_string(), "announced mtu 100 outside [576, 1500]");
    }
}
