#![warn(missing_docs)]

//! tether-protocol: message kinds, headers, envelopes and channel kinds.

/// Channel abstraction for independent message streams.
pub mod channel;
/// Envelope framing and outbound fragmentation.
pub mod envelope;
/// Library and fragment headers.
pub mod header;
/// Message kinds and field-level reader/writer.
pub mod message;

pub use channel::{Channel, ChannelKind};
pub use envelope::Envelope;
pub use header::{FragmentHeader, LibraryHeader};
pub use message::{ControlMessage, IncomingMessage, MessageKind, OutgoingMessage};
