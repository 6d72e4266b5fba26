//! Transport boundary for outbound datagrams.

use std::{io::Result, net::SocketAddr};

/// Destination for encoded datagrams.
///
/// The socket itself lives outside this crate; anything that can put bytes
/// on the wire (a UDP socket, an emulator, an in-memory queue) implements
/// this trait and is handed to the outbound senders.
pub trait DatagramSink: Send {
    /// Sends a single datagram to `addr`, returning the number of bytes written.
    fn send_datagram(&mut self, addr: &SocketAddr, payload: &[u8]) -> Result<usize>;
}

impl DatagramSink for std::net::UdpSocket {
    fn send_datagram(&mut self, addr: &SocketAddr, payload: &[u8]) -> Result<usize> {
        self.send_to(payload, addr)
    }
}

impl<T: DatagramSink + ?Sized> DatagramSink for Box<T> {
    fn send_datagram(&mut self, addr: &SocketAddr, payload: &[u8]) -> Result<usize> {
        (**self).send_datagram(addr, payload)
    }
}
