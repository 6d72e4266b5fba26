//! Integration tests for the tether-peer crate.
//!
//! Two connections are wired back to back through in-memory sinks, so every
//! datagram one side flushes is routed into the other side's inbound queues.

use std::{
    net::SocketAddr,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::Receiver;
use tether_core::config::{ChannelKind, Config};
use tether_peer::{outbound::Datagram, Connection, ConnectionStatus, MemorySink};
use tether_protocol::message::OutgoingMessage;

struct Pair {
    a: Connection,
    b: Connection,
    a_out: Receiver<Datagram>,
    b_out: Receiver<Datagram>,
}

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn pair(a_config: Config, b_config: Config, time: Instant) -> Pair {
    let (a_sink, a_out) = MemorySink::unbounded();
    let (b_sink, b_out) = MemorySink::unbounded();
    let mut a = Connection::with_sink(addr(2), a_config, time, a_sink);
    let mut b = Connection::with_sink(addr(1), b_config, time, b_sink);
    assert!(a.mark_connected());
    assert!(b.mark_connected());
    Pair { a, b, a_out, b_out }
}

impl Pair {
    /// Delivers everything in flight in both directions. Returns the number of datagrams moved.
    fn pump(&self) -> usize {
        let to_b = self.b.inbound_router();
        let to_a = self.a.inbound_router();
        let mut moved = 0;
        for datagram in self.a_out.try_iter() {
            assert_eq!(datagram.addr, addr(2));
            to_b.route(datagram.payload);
            moved += 1;
        }
        for datagram in self.b_out.try_iter() {
            to_a.route(datagram.payload);
            moved += 1;
        }
        moved
    }

    fn tick(&mut self, time: Instant) {
        self.a.heartbeat(time).unwrap();
        self.b.heartbeat(time).unwrap();
        self.pump();
    }
}

#[test]
fn test_ping_pong_keeps_connection_alive() {
    let start = Instant::now();
    let mut pair = pair(Config::default(), Config::default(), start);

    // Well past the connection timeout
    let mut time = start;
    for _ in 0..150 {
        pair.tick(time);
        time += Duration::from_millis(100);
    }

    assert_eq!(pair.a.status(), ConnectionStatus::Connected);
    assert_eq!(pair.b.status(), ConnectionStatus::Connected);
    assert!(pair.a.pongs_accepted() > 0);
    assert!(pair.b.pongs_accepted() > 0);
    assert!(!pair.a.rtt_samples().is_empty());
    assert_eq!(pair.a.statistics().pongs_rejected, 0);
    assert_eq!(pair.a.pong_rejection_rate(), 0.0);
}

#[test]
fn test_silent_peer_times_out() {
    let start = Instant::now();
    let mut pair = pair(Config::default(), Config::default(), start);
    let timeout = pair.a.config().connection_timeout;

    // b never ticks, so a never sees a pong
    let mut time = start;
    while time <= start + timeout {
        pair.a.heartbeat(time).unwrap();
        time += Duration::from_millis(250);
    }

    assert_eq!(pair.a.status(), ConnectionStatus::Disconnected);
    let pings_before = pair.a.liveness().ping_counter;
    pair.a.heartbeat(time + timeout).unwrap();
    assert_eq!(pair.a.liveness().ping_counter, pings_before);
}

#[test]
fn test_mtu_negotiation_converges() {
    let start = Instant::now();
    let mut a_config = Config::default();
    a_config.mtu = 1000;
    let mut pair = pair(a_config, Config::default(), start);

    let mut time = start;
    for _ in 0..4 {
        pair.tick(time);
        time += Duration::from_millis(100);
    }

    assert_eq!(pair.b.remote_mtu(), 1000);
    assert_eq!(pair.a.remote_mtu(), 1000);
    assert!(pair.a.mtu_finalized());
    assert!(pair.b.mtu_finalized());

    // Once finalized, no further announces are sent
    for _ in 0..10 {
        pair.a.heartbeat(time).unwrap();
        time += pair.a.config().mtu_resend_delay;
    }
    let probes = pair
        .a_out
        .try_iter()
        .filter(|d| d.payload[0] == tether_protocol::MessageKind::MtuAnnounce.tag())
        .count();
    assert_eq!(probes, 0);
}

#[test]
fn test_fragmented_message_round_trip() {
    let start = Instant::now();
    let mut a_config = Config::default();
    a_config.mtu = 600;
    let mut pair = pair(a_config, Config::default(), start);

    let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    pair.a.enqueue_outbound(OutgoingMessage::data(1, payload.clone())).unwrap();
    pair.a.enqueue_outbound(OutgoingMessage::data(1, b"after".to_vec())).unwrap();
    pair.tick(start);
    pair.b.heartbeat(start).unwrap();

    let message = pair.b.recv().unwrap();
    assert_eq!(message.payload(), &payload[..]);
    assert_eq!(message.sequence(), 0);
    assert_eq!(pair.b.recv().unwrap().payload(), b"after");
    assert!(pair.b.statistics().fragments_received >= 17);
    assert_eq!(pair.b.statistics().groups_reassembled, 1);
}

#[test]
fn test_disconnect_notifies_peer() {
    let start = Instant::now();
    let mut pair = pair(Config::default(), Config::default(), start);

    pair.a.disconnect("shutting down", start).unwrap();
    pair.pump();
    pair.b.heartbeat(start).unwrap();

    assert!(pair.a.status().is_disconnected());
    assert!(pair.b.status().is_disconnected());
    assert!(!pair.b.mark_connected());
}

#[test]
fn test_router_used_from_io_thread() {
    let start = Instant::now();
    let mut pair = pair(Config::default(), Config::default(), start);

    for i in 0..20u8 {
        pair.a.enqueue_outbound(OutgoingMessage::data(1, vec![i])).unwrap();
    }
    pair.a.heartbeat(start).unwrap();

    let router = pair.b.inbound_router();
    let outbound = pair.a_out.clone();
    let io_thread = thread::spawn(move || {
        for datagram in outbound.try_iter() {
            router.route(datagram.payload);
        }
    });
    io_thread.join().unwrap();

    pair.b.heartbeat(start).unwrap();
    let received: Vec<u8> = std::iter::from_fn(|| pair.b.recv()).map(|m| m.payload()[0]).collect();
    assert_eq!(received, (0..20u8).collect::<Vec<_>>());
}

#[test]
fn test_lost_datagram_does_not_stall_default_channel() {
    let start = Instant::now();
    let mut pair = pair(Config::default(), Config::default(), start);

    for i in 0..100u8 {
        pair.a.enqueue_outbound(OutgoingMessage::data(1, vec![i])).unwrap();
    }
    pair.a.heartbeat(start).unwrap();

    // Drop the first data datagram, deliver the rest
    let router = pair.b.inbound_router();
    let mut dropped = false;
    for datagram in pair.a_out.try_iter() {
        if !dropped && datagram.payload[1] == 1 {
            dropped = true;
            continue;
        }
        router.route(datagram.payload);
    }
    assert!(dropped);

    pair.b.heartbeat(start).unwrap();
    let received: Vec<u8> = std::iter::from_fn(|| pair.b.recv()).map(|m| m.payload()[0]).collect();
    assert_eq!(received, (1..100u8).collect::<Vec<_>>());
}

#[test]
fn test_oversized_message_does_not_block_ordered_channel() {
    let start = Instant::now();
    let mut a_config = Config::default();
    a_config.channels = vec![ChannelKind::Unreliable, ChannelKind::ReliableOrdered];
    a_config.max_fragments = 2;
    let mut b_config = Config::default();
    b_config.channels = vec![ChannelKind::Unreliable, ChannelKind::ReliableOrdered];
    let mut pair = pair(a_config, b_config, start);

    pair.a.enqueue_outbound(OutgoingMessage::data(1, vec![0u8; 10_000])).unwrap();
    pair.a.enqueue_outbound(OutgoingMessage::data(1, b"small".to_vec())).unwrap();
    pair.tick(start);
    pair.b.heartbeat(start).unwrap();

    let message = pair.b.recv().unwrap();
    assert_eq!(message.payload(), b"small");
    assert_eq!(message.sequence(), 0);
    assert!(pair.b.recv().is_none());
}
