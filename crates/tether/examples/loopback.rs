//! Two connections talking over real UDP sockets on the loopback interface.
//!
//! Each side runs an I/O thread that reads datagrams and routes them into the
//! connection's inbound queues, while the main thread drives both heartbeats.
//!
//! - cargo run -p tether --example loopback
//! - cargo run -p tether --example loopback -- 20 4000
//!   (sends 20 messages of 4000 bytes, fragmented under the MTU)

use std::{
    env,
    io,
    net::{SocketAddr, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use tether::prelude::*;
use tether::InboundRouter;

/// UDP socket shared between the connection's senders and its I/O thread.
#[derive(Clone)]
struct SharedSocket(Arc<UdpSocket>);

impl DatagramSink for SharedSocket {
    fn send_datagram(&mut self, addr: &SocketAddr, payload: &[u8]) -> io::Result<usize> {
        self.0.send_to(payload, addr)
    }
}

fn spawn_reader(
    socket: Arc<UdpSocket>,
    router: InboundRouter,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut buffer = [0u8; 2048];
        while running.load(Ordering::Relaxed) {
            match socket.recv_from(&mut buffer) {
                Ok((len, _)) => {
                    router.route(&buffer[..len]);
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
                Err(e) => {
                    eprintln!("receive failed: {}", e);
                    break;
                }
            }
        }
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Args: [count] [size]
    let mut args = env::args().skip(1);
    let count: usize = args.next().unwrap_or_else(|| "10".into()).parse().unwrap_or(10);
    let size: usize = args.next().unwrap_or_else(|| "3000".into()).parse().unwrap_or(3000);

    let left_socket = Arc::new(UdpSocket::bind("127.0.0.1:0")?);
    let right_socket = Arc::new(UdpSocket::bind("127.0.0.1:0")?);
    left_socket.set_read_timeout(Some(Duration::from_millis(20)))?;
    right_socket.set_read_timeout(Some(Duration::from_millis(20)))?;
    let left_addr = left_socket.local_addr()?;
    let right_addr = right_socket.local_addr()?;

    let clock = SystemClock;
    let start = clock.now();

    let mut right_config = Config::default();
    right_config.mtu = 1300;

    let mut left = Connection::with_sink(
        right_addr,
        Config::default(),
        start,
        SharedSocket(left_socket.clone()),
    );
    let mut right =
        Connection::with_sink(left_addr, right_config, start, SharedSocket(right_socket.clone()));
    left.mark_connected();
    right.mark_connected();

    let running = Arc::new(AtomicBool::new(true));
    let readers = [
        spawn_reader(left_socket, left.inbound_router(), running.clone()),
        spawn_reader(right_socket, right.inbound_router(), running.clone()),
    ];

    println!("left {} <-> right {}: sending {} messages of {} bytes", left_addr, right_addr, count, size);

    let mut sent = 0;
    let mut received = 0;
    while received < count && clock.now().duration_since(start) < Duration::from_secs(10) {
        if sent < count {
            left.enqueue_outbound(OutgoingMessage::data(1, vec![sent as u8; size]))?;
            sent += 1;
        }

        let now = clock.now();
        left.heartbeat(now)?;
        right.heartbeat(now)?;

        while let Some(message) = right.recv() {
            received += 1;
            println!(
                "[right] message {:?} on channel {}: {} bytes",
                message.payload().first(),
                message.channel(),
                message.payload().len()
            );
        }

        thread::sleep(Duration::from_millis(20));
    }

    println!(
        "left: ping {:.2}ms, rtt {:.2}ms, remote mtu {}, finalized {}",
        left.ping(),
        left.average_round_trip_time(),
        left.remote_mtu(),
        left.mtu_finalized()
    );
    println!("right statistics: {:?}", right.statistics());
    println!(
        "pongs accepted: left {}, right {}; rejection rate left {:.2}",
        left.pongs_accepted(),
        right.pongs_accepted(),
        left.pong_rejection_rate()
    );

    left.disconnect("demo finished", clock.now())?;
    thread::sleep(Duration::from_millis(50));
    right.heartbeat(clock.now())?;
    println!("right status after disconnect: {:?}", right.status());

    running.store(false, Ordering::Relaxed);
    for reader in readers {
        let _ = reader.join();
    }
    Ok(())
}
