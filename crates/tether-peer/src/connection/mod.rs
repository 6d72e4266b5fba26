use std::{collections::VecDeque, fmt, net::SocketAddr, time::Instant};

use tether_core::{
    config::Config,
    constants::CONTROL_CHANNEL,
    error::{ErrorKind, Result},
    transport::DatagramSink,
};
use tether_protocol::{
    channel::Channel,
    message::{ControlMessage, IncomingMessage, OutgoingMessage},
};

use crate::{
    connection_status::ConnectionStatus,
    inbound::{InboundChannel, InboundRouter},
    liveness::{self, LivenessState, TickOutcome},
    outbound::{FragmentingSender, OutboundSender},
    rtt::RttSamples,
    statistics::ConnectionStatistics,
};

mod control;

/// One remote peer: liveness, MTU negotiation and per-channel message flow.
///
/// The connection never reads the clock or touches a socket itself. The
/// owner calls [`heartbeat`](Connection::heartbeat) with the current instant,
/// the I/O thread pushes raw envelopes through an [`InboundRouter`], and
/// outbound datagrams leave through the per-channel [`OutboundSender`]s.
pub struct Connection {
    /// The address of the remote endpoint
    remote_address: SocketAddr,
    /// Peer identifier assigned by the session layer
    remote_id: Option<u64>,
    status: ConnectionStatus,
    config: Config,

    /// Instant wire timestamps are measured from
    epoch: Instant,
    /// Ping, pong and MTU probe timers
    liveness: LivenessState,
    /// Latency from the echoed pong timestamp, in ms
    ping: f32,
    /// Round-trip samples from local send/receive times, in ms
    rtt: RttSamples,
    /// Largest datagram the peer accepts
    remote_mtu: u16,

    inbound: Vec<InboundChannel>,
    outbound: Vec<Box<dyn OutboundSender>>,
    /// User messages delivered but not yet taken by `recv`
    received: VecDeque<IncomingMessage>,

    statistics: ConnectionStatistics,
}

impl Connection {
    /// Creates a connection to `remote_address` at `time`, with one sender per configured channel.
    ///
    /// `make_sender` is called once per channel, in channel id order.
    pub fn new<F>(remote_address: SocketAddr, config: Config, time: Instant, mut make_sender: F) -> Self
    where
        F: FnMut(Channel) -> Box<dyn OutboundSender>,
    {
        let channels = Channel::from_config(&config);
        let inbound = channels.iter().map(|channel| InboundChannel::new(*channel, &config)).collect();
        let outbound = channels.iter().map(|channel| make_sender(*channel)).collect();

        tracing::debug!(
            "Creating connection to {} with {} channel(s)",
            remote_address,
            config.channel_count()
        );

        Self {
            remote_address,
            remote_id: None,
            status: ConnectionStatus::default(),
            epoch: time,
            liveness: LivenessState::new(time),
            ping: 0.0,
            rtt: RttSamples::new(config.rtt_sample_capacity),
            remote_mtu: config.mtu,
            inbound,
            outbound,
            received: VecDeque::new(),
            statistics: ConnectionStatistics::default(),
            config,
        }
    }

    /// Creates a connection whose channels all write through clones of `sink`.
    pub fn with_sink<S>(remote_address: SocketAddr, config: Config, time: Instant, sink: S) -> Self
    where
        S: DatagramSink + Clone + 'static,
    {
        let mtu = config.mtu;
        let max_fragments = config.max_fragments;
        Self::new(remote_address, config, time, |channel| {
            Box::new(FragmentingSender::new(channel, remote_address, sink.clone(), mtu, max_fragments))
                as Box<dyn OutboundSender>
        })
    }

    /// Returns the address of the remote endpoint.
    pub fn remote_address(&self) -> SocketAddr {
        self.remote_address
    }

    /// Returns the peer identifier, once the session layer has assigned one.
    pub fn remote_id(&self) -> Option<u64> {
        self.remote_id
    }

    /// Records the peer identifier assigned by the session layer.
    pub fn set_remote_id(&mut self, id: u64) {
        self.remote_id = Some(id);
    }

    /// Returns the current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Marks the handshake as complete. Returns false if the connection is already disconnected.
    pub fn mark_connected(&mut self) -> bool {
        match self.status {
            ConnectionStatus::Disconnected => false,
            ConnectionStatus::Connected => true,
            ConnectionStatus::Connecting => {
                tracing::debug!("Connection to {} established", self.remote_address);
                self.status = ConnectionStatus::Connected;
                true
            }
        }
    }

    /// Returns the configuration this connection was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the liveness timers.
    pub fn liveness(&self) -> &LivenessState {
        &self.liveness
    }

    /// Returns the latency derived from the last accepted pong's timestamp, in ms.
    pub fn ping(&self) -> f32 {
        self.ping
    }

    /// Returns the mean of the round-trip samples, in ms.
    pub fn average_round_trip_time(&self) -> f32 {
        self.rtt.average()
    }

    /// Returns the round-trip samples, oldest first.
    pub fn rtt_samples(&self) -> &RttSamples {
        &self.rtt
    }

    /// Returns the MTU the peer accepts.
    pub fn remote_mtu(&self) -> u16 {
        self.remote_mtu
    }

    /// Returns true once the peer has confirmed our MTU announcement.
    pub fn mtu_finalized(&self) -> bool {
        self.liveness.mtu_finalized
    }

    /// Returns the traffic and anomaly counters.
    pub fn statistics(&self) -> &ConnectionStatistics {
        &self.statistics
    }

    /// Returns the number of pongs accepted so far.
    pub fn pongs_accepted(&self) -> u64 {
        self.statistics.pongs_accepted
    }

    /// Returns the share of received pongs that were rejected as late or unknown.
    pub fn pong_rejection_rate(&self) -> f32 {
        self.statistics.pong_rejection_rate()
    }

    /// Returns a router the I/O thread uses to feed raw envelopes into this connection.
    pub fn inbound_router(&self) -> InboundRouter {
        InboundRouter::new(self.inbound.iter().map(InboundChannel::handle).collect())
    }

    /// Pops the next user message delivered by any channel.
    pub fn recv(&mut self) -> Option<IncomingMessage> {
        self.received.pop_front()
    }

    /// Queues `message` on the sender of its channel.
    pub fn enqueue_outbound(&mut self, message: OutgoingMessage) -> Result<()> {
        if self.status.is_disconnected() {
            return Err(ErrorKind::Disconnected(self.remote_address));
        }

        let channel = message.channel();
        let sender = self
            .outbound
            .get_mut(channel as usize)
            .ok_or(ErrorKind::UnknownChannel(channel))?;

        self.statistics.messages_sent += 1;
        self.statistics.bytes_sent += message.payload().len() as u64;
        sender.enqueue(message);
        Ok(())
    }

    fn enqueue_control(&mut self, message: ControlMessage) {
        tracing::trace!("Queueing {:?} for {}", message, self.remote_address);
        if let Some(sender) = self.outbound.get_mut(CONTROL_CHANNEL as usize) {
            sender.enqueue(message.into_message(CONTROL_CHANNEL));
        }
    }

    /// Sends a disconnect notice carrying `reason` and marks the connection disconnected.
    ///
    /// The notice is flushed immediately and never acknowledged. The status
    /// changes even if the flush fails.
    pub fn disconnect(&mut self, reason: &str, time: Instant) -> Result<()> {
        tracing::info!("Disconnecting from {}: {}", self.remote_address, reason);

        self.enqueue_control(ControlMessage::Disconnect { reason: reason.to_owned() });
        let flushed = match self.outbound.get_mut(CONTROL_CHANNEL as usize) {
            Some(sender) => sender.flush(time).map(|_| ()),
            None => Ok(()),
        };

        self.status = ConnectionStatus::Disconnected;
        flushed
    }

    /// Advances timers, processes inbound traffic and flushes outbound traffic.
    ///
    /// Returns the number of datagrams sent. Flush failures are logged; the
    /// first one is returned after every channel has been flushed.
    pub fn heartbeat(&mut self, time: Instant) -> Result<usize> {
        let (liveness, outcome) = liveness::tick(self.liveness, self.status, time, &self.config);
        self.liveness = liveness;

        match outcome {
            TickOutcome::TimedOut => {
                tracing::warn!(
                    "Connection to {} timed out after {:?} without a pong",
                    self.remote_address,
                    self.config.connection_timeout
                );
                return self.disconnect("timed out", time).map(|_| 0);
            }
            TickOutcome::Send(messages) => {
                for message in messages {
                    self.enqueue_control(message);
                }
            }
        }

        self.process_inbound(time);
        self.flush_outbound(time)
    }

    fn process_inbound(&mut self, time: Instant) {
        let mut delivered = Vec::new();
        for channel in &mut self.inbound {
            let report = channel.heartbeat(time);
            self.statistics.fragments_received += report.fragments;
            self.statistics.groups_reassembled += report.reassembled;
            self.statistics.groups_evicted += report.evicted;
            self.statistics.malformed_envelopes += report.malformed;
            delivered.extend(std::iter::from_fn(|| channel.dequeue()));
        }

        for message in delivered {
            self.dispatch(message, time);
        }
    }

    fn flush_outbound(&mut self, time: Instant) -> Result<usize> {
        let mut sent = 0;
        let mut first_error = None;

        for (channel, sender) in self.outbound.iter_mut().enumerate() {
            match sender.flush(time) {
                Ok(count) => sent += count,
                Err(err) => {
                    tracing::error!(
                        "Failed to flush channel {} to {}: {}",
                        channel,
                        self.remote_address,
                        err
                    );
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(sent),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({:?})", self.remote_address.ip(), self.remote_address.port(), self.status)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossbeam_channel::Receiver;
    use tether_core::shared::SharedBytes;
    use tether_protocol::{envelope::Envelope, message::MessageKind};

    use super::*;
    use crate::outbound::{Datagram, MemorySink};

    fn remote() -> SocketAddr {
        "127.0.0.1:7777".parse().unwrap()
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.ping_interval = Duration::from_millis(100);
        config.connection_timeout = Duration::from_secs(1);
        config
    }

    fn connection(time: Instant) -> (Connection, Receiver<Datagram>) {
        let (sink, datagrams) = MemorySink::unbounded();
        (Connection::with_sink(remote(), config(), time, sink), datagrams)
    }

    fn sent_kinds(datagrams: &Receiver<Datagram>) -> Vec<MessageKind> {
        datagrams
            .try_iter()
            .map(|d| Envelope::decode(SharedBytes::from_vec(d.payload)).unwrap().header().kind)
            .collect()
    }

    #[test]
    fn test_new_connection_is_connecting() {
        let (connection, _) = connection(Instant::now());
        assert_eq!(connection.status(), ConnectionStatus::Connecting);
        assert_eq!(connection.remote_mtu(), connection.config().mtu);
        assert_eq!(connection.remote_id(), None);
        assert!(!connection.mtu_finalized());
    }

    #[test]
    fn test_mark_connected_refused_after_disconnect() {
        let time = Instant::now();
        let (mut connection, _datagrams) = connection(time);
        assert!(connection.mark_connected());
        assert!(connection.mark_connected());
        connection.disconnect("bye", time).unwrap();
        assert!(!connection.mark_connected());
        assert_eq!(connection.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_connected_heartbeat_pings_and_announces() {
        let time = Instant::now();
        let (mut connection, datagrams) = connection(time);
        connection.mark_connected();

        assert_eq!(connection.heartbeat(time).unwrap(), 2);
        assert_eq!(sent_kinds(&datagrams), vec![MessageKind::Ping, MessageKind::MtuAnnounce]);
        assert_eq!(connection.liveness().ping_counter, 1);
    }

    #[test]
    fn test_connecting_heartbeat_sends_nothing() {
        let time = Instant::now();
        let (mut connection, datagrams) = connection(time);
        assert_eq!(connection.heartbeat(time).unwrap(), 0);
        assert!(sent_kinds(&datagrams).is_empty());
    }

    #[test]
    fn test_timeout_disconnects_once() {
        let start = Instant::now();
        let (mut connection, datagrams) = connection(start);
        connection.mark_connected();
        connection.heartbeat(start).unwrap();
        let _ = sent_kinds(&datagrams);

        let late = start + Duration::from_secs(1);
        connection.heartbeat(late).unwrap();
        assert_eq!(connection.status(), ConnectionStatus::Disconnected);
        assert_eq!(sent_kinds(&datagrams), vec![MessageKind::Disconnect]);

        for step in 1..10 {
            connection.heartbeat(late + Duration::from_millis(100 * step)).unwrap();
        }
        assert!(sent_kinds(&datagrams).is_empty());
        assert_eq!(connection.liveness().ping_counter, 1);
    }

    #[test]
    fn test_enqueue_outbound_validates_channel_and_status() {
        let time = Instant::now();
        let (mut connection, datagrams) = connection(time);

        assert!(matches!(
            connection.enqueue_outbound(OutgoingMessage::data(9, b"x".to_vec())),
            Err(ErrorKind::UnknownChannel(9))
        ));

        connection.enqueue_outbound(OutgoingMessage::data(1, b"hello".to_vec())).unwrap();
        connection.heartbeat(time).unwrap();
        assert_eq!(sent_kinds(&datagrams), vec![MessageKind::Data]);
        assert_eq!(connection.statistics().messages_sent, 1);
        assert_eq!(connection.statistics().bytes_sent, 5);

        connection.disconnect("done", time).unwrap();
        assert!(matches!(
            connection.enqueue_outbound(OutgoingMessage::data(1, b"late".to_vec())),
            Err(ErrorKind::Disconnected(_))
        ));
    }

    #[test]
    fn test_disconnect_flush_failure_still_disconnects() {
        let time = Instant::now();
        let (sink, datagrams) = MemorySink::unbounded();
        drop(datagrams);
        let mut connection = Connection::with_sink(remote(), config(), time, sink);

        assert!(matches!(connection.disconnect("bye", time), Err(ErrorKind::Io(_))));
        assert!(connection.status().is_disconnected());
    }

    #[test]
    fn test_inbound_data_reaches_recv() {
        let time = Instant::now();
        let (mut connection, _datagrams) = connection(time);
        let router = connection.inbound_router();

        let mut envelope = Vec::new();
        tether_protocol::header::write_envelope(
            &mut envelope,
            &tether_protocol::LibraryHeader::new(MessageKind::Data, 1, 0),
            None,
            b"payload",
        );
        assert!(router.route(envelope));

        connection.heartbeat(time).unwrap();
        let message = connection.recv().unwrap();
        assert_eq!(message.payload(), b"payload");
        assert_eq!(message.channel(), 1);
        assert_eq!(connection.statistics().messages_received, 1);
        assert_eq!(connection.statistics().bytes_received, 7);
        assert!(connection.recv().is_none());
    }
}
