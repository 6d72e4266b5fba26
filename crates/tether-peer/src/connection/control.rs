use std::time::Instant;

use tether_core::{
    error::{ErrorKind, Result},
    time::{as_millis_f32, seconds_since},
};
use tether_protocol::message::{ControlMessage, IncomingMessage, MessageKind};

use super::Connection;
use crate::connection_status::ConnectionStatus;

impl Connection {
    /// Handles one delivered message: control kinds are consumed here, data goes to `recv`.
    pub(super) fn dispatch(&mut self, mut message: IncomingMessage, time: Instant) {
        let result = match message.kind() {
            MessageKind::Data => {
                self.statistics.messages_received += 1;
                self.statistics.bytes_received += message.payload().len() as u64;
                self.received.push_back(message);
                Ok(())
            }
            MessageKind::Ping => self.receive_ping(&mut message, time),
            MessageKind::Pong => self.receive_pong(&mut message, time),
            MessageKind::MtuAnnounce => self.receive_mtu_announce(&mut message),
            MessageKind::MtuFinalized => self.receive_mtu_finalized(&mut message),
            MessageKind::Disconnect => self.receive_disconnect(&mut message),
        };

        if let Err(err) = result {
            tracing::debug!("Dropped control message from {}: {}", self.remote_address, err);
        }
    }

    fn receive_ping(&mut self, message: &mut IncomingMessage, time: Instant) -> Result<()> {
        let counter = message.read_u32()?;
        let timestamp = seconds_since(self.epoch, time) as f32;
        self.enqueue_control(ControlMessage::Pong { counter, timestamp });
        Ok(())
    }

    /// Applies a pong if it answers the most recent ping.
    ///
    /// A late or unknown counter, or any pong before the first ping, is logged
    /// and rejected without touching any timer or latency figure.
    pub fn receive_pong(&mut self, message: &mut IncomingMessage, time: Instant) -> Result<()> {
        let counter = message.read_u32()?;
        let timestamp = message.read_f32()?;
        let expected = self.liveness.ping_counter;

        if self.liveness.last_ping_sent_at.is_none() || counter != expected {
            if self.liveness.last_ping_sent_at.is_some() && counter < expected {
                tracing::warn!(
                    "Received late pong {} from {}, expecting {}",
                    counter,
                    self.remote_address,
                    expected
                );
            } else {
                tracing::warn!(
                    "Received unknown pong {} from {}, expecting {}",
                    counter,
                    self.remote_address,
                    expected
                );
            }
            self.statistics.pongs_rejected += 1;
            return Err(ErrorKind::UnexpectedPong { received: counter, expected });
        }

        self.liveness.last_pong_received_at = time;
        self.liveness.last_acknowledged_ping_counter = counter;
        self.ping = ((seconds_since(self.epoch, time) - timestamp as f64) * 1000.0) as f32;

        if let Some(sent_at) = self.liveness.last_ping_sent_at {
            let sample = as_millis_f32(time.saturating_duration_since(sent_at));
            let average = self.rtt.push(sample);
            tracing::trace!(
                "Pong {} from {}: rtt {:.3}ms, average {:.3}ms",
                counter,
                self.remote_address,
                sample,
                average
            );
        }

        self.statistics.pongs_accepted += 1;
        Ok(())
    }

    /// Applies the peer's MTU announcement.
    ///
    /// Out-of-range values are rejected. Accepted values only ever shrink
    /// `remote_mtu`; every shrink is pushed to the outbound senders, and every
    /// accepted announce is confirmed back to the peer.
    pub fn receive_mtu_announce(&mut self, message: &mut IncomingMessage) -> Result<()> {
        let mtu = message.read_u16()?;

        if !self.config.is_valid_mtu(mtu) {
            tracing::warn!(
                "Rejecting MTU {} announced by {}: outside [{}, {}]",
                mtu,
                self.remote_address,
                self.config.mtu_min,
                self.config.mtu_max
            );
            self.statistics.mtu_announces_rejected += 1;
            return Err(ErrorKind::InvalidMtu {
                mtu,
                min: self.config.mtu_min,
                max: self.config.mtu_max,
            });
        }

        if mtu < self.remote_mtu {
            tracing::debug!("Lowering MTU for {} from {} to {}", self.remote_address, self.remote_mtu, mtu);
            self.remote_mtu = mtu;
            for sender in &mut self.outbound {
                sender.set_mtu(mtu);
            }
        }

        self.enqueue_control(ControlMessage::MtuFinalized { finalized: true });
        Ok(())
    }

    /// Records whether the peer has finished MTU negotiation.
    pub fn receive_mtu_finalized(&mut self, message: &mut IncomingMessage) -> Result<()> {
        let finalized = message.read_bool()?;
        if finalized && !self.liveness.mtu_finalized {
            tracing::debug!("{} confirmed MTU {}", self.remote_address, self.config.mtu);
        }
        self.liveness.mtu_finalized = finalized;
        Ok(())
    }

    fn receive_disconnect(&mut self, message: &mut IncomingMessage) -> Result<()> {
        let reason = message.read_string()?;
        tracing::info!("{} disconnected: {}", self.remote_address, reason);
        self.status = ConnectionStatus::Disconnected;
        Ok(())
    }
}
