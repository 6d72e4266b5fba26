//! Liveness and MTU-probe timers.
//!
//! All timer state lives in the [`LivenessState`] record and advances only
//! through [`tick`], a pure function of `(state, status, time, config)`. The
//! connection feeds it the caller's `Instant`, so tests drive it with
//! synthetic time instead of sleeping.
//!
//! Per tick:
//! 1. Any non-disconnected connection that has not seen a matching pong for
//!    `connection_timeout` times out. Nothing else happens on that tick.
//! 2. A connected connection sends a ping every `ping_interval`.
//! 3. A connected connection whose configured MTU differs from [`SAFE_MTU`]
//!    re-announces it every `mtu_resend_delay` until the peer finalizes.

use std::time::Instant;

use tether_core::{config::Config, constants::SAFE_MTU};
use tether_protocol::message::ControlMessage;

use crate::connection_status::ConnectionStatus;

/// Timers and counters driving pings and MTU probes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivenessState {
    /// Counter carried by the most recent ping
    pub ping_counter: u32,
    /// Counter of the most recent ping answered by a matching pong
    pub last_acknowledged_ping_counter: u32,
    /// When the most recent ping was sent
    pub last_ping_sent_at: Option<Instant>,
    /// When the most recent matching pong arrived (creation time until then)
    pub last_pong_received_at: Instant,
    /// When the most recent MTU announce was sent
    pub last_mtu_probe_sent_at: Option<Instant>,
    /// True once the peer confirmed no further MTU negotiation is needed
    pub mtu_finalized: bool,
}

impl LivenessState {
    /// Creates timers for a connection created at `time`.
    pub fn new(time: Instant) -> Self {
        Self {
            ping_counter: 0,
            last_acknowledged_ping_counter: 0,
            last_ping_sent_at: None,
            last_pong_received_at: time,
            last_mtu_probe_sent_at: None,
            mtu_finalized: false,
        }
    }
}

/// Result of one liveness tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The peer has been silent for longer than the connection timeout.
    TimedOut,
    /// Control messages to send this tick, possibly none.
    Send(Vec<ControlMessage>),
}

/// Advances the liveness timers to `time`.
pub fn tick(
    mut state: LivenessState,
    status: ConnectionStatus,
    time: Instant,
    config: &Config,
) -> (LivenessState, TickOutcome) {
    if status.is_alive()
        && time.saturating_duration_since(state.last_pong_received_at) >= config.connection_timeout
    {
        return (state, TickOutcome::TimedOut);
    }

    let mut outgoing = Vec::new();
    if !status.is_connected() {
        return (state, TickOutcome::Send(outgoing));
    }

    let ping_due = state
        .last_ping_sent_at
        .is_none_or(|sent| time.saturating_duration_since(sent) >= config.ping_interval);
    if ping_due {
        state.ping_counter = state.ping_counter.wrapping_add(1);
        state.last_ping_sent_at = Some(time);
        outgoing.push(ControlMessage::Ping { counter: state.ping_counter });
    }

    if config.mtu != SAFE_MTU && !state.mtu_finalized {
        let probe_due = state
            .last_mtu_probe_sent_at
            .is_none_or(|sent| time.saturating_duration_since(sent) >= config.mtu_resend_delay);
        if probe_due {
            state.last_mtu_probe_sent_at = Some(time);
            outgoing.push(ControlMessage::MtuAnnounce { mtu: config.mtu });
        }
    }

    (state, TickOutcome::Send(outgoing))
}
