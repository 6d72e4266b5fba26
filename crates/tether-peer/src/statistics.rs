//! Connection statistics tracking.
//!
//! Counters for traffic volume and for the anomalies the connection core
//! drops and logs instead of failing on.

/// Counters for one connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStatistics {
    /// Messages handed to outbound senders
    pub messages_sent: u64,
    /// Complete messages delivered by inbound channels
    pub messages_received: u64,
    /// Payload bytes handed to outbound senders
    pub bytes_sent: u64,
    /// Payload bytes of delivered messages
    pub bytes_received: u64,
    /// Fragment envelopes accepted by inbound channels
    pub fragments_received: u64,
    /// Fragment groups reassembled into messages
    pub groups_reassembled: u64,
    /// Incomplete fragment groups discarded by the expiry policy
    pub groups_evicted: u64,
    /// Envelopes dropped because their headers could not be parsed
    pub malformed_envelopes: u64,
    /// Pongs matching the most recent ping
    pub pongs_accepted: u64,
    /// Pongs discarded as late or unknown
    pub pongs_rejected: u64,
    /// MTU announcements rejected as out of range
    pub mtu_announces_rejected: u64,
}

impl ConnectionStatistics {
    /// Returns the share of received pongs that were rejected.
    pub fn pong_rejection_rate(&self) -> f32 {
        let total = self.pongs_accepted + self.pongs_rejected;
        if total == 0 {
            return 0.0;
        }
        self.pongs_rejected as f32 / total as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_initialized_to_zero() {
        let stats = ConnectionStatistics::default();
        assert_eq!(stats.messages_sent, 0);
        assert_eq!(stats.groups_evicted, 0);
        assert_eq!(stats.pong_rejection_rate(), 0.0);
    }

    #[test]
    fn test_pong_rejection_rate() {
        let stats =
            ConnectionStatistics { pongs_accepted: 3, pongs_rejected: 1, ..Default::default() };
        assert!((stats.pong_rejection_rate() - 0.25).abs() < 0.001);
    }
}
