/// Connection lifecycle state.
///
/// Connecting → Connected is driven by the session layer; Disconnected is
/// reached by explicit disconnect, a peer notice or a liveness timeout, and is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Created, handshake still in progress upstream
    #[default]
    Connecting,

    /// Session established, pings and MTU probes are sent
    Connected,

    /// Torn down; no further transitions
    Disconnected,
}

impl ConnectionStatus {
    /// Returns true while the liveness timeout applies.
    pub fn is_alive(&self) -> bool {
        !matches!(self, ConnectionStatus::Disconnected)
    }

    /// Returns true if the connection is fully established.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    /// Returns true once the connection is torn down.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, ConnectionStatus::Disconnected)
    }
}
