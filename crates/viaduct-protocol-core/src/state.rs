/// The state of a Minecraft protocol connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Handshaking,
    Status,
    Login,
    Play,
}

impl ConnectionState {
    pub fn from_handshake_next(next: i32) -> Option<Self> {
        match next {
            1 => Some(ConnectionState::Status),
            2 => Some(ConnectionState::Login),
            _ => None,
        }
    }
}

/// Which way a packet travels through the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client to server (serverbound).
    Inbound,
    /// Server to client (clientbound).
    Outbound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_next_state() {
        assert_eq!(
            ConnectionState::from_handshake_next(1),
            Some(ConnectionState::Status)
        );
        assert_eq!(
            ConnectionState::from_handshake_next(2),
            Some(ConnectionState::Login)
        );
        assert_eq!(ConnectionState::from_handshake_next(3), None);
    }
}
