//! Connection lifecycle state machine.

use std::fmt;

/// The lifecycle state of a client's single connection.
///
/// ```text
/// Disconnected → Connecting → Handshaking → Ready → Closed
///       │             │             │          │
///       └─────────────┴─────────────┴──────────┴──→ Errored
/// ```
///
/// - **Disconnected**: built, nothing opened yet.
/// - **Connecting**: the transport is being opened.
/// - **Handshaking**: transport open; identifying the bot and registering
///   the mandatory subscriptions. Only the handshake itself may call.
/// - **Ready**: application calls and push delivery both operate.
/// - **Closed** (final): closed on purpose or by the peer.
/// - **Errored** (final): transport failure or failed handshake.
///
/// `Closed` and `Errored` are reachable from every non-final state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Handshaking,
    Ready,
    Closed,
    Errored,
}

impl ConnectionState {
    /// Returns `true` for states the connection never leaves.
    pub fn is_final(self) -> bool {
        matches!(self, Self::Closed | Self::Errored)
    }

    /// Returns `true` if application calls are accepted.
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns `true` if transitioning to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        if self.is_final() {
            return false;
        }
        match target {
            Self::Closed | Self::Errored => true,
            Self::Connecting => self == Self::Disconnected,
            Self::Handshaking => self == Self::Connecting,
            Self::Ready => self == Self::Handshaking,
            Self::Disconnected => false,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Handshaking => write!(f, "Handshaking"),
            Self::Ready => write!(f, "Ready"),
            Self::Closed => write!(f, "Closed"),
            Self::Errored => write!(f, "Errored"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::ConnectionState::*;

    const ALL: [ConnectionState; 6] = [Disconnected, Connecting, Handshaking, Ready, Closed, Errored];

    #[test]
    fn test_forward_path() {
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Handshaking));
        assert!(Handshaking.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Closed));
    }

    #[test]
    fn test_no_skipping_states() {
        assert!(!Disconnected.can_transition_to(Handshaking));
        assert!(!Disconnected.can_transition_to(Ready));
        assert!(!Connecting.can_transition_to(Ready));
        assert!(!Ready.can_transition_to(Handshaking));
        assert!(!Ready.can_transition_to(Disconnected));
    }

    #[test]
    fn test_errored_reachable_from_every_non_final_state() {
        for state in ALL {
            assert_eq!(state.can_transition_to(Errored), !state.is_final(), "{state}");
        }
    }

    #[test]
    fn test_final_states_absorb() {
        for target in ALL {
            assert!(!Closed.can_transition_to(target));
            assert!(!Errored.can_transition_to(target));
        }
    }

    #[test]
    fn test_only_ready_is_ready() {
        for state in ALL {
            assert_eq!(state.is_ready(), state == Ready);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Handshaking.to_string(), "Handshaking");
        assert_eq!(Errored.to_string(), "Errored");
    }
}
