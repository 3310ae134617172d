// MIT License - Copyright (c) 2026 Peter Wright
// TPI session transport

pub mod command;
pub mod direct;
pub mod reply;

use std::fmt;

use tokio::sync::watch;
use tracing::info;

use crate::protocol::Packet;

/// Lifecycle of a TPI session.
///
/// `Connecting -> LoggingIn -> Ready -> Closing -> Closed`. `Failed` is
/// reached when connecting or logging in does not succeed. A session never
/// goes back from `Ready` to `LoggingIn`; a lost transport ends in `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    LoggingIn,
    Ready,
    Closing,
    Closed,
    Failed,
}

impl ConnectionState {
    /// No further transitions happen from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::LoggingIn => "logging in",
            Self::Ready => "ready",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of offering an unsolicited packet to a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    Unrecognized,
}

/// Callback for packets that are neither acknowledgements nor flow replies.
///
/// The receive loop calls [`UnsolicitedHandler::handle`] for every such
/// packet, in arrival order. Implementations must not block: hand the packet
/// off to another task and return.
pub trait UnsolicitedHandler: Send + Sync + 'static {
    fn handle(&self, packet: &Packet) -> Dispatch;
}

/// Handler that recognizes nothing.
pub struct NullHandler;

impl UnsolicitedHandler for NullHandler {
    fn handle(&self, _packet: &Packet) -> Dispatch {
        Dispatch::Unrecognized
    }
}

impl<F> UnsolicitedHandler for F
where
    F: Fn(&Packet) -> Dispatch + Send + Sync + 'static,
{
    fn handle(&self, packet: &Packet) -> Dispatch {
        self(packet)
    }
}

/// Move to `next`, logging the transition. Terminal states are final.
pub(crate) fn transition(state: &watch::Sender<ConnectionState>, next: ConnectionState) -> bool {
    state.send_if_modified(|current| {
        if current.is_terminal() || *current == next {
            return false;
        }
        info!("Connection {} -> {}", current, next);
        *current = next;
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_stops_at_terminal() {
        let (tx, rx) = watch::channel(ConnectionState::Connecting);
        assert!(transition(&tx, ConnectionState::LoggingIn));
        assert!(transition(&tx, ConnectionState::Ready));
        assert!(!transition(&tx, ConnectionState::Ready));
        assert!(transition(&tx, ConnectionState::Closed));
        assert!(!transition(&tx, ConnectionState::Ready));
        assert_eq!(*rx.borrow(), ConnectionState::Closed);
    }

    #[test]
    fn test_closure_handler() {
        let handler = |p: &Packet| {
            if p.code() == 609 {
                Dispatch::Handled
            } else {
                Dispatch::Unrecognized
            }
        };
        assert_eq!(handler.handle(&Packet::new(609, "001").unwrap()), Dispatch::Handled);
        assert_eq!(handler.handle(&Packet::new(999, "").unwrap()), Dispatch::Unrecognized);
        assert_eq!(NullHandler.handle(&Packet::new(609, "001").unwrap()), Dispatch::Unrecognized);
    }
}
