//! Error types for Castlight core.

use thiserror::Error;

use crate::packet::PacketRole;
use crate::session::SessionState;

/// Errors raised while building a packet buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("Packet buffer is empty")]
    Empty,

    #[error("Too many packets: {count} (at most {max} supported)")]
    TooManyPackets { count: usize, max: usize },

    #[error("Packet data length {len} is not a multiple of the packet size")]
    UnalignedLength { len: usize },
}

/// Errors raised by the session state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Cannot accept a {role} packet in state {state:?}")]
    InvalidTransition { state: SessionState, role: PacketRole },

    #[error("Session has not sent any packet yet")]
    NotStarted,

    #[error("Session already finished in state {0:?}")]
    Finished(SessionState),
}
