//! Castlight Core - device identities, packet framing, and session state.
//!
//! This crate contains the protocol-level domain model shared between the
//! USB layer and the `castlight` binary. It performs no I/O.

pub mod ack;
pub mod error;
pub mod identity;
pub mod packet;
pub mod session;

pub use ack::{ACK_SIZE, AckFrame, AckMismatch, AckPolicy, ExpectedAck};
pub use error::{PacketError, SessionError};
pub use identity::{DeviceIdentity, DeviceRole, IdentityEntry, IdentityTable};
pub use packet::{MAX_PACKETS, PACKET_SIZE, Packet, PacketBuffer, PacketRole};
pub use session::{FailureKind, SessionState};
