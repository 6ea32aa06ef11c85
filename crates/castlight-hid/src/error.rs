//! HID error types.

use castlight_core::{AckMismatch, DeviceIdentity, PacketError, PacketRole, SessionError};
use thiserror::Error;

/// Errors raised while locating and claiming the microphone.
#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("Couldn't get the list of USB devices: {0}")]
    EnumerationFailed(#[source] rusb::Error),

    #[error("No supported microphone is connected")]
    NoDeviceFound,

    #[error("Another program is using the microphone ({identity}) already")]
    DeviceBusy { identity: DeviceIdentity },

    #[error("Couldn't open the microphone ({identity}): {source}")]
    OpenFailed {
        identity: DeviceIdentity,
        #[source]
        source: rusb::Error,
    },
}

/// Low-level reason a packet could not be exchanged.
#[derive(Debug, Error)]
pub enum TransferCause {
    #[error("{0}")]
    Usb(#[from] rusb::Error),

    #[error("only {written} of {expected} bytes written")]
    ShortWrite { written: usize, expected: usize },

    #[error("acknowledgment was {read} bytes, expected {expected}")]
    ShortAck { read: usize, expected: usize },
}

/// Errors raised while sending a packet buffer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid packet count {count} ({available} packets available)")]
    InvalidPacketCount { count: usize, available: usize },

    #[error("Couldn't transfer {role} packet {index}, the device might be busy: {cause}")]
    TransferFailed {
        index: usize,
        role: PacketRole,
        #[source]
        cause: TransferCause,
    },

    #[error("Header packet error: status {status:#04x}")]
    HeaderError { index: usize, status: u8 },

    #[error("Size packet error: status {status:#04x}")]
    SizePacketError { index: usize, status: u8 },

    #[error("Data packet {index} error: status {status:#04x}")]
    DataPacketError { index: usize, status: u8 },

    #[error("Footer packet error: status {status:#04x}")]
    FooterError { index: usize, status: u8 },

    #[error("Session cancelled before packet {index}")]
    Cancelled { index: usize },

    #[error("Protocol sequencing error: {0}")]
    Sequence(#[from] SessionError),
}

impl TransportError {
    /// Map an acknowledgment mismatch to the error for its packet role.
    #[must_use]
    pub fn rejected(index: usize, mismatch: AckMismatch) -> Self {
        let status = mismatch.status;
        match mismatch.role {
            PacketRole::Header => Self::HeaderError { index, status },
            PacketRole::Size => Self::SizePacketError { index, status },
            PacketRole::Data => Self::DataPacketError { index, status },
            PacketRole::Footer => Self::FooterError { index, status },
        }
    }

    /// Index of the packet the session stopped at, if any was involved.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::TransferFailed { index, .. }
            | Self::HeaderError { index, .. }
            | Self::SizePacketError { index, .. }
            | Self::DataPacketError { index, .. }
            | Self::FooterError { index, .. }
            | Self::Cancelled { index } => Some(*index),
            Self::InvalidPacketCount { .. } | Self::Sequence(_) => None,
        }
    }
}

/// Any error raised by this crate.
#[derive(Debug, Error)]
pub enum HidError {
    #[error(transparent)]
    Locator(#[from] LocatorError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Invalid packet data: {0}")]
    Packet(#[from] PacketError),
}

/// Result type for HID operations.
pub type HidResult<T> = Result<T, HidError>;
