//! Acknowledgment frames read back after each packet.

use serde::{Deserialize, Serialize};

use crate::packet::{Packet, PacketRole};

/// Length of an acknowledgment frame, in bytes.
pub const ACK_SIZE: usize = 8;

/// Raw 8-byte acknowledgment read from the interrupt endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckFrame([u8; ACK_SIZE]);

impl AckFrame {
    #[must_use]
    pub const fn new(bytes: [u8; ACK_SIZE]) -> Self {
        Self(bytes)
    }

    /// Status byte reported by the device.
    #[must_use]
    pub const fn status(&self) -> u8 {
        self.0[0]
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ACK_SIZE] {
        &self.0
    }
}

/// What a successful acknowledgment looks like for one packet role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedAck {
    /// Status equals the first byte of the packet just sent
    #[default]
    Echo,
    /// Status equals a fixed code
    Code(u8),
}

impl ExpectedAck {
    fn expected_status(self, sent: &Packet) -> u8 {
        match self {
            Self::Echo => sent[0],
            Self::Code(code) => code,
        }
    }
}

/// An acknowledgment that did not carry the expected status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckMismatch {
    pub role: PacketRole,
    pub expected: u8,
    pub status: u8,
}

/// Per-role acknowledgment expectations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AckPolicy {
    #[serde(default)]
    pub header: ExpectedAck,
    #[serde(default)]
    pub size: ExpectedAck,
    #[serde(default)]
    pub data: ExpectedAck,
    #[serde(default)]
    pub footer: ExpectedAck,
}

impl AckPolicy {
    #[must_use]
    pub fn expectation(&self, role: PacketRole) -> ExpectedAck {
        match role {
            PacketRole::Header => self.header,
            PacketRole::Size => self.size,
            PacketRole::Data => self.data,
            PacketRole::Footer => self.footer,
        }
    }

    /// Validate the acknowledgment for a packet of the given role.
    ///
    /// # Errors
    /// Returns the mismatch when the status is not the expected one.
    pub fn check(&self, role: PacketRole, sent: &Packet, frame: &AckFrame) -> Result<(), AckMismatch> {
        let expected = self.expectation(role).expected_status(sent);
        if frame.status() == expected {
            Ok(())
        } else {
            Err(AckMismatch { role, expected, status: frame.status() })
        }
    }
}
