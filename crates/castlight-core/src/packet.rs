//! Packet buffers and packet roles.

use std::fmt;
use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::error::PacketError;

/// Size of every control-transfer packet, in bytes.
pub const PACKET_SIZE: usize = 64;
/// Largest number of packets a single session may carry.
pub const MAX_PACKETS: usize = 90;

/// One fixed-size control-transfer packet.
pub type Packet = [u8; PACKET_SIZE];

/// Protocol purpose of a packet within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketRole {
    Header,
    Size,
    Data,
    Footer,
}

impl PacketRole {
    /// Role of the packet at `index` in a session of `count` packets.
    ///
    /// The first packet is the header and the second the size packet. The
    /// last packet is the footer once there is room for one after them.
    #[must_use]
    pub fn classify(index: usize, count: usize) -> Self {
        match index {
            0 => Self::Header,
            1 => Self::Size,
            i if count >= 3 && i == count - 1 => Self::Footer,
            _ => Self::Data,
        }
    }
}

impl fmt::Display for PacketRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Header => "header",
            Self::Size => "size",
            Self::Data => "data",
            Self::Footer => "footer",
        };
        f.write_str(name)
    }
}

/// Ordered, immutable sequence of packets for one light update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketBuffer {
    packets: Vec<Packet>,
}

impl PacketBuffer {
    /// Wrap already-built packets.
    ///
    /// # Errors
    /// Returns an error if there are no packets or more than [`MAX_PACKETS`].
    pub fn from_packets(packets: Vec<Packet>) -> Result<Self, PacketError> {
        if packets.is_empty() {
            return Err(PacketError::Empty);
        }
        if packets.len() > MAX_PACKETS {
            return Err(PacketError::TooManyPackets { count: packets.len(), max: MAX_PACKETS });
        }
        Ok(Self { packets })
    }

    /// Split raw bytes into packets.
    ///
    /// # Errors
    /// Returns an error if `bytes` is not a whole number of packets or the
    /// packet count is out of range.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() % PACKET_SIZE != 0 {
            return Err(PacketError::UnalignedLength { len: bytes.len() });
        }

        let packets = bytes
            .chunks_exact(PACKET_SIZE)
            .map(|chunk| {
                let mut packet = [0u8; PACKET_SIZE];
                packet.copy_from_slice(chunk);
                packet
            })
            .collect();

        Self::from_packets(packets)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Always false for a constructed buffer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Packet> {
        self.packets.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Packet> {
        self.packets.iter()
    }
}

impl Index<usize> for PacketBuffer {
    type Output = Packet;

    fn index(&self, index: usize) -> &Packet {
        &self.packets[index]
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_classify_full_session() {
        let roles: Vec<_> = (0..5).map(|i| PacketRole::classify(i, 5)).collect();
        assert_eq!(
            roles,
            [
                PacketRole::Header,
                PacketRole::Size,
                PacketRole::Data,
                PacketRole::Data,
                PacketRole::Footer
            ]
        );
    }

    #[test]
    fn test_classify_short_sessions() {
        assert_eq!(PacketRole::classify(0, 1), PacketRole::Header);
        assert_eq!(PacketRole::classify(1, 2), PacketRole::Size);
        // Three packets leave no room for data
        assert_eq!(PacketRole::classify(2, 3), PacketRole::Footer);
        assert_eq!(PacketRole::classify(88, 90), PacketRole::Data);
        assert_eq!(PacketRole::classify(89, 90), PacketRole::Footer);
    }

    #[test]
    fn test_from_bytes_splits_in_order() {
        let mut bytes = vec![0u8; PACKET_SIZE * 3];
        bytes[0] = 0x04;
        bytes[PACKET_SIZE] = 0xaa;
        bytes[PACKET_SIZE * 2 + 63] = 0xff;

        let buffer = PacketBuffer::from_bytes(&bytes).expect("aligned buffer");
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer[0][0], 0x04);
        assert_eq!(buffer[1][0], 0xaa);
        assert_eq!(buffer[2][63], 0xff);
    }

    #[test]
    fn test_from_bytes_rejects_unaligned() {
        assert_matches!(
            PacketBuffer::from_bytes(&[0u8; 65]),
            Err(PacketError::UnalignedLength { len: 65 })
        );
        assert_matches!(PacketBuffer::from_bytes(&[]), Err(PacketError::Empty));
    }

    #[test]
    fn test_from_packets_limits() {
        assert!(PacketBuffer::from_packets(vec![[0u8; PACKET_SIZE]; MAX_PACKETS]).is_ok());
        assert_matches!(
            PacketBuffer::from_packets(vec![[0u8; PACKET_SIZE]; MAX_PACKETS + 1]),
            Err(PacketError::TooManyPackets { count: 91, max: 90 })
        );
    }
}
