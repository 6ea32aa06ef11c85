//! Recognized USB identities.
//!
//! The QuadCast S ships under two vendor IDs depending on the region it was
//! sold in. The DuoCast uses the same lighting protocol and is treated as a
//! companion unit.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kingston (North America) vendor ID
pub const VID_NA: u16 = 0x0951;
/// HP (Europe and later revisions) vendor ID
pub const VID_EU: u16 = 0x03f0;

pub const PID_NA1: u16 = 0x171f;
pub const PID_NA2: u16 = 0x0d84;
pub const PID_NA3: u16 = 0x02b5;
pub const PID_EU1: u16 = 0x0f8b;
pub const PID_EU2: u16 = 0x028c;
pub const PID_EU3: u16 = 0x048c;
pub const PID_EU4: u16 = 0x068c;
pub const PID_DUOCAST: u16 = 0x098c;

/// A USB (vendor ID, product ID) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceIdentity {
    #[must_use]
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self { vendor_id, product_id }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// Hardware family a recognized identity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    /// QuadCast S, any regional SKU
    Main,
    /// DuoCast
    Companion,
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str("main"),
            Self::Companion => f.write_str("companion"),
        }
    }
}

/// One row of the identity table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityEntry {
    pub identity: DeviceIdentity,
    pub role: DeviceRole,
    /// Human-readable model name
    pub model: String,
}

impl IdentityEntry {
    #[must_use]
    pub fn new(identity: DeviceIdentity, role: DeviceRole, model: impl Into<String>) -> Self {
        Self { identity, role, model: model.into() }
    }
}

/// Ordered table of recognized identities.
///
/// Order is significant: when several recognized devices are attached, the
/// one whose entry comes first in the table is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdentityTable {
    entries: Vec<IdentityEntry>,
}

impl IdentityTable {
    #[must_use]
    pub fn new(entries: Vec<IdentityEntry>) -> Self {
        Self { entries }
    }

    /// The identities of every known QuadCast S and DuoCast SKU.
    #[must_use]
    pub fn builtin() -> Self {
        let main = |vid, pid, model: &str| {
            IdentityEntry::new(DeviceIdentity::new(vid, pid), DeviceRole::Main, model)
        };

        Self::new(vec![
            main(VID_NA, PID_NA1, "QuadCast S"),
            main(VID_NA, PID_NA2, "QuadCast S"),
            main(VID_NA, PID_NA3, "QuadCast S"),
            main(VID_EU, PID_EU1, "QuadCast S"),
            main(VID_EU, PID_EU2, "QuadCast S"),
            main(VID_EU, PID_EU3, "QuadCast S"),
            main(VID_EU, PID_EU4, "QuadCast S"),
            IdentityEntry::new(
                DeviceIdentity::new(VID_EU, PID_DUOCAST),
                DeviceRole::Companion,
                "DuoCast",
            ),
        ])
    }

    /// Build a table from bare identities, all in the main role.
    #[must_use]
    pub fn from_identities(identities: &[DeviceIdentity]) -> Self {
        Self::new(
            identities
                .iter()
                .map(|id| IdentityEntry::new(*id, DeviceRole::Main, "QuadCast S"))
                .collect(),
        )
    }

    /// Append an entry unless its identity is already present.
    ///
    /// Returns `false` when the identity was a duplicate.
    pub fn push(&mut self, entry: IdentityEntry) -> bool {
        if self.contains(entry.identity) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Find the entry for an identity.
    #[must_use]
    pub fn find(&self, identity: DeviceIdentity) -> Option<&IdentityEntry> {
        self.entries.iter().find(|e| e.identity == identity)
    }

    #[must_use]
    pub fn contains(&self, identity: DeviceIdentity) -> bool {
        self.find(identity).is_some()
    }

    /// Entries in match order.
    pub fn iter(&self) -> impl Iterator<Item = &IdentityEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
