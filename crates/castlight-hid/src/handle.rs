//! Exclusively claimed device handle.

use castlight_core::{DeviceIdentity, DeviceRole, IdentityEntry};
use tracing::{debug, warn};

use crate::error::LocatorError;
use crate::usb::UsbChannel;

/// An open channel to a recognized microphone with its control interfaces
/// claimed.
///
/// Claimed interfaces are released when the handle is dropped, whichever
/// way the owning code exits.
#[derive(Debug)]
pub struct DeviceHandle<C: UsbChannel> {
    channel: C,
    entry: IdentityEntry,
    location: (u8, u8),
    claimed: Vec<u8>,
}

impl<C: UsbChannel> DeviceHandle<C> {
    /// Claim `interfaces` on an opened channel.
    ///
    /// On failure every interface claimed so far is released again.
    pub(crate) fn claim(
        mut channel: C,
        entry: IdentityEntry,
        location: (u8, u8),
        interfaces: &[u8],
    ) -> Result<Self, LocatorError> {
        // Not every platform can detach kernel drivers
        if let Err(e) = channel.enable_auto_detach() {
            debug!(error = %e, "Kernel driver auto-detach unavailable");
        }

        let identity = entry.identity;
        let mut handle = Self { channel, entry, location, claimed: Vec::with_capacity(interfaces.len()) };

        for &interface in interfaces {
            handle.channel.claim(interface).map_err(|e| {
                warn!(%identity, interface, error = %e, "Failed to claim interface");
                match e {
                    rusb::Error::Busy => LocatorError::DeviceBusy { identity },
                    source => LocatorError::OpenFailed { identity, source },
                }
            })?;
            debug!(%identity, interface, "Claimed interface");
            handle.claimed.push(interface);
        }

        Ok(handle)
    }

    pub(crate) fn channel(&self) -> &C {
        &self.channel
    }

    #[must_use]
    pub fn identity(&self) -> DeviceIdentity {
        self.entry.identity
    }

    #[must_use]
    pub fn role(&self) -> DeviceRole {
        self.entry.role
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.entry.model
    }

    /// Bus number and device address.
    #[must_use]
    pub fn location(&self) -> (u8, u8) {
        self.location
    }

    /// Interfaces currently held.
    #[must_use]
    pub fn claimed_interfaces(&self) -> &[u8] {
        &self.claimed
    }

    /// Release the device now instead of at end of scope.
    pub fn release(self) {
        drop(self);
    }

    fn release_claims(&mut self) {
        for interface in self.claimed.drain(..) {
            match self.channel.release(interface) {
                Ok(()) => debug!(identity = %self.entry.identity, interface, "Released interface"),
                Err(e) => {
                    warn!(identity = %self.entry.identity, interface, error = %e, "Failed to release interface");
                }
            }
        }
    }
}

impl<C: UsbChannel> Drop for DeviceHandle<C> {
    fn drop(&mut self) {
        self.release_claims();
    }
}
