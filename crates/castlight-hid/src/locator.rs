//! Microphone discovery and exclusive access.

use castlight_core::{DeviceIdentity, IdentityEntry, IdentityTable};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::LocatorError;
use crate::handle::DeviceHandle;
use crate::usb::{UsbBus, UsbDevice};

/// Interfaces that must be claimed before lighting packets are accepted.
pub const CONTROL_INTERFACES: [u8; 2] = [0, 1];

/// Handle type produced by [`open_device`] for a given bus.
pub type BusHandle<B> = DeviceHandle<<<B as UsbBus>::Device as UsbDevice>::Channel>;

/// A recognized microphone seen on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectedDevice {
    pub entry: IdentityEntry,
    pub bus_number: u8,
    pub address: u8,
}

/// Enumerate the bus and pair each readable device with its identity.
fn attached<B: UsbBus>(bus: &B) -> Result<Vec<(DeviceIdentity, B::Device)>, LocatorError> {
    let devices = bus.devices().map_err(LocatorError::EnumerationFailed)?;

    Ok(devices
        .into_iter()
        .filter_map(|device| match device.identity() {
            Ok(identity) => Some((identity, device)),
            Err(e) => {
                debug!(error = %e, "Skipping device with unreadable descriptor");
                None
            }
        })
        .collect())
}

/// Find the first recognized microphone and claim it.
///
/// The identity table is searched in order, so when several supported
/// devices are attached the one listed first in `table` wins.
///
/// # Errors
/// - `EnumerationFailed` if the bus cannot be listed
/// - `NoDeviceFound` if no table entry is attached
/// - `DeviceBusy` if another program holds the device
/// - `OpenFailed` if the device cannot be opened or claimed
pub fn open_device<B: UsbBus>(bus: &B, table: &IdentityTable) -> Result<BusHandle<B>, LocatorError> {
    let devices = attached(bus)?;
    debug!(count = devices.len(), "Enumerated USB devices");

    for entry in table.iter() {
        let Some((_, device)) = devices.iter().find(|(id, _)| *id == entry.identity) else {
            continue;
        };

        let identity = entry.identity;
        let (bus_number, address) = device.location();
        info!(%identity, model = %entry.model, role = %entry.role, bus_number, address, "Microphone found");

        let channel = device.open_channel().map_err(|e| match e {
            rusb::Error::Busy => LocatorError::DeviceBusy { identity },
            source => LocatorError::OpenFailed { identity, source },
        })?;

        return DeviceHandle::claim(channel, entry.clone(), (bus_number, address), &CONTROL_INTERFACES);
    }

    debug!(table_size = table.len(), "No recognized microphone attached");
    Err(LocatorError::NoDeviceFound)
}

/// List every attached device that appears in `table`, without opening any.
///
/// # Errors
/// Returns `EnumerationFailed` if the bus cannot be listed.
pub fn scan_devices<B: UsbBus>(bus: &B, table: &IdentityTable) -> Result<Vec<DetectedDevice>, LocatorError> {
    let devices = attached(bus)?;
    let mut found = Vec::new();

    for entry in table.iter() {
        for (_, device) in devices.iter().filter(|(id, _)| *id == entry.identity) {
            let (bus_number, address) = device.location();
            found.push(DetectedDevice { entry: entry.clone(), bus_number, address });
        }
    }

    Ok(found)
}

/// Check if a recognized microphone is currently connected.
#[must_use]
pub fn is_connected<B: UsbBus>(bus: &B, table: &IdentityTable) -> bool {
    scan_devices(bus, table).is_ok_and(|found| !found.is_empty())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use castlight_core::DeviceRole;

    use super::*;
    use crate::sim::{SimBus, SimDevice, SimEvent};

    fn table(ids: &[(u16, u16)]) -> IdentityTable {
        let ids: Vec<_> = ids.iter().map(|&(v, p)| DeviceIdentity::new(v, p)).collect();
        IdentityTable::from_identities(&ids)
    }

    #[test]
    fn test_table_order_wins_over_bus_order() {
        let first = SimDevice::new(DeviceIdentity::new(0x03f0, 0x0f8b));
        let second = SimDevice::new(DeviceIdentity::new(0x0951, 0x171f));
        let bus = SimBus::new(vec![first.clone(), second.clone()]);

        let handle = open_device(&bus, &table(&[(0x0951, 0x171f), (0x03f0, 0x0f8b)])).unwrap();

        assert_eq!(handle.identity(), DeviceIdentity::new(0x0951, 0x171f));
        assert!(second.is_claimed());
        assert!(!first.is_claimed());
    }

    #[test]
    fn test_first_present_entry_for_any_sizes() {
        for table_len in 1..6u16 {
            for present in 0..table_len {
                let ids: Vec<_> = (0..table_len).map(|p| (0x1000, p)).collect();
                // Noise devices plus every table entry from `present` onward
                let mut devices: Vec<_> =
                    (100..104).map(|p| SimDevice::new(DeviceIdentity::new(0x2000, p))).collect();
                devices.extend(
                    (present..table_len).rev().map(|p| SimDevice::new(DeviceIdentity::new(0x1000, p))),
                );
                let bus = SimBus::new(devices);

                let handle = open_device(&bus, &table(&ids)).unwrap();
                assert_eq!(handle.identity(), DeviceIdentity::new(0x1000, present));
            }
        }
    }

    #[test]
    fn test_no_device_found() {
        let bus = SimBus::new(vec![SimDevice::new(DeviceIdentity::new(0x046d, 0xc52b))]);
        assert_matches!(
            open_device(&bus, &IdentityTable::builtin()),
            Err(LocatorError::NoDeviceFound)
        );

        let empty = SimBus::new(Vec::new());
        assert_matches!(open_device(&empty, &IdentityTable::builtin()), Err(LocatorError::NoDeviceFound));
    }

    #[test]
    fn test_enumeration_failure() {
        let bus = SimBus::failing(rusb::Error::Io);
        assert_matches!(
            open_device(&bus, &IdentityTable::builtin()),
            Err(LocatorError::EnumerationFailed(rusb::Error::Io))
        );
    }

    #[test]
    fn test_unreadable_descriptor_skipped() {
        let broken = SimDevice::new(DeviceIdentity::new(0x0951, 0x171f)).unreadable();
        let good = SimDevice::new(DeviceIdentity::new(0x03f0, 0x0f8b));
        let bus = SimBus::new(vec![broken.clone(), good]);

        let handle = open_device(&bus, &IdentityTable::builtin()).unwrap();
        assert_eq!(handle.identity(), DeviceIdentity::new(0x03f0, 0x0f8b));
        assert!(!broken.is_claimed());
    }

    #[test]
    fn test_busy_device() {
        let device = SimDevice::new(DeviceIdentity::new(0x0951, 0x171f)).held_elsewhere();
        let bus = SimBus::new(vec![device.clone()]);

        assert_matches!(
            open_device(&bus, &IdentityTable::builtin()),
            Err(LocatorError::DeviceBusy { identity }) if identity == DeviceIdentity::new(0x0951, 0x171f)
        );
        assert!(!device.is_claimed());
    }

    #[test]
    fn test_second_open_is_busy() {
        let device = SimDevice::new(DeviceIdentity::new(0x03f0, 0x098c));
        let bus = SimBus::new(vec![device.clone()]);
        let table = IdentityTable::builtin();

        let handle = open_device(&bus, &table).unwrap();
        assert_eq!(handle.role(), DeviceRole::Companion);
        assert_matches!(open_device(&bus, &table), Err(LocatorError::DeviceBusy { .. }));

        drop(handle);
        assert!(!device.is_claimed());
        assert!(open_device(&bus, &table).is_ok());
    }

    #[test]
    fn test_open_failure() {
        let device = SimDevice::new(DeviceIdentity::new(0x0951, 0x171f)).fail_open(rusb::Error::Access);
        let bus = SimBus::new(vec![device]);

        assert_matches!(
            open_device(&bus, &IdentityTable::builtin()),
            Err(LocatorError::OpenFailed { source: rusb::Error::Access, .. })
        );
    }

    #[test]
    fn test_claim_failure_releases_partial_claims() {
        let device = SimDevice::new(DeviceIdentity::new(0x0951, 0x171f))
            .fail_claim(1, rusb::Error::NoDevice);
        let bus = SimBus::new(vec![device.clone()]);

        assert_matches!(
            open_device(&bus, &IdentityTable::builtin()),
            Err(LocatorError::OpenFailed { source: rusb::Error::NoDevice, .. })
        );
        assert!(!device.is_claimed());
    }

    #[test]
    fn test_handle_claims_control_interfaces() {
        let device = SimDevice::new(DeviceIdentity::new(0x0951, 0x171f)).at(3, 7);
        let bus = SimBus::new(vec![device]);

        let handle = open_device(&bus, &IdentityTable::builtin()).unwrap();
        assert_eq!(handle.claimed_interfaces(), &CONTROL_INTERFACES);
        assert_eq!(handle.location(), (3, 7));
        assert_eq!(handle.model(), "QuadCast S");
    }

    #[test]
    fn test_open_without_auto_detach() {
        let device = SimDevice::new(DeviceIdentity::new(0x0951, 0x171f)).no_auto_detach();
        let bus = SimBus::new(vec![device.clone()]);

        let handle = open_device(&bus, &IdentityTable::builtin()).unwrap();
        assert_eq!(handle.claimed_interfaces(), &CONTROL_INTERFACES);
        assert!(device.is_claimed());
    }

    #[test]
    fn test_explicit_release() {
        let device = SimDevice::new(DeviceIdentity::new(0x0951, 0x171f));
        let bus = SimBus::new(vec![device.clone()]);
        let table = IdentityTable::builtin();

        open_device(&bus, &table).unwrap().release();

        assert!(!device.is_claimed());
        assert_eq!(
            device.events(),
            vec![SimEvent::Claim(0), SimEvent::Claim(1), SimEvent::Release(0), SimEvent::Release(1)]
        );
        assert!(open_device(&bus, &table).is_ok());
    }

    #[test]
    fn test_scan_devices() {
        let bus = SimBus::new(vec![
            SimDevice::new(DeviceIdentity::new(0x03f0, 0x098c)).at(1, 4),
            SimDevice::new(DeviceIdentity::new(0x1d6b, 0x0002)),
            SimDevice::new(DeviceIdentity::new(0x0951, 0x171f)).at(1, 9),
        ]);
        let table = IdentityTable::builtin();

        let found = scan_devices(&bus, &table).unwrap();
        assert_eq!(found.len(), 2);
        // Reported in table order
        assert_eq!(found[0].entry.identity, DeviceIdentity::new(0x0951, 0x171f));
        assert_eq!((found[1].bus_number, found[1].address), (1, 4));

        assert!(is_connected(&bus, &table));
        assert!(!is_connected(&SimBus::failing(rusb::Error::Io), &table));
    }
}
