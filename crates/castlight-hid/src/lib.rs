//! Castlight HID - QuadCast S lighting over USB.
//!
//! This crate locates a supported microphone on the USB bus, claims its
//! control interfaces, and drives the packet/acknowledgment handshake that
//! commits a new lighting pattern.
//!
//! Hardware is reached through the [`usb`] traits. [`usb::RusbBus`] talks to
//! real devices through libusb; [`sim::SimBus`] is an in-memory stand-in.

pub use rusb;

pub mod error;
pub mod handle;
pub mod locator;
pub mod sim;
pub mod transport;
pub mod usb;

pub use error::{HidError, HidResult, LocatorError, TransferCause, TransportError};
pub use handle::DeviceHandle;
pub use locator::{BusHandle, CONTROL_INTERFACES, DetectedDevice, is_connected, open_device, scan_devices};
pub use transport::{
    CancelToken, Progress, SendOptions, SessionReport, Transport, TransportConfig, send_packets,
};
pub use usb::{RusbBus, UsbBus, UsbChannel, UsbDevice};

use castlight_core::{IdentityTable, PacketBuffer};

/// Locate and claim a microphone, send one packet buffer, and release it.
///
/// # Errors
/// Returns the locator or transport error that ended the run.
pub fn update_lights<B: UsbBus>(
    bus: &B,
    table: &IdentityTable,
    transport: &Transport,
    packets: &PacketBuffer,
    options: &SendOptions,
) -> HidResult<SessionReport> {
    let handle = open_device(bus, table)?;
    let report = transport.send(&handle, packets, packets.len(), options)?;
    Ok(report)
}
