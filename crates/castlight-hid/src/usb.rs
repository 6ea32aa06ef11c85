//! USB access seam.
//!
//! The locator and the transport only talk to the bus through these traits,
//! so the same code drives real hardware through rusb and the in-memory
//! simulator in [`crate::sim`].

use std::time::Duration;

use castlight_core::DeviceIdentity;
use rusb::UsbContext;

/// Something that can list attached USB devices.
pub trait UsbBus {
    type Device: UsbDevice;

    /// List every device currently attached.
    ///
    /// # Errors
    /// Returns an error if the host USB subsystem cannot be queried.
    fn devices(&self) -> rusb::Result<Vec<Self::Device>>;
}

/// An attached, not yet opened, USB device.
pub trait UsbDevice {
    type Channel: UsbChannel;

    /// Vendor and product ID from the device descriptor.
    ///
    /// # Errors
    /// Returns an error if the descriptor cannot be read.
    fn identity(&self) -> rusb::Result<DeviceIdentity>;

    /// Bus number and device address.
    fn location(&self) -> (u8, u8);

    /// Open a communication channel to the device.
    ///
    /// # Errors
    /// Returns an error if the device cannot be opened.
    fn open_channel(&self) -> rusb::Result<Self::Channel>;
}

/// An open channel to a device.
pub trait UsbChannel {
    /// Let the host detach kernel drivers when interfaces are claimed.
    ///
    /// # Errors
    /// Returns `NotSupported` on platforms without kernel driver detaching.
    fn enable_auto_detach(&mut self) -> rusb::Result<()>;

    /// Claim an interface for exclusive use.
    ///
    /// # Errors
    /// Returns `Busy` if another program holds the interface.
    fn claim(&mut self, interface: u8) -> rusb::Result<()>;

    /// Release a previously claimed interface.
    ///
    /// # Errors
    /// Returns an error if the interface was not claimed or the device is gone.
    fn release(&mut self, interface: u8) -> rusb::Result<()>;

    /// Blocking host-to-device control transfer. Returns the bytes written.
    ///
    /// # Errors
    /// Returns an error on timeout or transfer failure.
    fn control_out(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> rusb::Result<usize>;

    /// Blocking interrupt read. Returns the bytes read.
    ///
    /// # Errors
    /// Returns an error on timeout or transfer failure.
    fn interrupt_in(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize>;
}

/// The host USB bus, through libusb.
pub struct RusbBus<T: UsbContext = rusb::Context> {
    context: T,
}

impl RusbBus<rusb::Context> {
    /// Initialise a libusb context.
    ///
    /// # Errors
    /// Returns an error if libusb cannot be initialised.
    pub fn new() -> rusb::Result<Self> {
        Ok(Self { context: rusb::Context::new()? })
    }
}

impl<T: UsbContext> UsbBus for RusbBus<T> {
    type Device = rusb::Device<T>;

    fn devices(&self) -> rusb::Result<Vec<Self::Device>> {
        Ok(self.context.devices()?.iter().collect())
    }
}

impl<T: UsbContext> UsbDevice for rusb::Device<T> {
    type Channel = rusb::DeviceHandle<T>;

    fn identity(&self) -> rusb::Result<DeviceIdentity> {
        let desc = self.device_descriptor()?;
        Ok(DeviceIdentity::new(desc.vendor_id(), desc.product_id()))
    }

    fn location(&self) -> (u8, u8) {
        (self.bus_number(), self.address())
    }

    fn open_channel(&self) -> rusb::Result<Self::Channel> {
        self.open()
    }
}

impl<T: UsbContext> UsbChannel for rusb::DeviceHandle<T> {
    fn enable_auto_detach(&mut self) -> rusb::Result<()> {
        self.set_auto_detach_kernel_driver(true)
    }

    fn claim(&mut self, interface: u8) -> rusb::Result<()> {
        self.claim_interface(interface)
    }

    fn release(&mut self, interface: u8) -> rusb::Result<()> {
        self.release_interface(interface)
    }

    fn control_out(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        self.write_control(request_type, request, value, index, data, timeout)
    }

    fn interrupt_in(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        self.read_interrupt(endpoint, buf, timeout)
    }
}
