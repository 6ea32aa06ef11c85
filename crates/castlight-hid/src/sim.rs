//! In-memory simulated USB bus.
//!
//! A simulated microphone acknowledges every packet by echoing its first
//! byte, which is what the default acknowledgment policy expects. Individual
//! transfers can be scripted to fail or to be rejected, and every exchange
//! is recorded so callers can inspect exactly what went over the wire.
//!
//! Transfers are numbered from 0 in the order the control transfers were
//! issued over the device's lifetime; the acknowledgment for transfer `n`
//! is the interrupt read that follows it.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use castlight_core::{ACK_SIZE, DeviceIdentity};
use parking_lot::Mutex;

use crate::usb::{UsbBus, UsbChannel, UsbDevice};

/// One recorded exchange with a simulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    Claim(u8),
    Release(u8),
    Control { request_type: u8, request: u8, value: u16, index: u16, data: Vec<u8> },
    Interrupt { endpoint: u8 },
}

#[derive(Debug, Default)]
struct SimState {
    unreadable: bool,
    held_elsewhere: bool,
    no_auto_detach: bool,
    open_error: Option<rusb::Error>,
    claim_errors: HashMap<u8, rusb::Error>,
    claimed: BTreeSet<u8>,
    events: Vec<SimEvent>,
    controls: usize,
    /// Transfer number and first byte of the packet awaiting acknowledgment
    pending: Option<(usize, u8)>,
    control_errors: HashMap<usize, rusb::Error>,
    control_len: HashMap<usize, usize>,
    ack_errors: HashMap<usize, rusb::Error>,
    ack_status: HashMap<usize, u8>,
    ack_len: HashMap<usize, usize>,
}

/// A simulated bus holding a fixed set of devices.
#[derive(Debug, Clone, Default)]
pub struct SimBus {
    devices: Vec<SimDevice>,
    error: Option<rusb::Error>,
}

impl SimBus {
    #[must_use]
    pub fn new(devices: Vec<SimDevice>) -> Self {
        Self { devices, error: None }
    }

    /// A bus whose enumeration always fails.
    #[must_use]
    pub fn failing(error: rusb::Error) -> Self {
        Self { devices: Vec::new(), error: Some(error) }
    }
}

impl UsbBus for SimBus {
    type Device = SimDevice;

    fn devices(&self) -> rusb::Result<Vec<SimDevice>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.devices.clone()),
        }
    }
}

/// A simulated microphone. Clones share the same device state.
#[derive(Debug, Clone)]
pub struct SimDevice {
    identity: DeviceIdentity,
    location: (u8, u8),
    state: Arc<Mutex<SimState>>,
}

impl SimDevice {
    #[must_use]
    pub fn new(identity: DeviceIdentity) -> Self {
        Self { identity, location: (1, 1), state: Arc::default() }
    }

    /// Place the device at a bus number and address.
    #[must_use]
    pub fn at(mut self, bus_number: u8, address: u8) -> Self {
        self.location = (bus_number, address);
        self
    }

    /// Make the device descriptor unreadable.
    #[must_use]
    pub fn unreadable(self) -> Self {
        self.state.lock().unreadable = true;
        self
    }

    /// Pretend another program already claimed the device.
    #[must_use]
    pub fn held_elsewhere(self) -> Self {
        self.state.lock().held_elsewhere = true;
        self
    }

    /// Refuse kernel driver auto-detach, as on platforms without it.
    #[must_use]
    pub fn no_auto_detach(self) -> Self {
        self.state.lock().no_auto_detach = true;
        self
    }

    /// Fail every attempt to open the device.
    #[must_use]
    pub fn fail_open(self, error: rusb::Error) -> Self {
        self.state.lock().open_error = Some(error);
        self
    }

    /// Fail claiming one interface.
    #[must_use]
    pub fn fail_claim(self, interface: u8, error: rusb::Error) -> Self {
        self.state.lock().claim_errors.insert(interface, error);
        self
    }

    /// Fail control transfer number `transfer`.
    #[must_use]
    pub fn fail_transfer(self, transfer: usize, error: rusb::Error) -> Self {
        self.state.lock().control_errors.insert(transfer, error);
        self
    }

    /// Accept only `len` bytes of control transfer number `transfer`.
    ///
    /// A truncated packet is never acknowledged.
    #[must_use]
    pub fn short_write(self, transfer: usize, len: usize) -> Self {
        self.state.lock().control_len.insert(transfer, len);
        self
    }

    /// Fail the acknowledgment read for transfer number `transfer`.
    #[must_use]
    pub fn fail_ack(self, transfer: usize, error: rusb::Error) -> Self {
        self.state.lock().ack_errors.insert(transfer, error);
        self
    }

    /// Answer transfer number `transfer` with a fixed status byte.
    #[must_use]
    pub fn ack_status(self, transfer: usize, status: u8) -> Self {
        self.state.lock().ack_status.insert(transfer, status);
        self
    }

    /// Truncate the acknowledgment for transfer number `transfer`.
    #[must_use]
    pub fn truncate_ack(self, transfer: usize, len: usize) -> Self {
        self.state.lock().ack_len.insert(transfer, len.min(ACK_SIZE));
        self
    }

    /// Whether any interface is claimed by us.
    #[must_use]
    pub fn is_claimed(&self) -> bool {
        !self.state.lock().claimed.is_empty()
    }

    /// Every exchange recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<SimEvent> {
        self.state.lock().events.clone()
    }

    /// Payloads of every control transfer, in order.
    #[must_use]
    pub fn sent_packets(&self) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                SimEvent::Control { data, .. } => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn control_count(&self) -> usize {
        self.count(|e| matches!(e, SimEvent::Control { .. }))
    }

    #[must_use]
    pub fn interrupt_count(&self) -> usize {
        self.count(|e| matches!(e, SimEvent::Interrupt { .. }))
    }

    fn count(&self, f: impl Fn(&SimEvent) -> bool) -> usize {
        self.state.lock().events.iter().filter(|e| f(e)).count()
    }
}

impl UsbDevice for SimDevice {
    type Channel = SimChannel;

    fn identity(&self) -> rusb::Result<DeviceIdentity> {
        if self.state.lock().unreadable {
            return Err(rusb::Error::Io);
        }
        Ok(self.identity)
    }

    fn location(&self) -> (u8, u8) {
        self.location
    }

    fn open_channel(&self) -> rusb::Result<SimChannel> {
        if let Some(e) = self.state.lock().open_error {
            return Err(e);
        }
        Ok(SimChannel { state: Arc::clone(&self.state) })
    }
}

/// Open channel to a [`SimDevice`].
#[derive(Debug)]
pub struct SimChannel {
    state: Arc<Mutex<SimState>>,
}

impl UsbChannel for SimChannel {
    fn enable_auto_detach(&mut self) -> rusb::Result<()> {
        if self.state.lock().no_auto_detach {
            return Err(rusb::Error::NotSupported);
        }
        Ok(())
    }

    fn claim(&mut self, interface: u8) -> rusb::Result<()> {
        let mut state = self.state.lock();
        if let Some(&e) = state.claim_errors.get(&interface) {
            return Err(e);
        }
        if state.held_elsewhere || state.claimed.contains(&interface) {
            return Err(rusb::Error::Busy);
        }
        state.claimed.insert(interface);
        state.events.push(SimEvent::Claim(interface));
        Ok(())
    }

    fn release(&mut self, interface: u8) -> rusb::Result<()> {
        let mut state = self.state.lock();
        if !state.claimed.remove(&interface) {
            return Err(rusb::Error::NotFound);
        }
        state.events.push(SimEvent::Release(interface));
        Ok(())
    }

    fn control_out(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        _timeout: Duration,
    ) -> rusb::Result<usize> {
        let mut state = self.state.lock();
        let transfer = state.controls;
        state.controls += 1;
        state.events.push(SimEvent::Control { request_type, request, value, index, data: data.to_vec() });

        if let Some(&e) = state.control_errors.get(&transfer) {
            state.pending = None;
            return Err(e);
        }
        if let Some(&len) = state.control_len.get(&transfer) {
            let written = len.min(data.len());
            if written < data.len() {
                state.pending = None;
                return Ok(written);
            }
        }
        state.pending = Some((transfer, data.first().copied().unwrap_or_default()));
        Ok(data.len())
    }

    fn interrupt_in(&self, endpoint: u8, buf: &mut [u8], _timeout: Duration) -> rusb::Result<usize> {
        let mut state = self.state.lock();
        state.events.push(SimEvent::Interrupt { endpoint });

        // Nothing to acknowledge, the real device would stay silent
        let Some((transfer, echo)) = state.pending.take() else {
            return Err(rusb::Error::Timeout);
        };
        if let Some(&e) = state.ack_errors.get(&transfer) {
            return Err(e);
        }

        let mut frame = [0u8; ACK_SIZE];
        frame[0] = state.ack_status.get(&transfer).copied().unwrap_or(echo);
        let len = state.ack_len.get(&transfer).copied().unwrap_or(ACK_SIZE).min(buf.len());
        buf[..len].copy_from_slice(&frame[..len]);
        Ok(len)
    }
}
