//! Lighting packet transport.
//!
//! Each packet goes out as a HID SET_REPORT control transfer and is answered
//! by an 8-byte acknowledgment on the interrupt IN endpoint. The next packet
//! is only sent once the previous acknowledgment has been read and checked.
//! There is no way to resume a sequence mid-way, so any failure ends the
//! session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use castlight_core::{
    ACK_SIZE, AckFrame, AckPolicy, FailureKind, PACKET_SIZE, Packet, PacketBuffer, PacketRole,
    SessionState,
};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::error::{TransferCause, TransportError};
use crate::handle::DeviceHandle;
use crate::usb::UsbChannel;

/// Host-to-device, class request, interface recipient
pub const REQUEST_TYPE_OUT: u8 = 0x21;
/// HID SET_REPORT
pub const REQUEST_SET_REPORT: u8 = 0x09;
/// Output report, ID 0
pub const REPORT_VALUE: u16 = 0x0300;
pub const REPORT_INDEX: u16 = 0x0000;
/// Interrupt IN endpoint carrying acknowledgments
pub const ACK_ENDPOINT: u8 = 0x82;
/// Per-transfer timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Transport settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Timeout applied to each control transfer and each acknowledgment read
    pub timeout: Duration,
    pub ack_policy: AckPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { timeout: DEFAULT_TIMEOUT, ack_policy: AckPolicy::default() }
    }
}

/// Shared flag asking a running session to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-send options.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Report progress after every acknowledged packet
    pub verbose: bool,
    /// Checked before each packet
    pub cancel: Option<CancelToken>,
}

/// Progress notification for one acknowledged packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub index: usize,
    pub total: usize,
    pub role: PacketRole,
}

/// Outcome of a successful session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub packets_sent: usize,
    pub data_packets: usize,
    pub elapsed: Duration,
    pub state: SessionState,
}

/// Sends packet buffers to a claimed microphone.
#[derive(Debug, Clone, Default)]
pub struct Transport {
    config: TransportConfig,
}

impl Transport {
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    /// Send the first `packet_count` packets of `packets`.
    ///
    /// # Errors
    /// See [`Transport::send_with_progress`].
    pub fn send<C: UsbChannel>(
        &self,
        handle: &DeviceHandle<C>,
        packets: &PacketBuffer,
        packet_count: usize,
        options: &SendOptions,
    ) -> Result<SessionReport, TransportError> {
        self.send_with_progress(handle, packets, packet_count, options, |_| {})
    }

    /// Send the first `packet_count` packets of `packets`, calling
    /// `on_progress` after each acknowledged packet when `options.verbose`
    /// is set.
    ///
    /// # Errors
    /// - `InvalidPacketCount` if `packet_count` is zero or exceeds the buffer
    /// - `TransferFailed` if a transfer times out, fails or is truncated
    /// - a role-specific error if the device rejects a packet
    /// - `Cancelled` if the cancel token was set before a packet
    ///
    /// No packet is sent after the first failure.
    pub fn send_with_progress<C, F>(
        &self,
        handle: &DeviceHandle<C>,
        packets: &PacketBuffer,
        packet_count: usize,
        options: &SendOptions,
        mut on_progress: F,
    ) -> Result<SessionReport, TransportError>
    where
        C: UsbChannel,
        F: FnMut(Progress),
    {
        if packet_count == 0 || packet_count > packets.len() {
            return Err(TransportError::InvalidPacketCount {
                count: packet_count,
                available: packets.len(),
            });
        }

        let started = Instant::now();
        let mut state = SessionState::default();
        debug!(identity = %handle.identity(), packet_count, "Starting lighting session");

        for (index, packet) in packets.iter().take(packet_count).enumerate() {
            let role = PacketRole::classify(index, packet_count);

            let result = self.exchange(handle.channel(), index, role, packet, options);
            if let Err(e) = result {
                state.fail(failure_kind(&e, role));
                warn!(index, %role, error = %e, ?state, "Lighting session aborted");
                return Err(e);
            }
            state.advance(role)?;

            let progress = Progress { index, total: packet_count, role };
            if options.verbose {
                info!(packet = index + 1, total = packet_count, %role, "Packet acknowledged");
                on_progress(progress);
            } else {
                trace!(index, %role, "Packet acknowledged");
            }
        }

        state.complete()?;
        let report = SessionReport {
            packets_sent: packet_count,
            data_packets: packet_count.saturating_sub(3),
            elapsed: started.elapsed(),
            state,
        };
        debug!(packets = report.packets_sent, elapsed_ms = report.elapsed.as_millis(), "Lighting session complete");
        Ok(report)
    }

    /// Send one packet and validate its acknowledgment.
    fn exchange<C: UsbChannel>(
        &self,
        channel: &C,
        index: usize,
        role: PacketRole,
        packet: &Packet,
        options: &SendOptions,
    ) -> Result<(), TransportError> {
        if options.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(TransportError::Cancelled { index });
        }

        let failed = |cause: TransferCause| TransportError::TransferFailed { index, role, cause };
        let timeout = self.config.timeout;

        let written = channel
            .control_out(REQUEST_TYPE_OUT, REQUEST_SET_REPORT, REPORT_VALUE, REPORT_INDEX, packet, timeout)
            .map_err(|e| failed(e.into()))?;
        if written != PACKET_SIZE {
            return Err(failed(TransferCause::ShortWrite { written, expected: PACKET_SIZE }));
        }

        let mut ack = [0u8; ACK_SIZE];
        let read = channel.interrupt_in(ACK_ENDPOINT, &mut ack, timeout).map_err(|e| failed(e.into()))?;
        if read != ACK_SIZE {
            return Err(failed(TransferCause::ShortAck { read, expected: ACK_SIZE }));
        }

        let frame = AckFrame::new(ack);
        trace!(index, %role, ack = ?frame.as_bytes(), "Acknowledgment received");
        self.config.ack_policy.check(role, packet, &frame).map_err(|m| {
            debug!(index, %role, expected = m.expected, status = m.status, "Acknowledgment mismatch");
            TransportError::rejected(index, m)
        })
    }
}

fn failure_kind(error: &TransportError, role: PacketRole) -> FailureKind {
    match error {
        TransportError::Cancelled { .. } => FailureKind::Cancelled,
        TransportError::HeaderError { .. }
        | TransportError::SizePacketError { .. }
        | TransportError::DataPacketError { .. }
        | TransportError::FooterError { .. } => FailureKind::Acknowledgment(role),
        _ => FailureKind::Transfer,
    }
}

/// Send the first `packet_count` packets with the default transport
/// settings.
///
/// # Errors
/// See [`Transport::send_with_progress`].
pub fn send_packets<C: UsbChannel>(
    handle: &DeviceHandle<C>,
    packets: &PacketBuffer,
    packet_count: usize,
    verbose: bool,
) -> Result<(), TransportError> {
    let options = SendOptions { verbose, cancel: None };
    Transport::default().send(handle, packets, packet_count, &options).map(|_| ())
}
