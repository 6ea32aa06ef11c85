//! Process exit codes.
//!
//! Scripts branch on these, so the numeric values are stable.

use std::process::ExitCode;

use castlight_hid::{HidError, LocatorError, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    Success = 0,
    /// Bad arguments, packet file or configuration
    InvalidInput = 1,
    /// USB subsystem failure or device held by another program
    UsbFailure = 2,
    NoDevice = 3,
    OpenFailed = 4,
    TransferFailed = 5,
}

impl ExitStatus {
    /// Classify an error by the first recognized cause in its chain.
    #[must_use]
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(e) = cause.downcast_ref::<HidError>() {
                return match e {
                    HidError::Locator(e) => Self::from_locator(e),
                    HidError::Transport(e) => Self::from_transport(e),
                    HidError::Packet(_) => Self::InvalidInput,
                };
            }
            if let Some(e) = cause.downcast_ref::<LocatorError>() {
                return Self::from_locator(e);
            }
            if let Some(e) = cause.downcast_ref::<TransportError>() {
                return Self::from_transport(e);
            }
        }
        Self::InvalidInput
    }

    fn from_locator(err: &LocatorError) -> Self {
        match err {
            LocatorError::EnumerationFailed(_) | LocatorError::DeviceBusy { .. } => Self::UsbFailure,
            LocatorError::NoDeviceFound => Self::NoDevice,
            LocatorError::OpenFailed { .. } => Self::OpenFailed,
        }
    }

    fn from_transport(err: &TransportError) -> Self {
        match err {
            TransportError::InvalidPacketCount { .. } => Self::InvalidInput,
            TransportError::Cancelled { .. } => Self::Success,
            _ => Self::TransferFailed,
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        Self::from(status as u8)
    }
}
