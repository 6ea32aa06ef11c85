//! Per-session protocol state machine.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::packet::PacketRole;

/// Why a session was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "role")]
pub enum FailureKind {
    /// A control or interrupt transfer failed
    Transfer,
    /// The device rejected a packet of this role
    Acknowledgment(PacketRole),
    /// The caller asked to stop
    Cancelled,
}

/// Progress of one light-update session.
///
/// Transitions only move forward; once `Complete` or `Failed` a new session
/// has to be started from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "data")]
pub enum SessionState {
    /// Nothing sent yet
    #[default]
    Idle,
    HeaderSent,
    SizeSent,
    /// Number of data packets acknowledged so far
    DataSent(usize),
    FooterSent,
    /// Every packet acknowledged; the update is committed
    Complete,
    Failed(FailureKind),
}

impl SessionState {
    /// Record an acknowledged packet of the given role.
    ///
    /// # Errors
    /// Returns an error if the role is out of order or the session is over.
    pub fn advance(&mut self, role: PacketRole) -> Result<(), SessionError> {
        let next = match (*self, role) {
            (Self::Complete | Self::Failed(_), _) => return Err(SessionError::Finished(*self)),
            (Self::Idle, PacketRole::Header) => Self::HeaderSent,
            (Self::HeaderSent, PacketRole::Size) => Self::SizeSent,
            (Self::SizeSent, PacketRole::Data) => Self::DataSent(1),
            (Self::DataSent(n), PacketRole::Data) => Self::DataSent(n + 1),
            (Self::SizeSent | Self::DataSent(_), PacketRole::Footer) => Self::FooterSent,
            (state, role) => return Err(SessionError::InvalidTransition { state, role }),
        };
        *self = next;
        Ok(())
    }

    /// Mark the session as committed.
    ///
    /// # Errors
    /// Returns an error if nothing was sent or the session is already over.
    pub fn complete(&mut self) -> Result<(), SessionError> {
        match *self {
            Self::Idle => Err(SessionError::NotStarted),
            Self::Complete | Self::Failed(_) => Err(SessionError::Finished(*self)),
            _ => {
                *self = Self::Complete;
                Ok(())
            }
        }
    }

    /// Abandon the session. A session that already finished keeps its state.
    pub fn fail(&mut self, kind: FailureKind) {
        if !self.is_finished() {
            *self = Self::Failed(kind);
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_full_sequence() {
        let mut state = SessionState::default();
        for role in [
            PacketRole::Header,
            PacketRole::Size,
            PacketRole::Data,
            PacketRole::Data,
            PacketRole::Footer,
        ] {
            state.advance(role).expect("in-order role");
        }
        assert_eq!(state, SessionState::FooterSent);

        state.complete().expect("complete after footer");
        assert_eq!(state, SessionState::Complete);
        assert!(state.is_finished());
    }

    #[test]
    fn test_data_counter() {
        let mut state = SessionState::SizeSent;
        state.advance(PacketRole::Data).unwrap();
        state.advance(PacketRole::Data).unwrap();
        state.advance(PacketRole::Data).unwrap();
        assert_eq!(state, SessionState::DataSent(3));
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut state = SessionState::Idle;
        assert_matches!(
            state.advance(PacketRole::Size),
            Err(SessionError::InvalidTransition { state: SessionState::Idle, role: PacketRole::Size })
        );
        // Rejected transition leaves the state untouched
        assert_eq!(state, SessionState::Idle);

        let mut state = SessionState::FooterSent;
        assert!(state.advance(PacketRole::Data).is_err());
        assert!(state.advance(PacketRole::Header).is_err());
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut state = SessionState::DataSent(1);
        state.fail(FailureKind::Acknowledgment(PacketRole::Data));

        assert_matches!(state.advance(PacketRole::Data), Err(SessionError::Finished(_)));
        assert_matches!(state.complete(), Err(SessionError::Finished(_)));

        // A second failure does not overwrite the first reason
        state.fail(FailureKind::Cancelled);
        assert_eq!(state, SessionState::Failed(FailureKind::Acknowledgment(PacketRole::Data)));
    }

    #[test]
    fn test_complete_requires_progress() {
        let mut state = SessionState::Idle;
        assert_matches!(state.complete(), Err(SessionError::NotStarted));

        let mut state = SessionState::HeaderSent;
        assert!(state.complete().is_ok());
    }
}
