use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a session.
///
/// A connection attempt moves `Closed → Connecting → Connected → Closed`.
/// Server sessions start at `Connected`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum SessionState {
    /// Not connected. Initial and terminal.
    Closed = 0,
    /// Dialing (client only).
    Connecting = 1,
    /// Ready for traffic.
    Connected = 2,
}

impl SessionState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "CLOSED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
        };
        f.write_str(name)
    }
}

/// Atomic holder for a [`SessionState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) const fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Moves from `current` to `new`. On failure returns the actual state.
    pub(crate) fn transition(
        &self,
        current: SessionState,
        new: SessionState,
    ) -> Result<(), SessionState> {
        self.0
            .compare_exchange(current as u8, new as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(SessionState::from_u8)
    }

    /// Sets `Closed`. Returns `true` for the single caller that moved the
    /// state away from something else.
    pub(crate) fn claim_close(&self) -> bool {
        self.0.swap(SessionState::Closed as u8, Ordering::SeqCst) != SessionState::Closed as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_requires_expected_state() {
        let cell = StateCell::new(SessionState::Closed);

        assert_eq!(
            cell.transition(SessionState::Connected, SessionState::Closed),
            Err(SessionState::Closed)
        );
        assert!(
            cell.transition(SessionState::Closed, SessionState::Connecting)
                .is_ok()
        );
        assert_eq!(cell.load(), SessionState::Connecting);
    }

    #[test]
    fn test_close_is_claimed_once() {
        let cell = StateCell::new(SessionState::Connected);

        assert!(cell.claim_close());
        assert!(!cell.claim_close());
        assert_eq!(cell.load(), SessionState::Closed);
    }
}
