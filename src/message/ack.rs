//! Acknowledgment state machine shared by every view of a message.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use thiserror::Error;

/// Where a single delivery attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckState {
    Initial,
    Acknowledged,
    NotAcknowledged,
}

impl AckState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            ACKED => AckState::Acknowledged,
            NACKED => AckState::NotAcknowledged,
            _ => AckState::Initial,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            AckState::Initial => INITIAL,
            AckState::Acknowledged => ACKED,
            AckState::NotAcknowledged => NACKED,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, AckState::Initial)
    }
}

impl fmt::Display for AckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckState::Initial => f.write_str("initial"),
            AckState::Acknowledged => f.write_str("acknowledged"),
            AckState::NotAcknowledged => f.write_str("not-acknowledged"),
        }
    }
}

/// Attempt to move a terminal state to the opposite terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AckError {
    #[error("message is already {current}; cannot mark it {requested}")]
    Conflict {
        current: AckState,
        requested: AckState,
    },
}

const INITIAL: u8 = 0;
const ACKED: u8 = 1;
const NACKED: u8 = 2;

/// Atomic cell holding one delivery attempt's [`AckState`].
///
/// Transitions out of `Initial` happen once. Repeating the same terminal
/// transition is a no-op, asking for the opposite one fails.
#[derive(Debug, Default)]
pub struct AckCell {
    state: AtomicU8,
}

impl AckCell {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(INITIAL),
        }
    }

    pub fn state(&self) -> AckState {
        AckState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn ack(&self) -> Result<(), AckError> {
        self.transition(AckState::Acknowledged)
    }

    pub fn nack(&self) -> Result<(), AckError> {
        self.transition(AckState::NotAcknowledged)
    }

    fn transition(&self, requested: AckState) -> Result<(), AckError> {
        match self.state.compare_exchange(
            INITIAL,
            requested.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(current) if current == requested.as_u8() => Ok(()),
            Err(current) => Err(AckError::Conflict {
                current: AckState::from_u8(current),
                requested,
            }),
        }
    }
}
