//! Messages and their acknowledgment state.
//!
//! Every delivery attempt gets one [`AckCell`]. Command channels read it
//! after the handler returns: only `Acknowledged` retires the message.
//! A handler that returns without acknowledging has failed and the
//! payload is delivered again.

mod ack;
mod envelope;

pub use ack::{AckCell, AckError, AckState};
pub use envelope::{Envelope, Message, Payload};
