//! Typed and untyped views over one message.
//!
//! Both views hold the same payload allocation and the same [`AckCell`], so
//! acknowledging through either is visible through the other. Converting
//! between them never copies the payload or the state.

use std::any::{self, Any};
use std::fmt;
use std::sync::Arc;

use super::ack::{AckCell, AckError, AckState};

/// Type-erased payload as it travels through a channel.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Untyped view of a message.
///
/// Clones are the same message: they share payload identity and
/// acknowledgment state.
#[derive(Clone)]
pub struct Envelope {
    payload: Payload,
    type_name: &'static str,
    ack: Arc<AckCell>,
    attempt: u32,
}

impl Envelope {
    /// Wrap a payload in a fresh envelope (first delivery attempt).
    pub fn new<T: Any + Send + Sync>(payload: T) -> Self {
        Message::new(payload).into_envelope()
    }

    pub fn payload(&self) -> &(dyn Any + Send + Sync) {
        &*self.payload
    }

    /// Shared handle to the payload.
    pub fn payload_arc(&self) -> Payload {
        Arc::clone(&self.payload)
    }

    /// `std::any::type_name` of the payload, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.payload.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Typed view of the same message, if the payload is a `T`.
    pub fn to_message<T: Any + Send + Sync>(&self) -> Option<Message<T>> {
        let payload = Arc::clone(&self.payload).downcast::<T>().ok()?;
        Some(Message {
            payload,
            ack: Arc::clone(&self.ack),
            attempt: self.attempt,
        })
    }

    /// Consuming variant of [`Envelope::to_message`]; hands the envelope back
    /// on a type mismatch.
    pub fn downcast<T: Any + Send + Sync>(self) -> Result<Message<T>, Envelope> {
        match Arc::clone(&self.payload).downcast::<T>() {
            Ok(payload) => Ok(Message {
                payload,
                ack: self.ack,
                attempt: self.attempt,
            }),
            Err(_) => Err(self),
        }
    }

    pub fn ack(&self) -> Result<(), AckError> {
        self.ack.ack()
    }

    pub fn nack(&self) -> Result<(), AckError> {
        self.ack.nack()
    }

    pub fn state(&self) -> AckState {
        self.ack.state()
    }

    /// Delivery attempt this envelope represents, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// True when both envelopes carry the same payload allocation.
    pub fn same_payload(&self, other: &Envelope) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.payload) as *const (),
            Arc::as_ptr(&other.payload) as *const (),
        )
    }

    /// True when both envelopes are views of the same delivery attempt.
    pub fn same_delivery(&self, other: &Envelope) -> bool {
        Arc::ptr_eq(&self.ack, &other.ack)
    }

    /// Fresh envelope around the same payload for the next attempt.
    pub(crate) fn redeliver(&self) -> Envelope {
        Envelope {
            payload: Arc::clone(&self.payload),
            type_name: self.type_name,
            ack: Arc::new(AckCell::new()),
            attempt: self.attempt.saturating_add(1),
        }
    }

    /// Same payload and attempt with its own acknowledgment state.
    pub(crate) fn detached(&self) -> Envelope {
        Envelope {
            payload: Arc::clone(&self.payload),
            type_name: self.type_name,
            ack: Arc::new(AckCell::new()),
            attempt: self.attempt,
        }
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("type", &self.type_name)
            .field("state", &self.state())
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// Typed view of a message carrying a `T`.
pub struct Message<T> {
    payload: Arc<T>,
    ack: Arc<AckCell>,
    attempt: u32,
}

impl<T: Any + Send + Sync> Message<T> {
    pub fn new(payload: T) -> Self {
        Self::from_arc(Arc::new(payload))
    }

    pub fn from_arc(payload: Arc<T>) -> Self {
        Self {
            payload,
            ack: Arc::new(AckCell::new()),
            attempt: 1,
        }
    }

    /// Untyped view of the same message.
    pub fn to_envelope(&self) -> Envelope {
        self.clone().into_envelope()
    }

    pub fn into_envelope(self) -> Envelope {
        let payload: Payload = self.payload;
        Envelope {
            payload,
            type_name: any::type_name::<T>(),
            ack: self.ack,
            attempt: self.attempt,
        }
    }
}

impl<T> Message<T> {
    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn payload_arc(&self) -> Arc<T> {
        Arc::clone(&self.payload)
    }

    pub fn ack(&self) -> Result<(), AckError> {
        self.ack.ack()
    }

    pub fn nack(&self) -> Result<(), AckError> {
        self.ack.nack()
    }

    pub fn state(&self) -> AckState {
        self.ack.state()
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// A message with a different payload that shares this message's
    /// acknowledgment state.
    pub(crate) fn with_payload<U>(&self, payload: Arc<U>) -> Message<U> {
        Message {
            payload,
            ack: Arc::clone(&self.ack),
            attempt: self.attempt,
        }
    }
}

impl<T> Clone for Message<T> {
    fn clone(&self) -> Self {
        Self {
            payload: Arc::clone(&self.payload),
            ack: Arc::clone(&self.ack),
            attempt: self.attempt,
        }
    }
}

impl<T: Any + Send + Sync> From<Message<T>> for Envelope {
    fn from(message: Message<T>) -> Self {
        message.into_envelope()
    }
}

impl<T: fmt::Debug> fmt::Debug for Message<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("payload", &self.payload)
            .field("state", &self.ack.state())
            .field("attempt", &self.attempt)
            .finish()
    }
}
