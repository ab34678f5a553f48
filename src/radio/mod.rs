//! Half-duplex transceiver abstraction.
//!
//! This is the only interface the session engine and the protocol agent see.
//! All scheduling, framing and retry logic sits above it; register-level
//! driver work sits below it, behind the kernel.

mod device;
pub mod testing;

pub use device::CharDeviceRadio;

use thiserror::Error;

/// Failure modes shared by [`Radio::transmit`] and [`Radio::receive`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// No transmission arrived within the receive window.
    #[error("no transmission within the receive window")]
    Timeout,

    /// The supplied buffer is empty, too large to transmit, or too small to
    /// hold a maximum-length reception.
    #[error("buffer size unsuitable for the transceiver")]
    BadBufferSize,

    /// The transceiver rejected the message content.
    #[error("transceiver rejected the message")]
    BadMessage,

    /// The transceiver never came up; the caller cannot operate.
    #[error("transceiver failed to initialize")]
    InitializationFailed,

    /// Anything the driver could not classify.
    #[error("unspecified transceiver error")]
    Unspecified,
}

/// Outcome of a single transmit or receive.
pub type RadioResult = Result<(), RadioError>;

/// A half-duplex transceiver.
///
/// Transmit and receive are mutually exclusive per device; the protocol's
/// slot schedule guarantees the engine never wants both at once. The
/// interface itself does not promise thread safety, but an implementation
/// may arbitrate internally (the in-process test doubles do, so that two
/// agents can share one "air").
pub trait Radio {
    /// Transmit `bytes`. May block for the full time-on-air.
    fn transmit(&self, bytes: &[u8]) -> RadioResult;

    /// Receive into `buffer_out`, blocking up to an implementation-defined
    /// timeout and copying at most `buffer_out.len()` bytes. Implementations
    /// reject buffers smaller than [`max_message_length`](Radio::max_message_length)
    /// with [`RadioError::BadBufferSize`] without receiving.
    fn receive(&self, buffer_out: &mut [u8]) -> RadioResult;

    /// Largest message this transceiver can move in one transmission.
    fn max_message_length(&self) -> usize;
}

impl<R: Radio + ?Sized> Radio for &R {
    fn transmit(&self, bytes: &[u8]) -> RadioResult {
        (**self).transmit(bytes)
    }

    fn receive(&self, buffer_out: &mut [u8]) -> RadioResult {
        (**self).receive(buffer_out)
    }

    fn max_message_length(&self) -> usize {
        (**self).max_message_length()
    }
}
