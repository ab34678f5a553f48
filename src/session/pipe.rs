//! Message pipe: the application's two hooks into a session.
//!
//! The engine pulls the next outgoing payload through one endpoint every
//! time it emits a data packet, and pushes a received payload through the
//! other once its sequence number has strictly advanced. Payloads are the
//! session packet's fixed width; shorter application messages pad with
//! zeroes.

use std::fmt;

use crate::packet::PacketPayload;

/// Callback producing the next payload to send, or `None` to send an empty
/// data packet.
pub type SourceFn = Box<dyn FnMut() -> Option<PacketPayload> + Send>;

/// Callback consuming a received payload.
pub type SinkFn = Box<dyn FnMut(PacketPayload) + Send>;

/// The pair of application callbacks a session exchanges payloads through.
pub struct MessagePipe {
    source: SourceFn,
    sink: SinkFn,
}

impl MessagePipe {
    /// A pipe with both endpoints connected.
    pub fn new<S, D>(source: S, sink: D) -> Self
    where
        S: FnMut() -> Option<PacketPayload> + Send + 'static,
        D: FnMut(PacketPayload) + Send + 'static,
    {
        Self {
            source: Box::new(source),
            sink: Box::new(sink),
        }
    }

    /// A pipe that sends from `source` and drops everything received.
    pub fn with_source<S>(source: S) -> Self
    where
        S: FnMut() -> Option<PacketPayload> + Send + 'static,
    {
        Self::new(source, |_| {})
    }

    /// The next payload the application wants on the air, if any.
    pub fn next_message_to_send(&mut self) -> Option<PacketPayload> {
        (self.source)()
    }

    /// Hand a received payload to the application.
    pub fn deposit_received_message(&mut self, payload: PacketPayload) {
        (self.sink)(payload)
    }
}

impl Default for MessagePipe {
    /// A pipe that never sends and drops everything received.
    fn default() -> Self {
        Self::new(|| None, |_| {})
    }
}

impl fmt::Debug for MessagePipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagePipe").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_PAYLOAD_BYTES;

    #[test]
    fn test_default_pipe_is_silent() {
        let mut pipe = MessagePipe::default();
        assert_eq!(pipe.next_message_to_send(), None);
        pipe.deposit_received_message([0; MAX_PAYLOAD_BYTES]);
    }

    #[test]
    fn test_endpoints_are_invoked() {
        let mut produced = 0u8;
        let mut pipe = MessagePipe::new(
            move || {
                produced += 1;
                Some([produced; MAX_PAYLOAD_BYTES])
            },
            |payload| assert_eq!(payload[0], 9),
        );

        assert_eq!(pipe.next_message_to_send(), Some([1; MAX_PAYLOAD_BYTES]));
        assert_eq!(pipe.next_message_to_send(), Some([2; MAX_PAYLOAD_BYTES]));
        pipe.deposit_received_message([9; MAX_PAYLOAD_BYTES]);
    }
}
