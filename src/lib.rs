//! # BCP — Burst Channel Protocol
//!
//! A half-duplex, time-synchronized link-layer protocol for long-range
//! low-bandwidth radios (SX127x LoRa transceivers). Two peers discover each
//! other, negotiate a session, and exchange fixed-size payloads with
//! sequence-numbered positive acknowledgment and retransmission, under the
//! physical constraint that the radio cannot transmit and receive at the
//! same time.
//!
//! - **Discovery**: one peer advertises its presence, the other seeks.
//! - **Handshake**: a connection-request answered by a connection-accept
//!   that schedules the session's start on the wall clock.
//! - **Session**: stop-and-wait reliable delivery over an agreed slot
//!   schedule, with NACK-triggered retransmission and timeout-triggered
//!   termination.
//!
//! ## Modules
//!
//! - [`packet`]: tagged wire codec driven by per-type field tables
//! - [`seq`]: wrapping 8-bit sequence numbers
//! - [`clock`]: slot schedules for sessions and advertising
//! - [`wire_time`]: wall-clock timestamps exchanged in the handshake
//! - [`radio`]: the half-duplex transceiver abstraction and test doubles
//! - [`session`]: the reliable-delivery engine and the message pipe
//! - [`agent`]: the outer discovery/handshake/session state machine
//!
//! ## Example
//!
//! Drive an agent against an in-process loopback:
//!
//! ```no_run
//! use bcp::prelude::*;
//! use bcp::radio::testing::LoopbackRadio;
//! use std::time::Duration;
//!
//! let radio = LoopbackRadio::new(Duration::from_millis(50));
//! let mut agent = ProtocolAgent::new(7, &radio, MessagePipe::default());
//! agent.set_goal(ConnectionGoal::AdvertiseConnection);
//! loop {
//!     agent.execute_agent_action();
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod agent;
pub mod clock;
pub mod constants;
pub mod packet;
pub mod radio;
pub mod seq;
pub mod session;
pub mod wire_time;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::agent::{AgentConfig, ConnectionGoal, GoalHandle, ProtocolAgent};
    pub use crate::clock::{AdvertisingClock, LinkActivity, Schedule, SessionClock};
    pub use crate::packet::{
        deserialize, Address, AdvertisingPacket, ConnectionAcceptPacket, ConnectionRequestPacket,
        PacketKind, PacketPayload, ReceiveBuffer, SessionId, SessionPacket, SessionSubtype,
    };
    pub use crate::radio::{Radio, RadioError, RadioResult};
    pub use crate::seq::SequenceNumber;
    pub use crate::session::{AgentAction, MessagePipe, Role, Session, SlotTiming};
    pub use crate::wire_time::{deserialize_wire_time, future_wire_time, WireInstant};
}

// Re-export the types most callers touch at the crate root.
pub use agent::{AgentConfig, ConnectionGoal, ProtocolAgent};
pub use packet::{Address, PacketPayload, SessionId};
pub use radio::{Radio, RadioError};
pub use seq::SequenceNumber;
pub use session::{AgentAction, MessagePipe, Session};
