//! Protocol constants for BCP.
//!
//! The timing values reproduce the behavior of the reference deployment on
//! SX127x hardware; treat them as a matched set. Both peers of a link MUST
//! agree on the session slot timing for the slot schedule to line up.

use std::time::Duration;

// =============================================================================
// RADIO PHY
// =============================================================================

/// FIFO capacity of the SX127x transceiver. A wire packet must fit in one
/// FIFO load; the codec asserts this per packet type.
pub const FIFO_CAPACITY: usize = 66;

/// Fixed payload width of a session packet, in bytes.
pub const MAX_PAYLOAD_BYTES: usize = 32;

// =============================================================================
// HANDSHAKE
// =============================================================================

/// Future offset embedded in a connection-accept so that both peers can
/// sleep until the mutually-agreed session start.
pub const HANDSHAKE_LEAD_TIME: Duration = Duration::from_millis(100);

/// How long an agent listens for a connection-accept after transmitting a
/// connection-request.
pub const HANDSHAKE_RECEIVE_DURATION: Duration = Duration::from_millis(400);

// =============================================================================
// ADVERTISING CADENCE
// =============================================================================

/// Full advertising period: one advertisement plus its response window.
pub const BASE_ADVERTISING_INTERVAL: Duration = Duration::from_millis(550);

/// Time budgeted for one advertisement transmission (approximates its
/// time-on-air at the reference channel settings).
pub const ADVERTISING_TRANSMIT_DURATION: Duration = Duration::from_millis(200);

/// How long an advertiser listens for a connection-request after each
/// advertisement.
pub const CONNECTION_REQUEST_WINDOW: Duration = Duration::from_millis(350);

/// Inactive tail of the advertising period. Zero by default: the agent
/// re-dispatches immediately after the response window closes.
pub const ADVERTISING_SLEEP_DURATION: Duration = Duration::ZERO;

// =============================================================================
// SESSION SLOTS
// =============================================================================

/// Default transmit-slot duration of a session.
pub const SESSION_TRANSMIT_DURATION: Duration = Duration::from_millis(800);

/// Default gap between adjacent session slots, absorbing clock skew and
/// hardware turnaround.
pub const SESSION_GAP_DURATION: Duration = Duration::from_millis(200);

/// Consecutive empty receive slots tolerated before a session terminates.
pub const TIMEOUT_LIMIT: u32 = 4;

/// Remaining sleep durations below this threshold are spun through instead
/// of slept, to hit slot deadlines despite coarse timer granularity. Tune
/// upward on hosted systems with lazy schedulers.
pub const SPIN_THRESHOLD: Duration = Duration::from_millis(5);

// =============================================================================
// AGENT
// =============================================================================

/// How long a pending agent sleeps before re-checking its goal.
pub const PEND_SLEEP_TIME: Duration = Duration::from_millis(100);
