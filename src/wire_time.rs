//! Wall-clock timestamps exchanged during the handshake.
//!
//! Two peers cannot compare their monotonic clocks, so the agreed session
//! start travels as an absolute wall-clock instant: a count of nanoseconds
//! since the Unix epoch, little-endian on the wire like every other
//! multi-byte field. Decoding translates the instant back into the local
//! monotonic timeline by measuring the offset against the local system
//! clock.
//!
//! This leans on an NTP assumption: both hosts' wall clocks must agree to
//! well within the handshake lead time. Measuring the offset from the
//! handshake round-trip instead would remove the assumption.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// An absolute wall-clock time point as carried on the wire.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WireInstant(u64);

impl WireInstant {
    /// Build from a raw nanoseconds-since-epoch count.
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Nanoseconds since the Unix epoch.
    pub const fn as_nanos(self) -> u64 {
        self.0
    }
}

/// The current wall-clock time plus `delay`, ready for embedding in a
/// connection-accept.
pub fn future_wire_time(delay: Duration) -> WireInstant {
    let target = SystemTime::now() + delay;
    let since_epoch = target
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    WireInstant::from_nanos(since_epoch.as_nanos() as u64)
}

/// Translate a received wire time into the local monotonic timeline.
///
/// Computes `(wire_instant - system_now) + monotonic_now`. A wire time that
/// lies in the past (peer clock ahead of ours, or a stale packet) clamps to
/// the earliest instant the monotonic clock can express.
pub fn deserialize_wire_time(wire: WireInstant) -> Instant {
    let wall = UNIX_EPOCH + Duration::from_nanos(wire.as_nanos());
    let system_now = SystemTime::now();
    let monotonic_now = Instant::now();
    match wall.duration_since(system_now) {
        Ok(ahead) => monotonic_now + ahead,
        Err(behind) => monotonic_now
            .checked_sub(behind.duration())
            .unwrap_or(monotonic_now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_future_time_lands_in_the_future() {
        let lead = Duration::from_millis(100);
        let wire = future_wire_time(lead);
        let local = deserialize_wire_time(wire);
        let remaining = local.saturating_duration_since(Instant::now());

        // Encoding and decoding on the same host should preserve the lead
        // time to within scheduling noise.
        assert!(remaining <= lead);
        assert!(remaining >= lead - Duration::from_millis(50));
    }

    #[test]
    fn test_past_time_does_not_panic() {
        let wire = WireInstant::from_nanos(0);
        let local = deserialize_wire_time(wire);
        assert!(local <= Instant::now());
    }

    #[test]
    fn test_raw_nanos_roundtrip() {
        let wire = WireInstant::from_nanos(0x0102_0304_0506_0708);
        assert_eq!(wire.as_nanos(), 0x0102_0304_0506_0708);
    }
}
