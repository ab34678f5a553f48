//! Time-slot schedules.
//!
//! A half-duplex radio cannot transmit and receive at once, so all ordering
//! between two peers comes from an agreed, periodic schedule anchored at a
//! shared start time. Pushing the time-to-activity mapping into a clock
//! object keeps the session engine testable with synthetic start times and
//! lets it sleep until the next meaningful instant instead of polling.
//!
//! The clocks here answer for the schedule's *reference role* (the session
//! initiator, or the advertiser); a follower swaps transmit and receive on
//! top of the same schedule.

use std::time::{Duration, Instant};

/// What a peer should be doing with the radio at a given moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkActivity {
    /// Neither transmitting nor receiving.
    Inactive,
    /// Listening for a transmission.
    Receiving,
    /// Holding the channel.
    Transmitting,
}

impl LinkActivity {
    /// The counterparty's view of this activity: transmit and receive swap,
    /// inactivity is shared.
    pub fn swapped(self) -> Self {
        match self {
            LinkActivity::Inactive => LinkActivity::Inactive,
            LinkActivity::Receiving => LinkActivity::Transmitting,
            LinkActivity::Transmitting => LinkActivity::Receiving,
        }
    }
}

/// A periodic activity schedule anchored at a start time.
///
/// Implementors describe one period; the provided methods place arbitrary
/// instants into it. Querying an instant before the start time is a
/// programming error and panics.
pub trait Schedule {
    /// When the schedule begins.
    fn start_time(&self) -> Instant;

    /// Length of one full period.
    fn period(&self) -> Duration;

    /// Activity in effect at `offset` into a period.
    fn activity_in_period(&self, offset: Duration) -> LinkActivity;

    /// Offset of the first activity change strictly after `offset`. Returns
    /// the period length when the next change is the start of the next
    /// period.
    fn transition_in_period(&self, offset: Duration) -> Duration;

    /// Time elapsed since the schedule's start. This is not necessarily the
    /// time since the object was created: a follower's schedule starts in
    /// the future.
    fn elapsed_since_start(&self) -> Duration {
        Instant::now().duration_since(self.start_time())
    }

    /// Activity the reference role should be performing at `t`.
    fn activity_at(&self, t: Instant) -> LinkActivity {
        self.activity_in_period(self.offset_in_period(t))
    }

    /// Activity the reference role should be performing right now.
    fn activity(&self) -> LinkActivity {
        self.activity_at(Instant::now())
    }

    /// The first time strictly after `t` at which the activity changes.
    fn next_transition(&self, t: Instant) -> Instant {
        let offset = self.offset_in_period(t);
        let period_start = t - offset;
        period_start + self.transition_in_period(offset)
    }

    /// The first time strictly after now at which the activity changes.
    fn next_transition_from_now(&self) -> Instant {
        self.next_transition(Instant::now())
    }

    /// Offset of `t` into its period.
    fn offset_in_period(&self, t: Instant) -> Duration {
        assert!(
            t >= self.start_time(),
            "schedule queried before its start time"
        );
        let elapsed = t.duration_since(self.start_time());
        let period = self.period().as_nanos();
        Duration::from_nanos((elapsed.as_nanos() % period) as u64)
    }
}

/// The slot schedule of one session.
///
/// One period is `2 * (transmit + gap)`. For the initiator:
///
/// ```text
/// | Transmit | Inactive | Receive  | Inactive |
/// |<-- tx -->|<- gap  ->|<-- tx -->|<- gap  ->|
/// ```
///
/// The follower runs the same schedule with transmit and receive swapped;
/// that swap belongs to the session engine, not the clock.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    start_time: Instant,
    transmit_duration: Duration,
    gap_duration: Duration,
}

impl SessionClock {
    /// Build the schedule both peers agreed on during the handshake.
    pub fn new(start_time: Instant, transmit_duration: Duration, gap_duration: Duration) -> Self {
        Self {
            start_time,
            transmit_duration,
            gap_duration,
        }
    }

    /// The agreed transmit-slot duration.
    pub fn transmit_duration(&self) -> Duration {
        self.transmit_duration
    }

    /// The agreed gap duration.
    pub fn gap_duration(&self) -> Duration {
        self.gap_duration
    }
}

impl Schedule for SessionClock {
    fn start_time(&self) -> Instant {
        self.start_time
    }

    fn period(&self) -> Duration {
        2 * (self.transmit_duration + self.gap_duration)
    }

    fn activity_in_period(&self, offset: Duration) -> LinkActivity {
        let tx = self.transmit_duration;
        let gap = self.gap_duration;
        if offset < tx {
            LinkActivity::Transmitting
        } else if offset < tx + gap {
            LinkActivity::Inactive
        } else if offset < tx * 2 + gap {
            LinkActivity::Receiving
        } else {
            LinkActivity::Inactive
        }
    }

    fn transition_in_period(&self, offset: Duration) -> Duration {
        let tx = self.transmit_duration;
        let gap = self.gap_duration;
        if offset < tx {
            tx
        } else if offset < tx + gap {
            tx + gap
        } else if offset < tx * 2 + gap {
            tx * 2 + gap
        } else {
            self.period()
        }
    }
}

/// The cadence of an advertising agent.
///
/// One period is `advertise + response_wait + sleep`:
///
/// ```text
/// | Transmit  | Receive         | Inactive  |
/// |<- adv   ->|<- resp. wait  ->|<- sleep ->|
/// ```
#[derive(Debug, Clone, Copy)]
pub struct AdvertisingClock {
    start_time: Instant,
    advertise_duration: Duration,
    response_wait_duration: Duration,
    sleep_duration: Duration,
}

impl AdvertisingClock {
    /// Build an advertising cadence starting at `start_time`.
    pub fn new(
        start_time: Instant,
        advertise_duration: Duration,
        response_wait_duration: Duration,
        sleep_duration: Duration,
    ) -> Self {
        Self {
            start_time,
            advertise_duration,
            response_wait_duration,
            sleep_duration,
        }
    }
}

impl Schedule for AdvertisingClock {
    fn start_time(&self) -> Instant {
        self.start_time
    }

    fn period(&self) -> Duration {
        self.advertise_duration + self.response_wait_duration + self.sleep_duration
    }

    fn activity_in_period(&self, offset: Duration) -> LinkActivity {
        if offset < self.advertise_duration {
            LinkActivity::Transmitting
        } else if offset < self.advertise_duration + self.response_wait_duration {
            LinkActivity::Receiving
        } else {
            LinkActivity::Inactive
        }
    }

    fn transition_in_period(&self, offset: Duration) -> Duration {
        if offset < self.advertise_duration {
            self.advertise_duration
        } else if offset < self.advertise_duration + self.response_wait_duration {
            self.advertise_duration + self.response_wait_duration
        } else {
            self.period()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TX: Duration = Duration::from_millis(10);
    const GAP: Duration = Duration::from_millis(5);

    fn session_clock(start: Instant) -> SessionClock {
        SessionClock::new(start, TX, GAP)
    }

    #[test]
    fn test_session_schedule_within_one_period() {
        let start = Instant::now();
        let clock = session_clock(start);

        let cases = [
            (Duration::ZERO, LinkActivity::Transmitting),
            (Duration::from_millis(9), LinkActivity::Transmitting),
            (Duration::from_millis(10), LinkActivity::Inactive),
            (Duration::from_millis(14), LinkActivity::Inactive),
            (Duration::from_millis(15), LinkActivity::Receiving),
            (Duration::from_millis(24), LinkActivity::Receiving),
            (Duration::from_millis(25), LinkActivity::Inactive),
            (Duration::from_millis(29), LinkActivity::Inactive),
        ];
        for (offset, expected) in cases {
            assert_eq!(clock.activity_at(start + offset), expected, "{offset:?}");
        }
    }

    #[test]
    fn test_session_schedule_repeats() {
        let start = Instant::now();
        let clock = session_clock(start);
        let period = clock.period();
        assert_eq!(period, Duration::from_millis(30));

        for periods in 1..5u32 {
            let t = start + period * periods + Duration::from_millis(17);
            assert_eq!(clock.activity_at(t), LinkActivity::Receiving);
        }
    }

    #[test]
    fn test_session_transitions_are_strictly_later() {
        let start = Instant::now();
        let clock = session_clock(start);

        let mut t = start;
        for _ in 0..20 {
            let next = clock.next_transition(t);
            assert!(next > t);
            t = next;
        }
        assert_eq!(t.duration_since(start), clock.period() * 5);
    }

    #[test]
    fn test_gapless_session_schedule() {
        let start = Instant::now();
        let clock = SessionClock::new(start, TX, Duration::ZERO);

        assert_eq!(clock.activity_at(start), LinkActivity::Transmitting);
        assert_eq!(clock.activity_at(start + TX), LinkActivity::Receiving);
        // The boundary at the end of the transmit slot jumps straight to the
        // end of the receive slot.
        assert_eq!(clock.next_transition(start + TX), start + TX * 2);
    }

    #[test]
    fn test_initiator_and_follower_mirror_each_other() {
        let start = Instant::now();
        let clock = session_clock(start);

        // Swapping the initiator's schedule must produce the follower's at
        // every instant across many periods.
        let step = Duration::from_millis(1);
        let mut t = start;
        let end = start + clock.period() * 10;
        while t < end {
            let initiator = clock.activity_at(t);
            let follower = initiator.swapped();
            match initiator {
                LinkActivity::Transmitting => assert_eq!(follower, LinkActivity::Receiving),
                LinkActivity::Receiving => assert_eq!(follower, LinkActivity::Transmitting),
                LinkActivity::Inactive => assert_eq!(follower, LinkActivity::Inactive),
            }
            assert_eq!(follower.swapped(), initiator);
            t += step;
        }
    }

    #[test]
    #[should_panic(expected = "before its start time")]
    fn test_query_before_start_panics() {
        let start = Instant::now() + Duration::from_secs(60);
        session_clock(start).activity_at(Instant::now());
    }

    #[test]
    fn test_advertising_schedule() {
        let start = Instant::now();
        let clock = AdvertisingClock::new(
            start,
            Duration::from_millis(200),
            Duration::from_millis(350),
            Duration::from_millis(50),
        );
        assert_eq!(clock.period(), Duration::from_millis(600));

        let cases = [
            (Duration::ZERO, LinkActivity::Transmitting),
            (Duration::from_millis(199), LinkActivity::Transmitting),
            (Duration::from_millis(200), LinkActivity::Receiving),
            (Duration::from_millis(549), LinkActivity::Receiving),
            (Duration::from_millis(550), LinkActivity::Inactive),
            (Duration::from_millis(599), LinkActivity::Inactive),
            (Duration::from_millis(600), LinkActivity::Transmitting),
        ];
        for (offset, expected) in cases {
            assert_eq!(clock.activity_at(start + offset), expected, "{offset:?}");
        }

        assert_eq!(
            clock.next_transition(start + Duration::from_millis(250)),
            start + Duration::from_millis(550)
        );
    }

    #[test]
    fn test_advertising_schedule_without_sleep() {
        let start = Instant::now();
        let clock = AdvertisingClock::new(
            start,
            Duration::from_millis(200),
            Duration::from_millis(350),
            Duration::ZERO,
        );
        // With no sleep tail the receive window rolls straight into the
        // next advertisement.
        assert_eq!(
            clock.activity_at(start + Duration::from_millis(550)),
            LinkActivity::Transmitting
        );
        assert_eq!(
            clock.next_transition(start + Duration::from_millis(400)),
            start + Duration::from_millis(550)
        );
    }
}
