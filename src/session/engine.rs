//! Stop-and-wait session engine.
//!
//! Two peers that completed a handshake share a slot schedule (see
//! [`SessionClock`]) and exchange sequence-numbered session packets in
//! alternating slots. Delivery is reliable: every data packet carries the
//! sender's sequence number (SN) and the next sequence number it expects
//! from its peer (NESN, a cumulative acknowledgment). A peer that saw an
//! empty receive slot NACKs so its counterparty retransmits; too many empty
//! slots in a row terminate the session.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::clock::{LinkActivity, Schedule, SessionClock};
use crate::constants::{
    HANDSHAKE_LEAD_TIME, SESSION_GAP_DURATION, SESSION_TRANSMIT_DURATION, SPIN_THRESHOLD,
    TIMEOUT_LIMIT,
};
use crate::packet::{
    deserialize, PacketPayload, ReceiveBuffer, SessionId, SessionPacket, SessionSubtype,
};
use crate::radio::Radio;
use crate::seq::SequenceNumber;

use super::pipe::MessagePipe;

/// Which peer transmits in the first slot of each period. Fixed when the
/// handshake completes; determines slot parity for the session's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepted the connection; transmits first.
    Initiator,
    /// Requested the connection; receives first.
    Follower,
}

impl Role {
    /// Translate the schedule's reference activity (the initiator's) into
    /// this role's activity.
    fn localize(self, reference: LinkActivity) -> LinkActivity {
        match self {
            Role::Initiator => reference,
            Role::Follower => reference.swapped(),
        }
    }
}

/// The specific thing a session should do at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentAction {
    /// Nothing until the next slot boundary.
    SleepUntilNextAction,
    /// Listen for the peer's slot.
    Receive,
    /// Send a fresh data packet with the next sequence number.
    TransmitNextMessage,
    /// Send the previous packet again, byte for byte.
    RetransmitMessage,
    /// Tell the peer its last transmission never arrived.
    TransmitNack,
    /// Give up on the peer and end the session.
    TerminateSession,
    /// The session is over; nothing will be executed.
    SessionComplete,
}

/// Slot timing of one session. Both peers must use identical values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotTiming {
    /// Length of each transmit slot.
    pub transmit_duration: Duration,
    /// Inactive gap between adjacent slots.
    pub gap_duration: Duration,
}

impl Default for SlotTiming {
    fn default() -> Self {
        Self {
            transmit_duration: SESSION_TRANSMIT_DURATION,
            gap_duration: SESSION_GAP_DURATION,
        }
    }
}

/// One reliable, slot-scheduled exchange between two peers.
///
/// Created by the protocol agent when a handshake completes, driven one
/// action at a time through [`execute_current_action`](Session::execute_current_action),
/// and discarded once that returns [`AgentAction::SessionComplete`].
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    clock: SessionClock,
    role: Role,

    /// SN of the newest good packet received from the peer.
    last_recv_sn: SequenceNumber,
    /// The packet we last put on the air, kept for retransmission.
    last_sent_packet: SessionPacket,
    /// SN of our newest transmission the peer has acknowledged. Always
    /// equal to `last_sent_packet.sn` or one less mod 256.
    last_acked_sent_sn: SequenceNumber,
    /// The newest received payload, held back one slot: the peer may
    /// retransmit the same SN with different bytes, which supersedes the
    /// buffered copy without delivery. Released to the pipe only when a
    /// strictly newer SN arrives.
    last_recv_message: Option<PacketPayload>,
    /// Whether the latest receive slot produced a good packet.
    received_good_packet: bool,
    /// Consecutive empty receive slots since the last good packet.
    timeout_counter: u32,
    complete: bool,
}

impl Session {
    /// A session this side initiated by accepting a connection. The first
    /// slot opens one handshake lead time from now.
    pub fn initiate(id: SessionId, timing: SlotTiming) -> Self {
        Self::new(
            Instant::now() + HANDSHAKE_LEAD_TIME,
            id,
            timing,
            Role::Initiator,
        )
    }

    /// A session the counterparty initiated; we requested the connection
    /// and received `start_time` in its accept packet.
    pub fn follow(start_time: Instant, id: SessionId, timing: SlotTiming) -> Self {
        Self::new(start_time, id, timing, Role::Follower)
    }

    /// A session with every parameter explicit.
    ///
    /// The pre-session sequence state is fictitious, chosen so that the
    /// first real transmission classifies as "new" rather than "retransmit":
    ///
    /// ```text
    ///                      initiator    follower
    /// last_acked_sent_sn   MAX          MAX-1
    /// last_sent.sn         MAX          MAX
    /// last_sent.nesn       MAX          0
    /// last_recv_sn         MAX          MAX
    /// ```
    ///
    /// Both sides start with an empty receive buffer and the good-packet
    /// flag raised.
    pub fn new(start_time: Instant, id: SessionId, timing: SlotTiming, role: Role) -> Self {
        let (fictitious_acked, fictitious_nesn) = match role {
            Role::Initiator => (SequenceNumber::MAX, SequenceNumber::MAX),
            Role::Follower => (SequenceNumber::MAX - 1, SequenceNumber::new(0)),
        };
        Self {
            id,
            clock: SessionClock::new(start_time, timing.transmit_duration, timing.gap_duration),
            role,
            last_recv_sn: SequenceNumber::MAX,
            last_sent_packet: SessionPacket {
                session_id: id,
                nesn: fictitious_nesn,
                sn: SequenceNumber::MAX,
                ..SessionPacket::default()
            },
            last_acked_sent_sn: fictitious_acked,
            last_recv_message: None,
            received_good_packet: true,
            timeout_counter: 0,
            complete: false,
        }
    }

    /// This session's identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Which side of the slot schedule we hold.
    pub fn role(&self) -> Role {
        self.role
    }

    /// When the session's first slot opens.
    pub fn start_time(&self) -> Instant {
        self.clock.start_time()
    }

    /// SN of our newest transmission the peer has acknowledged.
    pub fn last_acked_sent_sn(&self) -> SequenceNumber {
        self.last_acked_sent_sn
    }

    /// Whether the session has ended.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// The action this session would execute right now, without executing
    /// it.
    pub fn next_action(&self) -> AgentAction {
        self.what_to_do_ignoring_time(self.role.localize(self.clock.activity()))
    }

    /// Execute the action the slot schedule expects right now, then sleep
    /// until the next non-inactive slot boundary.
    ///
    /// Returns the action that will run at the *next* call, pre-computed
    /// before sleeping so the wake-up path is short.
    pub fn execute_current_action<R: Radio + ?Sized>(
        &mut self,
        radio: &R,
        pipe: &mut MessagePipe,
    ) -> AgentAction {
        match self.next_action() {
            AgentAction::Receive => self.receive_message(radio, pipe),
            AgentAction::TransmitNextMessage => self.transmit_next_message(radio, pipe),
            AgentAction::RetransmitMessage => self.retransmit_message(radio),
            AgentAction::TransmitNack => self.transmit_nack(radio),
            AgentAction::TerminateSession => self.terminate(),
            AgentAction::SleepUntilNextAction | AgentAction::SessionComplete => {}
        }
        self.sleep_through_next_gap_time()
    }

    /// Block until the session's first slot opens.
    pub fn sleep_until_start(&self) {
        sleep_until(self.start_time());
    }

    /// Decide what we would do if the schedule said `supposed_activity`,
    /// given the current sequence state.
    ///
    /// Receive and inactive map one-to-one; a transmit slot picks between a
    /// fresh message, a retransmission, a NACK and giving up.
    fn what_to_do_ignoring_time(&self, supposed_activity: LinkActivity) -> AgentAction {
        if self.complete {
            return AgentAction::SessionComplete;
        }

        match supposed_activity {
            LinkActivity::Inactive => return AgentAction::SleepUntilNextAction,
            LinkActivity::Receiving => return AgentAction::Receive,
            LinkActivity::Transmitting => {}
        }

        // Nothing heard since our last transmission: NACK until the peer
        // reappears or the timeout budget runs out.
        if !self.received_good_packet {
            return if self.timeout_counter <= TIMEOUT_LIMIT {
                AgentAction::TransmitNack
            } else {
                AgentAction::TerminateSession
            };
        }

        if self.last_acked_sent_sn == self.last_sent_packet.sn {
            AgentAction::TransmitNextMessage
        } else if self.last_acked_sent_sn + 1 == self.last_sent_packet.sn {
            AgentAction::RetransmitMessage
        } else {
            unreachable!("session sequence state diverged from the ack invariant")
        }
    }

    fn transmit_next_message<R: Radio + ?Sized>(&mut self, radio: &R, pipe: &mut MessagePipe) {
        let mut packet = SessionPacket {
            session_id: self.id,
            subtype: SessionSubtype::Data,
            nesn: self.last_recv_sn + 1,
            sn: self.last_acked_sent_sn + 1,
            ..SessionPacket::default()
        };
        if let Some(message) = pipe.next_message_to_send() {
            packet.length = message.len() as u8;
            packet.payload = message;
        }
        self.last_sent_packet = packet;
        self.log_packet(&packet, "transmitted");
        if let Err(error) = radio.transmit(&packet.serialize()) {
            warn!(%error, "transmission failed");
        }
    }

    fn retransmit_message<R: Radio + ?Sized>(&mut self, radio: &R) {
        self.log_packet(&self.last_sent_packet, "retransmitted");
        if let Err(error) = radio.transmit(&self.last_sent_packet.serialize()) {
            warn!(%error, "retransmission failed");
        }
    }

    fn transmit_nack<R: Radio + ?Sized>(&mut self, radio: &R) {
        // The NACK re-states our current SN (no advance) and asks for the
        // peer's next; it is not stored for retransmission.
        let packet = SessionPacket {
            session_id: self.id,
            subtype: SessionSubtype::Nack,
            nesn: self.last_recv_sn + 1,
            sn: self.last_sent_packet.sn,
            ..SessionPacket::default()
        };
        self.log_packet(&packet, "transmitted NACK");
        if let Err(error) = radio.transmit(&packet.serialize()) {
            warn!(%error, "NACK transmission failed");
        }
        self.timeout_counter += 1;
    }

    fn receive_message<R: Radio + ?Sized>(&mut self, radio: &R, pipe: &mut MessagePipe) {
        self.received_good_packet = false;
        let mut buffer = ReceiveBuffer::default();
        if let Err(error) = radio.receive(buffer.as_mut_slice()) {
            trace!(%error, "empty receive slot");
            return;
        }
        self.received_good_packet = true;
        self.timeout_counter = 0;

        let Some(packet) = deserialize::<SessionPacket>(buffer.as_slice()) else {
            warn!("received bytes did not parse as a session packet");
            return;
        };
        self.log_packet(&packet, "received");

        if packet.nesn == self.last_sent_packet.sn + 1 {
            // The peer acknowledged our newest transmission.
            self.last_acked_sent_sn = self.last_sent_packet.sn;

            if packet.sn == self.last_recv_sn {
                // A retransmission of an SN we already hold. The new bytes
                // logically supersede the buffered copy; nothing is
                // released.
                self.last_recv_message = Some(packet.payload);
            } else if packet.sn == self.last_recv_sn + 1 {
                if let Some(message) = self.last_recv_message.take() {
                    pipe.deposit_received_message(message);
                }
                self.last_recv_message = Some(packet.payload);
            }
            self.last_recv_sn = packet.sn;
        } else if packet.subtype == SessionSubtype::Nack
            && packet.nesn == self.last_sent_packet.sn
        {
            // The peer missed our last transmission. No state change: the
            // next transmit slot classifies as a retransmission because
            // `last_acked_sent_sn + 1 == last_sent_packet.sn` still holds.
            // A NACK of our own NACK lands here too and is treated exactly
            // like a missing ack; we never NACK recursively.
        } else {
            // A packet whose sn/nesn/subtype matches no expected transition
            // means the two peers disagree about the session state.
            panic!(
                "session {}: peer state is inconsistent ({} sn {} nesn {}, our last sent sn {})",
                self.id,
                packet.subtype,
                packet.sn,
                packet.nesn,
                self.last_sent_packet.sn,
            );
        }
    }

    fn terminate(&mut self) {
        // A courteous termination packet is a future extension; today the
        // peer discovers the end through its own timeout budget.
        self.complete = true;
        debug!(id = self.id, "session terminated");
    }

    /// Sleep until the next slot boundary at which this role has something
    /// to do, skipping over an intervening gap. Returns the action to take
    /// on waking, computed before sleeping.
    fn sleep_through_next_gap_time(&self) -> AgentAction {
        let mut wake_time = self.clock.next_transition_from_now();
        if self.role.localize(self.clock.activity_at(wake_time)) == LinkActivity::Inactive {
            wake_time = self.clock.next_transition(wake_time);
        }

        let action =
            self.what_to_do_ignoring_time(self.role.localize(self.clock.activity_at(wake_time)));
        debug_assert!(
            action != AgentAction::SleepUntilNextAction,
            "woke into a gap; should have slept longer"
        );
        sleep_until(wake_time);
        action
    }

    fn log_packet(&self, packet: &SessionPacket, action: &str) {
        trace!(
            id = self.id,
            role = ?self.role,
            subtype = %packet.subtype,
            length = packet.length,
            sn = %packet.sn,
            nesn = %packet.nesn,
            last_recv_sn = %self.last_recv_sn,
            last_sent_sn = %self.last_sent_packet.sn,
            last_acked_sent_sn = %self.last_acked_sent_sn,
            "{action} packet"
        );
    }
}

/// Sleep until `t`, spinning instead when the remainder is below
/// [`SPIN_THRESHOLD`] so slot deadlines are met despite coarse timers.
fn sleep_until(t: Instant) {
    let remaining = t.saturating_duration_since(Instant::now());
    if remaining >= SPIN_THRESHOLD {
        thread::sleep(remaining);
    } else {
        while Instant::now() < t {
            std::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_PAYLOAD_BYTES;
    use crate::radio::testing::{CountingRadio, FallibleRadio, LoopbackRadio};
    use std::sync::{Arc, Mutex};

    fn timing(transmit_ms: u64, gap_ms: u64) -> SlotTiming {
        SlotTiming {
            transmit_duration: Duration::from_millis(transmit_ms),
            gap_duration: Duration::from_millis(gap_ms),
        }
    }

    /// Source producing "TAG 0", "TAG 1", ... payloads.
    fn text_source(tag: &'static str) -> impl FnMut() -> Option<PacketPayload> {
        let mut next = 0u32;
        move || {
            let text = format!("{tag} {next}");
            next += 1;
            let mut payload = [0u8; MAX_PAYLOAD_BYTES];
            payload[..text.len()].copy_from_slice(text.as_bytes());
            Some(payload)
        }
    }

    /// Sink collecting deposited payloads for later inspection.
    fn collecting_sink() -> (
        Arc<Mutex<Vec<PacketPayload>>>,
        impl FnMut(PacketPayload) + Send,
    ) {
        let store = Arc::new(Mutex::new(Vec::new()));
        let sink_store = Arc::clone(&store);
        (store, move |payload| {
            sink_store.lock().unwrap().push(payload)
        })
    }

    fn payload_text(payload: &PacketPayload) -> String {
        let end = payload
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(payload.len());
        String::from_utf8_lossy(&payload[..end]).into_owned()
    }

    /// Each step of `observed` must leave the ack where it was or advance
    /// it by one mod 256.
    fn assert_acks_monotonic(observed: &[SequenceNumber]) {
        for pair in observed.windows(2) {
            let step = (pair[1] - pair[0]).value();
            assert!(step <= 1, "ack jumped from {} to {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_follower_action_sequence() {
        // The counting radio "receives" zeroed buffers, which decode as
        // session packets with sn 0 / nesn 0: the first acks our fictitious
        // state, the rest read as NACKs asking for retransmission.
        let radio = CountingRadio::new();
        let mut pipe = MessagePipe::default();
        let mut session = Session::follow(Instant::now(), 0, timing(10, 10));

        let expected = [
            AgentAction::TransmitNextMessage,
            AgentAction::Receive,
            AgentAction::RetransmitMessage,
            AgentAction::Receive,
            AgentAction::RetransmitMessage,
            AgentAction::Receive,
        ];
        for (i, want) in expected.into_iter().enumerate() {
            assert_eq!(session.execute_current_action(&radio, &mut pipe), want, "step {i}");
        }
    }

    #[test]
    fn test_gapless_follower_action_sequence() {
        let radio = CountingRadio::new();
        let mut pipe = MessagePipe::default();
        let mut session = Session::follow(Instant::now(), 0, timing(10, 0));

        let expected = [
            AgentAction::TransmitNextMessage,
            AgentAction::Receive,
            AgentAction::RetransmitMessage,
            AgentAction::Receive,
        ];
        for (i, want) in expected.into_iter().enumerate() {
            assert_eq!(session.execute_current_action(&radio, &mut pipe), want, "step {i}");
        }
    }

    #[test]
    fn test_initiator_action_sequence() {
        let radio = CountingRadio::new();
        let mut pipe = MessagePipe::default();
        let session_timing = timing(10, 10);
        let mut session = Session::initiate(0, session_timing);
        session.sleep_until_start();

        let expected = [
            AgentAction::Receive,
            AgentAction::RetransmitMessage,
            AgentAction::Receive,
            AgentAction::RetransmitMessage,
            AgentAction::Receive,
            AgentAction::RetransmitMessage,
        ];
        for (i, want) in expected.into_iter().enumerate() {
            assert_eq!(session.execute_current_action(&radio, &mut pipe), want, "step {i}");
        }
    }

    #[test]
    fn test_slot_alternation_across_timings() {
        let configs = [
            timing(10, 10),
            timing(20, 5),
            timing(5, 20),
            timing(15, 0),
            timing(2, 5),
        ];
        const PERIODS: usize = 4;

        for config in configs {
            // Initiator: transmit slot, then receive slot, every period.
            let radio = CountingRadio::new();
            let mut pipe = MessagePipe::default();
            let mut session = Session::initiate(0, config);
            session.sleep_until_start();
            for period in 0..PERIODS {
                assert_eq!(
                    session.execute_current_action(&radio, &mut pipe),
                    AgentAction::Receive,
                    "{config:?} period {period}"
                );
                assert_eq!(radio.take_observed_actions(), (1, 0), "{config:?} period {period}");
                assert_eq!(
                    session.execute_current_action(&radio, &mut pipe),
                    AgentAction::RetransmitMessage,
                    "{config:?} period {period}"
                );
                assert_eq!(radio.take_observed_actions(), (0, 1), "{config:?} period {period}");
            }

            // Follower: receive slot first, then transmit slot.
            let radio = CountingRadio::new();
            let mut session = Session::follow(Instant::now(), 0, config);
            for period in 0..PERIODS {
                let transmit_action = if period == 0 {
                    AgentAction::TransmitNextMessage
                } else {
                    AgentAction::RetransmitMessage
                };
                assert_eq!(
                    session.execute_current_action(&radio, &mut pipe),
                    transmit_action,
                    "{config:?} period {period}"
                );
                assert_eq!(radio.take_observed_actions(), (0, 1), "{config:?} period {period}");
                assert_eq!(
                    session.execute_current_action(&radio, &mut pipe),
                    AgentAction::Receive,
                    "{config:?} period {period}"
                );
                assert_eq!(radio.take_observed_actions(), (1, 0), "{config:?} period {period}");
            }
        }
    }

    #[test]
    fn test_sub_millisecond_slots() {
        let radio = CountingRadio::new();
        let mut pipe = MessagePipe::default();
        let config = SlotTiming {
            transmit_duration: Duration::from_micros(250),
            gap_duration: Duration::from_micros(100),
        };
        let mut session = Session::follow(Instant::now(), 0, config);

        for i in 0..20 {
            let transmit_action = if i == 0 {
                AgentAction::TransmitNextMessage
            } else {
                AgentAction::RetransmitMessage
            };
            assert_eq!(session.execute_current_action(&radio, &mut pipe), transmit_action, "step {i}");
            assert_eq!(radio.take_observed_actions(), (0, 1), "step {i}");
            assert_eq!(
                session.execute_current_action(&radio, &mut pipe),
                AgentAction::Receive,
                "step {i}"
            );
            assert_eq!(radio.take_observed_actions(), (1, 0), "step {i}");
        }
    }

    #[test]
    fn test_next_action_peeks_without_executing() {
        let session = Session::follow(Instant::now(), 0, timing(10, 10));
        assert_eq!(session.next_action(), AgentAction::Receive);
        assert_eq!(session.next_action(), AgentAction::Receive);
    }

    #[test]
    fn test_ping_pong_over_loopback() {
        const PERIODS: usize = 5;
        let radio = LoopbackRadio::new(Duration::from_millis(8));
        let session_timing = timing(10, 5);

        let (pings_seen, ping_sink) = collecting_sink();
        let (pongs_seen, pong_sink) = collecting_sink();
        let mut ping_pipe = MessagePipe::new(text_source("PING"), pong_sink);
        let mut pong_pipe = MessagePipe::new(text_source("PONG"), ping_sink);

        let mut pinger = Session::initiate(0, session_timing);
        let mut ponger = Session::follow(pinger.start_time(), 0, session_timing);

        std::thread::scope(|scope| {
            let radio = &radio;
            scope.spawn(move || {
                ponger.sleep_until_start();
                for i in 0..PERIODS {
                    assert_eq!(
                        ponger.execute_current_action(radio, &mut pong_pipe),
                        AgentAction::TransmitNextMessage,
                        "ponger period {i}"
                    );
                    assert_eq!(
                        ponger.execute_current_action(radio, &mut pong_pipe),
                        AgentAction::Receive,
                        "ponger period {i}"
                    );
                }
            });

            pinger.sleep_until_start();
            let mut acks = Vec::new();
            for i in 0..PERIODS {
                assert_eq!(
                    pinger.execute_current_action(radio, &mut ping_pipe),
                    AgentAction::Receive,
                    "pinger period {i}"
                );
                assert_eq!(
                    pinger.execute_current_action(radio, &mut ping_pipe),
                    AgentAction::TransmitNextMessage,
                    "pinger period {i}"
                );
                acks.push(pinger.last_acked_sent_sn());
            }
            assert_acks_monotonic(&acks);
        });

        // One payload always stays buffered pending a strictly newer SN, so
        // five periods release four messages on each side, in order.
        let pongs: Vec<String> = pongs_seen.lock().unwrap().iter().map(payload_text).collect();
        assert_eq!(pongs, ["PONG 0", "PONG 1", "PONG 2", "PONG 3"]);
        let pings: Vec<String> = pings_seen.lock().unwrap().iter().map(payload_text).collect();
        assert_eq!(pings, ["PING 0", "PING 1", "PING 2", "PING 3"]);
    }

    #[test]
    fn test_ping_pong_with_every_fourth_transmission_lost() {
        const PERIODS: usize = 8;
        // Dropping every fourth transmission kills each of the ponger's
        // fresh data packets from the second period on: the pinger NACKs,
        // the ponger retransmits, and the pair settles into a 1:1 cadence.
        let radio = FallibleRadio::new(Duration::from_millis(8), 4, 0);
        let session_timing = timing(10, 5);

        let mut ping_pipe = MessagePipe::with_source(text_source("PING"));
        let mut pong_pipe = MessagePipe::with_source(text_source("PONG"));

        let mut pinger = Session::initiate(0, session_timing);
        let mut ponger = Session::follow(pinger.start_time(), 0, session_timing);

        std::thread::scope(|scope| {
            let radio = &radio;
            scope.spawn(move || {
                ponger.sleep_until_start();
                for i in 0..PERIODS {
                    let transmit_action = if i > 1 && (i + 1) % 2 == 1 {
                        AgentAction::RetransmitMessage
                    } else {
                        AgentAction::TransmitNextMessage
                    };
                    assert_eq!(
                        ponger.execute_current_action(radio, &mut pong_pipe),
                        transmit_action,
                        "ponger period {i}"
                    );
                    assert_eq!(
                        ponger.execute_current_action(radio, &mut pong_pipe),
                        AgentAction::Receive,
                        "ponger period {i}"
                    );
                    assert!(!ponger.is_complete(), "ponger period {i}");
                }
            });

            pinger.sleep_until_start();
            let mut acks = Vec::new();
            for i in 0..PERIODS {
                let transmit_action = if (i + 1) % 2 == 1 {
                    AgentAction::TransmitNextMessage
                } else {
                    AgentAction::TransmitNack
                };
                assert_eq!(
                    pinger.execute_current_action(radio, &mut ping_pipe),
                    AgentAction::Receive,
                    "pinger period {i}"
                );
                assert_eq!(
                    pinger.execute_current_action(radio, &mut ping_pipe),
                    transmit_action,
                    "pinger period {i}"
                );
                acks.push(pinger.last_acked_sent_sn());
                assert!(!pinger.is_complete(), "pinger period {i}");
            }
            assert_acks_monotonic(&acks);
        });
    }

    #[test]
    fn test_timeout_exhaustion_terminates_session() {
        // Transmissions succeed but every receive slot is empty: the
        // session NACKs through its timeout budget, then gives up.
        let radio = CountingRadio::with_capabilities(true, false, Duration::ZERO);
        let mut pipe = MessagePipe::default();
        let mut session = Session::follow(Instant::now(), 0, timing(5, 2));

        let mut nacks_returned = 0;
        loop {
            match session.execute_current_action(&radio, &mut pipe) {
                AgentAction::TransmitNack => nacks_returned += 1,
                AgentAction::Receive => {}
                AgentAction::TerminateSession => break,
                other => panic!("unexpected action {other:?}"),
            }
            assert!(nacks_returned <= TIMEOUT_LIMIT + 1, "session never gave up");
        }

        assert_eq!(nacks_returned, TIMEOUT_LIMIT + 1);
        assert!(!session.is_complete());
        assert_eq!(
            session.execute_current_action(&radio, &mut pipe),
            AgentAction::SessionComplete
        );
        assert!(session.is_complete());
    }

    #[test]
    fn test_same_sn_retransmit_supersedes_buffered_payload() {
        // A retransmission of the SN we already buffered replaces the
        // payload without delivering the stale copy.
        let deliveries = Arc::new(Mutex::new(Vec::new()));
        let sink_store = Arc::clone(&deliveries);
        let mut pipe = MessagePipe::new(
            || None,
            move |payload: PacketPayload| sink_store.lock().unwrap().push(payload),
        );

        let injected = Arc::new(Mutex::new(Vec::<SessionPacket>::new()));
        let source = Arc::clone(&injected);
        let radio = CountingRadio::with_injected(
            true,
            move |out| {
                let packet = source.lock().unwrap().remove(0);
                let wire = packet.serialize();
                out[..wire.len()].copy_from_slice(&wire);
                Ok(())
            },
            Duration::ZERO,
        );

        let mut first = SessionPacket {
            session_id: 0,
            subtype: SessionSubtype::Data,
            length: 1,
            // Acks the follower's fictitious sn (MAX) and carries sn 0.
            nesn: SequenceNumber::new(0),
            sn: SequenceNumber::new(0),
            ..SessionPacket::default()
        };
        first.payload[0] = 0xAA;
        // Same sn, different payload, acking the follower's sn 0.
        let mut superseding = first;
        superseding.nesn = SequenceNumber::new(1);
        superseding.payload[0] = 0xBB;
        // Strictly newer sn, acking the follower's sn 1.
        let mut advancing = first;
        advancing.nesn = SequenceNumber::new(2);
        advancing.sn = SequenceNumber::new(1);
        advancing.payload[0] = 0xCC;
        *injected.lock().unwrap() = vec![first, superseding, advancing];

        let mut session = Session::follow(Instant::now(), 0, timing(4, 1));
        // Receive "first", transmit, receive "superseding", transmit,
        // receive "advancing": only then is a payload released, and it is
        // the superseding copy.
        for _ in 0..5 {
            session.execute_current_action(&radio, &mut pipe);
        }

        let seen = deliveries.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0][0], 0xBB);
    }

    #[test]
    #[should_panic(expected = "inconsistent")]
    fn test_inconsistent_peer_state_is_fatal() {
        // A data packet whose nesn neither acks nor re-requests our last
        // transmission has no legal transition.
        let bogus = SessionPacket {
            session_id: 0,
            subtype: SessionSubtype::Data,
            nesn: SequenceNumber::new(77),
            sn: SequenceNumber::new(3),
            ..SessionPacket::default()
        };
        let radio = CountingRadio::with_injected(
            true,
            move |out| {
                let wire = bogus.serialize();
                out[..wire.len()].copy_from_slice(&wire);
                Ok(())
            },
            Duration::ZERO,
        );
        let mut pipe = MessagePipe::default();
        let mut session = Session::follow(Instant::now(), 0, timing(4, 1));
        session.execute_current_action(&radio, &mut pipe);
    }
}
