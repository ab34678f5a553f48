//! Protocol agent: the pre-session control plane.
//!
//! An agent owns one radio and works toward its connection goal: it
//! advertises its presence, seeks other advertisers, runs the handshake
//! that schedules a session, and then drives that session one action at a
//! time. The caller pumps the agent by invoking
//! [`execute_agent_action`](ProtocolAgent::execute_agent_action) in a loop;
//! each call performs one state's worth of work and may block or sleep, but
//! never spawns threads.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::clock::{AdvertisingClock, Schedule};
use crate::constants::{
    ADVERTISING_SLEEP_DURATION, ADVERTISING_TRANSMIT_DURATION, CONNECTION_REQUEST_WINDOW,
    HANDSHAKE_LEAD_TIME, HANDSHAKE_RECEIVE_DURATION, PEND_SLEEP_TIME,
};
use crate::packet::{
    deserialize, Address, AdvertisingPacket, ConnectionAcceptPacket, ConnectionRequestPacket,
    ReceiveBuffer,
};
use crate::radio::{Radio, RadioError};
use crate::session::{AgentAction, MessagePipe, Role, Session, SlotTiming};
use crate::wire_time::{deserialize_wire_time, future_wire_time};

/// What the application currently wants from the link.
///
/// Read-mostly: the agent samples it on every dispatch, so a change takes
/// effect at the next dispatch rather than immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionGoal {
    /// Stay off the air.
    Disconnect = 0,
    /// Listen for an advertiser and connect to it.
    SeekConnection = 1,
    /// Broadcast presence and accept a requester.
    AdvertiseConnection = 2,
    /// Alternate between advertising and seeking.
    SeekAndAdvertise = 3,
}

impl ConnectionGoal {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ConnectionGoal::Disconnect),
            1 => Some(ConnectionGoal::SeekConnection),
            2 => Some(ConnectionGoal::AdvertiseConnection),
            3 => Some(ConnectionGoal::SeekAndAdvertise),
            _ => None,
        }
    }
}

/// Shared handle for setting an agent's goal.
///
/// The goal is the only agent state touched from outside the execution
/// thread, so it lives in an atomic cell; release/acquire ordering is all
/// the exchange needs.
#[derive(Debug, Clone)]
pub struct GoalHandle(Arc<AtomicU8>);

impl GoalHandle {
    fn new(goal: ConnectionGoal) -> Self {
        Self(Arc::new(AtomicU8::new(goal as u8)))
    }

    /// Replace the goal; the agent notices at its next dispatch.
    pub fn set(&self, goal: ConnectionGoal) {
        self.0.store(goal as u8, Ordering::Release);
    }

    /// The goal as last set.
    pub fn get(&self) -> ConnectionGoal {
        ConnectionGoal::from_byte(self.0.load(Ordering::Acquire))
            .unwrap_or(ConnectionGoal::Disconnect)
    }
}

/// Outer protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgentState {
    Dispatch,
    Pend,
    Advertise,
    Seek,
    HandshakeFromSeek,
    HandshakeFromAdvertise,
    Session,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentState::Dispatch => "<Dispatch>",
            AgentState::Pend => "<Pend>",
            AgentState::Advertise => "<Advertise>",
            AgentState::Seek => "<Seek>",
            AgentState::HandshakeFromSeek => "<HandshakeFromSeek>",
            AgentState::HandshakeFromAdvertise => "<HandshakeFromAdvertise>",
            AgentState::Session => "<Session>",
        };
        f.write_str(name)
    }
}

/// Timing knobs of one agent. The defaults reproduce the reference
/// deployment; tests shrink them.
#[derive(Debug, Clone, Copy)]
pub struct AgentConfig {
    /// Future offset written into connection-accepts.
    pub handshake_lead_time: Duration,
    /// Time budgeted for one advertisement transmission.
    pub advertise_duration: Duration,
    /// How long an advertiser listens for a connection-request.
    pub response_wait_duration: Duration,
    /// Inactive tail of the advertising period.
    pub advertising_sleep_duration: Duration,
    /// How long a requester listens for a connection-accept.
    pub handshake_receive_duration: Duration,
    /// Sleep between pend wake-ups.
    pub pend_sleep_time: Duration,
    /// Slot timing handed to sessions this agent creates.
    pub slot_timing: SlotTiming,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            handshake_lead_time: HANDSHAKE_LEAD_TIME,
            advertise_duration: ADVERTISING_TRANSMIT_DURATION,
            response_wait_duration: CONNECTION_REQUEST_WINDOW,
            advertising_sleep_duration: ADVERTISING_SLEEP_DURATION,
            handshake_receive_duration: HANDSHAKE_RECEIVE_DURATION,
            pend_sleep_time: PEND_SLEEP_TIME,
            slot_timing: SlotTiming::default(),
        }
    }
}

/// One peer's control-plane state machine.
///
/// Single-threaded and cooperative: the owning thread repeatedly calls
/// [`execute_agent_action`](Self::execute_agent_action). Other threads may
/// only touch the goal, through [`goal_handle`](Self::goal_handle).
pub struct ProtocolAgent<'r, R: Radio + ?Sized> {
    address: Address,
    radio: &'r R,
    pipe: MessagePipe,
    config: AgentConfig,
    session: Option<Session>,
    /// Peer remembered between a discovery state and its handshake: the
    /// advertiser pulled out of Seek, or the requester pulled out of
    /// Advertise.
    counterparty: Option<Address>,
    state: AgentState,
    prior_state: AgentState,
    goal: GoalHandle,
}

impl<'r, R: Radio + ?Sized> ProtocolAgent<'r, R> {
    /// An agent with default timing.
    pub fn new(address: Address, radio: &'r R, pipe: MessagePipe) -> Self {
        Self::with_config(address, radio, pipe, AgentConfig::default())
    }

    /// An agent with explicit timing.
    pub fn with_config(
        address: Address,
        radio: &'r R,
        pipe: MessagePipe,
        config: AgentConfig,
    ) -> Self {
        Self {
            address,
            radio,
            pipe,
            config,
            session: None,
            counterparty: None,
            state: AgentState::Dispatch,
            prior_state: AgentState::Pend,
            goal: GoalHandle::new(ConnectionGoal::Disconnect),
        }
    }

    /// This agent's link address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Set the goal from the agent's own thread.
    pub fn set_goal(&self, goal: ConnectionGoal) {
        self.goal.set(goal);
    }

    /// A handle other threads can set the goal through.
    pub fn goal_handle(&self) -> GoalHandle {
        self.goal.clone()
    }

    /// Whether the agent is currently inside a session.
    pub fn in_session(&self) -> bool {
        self.state == AgentState::Session
    }

    /// Perform one state's worth of work.
    ///
    /// Dispatch is not an observable action of its own: a call that finds
    /// the agent in dispatch both picks the next state and executes it.
    pub fn execute_agent_action(&mut self) {
        if self.state == AgentState::Dispatch {
            self.dispatch_next_state();
        }

        match self.state {
            AgentState::Dispatch => unreachable!("dispatch selected the dispatch state"),
            AgentState::Pend => self.pend(),
            AgentState::Seek => self.seek(),
            AgentState::Advertise => self.advertise(),
            AgentState::HandshakeFromSeek => self.request_connection(),
            AgentState::HandshakeFromAdvertise => self.accept_connection(),
            AgentState::Session => self.execute_session(),
        }
    }

    fn change_state(&mut self, new_state: AgentState) {
        debug!(agent = self.address, from = %self.state, to = %new_state, "state change");
        self.prior_state = self.state;
        self.state = new_state;
    }

    fn dispatch_next_state(&mut self) {
        let next_state = match self.goal.get() {
            ConnectionGoal::Disconnect => AgentState::Pend,
            ConnectionGoal::SeekConnection => AgentState::Seek,
            ConnectionGoal::AdvertiseConnection => AgentState::Advertise,
            // Alternate, with hysteresis on what we did last.
            ConnectionGoal::SeekAndAdvertise => {
                if self.prior_state == AgentState::Advertise {
                    AgentState::Seek
                } else {
                    AgentState::Advertise
                }
            }
        };
        self.change_state(next_state);
    }

    fn pend(&mut self) {
        thread::sleep(self.config.pend_sleep_time);
        self.change_state(AgentState::Dispatch);
    }

    /// Listen once; a valid advertisement moves us into the requester side
    /// of the handshake.
    fn seek(&mut self) {
        let next_state = match self.receive_packet() {
            Ok(buffer) => match deserialize::<AdvertisingPacket>(buffer.as_slice()) {
                Some(advert) => {
                    debug!(advertiser = advert.source_address, "heard an advertisement");
                    self.counterparty = Some(advert.source_address);
                    AgentState::HandshakeFromSeek
                }
                None => AgentState::Dispatch,
            },
            Err(_) => AgentState::Dispatch,
        };
        self.change_state(next_state);
    }

    /// Broadcast our presence, then hold the response window open for a
    /// connection-request addressed to us.
    fn advertise(&mut self) {
        let clock = AdvertisingClock::new(
            Instant::now(),
            self.config.advertise_duration,
            self.config.response_wait_duration,
            self.config.advertising_sleep_duration,
        );

        let advert = AdvertisingPacket {
            source_address: self.address,
        };
        if let Err(error) = self.radio.transmit(&advert.serialize()) {
            warn!(%error, "failed to transmit advertisement");
            self.change_state(AgentState::Dispatch);
            return;
        }
        trace!(agent = self.address, "transmitted advertisement");

        let window_end =
            clock.next_transition(clock.start_time() + self.config.advertise_duration);
        while Instant::now() < window_end {
            let Ok(buffer) = self.receive_packet() else {
                continue;
            };
            let Some(request) = deserialize::<ConnectionRequestPacket>(buffer.as_slice()) else {
                continue;
            };
            if request.target_address != self.address {
                trace!(
                    requester = request.source_address,
                    target = request.target_address,
                    "connection-request for another peer"
                );
                continue;
            }
            debug!(requester = request.source_address, "received connection-request");
            self.counterparty = Some(request.source_address);
            self.change_state(AgentState::HandshakeFromAdvertise);
            return;
        }

        // Sleep out the inactive tail of the advertising period, if any.
        let period_end = clock.start_time() + clock.period();
        thread::sleep(period_end.saturating_duration_since(Instant::now()));
        self.change_state(AgentState::Dispatch);
    }

    /// Requester side of the handshake: ask the remembered advertiser for a
    /// session and wait for its accept.
    fn request_connection(&mut self) {
        let Some(advertiser) = self.counterparty.take() else {
            // Lost the handshake target; dispatch re-derives a sane state.
            self.change_state(AgentState::Dispatch);
            return;
        };

        let request = ConnectionRequestPacket {
            source_address: self.address,
            target_address: advertiser,
        };
        if let Err(error) = self.radio.transmit(&request.serialize()) {
            warn!(%error, "failed to transmit connection-request");
            self.change_state(AgentState::Dispatch);
            return;
        }
        debug!(advertiser, "transmitted connection-request");

        let deadline = Instant::now() + self.config.handshake_receive_duration;
        while Instant::now() < deadline {
            let Ok(buffer) = self.receive_packet() else {
                continue;
            };
            let Some(accept) = deserialize::<ConnectionAcceptPacket>(buffer.as_slice()) else {
                continue;
            };
            if accept.target_address != self.address {
                trace!(target = accept.target_address, "connection-accept for another peer");
                continue;
            }

            let start_time = deserialize_wire_time(accept.session_start_time);
            debug!(session_id = accept.session_id, "connection accepted; joining session");
            let session = Session::follow(start_time, accept.session_id, self.config.slot_timing);
            self.change_state(AgentState::Session);
            session.sleep_until_start();
            self.session = Some(session);
            return;
        }

        debug!(advertiser, "connection-request went unanswered");
        self.change_state(AgentState::Dispatch);
    }

    /// Advertiser side of the handshake: grant the remembered requester a
    /// session starting one lead time from now.
    fn accept_connection(&mut self) {
        let Some(requester) = self.counterparty.take() else {
            self.change_state(AgentState::Dispatch);
            return;
        };

        let accept = ConnectionAcceptPacket {
            source_address: self.address,
            target_address: requester,
            session_start_time: future_wire_time(self.config.handshake_lead_time),
            session_id: rand::random(),
        };
        // Decode our own start time from the packet, so both peers anchor
        // the slot schedule on the identical wire instant.
        let start_time = deserialize_wire_time(accept.session_start_time);
        let session = Session::new(
            start_time,
            accept.session_id,
            self.config.slot_timing,
            Role::Initiator,
        );

        if let Err(error) = self.radio.transmit(&accept.serialize()) {
            warn!(%error, "failed to transmit connection-accept");
            self.change_state(AgentState::Pend);
            return;
        }
        debug!(
            requester,
            session_id = accept.session_id,
            "transmitted connection-accept; initiating session"
        );
        self.change_state(AgentState::Session);
        session.sleep_until_start();
        self.session = Some(session);
    }

    /// One session action, unwinding to pend when the session ends or the
    /// application asked to disconnect.
    fn execute_session(&mut self) {
        let Some(mut session) = self.session.take() else {
            self.change_state(AgentState::Pend);
            return;
        };

        let action = session.execute_current_action(self.radio, &mut self.pipe);
        if action == AgentAction::SessionComplete {
            debug!(id = session.id(), "session complete");
            self.change_state(AgentState::Pend);
            return;
        }
        if self.goal.get() == ConnectionGoal::Disconnect {
            // No graceful teardown yet; the peer discovers the end through
            // its timeout budget.
            debug!(id = session.id(), "abandoning session on disconnect goal");
            self.change_state(AgentState::Pend);
            return;
        }
        self.session = Some(session);
    }

    fn receive_packet(&self) -> Result<ReceiveBuffer, RadioError> {
        let mut buffer = ReceiveBuffer::default();
        match self.radio.receive(buffer.as_mut_slice()) {
            Ok(()) => Ok(buffer),
            Err(error) => {
                trace!(%error, "receive produced nothing");
                Err(error)
            }
        }
    }
}
