//! Radio test doubles.
//!
//! Three in-process stand-ins for the physical transceiver:
//!
//! - [`CountingRadio`] records how often each operation ran, optionally
//!   failing or injecting received bytes;
//! - [`LoopbackRadio`] carries transmissions to concurrent receivers within
//!   a delivery window, modelling the shared air between two agents;
//! - [`FallibleRadio`] wraps a loopback and drops every Nth transmission or
//!   reception.
//!
//! They live in the library rather than under `#[cfg(test)]` so integration
//! tests and downstream users can drive an agent without hardware.

use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use super::{Radio, RadioError, RadioResult};

/// Closure type for injecting received bytes into a [`CountingRadio`].
pub type InjectFn = Box<dyn Fn(&mut [u8]) -> RadioResult + Send + Sync>;

/// Records transmit/receive activity; never moves real data unless an
/// injection closure is installed.
pub struct CountingRadio {
    can_transmit: bool,
    can_receive: bool,
    inject: Option<InjectFn>,
    action_time: Duration,
    observed: Mutex<(u32, u32)>,
}

impl CountingRadio {
    /// A radio where both operations succeed instantly (receives produce a
    /// zeroed buffer).
    pub fn new() -> Self {
        Self {
            can_transmit: true,
            can_receive: true,
            ..Self::disabled()
        }
    }

    /// Like [`new`](Self::new), but each operation takes `action_time`.
    pub fn with_action_time(action_time: Duration) -> Self {
        Self {
            action_time,
            ..Self::new()
        }
    }

    /// Choose which operations succeed; the other returns
    /// [`RadioError::Timeout`].
    pub fn with_capabilities(
        can_transmit: bool,
        can_receive: bool,
        action_time: Duration,
    ) -> Self {
        Self {
            can_transmit,
            can_receive,
            action_time,
            ..Self::disabled()
        }
    }

    /// Successful receives run `inject` to fill the caller's buffer.
    pub fn with_injected<F>(can_transmit: bool, inject: F, action_time: Duration) -> Self
    where
        F: Fn(&mut [u8]) -> RadioResult + Send + Sync + 'static,
    {
        Self {
            can_transmit,
            can_receive: true,
            inject: Some(Box::new(inject)),
            action_time,
            ..Self::disabled()
        }
    }

    fn disabled() -> Self {
        Self {
            can_transmit: false,
            can_receive: false,
            inject: None,
            action_time: Duration::ZERO,
            observed: Mutex::new((0, 0)),
        }
    }

    /// Return `(transmits, receives)` observed so far and reset both counts.
    pub fn take_observed_actions(&self) -> (u32, u32) {
        let mut observed = self.observed.lock().expect("counter lock poisoned");
        std::mem::take(&mut *observed)
    }
}

impl Radio for CountingRadio {
    fn transmit(&self, _bytes: &[u8]) -> RadioResult {
        thread::sleep(self.action_time);
        self.observed.lock().expect("counter lock poisoned").0 += 1;
        if !self.can_transmit {
            return Err(RadioError::Timeout);
        }
        Ok(())
    }

    fn receive(&self, buffer_out: &mut [u8]) -> RadioResult {
        thread::sleep(self.action_time);
        self.observed.lock().expect("counter lock poisoned").1 += 1;
        if !self.can_receive {
            return Err(RadioError::Timeout);
        }
        match &self.inject {
            Some(inject) => inject(buffer_out),
            None => Ok(()),
        }
    }

    fn max_message_length(&self) -> usize {
        1 << 10
    }
}

/// An in-memory shared air channel.
///
/// A transmission stays "on the air" for the delivery window; one concurrent
/// receiver may pick it up within that window, after which it evaporates.
/// Receives block for at most the same window. Transmitters serialize on an
/// internal gate, like peers sharing a channel.
pub struct LoopbackRadio {
    window: Duration,
    transmit_gate: Mutex<()>,
    inflight: Mutex<Option<Vec<u8>>>,
    delivered: Condvar,
}

impl LoopbackRadio {
    /// A loopback whose delivery window (and receive timeout) is `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            transmit_gate: Mutex::new(()),
            inflight: Mutex::new(None),
            delivered: Condvar::new(),
        }
    }
}

impl Radio for LoopbackRadio {
    fn transmit(&self, bytes: &[u8]) -> RadioResult {
        if bytes.is_empty() || bytes.len() > self.max_message_length() {
            return Err(RadioError::BadBufferSize);
        }
        let _gate = self.transmit_gate.lock().expect("transmit gate poisoned");
        *self.inflight.lock().expect("air lock poisoned") = Some(bytes.to_vec());
        self.delivered.notify_one();
        // Hold the channel for the time-on-air, then expire the
        // transmission if nobody picked it up.
        thread::sleep(self.window);
        self.inflight.lock().expect("air lock poisoned").take();
        Ok(())
    }

    fn receive(&self, buffer_out: &mut [u8]) -> RadioResult {
        let deadline = Instant::now() + self.window;
        let mut inflight = self.inflight.lock().expect("air lock poisoned");
        loop {
            if let Some(message) = inflight.take() {
                if buffer_out.len() < message.len() {
                    return Err(RadioError::BadBufferSize);
                }
                buffer_out[..message.len()].copy_from_slice(&message);
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(RadioError::Timeout);
            }
            let (guard, _) = self
                .delivered
                .wait_timeout(inflight, deadline - now)
                .expect("air lock poisoned");
            inflight = guard;
        }
    }

    fn max_message_length(&self) -> usize {
        1 << 10
    }
}

/// A [`LoopbackRadio`] that injects periodic faults.
///
/// With a failure period of N, every Nth call of that operation reports
/// [`RadioError::Timeout`] without touching the air. A period of zero
/// disables the fault.
pub struct FallibleRadio {
    inner: LoopbackRadio,
    transmit_failure_period: u32,
    reception_failure_period: u32,
    counters: Mutex<(u32, u32)>,
}

impl FallibleRadio {
    /// Wrap a loopback with the given failure periods.
    pub fn new(
        window: Duration,
        transmit_failure_period: u32,
        reception_failure_period: u32,
    ) -> Self {
        Self {
            inner: LoopbackRadio::new(window),
            transmit_failure_period,
            reception_failure_period,
            counters: Mutex::new((0, 0)),
        }
    }
}

impl Radio for FallibleRadio {
    fn transmit(&self, bytes: &[u8]) -> RadioResult {
        if self.transmit_failure_period != 0 {
            let mut counters = self.counters.lock().expect("fault counter poisoned");
            counters.0 = (counters.0 + 1) % self.transmit_failure_period;
            if counters.0 == 0 {
                return Err(RadioError::Timeout);
            }
        }
        self.inner.transmit(bytes)
    }

    fn receive(&self, buffer_out: &mut [u8]) -> RadioResult {
        if self.reception_failure_period != 0 {
            let mut counters = self.counters.lock().expect("fault counter poisoned");
            counters.1 = (counters.1 + 1) % self.reception_failure_period;
            if counters.1 == 0 {
                return Err(RadioError::Timeout);
            }
        }
        self.inner.receive(buffer_out)
    }

    fn max_message_length(&self) -> usize {
        self.inner.max_message_length()
    }
}
