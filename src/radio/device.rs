//! Character-device radio binding.
//!
//! The register-level SX127x driver lives in the kernel and exposes the
//! transceiver as a character device: a write queues one transmission, a
//! read drains whatever the radio has received. This binding is the thin
//! user-space shell over that device; tuning (frequency, bandwidth, coding
//! rate) happens through the driver's ioctls and is not this crate's
//! concern.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::constants::{FIFO_CAPACITY, SESSION_TRANSMIT_DURATION};

use super::{Radio, RadioError, RadioResult};

/// A [`Radio`] backed by the kernel driver's character device.
#[derive(Debug)]
pub struct CharDeviceRadio {
    device: Mutex<File>,
    receive_timeout: Duration,
    poll_interval: Duration,
}

impl CharDeviceRadio {
    /// Device node the kernel driver registers by default.
    pub const DEFAULT_PATH: &'static str = "/dev/lc_spi";

    /// Open the radio device at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RadioError> {
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|_| RadioError::InitializationFailed)?;
        Ok(Self {
            device: Mutex::new(device),
            receive_timeout: SESSION_TRANSMIT_DURATION,
            poll_interval: Duration::from_millis(10),
        })
    }

    /// Replace the default receive timeout (one session transmit slot).
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }
}

impl Radio for CharDeviceRadio {
    fn transmit(&self, bytes: &[u8]) -> RadioResult {
        if bytes.is_empty() || bytes.len() > FIFO_CAPACITY {
            return Err(RadioError::BadBufferSize);
        }
        let mut device = match self.device.lock() {
            Ok(device) => device,
            Err(_) => return Err(RadioError::Unspecified),
        };
        trace!(bytes = bytes.len(), "writing transmission to device");
        device
            .write_all(bytes)
            .map_err(|_| RadioError::Unspecified)?;
        Ok(())
    }

    fn receive(&self, buffer_out: &mut [u8]) -> RadioResult {
        if buffer_out.len() < self.max_message_length() {
            return Err(RadioError::BadBufferSize);
        }
        let deadline = Instant::now() + self.receive_timeout;
        loop {
            {
                let mut device = match self.device.lock() {
                    Ok(device) => device,
                    Err(_) => return Err(RadioError::Unspecified),
                };
                // The driver's read returns zero bytes when its ring buffer
                // is empty rather than blocking.
                match device.read(buffer_out) {
                    Ok(0) => {}
                    Ok(read) => {
                        trace!(bytes = read, "drained reception from device");
                        return Ok(());
                    }
                    Err(_) => return Err(RadioError::Unspecified),
                }
            }
            if Instant::now() >= deadline {
                return Err(RadioError::Timeout);
            }
            thread::sleep(self.poll_interval);
        }
    }

    fn max_message_length(&self) -> usize {
        FIFO_CAPACITY
    }
}
