//! 8-bit modular sequence numbers.
//!
//! Session packets carry two of these: the sender's own sequence number (SN)
//! and the next sequence number it expects from its peer (NESN). All
//! arithmetic wraps mod 256; comparison is on the raw value. Wraparound is
//! deliberately NOT detected here: the session engine only ever reasons
//! about equality and ±1 adjacency.

use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A wrapping 8-bit sequence number.
///
/// Both zero and the maximum value are ordinary states; `MAX + 1 == 0` and
/// `0 - 1 == MAX`. The derived ordering compares raw values, not
/// nearest-modular-predecessor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceNumber(u8);

impl SequenceNumber {
    /// Largest representable sequence number (255).
    pub const MAX: SequenceNumber = SequenceNumber(u8::MAX);

    /// Create a sequence number from a raw value.
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// Raw numeric value.
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl Add<u8> for SequenceNumber {
    type Output = Self;

    fn add(self, rhs: u8) -> Self {
        Self(self.0.wrapping_add(rhs))
    }
}

impl Sub<u8> for SequenceNumber {
    type Output = Self;

    fn sub(self, rhs: u8) -> Self {
        Self(self.0.wrapping_sub(rhs))
    }
}

impl Add for SequenceNumber {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0))
    }
}

impl Sub for SequenceNumber {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.wrapping_sub(rhs.0))
    }
}

impl AddAssign<u8> for SequenceNumber {
    fn add_assign(&mut self, rhs: u8) {
        self.0 = self.0.wrapping_add(rhs);
    }
}

impl SubAssign<u8> for SequenceNumber {
    fn sub_assign(&mut self, rhs: u8) {
        self.0 = self.0.wrapping_sub(rhs);
    }
}

impl AddAssign for SequenceNumber {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.wrapping_add(rhs.0);
    }
}

impl SubAssign for SequenceNumber {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 = self.0.wrapping_sub(rhs.0);
    }
}

impl From<u8> for SequenceNumber {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}
