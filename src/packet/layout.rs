//! Field descriptor tables and layout invariant validation.
//!
//! Every packet type owns a static table describing where each of its fields
//! sits in the serialized image. The codec walks these tables for both
//! serialization and deserialization, so the two are inverses by
//! construction. [`validate`] checks the structural invariants of a table;
//! a unit test in the codec module runs it over every packet kind.

use std::fmt;

use bitflags::bitflags;
use thiserror::Error;

use crate::constants::FIFO_CAPACITY;

bitflags! {
    /// Per-field layout flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FieldFlags: u32 {
        /// The field is allowed to share bits with other fields.
        const MAY_OVERLAP = 1;
        /// A zero value encodes the field's maximum. Reserved for a future
        /// packed encoding of the payload length; no field sets it yet.
        const ZERO_ENCODES_MAX = 2;
    }
}

/// Identifies a field within a packet's wire image.
///
/// The id space is shared across packet kinds; each kind's descriptor table
/// selects the subset it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldId {
    /// Session identifier (u32).
    SessionId,
    /// Session packet subtype.
    Subtype,
    /// Payload length in use.
    Length,
    /// Next expected sequence number.
    Nesn,
    /// Sender's sequence number.
    Sn,
    /// Fixed-width payload block.
    Payload,
    /// Sender's link address.
    SourceAddress,
    /// Addressee's link address.
    TargetAddress,
    /// Agreed session start as a wire time.
    SessionStartTime,
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldId::SessionId => "session-id",
            FieldId::Subtype => "subtype",
            FieldId::Length => "length",
            FieldId::Nesn => "nesn",
            FieldId::Sn => "sn",
            FieldId::Payload => "payload",
            FieldId::SourceAddress => "source-address",
            FieldId::TargetAddress => "target-address",
            FieldId::SessionStartTime => "session-start-time",
        };
        f.write_str(name)
    }
}

/// Placement of one field within a packet's field block.
///
/// `start_bit` is relative to the start of the field block, i.e. it does not
/// include the leading type tag; the codec adds the tag offset when copying.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Which field this descriptor places.
    pub id: FieldId,
    /// First bit of the field, counted from the start of the field block.
    pub start_bit: usize,
    /// Width of the field in bits.
    pub width_bits: usize,
    /// Layout flags.
    pub flags: FieldFlags,
}

impl FieldSpec {
    /// Shorthand for a flag-less descriptor.
    pub const fn new(id: FieldId, start_bit: usize, width_bits: usize) -> Self {
        Self {
            id,
            start_bit,
            width_bits,
            flags: FieldFlags::empty(),
        }
    }

    /// First bit past the end of the field.
    pub const fn end_bit(&self) -> usize {
        self.start_bit + self.width_bits
    }
}

/// A violation of the layout invariants.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    /// A field extends past the end of the packet image.
    #[error("field {field} ends at bit {end_bit}, past the {total_bits}-bit image")]
    Overextension {
        /// The offending field.
        field: FieldId,
        /// Where the field ends.
        end_bit: usize,
        /// Total width of the packet image.
        total_bits: usize,
    },

    /// Two fields without `MAY_OVERLAP` share bits.
    #[error("fields {first} and {second} overlap")]
    Overlap {
        /// The lower of the two fields.
        first: FieldId,
        /// The field it protrudes onto.
        second: FieldId,
    },

    /// A field does not start or end on a byte boundary.
    #[error("field {field} is not byte-aligned")]
    Misaligned {
        /// The offending field.
        field: FieldId,
    },

    /// The serialized packet does not fit in the radio FIFO.
    #[error("packet image is {bytes} bytes, the radio FIFO holds {FIFO_CAPACITY}")]
    ExceedsFifo {
        /// Serialized size of the packet.
        bytes: usize,
    },
}

/// Check the structural invariants of a descriptor table.
///
/// `total_bits` is the full width of the packet image including the type
/// tag; `tag_bits` is the width of that tag (field offsets are relative to
/// the end of it). Verifies that no field overextends, that fields are
/// byte-aligned, that non-overlappable fields do not intersect, and that the
/// image fits in the radio FIFO. A failure here is a programming error in a
/// descriptor table, so callers treat it as fatal.
pub fn validate(
    fields: &[FieldSpec],
    tag_bits: usize,
    total_bits: usize,
) -> Result<(), LayoutError> {
    for f1 in fields {
        if tag_bits + f1.end_bit() > total_bits {
            return Err(LayoutError::Overextension {
                field: f1.id,
                end_bit: tag_bits + f1.end_bit(),
                total_bits,
            });
        }
        if f1.start_bit % 8 != 0 || f1.width_bits % 8 != 0 {
            return Err(LayoutError::Misaligned { field: f1.id });
        }
        if f1.flags.contains(FieldFlags::MAY_OVERLAP) {
            continue;
        }
        for f2 in fields {
            if f1.id == f2.id || f2.flags.contains(FieldFlags::MAY_OVERLAP) {
                continue;
            }
            // f1 protrudes onto f2 from below.
            if f1.start_bit <= f2.start_bit && f1.end_bit() > f2.start_bit {
                return Err(LayoutError::Overlap {
                    first: f1.id,
                    second: f2.id,
                });
            }
        }
    }

    let bytes = (total_bits + 7) / 8;
    if bytes > FIFO_CAPACITY {
        return Err(LayoutError::ExceedsFifo { bytes });
    }

    Ok(())
}

/// Render a descriptor table as a per-byte column diagram, for debugging
/// layout changes.
///
/// The tag bytes print as `TG`; each field's bytes print as a two-letter
/// code (`FA` for the first field, `FB` for the second, ...).
pub fn diagram(fields: &[FieldSpec], tag_bits: usize, total_bits: usize) -> String {
    let total_bytes = (total_bits + 7) / 8;
    let mut columns = vec!["..".to_string(); total_bytes];

    for byte in 0..tag_bits / 8 {
        columns[byte] = "TG".to_string();
    }

    const ALPHABET: usize = 26;
    for (i, f) in fields.iter().enumerate() {
        let prefix = (b'F' + (i / ALPHABET) as u8) as char;
        let suffix = (b'A' + (i % ALPHABET) as u8) as char;
        let start = (tag_bits + f.start_bit) / 8;
        let bytes = f.width_bits / 8;
        for column in columns.iter_mut().skip(start).take(bytes) {
            *column = format!("{prefix}{suffix}");
        }
    }

    columns.join(" ")
}
