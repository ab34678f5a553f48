//! Packet types and the tagged wire codec.
//!
//! Every wire packet is an 8-bit type tag followed by a fixed field block.
//! The per-type field tables live in descriptor form (see [`layout`]); the
//! codec walks a packet's table for both [`serialize`](SessionPacket::serialize)
//! and [`deserialize`], which makes the two inverses by construction.
//!
//! Wire formats, with offsets from the start of the packet:
//!
//! ```text
//! Session (41 bytes):            tag=0 | session_id u32 | subtype u8 |
//!                                length u8 | nesn u8 | sn u8 | payload 32B
//! ConnectionRequest (9 bytes):   tag=1 | source u32 | target u32
//! ConnectionAccept (21 bytes):   tag=2 | source u32 | target u32 |
//!                                start_time u64 | session_id u32
//! Advertising (5 bytes):         tag=3 | source u32
//! ```
//!
//! Every multi-byte integer is little-endian on the wire; both peers must
//! run this codec (or one bit-compatible with it).

pub mod layout;

use std::fmt;

use crate::constants::{FIFO_CAPACITY, MAX_PAYLOAD_BYTES};
use crate::seq::SequenceNumber;
use crate::wire_time::WireInstant;
use layout::{FieldId, FieldSpec};

/// Width of the packet type tag.
pub const TAG_BITS: usize = 8;

/// Width of the packet type tag in bytes.
pub const TAG_BYTES: usize = 1;

/// A peer's link address.
pub type Address = u32;

/// Identifier of one session between two peers.
pub type SessionId = u32;

/// Fixed-width payload block of a session packet.
pub type PacketPayload = [u8; MAX_PAYLOAD_BYTES];

/// Wire tag discriminating the packet layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    /// In-session data, acknowledgment and NACK traffic.
    Session = 0,
    /// A seeker asking an advertiser for a session.
    ConnectionRequest = 1,
    /// An advertiser granting a session to a requester.
    ConnectionAccept = 2,
    /// Presence broadcast while waiting for a connection-request.
    Advertising = 3,
}

impl PacketKind {
    /// Every defined packet kind, for tests and layout audits.
    pub const ALL: [PacketKind; 4] = [
        PacketKind::Session,
        PacketKind::ConnectionRequest,
        PacketKind::ConnectionAccept,
        PacketKind::Advertising,
    ];

    /// Parse a wire tag.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(PacketKind::Session),
            1 => Some(PacketKind::ConnectionRequest),
            2 => Some(PacketKind::ConnectionAccept),
            3 => Some(PacketKind::Advertising),
            _ => None,
        }
    }

    /// The wire tag value.
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketKind::Session => "session",
            PacketKind::ConnectionRequest => "connection-request",
            PacketKind::ConnectionAccept => "connection-accept",
            PacketKind::Advertising => "advertising",
        };
        f.write_str(name)
    }
}

/// Subtype of a session packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionSubtype {
    /// The last receive slot was empty; the peer should retransmit.
    // Zero doubles as the all-zeroes wire image. Reserved for tightening
    // into an invalid value once a dedicated NACK value is assigned.
    Nack = 0,
    /// A sequenced payload.
    Data = 1,
    /// Reserved: in-session connection request.
    ConnectionRequest = 3,
    /// Reserved: in-session connection accept.
    ConnectionAccept = 4,
}

impl SessionSubtype {
    /// Parse a subtype byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(SessionSubtype::Nack),
            1 => Some(SessionSubtype::Data),
            3 => Some(SessionSubtype::ConnectionRequest),
            4 => Some(SessionSubtype::ConnectionAccept),
            _ => None,
        }
    }

    /// The wire value.
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for SessionSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionSubtype::Nack => "<NACK>",
            SessionSubtype::Data => "<DATA>",
            SessionSubtype::ConnectionRequest => "<CNRQ>",
            SessionSubtype::ConnectionAccept => "<CNAC>",
        };
        f.write_str(name)
    }
}

/// A packet type that can cross the wire.
///
/// Implementors provide their tag, their field descriptor table, and
/// match-on-field access to the typed struct. The generic codec walks the
/// table; a `write_field`/`read_field` pair is only ever invoked with field
/// ids from the implementor's own table, each with a slice exactly as wide
/// as the descriptor says.
pub trait Wire: Default {
    /// The wire tag of this packet type.
    const KIND: PacketKind;

    /// Field placements within this packet's field block.
    const FIELDS: &'static [FieldSpec];

    /// Copy the field's wire image into `dst` (little-endian integers).
    fn write_field(&self, id: FieldId, dst: &mut [u8]);

    /// Load the field from its wire image in `src`. Returns `false` when
    /// the bytes have no representation in the typed field (for example an
    /// unassigned subtype value).
    fn read_field(&mut self, id: FieldId, src: &[u8]) -> bool;
}

/// Serialized size of a packet type: its tag plus the furthest field end,
/// rounded up to whole bytes.
pub const fn wire_width_bytes(fields: &[FieldSpec]) -> usize {
    let mut max_end = 0;
    let mut i = 0;
    while i < fields.len() {
        let end = fields[i].start_bit + fields[i].width_bits;
        if end > max_end {
            max_end = end;
        }
        i += 1;
    }
    (TAG_BITS + max_end + 7) / 8
}

const SESSION_FIELDS: &[FieldSpec] = &[
    FieldSpec::new(FieldId::SessionId, 0, 32),
    FieldSpec::new(FieldId::Subtype, 32, 8),
    FieldSpec::new(FieldId::Length, 40, 8),
    FieldSpec::new(FieldId::Nesn, 48, 8),
    FieldSpec::new(FieldId::Sn, 56, 8),
    FieldSpec::new(FieldId::Payload, 64, MAX_PAYLOAD_BYTES * 8),
];

const CONNECTION_REQUEST_FIELDS: &[FieldSpec] = &[
    FieldSpec::new(FieldId::SourceAddress, 0, 32),
    FieldSpec::new(FieldId::TargetAddress, 32, 32),
];

const CONNECTION_ACCEPT_FIELDS: &[FieldSpec] = &[
    FieldSpec::new(FieldId::SourceAddress, 0, 32),
    FieldSpec::new(FieldId::TargetAddress, 32, 32),
    FieldSpec::new(FieldId::SessionStartTime, 64, 64),
    FieldSpec::new(FieldId::SessionId, 128, 32),
];

const ADVERTISING_FIELDS: &[FieldSpec] = &[FieldSpec::new(FieldId::SourceAddress, 0, 32)];

/// Serialized size of a session packet (41 bytes).
pub const SESSION_PACKET_BYTES: usize = wire_width_bytes(SESSION_FIELDS);

/// Serialized size of a connection-request packet (9 bytes).
pub const CONNECTION_REQUEST_BYTES: usize = wire_width_bytes(CONNECTION_REQUEST_FIELDS);

/// Serialized size of a connection-accept packet (21 bytes).
pub const CONNECTION_ACCEPT_BYTES: usize = wire_width_bytes(CONNECTION_ACCEPT_FIELDS);

/// Serialized size of an advertising packet (5 bytes).
pub const ADVERTISING_PACKET_BYTES: usize = wire_width_bytes(ADVERTISING_FIELDS);

// Every packet must fit in one radio FIFO load.
const _: () = assert!(SESSION_PACKET_BYTES <= FIFO_CAPACITY);
const _: () = assert!(CONNECTION_REQUEST_BYTES <= FIFO_CAPACITY);
const _: () = assert!(CONNECTION_ACCEPT_BYTES <= FIFO_CAPACITY);
const _: () = assert!(ADVERTISING_PACKET_BYTES <= FIFO_CAPACITY);

/// In-session packet: sequenced payload, ack fields, or a NACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPacket {
    /// Session this packet belongs to.
    pub session_id: SessionId,
    /// What the packet means.
    pub subtype: SessionSubtype,
    /// Payload bytes in use.
    pub length: u8,
    /// Next sequence number the sender expects to receive; cumulatively
    /// acknowledges everything below it.
    pub nesn: SequenceNumber,
    /// The sender's sequence number for this packet.
    pub sn: SequenceNumber,
    /// Payload block; bytes past `length` are zero filler.
    pub payload: PacketPayload,
}

impl Default for SessionPacket {
    fn default() -> Self {
        Self {
            session_id: 0,
            subtype: SessionSubtype::Nack,
            length: 0,
            nesn: SequenceNumber::new(0),
            sn: SequenceNumber::new(0),
            payload: [0; MAX_PAYLOAD_BYTES],
        }
    }
}

impl Wire for SessionPacket {
    const KIND: PacketKind = PacketKind::Session;
    const FIELDS: &'static [FieldSpec] = SESSION_FIELDS;

    fn write_field(&self, id: FieldId, dst: &mut [u8]) {
        match id {
            FieldId::SessionId => dst.copy_from_slice(&self.session_id.to_le_bytes()),
            FieldId::Subtype => dst[0] = self.subtype.as_byte(),
            FieldId::Length => dst[0] = self.length,
            FieldId::Nesn => dst[0] = self.nesn.value(),
            FieldId::Sn => dst[0] = self.sn.value(),
            FieldId::Payload => dst.copy_from_slice(&self.payload),
            other => unreachable!("{other} is not a session packet field"),
        }
    }

    fn read_field(&mut self, id: FieldId, src: &[u8]) -> bool {
        match id {
            FieldId::SessionId => {
                self.session_id = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
            }
            FieldId::Subtype => match SessionSubtype::from_byte(src[0]) {
                Some(subtype) => self.subtype = subtype,
                None => return false,
            },
            FieldId::Length => self.length = src[0],
            FieldId::Nesn => self.nesn = SequenceNumber::new(src[0]),
            FieldId::Sn => self.sn = SequenceNumber::new(src[0]),
            FieldId::Payload => self.payload.copy_from_slice(src),
            other => unreachable!("{other} is not a session packet field"),
        }
        true
    }
}

impl SessionPacket {
    /// Serialize into the fixed wire image.
    pub fn serialize(&self) -> [u8; SESSION_PACKET_BYTES] {
        let mut buffer = [0u8; SESSION_PACKET_BYTES];
        emit(self, &mut buffer);
        buffer
    }

    /// The payload bytes in use.
    pub fn payload_in_use(&self) -> &[u8] {
        let used = (self.length as usize).min(MAX_PAYLOAD_BYTES);
        &self.payload[..used]
    }
}

/// A seeker asking an advertiser for a session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionRequestPacket {
    /// The requester's address.
    pub source_address: Address,
    /// The advertiser being asked.
    pub target_address: Address,
}

impl Wire for ConnectionRequestPacket {
    const KIND: PacketKind = PacketKind::ConnectionRequest;
    const FIELDS: &'static [FieldSpec] = CONNECTION_REQUEST_FIELDS;

    fn write_field(&self, id: FieldId, dst: &mut [u8]) {
        match id {
            FieldId::SourceAddress => dst.copy_from_slice(&self.source_address.to_le_bytes()),
            FieldId::TargetAddress => dst.copy_from_slice(&self.target_address.to_le_bytes()),
            other => unreachable!("{other} is not a connection-request field"),
        }
    }

    fn read_field(&mut self, id: FieldId, src: &[u8]) -> bool {
        match id {
            FieldId::SourceAddress => {
                self.source_address = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
            }
            FieldId::TargetAddress => {
                self.target_address = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
            }
            other => unreachable!("{other} is not a connection-request field"),
        }
        true
    }
}

impl ConnectionRequestPacket {
    /// Serialize into the fixed wire image.
    pub fn serialize(&self) -> [u8; CONNECTION_REQUEST_BYTES] {
        let mut buffer = [0u8; CONNECTION_REQUEST_BYTES];
        emit(self, &mut buffer);
        buffer
    }
}

/// An advertiser granting a session: carries the agreed start time and the
/// new session's identifier.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionAcceptPacket {
    /// The advertiser's address.
    pub source_address: Address,
    /// The requester being granted the session.
    pub target_address: Address,
    /// When the session's first slot begins.
    pub session_start_time: WireInstant,
    /// Identifier both peers will stamp on session packets.
    pub session_id: SessionId,
}

impl Wire for ConnectionAcceptPacket {
    const KIND: PacketKind = PacketKind::ConnectionAccept;
    const FIELDS: &'static [FieldSpec] = CONNECTION_ACCEPT_FIELDS;

    fn write_field(&self, id: FieldId, dst: &mut [u8]) {
        match id {
            FieldId::SourceAddress => dst.copy_from_slice(&self.source_address.to_le_bytes()),
            FieldId::TargetAddress => dst.copy_from_slice(&self.target_address.to_le_bytes()),
            FieldId::SessionStartTime => {
                dst.copy_from_slice(&self.session_start_time.as_nanos().to_le_bytes());
            }
            FieldId::SessionId => dst.copy_from_slice(&self.session_id.to_le_bytes()),
            other => unreachable!("{other} is not a connection-accept field"),
        }
    }

    fn read_field(&mut self, id: FieldId, src: &[u8]) -> bool {
        match id {
            FieldId::SourceAddress => {
                self.source_address = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
            }
            FieldId::TargetAddress => {
                self.target_address = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
            }
            FieldId::SessionStartTime => {
                self.session_start_time = WireInstant::from_nanos(u64::from_le_bytes([
                    src[0], src[1], src[2], src[3], src[4], src[5], src[6], src[7],
                ]));
            }
            FieldId::SessionId => {
                self.session_id = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
            }
            other => unreachable!("{other} is not a connection-accept field"),
        }
        true
    }
}

impl ConnectionAcceptPacket {
    /// Serialize into the fixed wire image.
    pub fn serialize(&self) -> [u8; CONNECTION_ACCEPT_BYTES] {
        let mut buffer = [0u8; CONNECTION_ACCEPT_BYTES];
        emit(self, &mut buffer);
        buffer
    }
}

/// Presence broadcast while waiting for a connection-request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingPacket {
    /// The advertiser's address.
    pub source_address: Address,
}

impl Wire for AdvertisingPacket {
    const KIND: PacketKind = PacketKind::Advertising;
    const FIELDS: &'static [FieldSpec] = ADVERTISING_FIELDS;

    fn write_field(&self, id: FieldId, dst: &mut [u8]) {
        match id {
            FieldId::SourceAddress => dst.copy_from_slice(&self.source_address.to_le_bytes()),
            other => unreachable!("{other} is not an advertising field"),
        }
    }

    fn read_field(&mut self, id: FieldId, src: &[u8]) -> bool {
        match id {
            FieldId::SourceAddress => {
                self.source_address = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
            }
            other => unreachable!("{other} is not an advertising field"),
        }
        true
    }
}

impl AdvertisingPacket {
    /// Serialize into the fixed wire image.
    pub fn serialize(&self) -> [u8; ADVERTISING_PACKET_BYTES] {
        let mut buffer = [0u8; ADVERTISING_PACKET_BYTES];
        emit(self, &mut buffer);
        buffer
    }
}

/// Walk a packet's descriptor table and emit its wire image into `buffer`.
fn emit<P: Wire>(packet: &P, buffer: &mut [u8]) {
    debug_assert!(buffer.len() >= wire_width_bytes(P::FIELDS));
    buffer[0] = P::KIND.as_byte();
    for spec in P::FIELDS {
        let start = (TAG_BITS + spec.start_bit) / 8;
        let end = start + spec.width_bits / 8;
        packet.write_field(spec.id, &mut buffer[start..end]);
    }
}

/// Deserialize a packet of type `P` from received bytes.
///
/// Returns `None` when the buffer is shorter than the tag, the tag is not
/// `P`'s, the buffer is shorter than `P`'s wire image, or a field value has
/// no typed representation. Packets that decode but make no protocol sense
/// are the caller's problem to vet.
pub fn deserialize<P: Wire>(bytes: &[u8]) -> Option<P> {
    if bytes.len() < TAG_BYTES {
        return None;
    }
    if bytes[0] != P::KIND.as_byte() {
        return None;
    }
    if bytes.len() < wire_width_bytes(P::FIELDS) {
        return None;
    }

    let mut packet = P::default();
    for spec in P::FIELDS {
        let start = (TAG_BITS + spec.start_bit) / 8;
        let end = start + spec.width_bits / 8;
        if !packet.read_field(spec.id, &bytes[start..end]) {
            return None;
        }
    }
    Some(packet)
}

/// Receive destination sized to the radio FIFO.
///
/// Every receive lands in one of these; deserialization then reads a typed
/// prefix out of it and validates the tag.
#[derive(Debug, Clone, Copy)]
pub struct ReceiveBuffer {
    bytes: [u8; FIFO_CAPACITY],
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self {
            bytes: [0; FIFO_CAPACITY],
        }
    }
}

impl ReceiveBuffer {
    /// The received bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable view for the radio to fill.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Capacity of the buffer, which equals the radio FIFO capacity.
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }
}
