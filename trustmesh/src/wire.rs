//! Wire format serialization and deserialization.
//!
//! Two frames cross the radio:
//!
//! ## Trust Vector (broadcast channel)
//!
//! ```text
//! MAX_NEIGHBORS × ( addr (2) || trust (2, i16 little-endian) )
//! ```
//!
//! Always exactly `MAX_NEIGHBORS` records. Unused records are zero-filled and a
//! record with `trust == 0` terminates the meaningful prefix. Decoding is
//! total: runts are zero-padded, excess bytes ignored, trust clamped into
//! `[0, 100]`.
//!
//! ## Relay Frame (relay channel)
//!
//! ```text
//! originator (2) || dest (2) || hops (1) || payload_len (varint) || payload
//! ```
//!
//! Carries the multi-hop header the host layer keeps for each packet.
//! Decoding is strict.

use alloc::vec::Vec;

use crate::neighbors::NeighborTable;
use crate::types::{Address, Trust, TrustRecord};

/// Size of one encoded trust vector record.
pub const TRUST_RECORD_SIZE: usize = 4;

/// Decoding error types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Unexpected end of buffer.
    UnexpectedEof,
    /// Invalid varint encoding.
    InvalidVarint,
    /// Non-canonical varint encoding (must use minimal bytes).
    NonCanonicalVarint,
    /// Invalid length value or trailing bytes.
    InvalidLength,
}

impl core::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DecodeError::UnexpectedEof => write!(f, "unexpected end of frame"),
            DecodeError::InvalidVarint => write!(f, "invalid varint"),
            DecodeError::NonCanonicalVarint => write!(f, "non-canonical varint"),
            DecodeError::InvalidLength => write!(f, "invalid length"),
        }
    }
}

/// Zero-copy reader over a byte slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Create a new reader over a byte slice.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Returns the number of bytes remaining.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Returns true if there are no more bytes to read.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Returns the current position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        if self.pos >= self.buf.len() {
            return Err(DecodeError::UnexpectedEof);
        }
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    /// Read a fixed number of bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::UnexpectedEof);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Read an i16 in little-endian format.
    pub fn read_i16_le(&mut self) -> Result<i16, DecodeError> {
        let bytes = self.read_bytes(2)?;
        Ok(i16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read a two-octet address.
    pub fn read_address(&mut self) -> Result<Address, DecodeError> {
        let bytes = self.read_bytes(2)?;
        Ok(Address::new(bytes[0], bytes[1]))
    }

    /// Read a varint (1-5 bytes for u32) with canonical encoding validation.
    /// Rejects non-minimal encodings (e.g., 0x80 0x00 for 0).
    pub fn read_varint(&mut self) -> Result<u32, DecodeError> {
        let start_pos = self.pos;
        let mut result: u32 = 0;
        let mut shift = 0;
        let mut byte_count = 0;

        loop {
            let byte = self.read_u8()?;
            byte_count += 1;

            if shift == 28 && (byte & 0xF0) != 0 {
                return Err(DecodeError::InvalidVarint);
            }

            result |= ((byte & 0x7F) as u32) << shift;
            if byte & 0x80 == 0 {
                let minimal_bytes = if result == 0 {
                    1
                } else {
                    let bits_needed = 32 - result.leading_zeros();
                    (bits_needed as usize).div_ceil(7).max(1)
                };

                if byte_count > minimal_bytes {
                    self.pos = start_pos;
                    return Err(DecodeError::NonCanonicalVarint);
                }

                return Ok(result);
            }
            shift += 7;
            if shift > 28 {
                return Err(DecodeError::InvalidVarint);
            }
        }
    }

    /// Read length-prefixed bytes (returns reference, no allocation).
    pub fn read_len_prefixed(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_varint()? as usize;
        self.read_bytes(len)
    }
}

/// Writer for encoding frames.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Create a new empty writer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Returns the current length of written data.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if no data has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Write a slice of bytes.
    pub fn write_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    /// Write an i16 in little-endian format.
    pub fn write_i16_le(&mut self, v: i16) {
        self.write_bytes(&v.to_le_bytes());
    }

    /// Write a two-octet address.
    pub fn write_address(&mut self, addr: &Address) {
        self.write_bytes(&addr.octets());
    }

    /// Write a varint (1-5 bytes for u32).
    pub fn write_varint(&mut self, mut v: u32) {
        while v >= 0x80 {
            self.buf.push((v as u8) | 0x80);
            v >>= 7;
        }
        self.buf.push(v as u8);
    }

    /// Write length-prefixed bytes.
    pub fn write_len_prefixed(&mut self, v: &[u8]) {
        self.write_varint(v.len() as u32);
        self.write_bytes(v);
    }

    /// Finish writing and return the buffer.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    /// Get the buffer as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

/// Trait for types that can be encoded to wire format.
pub trait Encode {
    /// Encode this value to the writer.
    fn encode(&self, w: &mut Writer);

    /// Encode and return the bytes.
    fn encode_to_vec(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode(&mut w);
        w.finish()
    }
}

/// Trait for types that can be decoded from wire format.
pub trait Decode: Sized {
    /// Decode a value from the reader.
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError>;

    /// Decode from a byte slice (strict: rejects trailing bytes).
    fn decode_from_slice(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        let result = Self::decode(&mut r)?;
        if !r.is_empty() {
            return Err(DecodeError::InvalidLength);
        }
        Ok(result)
    }
}

/// Fixed-length gossip payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustVector {
    records: Vec<TrustRecord>,
}

impl TrustVector {
    /// An all-zero vector of `capacity` records.
    pub fn empty(capacity: usize) -> Self {
        let mut records = Vec::with_capacity(capacity);
        records.resize(capacity, TrustRecord::EMPTY);
        Self { records }
    }

    /// Snapshot a neighbor table in slot order, zero-padded to `capacity`.
    pub fn from_table(table: &NeighborTable, capacity: usize) -> Self {
        let mut vector = Self::empty(capacity);
        for (slot, entry) in vector.records.iter_mut().zip(table.iter()) {
            *slot = TrustRecord {
                addr: entry.addr,
                trust: entry.trust,
            };
        }
        vector
    }

    /// Build from explicit records, zero-padded or truncated to `capacity`.
    pub fn from_records(records: &[TrustRecord], capacity: usize) -> Self {
        let mut vector = Self::empty(capacity);
        for (slot, record) in vector.records.iter_mut().zip(records) {
            *slot = *record;
        }
        vector
    }

    /// Decode a gossip payload. Never fails.
    ///
    /// Copies into a `capacity`-record buffer: missing bytes read as zero and
    /// bytes past the last record are ignored.
    pub fn decode(payload: &[u8], capacity: usize) -> Self {
        let mut buf = Vec::with_capacity(capacity * TRUST_RECORD_SIZE);
        buf.resize(capacity * TRUST_RECORD_SIZE, 0u8);
        let n = payload.len().min(buf.len());
        buf[..n].copy_from_slice(&payload[..n]);

        let mut r = Reader::new(&buf);
        let mut records = Vec::with_capacity(capacity);
        while let (Ok(addr), Ok(trust)) = (r.read_address(), r.read_i16_le()) {
            records.push(TrustRecord {
                addr,
                trust: Trust::new(trust as i32),
            });
        }
        Self { records }
    }

    /// All records, including padding.
    pub fn records(&self) -> &[TrustRecord] {
        &self.records
    }

    /// Records before the first zero-trust sentinel.
    pub fn prefix(&self) -> &[TrustRecord] {
        let end = self
            .records
            .iter()
            .position(|r| r.trust.is_zero())
            .unwrap_or(self.records.len());
        &self.records[..end]
    }

    pub fn capacity(&self) -> usize {
        self.records.len()
    }
}

impl Encode for TrustVector {
    fn encode(&self, w: &mut Writer) {
        for record in &self.records {
            w.write_address(&record.addr);
            w.write_i16_le(record.trust.value() as i16);
        }
    }
}

/// Multi-hop packet as carried between relays.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayFrame {
    /// Node that originated the packet.
    pub originator: Address,
    /// Final destination.
    pub dest: Address,
    /// Hop count so far; 1 on the first transmission.
    pub hops: u8,
    pub payload: Vec<u8>,
}

impl Encode for RelayFrame {
    fn encode(&self, w: &mut Writer) {
        w.write_address(&self.originator);
        w.write_address(&self.dest);
        w.write_u8(self.hops);
        w.write_len_prefixed(&self.payload);
    }
}

impl Decode for RelayFrame {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let originator = r.read_address()?;
        let dest = r.read_address()?;
        let hops = r.read_u8()?;
        let payload = r.read_len_prefixed()?.to_vec();
        Ok(Self {
            originator,
            dest,
            hops,
            payload,
        })
    }
}
