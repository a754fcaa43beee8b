//! Core types and constants for trustmesh nodes.

use core::fmt;

use alloc::vec::Vec;

/// Highest trust a neighbor can hold; also the score of a fresh neighbor.
pub const MAX_TRUST: u8 = 100;

/// Fixed payload every non-sink node originates toward the sink.
pub const DATA_PAYLOAD: &[u8; 6] = b"Hello\0";

/// Two-octet link-layer node address, printed as `a.b`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; 2]);

/// The distinguished destination of all data packets.
pub const SINK: Address = Address([1, 0]);

impl Address {
    /// All-zero address, used for unused trust vector records.
    pub const NULL: Address = Address([0, 0]);

    pub const fn new(a: u8, b: u8) -> Self {
        Address([a, b])
    }

    pub const fn octets(self) -> [u8; 2] {
        self.0
    }

    pub fn is_sink(&self) -> bool {
        *self == SINK
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0[0], self.0[1])
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}.{})", self.0[0], self.0[1])
    }
}

/// Reputation score of a neighbor, always within `[0, MAX_TRUST]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Trust(u8);

impl Trust {
    /// Score of a neighbor on discovery and the pinned score of the sink.
    pub const FULL: Trust = Trust(MAX_TRUST);

    /// Zero trust. On the wire this doubles as the end-of-vector sentinel.
    pub const ZERO: Trust = Trust(0);

    /// Build a trust value, clamping into `[0, MAX_TRUST]`.
    pub const fn new(value: i32) -> Self {
        if value < 0 {
            Trust(0)
        } else if value > MAX_TRUST as i32 {
            Trust(MAX_TRUST)
        } else {
            Trust(value as u8)
        }
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Multiply by 0.99, truncating toward zero.
    pub const fn penalized(self) -> Trust {
        Trust((self.0 as u16 * 99 / 100) as u8)
    }

    /// Floor of the mean of two scores.
    pub const fn averaged_with(self, other: Trust) -> Trust {
        Trust(((self.0 as u16 + other.0 as u16) / 2) as u8)
    }
}

impl Default for Trust {
    fn default() -> Self {
        Trust::FULL
    }
}

impl fmt::Display for Trust {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One `(addr, trust)` pair of a gossiped trust vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustRecord {
    pub addr: Address,
    pub trust: Trust,
}

impl TrustRecord {
    pub const EMPTY: TrustRecord = TrustRecord {
        addr: Address::NULL,
        trust: Trust::ZERO,
    };
}

/// Lifecycle state of a neighbor entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborState {
    /// Inserted and not yet through an expiry.
    Fresh,
    /// Trust at or above the threshold.
    Trusted,
    /// Trust below the threshold; the neighbor is blocked.
    Blocked,
    /// The expiry fired while blocked. The entry stays blocked until gossip
    /// pulls its trust back up.
    Expired,
}

/// Events emitted by the node for host/application handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A data packet reached this node as its destination.
    DataReceived {
        from: Address,
        hops: u8,
        payload: Vec<u8>,
    },
    /// A previously unknown neighbor was added to the table.
    NeighborDiscovered { addr: Address },
    /// A new neighbor was heard but the table was full.
    NeighborRejected { addr: Address },
    /// A neighbor's trust dropped below the threshold through this node's
    /// own penalty or a merge.
    PeerBlocked { addr: Address, trust: Trust },
    /// An expiry fired on a blocked neighbor.
    TrustBelowThreshold { addr: Address, trust: Trust },
    /// A blocked neighbor's slot was freed on expiry.
    NeighborEvicted { addr: Address },
}

/// Error type for fallible node steps. Handlers log and count these; nothing
/// propagates out of an event handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The radio outgoing queue is full.
    QueueFull,
    /// The relay or broadcast connection is not open.
    NotOpen,
    /// No eligible next hop.
    NoRoute,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::QueueFull => write!(f, "radio queue full"),
            Error::NotOpen => write!(f, "connection not open"),
            Error::NoRoute => write!(f, "no neighbor to forward to"),
        }
    }
}

/// Per-node counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeMetrics {
    /// Data packets originated and handed to a next hop.
    pub data_originated: u32,
    /// Data packets consumed here as destination.
    pub data_delivered: u32,
    /// Relay frames passed on to a next hop.
    pub data_forwarded: u32,
    /// Packets dropped because the sender or previous hop is blocked.
    pub dropped_blocked: u32,
    /// Packets dropped because no next hop was available.
    pub dropped_no_route: u32,
    /// Frames that could not be queued on the radio.
    pub dropped_queue_full: u32,
    /// Gossip vectors broadcast.
    pub gossip_sent: u32,
    /// Gossip vectors merged into the table.
    pub gossip_accepted: u32,
    /// Gossip vectors refused because the sender is blocked.
    pub gossip_refused: u32,
    /// Rapid-forward penalties applied.
    pub penalties_applied: u32,
    /// New neighbors dropped because the table was full.
    pub neighbors_rejected: u32,
}
