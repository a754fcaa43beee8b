#![forbid(unsafe_code)]
//! trustmesh - Trust-aware multi-hop forwarding for small wireless sensor networks
//!
//! Every non-sink node periodically sends a short data packet toward a single
//! well-known sink and relays other nodes' packets on the sink's behalf. Each
//! node also keeps a reputation ("trust") score per one-hop neighbor and gossips
//! those scores, so neighbors that forward too aggressively, or that their own
//! neighbors distrust, drop out of the forwarding set.
//!
//! This crate is `no_std` but **requires the `alloc` crate**. The neighbor table
//! is a fixed pool of slots allocated once at construction.
//!
//! # Key Properties
//!
//! - Neighbors are discovered passively by hearing their gossip broadcasts
//! - Next hops are drawn uniformly at random from the neighbor table
//! - Forwarding through us faster than `MINIMUM_DELAY` costs trust
//! - Gossip merges move common entries to the mean of both scores
//! - Neighbors below `MAT` are blocked: their packets and gossip are dropped
//! - The sink is pinned at full trust
//!
//! # Example (basic usage)
//!
//! ```
//! use trustmesh::{Address, Node, DefaultConfig, Timestamp, SINK};
//! use trustmesh::traits::test_impls::{MockRadio, MockRandom, MockClock};
//!
//! let mut node = Node::<_, _, _, DefaultConfig>::new(
//!     Address::new(2, 0),
//!     MockRadio::new(),
//!     MockRandom::new(),
//!     MockClock::new(),
//! );
//! node.initialize(Timestamp::ZERO);
//!
//! // Hearing the sink's gossip makes it a neighbor.
//! node.on_broadcast(SINK, &[], Timestamp::ZERO);
//! assert_eq!(node.neighbors().len(), 1);
//! assert!(!node.is_blocked(&SINK));
//! ```
//!
//! # Module Structure
//!
//! - [`types`] - Core types (Address, Trust, Event, etc.)
//! - [`wire`] - Trust vector and relay frame encoding
//! - [`traits`] - Radio, Random, Clock traits
//! - [`neighbors`] - Bounded neighbor table
//! - [`trust`] - Block classification, penalty, merge and expiry rules
//! - [`node`] - Main Node struct and dispatcher
//! - [`time`] - Timestamp and Duration types
//! - [`config`] - Compile-time protocol configuration

#![no_std]

extern crate alloc;

pub mod config;
pub mod neighbors;
pub mod node;
pub mod time;
pub mod traits;
pub mod trust;
pub mod types;
pub mod wire;

// Re-export main types at crate root
pub use config::{BasicConfig, DefaultConfig, NodeConfig};
pub use neighbors::{NeighborEntry, NeighborTable};
pub use node::Node;
pub use time::{Duration, Timestamp};
pub use traits::{Clock, Connection, Radio, RadioRx, RadioTx, Random};
pub use types::{
    Address, Error, Event, NeighborState, NodeMetrics, Trust, TrustRecord, DATA_PAYLOAD,
    MAX_TRUST, SINK,
};
pub use wire::{Decode, DecodeError, Encode, RelayFrame, TrustVector};
