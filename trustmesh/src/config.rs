//! Compile-time node configuration.
//!
//! The `NodeConfig` trait fixes table size, trust threshold, timer periods and
//! radio channels at compile time. `DefaultConfig` is the deployed
//! configuration; `BasicConfig` keeps the slower timing of the first,
//! gossip-free deployment for comparison runs.
//!
//! # Example
//!
//! ```ignore
//! use trustmesh::{Node, DefaultConfig};
//!
//! let node = Node::<_, _, _, DefaultConfig>::new(addr, radio, random, clock);
//!
//! // Custom configuration
//! struct DenseConfig;
//! impl NodeConfig for DenseConfig {
//!     const MAX_NEIGHBORS: usize = 32;
//!     // ... other constants
//! }
//! ```

use crate::time::Duration;
use crate::types::Trust;

/// Configuration trait for compile-time protocol tuning.
///
/// All periods must be non-zero and `MAX_NEIGHBORS` must be at least one.
pub trait NodeConfig {
    /// Size of the neighbor pool and of every gossiped trust vector.
    const MAX_NEIGHBORS: usize;

    /// Minimum acceptable trust. Neighbors strictly below are blocked.
    const MAT: Trust;

    /// Soft expiry period of a neighbor entry.
    const NEIGHBOR_TIMEOUT: Duration;

    /// Forwards from the same neighbor closer together than this are
    /// penalized (compared on the seconds clock).
    const MINIMUM_DELAY: Duration;

    /// Period of the data origination tick.
    const DEFAULT_DELAY: Duration;

    /// Period of the trust gossip tick.
    const GOSSIP_INTERVAL: Duration;

    /// Channel of the multi-hop relay connection.
    const RELAY_CHANNEL: u16;

    /// Channel of the gossip broadcast connection.
    const BROADCAST_CHANNEL: u16;

    /// Free a blocked neighbor's slot when its expiry fires. When false the
    /// entry stays in the table (and stays blocked).
    const EVICT_EXPIRED: bool;
}

/// Deployed configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfig;

impl NodeConfig for DefaultConfig {
    const MAX_NEIGHBORS: usize = 16;
    const MAT: Trust = Trust::new(50);
    const NEIGHBOR_TIMEOUT: Duration = Duration::from_secs(10);
    const MINIMUM_DELAY: Duration = Duration::from_secs(5);
    const DEFAULT_DELAY: Duration = Duration::from_secs(1);
    const GOSSIP_INTERVAL: Duration = Duration::from_secs(1);
    const RELAY_CHANNEL: u16 = 135;
    const BROADCAST_CHANNEL: u16 = 129;
    const EVICT_EXPIRED: bool = false;
}

/// Timing of the first deployment: data every 2 s, gossip every 10 s.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicConfig;

impl NodeConfig for BasicConfig {
    const MAX_NEIGHBORS: usize = 16;
    const MAT: Trust = Trust::new(50);
    const NEIGHBOR_TIMEOUT: Duration = Duration::from_secs(10);
    const MINIMUM_DELAY: Duration = Duration::from_secs(5);
    const DEFAULT_DELAY: Duration = Duration::from_secs(2);
    const GOSSIP_INTERVAL: Duration = Duration::from_secs(10);
    const RELAY_CHANNEL: u16 = 135;
    const BROADCAST_CHANNEL: u16 = 129;
    const EVICT_EXPIRED: bool = false;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        assert_eq!(DefaultConfig::MAX_NEIGHBORS, 16);
        assert_eq!(DefaultConfig::MAT.value(), 50);
        assert_eq!(DefaultConfig::NEIGHBOR_TIMEOUT.as_secs(), 10);
        assert_eq!(DefaultConfig::MINIMUM_DELAY.as_secs(), 5);
        assert_eq!(DefaultConfig::DEFAULT_DELAY.as_secs(), 1);
        assert_eq!(DefaultConfig::GOSSIP_INTERVAL.as_secs(), 1);
        assert_eq!(DefaultConfig::RELAY_CHANNEL, 135);
        assert_eq!(DefaultConfig::BROADCAST_CHANNEL, 129);
        assert!(!DefaultConfig::EVICT_EXPIRED);
    }

    #[test]
    fn test_basic_config_is_slower() {
        assert!(BasicConfig::DEFAULT_DELAY > DefaultConfig::DEFAULT_DELAY);
        assert!(BasicConfig::GOSSIP_INTERVAL > DefaultConfig::GOSSIP_INTERVAL);
        assert_eq!(BasicConfig::MAX_NEIGHBORS, DefaultConfig::MAX_NEIGHBORS);
        assert_eq!(BasicConfig::MAT, DefaultConfig::MAT);
    }

    #[test]
    fn test_configs_are_nonzero() {
        assert!(DefaultConfig::MAX_NEIGHBORS > 0);
        assert!(DefaultConfig::DEFAULT_DELAY > Duration::ZERO);
        assert!(DefaultConfig::GOSSIP_INTERVAL > Duration::ZERO);
        assert!(DefaultConfig::NEIGHBOR_TIMEOUT > Duration::ZERO);
        assert!(BasicConfig::DEFAULT_DELAY > Duration::ZERO);
        assert!(BasicConfig::GOSSIP_INTERVAL > Duration::ZERO);
    }
}
