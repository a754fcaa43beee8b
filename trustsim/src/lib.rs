//! trustsim - Discrete event network simulator for trustmesh nodes.
//!
//! Runs whole networks of trustmesh nodes in one process, without real-time
//! delays and with fully deterministic ordering, to observe how trust spreads
//! and how misbehaving forwarders get cut off.
//!
//! # Features
//!
//! - **Discrete event simulation**: No real-time delays, deterministic ordering
//! - **Configurable topology**: Fully connected, chain, star, grid or custom
//! - **Link properties**: frame loss and delay per link
//! - **Scenario builder**: scheduled partitions, link flaps, forged gossip and
//!   node shutdowns
//! - **Metrics collection**: trust snapshots, sink deliveries, node events
//!
//! # Example
//!
//! ```
//! use trustsim::{ScenarioBuilder, Duration, DefaultConfig};
//!
//! // Sink plus two sensors in a line, run for 10 seconds
//! let result = ScenarioBuilder::new(3)
//!     .with_seed(42)
//!     .chain_topology()
//!     .run_for(Duration::from_secs(10));
//!
//! assert!(result.metrics.total_sink_deliveries() > 0);
//! assert!(result.invariants_held::<DefaultConfig>());
//! ```
//!
//! # Architecture
//!
//! The simulator uses a priority queue of events ordered by (time, sequence_number).
//! The main loop:
//! 1. Pop next event from queue
//! 2. Advance simulation time
//! 3. Process event (call node handlers)
//! 4. Drain node events and outgoing frames
//! 5. Route frames through the topology, schedule deliveries
//! 6. Reschedule the node's timer from `next_wakeup()`
//!
//! Handlers are called directly (`handle_radio_rx`, `handle_timer`) instead of
//! through the async `node.run()` loop.

pub mod event;
pub mod metrics;
pub mod node;
pub mod scenario;
pub mod sim;
pub mod topology;

// Re-export main types
pub use event::{Event, ScenarioAction, ScheduledEvent};
pub use metrics::{NodeEvent, SimMetrics, SimulationResult, TrustSnapshot};
pub use node::SimNode;
pub use scenario::{simple_scenario, ScenarioBuilder};
pub use sim::Simulator;
pub use topology::{Link, Topology};
pub use trustmesh::{Address, DefaultConfig, Duration, Timestamp, Trust, TrustRecord, SINK};
