//! Scenario builder for setting up and running simulations.
//!
//! Node `i` of a scenario gets address `(i + 1).0`, so node 0 is always the
//! sink.

use trustmesh::{Address, Duration, Timestamp, TrustRecord};

use crate::event::ScenarioAction;
use crate::metrics::SimulationResult;
use crate::sim::Simulator;
use crate::topology::Topology;

/// Type of topology to generate.
#[derive(Debug, Clone)]
enum TopologyType {
    FullyConnected,
    Chain,
    /// Node 0 (the sink) is the hub.
    Star,
    Grid { width: usize },
    Custom(Topology),
}

/// Builder for simulation scenarios.
pub struct ScenarioBuilder {
    /// Number of nodes to create.
    num_nodes: usize,
    /// RNG seed for determinism.
    seed: u64,
    /// Topology type to generate (must be explicitly specified).
    topology_type: Option<TopologyType>,
    /// Global frame loss rate.
    loss_rate: f64,
    /// Link delay override.
    delay: Option<Duration>,
    /// Scheduled actions, with node indices still to be resolved.
    actions: Vec<(Timestamp, IndexedAction)>,
    /// Snapshot interval.
    snapshot_interval: Option<Duration>,
}

/// Scenario action naming nodes by index.
#[derive(Debug, Clone)]
enum IndexedAction {
    Partition { groups: Vec<Vec<usize>> },
    DisableLink { a: usize, b: usize },
    EnableLink { a: usize, b: usize },
    ForgeGossip {
        from: Address,
        to: usize,
        records: Vec<TrustRecord>,
    },
    Shutdown { node: usize },
    Ready(ScenarioAction),
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ScenarioBuilder {
    /// Create a new scenario with the specified number of nodes.
    ///
    /// Note: You MUST specify a topology before calling build().
    /// Use `.fully_connected()`, `.chain_topology()`, `.star_topology()`,
    /// `.grid_topology(width)` or `.topology(custom_topology)`.
    pub fn new(num_nodes: usize) -> Self {
        Self {
            num_nodes,
            seed: 42,
            topology_type: None,
            loss_rate: 0.0,
            delay: None,
            actions: Vec::new(),
            snapshot_interval: None,
        }
    }

    /// Address of node `index` in every scenario.
    pub fn address_of(index: usize) -> Address {
        Address::new((index % 255 + 1) as u8, (index / 255) as u8)
    }

    /// Set the RNG seed for deterministic simulation.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set a custom network topology, keyed by [`address_of`](Self::address_of).
    pub fn topology(mut self, topo: Topology) -> Self {
        self.topology_type = Some(TopologyType::Custom(topo));
        self
    }

    pub fn fully_connected(mut self) -> Self {
        self.topology_type = Some(TopologyType::FullyConnected);
        self
    }

    /// Each node only in range of the previous and next index.
    pub fn chain_topology(mut self) -> Self {
        self.topology_type = Some(TopologyType::Chain);
        self
    }

    /// Sink in range of everyone, nobody else in range of each other.
    pub fn star_topology(mut self) -> Self {
        self.topology_type = Some(TopologyType::Star);
        self
    }

    /// Row-major grid with the sink in the corner.
    pub fn grid_topology(mut self, width: usize) -> Self {
        self.topology_type = Some(TopologyType::Grid { width });
        self
    }

    /// Set global frame loss rate.
    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Set the delay of every link.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set snapshot interval for metrics collection.
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self
    }

    /// Schedule a network partition at the specified time.
    pub fn partition_at(mut self, time: Timestamp, groups: Vec<Vec<usize>>) -> Self {
        self.actions
            .push((time, IndexedAction::Partition { groups }));
        self
    }

    /// Schedule partition healing at the specified time.
    pub fn heal_at(mut self, time: Timestamp) -> Self {
        self.actions
            .push((time, IndexedAction::Ready(ScenarioAction::HealPartition)));
        self
    }

    /// Take a link out of range at the specified time.
    pub fn disable_link_at(mut self, time: Timestamp, a: usize, b: usize) -> Self {
        self.actions.push((time, IndexedAction::DisableLink { a, b }));
        self
    }

    /// Bring a link back at the specified time.
    pub fn enable_link_at(mut self, time: Timestamp, a: usize, b: usize) -> Self {
        self.actions.push((time, IndexedAction::EnableLink { a, b }));
        self
    }

    /// Deliver a fabricated trust vector to node `to`, claiming to come from `from`.
    pub fn forge_gossip_at(
        mut self,
        time: Timestamp,
        from: Address,
        to: usize,
        records: Vec<TrustRecord>,
    ) -> Self {
        self.actions
            .push((time, IndexedAction::ForgeGossip { from, to, records }));
        self
    }

    /// Stop node `node` at the specified time.
    pub fn shutdown_at(mut self, time: Timestamp, node: usize) -> Self {
        self.actions.push((time, IndexedAction::Shutdown { node }));
        self
    }

    /// Schedule a snapshot at the specified time.
    pub fn snapshot_at(mut self, time: Timestamp) -> Self {
        self.actions
            .push((time, IndexedAction::Ready(ScenarioAction::TakeSnapshot)));
        self
    }

    /// Build the simulator with all nodes and topology.
    ///
    /// # Panics
    ///
    /// If no topology was chosen.
    pub fn build(self) -> (Simulator, Vec<Address>) {
        let mut sim = Simulator::new(self.seed);

        if let Some(interval) = self.snapshot_interval {
            sim = sim.with_snapshot_interval(interval);
        }

        let addrs: Vec<Address> = (0..self.num_nodes).map(Self::address_of).collect();

        let mut topo = match self.topology_type {
            Some(TopologyType::FullyConnected) => Topology::fully_connected(&addrs),
            Some(TopologyType::Chain) => Topology::chain(&addrs),
            Some(TopologyType::Star) => Topology::star(&addrs),
            Some(TopologyType::Grid { width }) => Topology::grid(&addrs, width),
            Some(TopologyType::Custom(t)) => t,
            None => panic!(
                "Topology must be explicitly specified. \
                Use .fully_connected(), .chain_topology(), .star_topology(), \
                .grid_topology(), or .topology()"
            ),
        };

        if self.loss_rate > 0.0 {
            topo.set_global_loss_rate(self.loss_rate);
        }
        if let Some(delay) = self.delay {
            topo.set_global_delay(delay);
        }

        // Set topology BEFORE adding nodes so their first frames are routed.
        sim = sim.with_topology(topo);

        for (i, &addr) in addrs.iter().enumerate() {
            let node_seed = self.seed.wrapping_add(i as u64 * 1000);
            sim.add_node(addr, node_seed);
        }

        let at = |i: usize| addrs.get(i).copied();
        for (time, action) in self.actions {
            let resolved = match action {
                IndexedAction::Partition { groups } => Some(ScenarioAction::Partition {
                    groups: groups
                        .into_iter()
                        .map(|g| g.into_iter().filter_map(at).collect())
                        .collect(),
                }),
                IndexedAction::DisableLink { a, b } => at(a)
                    .zip(at(b))
                    .map(|(from, to)| ScenarioAction::DisableLink { from, to }),
                IndexedAction::EnableLink { a, b } => at(a)
                    .zip(at(b))
                    .map(|(from, to)| ScenarioAction::EnableLink { from, to }),
                IndexedAction::ForgeGossip { from, to, records } => {
                    at(to).map(|to| ScenarioAction::ForgeGossip { from, to, records })
                }
                IndexedAction::Shutdown { node } => {
                    at(node).map(|node| ScenarioAction::Shutdown { node })
                }
                IndexedAction::Ready(action) => Some(action),
            };
            if let Some(action) = resolved {
                sim.schedule_action(time, action);
            }
        }

        (sim, addrs)
    }

    /// Build and run the simulation for the specified duration.
    pub fn run_for(self, duration: Duration) -> SimulationResult {
        let (mut sim, _) = self.build();
        sim.run_for(duration)
    }

    /// Build and run until the specified time.
    pub fn run_until(self, time: Timestamp) -> SimulationResult {
        let (mut sim, _) = self.build();
        sim.run_until(time)
    }
}

/// Convenience function to create a simple N-node fully connected scenario.
pub fn simple_scenario(num_nodes: usize) -> ScenarioBuilder {
    ScenarioBuilder::new(num_nodes).fully_connected()
}
