//! Metrics collection for simulation analysis.

use hashbrown::HashMap;
use trustmesh::{Address, Event, NodeConfig, Timestamp, Trust};

/// Every node's neighbor table at one instant.
#[derive(Debug, Clone)]
pub struct TrustSnapshot {
    /// When this snapshot was taken.
    pub time: Timestamp,
    /// Observer -> `(neighbor, trust)` in slot order.
    pub tables: HashMap<Address, Vec<(Address, Trust)>>,
}

impl TrustSnapshot {
    pub fn new(time: Timestamp) -> Self {
        Self {
            time,
            tables: HashMap::new(),
        }
    }

    /// Record one node's table.
    pub fn record_node(&mut self, observer: Address, table: Vec<(Address, Trust)>) {
        self.tables.insert(observer, table);
    }

    /// Trust `observer` holds for `subject`, if `subject` is its neighbor.
    pub fn trust(&self, observer: Address, subject: Address) -> Option<Trust> {
        self.tables
            .get(&observer)?
            .iter()
            .find(|(addr, _)| *addr == subject)
            .map(|&(_, trust)| trust)
    }

    /// Observers that currently block `subject`, in address order.
    pub fn blocked_by<Cfg: NodeConfig>(&self, subject: Address) -> Vec<Address> {
        let mut observers: Vec<Address> = self
            .tables
            .keys()
            .copied()
            .filter(|&observer| {
                !subject.is_sink()
                    && self
                        .trust(observer, subject)
                        .is_some_and(|trust| trust < Cfg::MAT)
            })
            .collect();
        observers.sort();
        observers
    }

    /// Mean trust across all observers that know `subject`.
    pub fn mean_trust(&self, subject: Address) -> Option<f64> {
        let scores: Vec<u8> = self
            .tables
            .keys()
            .filter_map(|&observer| self.trust(observer, subject))
            .map(Trust::value)
            .collect();
        if scores.is_empty() {
            return None;
        }
        let sum: u32 = scores.iter().map(|&s| s as u32).sum();
        Some(sum as f64 / scores.len() as f64)
    }

    /// Table-level invariants: bounded size, unique addresses, pinned sink.
    pub fn invariants_hold<Cfg: NodeConfig>(&self) -> bool {
        self.tables.values().all(|table| {
            let mut addrs: Vec<Address> = table.iter().map(|(addr, _)| *addr).collect();
            addrs.sort();
            addrs.dedup();
            table.len() <= Cfg::MAX_NEIGHBORS
                && addrs.len() == table.len()
                && table
                    .iter()
                    .all(|&(addr, trust)| !addr.is_sink() || trust == Trust::FULL)
        })
    }
}

/// A node event stamped with simulation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEvent {
    pub time: Timestamp,
    pub node: Address,
    pub event: Event,
}

/// Simulation metrics collected over time.
#[derive(Debug, Clone, Default)]
pub struct SimMetrics {
    /// Frames handed to the air (one per broadcast, not per receiver).
    pub messages_sent: u64,
    /// Receptions lost to link loss, range or a closed connection.
    pub messages_dropped: u64,
    /// Frames handed to a node's open connection.
    pub messages_delivered: u64,
    /// Data packets the sink consumed, by originator.
    pub sink_deliveries: HashMap<Address, u64>,
    /// Every event any node emitted, in order.
    pub node_events: Vec<NodeEvent>,
    /// Trust snapshots taken at intervals.
    pub snapshots: Vec<TrustSnapshot>,
}

impl SimMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_snapshot(&mut self, snapshot: TrustSnapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn latest_snapshot(&self) -> Option<&TrustSnapshot> {
        self.snapshots.last()
    }

    pub(crate) fn record_event(&mut self, time: Timestamp, node: Address, event: Event) {
        if let Event::DataReceived { from, .. } = &event {
            if node.is_sink() {
                *self.sink_deliveries.entry(*from).or_insert(0) += 1;
            }
        }
        self.node_events.push(NodeEvent { time, node, event });
    }

    /// Data packets from `originator` that reached the sink.
    pub fn delivered_from(&self, originator: Address) -> u64 {
        self.sink_deliveries.get(&originator).copied().unwrap_or(0)
    }

    /// Total data packets the sink consumed.
    pub fn total_sink_deliveries(&self) -> u64 {
        self.sink_deliveries.values().sum()
    }

    /// First time `observer` reported `subject` as newly blocked.
    pub fn first_blocked(&self, observer: Address, subject: Address) -> Option<Timestamp> {
        self.node_events
            .iter()
            .find(|e| {
                e.node == observer
                    && matches!(e.event, Event::PeerBlocked { addr, .. } if addr == subject)
            })
            .map(|e| e.time)
    }

    /// Events emitted by one node, in order.
    pub fn events_of(&self, node: Address) -> impl Iterator<Item = &NodeEvent> {
        self.node_events.iter().filter(move |e| e.node == node)
    }
}

/// Result of running a simulation.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Final simulation time.
    pub end_time: Timestamp,
    /// Collected metrics.
    pub metrics: SimMetrics,
    /// Whether simulation ended due to event queue exhaustion (vs time limit).
    pub queue_exhausted: bool,
}

impl SimulationResult {
    /// Table invariants held in every snapshot.
    pub fn invariants_held<Cfg: NodeConfig>(&self) -> bool {
        self.metrics
            .snapshots
            .iter()
            .all(|s| s.invariants_hold::<Cfg>())
    }

    /// Trust `observer` held for `subject` at the end of the run.
    pub fn final_trust(&self, observer: Address, subject: Address) -> Option<Trust> {
        self.metrics.latest_snapshot()?.trust(observer, subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustmesh::{DefaultConfig, SINK};

    fn addr(n: u8) -> Address {
        Address::new(n, 0)
    }

    fn t(v: i32) -> Trust {
        Trust::new(v)
    }

    #[test]
    fn test_snapshot_lookup() {
        let mut snapshot = TrustSnapshot::new(Timestamp::ZERO);
        snapshot.record_node(addr(2), vec![(SINK, t(100)), (addr(3), t(40))]);
        snapshot.record_node(addr(4), vec![(addr(3), t(70))]);

        assert_eq!(snapshot.trust(addr(2), addr(3)), Some(t(40)));
        assert_eq!(snapshot.trust(addr(4), SINK), None);
        assert_eq!(snapshot.trust(addr(9), addr(3)), None);
        assert_eq!(snapshot.blocked_by::<DefaultConfig>(addr(3)), vec![addr(2)]);
        assert_eq!(snapshot.mean_trust(addr(3)), Some(55.0));
        assert_eq!(snapshot.mean_trust(addr(7)), None);
    }

    #[test]
    fn test_snapshot_invariants() {
        let mut snapshot = TrustSnapshot::new(Timestamp::ZERO);
        snapshot.record_node(addr(2), vec![(SINK, t(100)), (addr(3), t(10))]);
        assert!(snapshot.invariants_hold::<DefaultConfig>());

        snapshot.record_node(addr(4), vec![(SINK, t(90))]);
        assert!(!snapshot.invariants_hold::<DefaultConfig>());

        snapshot.record_node(addr(4), vec![(addr(3), t(90)), (addr(3), t(80))]);
        assert!(!snapshot.invariants_hold::<DefaultConfig>());
    }

    #[test]
    fn test_sink_deliveries_counted_per_originator() {
        let mut metrics = SimMetrics::new();
        let data = |from| Event::DataReceived {
            from,
            hops: 1,
            payload: Vec::new(),
        };
        metrics.record_event(Timestamp::from_secs(1), SINK, data(addr(2)));
        metrics.record_event(Timestamp::from_secs(2), SINK, data(addr(2)));
        metrics.record_event(Timestamp::from_secs(2), SINK, data(addr(3)));
        // Not the sink: logged but not counted.
        metrics.record_event(Timestamp::from_secs(3), addr(4), data(addr(2)));

        assert_eq!(metrics.delivered_from(addr(2)), 2);
        assert_eq!(metrics.delivered_from(addr(3)), 1);
        assert_eq!(metrics.total_sink_deliveries(), 3);
        assert_eq!(metrics.events_of(addr(4)).count(), 1);
    }

    #[test]
    fn test_first_blocked() {
        let mut metrics = SimMetrics::new();
        let blocked = Event::PeerBlocked {
            addr: addr(5),
            trust: t(49),
        };
        metrics.record_event(Timestamp::from_secs(4), addr(3), blocked.clone());
        metrics.record_event(Timestamp::from_secs(9), addr(2), blocked);

        assert_eq!(
            metrics.first_blocked(addr(2), addr(5)),
            Some(Timestamp::from_secs(9))
        );
        assert_eq!(metrics.first_blocked(addr(2), addr(6)), None);
    }
}
