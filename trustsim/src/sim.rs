//! Discrete event simulator for trustmesh networks.

use std::collections::BinaryHeap;

use hashbrown::HashMap;
use tracing::{debug, info};
use trustmesh::config::DefaultConfig;
use trustmesh::{Address, Duration, Encode, NodeConfig, RadioRx, RadioTx, Timestamp, TrustVector};

use crate::event::{Event, ScenarioAction, ScheduledEvent, SequenceNumber};
use crate::metrics::{SimMetrics, SimulationResult, TrustSnapshot};
use crate::node::SimNode;
use crate::topology::Topology;

/// Discrete event simulator for trustmesh networks.
pub struct Simulator {
    /// All nodes in the simulation.
    nodes: HashMap<Address, SimNode>,
    /// Network topology.
    topology: Topology,
    /// Current simulation time.
    current_time: Timestamp,
    /// Priority queue of scheduled events.
    event_queue: BinaryHeap<ScheduledEvent>,
    /// The one live timer event per node. Queue entries that disagree are stale.
    timers: HashMap<Address, Timestamp>,
    /// Collected metrics.
    metrics: SimMetrics,
    /// Next sequence number for event ordering.
    next_seq: u64,
    /// RNG state for frame loss.
    rng_state: u64,
    /// Interval for automatic snapshots.
    snapshot_interval: Option<Duration>,
    /// Next snapshot time.
    next_snapshot: Option<Timestamp>,
    #[cfg(test)]
    pub timer_fire_count: u64,
}

impl Simulator {
    /// Create a new simulator with given RNG seed.
    pub fn new(seed: u64) -> Self {
        Self {
            nodes: HashMap::new(),
            topology: Topology::new(),
            current_time: Timestamp::ZERO,
            event_queue: BinaryHeap::new(),
            timers: HashMap::new(),
            metrics: SimMetrics::new(),
            next_seq: 0,
            rng_state: seed,
            snapshot_interval: None,
            next_snapshot: None,
            #[cfg(test)]
            timer_fire_count: 0,
        }
    }

    /// Set the network topology.
    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Set the snapshot interval for automatic trust table recording.
    ///
    /// A zero interval disables periodic snapshots.
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        if interval == Duration::ZERO {
            return self;
        }
        self.snapshot_interval = Some(interval);
        self.next_snapshot = Some(self.current_time + interval);
        self
    }

    /// Add and start a node. `seed` drives its next-hop draws.
    ///
    /// A node already registered under `addr` is replaced.
    pub fn add_node(&mut self, addr: Address, seed: u64) -> Address {
        let mut node = SimNode::new(addr, seed, self.current_time);
        node.initialize(self.current_time);
        self.nodes.insert(addr, node);
        self.timers.remove(&addr);

        self.after_handler(addr);
        addr
    }

    pub fn node(&self, addr: &Address) -> Option<&SimNode> {
        self.nodes.get(addr)
    }

    pub fn node_mut(&mut self, addr: &Address) -> Option<&mut SimNode> {
        self.nodes.get_mut(addr)
    }

    /// All node addresses, in address order.
    pub fn node_ids(&self) -> Vec<Address> {
        let mut ids: Vec<Address> = self.nodes.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn current_time(&self) -> Timestamp {
        self.current_time
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    pub fn metrics(&self) -> &SimMetrics {
        &self.metrics
    }

    /// Schedule an event.
    pub fn schedule(&mut self, time: Timestamp, event: Event) {
        let seq = SequenceNumber::new(self.next_seq);
        self.next_seq += 1;
        self.event_queue.push(ScheduledEvent::new(time, seq, event));
    }

    /// Schedule a scenario action.
    pub fn schedule_action(&mut self, time: Timestamp, action: ScenarioAction) {
        self.schedule(time, Event::ScenarioAction(action));
    }

    /// Run simulation until specified time.
    pub fn run_until(&mut self, end_time: Timestamp) -> SimulationResult {
        while self
            .event_queue
            .peek()
            .is_some_and(|event| event.time <= end_time)
        {
            let Some(event) = self.event_queue.pop() else {
                break;
            };
            self.advance_time(event.time);
            self.maybe_take_snapshot();
            self.process_event(event.event);
        }

        // Advance to end_time even if no more events
        self.advance_time(end_time);
        self.maybe_take_snapshot();

        // Final snapshot
        self.take_snapshot();

        SimulationResult {
            end_time: self.current_time,
            metrics: self.metrics.clone(),
            queue_exhausted: self.event_queue.peek().is_none(),
        }
    }

    /// Run simulation for specified duration.
    pub fn run_for(&mut self, duration: Duration) -> SimulationResult {
        self.run_until(self.current_time + duration)
    }

    /// Run until event queue is empty or max events processed.
    pub fn run_events(&mut self, max_events: usize) -> SimulationResult {
        let mut processed = 0;

        while processed < max_events {
            let Some(event) = self.event_queue.pop() else {
                break;
            };
            self.advance_time(event.time);
            self.maybe_take_snapshot();
            self.process_event(event.event);
            processed += 1;
        }

        self.take_snapshot();

        SimulationResult {
            end_time: self.current_time,
            metrics: self.metrics.clone(),
            queue_exhausted: self.event_queue.is_empty(),
        }
    }

    fn advance_time(&mut self, time: Timestamp) {
        if time > self.current_time {
            self.current_time = time;
        }
    }

    fn process_event(&mut self, event: Event) {
        match event {
            Event::RadioDelivery { to, rx } => self.deliver(to, rx),
            Event::TimerFire { node } => self.fire_timer(node),
            Event::ScenarioAction(action) => self.execute_action(action),
        }
    }

    /// Hand a frame to a node's radio.
    fn deliver(&mut self, to: Address, rx: RadioRx) {
        let now = self.current_time;
        let accepted = self
            .nodes
            .get_mut(&to)
            .is_some_and(|node| node.handle_radio_rx(rx, now));
        if accepted {
            self.metrics.messages_delivered += 1;
        } else {
            self.metrics.messages_dropped += 1;
        }
        self.after_handler(to);
    }

    fn fire_timer(&mut self, addr: Address) {
        let now = self.current_time;
        if self.timers.get(&addr) != Some(&now) {
            // Superseded by an earlier wakeup or dropped by shutdown.
            return;
        }
        self.timers.remove(&addr);

        #[cfg(test)]
        {
            self.timer_fire_count += 1;
        }

        if let Some(node) = self.nodes.get_mut(&addr) {
            node.handle_timer(now);
        }
        self.after_handler(addr);
    }

    /// Drain a node's events and frames, then resync its timer.
    fn after_handler(&mut self, addr: Address) {
        let now = self.current_time;
        let Some(node) = self.nodes.get(&addr) else {
            return;
        };
        let events = node.take_events();
        let outgoing = node.take_outgoing();
        let wakeup = node.next_wakeup();

        for event in events {
            debug!(time = now.as_millis(), node = %addr, event = ?event, "node event");
            self.metrics.record_event(now, addr, event);
        }
        for tx in outgoing {
            self.route(addr, tx);
        }

        if let Some(at) = wakeup {
            let earlier = self.timers.get(&addr).map_or(true, |&pending| at < pending);
            if earlier {
                self.timers.insert(addr, at);
                self.schedule(at, Event::TimerFire { node: addr });
            }
        }
    }

    /// Put one transmitted frame on the air.
    fn route(&mut self, sender: Address, tx: RadioTx) {
        self.metrics.messages_sent += 1;

        match tx {
            RadioTx::Relay { next_hop, frame } => {
                let rx = RadioRx::Relay {
                    prevhop: sender,
                    frame,
                };
                self.send_over_link(sender, next_hop, rx);
            }
            RadioTx::Broadcast { payload } => {
                for neighbor in self.topology.neighbors(sender) {
                    let rx = RadioRx::Broadcast {
                        from: sender,
                        payload: payload.clone(),
                    };
                    self.send_over_link(sender, neighbor, rx);
                }
            }
        }
    }

    fn send_over_link(&mut self, from: Address, to: Address, rx: RadioRx) {
        let link = match self.topology.get_link(from, to) {
            Some(link) if link.active => (link.loss_rate, link.delay),
            _ => {
                debug!(from = %from, to = %to, "out of range, frame lost");
                self.metrics.messages_dropped += 1;
                return;
            }
        };
        let (loss_rate, delay) = link;

        if loss_rate > 0.0 && self.random_f64() < loss_rate {
            self.metrics.messages_dropped += 1;
            return;
        }

        let at = self.current_time + delay;
        self.schedule(at, Event::RadioDelivery { to, rx });
    }

    fn execute_action(&mut self, action: ScenarioAction) {
        info!(time = self.current_time.as_millis(), action = ?action, "scenario action");
        match action {
            ScenarioAction::Partition { groups } => {
                self.topology.partition(&groups);
            }
            ScenarioAction::HealPartition => {
                self.topology.heal();
            }
            ScenarioAction::DisableLink { from, to } => {
                if let Some(link) = self.topology.get_link_mut(from, to) {
                    link.active = false;
                }
            }
            ScenarioAction::EnableLink { from, to } => {
                if let Some(link) = self.topology.get_link_mut(from, to) {
                    link.active = true;
                }
            }
            ScenarioAction::SetLossRate { from, to, rate } => {
                if let Some(link) = self.topology.get_link_mut(from, to) {
                    link.loss_rate = rate.clamp(0.0, 1.0);
                }
            }
            ScenarioAction::ForgeGossip { from, to, records } => {
                let payload = TrustVector::from_records(&records, DefaultConfig::MAX_NEIGHBORS)
                    .encode_to_vec();
                self.metrics.messages_sent += 1;
                self.deliver(to, RadioRx::Broadcast { from, payload });
            }
            ScenarioAction::Shutdown { node } => {
                if let Some(n) = self.nodes.get_mut(&node) {
                    n.shutdown();
                }
                self.timers.remove(&node);
                self.after_handler(node);
            }
            ScenarioAction::TakeSnapshot => {
                self.take_snapshot();
            }
        }
    }

    fn maybe_take_snapshot(&mut self) {
        while let Some(next) = self.next_snapshot {
            if self.current_time < next {
                break;
            }
            self.take_snapshot();
            self.next_snapshot = self.snapshot_interval.map(|interval| next + interval);
        }
    }

    /// Record every node's neighbor table.
    pub fn take_snapshot(&mut self) {
        let mut snapshot = TrustSnapshot::new(self.current_time);
        for (&addr, node) in &self.nodes {
            let table = node
                .inner()
                .neighbors()
                .iter()
                .map(|entry| (entry.addr, entry.trust))
                .collect();
            snapshot.record_node(addr, table);
        }
        self.metrics.add_snapshot(snapshot);
    }

    /// Uniform f64 in [0, 1).
    fn random_f64(&mut self) -> f64 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        (self.rng_state >> 11) as f64 / (1u64 << 53) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Link;
    use trustmesh::{Trust, TrustRecord, SINK};

    fn addr(n: u8) -> Address {
        Address::new(n, 0)
    }

    #[test]
    fn test_simulator_creation() {
        let sim = Simulator::new(42);
        assert_eq!(sim.current_time(), Timestamp::ZERO);
        assert!(sim.node_ids().is_empty());
    }

    #[test]
    fn test_add_nodes() {
        let mut sim = Simulator::new(42);
        let n1 = sim.add_node(SINK, 1);
        let n2 = sim.add_node(addr(2), 2);

        assert_eq!(sim.node_ids(), vec![n1, n2]);
        assert!(sim.node(&n1).unwrap().is_sink());
        assert!(sim.node(&n2).unwrap().is_open());
    }

    #[test]
    fn test_isolated_node_only_ticks() {
        let mut sim = Simulator::new(42);
        let n = sim.add_node(addr(2), 1);

        let result = sim.run_for(Duration::from_secs(5));

        // One gossip per second, nobody in range to hear it.
        assert_eq!(result.metrics.messages_sent, 5);
        assert_eq!(result.metrics.messages_delivered, 0);
        assert_eq!(sim.node(&n).unwrap().inner().metrics().dropped_no_route, 5);
        assert_eq!(sim.timer_fire_count, 5);
    }

    #[test]
    fn test_gossip_discovers_neighbors() {
        let mut topo = Topology::new();
        topo.add_link(SINK, addr(2), Link::new());
        let mut sim = Simulator::new(42).with_topology(topo);
        sim.add_node(SINK, 1);
        sim.add_node(addr(2), 2);

        sim.run_for(Duration::from_millis(1_500));

        assert_eq!(sim.node(&SINK).unwrap().trust_of(&addr(2)), Some(Trust::FULL));
        assert_eq!(sim.node(&addr(2)).unwrap().trust_of(&SINK), Some(Trust::FULL));
    }

    #[test]
    fn test_schedule_action() {
        let mut sim = Simulator::new(42);
        let n1 = sim.add_node(SINK, 1);
        let n2 = sim.add_node(addr(2), 2);
        sim.topology = Topology::fully_connected(&[n1, n2]);

        sim.schedule_action(
            Timestamp::from_millis(500),
            ScenarioAction::Partition {
                groups: vec![vec![n1], vec![n2]],
            },
        );
        sim.run_for(Duration::from_secs(1));

        assert!(!sim.topology().is_connected(n1, n2));
    }

    #[test]
    fn test_forged_gossip_reaches_target() {
        let mut sim = Simulator::new(42);
        sim.add_node(addr(2), 1);

        sim.schedule_action(
            Timestamp::from_millis(100),
            ScenarioAction::ForgeGossip {
                from: addr(9),
                to: addr(2),
                records: vec![TrustRecord {
                    addr: SINK,
                    trust: Trust::new(3),
                }],
            },
        );
        sim.run_for(Duration::from_millis(200));

        let node = sim.node(&addr(2)).unwrap();
        assert_eq!(node.trust_of(&addr(9)), Some(Trust::FULL));
        assert_eq!(sim.metrics().messages_delivered, 1);
    }

    #[test]
    fn test_shutdown_stops_timers() {
        let mut sim = Simulator::new(42);
        let n = sim.add_node(addr(2), 1);
        sim.schedule_action(Timestamp::from_millis(2_500), ScenarioAction::Shutdown { node: n });

        let result = sim.run_for(Duration::from_secs(10));

        assert!(!sim.node(&n).unwrap().is_open());
        assert_eq!(result.metrics.messages_sent, 2);
        assert!(result.queue_exhausted);
    }

    #[test]
    fn test_periodic_snapshots() {
        let mut sim = Simulator::new(42).with_snapshot_interval(Duration::from_secs(2));
        sim.add_node(SINK, 1);

        let result = sim.run_for(Duration::from_secs(5));

        let times: Vec<u64> = result
            .metrics
            .snapshots
            .iter()
            .map(|s| s.time.as_secs())
            .collect();
        // Two periodic snapshots, then the final one.
        assert_eq!(times, vec![2, 4, 5]);
    }

    #[test]
    fn test_random_f64_range() {
        let mut sim = Simulator::new(7);
        for _ in 0..1_000 {
            let x = sim.random_f64();
            assert!((0.0..1.0).contains(&x));
        }
    }
}
