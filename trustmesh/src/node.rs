//! Node implementation - the dispatcher.
//!
//! The Node struct holds the neighbor table and connection state and drives
//! two periodic activities and three inbound handlers:
//! - the origination tick sends a fixed payload toward the sink
//! - the gossip tick broadcasts this node's trust vector
//! - relay frames are consumed here or forwarded to a random neighbor
//! - broadcasts register new neighbors and merge trusted gossip
//!
//! Per-neighbor expiries fire through the same timer path as the ticks.
//!
//! # Usage
//!
//! ```ignore
//! let mut node = Node::<_, _, _, DefaultConfig>::new(addr, radio, random, clock);
//!
//! // Spawn the node's run loop
//! spawn(async move {
//!     node.run().await;
//! });
//! ```
//!
//! Hosts without an executor (the simulator, unit tests) call
//! [`Node::initialize`], then [`Node::handle_timer`] at [`Node::next_wakeup`]
//! and [`Node::handle_radio_rx`] for every delivered frame.

use alloc::string::String;
use alloc::vec::Vec;
use core::marker::PhantomData;

use embassy_sync::channel::Channel;
use tracing::{debug, info, warn};

use crate::config::{DefaultConfig, NodeConfig};
use crate::neighbors::NeighborTable;
use crate::time::{Duration, Timestamp};
use crate::traits::{Clock, Connection, EventChannel, Radio, RadioRx, RadioTx, Random};
use crate::trust::{self, ExpiryAction};
use crate::types::{Address, Error, Event, NodeMetrics, Trust, DATA_PAYLOAD, SINK};
use crate::wire::{Decode, Encode, RelayFrame, TrustVector};

/// The trust-aware relay node.
///
/// Generic over:
/// - `R`: Radio implementation
/// - `Rn`: Random number generator
/// - `Clk`: Clock/timer implementation
/// - `Cfg`: Compile-time protocol configuration
pub struct Node<R, Rn, Clk, Cfg = DefaultConfig> {
    // Dependencies (injected)
    radio: R,
    random: Rn,
    clock: Clk,

    events: EventChannel,

    // Identity
    addr: Address,

    neighbors: NeighborTable,

    // Scheduling
    open: bool,
    next_origination: Option<Timestamp>,
    next_gossip: Option<Timestamp>,

    metrics: NodeMetrics,

    _config: PhantomData<Cfg>,
}

impl<R, Rn, Clk, Cfg> Node<R, Rn, Clk, Cfg>
where
    R: Radio,
    Rn: Random,
    Clk: Clock,
    Cfg: NodeConfig,
{
    /// Create a node. Connections stay closed until [`initialize`](Self::initialize).
    pub fn new(addr: Address, radio: R, random: Rn, clock: Clk) -> Self {
        Self {
            radio,
            random,
            clock,
            events: Channel::new(),
            addr,
            neighbors: NeighborTable::with_capacity(Cfg::MAX_NEIGHBORS),
            open: false,
            next_origination: None,
            next_gossip: None,
            metrics: NodeMetrics::default(),
            _config: PhantomData,
        }
    }

    /// This node's address.
    pub fn address(&self) -> Address {
        self.addr
    }

    pub fn is_sink(&self) -> bool {
        self.addr.is_sink()
    }

    /// True while both connections are open.
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    pub(crate) fn neighbors_mut(&mut self) -> &mut NeighborTable {
        &mut self.neighbors
    }

    /// Current trust of a neighbor, if known.
    pub fn trust_of(&self, addr: &Address) -> Option<Trust> {
        self.neighbors.find(addr).map(|e| e.trust)
    }

    /// True iff `addr` is a known neighbor with trust below `MAT`.
    pub fn is_blocked(&self, addr: &Address) -> bool {
        trust::is_blocked::<Cfg>(&self.neighbors, addr)
    }

    /// Channel for protocol events.
    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    /// Get the radio reference.
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Get the clock reference.
    pub fn clock(&self) -> &Clk {
        &self.clock
    }

    /// Get the current timestamp from the clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Get node counters for monitoring.
    pub fn metrics(&self) -> &NodeMetrics {
        &self.metrics
    }

    /// Open both connections and schedule the periodic ticks.
    ///
    /// The first origination and gossip happen one period after `now`.
    pub fn initialize(&mut self, now: Timestamp) {
        self.radio.open(Connection::Relay, Cfg::RELAY_CHANNEL);
        self.radio.open(Connection::Broadcast, Cfg::BROADCAST_CHANNEL);
        self.open = true;
        self.next_origination = Some(now + Cfg::DEFAULT_DELAY);
        self.next_gossip = Some(now + Cfg::GOSSIP_INTERVAL);
        info!(node = %self.addr, sink = self.is_sink(), "node started");
    }

    /// Close both connections and drop every pending timer.
    pub fn shutdown(&mut self) {
        if !self.open {
            return;
        }
        self.radio.close(Connection::Relay);
        self.radio.close(Connection::Broadcast);
        self.open = false;
        self.next_origination = None;
        self.next_gossip = None;
        self.neighbors.disarm_all();
        info!(node = %self.addr, "node stopped");
    }

    /// Earliest instant `handle_timer` has work to do.
    ///
    /// `None` once the node is shut down (or before it is initialized).
    pub fn next_wakeup(&self) -> Option<Timestamp> {
        if !self.open {
            return None;
        }
        [
            self.next_origination,
            self.next_gossip,
            self.neighbors.next_expiry(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Run the node's main loop.
    ///
    /// Waits on either an incoming radio frame or the next timer deadline.
    /// Runs forever; call this from an async task/executor.
    pub async fn run(&mut self) -> ! {
        use embassy_futures::select::{select, Either};

        if !self.open {
            let now = self.clock.now();
            self.initialize(now);
        }

        loop {
            let wake = self
                .next_wakeup()
                .unwrap_or_else(|| self.clock.now() + Duration::from_secs(60));

            let result = select(
                self.radio.incoming().receive(),
                self.clock.sleep_until(wake),
            )
            .await;

            let now = self.clock.now();
            match result {
                Either::First(rx) => self.handle_radio_rx(rx, now),
                Either::Second(()) => self.handle_timer(now),
            }
        }
    }

    /// Handle timer events: neighbor expiries, origination and gossip ticks.
    pub fn handle_timer(&mut self, now: Timestamp) {
        if !self.open {
            return;
        }

        for slot in self.neighbors.due_expiries(now) {
            self.handle_expiry(slot, now);
        }

        if let Some(due) = self.next_origination.filter(|t| *t <= now) {
            self.originate(now);
            self.next_origination = Some(next_period(due, Cfg::DEFAULT_DELAY, now));
        }

        if let Some(due) = self.next_gossip.filter(|t| *t <= now) {
            self.gossip();
            self.next_gossip = Some(next_period(due, Cfg::GOSSIP_INTERVAL, now));
        }
    }

    /// Handle a frame delivered by the radio.
    pub fn handle_radio_rx(&mut self, rx: RadioRx, now: Timestamp) {
        if !self.open {
            return;
        }
        match rx {
            RadioRx::Relay { prevhop, frame } => self.handle_relay(prevhop, &frame, now),
            RadioRx::Broadcast { from, payload } => self.on_broadcast(from, &payload, now),
        }
    }

    /// Origination tick: send the fixed payload toward the sink.
    ///
    /// No-op on the sink itself.
    pub fn originate(&mut self, now: Timestamp) {
        if self.is_sink() {
            return;
        }
        let frame = RelayFrame {
            originator: self.addr,
            dest: SINK,
            hops: 1,
            payload: DATA_PAYLOAD.to_vec(),
        };
        info!(node = %self.addr, dest = %SINK, "sending data");

        let Some(next_hop) = self.forward(self.addr, SINK, self.addr, 1, now) else {
            return;
        };
        if self.transmit_relay(next_hop, &frame).is_ok() {
            self.metrics.data_originated += 1;
        }
    }

    /// Gossip tick: broadcast the current table as a trust vector.
    pub fn gossip(&mut self) {
        let vector = TrustVector::from_table(&self.neighbors, Cfg::MAX_NEIGHBORS);
        debug!(node = %self.addr, records = vector.prefix().len(), "broadcasting trust vector");
        let payload = vector.encode_to_vec();
        if self.transmit(RadioTx::Broadcast { payload }).is_ok() {
            self.metrics.gossip_sent += 1;
        }
    }

    /// Forward handler: pick the next hop for a relay packet.
    ///
    /// Penalizes and rearms `prevhop` when it is a known neighbor, then draws a
    /// uniform-random neighbor. The draw does not exclude `prevhop` or `dest`.
    pub fn forward(
        &mut self,
        originator: Address,
        dest: Address,
        prevhop: Address,
        hops: u8,
        now: Timestamp,
    ) -> Option<Address> {
        if prevhop != self.addr && self.is_blocked(&prevhop) {
            warn!(node = %self.addr, prevhop = %prevhop, "previous hop is blocked, dropping");
            self.metrics.dropped_blocked += 1;
            return None;
        }

        if let Some(slot) = self.neighbors.slot_of(&prevhop) {
            self.neighbors.rearm(slot, now, Cfg::NEIGHBOR_TIMEOUT);
            if let Some(entry) = self.neighbors.get_mut(slot) {
                if trust::apply_penalty::<Cfg>(entry, now) {
                    let (addr, trust) = (entry.addr, entry.trust);
                    self.metrics.penalties_applied += 1;
                    debug!(node = %self.addr, neighbor = %addr, trust = trust.value(), "rapid forward penalty");
                    if trust < Cfg::MAT {
                        warn!(node = %self.addr, neighbor = %addr, trust = trust.value(), "neighbor blocked");
                        self.push_event(Event::PeerBlocked { addr, trust });
                    }
                }
            }
        }

        match self.pick_next_hop() {
            Ok((index, next_hop)) => {
                debug!(
                    node = %self.addr,
                    from = %originator,
                    to = %dest,
                    next_hop = %next_hop,
                    index,
                    hops,
                    "forwarding packet"
                );
                Some(next_hop)
            }
            Err(e) => {
                info!(node = %self.addr, error = %e, "did not find a neighbor to forward to");
                self.metrics.dropped_no_route += 1;
                None
            }
        }
    }

    /// Receive handler: consume a packet addressed to this node.
    pub fn on_receive(
        &mut self,
        originator: Address,
        prevhop: Address,
        hops: u8,
        payload: Vec<u8>,
        now: Timestamp,
    ) {
        if self.is_blocked(&originator) {
            warn!(node = %self.addr, from = %originator, "sender is blocked, dropping");
            self.metrics.dropped_blocked += 1;
            return;
        }

        let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
        let text = String::from_utf8_lossy(&payload[..end]);
        info!(node = %self.addr, from = %originator, via = %prevhop, hops, "data received: '{}'", text);
        self.metrics.data_delivered += 1;

        if let Some(slot) = self.neighbors.slot_of(&originator) {
            self.neighbors.rearm(slot, now, Cfg::NEIGHBOR_TIMEOUT);
        }

        self.push_event(Event::DataReceived {
            from: originator,
            hops,
            payload,
        });
    }

    /// Broadcast handler: register the sender and merge its trust vector.
    ///
    /// Gossip from a known neighbor below `MAT` is refused. An unknown sender
    /// is inserted if there is room; its vector is merged either way.
    pub fn on_broadcast(&mut self, from: Address, payload: &[u8], now: Timestamp) {
        match self.neighbors.find(&from) {
            Some(entry) if entry.trust < Cfg::MAT => {
                debug!(node = %self.addr, from = %from, trust = entry.trust.value(), "refusing gossip from blocked neighbor");
                self.metrics.gossip_refused += 1;
                return;
            }
            Some(_) => {}
            None => match self.neighbors.insert(from, now, Cfg::NEIGHBOR_TIMEOUT) {
                Some(_) => {
                    info!(node = %self.addr, neighbor = %from, "new neighbor");
                    self.push_event(Event::NeighborDiscovered { addr: from });
                }
                None => {
                    debug!(node = %self.addr, neighbor = %from, "neighbor table full");
                    self.metrics.neighbors_rejected += 1;
                    self.push_event(Event::NeighborRejected { addr: from });
                }
            },
        }

        let vector = TrustVector::decode(payload, Cfg::MAX_NEIGHBORS);
        debug!(node = %self.addr, from = %from, received = ?vector.prefix(), "received trust vector");

        let outcome = trust::merge::<Cfg>(&mut self.neighbors, vector.records());
        self.metrics.gossip_accepted += 1;
        for (addr, trust) in outcome.newly_blocked {
            warn!(node = %self.addr, neighbor = %addr, trust = trust.value(), "neighbor blocked");
            self.push_event(Event::PeerBlocked { addr, trust });
        }

        debug!(node = %self.addr, table = ?trust::snapshot(&self.neighbors), "own trust vector");
    }

    /// Decode a relay frame and either consume or forward it.
    fn handle_relay(&mut self, prevhop: Address, bytes: &[u8], now: Timestamp) {
        let frame = match RelayFrame::decode_from_slice(bytes) {
            Ok(f) => f,
            Err(e) => {
                warn!(node = %self.addr, prevhop = %prevhop, error = %e, "malformed relay frame");
                return;
            }
        };

        if frame.dest == self.addr {
            self.on_receive(frame.originator, prevhop, frame.hops, frame.payload, now);
            return;
        }

        let Some(next_hop) = self.forward(frame.originator, frame.dest, prevhop, frame.hops, now)
        else {
            return;
        };
        let frame = RelayFrame {
            hops: frame.hops.saturating_add(1),
            ..frame
        };
        if self.transmit_relay(next_hop, &frame).is_ok() {
            self.metrics.data_forwarded += 1;
        }
    }

    /// Uniform draw over the whole table, blocked entries included.
    fn pick_next_hop(&mut self) -> Result<(usize, Address), Error> {
        self.neighbors
            .pick_random(&mut self.random)
            .map(|(index, entry)| (index, entry.addr))
            .ok_or(Error::NoRoute)
    }

    fn handle_expiry(&mut self, slot: usize, now: Timestamp) {
        match trust::on_expiry::<Cfg>(&mut self.neighbors, slot, now) {
            ExpiryAction::Ignored | ExpiryAction::Rearmed => {}
            ExpiryAction::BelowThreshold { addr, trust } => {
                info!(node = %self.addr, neighbor = %addr, trust = trust.value(), "trust of {} fell below {}", addr, Cfg::MAT);
                self.push_event(Event::TrustBelowThreshold { addr, trust });

                if Cfg::EVICT_EXPIRED && self.neighbors.free(slot).is_some() {
                    debug!(node = %self.addr, neighbor = %addr, "neighbor evicted");
                    self.push_event(Event::NeighborEvicted { addr });
                }
            }
        }
    }

    fn transmit_relay(&mut self, next_hop: Address, frame: &RelayFrame) -> Result<(), Error> {
        self.transmit(RadioTx::Relay {
            next_hop,
            frame: frame.encode_to_vec(),
        })
    }

    /// Queue a frame on the radio. Failures are logged and counted here.
    fn transmit(&mut self, tx: RadioTx) -> Result<(), Error> {
        let result = if !self.open {
            Err(Error::NotOpen)
        } else {
            self.radio
                .outgoing()
                .try_send(tx)
                .map_err(|_| Error::QueueFull)
        };
        if let Err(e) = result {
            warn!(node = %self.addr, error = %e, "send failed");
            if e == Error::QueueFull {
                self.metrics.dropped_queue_full += 1;
            }
        }
        result
    }

    /// Push an event to the events channel. Dropped when the channel is full.
    pub(crate) fn push_event(&mut self, event: Event) {
        let _ = self.events.try_send(event);
    }
}

/// Next deadline of a periodic timer that fired at `due`.
///
/// Keeps the period drift-free; skips missed periods instead of bursting.
fn next_period(due: Timestamp, period: Duration, now: Timestamp) -> Timestamp {
    let next = due + period;
    if next > now {
        next
    } else {
        now + period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::test_impls::{FixedRandom, MockClock, MockRadio, MockRandom};
    use crate::types::NeighborState;
    use crate::BasicConfig;
    use alloc::vec;

    type TestNode = Node<MockRadio, FixedRandom, MockClock, DefaultConfig>;

    fn addr(n: u8) -> Address {
        Address::new(n, 0)
    }

    fn node(at: Address, draw: u32) -> TestNode {
        let mut node = Node::new(at, MockRadio::new(), FixedRandom(draw), MockClock::new());
        node.initialize(Timestamp::ZERO);
        node
    }

    fn drain_events(node: &TestNode) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(e) = node.events().try_receive() {
            events.push(e);
        }
        events
    }

    fn gossip_from(records: &[(u8, i32)]) -> Vec<u8> {
        let records: Vec<_> = records
            .iter()
            .map(|&(a, t)| crate::types::TrustRecord {
                addr: addr(a),
                trust: Trust::new(t),
            })
            .collect();
        TrustVector::from_records(&records, DefaultConfig::MAX_NEIGHBORS).encode_to_vec()
    }

    fn relay_frame(originator: Address, dest: Address, hops: u8) -> Vec<u8> {
        RelayFrame {
            originator,
            dest,
            hops,
            payload: DATA_PAYLOAD.to_vec(),
        }
        .encode_to_vec()
    }

    #[test]
    fn test_initialize_opens_connections() {
        let node = node(addr(2), 0);
        assert!(node.is_open());
        assert_eq!(node.radio().relay_channel(), Some(135));
        assert_eq!(node.radio().broadcast_channel(), Some(129));
        assert_eq!(node.next_wakeup(), Some(Timestamp::from_secs(1)));
    }

    #[test]
    fn test_origination_without_neighbors_drops() {
        let mut node = node(addr(2), 0);
        node.handle_timer(Timestamp::from_secs(1));

        let sent = node.radio().take_sent();
        // Only the gossip broadcast goes out.
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], RadioTx::Broadcast { .. }));
        assert_eq!(node.metrics().dropped_no_route, 1);
        assert_eq!(node.metrics().data_originated, 0);
    }

    #[test]
    fn test_origination_relays_to_random_neighbor() {
        let mut node = node(addr(2), 1);
        node.on_broadcast(addr(3), &[], Timestamp::ZERO);
        node.on_broadcast(addr(4), &[], Timestamp::ZERO);

        node.originate(Timestamp::from_secs(1));
        let sent = node.radio().take_sent();
        assert_eq!(sent.len(), 1);
        let RadioTx::Relay { next_hop, frame } = &sent[0] else {
            panic!("expected relay frame");
        };
        assert_eq!(*next_hop, addr(4));
        let frame = RelayFrame::decode_from_slice(frame).unwrap();
        assert_eq!(frame.originator, addr(2));
        assert_eq!(frame.dest, SINK);
        assert_eq!(frame.hops, 1);
        assert_eq!(frame.payload, DATA_PAYLOAD);
        assert_eq!(node.metrics().data_originated, 1);
    }

    #[test]
    fn test_sink_does_not_originate() {
        let mut node = node(SINK, 0);
        node.on_broadcast(addr(2), &[], Timestamp::ZERO);
        node.originate(Timestamp::from_secs(1));
        assert!(node.radio().take_sent().is_empty());
    }

    #[test]
    fn test_gossip_is_fixed_length() {
        let mut node = node(addr(2), 0);
        node.on_broadcast(addr(3), &[], Timestamp::ZERO);
        node.gossip();

        let sent = node.radio().take_sent();
        let RadioTx::Broadcast { payload } = &sent[0] else {
            panic!("expected broadcast");
        };
        assert_eq!(payload.len(), 16 * crate::wire::TRUST_RECORD_SIZE);
        let vector = TrustVector::decode(payload, 16);
        assert_eq!(vector.prefix().len(), 1);
        assert_eq!(vector.prefix()[0].addr, addr(3));
        assert_eq!(vector.prefix()[0].trust, Trust::FULL);
    }

    #[test]
    fn test_relay_to_self_is_delivered() {
        let mut sink = node(SINK, 0);
        sink.on_broadcast(addr(3), &[], Timestamp::ZERO);
        drain_events(&sink);

        sink.handle_radio_rx(
            RadioRx::Relay {
                prevhop: addr(3),
                frame: relay_frame(addr(4), SINK, 2),
            },
            Timestamp::from_secs(4),
        );

        assert_eq!(
            drain_events(&sink),
            vec![Event::DataReceived {
                from: addr(4),
                hops: 2,
                payload: DATA_PAYLOAD.to_vec(),
            }]
        );
        assert_eq!(sink.metrics().data_delivered, 1);
        assert!(sink.radio().take_sent().is_empty());
    }

    #[test]
    fn test_receive_rearms_sender() {
        let mut sink = node(SINK, 0);
        sink.on_broadcast(addr(4), &[], Timestamp::ZERO);

        sink.on_receive(addr(4), addr(4), 1, DATA_PAYLOAD.to_vec(), Timestamp::from_secs(7));
        let entry = sink.neighbors().find(&addr(4)).unwrap();
        assert_eq!(entry.expiry, Some(Timestamp::from_secs(17)));
    }

    #[test]
    fn test_receive_from_blocked_sender_dropped() {
        let mut sink = node(SINK, 0);
        sink.on_broadcast(addr(5), &[], Timestamp::ZERO);
        sink.neighbors_mut().find_mut(&addr(5)).unwrap().trust = Trust::new(30);
        drain_events(&sink);

        sink.on_receive(addr(5), addr(5), 1, DATA_PAYLOAD.to_vec(), Timestamp::from_secs(1));
        assert!(drain_events(&sink).is_empty());
        assert_eq!(sink.metrics().dropped_blocked, 1);
        assert_eq!(sink.metrics().data_delivered, 0);
    }

    #[test]
    fn test_intermediate_forwards_with_incremented_hops() {
        let mut node = node(addr(3), 0);
        node.on_broadcast(SINK, &[], Timestamp::ZERO);
        node.on_broadcast(addr(4), &[], Timestamp::ZERO);

        node.handle_radio_rx(
            RadioRx::Relay {
                prevhop: addr(4),
                frame: relay_frame(addr(4), SINK, 1),
            },
            Timestamp::from_secs(10),
        );

        let sent = node.radio().take_sent();
        let RadioTx::Relay { next_hop, frame } = &sent[0] else {
            panic!("expected relay frame");
        };
        assert_eq!(*next_hop, SINK);
        assert_eq!(RelayFrame::decode_from_slice(frame).unwrap().hops, 2);
        assert_eq!(node.metrics().data_forwarded, 1);
    }

    #[test]
    fn test_forward_may_pick_prevhop() {
        let mut node = node(addr(3), 0);
        node.on_broadcast(addr(4), &[], Timestamp::ZERO);
        let next = node.forward(addr(4), SINK, addr(4), 1, Timestamp::from_secs(10));
        assert_eq!(next, Some(addr(4)));
    }

    #[test]
    fn test_forward_from_blocked_prevhop() {
        let mut node = node(addr(3), 0);
        node.on_broadcast(addr(5), &[], Timestamp::ZERO);
        node.neighbors_mut().find_mut(&addr(5)).unwrap().trust = Trust::new(49);

        assert!(node.is_blocked(&addr(5)));
        assert_eq!(node.forward(addr(5), SINK, addr(5), 1, Timestamp::from_secs(1)), None);
        assert_eq!(node.metrics().dropped_blocked, 1);
    }

    #[test]
    fn test_repeated_rapid_forwards_block_neighbor() {
        let mut node = node(addr(3), 0);
        node.on_broadcast(addr(4), &[], Timestamp::ZERO);
        drain_events(&node);

        // In the integer range each penalty costs exactly one point.
        let mut forwarded = 0;
        for _ in 0..100 {
            if node
                .forward(addr(4), SINK, addr(4), 1, Timestamp::from_secs(1))
                .is_some()
            {
                forwarded += 1;
            }
        }
        assert_eq!(node.trust_of(&addr(4)).unwrap().value(), 49);
        assert_eq!(node.metrics().penalties_applied, 51);
        assert_eq!(forwarded, 51);
        assert_eq!(
            drain_events(&node),
            vec![Event::PeerBlocked {
                addr: addr(4),
                trust: Trust::new(49)
            }]
        );
    }

    #[test]
    fn test_malformed_relay_frame_ignored() {
        let mut node = node(addr(3), 0);
        node.on_broadcast(addr(4), &[], Timestamp::ZERO);
        node.handle_radio_rx(
            RadioRx::Relay {
                prevhop: addr(4),
                frame: vec![4, 0, 1],
            },
            Timestamp::from_secs(1),
        );
        assert!(node.radio().take_sent().is_empty());
        assert_eq!(node.trust_of(&addr(4)), Some(Trust::FULL));
    }

    #[test]
    fn test_discovery_emits_event() {
        let mut node = node(addr(3), 0);
        node.on_broadcast(addr(2), &gossip_from(&[]), Timestamp::ZERO);
        assert_eq!(
            drain_events(&node),
            vec![Event::NeighborDiscovered { addr: addr(2) }]
        );
        assert_eq!(node.neighbors().len(), 1);
    }

    #[test]
    fn test_full_table_rejects_but_still_merges() {
        let mut node = node(addr(99), 0);
        for n in 2..18 {
            node.on_broadcast(addr(n), &[], Timestamp::ZERO);
        }
        node.neighbors_mut().find_mut(&addr(2)).unwrap().trust = Trust::new(60);
        drain_events(&node);

        node.on_broadcast(addr(50), &gossip_from(&[(2, 20)]), Timestamp::ZERO);

        assert_eq!(node.neighbors().len(), 16);
        assert!(node.neighbors().find(&addr(50)).is_none());
        assert_eq!(node.trust_of(&addr(2)).unwrap().value(), 40);
        assert_eq!(
            drain_events(&node),
            vec![
                Event::NeighborRejected { addr: addr(50) },
                Event::PeerBlocked {
                    addr: addr(2),
                    trust: Trust::new(40)
                },
            ]
        );
        assert_eq!(node.metrics().neighbors_rejected, 1);
    }

    #[test]
    fn test_expiry_of_trusted_neighbor_rearms() {
        let mut node = node(addr(3), 0);
        node.on_broadcast(addr(4), &[], Timestamp::ZERO);

        node.handle_timer(Timestamp::from_secs(10));
        let entry = node.neighbors().find(&addr(4)).unwrap();
        assert_eq!(entry.expiry, Some(Timestamp::from_secs(20)));
        assert_eq!(entry.state, NeighborState::Trusted);
    }

    #[test]
    fn test_expiry_of_blocked_neighbor_reports() {
        let mut node = node(addr(3), 0);
        node.on_broadcast(addr(5), &[], Timestamp::ZERO);
        node.neighbors_mut().find_mut(&addr(5)).unwrap().trust = Trust::new(30);
        drain_events(&node);

        node.handle_timer(Timestamp::from_secs(10));
        assert_eq!(
            drain_events(&node),
            vec![Event::TrustBelowThreshold {
                addr: addr(5),
                trust: Trust::new(30)
            }]
        );
        // Kept in place and still blocked.
        assert_eq!(node.neighbors().len(), 1);
        assert!(node.is_blocked(&addr(5)));
        assert_eq!(node.neighbors().find(&addr(5)).unwrap().expiry, None);
    }

    struct EvictingConfig;

    impl NodeConfig for EvictingConfig {
        const MAX_NEIGHBORS: usize = 16;
        const MAT: Trust = Trust::new(50);
        const NEIGHBOR_TIMEOUT: Duration = Duration::from_secs(10);
        const MINIMUM_DELAY: Duration = Duration::from_secs(5);
        const DEFAULT_DELAY: Duration = Duration::from_secs(1);
        const GOSSIP_INTERVAL: Duration = Duration::from_secs(1);
        const RELAY_CHANNEL: u16 = 135;
        const BROADCAST_CHANNEL: u16 = 129;
        const EVICT_EXPIRED: bool = true;
    }

    #[test]
    fn test_expiry_evicts_when_configured() {
        let mut node: Node<_, _, _, EvictingConfig> =
            Node::new(addr(3), MockRadio::new(), MockRandom::new(), MockClock::new());
        node.initialize(Timestamp::ZERO);
        node.on_broadcast(addr(5), &[], Timestamp::ZERO);
        node.neighbors_mut().find_mut(&addr(5)).unwrap().trust = Trust::new(30);
        while node.events().try_receive().is_ok() {}

        node.handle_timer(Timestamp::from_secs(10));
        assert!(node.neighbors().is_empty());
        assert!(!node.is_blocked(&addr(5)));

        let mut events = Vec::new();
        while let Ok(e) = node.events().try_receive() {
            events.push(e);
        }
        assert_eq!(
            events,
            vec![
                Event::TrustBelowThreshold {
                    addr: addr(5),
                    trust: Trust::new(30)
                },
                Event::NeighborEvicted { addr: addr(5) },
            ]
        );
    }

    #[test]
    fn test_periodic_ticks_follow_config() {
        let mut node: Node<_, _, _, BasicConfig> =
            Node::new(addr(2), MockRadio::new(), MockRandom::new(), MockClock::new());
        node.initialize(Timestamp::ZERO);

        let mut gossips = 0;
        let mut now = Timestamp::ZERO;
        while let Some(t) = node.next_wakeup() {
            if t > Timestamp::from_secs(30) {
                break;
            }
            now = t;
            node.handle_timer(now);
            gossips += node
                .radio()
                .take_sent()
                .iter()
                .filter(|tx| matches!(tx, RadioTx::Broadcast { .. }))
                .count();
        }
        assert_eq!(now, Timestamp::from_secs(30));
        assert_eq!(gossips, 3);
        // Every origination failed for lack of neighbors: one per 2 s.
        assert_eq!(node.metrics().dropped_no_route, 15);
    }

    #[test]
    fn test_shutdown_closes_and_drops_timers() {
        let mut node = node(addr(3), 0);
        node.on_broadcast(addr(4), &[], Timestamp::ZERO);
        node.shutdown();

        assert!(!node.is_open());
        assert_eq!(node.radio().relay_channel(), None);
        assert_eq!(node.radio().broadcast_channel(), None);
        assert_eq!(node.next_wakeup(), None);
        assert_eq!(node.neighbors().next_expiry(), None);

        // Closed connections deliver nothing.
        node.handle_radio_rx(
            RadioRx::Broadcast {
                from: addr(7),
                payload: Vec::new(),
            },
            Timestamp::from_secs(1),
        );
        assert!(node.neighbors().find(&addr(7)).is_none());
        node.gossip();
        assert!(node.radio().take_sent().is_empty());
    }

    #[test]
    fn test_next_period_skips_missed_ticks() {
        let period = Duration::from_secs(1);
        assert_eq!(
            next_period(Timestamp::from_secs(1), period, Timestamp::from_secs(1)),
            Timestamp::from_secs(2)
        );
        assert_eq!(
            next_period(Timestamp::from_secs(1), period, Timestamp::from_millis(5_500)),
            Timestamp::from_millis(6_500)
        );
    }
}
