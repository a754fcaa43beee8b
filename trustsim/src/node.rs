//! SimNode wrapper for simulated trustmesh nodes.

use std::cell::Cell;
use std::future::{ready, Ready};

use embassy_sync::channel::Channel;
use trustmesh::config::DefaultConfig;
use trustmesh::traits::{RadioInChannel, RadioOutChannel};
use trustmesh::{
    Address, Clock, Connection, Duration, Event, Node, Radio, RadioRx, RadioTx, Random, Timestamp,
    Trust,
};

/// Mock radio for simulation.
///
/// Tracks which connections are open so the simulator can drop frames for a
/// closed one.
pub struct SimRadio {
    relay_channel: Option<u16>,
    broadcast_channel: Option<u16>,
    outgoing: RadioOutChannel,
    incoming: RadioInChannel,
}

impl SimRadio {
    pub fn new() -> Self {
        Self {
            relay_channel: None,
            broadcast_channel: None,
            outgoing: Channel::new(),
            incoming: Channel::new(),
        }
    }

    /// True if frames of this kind would currently be heard.
    pub fn accepts(&self, rx: &RadioRx) -> bool {
        match rx {
            RadioRx::Relay { .. } => self.relay_channel.is_some(),
            RadioRx::Broadcast { .. } => self.broadcast_channel.is_some(),
        }
    }

    /// Take all outgoing frames, in send order.
    pub fn take_sent(&self) -> Vec<RadioTx> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outgoing.try_receive() {
            frames.push(frame);
        }
        frames
    }
}

impl Default for SimRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl Radio for SimRadio {
    fn open(&mut self, connection: Connection, channel: u16) {
        match connection {
            Connection::Relay => self.relay_channel = Some(channel),
            Connection::Broadcast => self.broadcast_channel = Some(channel),
        }
    }

    fn close(&mut self, connection: Connection) {
        match connection {
            Connection::Relay => self.relay_channel = None,
            Connection::Broadcast => self.broadcast_channel = None,
        }
    }

    fn outgoing(&self) -> &RadioOutChannel {
        &self.outgoing
    }

    fn incoming(&self) -> &RadioInChannel {
        &self.incoming
    }
}

/// Mock clock for simulation.
///
/// Time is controlled externally by the simulator.
pub struct SimClock {
    current: Cell<Timestamp>,
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            current: Cell::new(Timestamp::ZERO),
        }
    }

    pub fn at(time: Timestamp) -> Self {
        Self {
            current: Cell::new(time),
        }
    }

    pub fn set(&self, time: Timestamp) {
        self.current.set(time);
    }

    pub fn advance(&self, duration: Duration) {
        self.current.set(self.current.get() + duration);
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    type SleepFuture<'a> = Ready<()>;

    fn now(&self) -> Timestamp {
        self.current.get()
    }

    fn sleep_until(&self, _time: Timestamp) -> Self::SleepFuture<'_> {
        ready(())
    }
}

/// Mock random for simulation (deterministic LCG).
pub struct SimRandom {
    state: u64,
}

impl SimRandom {
    pub fn new() -> Self {
        Self { state: 12345 }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { state: seed }
    }
}

impl Default for SimRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl Random for SimRandom {
    fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let range = max - min;
        if range == 0 {
            return min;
        }
        // High bits: the low bits of a power-of-two LCG cycle quickly.
        min + ((self.state >> 33) % range)
    }
}

/// Type alias for simulated nodes.
pub type SimNodeInner = Node<SimRadio, SimRandom, SimClock, DefaultConfig>;

/// Wrapper around a trustmesh Node for simulation.
pub struct SimNode {
    /// The underlying trustmesh node.
    inner: SimNodeInner,
    /// When the node was created.
    pub created_at: Timestamp,
}

impl SimNode {
    /// Create a new SimNode. `seed` drives its next-hop draws.
    pub fn new(addr: Address, seed: u64, created_at: Timestamp) -> Self {
        let radio = SimRadio::new();
        let random = SimRandom::with_seed(seed);
        let clock = SimClock::at(created_at);

        let inner = Node::new(addr, radio, random, clock);

        Self { inner, created_at }
    }

    /// Get the node's address.
    pub fn address(&self) -> Address {
        self.inner.address()
    }

    /// Get a reference to the inner node.
    pub fn inner(&self) -> &SimNodeInner {
        &self.inner
    }

    /// Get a mutable reference to the inner node.
    pub fn inner_mut(&mut self) -> &mut SimNodeInner {
        &mut self.inner
    }

    pub fn is_sink(&self) -> bool {
        self.inner.is_sink()
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    /// Get the number of known neighbors.
    pub fn neighbor_count(&self) -> usize {
        self.inner.neighbors().len()
    }

    /// Current trust this node holds for `addr`, if it is a neighbor.
    pub fn trust_of(&self, addr: &Address) -> Option<Trust> {
        self.inner.trust_of(addr)
    }

    /// Open connections and schedule the periodic ticks.
    pub fn initialize(&mut self, now: Timestamp) {
        self.inner.clock().set(now);
        self.inner.initialize(now);
    }

    /// Deliver a frame if the matching connection is open.
    ///
    /// Returns false when the frame was dropped at the radio.
    pub fn handle_radio_rx(&mut self, rx: RadioRx, now: Timestamp) -> bool {
        if !self.inner.radio().accepts(&rx) {
            return false;
        }
        // Update the clock so any code that reads clock.now() gets correct time
        self.inner.clock().set(now);
        self.inner.handle_radio_rx(rx, now);
        true
    }

    /// Handle timer events.
    pub fn handle_timer(&mut self, now: Timestamp) {
        // Update the clock so any code that reads clock.now() gets correct time
        self.inner.clock().set(now);
        self.inner.handle_timer(now);
    }

    /// Earliest time the node wants a timer callback.
    pub fn next_wakeup(&self) -> Option<Timestamp> {
        self.inner.next_wakeup()
    }

    /// Close connections and stop all timers.
    pub fn shutdown(&mut self) {
        self.inner.shutdown();
    }

    /// Take all outgoing frames from the radio.
    pub fn take_outgoing(&self) -> Vec<RadioTx> {
        self.inner.radio().take_sent()
    }

    /// Take all events from the node's event channel.
    pub fn take_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.inner.events().try_receive() {
            events.push(event);
        }
        events
    }
}
