//! Collaborator traits: radio, time and randomness.
//!
//! The node core never touches hardware. Everything it needs from the host
//! operating system arrives through these traits:
//! - [`Radio`]: the relay (multi-hop unicast) and broadcast connections
//! - [`Clock`]: monotonic time and timer waits
//! - [`Random`]: the process-wide random source used for next-hop selection

use alloc::vec::Vec;
use core::future::Future;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::time::Timestamp;
use crate::types::Address;

/// Queue size for radio channels.
pub(crate) const RADIO_QUEUE_SIZE: usize = 16;

/// Queue size for the event channel.
pub(crate) const EVENT_QUEUE_SIZE: usize = 32;

/// Mutex type used for channels.
pub(crate) type ChannelMutex = CriticalSectionRawMutex;

/// Which of the two node connections an operation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    /// Multi-hop unicast toward a destination.
    Relay,
    /// One-hop broadcast of trust vectors.
    Broadcast,
}

/// A frame handed up by the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioRx {
    /// Relay frame unicast to us by `prevhop`.
    Relay { prevhop: Address, frame: Vec<u8> },
    /// Gossip broadcast heard from `from`.
    Broadcast { from: Address, payload: Vec<u8> },
}

/// A frame the node wants transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioTx {
    /// Unicast a relay frame to a one-hop neighbor.
    Relay { next_hop: Address, frame: Vec<u8> },
    /// Broadcast a gossip payload to every neighbor in range.
    Broadcast { payload: Vec<u8> },
}

/// Incoming radio frame channel type.
pub type RadioInChannel = Channel<ChannelMutex, RadioRx, RADIO_QUEUE_SIZE>;

/// Outgoing radio frame channel type.
pub type RadioOutChannel = Channel<ChannelMutex, RadioTx, RADIO_QUEUE_SIZE>;

/// Node event channel type.
pub type EventChannel = Channel<ChannelMutex, crate::types::Event, EVENT_QUEUE_SIZE>;

/// Radio backend trait.
///
/// Provides two channels:
/// - `outgoing()`: frames the node wants sent (drained by the radio driver)
/// - `incoming()`: frames received from the air (filled by the radio driver)
///
/// The driver owns framing and MAC. The node writes a frame into the
/// outgoing channel immediately before each send and never touches it after.
///
/// # Usage Pattern
///
/// ```
/// use trustmesh::traits::test_impls::MockRadio;
/// use trustmesh::traits::{Radio, RadioTx};
/// use trustmesh::Address;
///
/// let radio = MockRadio::new();
/// let _ = radio.outgoing().try_send(RadioTx::Broadcast { payload: vec![1, 2] });
///
/// assert_eq!(
///     radio.take_sent(),
///     vec![RadioTx::Broadcast { payload: vec![1, 2] }]
/// );
/// ```
pub trait Radio {
    /// Open a connection on the given channel.
    ///
    /// Default implementation does nothing (always-on radios).
    fn open(&mut self, connection: Connection, channel: u16) {
        let _ = (connection, channel);
    }

    /// Close a connection. Frames for it are no longer delivered.
    fn close(&mut self, connection: Connection) {
        let _ = connection;
    }

    /// Channel for outgoing frames.
    fn outgoing(&self) -> &RadioOutChannel;

    /// Channel for incoming frames.
    ///
    /// - Radio ISR calls `incoming().try_send(rx)` when a frame arrives
    /// - Simulator calls `incoming().try_send(rx)` to deliver frames
    /// - Node calls `incoming().receive().await` in its run loop
    fn incoming(&self) -> &RadioInChannel;
}

/// Time source trait for real or simulated time.
///
/// # Example (testing with MockClock)
///
/// ```
/// use trustmesh::traits::test_impls::MockClock;
/// use trustmesh::{Clock, Duration, Timestamp};
///
/// let clock = MockClock::new();
/// assert_eq!(clock.now(), Timestamp::ZERO);
///
/// clock.advance(Duration::from_secs(10));
/// assert_eq!(clock.now(), Timestamp::from_secs(10));
/// ```
pub trait Clock {
    /// Future type returned by sleep_until.
    type SleepFuture<'a>: Future<Output = ()>
    where
        Self: 'a;

    /// Get the current timestamp.
    fn now(&self) -> Timestamp;

    /// Sleep until the given timestamp.
    fn sleep_until(&self, time: Timestamp) -> Self::SleepFuture<'_>;
}

/// Random number generator trait.
///
/// Used for next-hop selection only.
pub trait Random {
    /// Generate a random u64 in the range [min, max).
    fn gen_range(&mut self, min: u64, max: u64) -> u64;

    /// Generate a random u32.
    fn gen_u32(&mut self) -> u32 {
        self.gen_range(0, u32::MAX as u64 + 1) as u32
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_impls {
    //! Mock implementations of traits for unit testing and doc tests.
    //!
    //! Available when running tests or with the `test-support` feature enabled.

    use core::cell::Cell;
    use core::future::{ready, Ready};

    use super::*;

    /// Mock radio backed by in-memory channels.
    pub struct MockRadio {
        relay_channel: Option<u16>,
        broadcast_channel: Option<u16>,
        outgoing: RadioOutChannel,
        incoming: RadioInChannel,
    }

    impl Default for MockRadio {
        fn default() -> Self {
            Self {
                relay_channel: None,
                broadcast_channel: None,
                outgoing: Channel::new(),
                incoming: Channel::new(),
            }
        }
    }

    impl MockRadio {
        pub fn new() -> Self {
            Self::default()
        }

        /// Channel the relay connection is open on, if any.
        pub fn relay_channel(&self) -> Option<u16> {
            self.relay_channel
        }

        /// Channel the broadcast connection is open on, if any.
        pub fn broadcast_channel(&self) -> Option<u16> {
            self.broadcast_channel
        }

        /// Inject a relay frame as if unicast to us by `prevhop`.
        pub fn inject_relay(&self, prevhop: Address, frame: Vec<u8>) {
            let _ = self.incoming.try_send(RadioRx::Relay { prevhop, frame });
        }

        /// Inject a gossip broadcast as if heard from `from`.
        pub fn inject_broadcast(&self, from: Address, payload: Vec<u8>) {
            let _ = self.incoming.try_send(RadioRx::Broadcast { from, payload });
        }

        /// Take all frames the node queued for transmission, in order.
        pub fn take_sent(&self) -> Vec<RadioTx> {
            let mut frames = Vec::new();
            while let Ok(frame) = self.outgoing.try_receive() {
                frames.push(frame);
            }
            frames
        }
    }

    impl Radio for MockRadio {
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

    /// Mock clock for testing (synchronous, time advances manually).
    pub struct MockClock {
        current: Cell<Timestamp>,
    }

    impl Default for MockClock {
        fn default() -> Self {
            Self {
                current: Cell::new(Timestamp::ZERO),
            }
        }
    }

    impl MockClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn at(time: Timestamp) -> Self {
            Self {
                current: Cell::new(time),
            }
        }

        pub fn set(&self, time: Timestamp) {
            self.current.set(time);
        }

        pub fn advance(&self, duration: crate::time::Duration) {
            self.current.set(self.current.get() + duration);
        }
    }

    impl Clock for MockClock {
        type SleepFuture<'a> = Ready<()>;

        fn now(&self) -> Timestamp {
            self.current.get()
        }

        fn sleep_until(&self, _time: Timestamp) -> Self::SleepFuture<'_> {
            // Synchronous tests advance time by hand.
            ready(())
        }
    }

    /// Mock random for testing (deterministic LCG).
    pub struct MockRandom {
        pub state: u64,
    }

    impl Default for MockRandom {
        fn default() -> Self {
            Self { state: 12345 }
        }
    }

    impl MockRandom {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_seed(seed: u64) -> Self {
            Self { state: seed }
        }
    }

    impl Random for MockRandom {
        fn gen_range(&mut self, min: u64, max: u64) -> u64 {
            self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let range = max - min;
            if range == 0 {
                return min;
            }
            min + (self.state % range)
        }
    }

    /// Random source that always yields the same draw. Lets tests pin which
    /// neighbor `pick_random` returns.
    pub struct FixedRandom(pub u32);

    impl Random for FixedRandom {
        fn gen_range(&mut self, min: u64, max: u64) -> u64 {
            let range = max - min;
            if range == 0 {
                return min;
            }
            min + (self.0 as u64 % range)
        }

        fn gen_u32(&mut self) -> u32 {
            self.0
        }
    }
}
