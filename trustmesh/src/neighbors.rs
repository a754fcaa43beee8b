//! Bounded neighbor table.
//!
//! A fixed pool of `MAX_NEIGHBORS` slots. Each occupied slot holds one
//! neighbor entry; slot indices are stable for the lifetime of the entry and
//! iteration always walks slots in index order, so a random pick is well
//! defined for a given table state.
//!
//! The table owns the per-entry expiry deadlines. It does not decide what an
//! expiry means; that is the trust engine's job (see [`crate::trust`]).

use alloc::vec::Vec;

use crate::time::{Duration, Timestamp};
use crate::traits::Random;
use crate::types::{Address, NeighborState, Trust};

/// Index of a slot in the neighbor pool.
pub type Slot = usize;

/// One neighbor as seen by this node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NeighborEntry {
    /// Neighbor address. Unique within the table.
    pub addr: Address,
    /// Current reputation.
    pub trust: Trust,
    /// When this neighbor last forwarded a packet through us.
    pub last_forward_ts: Timestamp,
    /// Pending expiry deadline, `None` when disarmed.
    pub expiry: Option<Timestamp>,
    /// Arming order of the pending expiry; breaks ties between equal deadlines.
    pub armed_seq: u64,
    /// Lifecycle state.
    pub state: NeighborState,
}

impl NeighborEntry {
    fn fresh(addr: Address, now: Timestamp, expiry: Timestamp, armed_seq: u64) -> Self {
        Self {
            addr,
            trust: Trust::FULL,
            last_forward_ts: now,
            expiry: Some(expiry),
            armed_seq,
            state: NeighborState::Fresh,
        }
    }
}

/// Fixed-capacity neighbor table with stable slots.
#[derive(Clone, Debug)]
pub struct NeighborTable {
    slots: Vec<Option<NeighborEntry>>,
    len: usize,
    next_arm_seq: u64,
}

impl NeighborTable {
    /// Create an empty table with `capacity` slots.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            len: 0,
            next_arm_seq: 0,
        }
    }

    /// Number of neighbors currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the pool.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.slots.len()
    }

    /// Slot holding `addr`, if any.
    pub fn slot_of(&self, addr: &Address) -> Option<Slot> {
        self.slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|e| e.addr == *addr))
    }

    /// Look up a neighbor by address.
    pub fn find(&self, addr: &Address) -> Option<&NeighborEntry> {
        self.iter().find(|e| e.addr == *addr)
    }

    pub fn find_mut(&mut self, addr: &Address) -> Option<&mut NeighborEntry> {
        self.slots
            .iter_mut()
            .filter_map(Option::as_mut)
            .find(|e| e.addr == *addr)
    }

    pub fn get(&self, slot: Slot) -> Option<&NeighborEntry> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut NeighborEntry> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    /// Add a fresh neighbor with full trust and an armed expiry.
    ///
    /// Returns the new slot, or `None` if the pool is exhausted. An address
    /// that is already present returns its existing slot unchanged.
    pub fn insert(&mut self, addr: Address, now: Timestamp, timeout: Duration) -> Option<Slot> {
        if let Some(slot) = self.slot_of(&addr) {
            return Some(slot);
        }
        let slot = self.slots.iter().position(Option::is_none)?;
        let seq = self.take_arm_seq();
        self.slots[slot] = Some(NeighborEntry::fresh(addr, now, now + timeout, seq));
        self.len += 1;
        Some(slot)
    }

    /// Iterate neighbors in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &NeighborEntry> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Iterate `(slot, neighbor)` pairs in slot order.
    pub fn iter_slots(&self) -> impl Iterator<Item = (Slot, &NeighborEntry)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|e| (i, e)))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut NeighborEntry> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    /// Pick a neighbor uniformly at random.
    ///
    /// Draws `k = rng mod len` and returns the `k`-th entry in iteration
    /// order. Returns the list index alongside the entry.
    pub fn pick_random<R: Random>(&self, rng: &mut R) -> Option<(usize, &NeighborEntry)> {
        if self.len == 0 {
            return None;
        }
        let k = rng.gen_u32() as usize % self.len;
        self.iter().nth(k).map(|e| (k, e))
    }

    /// Arm (or re-arm) a slot's expiry at `now + timeout`.
    ///
    /// Rearming replaces any pending deadline.
    pub fn rearm(&mut self, slot: Slot, now: Timestamp, timeout: Duration) {
        let seq = self.next_arm_seq;
        if let Some(entry) = self.get_mut(slot) {
            entry.expiry = Some(now + timeout);
            entry.armed_seq = seq;
            self.next_arm_seq += 1;
        }
    }

    /// Cancel a slot's pending expiry.
    pub fn disarm(&mut self, slot: Slot) {
        if let Some(entry) = self.get_mut(slot) {
            entry.expiry = None;
        }
    }

    /// Cancel every pending expiry.
    pub fn disarm_all(&mut self) {
        for entry in self.iter_mut() {
            entry.expiry = None;
        }
    }

    /// Free a slot. Only the expiry path removes neighbors.
    pub(crate) fn free(&mut self, slot: Slot) -> Option<NeighborEntry> {
        let entry = self.slots.get_mut(slot)?.take()?;
        self.len -= 1;
        Some(entry)
    }

    /// Earliest pending expiry deadline.
    pub fn next_expiry(&self) -> Option<Timestamp> {
        self.iter().filter_map(|e| e.expiry).min()
    }

    /// Slots whose expiry is due at `now`, in firing order: by deadline, then
    /// by arming order.
    pub fn due_expiries(&self, now: Timestamp) -> Vec<Slot> {
        let mut due: Vec<(Timestamp, u64, Slot)> = self
            .iter_slots()
            .filter_map(|(slot, e)| match e.expiry {
                Some(deadline) if deadline <= now => Some((deadline, e.armed_seq, slot)),
                _ => None,
            })
            .collect();
        due.sort_unstable();
        due.into_iter().map(|(_, _, slot)| slot).collect()
    }

    fn take_arm_seq(&mut self) -> u64 {
        let seq = self.next_arm_seq;
        self.next_arm_seq += 1;
        seq
    }
}
