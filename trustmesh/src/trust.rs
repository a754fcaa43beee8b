//! Trust engine.
//!
//! Stateless rules over neighbor table entries: block classification, the
//! rapid-forward penalty, the gossip merge step and the expiry decision.
//! Every trust mutation in the node goes through here so that the sink stays
//! pinned at full trust and scores stay within `[0, 100]`.

use alloc::vec::Vec;

use crate::config::NodeConfig;
use crate::neighbors::{NeighborEntry, NeighborTable, Slot};
use crate::time::Timestamp;
use crate::types::{Address, NeighborState, Trust, TrustRecord};

/// True iff `addr` is in the table with trust strictly below `MAT`.
///
/// Unknown addresses and the sink are never blocked.
pub fn is_blocked<Cfg: NodeConfig>(table: &NeighborTable, addr: &Address) -> bool {
    if addr.is_sink() {
        return false;
    }
    table.find(addr).is_some_and(|e| e.trust < Cfg::MAT)
}

/// Apply the rapid-forward penalty to a neighbor that just forwarded to us.
///
/// If the previous forward was less than `MINIMUM_DELAY` ago (seconds clock)
/// and the neighbor is not already blocked, trust becomes `trust * 99 / 100`.
/// `last_forward_ts` is advanced to `now` either way.
///
/// Returns true if the penalty was applied.
pub fn apply_penalty<Cfg: NodeConfig>(entry: &mut NeighborEntry, now: Timestamp) -> bool {
    let rapid = now.secs_since(entry.last_forward_ts) < Cfg::MINIMUM_DELAY.as_secs();
    let applied = rapid && entry.trust >= Cfg::MAT && !entry.addr.is_sink();

    if applied {
        entry.trust = entry.trust.penalized();
        reclassify::<Cfg>(entry);
    }
    if now > entry.last_forward_ts {
        entry.last_forward_ts = now;
    }
    applied
}

/// Result of merging one trust vector.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Entries whose trust changed.
    pub updated: usize,
    /// Entries that crossed from trusted to blocked.
    pub newly_blocked: Vec<(Address, Trust)>,
}

/// Merge a peer's trust vector into the table.
///
/// Walks records up to the first zero-trust sentinel. Each record naming a
/// known neighbor with a different score moves that neighbor to the floor of
/// the mean. Unknown addresses are ignored. The sink is reset to full trust.
///
/// The caller decides whether the peer is allowed to gossip at all.
pub fn merge<Cfg: NodeConfig>(table: &mut NeighborTable, vector: &[TrustRecord]) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    for record in vector.iter().take_while(|r| !r.trust.is_zero()) {
        let Some(entry) = table.find_mut(&record.addr) else {
            continue;
        };
        let was_blocked = entry.trust < Cfg::MAT;

        if entry.addr.is_sink() {
            entry.trust = Trust::FULL;
        } else if record.trust != entry.trust {
            entry.trust = entry.trust.averaged_with(record.trust);
            outcome.updated += 1;
        }
        reclassify::<Cfg>(entry);

        if !was_blocked && entry.trust < Cfg::MAT {
            outcome.newly_blocked.push((entry.addr, entry.trust));
        }
    }

    pin_sink(table);
    outcome
}

/// What an expiry firing on a slot resolved to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpiryAction {
    /// Slot empty, deadline not due, or the entry is the sink.
    Ignored,
    /// Trust at or above threshold; the deadline was pushed out.
    Rearmed,
    /// Trust below threshold. The entry is marked expired and disarmed.
    BelowThreshold { addr: Address, trust: Trust },
}

/// Resolve a fired expiry for `slot`.
///
/// Re-validates that the slot is occupied and its deadline is actually due,
/// since the entry may have been rearmed or freed after the timer was queued.
pub fn on_expiry<Cfg: NodeConfig>(
    table: &mut NeighborTable,
    slot: Slot,
    now: Timestamp,
) -> ExpiryAction {
    let Some(entry) = table.get_mut(slot) else {
        return ExpiryAction::Ignored;
    };
    match entry.expiry {
        Some(deadline) if deadline <= now => {}
        _ => return ExpiryAction::Ignored,
    }

    if entry.addr.is_sink() {
        entry.expiry = None;
        entry.state = NeighborState::Trusted;
        return ExpiryAction::Ignored;
    }

    if entry.trust >= Cfg::MAT {
        entry.state = NeighborState::Trusted;
        table.rearm(slot, now, Cfg::NEIGHBOR_TIMEOUT);
        return ExpiryAction::Rearmed;
    }

    entry.expiry = None;
    entry.state = NeighborState::Expired;
    ExpiryAction::BelowThreshold {
        addr: entry.addr,
        trust: entry.trust,
    }
}

/// Snapshot the table as a trust vector in slot order.
pub fn snapshot(table: &NeighborTable) -> Vec<TrustRecord> {
    table
        .iter()
        .map(|e| TrustRecord {
            addr: e.addr,
            trust: e.trust,
        })
        .collect()
}

/// Force the sink entry, if any, back to full trust.
pub(crate) fn pin_sink(table: &mut NeighborTable) {
    if let Some(sink) = table.iter_mut().find(|e| e.addr.is_sink()) {
        sink.trust = Trust::FULL;
        sink.state = NeighborState::Trusted;
    }
}

fn reclassify<Cfg: NodeConfig>(entry: &mut NeighborEntry) {
    if entry.addr.is_sink() {
        entry.state = NeighborState::Trusted;
        return;
    }
    entry.state = match (entry.state, entry.trust < Cfg::MAT) {
        (NeighborState::Expired, true) => NeighborState::Expired,
        (_, true) => NeighborState::Blocked,
        (NeighborState::Fresh, false) => NeighborState::Fresh,
        (_, false) => NeighborState::Trusted,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultConfig;
    use crate::time::Duration;
    use crate::types::SINK;

    type Cfg = DefaultConfig;

    fn addr(n: u8) -> Address {
        Address::new(n, 0)
    }

    fn rec(n: u8, trust: i32) -> TrustRecord {
        TrustRecord {
            addr: addr(n),
            trust: Trust::new(trust),
        }
    }

    fn table_with(entries: &[(Address, i32)]) -> NeighborTable {
        let mut table = NeighborTable::with_capacity(Cfg::MAX_NEIGHBORS);
        for &(a, t) in entries {
            let slot = table.insert(a, Timestamp::ZERO, Cfg::NEIGHBOR_TIMEOUT).unwrap();
            table.get_mut(slot).unwrap().trust = Trust::new(t);
        }
        table
    }

    fn trust_of(table: &NeighborTable, a: Address) -> u8 {
        table.find(&a).unwrap().trust.value()
    }

    #[test]
    fn test_block_classification() {
        let table = table_with(&[(addr(5), 49), (addr(6), 50)]);
        assert!(is_blocked::<Cfg>(&table, &addr(5)));
        assert!(!is_blocked::<Cfg>(&table, &addr(6)));
        assert!(!is_blocked::<Cfg>(&table, &addr(9)));
    }

    #[test]
    fn test_sink_never_blocked() {
        let table = NeighborTable::with_capacity(4);
        assert!(!is_blocked::<Cfg>(&table, &SINK));
    }

    #[test]
    fn test_rapid_forward_penalty() {
        let mut table = table_with(&[(addr(4), 100)]);
        let t = Timestamp::from_secs(20);
        table.find_mut(&addr(4)).unwrap().last_forward_ts = t;

        let entry = table.find_mut(&addr(4)).unwrap();
        assert!(apply_penalty::<Cfg>(entry, t + Duration::from_secs(2)));
        assert_eq!(entry.trust.value(), 99);
        assert_eq!(entry.last_forward_ts, Timestamp::from_secs(22));

        // 8 s after the last forward: outside MINIMUM_DELAY.
        assert!(!apply_penalty::<Cfg>(entry, t + Duration::from_secs(10)));
        assert_eq!(entry.trust.value(), 99);
        assert_eq!(entry.last_forward_ts, Timestamp::from_secs(30));
    }

    #[test]
    fn test_penalty_boundary_is_exclusive() {
        let mut table = table_with(&[(addr(4), 100)]);
        let entry = table.find_mut(&addr(4)).unwrap();
        entry.last_forward_ts = Timestamp::from_secs(10);

        assert!(!apply_penalty::<Cfg>(entry, Timestamp::from_secs(15)));
        assert_eq!(entry.trust.value(), 100);
        assert!(apply_penalty::<Cfg>(entry, Timestamp::from_millis(19_999)));
        assert_eq!(entry.trust.value(), 99);
    }

    #[test]
    fn test_penalty_stops_below_threshold() {
        let mut table = table_with(&[(addr(4), 50)]);
        let entry = table.find_mut(&addr(4)).unwrap();

        assert!(apply_penalty::<Cfg>(entry, Timestamp::from_secs(1)));
        assert_eq!(entry.trust.value(), 49);
        assert_eq!(entry.state, NeighborState::Blocked);

        assert!(!apply_penalty::<Cfg>(entry, Timestamp::from_secs(2)));
        assert_eq!(entry.trust.value(), 49);
        assert_eq!(entry.last_forward_ts, Timestamp::from_secs(2));
    }

    #[test]
    fn test_penalty_skips_sink() {
        let mut table = table_with(&[(SINK, 100)]);
        let entry = table.find_mut(&SINK).unwrap();
        assert!(!apply_penalty::<Cfg>(entry, Timestamp::from_secs(1)));
        assert_eq!(entry.trust, Trust::FULL);
    }

    #[test]
    fn test_penalty_keeps_last_forward_monotonic() {
        let mut table = table_with(&[(addr(4), 100)]);
        let entry = table.find_mut(&addr(4)).unwrap();
        entry.last_forward_ts = Timestamp::from_secs(30);
        apply_penalty::<Cfg>(entry, Timestamp::from_secs(12));
        assert_eq!(entry.last_forward_ts, Timestamp::from_secs(30));
    }

    #[test]
    fn test_merge_averages_known_entries() {
        let mut table = table_with(&[(addr(2), 100), (addr(3), 60)]);
        let outcome = merge::<Cfg>(&mut table, &[rec(3, 20)]);

        assert_eq!(trust_of(&table, addr(3)), 40);
        assert_eq!(trust_of(&table, addr(2)), 100);
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.newly_blocked, [(addr(3), Trust::new(40))]);
    }

    #[test]
    fn test_merge_ignores_unknown_addresses() {
        let mut table = table_with(&[(addr(2), 100)]);
        merge::<Cfg>(&mut table, &[rec(8, 10), rec(9, 70)]);
        assert_eq!(table.len(), 1);
        assert!(table.find(&addr(8)).is_none());
    }

    #[test]
    fn test_merge_stops_at_zero_sentinel() {
        let mut table = table_with(&[(addr(2), 100), (addr(3), 100)]);
        merge::<Cfg>(&mut table, &[rec(2, 80), TrustRecord::EMPTY, rec(3, 20)]);
        assert_eq!(trust_of(&table, addr(2)), 90);
        assert_eq!(trust_of(&table, addr(3)), 100);
    }

    #[test]
    fn test_merge_pins_sink() {
        let mut table = table_with(&[(SINK, 80), (addr(2), 100)]);
        merge::<Cfg>(&mut table, &[TrustRecord {
            addr: SINK,
            trust: Trust::new(10),
        }]);
        assert_eq!(trust_of(&table, SINK), 100);
    }

    #[test]
    fn test_merge_own_snapshot_is_noop() {
        let mut table = table_with(&[(addr(2), 77), (addr(3), 51), (addr(4), 12)]);
        let before = snapshot(&table);
        let outcome = merge::<Cfg>(&mut table, &before);
        assert_eq!(snapshot(&table), before);
        assert_eq!(outcome.updated, 0);
    }

    #[test]
    fn test_merge_can_lift_blocked_entry() {
        let mut table = table_with(&[(addr(2), 100), (addr(6), 30)]);
        table.find_mut(&addr(6)).unwrap().state = NeighborState::Expired;

        merge::<Cfg>(&mut table, &[rec(6, 90)]);
        let entry = table.find(&addr(6)).unwrap();
        assert_eq!(entry.trust.value(), 60);
        assert_eq!(entry.state, NeighborState::Trusted);
    }

    #[test]
    fn test_expiry_rearms_trusted() {
        let mut table = table_with(&[(addr(2), 50)]);
        let slot = table.slot_of(&addr(2)).unwrap();
        let now = Timestamp::from_secs(10);

        assert_eq!(on_expiry::<Cfg>(&mut table, slot, now), ExpiryAction::Rearmed);
        let entry = table.get(slot).unwrap();
        assert_eq!(entry.expiry, Some(Timestamp::from_secs(20)));
        assert_eq!(entry.state, NeighborState::Trusted);
        assert_eq!(entry.trust.value(), 50);
    }

    #[test]
    fn test_expiry_below_threshold_marks_expired() {
        let mut table = table_with(&[(addr(5), 49)]);
        let slot = table.slot_of(&addr(5)).unwrap();

        let action = on_expiry::<Cfg>(&mut table, slot, Timestamp::from_secs(10));
        assert_eq!(
            action,
            ExpiryAction::BelowThreshold {
                addr: addr(5),
                trust: Trust::new(49)
            }
        );
        let entry = table.get(slot).unwrap();
        assert_eq!(entry.state, NeighborState::Expired);
        assert_eq!(entry.expiry, None);
        assert!(is_blocked::<Cfg>(&table, &addr(5)));
    }

    #[test]
    fn test_expiry_sink_is_immortal() {
        let mut table = table_with(&[(SINK, 100)]);
        let slot = table.slot_of(&SINK).unwrap();

        assert_eq!(
            on_expiry::<Cfg>(&mut table, slot, Timestamp::from_secs(10)),
            ExpiryAction::Ignored
        );
        assert_eq!(table.get(slot).unwrap().expiry, None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_stale_expiry_is_revalidated() {
        let mut table = table_with(&[(addr(5), 10)]);
        let slot = table.slot_of(&addr(5)).unwrap();
        table.rearm(slot, Timestamp::from_secs(8), Cfg::NEIGHBOR_TIMEOUT);

        assert_eq!(
            on_expiry::<Cfg>(&mut table, slot, Timestamp::from_secs(10)),
            ExpiryAction::Ignored
        );
        assert_eq!(
            on_expiry::<Cfg>(&mut table, 7, Timestamp::from_secs(10)),
            ExpiryAction::Ignored
        );
    }
}
