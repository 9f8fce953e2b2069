//! Vector clocks: a per-replica logical timestamp map with pointwise merge
//! and four-way causal comparison (equal / before / after / concurrent).
//!
//! Clocks never decrement. `merge` always increments the local entry, so a
//! merge performed before any local write still produces a clock strictly
//! causally after the remote one.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The outcome of comparing two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordering {
    Equal,
    Before,
    After,
    Concurrent,
}

/// A replica-keyed logical counter map.
///
/// Serializes as a plain `{replica_id: counter}` JSON object (a `BTreeMap`
/// is used rather than a `HashMap` so the serialized form is deterministic).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock(BTreeMap<String, u64>);

impl VectorClock {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// The counter for `replica`, or 0 if unobserved.
    pub fn get(&self, replica: &str) -> u64 {
        self.0.get(replica).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Increment this replica's own entry.
    pub fn increment(&mut self, replica: &str) {
        *self.0.entry(replica.to_string()).or_insert(0) += 1;
    }

    /// Pointwise max with `other`, then increment `self_replica`'s entry.
    ///
    /// This is the only way remote knowledge enters a clock: merging never
    /// loses information and always advances the local replica's counter,
    /// so any write made after the merge is causally after everything the
    /// remote side had observed.
    pub fn merge(&mut self, other: &VectorClock, self_replica: &str) {
        for (replica, count) in other.0.iter() {
            let entry = self.0.entry(replica.clone()).or_insert(0);
            if *count > *entry {
                *entry = *count;
            }
        }
        self.increment(self_replica);
    }

    /// Compare `self` against `other` over the union of replica ids,
    /// treating missing entries as 0.
    pub fn compare(&self, other: &VectorClock) -> Ordering {
        let mut self_ahead = false;
        let mut other_ahead = false;

        let mut replicas: Vec<&String> = self.0.keys().chain(other.0.keys()).collect();
        replicas.sort_unstable();
        replicas.dedup();

        for replica in replicas {
            let a = self.get(replica);
            let b = other.get(replica);
            match a.cmp(&b) {
                CmpOrdering::Greater => self_ahead = true,
                CmpOrdering::Less => other_ahead = true,
                CmpOrdering::Equal => {}
            }
        }

        match (self_ahead, other_ahead) {
            (false, false) => Ordering::Equal,
            (false, true) => Ordering::Before,
            (true, false) => Ordering::After,
            (true, true) => Ordering::Concurrent,
        }
    }

    pub fn dominates(&self, other: &VectorClock) -> bool {
        matches!(self.compare(other), Ordering::After | Ordering::Equal)
    }

    pub fn is_dominated_by(&self, other: &VectorClock) -> bool {
        matches!(self.compare(other), Ordering::Before | Ordering::Equal)
    }

    pub fn is_concurrent_with(&self, other: &VectorClock) -> bool {
        matches!(self.compare(other), Ordering::Concurrent)
    }
}

impl From<BTreeMap<String, u64>> for VectorClock {
    fn from(map: BTreeMap<String, u64>) -> Self {
        Self(map)
    }
}

impl From<VectorClock> for BTreeMap<String, u64> {
    fn from(clock: VectorClock) -> Self {
        clock.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_clock_has_zero_for_any_replica() {
        let clock = VectorClock::new();
        assert_eq!(clock.get("c1"), 0);
    }

    #[test]
    fn increment_advances_only_local_entry() {
        let mut clock = VectorClock::new();
        clock.increment("c1");
        clock.increment("c1");
        clock.increment("c2");
        assert_eq!(clock.get("c1"), 2);
        assert_eq!(clock.get("c2"), 1);
    }

    #[test]
    fn identical_clocks_compare_equal() {
        let mut a = VectorClock::new();
        a.increment("c1");
        let b = a.clone();
        assert_eq!(a.compare(&b), Ordering::Equal);
    }

    #[test]
    fn strictly_smaller_clock_is_before() {
        let mut a = VectorClock::new();
        a.increment("c1");
        let mut b = a.clone();
        b.increment("c1");
        assert_eq!(a.compare(&b), Ordering::Before);
        assert_eq!(b.compare(&a), Ordering::After);
    }

    #[test]
    fn divergent_clocks_are_concurrent() {
        let mut a = VectorClock::new();
        a.increment("c1");
        let mut b = VectorClock::new();
        b.increment("c2");
        assert_eq!(a.compare(&b), Ordering::Concurrent);
        assert_eq!(b.compare(&a), Ordering::Concurrent);
    }

    #[test]
    fn merge_is_pointwise_max_then_local_increment() {
        let mut a = VectorClock::new();
        a.increment("c1"); // c1:1
        let mut b = VectorClock::new();
        b.increment("c1");
        b.increment("c2"); // c1:1, c2:1

        a.merge(&b, "c1");
        assert_eq!(a.get("c1"), 2); // max(1,1) + 1
        assert_eq!(a.get("c2"), 1);
    }

    #[test]
    fn merge_before_any_local_write_is_still_safe() {
        // A fresh replica merging remote state for the first time must end
        // up strictly after the remote clock, not merely equal to it.
        let mut remote = VectorClock::new();
        remote.increment("server");
        remote.increment("server");

        let mut local = VectorClock::new();
        local.merge(&remote, "c1");

        assert_eq!(local.compare(&remote), Ordering::After);
    }

    #[test]
    fn merge_result_dominates_both_inputs() {
        let mut a = VectorClock::new();
        a.increment("c1");
        let mut b = VectorClock::new();
        b.increment("c2");

        let mut merged = a.clone();
        merged.merge(&b, "c1");

        assert!(matches!(merged.compare(&a), Ordering::After | Ordering::Equal));
        assert!(matches!(merged.compare(&b), Ordering::After | Ordering::Equal));
    }

    #[test]
    fn json_round_trip_is_a_plain_object() {
        let mut clock = VectorClock::new();
        clock.increment("c1");
        clock.increment("c2");
        let json = serde_json::to_value(&clock).unwrap();
        assert_eq!(json, serde_json::json!({"c1": 1, "c2": 1}));

        let back: VectorClock = serde_json::from_value(json).unwrap();
        assert_eq!(back, clock);
    }
}
