// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-window trace counts.

use std::{collections::HashMap, sync::Mutex};

use crate::capture::TraceKey;

/// Occurrence counts per trace key for one reporting window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceAggregate {
    counts: HashMap<TraceKey, u64>,
    total: u64,
}

impl TraceAggregate {
    /// An empty aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more occurrence of `key`.
    pub fn record(&mut self, key: TraceKey) {
        *self.counts.entry(key).or_insert(0) += 1;
        self.total += 1;
    }

    /// Occurrences of `key` in this window.
    pub fn count(&self, key: &TraceKey) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Entries sorted by count descending, ties broken by ascending key.
    pub fn sorted(&self) -> Vec<(&TraceKey, u64)> {
        let mut entries: Vec<_> = self.counts.iter().map(|(k, c)| (k, *c)).collect();
        entries.sort_by(|(ka, ca), (kb, cb)| cb.cmp(ca).then_with(|| ka.cmp(kb)));
        entries
    }
}

impl FromIterator<(TraceKey, u64)> for TraceAggregate {
    fn from_iter<I: IntoIterator<Item = (TraceKey, u64)>>(iter: I) -> Self {
        let mut aggregate = TraceAggregate::new();
        for (key, count) in iter {
            *aggregate.counts.entry(key).or_insert(0) += count;
            aggregate.total += count;
        }
        aggregate
    }
}

/// A [`TraceAggregate`] that can be recorded into and drained from
/// different threads.
///
/// Every `record` lands in exactly one drained aggregate: the one current
/// when the record took the lock.
#[derive(Debug, Default)]
pub struct TraceAggregator {
    current: Mutex<TraceAggregate>,
}

impl TraceAggregator {
    /// An aggregator with an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence of `key` in the current window.
    pub fn record(&self, key: TraceKey) {
        self.lock().record(key);
    }

    /// Swap in an empty window and return the previous one with its total.
    pub fn drain_and_reset(&self) -> (TraceAggregate, u64) {
        let aggregate = std::mem::take(&mut *self.lock());
        let total = aggregate.total();
        (aggregate, total)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TraceAggregate> {
        // counts stay consistent even if a holder panicked
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn key(pcs: &[usize]) -> TraceKey {
        TraceKey::new(pcs.to_vec())
    }

    #[test]
    fn test_identical_keys_share_a_count() {
        let mut aggregate = TraceAggregate::new();
        aggregate.record(key(&[1, 2, 3]));
        aggregate.record(key(&[1, 2, 3]));
        assert_eq!(aggregate.len(), 1);
        assert_eq!(aggregate.count(&key(&[1, 2, 3])), 2);
        assert_eq!(aggregate.total(), 2);
    }

    #[test]
    fn test_sorted_by_count_then_key() {
        let aggregate: TraceAggregate = [
            (key(&[0xa]), 10),
            (key(&[0xb]), 30),
            (key(&[0xc]), 5),
            (key(&[0x9]), 10),
        ]
        .into_iter()
        .collect();
        let order: Vec<_> = aggregate
            .sorted()
            .into_iter()
            .map(|(k, c)| (k.frames()[0], c))
            .collect();
        assert_eq!(order, vec![(0xb, 30), (0x9, 10), (0xa, 10), (0xc, 5)]);
        assert_eq!(aggregate.total(), 55);
    }

    #[test]
    fn test_drain_twice_is_empty() {
        let aggregator = TraceAggregator::new();
        aggregator.record(key(&[1]));
        aggregator.record(key(&[2]));
        let (first, total) = aggregator.drain_and_reset();
        assert_eq!(total, 2);
        assert_eq!(first.len(), 2);
        let (second, total) = aggregator.drain_and_reset();
        assert!(second.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn test_record_after_drain_starts_fresh() {
        let aggregator = TraceAggregator::new();
        aggregator.record(key(&[1]));
        aggregator.record(key(&[1]));
        aggregator.drain_and_reset();
        aggregator.record(key(&[1]));
        let (aggregate, _) = aggregator.drain_and_reset();
        assert_eq!(aggregate.count(&key(&[1])), 1);
    }

    #[test]
    fn test_concurrent_drain_loses_nothing() {
        let aggregator = Arc::new(TraceAggregator::new());
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let aggregator = aggregator.clone();
                std::thread::spawn(move || {
                    for i in 0..10_000usize {
                        aggregator.record(key(&[t, i % 7]));
                    }
                })
            })
            .collect();
        let mut drained = 0;
        while writers.iter().any(|w| !w.is_finished()) {
            drained += aggregator.drain_and_reset().1;
        }
        for w in writers {
            w.join().unwrap();
        }
        drained += aggregator.drain_and_reset().1;
        assert_eq!(drained, 40_000);
    }
}
