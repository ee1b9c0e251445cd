//! Nearest-timestamp alignment of detections with ground truth.
//!
//! Ground truth is kept in a sorted array and looked up by binary search.
//! On an exact tie (query equidistant from two entries) the **earlier**
//! timestamp wins, independent of the order the entries were inserted in.

use crate::error::{KpiError, Result};
use crate::types::Timestamp;
use std::collections::BTreeMap;

/// Ordered `timestamp → value` collection with nearest-timestamp lookup.
#[derive(Clone, Debug)]
pub struct GroundTruthIndex<T> {
    /// Sorted by timestamp, no duplicates
    entries: Vec<(Timestamp, T)>,
}

impl<T> Default for GroundTruthIndex<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> FromIterator<(Timestamp, T)> for GroundTruthIndex<T> {
    /// Duplicate timestamps keep the value inserted last.
    fn from_iter<I: IntoIterator<Item = (Timestamp, T)>>(iter: I) -> Self {
        let map: BTreeMap<Timestamp, T> = iter.into_iter().collect();
        Self {
            entries: map.into_iter().collect(),
        }
    }
}

impl<T> From<BTreeMap<Timestamp, T>> for GroundTruthIndex<T> {
    fn from(map: BTreeMap<Timestamp, T>) -> Self {
        Self {
            entries: map.into_iter().collect(),
        }
    }
}

impl<T> GroundTruthIndex<T> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Timestamps in ascending order.
    pub fn timestamps(&self) -> impl Iterator<Item = Timestamp> + '_ {
        self.entries.iter().map(|(ts, _)| *ts)
    }

    /// Index of the entry closest to `query`.
    fn closest_idx(&self, query: Timestamp) -> Result<usize> {
        if self.entries.is_empty() {
            return Err(KpiError::EmptyGroundTruth);
        }
        // First entry with ts >= query
        let upper = self.entries.partition_point(|(ts, _)| *ts < query);
        if upper == 0 {
            return Ok(0);
        }
        if upper == self.entries.len() {
            return Ok(upper - 1);
        }
        let below = query - self.entries[upper - 1].0;
        let above = self.entries[upper].0 - query;
        // `<=`: earlier timestamp wins on a tie
        Ok(if below <= above { upper - 1 } else { upper })
    }

    /// Value whose timestamp is closest to `query`.
    pub fn closest(&self, query: Timestamp) -> Result<&T> {
        self.closest_entry(query).map(|(_, v)| v)
    }

    /// Closest `(timestamp, value)` pair.
    pub fn closest_entry(&self, query: Timestamp) -> Result<(Timestamp, &T)> {
        let idx = self.closest_idx(query)?;
        let (ts, value) = &self.entries[idx];
        Ok((*ts, value))
    }

    /// Like [`closest_entry`](Self::closest_entry), but `Ok(None)` when the
    /// nearest entry is more than `tolerance` away from `query`.
    pub fn closest_within(
        &self,
        query: Timestamp,
        tolerance: Timestamp,
    ) -> Result<Option<(Timestamp, &T)>> {
        let (ts, value) = self.closest_entry(query)?;
        Ok((ts.abs_diff(query) <= tolerance).then_some((ts, value)))
    }
}

/// Nearest-timestamp lookup on a plain ordered map.
pub fn closest<T>(ground_truth_by_ts: &BTreeMap<Timestamp, T>, query: Timestamp) -> Result<&T> {
    let before = ground_truth_by_ts.range(..=query).next_back();
    let after = ground_truth_by_ts.range(query..).next();
    match (before, after) {
        (None, None) => Err(KpiError::EmptyGroundTruth),
        (Some((_, v)), None) | (None, Some((_, v))) => Ok(v),
        (Some((tb, vb)), Some((ta, va))) => {
            if query - tb <= ta - query {
                Ok(vb)
            } else {
                Ok(va)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ab_index() -> GroundTruthIndex<&'static str> {
        [(100, "A"), (200, "B")].into_iter().collect()
    }

    #[test]
    fn closest_picks_nearest() {
        let idx = ab_index();
        assert_eq!(*idx.closest(190).unwrap(), "B");
        assert_eq!(*idx.closest(110).unwrap(), "A");
        assert_eq!(*idx.closest(100).unwrap(), "A");
    }

    #[test]
    fn out_of_range_queries_clamp_to_ends() {
        let idx = ab_index();
        assert_eq!(*idx.closest(0).unwrap(), "A");
        assert_eq!(*idx.closest(10_000).unwrap(), "B");
    }

    #[test]
    fn tie_prefers_earlier_regardless_of_insertion_order() {
        let idx: GroundTruthIndex<&str> = [(200, "B"), (100, "A")].into_iter().collect();
        assert_eq!(*idx.closest(150).unwrap(), "A");
        assert_eq!(idx.timestamps().collect::<Vec<_>>(), vec![100, 200]);
    }

    #[test]
    fn duplicate_timestamp_keeps_last() {
        let idx: GroundTruthIndex<&str> = [(100, "old"), (100, "new")].into_iter().collect();
        assert_eq!(idx.len(), 1);
        assert_eq!(*idx.closest(100).unwrap(), "new");
    }

    #[test]
    fn empty_ground_truth_is_an_error() {
        let idx: GroundTruthIndex<u8> = GroundTruthIndex::default();
        assert_eq!(idx.closest(5), Err(KpiError::EmptyGroundTruth));
        let map: BTreeMap<Timestamp, u8> = BTreeMap::new();
        assert_eq!(closest(&map, 5), Err(KpiError::EmptyGroundTruth));
    }

    #[test]
    fn tolerance_window() {
        let idx = ab_index();
        assert_eq!(idx.closest_within(130, 30).unwrap(), Some((100, &"A")));
        assert_eq!(idx.closest_within(140, 30).unwrap(), None);
    }

    #[test]
    fn map_lookup_matches_index() {
        let map: BTreeMap<Timestamp, &str> = [(100, "A"), (200, "B"), (300, "C")].into();
        let idx = GroundTruthIndex::from(map.clone());
        for q in [0, 99, 150, 151, 190, 250, 260, 299, 1000] {
            assert_eq!(closest(&map, q).unwrap(), idx.closest(q).unwrap(), "query {q}");
        }
    }
}
