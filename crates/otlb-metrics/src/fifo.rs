//! Bounded, timestamp-ordered point buffer.

use std::collections::BTreeMap;

use crate::data_point::DataPoint;

/// A bounded multiset of data points ordered by `time_unix_nano`.
///
/// Several points may share a timestamp (one per metric label set), so each
/// key maps to a bucket. Not thread-safe on its own; the owning container
/// serializes access.
#[derive(Default)]
pub struct MetricFifo {
    points: BTreeMap<u64, Vec<DataPoint>>,
    len: usize,
}

impl MetricFifo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a point, evicting first by age and then by size so that the
    /// buffer never exceeds `max_size` afterwards.
    ///
    /// Age eviction drops everything older than `now - max_age`, where `now`
    /// is the newest timestamp seen (the incoming point or a buffered one,
    /// whichever is later). Size eviction then drops oldest-first until one
    /// slot is free.
    pub fn add(&mut self, point: DataPoint, max_size: usize, max_age_secs: u64) {
        let newest = self
            .points
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0)
            .max(point.time_unix_nano());
        let horizon = newest.saturating_sub(max_age_secs.saturating_mul(1_000_000_000));
        self.clean_oldest(horizon);

        while self.len >= max_size.max(1) {
            self.pop_oldest();
        }

        self.points
            .entry(point.time_unix_nano())
            .or_default()
            .push(point);
        self.len += 1;
    }

    /// Drop every point strictly older than `horizon_ns`.
    pub fn clean_oldest(&mut self, horizon_ns: u64) {
        let keep = self.points.split_off(&horizon_ns);
        for bucket in self.points.values() {
            self.len -= bucket.len();
        }
        self.points = keep;
    }

    fn pop_oldest(&mut self) {
        if let Some(mut entry) = self.points.first_entry() {
            let bucket = entry.get_mut();
            bucket.pop();
            self.len -= 1;
            if bucket.is_empty() {
                entry.remove();
            }
        }
    }

    /// Timestamp of the newest buffered point.
    pub fn latest(&self) -> Option<u64> {
        self.points.keys().next_back().copied()
    }

    /// All points sharing the exact timestamp `ts`.
    pub fn points_at(&self, ts: u64) -> &[DataPoint] {
        self.points.get(&ts).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataPoint> {
        self.points.values().flatten()
    }
}
