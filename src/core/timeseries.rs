//! Time-indexed step-function series.

use super::types::Timestamp;

/// A time-indexed series of values kept sorted by timestamp.
///
/// Lookups resolve to the most recent entry at or before the requested
/// timestamp, never interpolating between entries.
#[derive(Debug, Clone, Default)]
pub struct TimeSeries<T> {
    /// Timestamps for each value, strictly increasing.
    timestamps: Vec<Timestamp>,
    /// Values.
    values: Vec<T>,
}

impl<T: Clone> TimeSeries<T> {
    /// Create an empty series.
    pub fn new() -> Self {
        Self {
            timestamps: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Create from unsorted (timestamp, value) pairs. Later duplicates win.
    pub fn from_points(points: impl IntoIterator<Item = (Timestamp, T)>) -> Self {
        let mut series = Self::new();
        for (timestamp, value) in points {
            series.insert(timestamp, value);
        }
        series
    }

    /// Insert or replace the value at `timestamp`.
    pub fn insert(&mut self, timestamp: Timestamp, value: T) {
        match self.timestamps.binary_search(&timestamp) {
            Ok(idx) => self.values[idx] = value,
            Err(idx) => {
                self.timestamps.insert(idx, timestamp);
                self.values.insert(idx, value);
            }
        }
    }

    /// Get the length.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value in effect at `timestamp` (most recent entry at or before it).
    pub fn value_at(&self, timestamp: Timestamp) -> Option<&T> {
        let idx = self.timestamps.partition_point(|&t| t <= timestamp);
        if idx == 0 {
            None
        } else {
            self.values.get(idx - 1)
        }
    }

    /// Value recorded exactly at `timestamp`.
    pub fn exact(&self, timestamp: Timestamp) -> Option<&T> {
        self.timestamps
            .binary_search(&timestamp)
            .ok()
            .and_then(|idx| self.values.get(idx))
    }

    /// First recorded timestamp.
    #[inline]
    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.timestamps.first().copied()
    }

    /// Last recorded timestamp.
    #[inline]
    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.timestamps.last().copied()
    }

    /// Entries with timestamps in `[start, end]`.
    pub fn range(&self, start: Timestamp, end: Timestamp) -> impl Iterator<Item = (Timestamp, &T)> {
        let lo = self.timestamps.partition_point(|&t| t < start);
        let hi = self.timestamps.partition_point(|&t| t <= end);
        self.timestamps[lo..hi]
            .iter()
            .copied()
            .zip(self.values[lo..hi].iter())
    }

    /// Iterator over (timestamp, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, &T)> {
        self.timestamps.iter().copied().zip(self.values.iter())
    }
}
