//! Live stress-strain series shared between the worker and readers
//!
//! The acquisition worker is the only writer. It appends a whole tick at a
//! time under one write lock, so a reader taking a [`LiveSeries::snapshot`]
//! sees either all of a tick's points or none of them.

use crate::types::SeriesPoint;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct SeriesData {
    points: Vec<SeriesPoint>,
    /// Bumped on every mutation so readers can skip unchanged snapshots
    revision: u64,
}

/// Cloneable handle to the live series
#[derive(Debug, Clone, Default)]
pub struct LiveSeries {
    inner: Arc<RwLock<SeriesData>>,
}

impl LiveSeries {
    pub fn new() -> Self {
        Self::default()
    }

    // Poisoning is ignored: every mutation completes under a single guard.
    fn read(&self) -> RwLockReadGuard<'_, SeriesData> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SeriesData> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of all points in insertion order
    pub fn snapshot(&self) -> Vec<SeriesPoint> {
        self.read().points.clone()
    }

    /// Points appended after the first `from` points
    pub fn snapshot_since(&self, from: usize) -> Vec<SeriesPoint> {
        let data = self.read();
        data.points.get(from..).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Points as `[x, y]` pairs for a plotting consumer
    pub fn plot_points(&self) -> Vec<[f64; 2]> {
        self.read().points.iter().map(SeriesPoint::as_xy).collect()
    }

    pub fn len(&self) -> usize {
        self.read().points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().points.is_empty()
    }

    pub fn last(&self) -> Option<SeriesPoint> {
        self.read().points.last().copied()
    }

    pub fn revision(&self) -> u64 {
        self.read().revision
    }

    /// Append one tick's points atomically
    pub(crate) fn append_tick(&self, points: &[SeriesPoint]) {
        if points.is_empty() {
            return;
        }
        let mut data = self.write();
        data.points.extend_from_slice(points);
        data.revision += 1;
    }

    pub(crate) fn clear(&self) {
        let mut data = self.write();
        data.points.clear();
        data.revision += 1;
    }

    /// Apply `f` to every point's stress, keeping order and count
    pub(crate) fn rescale_stress(&self, f: impl Fn(f64) -> f64) {
        let mut data = self.write();
        for point in data.points.iter_mut() {
            point.stress = f(point.stress);
        }
        data.revision += 1;
    }
}
