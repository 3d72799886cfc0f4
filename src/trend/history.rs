use time::OffsetDateTime;

use crate::models::GasSnapshot;

/// Snapshots kept for the dashboard's multi-gas trend chart
pub const DASHBOARD_HISTORY_CAPACITY: usize = 10;

/// Chronological snapshots, at most one per reading timestamp
#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    capacity: usize,
    snapshots: Vec<GasSnapshot>,
}

impl SnapshotHistory {
    pub fn new(capacity: usize) -> Self {
        SnapshotHistory {
            capacity: capacity.max(1),
            snapshots: Vec::new(),
        }
    }

    /// Insert a snapshot, replacing one with the same timestamp, then trim
    /// the oldest entries beyond capacity.
    pub fn push(&mut self, snapshot: GasSnapshot) {
        let key = sort_key(&snapshot);
        match self
            .snapshots
            .binary_search_by(|existing| sort_key(existing).cmp(&key))
        {
            Ok(index) => self.snapshots[index] = snapshot,
            Err(index) => self.snapshots.insert(index, snapshot),
        }

        if self.snapshots.len() > self.capacity {
            let excess = self.snapshots.len() - self.capacity;
            self.snapshots.drain(..excess);
        }
    }

    pub fn latest(&self) -> Option<&GasSnapshot> {
        self.snapshots.last()
    }

    pub fn snapshots(&self) -> &[GasSnapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

fn sort_key(snapshot: &GasSnapshot) -> OffsetDateTime {
    snapshot.timestamp.unwrap_or(OffsetDateTime::UNIX_EPOCH)
}
