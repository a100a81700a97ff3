//! Snapshots of a sheet's used range and the cache slot that holds the latest one.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::value::CellValue;

/// An immutable rows × columns grid produced by one used-range read.
///
/// Always rectangular: rows shorter than the widest row are padded with
/// [`CellValue::Empty`] on construction.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Snapshot {
    rows: Vec<Vec<CellValue>>,
}

impl Snapshot {
    /// Build a snapshot from backend rows, padding ragged rows.
    pub fn from_rows(mut rows: Vec<Vec<CellValue>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(width, CellValue::Empty);
        }
        Self { rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get a cell by 0-based position.
    pub fn get(&self, row: usize, column: usize) -> Option<&CellValue> {
        self.rows.get(row)?.get(column)
    }

    pub fn row(&self, row: usize) -> Option<&[CellValue]> {
        self.rows.get(row).map(Vec::as_slice)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[CellValue]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// The first `n` rows (or fewer).
    pub fn head(&self, n: usize) -> &[Vec<CellValue>] {
        &self.rows[..n.min(self.rows.len())]
    }

    pub fn into_rows(self) -> Vec<Vec<CellValue>> {
        self.rows
    }
}

/// Single slot holding the most recent [`Snapshot`].
///
/// Writers replace the whole slot; readers clone the `Arc` out without
/// waiting on spreadsheet I/O, so a reader sees either the previous or the
/// newest snapshot and never a partially written one.
#[derive(Debug)]
pub struct SnapshotCache {
    slot: watch::Sender<Option<Arc<Snapshot>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot }
    }

    /// The last stored snapshot, if any read has completed.
    pub fn get(&self) -> Option<Arc<Snapshot>> {
        self.slot.borrow().clone()
    }

    /// Replace the cached snapshot and notify subscribers.
    pub fn store(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        self.slot.send_replace(Some(Arc::clone(&snapshot)));
        snapshot
    }

    pub fn clear(&self) {
        self.slot.send_replace(None);
    }

    /// Receiver that is notified every time the slot is replaced.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.slot.subscribe()
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn grid() -> Vec<Vec<CellValue>> {
        vec![
            vec![1.into(), "a".into()],
            vec![2.into(), "b".into()],
            vec![3.into(), "c".into()],
        ]
    }

    #[test]
    fn test_dimensions() {
        let snapshot = Snapshot::from_rows(grid());
        assert_eq!(snapshot.row_count(), 3);
        assert_eq!(snapshot.column_count(), 2);
        assert_eq!(snapshot.get(2, 1), Some(&CellValue::from("c")));
        assert_eq!(snapshot.get(3, 0), None);
        assert_eq!(snapshot.head(2).len(), 2);
        assert_eq!(snapshot.head(10).len(), 3);
    }

    #[test]
    fn test_ragged_rows_are_padded() {
        let snapshot =
            Snapshot::from_rows(vec![vec![1.into()], vec![1.into(), 2.into(), 3.into()]]);
        assert_eq!(snapshot.row(0).unwrap().len(), 3);
        assert_eq!(snapshot.get(0, 2), Some(&CellValue::Empty));
    }

    #[test]
    fn test_cache_replaces_whole_slot() {
        let cache = SnapshotCache::new();
        assert!(cache.get().is_none());

        let mut rx = cache.subscribe();
        cache.store(Snapshot::from_rows(grid()));
        assert!(rx.has_changed().unwrap());
        assert_eq!(cache.get().unwrap().row_count(), 3);

        let held = cache.get().unwrap();
        cache.store(Snapshot::from_rows(vec![vec![42.into()]]));
        // earlier readers keep the snapshot they took
        assert_eq!(held.row_count(), 3);
        assert_eq!(cache.get().unwrap().get(0, 0), Some(&CellValue::Number(42.0)));

        cache.clear();
        assert!(cache.get().is_none());
    }

    fn cell() -> impl Strategy<Value = CellValue> {
        prop_oneof![
            Just(CellValue::Empty),
            any::<bool>().prop_map(CellValue::Bool),
            (-1e6f64..1e6).prop_map(CellValue::Number),
            "[a-z]{0,4}".prop_map(CellValue::String),
        ]
    }

    proptest! {
        #[test]
        fn prop_snapshot_is_rectangular(
            rows in prop::collection::vec(prop::collection::vec(cell(), 0..6), 0..8)
        ) {
            let widest = rows.iter().map(Vec::len).max().unwrap_or(0);
            let count = rows.len();
            let snapshot = Snapshot::from_rows(rows);
            prop_assert_eq!(snapshot.row_count(), count);
            for row in snapshot.rows() {
                prop_assert_eq!(row.len(), widest);
            }
        }
    }
}
