//! In-memory key store.

use crate::error::{StorageError, StorageResult};
use crate::keystore::{
    KeyStore, Record, ScanBounds, ScanCursor, SequenceNumber, WriteBatch,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<Vec<u8>, StoredValue>,
    last_sequence: u64,
}

#[derive(Debug, Clone)]
struct StoredValue {
    sequence: u64,
    value: Vec<u8>,
}

/// An in-memory [`KeyStore`] backed by an ordered map.
///
/// Suitable for tests, ephemeral indexes, and as the reference
/// implementation of the store contract. Thread-safe; share it with
/// `Arc`.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use facetdb_storage::{KeyStore, MemoryKeyStore, Transaction};
///
/// let store = Arc::new(MemoryKeyStore::new());
/// let mut txn = Transaction::begin(store.clone());
/// txn.put(b"greeting".to_vec(), b"hello".to_vec()).unwrap();
/// txn.commit().unwrap();
/// assert_eq!(store.record_count().unwrap(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    inner: Arc<RwLock<Inner>>,
    fail_next_prepare: AtomicBool,
}

impl MemoryKeyStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arranges for the next `validate` call to fail.
    ///
    /// Test hook for exercising commit-failure paths: a coordinator that
    /// stages this store must observe the failure before anything is
    /// applied anywhere.
    pub fn fail_next_prepare(&self) {
        self.fail_next_prepare.store(true, Ordering::SeqCst);
    }

    /// Returns all records, for test assertions.
    #[must_use]
    pub fn dump(&self) -> Vec<Record> {
        let inner = self.inner.read();
        inner
            .records
            .iter()
            .map(|(k, v)| Record {
                key: k.clone(),
                value: v.value.clone(),
                sequence: SequenceNumber::new(v.sequence),
            })
            .collect()
    }
}

impl KeyStore for MemoryKeyStore {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Record>> {
        let inner = self.inner.read();
        Ok(inner.records.get(key).map(|stored| Record {
            key: key.to_vec(),
            value: stored.value.clone(),
            sequence: SequenceNumber::new(stored.sequence),
        }))
    }

    fn last_sequence(&self) -> StorageResult<SequenceNumber> {
        Ok(SequenceNumber::new(self.inner.read().last_sequence))
    }

    fn record_count(&self) -> StorageResult<u64> {
        Ok(self.inner.read().records.len() as u64)
    }

    fn scan(
        &self,
        bounds: ScanBounds,
        descending: bool,
    ) -> StorageResult<Box<dyn ScanCursor>> {
        Ok(Box::new(MemoryScanCursor {
            inner: Arc::clone(&self.inner),
            bounds,
            descending,
            last_key: None,
            done: false,
        }))
    }

    fn validate(&self, _batch: &WriteBatch) -> StorageResult<()> {
        if self.fail_next_prepare.swap(false, Ordering::SeqCst) {
            return Err(StorageError::prepare_failed("injected prepare failure"));
        }
        Ok(())
    }

    fn apply(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut inner = self.inner.write();
        for (key, write) in batch {
            match write {
                Some(value) => {
                    inner.last_sequence += 1;
                    let sequence = inner.last_sequence;
                    inner.records.insert(key, StoredValue { sequence, value });
                }
                None => {
                    inner.records.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        self.inner.write().records.clear();
        Ok(())
    }
}

/// Cursor that re-seeks from its last yielded key on every advance, so it
/// never holds the store lock between calls. It may observe writes applied
/// after its creation.
struct MemoryScanCursor {
    inner: Arc<RwLock<Inner>>,
    bounds: ScanBounds,
    descending: bool,
    last_key: Option<Vec<u8>>,
    done: bool,
}

impl ScanCursor for MemoryScanCursor {
    fn advance(&mut self) -> StorageResult<Option<Record>> {
        if self.done {
            return Ok(None);
        }

        let mut bounds = self.bounds.clone();
        if let Some(last) = &self.last_key {
            if self.descending {
                bounds.end = Bound::Excluded(last.clone());
            } else {
                bounds.start = Bound::Excluded(last.clone());
            }
        }
        if !bounds.is_satisfiable() {
            self.done = true;
            return Ok(None);
        }

        let inner = self.inner.read();
        let mut range = inner.records.range((bounds.start, bounds.end));
        let next = if self.descending {
            range.next_back()
        } else {
            range.next()
        };

        match next {
            Some((key, stored)) => {
                let record = Record {
                    key: key.clone(),
                    value: stored.value.clone(),
                    sequence: SequenceNumber::new(stored.sequence),
                };
                self.last_key = Some(key.clone());
                Ok(Some(record))
            }
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Transaction;

    fn store_with(pairs: &[(&[u8], &[u8])]) -> Arc<MemoryKeyStore> {
        let store = Arc::new(MemoryKeyStore::new());
        let mut txn = Transaction::begin(store.clone() as Arc<dyn KeyStore>);
        for (k, v) in pairs {
            txn.put(k.to_vec(), v.to_vec()).unwrap();
        }
        txn.commit().unwrap();
        store
    }

    #[test]
    fn get_and_sequences() {
        let store = store_with(&[(b"a", b"1"), (b"b", b"2")]);
        let a = store.get(b"a").unwrap().unwrap();
        let b = store.get(b"b").unwrap().unwrap();
        assert_eq!(a.value, b"1");
        assert!(b.sequence > a.sequence);
        assert_eq!(store.last_sequence().unwrap(), b.sequence);
        assert!(store.get(b"missing").unwrap().is_none());
    }

    #[test]
    fn overwrite_advances_sequence() {
        let store = store_with(&[(b"k", b"v1")]);
        let first = store.get(b"k").unwrap().unwrap().sequence;

        let mut txn = Transaction::begin(store.clone() as Arc<dyn KeyStore>);
        txn.put(b"k".to_vec(), b"v2".to_vec()).unwrap();
        txn.commit().unwrap();

        let record = store.get(b"k").unwrap().unwrap();
        assert_eq!(record.value, b"v2");
        assert!(record.sequence > first);
        assert_eq!(store.record_count().unwrap(), 1);
    }

    #[test]
    fn scan_ascending_and_descending() {
        let store = store_with(&[(b"a", b"1"), (b"b", b"2"), (b"c", b"3")]);

        let mut cursor = store.scan(ScanBounds::all(), false).unwrap();
        let mut keys = Vec::new();
        while let Some(record) = cursor.advance().unwrap() {
            keys.push(record.key);
        }
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);

        let mut cursor = store.scan(ScanBounds::all(), true).unwrap();
        let mut keys = Vec::new();
        while let Some(record) = cursor.advance().unwrap() {
            keys.push(record.key);
        }
        assert_eq!(keys, vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn scan_respects_bounds() {
        let store = store_with(&[(b"a", b"1"), (b"b", b"2"), (b"c", b"3"), (b"d", b"4")]);
        let bounds = ScanBounds::range(
            Bound::Excluded(b"a".to_vec()),
            Bound::Included(b"c".to_vec()),
        );
        let mut cursor = store.scan(bounds, false).unwrap();
        let mut keys = Vec::new();
        while let Some(record) = cursor.advance().unwrap() {
            keys.push(record.key);
        }
        assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn cursor_sees_later_commits_without_failing() {
        let store = store_with(&[(b"a", b"1")]);
        let mut cursor = store.scan(ScanBounds::all(), false).unwrap();
        assert_eq!(cursor.advance().unwrap().unwrap().key, b"a");

        let mut txn = Transaction::begin(store.clone() as Arc<dyn KeyStore>);
        txn.put(b"b".to_vec(), b"2".to_vec()).unwrap();
        txn.commit().unwrap();

        assert_eq!(cursor.advance().unwrap().unwrap().key, b"b");
        assert!(cursor.advance().unwrap().is_none());
    }

    #[test]
    fn clear_removes_records_but_keeps_sequence_counter() {
        let store = store_with(&[(b"a", b"1")]);
        let seq = store.last_sequence().unwrap();
        store.clear().unwrap();
        assert_eq!(store.record_count().unwrap(), 0);
        assert_eq!(store.last_sequence().unwrap(), seq);
    }

    #[test]
    fn failpoint_fails_validate_once() {
        let store = store_with(&[]);
        store.fail_next_prepare();
        let batch = WriteBatch::new();
        assert!(matches!(
            store.validate(&batch),
            Err(StorageError::PrepareFailed { .. })
        ));
        assert!(store.validate(&batch).is_ok());
    }
}
