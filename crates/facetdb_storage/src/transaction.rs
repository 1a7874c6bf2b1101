//! Buffered transactions over a key store.

use crate::error::StorageResult;
use crate::keystore::{KeyStore, WriteBatch};
use std::fmt;
use std::sync::Arc;

/// A transaction buffering writes against one [`KeyStore`].
///
/// Nothing is visible to readers until `commit` (or `prepare` + `apply`)
/// succeeds; dropping the transaction discards every pending write.
///
/// Commit is split into two phases so that a coordinator spanning several
/// stores can be all-or-nothing: `prepare` performs all fallible
/// validation, and the returned [`PreparedCommit`] applies without failing.
/// The coordinator prepares every store first and only then applies.
pub struct Transaction {
    store: Arc<dyn KeyStore>,
    batch: WriteBatch,
}

impl Transaction {
    /// Begins a transaction on the given store.
    #[must_use]
    pub fn begin(store: Arc<dyn KeyStore>) -> Self {
        Self {
            store,
            batch: WriteBatch::new(),
        }
    }

    /// Returns the store this transaction writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyStore> {
        &self.store
    }

    /// Queues a put.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        self.batch.put(key, value);
        Ok(())
    }

    /// Queues a deletion.
    pub fn delete(&mut self, key: Vec<u8>) -> StorageResult<()> {
        self.batch.delete(key);
        Ok(())
    }

    /// Reads through the transaction: a pending write shadows the store.
    pub fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        match self.batch.get(key) {
            Some(Some(value)) => Ok(Some(value.clone())),
            Some(None) => Ok(None),
            None => Ok(self.store.get(key)?.map(|record| record.value)),
        }
    }

    /// Number of pending writes.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.batch.len()
    }

    /// Validates the pending writes and stages them for application.
    ///
    /// # Errors
    ///
    /// Returns the store's validation error; nothing has been applied.
    pub fn prepare(self) -> StorageResult<PreparedCommit> {
        self.store.validate(&self.batch)?;
        Ok(PreparedCommit {
            store: self.store,
            batch: self.batch,
        })
    }

    /// Commits the pending writes to the store.
    pub fn commit(self) -> StorageResult<()> {
        self.prepare()?.apply()
    }

    /// Discards the pending writes. Equivalent to dropping.
    pub fn abort(self) {}
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("pending_writes", &self.batch.len())
            .finish_non_exhaustive()
    }
}

/// A validated batch ready to be applied.
pub struct PreparedCommit {
    store: Arc<dyn KeyStore>,
    batch: WriteBatch,
}

impl PreparedCommit {
    /// Applies the staged writes.
    ///
    /// After a successful `prepare` this must not fail (store contract);
    /// an error here indicates a store bug or lost medium and leaves the
    /// coordinator unable to roll back.
    pub fn apply(self) -> StorageResult<()> {
        self.store.apply(self.batch)
    }
}

impl fmt::Debug for PreparedCommit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedCommit")
            .field("pending_writes", &self.batch.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKeyStore;

    fn new_store() -> Arc<dyn KeyStore> {
        Arc::new(MemoryKeyStore::new())
    }

    #[test]
    fn writes_invisible_until_commit() {
        let store = new_store();
        let mut txn = Transaction::begin(store.clone());
        txn.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        assert!(store.get(b"k").unwrap().is_none());
        txn.commit().unwrap();
        assert_eq!(store.get(b"k").unwrap().unwrap().value, b"v");
    }

    #[test]
    fn abort_discards_writes() {
        let store = new_store();
        let mut txn = Transaction::begin(store.clone());
        txn.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        txn.abort();
        assert!(store.get(b"k").unwrap().is_none());
    }

    #[test]
    fn read_through_sees_pending_writes() {
        let store = new_store();
        let mut setup = Transaction::begin(store.clone());
        setup.put(b"a".to_vec(), b"old".to_vec()).unwrap();
        setup.put(b"b".to_vec(), b"kept".to_vec()).unwrap();
        setup.commit().unwrap();

        let mut txn = Transaction::begin(store.clone());
        txn.put(b"a".to_vec(), b"new".to_vec()).unwrap();
        txn.delete(b"b".to_vec()).unwrap();
        assert_eq!(txn.get(b"a").unwrap().unwrap(), b"new");
        assert!(txn.get(b"b").unwrap().is_none());
        assert!(txn.get(b"c").unwrap().is_none());
        // The store itself is untouched.
        assert_eq!(store.get(b"a").unwrap().unwrap().value, b"old");
    }

    #[test]
    fn prepared_commit_applies_later() {
        let store = new_store();
        let mut txn = Transaction::begin(store.clone());
        txn.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        let prepared = txn.prepare().unwrap();
        assert!(store.get(b"k").unwrap().is_none());
        prepared.apply().unwrap();
        assert_eq!(store.get(b"k").unwrap().unwrap().value, b"v");
    }

    #[test]
    fn failed_prepare_applies_nothing() {
        let memory = Arc::new(MemoryKeyStore::new());
        let store: Arc<dyn KeyStore> = memory.clone();
        let mut txn = Transaction::begin(store.clone());
        txn.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        memory.fail_next_prepare();
        assert!(txn.prepare().is_err());
        assert_eq!(store.record_count().unwrap(), 0);
    }
}
