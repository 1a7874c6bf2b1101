//! The view façade: a named, versioned index over documents.

use crate::enumerator::IndexEnumerator;
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexStore, ViewMeta};
use crate::types::{QueryOptions, ViewConfig};
use facetdb_storage::{KeyStore, SequenceNumber, Transaction};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug)]
struct ViewState {
    version: String,
    doc_type: Option<String>,
    last_sequence_indexed: SequenceNumber,
    last_sequence_changed_at: SequenceNumber,
    total_rows: u64,
}

/// A named, versioned map/reduce index over a document source.
///
/// A view is shared: any number of threads may query it concurrently,
/// while at most one [`Indexer`](crate::Indexer) updates it at a time.
/// Enumerators and indexers register as users of the view; destructive
/// operations (`close`, `erase_index`, `delete`) fail with
/// [`CoreError::IndexBusy`] while any user is live.
///
/// The persisted index is bound to the view's map-function version: if the
/// stored version differs from the one passed to [`View::open`], the index
/// is considered stale, cleared, and both watermarks reset to zero before
/// the view is returned.
pub struct View {
    name: String,
    store: Arc<dyn KeyStore>,
    index: IndexStore,
    state: RwLock<ViewState>,
    users: AtomicU32,
    indexing: AtomicBool,
    closed: AtomicBool,
}

impl View {
    /// Opens a view over a host store, invalidating the stored index if
    /// its version differs from `version`.
    pub fn open(
        store: Arc<dyn KeyStore>,
        name: &str,
        version: &str,
        config: ViewConfig,
    ) -> CoreResult<Arc<Self>> {
        let index = IndexStore::new(store.clone());
        let meta = index.read_meta()?;

        let state = match meta {
            Some(meta) if meta.version == version => {
                debug!(view = name, version, "view opened");
                ViewState {
                    version: meta.version,
                    doc_type: config.document_type.or(meta.doc_type),
                    last_sequence_indexed: meta.last_sequence_indexed,
                    last_sequence_changed_at: meta.last_sequence_changed_at,
                    total_rows: meta.total_rows,
                }
            }
            stored => {
                // Stale or missing index: clear and start from scratch.
                let had_rows = stored.is_some();
                let fresh = ViewMeta::empty(version.to_string(), config.document_type);
                let mut txn = Transaction::begin(store.clone());
                if had_rows {
                    index.clear_rows(&mut txn)?;
                }
                index.write_meta(&mut txn, &fresh)?;
                txn.commit()?;
                if had_rows {
                    info!(view = name, version, "view version changed, index invalidated");
                } else {
                    debug!(view = name, version, "view created");
                }
                ViewState {
                    version: fresh.version,
                    doc_type: fresh.doc_type,
                    last_sequence_indexed: fresh.last_sequence_indexed,
                    last_sequence_changed_at: fresh.last_sequence_changed_at,
                    total_rows: fresh.total_rows,
                }
            }
        };

        Ok(Arc::new(Self {
            name: name.to_string(),
            store,
            index,
            state: RwLock::new(state),
            users: AtomicU32::new(0),
            indexing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }))
    }

    /// The view's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current map-function version.
    #[must_use]
    pub fn map_version(&self) -> String {
        self.state.read().version.clone()
    }

    /// The current document-type filter.
    #[must_use]
    pub fn document_type(&self) -> Option<String> {
        self.state.read().doc_type.clone()
    }

    /// Number of rows in the index.
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.state.read().total_rows
    }

    /// Highest source sequence this view has considered. If this is below
    /// the source's last sequence, the index is out of date.
    #[must_use]
    pub fn last_sequence_indexed(&self) -> SequenceNumber {
        self.state.read().last_sequence_indexed
    }

    /// Highest source sequence that actually changed the index.
    #[must_use]
    pub fn last_sequence_changed_at(&self) -> SequenceNumber {
        self.state.read().last_sequence_changed_at
    }

    /// True while any enumerator or indexer holds the view.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.users.load(Ordering::SeqCst) > 0
    }

    /// Sets the map-function version, invalidating the index if it
    /// changed. Idempotent: setting the current version is a no-op.
    pub fn set_map_version(&self, version: &str) -> CoreResult<()> {
        self.ensure_open()?;
        if self.state.read().version == version {
            return Ok(());
        }
        self.check_not_busy()?;

        let doc_type = self.state.read().doc_type.clone();
        let fresh = ViewMeta::empty(version.to_string(), doc_type);
        let mut txn = Transaction::begin(self.store.clone());
        self.index.clear_rows(&mut txn)?;
        self.index.write_meta(&mut txn, &fresh)?;
        txn.commit()?;

        let mut state = self.state.write();
        state.version = fresh.version;
        state.last_sequence_indexed = SequenceNumber::new(0);
        state.last_sequence_changed_at = SequenceNumber::new(0);
        state.total_rows = 0;
        info!(view = %self.name, version, "map version changed, index invalidated");
        Ok(())
    }

    /// Sets the document-type filter consulted by
    /// [`Indexer::should_index_document`](crate::Indexer::should_index_document).
    /// Persisted with the next indexer commit.
    pub fn set_document_type(&self, doc_type: Option<&str>) {
        self.state.write().doc_type = doc_type.map(str::to_string);
    }

    /// Removes every index row and resets both watermarks, preserving the
    /// view's identity (name, version, document type).
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::IndexBusy`] while any enumerator or indexer
    /// holds the view.
    pub fn erase_index(&self) -> CoreResult<()> {
        self.ensure_open()?;
        self.check_not_busy()?;

        let state = self.state.read();
        let fresh = ViewMeta::empty(state.version.clone(), state.doc_type.clone());
        drop(state);

        let mut txn = Transaction::begin(self.store.clone());
        self.index.clear_rows(&mut txn)?;
        self.index.write_meta(&mut txn, &fresh)?;
        txn.commit()?;

        let mut state = self.state.write();
        state.last_sequence_indexed = SequenceNumber::new(0);
        state.last_sequence_changed_at = SequenceNumber::new(0);
        state.total_rows = 0;
        info!(view = %self.name, "index erased");
        Ok(())
    }

    /// Removes the view's storage and closes the view.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::IndexBusy`] while any enumerator or indexer
    /// holds the view.
    pub fn delete(&self) -> CoreResult<()> {
        self.ensure_open()?;
        self.check_not_busy()?;
        self.store.clear()?;
        self.closed.store(true, Ordering::SeqCst);
        info!(view = %self.name, "view deleted");
        Ok(())
    }

    /// Closes the view. Subsequent operations fail; the handle itself
    /// stays valid. Idempotent.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::IndexBusy`] while any enumerator or indexer
    /// holds the view.
    pub fn close(&self) -> CoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.check_not_busy()?;
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Runs a query, returning an enumerator over the matching rows.
    ///
    /// The enumerator holds the view as a user until dropped.
    pub fn query(self: &Arc<Self>, options: QueryOptions) -> CoreResult<IndexEnumerator> {
        self.ensure_open()?;
        IndexEnumerator::new(Arc::clone(self), options)
    }

    pub(crate) fn index_store(&self) -> &IndexStore {
        &self.index
    }

    pub(crate) fn host_store(&self) -> Arc<dyn KeyStore> {
        Arc::clone(&self.store)
    }

    /// Snapshot taken by an indexer at begin: the watermark and whether
    /// the index held no rows.
    pub(crate) fn indexing_snapshot(&self) -> (SequenceNumber, bool) {
        let state = self.state.read();
        let was_empty =
            state.total_rows == 0 && state.last_sequence_indexed == SequenceNumber::new(0);
        (state.last_sequence_indexed, was_empty)
    }

    pub(crate) fn current_meta(&self) -> ViewMeta {
        let state = self.state.read();
        ViewMeta {
            version: state.version.clone(),
            doc_type: state.doc_type.clone(),
            last_sequence_indexed: state.last_sequence_indexed,
            last_sequence_changed_at: state.last_sequence_changed_at,
            total_rows: state.total_rows,
        }
    }

    /// Installs the in-memory state of a successfully committed batch.
    pub(crate) fn apply_committed(
        &self,
        last_sequence_indexed: SequenceNumber,
        last_sequence_changed_at: SequenceNumber,
        total_rows: u64,
    ) {
        let mut state = self.state.write();
        state.last_sequence_indexed = last_sequence_indexed;
        state.last_sequence_changed_at = last_sequence_changed_at;
        state.total_rows = total_rows;
    }

    /// Registers an enumerator as a user of the view.
    pub(crate) fn add_user(&self) -> CoreResult<()> {
        self.ensure_open()?;
        self.users.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Releases one user registration.
    pub(crate) fn remove_user(&self) {
        self.users.fetch_sub(1, Ordering::SeqCst);
    }

    /// Claims the view for an indexer. At most one indexer may hold a
    /// view at a time.
    pub(crate) fn begin_indexing(&self) -> CoreResult<()> {
        self.ensure_open()?;
        if self
            .indexing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CoreError::index_busy(&self.name));
        }
        self.users.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Releases the indexer's claim.
    pub(crate) fn end_indexing(&self) {
        self.indexing.store(false, Ordering::SeqCst);
        self.users.fetch_sub(1, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CoreError::not_found(format!(
                "view '{}' is closed",
                self.name
            )));
        }
        Ok(())
    }

    fn check_not_busy(&self) -> CoreResult<()> {
        if self.is_busy() {
            return Err(CoreError::index_busy(&self.name));
        }
        Ok(())
    }
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("name", &self.name)
            .field("users", &self.users.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facetdb_storage::MemoryKeyStore;

    fn open(store: &Arc<MemoryKeyStore>, version: &str) -> Arc<View> {
        View::open(
            store.clone() as Arc<dyn KeyStore>,
            "by_name",
            version,
            ViewConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn fresh_view_starts_empty() {
        let store = Arc::new(MemoryKeyStore::new());
        let view = open(&store, "1");
        assert_eq!(view.name(), "by_name");
        assert_eq!(view.map_version(), "1");
        assert_eq!(view.total_rows(), 0);
        assert_eq!(view.last_sequence_indexed(), SequenceNumber::new(0));
        assert!(!view.is_busy());
    }

    #[test]
    fn reopen_with_same_version_preserves_state() {
        let store = Arc::new(MemoryKeyStore::new());
        {
            let view = open(&store, "1");
            view.apply_committed(SequenceNumber::new(7), SequenceNumber::new(7), 3);
            // Persist the state the way an indexer commit would.
            let mut txn = Transaction::begin(view.host_store());
            view.index_store()
                .write_meta(&mut txn, &view.current_meta())
                .unwrap();
            txn.commit().unwrap();
        }
        let view = open(&store, "1");
        assert_eq!(view.total_rows(), 3);
        assert_eq!(view.last_sequence_indexed(), SequenceNumber::new(7));
    }

    #[test]
    fn reopen_with_new_version_resets_state() {
        let store = Arc::new(MemoryKeyStore::new());
        {
            let view = open(&store, "1");
            view.apply_committed(SequenceNumber::new(7), SequenceNumber::new(7), 3);
            let mut txn = Transaction::begin(view.host_store());
            view.index_store()
                .write_meta(&mut txn, &view.current_meta())
                .unwrap();
            txn.commit().unwrap();
        }
        let view = open(&store, "2");
        assert_eq!(view.total_rows(), 0);
        assert_eq!(view.last_sequence_indexed(), SequenceNumber::new(0));
        assert_eq!(view.map_version(), "2");
    }

    #[test]
    fn set_map_version_is_idempotent() {
        let store = Arc::new(MemoryKeyStore::new());
        let view = open(&store, "1");
        view.apply_committed(SequenceNumber::new(5), SequenceNumber::new(5), 2);
        view.set_map_version("1").unwrap();
        assert_eq!(view.total_rows(), 2);

        view.set_map_version("2").unwrap();
        assert_eq!(view.total_rows(), 0);
        assert_eq!(view.map_version(), "2");
    }

    #[test]
    fn erase_resets_watermarks_but_keeps_identity() {
        let store = Arc::new(MemoryKeyStore::new());
        let view = open(&store, "1");
        view.set_document_type(Some("order"));
        view.apply_committed(SequenceNumber::new(5), SequenceNumber::new(4), 2);

        view.erase_index().unwrap();
        assert_eq!(view.total_rows(), 0);
        assert_eq!(view.last_sequence_indexed(), SequenceNumber::new(0));
        assert_eq!(view.map_version(), "1");
        assert_eq!(view.document_type().as_deref(), Some("order"));
    }

    #[test]
    fn destructive_ops_fail_while_busy() {
        let store = Arc::new(MemoryKeyStore::new());
        let view = open(&store, "1");
        view.add_user().unwrap();

        assert!(matches!(
            view.erase_index(),
            Err(CoreError::IndexBusy { .. })
        ));
        assert!(matches!(view.delete(), Err(CoreError::IndexBusy { .. })));
        assert!(matches!(view.close(), Err(CoreError::IndexBusy { .. })));

        view.remove_user();
        view.close().unwrap();
        view.close().unwrap();
    }

    #[test]
    fn second_indexer_claim_fails() {
        let store = Arc::new(MemoryKeyStore::new());
        let view = open(&store, "1");
        view.begin_indexing().unwrap();
        assert!(matches!(
            view.begin_indexing(),
            Err(CoreError::IndexBusy { .. })
        ));
        view.end_indexing();
        view.begin_indexing().unwrap();
        view.end_indexing();
    }

    #[test]
    fn closed_view_rejects_operations() {
        let store = Arc::new(MemoryKeyStore::new());
        let view = open(&store, "1");
        view.close().unwrap();
        assert!(matches!(
            view.erase_index(),
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            view.begin_indexing(),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn delete_clears_storage() {
        let store = Arc::new(MemoryKeyStore::new());
        let view = open(&store, "1");
        assert!(store.record_count().unwrap() > 0); // metadata record
        view.delete().unwrap();
        assert_eq!(store.record_count().unwrap(), 0);
        assert!(matches!(view.close(), Ok(())));
    }
}
