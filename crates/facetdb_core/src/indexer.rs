//! The indexer: one batch update over one or more views.

use crate::error::{CoreError, CoreResult};
use crate::index::{IndexWriter, ViewMeta};
use crate::types::{Document, DocumentSource, KeyValueList, PLACEHOLDER_VALUE};
use crate::view::View;
use facetdb_collatable::Collatable;
use facetdb_storage::{SequenceNumber, Transaction};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::mem;
use std::sync::Arc;
use tracing::debug;

/// Per-view state captured when the batch begins.
#[derive(Debug)]
struct ViewBatchState {
    watermark_at_begin: SequenceNumber,
    doc_type: Option<String>,
    was_empty: bool,
    triggered: bool,
    row_count: u64,
    any_changed: bool,
    last_changed_sequence: SequenceNumber,
    max_emitted_sequence: SequenceNumber,
}

/// A document the cursor handed to the caller.
#[derive(Debug, Clone)]
struct VisitedDoc {
    doc_id: String,
    sequence: SequenceNumber,
    doc_type: Option<String>,
}

type VisitLog = Arc<Mutex<Vec<VisitedDoc>>>;

/// Cursor over the documents that need (re)indexing.
///
/// An empty cursor (all views current, none triggered) yields nothing and
/// is distinguishable from an error because constructing it succeeded.
pub struct DocumentCursor {
    iter: Option<Box<dyn Iterator<Item = CoreResult<Document>> + Send + 'static>>,
    log: VisitLog,
}

impl DocumentCursor {
    fn empty(log: VisitLog) -> Self {
        Self { iter: None, log }
    }
}

impl Iterator for DocumentCursor {
    type Item = CoreResult<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.iter.as_mut()?.next()?;
        if let Ok(doc) = &item {
            self.log.lock().push(VisitedDoc {
                doc_id: doc.doc_id.clone(),
                sequence: doc.sequence,
                doc_type: doc.doc_type.clone(),
            });
        }
        Some(item)
    }
}

impl std::fmt::Debug for DocumentCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentCursor")
            .field("empty", &self.iter.is_none())
            .finish_non_exhaustive()
    }
}

/// An in-progress batch update of one or more views.
///
/// Lifecycle: [`begin`](Self::begin) claims every participating view
/// (failing with [`CoreError::IndexBusy`] if another indexer holds one)
/// and opens one transaction per view's store.
/// [`enumerate_documents`](Self::enumerate_documents) yields the documents
/// newer than the views' watermarks; for each document and each view the
/// caller consults [`should_index_document`](Self::should_index_document),
/// runs its map function, and calls [`emit`](Self::emit) — exactly once
/// per visited (document, view) pair, with an empty key list when nothing
/// is emitted, so stale rows are retracted. [`end`](Self::end) commits all
/// stores atomically or aborts them all.
///
/// Dropping an unfinished indexer aborts the batch.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use facetdb_core::{Indexer, View, DocumentSource};
/// # fn demo(source: Arc<dyn DocumentSource>, view: Arc<View>) -> facetdb_core::CoreResult<()> {
/// let mut indexer = Indexer::begin(source, vec![view])?;
/// let docs: Vec<_> = indexer.enumerate_documents()?.collect::<Result<_, _>>()?;
/// for doc in &docs {
///     if indexer.should_index_document(0, doc)? {
///         let (keys, values) = (Vec::new(), Vec::new()); // run the map function here
///         indexer.emit(doc, 0, &keys, &values)?;
///     }
/// }
/// indexer.end(true)
/// # }
/// ```
pub struct Indexer {
    source: Arc<dyn DocumentSource>,
    views: Vec<Arc<View>>,
    states: Vec<ViewBatchState>,
    txns: Vec<Transaction>,
    visit_log: VisitLog,
    emitted: HashSet<(usize, String)>,
    finished: bool,
}

impl Indexer {
    /// Begins a batch over the given views.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::IndexBusy`] if any view already has an
    /// active indexer, and [`CoreError::InvalidParameter`] if the view
    /// list is empty or contains duplicates.
    pub fn begin(
        source: Arc<dyn DocumentSource>,
        views: Vec<Arc<View>>,
    ) -> CoreResult<Self> {
        if views.is_empty() {
            return Err(CoreError::invalid_parameter(
                "indexer requires at least one view",
            ));
        }
        for (i, a) in views.iter().enumerate() {
            for b in &views[i + 1..] {
                if Arc::ptr_eq(a, b) {
                    return Err(CoreError::invalid_parameter(format!(
                        "view '{}' listed twice",
                        a.name()
                    )));
                }
            }
        }

        let mut claimed: Vec<Arc<View>> = Vec::with_capacity(views.len());
        for view in &views {
            if let Err(err) = view.begin_indexing() {
                for held in &claimed {
                    held.end_indexing();
                }
                return Err(err);
            }
            claimed.push(Arc::clone(view));
        }

        let mut states = Vec::with_capacity(views.len());
        let mut txns = Vec::with_capacity(views.len());
        for view in &views {
            let (watermark_at_begin, was_empty) = view.indexing_snapshot();
            states.push(ViewBatchState {
                watermark_at_begin,
                doc_type: view.document_type(),
                was_empty,
                triggered: false,
                row_count: view.total_rows(),
                any_changed: false,
                last_changed_sequence: SequenceNumber::new(0),
                max_emitted_sequence: SequenceNumber::new(0),
            });
            txns.push(Transaction::begin(view.host_store()));
        }

        Ok(Self {
            source,
            views,
            states,
            txns,
            visit_log: Arc::new(Mutex::new(Vec::new())),
            emitted: HashSet::new(),
            finished: false,
        })
    }

    /// Number of participating views.
    #[must_use]
    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    /// Marks a view as "index even if already up to date".
    pub fn trigger_on_view(&mut self, view_number: usize) -> CoreResult<()> {
        self.state_mut(view_number)?.triggered = true;
        Ok(())
    }

    /// Opens a cursor over the documents needing (re)indexing: every
    /// document with sequence above the minimum of the participating
    /// views' watermarks, ascending, deletions included.
    ///
    /// Returns an empty cursor if no view was triggered and every view is
    /// already caught up with the source.
    pub fn enumerate_documents(&mut self) -> CoreResult<DocumentCursor> {
        let source_last = self.source.last_sequence()?;
        let triggered = self.states.iter().any(|s| s.triggered);
        let caught_up = self
            .states
            .iter()
            .all(|s| s.watermark_at_begin >= source_last);
        if !triggered && caught_up {
            return Ok(DocumentCursor::empty(Arc::clone(&self.visit_log)));
        }

        let since = self
            .states
            .iter()
            .map(|s| s.watermark_at_begin)
            .min()
            .unwrap_or(SequenceNumber::new(0));
        let iter = self.source.enumerate_since(since)?;
        Ok(DocumentCursor {
            iter: Some(iter),
            log: Arc::clone(&self.visit_log),
        })
    }

    /// Returns true if the given view needs this document indexed: its
    /// sequence is above the view's watermark and the view's document-type
    /// filter (if any) matches.
    pub fn should_index_document(
        &self,
        view_number: usize,
        doc: &Document,
    ) -> CoreResult<bool> {
        let state = self.state(view_number)?;
        Ok(doc.sequence > state.watermark_at_begin
            && state
                .doc_type
                .as_ref()
                .map_or(true, |t| doc.doc_type.as_deref() == Some(t.as_str())))
    }

    /// Records the map function's emissions for one (document, view) pair.
    ///
    /// Must be called exactly once per visited pair, with empty lists when
    /// the map function emitted nothing. A value of exactly `b"*"` is
    /// replaced by the document body
    /// ([`PLACEHOLDER_VALUE`]).
    pub fn emit(
        &mut self,
        doc: &Document,
        view_number: usize,
        keys: &[Collatable],
        values: &[Vec<u8>],
    ) -> CoreResult<()> {
        if view_number >= self.views.len() {
            return Err(CoreError::invalid_parameter(format!(
                "view number {view_number} out of range"
            )));
        }

        let resolved: Vec<Vec<u8>> = values
            .iter()
            .map(|v| {
                if v == PLACEHOLDER_VALUE {
                    doc.body.clone()
                } else {
                    v.clone()
                }
            })
            .collect();

        let view = &self.views[view_number];
        let state = &mut self.states[view_number];
        let txn = &mut self.txns[view_number];

        let mut row_count = state.row_count;
        let changed = IndexWriter::new(view.index_store(), txn, state.was_empty).update(
            &doc.doc_id,
            doc.sequence,
            keys,
            &resolved,
            &mut row_count,
        )?;
        state.row_count = row_count;
        if changed {
            state.any_changed = true;
            state.last_changed_sequence = state.last_changed_sequence.max(doc.sequence);
        }
        state.max_emitted_sequence = state.max_emitted_sequence.max(doc.sequence);
        self.emitted.insert((view_number, doc.doc_id.clone()));
        Ok(())
    }

    /// [`emit`](Self::emit) with the pairs accumulated in a
    /// [`KeyValueList`].
    pub fn emit_list(
        &mut self,
        doc: &Document,
        view_number: usize,
        kv: &KeyValueList,
    ) -> CoreResult<()> {
        self.emit(doc, view_number, kv.keys(), kv.values())
    }

    /// Finishes the batch.
    ///
    /// On commit, every view's watermarks and row count are persisted and
    /// all stores commit atomically: each store's transaction is staged
    /// first, and only when every store has validated are they applied. On
    /// abort (or any error), every store rolls back and the in-memory view
    /// state keeps its pre-begin values.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::InvalidParameter`] if any visited
    /// (document, view) pair never received its [`emit`](Self::emit) call.
    pub fn end(mut self, commit: bool) -> CoreResult<()> {
        let result = self.finish(commit);
        self.release();
        result
    }

    fn finish(&mut self, commit: bool) -> CoreResult<()> {
        let mut txns = mem::take(&mut self.txns);
        if !commit {
            drop(txns);
            return Ok(());
        }

        // Every (document, view) pair the cursor visited must have been
        // emitted, or stale rows could survive under an advanced watermark.
        let visit_log = Arc::clone(&self.visit_log);
        let visited = visit_log.lock();
        for doc in visited.iter() {
            for (view_number, state) in self.states.iter().enumerate() {
                let wanted = doc.sequence > state.watermark_at_begin
                    && state
                        .doc_type
                        .as_ref()
                        .map_or(true, |t| doc.doc_type.as_deref() == Some(t.as_str()));
                if wanted && !self.emitted.contains(&(view_number, doc.doc_id.clone())) {
                    return Err(CoreError::invalid_parameter(format!(
                        "document '{}' was never emitted for view '{}'",
                        doc.doc_id,
                        self.views[view_number].name()
                    )));
                }
            }
        }
        let max_visited = visited
            .iter()
            .map(|d| d.sequence)
            .max()
            .unwrap_or(SequenceNumber::new(0));
        drop(visited);

        let mut metas = Vec::with_capacity(self.views.len());
        for ((view, state), txn) in self.views.iter().zip(&self.states).zip(&mut txns) {
            let current = view.current_meta();
            let last_sequence_indexed = state
                .watermark_at_begin
                .max(max_visited)
                .max(state.max_emitted_sequence);
            let last_sequence_changed_at = if state.any_changed {
                current
                    .last_sequence_changed_at
                    .max(state.last_changed_sequence)
            } else {
                current.last_sequence_changed_at
            };
            let meta = ViewMeta {
                version: current.version,
                doc_type: current.doc_type,
                last_sequence_indexed,
                last_sequence_changed_at,
                total_rows: state.row_count,
            };
            view.index_store().write_meta(txn, &meta)?;
            metas.push(meta);
        }

        // Two-phase commit across stores: stage everything, then apply.
        let mut prepared = Vec::with_capacity(txns.len());
        for txn in txns {
            prepared.push(txn.prepare()?);
        }
        for staged in prepared {
            staged.apply()?;
        }

        for (view, meta) in self.views.iter().zip(&metas) {
            view.apply_committed(
                meta.last_sequence_indexed,
                meta.last_sequence_changed_at,
                meta.total_rows,
            );
        }
        debug!(
            views = self.views.len(),
            last_sequence = max_visited.as_u64(),
            "indexer batch committed"
        );
        Ok(())
    }

    fn release(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.txns.clear();
        for view in &self.views {
            view.end_indexing();
        }
    }

    fn state(&self, view_number: usize) -> CoreResult<&ViewBatchState> {
        self.states.get(view_number).ok_or_else(|| {
            CoreError::invalid_parameter(format!("view number {view_number} out of range"))
        })
    }

    fn state_mut(&mut self, view_number: usize) -> CoreResult<&mut ViewBatchState> {
        self.states.get_mut(view_number).ok_or_else(|| {
            CoreError::invalid_parameter(format!("view number {view_number} out of range"))
        })
    }
}

impl Drop for Indexer {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("views", &self.views.len())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
