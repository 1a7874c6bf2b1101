//! In-memory document source for tests and examples.

use facetdb_core::{CoreResult, Document, DocumentSource};
use facetdb_storage::SequenceNumber;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct StoredDoc {
    sequence: u64,
    doc_type: Option<String>,
    deleted: bool,
    body: Vec<u8>,
}

#[derive(Debug, Default)]
struct Inner {
    docs: BTreeMap<String, StoredDoc>,
    last_sequence: u64,
}

/// An in-memory [`DocumentSource`].
///
/// Every put or delete assigns the next sequence number; deletions are
/// kept as tombstones so indexers can retract rows.
///
/// # Example
///
/// ```
/// use facetdb_core::DocumentSource;
/// use facetdb_testkit::DocStore;
///
/// let store = DocStore::new();
/// store.put("d1", Some("note"), br#"{"n":1}"#);
/// let seq = store.put("d2", Some("note"), br#"{"n":2}"#);
/// assert_eq!(store.last_sequence().unwrap(), seq);
/// ```
#[derive(Debug, Default, Clone)]
pub struct DocStore {
    inner: Arc<RwLock<Inner>>,
}

impl DocStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a document revision, returning its sequence.
    pub fn put(&self, doc_id: &str, doc_type: Option<&str>, body: &[u8]) -> SequenceNumber {
        let mut inner = self.inner.write();
        inner.last_sequence += 1;
        let sequence = inner.last_sequence;
        inner.docs.insert(
            doc_id.to_string(),
            StoredDoc {
                sequence,
                doc_type: doc_type.map(str::to_string),
                deleted: false,
                body: body.to_vec(),
            },
        );
        SequenceNumber::new(sequence)
    }

    /// Deletes a document, leaving a tombstone with a fresh sequence.
    pub fn delete(&self, doc_id: &str) -> SequenceNumber {
        let mut inner = self.inner.write();
        inner.last_sequence += 1;
        let sequence = inner.last_sequence;
        let doc_type = inner
            .docs
            .get(doc_id)
            .and_then(|doc| doc.doc_type.clone());
        inner.docs.insert(
            doc_id.to_string(),
            StoredDoc {
                sequence,
                doc_type,
                deleted: true,
                body: Vec::new(),
            },
        );
        SequenceNumber::new(sequence)
    }

    /// Number of live (non-tombstone) documents.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.inner
            .read()
            .docs
            .values()
            .filter(|doc| !doc.deleted)
            .count()
    }
}

impl DocumentSource for DocStore {
    fn last_sequence(&self) -> CoreResult<SequenceNumber> {
        Ok(SequenceNumber::new(self.inner.read().last_sequence))
    }

    fn enumerate_since(
        &self,
        since: SequenceNumber,
    ) -> CoreResult<Box<dyn Iterator<Item = CoreResult<Document>> + Send + 'static>> {
        let inner = self.inner.read();
        let mut docs: Vec<Document> = inner
            .docs
            .iter()
            .filter(|(_, doc)| doc.sequence > since.as_u64())
            .map(|(doc_id, doc)| Document {
                doc_id: doc_id.clone(),
                sequence: SequenceNumber::new(doc.sequence),
                doc_type: doc.doc_type.clone(),
                deleted: doc.deleted,
                body: doc.body.clone(),
            })
            .collect();
        docs.sort_by_key(|doc| doc.sequence);
        Ok(Box::new(docs.into_iter().map(Ok)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_are_monotonic() {
        let store = DocStore::new();
        let s1 = store.put("a", None, b"1");
        let s2 = store.put("b", None, b"2");
        let s3 = store.put("a", None, b"3");
        assert!(s1 < s2 && s2 < s3);
        assert_eq!(store.last_sequence().unwrap(), s3);
    }

    #[test]
    fn enumerate_yields_ascending_and_filters_by_watermark() {
        let store = DocStore::new();
        store.put("a", None, b"1");
        let s2 = store.put("b", None, b"2");
        store.put("c", None, b"3");

        let docs: Vec<Document> = store
            .enumerate_since(SequenceNumber::new(1))
            .unwrap()
            .collect::<CoreResult<_>>()
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].doc_id, "b");
        assert_eq!(docs[0].sequence, s2);
        assert_eq!(docs[1].doc_id, "c");
    }

    #[test]
    fn update_supersedes_old_sequence() {
        let store = DocStore::new();
        store.put("a", None, b"old");
        store.put("a", None, b"new");

        let docs: Vec<Document> = store
            .enumerate_since(SequenceNumber::new(0))
            .unwrap()
            .collect::<CoreResult<_>>()
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].body, b"new");
        assert_eq!(docs[0].sequence, SequenceNumber::new(2));
    }

    #[test]
    fn tombstones_are_enumerated() {
        let store = DocStore::new();
        store.put("a", Some("note"), b"1");
        store.delete("a");

        let docs: Vec<Document> = store
            .enumerate_since(SequenceNumber::new(1))
            .unwrap()
            .collect::<CoreResult<_>>()
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].deleted);
        assert_eq!(docs[0].doc_type.as_deref(), Some("note"));
        assert_eq!(store.live_count(), 0);
    }
}
