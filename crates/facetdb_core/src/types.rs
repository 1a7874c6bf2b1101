//! Core type definitions: documents, query options, key ranges, and the
//! consumed map/reduce contracts.

use crate::error::CoreResult;
use facetdb_collatable::{Collatable, CollatableReader};
use facetdb_storage::SequenceNumber;
use std::fmt;

/// The emit-value placeholder meaning "substitute the entire source
/// document body". A map function may emit this single byte instead of a
/// copy of the document; the indexer stores the body in its place.
pub const PLACEHOLDER_VALUE: &[u8] = b"*";

/// One document revision handed to the indexer.
///
/// The body is opaque to the core; only the map function interprets it.
/// Deletions are represented with the `deleted` tombstone flag so the
/// indexer can retract previously emitted rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Document identifier. Must not contain NUL; document IDs are
    /// embedded in index row keys.
    pub doc_id: String,
    /// Sequence assigned to this revision by the source.
    pub sequence: SequenceNumber,
    /// Optional document type, used by per-view type filters.
    pub doc_type: Option<String>,
    /// True if this revision is a deletion tombstone.
    pub deleted: bool,
    /// Opaque document body.
    pub body: Vec<u8>,
}

/// Enumeration of documents by sequence, consumed by the indexer.
///
/// Implementations yield documents with sequence strictly greater than the
/// requested watermark, in ascending sequence order, including deletion
/// tombstones. Iterators must own whatever state they need (`'static`): the
/// indexer interleaves cursor advancement with emit calls.
pub trait DocumentSource: Send + Sync {
    /// Returns the highest sequence the source has assigned.
    fn last_sequence(&self) -> CoreResult<SequenceNumber>;

    /// Enumerates documents with sequence greater than `since`, ascending.
    fn enumerate_since(
        &self,
        since: SequenceNumber,
    ) -> CoreResult<Box<dyn Iterator<Item = CoreResult<Document>> + Send + 'static>>;
}

/// A contiguous interval of collatable keys with per-endpoint inclusivity.
///
/// A single-key range (`start == end`, both inclusive) matches exactly one
/// key. `None` endpoints are unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRange {
    /// Lower key in collatable order, or None for unbounded.
    pub start: Option<Collatable>,
    /// Upper key in collatable order, or None for unbounded.
    pub end: Option<Collatable>,
    /// Whether rows with key equal to `start` are included.
    pub inclusive_start: bool,
    /// Whether rows with key equal to `end` are included.
    pub inclusive_end: bool,
}

impl KeyRange {
    /// Creates a range over `[start, end]` with explicit inclusivity.
    #[must_use]
    pub fn new(
        start: Option<Collatable>,
        end: Option<Collatable>,
        inclusive_start: bool,
        inclusive_end: bool,
    ) -> Self {
        Self {
            start,
            end,
            inclusive_start,
            inclusive_end,
        }
    }

    /// Creates a range matching exactly one key.
    #[must_use]
    pub fn single(key: Collatable) -> Self {
        Self {
            start: Some(key.clone()),
            end: Some(key),
            inclusive_start: true,
            inclusive_end: true,
        }
    }
}

/// Aggregates index rows into a single value during a grouped or fully
/// reduced query.
///
/// The enumerator calls `accumulate` once per raw row in the current
/// group, then `reduce` when the group closes. `reduce` returns the
/// reduced value and resets the accumulation state for the next group.
/// The core copies nothing out of `reduce`'s result beyond the next
/// advance of the enumerator.
pub trait ReduceFunction {
    /// Folds one index row into the accumulation state.
    fn accumulate(&mut self, key: CollatableReader<'_>, value: &[u8]);

    /// Returns the reduced value and clears the accumulation state.
    fn reduce(&mut self) -> Vec<u8>;
}

/// Options controlling a view query.
///
/// Defaults: no key bounds, ascending, both endpoints inclusive, skip 0,
/// unlimited, no grouping, no reduction. When `keys` is set it overrides
/// the start/end bounds and the listed keys are visited in list order.
pub struct QueryOptions {
    /// Number of initial rows to skip.
    pub skip: u64,
    /// Maximum number of rows to yield.
    pub limit: u64,
    /// Iterate by descending key instead of ascending.
    pub descending: bool,
    /// Include rows whose key equals the start key.
    pub inclusive_start: bool,
    /// Include rows whose key equals the end key.
    pub inclusive_end: bool,
    /// Key to start at (the minimum, or maximum when descending).
    pub start_key: Option<Collatable>,
    /// Key to end at (the maximum, or minimum when descending).
    pub end_key: Option<Collatable>,
    /// When several rows share the start key, start at this document ID.
    pub start_key_doc_id: Option<String>,
    /// When several rows share the end key, end at this document ID.
    pub end_key_doc_id: Option<String>,
    /// Explicit keys to visit, in list order. Overrides start/end.
    pub keys: Option<Vec<Collatable>>,
    /// Group rows by the first `group_level` elements of their key.
    /// 0 means no grouping: with a reducer, everything reduces to one row.
    pub group_level: u32,
    /// Reduce function, or None to yield raw rows.
    pub reduce: Option<Box<dyn ReduceFunction>>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: u64::MAX,
            descending: false,
            inclusive_start: true,
            inclusive_end: true,
            start_key: None,
            end_key: None,
            start_key_doc_id: None,
            end_key_doc_id: None,
            keys: None,
            group_level: 0,
            reduce: None,
        }
    }
}

impl fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("skip", &self.skip)
            .field("limit", &self.limit)
            .field("descending", &self.descending)
            .field("inclusive_start", &self.inclusive_start)
            .field("inclusive_end", &self.inclusive_end)
            .field("start_key", &self.start_key)
            .field("end_key", &self.end_key)
            .field("keys", &self.keys.as_ref().map(Vec::len))
            .field("group_level", &self.group_level)
            .field("reduce", &self.reduce.is_some())
            .finish_non_exhaustive()
    }
}

/// An accumulated list of key/value pairs for [`emit_list`].
///
/// [`emit_list`]: crate::Indexer::emit_list
#[derive(Debug, Clone, Default)]
pub struct KeyValueList {
    keys: Vec<Collatable>,
    values: Vec<Vec<u8>>,
}

impl KeyValueList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one emission.
    pub fn add(&mut self, key: Collatable, value: Vec<u8>) {
        self.keys.push(key);
        self.values.push(value);
    }

    /// Removes all accumulated pairs, keeping allocations.
    pub fn reset(&mut self) {
        self.keys.clear();
        self.values.clear();
    }

    /// Number of accumulated pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if no pairs have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The accumulated keys, in emission order.
    #[must_use]
    pub fn keys(&self) -> &[Collatable] {
        &self.keys
    }

    /// The accumulated values, in emission order.
    #[must_use]
    pub fn values(&self) -> &[Vec<u8>] {
        &self.values
    }
}

/// Configuration for opening a view.
#[derive(Debug, Clone, Default)]
pub struct ViewConfig {
    /// Document-type filter: when set, only documents whose `doc_type`
    /// matches are indexed by this view.
    pub document_type: Option<String>,
}
