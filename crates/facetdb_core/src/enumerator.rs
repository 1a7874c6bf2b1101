//! Query enumerator: ordered traversal of index rows with optional
//! grouping and reduction.

use crate::error::{CoreError, CoreResult};
use crate::index::{IndexRow, RangeEndpoint, RowCursor};
use crate::types::{QueryOptions, ReduceFunction};
use crate::view::View;
use facetdb_collatable::{Collatable, CollatableBuilder, CollatableReader, Tag};
use facetdb_storage::SequenceNumber;
use std::sync::Arc;

/// One resolved key range to traverse.
#[derive(Debug, Clone, Default)]
struct EnumRange {
    start: Option<Collatable>,
    end: Option<Collatable>,
    start_doc_id: Option<String>,
    end_doc_id: Option<String>,
    inclusive_start: bool,
    inclusive_end: bool,
}

/// Cursor over the rows of a view query.
///
/// Rows are visited in `(key, doc_id, emit_index)` order within each key
/// range (reversed when descending); with an explicit key list, ranges are
/// visited in list order regardless of key comparison. The current row's
/// accessors are valid after [`next`](Self::next) returns true and are
/// invalidated by the following advance or by [`close`](Self::close).
///
/// The enumerator registers as a user of its view for its whole lifetime,
/// so the view cannot be closed, erased, or deleted while the enumerator
/// is live; `close` only releases the store cursor.
pub struct IndexEnumerator {
    view: Arc<View>,
    ranges: Vec<EnumRange>,
    descending: bool,
    skip: u64,
    limit: u64,
    group_level: u32,
    reduce: Option<Box<dyn ReduceFunction>>,
    current_range: Option<usize>,
    cursor: Option<RowCursor>,
    current_group: Option<Vec<u8>>,
    row_key: Vec<u8>,
    row_value: Vec<u8>,
    row_doc_id: String,
    row_sequence: SequenceNumber,
    has_row: bool,
    closed: bool,
}

impl IndexEnumerator {
    /// Builds an enumerator from query options, registering it as a user
    /// of the view. Usually reached through [`View::query`].
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::InvalidParameter`] if `group_level` is set
    /// without a reduce function.
    pub(crate) fn new(view: Arc<View>, options: QueryOptions) -> CoreResult<Self> {
        if options.group_level > 0 && options.reduce.is_none() {
            return Err(CoreError::invalid_parameter(
                "group_level requires a reduce function",
            ));
        }

        let ranges = match options.keys {
            Some(keys) => keys
                .into_iter()
                .map(|key| EnumRange {
                    start: Some(key.clone()),
                    end: Some(key),
                    start_doc_id: None,
                    end_doc_id: None,
                    inclusive_start: true,
                    inclusive_end: true,
                })
                .collect(),
            None => vec![EnumRange {
                start: options.start_key,
                end: options.end_key,
                start_doc_id: options.start_key_doc_id,
                end_doc_id: options.end_key_doc_id,
                inclusive_start: options.inclusive_start,
                inclusive_end: options.inclusive_end,
            }],
        };

        view.add_user()?;
        Ok(Self {
            view,
            ranges,
            descending: options.descending,
            skip: options.skip,
            limit: options.limit,
            group_level: options.group_level,
            reduce: options.reduce,
            current_range: None,
            cursor: None,
            current_group: None,
            row_key: Vec::new(),
            row_value: Vec::new(),
            row_doc_id: String::new(),
            row_sequence: SequenceNumber::new(0),
            has_row: false,
            closed: false,
        })
    }

    /// Advances to the next row. Returns false at the end of the query.
    ///
    /// # Errors
    ///
    /// A decode or storage error terminates the enumeration; the
    /// enumerator should be discarded (dropping it is always safe).
    pub fn next(&mut self) -> CoreResult<bool> {
        self.has_row = false;
        if self.closed || self.limit == 0 {
            return Ok(false);
        }
        if self.reduce.is_some() {
            self.next_reduced()
        } else {
            match self.advance_raw()? {
                Some(row) => {
                    self.install_row(row.key, row.value, row.doc_id, row.doc_sequence);
                    self.limit -= 1;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }

    /// Reader over the current row's key.
    #[must_use]
    pub fn key(&self) -> CollatableReader<'_> {
        CollatableReader::new(&self.row_key)
    }

    /// The current row's encoded key bytes.
    #[must_use]
    pub fn key_data(&self) -> &[u8] {
        &self.row_key
    }

    /// The current row's value bytes. For a reduced row this is the
    /// reduce function's output, valid until the next advance.
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.row_value
    }

    /// ID of the document that emitted the current row. Empty for reduced
    /// rows, which aggregate several documents.
    #[must_use]
    pub fn doc_id(&self) -> &str {
        &self.row_doc_id
    }

    /// Sequence of the document revision that emitted the current row.
    /// Zero for reduced rows.
    #[must_use]
    pub fn sequence(&self) -> SequenceNumber {
        self.row_sequence
    }

    /// Index of the key range the current row came from, for key-list
    /// queries.
    #[must_use]
    pub fn current_key_range_index(&self) -> Option<usize> {
        self.current_range
    }

    /// Releases the store cursor without invalidating the enumerator
    /// object. Subsequent `next` calls return false.
    pub fn close(&mut self) {
        self.cursor = None;
        self.closed = true;
    }

    fn next_reduced(&mut self) -> CoreResult<bool> {
        loop {
            match self.advance_raw()? {
                Some(row) => {
                    let grouped = self.grouped_key(&row.key)?;
                    let same_group =
                        self.current_group.as_deref() == Some(grouped.as_slice());
                    if self.current_group.is_none() {
                        self.current_group = Some(grouped);
                        self.accumulate(&row);
                    } else if same_group {
                        self.accumulate(&row);
                    } else {
                        // This row opens a new group; emit the one that
                        // just closed.
                        let closed_key =
                            self.current_group.replace(grouped).unwrap_or_default();
                        let value = self.reduce_value();
                        self.accumulate(&row);
                        self.install_row(
                            closed_key,
                            value,
                            String::new(),
                            SequenceNumber::new(0),
                        );
                        self.limit -= 1;
                        return Ok(true);
                    }
                }
                None => {
                    if let Some(closed_key) = self.current_group.take() {
                        let value = self.reduce_value();
                        self.install_row(
                            closed_key,
                            value,
                            String::new(),
                            SequenceNumber::new(0),
                        );
                        self.limit -= 1;
                        return Ok(true);
                    }
                    return Ok(false);
                }
            }
        }
    }

    /// Pulls the next in-range row, honoring skip and advancing through
    /// the key-range list.
    fn advance_raw(&mut self) -> CoreResult<Option<IndexRow>> {
        loop {
            if let Some(cursor) = self.cursor.as_mut() {
                match cursor.advance()? {
                    Some(row) => {
                        if self.skip > 0 {
                            self.skip -= 1;
                            continue;
                        }
                        return Ok(Some(row));
                    }
                    None => {
                        self.cursor = None;
                    }
                }
            } else {
                let next_index = match self.current_range {
                    None => 0,
                    Some(i) => i + 1,
                };
                if next_index >= self.ranges.len() {
                    return Ok(None);
                }
                self.current_range = Some(next_index);
                self.cursor = Some(self.open_cursor(next_index)?);
            }
        }
    }

    fn open_cursor(&self, range_index: usize) -> CoreResult<RowCursor> {
        let range = &self.ranges[range_index];
        let start = RangeEndpoint {
            key: range.start.as_ref().map(Collatable::as_bytes),
            doc_id: range.start_doc_id.as_deref(),
            inclusive: range.inclusive_start,
        };
        let end = RangeEndpoint {
            key: range.end.as_ref().map(Collatable::as_bytes),
            doc_id: range.end_doc_id.as_deref(),
            inclusive: range.inclusive_end,
        };
        // The start key is the byte-order minimum when ascending and the
        // maximum when descending.
        let (lower, upper) = if self.descending {
            (end, start)
        } else {
            (start, end)
        };
        self.view
            .index_store()
            .scan_rows(lower, upper, self.descending)
    }

    /// Canonical grouped key of a row: null at group level 0, otherwise
    /// the array of the first `group_level` key elements (the whole key
    /// if it is not an array).
    fn grouped_key(&self, key: &[u8]) -> CoreResult<Vec<u8>> {
        if self.group_level == 0 {
            let mut b = CollatableBuilder::new();
            b.add_null();
            return Ok(b.build().into_bytes());
        }
        let mut reader = CollatableReader::new(key);
        if reader.peek_tag() != Tag::Array {
            return Ok(key.to_vec());
        }
        reader.begin_array()?;
        let mut builder = CollatableBuilder::new();
        builder.begin_array();
        let mut taken = 0;
        while taken < self.group_level && reader.peek_tag() != Tag::EndSequence {
            if reader.at_end() {
                return Err(CoreError::corrupt("unterminated array in row key"));
            }
            builder.add_encoded(reader.read()?);
            taken += 1;
        }
        builder.end_array();
        Ok(builder.build().into_bytes())
    }

    fn accumulate(&mut self, row: &IndexRow) {
        if let Some(reduce) = self.reduce.as_mut() {
            reduce.accumulate(CollatableReader::new(&row.key), &row.value);
        }
    }

    fn reduce_value(&mut self) -> Vec<u8> {
        self.reduce
            .as_mut()
            .map(|reduce| reduce.reduce())
            .unwrap_or_default()
    }

    fn install_row(
        &mut self,
        key: Vec<u8>,
        value: Vec<u8>,
        doc_id: String,
        sequence: SequenceNumber,
    ) {
        self.row_key = key;
        self.row_value = value;
        self.row_doc_id = doc_id;
        self.row_sequence = sequence;
        self.has_row = true;
    }
}

impl Drop for IndexEnumerator {
    fn drop(&mut self) {
        self.view.remove_user();
    }
}

impl std::fmt::Debug for IndexEnumerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexEnumerator")
            .field("view", &self.view.name())
            .field("ranges", &self.ranges.len())
            .field("descending", &self.descending)
            .field("has_row", &self.has_row)
            .finish_non_exhaustive()
    }
}
