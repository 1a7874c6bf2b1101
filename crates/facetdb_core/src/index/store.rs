//! Index key-space layout over a host [`KeyStore`].
//!
//! One view owns one store, partitioned by a constant leading byte so that
//! the row namespace stays contiguous and byte-ordered:
//!
//! - `'r' || collatable_key || 0x00 || doc_id || 0x00 || emit_index`
//!   maps to `doc_sequence || value_bytes` — one index row per emission.
//! - `'d' || doc_id` maps to the document's [`DocKeysRecord`].
//! - `'m'` maps to the view's [`ViewMeta`].
//!
//! Collatable encodings are prefix-free, so for two distinct keys the first
//! differing byte decides the row order before either separator is
//! reached; for equal keys the comparison falls through to the document ID
//! and then the order-preserving emit-index varint. Document IDs therefore
//! must not contain NUL.

use crate::error::{CoreError, CoreResult};
use crate::index::meta::{DocKeysRecord, ViewMeta};
use facetdb_collatable::{Collatable, CollatableReader};
use facetdb_storage::{
    KeyStore, ScanBounds, ScanCursor, SequenceNumber, Transaction,
};
use std::ops::Bound;
use std::sync::Arc;

const ROW_PREFIX: u8 = b'r';
const DOC_KEYS_PREFIX: u8 = b'd';
const META_KEY: &[u8] = b"m";

/// Writes `n` as an order-preserving varint: a length byte followed by the
/// minimal big-endian representation. Lexicographic comparison of two
/// encodings equals numeric comparison.
fn write_ordered_varint(buf: &mut Vec<u8>, n: u64) {
    let bytes = n.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(7);
    buf.push((8 - skip) as u8);
    buf.extend_from_slice(&bytes[skip..]);
}

/// Reads an ordered varint, returning the value and bytes consumed.
fn read_ordered_varint(data: &[u8]) -> CoreResult<(u64, usize)> {
    let len = *data
        .first()
        .ok_or_else(|| CoreError::corrupt("missing emit-index in row key"))? as usize;
    if !(1..=8).contains(&len) || data.len() < 1 + len {
        return Err(CoreError::corrupt("malformed emit-index in row key"));
    }
    let mut value: u64 = 0;
    for &b in &data[1..1 + len] {
        value = value << 8 | u64::from(b);
    }
    Ok((value, 1 + len))
}

fn row_key(key: &[u8], doc_id: &str, emit_index: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + key.len() + 1 + doc_id.len() + 3);
    buf.push(ROW_PREFIX);
    buf.extend_from_slice(key);
    buf.push(0);
    buf.extend_from_slice(doc_id.as_bytes());
    buf.push(0);
    write_ordered_varint(&mut buf, u64::from(emit_index));
    buf
}

fn doc_keys_key(doc_id: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + doc_id.len());
    buf.push(DOC_KEYS_PREFIX);
    buf.extend_from_slice(doc_id.as_bytes());
    buf
}

fn encode_row_value(doc_sequence: SequenceNumber, value: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + value.len());
    buf.extend_from_slice(&doc_sequence.as_u64().to_be_bytes());
    buf.extend_from_slice(value);
    buf
}

fn decode_row_value(stored: &[u8]) -> CoreResult<(SequenceNumber, &[u8])> {
    if stored.len() < 8 {
        return Err(CoreError::corrupt("index row value shorter than envelope"));
    }
    let (seq, value) = stored.split_at(8);
    let sequence = u64::from_be_bytes(seq.try_into().expect("8 bytes"));
    Ok((SequenceNumber::new(sequence), value))
}

/// One decoded index row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    /// The emitted collatable key, in encoded form.
    pub key: Vec<u8>,
    /// ID of the document that emitted the row.
    pub doc_id: String,
    /// Position of the emission within the document's emission list.
    pub emit_index: u32,
    /// Sequence of the document revision that emitted the row.
    pub doc_sequence: SequenceNumber,
    /// The emitted value bytes.
    pub value: Vec<u8>,
}

/// Splits a stored row key back into its components.
fn parse_row_key(stored: &[u8]) -> CoreResult<(&[u8], &str, u32)> {
    let rest = stored
        .strip_prefix(&[ROW_PREFIX])
        .ok_or_else(|| CoreError::corrupt("index row key outside row namespace"))?;
    let mut reader = CollatableReader::new(rest);
    let key = reader.read()?;
    let rest = reader.remainder();
    let rest = rest
        .strip_prefix(&[0])
        .ok_or_else(|| CoreError::corrupt("missing separator after row key"))?;
    let doc_end = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| CoreError::corrupt("missing separator after document ID"))?;
    let doc_id = std::str::from_utf8(&rest[..doc_end])
        .map_err(|_| CoreError::corrupt("non-UTF-8 document ID in row key"))?;
    let (emit_index, consumed) = read_ordered_varint(&rest[doc_end + 1..])?;
    if doc_end + 1 + consumed != rest.len() {
        return Err(CoreError::corrupt("trailing bytes in row key"));
    }
    let emit_index = u32::try_from(emit_index)
        .map_err(|_| CoreError::corrupt("emit-index out of range"))?;
    Ok((key, doc_id, emit_index))
}

/// One endpoint of a row range: a collatable key, optionally narrowed to a
/// document ID, with explicit inclusivity.
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeEndpoint<'a> {
    /// Encoded collatable key, or None for unbounded.
    pub key: Option<&'a [u8]>,
    /// Document ID narrowing the endpoint within equal keys.
    pub doc_id: Option<&'a str>,
    /// Whether rows matching the endpoint are included.
    pub inclusive: bool,
}

/// Lazy cursor over index rows.
pub struct RowCursor {
    inner: Box<dyn ScanCursor>,
}

impl RowCursor {
    /// Advances to the next row in scan order, or None at the end.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Corrupt`] if a stored row fails to decode; the
    /// cursor should be discarded.
    pub fn advance(&mut self) -> CoreResult<Option<IndexRow>> {
        match self.inner.advance()? {
            None => Ok(None),
            Some(record) => {
                let (key, doc_id, emit_index) = parse_row_key(&record.key)?;
                let (doc_sequence, value) = decode_row_value(&record.value)?;
                Ok(Some(IndexRow {
                    key: key.to_vec(),
                    doc_id: doc_id.to_string(),
                    emit_index,
                    doc_sequence,
                    value: value.to_vec(),
                }))
            }
        }
    }
}

/// The persistent index of one view, layered over a host [`KeyStore`].
///
/// All mutations go through a [`Transaction`]; nothing is visible to
/// readers until the transaction commits.
pub struct IndexStore {
    store: Arc<dyn KeyStore>,
}

impl IndexStore {
    /// Creates an index store over the given host store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self { store }
    }

    /// Returns the underlying host store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyStore> {
        &self.store
    }

    /// Reads the value stored for one emission, if present.
    pub fn get_entry(
        &self,
        doc_id: &str,
        key: &Collatable,
        emit_index: u32,
    ) -> CoreResult<Option<Vec<u8>>> {
        let stored = self.store.get(&row_key(key.as_bytes(), doc_id, emit_index))?;
        match stored {
            None => Ok(None),
            Some(record) => {
                let (_, value) = decode_row_value(&record.value)?;
                Ok(Some(value.to_vec()))
            }
        }
    }

    /// Writes one index row.
    pub fn put_row(
        &self,
        txn: &mut Transaction,
        key: &Collatable,
        doc_id: &str,
        emit_index: u32,
        doc_sequence: SequenceNumber,
        value: &[u8],
    ) -> CoreResult<()> {
        txn.put(
            row_key(key.as_bytes(), doc_id, emit_index),
            encode_row_value(doc_sequence, value),
        )?;
        Ok(())
    }

    /// Deletes one index row.
    pub fn delete_row(
        &self,
        txn: &mut Transaction,
        key: &Collatable,
        doc_id: &str,
        emit_index: u32,
    ) -> CoreResult<()> {
        txn.delete(row_key(key.as_bytes(), doc_id, emit_index))?;
        Ok(())
    }

    /// Reads the doc-keys record for a document, seeing any write pending
    /// in the given transaction.
    pub fn get_doc_keys(
        &self,
        txn: Option<&Transaction>,
        doc_id: &str,
    ) -> CoreResult<Option<DocKeysRecord>> {
        let key = doc_keys_key(doc_id);
        let stored = match txn {
            Some(txn) => txn.get(&key)?,
            None => self.store.get(&key)?.map(|record| record.value),
        };
        match stored {
            None => Ok(None),
            Some(bytes) => Ok(Some(DocKeysRecord::decode(&bytes)?)),
        }
    }

    /// Writes the doc-keys record for a document. An empty key list means
    /// the document currently emits nothing; the record is removed.
    pub fn put_doc_keys(
        &self,
        txn: &mut Transaction,
        doc_id: &str,
        record: &DocKeysRecord,
    ) -> CoreResult<()> {
        let key = doc_keys_key(doc_id);
        if record.keys.is_empty() {
            txn.delete(key)?;
        } else {
            txn.put(key, record.encode())?;
        }
        Ok(())
    }

    /// Reads the persisted view metadata, if any.
    pub fn read_meta(&self) -> CoreResult<Option<ViewMeta>> {
        match self.store.get(META_KEY)? {
            None => Ok(None),
            Some(record) => Ok(Some(ViewMeta::decode(&record.value)?)),
        }
    }

    /// Writes the view metadata.
    pub fn write_meta(&self, txn: &mut Transaction, meta: &ViewMeta) -> CoreResult<()> {
        txn.put(META_KEY.to_vec(), meta.encode())?;
        Ok(())
    }

    /// Queues deletion of every index row and doc-keys record. The
    /// metadata record is left to the caller.
    pub fn clear_rows(&self, txn: &mut Transaction) -> CoreResult<()> {
        for prefix in [ROW_PREFIX, DOC_KEYS_PREFIX] {
            let mut cursor = self.store.scan(ScanBounds::prefix(&[prefix]), false)?;
            while let Some(record) = cursor.advance()? {
                txn.delete(record.key)?;
            }
        }
        Ok(())
    }

    /// Opens a cursor over the rows between `lower` and `upper` in byte
    /// order. `lower`/`upper` are positional (byte-order minimum and
    /// maximum); the caller maps its logical start/end onto them according
    /// to traversal direction.
    pub fn scan_rows(
        &self,
        lower: RangeEndpoint<'_>,
        upper: RangeEndpoint<'_>,
        descending: bool,
    ) -> CoreResult<RowCursor> {
        let start = match lower.key {
            None => Bound::Included(vec![ROW_PREFIX]),
            Some(key) => {
                let mut bound = Vec::with_capacity(2 + key.len() + 16);
                bound.push(ROW_PREFIX);
                bound.extend_from_slice(key);
                match lower.doc_id {
                    None => {
                        if !lower.inclusive {
                            bound.push(1);
                        }
                    }
                    Some(doc_id) => {
                        bound.push(0);
                        bound.extend_from_slice(doc_id.as_bytes());
                        if !lower.inclusive {
                            bound.push(1);
                        }
                    }
                }
                Bound::Included(bound)
            }
        };

        let end = match upper.key {
            None => Bound::Excluded(vec![ROW_PREFIX + 1]),
            Some(key) => {
                let mut bound = Vec::with_capacity(2 + key.len() + 16);
                bound.push(ROW_PREFIX);
                bound.extend_from_slice(key);
                match upper.doc_id {
                    None => {
                        if upper.inclusive {
                            bound.push(1);
                        }
                    }
                    Some(doc_id) => {
                        bound.push(0);
                        bound.extend_from_slice(doc_id.as_bytes());
                        if upper.inclusive {
                            bound.push(1);
                        }
                    }
                }
                Bound::Excluded(bound)
            }
        };

        let inner = self
            .store
            .scan(ScanBounds::range(start, end), descending)?;
        Ok(RowCursor { inner })
    }
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore").finish_non_exhaustive()
    }
}
