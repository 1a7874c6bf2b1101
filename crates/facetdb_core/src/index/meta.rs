//! Persisted index records: view metadata and per-document key lists.
//!
//! Both records are small hand-rolled binary structures with a leading
//! format version byte. Integers are little-endian; variable-length fields
//! are length-prefixed with u32.

use crate::error::{CoreError, CoreResult};
use facetdb_collatable::Collatable;
use facetdb_storage::SequenceNumber;

/// Format version of the metadata and doc-keys records.
pub const RECORD_FORMAT_VERSION: u8 = 1;

/// Persisted state of a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewMeta {
    /// Version string of the view's map function.
    pub version: String,
    /// Optional document-type filter.
    pub doc_type: Option<String>,
    /// Highest source sequence this view has considered.
    pub last_sequence_indexed: SequenceNumber,
    /// Highest source sequence that actually changed the index.
    pub last_sequence_changed_at: SequenceNumber,
    /// Number of index rows.
    pub total_rows: u64,
}

impl ViewMeta {
    /// Metadata for a freshly created or invalidated view: both watermarks
    /// and the row count are zero.
    #[must_use]
    pub fn empty(version: String, doc_type: Option<String>) -> Self {
        Self {
            version,
            doc_type,
            last_sequence_indexed: SequenceNumber::new(0),
            last_sequence_changed_at: SequenceNumber::new(0),
            total_rows: 0,
        }
    }

    /// Serializes the record.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            1 + 8 * 3 + 4 + self.version.len() + 1 + 4
                + self.doc_type.as_ref().map_or(0, String::len),
        );
        buf.push(RECORD_FORMAT_VERSION);
        buf.extend_from_slice(&self.last_sequence_indexed.as_u64().to_le_bytes());
        buf.extend_from_slice(&self.last_sequence_changed_at.as_u64().to_le_bytes());
        buf.extend_from_slice(&self.total_rows.to_le_bytes());
        push_string(&mut buf, &self.version);
        match &self.doc_type {
            Some(doc_type) => {
                buf.push(1);
                push_string(&mut buf, doc_type);
            }
            None => buf.push(0),
        }
        buf
    }

    /// Deserializes the record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Corrupt`] on truncation or an unknown format
    /// version.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        let mut data = bytes;
        expect_format_version(&mut data, "view metadata")?;
        let last_sequence_indexed = SequenceNumber::new(take_u64(&mut data)?);
        let last_sequence_changed_at = SequenceNumber::new(take_u64(&mut data)?);
        let total_rows = take_u64(&mut data)?;
        let version = take_string(&mut data)?;
        let doc_type = match take_u8(&mut data)? {
            0 => None,
            1 => Some(take_string(&mut data)?),
            other => {
                return Err(CoreError::corrupt(format!(
                    "invalid doc-type flag {other} in view metadata"
                )))
            }
        };
        if !data.is_empty() {
            return Err(CoreError::corrupt("trailing bytes in view metadata"));
        }
        Ok(Self {
            version,
            doc_type,
            last_sequence_indexed,
            last_sequence_changed_at,
            total_rows,
        })
    }
}

/// The keys a view last emitted for one document, with a fingerprint of
/// the full emission list.
///
/// On a successful update this record exactly matches the set of index
/// rows stored for the (view, document) pair; the fingerprint lets a
/// re-index of an unchanged emission list skip row I/O entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocKeysRecord {
    /// Sequence of the document revision that produced these keys.
    pub sequence: SequenceNumber,
    /// Emitted collatable keys, in emission order.
    pub keys: Vec<Collatable>,
    /// Order- and content-sensitive fingerprint of the (key, value)
    /// emission list.
    pub fingerprint: u64,
}

impl DocKeysRecord {
    /// Serializes the record.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let keys_len: usize = self.keys.iter().map(|k| 4 + k.len()).sum();
        let mut buf = Vec::with_capacity(1 + 8 + 8 + 4 + keys_len);
        buf.push(RECORD_FORMAT_VERSION);
        buf.extend_from_slice(&self.sequence.as_u64().to_le_bytes());
        buf.extend_from_slice(&self.fingerprint.to_le_bytes());
        buf.extend_from_slice(&(self.keys.len() as u32).to_le_bytes());
        for key in &self.keys {
            buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
            buf.extend_from_slice(key.as_bytes());
        }
        buf
    }

    /// Deserializes the record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Corrupt`] on truncation or an unknown format
    /// version.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        let mut data = bytes;
        expect_format_version(&mut data, "doc-keys record")?;
        let sequence = SequenceNumber::new(take_u64(&mut data)?);
        let fingerprint = take_u64(&mut data)?;
        let count = take_u32(&mut data)? as usize;
        let mut keys = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let len = take_u32(&mut data)? as usize;
            let bytes = take(&mut data, len)?;
            keys.push(Collatable::from_bytes(bytes.to_vec()));
        }
        if !data.is_empty() {
            return Err(CoreError::corrupt("trailing bytes in doc-keys record"));
        }
        Ok(Self {
            sequence,
            keys,
            fingerprint,
        })
    }
}

fn push_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn expect_format_version(data: &mut &[u8], what: &str) -> CoreResult<()> {
    let version = take_u8(data)?;
    if version != RECORD_FORMAT_VERSION {
        return Err(CoreError::corrupt(format!(
            "unknown {what} format version {version}"
        )));
    }
    Ok(())
}

fn take<'a>(data: &mut &'a [u8], n: usize) -> CoreResult<&'a [u8]> {
    if data.len() < n {
        return Err(CoreError::corrupt("truncated index record"));
    }
    let (head, rest) = data.split_at(n);
    *data = rest;
    Ok(head)
}

fn take_u8(data: &mut &[u8]) -> CoreResult<u8> {
    Ok(take(data, 1)?[0])
}

fn take_u32(data: &mut &[u8]) -> CoreResult<u32> {
    let bytes = take(data, 4)?;
    Ok(u32::from_le_bytes(bytes.try_into().expect("4 bytes")))
}

fn take_u64(data: &mut &[u8]) -> CoreResult<u64> {
    let bytes = take(data, 8)?;
    Ok(u64::from_le_bytes(bytes.try_into().expect("8 bytes")))
}

fn take_string(data: &mut &[u8]) -> CoreResult<String> {
    let len = take_u32(data)? as usize;
    let bytes = take(data, len)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| CoreError::corrupt("non-UTF-8 string in index record"))
}
