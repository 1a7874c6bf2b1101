//! Index writer: updates one view's index for one document.

use crate::error::{CoreError, CoreResult};
use crate::index::meta::DocKeysRecord;
use crate::index::store::IndexStore;
use facetdb_collatable::Collatable;
use facetdb_storage::{SequenceNumber, Transaction};
use sha2::{Digest, Sha256};

/// Order- and content-sensitive fingerprint of an emission list.
///
/// Covers both keys and values so that any change to the list, including
/// swapping two emissions of the same key with different values, forces a
/// re-index of the document's rows.
pub(crate) fn emission_fingerprint(keys: &[Collatable], values: &[Vec<u8>]) -> u64 {
    let mut hasher = Sha256::new();
    for (key, value) in keys.iter().zip(values) {
        hasher.update((key.len() as u32).to_le_bytes());
        hasher.update(key.as_bytes());
        hasher.update((value.len() as u32).to_le_bytes());
        hasher.update(value);
    }
    let digest = hasher.finalize();
    u64::from_le_bytes(digest[..8].try_into().expect("8 bytes"))
}

/// Updates one view's index within a host transaction.
///
/// The writer diffs a document's new emission list against the one
/// recorded by the previous update and touches only the rows that differ.
/// Partial changes are never visible: every mutation is buffered in the
/// transaction until the surrounding indexer batch commits.
pub struct IndexWriter<'a> {
    store: &'a IndexStore,
    txn: &'a mut Transaction,
    was_empty: bool,
}

impl<'a> IndexWriter<'a> {
    /// Creates a writer over an index store and its open transaction.
    ///
    /// `was_empty` declares that the index held no rows when the batch
    /// began, allowing updates to skip the prior-keys lookup.
    pub fn new(store: &'a IndexStore, txn: &'a mut Transaction, was_empty: bool) -> Self {
        Self {
            store,
            txn,
            was_empty,
        }
    }

    /// Replaces the index rows for `doc_id` with the given emission list,
    /// adjusting `row_count` by the number of rows added or removed.
    /// Returns true if the index changed.
    ///
    /// Emissions at the same position in consecutive emission lists are
    /// treated as the same slot: a key change at a slot deletes the old
    /// row and inserts the new one, while an unchanged key at a slot is
    /// rewritten in place with its current value. An unchanged fingerprint
    /// short-circuits the whole update without row I/O.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidParameter`] if the key and value lists
    /// differ in length or the document ID contains NUL.
    pub fn update(
        &mut self,
        doc_id: &str,
        doc_sequence: SequenceNumber,
        keys: &[Collatable],
        values: &[Vec<u8>],
        row_count: &mut u64,
    ) -> CoreResult<bool> {
        if keys.len() != values.len() {
            return Err(CoreError::invalid_parameter(format!(
                "emitted {} keys but {} values",
                keys.len(),
                values.len()
            )));
        }
        if doc_id.as_bytes().contains(&0) {
            return Err(CoreError::invalid_parameter(
                "document IDs must not contain NUL",
            ));
        }

        let prior = if self.was_empty {
            None
        } else {
            self.store.get_doc_keys(Some(&*self.txn), doc_id)?
        };

        if prior.is_none() && keys.is_empty() {
            // Nothing was indexed and nothing is emitted now.
            return Ok(false);
        }

        let fingerprint = emission_fingerprint(keys, values);
        if let Some(prior) = &prior {
            if prior.fingerprint == fingerprint && doc_sequence >= prior.sequence {
                // Same emissions, possibly from a newer revision: only the
                // recorded sequence needs to move.
                if doc_sequence > prior.sequence {
                    self.store.put_doc_keys(
                        self.txn,
                        doc_id,
                        &DocKeysRecord {
                            sequence: doc_sequence,
                            keys: prior.keys.clone(),
                            fingerprint,
                        },
                    )?;
                }
                return Ok(false);
            }
        }

        let old_keys: &[Collatable] = prior.as_ref().map_or(&[], |p| p.keys.as_slice());
        let slots = old_keys.len().max(keys.len());
        for emit_index in 0..slots {
            let old_key = old_keys.get(emit_index);
            let new_key = keys.get(emit_index);

            if let Some(old_key) = old_key {
                if new_key != Some(old_key) {
                    self.store
                        .delete_row(self.txn, old_key, doc_id, emit_index as u32)?;
                    *row_count = row_count.saturating_sub(1);
                }
            }
            if let Some(new_key) = new_key {
                self.store.put_row(
                    self.txn,
                    new_key,
                    doc_id,
                    emit_index as u32,
                    doc_sequence,
                    &values[emit_index],
                )?;
                if old_key != Some(new_key) {
                    *row_count += 1;
                }
            }
        }

        self.store.put_doc_keys(
            self.txn,
            doc_id,
            &DocKeysRecord {
                sequence: doc_sequence,
                keys: keys.to_vec(),
                fingerprint,
            },
        )?;
        Ok(true)
    }
}

impl std::fmt::Debug for IndexWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexWriter")
            .field("was_empty", &self.was_empty)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::store::RangeEndpoint;
    use facetdb_collatable::CollatableBuilder;
    use facetdb_storage::MemoryKeyStore;
    use std::sync::Arc;

    fn key(n: f64) -> Collatable {
        let mut b = CollatableBuilder::new();
        b.add_number(n).unwrap();
        b.build()
    }

    fn new_index() -> IndexStore {
        IndexStore::new(Arc::new(MemoryKeyStore::new()))
    }

    fn seq(n: u64) -> SequenceNumber {
        SequenceNumber::new(n)
    }

    /// Runs one update in its own committed transaction.
    fn update(
        index: &IndexStore,
        doc_id: &str,
        doc_seq: u64,
        emissions: &[(f64, &[u8])],
        row_count: &mut u64,
    ) -> bool {
        let keys: Vec<Collatable> = emissions.iter().map(|(n, _)| key(*n)).collect();
        let values: Vec<Vec<u8>> = emissions.iter().map(|(_, v)| v.to_vec()).collect();
        let mut txn = Transaction::begin(index.store().clone());
        let mut writer = IndexWriter::new(index, &mut txn, false);
        let changed = writer
            .update(doc_id, seq(doc_seq), &keys, &values, row_count)
            .unwrap();
        txn.commit().unwrap();
        changed
    }

    fn all_rows(index: &IndexStore) -> Vec<(Vec<u8>, String, u32, Vec<u8>)> {
        let mut cursor = index
            .scan_rows(RangeEndpoint::default(), RangeEndpoint::default(), false)
            .unwrap();
        let mut rows = Vec::new();
        while let Some(row) = cursor.advance().unwrap() {
            rows.push((row.key, row.doc_id, row.emit_index, row.value));
        }
        rows
    }

    #[test]
    fn first_update_inserts_rows() {
        let index = new_index();
        let mut row_count = 0;
        let changed = update(&index, "d1", 1, &[(1.0, b"a"), (2.0, b"b")], &mut row_count);
        assert!(changed);
        assert_eq!(row_count, 2);
        assert_eq!(all_rows(&index).len(), 2);
        assert_eq!(
            index.get_entry("d1", &key(1.0), 0).unwrap().unwrap(),
            b"a"
        );
    }

    #[test]
    fn unchanged_emissions_short_circuit() {
        let index = new_index();
        let mut row_count = 0;
        update(&index, "d1", 1, &[(1.0, b"a")], &mut row_count);

        // Same emissions from a newer revision: no row churn, not changed.
        let changed = update(&index, "d1", 2, &[(1.0, b"a")], &mut row_count);
        assert!(!changed);
        assert_eq!(row_count, 1);

        // The recorded sequence advanced with the revision.
        let record = index.get_doc_keys(None, "d1").unwrap().unwrap();
        assert_eq!(record.sequence, seq(2));
    }

    #[test]
    fn changed_key_replaces_row() {
        let index = new_index();
        let mut row_count = 0;
        update(&index, "d1", 1, &[(1.0, b"a")], &mut row_count);
        let changed = update(&index, "d1", 2, &[(3.0, b"a")], &mut row_count);
        assert!(changed);
        assert_eq!(row_count, 1);

        assert!(index.get_entry("d1", &key(1.0), 0).unwrap().is_none());
        assert_eq!(
            index.get_entry("d1", &key(3.0), 0).unwrap().unwrap(),
            b"a"
        );
    }

    #[test]
    fn changed_value_with_same_key_is_rewritten() {
        let index = new_index();
        let mut row_count = 0;
        update(&index, "d1", 1, &[(1.0, b"old")], &mut row_count);
        let changed = update(&index, "d1", 2, &[(1.0, b"new")], &mut row_count);
        assert!(changed);
        assert_eq!(row_count, 1);
        assert_eq!(
            index.get_entry("d1", &key(1.0), 0).unwrap().unwrap(),
            b"new"
        );
    }

    #[test]
    fn swapped_emissions_of_same_key_are_reindexed() {
        let index = new_index();
        let mut row_count = 0;
        update(&index, "d1", 1, &[(1.0, b"x"), (1.0, b"y")], &mut row_count);
        assert_eq!(row_count, 2);

        let changed = update(&index, "d1", 2, &[(1.0, b"y"), (1.0, b"x")], &mut row_count);
        assert!(changed);
        assert_eq!(row_count, 2);
        assert_eq!(
            index.get_entry("d1", &key(1.0), 0).unwrap().unwrap(),
            b"y"
        );
        assert_eq!(
            index.get_entry("d1", &key(1.0), 1).unwrap().unwrap(),
            b"x"
        );
    }

    #[test]
    fn shrinking_emission_list_deletes_tail_rows() {
        let index = new_index();
        let mut row_count = 0;
        update(
            &index,
            "d1",
            1,
            &[(1.0, b"a"), (2.0, b"b"), (3.0, b"c")],
            &mut row_count,
        );
        let changed = update(&index, "d1", 2, &[(1.0, b"a")], &mut row_count);
        assert!(changed);
        assert_eq!(row_count, 1);
        assert_eq!(all_rows(&index).len(), 1);
    }

    #[test]
    fn empty_emission_list_retracts_document() {
        let index = new_index();
        let mut row_count = 0;
        update(&index, "d1", 1, &[(1.0, b"a"), (2.0, b"b")], &mut row_count);
        let changed = update(&index, "d1", 2, &[], &mut row_count);
        assert!(changed);
        assert_eq!(row_count, 0);
        assert!(all_rows(&index).is_empty());
        assert!(index.get_doc_keys(None, "d1").unwrap().is_none());
    }

    #[test]
    fn documents_do_not_interfere() {
        let index = new_index();
        let mut row_count = 0;
        update(&index, "d1", 1, &[(1.0, b"a")], &mut row_count);
        update(&index, "d2", 2, &[(1.0, b"b")], &mut row_count);
        assert_eq!(row_count, 2);

        update(&index, "d1", 3, &[], &mut row_count);
        assert_eq!(row_count, 1);
        assert_eq!(
            index.get_entry("d2", &key(1.0), 0).unwrap().unwrap(),
            b"b"
        );
    }

    #[test]
    fn mismatched_lists_are_rejected() {
        let index = new_index();
        let mut txn = Transaction::begin(index.store().clone());
        let mut writer = IndexWriter::new(&index, &mut txn, false);
        let mut row_count = 0;
        let err = writer
            .update("d1", seq(1), &[key(1.0)], &[], &mut row_count)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidParameter { .. }));
    }

    #[test]
    fn nul_in_doc_id_is_rejected() {
        let index = new_index();
        let mut txn = Transaction::begin(index.store().clone());
        let mut writer = IndexWriter::new(&index, &mut txn, false);
        let mut row_count = 0;
        let err = writer
            .update("bad\0id", seq(1), &[], &[], &mut row_count)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidParameter { .. }));
    }

    #[test]
    fn fingerprint_is_order_and_content_sensitive() {
        let keys = vec![key(1.0), key(2.0)];
        let values = vec![b"a".to_vec(), b"b".to_vec()];
        let base = emission_fingerprint(&keys, &values);

        let swapped_keys = vec![key(2.0), key(1.0)];
        assert_ne!(base, emission_fingerprint(&swapped_keys, &values));

        let swapped_values = vec![b"b".to_vec(), b"a".to_vec()];
        assert_ne!(base, emission_fingerprint(&keys, &swapped_values));

        assert_eq!(base, emission_fingerprint(&keys, &values));
    }
}
