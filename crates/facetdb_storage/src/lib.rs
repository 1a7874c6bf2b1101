//! # FacetDB Storage
//!
//! Host key/value store contract for FacetDB.
//!
//! The index layer is storage-agnostic: it consumes an ordered byte
//! key/value store with per-record sequence numbers, lazy range cursors in
//! either direction, and atomic batch application. This crate pins that
//! contract ([`KeyStore`]), provides the buffered [`Transaction`] with
//! two-phase commit used to coordinate multi-store commits, and ships the
//! in-memory reference implementation ([`MemoryKeyStore`]).
//!
//! ## Design Principles
//!
//! - Stores are opaque byte maps in plain lexicographic order; all key
//!   layout interpretation belongs to the layers above
//! - All fallible commit work happens in `validate`/`prepare`, so a
//!   coordinator can stage several stores and then apply all-or-nothing
//! - Cursors never pin store locks between advances
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use facetdb_storage::{KeyStore, MemoryKeyStore, ScanBounds, Transaction};
//!
//! let store = Arc::new(MemoryKeyStore::new());
//! let mut txn = Transaction::begin(store.clone());
//! txn.put(b"b".to_vec(), b"2".to_vec()).unwrap();
//! txn.put(b"a".to_vec(), b"1".to_vec()).unwrap();
//! txn.commit().unwrap();
//!
//! let mut cursor = store.scan(ScanBounds::all(), false).unwrap();
//! let first = cursor.advance().unwrap().unwrap();
//! assert_eq!(first.key, b"a");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod keystore;
mod memory;
mod transaction;

pub use error::{StorageError, StorageResult};
pub use keystore::{KeyStore, Record, ScanBounds, ScanCursor, SequenceNumber, WriteBatch};
pub use memory::MemoryKeyStore;
pub use transaction::{PreparedCommit, Transaction};
