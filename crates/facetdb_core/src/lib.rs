//! # FacetDB Core
//!
//! The map/reduce view-index engine of FacetDB.
//!
//! A [`View`] is a named, versioned index over a stream of document
//! revisions. An [`Indexer`] incrementally materializes one or more views
//! inside a single atomic batch: it pulls the documents newer than each
//! view's watermark, hands each one to the caller's map function, and
//! writes the emitted `(collatable key, value)` rows through the
//! [`IndexWriter`](index::IndexWriter), diffing against the document's
//! previous emissions so that only changed rows are touched. Queries run
//! through an [`IndexEnumerator`], which fuses ordered range traversal
//! with optional grouping and reduction.
//!
//! Keys are collatable (`facetdb_collatable`): their byte order equals the
//! semantic order of the JSON-shaped values they encode, so the host store
//! ([`facetdb_storage::KeyStore`]) sorts rows with plain byte comparison.
//!
//! ## Concurrency
//!
//! Views are shared: any number of enumerators may read a view
//! concurrently, while at most one indexer updates it. Enumerators and
//! indexers register as users of their view; close, erase, and delete fail
//! with [`CoreError::IndexBusy`] while users are live. A commit flips all
//! of a batch's rows — across every participating view — atomically.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod enumerator;
mod error;
pub mod index;
mod indexer;
mod types;
mod view;

pub use enumerator::IndexEnumerator;
pub use error::{CoreError, CoreResult};
pub use indexer::{DocumentCursor, Indexer};
pub use types::{
    Document, DocumentSource, KeyRange, KeyValueList, QueryOptions, ReduceFunction,
    ViewConfig, PLACEHOLDER_VALUE,
};
pub use view::View;

pub use facetdb_storage::SequenceNumber;
