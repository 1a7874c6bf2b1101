//! # FacetDB Testkit
//!
//! Shared test utilities for FacetDB.
//!
//! This crate provides:
//! - An in-memory [`DocStore`] implementing the document-source contract
//! - Numbered-document fixtures and key builders
//! - Property-based generators over the JSON-shaped value space, with an
//!   independent order model
//! - Golden byte vectors pinning the collatable format

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod doc_store;
pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use doc_store::DocStore;
pub use fixtures::{
    number_array_key, number_key, numbered_body, numbered_doc_id, numbered_doc_value,
    populate_numbered_docs, string_number_key,
};
pub use generators::{cmp_values, decode_value, encode_value, value_strategy, TestValue};
pub use vectors::golden_vectors;
