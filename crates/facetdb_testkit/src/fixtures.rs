//! Common fixtures: numbered documents and key builders.
//!
//! The numbered-document corpus mirrors the canonical view test setup:
//! documents `doc-001`, `doc-002`, … whose bodies are `{"n":1}`,
//! `{"n":2}`, … and whose map function emits `[n]` as the key.

use crate::doc_store::DocStore;
use facetdb_collatable::{Collatable, CollatableBuilder};
use std::ops::RangeInclusive;

/// Formats the ID of the `i`th numbered document: `doc-001`, `doc-002`, …
#[must_use]
pub fn numbered_doc_id(i: u32) -> String {
    format!("doc-{i:03}")
}

/// Body of a numbered document: `{"n":<i>}`.
#[must_use]
pub fn numbered_body(i: u32) -> Vec<u8> {
    format!("{{\"n\":{i}}}").into_bytes()
}

/// Extracts the `n` field from a numbered-document body.
#[must_use]
pub fn numbered_doc_value(body: &[u8]) -> Option<f64> {
    let text = std::str::from_utf8(body).ok()?;
    let rest = text.strip_prefix("{\"n\":")?;
    let digits = rest.strip_suffix('}')?;
    digits.parse().ok()
}

/// Fills a store with numbered documents of the given type.
pub fn populate_numbered_docs(
    store: &DocStore,
    range: RangeInclusive<u32>,
    doc_type: Option<&str>,
) {
    for i in range {
        store.put(&numbered_doc_id(i), doc_type, &numbered_body(i));
    }
}

/// A key holding one number.
#[must_use]
pub fn number_key(n: f64) -> Collatable {
    let mut b = CollatableBuilder::new();
    b.add_number(n).expect("finite number");
    b.build()
}

/// A key holding a one-element array `[n]`, the shape emitted by the
/// numbered-document map function.
#[must_use]
pub fn number_array_key(n: f64) -> Collatable {
    let mut b = CollatableBuilder::new();
    b.begin_array();
    b.add_number(n).expect("finite number");
    b.end_array();
    b.build()
}

/// A key holding `[s, n]`, the shape used by grouped-reduce scenarios.
#[must_use]
pub fn string_number_key(s: &str, n: f64) -> Collatable {
    let mut b = CollatableBuilder::new();
    b.begin_array();
    b.add_string(s).expect("NUL-free string");
    b.add_number(n).expect("finite number");
    b.end_array();
    b.build()
}
