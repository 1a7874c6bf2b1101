//! Benchmark utilities for FacetDB.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use facetdb_collatable::{Collatable, CollatableBuilder};

/// Builds the key `[city, temperature]`, a typical composite index key.
#[must_use]
pub fn composite_key(city: &str, temperature: f64) -> Collatable {
    let mut b = CollatableBuilder::new();
    b.begin_array();
    b.add_string(city).expect("NUL-free string");
    b.add_number(temperature).expect("finite number");
    b.end_array();
    b.build()
}

/// Builds a nested map value of the given depth and width.
#[must_use]
pub fn nested_value(depth: usize, width: usize) -> Collatable {
    fn fill(b: &mut CollatableBuilder, depth: usize, width: usize) {
        if depth == 0 {
            b.add_string("leaf").expect("NUL-free string");
            return;
        }
        b.begin_map();
        for i in 0..width {
            b.add_map_key(&format!("key_{i}")).expect("NUL-free key");
            fill(b, depth - 1, width);
        }
        b.end_map();
    }
    let mut b = CollatableBuilder::new();
    fill(&mut b, depth, width);
    b.build()
}
