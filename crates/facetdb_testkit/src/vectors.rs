//! Golden byte vectors for the collatable format.
//!
//! The collatable encoding is a persistent storage format: indexes built
//! with one release must decode under the next. These vectors pin the
//! exact bytes; if one of them changes, the format changed and every
//! stored index is invalid without a version bump.

use facetdb_collatable::{Collatable, CollatableBuilder};

/// Returns `(name, encoded, expected)` triples covering every tag.
#[must_use]
pub fn golden_vectors() -> Vec<(&'static str, Collatable, Vec<u8>)> {
    let mut vectors: Vec<(&'static str, Collatable, Vec<u8>)> = Vec::new();

    let mut b = CollatableBuilder::new();
    b.add_null();
    vectors.push(("null", b.build(), vec![0x01]));

    let mut b = CollatableBuilder::new();
    b.add_bool(false);
    vectors.push(("false", b.build(), vec![0x02]));

    let mut b = CollatableBuilder::new();
    b.add_bool(true);
    vectors.push(("true", b.build(), vec![0x03]));

    let mut b = CollatableBuilder::new();
    b.add_number(-1.0).expect("finite");
    vectors.push((
        "number -1",
        b.build(),
        vec![0x04, 1, 66, 215, 175, 196, 17, 57, 35, 80],
    ));

    let mut b = CollatableBuilder::new();
    b.add_number(0.0).expect("finite");
    vectors.push((
        "number 0",
        b.build(),
        vec![0x05, 1, 132, 142, 156, 163, 156, 142, 132, 129],
    ));

    let mut b = CollatableBuilder::new();
    b.add_number(1.0).expect("finite");
    vectors.push((
        "number 1",
        b.build(),
        vec![0x05, 1, 198, 69, 137, 131, 40, 227, 229, 177],
    ));

    let mut b = CollatableBuilder::new();
    b.add_string("").expect("NUL-free");
    vectors.push(("empty string", b.build(), vec![0x06, 0x00]));

    let mut b = CollatableBuilder::new();
    b.add_string("ab").expect("NUL-free");
    vectors.push(("string 'ab'", b.build(), vec![0x06, 47, 49, 0x00]));

    let mut b = CollatableBuilder::new();
    b.add_string("doc").expect("NUL-free");
    vectors.push(("string 'doc'", b.build(), vec![0x06, 53, 75, 51, 0x00]));

    let mut b = CollatableBuilder::new();
    b.begin_array();
    b.end_array();
    vectors.push(("empty array", b.build(), vec![0x07, 0x00]));

    let mut b = CollatableBuilder::new();
    b.begin_map();
    b.end_map();
    vectors.push(("empty map", b.build(), vec![0x08, 0x00]));

    let mut b = CollatableBuilder::new();
    b.add_special();
    vectors.push(("special", b.build(), vec![0x09]));

    let mut b = CollatableBuilder::new();
    b.begin_array();
    b.add_string("a").expect("NUL-free");
    b.add_number(1.0).expect("finite");
    b.end_array();
    vectors.push((
        "array ['a', 1]",
        b.build(),
        vec![
            0x07, 0x06, 47, 0x00, 0x05, 1, 198, 69, 137, 131, 40, 227, 229, 177, 0x00,
        ],
    ));

    vectors
}
