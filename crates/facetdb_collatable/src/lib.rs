//! # FacetDB Collatable
//!
//! Byte-ordered binary encoding for JSON-shaped values.
//!
//! A *collatable* is a binary string whose lexicographic byte order equals
//! the defined total order on JSON-shaped values. That property lets a
//! key/value store sort composite index keys with a plain `memcmp`; no
//! custom comparator is ever installed, and none is permitted.
//!
//! The total order, ascending: null, false, true, numbers (numerically),
//! strings (case-insensitive ASCII collation), arrays (element-wise, with a
//! prefix sorting before its extension), maps. A distinguished *special*
//! value is a placeholder for an entire source document and only appears in
//! stored values, never in keys.
//!
//! ## Format stability
//!
//! The encoding is a persistent storage format. Any change to the tag
//! assignments, the number digit scheme, or the string collation table is a
//! format break and requires a version bump that rebuilds every index built
//! on it.
//!
//! ## Usage
//!
//! ```
//! use facetdb_collatable::{CollatableBuilder, Tag};
//!
//! let mut b = CollatableBuilder::new();
//! b.begin_array();
//! b.add_string("Rust").unwrap();
//! b.add_number(2.0).unwrap();
//! b.end_array();
//! let key = b.build();
//!
//! let mut r = key.reader();
//! assert_eq!(r.peek_tag(), Tag::Array);
//! r.begin_array().unwrap();
//! assert_eq!(r.read_string().unwrap(), "Rust");
//! assert_eq!(r.read_number().unwrap(), 2.0);
//! r.end_array().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod collation;
mod error;
mod reader;

pub use builder::{Collatable, CollatableBuilder};
pub use error::{CollatableError, CollatableResult};
pub use reader::CollatableReader;

/// Tag byte leading every encoded value.
///
/// Tag values are ascending in the defined value order, so the tag itself
/// is the first key of the comparison. `EndSequence` terminates arrays and
/// maps; `Error` is only ever returned from [`CollatableReader::peek_tag`]
/// and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Tag {
    /// Terminates an array or map.
    EndSequence = 0,
    /// JSON null.
    Null = 1,
    /// JSON false.
    False = 2,
    /// JSON true.
    True = 3,
    /// A number below zero.
    NegativeNumber = 4,
    /// A number at or above zero.
    PositiveNumber = 5,
    /// A UTF-8 string.
    String = 6,
    /// An array of values.
    Array = 7,
    /// A map of string keys to values.
    Map = 8,
    /// Placeholder for the entire source document (values only).
    Special = 9,
    /// Returned when peeking at malformed data or the end of input.
    /// Never stored.
    Error = 255,
}

impl Tag {
    /// Human-readable name for diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Tag::EndSequence => "end-sequence",
            Tag::Null => "null",
            Tag::False => "false",
            Tag::True => "true",
            Tag::NegativeNumber | Tag::PositiveNumber => "number",
            Tag::String => "string",
            Tag::Array => "array",
            Tag::Map => "map",
            Tag::Special => "special",
            Tag::Error => "error",
        }
    }
}

impl TryFrom<u8> for Tag {
    type Error = CollatableError;

    fn try_from(byte: u8) -> Result<Self, CollatableError> {
        match byte {
            0 => Ok(Tag::EndSequence),
            1 => Ok(Tag::Null),
            2 => Ok(Tag::False),
            3 => Ok(Tag::True),
            4 => Ok(Tag::NegativeNumber),
            5 => Ok(Tag::PositiveNumber),
            6 => Ok(Tag::String),
            7 => Ok(Tag::Array),
            8 => Ok(Tag::Map),
            9 => Ok(Tag::Special),
            _ => Err(CollatableError::InvalidTag { byte }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_bytes_are_stable() {
        // Persistent format: these numbers must never change.
        assert_eq!(Tag::EndSequence as u8, 0);
        assert_eq!(Tag::Null as u8, 1);
        assert_eq!(Tag::False as u8, 2);
        assert_eq!(Tag::True as u8, 3);
        assert_eq!(Tag::NegativeNumber as u8, 4);
        assert_eq!(Tag::PositiveNumber as u8, 5);
        assert_eq!(Tag::String as u8, 6);
        assert_eq!(Tag::Array as u8, 7);
        assert_eq!(Tag::Map as u8, 8);
        assert_eq!(Tag::Special as u8, 9);
    }

    #[test]
    fn unknown_tag_byte_is_rejected() {
        assert!(Tag::try_from(10).is_err());
        assert!(Tag::try_from(255).is_err());
    }
}
