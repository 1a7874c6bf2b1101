//! Collatable value builder.

use crate::collation::CHAR_PRIORITY;
use crate::error::{CollatableError, CollatableResult};
use crate::reader::CollatableReader;
use crate::Tag;

const SIGN_BIT: u64 = 1 << 63;

/// Maps an f64 to a u64 whose unsigned order equals numeric order.
///
/// Negative numbers have their IEEE-754 bits inverted; non-negative numbers
/// get the sign bit set. The caller must normalize -0.0 and reject NaN.
pub(crate) fn order_map(n: f64) -> u64 {
    let bits = n.to_bits();
    if bits & SIGN_BIT != 0 {
        !bits
    } else {
        bits | SIGN_BIT
    }
}

/// Inverse of [`order_map`].
pub(crate) fn order_unmap(mapped: u64) -> f64 {
    if mapped & SIGN_BIT != 0 {
        f64::from_bits(mapped & !SIGN_BIT)
    } else {
        f64::from_bits(!mapped)
    }
}

/// Number of digit bytes in an encoded number.
pub(crate) const NUMBER_DIGITS: usize = 9;

/// Writes the order-mapped bits as nine base-255 digits, each offset by one
/// so that no digit byte is 0x00. Fixed width keeps byte order equal to
/// numeric order.
pub(crate) fn write_number_digits(buf: &mut Vec<u8>, mut mapped: u64) {
    let mut digits = [0u8; NUMBER_DIGITS];
    for slot in digits.iter_mut().rev() {
        *slot = (mapped % 255) as u8 + 1;
        mapped /= 255;
    }
    buf.extend_from_slice(&digits);
}

/// Reads nine digit bytes back into the order-mapped bits.
pub(crate) fn read_number_digits(digits: &[u8]) -> CollatableResult<u64> {
    debug_assert_eq!(digits.len(), NUMBER_DIGITS);
    let mut mapped: u64 = 0;
    for &d in digits {
        if d == 0 {
            return Err(CollatableError::InvalidNumber);
        }
        mapped = mapped
            .checked_mul(255)
            .and_then(|m| m.checked_add(u64::from(d - 1)))
            .ok_or(CollatableError::InvalidNumber)?;
    }
    Ok(mapped)
}

/// An owned, fully built collatable value.
///
/// The defined order on collatable values is plain byte comparison of the
/// encoded form, so `Ord` derives directly from the underlying bytes and no
/// separate comparator exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Collatable(Vec<u8>);

impl Collatable {
    /// Wraps bytes previously produced by a [`CollatableBuilder`] (e.g.
    /// read back from storage). The bytes are not validated here; readers
    /// report corruption when the value is consumed.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the value, returning the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Returns the encoded length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the value is empty (contains no encoded data).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a reader positioned at the start of the value.
    #[must_use]
    pub fn reader(&self) -> CollatableReader<'_> {
        CollatableReader::new(&self.0)
    }

    /// Renders the value as JSON for diagnostics.
    pub fn to_json(&self) -> CollatableResult<String> {
        self.reader().to_json()
    }
}

impl AsRef<[u8]> for Collatable {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Tracks one open container while building.
#[derive(Debug)]
enum Scope {
    Array,
    Map { awaiting_value: bool },
}

/// Builds a collatable value incrementally.
///
/// Values are appended in order; arrays and maps are bracketed with
/// `begin_*`/`end_*` calls, and map entries alternate `add_map_key` with a
/// value. Misnesting (an `end` without a `begin`, a map value without a
/// key, or extraction with open containers) is a programming fault and
/// panics; data-dependent failures (NaN, embedded NUL) are reported as
/// errors.
///
/// # Example
///
/// ```
/// use facetdb_collatable::CollatableBuilder;
///
/// let mut b = CollatableBuilder::new();
/// b.begin_array();
/// b.add_string("city").unwrap();
/// b.add_number(7.0).unwrap();
/// b.end_array();
/// let key = b.build();
/// assert!(!key.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct CollatableBuilder {
    buf: Vec<u8>,
    open: Vec<Scope>,
}

impl CollatableBuilder {
    /// Creates a new empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder with the given buffer capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            open: Vec::new(),
        }
    }

    /// Current encoded size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns the bytes encoded so far.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    /// Clears the builder for reuse, keeping its allocation.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.open.clear();
    }

    /// Appends a null value.
    pub fn add_null(&mut self) -> &mut Self {
        self.note_value();
        self.buf.push(Tag::Null as u8);
        self
    }

    /// Appends a boolean value.
    pub fn add_bool(&mut self, value: bool) -> &mut Self {
        self.note_value();
        self.buf
            .push(if value { Tag::True as u8 } else { Tag::False as u8 });
        self
    }

    /// Appends a number.
    ///
    /// -0.0 is normalized to +0.0 so the two equal values share one
    /// encoding. Infinities encode at the extremes of their tag.
    ///
    /// # Errors
    ///
    /// Returns [`CollatableError::NanForbidden`] for NaN, which has no
    /// place in the total order.
    pub fn add_number(&mut self, n: f64) -> CollatableResult<&mut Self> {
        if n.is_nan() {
            return Err(CollatableError::NanForbidden);
        }
        let n = if n == 0.0 { 0.0 } else { n };
        self.note_value();
        self.buf.push(if n < 0.0 {
            Tag::NegativeNumber as u8
        } else {
            Tag::PositiveNumber as u8
        });
        write_number_digits(&mut self.buf, order_map(n));
        Ok(self)
    }

    /// Appends a UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns [`CollatableError::StringContainsNul`] if the string
    /// contains U+0000; 0x00 is the encoded string terminator.
    pub fn add_string(&mut self, s: &str) -> CollatableResult<&mut Self> {
        if s.as_bytes().contains(&0) {
            return Err(CollatableError::StringContainsNul);
        }
        self.note_value();
        self.buf.push(Tag::String as u8);
        self.push_string_body(s);
        Ok(self)
    }

    /// Opens an array. Must be matched by [`Self::end_array`].
    pub fn begin_array(&mut self) -> &mut Self {
        self.note_value();
        self.buf.push(Tag::Array as u8);
        self.open.push(Scope::Array);
        self
    }

    /// Closes the innermost open array.
    pub fn end_array(&mut self) -> &mut Self {
        match self.open.pop() {
            Some(Scope::Array) => {}
            other => panic!("end_array without matching begin_array (open: {other:?})"),
        }
        self.buf.push(Tag::EndSequence as u8);
        self
    }

    /// Opens a map. Must be matched by [`Self::end_map`]; entries alternate
    /// [`Self::add_map_key`] and a value.
    pub fn begin_map(&mut self) -> &mut Self {
        self.note_value();
        self.open.push(Scope::Map {
            awaiting_value: false,
        });
        self.buf.push(Tag::Map as u8);
        self
    }

    /// Closes the innermost open map.
    pub fn end_map(&mut self) -> &mut Self {
        match self.open.pop() {
            Some(Scope::Map { awaiting_value }) => {
                assert!(!awaiting_value, "end_map with a key awaiting its value");
            }
            other => panic!("end_map without matching begin_map (open: {other:?})"),
        }
        self.buf.push(Tag::EndSequence as u8);
        self
    }

    /// Adds a map key. Every value inside a map must be preceded by one.
    ///
    /// # Errors
    ///
    /// Returns [`CollatableError::StringContainsNul`] if the key contains
    /// U+0000.
    pub fn add_map_key(&mut self, key: &str) -> CollatableResult<&mut Self> {
        if key.as_bytes().contains(&0) {
            return Err(CollatableError::StringContainsNul);
        }
        match self.open.last_mut() {
            Some(Scope::Map { awaiting_value }) => {
                assert!(!*awaiting_value, "add_map_key while a value is expected");
                *awaiting_value = true;
            }
            _ => panic!("add_map_key outside of a map"),
        }
        self.buf.push(Tag::String as u8);
        self.push_string_body(key);
        Ok(self)
    }

    /// Appends the special placeholder value that stands for the entire
    /// source document. Only meaningful in values, never in keys.
    pub fn add_special(&mut self) -> &mut Self {
        self.note_value();
        self.buf.push(Tag::Special as u8);
        self
    }

    /// Appends bytes that are already in collatable form, e.g. a key read
    /// back from the index or produced by another builder.
    pub fn add_encoded(&mut self, data: &[u8]) -> &mut Self {
        self.note_value();
        self.buf.extend_from_slice(data);
        self
    }

    /// Consumes the builder and returns the finished value.
    ///
    /// # Panics
    ///
    /// Panics if any `begin_array`/`begin_map` has not been matched by its
    /// `end`; that is a programming fault, not a data error.
    #[must_use]
    pub fn build(self) -> Collatable {
        assert!(
            self.open.is_empty(),
            "collatable extracted with {} unclosed container(s)",
            self.open.len()
        );
        Collatable(self.buf)
    }

    fn push_string_body(&mut self, s: &str) {
        self.buf.reserve(s.len() + 1);
        for &b in s.as_bytes() {
            self.buf.push(CHAR_PRIORITY[b as usize]);
        }
        self.buf.push(0);
    }

    /// Records that a value is being appended in the current scope,
    /// enforcing key/value alternation inside maps.
    fn note_value(&mut self) {
        if let Some(Scope::Map { awaiting_value }) = self.open.last_mut() {
            assert!(
                *awaiting_value,
                "map value without a preceding add_map_key"
            );
            *awaiting_value = false;
        }
    }
}

impl From<CollatableBuilder> for Collatable {
    fn from(builder: CollatableBuilder) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(n: f64) -> Collatable {
        let mut b = CollatableBuilder::new();
        b.add_number(n).unwrap();
        b.build()
    }

    fn string(s: &str) -> Collatable {
        let mut b = CollatableBuilder::new();
        b.add_string(s).unwrap();
        b.build()
    }

    #[test]
    fn scalar_tags_order() {
        let mut null = CollatableBuilder::new();
        null.add_null();
        let mut f = CollatableBuilder::new();
        f.add_bool(false);
        let mut t = CollatableBuilder::new();
        t.add_bool(true);

        let null = null.build();
        let f = f.build();
        let t = t.build();
        assert!(null < f);
        assert!(f < t);
        assert!(t < number(-1000.0));
        assert!(number(-1000.0) < number(0.0));
        assert!(number(1e100) < string(""));
    }

    #[test]
    fn numbers_collate_numerically() {
        let samples = [
            f64::NEG_INFINITY,
            -1e308,
            -123456.789,
            -2.0,
            -1.5,
            -1.0,
            -0.5,
            -f64::MIN_POSITIVE,
            0.0,
            f64::MIN_POSITIVE,
            0.5,
            1.0,
            1.5,
            2.0,
            123456.789,
            1e308,
            f64::INFINITY,
        ];
        for pair in samples.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert!(
                number(a) < number(b),
                "encode({a}) should sort below encode({b})"
            );
        }
    }

    #[test]
    fn negative_zero_encodes_as_zero() {
        assert_eq!(number(-0.0), number(0.0));
    }

    #[test]
    fn nan_is_rejected() {
        let mut b = CollatableBuilder::new();
        assert_eq!(
            b.add_number(f64::NAN).unwrap_err(),
            CollatableError::NanForbidden
        );
    }

    #[test]
    fn number_digits_are_zero_free() {
        for n in [-1.0, 0.0, 1.0, f64::INFINITY, f64::NEG_INFINITY, 3.14] {
            let enc = number(n);
            assert!(
                !enc.as_bytes()[1..].contains(&0),
                "digits of {n} contain 0x00"
            );
        }
    }

    #[test]
    fn strings_collate_case_insensitively() {
        assert!(string("apple") < string("Apple"));
        assert!(string("Apple") < string("applesauce"));
        assert!(string("applesauce") < string("BANANA"));
        assert!(string("1st") < string("second"));
    }

    #[test]
    fn string_prefix_sorts_first() {
        assert!(string("") < string("a"));
        assert!(string("ab") < string("abc"));
    }

    #[test]
    fn string_with_nul_is_rejected() {
        let mut b = CollatableBuilder::new();
        assert_eq!(
            b.add_string("a\0b").unwrap_err(),
            CollatableError::StringContainsNul
        );
    }

    #[test]
    fn empty_array_sorts_before_nonempty() {
        let mut empty = CollatableBuilder::new();
        empty.begin_array();
        empty.end_array();

        let mut one = CollatableBuilder::new();
        one.begin_array();
        one.add_number(1.0).unwrap();
        one.end_array();

        assert!(empty.build() < one.build());
    }

    #[test]
    fn prefix_array_sorts_before_extension() {
        let mut short = CollatableBuilder::new();
        short.begin_array();
        short.add_number(1.0).unwrap();
        short.end_array();

        let mut long = CollatableBuilder::new();
        long.begin_array();
        long.add_number(1.0).unwrap();
        long.add_number(0.0).unwrap();
        long.end_array();

        assert!(short.build() < long.build());
    }

    #[test]
    fn arrays_compare_elementwise() {
        let mut a = CollatableBuilder::new();
        a.begin_array();
        a.add_string("a").unwrap();
        a.add_number(2.0).unwrap();
        a.end_array();

        let mut b = CollatableBuilder::new();
        b.begin_array();
        b.add_string("b").unwrap();
        b.add_number(1.0).unwrap();
        b.end_array();

        assert!(a.build() < b.build());
    }

    #[test]
    #[should_panic(expected = "unclosed container")]
    fn build_with_open_array_panics() {
        let mut b = CollatableBuilder::new();
        b.begin_array();
        let _ = b.build();
    }

    #[test]
    #[should_panic(expected = "without matching begin_array")]
    fn end_array_without_begin_panics() {
        let mut b = CollatableBuilder::new();
        b.end_array();
    }

    #[test]
    #[should_panic(expected = "key awaiting its value")]
    fn end_map_with_dangling_key_panics() {
        let mut b = CollatableBuilder::new();
        b.begin_map();
        b.add_map_key("k").unwrap();
        b.end_map();
    }

    #[test]
    fn reset_allows_reuse() {
        let mut b = CollatableBuilder::new();
        b.add_number(1.0).unwrap();
        let first = b.data().to_vec();
        b.reset();
        assert!(b.is_empty());
        b.add_number(1.0).unwrap();
        assert_eq!(b.data(), &first[..]);
    }
}
