//! Sequential reader for collatable data.

use crate::builder::{order_unmap, read_number_digits, NUMBER_DIGITS};
use crate::collation::CHAR_INVERSE;
use crate::error::{CollatableError, CollatableResult};
use crate::Tag;

/// Reads collatable data item by item. Does not own its data.
///
/// The reader is a cursor: each `read_*` call consumes one item and moves
/// forward. `begin_array`/`begin_map` consume the opening tag, after which
/// the container's items can be read until the matching `end_*`.
#[derive(Debug, Clone)]
pub struct CollatableReader<'a> {
    data: &'a [u8],
}

impl<'a> CollatableReader<'a> {
    /// Creates a reader over encoded bytes.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Returns the unread remainder of the input.
    #[must_use]
    pub fn remainder(&self) -> &'a [u8] {
        self.data
    }

    /// Returns true when all input has been consumed.
    #[must_use]
    pub fn at_end(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the tag of the next item without consuming it, or
    /// [`Tag::Error`] at the end of input or on an unrecognized byte.
    #[must_use]
    pub fn peek_tag(&self) -> Tag {
        match self.data.first() {
            Some(&byte) => Tag::try_from(byte).unwrap_or(Tag::Error),
            None => Tag::Error,
        }
    }

    /// Reads a boolean.
    pub fn read_bool(&mut self) -> CollatableResult<bool> {
        match self.peek_tag() {
            Tag::False => {
                self.data = &self.data[1..];
                Ok(false)
            }
            Tag::True => {
                self.data = &self.data[1..];
                Ok(true)
            }
            other => Err(CollatableError::type_mismatch("bool", other.name())),
        }
    }

    /// Reads a null.
    pub fn read_null(&mut self) -> CollatableResult<()> {
        self.expect_tag(Tag::Null, "null")
    }

    /// Reads a number.
    pub fn read_number(&mut self) -> CollatableResult<f64> {
        match self.peek_tag() {
            Tag::NegativeNumber | Tag::PositiveNumber => {
                if self.data.len() < 1 + NUMBER_DIGITS {
                    return Err(CollatableError::UnexpectedEof);
                }
                let mapped = read_number_digits(&self.data[1..1 + NUMBER_DIGITS])?;
                self.data = &self.data[1 + NUMBER_DIGITS..];
                Ok(order_unmap(mapped))
            }
            other => Err(CollatableError::type_mismatch("number", other.name())),
        }
    }

    /// Reads a string.
    pub fn read_string(&mut self) -> CollatableResult<String> {
        match self.peek_tag() {
            Tag::String => {}
            other => return Err(CollatableError::type_mismatch("string", other.name())),
        }
        let body = &self.data[1..];
        let terminator = body
            .iter()
            .position(|&b| b == 0)
            .ok_or(CollatableError::UnexpectedEof)?;
        let mut raw = Vec::with_capacity(terminator);
        for &b in &body[..terminator] {
            raw.push(CHAR_INVERSE[b as usize]);
        }
        self.data = &self.data[1 + terminator + 1..];
        String::from_utf8(raw).map_err(|_| CollatableError::InvalidUtf8)
    }

    /// Consumes the opening tag of an array.
    pub fn begin_array(&mut self) -> CollatableResult<()> {
        self.expect_tag(Tag::Array, "array")
    }

    /// Consumes the end-sequence that closes an array.
    pub fn end_array(&mut self) -> CollatableResult<()> {
        self.expect_tag(Tag::EndSequence, "end of array")
    }

    /// Consumes the opening tag of a map.
    pub fn begin_map(&mut self) -> CollatableResult<()> {
        self.expect_tag(Tag::Map, "map")
    }

    /// Consumes the end-sequence that closes a map.
    pub fn end_map(&mut self) -> CollatableResult<()> {
        self.expect_tag(Tag::EndSequence, "end of map")
    }

    /// Consumes the special placeholder value.
    pub fn read_special(&mut self) -> CollatableResult<()> {
        self.expect_tag(Tag::Special, "special")
    }

    /// Reads one entire value of any type, returning its encoded bytes.
    /// Containers are consumed through their end-sequence.
    pub fn read(&mut self) -> CollatableResult<&'a [u8]> {
        let len = measure_value(self.data)?;
        let (value, rest) = self.data.split_at(len);
        self.data = rest;
        Ok(value)
    }

    /// Skips one entire value of any type.
    pub fn skip_value(&mut self) -> CollatableResult<()> {
        self.read().map(|_| ())
    }

    /// Renders the next value as JSON and consumes it.
    ///
    /// This is a diagnostic dump: numbers print in shortest form,
    /// infinities as `1e999`/`-1e999`, and the special placeholder as the
    /// string `"*"`.
    pub fn to_json(&mut self) -> CollatableResult<String> {
        let mut out = String::new();
        self.write_json(&mut out)?;
        Ok(out)
    }

    fn write_json(&mut self, out: &mut String) -> CollatableResult<()> {
        use std::fmt::Write;

        match self.peek_tag() {
            Tag::Null => {
                self.read_null()?;
                out.push_str("null");
            }
            Tag::False | Tag::True => {
                let b = self.read_bool()?;
                out.push_str(if b { "true" } else { "false" });
            }
            Tag::NegativeNumber | Tag::PositiveNumber => {
                let n = self.read_number()?;
                if n == f64::INFINITY {
                    out.push_str("1e999");
                } else if n == f64::NEG_INFINITY {
                    out.push_str("-1e999");
                } else {
                    let _ = write!(out, "{n}");
                }
            }
            Tag::String => {
                let s = self.read_string()?;
                write_json_string(out, &s);
            }
            Tag::Array => {
                self.begin_array()?;
                out.push('[');
                let mut first = true;
                while self.peek_tag() != Tag::EndSequence {
                    if self.at_end() {
                        return Err(CollatableError::UnexpectedEof);
                    }
                    if !first {
                        out.push(',');
                    }
                    first = false;
                    self.write_json(out)?;
                }
                self.end_array()?;
                out.push(']');
            }
            Tag::Map => {
                self.begin_map()?;
                out.push('{');
                let mut first = true;
                while self.peek_tag() != Tag::EndSequence {
                    if self.at_end() {
                        return Err(CollatableError::UnexpectedEof);
                    }
                    if !first {
                        out.push(',');
                    }
                    first = false;
                    let key = self.read_string()?;
                    write_json_string(out, &key);
                    out.push(':');
                    self.write_json(out)?;
                }
                self.end_map()?;
                out.push('}');
            }
            Tag::Special => {
                self.read_special()?;
                out.push_str("\"*\"");
            }
            Tag::EndSequence => {
                return Err(CollatableError::unmatched_boundary(
                    "end-sequence with no open container",
                ));
            }
            Tag::Error => {
                return match self.data.first() {
                    Some(&byte) => Err(CollatableError::InvalidTag { byte }),
                    None => Err(CollatableError::UnexpectedEof),
                };
            }
        }
        Ok(())
    }

    fn expect_tag(&mut self, tag: Tag, expected: &'static str) -> CollatableResult<()> {
        let found = self.peek_tag();
        if found == tag {
            self.data = &self.data[1..];
            Ok(())
        } else if found == Tag::Error && self.data.is_empty() {
            Err(CollatableError::UnexpectedEof)
        } else {
            Err(CollatableError::type_mismatch(expected, found.name()))
        }
    }
}

/// Returns the encoded length of the value starting at `data[0]`.
fn measure_value(data: &[u8]) -> CollatableResult<usize> {
    let Some(&first) = data.first() else {
        return Err(CollatableError::UnexpectedEof);
    };
    match Tag::try_from(first) {
        Ok(Tag::Null | Tag::False | Tag::True | Tag::Special) => Ok(1),
        Ok(Tag::NegativeNumber | Tag::PositiveNumber) => {
            if data.len() < 1 + NUMBER_DIGITS {
                Err(CollatableError::UnexpectedEof)
            } else {
                Ok(1 + NUMBER_DIGITS)
            }
        }
        Ok(Tag::String) => match data[1..].iter().position(|&b| b == 0) {
            Some(terminator) => Ok(1 + terminator + 1),
            None => Err(CollatableError::UnexpectedEof),
        },
        Ok(Tag::Array | Tag::Map) => {
            let mut pos = 1;
            loop {
                match data.get(pos) {
                    None => return Err(CollatableError::UnexpectedEof),
                    Some(0) => return Ok(pos + 1),
                    Some(_) => pos += measure_value(&data[pos..])?,
                }
            }
        }
        Ok(Tag::EndSequence) => Err(CollatableError::unmatched_boundary(
            "end-sequence with no open container",
        )),
        _ => Err(CollatableError::InvalidTag { byte: first }),
    }
}

fn write_json_string(out: &mut String, s: &str) {
    use std::fmt::Write;

    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
