//! String collation tables.
//!
//! Encoded strings do not store their raw bytes: every byte is remapped
//! through a priority table so that a plain byte comparison of two encoded
//! strings yields the desired collation. The table sorts tab, newline,
//! carriage return, and space first, then punctuation, then digits, then
//! ASCII letters case-insensitively (each lowercase letter immediately
//! before its uppercase partner). All remaining byte values, the other
//! control characters included, follow in ascending byte order.
//!
//! The table is part of the persistent index format. Changing it changes
//! the meaning of every stored key, so any revision requires a view
//! version bump that rebuilds indexes.

/// Collation order for the explicitly ranked characters. Everything not
/// listed here sorts after, in ascending byte order. 0x00 is reserved as
/// the string terminator and never appears in encoded string bodies.
const SORT_ORDER: &[u8] =
    b"\t\n\r `^_-,;:!?.'\"()[]{}@*/\\&#%+<=>|~$0123456789aAbBcCdDeEfFgGhHiIjJkKlLmMnNoOpPqQrRsStTuUvVwWxXyYzZ";

const fn build_priority_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut next: u16 = 1;
    let mut i = 0;
    while i < SORT_ORDER.len() {
        table[SORT_ORDER[i] as usize] = next as u8;
        next += 1;
        i += 1;
    }
    let mut b = 1usize;
    while b < 256 {
        if table[b] == 0 {
            table[b] = next as u8;
            next += 1;
        }
        b += 1;
    }
    table
}

const fn build_inverse_table(priority: &[u8; 256]) -> [u8; 256] {
    let mut inverse = [0u8; 256];
    let mut b = 1usize;
    while b < 256 {
        inverse[priority[b] as usize] = b as u8;
        b += 1;
    }
    inverse
}

/// Maps a raw byte to its collation priority (1..=255). Index 0 is unused;
/// NUL has no priority because it terminates the encoded string.
pub(crate) const CHAR_PRIORITY: [u8; 256] = build_priority_table();

/// Maps a collation priority back to the raw byte it encodes.
pub(crate) const CHAR_INVERSE: [u8; 256] = build_inverse_table(&CHAR_PRIORITY);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_are_a_bijection_on_non_nul_bytes() {
        let mut seen = [false; 256];
        for b in 1..=255u8 {
            let p = CHAR_PRIORITY[b as usize];
            assert_ne!(p, 0, "byte {b:#04x} has no priority");
            assert!(!seen[p as usize], "priority {p} assigned twice");
            seen[p as usize] = true;
            assert_eq!(CHAR_INVERSE[p as usize], b);
        }
        assert_eq!(CHAR_PRIORITY[0], 0);
    }

    #[test]
    fn letters_collate_case_insensitively() {
        // 'a' < 'A' < 'b' < 'B' < ... < 'z' < 'Z'
        for c in b'a'..b'z' {
            let lower = CHAR_PRIORITY[c as usize];
            let upper = CHAR_PRIORITY[c.to_ascii_uppercase() as usize];
            let next_lower = CHAR_PRIORITY[(c + 1) as usize];
            assert_eq!(upper, lower + 1);
            assert!(next_lower > upper);
        }
    }

    #[test]
    fn digits_sort_before_letters() {
        assert!(CHAR_PRIORITY[b'9' as usize] < CHAR_PRIORITY[b'a' as usize]);
        assert!(CHAR_PRIORITY[b'0' as usize] < CHAR_PRIORITY[b'9' as usize]);
    }

    #[test]
    fn space_sorts_before_punctuation_and_digits() {
        assert!(CHAR_PRIORITY[b' ' as usize] < CHAR_PRIORITY[b'!' as usize]);
        assert!(CHAR_PRIORITY[b' ' as usize] < CHAR_PRIORITY[b'0' as usize]);
    }
}
