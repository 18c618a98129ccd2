//! Error fingerprinting for grouping repeated errors.
//!
//! The fingerprint is a 32-bit rolling hash (`hash * 31 + unit`, wrapping)
//! over the leading UTF-16 code units of the stack, or of the message when no
//! stack is available, rendered in base 36. It is cheap and non-cryptographic:
//! a collision only merges two reports in the buffer.

use crate::config::DEFAULT_FINGERPRINT_CHARS;

/// Computes fingerprints over a bounded prefix of the input.
#[derive(Debug, Clone, Copy)]
pub struct Fingerprinter {
    max_units: usize,
}

impl Fingerprinter {
    /// Fingerprinter hashing the default 200-unit prefix.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_units: DEFAULT_FINGERPRINT_CHARS,
        }
    }

    /// Fingerprinter hashing a custom prefix length.
    #[must_use]
    pub const fn with_prefix(max_units: usize) -> Self {
        Self { max_units }
    }

    /// Fingerprint for a report: stack preferred, message otherwise.
    #[must_use]
    pub fn compute(&self, message: &str, stack: Option<&str>) -> String {
        let source = stack.filter(|s| !s.is_empty()).unwrap_or(message);
        self.hash(source)
    }

    /// Hash the leading code units of `source`.
    #[must_use]
    pub fn hash(&self, source: &str) -> String {
        let hash = source
            .encode_utf16()
            .take(self.max_units)
            .fold(0i32, |hash, unit| {
                hash.wrapping_shl(5)
                    .wrapping_sub(hash)
                    .wrapping_add(i32::from(unit))
            });
        to_base36(hash.unsigned_abs())
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_owned();
    }
    let mut digits = Vec::with_capacity(7);
    while value > 0 {
        digits.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.iter().rev().map(|&d| char::from(d)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_values() {
        let fp = Fingerprinter::new();
        assert_eq!(fp.hash(""), "0");
        assert_eq!(fp.hash("a"), "2p");
        assert_eq!(fp.hash("ab"), "2e9");
    }

    #[test]
    fn overflow_wraps_and_takes_magnitude() {
        let fp = Fingerprinter::new();
        let long = "TypeError: Cannot read properties of undefined (reading 'map')";
        let value = fp.hash(long);
        assert!(!value.is_empty());
        assert!(value.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert_eq!(value, fp.hash(long));
    }

    #[test]
    fn stack_preferred_over_message() {
        let fp = Fingerprinter::new();
        let with_stack = fp.compute("Boom", Some("Error: Boom\n    at checkout"));
        let without = fp.compute("Boom", None);
        assert_ne!(with_stack, without);
        assert_eq!(without, fp.hash("Boom"));
        assert_eq!(fp.compute("Boom", Some("")), without);
    }

    #[test]
    fn identical_prefix_same_fingerprint() {
        let fp = Fingerprinter::new();
        let prefix = "x".repeat(200);
        let a = format!("{prefix}first tail");
        let b = format!("{prefix}second, different tail");
        assert_eq!(fp.hash(&a), fp.hash(&b));
    }

    #[test]
    fn different_content_different_fingerprint() {
        let fp = Fingerprinter::new();
        assert_ne!(fp.hash("Payment declined"), fp.hash("Payment accepted"));
        assert_ne!(fp.hash("Boom"), fp.hash("boom"));
    }

    #[test]
    fn prefix_counts_utf16_units() {
        let fp = Fingerprinter::with_prefix(2);
        // U+1F600 is a surrogate pair: the prefix covers exactly one emoji.
        assert_eq!(fp.hash("\u{1F600}abc"), fp.hash("\u{1F600}xyz"));
        assert_ne!(fp.hash("ab"), fp.hash("a"));
    }

    #[test]
    fn base36_of_most_negative_hash() {
        assert_eq!(to_base36(i32::MIN.unsigned_abs()), "zik0zk");
    }
}
