//! Fixed-capacity strings for wire fields.
//!
//! Fast-path frames carry ASCII fields of fixed width. Rather than copying
//! with implicit truncation, callers pick a policy at construction time:
//! [`BoundedStr::truncating`] cuts to fit and reports it, while
//! [`BoundedStr::try_from_str`] refuses oversized input.

use std::fmt;
use std::ops::Deref;

use thiserror::Error;

/// Input did not fit into a bounded string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("value of {len} bytes exceeds capacity {capacity}")]
pub struct CapacityError {
    pub len: usize,
    pub capacity: usize,
}

/// A string of at most `N` bytes, stored inline.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct BoundedStr<const N: usize> {
    inner: heapless::String<N>,
}

/// Hash field of fast-path requests and responses.
pub type HashField = BoundedStr<{ crate::protocol_constants::FAST_HASH_FIELD_LEN }>;

/// Zone id field of fast-path requests and commands.
pub type ZoneField = BoundedStr<{ crate::protocol_constants::FAST_ZONE_FIELD_LEN }>;

impl<const N: usize> BoundedStr<N> {
    pub const CAPACITY: usize = N;

    pub fn new() -> Self {
        Self {
            inner: heapless::String::new(),
        }
    }

    /// Copies as much of `value` as fits, cutting at a char boundary.
    ///
    /// Returns the bounded string and whether anything was dropped.
    pub fn truncating(value: &str) -> (Self, bool) {
        let mut out = Self::new();
        let mut truncated = false;
        for ch in value.chars() {
            if out.inner.push(ch).is_err() {
                truncated = true;
                break;
            }
        }
        (out, truncated)
    }

    /// Copies `value`, failing if it does not fit.
    pub fn try_from_str(value: &str) -> Result<Self, CapacityError> {
        let mut out = Self::new();
        out.inner.push_str(value).map_err(|_| CapacityError {
            len: value.len(),
            capacity: N,
        })?;
        Ok(out)
    }

    /// Reads a NUL-padded field.
    ///
    /// Stops at the first NUL byte. Bytes after the longest valid UTF-8
    /// prefix are dropped.
    pub fn from_padded(field: &[u8]) -> Self {
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        let bytes = &field[..end.min(N)];
        let text = match std::str::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                // valid_up_to() is always a char boundary
                std::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default()
            }
        };
        Self::truncating(text).0
    }

    /// Writes the string into `field`, zero-filling the remainder.
    ///
    /// `field` is expected to be exactly `N` bytes wide; a shorter slice
    /// receives a prefix.
    pub fn write_padded(&self, field: &mut [u8]) {
        field.fill(0);
        let bytes = self.inner.as_bytes();
        let len = bytes.len().min(field.len());
        field[..len].copy_from_slice(&bytes[..len]);
    }

    pub fn as_str(&self) -> &str {
        self.inner.as_str()
    }
}

impl<const N: usize> Deref for BoundedStr<N> {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl<const N: usize> fmt::Debug for BoundedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<const N: usize> fmt::Display for BoundedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<const N: usize> PartialEq<str> for BoundedStr<N> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl<const N: usize> PartialEq<&str> for BoundedStr<N> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncating_reports_dropped_input() {
        let (value, truncated) = BoundedStr::<4>::truncating("abcdef");
        assert_eq!(value, "abcd");
        assert!(truncated);

        let (value, truncated) = BoundedStr::<4>::truncating("ab");
        assert_eq!(value, "ab");
        assert!(!truncated);
    }

    #[test]
    fn truncating_respects_char_boundaries() {
        // "é" is two bytes; the third byte slot cannot hold half of it
        let (value, truncated) = BoundedStr::<3>::truncating("aéé");
        assert_eq!(value, "aé");
        assert!(truncated);
    }

    #[test]
    fn try_from_str_rejects_oversized() {
        let err = BoundedStr::<2>::try_from_str("abc").unwrap_err();
        assert_eq!(err.len, 3);
        assert_eq!(err.capacity, 2);
        assert!(BoundedStr::<3>::try_from_str("abc").is_ok());
    }

    #[test]
    fn padded_field_stops_at_nul() {
        let field = *b"zone-1\0\0garbage\0";
        let value = BoundedStr::<16>::from_padded(&field);
        assert_eq!(value, "zone-1");
    }

    #[test]
    fn padded_field_drops_invalid_utf8_tail() {
        let field = [b'o', b'k', 0xFF, b'x'];
        let value = BoundedStr::<4>::from_padded(&field);
        assert_eq!(value, "ok");
    }

    #[test]
    fn write_padded_zero_fills() {
        let value = BoundedStr::<8>::try_from_str("ab").unwrap();
        let mut field = [0xAAu8; 8];
        value.write_padded(&mut field);
        assert_eq!(&field, b"ab\0\0\0\0\0\0");
    }
}
