// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Chunk codec for size-bounded stores.
//!
//! The platform cloud storage rejects values longer than a fixed number of
//! characters. Oversized values are split into an ordered run of fragments
//! and reassembled on read.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use finance_sync::chunking::{split, join};
//!
//! let fragments = split("abcdefg", 3);
//! assert_eq!(fragments, vec!["abc", "def", "g"]);
//!
//! let indexed: HashMap<usize, String> = fragments
//!     .iter()
//!     .enumerate()
//!     .map(|(i, f)| (i, f.to_string()))
//!     .collect();
//! assert_eq!(join(&indexed, 3).unwrap(), "abcdefg");
//! ```

use std::collections::HashMap;
use thiserror::Error;

/// A fragment is missing from a chunk set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("chunk set incomplete: fragment {index} of {count} missing")]
pub struct IncompleteChunkSet {
    /// First missing fragment index
    pub index: usize,
    /// Fragment count recorded in the metadata entry
    pub count: usize,
}

/// Number of characters in `s`. Limits are expressed in characters, not bytes.
#[inline]
#[must_use]
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Number of fragments `split` produces for a value of `len` characters.
#[inline]
#[must_use]
pub fn chunk_count(len: usize, limit: usize) -> usize {
    len.div_ceil(limit.max(1))
}

/// Split `serialized` into fragments of at most `limit` characters.
///
/// Fragments never cut a character in half. An empty input yields no
/// fragments, which callers treat as "no chunking needed".
#[must_use]
pub fn split(serialized: &str, limit: usize) -> Vec<&str> {
    let limit = limit.max(1);
    let mut fragments = Vec::with_capacity(chunk_count(char_len(serialized), limit));
    let mut start = 0;
    let mut chars_in_fragment = 0;

    for (offset, _) in serialized.char_indices() {
        if chars_in_fragment == limit {
            fragments.push(&serialized[start..offset]);
            start = offset;
            chars_in_fragment = 0;
        }
        chars_in_fragment += 1;
    }
    if start < serialized.len() {
        fragments.push(&serialized[start..]);
    }
    fragments
}

/// Reassemble fragments `0..count` in order.
pub fn join(fragments: &HashMap<usize, String>, count: usize) -> Result<String, IncompleteChunkSet> {
    let total: usize = fragments.values().map(String::len).sum();
    let mut out = String::with_capacity(total);
    for index in 0..count {
        match fragments.get(&index) {
            Some(fragment) => out.push_str(fragment),
            None => return Err(IncompleteChunkSet { index, count }),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexed(fragments: &[&str]) -> HashMap<usize, String> {
        fragments
            .iter()
            .enumerate()
            .map(|(i, f)| (i, (*f).to_string()))
            .collect()
    }

    #[test]
    fn test_split_empty_yields_nothing() {
        assert!(split("", 10).is_empty());
    }

    #[test]
    fn test_split_under_limit_is_single_fragment() {
        assert_eq!(split("short", 10), vec!["short"]);
    }

    #[test]
    fn test_split_exact_multiple() {
        assert_eq!(split("aabbcc", 2), vec!["aa", "bb", "cc"]);
    }

    #[test]
    fn test_split_counts_characters_not_bytes() {
        // Cyrillic letters are two bytes each in UTF-8
        let value = "привет";
        let fragments = split(value, 4);
        assert_eq!(fragments, vec!["прив", "ет"]);
        assert_eq!(fragments.concat(), value);
    }

    #[test]
    fn test_split_zero_limit_treated_as_one() {
        assert_eq!(split("abc", 0), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_chunk_count() {
        assert_eq!(chunk_count(0, 4000), 0);
        assert_eq!(chunk_count(4000, 4000), 1);
        assert_eq!(chunk_count(4001, 4000), 2);
        assert_eq!(chunk_count(10_000, 4000), 3);
    }

    #[test]
    fn test_join_in_order() {
        let map = indexed(&["one-", "two-", "three"]);
        assert_eq!(join(&map, 3).unwrap(), "one-two-three");
    }

    #[test]
    fn test_join_reports_first_missing_index() {
        let mut map = indexed(&["a", "b", "c", "d"]);
        map.remove(&2);
        map.remove(&3);
        let err = join(&map, 4).unwrap_err();
        assert_eq!(err, IncompleteChunkSet { index: 2, count: 4 });
    }

    #[test]
    fn test_join_zero_count_is_empty() {
        assert_eq!(join(&HashMap::new(), 0).unwrap(), "");
    }

    #[test]
    fn test_long_value_fragment_count() {
        let value = "x".repeat(10_000);
        let fragments = split(&value, 4000);
        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0].len(), 4000);
        assert_eq!(fragments[2].len(), 2000);
    }
}
