//! Card identity — a stable hash of (document path, heading text).
//!
//! The id is a pure function of its two inputs: there is no mapping table,
//! and recomputing it after a restart yields the same value. The hash is
//! 64-bit FNV-1a over the UTF-8 bytes of `path NUL heading`. NUL cannot
//! occur in a file path and does not occur in ordinary heading text, so two
//! different pairs never meet on the same hashed byte string.
//!
//! The space is bounded, so collisions are possible but rare; ids only
//! deduplicate cards and carry no security weight.

use crate::types::CardId;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
const SEPARATOR: u8 = 0x00;

/// Derive the card id for `heading` inside the document at `document_path`.
#[must_use]
pub fn identify(document_path: &str, heading: &str) -> CardId {
    let mut hash = FNV_OFFSET_BASIS;
    let bytes = document_path
        .as_bytes()
        .iter()
        .chain(std::iter::once(&SEPARATOR))
        .chain(heading.as_bytes());
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    CardId(format!("{hash:016x}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_same_id() {
        assert_eq!(identify("notes/a.md", "Intro"), identify("notes/a.md", "Intro"));
    }

    #[test]
    fn id_is_fixed_width_hex() {
        let id = identify("notes/a.md", "Intro");
        assert_eq!(id.as_str().len(), 16);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn known_value_is_stable_across_builds() {
        // FNV-1a of the empty path, the separator and the empty heading.
        assert_eq!(identify("", "").as_str(), "af63bd4c8601b7df");
    }

    #[test]
    fn separator_keeps_pairs_apart() {
        // A plain concatenation would make these two pairs identical.
        assert_ne!(identify("a|b", "c"), identify("a", "b|c"));
        assert_ne!(identify("ab", "c"), identify("a", "bc"));
    }

    #[test]
    fn path_and_heading_both_matter() {
        assert_ne!(identify("a.md", "Intro"), identify("b.md", "Intro"));
        assert_ne!(identify("a.md", "Intro"), identify("a.md", "Outro"));
    }
}
