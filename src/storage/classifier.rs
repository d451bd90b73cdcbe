//! Key Classifier
//!
//! Maps a key to a shard slot by looking only at its last byte.
//!
//! ## Why the Last Byte?
//!
//! UUIDs, tokens and numeric ids usually share a long common prefix
//! (a timestamp, a tenant id, a version nibble). The trailing character is
//! where the entropy lives, so routing on it spreads keys almost uniformly
//! across shards without hashing anything.
//!
//! ## Slot Layout
//!
//! ```text
//!   slot:  0 .. 9   10 .. 15   16 .. 35   36
//!   byte: '0'..'9'  'a'..'f'   'g'..'z'   anything else
//!                   'A'..'F'   'G'..'Z'
//! ```
//!
//! Letters are folded case-insensitively, so `"abc"` and `"ABC"` land on the
//! same slot (they are still distinct keys inside the shard).

/// Total number of slots in a store's shard array.
pub const SLOT_COUNT: usize = 37;

/// Slot of the digit `'9'`, the last digit slot.
pub const LAST_DIGIT_SLOT: usize = 9;

/// Slot of the letter `'f'`, the last hexadecimal slot.
pub const LAST_HEX_SLOT: usize = 15;

/// Fallback slot for bytes that are neither digits nor ASCII letters.
pub const OVERFLOW_SLOT: usize = SLOT_COUNT - 1;

/// Returns the slot for a single trailing byte.
///
/// Non-ASCII and punctuation bytes fall back to [`OVERFLOW_SLOT`].
#[inline]
pub const fn slot_index(byte: u8) -> usize {
    match byte {
        b'0'..=b'9' => (byte - b'0') as usize,
        b'a'..=b'z' => (byte - b'a') as usize + LAST_DIGIT_SLOT + 1,
        b'A'..=b'Z' => (byte - b'A') as usize + LAST_DIGIT_SLOT + 1,
        _ => OVERFLOW_SLOT,
    }
}

/// Returns the slot for a key, or `None` for the empty key.
#[inline]
pub fn classify(key: &str) -> Option<usize> {
    key.as_bytes().last().map(|&byte| slot_index(byte))
}
