//! Fixed-capacity text handling for records that cross the host boundary.
//!
//! Capacities count characters, not bytes, and truncation never splits a
//! character.

use std::borrow::Cow;

/// Maximum identity length in characters.
pub const IDENTITY_CAPACITY: usize = 64;
/// Maximum display name length in characters.
pub const NAME_CAPACITY: usize = 255;
/// Maximum file path length in characters.
pub const PATH_CAPACITY: usize = 511;
/// Maximum alert message length in characters.
pub const MESSAGE_CAPACITY: usize = 255;

/// Truncate `value` to at most `capacity` characters.
#[must_use]
pub fn truncate(value: &str, capacity: usize) -> Cow<'_, str> {
    match value.char_indices().nth(capacity) {
        Some((cut, _)) => Cow::Owned(value[..cut].to_string()),
        None => Cow::Borrowed(value),
    }
}

/// Owned variant of [`truncate`] that reuses the allocation when possible.
#[must_use]
pub fn truncate_owned(mut value: String, capacity: usize) -> String {
    if let Some((cut, _)) = value.char_indices().nth(capacity) {
        value.truncate(cut);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_values_are_borrowed() {
        assert!(matches!(truncate("demo", NAME_CAPACITY), Cow::Borrowed("demo")));
    }

    #[test]
    fn long_values_are_cut_at_capacity() {
        let long = "x".repeat(300);
        assert_eq!(truncate(&long, NAME_CAPACITY).chars().count(), NAME_CAPACITY);
        assert_eq!(truncate_owned(long, MESSAGE_CAPACITY).len(), MESSAGE_CAPACITY);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let wide = "é".repeat(600);
        let cut = truncate_owned(wide, PATH_CAPACITY);
        assert_eq!(cut.chars().count(), PATH_CAPACITY);
        assert!(cut.chars().all(|ch| ch == 'é'));
    }
}
