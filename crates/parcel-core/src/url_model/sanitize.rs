//! Filename sanitization for local output files.

use crate::state::STATE_SUFFIX;
use crate::storage::TEMP_SUFFIX;

const NAME_MAX: usize = 255;

const LONGEST_SUFFIX: usize = if TEMP_SUFFIX.len() > STATE_SUFFIX.len() {
    TEMP_SUFFIX.len()
} else {
    STATE_SUFFIX.len()
};

/// Longest sanitized name: leaves room for the `.partial` and `.parcel`
/// suffixes within NAME_MAX.
pub const MAX_NAME_BYTES: usize = NAME_MAX - LONGEST_SUFFIX;

/// Sanitizes a candidate filename so it is a single safe path component.
///
/// - Replaces NUL, `/`, `\`, and control characters with `_`
/// - Trims leading/trailing whitespace and dots
/// - Limits length to `MAX_NAME_BYTES`
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c == '\0' || c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c.is_whitespace() || c == '.');

    if trimmed.len() > MAX_NAME_BYTES {
        let mut take = MAX_NAME_BYTES;
        while take > 0 && !trimmed.is_char_boundary(take) {
            take -= 1;
        }
        trimmed[..take].to_string()
    } else {
        trimmed.to_string()
    }
}
