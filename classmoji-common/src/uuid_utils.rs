//! UUID utilities

use uuid::Uuid;

/// Length of the canonical hyphenated form (`8-4-4-4-12`)
const HYPHENATED_LEN: usize = 36;

/// Parse UUID from string (any format the `uuid` crate accepts)
pub fn parse(s: &str) -> Result<Uuid, uuid::Error> {
    Uuid::parse_str(s)
}

/// Strict check for the canonical hyphenated form only
///
/// Import identifiers arrive in URL paths, so the braced, URN and
/// simple (no hyphens) forms accepted by [`parse`] are rejected here.
pub fn is_hyphenated_uuid(s: &str) -> bool {
    s.len() == HYPHENATED_LEN && parse(s).is_ok()
}
