//! Cache key derivation.

const SNIPPET_PREFIX: &str = "snippet:";

/// Cache key for a snippet row: `snippet:<public_id>`.
pub fn snippet_key(public_id: &str) -> String {
    format!("{SNIPPET_PREFIX}{public_id}")
}
