//! Scan token format check.
//!
//! Runs before any lookup. Fails closed: empty strings, strings without the
//! reserved prefix, oversized strings and anything outside `[A-Za-z0-9_-]`
//! after the prefix are rejected.

/// Longest accepted token body (after the prefix).
pub const MAX_BODY_LEN: usize = 128;

/// Validator for the reserved-prefix token pattern.
#[derive(Debug, Clone)]
pub struct TokenFormat {
    prefix: String,
}

impl TokenFormat {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether `raw` looks like a scan token. No side effects.
    pub fn is_valid(&self, raw: &str) -> bool {
        let Some(body) = raw.strip_prefix(self.prefix.as_str()) else {
            return false;
        };
        !body.is_empty()
            && body.len() <= MAX_BODY_LEN
            && body
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    }
}
