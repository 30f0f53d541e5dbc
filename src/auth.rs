//! Shared secrets guarding the call API and the media stream.

use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Random per-process secret.
pub fn generate_secret() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Constant-time comparison of a presented token against the expected secret.
///
/// An empty expected secret never matches.
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}
