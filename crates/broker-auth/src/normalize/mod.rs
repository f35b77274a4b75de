//! Profile normalization
//!
//! Each identity provider returns its own profile shape. The functions in
//! this module turn those payloads into the canonical [`Identity`]. They are
//! pure: network lookups (GitHub's email list, Facebook's Graph profile)
//! happen in the provider adapter and their results are passed in.
//!
//! A payload without a usable user id always fails with
//! [`BrokerError::Normalization`]; no zero-value identity is ever produced.
//!
//! [`Identity`]: crate::identity::Identity
//! [`BrokerError::Normalization`]: crate::error::BrokerError::Normalization

pub mod claims;
pub mod facebook;
pub mod github;
pub mod google;
pub mod names;
pub mod twitter;

pub use claims::{ClaimFields, ClaimsNormalizer, ClaimsSettings};
pub use facebook::normalize_facebook;
pub use github::{normalize_github, select_email, GitHubEmail};
pub use google::normalize_google;
pub use names::{make_username, split_name, NameGuess, UNKNOWN_NAME};
pub use twitter::normalize_twitter;

use serde_json::Value;

/// Read a field as a non-empty string.
///
/// Numbers are accepted as well since several providers send numeric ids.
pub(crate) fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read the first present field out of several candidate names.
pub(crate) fn first_string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| string_field(value, key))
}

/// Read a boolean claim, accepting the `"true"`/`"false"` strings some
/// providers emit.
pub(crate) fn bool_field(value: &Value, key: &str) -> Option<bool> {
    match value.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
