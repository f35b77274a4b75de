//! Display-name helpers shared by providers that only expose a single
//! display name plus a login handle.

use tracing::debug;

/// Placeholder used when a provider returns neither a name nor a handle.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Result of splitting a display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameGuess {
    /// Full name, or the fallback used in its place
    pub full_name: String,
    /// Everything before the first space
    pub given_name: String,
    /// Everything after the first space
    pub family_name: String,
}

/// Split a display name into given and family name.
///
/// Without a display name the handle is used as family and full name, and
/// without either the literal [`UNKNOWN_NAME`]. A display name is split on
/// its first space only; a name without spaces becomes the family name.
pub fn split_name(full_name: Option<&str>, username: Option<&str>) -> NameGuess {
    let full_name = full_name.filter(|n| !n.is_empty());
    let username = username.filter(|u| !u.is_empty());

    let guess = match (full_name, username) {
        (Some(name), _) => match name.split_once(' ') {
            Some((given, family)) => NameGuess {
                full_name: name.to_string(),
                given_name: given.to_string(),
                family_name: family.to_string(),
            },
            None => NameGuess {
                full_name: name.to_string(),
                given_name: String::new(),
                family_name: name.to_string(),
            },
        },
        (None, Some(handle)) => NameGuess {
            full_name: handle.to_string(),
            given_name: String::new(),
            family_name: handle.to_string(),
        },
        (None, None) => NameGuess {
            full_name: UNKNOWN_NAME.to_string(),
            given_name: String::new(),
            family_name: UNKNOWN_NAME.to_string(),
        },
    };

    debug!(?guess, "split display name");
    guess
}

/// Pick the username: the handle when present, else the full name.
pub fn make_username(full_name: &str, username: Option<&str>) -> String {
    match username.filter(|u| !u.is_empty()) {
        Some(handle) => handle.to_string(),
        None => full_name.to_string(),
    }
}
