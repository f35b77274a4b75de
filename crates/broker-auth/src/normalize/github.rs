//! GitHub profile normalization.
//!
//! The OAuth profile does not include email addresses; they come from a
//! second call to the `/user/emails` endpoint.

use super::{make_username, split_name, string_field};
use crate::error::BrokerResult;
use crate::identity::Identity;
use crate::provider::ProviderKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of GitHub's email list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubEmail {
    /// Email address
    pub email: String,

    /// Whether this is the account's primary address
    #[serde(default)]
    pub primary: bool,

    /// Whether GitHub verified the address
    #[serde(default)]
    pub verified: bool,
}

/// Pick the address to report.
///
/// The primary address wins, then the first verified one, then the first
/// one in the list.
pub fn select_email(emails: &[GitHubEmail]) -> Option<&GitHubEmail> {
    emails
        .iter()
        .find(|e| e.primary)
        .or_else(|| emails.iter().find(|e| e.verified))
        .or_else(|| emails.first())
}

/// Normalize a GitHub user payload plus its email list.
pub fn normalize_github(profile: Value, emails: &[GitHubEmail]) -> BrokerResult<Identity> {
    let id = string_field(&profile, "id").unwrap_or_default();
    let identity = Identity::new(ProviderKind::GitHub, &id)?;

    let login = string_field(&profile, "login");
    let guess = split_name(string_field(&profile, "name").as_deref(), login.as_deref());
    let username = make_username(&guess.full_name, login.as_deref());

    let (email, verified) = match select_email(emails) {
        Some(chosen) => (Some(chosen.email.clone()), chosen.verified),
        None => (None, false),
    };

    Ok(identity
        .with_username(username)
        .with_names(guess.full_name, guess.given_name, guess.family_name)
        .with_email(email, verified)
        .with_raw_profile(profile))
}
