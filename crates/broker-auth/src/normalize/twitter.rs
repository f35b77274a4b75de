//! Twitter profile normalization.

use super::{first_string_field, make_username, split_name, string_field};
use crate::error::BrokerResult;
use crate::identity::Identity;
use crate::provider::ProviderKind;
use serde_json::Value;

/// Normalize a Twitter user payload.
///
/// Accepts both the v2 `{"data": {...}}` envelope and a bare user object.
/// Twitter does not return email addresses under default permissions, so
/// the email is always empty and unverified.
pub fn normalize_twitter(profile: Value) -> BrokerResult<Identity> {
    let user = profile.get("data").unwrap_or(&profile);

    let id = first_string_field(user, &["id_str", "id"]).unwrap_or_default();
    let identity = Identity::new(ProviderKind::Twitter, &id)?;

    let handle = first_string_field(user, &["username", "screen_name"]);
    let guess = split_name(string_field(user, "name").as_deref(), handle.as_deref());
    let username = make_username(&guess.full_name, handle.as_deref());

    Ok(identity
        .with_username(username)
        .with_names(guess.full_name, guess.given_name, guess.family_name)
        .with_email(None, false)
        .with_raw_profile(profile))
}
