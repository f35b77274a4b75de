//! Facebook profile normalization (Graph API `/me`).

use super::{split_name, string_field};
use crate::error::BrokerResult;
use crate::identity::Identity;
use crate::provider::ProviderKind;
use serde_json::Value;

/// Normalize a Graph API `/me?fields=id,name,first_name,last_name,email`
/// payload.
///
/// Facebook only hands out confirmed addresses, so a returned email counts
/// as verified.
pub fn normalize_facebook(profile: Value) -> BrokerResult<Identity> {
    let id = string_field(&profile, "id").unwrap_or_default();
    let identity = Identity::new(ProviderKind::Facebook, &id)?;

    let guess = split_name(string_field(&profile, "name").as_deref(), None);
    let given_name = string_field(&profile, "first_name").unwrap_or(guess.given_name);
    let family_name = string_field(&profile, "last_name").unwrap_or(guess.family_name);

    let email = string_field(&profile, "email");
    let verified = email.is_some();

    Ok(identity
        .with_username(guess.full_name.clone())
        .with_names(guess.full_name, given_name, family_name)
        .with_email(email, verified)
        .with_raw_profile(profile))
}
