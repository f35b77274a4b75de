//! Google profile normalization (OpenID userinfo).

use super::{bool_field, first_string_field, split_name, string_field};
use crate::error::BrokerResult;
use crate::identity::Identity;
use crate::provider::ProviderKind;
use serde_json::Value;

/// Normalize a Google userinfo payload.
///
/// Google has no separate login handle, so the username is the full name.
/// The email counts as verified when Google says so; older payloads without
/// a verification claim only carry confirmed addresses.
pub fn normalize_google(profile: Value) -> BrokerResult<Identity> {
    let id = first_string_field(&profile, &["sub", "id"]).unwrap_or_default();
    let identity = Identity::new(ProviderKind::Google, &id)?;

    let guess = split_name(string_field(&profile, "name").as_deref(), None);
    let given_name = string_field(&profile, "given_name").unwrap_or(guess.given_name);
    let family_name = string_field(&profile, "family_name").unwrap_or(guess.family_name);

    let email = string_field(&profile, "email");
    let email_verified = bool_field(&profile, "email_verified")
        .or_else(|| bool_field(&profile, "verified_email"))
        .unwrap_or(email.is_some());

    Ok(identity
        .with_username(guess.full_name.clone())
        .with_names(guess.full_name, given_name, family_name)
        .with_email(email, email_verified)
        .with_raw_profile(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BrokerError;
    use serde_json::json;

    #[test]
    fn test_normalize_userinfo() {
        let identity = normalize_google(json!({
            "sub": "119000000000000000001",
            "name": "Ada Lovelace",
            "given_name": "Ada",
            "family_name": "Lovelace",
            "email": "ada@example.com",
            "email_verified": true
        }))
        .unwrap();

        assert_eq!(identity.id, "google:119000000000000000001");
        assert_eq!(identity.username, "Ada Lovelace");
        assert_eq!(identity.given_name, "Ada");
        assert_eq!(identity.email.as_deref(), Some("ada@example.com"));
        assert!(identity.email_verified);
        assert!(identity.scopes.is_none());
    }

    #[test]
    fn test_unverified_claim_is_respected() {
        let identity = normalize_google(json!({
            "sub": "1",
            "name": "A B",
            "email": "a@b.com",
            "email_verified": false
        }))
        .unwrap();
        assert!(!identity.email_verified);
    }

    #[test]
    fn test_name_split_fallback() {
        let identity = normalize_google(json!({ "sub": "42", "name": "A B" })).unwrap();
        assert_eq!(identity.given_name, "A");
        assert_eq!(identity.family_name, "B");
        assert_eq!(identity.email, None);
        assert!(!identity.email_verified);
    }

    #[test]
    fn test_missing_id_fails() {
        let result = normalize_google(json!({ "name": "A B", "email": "a@b.com" }));
        assert!(matches!(result, Err(BrokerError::Normalization(_))));
    }
}
