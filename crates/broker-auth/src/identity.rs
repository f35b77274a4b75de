//! Canonical identity record
//!
//! Every identity provider's profile is normalized into this one shape
//! before it is handed to the token exchange service or read back by the
//! client application through `/profile`.

use crate::error::{BrokerError, BrokerResult};
use crate::provider::ProviderKind;
use serde::{Deserialize, Serialize};

/// Provider-agnostic user identity.
///
/// The `id` always carries the provider prefix (`google:1190...`), so two
/// providers can never produce colliding identities for the same local id.
///
/// # Example
///
/// ```rust
/// use broker_auth::{Identity, ProviderKind};
///
/// let identity = Identity::new(ProviderKind::GitHub, "583231").unwrap();
/// assert_eq!(identity.id, "github:583231");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider-prefixed unique identifier
    pub id: String,

    /// Login handle, or the full name when the provider has none
    pub username: String,

    /// Preferred display handle
    pub preferred_username: String,

    /// Full display name
    #[serde(rename = "name")]
    pub full_name: String,

    /// Given name, empty if it could not be determined
    #[serde(default)]
    pub given_name: String,

    /// Family name, empty if it could not be determined
    #[serde(default)]
    pub family_name: String,

    /// Email address
    pub email: Option<String>,

    /// Whether the provider asserted the email as verified
    #[serde(default)]
    pub email_verified: bool,

    /// Scopes derived from group/role claims
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,

    /// Raw provider payload, kept for audit only
    #[serde(default)]
    pub raw_profile: serde_json::Value,
}

impl Identity {
    /// Create an identity for a provider-local user id.
    ///
    /// Fails with [`BrokerError::Normalization`] when the local id is empty.
    pub fn new(provider: ProviderKind, local_id: impl AsRef<str>) -> BrokerResult<Self> {
        let local_id = local_id.as_ref().trim();
        if local_id.is_empty() {
            return Err(BrokerError::Normalization(format!(
                "{} profile does not contain a user id",
                provider
            )));
        }

        Ok(Self {
            id: format!("{}:{}", provider.as_str(), local_id),
            username: String::new(),
            preferred_username: String::new(),
            full_name: String::new(),
            given_name: String::new(),
            family_name: String::new(),
            email: None,
            email_verified: false,
            scopes: None,
            raw_profile: serde_json::Value::Null,
        })
    }

    /// Provider that issued this identity, taken from the id prefix.
    pub fn provider(&self) -> Option<ProviderKind> {
        self.id
            .split_once(':')
            .and_then(|(prefix, _)| ProviderKind::parse(prefix))
    }

    /// Set the username and preferred username.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        let username = username.into();
        self.preferred_username = username.clone();
        self.username = username;
        self
    }

    /// Set full, given and family name.
    pub fn with_names(
        mut self,
        full_name: impl Into<String>,
        given_name: impl Into<String>,
        family_name: impl Into<String>,
    ) -> Self {
        self.full_name = full_name.into();
        self.given_name = given_name.into();
        self.family_name = family_name.into();
        self
    }

    /// Set email and its verification status.
    ///
    /// A missing email is never reported as verified.
    pub fn with_email(mut self, email: Option<String>, verified: bool) -> Self {
        self.email_verified = verified && email.is_some();
        self.email = email;
        self
    }

    /// Set scopes derived from group claims.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = Some(scopes);
        self
    }

    /// Attach the raw provider payload.
    pub fn with_raw_profile(mut self, raw: serde_json::Value) -> Self {
        self.raw_profile = raw;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_provider_prefixed() {
        let identity = Identity::new(ProviderKind::Google, "1190").unwrap();
        assert_eq!(identity.id, "google:1190");
        assert_eq!(identity.provider(), Some(ProviderKind::Google));
    }

    #[test]
    fn test_same_local_id_does_not_collide() {
        let a = Identity::new(ProviderKind::Twitter, "42").unwrap();
        let b = Identity::new(ProviderKind::Facebook, "42").unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_empty_local_id_is_rejected() {
        let result = Identity::new(ProviderKind::GitHub, "  ");
        assert!(matches!(result, Err(BrokerError::Normalization(_))));
    }

    #[test]
    fn test_missing_email_is_never_verified() {
        let identity = Identity::new(ProviderKind::Google, "1")
            .unwrap()
            .with_email(None, true);
        assert!(!identity.email_verified);
    }

    #[test]
    fn test_wire_format() {
        let identity = Identity::new(ProviderKind::GitHub, "7")
            .unwrap()
            .with_username("octo")
            .with_names("Octo Cat", "Octo", "Cat")
            .with_email(Some("octo@example.com".to_string()), true);

        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["id"], "github:7");
        assert_eq!(json["name"], "Octo Cat");
        assert_eq!(json["preferred_username"], "octo");
        assert_eq!(json["email_verified"], true);
        assert!(json.get("scopes").is_none());
    }
}
