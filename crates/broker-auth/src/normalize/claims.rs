//! Claims-token normalization for the corporate IdP and the generic OAuth2
//! provider.
//!
//! There is no fixed claim-name contract with these providers, so every
//! deployment names the claims holding the id, names and email. Group claims
//! are mapped onto scopes through a configured table.

use super::{bool_field, split_name, string_field, UNKNOWN_NAME};
use crate::claims_token::{ClaimsTokenDecoder, SignatureAlgorithm, VerificationKey};
use crate::error::{BrokerError, BrokerResult};
use crate::identity::Identity;
use crate::provider::ProviderKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Claim names used to build the identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimFields {
    /// Claim carrying the unique user id
    #[serde(default)]
    pub id: String,
    /// Claim carrying the given name
    #[serde(default)]
    pub given_name: String,
    /// Claim carrying the family name
    #[serde(default)]
    pub family_name: String,
    /// Claim carrying the email address
    #[serde(default)]
    pub email: String,
    /// Claim carrying the full display name
    #[serde(default)]
    pub name: Option<String>,
    /// Claim carrying a login handle
    #[serde(default)]
    pub username: Option<String>,
}

fn default_groups_claim() -> String {
    "group".to_string()
}

fn default_trust_email() -> bool {
    true
}

/// Per-deployment settings for a claims-token provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimsSettings {
    /// Require a verified signature
    #[serde(default)]
    pub verify_cert: bool,
    /// PEM public key or certificate of the IdP
    #[serde(default)]
    pub public_cert: Option<String>,
    /// Shared secret for HMAC-signed tokens
    #[serde(default)]
    pub shared_secret: Option<String>,
    /// Expected signature algorithm
    #[serde(default)]
    pub algorithm: SignatureAlgorithm,
    /// Expected `aud` claim
    #[serde(default)]
    pub audience: Option<String>,
    /// Claim names
    #[serde(default)]
    pub profile: ClaimFields,
    /// Claim carrying group or role names
    #[serde(default = "default_groups_claim")]
    pub groups_claim: String,
    /// Group name to scopes
    #[serde(default)]
    pub group_scopes: HashMap<String, Vec<String>>,
    /// Treat a returned email as verified when no `email_verified` claim is present
    #[serde(default = "default_trust_email")]
    pub trust_email: bool,
}

impl Default for ClaimsSettings {
    fn default() -> Self {
        Self {
            verify_cert: false,
            public_cert: None,
            shared_secret: None,
            algorithm: SignatureAlgorithm::default(),
            audience: None,
            profile: ClaimFields::default(),
            groups_claim: default_groups_claim(),
            group_scopes: HashMap::new(),
            trust_email: default_trust_email(),
        }
    }
}

impl ClaimsSettings {
    /// Check that all claim names are configured and that the key material
    /// matches `verifyCert`.
    pub fn validate(&self, kind: ProviderKind) -> BrokerResult<()> {
        let required = [
            ("profile.id", &self.profile.id),
            ("profile.givenName", &self.profile.given_name),
            ("profile.familyName", &self.profile.family_name),
            ("profile.email", &self.profile.email),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(BrokerError::Config(format!(
                    "{} provider is missing {}",
                    kind, name
                )));
            }
        }

        if self.verify_cert && self.public_cert.is_none() && self.shared_secret.is_none() {
            return Err(BrokerError::Config(format!(
                "{} provider sets verifyCert but has no publicCert",
                kind
            )));
        }

        Ok(())
    }

    fn verification_key(&self) -> Option<VerificationKey> {
        match (&self.public_cert, &self.shared_secret) {
            (Some(pem), _) => Some(VerificationKey::Pem(pem.clone())),
            (None, Some(secret)) => Some(VerificationKey::Secret(secret.clone())),
            (None, None) => None,
        }
    }
}

/// Turns claims tokens into identities.
#[derive(Debug)]
pub struct ClaimsNormalizer {
    kind: ProviderKind,
    fields: ClaimFields,
    decoder: ClaimsTokenDecoder,
    groups_claim: String,
    group_scopes: HashMap<String, Vec<String>>,
    trust_email: bool,
}

impl ClaimsNormalizer {
    /// Build a normalizer. Any configured key turns on signature checks.
    pub fn new(kind: ProviderKind, settings: &ClaimsSettings) -> BrokerResult<Self> {
        settings.validate(kind)?;

        let decoder = match settings.verification_key() {
            Some(key) => {
                ClaimsTokenDecoder::verifying(settings.algorithm, &key, settings.audience.clone())?
            }
            None => ClaimsTokenDecoder::unverified(),
        };

        let group_scopes = settings
            .group_scopes
            .iter()
            .map(|(group, scopes)| (group.to_lowercase(), scopes.clone()))
            .collect();

        Ok(Self {
            kind,
            fields: settings.profile.clone(),
            decoder,
            groups_claim: settings.groups_claim.clone(),
            group_scopes,
            trust_email: settings.trust_email,
        })
    }

    /// Provider this normalizer belongs to.
    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Verify (when configured) and decode a token, then normalize its claims.
    pub fn normalize_token(&self, token: &str) -> BrokerResult<Identity> {
        let claims = self.decoder.decode(token)?;
        self.normalize_claims(claims)
    }

    /// Normalize already-decoded claims.
    pub fn normalize_claims(&self, claims: Map<String, Value>) -> BrokerResult<Identity> {
        let claims = Value::Object(claims);

        let id = string_field(&claims, &self.fields.id).unwrap_or_default();
        let identity = Identity::new(self.kind, &id)?;

        let mut given_name = string_field(&claims, &self.fields.given_name).unwrap_or_default();
        let mut family_name = string_field(&claims, &self.fields.family_name).unwrap_or_default();
        let display_name = self
            .fields
            .name
            .as_deref()
            .and_then(|field| string_field(&claims, field));

        let full_name = match display_name {
            Some(name) => {
                if given_name.is_empty() && family_name.is_empty() {
                    let guess = split_name(Some(&name), None);
                    given_name = guess.given_name;
                    family_name = guess.family_name;
                }
                name
            }
            None => {
                let joined = format!("{} {}", given_name, family_name).trim().to_string();
                if joined.is_empty() {
                    UNKNOWN_NAME.to_string()
                } else {
                    joined
                }
            }
        };

        let email = string_field(&claims, &self.fields.email);
        let email_verified = bool_field(&claims, "email_verified").unwrap_or(self.trust_email);

        let username = self
            .fields
            .username
            .as_deref()
            .and_then(|field| string_field(&claims, field))
            .or_else(|| email.clone())
            .unwrap_or_else(|| full_name.clone());

        let mut identity = identity
            .with_username(username)
            .with_names(full_name, given_name, family_name)
            .with_email(email, email_verified);

        if let Some(groups) = claims.get(&self.groups_claim) {
            let scopes = self.scopes_for(groups);
            debug!(provider = %self.kind, scopes = ?scopes, "mapped group claims");
            identity = identity.with_scopes(scopes);
        }

        Ok(identity.with_raw_profile(claims))
    }

    /// Map group claim values onto scopes, case-insensitively, de-duplicated
    /// in first-seen order.
    fn scopes_for(&self, groups: &Value) -> Vec<String> {
        let names: Vec<&str> = match groups {
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };

        let mut scopes: Vec<String> = Vec::new();
        for name in names {
            if let Some(mapped) = self.group_scopes.get(&name.to_lowercase()) {
                for scope in mapped {
                    if !scopes.contains(scope) {
                        scopes.push(scope.clone());
                    }
                }
            }
        }
        scopes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings() -> ClaimsSettings {
        ClaimsSettings {
            profile: ClaimFields {
                id: "upn".to_string(),
                given_name: "given_name".to_string(),
                family_name: "family_name".to_string(),
                email: "email".to_string(),
                name: None,
                username: None,
            },
            group_scopes: HashMap::from([
                ("Admins".to_string(), vec!["admin".to_string(), "read".to_string()]),
                ("Readers".to_string(), vec!["read".to_string()]),
            ]),
            ..ClaimsSettings::default()
        }
    }

    fn claims(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("claims must be an object"),
        }
    }

    #[test]
    fn test_configured_fields() {
        let normalizer = ClaimsNormalizer::new(ProviderKind::Corporate, &settings()).unwrap();
        let identity = normalizer
            .normalize_claims(claims(json!({
                "upn": "jdoe@corp",
                "given_name": "Jane",
                "family_name": "Doe",
                "email": "jane@corp.example"
            })))
            .unwrap();

        assert_eq!(identity.id, "corporate:jdoe@corp");
        assert_eq!(identity.full_name, "Jane Doe");
        assert_eq!(identity.username, "jane@corp.example");
        assert!(identity.email_verified);
        assert!(identity.scopes.is_none());
    }

    #[test]
    fn test_groups_map_case_insensitively_without_duplicates() {
        let normalizer = ClaimsNormalizer::new(ProviderKind::OAuth2, &settings()).unwrap();
        let identity = normalizer
            .normalize_claims(claims(json!({
                "upn": "1",
                "group": ["readers", "ADMINS", "Unmapped"]
            })))
            .unwrap();

        assert_eq!(
            identity.scopes,
            Some(vec!["read".to_string(), "admin".to_string()])
        );
    }

    #[test]
    fn test_single_group_string() {
        let normalizer = ClaimsNormalizer::new(ProviderKind::OAuth2, &settings()).unwrap();
        let identity = normalizer
            .normalize_claims(claims(json!({ "upn": "1", "group": "Admins" })))
            .unwrap();
        assert_eq!(
            identity.scopes,
            Some(vec!["admin".to_string(), "read".to_string()])
        );
    }

    #[test]
    fn test_email_verified_claim_overrides_trust() {
        let normalizer = ClaimsNormalizer::new(ProviderKind::Corporate, &settings()).unwrap();
        let identity = normalizer
            .normalize_claims(claims(json!({
                "upn": "1", "email": "a@b.com", "email_verified": false
            })))
            .unwrap();
        assert!(!identity.email_verified);
    }

    #[test]
    fn test_display_name_is_split_when_names_missing() {
        let mut settings = settings();
        settings.profile.id = "sub".to_string();
        settings.profile.name = Some("name".to_string());
        let normalizer = ClaimsNormalizer::new(ProviderKind::OAuth2, &settings).unwrap();

        let identity = normalizer
            .normalize_claims(claims(json!({ "sub": "42", "name": "A B", "email": "a@b.com" })))
            .unwrap();
        assert_eq!(identity.id, "oauth2:42");
        assert_eq!(identity.given_name, "A");
        assert_eq!(identity.family_name, "B");
    }

    #[test]
    fn test_missing_id_claim_fails() {
        let normalizer = ClaimsNormalizer::new(ProviderKind::Corporate, &settings()).unwrap();
        let result = normalizer.normalize_claims(claims(json!({ "email": "a@b.com" })));
        assert!(matches!(result, Err(BrokerError::Normalization(_))));
    }

    #[test]
    fn test_validation() {
        let mut missing = settings();
        missing.profile.email = String::new();
        assert!(matches!(
            missing.validate(ProviderKind::Corporate),
            Err(BrokerError::Config(_))
        ));

        let mut no_cert = settings();
        no_cert.verify_cert = true;
        assert!(matches!(
            ClaimsNormalizer::new(ProviderKind::Corporate, &no_cert),
            Err(BrokerError::Config(_))
        ));
    }
}
