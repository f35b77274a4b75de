//! Signed claims token decoding
//!
//! Corporate and generic OAuth2 identity providers hand back a JWT whose
//! payload carries the user's claims. When a public key, certificate or
//! shared secret is configured the signature is verified before any claim
//! is read; a bad signature aborts the handshake. Without a key the payload
//! is decoded as-is.

use crate::error::{BrokerError, BrokerResult};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Supported signature algorithms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignatureAlgorithm {
    /// HMAC using SHA-256
    HS256,
    /// HMAC using SHA-384
    HS384,
    /// HMAC using SHA-512
    HS512,
    /// RSASSA-PKCS1-v1_5 using SHA-256
    #[default]
    RS256,
    /// RSASSA-PKCS1-v1_5 using SHA-384
    RS384,
    /// RSASSA-PKCS1-v1_5 using SHA-512
    RS512,
    /// ECDSA using P-256 and SHA-256
    ES256,
    /// ECDSA using P-384 and SHA-384
    ES384,
}

impl SignatureAlgorithm {
    fn is_hmac(self) -> bool {
        matches!(
            self,
            SignatureAlgorithm::HS256 | SignatureAlgorithm::HS384 | SignatureAlgorithm::HS512
        )
    }
}

impl From<SignatureAlgorithm> for Algorithm {
    fn from(alg: SignatureAlgorithm) -> Self {
        match alg {
            SignatureAlgorithm::HS256 => Algorithm::HS256,
            SignatureAlgorithm::HS384 => Algorithm::HS384,
            SignatureAlgorithm::HS512 => Algorithm::HS512,
            SignatureAlgorithm::RS256 => Algorithm::RS256,
            SignatureAlgorithm::RS384 => Algorithm::RS384,
            SignatureAlgorithm::RS512 => Algorithm::RS512,
            SignatureAlgorithm::ES256 => Algorithm::ES256,
            SignatureAlgorithm::ES384 => Algorithm::ES384,
        }
    }
}

/// Key material used to check claims token signatures.
#[derive(Clone)]
pub enum VerificationKey {
    /// PEM public key or X.509 certificate (RSA/EC algorithms)
    Pem(String),
    /// Shared secret (HMAC algorithms)
    Secret(String),
}

impl std::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationKey::Pem(_) => f.write_str("Pem([REDACTED])"),
            VerificationKey::Secret(_) => f.write_str("Secret([REDACTED])"),
        }
    }
}

/// Decoder for provider claims tokens.
pub struct ClaimsTokenDecoder {
    algorithm: SignatureAlgorithm,
    decoding_key: Option<DecodingKey>,
    audience: Option<String>,
}

impl std::fmt::Debug for ClaimsTokenDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimsTokenDecoder")
            .field("algorithm", &self.algorithm)
            .field("decoding_key", &self.decoding_key.as_ref().map(|_| "[REDACTED]"))
            .field("audience", &self.audience)
            .finish()
    }
}

impl ClaimsTokenDecoder {
    /// Create a decoder that checks signatures with the given key.
    pub fn verifying(
        algorithm: SignatureAlgorithm,
        key: &VerificationKey,
        audience: Option<String>,
    ) -> BrokerResult<Self> {
        let decoding_key = match (key, algorithm.is_hmac()) {
            (VerificationKey::Secret(secret), true) => DecodingKey::from_secret(secret.as_bytes()),
            (VerificationKey::Pem(pem), false) => match algorithm {
                SignatureAlgorithm::ES256 | SignatureAlgorithm::ES384 => {
                    DecodingKey::from_ec_pem(pem.as_bytes()).map_err(|e| {
                        BrokerError::Config(format!("Invalid EC public key: {}", e))
                    })?
                }
                _ => DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
                    BrokerError::Config(format!("Invalid RSA public key: {}", e))
                })?,
            },
            (VerificationKey::Secret(_), false) => {
                return Err(BrokerError::Config(format!(
                    "{:?} requires a public key or certificate",
                    algorithm
                )))
            }
            (VerificationKey::Pem(_), true) => {
                return Err(BrokerError::Config(format!(
                    "{:?} requires a shared secret",
                    algorithm
                )))
            }
        };

        Ok(Self {
            algorithm,
            decoding_key: Some(decoding_key),
            audience,
        })
    }

    /// Create a decoder that reads the payload without checking signatures.
    pub fn unverified() -> Self {
        Self {
            algorithm: SignatureAlgorithm::default(),
            decoding_key: None,
            audience: None,
        }
    }

    /// Whether signatures are checked.
    pub fn verifies_signature(&self) -> bool {
        self.decoding_key.is_some()
    }

    /// Decode a token into its claims.
    ///
    /// With a key configured, any verification failure is an
    /// [`BrokerError::Authentication`]; there is no fallback to unverified
    /// decoding. Without a key, an unreadable token is a
    /// [`BrokerError::Normalization`].
    pub fn decode(&self, token: &str) -> BrokerResult<Map<String, Value>> {
        match &self.decoding_key {
            Some(key) => self.decode_verified(token, key),
            None => Self::decode_unverified(token),
        }
    }

    fn decode_verified(&self, token: &str, key: &DecodingKey) -> BrokerResult<Map<String, Value>> {
        let mut validation = Validation::new(self.algorithm.into());
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let token_data: TokenData<Map<String, Value>> =
            decode(token, key, &validation).map_err(|e| {
                warn!(error = %e, "claims token rejected");
                match e.kind() {
                    ErrorKind::InvalidSignature => {
                        BrokerError::Authentication("Invalid token signature".to_string())
                    }
                    ErrorKind::ExpiredSignature => {
                        BrokerError::Authentication("Token has expired".to_string())
                    }
                    ErrorKind::InvalidAudience => {
                        BrokerError::Authentication("Invalid token audience".to_string())
                    }
                    ErrorKind::InvalidAlgorithm => {
                        BrokerError::Authentication("Unexpected token algorithm".to_string())
                    }
                    _ => BrokerError::Authentication(format!("Invalid token: {}", e)),
                }
            })?;

        debug!("claims token signature verified");
        Ok(token_data.claims)
    }

    fn decode_unverified(token: &str) -> BrokerResult<Map<String, Value>> {
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let token_data: TokenData<Map<String, Value>> =
            decode(token, &DecodingKey::from_secret(&[]), &validation)
                .map_err(|e| BrokerError::Normalization(format!("Unreadable claims token: {}", e)))?;

        Ok(token_data.claims)
    }
}
