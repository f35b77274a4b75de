//! Profile read-back for client applications.

use crate::error::{BrokerError, BrokerResult};
use crate::identity::Identity;
use crate::session::HandshakeSession;

/// Return the identity of a completed handshake.
///
/// `user_valid` is the only gate: an identity left over from an unfinished
/// handshake is never returned.
pub fn get_profile(session: &HandshakeSession) -> BrokerResult<Identity> {
    if !session.user_valid {
        return Err(BrokerError::Unauthorized(
            "No authenticated session".to_string(),
        ));
    }

    session
        .identity
        .clone()
        .ok_or_else(|| BrokerError::Unauthorized("No authenticated session".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderKind;

    fn identity() -> Identity {
        Identity::new(ProviderKind::GitHub, "7").unwrap()
    }

    #[test]
    fn test_valid_session_returns_identity() {
        let mut session = HandshakeSession::new();
        session.complete(identity());
        assert_eq!(get_profile(&session).unwrap().id, "github:7");
    }

    #[test]
    fn test_identity_without_valid_flag_is_unauthorized() {
        let mut session = HandshakeSession::new();
        session.identity = Some(identity());
        session.user_valid = false;
        assert!(matches!(
            get_profile(&session),
            Err(BrokerError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_valid_flag_without_identity_is_unauthorized() {
        let mut session = HandshakeSession::new();
        session.user_valid = true;
        assert!(matches!(
            get_profile(&session),
            Err(BrokerError::Unauthorized(_))
        ));
    }
}
