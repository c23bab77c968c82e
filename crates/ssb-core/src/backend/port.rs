use std::path::Path;

use async_trait::async_trait;

use crate::domain::UserId;

use super::types::{BackendKind, HandshakeToken};

/// Normalized authentication outcome taxonomy.
///
/// Backend crates map their own wire vocabularies into this enum at their
/// boundary, so the state machine classifies failures without knowing which
/// client library produced them.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("the platform rejected this phone number")]
    InvalidPhoneNumber,

    #[error("the platform rejected the app credentials")]
    InvalidApiCredentials,

    #[error("the one-time code is wrong or has expired")]
    InvalidCode,

    #[error("the second-factor password is wrong")]
    InvalidPassword,

    /// Not a failure: the account has a password set and the flow must
    /// collect it before sign-in completes.
    #[error("the account requires a second-factor password")]
    SecondFactorRequired,

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

impl AuthError {
    /// True when the current attempt cannot continue and its resources must
    /// be released. Rejections the user can correct in place return false.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            AuthError::Transport(_) | AuthError::Unavailable(_) | AuthError::InvalidApiCredentials
        )
    }
}

/// One client library variant. Stateless: per-user state lives in the
/// `AuthClient` handle it allocates.
pub trait CredentialBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Allocate a new, not-yet-connected client bound to an isolated working
    /// area. Must not block on the network.
    fn create_client(
        &self,
        user_id: UserId,
        workdir: &Path,
    ) -> Result<Box<dyn AuthClient>, AuthError>;
}

/// An open client handle driving one authentication attempt.
///
/// The state machine calls only this trait and never branches on which
/// backend produced the handle.
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// Open a connection and request a one-time code be delivered to the
    /// phone out-of-band. The returned token is required to redeem the code.
    async fn send_code(&mut self, phone_number: &str) -> Result<HandshakeToken, AuthError>;

    /// Complete first-factor authentication.
    async fn sign_in(
        &mut self,
        phone_number: &str,
        token: &HandshakeToken,
        code: &str,
    ) -> Result<(), AuthError>;

    /// Complete second-factor authentication after `SecondFactorRequired`.
    async fn check_password(&mut self, password: &str) -> Result<(), AuthError>;

    /// Serialize the now-authorized identity into a portable string. Only
    /// valid after successful sign-in (with or without second factor).
    async fn export_session(&mut self) -> Result<String, AuthError>;

    /// Release the underlying connection. Idempotent.
    async fn disconnect(&mut self) -> Result<(), AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_classification() {
        assert!(AuthError::Transport("dns".into()).is_unrecoverable());
        assert!(AuthError::Unavailable("down".into()).is_unrecoverable());
        assert!(AuthError::InvalidApiCredentials.is_unrecoverable());

        assert!(!AuthError::InvalidPhoneNumber.is_unrecoverable());
        assert!(!AuthError::InvalidCode.is_unrecoverable());
        assert!(!AuthError::InvalidPassword.is_unrecoverable());
        assert!(!AuthError::SecondFactorRequired.is_unrecoverable());
    }
}
