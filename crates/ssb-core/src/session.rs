use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    backend::{AuthClient, BackendKind, HandshakeToken},
    domain::{UserId, UserProfile},
    workdir::Workdir,
};

/// Where a user currently is in the handshake.
///
/// "Selecting a backend" is represented by the absence of a session, and
/// finalization is automatic, so only the three waiting states are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthState {
    AwaitingPhone,
    AwaitingCode,
    AwaitingPassword,
}

/// One in-progress authentication attempt for a single end user.
///
/// Exists in the [`SessionStore`] iff an attempt is live; owns the backend
/// client handle and the scoped working area, which are created together at
/// backend selection and released together on every exit path.
pub struct UserSession {
    pub profile: UserProfile,
    pub backend: BackendKind,
    pub state: AuthState,
    pub started_at: DateTime<Utc>,

    pub phone_number: Option<String>,
    pub code_buffer: String,
    pub password: Option<String>,
    pub handshake: Option<HandshakeToken>,

    pub client: Option<Box<dyn AuthClient>>,
    pub workdir: Option<Workdir>,
}

impl UserSession {
    pub fn new(
        profile: UserProfile,
        backend: BackendKind,
        client: Box<dyn AuthClient>,
        workdir: Workdir,
    ) -> Self {
        Self {
            profile,
            backend,
            state: AuthState::AwaitingPhone,
            started_at: Utc::now(),
            phone_number: None,
            code_buffer: String::new(),
            password: None,
            handshake: None,
            client: Some(client),
            workdir: Some(workdir),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.profile.user_id
    }

    /// Release external resources: disconnect the client and remove the
    /// working area. Idempotent, best-effort, safe on partially-constructed
    /// sessions; failures are logged and never propagated.
    pub async fn release(&mut self) {
        if let Some(mut client) = self.client.take() {
            if let Err(e) = client.disconnect().await {
                eprintln!(
                    "[CLEANUP] could not disconnect {} client for user {}: {e}",
                    self.backend,
                    self.user_id().0
                );
            }
        }
        if let Some(mut workdir) = self.workdir.take() {
            workdir.close();
        }
    }
}

/// Process-wide mapping from user id to their live authentication attempt.
///
/// The only shared mutable state in the core. Sessions are claimed out of
/// the map (`take`) for the duration of one event and re-inserted (`put`)
/// afterwards, so backend calls never run under the map lock; per-user event
/// serialization in the transport layer keeps take/put pairs race-free.
#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<i64, UserSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the session for `user_id`, removing it from the map.
    pub async fn take(&self, user_id: UserId) -> Option<UserSession> {
        self.inner.lock().await.remove(&user_id.0)
    }

    /// Insert (or re-insert) a session. Any prior session for the same user
    /// is released exactly once, enforcing at-most-one live attempt per id.
    pub async fn put(&self, session: UserSession) {
        let user_id = session.user_id();
        let prev = self.inner.lock().await.insert(user_id.0, session);
        if let Some(mut prev) = prev {
            prev.release().await;
        }
    }

    /// Remove and release the session for `user_id`, if any. Idempotent.
    pub async fn remove(&self, user_id: UserId) {
        let prev = self.inner.lock().await.remove(&user_id.0);
        if let Some(mut prev) = prev {
            prev.release().await;
        }
    }

    pub async fn contains(&self, user_id: UserId) -> bool {
        self.inner.lock().await.contains_key(&user_id.0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use async_trait::async_trait;

    use crate::backend::AuthError;

    use super::*;

    /// Client that only counts disconnects.
    struct CountingClient {
        disconnects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AuthClient for CountingClient {
        async fn send_code(&mut self, _phone: &str) -> Result<HandshakeToken, AuthError> {
            Err(AuthError::Unavailable("test client".into()))
        }

        async fn sign_in(
            &mut self,
            _phone: &str,
            _token: &HandshakeToken,
            _code: &str,
        ) -> Result<(), AuthError> {
            Err(AuthError::Unavailable("test client".into()))
        }

        async fn check_password(&mut self, _password: &str) -> Result<(), AuthError> {
            Err(AuthError::Unavailable("test client".into()))
        }

        async fn export_session(&mut self) -> Result<String, AuthError> {
            Err(AuthError::Unavailable("test client".into()))
        }

        async fn disconnect(&mut self) -> Result<(), AuthError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn session_for(user: i64, disconnects: Arc<AtomicUsize>) -> (UserSession, std::path::PathBuf) {
        let root = std::env::temp_dir().join(format!("ssb-store-test-{}", std::process::id()));
        let workdir =
            Workdir::create(&root, BackendKind::Legacy, UserId(user)).expect("workdir create");
        let path = workdir.path();
        let profile = UserProfile {
            user_id: UserId(user),
            username: None,
            first_name: "Test".to_string(),
        };
        let session = UserSession::new(
            profile,
            BackendKind::Legacy,
            Box::new(CountingClient { disconnects }),
            workdir,
        );
        (session, path)
    }

    #[tokio::test]
    async fn put_replaces_and_releases_prior_exactly_once() {
        let store = SessionStore::new();
        let first_disconnects = Arc::new(AtomicUsize::new(0));
        let second_disconnects = Arc::new(AtomicUsize::new(0));

        let (first, first_dir) = session_for(1, first_disconnects.clone());
        let (second, second_dir) = session_for(1, second_disconnects.clone());

        store.put(first).await;
        store.put(second).await;

        assert_eq!(first_disconnects.load(Ordering::SeqCst), 1);
        assert!(!first_dir.exists());

        // The replacement is still live and untouched.
        assert_eq!(second_disconnects.load(Ordering::SeqCst), 0);
        assert!(second_dir.exists());
        let kept = store.take(UserId(1)).await.expect("second session present");
        assert_eq!(kept.user_id(), UserId(1));

        store.put(kept).await;
        store.remove(UserId(1)).await;
        assert!(!second_dir.exists());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let store = SessionStore::new();
        let disconnects = Arc::new(AtomicUsize::new(0));
        let (session, dir) = session_for(2, disconnects.clone());

        store.put(session).await;
        store.remove(UserId(2)).await;
        store.remove(UserId(2)).await; // second remove on an absent id

        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert!(!dir.exists());
        assert!(!store.contains(UserId(2)).await);
    }

    #[tokio::test]
    async fn release_is_idempotent_on_the_session_itself() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let (mut session, dir) = session_for(3, disconnects.clone());

        session.release().await;
        session.release().await;

        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert!(!dir.exists());
    }
}
