use std::{collections::HashMap, sync::Arc};

use super::{port::CredentialBackend, types::BackendKind};

/// Maps a backend identifier to its implementation.
///
/// Built once at startup from the deployment's enabled backends; selecting a
/// kind that was never registered is rejected before any session is created.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<BackendKind, Arc<dyn CredentialBackend>>,
    order: Vec<BackendKind>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, backend: Arc<dyn CredentialBackend>) {
        let kind = backend.kind();
        if self.backends.insert(kind, backend).is_none() {
            self.order.push(kind);
        }
    }

    pub fn resolve(&self, kind: BackendKind) -> Option<Arc<dyn CredentialBackend>> {
        self.backends.get(&kind).cloned()
    }

    /// Registration order, used for the selection keyboard.
    pub fn kinds(&self) -> &[BackendKind] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::backend::port::{AuthClient, AuthError};
    use crate::domain::UserId;

    use super::*;

    struct FakeBackend(BackendKind);

    impl CredentialBackend for FakeBackend {
        fn kind(&self) -> BackendKind {
            self.0
        }

        fn create_client(
            &self,
            _user_id: UserId,
            _workdir: &Path,
        ) -> Result<Box<dyn AuthClient>, AuthError> {
            Err(AuthError::Unavailable("fake".into()))
        }
    }

    #[test]
    fn resolve_and_ordering() {
        let mut reg = BackendRegistry::new();
        assert!(reg.is_empty());
        assert!(reg.resolve(BackendKind::Legacy).is_none());

        reg.register(Arc::new(FakeBackend(BackendKind::Modern)));
        reg.register(Arc::new(FakeBackend(BackendKind::Legacy)));

        assert!(reg.resolve(BackendKind::Legacy).is_some());
        assert_eq!(reg.kinds(), &[BackendKind::Modern, BackendKind::Legacy]);

        // Re-registering a kind replaces it without duplicating the order.
        reg.register(Arc::new(FakeBackend(BackendKind::Modern)));
        assert_eq!(reg.kinds().len(), 2);
    }
}
