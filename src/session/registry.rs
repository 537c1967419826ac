//! Publishes active debug sessions to other evaluation contexts (scripting consoles and alike).

use crate::session::DebugSession;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Shared handle of a published session.
pub type SessionHandle = Arc<Mutex<DebugSession>>;

#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug)]
pub struct SessionId(Uuid);

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

static GLOBAL: Lazy<SessionRegistry> = Lazy::new(SessionRegistry::default);

/// Sessions keyed by identifier.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    /// Process wide registry.
    pub fn global() -> &'static SessionRegistry {
        &GLOBAL
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a session, return its identifier.
    pub fn register(&self, session: SessionHandle) -> SessionId {
        let id = SessionId(Uuid::new_v4());
        self.sessions().insert(id, session);
        id
    }

    pub fn get(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions().get(&id).cloned()
    }

    /// Withdraw a session, other holders of the handle keep it alive.
    pub fn remove(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions().remove(&id)
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions().keys().copied().collect()
    }
}
