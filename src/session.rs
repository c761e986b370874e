//! Session tokens.
//!
//! A session is minted by `initialize` and identified by an opaque token the
//! client echoes back in the `Mcp-Session-Id` header. Sessions are not tied to
//! TCP connections, so the store is shared by every connection thread.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A session record. Never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub created_at: Instant,
}

/// Thread-safe map from session token to [`Session`].
///
/// # Examples
///
/// ```
/// use termcp::session::SessionStore;
///
/// let store = SessionStore::new(None);
/// let id = store.create();
/// assert!(store.exists(&id));
/// assert!(store.remove(&id));
/// assert!(!store.exists(&id));
/// ```
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    ttl: Option<Duration>,
}

impl SessionStore {
    /// Creates an empty store. With a `ttl`, sessions older than it count as gone.
    pub fn new(ttl: Option<Duration>) -> SessionStore {
        SessionStore {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        // the map stays consistent even if a holder panicked
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn expired(&self, session: &Session, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.duration_since(session.created_at) >= ttl)
    }

    /// Mints a new session and returns its token.
    pub fn create(&self) -> String {
        let mut sessions = self.lock();
        let now = Instant::now();
        if self.ttl.is_some() {
            sessions.retain(|_, session| !self.expired(session, now));
        }
        loop {
            let id = new_token();
            if !sessions.contains_key(&id) {
                sessions.insert(id.clone(), Session { created_at: now });
                return id;
            }
        }
    }

    /// Whether `id` names a live session.
    pub fn exists(&self, id: &str) -> bool {
        let mut sessions = self.lock();
        match sessions.get(id) {
            Some(session) if self.expired(session, Instant::now()) => {
                sessions.remove(id);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Drops a session. Returns whether it was live.
    pub fn remove(&self, id: &str) -> bool {
        let now = Instant::now();
        match self.lock().remove(id) {
            Some(session) => !self.expired(&session, now),
            None => false,
        }
    }

    /// Drops every session.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of stored sessions, including expired ones not yet pruned.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 128 random bits, formatted like a UUID.
fn new_token() -> String {
    let bits: u128 = rand::random();
    let hex = format!("{bits:032x}");
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn tokens_are_distinct_and_uuid_shaped() {
        let store = SessionStore::new(None);
        let ids: HashSet<String> = (0..100).map(|_| store.create()).collect();
        assert_eq!(ids.len(), 100);
        assert_eq!(store.len(), 100);
        for id in &ids {
            assert_eq!(id.len(), 36);
            assert_eq!(id.matches('-').count(), 4);
        }
    }

    #[test]
    fn remove_is_idempotent() {
        let store = SessionStore::new(None);
        let id = store.create();
        assert!(store.remove(&id));
        assert!(!store.remove(&id));
        assert!(!store.exists(&id));
        assert!(!store.exists("never-minted"));
    }

    #[test]
    fn ttl_expires_sessions() {
        let store = SessionStore::new(Some(Duration::from_millis(20)));
        let id = store.create();
        assert!(store.exists(&id));
        std::thread::sleep(Duration::from_millis(40));
        assert!(!store.exists(&id));
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_access() {
        let store = Arc::new(SessionStore::new(None));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let id = store.create();
                        assert!(store.exists(&id));
                        assert!(store.remove(&id));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(store.is_empty());
    }
}
