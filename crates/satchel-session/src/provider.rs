//! Session contract consumed by request-handling layers.
//!
//! Middleware code should depend on these traits rather than on
//! [`SessionRegistry`] directly, so the in-memory registry can be swapped
//! for another backend without touching the transport side.

use std::hash::Hash;
use std::sync::Arc;

use crate::error::Result;
use crate::record::SessionRecord;
use crate::registry::SessionRegistry;

/// A single session's value bag.
pub trait Session: Send + Sync {
    /// Bag key type.
    type Key;
    /// Bag value type.
    type Value;

    /// Insert or overwrite a value. Counts as activity.
    fn set(&self, key: Self::Key, value: Self::Value) -> Result<()>;

    /// Read a value. Counts as activity.
    fn get(&self, key: &Self::Key) -> Option<Self::Value>;

    /// Remove a value if present. Counts as activity.
    fn delete(&self, key: &Self::Key) -> Result<()>;

    /// The id this session is addressed by.
    fn session_id(&self) -> &str;
}

/// Owner of sessions: lifecycle plus idle collection.
pub trait SessionProvider: Send + Sync {
    /// Session handle this provider hands out.
    type Session: Session;

    /// Start a new session under `id`.
    fn init(&self, id: &str) -> Result<Arc<Self::Session>>;

    /// Get the session for `id`, creating it if absent.
    fn read(&self, id: &str) -> Result<Arc<Self::Session>>;

    /// Remove the session. Idempotent.
    fn destroy(&self, id: &str) -> Result<()>;

    /// Remove sessions idle for more than `max_idle_secs`. Returns how many
    /// were removed.
    fn gc(&self, max_idle_secs: i64) -> usize;

    /// Mark the session as just accessed. No-op if absent.
    fn update(&self, id: &str) -> Result<()>;

    /// Whether `id` is live, without creating it.
    fn exists(&self, id: &str) -> bool;
}

impl<K, V> Session for SessionRecord<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    type Key = K;
    type Value = V;

    fn set(&self, key: K, value: V) -> Result<()> {
        SessionRecord::set(self, key, value)
    }

    fn get(&self, key: &K) -> Option<V> {
        SessionRecord::get(self, key)
    }

    fn delete(&self, key: &K) -> Result<()> {
        SessionRecord::delete(self, key)
    }

    fn session_id(&self) -> &str {
        SessionRecord::session_id(self)
    }
}

impl<K, V> SessionProvider for SessionRegistry<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    type Session = SessionRecord<K, V>;

    fn init(&self, id: &str) -> Result<Arc<SessionRecord<K, V>>> {
        SessionRegistry::init(self, id)
    }

    fn read(&self, id: &str) -> Result<Arc<SessionRecord<K, V>>> {
        SessionRegistry::read(self, id)
    }

    fn destroy(&self, id: &str) -> Result<()> {
        SessionRegistry::destroy(self, id)
    }

    fn gc(&self, max_idle_secs: i64) -> usize {
        SessionRegistry::gc(self, max_idle_secs)
    }

    fn update(&self, id: &str) -> Result<()> {
        SessionRegistry::update(self, id)
    }

    fn exists(&self, id: &str) -> bool {
        SessionRegistry::exists(self, id)
    }
}
