//! Session records and the touch capability they hold.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Weak;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::error::Result;

/// Registry-side half of a touch: refresh the record stored under `id`,
/// but only if it is still the record with this `serial`.
pub(crate) trait Touch: Send + Sync {
    fn touch(&self, id: &str, serial: u64);

    fn holds(&self, id: &str, serial: u64) -> bool;
}

/// Narrow back-reference from a record to its registry.
///
/// Carries the serial the registry gave the record at creation, so a record
/// that was destroyed and replaced under the same id cannot touch its
/// successor. Weak, so a record kept alive by a caller does not keep its
/// registry alive.
#[derive(Clone)]
pub(crate) struct TouchHandle {
    target: Weak<dyn Touch>,
    serial: u64,
}

impl TouchHandle {
    pub(crate) fn new(target: Weak<dyn Touch>, serial: u64) -> Self {
        Self { target, serial }
    }

    fn touch(&self, id: &str) {
        if let Some(target) = self.target.upgrade() {
            target.touch(id, self.serial);
        }
    }

    fn is_live(&self, id: &str) -> bool {
        self.target
            .upgrade()
            .is_some_and(|target| target.holds(id, self.serial))
    }
}

/// One session: an id, a last-access time, and a key/value bag.
///
/// Every bag access (including reads) counts as activity and refreshes the
/// session's position in its registry. Records never evict themselves;
/// expiry is decided by [`SessionRegistry::gc`](crate::SessionRegistry::gc).
///
/// A record that has been destroyed or collected keeps serving bag
/// operations to whoever still holds it, but its touches no longer reach
/// the registry.
pub struct SessionRecord<K = String, V = serde_json::Value> {
    id: String,
    last_accessed: Mutex<DateTime<Utc>>,
    bag: RwLock<HashMap<K, V>>,
    owner: TouchHandle,
}

impl<K, V> SessionRecord<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub(crate) fn new(id: String, now: DateTime<Utc>, owner: TouchHandle) -> Self {
        Self {
            id,
            last_accessed: Mutex::new(now),
            bag: RwLock::new(HashMap::new()),
            owner,
        }
    }

    /// Insert or overwrite `key`.
    pub fn set(&self, key: K, value: V) -> Result<()> {
        self.bag.write().insert(key, value);
        self.owner.touch(&self.id);
        Ok(())
    }

    /// Value stored under `key`, if any.
    pub fn get(&self, key: &K) -> Option<V> {
        self.owner.touch(&self.id);
        self.bag.read().get(key).cloned()
    }

    /// Remove `key`. Absent keys are a no-op.
    pub fn delete(&self, key: &K) -> Result<()> {
        self.bag.write().remove(key);
        self.owner.touch(&self.id);
        Ok(())
    }

    /// The id this session was created under.
    pub fn session_id(&self) -> &str {
        &self.id
    }

    /// Time of the last touch.
    pub fn last_accessed(&self) -> DateTime<Utc> {
        *self.last_accessed.lock()
    }

    /// Number of keys in the bag. Does not touch.
    pub fn len(&self) -> usize {
        self.bag.read().len()
    }

    /// Does not touch.
    pub fn is_empty(&self) -> bool {
        self.bag.read().is_empty()
    }

    /// Whether `key` is in the bag. Does not touch.
    pub fn contains_key(&self, key: &K) -> bool {
        self.bag.read().contains_key(key)
    }

    /// Whether the registry still holds this exact record.
    pub fn is_live(&self) -> bool {
        self.owner.is_live(&self.id)
    }

    /// Identity of this record within its registry.
    pub(crate) fn serial(&self) -> u64 {
        self.owner.serial
    }

    /// Called by the registry with its lock held.
    pub(crate) fn stamp(&self, now: DateTime<Utc>) {
        let mut last = self.last_accessed.lock();
        if now > *last {
            *last = now;
        }
    }
}

impl<K, V> fmt::Debug for SessionRecord<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecord")
            .field("id", &self.id)
            .field("last_accessed", &*self.last_accessed.lock())
            .field("keys", &self.bag.read().len())
            .finish()
    }
}
