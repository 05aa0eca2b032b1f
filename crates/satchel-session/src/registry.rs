//! Session registry with recency-ordered idle collection.

use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{DuplicatePolicy, HasSessionConfig, RegistryConfig};
use crate::error::{Error, Result};
use crate::record::{SessionRecord, Touch, TouchHandle};

/// Inner state protected by the registry lock.
struct RegistryState<K, V> {
    /// Live sessions by id, most recently touched first. Unbounded: sessions
    /// leave only through destroy, replace or GC.
    sessions: LruCache<String, Arc<SessionRecord<K, V>>>,

    /// Latest time handed out. Timestamps never go below it, so recency
    /// order is also last-access order even if the clock steps back.
    high_water: Option<DateTime<Utc>>,

    /// Serial for the next record created.
    next_serial: u64,
}

impl<K, V> RegistryState<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn new() -> Self {
        Self {
            sessions: LruCache::unbounded(),
            high_water: None,
            next_serial: 0,
        }
    }

    fn now(&mut self, clock: &dyn Clock) -> DateTime<Utc> {
        let now = match self.high_water {
            Some(high_water) => clock.now().max(high_water),
            None => clock.now(),
        };
        self.high_water = Some(now);
        now
    }

    /// Look up without changing recency.
    fn lookup(&self, id: &str) -> Option<Arc<SessionRecord<K, V>>> {
        self.sessions.peek(id).cloned()
    }

    fn holds(&self, id: &str, serial: u64) -> bool {
        self.sessions
            .peek(id)
            .is_some_and(|record| record.serial() == serial)
    }

    fn touch(&mut self, id: &str, serial: u64, clock: &dyn Clock) -> bool {
        if !self.holds(id, serial) {
            return false;
        }
        let now = self.now(clock);
        if let Some(record) = self.sessions.peek(id) {
            record.stamp(now);
            trace!(session_id = %id, "Session touched");
        }
        self.sessions.promote(id);
        true
    }

    fn remove(&mut self, id: &str) -> Option<Arc<SessionRecord<K, V>>> {
        self.sessions.pop(id)
    }
}

/// Shared part of the registry. Records hold a weak `dyn Touch` to it.
struct RegistryInner<K, V> {
    state: Mutex<RegistryState<K, V>>,
    clock: Arc<dyn Clock>,
}

impl<K, V> Touch for RegistryInner<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn touch(&self, id: &str, serial: u64) {
        self.state.lock().touch(id, serial, self.clock.as_ref());
    }

    fn holds(&self, id: &str, serial: u64) -> bool {
        self.state.lock().holds(id, serial)
    }
}

/// Point-in-time view of the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of live sessions.
    pub live: usize,

    /// Last access of the most recently touched session.
    pub newest_access: Option<DateTime<Utc>>,

    /// Last access of the least recently touched session; the next one GC
    /// would look at.
    pub oldest_access: Option<DateTime<Utc>>,
}

/// In-process session registry.
///
/// Maps session ids to [`SessionRecord`]s and keeps them ordered by recency
/// so idle collection only walks the stale tail. Lookup and recency order
/// live in one [`LruCache`] behind one lock; no operation can observe one
/// without the other.
///
/// Cloning is cheap and yields a handle to the same registry. The registry
/// owns no timer: callers run [`gc`](Self::gc) or [`sweep`](Self::sweep) on
/// their own schedule, e.g. every [`RegistryConfig::gc_interval`].
pub struct SessionRegistry<K = String, V = serde_json::Value> {
    inner: Arc<RegistryInner<K, V>>,
    config: RegistryConfig,
}

impl<K, V> SessionRegistry<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a registry on the system clock.
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a registry reading time from `clock`.
    pub fn with_clock(config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                state: Mutex::new(RegistryState::new()),
                clock,
            }),
            config,
        }
    }

    /// Create a registry from any configuration provider.
    pub fn from_session_config<C: HasSessionConfig>(config: &C) -> Self {
        let config = RegistryConfig::new()
            .with_max_idle(config.max_idle())
            .with_gc_interval(config.gc_interval())
            .with_duplicate_policy(config.duplicate_policy());
        Self::new(config)
    }

    /// Get the registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Start a new, empty session under `id`.
    ///
    /// If `id` is already live the configured [`DuplicatePolicy`] decides:
    /// `Reject` returns [`Error::DuplicateSession`], `Replace` drops the live
    /// record (it becomes detached) and starts over.
    pub fn init(&self, id: &str) -> Result<Arc<SessionRecord<K, V>>> {
        let mut state = self.inner.state.lock();

        if state.sessions.contains(id) {
            match self.config.duplicate_policy {
                DuplicatePolicy::Reject => {
                    warn!(session_id = %id, "Rejected init of live session");
                    return Err(Error::DuplicateSession(id.to_string()));
                }
                DuplicatePolicy::Replace => {
                    state.remove(id);
                    debug!(session_id = %id, "Replacing live session");
                }
            }
        }

        Ok(self.create_locked(&mut state, id))
    }

    /// Get the session for `id`, creating it if it is not live.
    ///
    /// A hit does not count as a touch; bag access on the returned record
    /// does. Never fails with [`Error::NotFound`]; use
    /// [`require`](Self::require) for a strict lookup.
    pub fn read(&self, id: &str) -> Result<Arc<SessionRecord<K, V>>> {
        let mut state = self.inner.state.lock();

        if let Some(record) = state.lookup(id) {
            trace!(session_id = %id, "Session found in registry");
            return Ok(record);
        }

        debug!(session_id = %id, "Session miss, creating on read");
        Ok(self.create_locked(&mut state, id))
    }

    /// Get the session for `id` without creating it.
    pub fn require(&self, id: &str) -> Result<Arc<SessionRecord<K, V>>> {
        self.inner
            .state
            .lock()
            .lookup(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Whether `id` is live.
    pub fn exists(&self, id: &str) -> bool {
        self.inner.state.lock().sessions.contains(id)
    }

    /// Remove the session. Removing an absent id is a no-op.
    pub fn destroy(&self, id: &str) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.remove(id).is_some() {
            debug!(session_id = %id, live = state.sessions.len(), "Session destroyed");
        }
        Ok(())
    }

    /// Mark the session as just accessed. Does not create absent ids.
    pub fn update(&self, id: &str) -> Result<()> {
        let mut state = self.inner.state.lock();
        let Some(serial) = state.sessions.peek(id).map(|record| record.serial()) else {
            trace!(session_id = %id, "Update of absent session ignored");
            return Ok(());
        };
        state.touch(id, serial, self.inner.clock.as_ref());
        Ok(())
    }

    /// Remove every session idle for more than `max_idle_secs` seconds.
    ///
    /// Walks from the least recently touched end and stops at the first
    /// session still inside its budget, so the cost is proportional to the
    /// number removed. Times compare at whole-second resolution: a session
    /// goes once `last_accessed + max_idle_secs < now` in Unix seconds.
    ///
    /// Returns the number of sessions removed.
    pub fn gc(&self, max_idle_secs: i64) -> usize {
        let mut state = self.inner.state.lock();
        let now = state.now(self.inner.clock.as_ref()).timestamp();
        let mut removed = 0;

        while let Some((_, oldest)) = state.sessions.peek_lru() {
            let deadline = oldest
                .last_accessed()
                .timestamp()
                .saturating_add(max_idle_secs);
            if deadline >= now {
                break;
            }

            if let Some((id, _)) = state.sessions.pop_lru() {
                debug!(session_id = %id, "Collected idle session");
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(count = removed, live = state.sessions.len(), "Collected idle sessions");
        }

        removed
    }

    /// Run [`gc`](Self::gc) with the configured idle lifetime.
    pub fn sweep(&self) -> usize {
        self.gc(self.config.max_idle_secs)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.inner.state.lock().sessions.len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().sessions.is_empty()
    }

    /// Live session ids, most recently touched first.
    pub fn ids(&self) -> Vec<String> {
        let state = self.inner.state.lock();
        state.sessions.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Snapshot of live count and the access times at both ends of recency.
    pub fn stats(&self) -> RegistryStats {
        let state = self.inner.state.lock();
        RegistryStats {
            live: state.sessions.len(),
            newest_access: state.sessions.iter().next().map(|(_, r)| r.last_accessed()),
            oldest_access: state.sessions.peek_lru().map(|(_, r)| r.last_accessed()),
        }
    }

    /// Remove every session. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut state = self.inner.state.lock();
        let removed = state.sessions.len();
        state.sessions.clear();
        if removed > 0 {
            debug!(count = removed, "Cleared session registry");
        }
        removed
    }

    fn touch_target(&self) -> Weak<dyn Touch> {
        let weak: Weak<RegistryInner<K, V>> = Arc::downgrade(&self.inner);
        weak
    }

    fn create_locked(
        &self,
        state: &mut RegistryState<K, V>,
        id: &str,
    ) -> Arc<SessionRecord<K, V>> {
        let now = state.now(self.inner.clock.as_ref());
        let serial = state.next_serial;
        state.next_serial += 1;

        let owner = TouchHandle::new(self.touch_target(), serial);
        let record = Arc::new(SessionRecord::new(id.to_string(), now, owner));
        state.sessions.put(id.to_string(), Arc::clone(&record));

        debug!(session_id = %id, live = state.sessions.len(), "Session created");
        record
    }
}

impl<K, V> Clone for SessionRegistry<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            config: self.config.clone(),
        }
    }
}

impl<K, V> Default for SessionRegistry<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl<K, V> fmt::Debug for SessionRegistry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("live", &self.inner.state.lock().sessions.len())
            .field("config", &self.config)
            .finish()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;
    use proptest::prelude::*;

    type Registry = SessionRegistry<String, u8>;

    #[derive(Debug, Clone)]
    enum Op {
        Init(u8),
        Read(u8),
        Destroy(u8),
        Update(u8),
        Set(u8),
        Get(u8),
        Advance(u8),
        Gc(u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..6).prop_map(Op::Init),
            (0u8..6).prop_map(Op::Read),
            (0u8..6).prop_map(Op::Destroy),
            (0u8..6).prop_map(Op::Update),
            (0u8..6).prop_map(Op::Set),
            (0u8..6).prop_map(Op::Get),
            (0u8..20).prop_map(Op::Advance),
            (0u8..30).prop_map(Op::Gc),
        ]
    }

    fn id(n: u8) -> String {
        format!("s-{n}")
    }

    proptest! {
        /// Property: after any operation sequence, every entry is keyed by its
        /// own id and recency is sorted by last access.
        #[test]
        fn lookup_and_recency_stay_consistent(ops in prop::collection::vec(op_strategy(), 0..80)) {
            let clock = Arc::new(ManualClock::starting_now());
            let registry = Registry::with_clock(RegistryConfig::default(), clock.clone());

            for op in ops {
                match op {
                    Op::Init(n) => { let _ = registry.init(&id(n)); }
                    Op::Read(n) => { registry.read(&id(n)).unwrap(); }
                    Op::Destroy(n) => registry.destroy(&id(n)).unwrap(),
                    Op::Update(n) => registry.update(&id(n)).unwrap(),
                    Op::Set(n) => {
                        if let Ok(record) = registry.require(&id(n)) {
                            record.set("k".to_string(), n).unwrap();
                        }
                    }
                    Op::Get(n) => {
                        if let Ok(record) = registry.require(&id(n)) {
                            record.get(&"k".to_string());
                        }
                    }
                    Op::Advance(secs) => clock.advance(Duration::seconds(i64::from(secs))),
                    Op::Gc(secs) => { registry.gc(i64::from(secs)); }
                }

                prop_assert_eq!(registry.len(), registry.ids().len());
                prop_assert_eq!(registry.is_empty(), registry.len() == 0);

                let state = registry.inner.state.lock();
                let mut previous: Option<DateTime<Utc>> = None;
                for (id, record) in state.sessions.iter() {
                    prop_assert_eq!(record.session_id(), id.as_str());
                    if let Some(previous) = previous {
                        prop_assert!(previous >= record.last_accessed());
                    }
                    previous = Some(record.last_accessed());
                }
            }
        }

        /// Property: GC removes exactly the sessions idle past the limit.
        #[test]
        fn gc_removes_exactly_the_stale_set(
            gaps in prop::collection::vec(0i64..50, 1..20),
            limit in 0i64..200,
        ) {
            let clock = Arc::new(ManualClock::starting_now());
            let registry = Registry::with_clock(RegistryConfig::default(), clock.clone());

            let mut created = Vec::new();
            for (n, gap) in gaps.iter().enumerate() {
                clock.advance(Duration::seconds(*gap));
                let record = registry.init(&format!("s-{n}")).unwrap();
                created.push(record);
            }

            let now = clock.now().timestamp();
            let expected_stale: Vec<String> = created
                .iter()
                .filter(|r| now - r.last_accessed().timestamp() > limit)
                .map(|r| r.session_id().to_string())
                .collect();

            let removed = registry.gc(limit);
            prop_assert_eq!(removed, expected_stale.len());

            for record in &created {
                let stale = expected_stale.iter().any(|s| s == record.session_id());
                prop_assert_eq!(registry.exists(record.session_id()), !stale);
                prop_assert_eq!(record.is_live(), !stale);
            }
            prop_assert_eq!(registry.ids().len(), created.len() - expected_stale.len());
        }
    }
}
