//! Persistence for in-flight hands.
//!
//! Hands and per-room meta records are stored as JSON with a TTL behind the
//! [`KeyValueStore`] trait. [`GameStateStore`] adds typed access and the
//! per-room exclusive section every hand mutation runs in.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;

use cardroom_engine::RoomId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("State store unavailable: {0}")]
    Unavailable(String),
    #[error("Stored state for {key} could not be decoded: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("State could not be encoded: {0}")]
    Encode(String),
}

/// A string key-value backend with per-entry expiry.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;
    /// Returns whether a live entry was removed.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;
    /// Drops expired entries and returns how many went. Backends that
    /// expire keys on their own keep the default.
    fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

#[derive(Debug)]
struct StoredValue {
    value: String,
    expires_at: Instant,
}

/// Process-local backend. Expired entries are invisible to reads and are
/// dropped lazily or by [`KeyValueStore::purge_expired`].
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    entries: RwLock<HashMap<String, StoredValue>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .map(|g| g.values().filter(|v| v.expires_at > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("in-memory store lock poisoned".to_string())
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        {
            let guard = self.entries.read().map_err(|_| poisoned())?;
            match guard.get(key) {
                Some(v) if v.expires_at > now => return Ok(Some(v.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // expired: drop it unless it was refreshed in between
        let mut guard = self.entries.write().map_err(|_| poisoned())?;
        if guard.get(key).is_some_and(|v| v.expires_at <= now) {
            guard.remove(key);
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let mut guard = self.entries.write().map_err(|_| poisoned())?;
        guard.insert(
            key.to_string(),
            StoredValue {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut guard = self.entries.write().map_err(|_| poisoned())?;
        Ok(guard
            .remove(key)
            .is_some_and(|v| v.expires_at > Instant::now()))
    }

    fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let mut guard = self.entries.write().map_err(|_| poisoned())?;
        let before = guard.len();
        guard.retain(|_, v| v.expires_at > now);
        Ok(before - guard.len())
    }
}

/// Typed keys for everything a room keeps in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    PokerHand(RoomId),
    PokerMeta(RoomId),
    BlotHand(RoomId),
    BlotMeta(RoomId),
}

impl StateKey {
    pub fn room_id(self) -> RoomId {
        match self {
            StateKey::PokerHand(r)
            | StateKey::PokerMeta(r)
            | StateKey::BlotHand(r)
            | StateKey::BlotMeta(r) => r,
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateKey::PokerHand(r) => write!(f, "poker:hand:{}", r),
            StateKey::PokerMeta(r) => write!(f, "poker:meta:{}", r),
            StateKey::BlotHand(r) => write!(f, "blot:hand:{}", r),
            StateKey::BlotMeta(r) => write!(f, "blot:meta:{}", r),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub purged: usize,
    pub idle_locks: usize,
}

pub struct GameStateStore {
    backend: Arc<dyn KeyValueStore>,
    ttl: RwLock<Duration>,
    room_locks: Mutex<HashMap<RoomId, Arc<Mutex<()>>>>,
}

impl fmt::Debug for GameStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameStateStore")
            .field("ttl", &self.ttl())
            .finish()
    }
}

impl GameStateStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl: RwLock::new(ttl),
            room_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(InMemoryKeyValueStore::new()), ttl)
    }

    /// Missing or expired state is `Ok(None)`.
    pub fn get<T: DeserializeOwned>(&self, key: StateKey) -> Result<Option<T>, StoreError> {
        let name = key.to_string();
        match self.backend.get(&name)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Corrupt {
                    key: name,
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Stores `value` and restarts its TTL.
    pub fn put<T: Serialize>(&self, key: StateKey, value: &T) -> Result<(), StoreError> {
        self.put_with_ttl(key, value, self.ttl())
    }

    pub fn ttl(&self) -> Duration {
        *self.ttl.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies to writes from now on; stored entries keep their expiry.
    pub fn set_ttl(&self, ttl: Duration) {
        *self.ttl.write().unwrap_or_else(PoisonError::into_inner) = ttl;
    }

    pub fn put_with_ttl<T: Serialize>(
        &self,
        key: StateKey,
        value: &T,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value).map_err(|e| StoreError::Encode(e.to_string()))?;
        self.backend.set(&key.to_string(), raw, ttl)?;
        tracing::trace!(key = %key, ttl_secs = ttl.as_secs(), "state stored");
        Ok(())
    }

    pub fn delete(&self, key: StateKey) -> Result<bool, StoreError> {
        self.backend.delete(&key.to_string())
    }

    /// Frees expired state and the locks of rooms nobody is inside. Run
    /// periodically: rooms that are abandoned are never read again.
    pub fn sweep(&self) -> Result<SweepStats, StoreError> {
        let purged = self.backend.purge_expired()?;
        let mut locks = self
            .room_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = locks.len();
        // only the map holds an idle lock, and new holders need the map
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        let stats = SweepStats {
            purged,
            idle_locks: before - locks.len(),
        };
        if stats.purged > 0 || stats.idle_locks > 0 {
            tracing::debug!(
                purged = stats.purged,
                idle_locks = stats.idle_locks,
                "state store swept"
            );
        }
        Ok(stats)
    }

    pub fn room_lock_count(&self) -> usize {
        self.room_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Runs `f` while holding the room's exclusive lock, inside a `room`
    /// span. Rooms never contend with each other.
    ///
    /// The lock guards no data, so a poisoned lock is reacquired.
    pub fn with_room_lock<T>(&self, room_id: RoomId, f: impl FnOnce() -> T) -> T {
        let _span = tracing::info_span!("room", room_id).entered();
        let lock = {
            let mut locks = self
                .room_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(room_id).or_default())
        };
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}
