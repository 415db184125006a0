//! The data engine.
//!
//! Every data type lives in its own store, and every store is an actor: a tokio task that owns
//! its map exclusively and mutates it only in response to requests taken from its own queue.
//! Callers hold a cheap, cloneable handle that pushes a request together with a `oneshot`
//! responder and awaits the reply. Because a store task is the only code touching its map, no
//! lock guards the data itself. The [`TypeRegistry`] is the single structure shared across
//! stores.

pub mod kv;
pub mod list;
pub mod registry;
pub mod stream;

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error as ThisError;
use tokio::sync::{mpsc, oneshot};

use crate::config::Role;

pub use kv::KvStore;
pub use list::ListStore;
pub use registry::{TypeRegistry, ValueType};
pub use stream::StreamStore;

/// How often the key/value store actively evicts expired keys.
pub const DEFAULT_EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// How many processed commands the list and stream stores let pass between waiter cleanups.
pub const DEFAULT_WAITER_CLEANUP_EVERY: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum StoreError {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
    #[error("ERR {0}")]
    InvalidStreamId(String),
    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,
    #[error("ERR increment or decrement would overflow")]
    Overflow,
    #[error("ERR invalid expire time in 'set' command")]
    InvalidExpireTime,
    #[error("store task is no longer running")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub expiry_sweep_interval: Duration,
    pub waiter_cleanup_every: u64,
    pub role: Role,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            expiry_sweep_interval: DEFAULT_EXPIRY_SWEEP_INTERVAL,
            waiter_cleanup_every: DEFAULT_WAITER_CLEANUP_EVERY,
            role: Role::Master,
        }
    }
}

/// Handles to all stores plus the shared type registry and the replication role reported by
/// `INFO`. Cloning is cheap.
#[derive(Clone)]
pub struct Store {
    kv: KvStore,
    lists: ListStore,
    streams: StreamStore,
    registry: TypeRegistry,
    role: Role,
}

impl Store {
    /// Spawns the store actors on the current tokio runtime.
    pub fn new() -> Store {
        Self::with_config(&StoreConfig::default())
    }

    pub fn with_config(config: &StoreConfig) -> Store {
        let registry = TypeRegistry::new();

        Store {
            kv: KvStore::spawn(registry.clone(), config.expiry_sweep_interval),
            lists: ListStore::spawn(registry.clone(), config.waiter_cleanup_every),
            streams: StreamStore::spawn(registry.clone(), config.waiter_cleanup_every),
            registry,
            role: config.role.clone(),
        }
    }

    pub fn kv(&self) -> &KvStore {
        &self.kv
    }

    pub fn lists(&self) -> &ListStore {
        &self.lists
    }

    pub fn streams(&self) -> &StreamStore {
        &self.streams
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Returns the type currently stored at `key`.
    ///
    /// Strings are confirmed with the key/value store so that a key whose TTL elapsed is reported
    /// as missing even before the active sweep has run.
    pub async fn value_type(&self, key: &str) -> Result<Option<ValueType>, StoreError> {
        match self.registry.get(key) {
            Some(ValueType::String) => {
                let exists = self.kv.exists(key).await?;
                Ok(exists.then_some(ValueType::String))
            }
            other => Ok(other),
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

/// Sends a request built around a fresh responder and waits for the actor's answer.
async fn call<R, T>(
    sender: &mpsc::UnboundedSender<R>,
    request: impl FnOnce(oneshot::Sender<T>) -> R,
) -> Result<T, StoreError> {
    let (tx, rx) = oneshot::channel();
    sender.send(request(tx)).map_err(|_| StoreError::Closed)?;
    rx.await.map_err(|_| StoreError::Closed)
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
