use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::store::{call, now_ms, StoreError, TypeRegistry, ValueType};

/// A string value with an optional absolute expiry, in milliseconds since the Unix epoch.
/// No expiry means the value never expires.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub value: Bytes,
    pub expires_at_ms: Option<u64>,
}

impl Entry {
    fn is_expired(&self, now_ms: u64) -> bool {
        matches!(self.expires_at_ms, Some(expires_at) if expires_at <= now_ms)
    }
}

#[derive(Debug)]
enum Request {
    Set {
        key: String,
        entry: Entry,
        responder: oneshot::Sender<Result<(), StoreError>>,
    },
    Get {
        key: String,
        responder: oneshot::Sender<Option<Bytes>>,
    },
    Exists {
        key: String,
        responder: oneshot::Sender<bool>,
    },
    IncrBy {
        key: String,
        increment: i64,
        responder: oneshot::Sender<Result<i64, StoreError>>,
    },
}

/// Handle to the key/value store actor.
#[derive(Clone)]
pub struct KvStore {
    sender: mpsc::UnboundedSender<Request>,
}

impl KvStore {
    pub(crate) fn spawn(registry: TypeRegistry, sweep_interval: Duration) -> KvStore {
        let (sender, receiver) = mpsc::unbounded_channel();
        let actor = KvActor {
            entries: HashMap::new(),
            registry,
            receiver,
        };

        tokio::spawn(actor.run(sweep_interval));

        KvStore { sender }
    }

    /// Stores `value` at `key`, replacing any previous value and TTL.
    pub async fn set(
        &self,
        key: String,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let expires_at_ms = ttl
            .map(|ttl| {
                u64::try_from(ttl.as_millis())
                    .ok()
                    .and_then(|ttl_ms| now_ms().checked_add(ttl_ms))
                    .filter(|at| i64::try_from(*at).is_ok())
                    .ok_or(StoreError::InvalidExpireTime)
            })
            .transpose()?;
        let entry = Entry {
            value,
            expires_at_ms,
        };

        call(&self.sender, |responder| Request::Set {
            key,
            entry,
            responder,
        })
        .await?
    }

    pub async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        call(&self.sender, |responder| Request::Get {
            key: key.to_string(),
            responder,
        })
        .await
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        call(&self.sender, |responder| Request::Exists {
            key: key.to_string(),
            responder,
        })
        .await
    }

    /// Adds `increment` to the integer stored at `key`. A missing key counts as `0`.
    pub async fn incr_by(&self, key: &str, increment: i64) -> Result<i64, StoreError> {
        call(&self.sender, |responder| Request::IncrBy {
            key: key.to_string(),
            increment,
            responder,
        })
        .await?
    }
}

struct KvActor {
    entries: HashMap<String, Entry>,
    registry: TypeRegistry,
    receiver: mpsc::UnboundedReceiver<Request>,
}

impl KvActor {
    async fn run(mut self, sweep_interval: Duration) {
        // The active sweep is an arm of this loop rather than a separate task, so it never races
        // with request processing.
        let mut sweep = interval_at(Instant::now() + sweep_interval, sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                request = self.receiver.recv() => match request {
                    Some(request) => self.handle(request),
                    None => break,
                },
                _ = sweep.tick() => {
                    let removed = self.remove_expired_keys();
                    if removed > 0 {
                        debug!(removed, "Removed expired keys");
                    }
                }
            }
        }

        debug!("Key/value store stopped");
    }

    fn handle(&mut self, request: Request) {
        match request {
            Request::Set {
                key,
                entry,
                responder,
            } => {
                let res = self.set(key, entry);
                let _ = responder.send(res);
            }
            Request::Get { key, responder } => {
                let value = self.live_entry(&key).map(|entry| entry.value.clone());
                let _ = responder.send(value);
            }
            Request::Exists { key, responder } => {
                let exists = self.live_entry(&key).is_some();
                let _ = responder.send(exists);
            }
            Request::IncrBy {
                key,
                increment,
                responder,
            } => {
                let res = self.incr_by(key, increment);
                let _ = responder.send(res);
            }
        }
    }

    fn set(&mut self, key: String, entry: Entry) -> Result<(), StoreError> {
        self.registry
            .claim_until(&key, ValueType::String, entry.expires_at_ms)?;
        trace!(key, expires_at_ms = ?entry.expires_at_ms, "Setting key");
        self.entries.insert(key, entry);
        Ok(())
    }

    fn incr_by(&mut self, key: String, increment: i64) -> Result<i64, StoreError> {
        self.registry.claim(&key, ValueType::String)?;

        let current = match self.live_entry(&key) {
            Some(entry) => std::str::from_utf8(&entry.value)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or(StoreError::NotAnInteger)?,
            None => 0,
        };
        let value = current
            .checked_add(increment)
            .ok_or(StoreError::Overflow)?;

        // Lazy eviction may have released the key in `live_entry`.
        self.registry.claim(&key, ValueType::String)?;

        let expires_at_ms = self.entries.get(&key).and_then(|e| e.expires_at_ms);
        self.entries.insert(
            key,
            Entry {
                value: Bytes::from(value.to_string()),
                expires_at_ms,
            },
        );

        Ok(value)
    }

    /// Returns the entry at `key` unless it has expired, in which case it is removed.
    fn live_entry(&mut self, key: &str) -> Option<&Entry> {
        let expired = self.entries.get(key)?.is_expired(now_ms());

        if expired {
            trace!(key, "Evicting expired key on access");
            self.entries.remove(key);
            self.registry.release(key, ValueType::String);
            return None;
        }

        self.entries.get(key)
    }

    fn remove_expired_keys(&mut self) -> usize {
        let now = now_ms();
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.entries.remove(key);
            self.registry.release(key, ValueType::String);
        }

        expired_keys.len()
    }
}
